//! Ingest pipeline: portfolio capture followed by per-instrument market data.
//!
//! One run walks a fixed sequence:
//!
//! 1. **Init**: generate a run id
//! 2. **Fetch portfolio**: persist a snapshot, extract instrument ids
//! 3. **Fetch market data**: resolve metadata in one catalog call, then
//!    fetch and store candles per instrument
//!
//! Failure handling is tiered. A failed portfolio fetch or snapshot write
//! aborts the run. A failed catalog fetch degrades it: candle ingest only
//! needs the instrument id, so the run continues without metadata. A failure
//! on one instrument is recorded in the summary and the loop moves on.

pub mod gateway;

pub use gateway::MarketGateway;

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::models::Instrument;
use crate::config::PipelineConfig;
use crate::error::{FolioError, PipelineError};
use crate::store::driver::Datastore;
use crate::store::{bulk_insert_candles, create_snapshot, upsert_instrument};
use crate::types::RunType;

/// One failed instrument, kept in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentFailure {
    pub instrument_id: i64,
    pub error: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_type: RunType,
    pub snapshot_id: String,
    pub instruments_processed: usize,
    pub instruments_failed: usize,
    pub candle_counts: BTreeMap<i64, usize>,
    pub errors: Vec<InstrumentFailure>,
}

/// Coordinates one ingest run across the gateway and the document store.
pub struct Pipeline<'a> {
    gateway: &'a dyn MarketGateway,
    db: &'a dyn Datastore,
    config: PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(gateway: &'a dyn MarketGateway, db: &'a dyn Datastore, config: PipelineConfig) -> Self {
        Self {
            gateway,
            db,
            config,
        }
    }

    /// Execute one full run.
    pub async fn run(&self, run_type: RunType) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id, run_type = %run_type, "pipeline started");

        let response = self.gateway.fetch_portfolio().await.map_err(|err| {
            error!(error = %err, "portfolio fetch failed");
            PipelineError::PortfolioFetch(err)
        })?;
        let portfolio = response.client_portfolio;

        let snapshot = create_snapshot(self.db, &portfolio, run_type).await?;
        let snapshot_id = snapshot
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(
            snapshot_id,
            positions = portfolio.positions.len(),
            "portfolio snapshot created"
        );

        let instrument_ids: Vec<i64> = portfolio
            .positions
            .iter()
            .map(|position| position.instrument_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if instrument_ids.is_empty() {
            warn!("no instruments in portfolio");
            return Ok(RunSummary {
                run_id,
                run_type,
                snapshot_id,
                instruments_processed: 0,
                instruments_failed: 0,
                candle_counts: BTreeMap::new(),
                errors: Vec::new(),
            });
        }

        let instrument_map = self.resolve_instruments(&instrument_ids).await;

        let mut candle_counts = BTreeMap::new();
        let mut errors = Vec::new();
        let mut processed = 0usize;

        for instrument_id in instrument_ids {
            let instrument = instrument_map.get(&instrument_id);
            match self.ingest_instrument(instrument_id, instrument).await {
                Ok(inserted) => {
                    candle_counts.insert(instrument_id, inserted);
                    processed += 1;
                    info!(
                        instrument_id,
                        symbol = ?instrument.map(|i| i.symbol.as_str()),
                        candles_inserted = inserted,
                        "instrument processed"
                    );
                }
                Err(err) => {
                    warn!(instrument_id, error = %err, "instrument ingest failed");
                    errors.push(InstrumentFailure {
                        instrument_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        let summary = RunSummary {
            run_id,
            run_type,
            snapshot_id,
            instruments_processed: processed,
            instruments_failed: errors.len(),
            candle_counts,
            errors,
        };
        info!(
            run_id = summary.run_id,
            instruments_processed = summary.instruments_processed,
            instruments_failed = summary.instruments_failed,
            "pipeline complete"
        );
        Ok(summary)
    }

    /// Store metadata (when resolved) and candles for one instrument.
    async fn ingest_instrument(
        &self,
        instrument_id: i64,
        instrument: Option<&Instrument>,
    ) -> Result<usize, FolioError> {
        if let Some(instrument) = instrument {
            upsert_instrument(self.db, instrument).await?;
        } else {
            warn!(instrument_id, "instrument metadata not found");
        }

        let candles = self
            .gateway
            .fetch_candles(instrument_id, self.config.interval, self.config.candle_count)
            .await?;
        let inserted =
            bulk_insert_candles(self.db, &candles, instrument_id, &self.config.timeframe).await?;
        Ok(inserted.len())
    }

    /// One catalog fetch, filtered down to the ids the portfolio holds.
    ///
    /// A gateway failure here returns an empty map so the run can continue;
    /// single items that fail to decode are skipped.
    async fn resolve_instruments(&self, instrument_ids: &[i64]) -> HashMap<i64, Instrument> {
        let items = match self.gateway.fetch_instrument_catalog().await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "instrument resolution failed, continuing without metadata");
                return HashMap::new();
            }
        };

        let wanted: HashSet<i64> = instrument_ids.iter().copied().collect();
        let mut resolved = HashMap::new();
        for item in items {
            let Some(instrument_id) = item.get("instrumentID").and_then(Value::as_i64) else {
                continue;
            };
            if !wanted.contains(&instrument_id) {
                continue;
            }
            match serde_json::from_value::<Instrument>(Value::Object(item)) {
                Ok(instrument) => {
                    resolved.insert(instrument_id, instrument);
                }
                Err(err) => {
                    warn!(instrument_id, error = %err, "instrument failed to decode");
                }
            }
        }

        info!(
            wanted = wanted.len(),
            found = resolved.len(),
            "instruments resolved"
        );
        resolved
    }
}
