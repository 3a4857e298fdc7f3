//! End-to-end pipeline runs against a scripted gateway and the in-process
//! datastore.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use foliopipe::broker::models::{Candle, PortfolioResponse};
use foliopipe::broker::CandleInterval;
use foliopipe::config::PipelineConfig;
use foliopipe::error::{BrokerError, PipelineError};
use foliopipe::pipeline::{MarketGateway, Pipeline};
use foliopipe::store::{
    apply_schema, count_candles, get_by_external_id, get_latest_snapshot, query_snapshots,
    MemDatastore,
};
use foliopipe::types::RunType;

/// Scripted gateway: every response is fixed up front, every call counted.
#[derive(Default)]
struct FakeGateway {
    portfolio: Option<Value>,
    catalog: Vec<Map<String, Value>>,
    catalog_fails: bool,
    candles: HashMap<i64, Vec<Candle>>,
    failing_candles: HashSet<i64>,
    catalog_calls: AtomicUsize,
    candle_calls: AtomicUsize,
}

#[async_trait]
impl MarketGateway for FakeGateway {
    async fn fetch_portfolio(&self) -> Result<PortfolioResponse, BrokerError> {
        match &self.portfolio {
            Some(raw) => Ok(serde_json::from_value(raw.clone()).unwrap()),
            None => Err(BrokerError::Status {
                status: 500,
                path: "/trading/info/real/pnl".to_string(),
            }),
        }
    }

    async fn fetch_instrument_catalog(&self) -> Result<Vec<Map<String, Value>>, BrokerError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if self.catalog_fails {
            return Err(BrokerError::Status {
                status: 503,
                path: "/market-data/instruments".to_string(),
            });
        }
        Ok(self.catalog.clone())
    }

    async fn fetch_candles(
        &self,
        instrument_id: i64,
        _interval: CandleInterval,
        _count: u32,
    ) -> Result<Vec<Candle>, BrokerError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_candles.contains(&instrument_id) {
            return Err(BrokerError::RetriesExhausted {
                attempts: 3,
                path: format!("/market-data/instruments/{instrument_id}/history/candles"),
                last_error: "status 500".to_string(),
            });
        }
        Ok(self.candles.get(&instrument_id).cloned().unwrap_or_default())
    }
}

async fn fresh_db() -> MemDatastore {
    let db = MemDatastore::new();
    apply_schema(&db).await.unwrap();
    db
}

fn position(instrument_id: i64, position_id: i64) -> Value {
    json!({
        "positionID": position_id,
        "instrumentID": instrument_id,
        "openDateTime": "2024-02-01T09:00:00Z",
        "openRate": 100.0,
        "isBuy": true,
        "amount": 500.0,
        "leverage": 1,
        "units": 5.0
    })
}

fn portfolio_json(instrument_ids: &[i64]) -> Value {
    let positions: Vec<Value> = instrument_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| position(*id, 9000 + idx as i64))
        .collect();
    json!({
        "clientPortfolio": {
            "credit": 6500.0,
            "unrealizedPnL": 158.75,
            "positions": positions
        }
    })
}

fn catalog_item(instrument_id: i64, symbol: &str) -> Map<String, Value> {
    match json!({
        "instrumentID": instrument_id,
        "symbolFull": symbol,
        "instrumentDisplayName": format!("{symbol} Inc"),
        "instrumentTypeID": 5,
        "exchangeID": 4
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn daily_candles(instrument_id: i64, count: u32) -> Vec<Candle> {
    (0..count)
        .map(|n| Candle {
            instrument_id,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1 + n, 0, 0, 0).unwrap(),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0 + n as f64,
            volume: Some(5_000.0),
        })
        .collect()
}

#[tokio::test]
async fn full_run_stores_snapshot_metadata_and_candles() {
    let gateway = FakeGateway {
        // 1001 appears twice: two positions on the same instrument.
        portfolio: Some(portfolio_json(&[1001, 1002, 1001])),
        catalog: vec![
            catalog_item(1001, "AAPL"),
            catalog_item(1002, "MSFT"),
            catalog_item(1003, "TSLA"),
        ],
        candles: HashMap::from([
            (1001, daily_candles(1001, 3)),
            (1002, daily_candles(1002, 3)),
        ]),
        ..Default::default()
    };
    let db = fresh_db().await;

    let summary = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap();

    assert_eq!(summary.run_type, RunType::MarketOpen);
    assert!(!summary.run_id.is_empty());
    assert!(
        summary.snapshot_id.starts_with("portfolio_snapshot:"),
        "unexpected snapshot id {:?}",
        summary.snapshot_id
    );
    assert_eq!(summary.instruments_processed, 2, "duplicate position must collapse");
    assert_eq!(summary.instruments_failed, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.candle_counts.get(&1001), Some(&3));
    assert_eq!(summary.candle_counts.get(&1002), Some(&3));

    // One catalog round-trip covers the whole run.
    assert_eq!(gateway.catalog_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 2);

    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 3);
    assert_eq!(count_candles(&db, 1002, "1d").await.unwrap(), 3);

    let stored = get_by_external_id(&db, 1001).await.unwrap().unwrap();
    assert_eq!(stored["symbol"], json!("AAPL"));
    // Catalog entries the portfolio does not hold are not persisted.
    assert!(get_by_external_id(&db, 1003).await.unwrap().is_none());

    let snapshot = get_latest_snapshot(&db).await.unwrap().unwrap();
    assert_eq!(snapshot["open_positions"], json!(3));
    assert_eq!(snapshot["run_type"], json!("market_open"));
    assert_eq!(snapshot["id"], json!(summary.snapshot_id));
}

#[tokio::test]
async fn one_failing_instrument_is_isolated() {
    let gateway = FakeGateway {
        portfolio: Some(portfolio_json(&[1001, 1002])),
        catalog: vec![catalog_item(1001, "AAPL"), catalog_item(1002, "MSFT")],
        candles: HashMap::from([(1001, daily_candles(1001, 3))]),
        failing_candles: HashSet::from([1002]),
        ..Default::default()
    };
    let db = fresh_db().await;

    let summary = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap();

    assert_eq!(summary.instruments_processed, 1);
    assert_eq!(summary.instruments_failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].instrument_id, 1002);
    assert!(!summary.errors[0].error.is_empty());
    assert!(!summary.candle_counts.contains_key(&1002));

    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 3);
    assert_eq!(count_candles(&db, 1002, "1d").await.unwrap(), 0);
    assert!(get_latest_snapshot(&db).await.unwrap().is_some());
}

#[tokio::test]
async fn empty_portfolio_short_circuits_market_data() {
    let gateway = FakeGateway {
        portfolio: Some(json!({"clientPortfolio": {"credit": 1000.0}})),
        ..Default::default()
    };
    let db = fresh_db().await;

    let summary = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap();

    assert_eq!(summary.instruments_processed, 0);
    assert_eq!(summary.instruments_failed, 0);
    assert!(summary.candle_counts.is_empty());
    assert!(summary.snapshot_id.starts_with("portfolio_snapshot:"));
    assert_eq!(gateway.catalog_calls.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 0);

    let snapshot = get_latest_snapshot(&db).await.unwrap().unwrap();
    assert_eq!(snapshot["open_positions"], json!(0));
}

#[tokio::test]
async fn portfolio_failure_aborts_the_run() {
    let gateway = FakeGateway::default();
    let db = fresh_db().await;

    let err = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PortfolioFetch(_)), "got {err}");
    assert!(
        get_latest_snapshot(&db).await.unwrap().is_none(),
        "aborted run must not leave a snapshot"
    );
    assert_eq!(gateway.catalog_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn catalog_failure_still_ingests_candles() {
    let gateway = FakeGateway {
        portfolio: Some(portfolio_json(&[1001])),
        catalog_fails: true,
        candles: HashMap::from([(1001, daily_candles(1001, 2))]),
        ..Default::default()
    };
    let db = fresh_db().await;

    let summary = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap();

    assert_eq!(summary.instruments_processed, 1);
    assert_eq!(summary.instruments_failed, 0);
    assert_eq!(summary.candle_counts.get(&1001), Some(&2));
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 2);
    assert!(
        get_by_external_id(&db, 1001).await.unwrap().is_none(),
        "no metadata without a catalog"
    );
}

#[tokio::test]
async fn undecodable_catalog_item_is_skipped() {
    let mut bad = Map::new();
    bad.insert("instrumentID".to_string(), json!(1001));
    // No symbol or display name: the item cannot decode into an instrument.
    let gateway = FakeGateway {
        portfolio: Some(portfolio_json(&[1001])),
        catalog: vec![bad],
        candles: HashMap::from([(1001, daily_candles(1001, 1))]),
        ..Default::default()
    };
    let db = fresh_db().await;

    let summary = Pipeline::new(&gateway, &db, PipelineConfig::default())
        .run(RunType::MarketOpen)
        .await
        .unwrap();

    assert_eq!(summary.instruments_processed, 1);
    assert!(get_by_external_id(&db, 1001).await.unwrap().is_none());
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 1);
}

#[tokio::test]
async fn rerun_inserts_no_duplicate_candles() {
    let gateway = FakeGateway {
        portfolio: Some(portfolio_json(&[1001])),
        catalog: vec![catalog_item(1001, "AAPL")],
        candles: HashMap::from([(1001, daily_candles(1001, 3))]),
        ..Default::default()
    };
    let db = fresh_db().await;
    let config = PipelineConfig::default();

    let first = Pipeline::new(&gateway, &db, config.clone())
        .run(RunType::MarketOpen)
        .await
        .unwrap();
    assert_eq!(first.candle_counts.get(&1001), Some(&3));

    let second = Pipeline::new(&gateway, &db, config)
        .run(RunType::MarketClose)
        .await
        .unwrap();
    assert_eq!(second.instruments_processed, 1);
    assert_eq!(second.candle_counts.get(&1001), Some(&0), "rerun must insert nothing");
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 3);

    // Each run leaves its own snapshot under its own run type.
    assert_eq!(query_snapshots(&db, None, 10).await.unwrap().len(), 2);
    let closes = query_snapshots(&db, Some(RunType::MarketClose), 10).await.unwrap();
    assert_eq!(closes.len(), 1);
}
