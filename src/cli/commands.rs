//! Command handlers for the foliopipe CLI.

use serde::Serialize;
use std::str::FromStr;
use tabled::Tabled;

use crate::broker::{get_candles, get_instrument_by_symbol, get_portfolio, BrokerClient, Direction};
use crate::cli::output::{self, OutputMode};
use crate::config::AppConfig;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::store::response::first_record;
use crate::store::{self, Datastore, EXPECTED_INDEXES, EXPECTED_TABLES};
use crate::types::RunType;

fn ensure_valid(config: &AppConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        return Err(anyhow::anyhow!("invalid configuration ({} problems)", errors.len()).into());
    }
    Ok(())
}

/// Apply the schema, then verify every table and index landed.
pub async fn init_db(config: &AppConfig) -> Result<()> {
    let db = store::connect(&config.database).await?;
    store::apply_schema(db.as_ref()).await?;
    let report = store::verify_schema(db.as_ref()).await?;

    if report.is_complete() {
        println!(
            "schema OK: {} tables, {} indexes",
            EXPECTED_TABLES.len(),
            EXPECTED_INDEXES.len()
        );
        return Ok(());
    }

    for table in &report.missing_tables {
        println!("missing table: {table}");
    }
    for index in &report.missing_indexes {
        println!("missing index: {index}");
    }
    Err(anyhow::anyhow!("schema verification failed").into())
}

/// Execute one ingest run and print its summary.
pub async fn run_ingest(config: &AppConfig, run_type: &str) -> Result<()> {
    let run_type = RunType::from_str(run_type)?;
    ensure_valid(config)?;

    let client = BrokerClient::new(&config.broker)?;
    let db = store::connect(&config.database).await?;
    store::apply_schema(db.as_ref()).await?;

    let pipeline = Pipeline::new(&client, db.as_ref(), config.pipeline.clone());
    let summary = pipeline.run(run_type).await?;

    output::print_item(&summary)?;
    println!(
        "run {} finished: {} instruments processed, {} failed",
        summary.run_id, summary.instruments_processed, summary.instruments_failed
    );

    let report = store::verify_schema(db.as_ref()).await?;
    let rows = status_rows(db.as_ref(), &report).await?;
    output::print_items(&rows, OutputMode::Table, "no tables")?;
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    table: String,
    present: String,
    records: String,
}

/// Show schema state and per-table record counts.
pub async fn show_status(config: &AppConfig, json: bool) -> Result<()> {
    let db = store::connect(&config.database).await?;
    let report = store::verify_schema(db.as_ref()).await?;
    let rows = status_rows(db.as_ref(), &report).await?;
    let latest = store::get_latest_snapshot(db.as_ref()).await?;

    if json {
        output::print_item(&serde_json::json!({
            "tables": rows,
            "missing_indexes": report.missing_indexes,
            "latest_snapshot": latest,
        }))?;
        return Ok(());
    }

    output::print_items(&rows, OutputMode::Table, "no tables")?;
    for index in &report.missing_indexes {
        println!("missing index: {index}");
    }
    if let Some(snapshot) = latest {
        println!(
            "latest snapshot: {} (captured_at {})",
            snapshot.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
            snapshot
                .get("captured_at")
                .and_then(|v| v.as_str())
                .unwrap_or("?"),
        );
    }
    Ok(())
}

async fn status_rows(db: &dyn Datastore, report: &store::SchemaReport) -> Result<Vec<StatusRow>> {
    let mut rows = Vec::with_capacity(EXPECTED_TABLES.len());
    for table in EXPECTED_TABLES {
        let missing = report.missing_tables.iter().any(|t| t == table);
        let records = if missing {
            "-".to_string()
        } else {
            count_records(db, table).await?.to_string()
        };
        rows.push(StatusRow {
            table: table.to_string(),
            present: if missing { "MISSING" } else { "yes" }.to_string(),
            records,
        });
    }
    Ok(rows)
}

async fn count_records(db: &dyn Datastore, table: &str) -> Result<i64> {
    let result = db
        .query(
            &format!("SELECT count() AS total FROM {table} GROUP ALL;"),
            serde_json::json!({}),
        )
        .await?;
    Ok(first_record(result)
        .and_then(|row| row.get("total").and_then(|v| v.as_i64()))
        .unwrap_or(0))
}

#[derive(Debug, Serialize, Tabled)]
struct PositionRow {
    position: i64,
    instrument: i64,
    side: String,
    amount: f64,
    open_rate: f64,
    units: f64,
    pnl: String,
}

/// Show the live portfolio from the brokerage API.
pub async fn show_portfolio(config: &AppConfig, json: bool) -> Result<()> {
    ensure_valid(config)?;
    let client = BrokerClient::new(&config.broker)?;
    let response = get_portfolio(&client).await?;
    let portfolio = &response.client_portfolio;

    if json {
        output::print_item(&response)?;
        return Ok(());
    }

    let rows: Vec<PositionRow> = portfolio
        .positions
        .iter()
        .map(|position| PositionRow {
            position: position.position_id,
            instrument: position.instrument_id,
            side: if position.is_buy { "BUY" } else { "SELL" }.to_string(),
            amount: position.amount,
            open_rate: position.open_rate,
            units: position.units,
            pnl: output::opt_money(position.unrealized_pnl.as_ref().map(|pnl| pnl.pnl)),
        })
        .collect();
    output::print_items(&rows, OutputMode::Table, "no open positions")?;

    println!(
        "credit: {}  unrealized P&L: {}  open positions: {}",
        output::money(portfolio.credit),
        output::opt_money(portfolio.unrealized_pnl),
        portfolio.positions.len()
    );
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: String,
}

/// Fetch recent candles for a ticker symbol.
pub async fn show_candles(config: &AppConfig, symbol: &str, count: u32, json: bool) -> Result<()> {
    ensure_valid(config)?;
    let client = BrokerClient::new(&config.broker)?;

    let instrument = get_instrument_by_symbol(&client, symbol).await?;
    let candles = get_candles(
        &client,
        instrument.instrument_id,
        config.pipeline.interval,
        count,
        Direction::Desc,
    )
    .await?;

    let mode = OutputMode::from_json_flag(json);
    if mode == OutputMode::Table {
        println!(
            "{} ({}): {} candles at {}",
            instrument.symbol,
            instrument.instrument_id,
            candles.len(),
            config.pipeline.interval
        );
    }
    let rows: Vec<CandleRow> = candles
        .iter()
        .map(|candle| CandleRow {
            timestamp: candle.timestamp.to_rfc3339(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: output::opt_money(candle.volume),
        })
        .collect();
    output::print_items(&rows, mode, "no candles")?;
    Ok(())
}
