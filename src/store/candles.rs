//! Candle repository.
//!
//! Bulk inserts are idempotent at row granularity: the compound unique index
//! on (instrument, timeframe, timestamp) rejects rows already present, and
//! the insert statement skips those rows while keeping the rest. Re-running
//! an ingest therefore never duplicates history and never discards new rows.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::broker::models::Candle;
use crate::error::StoreError;
use crate::store::driver::Datastore;
use crate::store::response::{first_record, normalize_records, Record};

fn candle_row(candle: &Candle, external_id: i64, timeframe: &str) -> Value {
    json!({
        "instrument": format!("instrument:{external_id}"),
        "timeframe": timeframe,
        "open": candle.open,
        "high": candle.high,
        "low": candle.low,
        "close": candle.close,
        "volume": candle.volume,
        "timestamp": candle.timestamp,
    })
}

/// Insert candles for one instrument and timeframe, skipping duplicates.
///
/// Returns only the rows the store actually accepted; an empty input batch
/// performs no I/O at all.
pub async fn bulk_insert_candles(
    db: &dyn Datastore,
    candles: &[Candle],
    external_id: i64,
    timeframe: &str,
) -> Result<Vec<Record>, StoreError> {
    if candles.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Value> = candles
        .iter()
        .map(|candle| candle_row(candle, external_id, timeframe))
        .collect();
    let result = db
        .query("INSERT INTO candle $data;", json!({ "data": rows }))
        .await?;
    let inserted = normalize_records(result);
    info!(
        external_id,
        timeframe,
        requested = candles.len(),
        inserted = inserted.len(),
        "candles inserted"
    );
    Ok(inserted)
}

/// Candles for one instrument and timeframe, oldest first.
///
/// `start` and `end` bound the window inclusively on both sides.
pub async fn query_candles(
    db: &dyn Datastore,
    external_id: i64,
    timeframe: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Record>, StoreError> {
    let mut sql = String::from(
        "SELECT * FROM candle WHERE instrument = type::thing('instrument', $external_id) \
         AND timeframe = $timeframe",
    );
    let mut vars = json!({ "external_id": external_id, "timeframe": timeframe });
    if let Some(start) = start {
        sql.push_str(" AND timestamp >= <datetime>$start");
        vars["start"] = json!(start);
    }
    if let Some(end) = end {
        sql.push_str(" AND timestamp <= <datetime>$end");
        vars["end"] = json!(end);
    }
    sql.push_str(" ORDER BY timestamp ASC;");

    let result = db.query(&sql, vars).await?;
    Ok(normalize_records(result))
}

/// How many candles are stored for one instrument and timeframe.
pub async fn count_candles(
    db: &dyn Datastore,
    external_id: i64,
    timeframe: &str,
) -> Result<i64, StoreError> {
    let result = db
        .query(
            "SELECT count() AS total FROM candle \
             WHERE instrument = type::thing('instrument', $external_id) \
             AND timeframe = $timeframe GROUP ALL;",
            json!({ "external_id": external_id, "timeframe": timeframe }),
        )
        .await?;
    Ok(first_record(result)
        .and_then(|row| row.get("total").and_then(Value::as_i64))
        .unwrap_or(0))
}
