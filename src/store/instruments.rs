//! Instrument repository.
//!
//! Instruments are keyed by their external id and written with full-replace
//! semantics: every upsert rewrites the whole record, last write wins.
//! Optional fields absent in a driver response are normalized to explicit
//! nulls after every read, so callers never guard for missing keys.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::broker::models::Instrument;
use crate::error::StoreError;
use crate::store::driver::{Datastore, RecordId, SelectTarget};
use crate::store::response::{first_record, normalize_records, Record};

const TABLE: &str = "instrument";

/// Fields the schema declares optional; filled with explicit nulls on read.
const OPTIONAL_FIELDS: [&str; 3] = ["exchange", "industry", "metadata"];

fn normalize_instrument(mut record: Record) -> Record {
    for field in OPTIONAL_FIELDS {
        record.entry(field.to_string()).or_insert(Value::Null);
    }
    record
}

fn instrument_record(instrument: &Instrument) -> Value {
    json!({
        "external_id": instrument.instrument_id,
        "symbol": instrument.symbol,
        "name": instrument.name,
        "asset_class": instrument.asset_class().as_str(),
        "exchange": instrument.exchange_id.map(|id| id.to_string()),
        "is_active": true,
    })
}

/// Insert-or-fully-replace one instrument, keyed by external id.
pub async fn upsert_instrument(
    db: &dyn Datastore,
    instrument: &Instrument,
) -> Result<Record, StoreError> {
    let data = instrument_record(instrument);
    let id = RecordId::new(TABLE, instrument.instrument_id);
    let result = db.upsert(&id, data.clone()).await?;
    debug!(symbol = %instrument.symbol, external_id = instrument.instrument_id, "instrument upserted");

    // Some driver versions return nothing from an upsert; fall back to the
    // payload we wrote.
    let record = first_record(result).unwrap_or_else(|| match data {
        Value::Object(map) => map,
        _ => Record::new(),
    });
    Ok(normalize_instrument(record))
}

/// Upsert a batch of instruments, preserving order.
pub async fn upsert_instruments(
    db: &dyn Datastore,
    instruments: &[Instrument],
) -> Result<Vec<Record>, StoreError> {
    let mut records = Vec::with_capacity(instruments.len());
    for instrument in instruments {
        records.push(upsert_instrument(db, instrument).await?);
    }
    info!(count = records.len(), "instrument batch upserted");
    Ok(records)
}

/// Look an instrument up by its unique symbol.
pub async fn get_by_symbol(
    db: &dyn Datastore,
    symbol: &str,
) -> Result<Option<Record>, StoreError> {
    let result = db
        .query(
            "SELECT * FROM instrument WHERE symbol = $symbol LIMIT 1;",
            json!({ "symbol": symbol }),
        )
        .await?;
    Ok(first_record(result).map(normalize_instrument))
}

/// Look an instrument up by its external id (the storage key).
pub async fn get_by_external_id(
    db: &dyn Datastore,
    external_id: i64,
) -> Result<Option<Record>, StoreError> {
    let result = db
        .select(SelectTarget::Record(RecordId::new(TABLE, external_id)))
        .await?;
    Ok(first_record(result).map(normalize_instrument))
}

/// Every stored instrument.
pub async fn list_instruments(db: &dyn Datastore) -> Result<Vec<Record>, StoreError> {
    let result = db.select(SelectTarget::table(TABLE)).await?;
    Ok(normalize_records(result)
        .into_iter()
        .map(normalize_instrument)
        .collect())
}
