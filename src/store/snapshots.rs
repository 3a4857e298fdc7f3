//! Portfolio snapshot repository.
//!
//! A snapshot is the first thing a pipeline run persists, so creation fails
//! loud: a driver that returns nothing is an error, never a silent success.
//! Positions are stored verbatim under the schemaless `positions` field to
//! keep the upstream payload auditable.

use serde_json::{json, Value};
use tracing::info;

use crate::broker::models::ClientPortfolio;
use crate::error::StoreError;
use crate::store::driver::Datastore;
use crate::store::response::{first_record, normalize_records, Record};
use crate::types::RunType;

const TABLE: &str = "portfolio_snapshot";

/// Persist the portfolio state for one pipeline run.
pub async fn create_snapshot(
    db: &dyn Datastore,
    portfolio: &ClientPortfolio,
    run_type: RunType,
) -> Result<Record, StoreError> {
    let pnl = portfolio.unrealized_pnl.unwrap_or(0.0);
    let data = json!({
        "total_value": portfolio.credit + pnl,
        "cash_available": portfolio.credit,
        "open_positions": portfolio.positions.len(),
        "total_pnl": pnl,
        "positions": portfolio.positions,
        "run_type": run_type.as_str(),
    });
    let record = create_snapshot_raw(db, data).await?;
    info!(
        run_type = %run_type,
        open_positions = portfolio.positions.len(),
        "portfolio snapshot created"
    );
    Ok(record)
}

/// Persist an already-shaped snapshot record.
pub async fn create_snapshot_raw(
    db: &dyn Datastore,
    data: Value,
) -> Result<Record, StoreError> {
    let result = db.create(TABLE, data).await?;
    first_record(result).ok_or(StoreError::CreateReturnedNothing { table: TABLE })
}

/// The most recently captured snapshot, if any exist.
pub async fn get_latest_snapshot(db: &dyn Datastore) -> Result<Option<Record>, StoreError> {
    let result = db
        .query(
            "SELECT * FROM portfolio_snapshot ORDER BY captured_at DESC LIMIT 1;",
            json!({}),
        )
        .await?;
    Ok(first_record(result))
}

/// Snapshots newest first, optionally restricted to one run type.
pub async fn query_snapshots(
    db: &dyn Datastore,
    run_type: Option<RunType>,
    limit: usize,
) -> Result<Vec<Record>, StoreError> {
    let mut sql = String::from("SELECT * FROM portfolio_snapshot");
    let mut vars = json!({ "limit": limit });
    if let Some(run_type) = run_type {
        sql.push_str(" WHERE run_type = $run_type");
        vars["run_type"] = json!(run_type.as_str());
    }
    sql.push_str(" ORDER BY captured_at DESC LIMIT $limit;");

    let result = db.query(&sql, vars).await?;
    Ok(normalize_records(result))
}
