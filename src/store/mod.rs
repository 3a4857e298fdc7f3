//! Document store: drivers, schema, and entity repositories.
//!
//! Everything above this module talks to storage through the [`Datastore`]
//! trait; [`connect`] picks the driver from the connection URL scheme.

pub mod candles;
pub mod driver;
pub mod http;
pub mod instruments;
pub mod memory;
pub mod reports;
pub mod response;
pub mod schema;
pub mod snapshots;

pub use candles::{bulk_insert_candles, count_candles, query_candles};
pub use driver::{Datastore, RecordId, SelectTarget};
pub use http::HttpDatastore;
pub use instruments::{
    get_by_external_id, get_by_symbol, list_instruments, upsert_instrument, upsert_instruments,
};
pub use memory::MemDatastore;
pub use reports::{
    create_recommendation, create_report, get_latest_report, get_recommendations_for_report,
    get_report_by_run_id, query_reports, RecommendationDraft, ReportDraft,
};
pub use response::{first_record, normalize_records, parse_info, Record};
pub use schema::{apply_schema, verify_schema, SchemaReport, EXPECTED_INDEXES, EXPECTED_TABLES};
pub use snapshots::{create_snapshot, create_snapshot_raw, get_latest_snapshot, query_snapshots};

use crate::config::DatabaseConfig;
use crate::error::StoreError;

/// Open a datastore from a connection URL.
///
/// Bare `memory` / `mem` aliases are accepted for convenience; otherwise the
/// scheme selects the driver: `mem://` for the in-process engine, `http://`
/// or `https://` for a remote document database. Anything else is rejected.
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn Datastore>, StoreError> {
    let url = match config.url.as_str() {
        "memory" | "mem" => "mem://",
        other => other,
    };

    if url.starts_with("mem://") || url.starts_with("memory://") {
        return Ok(Box::new(MemDatastore::new()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let db = HttpDatastore::connect(
            url,
            &config.namespace,
            &config.database,
            &config.username,
            &config.password,
        )
        .await?;
        return Ok(Box::new(db));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}
