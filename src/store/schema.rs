//! Storage schema definition and application.
//!
//! The whole schema is one script of `DEFINE ... OVERWRITE` statements, so
//! re-applying it is a no-op on correct state and a repair otherwise.
//! [`apply_schema`] runs at the start of every session; [`verify_schema`]
//! reports what a live database is missing.

use serde_json::Value;
use tracing::info;

use crate::error::StoreError;
use crate::store::driver::Datastore;
use crate::store::response::parse_info;

/// Full schema, applied verbatim in one round-trip.
pub const SCHEMA: &str = "\
-- ============================================================
-- INSTRUMENTS
-- ============================================================
DEFINE TABLE OVERWRITE instrument SCHEMAFULL;
DEFINE FIELD OVERWRITE external_id     ON instrument TYPE int;
DEFINE FIELD OVERWRITE symbol          ON instrument TYPE string;
DEFINE FIELD OVERWRITE name            ON instrument TYPE string;
DEFINE FIELD OVERWRITE asset_class     ON instrument TYPE string;
DEFINE FIELD OVERWRITE exchange        ON instrument TYPE option<string>;
DEFINE FIELD OVERWRITE industry        ON instrument TYPE option<string>;
DEFINE FIELD OVERWRITE is_active       ON instrument TYPE bool          DEFAULT true;
DEFINE FIELD OVERWRITE metadata        ON instrument TYPE option<object>;
DEFINE FIELD OVERWRITE updated_at      ON instrument TYPE datetime      DEFAULT time::now();
DEFINE INDEX OVERWRITE idx_symbol      ON instrument FIELDS symbol      UNIQUE;
DEFINE INDEX OVERWRITE idx_external_id ON instrument FIELDS external_id UNIQUE;

-- ============================================================
-- OHLCV CANDLES
-- ============================================================
DEFINE TABLE OVERWRITE candle SCHEMAFULL;
DEFINE FIELD OVERWRITE instrument      ON candle TYPE record<instrument>;
DEFINE FIELD OVERWRITE timeframe       ON candle TYPE string;
DEFINE FIELD OVERWRITE open            ON candle TYPE float;
DEFINE FIELD OVERWRITE high            ON candle TYPE float;
DEFINE FIELD OVERWRITE low             ON candle TYPE float;
DEFINE FIELD OVERWRITE close           ON candle TYPE float;
DEFINE FIELD OVERWRITE volume          ON candle TYPE option<float>;
DEFINE FIELD OVERWRITE timestamp       ON candle TYPE datetime;
DEFINE INDEX OVERWRITE idx_candle_lookup ON candle FIELDS instrument, timeframe, timestamp UNIQUE;

-- ============================================================
-- PORTFOLIO SNAPSHOTS
-- ============================================================
DEFINE TABLE OVERWRITE portfolio_snapshot SCHEMAFULL;
DEFINE FIELD OVERWRITE total_value     ON portfolio_snapshot TYPE float;
DEFINE FIELD OVERWRITE cash_available  ON portfolio_snapshot TYPE float;
DEFINE FIELD OVERWRITE open_positions  ON portfolio_snapshot TYPE int;
DEFINE FIELD OVERWRITE total_pnl       ON portfolio_snapshot TYPE float;
DEFINE FIELD OVERWRITE positions       ON portfolio_snapshot TYPE array;
DEFINE FIELD OVERWRITE positions.*     ON portfolio_snapshot FLEXIBLE TYPE object;
DEFINE FIELD OVERWRITE run_type        ON portfolio_snapshot TYPE string;
DEFINE FIELD OVERWRITE captured_at     ON portfolio_snapshot TYPE datetime DEFAULT time::now();

-- ============================================================
-- ANALYSIS RESULTS (per instrument per run)
-- ============================================================
DEFINE TABLE OVERWRITE analysis SCHEMAFULL;
DEFINE FIELD OVERWRITE instrument      ON analysis TYPE record<instrument>;
DEFINE FIELD OVERWRITE run_id          ON analysis TYPE string;
DEFINE FIELD OVERWRITE trend           ON analysis TYPE string;
DEFINE FIELD OVERWRITE trend_strength  ON analysis TYPE float;
DEFINE FIELD OVERWRITE price_action    ON analysis TYPE object;
DEFINE FIELD OVERWRITE sector_context  ON analysis TYPE option<object>;
DEFINE FIELD OVERWRITE raw_data        ON analysis TYPE object;
DEFINE FIELD OVERWRITE created_at      ON analysis TYPE datetime          DEFAULT time::now();

-- ============================================================
-- REPORTS (the final output)
-- ============================================================
DEFINE TABLE OVERWRITE report SCHEMAFULL;
DEFINE FIELD OVERWRITE run_id          ON report TYPE string;
DEFINE FIELD OVERWRITE run_type        ON report TYPE string;
DEFINE FIELD OVERWRITE portfolio_snapshot ON report TYPE record<portfolio_snapshot>;
DEFINE FIELD OVERWRITE recommendations ON report TYPE array;
DEFINE FIELD OVERWRITE recommendations.* ON report FLEXIBLE TYPE object;
DEFINE FIELD OVERWRITE commentary      ON report TYPE string;
DEFINE FIELD OVERWRITE summary         ON report TYPE string;
DEFINE FIELD OVERWRITE report_markdown ON report TYPE string;
DEFINE FIELD OVERWRITE created_at      ON report TYPE datetime            DEFAULT time::now();
DEFINE INDEX OVERWRITE idx_run_id      ON report FIELDS run_id            UNIQUE;

-- ============================================================
-- RECOMMENDATIONS (individual actions within a report)
-- ============================================================
DEFINE TABLE OVERWRITE recommendation SCHEMAFULL;
DEFINE FIELD OVERWRITE report          ON recommendation TYPE record<report>;
DEFINE FIELD OVERWRITE instrument      ON recommendation TYPE record<instrument>;
DEFINE FIELD OVERWRITE action          ON recommendation TYPE string;
DEFINE FIELD OVERWRITE conviction      ON recommendation TYPE string;
DEFINE FIELD OVERWRITE reasoning       ON recommendation TYPE string;
DEFINE FIELD OVERWRITE analysis        ON recommendation TYPE record<analysis>;
DEFINE FIELD OVERWRITE created_at      ON recommendation TYPE datetime    DEFAULT time::now();

-- ============================================================
-- RUN LOG (audit trail)
-- ============================================================
DEFINE TABLE OVERWRITE run_log SCHEMAFULL;
DEFINE FIELD OVERWRITE run_id          ON run_log TYPE string;
DEFINE FIELD OVERWRITE run_type        ON run_log TYPE string;
DEFINE FIELD OVERWRITE status          ON run_log TYPE string;
DEFINE FIELD OVERWRITE instruments_analysed ON run_log TYPE int;
DEFINE FIELD OVERWRITE recommendations_made ON run_log TYPE int;
DEFINE FIELD OVERWRITE errors          ON run_log TYPE option<array>;
DEFINE FIELD OVERWRITE errors.*        ON run_log FLEXIBLE TYPE object;
DEFINE FIELD OVERWRITE duration_ms     ON run_log TYPE option<int>;
DEFINE FIELD OVERWRITE started_at      ON run_log TYPE datetime           DEFAULT time::now();
DEFINE FIELD OVERWRITE completed_at    ON run_log TYPE option<datetime>;

-- ============================================================
-- CONFIGURATION
-- ============================================================
DEFINE TABLE OVERWRITE config SCHEMAFULL;
DEFINE FIELD OVERWRITE key             ON config TYPE string;
DEFINE FIELD OVERWRITE value           ON config TYPE object;
DEFINE FIELD OVERWRITE updated_at      ON config TYPE datetime            DEFAULT time::now();
DEFINE INDEX OVERWRITE idx_config_key  ON config FIELDS key               UNIQUE;
";

/// Tables the schema declares.
pub const EXPECTED_TABLES: [&str; 8] = [
    "instrument",
    "candle",
    "portfolio_snapshot",
    "analysis",
    "report",
    "recommendation",
    "run_log",
    "config",
];

/// Unique indexes the schema declares, with their owning tables.
pub const EXPECTED_INDEXES: [(&str, &str); 5] = [
    ("idx_symbol", "instrument"),
    ("idx_external_id", "instrument"),
    ("idx_candle_lookup", "candle"),
    ("idx_run_id", "report"),
    ("idx_config_key", "config"),
];

/// What [`verify_schema`] found missing on a live database.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub missing_tables: Vec<String>,
    pub missing_indexes: Vec<String>,
}

impl SchemaReport {
    pub fn is_complete(&self) -> bool {
        self.missing_tables.is_empty() && self.missing_indexes.is_empty()
    }
}

/// Apply the full schema. Safe to call repeatedly.
pub async fn apply_schema(db: &dyn Datastore) -> Result<(), StoreError> {
    info!("applying storage schema");
    db.query(SCHEMA, Value::Null).await?;
    info!("storage schema applied");
    Ok(())
}

/// Compare live database metadata against the expected tables and indexes.
pub async fn verify_schema(db: &dyn Datastore) -> Result<SchemaReport, StoreError> {
    let mut report = SchemaReport::default();

    let info = parse_info(db.query("INFO FOR DB;", Value::Null).await?);
    let tables = info.get("tables").and_then(Value::as_object);
    for table in EXPECTED_TABLES {
        let present = tables.map_or(false, |t| t.contains_key(table));
        if !present {
            report.missing_tables.push(table.to_string());
        }
    }

    for (index, table) in EXPECTED_INDEXES {
        if report.missing_tables.iter().any(|t| t == table) {
            report.missing_indexes.push(index.to_string());
            continue;
        }
        let table_info = parse_info(
            db.query(&format!("INFO FOR TABLE {table};"), Value::Null)
                .await?,
        );
        let present = table_info
            .get("indexes")
            .and_then(Value::as_object)
            .map_or(false, |indexes| indexes.contains_key(index));
        if !present {
            report.missing_indexes.push(index.to_string());
        }
    }

    Ok(report)
}
