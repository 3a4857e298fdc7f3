//! Repository semantics against the in-process datastore.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use foliopipe::broker::models::{Candle, ClientPortfolio, Instrument};
use foliopipe::error::StoreError;
use foliopipe::store::{
    apply_schema, bulk_insert_candles, count_candles, create_recommendation, create_report,
    create_snapshot, get_by_external_id, get_by_symbol, get_latest_snapshot,
    get_recommendations_for_report, get_report_by_run_id, query_candles, query_reports,
    query_snapshots, upsert_instrument, Datastore, MemDatastore, RecommendationDraft, RecordId,
    ReportDraft, SelectTarget,
};
use foliopipe::types::{Action, Conviction, RunType};

async fn fresh_db() -> MemDatastore {
    let db = MemDatastore::new();
    apply_schema(&db).await.unwrap();
    db
}

fn instrument(id: i64, symbol: &str, exchange: Option<i64>) -> Instrument {
    serde_json::from_value(json!({
        "instrumentID": id,
        "symbolFull": symbol,
        "instrumentDisplayName": format!("{symbol} Inc"),
        "instrumentTypeID": 5,
        "exchangeID": exchange
    }))
    .unwrap()
}

fn candle(id: i64, day: u32, close: f64) -> Candle {
    Candle {
        instrument_id: id,
        timestamp: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: Some(1000.0),
    }
}

fn portfolio(position_instruments: &[i64]) -> ClientPortfolio {
    let positions: Vec<_> = position_instruments
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            json!({
                "positionID": 9000 + idx as i64,
                "instrumentID": id,
                "openDateTime": "2024-02-01T09:00:00Z",
                "openRate": 100.0,
                "isBuy": true,
                "amount": 500.0,
                "leverage": 1,
                "units": 5.0
            })
        })
        .collect();
    serde_json::from_value(json!({
        "credit": 6500.0,
        "unrealizedPnL": 158.75,
        "positions": positions
    }))
    .unwrap()
}

// ==================== Candles ====================

#[tokio::test]
async fn candle_bulk_insert_is_idempotent() {
    let db = fresh_db().await;
    let batch = vec![candle(1001, 1, 10.0), candle(1001, 2, 11.0), candle(1001, 3, 12.0)];

    let first = bulk_insert_candles(&db, &batch, 1001, "1d").await.unwrap();
    assert_eq!(first.len(), 3);

    let second = bulk_insert_candles(&db, &batch, 1001, "1d").await.unwrap();
    assert!(second.is_empty(), "duplicates were re-inserted");
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 3);
}

#[tokio::test]
async fn candle_reinsert_keeps_only_new_rows() {
    let db = fresh_db().await;
    bulk_insert_candles(&db, &[candle(1001, 1, 10.0), candle(1001, 2, 11.0)], 1001, "1d")
        .await
        .unwrap();

    let overlapping = vec![candle(1001, 2, 11.0), candle(1001, 3, 12.0), candle(1001, 4, 13.0)];
    let inserted = bulk_insert_candles(&db, &overlapping, 1001, "1d").await.unwrap();
    assert_eq!(inserted.len(), 2, "only the two new days should land");
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 4);
}

#[tokio::test]
async fn same_timestamp_is_distinct_per_timeframe_and_instrument() {
    let db = fresh_db().await;
    bulk_insert_candles(&db, &[candle(1001, 1, 10.0)], 1001, "1d").await.unwrap();
    bulk_insert_candles(&db, &[candle(1001, 1, 10.0)], 1001, "1h").await.unwrap();
    bulk_insert_candles(&db, &[candle(1002, 1, 10.0)], 1002, "1d").await.unwrap();

    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 1);
    assert_eq!(count_candles(&db, 1001, "1h").await.unwrap(), 1);
    assert_eq!(count_candles(&db, 1002, "1d").await.unwrap(), 1);
}

#[tokio::test]
async fn candle_window_query_is_inclusive_and_sorted() {
    let db = fresh_db().await;
    let batch: Vec<Candle> = [10, 25, 15, 20].iter().map(|d| candle(1001, *d, *d as f64)).collect();
    bulk_insert_candles(&db, &batch, 1001, "1d").await.unwrap();

    let all = query_candles(&db, 1001, "1d", None, None).await.unwrap();
    let closes: Vec<f64> = all.iter().map(|r| r["close"].as_f64().unwrap()).collect();
    assert_eq!(closes, vec![10.0, 15.0, 20.0, 25.0], "not sorted oldest first");

    let start = Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 21, 0, 0, 0).unwrap();
    let window = query_candles(&db, 1001, "1d", Some(start), Some(end)).await.unwrap();
    assert_eq!(window.len(), 2);

    // Bounds land exactly on stored timestamps and must be included.
    let start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 25, 0, 0, 0).unwrap();
    let window = query_candles(&db, 1001, "1d", Some(start), Some(end)).await.unwrap();
    assert_eq!(window.len(), 4);
}

#[tokio::test]
async fn empty_candle_batch_inserts_nothing() {
    let db = fresh_db().await;
    let inserted = bulk_insert_candles(&db, &[], 1001, "1d").await.unwrap();
    assert!(inserted.is_empty());
    assert_eq!(count_candles(&db, 1001, "1d").await.unwrap(), 0);
}

// ==================== Instruments ====================

#[tokio::test]
async fn instrument_upsert_replaces_wholesale() {
    let db = fresh_db().await;
    upsert_instrument(&db, &instrument(1001, "AAPL", Some(4))).await.unwrap();

    let stored = get_by_external_id(&db, 1001).await.unwrap().unwrap();
    assert_eq!(stored["symbol"], json!("AAPL"));
    assert_eq!(stored["exchange"], json!("4"));

    // Second upsert has no exchange; the old value must not survive.
    upsert_instrument(&db, &instrument(1001, "AAPL.US", None)).await.unwrap();
    let stored = get_by_external_id(&db, 1001).await.unwrap().unwrap();
    assert_eq!(stored["symbol"], json!("AAPL.US"));
    assert_eq!(stored["exchange"], json!(null));
}

#[tokio::test]
async fn instrument_reads_always_carry_optional_fields() {
    let db = fresh_db().await;
    upsert_instrument(&db, &instrument(1001, "AAPL", None)).await.unwrap();

    let by_symbol = get_by_symbol(&db, "AAPL").await.unwrap().unwrap();
    for field in ["exchange", "industry", "metadata"] {
        assert!(by_symbol.contains_key(field), "missing optional field {field}");
    }
    assert!(get_by_symbol(&db, "MSFT").await.unwrap().is_none());
}

#[tokio::test]
async fn instrument_symbol_must_be_unique() {
    let db = fresh_db().await;
    upsert_instrument(&db, &instrument(1001, "AAPL", None)).await.unwrap();

    let err = upsert_instrument(&db, &instrument(1002, "AAPL", None)).await.unwrap_err();
    assert!(
        matches!(err, StoreError::UniqueViolation { ref table, .. } if table == "instrument"),
        "expected unique violation, got {err}"
    );
}

// ==================== Snapshots ====================

#[tokio::test]
async fn snapshot_create_computes_derived_fields() {
    let db = fresh_db().await;
    let record = create_snapshot(&db, &portfolio(&[1001, 1002]), RunType::MarketOpen)
        .await
        .unwrap();

    assert!(record["id"].as_str().unwrap().starts_with("portfolio_snapshot:"));
    assert_eq!(record["total_value"], json!(6658.75));
    assert_eq!(record["cash_available"], json!(6500.0));
    assert_eq!(record["total_pnl"], json!(158.75));
    assert_eq!(record["open_positions"], json!(2));
    assert_eq!(record["run_type"], json!("market_open"));
    assert!(record.get("captured_at").is_some(), "default timestamp missing");

    let latest = get_latest_snapshot(&db).await.unwrap().unwrap();
    assert_eq!(latest["id"], record["id"]);
}

#[tokio::test]
async fn snapshot_positions_survive_verbatim() {
    let db = fresh_db().await;
    let mut portfolio = portfolio(&[1001]);
    portfolio.positions[0]
        .extra
        .insert("mirrorID".to_string(), json!(7));
    let record = create_snapshot(&db, &portfolio, RunType::MarketClose).await.unwrap();

    let positions = record["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0]["positionID"], json!(9000));
    assert_eq!(positions[0]["mirrorID"], json!(7), "extra field dropped");
}

#[tokio::test]
async fn snapshot_query_filters_by_run_type() {
    let db = fresh_db().await;
    create_snapshot(&db, &portfolio(&[1001]), RunType::MarketOpen).await.unwrap();
    create_snapshot(&db, &portfolio(&[1001]), RunType::MarketClose).await.unwrap();

    let all = query_snapshots(&db, None, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let closes = query_snapshots(&db, Some(RunType::MarketClose), 10).await.unwrap();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0]["run_type"], json!("market_close"));

    let limited = query_snapshots(&db, None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn empty_portfolio_snapshot_is_valid() {
    let db = fresh_db().await;
    let empty: ClientPortfolio =
        serde_json::from_value(json!({ "credit": 1000.0 })).unwrap();
    let record = create_snapshot(&db, &empty, RunType::MarketOpen).await.unwrap();
    assert_eq!(record["open_positions"], json!(0));
    assert_eq!(record["total_value"], json!(1000.0));
    assert_eq!(record["positions"], json!([]));
}

// ==================== Reports and recommendations ====================

fn report_draft<'a>(run_id: &'a str, snapshot_id: &'a str) -> ReportDraft<'a> {
    ReportDraft {
        run_id,
        run_type: RunType::MarketClose,
        snapshot_id,
        commentary: "quiet session",
        summary: "hold everything",
        report_markdown: "# Report\n\nhold",
        recommendations: vec![],
    }
}

#[tokio::test]
async fn report_create_and_lookup_by_run_id() {
    let db = fresh_db().await;
    let snapshot = create_snapshot(&db, &portfolio(&[1001]), RunType::MarketClose)
        .await
        .unwrap();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    let record = create_report(&db, &report_draft("run-1", &snapshot_id)).await.unwrap();
    assert!(record["id"].as_str().unwrap().starts_with("report:"));
    assert_eq!(record["portfolio_snapshot"], json!(snapshot_id));
    assert_eq!(record["recommendations"], json!([]));

    let found = get_report_by_run_id(&db, "run-1").await.unwrap().unwrap();
    assert_eq!(found["id"], record["id"]);
    assert!(get_report_by_run_id(&db, "run-2").await.unwrap().is_none());
}

#[tokio::test]
async fn report_run_id_must_be_unique() {
    let db = fresh_db().await;
    let snapshot = create_snapshot(&db, &portfolio(&[1001]), RunType::MarketOpen)
        .await
        .unwrap();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    create_report(&db, &report_draft("run-1", &snapshot_id)).await.unwrap();
    let err = create_report(&db, &report_draft("run-1", &snapshot_id)).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }), "got {err}");
}

#[tokio::test]
async fn report_rejects_malformed_snapshot_reference() {
    let db = fresh_db().await;
    for bad in ["not-a-record", "portfolio_snapshot:", ":abc", ""] {
        let err = create_report(&db, &report_draft("run-x", bad)).await.unwrap_err();
        assert!(
            matches!(err, StoreError::MalformedRecordId(_)),
            "{bad:?} should be rejected, got {err}"
        );
    }
}

#[tokio::test]
async fn recommendation_links_to_report_and_analysis() {
    let db = fresh_db().await;
    let snapshot = create_snapshot(&db, &portfolio(&[1001]), RunType::MarketOpen)
        .await
        .unwrap();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();
    let report = create_report(&db, &report_draft("run-1", &snapshot_id)).await.unwrap();
    let report_id = report["id"].as_str().unwrap().to_string();

    let created = create_recommendation(
        &db,
        &RecommendationDraft {
            report_id: &report_id,
            instrument_external_id: 1001,
            action: Action::Buy,
            conviction: Conviction::High,
            reasoning: "breakout above range",
            analysis_id: "analysis:abc123",
        },
    )
    .await
    .unwrap();
    assert!(created["id"].as_str().unwrap().starts_with("recommendation:"));
    assert_eq!(created["instrument"], json!("instrument:1001"));

    let linked = get_recommendations_for_report(&db, &report_id).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0]["action"], json!("buy"));
    assert_eq!(linked[0]["conviction"], json!("high"));
}

#[tokio::test]
async fn recommendation_rejects_malformed_references() {
    let db = fresh_db().await;
    let draft = RecommendationDraft {
        report_id: "report-without-key",
        instrument_external_id: 1001,
        action: Action::Hold,
        conviction: Conviction::Low,
        reasoning: "sideways",
        analysis_id: "analysis:abc",
    };
    let err = create_recommendation(&db, &draft).await.unwrap_err();
    assert!(matches!(err, StoreError::MalformedRecordId(_)), "got {err}");
}

#[tokio::test]
async fn query_reports_filters_by_run_type() {
    let db = fresh_db().await;
    let snapshot = create_snapshot(&db, &portfolio(&[1001]), RunType::MarketOpen)
        .await
        .unwrap();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    let mut open = report_draft("run-open", &snapshot_id);
    open.run_type = RunType::MarketOpen;
    create_report(&db, &open).await.unwrap();
    create_report(&db, &report_draft("run-close", &snapshot_id)).await.unwrap();

    let all = query_reports(&db, None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    let opens = query_reports(&db, Some(RunType::MarketOpen), 10).await.unwrap();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0]["run_id"], json!("run-open"));
}

// ==================== Write-integrity checks ====================

/// Store stub whose `create` hands back a canned response, for the integrity
/// checks the real engine never trips.
struct RiggedStore(Value);

#[async_trait]
impl Datastore for RiggedStore {
    async fn query(&self, _statement: &str, _params: Value) -> Result<Value, StoreError> {
        Ok(Value::Null)
    }

    async fn create(&self, _table: &str, _data: Value) -> Result<Value, StoreError> {
        Ok(self.0.clone())
    }

    async fn upsert(&self, _id: &RecordId, _data: Value) -> Result<Value, StoreError> {
        Ok(Value::Null)
    }

    async fn select(&self, _target: SelectTarget) -> Result<Value, StoreError> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn create_returning_no_record_fails_loudly() {
    let db = RiggedStore(Value::Null);
    let err = create_report(&db, &report_draft("run-1", "portfolio_snapshot:s1"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::CreateReturnedNothing { table: "report" }),
        "got {err}"
    );
}

#[tokio::test]
async fn created_record_without_identity_is_an_error() {
    let db = RiggedStore(json!([{ "action": "buy" }]));
    let draft = RecommendationDraft {
        report_id: "report:r1",
        instrument_external_id: 1001,
        action: Action::Buy,
        conviction: Conviction::Medium,
        reasoning: "momentum",
        analysis_id: "analysis:a1",
    };
    let err = create_recommendation(&db, &draft).await.unwrap_err();
    assert!(
        matches!(
            err,
            StoreError::MissingRecordId {
                table: "recommendation"
            }
        ),
        "got {err}"
    );
}
