//! Report and recommendation repository.
//!
//! Every record link passed in here is parsed strictly: a reference that is
//! not a well-formed `table:key` pair is rejected before any write happens.
//! Creates fail loud, and a recommendation that comes back without an
//! identity is surfaced as its own error since later joins depend on it.

use serde_json::{json, Value};
use tracing::info;

use crate::error::StoreError;
use crate::store::driver::{Datastore, RecordId};
use crate::store::response::{first_record, normalize_records, Record};
use crate::types::{Action, Conviction, RunType};

/// Everything needed to persist one analysis report.
#[derive(Debug, Clone)]
pub struct ReportDraft<'a> {
    pub run_id: &'a str,
    pub run_type: RunType,
    pub snapshot_id: &'a str,
    pub commentary: &'a str,
    pub summary: &'a str,
    pub report_markdown: &'a str,
    pub recommendations: Vec<Value>,
}

/// Everything needed to persist one recommendation under a report.
#[derive(Debug, Clone)]
pub struct RecommendationDraft<'a> {
    pub report_id: &'a str,
    pub instrument_external_id: i64,
    pub action: Action,
    pub conviction: Conviction,
    pub reasoning: &'a str,
    pub analysis_id: &'a str,
}

/// Persist a report tied to an existing snapshot.
pub async fn create_report(
    db: &dyn Datastore,
    draft: &ReportDraft<'_>,
) -> Result<Record, StoreError> {
    let snapshot = RecordId::parse(draft.snapshot_id)?;
    let data = json!({
        "run_id": draft.run_id,
        "run_type": draft.run_type.as_str(),
        "portfolio_snapshot": snapshot.to_string(),
        "commentary": draft.commentary,
        "summary": draft.summary,
        "report_markdown": draft.report_markdown,
        "recommendations": draft.recommendations,
    });
    let result = db.create("report", data).await?;
    let record =
        first_record(result).ok_or(StoreError::CreateReturnedNothing { table: "report" })?;
    if !record.contains_key("id") {
        return Err(StoreError::MissingRecordId { table: "report" });
    }
    info!(run_id = draft.run_id, run_type = %draft.run_type, "report created");
    Ok(record)
}

/// Persist one recommendation linked to a report and an analysis.
///
/// The created record must carry an identity; if the store hands one back
/// without it, the caller cannot join recommendations to their report and
/// the write is treated as failed.
pub async fn create_recommendation(
    db: &dyn Datastore,
    draft: &RecommendationDraft<'_>,
) -> Result<Record, StoreError> {
    let report = RecordId::parse(draft.report_id)?;
    let analysis = RecordId::parse(draft.analysis_id)?;
    let data = json!({
        "report": report.to_string(),
        "instrument": RecordId::new("instrument", draft.instrument_external_id).to_string(),
        "action": draft.action.as_str(),
        "conviction": draft.conviction.as_str(),
        "reasoning": draft.reasoning,
        "analysis": analysis.to_string(),
    });
    let result = db.create("recommendation", data).await?;
    let record = first_record(result)
        .ok_or(StoreError::CreateReturnedNothing { table: "recommendation" })?;
    if !record.contains_key("id") {
        return Err(StoreError::MissingRecordId { table: "recommendation" });
    }
    Ok(record)
}

/// The report produced by a specific pipeline run.
pub async fn get_report_by_run_id(
    db: &dyn Datastore,
    run_id: &str,
) -> Result<Option<Record>, StoreError> {
    let result = db
        .query(
            "SELECT * FROM report WHERE run_id = $run_id LIMIT 1;",
            json!({ "run_id": run_id }),
        )
        .await?;
    Ok(first_record(result))
}

/// The most recently created report, if any exist.
pub async fn get_latest_report(db: &dyn Datastore) -> Result<Option<Record>, StoreError> {
    let result = db
        .query(
            "SELECT * FROM report ORDER BY created_at DESC LIMIT 1;",
            json!({}),
        )
        .await?;
    Ok(first_record(result))
}

/// Reports newest first, optionally restricted to one run type.
pub async fn query_reports(
    db: &dyn Datastore,
    run_type: Option<RunType>,
    limit: usize,
) -> Result<Vec<Record>, StoreError> {
    let mut sql = String::from("SELECT * FROM report");
    let mut vars = json!({ "limit": limit });
    if let Some(run_type) = run_type {
        sql.push_str(" WHERE run_type = $run_type");
        vars["run_type"] = json!(run_type.as_str());
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT $limit;");

    let result = db.query(&sql, vars).await?;
    Ok(normalize_records(result))
}

/// All recommendations attached to one report.
pub async fn get_recommendations_for_report(
    db: &dyn Datastore,
    report_id: &str,
) -> Result<Vec<Record>, StoreError> {
    let report = RecordId::parse(report_id)?;
    let result = db
        .query(
            "SELECT * FROM recommendation WHERE report = $report;",
            json!({ "report": report.to_string() }),
        )
        .await?;
    Ok(normalize_records(result))
}
