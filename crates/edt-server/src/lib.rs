//! Dataset query engine + the axum tool-call shim in front of it.
//!
//! The engine is stateless: every operation re-reads the persisted datasets,
//! which are small, immutable snapshots rebuilt out-of-band. The shim maps
//! tool names to engine calls and renders every result (including not-found
//! and bad-argument conditions) as a single text-content payload.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use edt_core::{SpecialElection, StateElectionRecord};
use edt_storage::DatasetStore;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "edt-server";

pub const DEFAULT_SPECIALS_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("State '{0}' not found")]
    StateNotFound(String),
    #[error("EAVS data not available for state '{0}'")]
    EavsNotAvailable(String),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn days_until(target: NaiveDate, today: NaiveDate) -> i64 {
    // Signed on purpose: past dates yield negative day counts.
    (target - today).num_days()
}

fn parse_query_date(raw: Option<&str>, label: &str) -> Result<NaiveDate, QueryError> {
    let raw = raw.ok_or_else(|| QueryError::InvalidDate(format!("missing {label}")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidDate(format!("{label} '{raw}' is not YYYY-MM-DD")))
}

fn sort_by_date_field(entries: &mut [Value], field: &str) {
    // Stable sort on the YYYY-MM-DD string; lexicographic equals
    // chronological for this format.
    entries.sort_by(|a, b| {
        a[field]
            .as_str()
            .unwrap_or("")
            .cmp(b[field].as_str().unwrap_or(""))
    });
}

fn regular_entry(
    state: &StateElectionRecord,
    date: NaiveDate,
    kind: &str,
    today: NaiveDate,
) -> Value {
    json!({
        "state": state.state_code,
        "state_name": state.state_name,
        "date": date,
        "type": kind,
        "days_until": days_until(date, today),
    })
}

fn special_with_days_until(election: &SpecialElection, today: NaiveDate) -> Result<Value, QueryError> {
    let mut value = serde_json::to_value(election)
        .map_err(|e| QueryError::Internal(anyhow::Error::from(e)))?;
    if let (Some(next), Value::Object(map)) = (election.next_date, &mut value) {
        map.insert("days_until".to_string(), json!(days_until(next, today)));
    }
    Ok(value)
}

/// Read-only query operations over the three persisted datasets.
pub struct QueryEngine {
    store: DatasetStore,
}

impl QueryEngine {
    pub fn new(store: DatasetStore) -> Self {
        Self { store }
    }

    async fn state_record(&self, state_code: &str) -> Result<StateElectionRecord, QueryError> {
        let code = state_code.to_ascii_uppercase();
        let data = self.store.load_election_dates().await?;
        data.state(&code)
            .cloned()
            .ok_or(QueryError::StateNotFound(code))
    }

    pub async fn next_election(
        &self,
        state_code: &str,
        today: NaiveDate,
    ) -> Result<Value, QueryError> {
        let state = self.state_record(state_code).await?;
        let statute_source = state.sources.first();
        let sos_source = state.sources.get(1);
        Ok(json!({
            "state": state.state_code,
            "state_name": state.state_name,
            "next_primary": state.next_primary.date,
            "primary_days_until": days_until(state.next_primary.date, today),
            "next_general": state.next_general.date,
            "general_days_until": days_until(state.next_general.date, today),
            "confidence_level": state.next_primary.confidence,
            "sources": {
                "statute": statute_source.and_then(|s| s.reference.clone()),
                "statute_url": statute_source.map(|s| s.url.clone()),
                "sos_url": sos_source.map(|s| s.url.clone()),
                "last_verified": state.last_updated,
            },
        }))
    }

    pub async fn elections_by_date_range(
        &self,
        start_raw: Option<&str>,
        end_raw: Option<&str>,
        today: NaiveDate,
    ) -> Result<Value, QueryError> {
        let start = parse_query_date(start_raw, "start_date")?;
        let end = parse_query_date(end_raw, "end_date")?;
        let data = self.store.load_election_dates().await?;

        let mut elections = Vec::new();
        for state in &data.states {
            let primary = state.next_primary.date;
            if start <= primary && primary <= end {
                elections.push(regular_entry(state, primary, "primary", today));
            }
            let general = state.next_general.date;
            if start <= general && general <= end {
                elections.push(regular_entry(state, general, "general", today));
            }
        }
        sort_by_date_field(&mut elections, "date");

        Ok(json!({
            "date_range": {"start": start, "end": end},
            "elections_count": elections.len(),
            "elections": elections,
        }))
    }

    pub async fn all_upcoming_elections(&self, today: NaiveDate) -> Result<Value, QueryError> {
        let data = self.store.load_election_dates().await?;

        let mut elections = Vec::new();
        for state in &data.states {
            elections.push(regular_entry(state, state.next_primary.date, "primary", today));
            elections.push(regular_entry(state, state.next_general.date, "general", today));
        }
        sort_by_date_field(&mut elections, "date");

        Ok(json!({
            "total_elections": elections.len(),
            "data_updated": data.metadata.generated_at.date_naive(),
            "elections": elections,
        }))
    }

    pub async fn election_sources(&self, state_code: &str) -> Result<Value, QueryError> {
        let state = self.state_record(state_code).await?;
        Ok(json!({
            "state": state.state_code,
            "state_name": state.state_name,
            "primary_election": {
                "date": state.next_primary.date,
                "date_rule": state.next_primary.date_rule,
                "statute_reference": state.next_primary.statute_reference,
                "confidence": state.next_primary.confidence,
            },
            "general_election": {
                "date": state.next_general.date,
                "date_rule": state.next_general.date_rule,
                "statute_reference": state.next_general.statute_reference,
                "confidence": state.next_general.confidence,
            },
            "sources": state.sources,
            "validation": state.validation,
            "last_updated": state.last_updated,
            "notes": state.notes,
        }))
    }

    pub async fn special_elections_by_state(&self, state_code: &str) -> Result<Value, QueryError> {
        let code = state_code.to_ascii_uppercase();
        let specials = self.store.load_special_elections().await?;
        let state_specials = specials.for_state(&code);
        Ok(json!({
            "state_code": code,
            "special_elections_count": state_specials.len(),
            "special_elections": state_specials,
        }))
    }

    pub async fn upcoming_special_elections(
        &self,
        days_ahead: i64,
        today: NaiveDate,
    ) -> Result<Value, QueryError> {
        let specials = self.store.load_special_elections().await?;

        let mut upcoming = Vec::new();
        for election in &specials.special_elections {
            let Some(next) = election.next_date else {
                continue;
            };
            let diff = days_until(next, today);
            if (0..=days_ahead).contains(&diff) {
                upcoming.push(special_with_days_until(election, today)?);
            }
        }
        sort_by_date_field(&mut upcoming, "next_date");

        Ok(json!({
            "days_ahead": days_ahead,
            "count": upcoming.len(),
            "special_elections": upcoming,
        }))
    }

    pub async fn election_with_specials(
        &self,
        state_code: &str,
        today: NaiveDate,
    ) -> Result<Value, QueryError> {
        let state = self.state_record(state_code).await?;
        let specials = self.store.load_special_elections().await?;
        let state_specials = specials.for_state(&state.state_code);

        Ok(json!({
            "state": state.state_code,
            "state_name": state.state_name,
            "regular_elections": {
                "next_primary": {
                    "date": state.next_primary.date,
                    "days_until": days_until(state.next_primary.date, today),
                },
                "next_general": {
                    "date": state.next_general.date,
                    "days_until": days_until(state.next_general.date, today),
                },
            },
            "special_elections_count": state_specials.len(),
            "special_elections": state_specials,
        }))
    }

    pub async fn all_elections_by_date_range(
        &self,
        start_raw: Option<&str>,
        end_raw: Option<&str>,
        include_specials: bool,
        today: NaiveDate,
    ) -> Result<Value, QueryError> {
        let start = parse_query_date(start_raw, "start_date")?;
        let end = parse_query_date(end_raw, "end_date")?;
        let data = self.store.load_election_dates().await?;

        let mut elections = Vec::new();
        for state in &data.states {
            for (date, kind) in [
                (state.next_primary.date, "primary"),
                (state.next_general.date, "general"),
            ] {
                if start <= date && date <= end {
                    let mut entry = regular_entry(state, date, kind, today);
                    entry["category"] = json!("regular");
                    elections.push(entry);
                }
            }
        }

        if include_specials {
            let specials = self.store.load_special_elections().await?;
            for election in &specials.special_elections {
                let Some(next) = election.next_date else {
                    continue;
                };
                if start <= next && next <= end {
                    elections.push(json!({
                        "state": election.state_code,
                        "state_name": election.state_name,
                        "date": next,
                        "type": election.next_date_type,
                        "category": "special",
                        "office": election.office,
                        "district": election.district,
                        "days_until": days_until(next, today),
                    }));
                }
            }
        }
        sort_by_date_field(&mut elections, "date");

        Ok(json!({
            "date_range": {"start": start, "end": end},
            "include_specials": include_specials,
            "elections_count": elections.len(),
            "elections": elections,
        }))
    }

    pub async fn special_elections_metadata(&self) -> Result<Value, QueryError> {
        let specials = self.store.load_special_elections().await?;
        Ok(json!({
            "metadata": specials.metadata,
            "states_with_specials": specials.by_state.keys().collect::<Vec<_>>(),
        }))
    }

    pub async fn eavs_for_state(&self, state_code: &str) -> Result<Value, QueryError> {
        let code = state_code.to_ascii_uppercase();
        let survey = self.store.load_survey().await?;
        let state = survey
            .states
            .get(&code)
            .ok_or(QueryError::EavsNotAvailable(code.clone()))?;

        Ok(json!({
            "state_code": code,
            "state_name": state.state_name,
            "jurisdiction_count": state.jurisdiction_count,
            "voter_registration": state.voter_registration,
            "turnout": state.turnout,
            "mail_voting": state.mail_voting,
            "polling": state.polling,
            "provisional": state.provisional,
            "source": survey.metadata,
        }))
    }

    pub async fn eavs_comparison(&self, state_codes: &[String]) -> Result<Value, QueryError> {
        let survey = self.store.load_survey().await?;

        let mut comparison = Vec::new();
        for code in state_codes {
            let code = code.to_ascii_uppercase();
            // States without survey data are skipped, not errors: the
            // comparison covers whatever subset is reporting.
            let Some(state) = survey.states.get(&code) else {
                continue;
            };
            comparison.push(json!({
                "state_code": code,
                "state_name": state.state_name,
                "registered_voters": state.voter_registration.total_registered,
                "ballots_cast": state.turnout.total_ballots_cast,
                "turnout_percentage": state.turnout.turnout_percentage,
                "polling_places": state.polling.polling_places,
                "poll_workers": state.polling.poll_workers,
                "mail_ballots_sent": state.mail_voting.ballots_transmitted,
                "mail_return_rate": state.mail_voting.return_rate,
            }));
        }

        Ok(json!({
            "states_compared": comparison.len(),
            "comparison": comparison,
        }))
    }

    pub async fn national_summary(&self) -> Result<Value, QueryError> {
        let survey = self.store.load_survey().await?;

        let mut total_registered: u64 = 0;
        let mut total_active: u64 = 0;
        let mut total_inactive: u64 = 0;
        let mut total_ballots_cast: u64 = 0;
        let mut total_mail_sent: u64 = 0;
        let mut total_mail_returned: u64 = 0;
        let mut total_polling_places: u64 = 0;
        let mut total_poll_workers: u64 = 0;

        for state in survey.states.values() {
            total_registered += state.voter_registration.total_registered.unwrap_or(0);
            total_active += state.voter_registration.total_active.unwrap_or(0);
            total_inactive += state.voter_registration.total_inactive.unwrap_or(0);
            total_ballots_cast += state.turnout.total_ballots_cast.unwrap_or(0);
            total_mail_sent += state.mail_voting.ballots_transmitted.unwrap_or(0);
            total_mail_returned += state.mail_voting.ballots_returned.unwrap_or(0);
            total_polling_places += state.polling.polling_places.unwrap_or(0);
            total_poll_workers += state.polling.poll_workers.unwrap_or(0);
        }

        let mut summary = json!({
            "total_registered": total_registered,
            "total_active": total_active,
            "total_inactive": total_inactive,
            "total_ballots_cast": total_ballots_cast,
            "total_mail_sent": total_mail_sent,
            "total_mail_returned": total_mail_returned,
            "total_polling_places": total_polling_places,
            "total_poll_workers": total_poll_workers,
            "states_reporting": survey.states.len(),
        });
        if total_registered > 0 {
            let pct = total_ballots_cast as f64 / total_registered as f64 * 100.0;
            summary["national_turnout_percentage"] = json!((pct * 10.0).round() / 10.0);
        }

        Ok(json!({
            "national_summary": summary,
            "source": survey.metadata,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tool-call shim
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub store: DatasetStore,
}

impl AppState {
    pub fn new(store: DatasetStore) -> Self {
        Self { store }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", post(call_tool_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("EDT_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let data_dir =
        std::env::var("EDT_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let state = AppState::new(DatasetStore::new(data_dir));
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving election tool contract");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn list_tools_handler() -> Json<Value> {
    Json(tool_descriptors())
}

async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    Json(args): Json<Value>,
) -> Response {
    let engine = QueryEngine::new(state.store.clone());
    let today = Utc::now().date_naive();

    match dispatch(&engine, &name, &args, today).await {
        Ok(payload) => text_content(&payload),
        Err(QueryError::Internal(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal error: {err}"),
        )
            .into_response(),
        // Domain errors are part of the contract: structured payload, HTTP 200.
        Err(err) => text_content(&json!({"error": err.to_string()})),
    }
}

fn text_content(payload: &Value) -> Response {
    let text = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "{\"error\": \"unserializable payload\"}".to_string());
    Json(json!([{"type": "text", "text": text}])).into_response()
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Route one tool call to its engine operation.
pub async fn dispatch(
    engine: &QueryEngine,
    name: &str,
    args: &Value,
    today: NaiveDate,
) -> Result<Value, QueryError> {
    match name {
        "get_next_election" => {
            engine
                .next_election(arg_str(args, "state_code").unwrap_or(""), today)
                .await
        }
        "get_elections_by_date_range" => {
            engine
                .elections_by_date_range(
                    arg_str(args, "start_date"),
                    arg_str(args, "end_date"),
                    today,
                )
                .await
        }
        "get_all_upcoming_elections" => engine.all_upcoming_elections(today).await,
        "get_election_sources" => {
            engine
                .election_sources(arg_str(args, "state_code").unwrap_or(""))
                .await
        }
        "get_special_elections_by_state" => {
            engine
                .special_elections_by_state(arg_str(args, "state_code").unwrap_or(""))
                .await
        }
        "get_upcoming_special_elections" => {
            let days_ahead = args
                .get("days_ahead")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_SPECIALS_WINDOW_DAYS);
            engine.upcoming_special_elections(days_ahead, today).await
        }
        "get_election_with_specials" => {
            engine
                .election_with_specials(arg_str(args, "state_code").unwrap_or(""), today)
                .await
        }
        "get_all_elections_by_date_range" => {
            let include_specials = args
                .get("include_specials")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            engine
                .all_elections_by_date_range(
                    arg_str(args, "start_date"),
                    arg_str(args, "end_date"),
                    include_specials,
                    today,
                )
                .await
        }
        "get_special_elections_metadata" => engine.special_elections_metadata().await,
        "get_eavs_data_for_state" => {
            engine
                .eavs_for_state(arg_str(args, "state_code").unwrap_or(""))
                .await
        }
        "get_state_eavs_comparison" => {
            let codes: Vec<String> = args
                .get("state_codes")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            engine.eavs_comparison(&codes).await
        }
        "get_national_eavs_summary" => engine.national_summary().await,
        other => Err(QueryError::UnknownTool(other.to_string())),
    }
}

fn state_code_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "state_code": {
                "type": "string",
                "description": "Two-letter state code (e.g., 'MI', 'CA', 'TX')",
            },
        },
        "required": ["state_code"],
    })
}

fn date_range_schema(extra: Option<(&str, Value)>) -> Value {
    let mut properties = json!({
        "start_date": {"type": "string", "description": "Start date in YYYY-MM-DD format"},
        "end_date": {"type": "string", "description": "End date in YYYY-MM-DD format"},
    });
    if let Some((key, schema)) = extra {
        properties[key] = schema;
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["start_date", "end_date"],
    })
}

fn no_args_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// The fixed tool contract served at `GET /tools`.
pub fn tool_descriptors() -> Value {
    json!([
        {
            "name": "get_next_election",
            "description": "Get the next primary and general election dates for a specific state",
            "inputSchema": state_code_schema(),
        },
        {
            "name": "get_elections_by_date_range",
            "description": "Get all elections within a date range",
            "inputSchema": date_range_schema(None),
        },
        {
            "name": "get_all_upcoming_elections",
            "description": "Get all upcoming elections across all states, sorted by date",
            "inputSchema": no_args_schema(),
        },
        {
            "name": "get_election_sources",
            "description": "Get detailed source citations for a state's election dates",
            "inputSchema": state_code_schema(),
        },
        {
            "name": "get_special_elections_by_state",
            "description": "Get all special elections for a specific state",
            "inputSchema": state_code_schema(),
        },
        {
            "name": "get_upcoming_special_elections",
            "description": "Get all upcoming special elections within a specified number of days",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "days_ahead": {
                        "type": "integer",
                        "description": "Number of days to look ahead (default: 90)",
                    },
                },
                "required": [],
            },
        },
        {
            "name": "get_election_with_specials",
            "description": "Get regular elections AND special elections combined for a specific state",
            "inputSchema": state_code_schema(),
        },
        {
            "name": "get_all_elections_by_date_range",
            "description": "Get all regular and special elections within a date range",
            "inputSchema": date_range_schema(Some((
                "include_specials",
                json!({"type": "boolean", "description": "Include special elections (default: true)"}),
            ))),
        },
        {
            "name": "get_special_elections_metadata",
            "description": "Get metadata about the special elections dataset",
            "inputSchema": no_args_schema(),
        },
        {
            "name": "get_eavs_data_for_state",
            "description": "Get EAVS election administration statistics for a specific state",
            "inputSchema": state_code_schema(),
        },
        {
            "name": "get_state_eavs_comparison",
            "description": "Compare EAVS election administration statistics between multiple states",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "state_codes": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of two-letter state codes to compare",
                    },
                },
                "required": ["state_codes"],
            },
        },
        {
            "name": "get_national_eavs_summary",
            "description": "Get national summary of EAVS data across all states",
            "inputSchema": no_args_schema(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use edt_core::{
        Confidence, ElectionDateEntry, ElectionDatesFile, ElectionDatesMetadata, Level,
        NextDateType, SourceRef, SpecialDates, SpecialElectionsFile, SpecialStatus,
        SpecialsMetadata, StateElectionRecord, StateSurveyAggregate, SurveyFile, SurveyMetadata,
        Validation, ValidationStatus,
    };
    use edt_storage::{ELECTION_DATES_FILE, SPECIAL_ELECTIONS_FILE, SURVEY_FILE};
    use http_body_util::BodyExt;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entry(d: &str, rule: &str, kind: &str) -> ElectionDateEntry {
        ElectionDateEntry {
            date: date(d),
            date_rule: rule.to_string(),
            kind: kind.to_string(),
            statute_reference: "Test Statute § 1".to_string(),
            confidence: Confidence::High,
        }
    }

    fn record(code: &str, name: &str, primary: &str, general: &str) -> StateElectionRecord {
        StateElectionRecord {
            state_code: code.to_string(),
            state_name: name.to_string(),
            next_primary: entry(primary, "First Tuesday of August", "state_primary"),
            next_general: entry(general, "First Tuesday after first Monday", "general_election"),
            sources: vec![
                SourceRef {
                    kind: "statute".to_string(),
                    reference: Some("Test Statute § 1".to_string()),
                    url: "https://law.example".to_string(),
                    calendar_url: None,
                    extracted_from: Some("Election Law Navigator / State Statutes".to_string()),
                    last_verified: None,
                },
                SourceRef {
                    kind: "sos_website".to_string(),
                    reference: None,
                    url: "https://sos.example".to_string(),
                    calendar_url: Some("https://sos.example/calendar".to_string()),
                    extracted_from: None,
                    last_verified: Some(date("2026-07-01")),
                },
            ],
            validation: Validation {
                status: ValidationStatus::Validated,
                discrepancies: vec![],
            },
            last_updated: date("2026-07-02"),
            notes: String::new(),
        }
    }

    fn special(id: &str, code: &str, name: &str, next: Option<&str>) -> SpecialElection {
        SpecialElection {
            id: id.to_string(),
            state_code: code.to_string(),
            state_name: name.to_string(),
            office: "US House".to_string(),
            district: Some("7".to_string()),
            level: Level::Federal,
            reason: Some("vacancy".to_string()),
            dates: SpecialDates {
                vacancy: None,
                primary: None,
                general: next.map(date),
                runoff: None,
            },
            status: SpecialStatus::Scheduled,
            confidence: Confidence::High,
            source_url: None,
            notes: None,
            next_date: next.map(date),
            next_date_type: next.map(|_| NextDateType::General),
        }
    }

    fn survey_state(code: &str, name: &str, registered: u64, cast: u64) -> StateSurveyAggregate {
        let mut state = StateSurveyAggregate {
            state_code: code.to_string(),
            state_name: name.to_string(),
            jurisdiction_count: 10,
            ..Default::default()
        };
        state.voter_registration.total_registered = Some(registered);
        state.turnout.total_ballots_cast = Some(cast);
        state
    }

    async fn fixture_store() -> (TempDir, DatasetStore) {
        let dir = tempdir().expect("tempdir");
        let store = DatasetStore::new(dir.path());

        let dates = ElectionDatesFile {
            metadata: ElectionDatesMetadata {
                version: "1.0.0".to_string(),
                generated_at: "2026-07-02T08:00:00Z".parse().unwrap(),
                description: "test dataset".to_string(),
                year: 2026,
            },
            states: vec![
                record("MI", "Michigan", "2026-08-04", "2026-11-03"),
                record("AZ", "Arizona", "2026-08-04", "2026-11-03"),
                record("TX", "Texas", "2026-03-03", "2026-11-03"),
            ],
        };
        store
            .write_json(ELECTION_DATES_FILE, &dates)
            .await
            .expect("write dates");

        let specials = SpecialElectionsFile {
            metadata: SpecialsMetadata {
                last_updated: Some(date("2026-08-01")),
                sources: vec!["Ballotpedia".to_string()],
                election_count: 3,
                by_level: [("federal".to_string(), 3usize)].into_iter().collect(),
                states_with_specials: vec!["MI".to_string(), "TX".to_string()],
            },
            special_elections: vec![
                special("tx-7-2026", "TX", "Texas", Some("2026-09-01")),
                special("mi-13-2026", "MI", "Michigan", Some("2026-10-15")),
                special("tx-old-2026", "TX", "Texas", None),
            ],
            by_state: [
                ("MI".to_string(), vec!["mi-13-2026".to_string()]),
                (
                    "TX".to_string(),
                    vec!["tx-7-2026".to_string(), "tx-old-2026".to_string()],
                ),
            ]
            .into_iter()
            .collect(),
        };
        store
            .write_json(SPECIAL_ELECTIONS_FILE, &specials)
            .await
            .expect("write specials");

        let survey = SurveyFile {
            metadata: SurveyMetadata {
                source: "EAC".to_string(),
                dataset: "EAVS".to_string(),
                version: "1.0".to_string(),
                url: "https://eac.example".to_string(),
                notes: String::new(),
            },
            states: [
                ("MI".to_string(), survey_state("MI", "Michigan", 1000, 500)),
                ("CA".to_string(), survey_state("CA", "California", 2000, 1200)),
            ]
            .into_iter()
            .collect(),
        };
        store
            .write_json(SURVEY_FILE, &survey)
            .await
            .expect("write survey");

        (dir, store)
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);
        let today = date("2026-07-31");

        let lower = engine.next_election("mi", today).await.unwrap();
        let upper = engine.next_election("MI", today).await.unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower["state"], "MI");
        assert_eq!(lower["next_primary"], "2026-08-04");
        assert_eq!(lower["primary_days_until"], 4);
        assert_eq!(lower["sources"]["sos_url"], "https://sos.example");
    }

    #[tokio::test]
    async fn unknown_state_is_a_distinct_not_found() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let err = engine.next_election("zz", date("2026-07-31")).await.unwrap_err();
        assert!(matches!(err, QueryError::StateNotFound(ref code) if code == "ZZ"));
        assert_eq!(err.to_string(), "State 'ZZ' not found");
    }

    #[tokio::test]
    async fn days_until_is_signed_for_past_dates() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let result = engine.next_election("TX", date("2026-07-31")).await.unwrap();
        assert_eq!(result["primary_days_until"], -150);
    }

    #[tokio::test]
    async fn date_range_is_inclusive_on_both_ends_and_sorted() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        // Window exactly [primary, general]: both endpoints included.
        let result = engine
            .elections_by_date_range(Some("2026-08-04"), Some("2026-11-03"), date("2026-07-31"))
            .await
            .unwrap();
        let elections = result["elections"].as_array().unwrap();
        assert_eq!(result["elections_count"], 5);
        assert_eq!(elections[0]["date"], "2026-08-04");
        assert_eq!(elections.last().unwrap()["date"], "2026-11-03");

        // Two states share the primary date; dataset order (MI before AZ)
        // is preserved by the stable sort.
        assert_eq!(elections[0]["state"], "MI");
        assert_eq!(elections[1]["state"], "AZ");
    }

    #[tokio::test]
    async fn malformed_range_dates_are_invalid_input() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let err = engine
            .elections_by_date_range(Some("08/04/2026"), Some("2026-11-03"), date("2026-07-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidDate(_)));

        let err = engine
            .elections_by_date_range(None, Some("2026-11-03"), date("2026-07-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidDate(_)));
    }

    #[tokio::test]
    async fn upcoming_specials_window_is_inclusive_and_skips_undated() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);
        let today = date("2026-08-01");

        // 2026-09-01 is exactly 31 days out; a 31-day window includes it.
        let result = engine.upcoming_special_elections(31, today).await.unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["special_elections"][0]["id"], "tx-7-2026");
        assert_eq!(result["special_elections"][0]["days_until"], 31);

        // 90 days picks up both dated specials; the undated one never shows.
        let result = engine
            .upcoming_special_elections(DEFAULT_SPECIALS_WINDOW_DAYS, today)
            .await
            .unwrap();
        assert_eq!(result["count"], 2);

        // A special already past the window's zero lower bound is excluded.
        let result = engine
            .upcoming_special_elections(90, date("2026-09-02"))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["special_elections"][0]["id"], "mi-13-2026");
    }

    #[tokio::test]
    async fn combined_view_merges_regular_and_specials_for_state() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let result = engine
            .election_with_specials("tx", date("2026-08-01"))
            .await
            .unwrap();
        assert_eq!(result["state"], "TX");
        assert_eq!(result["regular_elections"]["next_primary"]["date"], "2026-03-03");
        assert_eq!(result["special_elections_count"], 2);
    }

    #[tokio::test]
    async fn combined_range_tags_categories_and_respects_toggle() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);
        let today = date("2026-08-01");

        let with = engine
            .all_elections_by_date_range(Some("2026-08-15"), Some("2026-10-31"), true, today)
            .await
            .unwrap();
        let elections = with["elections"].as_array().unwrap();
        assert_eq!(with["elections_count"], 2);
        assert!(elections.iter().all(|e| e["category"] == "special"));
        assert_eq!(elections[0]["date"], "2026-09-01");
        assert_eq!(elections[0]["type"], "general");
        assert_eq!(elections[0]["office"], "US House");

        let without = engine
            .all_elections_by_date_range(Some("2026-08-15"), Some("2026-10-31"), false, today)
            .await
            .unwrap();
        assert_eq!(without["elections_count"], 0);
    }

    #[tokio::test]
    async fn specials_listing_for_state_without_specials_is_empty_success() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let result = engine.special_elections_by_state("az").await.unwrap();
        assert_eq!(result["state_code"], "AZ");
        assert_eq!(result["special_elections_count"], 0);
    }

    #[tokio::test]
    async fn eavs_lookup_comparison_and_national_summary() {
        let (_dir, store) = fixture_store().await;
        let engine = QueryEngine::new(store);

        let mi = engine.eavs_for_state("mi").await.unwrap();
        assert_eq!(mi["state_code"], "MI");
        assert_eq!(mi["voter_registration"]["total_registered"], 1000);

        let err = engine.eavs_for_state("WY").await.unwrap_err();
        assert!(matches!(err, QueryError::EavsNotAvailable(_)));

        let comparison = engine
            .eavs_comparison(&["mi".to_string(), "ca".to_string(), "wy".to_string()])
            .await
            .unwrap();
        assert_eq!(comparison["states_compared"], 2);

        let national = engine.national_summary().await.unwrap();
        let summary = &national["national_summary"];
        assert_eq!(summary["total_registered"], 3000);
        assert_eq!(summary["total_ballots_cast"], 1700);
        assert_eq!(summary["national_turnout_percentage"], 56.7);
        assert_eq!(summary["states_reporting"], 2);
    }

    #[tokio::test]
    async fn missing_secondary_datasets_degrade_to_empty_results() {
        let dir = tempdir().expect("tempdir");
        let store = DatasetStore::new(dir.path());
        let dates = ElectionDatesFile {
            metadata: ElectionDatesMetadata {
                version: "1.0.0".to_string(),
                generated_at: "2026-07-02T08:00:00Z".parse().unwrap(),
                description: "test dataset".to_string(),
                year: 2026,
            },
            states: vec![record("MI", "Michigan", "2026-08-04", "2026-11-03")],
        };
        store.write_json(ELECTION_DATES_FILE, &dates).await.unwrap();

        let engine = QueryEngine::new(store);
        let result = engine
            .election_with_specials("MI", date("2026-08-01"))
            .await
            .unwrap();
        assert_eq!(result["special_elections_count"], 0);

        let metadata = engine.special_elections_metadata().await.unwrap();
        assert_eq!(metadata["states_with_specials"].as_array().unwrap().len(), 0);
    }

    async fn post_tool(app: Router, name: &str, args: Value) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(format!("/tools/{name}"))
                    .header("content-type", "application/json")
                    .body(Body::from(args.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&body).unwrap();
        (status, value)
    }

    fn payload_of(content: &Value) -> Value {
        assert_eq!(content[0]["type"], "text");
        serde_json::from_str(content[0]["text"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn shim_returns_single_text_content_payload() {
        let (_dir, store) = fixture_store().await;
        let app = app(AppState::new(store));

        let (status, content) =
            post_tool(app, "get_next_election", json!({"state_code": "mi"})).await;
        assert_eq!(status, StatusCode::OK);
        let payload = payload_of(&content);
        assert_eq!(payload["state"], "MI");
        assert_eq!(payload["state_name"], "Michigan");
    }

    #[tokio::test]
    async fn shim_renders_domain_errors_as_structured_payloads() {
        let (_dir, store) = fixture_store().await;
        let router = app(AppState::new(store));

        let (status, content) = post_tool(
            router.clone(),
            "get_next_election",
            json!({"state_code": "ZZ"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload_of(&content)["error"], "State 'ZZ' not found");

        let (status, content) = post_tool(router, "get_moon_phase", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload_of(&content)["error"], "Unknown tool: get_moon_phase");
    }

    #[tokio::test]
    async fn shim_lists_the_full_tool_contract() {
        let (_dir, store) = fixture_store().await;
        let router = app(AppState::new(store));

        let resp = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let tools: Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<_> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"get_national_eavs_summary"));
        assert!(names.contains(&"get_all_elections_by_date_range"));
    }
}
