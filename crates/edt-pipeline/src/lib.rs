//! Batch pipeline: raw CSV/scraped inputs in, validated JSON datasets out.
//!
//! Three independent stages share this crate. The survey stage folds
//! jurisdiction-level EAVS rows into per-state totals and derived rates. The
//! validation stage reconciles the authoritative statute table against the
//! best-effort scrape observations. The specials stage validates the curated
//! special-elections table under an all-or-nothing gate. Each stage ends in
//! an atomic dataset write; the query engine only ever sees finished
//! snapshots.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use edt_core::{
    state_name, Confidence, Discrepancy, ElectionDateEntry, ElectionDatesFile,
    ElectionDatesMetadata, Level, SourceRef, SpecialDates, SpecialElection, SpecialElectionsFile,
    SpecialStatus, SpecialsMetadata, StateElectionRecord, StateSurveyAggregate, StatuteRule,
    SurveyFile, SurveyMetadata, Validation, ValidationStatus,
};
use edt_scrape::{load_source_registry, SosScraper};
use edt_storage::{
    DatasetStore, HttpClientConfig, HttpFetcher, ScrapeResults, StoredDataset,
    ELECTION_DATES_FILE, SCRAPE_RESULTS_FILE, SPECIAL_ELECTIONS_FILE, SURVEY_FILE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "edt-pipeline";

/// A raw tabular row keyed by header name. Both the survey CSV and the
/// specials CSV come through here.
pub type CsvRow = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Value normalizer
// ---------------------------------------------------------------------------

/// The survey's "data not available" markers. Negative numeric codes are
/// sentinels too, caught after numeric coercion. This is the only place the
/// sentinel set is defined; every aggregation site goes through
/// [`normalize_count`].
pub const NOT_AVAILABLE_SENTINELS: &[&str] = &["-88", "-99", "-77", "DNA (DATA NOT AVAILABLE)", ""];

/// Normalize one raw survey field to a clean count. Sentinels, negative
/// values, and unparseable garbage all map to `None`; this never fails.
pub fn normalize_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if NOT_AVAILABLE_SENTINELS.contains(&trimmed) {
        return None;
    }
    let parsed: f64 = trimmed.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    let truncated = parsed as i64;
    if truncated < 0 {
        return None;
    }
    Some(truncated as u64)
}

// ---------------------------------------------------------------------------
// Survey aggregation
// ---------------------------------------------------------------------------

fn accumulate(slot: &mut Option<u64>, value: Option<u64>) {
    if let Some(v) = value {
        if v > 0 {
            *slot = Some(slot.unwrap_or(0) + v);
        }
    }
}

fn field<'a>(row: &'a CsvRow, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or("")
}

/// Fold one jurisdiction row into its state aggregate. Column letters follow
/// the EAC survey layout (section A registration, B UOCAVA, C mail voting,
/// D polling operations, E provisional, F turnout).
fn fold_jurisdiction_row(state: &mut StateSurveyAggregate, row: &CsvRow) {
    state.jurisdiction_count += 1;

    let vr = &mut state.voter_registration;
    accumulate(&mut vr.total_active, normalize_count(field(row, "A1b")));
    accumulate(&mut vr.total_inactive, normalize_count(field(row, "A1c")));
    accumulate(
        &mut vr.same_day_registrations,
        normalize_count(field(row, "A2a")),
    );

    let rt = &mut state.registration_transactions;
    accumulate(&mut rt.motor_vehicle, normalize_count(field(row, "A3a")));
    accumulate(&mut rt.by_mail, normalize_count(field(row, "A3b")));
    accumulate(&mut rt.online, normalize_count(field(row, "A3f")));
    accumulate(&mut rt.in_person, normalize_count(field(row, "A3g")));

    let uo = &mut state.uocava;
    accumulate(&mut uo.ballots_transmitted, normalize_count(field(row, "B3a")));
    accumulate(&mut uo.ballots_returned, normalize_count(field(row, "B4a")));
    accumulate(&mut uo.ballots_counted, normalize_count(field(row, "B5a")));

    let mv = &mut state.mail_voting;
    accumulate(&mut mv.ballots_transmitted, normalize_count(field(row, "C1a")));
    accumulate(&mut mv.ballots_returned, normalize_count(field(row, "C2a")));
    accumulate(&mut mv.ballots_rejected, normalize_count(field(row, "C3a")));
    accumulate(&mut mv.ballots_counted, normalize_count(field(row, "C6a")));

    let po = &mut state.polling;
    accumulate(&mut po.precincts, normalize_count(field(row, "D1a")));
    accumulate(&mut po.polling_places, normalize_count(field(row, "D2a")));
    accumulate(&mut po.poll_workers, normalize_count(field(row, "D7a")));

    let pr = &mut state.provisional;
    accumulate(&mut pr.ballots_submitted, normalize_count(field(row, "E1a")));
    accumulate(&mut pr.ballots_counted, normalize_count(field(row, "E2a")));
    accumulate(&mut pr.ballots_rejected, normalize_count(field(row, "E3a")));

    accumulate(
        &mut state.turnout.total_ballots_cast,
        normalize_count(field(row, "F1a")),
    );
}

/// Single-pass aggregation of jurisdiction rows into per-state totals.
/// Rows with a blank state code are skipped silently.
pub fn aggregate_survey<I>(rows: I) -> BTreeMap<String, StateSurveyAggregate>
where
    I: IntoIterator<Item = CsvRow>,
{
    let mut states: BTreeMap<String, StateSurveyAggregate> = BTreeMap::new();

    for row in rows {
        let state_code = field(&row, "State_Abbr").trim().to_string();
        if state_code.is_empty() {
            continue;
        }

        let state = states.entry(state_code.clone()).or_default();
        if state.state_code.is_empty() {
            state.state_code = state_code;
        }
        let full_name = field(&row, "State_Full").trim();
        if !full_name.is_empty() {
            state.state_name = full_name.to_string();
        }
        fold_jurisdiction_row(state, &row);
    }

    states
}

/// Round half away from zero at `digits` decimal places. Chosen as the one
/// rounding rule for every derived percentage; tests pin it.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

fn rate(numerator: Option<u64>, denominator: Option<u64>, digits: u32) -> Option<f64> {
    let denominator = denominator.unwrap_or(0);
    if denominator == 0 {
        return None;
    }
    let numerator = numerator.unwrap_or(0);
    Some(round_to(numerator as f64 / denominator as f64 * 100.0, digits))
}

/// Attach derived totals and percentage rates. A rate is present only when
/// its denominator is positive; no rate is ever zero-by-default.
pub fn calculate_derived_stats(state: &mut StateSurveyAggregate) {
    let vr = &mut state.voter_registration;
    let total_registered = vr.total_active.unwrap_or(0) + vr.total_inactive.unwrap_or(0);
    vr.total_registered = (total_registered > 0).then_some(total_registered);

    let mv = &mut state.mail_voting;
    mv.return_rate = rate(mv.ballots_returned, mv.ballots_transmitted, 1);
    mv.rejection_rate = rate(mv.ballots_rejected, mv.ballots_returned, 2);

    let pr = &mut state.provisional;
    pr.count_rate = rate(pr.ballots_counted, pr.ballots_submitted, 1);

    let ballots_cast = state.turnout.total_ballots_cast.unwrap_or(0);
    state.turnout.turnout_percentage = (total_registered > 0 && ballots_cast > 0)
        .then(|| round_to(ballots_cast as f64 / total_registered as f64 * 100.0, 1));
}

/// Display-layer pass: every numeric leaf equal to zero becomes null, so
/// "zero" and "not reported" render identically downstream. Explicit
/// recursive visitor over the mapping/leaf shape of the serialized tree.
pub fn clean_zeros(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, clean_zeros(v))).collect())
        }
        Value::Number(n) => {
            let is_zero = n.as_f64().is_some_and(|f| f == 0.0);
            if is_zero {
                Value::Null
            } else {
                Value::Number(n)
            }
        }
        other => other,
    }
}

/// Assemble the survey dataset: metadata, sorted states, zeros blanked.
pub fn build_survey_file(states: BTreeMap<String, StateSurveyAggregate>) -> Result<Value> {
    let file = SurveyFile {
        metadata: SurveyMetadata {
            source: "U.S. Election Assistance Commission (EAC)".to_string(),
            dataset: "2024 Election Administration and Voting Survey (EAVS)".to_string(),
            version: "1.0".to_string(),
            url: "https://www.eac.gov/research-and-data/studies-and-reports".to_string(),
            notes: "Data aggregated from jurisdiction-level reports".to_string(),
        },
        states,
    };
    let value = serde_json::to_value(&file).context("serializing survey dataset")?;
    Ok(clean_zeros(value))
}

// ---------------------------------------------------------------------------
// Statute/scrape validation
// ---------------------------------------------------------------------------

pub fn load_statute_rules(path: impl Into<PathBuf>) -> Result<Vec<StatuteRule>> {
    let path = path.into();
    let mut reader =
        csv::Reader::from_path(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut rules = Vec::new();
    for record in reader.deserialize() {
        let rule: StatuteRule =
            record.with_context(|| format!("parsing statute row in {}", path.display()))?;
        rules.push(rule);
    }
    Ok(rules)
}

const STATUTE_RESOLUTION: &str = "Using statute value (authoritative)";

/// Build one validated record per statute rule. A scrape observation, when
/// present, contributes a second source entry and discrepancy annotations;
/// the emitted dates and confidence are always the statute's.
pub fn validate_election_dates(
    statutes: &[StatuteRule],
    scraped: &ScrapeResults,
    today: NaiveDate,
) -> Vec<StateElectionRecord> {
    statutes
        .iter()
        .map(|statute| {
            let mut record = StateElectionRecord {
                state_code: statute.state_code.clone(),
                state_name: statute.state_name.clone(),
                next_primary: ElectionDateEntry {
                    date: statute.primary_date,
                    date_rule: statute.primary_date_rule.clone(),
                    kind: "state_primary".to_string(),
                    statute_reference: statute.statute_reference.clone(),
                    confidence: statute.confidence_level,
                },
                next_general: ElectionDateEntry {
                    date: statute.general_date,
                    date_rule: statute.general_date_rule.clone(),
                    kind: "general_election".to_string(),
                    statute_reference: statute.statute_reference.clone(),
                    confidence: statute.confidence_level,
                },
                sources: vec![SourceRef {
                    kind: "statute".to_string(),
                    reference: Some(statute.statute_reference.clone()),
                    url: statute.source_url.clone(),
                    calendar_url: None,
                    extracted_from: Some("Election Law Navigator / State Statutes".to_string()),
                    last_verified: None,
                }],
                validation: Validation {
                    status: ValidationStatus::Validated,
                    discrepancies: Vec::new(),
                },
                last_updated: today,
                notes: statute.notes.clone(),
            };

            if let Some(observation) = scraped.get(&statute.state_code) {
                record.sources.push(SourceRef {
                    kind: "sos_website".to_string(),
                    reference: None,
                    url: observation.sos_url.clone(),
                    calendar_url: Some(observation.calendar_url.clone()),
                    extracted_from: None,
                    last_verified: Some(observation.scraped_at.date_naive()),
                });

                if let Some(scraped_primary) = observation.primary_date {
                    if scraped_primary != statute.primary_date {
                        record.validation.discrepancies.push(Discrepancy {
                            field: "primary_date".to_string(),
                            statute_value: statute.primary_date,
                            scraped_value: scraped_primary,
                            resolution: STATUTE_RESOLUTION.to_string(),
                        });
                    }
                }

                if let Some(scraped_general) = observation.general_date {
                    if scraped_general != statute.general_date {
                        record.validation.discrepancies.push(Discrepancy {
                            field: "general_date".to_string(),
                            statute_value: statute.general_date,
                            scraped_value: scraped_general,
                            resolution: STATUTE_RESOLUTION.to_string(),
                        });
                    }
                }

                if !record.validation.discrepancies.is_empty() {
                    // Statute stays authoritative, so confidence is untouched.
                    record.validation.status = ValidationStatus::DiscrepancyResolved;
                }
            }

            record
        })
        .collect()
}

pub fn build_election_dates_file(
    states: Vec<StateElectionRecord>,
    generated_at: DateTime<Utc>,
    year: i32,
) -> ElectionDatesFile {
    ElectionDatesFile {
        metadata: ElectionDatesMetadata {
            version: "1.0.0".to_string(),
            generated_at,
            description: "Election dates for US states, validated against statutes and SOS websites"
                .to_string(),
            year,
        },
        states,
    }
}

// ---------------------------------------------------------------------------
// Special elections validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    /// 1-based CSV line (header is line 1).
    pub row: usize,
    pub id: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SpecialsError {
    #[error("{count} special-election rows failed validation; no dataset written")]
    BatchRejected { count: usize, errors: Vec<RowIssue> },
}

#[derive(Debug, Default)]
pub struct SpecialsValidation {
    pub elections: Vec<SpecialElection>,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
}

fn parse_enum<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

fn optional(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_row_date(
    row: &CsvRow,
    column: &str,
    errors: &mut Vec<String>,
) -> Option<NaiveDate> {
    let raw = field(row, column).trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(format!(
                "Invalid date format for {column}: {raw}. Use YYYY-MM-DD"
            ));
            None
        }
    }
}

const REQUIRED_SPECIAL_FIELDS: &[&str] =
    &["id", "state_code", "office", "level", "status", "confidence"];

/// Validate the curated special-elections rows. Hard errors exclude a row;
/// soft warnings are reported but keep the row. Rows with a blank id are
/// padding and skipped outright.
pub fn validate_special_rows<I>(rows: I) -> SpecialsValidation
where
    I: IntoIterator<Item = CsvRow>,
{
    let mut out = SpecialsValidation::default();

    for (index, row) in rows.into_iter().enumerate() {
        let line = index + 2;
        let id = field(&row, "id").trim().to_string();
        if id.is_empty() {
            continue;
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for required in REQUIRED_SPECIAL_FIELDS {
            if field(&row, required).trim().is_empty() {
                errors.push(format!("Missing required field: {required}"));
            }
        }

        let state_code = field(&row, "state_code").trim().to_string();
        if !state_code.is_empty() && !edt_core::is_state_code(&state_code) {
            errors.push(format!("Invalid state_code: {state_code}"));
        }

        let level_raw = field(&row, "level").trim();
        let level: Option<Level> = parse_enum(level_raw);
        if !level_raw.is_empty() && level.is_none() {
            errors.push(format!(
                "Invalid level: {level_raw}. Must be one of federal, state_legislative, statewide"
            ));
        }

        let status_raw = field(&row, "status").trim();
        let status: Option<SpecialStatus> = parse_enum(status_raw);
        if !status_raw.is_empty() && status.is_none() {
            errors.push(format!(
                "Invalid status: {status_raw}. Must be one of announced, scheduled, \
                 runoff_pending, completed, cancelled"
            ));
        }

        let confidence_raw = field(&row, "confidence").trim();
        let confidence: Option<Confidence> = parse_enum(confidence_raw);
        if !confidence_raw.is_empty() && confidence.is_none() {
            errors.push(format!(
                "Invalid confidence: {confidence_raw}. Must be one of High, Medium, Low"
            ));
        }

        let dates = SpecialDates {
            vacancy: parse_row_date(&row, "vacancy_date", &mut errors),
            primary: parse_row_date(&row, "primary_date", &mut errors),
            general: parse_row_date(&row, "general_date", &mut errors),
            runoff: parse_row_date(&row, "runoff_date", &mut errors),
        };

        let has_election_date = ["primary_date", "general_date", "runoff_date"]
            .iter()
            .any(|c| !field(&row, c).trim().is_empty());
        if !has_election_date
            && !matches!(
                status,
                Some(SpecialStatus::Announced) | Some(SpecialStatus::Cancelled)
            )
        {
            warnings.push("No election date specified (primary, general, or runoff)".to_string());
        }

        if !warnings.is_empty() {
            out.warnings.push(RowIssue {
                row: line,
                id: id.clone(),
                messages: warnings,
            });
        }

        if !errors.is_empty() {
            out.errors.push(RowIssue {
                row: line,
                id,
                messages: errors,
            });
            continue;
        }

        // All required fields present and valid past this point.
        let (Some(level), Some(status), Some(confidence)) = (level, status, confidence) else {
            continue;
        };

        let state_name_value = optional(field(&row, "state_name"))
            .or_else(|| state_name(&state_code).map(str::to_string))
            .unwrap_or_default();

        out.elections.push(SpecialElection {
            id,
            state_code,
            state_name: state_name_value,
            office: field(&row, "office").trim().to_string(),
            district: optional(field(&row, "district")),
            level,
            reason: optional(field(&row, "reason")),
            dates,
            status,
            confidence,
            source_url: optional(field(&row, "source_url")),
            notes: optional(field(&row, "notes")),
            next_date: None,
            next_date_type: None,
        });
    }

    out
}

fn level_key(level: Level) -> &'static str {
    match level {
        Level::Federal => "federal",
        Level::StateLegislative => "state_legislative",
        Level::Statewide => "statewide",
    }
}

/// Assemble the special-elections dataset. Any hard row error rejects the
/// whole batch; nothing is written in that case.
pub fn build_special_elections_file(
    validation: SpecialsValidation,
    today: NaiveDate,
) -> Result<SpecialElectionsFile, SpecialsError> {
    if !validation.errors.is_empty() {
        return Err(SpecialsError::BatchRejected {
            count: validation.errors.len(),
            errors: validation.errors,
        });
    }

    let mut elections = validation.elections;
    for election in &mut elections {
        let next = election.next_date_on(today);
        election.next_date = next.map(|(date, _)| date);
        election.next_date_type = next.map(|(_, kind)| kind);
    }

    // Stable sort: dated records ascending, undated after them, ties keep
    // input order.
    elections.sort_by_key(|e| (e.next_date.is_none(), e.next_date));

    let mut by_state: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut by_level: BTreeMap<String, usize> = BTreeMap::new();
    for election in &elections {
        by_state
            .entry(election.state_code.clone())
            .or_default()
            .push(election.id.clone());
        *by_level.entry(level_key(election.level).to_string()).or_default() += 1;
    }

    let metadata = SpecialsMetadata {
        last_updated: Some(today),
        sources: vec!["Ballotpedia".to_string(), "State SOS Websites".to_string()],
        election_count: elections.len(),
        by_level,
        states_with_specials: by_state.keys().cloned().collect(),
    };

    Ok(SpecialElectionsFile {
        metadata,
        special_elections: elections,
        by_state,
    })
}

// ---------------------------------------------------------------------------
// Pipeline orchestration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sources_file: PathBuf,
    pub survey_csv: PathBuf,
    pub statutes_csv: PathBuf,
    pub specials_csv: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub target_year: i32,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("EDT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        Self {
            sources_file: std::env::var("EDT_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("sources.yaml")),
            survey_csv: std::env::var("EDT_SURVEY_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("eavs_jurisdictions.csv")),
            statutes_csv: std::env::var("EDT_STATUTES_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("statute_rules.csv")),
            specials_csv: std::env::var("EDT_SPECIALS_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("special_elections.csv")),
            user_agent: std::env::var("EDT_USER_AGENT")
                .unwrap_or_else(|_| "edt-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("EDT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            target_year: std::env::var("EDT_TARGET_YEAR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2026),
            data_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub survey_states: usize,
    pub states_validated: usize,
    pub discrepancy_count: usize,
    pub special_elections: usize,
    pub datasets: Vec<StoredDataset>,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: DatasetStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let store = DatasetStore::new(config.data_dir.clone());
        Self { config, store }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    fn read_csv_rows(&self, path: &PathBuf) -> Result<Vec<CsvRow>> {
        let mut reader =
            csv::Reader::from_path(path).with_context(|| format!("reading {}", path.display()))?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: CsvRow =
                record.with_context(|| format!("parsing row in {}", path.display()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Survey stage: jurisdiction CSV -> `eavs_state_data.json`.
    pub async fn run_survey(&self) -> Result<StoredDataset> {
        let rows = self.read_csv_rows(&self.config.survey_csv)?;
        info!(rows = rows.len(), "loaded jurisdiction records");

        let mut states = aggregate_survey(rows);
        for state in states.values_mut() {
            calculate_derived_stats(state);
        }
        info!(states = states.len(), "aggregated survey data");

        let file = build_survey_file(states)?;
        let stored = self.store.write_json(SURVEY_FILE, &file).await?;
        info!(path = %stored.path.display(), hash = %stored.content_hash, "wrote survey dataset");
        Ok(stored)
    }

    /// Scrape stage: SOS calendars -> `sos_scraped.json`.
    pub async fn run_scrape(&self) -> Result<StoredDataset> {
        let run_id = Uuid::new_v4();
        let registry = load_source_registry(&self.config.sources_file)?;

        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.config.http_timeout_secs),
            user_agent: Some(self.config.user_agent.clone()),
        })?;
        let scraper = SosScraper::new(fetcher, self.config.target_year);

        let results = scraper.scrape_all(run_id, &registry.sources).await;
        info!(states = results.len(), "scrape run complete");

        let stored = self.store.write_json(SCRAPE_RESULTS_FILE, &results).await?;
        Ok(stored)
    }

    /// Validation stage: statute CSV + scrape results -> `election_dates.json`.
    pub async fn run_validate(&self) -> Result<StoredDataset> {
        let statutes = load_statute_rules(&self.config.statutes_csv)?;
        let scraped = self.store.load_scrape_results().await?;
        if scraped.is_empty() {
            warn!("no scrape results found; validating from statutes alone");
        }

        let now = Utc::now();
        let records = validate_election_dates(&statutes, &scraped, now.date_naive());
        let discrepancies: usize = records
            .iter()
            .map(|r| r.validation.discrepancies.len())
            .sum();
        info!(
            states = records.len(),
            discrepancies, "validated election dates"
        );

        let file = build_election_dates_file(records, now, self.config.target_year);
        let stored = self.store.write_json(ELECTION_DATES_FILE, &file).await?;
        Ok(stored)
    }

    /// Specials stage: curated CSV -> `special_elections.json`, or a batch
    /// rejection listing every bad row.
    pub async fn run_specials(&self) -> Result<StoredDataset> {
        let rows = self.read_csv_rows(&self.config.specials_csv)?;
        let validation = validate_special_rows(rows);

        for warning in &validation.warnings {
            warn!(
                row = warning.row,
                id = %warning.id,
                messages = ?warning.messages,
                "special-election row warning"
            );
        }
        for failure in &validation.errors {
            error!(
                row = failure.row,
                id = %failure.id,
                messages = ?failure.messages,
                "special-election row rejected"
            );
        }

        let file = build_special_elections_file(validation, Utc::now().date_naive())?;
        info!(
            elections = file.metadata.election_count,
            states = file.by_state.len(),
            "validated special elections"
        );

        let stored = self.store.write_json(SPECIAL_ELECTIONS_FILE, &file).await?;
        Ok(stored)
    }

    /// Full batch: survey, validation, and specials, reusing whatever scrape
    /// results are already on disk (run the scrape stage separately; it is
    /// the only network-touching step).
    pub async fn run_build(&self) -> Result<BuildSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let survey = self.run_survey().await?;
        let election_dates = self.run_validate().await?;
        let specials = self.run_specials().await?;

        let dates_file = self.store.load_election_dates().await?;
        let specials_file = self.store.load_special_elections().await?;
        let survey_file = self.store.load_survey().await?;

        Ok(BuildSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            survey_states: survey_file.states.len(),
            states_validated: dates_file.states.len(),
            discrepancy_count: dates_file
                .states
                .iter()
                .map(|s| s.validation.discrepancies.len())
                .sum(),
            special_elections: specials_file.metadata.election_count,
            datasets: vec![survey, election_dates, specials],
        })
    }
}
