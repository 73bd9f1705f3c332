//! Core domain model for the election date tracker.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "edt-core";

/// Two-letter code to full name for the 50 states plus DC.
pub const STATE_NAMES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
];

pub fn state_name(code: &str) -> Option<&'static str> {
    STATE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn is_state_code(code: &str) -> bool {
    state_name(code).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One row of the authoritative statute-rules table. Immutable once loaded;
/// the set of statute rules defines which states appear in the final dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteRule {
    pub state_code: String,
    pub state_name: String,
    pub primary_date_rule: String,
    #[serde(rename = "primary_date_2026")]
    pub primary_date: NaiveDate,
    pub general_date_rule: String,
    #[serde(rename = "general_date_2026")]
    pub general_date: NaiveDate,
    pub statute_reference: String,
    pub source_url: String,
    pub confidence_level: Confidence,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarType {
    Html,
    Pdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Completed,
    FetchFailed,
    SkippedPdf,
}

/// Where an observation's primary/general dates ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeSource {
    Scraped,
    KnownDates,
    KnownDatesFallback,
    PartialScrapeWithKnown,
}

/// A date-like substring pulled out of a calendar page, with enough
/// surrounding text to classify it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub original: String,
    pub context: String,
}

/// Best-effort observation of one state's calendar page. Non-authoritative:
/// only ever corroborates or flags a discrepancy against the statute rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeObservation {
    pub state_code: String,
    pub state_name: String,
    pub sos_url: String,
    pub calendar_url: String,
    pub calendar_type: CalendarType,
    pub scraped_at: DateTime<Utc>,
    pub dates_found: Vec<DateMatch>,
    pub primary_date: Option<NaiveDate>,
    pub general_date: Option<NaiveDate>,
    pub scrape_status: ScrapeStatus,
    pub source: ScrapeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionDateEntry {
    pub date: NaiveDate,
    pub date_rule: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub statute_reference: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub statute_value: NaiveDate,
    pub scraped_value: NaiveDate,
    pub resolution: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Validated,
    DiscrepancyResolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub status: ValidationStatus,
    pub discrepancies: Vec<Discrepancy>,
}

/// Final per-state record in `election_dates.json`. Dates and confidence are
/// always the statute's; scrape data only ever annotates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateElectionRecord {
    pub state_code: String,
    pub state_name: String,
    pub next_primary: ElectionDateEntry,
    pub next_general: ElectionDateEntry,
    pub sources: Vec<SourceRef>,
    pub validation: Validation,
    pub last_updated: NaiveDate,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionDatesMetadata {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub description: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionDatesFile {
    pub metadata: ElectionDatesMetadata,
    pub states: Vec<StateElectionRecord>,
}

impl ElectionDatesFile {
    pub fn state(&self, code: &str) -> Option<&StateElectionRecord> {
        let code = code.to_ascii_uppercase();
        self.states.iter().find(|s| s.state_code == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Federal,
    StateLegislative,
    Statewide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialStatus {
    Announced,
    Scheduled,
    RunoffPending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextDateType {
    Primary,
    General,
    Runoff,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialDates {
    pub vacancy: Option<NaiveDate>,
    pub primary: Option<NaiveDate>,
    pub general: Option<NaiveDate>,
    pub runoff: Option<NaiveDate>,
}

/// One individually-curated special election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialElection {
    pub id: String,
    pub state_code: String,
    pub state_name: String,
    pub office: String,
    pub district: Option<String>,
    pub level: Level,
    pub reason: Option<String>,
    pub dates: SpecialDates,
    pub status: SpecialStatus,
    pub confidence: Confidence,
    pub source_url: Option<String>,
    pub notes: Option<String>,
    pub next_date: Option<NaiveDate>,
    pub next_date_type: Option<NextDateType>,
}

impl SpecialElection {
    /// Earliest of the primary/general/runoff dates on or after `today`.
    /// The vacancy date never qualifies; it is context, not an election.
    pub fn next_date_on(&self, today: NaiveDate) -> Option<(NaiveDate, NextDateType)> {
        let candidates = [
            (self.dates.primary, NextDateType::Primary),
            (self.dates.general, NextDateType::General),
            (self.dates.runoff, NextDateType::Runoff),
        ];
        candidates
            .into_iter()
            .filter_map(|(date, kind)| date.map(|d| (d, kind)))
            .filter(|(d, _)| *d >= today)
            .min_by_key(|(d, _)| *d)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialsMetadata {
    pub last_updated: Option<NaiveDate>,
    pub sources: Vec<String>,
    pub election_count: usize,
    pub by_level: BTreeMap<String, usize>,
    pub states_with_specials: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialElectionsFile {
    pub metadata: SpecialsMetadata,
    pub special_elections: Vec<SpecialElection>,
    pub by_state: BTreeMap<String, Vec<String>>,
}

impl SpecialElectionsFile {
    pub fn for_state(&self, code: &str) -> Vec<&SpecialElection> {
        let code = code.to_ascii_uppercase();
        self.special_elections
            .iter()
            .filter(|e| e.state_code == code)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoterRegistration {
    pub total_active: Option<u64>,
    pub total_inactive: Option<u64>,
    pub same_day_registrations: Option<u64>,
    pub total_registered: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationTransactions {
    pub motor_vehicle: Option<u64>,
    pub online: Option<u64>,
    pub by_mail: Option<u64>,
    pub in_person: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailVoting {
    pub ballots_transmitted: Option<u64>,
    pub ballots_returned: Option<u64>,
    pub ballots_rejected: Option<u64>,
    pub ballots_counted: Option<u64>,
    pub return_rate: Option<f64>,
    pub rejection_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Uocava {
    pub ballots_transmitted: Option<u64>,
    pub ballots_returned: Option<u64>,
    pub ballots_counted: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polling {
    pub precincts: Option<u64>,
    pub polling_places: Option<u64>,
    pub poll_workers: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provisional {
    pub ballots_submitted: Option<u64>,
    pub ballots_counted: Option<u64>,
    pub ballots_rejected: Option<u64>,
    pub count_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turnout {
    pub total_ballots_cast: Option<u64>,
    pub turnout_percentage: Option<f64>,
}

/// Per-state survey totals. Every numeric leaf is either a non-negative
/// count or absent; sentinel codes never survive past the value normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSurveyAggregate {
    pub state_code: String,
    pub state_name: String,
    pub jurisdiction_count: u64,
    pub voter_registration: VoterRegistration,
    pub registration_transactions: RegistrationTransactions,
    pub mail_voting: MailVoting,
    pub uocava: Uocava,
    pub polling: Polling,
    pub provisional: Provisional,
    pub turnout: Turnout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyMetadata {
    pub source: String,
    pub dataset: String,
    pub version: String,
    pub url: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyFile {
    pub metadata: SurveyMetadata,
    pub states: BTreeMap<String, StateSurveyAggregate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn state_table_lookup() {
        assert_eq!(state_name("MI"), Some("Michigan"));
        assert_eq!(state_name("DC"), Some("District of Columbia"));
        assert_eq!(state_name("ZZ"), None);
        assert!(is_state_code("TX"));
        assert!(!is_state_code("tx"));
    }

    #[test]
    fn next_date_picks_earliest_future_election_date() {
        let special = SpecialElection {
            id: "tx-18-2025".into(),
            state_code: "TX".into(),
            state_name: "Texas".into(),
            office: "US House".into(),
            district: Some("18".into()),
            level: Level::Federal,
            reason: None,
            dates: SpecialDates {
                vacancy: None,
                primary: Some(date("2026-01-10")),
                general: Some(date("2026-03-01")),
                runoff: Some(date("2026-04-15")),
            },
            status: SpecialStatus::Scheduled,
            confidence: Confidence::High,
            source_url: None,
            notes: None,
            next_date: None,
            next_date_type: None,
        };

        // Primary already past: the general is next, not the runoff.
        let (next, kind) = special.next_date_on(date("2026-02-01")).unwrap();
        assert_eq!(next, date("2026-03-01"));
        assert_eq!(kind, NextDateType::General);

        // All past: no next date.
        assert_eq!(special.next_date_on(date("2026-05-01")), None);

        // A date exactly on the processing date still qualifies.
        let (next, kind) = special.next_date_on(date("2026-04-15")).unwrap();
        assert_eq!(next, date("2026-04-15"));
        assert_eq!(kind, NextDateType::Runoff);
    }

    #[test]
    fn level_and_status_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&Level::StateLegislative).unwrap(),
            "\"state_legislative\""
        );
        assert_eq!(
            serde_json::to_string(&SpecialStatus::RunoffPending).unwrap(),
            "\"runoff_pending\""
        );
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"High\"");
    }
}
