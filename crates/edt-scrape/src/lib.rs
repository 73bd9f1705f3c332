//! Secretary-of-State calendar scraping.
//!
//! Fetches each state's public election calendar page, pulls date-like
//! substrings out of the text, and classifies them as primary or general by
//! the surrounding keywords. Everything here is best-effort: a failed fetch
//! or an unparseable page falls back to the hand-verified date table, and no
//! observation ever overrides the statute data downstream.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use edt_core::{CalendarType, DateMatch, ScrapeObservation, ScrapeSource, ScrapeStatus};
use edt_storage::{FetchError, HttpFetcher, ScrapeResults};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "edt-scrape";

/// Keywords that mark a date's context as a primary or general election.
const PRIMARY_KEYWORDS: &[&str] = &["primary", "primaries"];
const GENERAL_KEYWORDS: &[&str] = &["general", "november"];

/// Hand-verified 2026 dates (NCSL and official sources), used whenever a
/// page cannot be fetched or a date cannot be classified.
const KNOWN_2026_DATES: &[(&str, &str, &str)] = &[
    ("AL", "2026-05-19", "2026-11-03"),
    ("AK", "2026-08-18", "2026-11-03"),
    ("AZ", "2026-08-04", "2026-11-03"),
    ("AR", "2026-03-03", "2026-11-03"),
    ("CA", "2026-06-02", "2026-11-03"),
    ("CO", "2026-06-30", "2026-11-03"),
    ("CT", "2026-08-11", "2026-11-03"),
    ("DE", "2026-09-15", "2026-11-03"),
    ("FL", "2026-08-18", "2026-11-03"),
    ("GA", "2026-05-19", "2026-11-03"),
    ("HI", "2026-08-08", "2026-11-03"),
    ("ID", "2026-05-19", "2026-11-03"),
    ("IL", "2026-03-17", "2026-11-03"),
    ("IN", "2026-05-05", "2026-11-03"),
    ("IA", "2026-06-02", "2026-11-03"),
    ("KS", "2026-08-04", "2026-11-03"),
    ("KY", "2026-05-19", "2026-11-03"),
    ("LA", "2026-05-16", "2026-11-03"),
    ("ME", "2026-06-09", "2026-11-03"),
    ("MD", "2026-06-23", "2026-11-03"),
    ("MA", "2026-09-01", "2026-11-03"),
    ("MI", "2026-08-04", "2026-11-03"),
    ("MN", "2026-08-11", "2026-11-03"),
    ("MS", "2026-03-10", "2026-11-03"),
    ("MO", "2026-08-04", "2026-11-03"),
    ("MT", "2026-06-02", "2026-11-03"),
    ("NE", "2026-05-12", "2026-11-03"),
    ("NV", "2026-06-09", "2026-11-03"),
    ("NH", "2026-09-08", "2026-11-03"),
    ("NJ", "2026-06-02", "2026-11-03"),
    ("NM", "2026-06-02", "2026-11-03"),
    ("NY", "2026-06-23", "2026-11-03"),
    ("NC", "2026-03-03", "2026-11-03"),
    ("ND", "2026-06-09", "2026-11-03"),
    ("OH", "2026-05-05", "2026-11-03"),
    ("OK", "2026-06-16", "2026-11-03"),
    ("OR", "2026-05-19", "2026-11-03"),
    ("PA", "2026-05-19", "2026-11-03"),
    ("RI", "2026-09-08", "2026-11-03"),
    ("SC", "2026-06-09", "2026-11-03"),
    ("SD", "2026-06-02", "2026-11-03"),
    ("TN", "2026-08-06", "2026-11-03"),
    ("TX", "2026-03-03", "2026-11-03"),
    ("UT", "2026-06-23", "2026-11-03"),
    ("VT", "2026-08-11", "2026-11-03"),
    ("VA", "2026-06-16", "2026-11-03"),
    ("WA", "2026-08-04", "2026-11-03"),
    ("WV", "2026-05-12", "2026-11-03"),
    ("WI", "2026-08-11", "2026-11-03"),
    ("WY", "2026-08-18", "2026-11-03"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDates {
    pub primary: NaiveDate,
    pub general: NaiveDate,
}

pub fn known_dates(state_code: &str) -> Option<KnownDates> {
    let (_, primary, general) = KNOWN_2026_DATES
        .iter()
        .find(|(code, _, _)| *code == state_code)?;
    Some(KnownDates {
        primary: primary.parse().ok()?,
        general: general.parse().ok()?,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub state_code: String,
    pub state_name: String,
    pub sos_url: String,
    pub calendar_url: String,
    pub calendar_type: CalendarType,
    pub enabled: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn load_source_registry(path: impl AsRef<Path>) -> Result<SourceRegistry> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Capability seam: anything that can turn a URL into raw page text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        run_id: Uuid,
        state_code: &str,
        url: &str,
    ) -> Result<String, FetchError>;
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        run_id: Uuid,
        state_code: &str,
        url: &str,
    ) -> Result<String, FetchError> {
        self.fetch_text(run_id, state_code, url).await
    }
}

/// Flatten an HTML document to space-separated text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = name.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),?\s+(\d{4})",
        )
        .expect("date pattern compiles")
    })
}

/// Slice `text[start..end]` widened by `pad` bytes on each side, snapped to
/// char boundaries.
fn context_window(text: &str, start: usize, end: usize, pad: usize) -> &str {
    let mut lo = start.saturating_sub(pad);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + pad).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

/// Pull every "Month DD, YYYY" occurrence out of free text, keeping the
/// original match and a context window for later classification.
pub fn extract_dates_from_text(text: &str) -> Vec<DateMatch> {
    let mut dates = Vec::new();
    for caps in date_pattern().captures_iter(text) {
        let whole = caps.get(0).expect("whole match");
        let month = match month_number(&caps[1]) {
            Some(m) => m,
            None => continue,
        };
        let day: u32 = match caps[2].parse() {
            Ok(d) => d,
            Err(_) => continue,
        };
        let year: i32 = match caps[3].parse() {
            Ok(y) => y,
            Err(_) => continue,
        };
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        dates.push(DateMatch {
            date,
            original: whole.as_str().to_string(),
            context: context_window(text, whole.start(), whole.end(), 50).to_string(),
        });
    }
    dates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionKind {
    Primary,
    General,
}

/// Decide whether a date's surrounding text is talking about a primary or a
/// general election. Primary keywords win when both appear.
pub fn classify_context(context: &str) -> Option<ElectionKind> {
    let lower = context.to_lowercase();
    if PRIMARY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(ElectionKind::Primary);
    }
    if GENERAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(ElectionKind::General);
    }
    None
}

pub struct SosScraper<F: PageFetcher> {
    fetcher: F,
    target_year: i32,
}

impl<F: PageFetcher> SosScraper<F> {
    pub fn new(fetcher: F, target_year: i32) -> Self {
        Self {
            fetcher,
            target_year,
        }
    }

    /// Scrape one state's calendar page into an observation. Never fails:
    /// fetch or parse trouble degrades to the known-dates table.
    pub async fn scrape_state(
        &self,
        run_id: Uuid,
        source: &SourceConfig,
        scraped_at: DateTime<Utc>,
    ) -> ScrapeObservation {
        let known = known_dates(&source.state_code);

        let mut observation = ScrapeObservation {
            state_code: source.state_code.clone(),
            state_name: source.state_name.clone(),
            sos_url: source.sos_url.clone(),
            calendar_url: source.calendar_url.clone(),
            calendar_type: source.calendar_type,
            scraped_at,
            dates_found: Vec::new(),
            primary_date: None,
            general_date: None,
            scrape_status: ScrapeStatus::Completed,
            source: ScrapeSource::Scraped,
            notes: None,
        };

        if source.calendar_type == CalendarType::Pdf {
            observation.scrape_status = ScrapeStatus::SkippedPdf;
            observation.source = ScrapeSource::KnownDates;
            observation.notes = Some("PDF calendar - using known dates instead".to_string());
            observation.primary_date = known.map(|k| k.primary);
            observation.general_date = known.map(|k| k.general);
            return observation;
        }

        let html = match self
            .fetcher
            .fetch_page(run_id, &source.state_code, &source.calendar_url)
            .await
        {
            Ok(html) => html,
            Err(err) => {
                warn!(
                    state_code = %source.state_code,
                    url = %source.calendar_url,
                    error = %err,
                    "calendar fetch failed, falling back to known dates"
                );
                observation.scrape_status = ScrapeStatus::FetchFailed;
                observation.source = ScrapeSource::KnownDatesFallback;
                observation.primary_date = known.map(|k| k.primary);
                observation.general_date = known.map(|k| k.general);
                return observation;
            }
        };

        let text = html_to_text(&html);
        observation.dates_found = extract_dates_from_text(&text);

        for date_match in &observation.dates_found {
            if date_match.date.year() != self.target_year {
                continue;
            }
            match classify_context(&date_match.context) {
                Some(ElectionKind::Primary) if observation.primary_date.is_none() => {
                    observation.primary_date = Some(date_match.date);
                }
                Some(ElectionKind::General) if observation.general_date.is_none() => {
                    observation.general_date = Some(date_match.date);
                }
                _ => {}
            }
        }

        if observation.primary_date.is_none() || observation.general_date.is_none() {
            if observation.primary_date.is_none() {
                observation.primary_date = known.map(|k| k.primary);
            }
            if observation.general_date.is_none() {
                observation.general_date = known.map(|k| k.general);
            }
            observation.source = ScrapeSource::PartialScrapeWithKnown;
        }

        observation
    }

    /// Scrape every enabled source sequentially. One state's failure never
    /// blocks the rest; each state gets its own observation either way.
    pub async fn scrape_all(&self, run_id: Uuid, sources: &[SourceConfig]) -> ScrapeResults {
        let mut results = ScrapeResults::new();
        for source in sources.iter().filter(|s| s.enabled) {
            let observation = self.scrape_state(run_id, source, Utc::now()).await;
            info!(
                state_code = %observation.state_code,
                status = ?observation.scrape_status,
                primary = ?observation.primary_date,
                general = ?observation.general_date,
                "scraped state calendar"
            );
            results.insert(source.state_code.clone(), observation);
        }
        results
    }
}
