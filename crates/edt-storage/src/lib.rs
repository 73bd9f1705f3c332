//! Dataset snapshot storage + HTTP fetch utilities for the election tracker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use edt_core::{ElectionDatesFile, ScrapeObservation, SpecialElectionsFile, SurveyFile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info_span;
use uuid::Uuid;

pub const CRATE_NAME: &str = "edt-storage";

pub const ELECTION_DATES_FILE: &str = "election_dates.json";
pub const SPECIAL_ELECTIONS_FILE: &str = "special_elections.json";
pub const SURVEY_FILE: &str = "eavs_state_data.json";
pub const SCRAPE_RESULTS_FILE: &str = "sos_scraped.json";

/// Scrape results are keyed by state code on disk.
pub type ScrapeResults = BTreeMap<String, ScrapeObservation>;

#[derive(Debug, Clone, Serialize)]
pub struct StoredDataset {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
}

/// Reads and writes the persisted JSON datasets under a single directory.
/// Writes go through a temp file + rename so readers never observe a
/// half-written snapshot.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub async fn write_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> anyhow::Result<StoredDataset> {
        let mut bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing dataset {name}"))?;
        bytes.push(b'\n');
        let content_hash = Self::sha256_hex(&bytes);
        let path = self.dataset_path(name);

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating dataset directory {}", self.root.display()))?;

        let temp_path = self.root.join(format!(".{}.{name}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp dataset file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp dataset file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp dataset file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &path).await {
            Ok(()) => Ok(StoredDataset {
                content_hash,
                path,
                byte_size: bytes.len(),
            }),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp dataset {} -> {}",
                        temp_path.display(),
                        path.display()
                    )
                })
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.dataset_path(name);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        let value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    /// The primary dataset: absent is an error, not an empty default.
    pub async fn load_election_dates(&self) -> anyhow::Result<ElectionDatesFile> {
        self.read_json(ELECTION_DATES_FILE)
            .await?
            .with_context(|| {
                format!(
                    "dataset {} not found under {}",
                    ELECTION_DATES_FILE,
                    self.root.display()
                )
            })
    }

    /// Secondary dataset: absent reads as an empty set.
    pub async fn load_special_elections(&self) -> anyhow::Result<SpecialElectionsFile> {
        Ok(self
            .read_json(SPECIAL_ELECTIONS_FILE)
            .await?
            .unwrap_or_default())
    }

    /// Secondary dataset: absent reads as an empty set.
    pub async fn load_survey(&self) -> anyhow::Result<SurveyFile> {
        Ok(self.read_json(SURVEY_FILE).await?.unwrap_or_default())
    }

    /// Secondary dataset: absent reads as an empty set.
    pub async fn load_scrape_results(&self) -> anyhow::Result<ScrapeResults> {
        Ok(self
            .read_json(SCRAPE_RESULTS_FILE)
            .await?
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-attempt page fetcher with a per-request timeout. Callers fall back
/// to static known-good data on failure rather than retrying.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_text(
        &self,
        run_id: Uuid,
        state_code: &str,
        url: &str,
    ) -> Result<String, FetchError> {
        let span = info_span!("http_fetch", %run_id, state_code, url);
        let _guard = span.enter();

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edt_core::{SpecialsMetadata, SurveyMetadata};
    use tempfile::tempdir;

    #[test]
    fn dataset_hashing_is_stable() {
        let hash = DatasetStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn write_then_load_round_trips_and_overwrites_atomically() {
        let dir = tempdir().expect("tempdir");
        let store = DatasetStore::new(dir.path());

        let mut file = SpecialElectionsFile::default();
        file.metadata = SpecialsMetadata {
            last_updated: Some("2026-08-01".parse().unwrap()),
            sources: vec!["Ballotpedia".into()],
            election_count: 0,
            by_level: Default::default(),
            states_with_specials: vec![],
        };

        let first = store
            .write_json(SPECIAL_ELECTIONS_FILE, &file)
            .await
            .expect("first write");
        assert!(first.path.exists());
        assert!(first.byte_size > 0);

        file.metadata.sources.push("State SOS Websites".into());
        let second = store
            .write_json(SPECIAL_ELECTIONS_FILE, &file)
            .await
            .expect("second write");
        assert_ne!(first.content_hash, second.content_hash);

        let loaded = store.load_special_elections().await.expect("load");
        assert_eq!(loaded.metadata.sources.len(), 2);

        // No temp droppings left behind after the rename.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_secondary_datasets_read_as_empty_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = DatasetStore::new(dir.path());

        let specials = store.load_special_elections().await.expect("specials");
        assert!(specials.special_elections.is_empty());
        assert!(specials.by_state.is_empty());

        let survey = store.load_survey().await.expect("survey");
        assert_eq!(survey.metadata, SurveyMetadata::default());
        assert!(survey.states.is_empty());

        let scraped = store.load_scrape_results().await.expect("scraped");
        assert!(scraped.is_empty());
    }

    #[tokio::test]
    async fn missing_primary_dataset_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let store = DatasetStore::new(dir.path());
        let err = store.load_election_dates().await.unwrap_err();
        assert!(err.to_string().contains(ELECTION_DATES_FILE));
    }
}
