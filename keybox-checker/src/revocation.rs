//! Revocation list retrieval.
//!
//! The attestation status feed has no fixed schema, so the body is decoded
//! permissively into a small set of known shapes and every serial-like
//! string found is normalized. Every source here is fail-open: a failed
//! fetch produces an empty set together with [`FetchOutcome::Failed`].

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::certificate::normalize_serial;
use crate::config::CheckerConfig;
use crate::error::{FetchError, KeyboxResult};

/// Keys consulted, in order, on object entries of a list-shaped feed.
const SERIAL_KEYS: [&str; 3] = ["serial", "serialNumber", "serial_number"];

/// Normalized serial numbers considered revoked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationSet {
    serials: HashSet<String>,
}

impl RevocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a serial, normalizing it first.
    pub fn insert(&mut self, serial: &str) -> bool {
        self.serials.insert(normalize_serial(serial))
    }

    /// Membership test. `serial` must already be normalized.
    pub fn contains(&self, serial: &str) -> bool {
        self.serials.contains(serial)
    }

    pub fn len(&self) -> usize {
        self.serials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.serials.iter().map(String::as_str)
    }

    /// Parse a feed body.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the body is not valid JSON at all. Valid
    /// JSON of an unknown shape yields an empty set.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let feed: StatusFeed = serde_json::from_slice(body)?;
        Ok(feed.into())
    }
}

impl<S: AsRef<str>> FromIterator<S> for RevocationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for serial in iter {
            set.insert(serial.as_ref());
        }
        set
    }
}

/// Accepted top-level shapes of the status feed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusFeed {
    /// `["1A2B", {"serial": "FF"}, ...]`
    List(Vec<FeedEntry>),
    /// `{"revoked": ["1A2B", ...], ...}`
    Object(Map<String, Value>),
    Unrecognized(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedEntry {
    Serial(String),
    Record(Map<String, Value>),
    Unrecognized(serde::de::IgnoredAny),
}

impl FeedEntry {
    fn serial(&self) -> Option<&str> {
        match self {
            FeedEntry::Serial(serial) => Some(serial.as_str()),
            // first non-null key wins, and only a string value counts
            FeedEntry::Record(record) => SERIAL_KEYS
                .iter()
                .find_map(|key| record.get(*key).filter(|v| !v.is_null()))
                .and_then(Value::as_str),
            FeedEntry::Unrecognized(_) => None,
        }
    }
}

impl From<StatusFeed> for RevocationSet {
    fn from(feed: StatusFeed) -> Self {
        let mut set = RevocationSet::new();
        match feed {
            StatusFeed::List(entries) => {
                for serial in entries.iter().filter_map(FeedEntry::serial) {
                    set.insert(serial);
                }
            }
            StatusFeed::Object(fields) => {
                for serial in fields
                    .values()
                    .filter_map(Value::as_array)
                    .flatten()
                    .filter_map(Value::as_str)
                {
                    set.insert(serial);
                }
            }
            StatusFeed::Unrecognized(_) => {}
        }
        set
    }
}

/// How the revocation set for a check was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The feed was retrieved and listed at least one serial.
    Fetched,
    /// The feed was retrieved but listed no serials.
    Empty,
    /// The feed could not be retrieved or decoded; the set is empty.
    Failed { reason: String },
}

impl FetchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }
}

/// A revocation set together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationFetch {
    pub serials: RevocationSet,
    pub outcome: FetchOutcome,
}

impl RevocationFetch {
    fn from_result(result: Result<RevocationSet, FetchError>, source: &str) -> Self {
        match result {
            Ok(serials) => {
                let outcome = if serials.is_empty() {
                    FetchOutcome::Empty
                } else {
                    FetchOutcome::Fetched
                };
                tracing::info!(source, entries = serials.len(), "revocation list loaded");
                Self { serials, outcome }
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "revocation list unavailable, treating nothing as revoked");
                Self {
                    serials: RevocationSet::new(),
                    outcome: FetchOutcome::Failed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

/// Somewhere a revocation list can be loaded from.
///
/// Implementations never fail: problems are reported through
/// [`FetchOutcome::Failed`] with an empty set.
#[async_trait]
pub trait RevocationSource: Send + Sync {
    async fn fetch(&self) -> RevocationFetch;
}

/// The remote attestation status feed.
pub struct HttpRevocationSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRevocationSource {
    /// Use an existing client; its timeout bounds the fetch.
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Build a client from `config` and point it at the configured feed.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the HTTP client cannot be
    /// constructed.
    pub fn from_config(config: &CheckerConfig) -> KeyboxResult<Self> {
        config.validate()?;
        Ok(Self::new(config.build_client()?, config.status_url.clone()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn try_fetch(&self) -> Result<RevocationSet, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.bytes().await?;
        Ok(RevocationSet::from_json_slice(&body)?)
    }
}

#[async_trait]
impl RevocationSource for HttpRevocationSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> RevocationFetch {
        RevocationFetch::from_result(self.try_fetch().await, &self.url)
    }
}

/// A revocation list in the feed's JSON format stored on disk.
pub struct FileRevocationSource {
    path: PathBuf,
}

impl FileRevocationSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn try_load(&self) -> Result<RevocationSet, FetchError> {
        let body = tokio::fs::read(&self.path).await?;
        Ok(RevocationSet::from_json_slice(&body)?)
    }
}

#[async_trait]
impl RevocationSource for FileRevocationSource {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> RevocationFetch {
        let source = self.path.display().to_string();
        RevocationFetch::from_result(self.try_load().await, &source)
    }
}
