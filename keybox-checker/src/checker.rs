//! End-to-end keybox check: parse and fetch concurrently, then match.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::CheckerConfig;
use crate::error::{KeyboxError, KeyboxResult};
use crate::matcher::{match_revocations, CertificateVerdict};
use crate::parser::{parse_keybox, SkippedFragment};
use crate::revocation::{FetchOutcome, HttpRevocationSource, RevocationSource};

/// Everything one check produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Verdicts in document order.
    pub certificates: Vec<CertificateVerdict>,
    pub strong_integrity: bool,
    /// Where the revocation set came from. A failed fetch still yields
    /// `strong_integrity` as if nothing were revoked.
    pub fetch: FetchOutcome,
    /// Certificate fragments that could not be decoded or parsed.
    pub skipped_fragments: Vec<SkippedFragment>,
    /// Size of the revocation set the certificates were matched against.
    pub revocation_entries: usize,
}

impl CheckReport {
    pub fn revoked_count(&self) -> usize {
        self.certificates.iter().filter(|v| v.revoked).count()
    }

    /// True unless a skipped fragment was meant to be a certificate.
    ///
    /// Fragments such as the count in `NumberOfCertificates` are listed in
    /// `skipped_fragments` but do not count against this.
    pub fn all_certificates_parsed(&self) -> bool {
        !self
            .skipped_fragments
            .iter()
            .any(SkippedFragment::looks_like_certificate)
    }
}

/// Runs keybox checks against one revocation source.
///
/// Holds no per-check state; the same checker can run any number of checks,
/// each fetching a fresh revocation list.
#[derive(Clone)]
pub struct KeyboxChecker {
    source: Arc<dyn RevocationSource>,
}

impl KeyboxChecker {
    pub fn new(source: Arc<dyn RevocationSource>) -> Self {
        Self { source }
    }

    /// Checker backed by the remote feed described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn from_config(config: &CheckerConfig) -> KeyboxResult<Self> {
        Ok(Self::new(Arc::new(HttpRevocationSource::from_config(config)?)))
    }

    /// # Errors
    ///
    /// [`KeyboxError::UnreadableInput`] when the file cannot be read, plus
    /// anything [`KeyboxChecker::check_reader`] returns.
    pub async fn check_path(&self, path: impl AsRef<Path>) -> KeyboxResult<CheckReport> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "checking keybox");
        let document = tokio::fs::read(path).await?;
        self.check_bytes(document).await
    }

    /// # Errors
    ///
    /// See [`KeyboxChecker::check_reader`].
    pub async fn check_bytes(&self, document: Vec<u8>) -> KeyboxResult<CheckReport> {
        self.check_reader(Cursor::new(document)).await
    }

    /// Parse `input` on a blocking worker while the revocation list is
    /// fetched, then match once both are done.
    ///
    /// # Errors
    ///
    /// Only document-level failures abort a check: an unreadable stream or
    /// markup that cannot be parsed. Bad certificates and fetch failures are
    /// reflected in the report instead.
    pub async fn check_reader<R>(&self, input: R) -> KeyboxResult<CheckReport>
    where
        R: Read + Send + 'static,
    {
        let parse = tokio::task::spawn_blocking(move || parse_keybox(input));
        let (parsed, fetch) = tokio::join!(parse, self.source.fetch());

        let keybox = parsed
            .map_err(|e| KeyboxError::Internal(anyhow::anyhow!("keybox parse task failed: {e}")))??;
        let matched = match_revocations(keybox.certificates, &fetch.serials);

        let report = CheckReport {
            certificates: matched.verdicts,
            strong_integrity: matched.strong_integrity,
            fetch: fetch.outcome,
            skipped_fragments: keybox.skipped,
            revocation_entries: fetch.serials.len(),
        };

        tracing::info!(
            certificates = report.certificates.len(),
            revoked = report.revoked_count(),
            skipped = report.skipped_fragments.len(),
            strong_integrity = report.strong_integrity,
            fetch_failed = report.fetch.is_failed(),
            "keybox check complete"
        );
        Ok(report)
    }
}
