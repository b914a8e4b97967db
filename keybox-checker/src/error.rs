use thiserror::Error;

/// Failures that abort a keybox check.
///
/// Problems with individual certificates or with the revocation feed are not
/// represented here; those degrade to a skipped fragment or an empty
/// revocation set.
#[derive(Error, Debug)]
pub enum KeyboxError {
    #[error("Unreadable keybox input: {0}")]
    UnreadableInput(#[from] std::io::Error),

    #[error("Malformed keybox document: {0}")]
    MalformedDocument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type KeyboxResult<T> = Result<T, KeyboxError>;

/// Reasons a revocation list could not be obtained.
///
/// Never surfaced as an error; the message ends up in
/// [`FetchOutcome::Failed`](crate::revocation::FetchOutcome::Failed).
#[derive(Error, Debug)]
pub(crate) enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed revocation feed: {0}")]
    MalformedFeed(#[from] serde_json::Error),

    #[error("cannot read revocation list: {0}")]
    Io(#[from] std::io::Error),
}
