//! Checker configuration
//!
//! Defaults point at the public Android attestation status feed. Every value
//! can be overridden from the environment:
//! - `KEYBOX_STATUS_URL`
//! - `KEYBOX_FETCH_TIMEOUT_SECONDS`
//! - `KEYBOX_USER_AGENT`

use std::time::Duration;

use crate::error::{KeyboxError, KeyboxResult};

pub const DEFAULT_STATUS_URL: &str = "https://android.googleapis.com/attestation/status";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Revocation feed endpoint
    pub status_url: String,

    /// Upper bound on the whole fetch; exceeding it counts as a failed fetch
    pub fetch_timeout: Duration,

    /// User-Agent header sent with the fetch
    pub user_agent: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            status_url: DEFAULT_STATUS_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: format!("keybox-checker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CheckerConfig {
    /// Defaults overlaid with `KEYBOX_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`KeyboxError::Configuration`] when a variable is present but
    /// unparseable.
    pub fn from_env() -> KeyboxResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("KEYBOX_STATUS_URL") {
            config.status_url = url;
        }

        if let Ok(secs) = std::env::var("KEYBOX_FETCH_TIMEOUT_SECONDS") {
            config.fetch_timeout = parse_timeout_secs(&secs)?;
        }

        if let Ok(agent) = std::env::var("KEYBOX_USER_AGENT") {
            config.user_agent = agent;
        }

        Ok(config)
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = url.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`KeyboxError::Configuration`] for a non-http(s) URL or a zero
    /// timeout.
    pub fn validate(&self) -> KeyboxResult<()> {
        if !(self.status_url.starts_with("https://") || self.status_url.starts_with("http://")) {
            return Err(KeyboxError::Configuration(format!(
                "status URL must be http(s), got '{}'",
                self.status_url
            )));
        }

        if self.fetch_timeout.is_zero() {
            return Err(KeyboxError::Configuration(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the HTTP client shared by every fetch made with this config.
    ///
    /// # Errors
    ///
    /// Returns [`KeyboxError::HttpClient`] when the TLS backend cannot be
    /// initialised.
    pub fn build_client(&self) -> KeyboxResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.fetch_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| KeyboxError::HttpClient(e.to_string()))
    }
}

/// Parse a whole number of seconds.
///
/// # Errors
///
/// Returns [`KeyboxError::Configuration`] for anything that is not a
/// non-negative integer.
pub fn parse_timeout_secs(value: &str) -> KeyboxResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| KeyboxError::Configuration(format!("Invalid fetch timeout '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckerConfig::default();
        assert_eq!(config.status_url, DEFAULT_STATUS_URL);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("keybox-checker/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CheckerConfig::default().with_status_url("ftp://example.com/status");
        assert!(matches!(config.validate(), Err(KeyboxError::Configuration(_))));

        let config = CheckerConfig::default().with_fetch_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(KeyboxError::Configuration(_))));
    }

    #[test]
    fn test_parse_timeout_secs() {
        assert_eq!(parse_timeout_secs(" 30 ").unwrap(), Duration::from_secs(30));
        assert!(parse_timeout_secs("-1").is_err());
        assert!(parse_timeout_secs("soon").is_err());
    }

    #[test]
    fn test_build_client() {
        assert!(CheckerConfig::default().build_client().is_ok());
    }
}
