//! Keybox certificate revocation checking
//!
//! Extracts the X.509 certificates bundled in a keybox document, computes
//! their canonical serial numbers and SHA-256 fingerprints, and matches them
//! against the Android attestation revocation feed.
//!
//! - **Blob decoding**: PEM, raw or delimited hex, and bare base64 fragments
//! - **Streaming parse**: single forward pass, bad fragments skipped
//! - **Fail-open fetch**: an unreachable feed means nothing is revoked, but the
//!   outcome is reported so callers can be stricter
//!
//! # Example
//!
//! ```no_run
//! use keybox_checker::{CheckerConfig, KeyboxChecker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checker = KeyboxChecker::from_config(&CheckerConfig::from_env()?)?;
//!     let report = checker.check_path("keybox.xml").await?;
//!
//!     for verdict in &report.certificates {
//!         println!("{} revoked={}", verdict.compared_hex, verdict.revoked);
//!     }
//!     println!("strong integrity: {}", report.strong_integrity);
//!     Ok(())
//! }
//! ```

pub mod certificate;
pub mod checker;
pub mod config;
pub mod decoder;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod revocation;

pub use certificate::{canonical_serial_hex, normalize_serial, sha256_fingerprint, ParsedCertificate};
pub use checker::{CheckReport, KeyboxChecker};
pub use config::CheckerConfig;
pub use decoder::{decode_blob, BlobEncoding};
pub use error::{KeyboxError, KeyboxResult};
pub use matcher::{match_revocations, CertificateVerdict, MatchReport};
pub use parser::{parse_keybox, ParsedKeybox, SkipReason, SkippedFragment};
pub use revocation::{
    FetchOutcome, FileRevocationSource, HttpRevocationSource, RevocationFetch, RevocationSet,
    RevocationSource,
};
