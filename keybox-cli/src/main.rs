//! Keybox revocation checker
//!
//! Prints one verdict per certificate found in a keybox document and exits
//! non-zero unless the keybox has strong integrity.
//!
//! Usage:
//!   keybox-check keybox.xml [--json] [--strict] [--revocation-list status.json]
//!
//! Exit codes:
//! - 0: nothing revoked and every certificate fragment parsed
//! - 1: fatal error (unreadable or malformed keybox, bad configuration)
//! - 2: at least one certificate is revoked
//! - 3: a fragment that looked like a certificate could not be parsed
//! - 4: the revocation list could not be fetched (`--strict` only)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use keybox_checker::{
    CertificateVerdict, CheckReport, CheckerConfig, FetchOutcome, FileRevocationSource,
    HttpRevocationSource, KeyboxChecker,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "keybox-check")]
#[command(version)]
#[command(about = "Check keybox certificates against the attestation revocation list")]
struct Args {
    /// Keybox document to check
    keybox: PathBuf,

    /// Revocation feed URL
    #[arg(long, env = "KEYBOX_STATUS_URL")]
    status_url: Option<String>,

    /// Fetch timeout in seconds
    #[arg(long, env = "KEYBOX_FETCH_TIMEOUT_SECONDS")]
    timeout: Option<u64>,

    /// Read the revocation list from a local JSON file instead of the feed
    #[arg(long)]
    revocation_list: Option<PathBuf>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Exit non-zero when the revocation list could not be fetched
    #[arg(long)]
    strict: bool,

    /// Do not fail on certificates that could not be parsed
    #[arg(long)]
    allow_skipped: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Overall outcome of a check, in decreasing order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Strong,
    Revoked,
    Skipped,
    FetchFailed,
}

impl Outcome {
    fn evaluate(report: &CheckReport, strict: bool, allow_skipped: bool) -> Self {
        if !report.strong_integrity {
            Outcome::Revoked
        } else if strict && report.fetch.is_failed() {
            Outcome::FetchFailed
        } else if !allow_skipped && !report.all_certificates_parsed() {
            Outcome::Skipped
        } else {
            Outcome::Strong
        }
    }

    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Strong => ExitCode::SUCCESS,
            Outcome::Revoked => ExitCode::from(2),
            Outcome::Skipped => ExitCode::from(3),
            Outcome::FetchFailed => ExitCode::from(4),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = CheckerConfig::from_env()?;
    if let Some(url) = &args.status_url {
        config.status_url.clone_from(url);
    }
    if let Some(secs) = args.timeout {
        config.fetch_timeout = Duration::from_secs(secs);
    }

    let checker = match &args.revocation_list {
        Some(path) => {
            info!(path = %path.display(), "using local revocation list");
            KeyboxChecker::new(Arc::new(FileRevocationSource::new(path)))
        }
        None => {
            let source = HttpRevocationSource::from_config(&config)?;
            info!(url = source.url(), "using revocation feed");
            KeyboxChecker::new(Arc::new(source))
        }
    };

    let report = checker
        .check_path(&args.keybox)
        .await
        .with_context(|| format!("checking {}", args.keybox.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(Outcome::evaluate(&report, args.strict, args.allow_skipped).exit_code())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "keybox_checker=debug,keybox_check=debug"
    } else {
        "keybox_checker=warn,keybox_check=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_report(report: &CheckReport) {
    for (index, verdict) in report.certificates.iter().enumerate() {
        print_verdict(index + 1, verdict);
    }

    for skipped in &report.skipped_fragments {
        let label = if skipped.looks_like_certificate() {
            "skipped".yellow()
        } else {
            "ignored".dimmed()
        };
        println!(
            "{label} <{}> {} ({:?})",
            skipped.element, skipped.reason, skipped.encoding
        );
    }

    match &report.fetch {
        FetchOutcome::Fetched => {
            println!("Revocation list: {} entries", report.revocation_entries);
        }
        FetchOutcome::Empty => println!("Revocation list: empty"),
        FetchOutcome::Failed { reason } => println!(
            "{} {} (no certificate treated as revoked)",
            "Revocation list unavailable:".yellow(),
            reason
        ),
    }

    if report.certificates.is_empty() {
        println!("{}", "No certificates found in keybox".yellow());
    }

    if report.strong_integrity {
        println!("{}", "STRONG INTEGRITY".bright_green().bold());
    } else {
        println!(
            "{} ({} of {} certificates revoked)",
            "WEAK INTEGRITY".bright_red().bold(),
            report.revoked_count(),
            report.certificates.len()
        );
    }
}

fn print_verdict(position: usize, verdict: &CertificateVerdict) {
    let cert = &verdict.certificate;
    let status = if verdict.revoked {
        "REVOKED".bright_red().bold()
    } else {
        "OK".bright_green().bold()
    };

    println!("[{position}] {status} serial {}", verdict.compared_hex);
    println!("    subject: {}", cert.subject);
    println!("    issuer:  {}", cert.issuer);
    println!(
        "    valid:   {} .. {}",
        cert.not_before.format("%Y-%m-%d %H:%M:%S UTC"),
        cert.not_after.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("    sha256:  {}", cert.sha256_fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keybox_checker::{
        match_revocations, parse_keybox, BlobEncoding, ParsedCertificate, RevocationSet,
        SkipReason, SkippedFragment,
    };

    const ANDROID_KEYBOX: &[u8] =
        include_bytes!("../../keybox-checker/tests/fixtures/keybox_android.xml");

    fn verdict(revoked: bool) -> CertificateVerdict {
        CertificateVerdict {
            certificate: ParsedCertificate {
                der: Vec::new(),
                subject: "CN=Leaf".to_string(),
                issuer: "CN=Root".to_string(),
                not_before: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                not_after: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                serial_hex: "FF".to_string(),
                sha256_fingerprint: String::new(),
            },
            compared_hex: "FF".to_string(),
            revoked,
        }
    }

    fn report(revoked: bool, fetch: FetchOutcome, skipped: usize) -> CheckReport {
        CheckReport {
            certificates: vec![verdict(revoked)],
            strong_integrity: !revoked,
            fetch,
            skipped_fragments: (0..skipped)
                .map(|_| SkippedFragment {
                    element: "Certificate".to_string(),
                    encoding: BlobEncoding::Hex,
                    reason: SkipReason::InvalidCertificate,
                })
                .collect(),
            revocation_entries: 0,
        }
    }

    fn failed() -> FetchOutcome {
        FetchOutcome::Failed {
            reason: "unexpected HTTP status 500".to_string(),
        }
    }

    #[test]
    fn test_strong_keybox_exits_zero() {
        let report = report(false, FetchOutcome::Fetched, 0);
        assert_eq!(Outcome::evaluate(&report, false, false), Outcome::Strong);
    }

    #[test]
    fn test_revocation_takes_precedence() {
        let report = report(true, FetchOutcome::Fetched, 2);
        assert_eq!(Outcome::evaluate(&report, true, false), Outcome::Revoked);
    }

    #[test]
    fn test_skipped_fragments_fail_unless_allowed() {
        let report = report(false, FetchOutcome::Empty, 1);
        assert_eq!(Outcome::evaluate(&report, false, false), Outcome::Skipped);
        assert_eq!(Outcome::evaluate(&report, false, true), Outcome::Strong);
    }

    fn report_for(document: &[u8]) -> CheckReport {
        let keybox = parse_keybox(document).unwrap();
        let matched = match_revocations(keybox.certificates, &RevocationSet::new());
        CheckReport {
            certificates: matched.verdicts,
            strong_integrity: matched.strong_integrity,
            fetch: FetchOutcome::Empty,
            skipped_fragments: keybox.skipped,
            revocation_entries: 0,
        }
    }

    #[test]
    fn test_clean_android_keybox_exits_zero() {
        let report = report_for(ANDROID_KEYBOX);
        assert_eq!(report.certificates.len(), 2);
        // NumberOfCertificates is listed but is not a certificate
        assert_eq!(report.skipped_fragments.len(), 1);
        assert_eq!(Outcome::evaluate(&report, false, false), Outcome::Strong);
    }

    #[test]
    fn test_non_certificate_fragments_do_not_fail() {
        let doc = "<Keybox><cert>DEADBEEF</cert><Certificate>plain text!</Certificate></Keybox>";
        let report = report_for(doc.as_bytes());
        assert_eq!(report.skipped_fragments.len(), 2);
        assert_eq!(Outcome::evaluate(&report, false, false), Outcome::Strong);
    }

    #[test]
    fn test_fetch_failure_only_fails_when_strict() {
        let report = report(false, failed(), 0);
        assert_eq!(Outcome::evaluate(&report, false, false), Outcome::Strong);
        assert_eq!(Outcome::evaluate(&report, true, false), Outcome::FetchFailed);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "keybox-check",
            "keybox.xml",
            "--json",
            "--strict",
            "--timeout",
            "3",
        ])
        .unwrap();
        assert_eq!(args.keybox, PathBuf::from("keybox.xml"));
        assert!(args.json);
        assert!(args.strict);
        assert_eq!(args.timeout, Some(3));
        assert!(args.revocation_list.is_none());
    }
}
