//! Joins extracted certificates against a revocation set.

use serde::Serialize;

use crate::certificate::{normalize_serial, ParsedCertificate};
use crate::revocation::RevocationSet;

/// A certificate with its revocation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateVerdict {
    #[serde(flatten)]
    pub certificate: ParsedCertificate,
    /// The key actually looked up in the revocation set.
    pub compared_hex: String,
    pub revoked: bool,
}

impl CertificateVerdict {
    pub fn new(certificate: ParsedCertificate, revoked_serials: &RevocationSet) -> Self {
        let compared_hex = normalize_serial(&certificate.serial_hex);
        let revoked = revoked_serials.contains(&compared_hex);
        Self {
            certificate,
            compared_hex,
            revoked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub verdicts: Vec<CertificateVerdict>,
    /// True when no certificate is revoked, including when there are none.
    pub strong_integrity: bool,
}

/// Produce a verdict for every certificate, preserving order.
pub fn match_revocations(
    certificates: Vec<ParsedCertificate>,
    revoked_serials: &RevocationSet,
) -> MatchReport {
    let verdicts: Vec<CertificateVerdict> = certificates
        .into_iter()
        .map(|cert| CertificateVerdict::new(cert, revoked_serials))
        .collect();
    let strong_integrity = !verdicts.iter().any(|v| v.revoked);

    MatchReport {
        verdicts,
        strong_integrity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn certificate(serial_hex: &str) -> ParsedCertificate {
        ParsedCertificate {
            der: Vec::new(),
            subject: format!("CN=serial {serial_hex}"),
            issuer: "CN=Test Root".to_string(),
            not_before: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2034, 1, 1, 0, 0, 0).unwrap(),
            serial_hex: serial_hex.to_string(),
            sha256_fingerprint: String::new(),
        }
    }

    #[test]
    fn test_revoked_serial_is_flagged() {
        let revoked: RevocationSet = ["1A2B"].into_iter().collect();
        let report = match_revocations(vec![certificate("1A2B"), certificate("FF")], &revoked);

        assert_eq!(report.verdicts.len(), 2);
        assert!(report.verdicts[0].revoked);
        assert_eq!(report.verdicts[0].compared_hex, "1A2B");
        assert!(!report.verdicts[1].revoked);
        assert_eq!(report.verdicts[1].compared_hex, "FF");
        assert!(!report.strong_integrity);
    }

    #[test]
    fn test_feed_formatting_does_not_matter() {
        let revoked: RevocationSet = ["000ff"].into_iter().collect();
        let report = match_revocations(vec![certificate("FF")], &revoked);
        assert!(report.verdicts[0].revoked);
    }

    #[test]
    fn test_nothing_revoked_is_strong() {
        let report = match_revocations(vec![certificate("1A2B")], &RevocationSet::new());
        assert!(report.strong_integrity);
        assert!(!report.verdicts[0].revoked);
    }

    #[test]
    fn test_empty_certificate_list_is_strong() {
        let revoked: RevocationSet = ["1A2B"].into_iter().collect();
        let report = match_revocations(Vec::new(), &revoked);
        assert!(report.verdicts.is_empty());
        assert!(report.strong_integrity);
    }
}
