//! Certificate canonicalization: serial number, fingerprint and identity
//! fields extracted from parsed DER.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::num_bigint::BigInt;
use x509_parser::prelude::*;

/// A certificate successfully extracted from a keybox.
///
/// Immutable once built; revocation status lives on
/// [`CertificateVerdict`](crate::matcher::CertificateVerdict).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCertificate {
    /// Exact DER encoding of the certificate (trailing bytes excluded).
    #[serde(skip)]
    pub der: Vec<u8>,
    /// `O=..., CN=...` with RDNs in certificate order.
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Uppercase hex magnitude of the serial number, no leading zeros.
    pub serial_hex: String,
    /// Colon-delimited uppercase SHA-256 of `der`.
    pub sha256_fingerprint: String,
}

impl ParsedCertificate {
    /// Parse DER bytes as an X.509 certificate and canonicalize it.
    ///
    /// Returns `None` when the bytes are not a certificate or carry a validity
    /// timestamp outside the representable range. Nothing beyond structural
    /// parsing is checked: no chain, expiry or signature validation.
    pub fn from_der(bytes: &[u8]) -> Option<Self> {
        let (remaining, cert) = match X509Certificate::from_der(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, len = bytes.len(), "bytes are not an X.509 certificate");
                return None;
            }
        };

        let der = bytes.get(..bytes.len() - remaining.len())?.to_vec();
        let validity = cert.validity();
        let not_before = DateTime::<Utc>::from_timestamp(validity.not_before.timestamp(), 0)?;
        let not_after = DateTime::<Utc>::from_timestamp(validity.not_after.timestamp(), 0)?;

        Some(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            serial_hex: canonical_serial_hex(cert.tbs_certificate.raw_serial()),
            sha256_fingerprint: sha256_fingerprint(&der),
            der,
        })
    }
}

/// Canonical serial from the raw two's-complement INTEGER content.
///
/// The magnitude is rendered in uppercase hex without sign or leading zeros;
/// zero (or an empty encoding) becomes `"0"`.
pub fn canonical_serial_hex(raw_serial: &[u8]) -> String {
    let serial = BigInt::from_signed_bytes_be(raw_serial);
    normalize_serial(&serial.magnitude().to_str_radix(16))
}

/// Normalization applied to every serial before comparison: uppercase,
/// strip leading `'0'`, and map the empty string to `"0"`.
pub fn normalize_serial(serial: &str) -> String {
    let upper = serial.to_uppercase();
    let trimmed = upper.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// SHA-256 of `der` as `AB:CD:...`.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
