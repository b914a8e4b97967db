//! Streaming keybox parser.
//!
//! Walks the document once with a pull parser and collects the text of
//! every element whose local name contains `cert` (any case). Each fragment
//! is decoded and parsed as X.509; fragments that fail are recorded and
//! dropped without interrupting the scan.

use std::fmt;
use std::io::Read;

use serde::Serialize;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::certificate::ParsedCertificate;
use crate::decoder::BlobEncoding;
use crate::error::{KeyboxError, KeyboxResult};

/// DER encodings of a certificate start with a constructed SEQUENCE tag.
const DER_SEQUENCE_TAG: u8 = 0x30;

/// Stage at which a fragment stopped being a certificate candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The text could not be decoded with the detected encoding.
    Undecodable,
    /// The decoded bytes are not a DER SEQUENCE.
    NotDer,
    /// DER structure that X.509 parsing rejected.
    InvalidCertificate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Undecodable => f.write_str("could not be decoded"),
            SkipReason::NotDer => f.write_str("is not DER"),
            SkipReason::InvalidCertificate => f.write_str("is not a valid X.509 certificate"),
        }
    }
}

/// A non-empty certificate fragment that produced no certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFragment {
    /// Local name of the element carrying the fragment.
    pub element: String,
    /// Decoding strategy that was attempted.
    pub encoding: BlobEncoding,
    pub reason: SkipReason,
}

impl SkippedFragment {
    /// Whether the fragment was meant to be a certificate: PEM armour, or
    /// DER that failed X.509 parsing. Element text such as the count in
    /// `NumberOfCertificates` is not.
    pub fn looks_like_certificate(&self) -> bool {
        self.encoding == BlobEncoding::Pem || self.reason == SkipReason::InvalidCertificate
    }
}

/// Result of scanning one keybox document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedKeybox {
    /// Certificates in document order.
    pub certificates: Vec<ParsedCertificate>,
    /// Fragments dropped because decoding or X.509 parsing failed.
    pub skipped: Vec<SkippedFragment>,
}

/// Open element on the parse stack.
struct Frame {
    cert_bearing: bool,
    has_children: bool,
    text: String,
}

fn is_cert_element(local_name: &str) -> bool {
    local_name.to_lowercase().contains("cert")
}

/// Scan a keybox document.
///
/// A cert-bearing element contributes its own text only when it has no
/// child elements; container elements such as `CertificateChain` are walked
/// into instead.
///
/// # Errors
///
/// [`KeyboxError::UnreadableInput`] when the underlying reader fails and
/// [`KeyboxError::MalformedDocument`] when the markup cannot be parsed.
#[tracing::instrument(skip_all)]
pub fn parse_keybox<R: Read>(input: R) -> KeyboxResult<ParsedKeybox> {
    let config = ParserConfig::new()
        .trim_whitespace(false)
        .whitespace_to_characters(true)
        .cdata_to_characters(true)
        .ignore_comments(true);
    let reader = EventReader::new_with_config(input, config);

    let mut keybox = ParsedKeybox::default();
    let mut stack: Vec<Frame> = Vec::new();

    for event in reader {
        match event.map_err(classify_reader_error)? {
            XmlEvent::StartElement { name, .. } => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                stack.push(Frame {
                    cert_bearing: is_cert_element(&name.local_name),
                    has_children: false,
                    text: String::new(),
                });
            }
            XmlEvent::Characters(text) => {
                if let Some(frame) = stack.last_mut().filter(|f| f.cert_bearing) {
                    frame.text.push_str(&text);
                }
            }
            XmlEvent::EndElement { name } => {
                let Some(frame) = stack.pop() else { continue };
                if !frame.cert_bearing || frame.has_children {
                    continue;
                }
                let fragment = frame.text.trim();
                if fragment.is_empty() {
                    continue;
                }
                let encoding = BlobEncoding::detect(fragment);
                match extract_certificate(encoding, fragment) {
                    Ok(cert) => {
                        tracing::debug!(
                            element = %name.local_name,
                            serial = %cert.serial_hex,
                            subject = %cert.subject,
                            "extracted certificate"
                        );
                        keybox.certificates.push(cert);
                    }
                    Err(reason) => {
                        tracing::debug!(
                            element = %name.local_name,
                            ?encoding,
                            ?reason,
                            "skipping certificate fragment"
                        );
                        keybox.skipped.push(SkippedFragment {
                            element: name.local_name,
                            encoding,
                            reason,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        certificates = keybox.certificates.len(),
        skipped = keybox.skipped.len(),
        "keybox scan complete"
    );
    Ok(keybox)
}

fn extract_certificate(
    encoding: BlobEncoding,
    fragment: &str,
) -> Result<ParsedCertificate, SkipReason> {
    let der = encoding.decode(fragment).ok_or(SkipReason::Undecodable)?;
    if der.first() != Some(&DER_SEQUENCE_TAG) {
        return Err(SkipReason::NotDer);
    }
    ParsedCertificate::from_der(&der).ok_or(SkipReason::InvalidCertificate)
}

fn classify_reader_error(err: xml::reader::Error) -> KeyboxError {
    match err.kind() {
        xml::reader::ErrorKind::Io(io) => {
            KeyboxError::UnreadableInput(std::io::Error::new(io.kind(), io.to_string()))
        }
        _ => KeyboxError::MalformedDocument(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_element_matching_is_case_insensitive() {
        assert!(is_cert_element("Certificate"));
        assert!(is_cert_element("CERTIFICATECHAIN"));
        assert!(is_cert_element("leafcert"));
        assert!(!is_cert_element("PrivateKey"));
        assert!(!is_cert_element("crt"));
    }

    #[test]
    fn test_document_without_certificates() {
        let doc = "<Keybox><Key><PrivateKey>abc</PrivateKey></Key></Keybox>";
        let keybox = parse_keybox(doc.as_bytes()).unwrap();
        assert!(keybox.certificates.is_empty());
        assert!(keybox.skipped.is_empty());
    }

    #[test]
    fn test_empty_and_garbage_fragments() {
        let doc = "<Keybox>\
            <Certificate>   </Certificate>\
            <Certificate>not a cert!</Certificate>\
            <cert>DEADBEEF</cert>\
            </Keybox>";
        let keybox = parse_keybox(doc.as_bytes()).unwrap();
        assert!(keybox.certificates.is_empty());
        // whitespace-only elements are ignored, not counted
        assert_eq!(
            keybox.skipped,
            vec![
                SkippedFragment {
                    element: "Certificate".to_string(),
                    encoding: BlobEncoding::Base64,
                    reason: SkipReason::Undecodable,
                },
                SkippedFragment {
                    element: "cert".to_string(),
                    encoding: BlobEncoding::Hex,
                    reason: SkipReason::NotDer,
                },
            ]
        );
    }

    #[test]
    fn test_skip_reasons_separate_counts_from_broken_certificates() {
        let doc = "<Keybox>\
            <NumberOfCertificates>2</NumberOfCertificates>\
            <Certificate>3003020101</Certificate>\
            <Certificate>-----BEGIN CERTIFICATE-----\n%%%\n-----END CERTIFICATE-----</Certificate>\
            </Keybox>";
        let keybox = parse_keybox(doc.as_bytes()).unwrap();
        assert!(keybox.certificates.is_empty());

        let reasons: Vec<(BlobEncoding, SkipReason)> =
            keybox.skipped.iter().map(|s| (s.encoding, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (BlobEncoding::Hex, SkipReason::NotDer),
                // a SEQUENCE holding one INTEGER
                (BlobEncoding::Hex, SkipReason::InvalidCertificate),
                (BlobEncoding::Pem, SkipReason::Undecodable),
            ]
        );

        let flagged: Vec<bool> = keybox.skipped.iter().map(SkippedFragment::looks_like_certificate).collect();
        assert_eq!(flagged, vec![false, true, true]);
    }

    #[test]
    fn test_container_elements_are_not_fragments() {
        let doc = "<CertificateChain>garbage<Certificate>also garbage!</Certificate></CertificateChain>";
        let keybox = parse_keybox(doc.as_bytes()).unwrap();
        assert_eq!(keybox.skipped.len(), 1);
        assert_eq!(keybox.skipped[0].element, "Certificate");
    }

    #[test]
    fn test_malformed_markup_is_fatal() {
        let doc = "<Keybox><Certificate>AAAA</Keybox>";
        assert!(matches!(
            parse_keybox(doc.as_bytes()),
            Err(KeyboxError::MalformedDocument(_))
        ));
    }
}
