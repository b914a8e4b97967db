//! Certificate blob decoding.
//!
//! Keybox documents carry certificates in three textual shapes: PEM armour,
//! raw hex (optionally colon or whitespace delimited) and bare base64. This
//! module turns any of them into DER bytes. Failure is not an error here; a
//! fragment that cannot be decoded simply yields `None`.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine as _;
use serde::Serialize;

pub const PEM_BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
pub const PEM_END_MARKER: &str = "-----END CERTIFICATE-----";

/// Standard alphabet, padding optional. Keybox exports are not consistent
/// about trailing `=`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Textual encoding detected for a certificate fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobEncoding {
    Pem,
    Hex,
    Base64,
}

impl BlobEncoding {
    /// Pick the decoding strategy for a trimmed fragment.
    ///
    /// PEM wins whenever the begin marker is present. Otherwise a fragment made
    /// only of hex digits, colons and whitespace is hex, even if it would also
    /// be valid base64. Everything else falls through to base64.
    pub fn detect(fragment: &str) -> Self {
        if fragment.contains(PEM_BEGIN_MARKER) {
            BlobEncoding::Pem
        } else if is_hex_fragment(fragment) {
            BlobEncoding::Hex
        } else {
            BlobEncoding::Base64
        }
    }

    pub fn decode(self, fragment: &str) -> Option<Vec<u8>> {
        match self {
            BlobEncoding::Pem => {
                let body = fragment
                    .replace(PEM_BEGIN_MARKER, "")
                    .replace(PEM_END_MARKER, "");
                decode_base64(&body)
            }
            BlobEncoding::Hex => decode_hex(fragment),
            BlobEncoding::Base64 => decode_base64(fragment),
        }
    }
}

/// Decode a trimmed certificate fragment into DER bytes.
pub fn decode_blob(fragment: &str) -> Option<Vec<u8>> {
    BlobEncoding::detect(fragment).decode(fragment)
}

fn is_hex_fragment(fragment: &str) -> bool {
    !fragment.is_empty()
        && fragment
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c.is_ascii_whitespace())
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

/// Hex decoding with the keybox convention for odd lengths: the first digit
/// becomes a byte of its own and the remainder is read in pairs, so `"ABC"`
/// decodes to `[0x0A, 0xBC]`.
pub fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ':' && !c.is_ascii_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut bytes = Vec::with_capacity((cleaned.len() + 1) / 2);
    let mut rest = cleaned.as_str();
    if cleaned.len() % 2 == 1 {
        let mut chars = cleaned.chars();
        let nibble = chars.next()?.to_digit(16)?;
        bytes.push(u8::try_from(nibble).ok()?);
        rest = chars.as_str();
    }
    bytes.extend(hex::decode(rest).ok()?);
    Some(bytes)
}

/// Standard base64 with all whitespace removed first.
pub fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact = strip_whitespace(text);
    if compact.is_empty() {
        return None;
    }
    LENIENT_BASE64.decode(compact.as_bytes()).ok()
}
