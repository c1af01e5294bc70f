// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Whitespace tolerant PEM decoding and canonical PEM encoding.
//!
//! Requests pasted by operators arrive with all sorts of framing noise:
//! CRLF line endings, indentation, blank lines or a stray byte order mark.
//! Decoding accepts all of that as long as there is exactly one block, but
//! encoding always emits the canonical 64 column, LF terminated form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

const PEM_HEADER: &[u8] = b"-----BEGIN ";
const PEM_FOOTER: &[u8] = b"-----END ";
const PEM_ENDING: &[u8] = b"-----";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Result type used by the PEM codec.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by the PEM codec.
#[derive(Debug, Error)]
pub enum Error {
    #[error("pem: missing PEM header")]
    MissingHeader,
    #[error("pem: malformed PEM header")]
    MalformedHeader,
    #[error("pem: missing PEM footer for {kind}")]
    MissingFooter { kind: String },
    #[error("pem: empty PEM body")]
    EmptyBody,
    #[error("pem: trailing data after PEM block")]
    TrailingData,
    #[error("pem: unexpected block type {found}")]
    UnexpectedKind { found: String },
    #[error("pem: invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Reports whether the data contains the opening marker of a `kind` block.
///
/// This is a cheap sniff used to tell PEM framed input apart from raw DER;
/// it does not validate the block itself.
pub fn contains_block(data: &[u8], kind: &str) -> bool {
    let mut marker = Vec::with_capacity(PEM_HEADER.len() + kind.len() + PEM_ENDING.len());
    marker.extend_from_slice(PEM_HEADER);
    marker.extend_from_slice(kind.as_bytes());
    marker.extend_from_slice(PEM_ENDING);

    data.windows(marker.len()).any(|w| w == marker.as_slice())
}

/// Decodes a single PEM block.
///
/// Rules:
///   - Leading and trailing whitespace (and a UTF-8 BOM) are ignored
///   - The footer must carry the same block type as the header
///   - Any ASCII whitespace inside the body is stripped before decoding
///   - Nothing but whitespace may follow the footer
///
/// Returns (kind, data) tuple on success.
pub fn decode(data: &[u8]) -> Result<(String, Vec<u8>)> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let data = data.trim_ascii();

    if !data.starts_with(PEM_HEADER) {
        return Err(Error::MissingHeader);
    }
    // The block type runs until the closing dashes of the header
    let rest = &data[PEM_HEADER.len()..];
    let kind_len = rest
        .windows(PEM_ENDING.len())
        .position(|w| w == PEM_ENDING)
        .ok_or(Error::MalformedHeader)?;

    let block_type = &rest[..kind_len];
    if block_type.is_empty() || block_type.iter().any(|b| !is_label_char(*b)) {
        return Err(Error::MalformedHeader);
    }
    let kind = String::from_utf8_lossy(block_type).into_owned();
    let body_start = PEM_HEADER.len() + kind_len + PEM_ENDING.len();

    // Locate the matching footer
    let mut footer = Vec::with_capacity(PEM_FOOTER.len() + block_type.len() + PEM_ENDING.len());
    footer.extend_from_slice(PEM_FOOTER);
    footer.extend_from_slice(block_type);
    footer.extend_from_slice(PEM_ENDING);

    let footer_idx = data[body_start..]
        .windows(footer.len())
        .position(|w| w == footer.as_slice())
        .ok_or_else(|| Error::MissingFooter { kind: kind.clone() })?;
    let footer_start = body_start + footer_idx;

    if footer_start + footer.len() != data.len() {
        return Err(Error::TrailingData);
    }
    let b64: Vec<u8> = data[body_start..footer_start]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if b64.is_empty() {
        return Err(Error::EmptyBody);
    }
    Ok((kind, STANDARD.decode(&b64)?))
}

/// Decodes a single PEM block, requiring its type to be one of `kinds`.
pub fn decode_kind(data: &[u8], kinds: &[&str]) -> Result<Vec<u8>> {
    let (kind, der) = decode(data)?;
    if !kinds.contains(&kind.as_str()) {
        return Err(Error::UnexpectedKind { found: kind });
    }
    Ok(der)
}

/// Encodes data as a PEM block with the given type.
/// Lines are 64 characters, using \n line endings.
pub fn encode(kind: &str, data: &[u8]) -> String {
    let b64 = STANDARD.encode(data);

    let mut buf = String::with_capacity(b64.len() + b64.len() / 64 + 2 * kind.len() + 40);
    buf.push_str("-----BEGIN ");
    buf.push_str(kind);
    buf.push_str("-----\n");

    // Base64 output is pure ASCII, so any byte offset is a char boundary
    let mut offset = 0;
    while offset < b64.len() {
        let end = (offset + 64).min(b64.len());
        buf.push_str(&b64[offset..end]);
        buf.push('\n');
        offset = end;
    }
    buf.push_str("-----END ");
    buf.push_str(kind);
    buf.push_str("-----\n");

    buf
}

fn is_label_char(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b' ' || b == b'#' || b == b'-'
}

#[cfg(test)]
mod test {
    use super::*;

    /// Verifies that encoded blocks decode back to the same label and payload.
    #[test]
    fn test_roundtrip() {
        let data = vec![0xAB; 200];
        let encoded = encode("CERTIFICATE REQUEST", &data);
        let (kind, decoded) = decode(encoded.as_bytes()).unwrap();
        assert_eq!(kind, "CERTIFICATE REQUEST");
        assert_eq!(decoded, data);
    }

    /// Verifies that encoding wraps the body at 64 columns.
    #[test]
    fn test_encode_line_width() {
        let encoded = encode("CERTIFICATE", &[0x42; 100]);
        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines[0], "-----BEGIN CERTIFICATE-----");
        assert_eq!(lines[1].len(), 64);
        assert!(lines[2].len() < 64);
        assert_eq!(lines[3], "-----END CERTIFICATE-----");
    }

    #[test]
    fn test_decode_valid_lf() {
        let pem = b"-----BEGIN CERTIFICATE REQUEST-----\nYWJj\n-----END CERTIFICATE REQUEST-----\n";
        let (kind, data) = decode(pem).unwrap();
        assert_eq!(kind, "CERTIFICATE REQUEST");
        assert_eq!(data, b"abc");
    }

    #[test]
    fn test_decode_valid_crlf() {
        let pem =
            b"-----BEGIN CERTIFICATE REQUEST-----\r\nYWJj\r\n-----END CERTIFICATE REQUEST-----\r\n";
        let (_, data) = decode(pem).unwrap();
        assert_eq!(data, b"abc");
    }

    /// Verifies that pasted input with indentation, blank lines and a BOM is accepted.
    #[test]
    fn test_decode_tolerates_whitespace() {
        let pem = b"\xEF\xBB\xBF\r\n  -----BEGIN CERTIFICATE REQUEST-----\n\n   YW\r\n\tJj  \n\n-----END CERTIFICATE REQUEST-----  \n\n";
        let (kind, data) = decode(pem).unwrap();
        assert_eq!(kind, "CERTIFICATE REQUEST");
        assert_eq!(data, b"abc");
    }

    #[test]
    fn test_decode_single_line() {
        let pem = b"-----BEGIN CERTIFICATE REQUEST-----YWJj-----END CERTIFICATE REQUEST-----";
        let (_, data) = decode(pem).unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn test_decode_missing_header() {
        let pem = b"YWJj\n-----END CERTIFICATE REQUEST-----\n";
        assert!(matches!(decode(pem), Err(Error::MissingHeader)));
    }

    #[test]
    fn test_decode_missing_footer() {
        let pem = b"-----BEGIN CERTIFICATE REQUEST-----\nYWJj\n";
        assert!(matches!(decode(pem), Err(Error::MissingFooter { .. })));
    }

    /// Verifies that a footer for a different block type is not accepted.
    #[test]
    fn test_decode_mismatched_footer() {
        let pem = b"-----BEGIN CERTIFICATE REQUEST-----\nYWJj\n-----END CERTIFICATE-----\n";
        assert!(matches!(decode(pem), Err(Error::MissingFooter { .. })));
    }

    #[test]
    fn test_decode_trailing_data() {
        let pem = b"-----BEGIN CERTIFICATE-----\nYWJj\n-----END CERTIFICATE-----\nextra";
        assert!(matches!(decode(pem), Err(Error::TrailingData)));
    }

    #[test]
    fn test_decode_empty_body() {
        let pem = b"-----BEGIN CERTIFICATE-----\n \n-----END CERTIFICATE-----\n";
        assert!(matches!(decode(pem), Err(Error::EmptyBody)));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let pem = b"-----BEGIN CERTIFICATE-----\n!!!!\n-----END CERTIFICATE-----\n";
        assert!(matches!(decode(pem), Err(Error::Base64(_))));
    }

    #[test]
    fn test_decode_kind_rejects_other_labels() {
        let pem = encode("PRIVATE KEY", b"abc");
        assert!(decode_kind(pem.as_bytes(), &["PRIVATE KEY"]).is_ok());
        assert!(matches!(
            decode_kind(pem.as_bytes(), &["CERTIFICATE REQUEST"]),
            Err(Error::UnexpectedKind { found }) if found == "PRIVATE KEY"
        ));
    }

    /// Verifies that marker sniffing finds blocks anywhere in the input.
    #[test]
    fn test_contains_block() {
        let pem = encode("CERTIFICATE REQUEST", b"abc");
        let noisy = format!("subject: leaf\n{pem}");
        assert!(contains_block(noisy.as_bytes(), "CERTIFICATE REQUEST"));
        assert!(!contains_block(noisy.as_bytes(), "CERTIFICATE"));
        assert!(!contains_block(&[0x30, 0x82, 0x01, 0x00], "CERTIFICATE REQUEST"));
    }
}
