//! Signature section appended to a document
//!
//! The section is an incremental update: the input bytes are kept as-is and a
//! PDF-style signature dictionary follows them. Its `/Contents` value is a
//! zero-filled hex placeholder that is excluded from the digest; every other
//! byte of the output, dictionary included, is covered by `/ByteRange`.
//!
//! ```text
//! <document bytes>
//! %%PKI-SEAL-SIGNATURE
//! <<
//! /Type /Sig
//! ...
//! /ByteRange [0000000000 0000001234 0000039124 0000000012]
//! /Contents <3082...000000>
//! >>
//! %%EOF
//! ```

use super::types::{ByteRange, SignatureMetadata};
use crate::error::{ByteRangeError, SigningError, VerificationError};
use chrono::{DateTime, SecondsFormat, Utc};
use openssl::hash::{Hasher, MessageDigest};
use std::collections::HashMap;

pub(crate) const SIGNATURE_MARKER: &[u8] = b"\n%%PKI-SEAL-SIGNATURE\n";
const SECTION_TRAILER: &[u8] = b"\n>>\n%%EOF\n";
const RANGE_DIGITS: usize = 10;
const RANGE_MAX: usize = 9_999_999_999;

/// SHA-512 over the covered spans of `bytes`
///
/// # Errors
/// [`ByteRangeError::OutOfBounds`] if either span overflows or lies outside
/// `bytes`.
pub fn byte_range_digest(bytes: &[u8], range: &ByteRange) -> Result<Vec<u8>, ByteRangeError> {
    let spans = range.covered(bytes).ok_or(ByteRangeError::OutOfBounds {
        range: range.as_array(),
        document_len: bytes.len(),
    })?;
    let mut hasher = Hasher::new(MessageDigest::sha512())?;
    for span in spans {
        hasher.update(span)?;
    }
    Ok(hasher.finish()?.to_vec())
}

/// Escape a value as the body of a PDF literal string
fn escape_literal(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2);
    out.push(b'(');
    for &b in value.as_bytes() {
        match b {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

fn unescape_literal(raw: &[u8]) -> Result<String, VerificationError> {
    let body = raw
        .strip_prefix(b"(")
        .and_then(|r| r.strip_suffix(b")"))
        .ok_or_else(|| malformed("literal string is not parenthesised"))?;

    let mut out = Vec::with_capacity(body.len());
    let mut iter = body.iter();
    while let Some(&b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(&c @ (b'\\' | b'(' | b')')) => out.push(c),
            _ => return Err(malformed("invalid escape in literal string")),
        }
    }
    String::from_utf8(out).map_err(|_| malformed("literal string is not UTF-8"))
}

fn format_range(range: &ByteRange) -> Vec<u8> {
    let [a, b, c, d] = range.as_array();
    format!("{:010} {:010} {:010} {:010}", a, b, c, d).into_bytes()
}

fn malformed(reason: &str) -> VerificationError {
    VerificationError::Malformed(reason.to_string())
}

/// Output document with an unfilled signature placeholder
pub(crate) struct PreparedEnvelope {
    bytes: Vec<u8>,
    byte_range: ByteRange,
    reserve: usize,
}

impl PreparedEnvelope {
    /// Append the signature section for `metadata` to a copy of `document`,
    /// reserving `reserve` bytes for the encoded signed-data.
    pub(crate) fn prepare(
        document: &[u8],
        metadata: &SignatureMetadata,
        reserve: usize,
    ) -> Result<Self, SigningError> {
        let mut bytes = Vec::with_capacity(document.len() + 2 * reserve + 512);
        bytes.extend_from_slice(document);
        bytes.extend_from_slice(SIGNATURE_MARKER);
        bytes.extend_from_slice(b"<<\n/Type /Sig\n/Filter /Adobe.PPKLite\n/SubFilter /adbe.pkcs7.detached\n");

        for (key, value) in [
            ("/Name", &metadata.signer_display_name),
            ("/Reason", &metadata.reason),
            ("/Location", &metadata.location),
        ] {
            bytes.extend_from_slice(key.as_bytes());
            bytes.push(b' ');
            bytes.extend_from_slice(&escape_literal(value));
            bytes.push(b'\n');
        }
        let pdf_date = metadata.sign_time.format("D:%Y%m%d%H%M%SZ").to_string();
        bytes.extend_from_slice(b"/M ");
        bytes.extend_from_slice(&escape_literal(&pdf_date));
        bytes.extend_from_slice(b"\n/SignTime ");
        let sign_time = metadata
            .sign_time
            .to_rfc3339_opts(SecondsFormat::Nanos, true);
        bytes.extend_from_slice(&escape_literal(&sign_time));

        bytes.extend_from_slice(b"\n/ByteRange [");
        let range_at = bytes.len();
        let placeholder = ByteRange {
            first_start: 0,
            first_len: 0,
            second_start: 0,
            second_len: 0,
        };
        bytes.extend_from_slice(&format_range(&placeholder));
        bytes.extend_from_slice(b"]\n/Contents ");

        let contents_start = bytes.len();
        bytes.push(b'<');
        bytes.resize(bytes.len() + 2 * reserve, b'0');
        bytes.push(b'>');
        let contents_end = bytes.len();
        bytes.extend_from_slice(SECTION_TRAILER);

        if bytes.len() > RANGE_MAX {
            return Err(SigningError::EncodingFailure(format!(
                "signed document of {} bytes exceeds the byte range limit",
                bytes.len()
            )));
        }
        let byte_range = ByteRange {
            first_start: 0,
            first_len: contents_start,
            second_start: contents_end,
            second_len: bytes.len() - contents_end,
        };
        let encoded = format_range(&byte_range);
        debug_assert_eq!(encoded.len(), 4 * RANGE_DIGITS + 3);
        bytes[range_at..range_at + encoded.len()].copy_from_slice(&encoded);

        Ok(Self {
            bytes,
            byte_range,
            reserve,
        })
    }

    pub(crate) fn byte_range(&self) -> &ByteRange {
        &self.byte_range
    }

    pub(crate) fn digest(&self) -> Result<Vec<u8>, ByteRangeError> {
        byte_range_digest(&self.bytes, &self.byte_range)
    }

    /// Write `der` into the placeholder, leaving the remainder zero-padded
    pub(crate) fn fill(mut self, der: &[u8]) -> Result<Vec<u8>, SigningError> {
        if der.len() > self.reserve {
            return Err(SigningError::EncodingFailure(format!(
                "signed data is {} bytes but only {} were reserved",
                der.len(),
                self.reserve
            )));
        }
        let hex = hex::encode_upper(der);
        let start = self.byte_range.first_len + 1;
        self.bytes[start..start + hex.len()].copy_from_slice(hex.as_bytes());
        Ok(self.bytes)
    }
}

/// Signature section located in a signed document
#[derive(Debug)]
pub(crate) struct ParsedEnvelope<'a> {
    pub metadata: SignatureMetadata,
    pub byte_range: ByteRange,
    /// Offset of the signature section, i.e. the length of the signed revision
    pub section_start: usize,
    /// Placeholder contents with the brackets stripped, still hex encoded
    pub contents_hex: &'a [u8],
}

impl<'a> ParsedEnvelope<'a> {
    /// Locate and parse the last signature section of `bytes`
    pub(crate) fn parse(bytes: &'a [u8]) -> Result<Self, VerificationError> {
        let section_start = bytes
            .windows(SIGNATURE_MARKER.len())
            .rposition(|w| w == SIGNATURE_MARKER)
            .ok_or_else(|| malformed("no signature section found"))?;
        let section = &bytes[section_start + SIGNATURE_MARKER.len()..];

        let mut entries: HashMap<&str, &[u8]> = HashMap::new();
        for line in section.split(|b| *b == b'\n') {
            if !line.starts_with(b"/") {
                continue;
            }
            let split = line.iter().position(|b| *b == b' ').unwrap_or(line.len());
            let key = std::str::from_utf8(&line[..split])
                .map_err(|_| malformed("dictionary key is not ASCII"))?;
            let value = line.get(split + 1..).unwrap_or_default();
            entries.entry(key).or_insert(value);
        }
        let field = |key: &str| {
            entries
                .get(key)
                .copied()
                .ok_or_else(|| VerificationError::Malformed(format!("missing {} entry", key)))
        };

        if field("/SubFilter")? != b"/adbe.pkcs7.detached" {
            return Err(malformed("unsupported signature sub-filter"));
        }
        let sign_time = unescape_literal(field("/SignTime")?)?;
        let sign_time = DateTime::parse_from_rfc3339(&sign_time)
            .map_err(|e| VerificationError::Malformed(format!("invalid sign time: {}", e)))?
            .with_timezone(&Utc);
        let metadata = SignatureMetadata {
            signer_display_name: unescape_literal(field("/Name")?)?,
            reason: unescape_literal(field("/Reason")?)?,
            location: unescape_literal(field("/Location")?)?,
            sign_time,
        };

        let byte_range = parse_range(field("/ByteRange")?)?;
        let excluded = byte_range
            .excluded()
            .filter(|gap| {
                byte_range.first_start == 0
                    && byte_range.document_len() == Some(bytes.len())
                    && gap.start > section_start
                    && gap.len() >= 2
            })
            .ok_or_else(|| malformed("byte range does not cover the document"))?;
        let contents_hex = bytes[excluded]
            .strip_prefix(b"<")
            .and_then(|r| r.strip_suffix(b">"))
            .ok_or_else(|| malformed("byte range gap is not the signature contents"))?;

        Ok(Self {
            metadata,
            byte_range,
            section_start,
            contents_hex,
        })
    }
}

fn parse_range(raw: &[u8]) -> Result<ByteRange, VerificationError> {
    let inner = raw
        .strip_prefix(b"[")
        .and_then(|r| r.strip_suffix(b"]"))
        .and_then(|r| std::str::from_utf8(r).ok())
        .ok_or_else(|| malformed("byte range is not an array"))?;
    let numbers = inner
        .split_ascii_whitespace()
        .map(|n| n.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed("byte range holds a non-integer"))?;
    match numbers.as_slice() {
        &[first_start, first_len, second_start, second_len] => Ok(ByteRange {
            first_start,
            first_len,
            second_start,
            second_len,
        }),
        _ => Err(malformed("byte range must hold four integers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> SignatureMetadata {
        SignatureMetadata {
            signer_display_name: "Ken (PDF) Signer".to_string(),
            reason: "Approve\\Review\nline two".to_string(),
            location: "Connecticut".to_string(),
            sign_time: Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 5).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
        }
    }

    #[test]
    fn test_literal_escaping_round_trips() {
        for value in ["plain", "a (nested) b", "back\\slash", "cr\r lf\n", ")(", ""] {
            let escaped = escape_literal(value);
            assert!(!escaped.contains(&b'\n'));
            assert_eq!(unescape_literal(&escaped).unwrap(), value);
        }
        assert!(unescape_literal(b"(bad\\q)").is_err());
        assert!(unescape_literal(b"missing").is_err());
    }

    #[test]
    fn test_prepare_keeps_prefix_and_reserves_placeholder() {
        let document = b"%PDF-1.7\nbody";
        let envelope = PreparedEnvelope::prepare(document, &metadata(), 32).unwrap();
        let range = *envelope.byte_range();
        let bytes = envelope.fill(&[0x30, 0x03, 0x02, 0x01, 0x01]).unwrap();

        assert!(bytes.starts_with(document));
        let gap = range.excluded().unwrap();
        assert_eq!(range.document_len(), Some(bytes.len()));
        assert_eq!(gap.len(), 2 * 32 + 2);
        assert_eq!(bytes[gap.start], b'<');
        assert_eq!(bytes[gap.end - 1], b'>');
        assert!(bytes[gap].starts_with(b"<3003020101000"));
    }

    #[test]
    fn test_parse_recovers_metadata_and_range() {
        let document = b"0123456789";
        let envelope = PreparedEnvelope::prepare(document, &metadata(), 16).unwrap();
        let expected_range = *envelope.byte_range();
        let bytes = envelope.fill(&[0x05, 0x00]).unwrap();

        let parsed = ParsedEnvelope::parse(&bytes).unwrap();
        assert_eq!(parsed.metadata, metadata());
        assert_eq!(parsed.byte_range, expected_range);
        assert_eq!(parsed.section_start, document.len());
        assert_eq!(parsed.contents_hex.len(), 32);
        assert!(parsed.contents_hex.starts_with(b"0500"));
    }

    #[test]
    fn test_oversized_signed_data_is_encoding_failure() {
        let envelope = PreparedEnvelope::prepare(b"doc", &metadata(), 4).unwrap();
        let err = envelope.fill(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, SigningError::EncodingFailure(_)));
    }

    #[test]
    fn test_digest_excludes_only_placeholder() {
        let envelope = PreparedEnvelope::prepare(b"doc", &metadata(), 8).unwrap();
        let range = *envelope.byte_range();
        let before = envelope.digest().unwrap();
        let filled = envelope.fill(&[0xAB; 8]).unwrap();
        assert_eq!(byte_range_digest(&filled, &range).unwrap(), before);

        let mut tampered = filled.clone();
        tampered[1] ^= 0x01;
        assert_ne!(byte_range_digest(&tampered, &range).unwrap(), before);
    }

    #[test]
    fn test_digest_rejects_range_outside_document() {
        let range = ByteRange {
            first_start: 0,
            first_len: 100,
            second_start: 200,
            second_len: 5,
        };
        assert!(matches!(
            byte_range_digest(b"short", &range),
            Err(ByteRangeError::OutOfBounds { document_len: 5, .. })
        ));

        let overflowing = ByteRange {
            first_start: 0,
            first_len: 1,
            second_start: usize::MAX,
            second_len: 5,
        };
        assert!(matches!(
            byte_range_digest(b"short", &overflowing),
            Err(ByteRangeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_overflowing_byte_range_is_malformed() {
        let signed = PreparedEnvelope::prepare(b"0123456789", &metadata(), 8)
            .unwrap()
            .fill(&[])
            .unwrap();
        let range_at = signed
            .windows(b"/ByteRange [".len())
            .position(|w| w == b"/ByteRange [")
            .unwrap()
            + b"/ByteRange [".len();
        let range_end = range_at + signed[range_at..].iter().position(|b| *b == b']').unwrap();

        let mut crafted = signed[..range_at].to_vec();
        crafted.extend_from_slice(format!("0 1 {} 5", usize::MAX).as_bytes());
        crafted.extend_from_slice(&signed[range_end..]);

        assert!(matches!(
            ParsedEnvelope::parse(&crafted),
            Err(VerificationError::Malformed(_))
        ));
    }

    #[test]
    fn test_unsigned_or_truncated_documents_are_malformed() {
        assert!(matches!(
            ParsedEnvelope::parse(b"no signature here"),
            Err(VerificationError::Malformed(_))
        ));

        let bytes = PreparedEnvelope::prepare(b"doc", &metadata(), 8)
            .unwrap()
            .fill(&[])
            .unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            ParsedEnvelope::parse(truncated),
            Err(VerificationError::Malformed(_))
        ));
    }

    #[test]
    fn test_last_section_wins() {
        let first = PreparedEnvelope::prepare(b"doc", &metadata(), 8)
            .unwrap()
            .fill(&[])
            .unwrap();
        let mut second_meta = metadata();
        second_meta.reason = "countersign".to_string();
        let second = PreparedEnvelope::prepare(&first, &second_meta, 8)
            .unwrap()
            .fill(&[])
            .unwrap();

        let parsed = ParsedEnvelope::parse(&second).unwrap();
        assert_eq!(parsed.metadata.reason, "countersign");
        assert_eq!(parsed.section_start, first.len());
    }
}
