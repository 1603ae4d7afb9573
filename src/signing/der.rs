//! Minimal DER encoding and decoding for the CMS structures this crate emits.
//!
//! Only definite lengths and single-byte tags are supported, which covers
//! `SignedData` and X.509 certificates.

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;
/// `[0]` constructed, context-specific
pub const TAG_CONTEXT_0: u8 = 0xA0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("unsupported length encoding")]
    UnsupportedLength,
    #[error("unsupported multi-byte tag")]
    UnsupportedTag,
    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },
}

// ================= Encoding =================

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

pub fn encode(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    push_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    encode(TAG_SEQUENCE, &items.concat())
}

/// `SET OF` with elements in DER canonical (sorted) order
pub fn set_of(mut items: Vec<Vec<u8>>) -> Vec<u8> {
    items.sort();
    encode(TAG_SET, &items.concat())
}

/// Non-negative INTEGER below 128
pub fn small_integer(value: u8) -> Vec<u8> {
    debug_assert!(value < 0x80);
    encode(TAG_INTEGER, &[value])
}

pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    encode(TAG_OCTET_STRING, bytes)
}

pub fn null() -> Vec<u8> {
    encode(TAG_NULL, &[])
}

/// OBJECT IDENTIFIER from its arcs, e.g. `&[1, 2, 840, 113549, 1, 7, 2]`
pub fn oid(arcs: &[u64]) -> Vec<u8> {
    let mut content = Vec::new();
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (a * 40 + b, rest),
        [a] => (a * 40, &[][..]),
        [] => return encode(TAG_OID, &[]),
    };
    for arc in std::iter::once(first).chain(rest.iter().copied()) {
        let mut groups = vec![(arc & 0x7F) as u8];
        let mut remaining = arc >> 7;
        while remaining > 0 {
            groups.push(0x80 | (remaining & 0x7F) as u8);
            remaining >>= 7;
        }
        groups.reverse();
        content.extend_from_slice(&groups);
    }
    encode(TAG_OID, &content)
}

/// CMS `Time`: UTCTime for 1950-2049, GeneralizedTime otherwise
pub fn time(at: &DateTime<Utc>) -> Vec<u8> {
    if (1950..2050).contains(&at.year()) {
        encode(TAG_UTC_TIME, at.format("%y%m%d%H%M%SZ").to_string().as_bytes())
    } else {
        encode(
            TAG_GENERALIZED_TIME,
            at.format("%Y%m%d%H%M%SZ").to_string().as_bytes(),
        )
    }
}

// ================= Decoding =================

/// One decoded tag-length-value element
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
    /// The complete encoding, header included
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Parse one element from the front of `input`, returning the remainder
    pub fn parse(input: &'a [u8]) -> Result<(Self, &'a [u8]), DerError> {
        let (&tag, rest) = input.split_first().ok_or(DerError::Truncated)?;
        if tag & 0x1F == 0x1F {
            return Err(DerError::UnsupportedTag);
        }
        let (&first, mut rest) = rest.split_first().ok_or(DerError::Truncated)?;

        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            if count == 0 || count > std::mem::size_of::<usize>() {
                return Err(DerError::UnsupportedLength);
            }
            if rest.len() < count {
                return Err(DerError::Truncated);
            }
            let len = rest[..count]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            rest = &rest[count..];
            len
        };

        if rest.len() < len {
            return Err(DerError::Truncated);
        }
        let header_len = input.len() - rest.len();
        let tlv = Tlv {
            tag,
            content: &rest[..len],
            raw: &input[..header_len + len],
        };
        Ok((tlv, &rest[len..]))
    }

    /// Parse exactly one element carrying `tag` from the front of `input`
    pub fn expect(input: &'a [u8], tag: u8) -> Result<(Self, &'a [u8]), DerError> {
        let (tlv, rest) = Self::parse(input)?;
        if tlv.tag != tag {
            return Err(DerError::UnexpectedTag {
                expected: tag,
                found: tlv.tag,
            });
        }
        Ok((tlv, rest))
    }

    /// Decode the content as a run of elements
    pub fn children(&self) -> Result<Vec<Tlv<'a>>, DerError> {
        let mut items = Vec::new();
        let mut rest = self.content;
        while !rest.is_empty() {
            let (item, next) = Tlv::parse(rest)?;
            items.push(item);
            rest = next;
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_oid_encoding_matches_known_values() {
        // id-signedData
        assert_eq!(
            oid(&[1, 2, 840, 113549, 1, 7, 2]),
            [0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02]
        );
        // id-sha512
        assert_eq!(
            oid(&[2, 16, 840, 1, 101, 3, 4, 2, 3]),
            [0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03]
        );
    }

    #[test]
    fn test_long_form_lengths() {
        let content = vec![0u8; 300];
        let encoded = encode(TAG_OCTET_STRING, &content);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2C]);

        let (tlv, rest) = Tlv::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(tlv.content.len(), 300);
        assert_eq!(tlv.raw.len(), encoded.len());
    }

    #[test]
    fn test_set_of_sorts_elements() {
        let set = set_of(vec![vec![0x02, 0x01, 0x05], vec![0x02, 0x01, 0x01]]);
        assert_eq!(set, [0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x05]);
    }

    #[test]
    fn test_time_uses_utc_time_before_2050() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 5).unwrap();
        assert_eq!(time(&at)[2..], *b"261018093005Z");
        assert_eq!(time(&at)[0], TAG_UTC_TIME);

        let later = Utc.with_ymd_and_hms(2051, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(time(&later)[0], TAG_GENERALIZED_TIME);
        assert_eq!(time(&later)[2..], *b"20510102030405Z");
    }

    #[test]
    fn test_children_and_trailing_padding() {
        let inner = sequence(&[small_integer(1), null()]);
        let mut padded = inner.clone();
        padded.extend_from_slice(&[0, 0, 0]);

        let (tlv, rest) = Tlv::expect(&padded, TAG_SEQUENCE).unwrap();
        assert_eq!(rest, &[0, 0, 0]);
        let children = tlv.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].content, &[1]);
        assert_eq!(children[1].tag, TAG_NULL);
    }

    #[test]
    fn test_truncated_and_wrong_tag() {
        assert_eq!(Tlv::parse(&[0x30, 0x05, 0x01]).unwrap_err(), DerError::Truncated);
        assert_eq!(
            Tlv::expect(&null(), TAG_SEQUENCE).unwrap_err(),
            DerError::UnexpectedTag {
                expected: TAG_SEQUENCE,
                found: TAG_NULL
            }
        );
        assert_eq!(Tlv::parse(&[0x30, 0x80]).unwrap_err(), DerError::UnsupportedLength);
    }
}
