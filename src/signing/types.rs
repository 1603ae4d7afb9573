use chrono::{DateTime, Utc};
use openssl::x509::X509;
use std::ops::Range;

/// Caller-supplied input to one signing call
#[derive(Debug, Clone)]
pub struct SignatureRequest<'a> {
    pub document: &'a [u8],
    pub signer_display_name: &'a str,
    pub reason: &'a str,
    pub location: &'a str,
    pub sign_time: DateTime<Utc>,
}

impl<'a> SignatureRequest<'a> {
    /// Request stamped with the current time
    pub fn now(
        document: &'a [u8],
        signer_display_name: &'a str,
        reason: &'a str,
        location: &'a str,
    ) -> Self {
        Self {
            document,
            signer_display_name,
            reason,
            location,
            sign_time: Utc::now(),
        }
    }

    pub(crate) fn metadata(&self) -> SignatureMetadata {
        SignatureMetadata {
            signer_display_name: self.signer_display_name.to_string(),
            reason: self.reason.to_string(),
            location: self.location.to_string(),
            sign_time: self.sign_time,
        }
    }
}

/// Signature metadata embedded in, and recovered from, a signed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMetadata {
    pub signer_display_name: String,
    pub reason: String,
    pub location: String,
    pub sign_time: DateTime<Utc>,
}

/// The two byte spans covered by the document digest: `[0, first_len)` and
/// `[second_start, second_start + second_len)`. The gap between them is the
/// hex-encoded signature placeholder including its angle brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub first_start: usize,
    pub first_len: usize,
    pub second_start: usize,
    pub second_len: usize,
}

impl ByteRange {
    pub fn as_array(&self) -> [usize; 4] {
        [
            self.first_start,
            self.first_len,
            self.second_start,
            self.second_len,
        ]
    }

    /// Bytes excluded from the digest, or `None` if the range is inverted or
    /// overflows
    pub fn excluded(&self) -> Option<Range<usize>> {
        let start = self.first_start.checked_add(self.first_len)?;
        (start <= self.second_start).then_some(start..self.second_start)
    }

    /// Total length of the document this range describes, or `None` on overflow
    pub fn document_len(&self) -> Option<usize> {
        self.second_start.checked_add(self.second_len)
    }

    /// The covered spans of `bytes`, or `None` if they fall outside it
    pub fn covered<'b>(&self, bytes: &'b [u8]) -> Option<[&'b [u8]; 2]> {
        let first_end = self.first_start.checked_add(self.first_len)?;
        let first = bytes.get(self.first_start..first_end)?;
        let second = bytes.get(self.second_start..self.document_len()?)?;
        Some([first, second])
    }
}

/// Outcome of a successful verification
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    pub metadata: SignatureMetadata,
    pub byte_range: ByteRange,
    /// Length of the document as it was before the signature section was appended
    pub signed_revision_len: usize,
    /// Leaf certificate that produced the signature
    pub certificate: X509,
    pub fingerprint: String,
}
