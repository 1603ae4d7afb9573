//! Error kinds for each component.
//!
//! Every component surfaces a closed enumeration so callers can match on the
//! failure kind instead of inspecting message text.

use openssl::error::ErrorStack;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of [`crate::key_store::KeyMaterialStore::ensure`].
///
/// `Create` and `Load` are never conflated: a container that exists but cannot
/// be opened is always `Load`, even when the caller only wanted a fresh one.
#[derive(Debug, Error)]
pub enum KeyMaterialError {
    /// Key generation, certificate building, serialization or the first write failed.
    #[error("Failed to create key material at {}: {reason}", path.display())]
    Create { path: PathBuf, reason: String },

    /// The container exists but could not be opened or parsed.
    #[error("Failed to load key material from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}

impl KeyMaterialError {
    pub(crate) fn create(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Create {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure while building a self-signed certificate. No partial certificate is
/// ever returned alongside it.
#[derive(Debug, Error)]
pub enum CertificateBuildError {
    #[error("Failed to {step}: {source}")]
    OpenSsl {
        step: &'static str,
        #[source]
        source: ErrorStack,
    },

    #[error("Invalid certificate parameters: {0}")]
    InvalidParameters(String),
}

impl CertificateBuildError {
    pub(crate) fn openssl(step: &'static str, source: ErrorStack) -> Self {
        Self::OpenSsl { step, source }
    }
}

/// Failures of [`crate::signing::DocumentSigner::sign`]. All are terminal for
/// the call and no partial output is produced.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Private key or certificate chain absent, or the key does not belong to the leaf.
    #[error("Key material unavailable: {0}")]
    MissingKeyMaterial(String),

    #[error("Failed to digest document: {0}")]
    DigestFailure(#[source] ErrorStack),

    /// Signed-data assembly or document write failed.
    #[error("Failed to encode signature: {0}")]
    EncodingFailure(String),
}

/// Failure of [`crate::signing::byte_range_digest`].
#[derive(Debug, Error)]
pub enum ByteRangeError {
    /// The range overflows or reaches past the end of the document.
    #[error("Byte range {range:?} does not fit a document of {document_len} bytes")]
    OutOfBounds {
        range: [usize; 4],
        document_len: usize,
    },

    #[error("Failed to digest byte range: {0}")]
    Digest(#[from] ErrorStack),
}

/// The certificate's canonical encoding could not be produced.
#[derive(Debug, Error)]
#[error("Failed to encode certificate for fingerprinting: {0}")]
pub struct FingerprintError(#[from] pub ErrorStack);

/// Failures of [`crate::signing::SignatureVerifier::verify`].
#[derive(Debug, Error)]
pub enum VerificationError {
    /// No signature section, bad byte range, or undecodable signed-data.
    #[error("Malformed signed document: {0}")]
    Malformed(String),

    /// The recomputed byte-range digest differs from the signed messageDigest.
    #[error("Document digest does not match the signed digest")]
    DigestMismatch,

    /// The RSA signature over the signed attributes does not verify.
    #[error("Signature does not verify against the embedded certificate")]
    SignatureInvalid,

    #[error("Cryptographic failure during verification: {0}")]
    Crypto(#[from] ErrorStack),
}

impl From<ByteRangeError> for VerificationError {
    fn from(err: ByteRangeError) -> Self {
        match err {
            ByteRangeError::OutOfBounds { .. } => Self::Malformed(err.to_string()),
            ByteRangeError::Digest(e) => Self::Crypto(e),
        }
    }
}

impl From<ByteRangeError> for SigningError {
    fn from(err: ByteRangeError) -> Self {
        match err {
            ByteRangeError::OutOfBounds { .. } => Self::EncodingFailure(err.to_string()),
            ByteRangeError::Digest(e) => Self::DigestFailure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_material_error_messages_name_path() {
        let err = KeyMaterialError::load("/tmp/store.p12", "mac verify failure");
        assert!(matches!(err, KeyMaterialError::Load { .. }));
        assert_eq!(
            err.to_string(),
            "Failed to load key material from /tmp/store.p12: mac verify failure"
        );

        let err = KeyMaterialError::create("/tmp/store.p12", "disk full");
        assert!(matches!(err, KeyMaterialError::Create { .. }));
        assert!(err.to_string().starts_with("Failed to create key material"));
    }

    #[test]
    fn test_out_of_bounds_range_maps_per_component() {
        let err = || ByteRangeError::OutOfBounds {
            range: [0, 100, 200, 5],
            document_len: 5,
        };
        assert!(matches!(
            VerificationError::from(err()),
            VerificationError::Malformed(_)
        ));
        assert!(matches!(
            SigningError::from(err()),
            SigningError::EncodingFailure(_)
        ));
        assert!(err().to_string().contains("5 bytes"));
    }

    #[test]
    fn test_invalid_parameters_message() {
        let err = CertificateBuildError::InvalidParameters("validity must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid certificate parameters: validity must be positive"
        );
    }
}
