use super::byterange::{byte_range_digest, ParsedEnvelope};
use super::cms::parse_signed_data;
use super::der::Tlv;
use super::types::VerifiedSignature;
use crate::error::VerificationError;
use crate::fingerprint::{fingerprint, fingerprint_or_unavailable};
use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::sign::Verifier;
use openssl::x509::X509;

/// Checks signatures produced by [`super::DocumentSigner`]
///
/// Verification is advisory: it proves the document matches what the
/// embedded certificate signed, not that the certificate is trusted. Callers
/// compare the returned fingerprint out of band.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify the last signature section of `signed`
    ///
    /// # Errors
    /// - [`VerificationError::Malformed`] if there is no well-formed signature
    ///   section or its signed-data cannot be decoded.
    /// - [`VerificationError::DigestMismatch`] if any covered byte changed.
    /// - [`VerificationError::SignatureInvalid`] if the RSA signature over the
    ///   signed attributes does not verify with the embedded certificate.
    #[tracing::instrument(skip_all, fields(document_len = signed.len()))]
    pub fn verify(&self, signed: &[u8]) -> Result<VerifiedSignature, VerificationError> {
        let envelope = ParsedEnvelope::parse(signed)?;

        let contents = hex::decode(envelope.contents_hex).map_err(|e| {
            VerificationError::Malformed(format!("signature contents are not hex: {}", e))
        })?;
        // Trailing zero padding is not part of the structure
        let (content_info, _) = Tlv::parse(&contents)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        let signed_data = parse_signed_data(content_info.raw)?;

        let digest = byte_range_digest(signed, &envelope.byte_range)?;
        if digest.len() != signed_data.message_digest.len()
            || !memcmp::eq(&digest, signed_data.message_digest)
        {
            tracing::warn!("byte range digest does not match signed message digest");
            return Err(VerificationError::DigestMismatch);
        }

        let certificate = X509::from_der(signed_data.signer_certificate).map_err(|e| {
            VerificationError::Malformed(format!("embedded certificate unreadable: {}", e))
        })?;
        let public_key = certificate.public_key()?;
        let mut verifier = Verifier::new(MessageDigest::sha512(), &public_key)?;
        // OpenSSL reports a bad padding as an error rather than `false`
        let valid = verifier
            .verify_oneshot(signed_data.signature, &signed_data.signed_attributes)
            .unwrap_or(false);
        if !valid {
            tracing::warn!("signature over signed attributes does not verify");
            return Err(VerificationError::SignatureInvalid);
        }

        let fingerprint = fingerprint_or_unavailable(fingerprint(&certificate));
        tracing::info!(
            signer = %envelope.metadata.signer_display_name,
            fingerprint = %fingerprint,
            "signature verified"
        );

        Ok(VerifiedSignature {
            metadata: envelope.metadata,
            byte_range: envelope.byte_range,
            signed_revision_len: envelope.section_start,
            certificate,
            fingerprint,
        })
    }
}

/// Verify `signed` with the default verifier
pub fn verify(signed: &[u8]) -> Result<VerifiedSignature, VerificationError> {
    SignatureVerifier::new().verify(signed)
}
