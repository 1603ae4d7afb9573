use super::byterange::PreparedEnvelope;
use super::cms::build_signed_data;
use super::types::SignatureRequest;
use crate::configs::SigningConfig;
use crate::error::SigningError;
use crate::key_material::KeyMaterial;

/// Applies detached CMS signatures to documents
#[derive(Debug, Clone)]
pub struct DocumentSigner {
    signature_reserve: usize,
    display_name: String,
    reason: String,
    location: String,
}

impl Default for DocumentSigner {
    fn default() -> Self {
        Self::from_config(&SigningConfig::default())
    }
}

impl DocumentSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SigningConfig) -> Self {
        Self {
            signature_reserve: config.signature_reserve_bytes,
            display_name: config.display_name.clone(),
            reason: config.reason.clone(),
            location: config.location.clone(),
        }
    }

    /// Bytes reserved for the encoded signed-data (default `2 * 9472`)
    pub fn with_signature_reserve(mut self, bytes: usize) -> Self {
        self.signature_reserve = bytes;
        self
    }

    pub fn signature_reserve(&self) -> usize {
        self.signature_reserve
    }

    /// Sign `document` now with caller-supplied metadata
    ///
    /// The returned bytes start with `document` unchanged, followed by the
    /// signature section. The input is never modified.
    pub fn sign(
        &self,
        document: &[u8],
        key_material: &KeyMaterial,
        signer_display_name: &str,
        reason: &str,
        location: &str,
    ) -> Result<Vec<u8>, SigningError> {
        let request = SignatureRequest::now(document, signer_display_name, reason, location);
        self.sign_request(&request, key_material)
    }

    /// Sign `document` now with the configured display name, reason and location
    pub fn sign_document(
        &self,
        document: &[u8],
        key_material: &KeyMaterial,
    ) -> Result<Vec<u8>, SigningError> {
        self.sign(
            document,
            key_material,
            &self.display_name,
            &self.reason,
            &self.location,
        )
    }

    /// Sign with an explicit request, including its signing time
    ///
    /// # Errors
    /// - [`SigningError::MissingKeyMaterial`] if the chain is empty, the
    ///   private key is absent or does not belong to the leaf certificate.
    /// - [`SigningError::DigestFailure`] if the byte-range digest fails.
    /// - [`SigningError::EncodingFailure`] if the signed-data cannot be built or
    ///   does not fit the reserved placeholder.
    #[tracing::instrument(
        skip_all,
        fields(document_len = request.document.len(), signer = %request.signer_display_name)
    )]
    pub fn sign_request(
        &self,
        request: &SignatureRequest<'_>,
        key_material: &KeyMaterial,
    ) -> Result<Vec<u8>, SigningError> {
        if let Some(problem) = key_material.completeness_problem() {
            return Err(SigningError::MissingKeyMaterial(problem));
        }
        let private_key = match key_material.private_key() {
            Some(Ok(key)) => key,
            Some(Err(e)) => {
                return Err(SigningError::MissingKeyMaterial(format!(
                    "private key could not be restored: {}",
                    e
                )))
            }
            None => {
                return Err(SigningError::MissingKeyMaterial(
                    "private key is absent".to_string(),
                ))
            }
        };

        let envelope =
            PreparedEnvelope::prepare(request.document, &request.metadata(), self.signature_reserve)?;
        let digest = envelope.digest()?;
        let byte_range = *envelope.byte_range();
        tracing::debug!(byte_range = ?byte_range.as_array(), "byte range digested");

        let signed_data = build_signed_data(
            key_material.chain(),
            &private_key,
            &digest,
            &request.sign_time,
        )?;
        let signed_len = signed_data.len();
        let signed = envelope.fill(&signed_data)?;

        tracing::info!(
            signed_data_len = signed_len,
            reserve = self.signature_reserve,
            "document signed"
        );
        Ok(signed)
    }
}

/// Sign `document` with the default signer
pub fn sign(
    document: &[u8],
    key_material: &KeyMaterial,
    signer_display_name: &str,
    reason: &str,
    location: &str,
) -> Result<Vec<u8>, SigningError> {
    DocumentSigner::new().sign(document, key_material, signer_display_name, reason, location)
}
