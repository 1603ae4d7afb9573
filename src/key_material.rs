//! In-memory signing identity
//!
//! [`KeyMaterial`] bundles the private key, its public half and the
//! certificate chain (leaf first). The private key is kept as DER inside a
//! `secrecy` wrapper so it is zeroized on drop and never shows up in `Debug`
//! output; it is only reconstructed for the duration of a signing call.

use openssl::pkey::{PKey, Private, Public};
use openssl::x509::{X509Ref, X509};
use secrecy::{ExposeSecret, Secret, Zeroize};
use std::fmt;

/// Private key DER that implements Zeroize
struct SecurePrivateKey {
    der_bytes: Vec<u8>,
}

impl Zeroize for SecurePrivateKey {
    fn zeroize(&mut self) {
        self.der_bytes.zeroize();
    }
}

/// Key pair plus certificate chain
///
/// Material returned by [`crate::key_store::KeyMaterialStore::ensure`] always
/// has a private key matching `chain[0]` and a non-empty chain. Material built
/// with [`KeyMaterial::from_parts`] is checked lazily by the signer instead.
pub struct KeyMaterial {
    private_key: Option<Secret<SecurePrivateKey>>,
    public_key: Option<PKey<Public>>,
    chain: Vec<X509>,
}

impl KeyMaterial {
    /// Assemble key material from its parts without validating them
    pub fn from_parts(
        private_key: Option<&PKey<Private>>,
        chain: Vec<X509>,
    ) -> Result<Self, openssl::error::ErrorStack> {
        let (private_key, public_key) = match private_key {
            Some(key) => {
                let der_bytes = key.private_key_to_der()?;
                let public_key = PKey::public_key_from_der(&key.public_key_to_der()?)?;
                (
                    Some(Secret::new(SecurePrivateKey { der_bytes })),
                    Some(public_key),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            private_key,
            public_key,
            chain,
        })
    }

    /// The leaf certificate, if any
    pub fn certificate(&self) -> Option<&X509Ref> {
        self.chain.first().map(|cert| &**cert)
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    pub fn public_key(&self) -> Option<&PKey<Public>> {
        self.public_key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Describe why this material cannot sign, if it cannot
    pub fn completeness_problem(&self) -> Option<String> {
        let Some(leaf) = self.certificate() else {
            return Some("certificate chain is empty".to_string());
        };
        let Some(public_key) = &self.public_key else {
            return Some("private key is absent".to_string());
        };
        match leaf.public_key() {
            Ok(leaf_key) if leaf_key.public_eq(public_key) => None,
            Ok(_) => Some("private key does not match the leaf certificate".to_string()),
            Err(e) => Some(format!("leaf certificate public key unreadable: {}", e)),
        }
    }

    /// Temporarily reconstruct the private key
    pub(crate) fn private_key(&self) -> Option<Result<PKey<Private>, openssl::error::ErrorStack>> {
        self.private_key
            .as_ref()
            .map(|secret| PKey::private_key_from_der(&secret.expose_secret().der_bytes))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subjects: Vec<String> = self
            .chain
            .iter()
            .map(|cert| {
                cert.subject_name()
                    .entries()
                    .filter_map(|entry| entry.data().as_utf8().ok().map(|s| s.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();
        f.debug_struct("KeyMaterial")
            .field(
                "private_key",
                &if self.private_key.is_some() {
                    "<securely stored>"
                } else {
                    "<absent>"
                },
            )
            .field("chain", &subjects)
            .finish()
    }
}
