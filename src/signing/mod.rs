//! Detached document signing and verification
//!
//! [`DocumentSigner`] appends a signature section to a document without
//! touching any existing byte, digests everything except the reserved
//! signature placeholder with SHA-512, and stores a detached CMS
//! `SignedData` in the placeholder. [`SignatureVerifier`] reverses the
//! process against the embedded certificate.
//!
//! # Example
//! ```no_run
//! use pki_seal::signing::{DocumentSigner, SignatureVerifier};
//! # fn example(material: &pki_seal::key_material::KeyMaterial) -> anyhow::Result<()> {
//! let signed = DocumentSigner::new().sign(
//!     b"%PDF-1.7 ...",
//!     material,
//!     "Author",
//!     "Certificate of completion",
//!     "Connecticut",
//! )?;
//! let verified = SignatureVerifier::new().verify(&signed)?;
//! println!("signed by {}", verified.fingerprint);
//! # Ok(())
//! # }
//! ```

mod byterange;
mod cms;
mod der;
mod signer;
mod types;
mod verifier;

pub use byterange::byte_range_digest;
pub use signer::{sign, DocumentSigner};
pub use types::{ByteRange, SignatureMetadata, SignatureRequest, VerifiedSignature};
pub use verifier::{verify, SignatureVerifier};

/// Typical encoded signature size; the signer reserves twice this by default
pub const DEFAULT_SIGNATURE_SIZE: usize = 0x2500;
