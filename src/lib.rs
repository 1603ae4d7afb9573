//! PKI Seal - Self-signed Document Signing Identity
//!
//! Issues a long-lived self-signed signing identity, keeps it in a
//! passphrase-protected PKCS#12 container, applies detached CMS signatures to
//! documents and derives a stable certificate fingerprint for out-of-band
//! verification.
//!
//! # Overview
//!
//! ```text
//! KeyMaterialStore::ensure ──► PKCS#12 container (created once, then loaded)
//!        │
//!        ▼
//!   KeyMaterial ──► DocumentSigner::sign ──► signed bytes
//!        │                                      │
//!        ▼                                      ▼
//!   fingerprint()  ◄──── compare ────  SignatureVerifier::verify
//! ```
//!
//! The certificate is self-signed on purpose. Verification proves that a
//! document is unchanged since the embedded certificate signed it; whether that
//! certificate belongs to the expected signer is settled by comparing
//! fingerprints, not by chain validation.
//!
//! # Quick Start
//!
//! ```no_run
//! use pki_seal::configs::AppConfig;
//! use pki_seal::fingerprint::{fingerprint, fingerprint_or_unavailable};
//! use pki_seal::key_store::KeyMaterialStore;
//! use pki_seal::signing::{DocumentSigner, SignatureVerifier};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let config = AppConfig::load()?;
//!
//!     // Create or load the signing identity
//!     let material = KeyMaterialStore::from_config(&config).ensure()?;
//!
//!     // Sign with the configured name, reason and location
//!     let signer = DocumentSigner::from_config(&config.signing);
//!     let signed = signer.sign_document(b"%PDF-1.7 ...", &material)?;
//!
//!     // Verify and compare fingerprints
//!     let verified = SignatureVerifier::new().verify(&signed)?;
//!     let expected = fingerprint_or_unavailable(
//!         fingerprint(material.certificate().expect("ensure returns a chain")),
//!     );
//!     assert_eq!(verified.fingerprint, expected);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! ## [`key_store`]
//!
//! Create-or-load of the container at a configurable path. First-time creation
//! is serialised by a lock file next to the container ([`path_lock`]) and
//! published with a no-clobber rename, so concurrent callers converge on one
//! identity.
//!
//! ## [`passphrase`]
//!
//! Explicit, ordered passphrase resolution: environment variable, then
//! configuration property, then the documented `changeit` fallback, which is
//! logged as insecure whenever it is used.
//!
//! ## [`generate_signing_cert`]
//!
//! Builder for the self-signed certificate: critical basicConstraints
//! (CA=false), keyUsage (digitalSignature, nonRepudiation) and
//! extendedKeyUsage, SHA-512 self-signature, 3650-day validity.
//!
//! ## [`signing`]
//!
//! Byte-range signing: the input is kept byte-for-byte, a signature section is
//! appended and the CMS `SignedData` is written into its reserved placeholder.
//!
//! ## [`fingerprint`]
//!
//! SHA-256 over the certificate DER as colon-separated uppercase hex.
//!
//! # Security Considerations
//!
//! - ⚠️ The fallback passphrase is public. Set the environment variable or the
//!   configuration property in any real deployment.
//! - ⚠️ The extended key usage OIDs approximate "document signing"; there is no
//!   portable public OID for it. Strict PAdES validators may reject them.
//! - ✅ Private key bytes are held in a zeroizing secret and redacted from
//!   `Debug` output.
//! - ✅ A failed signing call returns an error and no bytes.
//!
//! # Error Handling
//!
//! Each component returns its own closed error enumeration from [`error`];
//! callers match on the kind. Configuration loading returns `anyhow::Result`.
//!
//! ```no_run
//! use pki_seal::error::KeyMaterialError;
//! use pki_seal::key_store::ensure;
//! use pki_seal::passphrase::PassphraseResolver;
//!
//! match ensure("keys/author.p12", PassphraseResolver::fixed("secret")) {
//!     Ok(material) => println!("{:?}", material),
//!     Err(KeyMaterialError::Load { reason, .. }) => eprintln!("wrong passphrase? {}", reason),
//!     Err(KeyMaterialError::Create { reason, .. }) => eprintln!("cannot create: {}", reason),
//! }
//! ```

pub mod configs;
pub mod error;
pub mod fingerprint;
pub mod generate_signing_cert;
pub mod key_material;
pub mod key_store;
pub mod passphrase;
pub mod path_lock;
pub mod pfx_container;
pub mod signing;

pub use error::{
    ByteRangeError, CertificateBuildError, FingerprintError, KeyMaterialError, SigningError, VerificationError,
};
pub use fingerprint::{fingerprint, fingerprint_or_unavailable, Fingerprint};
pub use key_material::KeyMaterial;
pub use key_store::KeyMaterialStore;
pub use passphrase::{PassphraseResolver, PassphraseSource};
pub use signing::{DocumentSigner, SignatureRequest, SignatureVerifier, VerifiedSignature};
