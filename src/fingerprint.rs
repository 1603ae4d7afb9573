//! Certificate fingerprints for out-of-band verification
//!
//! A fingerprint is the SHA-256 digest of the certificate's DER encoding,
//! rendered as uppercase hex octets joined by `:`. It is recomputed on demand
//! and never persisted.

use crate::error::FingerprintError;
use openssl::x509::X509Ref;
use sha2::{Digest, Sha256};
use std::fmt;

/// Shown in place of a fingerprint that could not be computed
pub const FINGERPRINT_UNAVAILABLE: &str = "Certificate fingerprint not available";

/// SHA-256 digest of a certificate's DER encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(certificate: &X509Ref) -> Result<Self, FingerprintError> {
        let der = certificate.to_der()?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&der));
        Ok(Self(digest))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self.0.iter().map(|b| hex::encode_upper([*b])).collect();
        f.write_str(&octets.join(":"))
    }
}

/// Colon-separated uppercase SHA-256 fingerprint of `certificate`
pub fn fingerprint(certificate: &X509Ref) -> Result<String, FingerprintError> {
    Fingerprint::of(certificate).map(|fp| fp.to_string())
}

/// Display string for a verification page: the fingerprint, or an explicit
/// "not available" indicator. Never an empty string.
pub fn fingerprint_or_unavailable(result: Result<String, FingerprintError>) -> String {
    match result {
        Ok(fp) => fp,
        Err(e) => {
            tracing::warn!(error = %e, "could not compute certificate fingerprint");
            FINGERPRINT_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_signing_cert::issue_self_signed;
    use crate::key_store::generate_key_pair;
    use openssl::x509::X509;
    use std::collections::HashSet;

    fn certificate(cn: &str) -> X509 {
        issue_self_signed(&generate_key_pair(2048).unwrap(), cn).unwrap()
    }

    // Smaller keys keep the 100-certificate corpus quick
    fn corpus_certificate(cn: &str) -> X509 {
        issue_self_signed(&generate_key_pair(1024).unwrap(), cn).unwrap()
    }

    #[test]
    fn test_format_is_uppercase_colon_hex() {
        let fp = fingerprint(&certificate("Format")).unwrap();
        let octets: Vec<&str> = fp.split(':').collect();
        assert_eq!(octets.len(), 32);
        assert_eq!(fp.len(), 32 * 3 - 1);
        for octet in octets {
            assert_eq!(octet.len(), 2);
            assert!(octet
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn test_matches_sha256_of_der() {
        let cert = certificate("Digest");
        let expected = openssl::sha::sha256(&cert.to_der().unwrap());
        let fp = Fingerprint::of(&cert).unwrap();
        assert_eq!(fp.as_bytes(), &expected);
        assert_eq!(
            fp.to_string().replace(':', ""),
            hex::encode_upper(expected)
        );
    }

    #[test]
    fn test_deterministic_across_reencoding() {
        let cert = certificate("Stable");
        let reparsed = X509::from_der(&cert.to_der().unwrap()).unwrap();
        let first = fingerprint(&cert).unwrap();
        assert_eq!(first, fingerprint(&cert).unwrap());
        assert_eq!(first, fingerprint(&reparsed).unwrap());
    }

    #[test]
    fn test_distinct_certificates_have_distinct_fingerprints() {
        let fingerprints: HashSet<String> = (0..100)
            .map(|i| fingerprint(&corpus_certificate(&format!("Signer {}", i))).unwrap())
            .collect();
        assert_eq!(fingerprints.len(), 100);
    }

    #[test]
    fn test_failure_degrades_to_indicator() {
        let err = FingerprintError(openssl::error::ErrorStack::get());
        assert_eq!(fingerprint_or_unavailable(Err(err)), FINGERPRINT_UNAVAILABLE);
        assert_eq!(
            fingerprint_or_unavailable(Ok("AA:BB".to_string())),
            "AA:BB"
        );
    }
}
