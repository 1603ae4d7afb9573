//! PKCS#12 container encoding
//!
//! The signing identity is persisted as a password-protected PKCS#12 file
//! holding a single key entry: the private key, the leaf certificate and any
//! further chain certificates.

use crate::key_material::KeyMaterial;
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;

/// Encode a key entry named `alias` into PKCS#12 DER
pub fn encode_pfx(
    private_key: &PKey<Private>,
    chain: &[X509],
    alias: &str,
    passphrase: &str,
) -> Result<Vec<u8>, ErrorStack> {
    let mut builder = Pkcs12::builder();
    builder.name(alias).pkey(private_key);

    if let Some((leaf, rest)) = chain.split_first() {
        builder.cert(leaf);
        if !rest.is_empty() {
            let mut ca = Stack::new()?;
            for cert in rest {
                ca.push(cert.clone())?;
            }
            builder.ca(ca);
        }
    }

    builder.build2(passphrase)?.to_der()
}

/// Decode PKCS#12 DER into key material without checking completeness
pub fn decode_pfx(der: &[u8], passphrase: &str) -> Result<KeyMaterial, ErrorStack> {
    let parsed = Pkcs12::from_der(der)?.parse2(passphrase)?;

    let mut chain = Vec::new();
    if let Some(cert) = parsed.cert {
        chain.push(cert);
    }
    if let Some(ca) = parsed.ca {
        chain.extend(ca);
    }

    KeyMaterial::from_parts(parsed.pkey.as_ref(), chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_signing_cert::issue_self_signed;
    use openssl::rsa::Rsa;

    #[test]
    fn test_encoded_container_requires_passphrase() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let cert = issue_self_signed(&key, "Container Owner").unwrap();
        let der = encode_pfx(&key, &[cert.clone()], "authorKey", "correct horse").unwrap();

        let material = decode_pfx(&der, "correct horse").unwrap();
        assert!(material.completeness_problem().is_none());
        assert_eq!(
            material.certificate().unwrap().to_der().unwrap(),
            cert.to_der().unwrap()
        );

        assert!(decode_pfx(&der, "wrong").is_err());
        assert!(decode_pfx(b"not a container", "correct horse").is_err());
    }

    #[test]
    fn test_alias_is_recorded_as_friendly_name() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let cert = issue_self_signed(&key, "Alias Owner").unwrap();
        let der = encode_pfx(&key, &[cert], "authorKey", "pw").unwrap();

        let parsed = Pkcs12::from_der(&der).unwrap().parse2("pw").unwrap();
        let alias = parsed.cert.unwrap().alias().map(|a| a.to_vec());
        assert_eq!(alias.as_deref(), Some(&b"authorKey"[..]));
    }
}
