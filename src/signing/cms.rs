//! Detached CMS `SignedData` (RFC 5652) with SHA-512 and RSA
//!
//! Built by hand on top of [`super::der`] so the digest algorithm and the
//! signed attribute set are fixed: contentType, signingTime and
//! messageDigest, signed with RSA PKCS#1 v1.5 over SHA-512.

use super::der::{self, Tlv, TAG_CONTEXT_0, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET};
use crate::error::{SigningError, VerificationError};
use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;

const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
const OID_CONTENT_TYPE: &[u64] = &[1, 2, 840, 113549, 1, 9, 3];
const OID_MESSAGE_DIGEST: &[u64] = &[1, 2, 840, 113549, 1, 9, 4];
const OID_SIGNING_TIME: &[u64] = &[1, 2, 840, 113549, 1, 9, 5];
const OID_SHA512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 3];
const OID_RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];

fn malformed(reason: impl ToString) -> VerificationError {
    VerificationError::Malformed(reason.to_string())
}

fn encoding(reason: impl ToString) -> SigningError {
    SigningError::EncodingFailure(reason.to_string())
}

fn attribute(oid: &[u64], value: Vec<u8>) -> Vec<u8> {
    der::sequence(&[der::oid(oid), der::set_of(vec![value])])
}

/// `IssuerAndSerialNumber` taken verbatim from a certificate's TBS part
pub(crate) fn issuer_and_serial(certificate_der: &[u8]) -> Result<Vec<u8>, der::DerError> {
    let (certificate, _) = Tlv::expect(certificate_der, TAG_SEQUENCE)?;
    let (tbs, _) = Tlv::expect(certificate.content, TAG_SEQUENCE)?;
    let mut fields = tbs.children()?.into_iter();

    // Optional [0] EXPLICIT version
    let mut serial = fields.next().ok_or(der::DerError::Truncated)?;
    if serial.tag == TAG_CONTEXT_0 {
        serial = fields.next().ok_or(der::DerError::Truncated)?;
    }
    let _signature_algorithm = fields.next().ok_or(der::DerError::Truncated)?;
    let issuer = fields.next().ok_or(der::DerError::Truncated)?;

    Ok(der::sequence(&[issuer.raw.to_vec(), serial.raw.to_vec()]))
}

/// Encode a detached `ContentInfo` carrying `SignedData` over content whose
/// SHA-512 is `message_digest`
pub(crate) fn build_signed_data(
    chain: &[X509],
    private_key: &PKey<Private>,
    message_digest: &[u8],
    signing_time: &DateTime<Utc>,
) -> Result<Vec<u8>, SigningError> {
    let leaf = chain
        .first()
        .ok_or_else(|| SigningError::MissingKeyMaterial("certificate chain is empty".into()))?;
    let leaf_der = leaf.to_der().map_err(encoding)?;
    let signer_id = issuer_and_serial(&leaf_der).map_err(encoding)?;

    let certificates = chain
        .iter()
        .map(|cert| cert.to_der())
        .collect::<Result<Vec<_>, _>>()
        .map_err(encoding)?;

    let signed_attrs = der::set_of(vec![
        attribute(OID_CONTENT_TYPE, der::oid(OID_DATA)),
        attribute(OID_SIGNING_TIME, der::time(signing_time)),
        attribute(OID_MESSAGE_DIGEST, der::octet_string(message_digest)),
    ]);

    // The signature covers the attributes encoded as a SET OF
    let mut signer = Signer::new(MessageDigest::sha512(), private_key).map_err(encoding)?;
    let signature = signer
        .sign_oneshot_to_vec(&signed_attrs)
        .map_err(encoding)?;

    // ...but they are stored as [0] IMPLICIT
    let mut implicit_attrs = signed_attrs;
    implicit_attrs[0] = TAG_CONTEXT_0;

    let sha512 = der::sequence(&[der::oid(OID_SHA512)]);
    let signer_info = der::sequence(&[
        der::small_integer(1),
        signer_id,
        sha512.clone(),
        implicit_attrs,
        der::sequence(&[der::oid(OID_RSA_ENCRYPTION), der::null()]),
        der::octet_string(&signature),
    ]);

    let signed_data = der::sequence(&[
        der::small_integer(1),
        der::set_of(vec![sha512]),
        der::sequence(&[der::oid(OID_DATA)]),
        der::encode(TAG_CONTEXT_0, &certificates.concat()),
        der::set_of(vec![signer_info]),
    ]);

    Ok(der::sequence(&[
        der::oid(OID_SIGNED_DATA),
        der::encode(TAG_CONTEXT_0, &signed_data),
    ]))
}

/// The parts of a `SignedData` needed to check a detached signature
#[derive(Debug)]
pub(crate) struct ParsedSignedData<'a> {
    /// DER of the certificate matching the signer identifier
    pub signer_certificate: &'a [u8],
    /// Signed attributes re-tagged as a SET OF, the form the signature covers
    pub signed_attributes: Vec<u8>,
    pub message_digest: &'a [u8],
    pub signature: &'a [u8],
}

/// Parse a `ContentInfo`, ignoring any padding after it
pub(crate) fn parse_signed_data(input: &[u8]) -> Result<ParsedSignedData<'_>, VerificationError> {
    let (content_info, _padding) = Tlv::expect(input, TAG_SEQUENCE).map_err(malformed)?;
    let content_info = content_info.children().map_err(malformed)?;
    match content_info.as_slice() {
        [content_type, _] if content_type.raw == der::oid(OID_SIGNED_DATA).as_slice() => {}
        _ => return Err(malformed("content is not signed-data")),
    }
    let (signed_data, _) =
        Tlv::expect(content_info[1].content, TAG_SEQUENCE).map_err(malformed)?;
    let fields = signed_data.children().map_err(malformed)?;

    let certificates = fields
        .iter()
        .find(|f| f.tag == TAG_CONTEXT_0)
        .ok_or_else(|| malformed("signed-data carries no certificates"))?
        .children()
        .map_err(malformed)?;
    let signer_infos = fields
        .last()
        .filter(|f| f.tag == TAG_SET)
        .ok_or_else(|| malformed("signed-data carries no signer infos"))?
        .children()
        .map_err(malformed)?;
    let [signer_info] = signer_infos.as_slice() else {
        return Err(malformed("expected exactly one signer info"));
    };

    let info = signer_info.children().map_err(malformed)?;
    let [_version, signer_id, digest_algorithm, attrs, _signature_algorithm, signature, ..] =
        info.as_slice()
    else {
        return Err(malformed("signer info lacks signed attributes"));
    };
    if attrs.tag != TAG_CONTEXT_0 || signature.tag != TAG_OCTET_STRING {
        return Err(malformed("signer info lacks signed attributes"));
    }
    let digest_oid = digest_algorithm
        .children()
        .map_err(malformed)?
        .first()
        .map(|oid| oid.raw.to_vec());
    if digest_oid != Some(der::oid(OID_SHA512)) {
        return Err(malformed("unsupported digest algorithm"));
    }

    let signer_certificate = certificates
        .iter()
        .find(|cert| {
            issuer_and_serial(cert.raw)
                .map(|id| id == signer_id.raw)
                .unwrap_or(false)
        })
        .ok_or_else(|| malformed("signer certificate not found"))?
        .raw;

    let message_digest_oid = der::oid(OID_MESSAGE_DIGEST);
    let mut message_digest = None;
    for attr in attrs.children().map_err(malformed)? {
        let parts = attr.children().map_err(malformed)?;
        if let [oid, values] = parts.as_slice() {
            if oid.raw == message_digest_oid.as_slice() {
                let (value, _) = Tlv::expect(values.content, TAG_OCTET_STRING).map_err(malformed)?;
                message_digest = Some(value.content);
            }
        }
    }
    let message_digest =
        message_digest.ok_or_else(|| malformed("message digest attribute missing"))?;

    let mut signed_attributes = attrs.raw.to_vec();
    signed_attributes[0] = TAG_SET;

    Ok(ParsedSignedData {
        signer_certificate,
        signed_attributes,
        message_digest,
        signature: signature.content,
    })
}
