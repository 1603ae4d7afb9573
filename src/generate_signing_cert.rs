//! Self-Signed Signing Certificate Generation Module
//!
//! Builds the long-lived self-signed certificate that identifies the document
//! signer. Subject and issuer are the same name and the certificate is signed
//! with its own key.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are identical
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, nonRepudiation, critical
//! - **Extended Key Usage**: configurable purpose OIDs, critical
//! - **Signature Algorithm**: SHA-512 with RSA
//! - **Default Validity**: 3650 days from issuance
//! - **Version**: X.509v3 with extensions
//!
//! # Extended Key Usage
//! There is no portable public OID for "PDF signing". Adobe's
//! `1.2.840.113583.1.1.5` sits in a vendor namespace, so the defaults are
//! emailProtection and codeSigning. Callers that need strict PAdES compliance
//! must supply their own list.
//!
//! # Example
//! ```rust,no_run
//! use pki_seal::generate_signing_cert::SigningCertBuilder;
//! use openssl::pkey::PKey;
//! use openssl::rsa::Rsa;
//! # fn example() -> anyhow::Result<()> {
//! let key = PKey::from_rsa(Rsa::generate(4096)?)?;
//! let certificate = SigningCertBuilder::new()
//!     .subject_common_name("Ken Kousen".to_string())
//!     .organization("Tales from the Jar Side".to_string())
//!     .country("US".to_string())
//!     .validity_days(3650)
//!     .build(&key)?;
//! # Ok(())
//! # }
//! ```

use crate::configs::{CertificateConfig, SerialPolicy};
use crate::error::CertificateBuildError;
use openssl::asn1::{Asn1Object, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Name, X509};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SECONDS_PER_DAY: i64 = 86_400;

/// id-kp-emailProtection
pub const OID_EMAIL_PROTECTION: &str = "1.3.6.1.5.5.7.3.4";
/// id-kp-codeSigning
pub const OID_CODE_SIGNING: &str = "1.3.6.1.5.5.7.3.3";
/// Adobe Authentic Documents Trust. Not used by default.
pub const OID_ADOBE_PDF_SIGNING: &str = "1.2.840.113583.1.1.5";

/// Builder for self-signed, end-entity signing certificates
///
/// The key pair is supplied by the caller; this builder only assembles and
/// self-signs the certificate. Empty distinguished-name fields other than the
/// common name are left out of the subject.
#[derive(Debug, Clone)]
pub struct SigningCertBuilder {
    subject_common_name: String,
    organization: String,
    organizational_unit: String,
    locality: String,
    state: String,
    country: String,
    validity_days: u32,
    serial_policy: SerialPolicy,
    extended_key_usage: Vec<String>,
}

impl Default for SigningCertBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningCertBuilder {
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            organization: String::new(),
            organizational_unit: String::new(),
            locality: String::new(),
            state: String::new(),
            country: String::new(),
            validity_days: 3650,
            serial_policy: SerialPolicy::Random128,
            extended_key_usage: vec![
                OID_EMAIL_PROTECTION.to_string(),
                OID_CODE_SIGNING.to_string(),
            ],
        }
    }

    /// Builder populated from the `[certificate]` configuration section
    pub fn from_config(config: &CertificateConfig) -> Self {
        Self {
            subject_common_name: config.common_name.clone(),
            organization: config.organization.clone(),
            organizational_unit: config.organizational_unit.clone(),
            locality: config.locality.clone(),
            state: config.state.clone(),
            country: config.country.clone(),
            validity_days: config.validity_days,
            serial_policy: config.serial_policy,
            extended_key_usage: config.extended_key_usage.clone(),
        }
    }

    /// Set the common name (CN); the signer's display identity
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    pub fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    pub fn organizational_unit(mut self, ou: String) -> Self {
        self.organizational_unit = ou;
        self
    }

    pub fn locality(mut self, locality: String) -> Self {
        self.locality = locality;
        self
    }

    pub fn state(mut self, state: String) -> Self {
        self.state = state;
        self
    }

    /// Set the country (C) for the certificate (2-letter ISO code)
    pub fn country(mut self, country: String) -> Self {
        self.country = country;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn serial_policy(mut self, policy: SerialPolicy) -> Self {
        self.serial_policy = policy;
        self
    }

    /// Replace the extended key usage purpose OIDs (dotted form).
    /// An empty list omits the extension entirely.
    pub fn extended_key_usage(mut self, oids: Vec<String>) -> Self {
        self.extended_key_usage = oids;
        self
    }

    /// Build and self-sign the certificate for `private_key`
    ///
    /// # Errors
    /// Returns [`CertificateBuildError`] if a parameter is invalid (empty CN,
    /// zero validity, malformed OID) or any OpenSSL step fails.
    pub fn build(&self, private_key: &PKey<Private>) -> Result<X509, CertificateBuildError> {
        if self.subject_common_name.is_empty() {
            return Err(CertificateBuildError::InvalidParameters(
                "subject common name must not be empty".to_string(),
            ));
        }
        if self.validity_days == 0 {
            return Err(CertificateBuildError::InvalidParameters(
                "validity must be at least one day".to_string(),
            ));
        }

        let mut builder =
            X509::builder().map_err(|e| CertificateBuildError::openssl("create X509 builder", e))?;

        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| CertificateBuildError::openssl("set version", e))?;

        let serial = self.serial_number()?;
        let asn1_serial = serial
            .to_asn1_integer()
            .map_err(|e| CertificateBuildError::openssl("encode serial number", e))?;
        builder
            .set_serial_number(&asn1_serial)
            .map_err(|e| CertificateBuildError::openssl("set serial number", e))?;

        let name = self.subject_name()?;
        builder
            .set_subject_name(&name)
            .map_err(|e| CertificateBuildError::openssl("set subject", e))?;
        builder
            .set_issuer_name(&name)
            .map_err(|e| CertificateBuildError::openssl("set issuer", e))?;

        // Both bounds come from one instant so the span is exact
        let issued_at = chrono::Utc::now().timestamp();
        let expires_at = issued_at + i64::from(self.validity_days) * SECONDS_PER_DAY;
        let not_before = asn1_time(issued_at)?;
        let not_after = asn1_time(expires_at)?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| CertificateBuildError::openssl("set not_before", e))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| CertificateBuildError::openssl("set not_after", e))?;

        builder
            .set_pubkey(private_key)
            .map_err(|e| CertificateBuildError::openssl("set public key", e))?;

        // No .ca() call: end-entity certificate
        let basic_constraints = BasicConstraints::new()
            .critical()
            .build()
            .map_err(|e| CertificateBuildError::openssl("build BasicConstraints", e))?;
        builder
            .append_extension(basic_constraints)
            .map_err(|e| CertificateBuildError::openssl("add BasicConstraints", e))?;

        let key_usage = KeyUsage::new()
            .critical()
            .digital_signature()
            .non_repudiation()
            .build()
            .map_err(|e| CertificateBuildError::openssl("build KeyUsage", e))?;
        builder
            .append_extension(key_usage)
            .map_err(|e| CertificateBuildError::openssl("add KeyUsage", e))?;

        if !self.extended_key_usage.is_empty() {
            let mut eku = ExtendedKeyUsage::new();
            eku.critical();
            for oid in &self.extended_key_usage {
                Asn1Object::from_str(oid).map_err(|_| {
                    CertificateBuildError::InvalidParameters(format!(
                        "extended key usage OID {:?} is not a valid object identifier",
                        oid
                    ))
                })?;
                eku.other(oid);
            }
            let eku_extension = eku
                .build()
                .map_err(|e| CertificateBuildError::openssl("build ExtendedKeyUsage", e))?;
            builder
                .append_extension(eku_extension)
                .map_err(|e| CertificateBuildError::openssl("add ExtendedKeyUsage", e))?;
        }

        builder
            .sign(private_key, MessageDigest::sha512())
            .map_err(|e| CertificateBuildError::openssl("sign certificate", e))?;

        let certificate = builder.build();
        tracing::debug!(
            subject = %self.subject_common_name,
            validity_days = self.validity_days,
            "issued self-signed certificate"
        );
        Ok(certificate)
    }

    fn serial_number(&self) -> Result<BigNum, CertificateBuildError> {
        match self.serial_policy {
            SerialPolicy::Random128 => {
                let mut serial = BigNum::new()
                    .map_err(|e| CertificateBuildError::openssl("allocate serial number", e))?;
                serial
                    .rand(128, MsbOption::MAYBE_ZERO, false)
                    .map_err(|e| CertificateBuildError::openssl("generate serial number", e))?;
                Ok(serial)
            }
            SerialPolicy::WallClockMillis => {
                let millis = chrono::Utc::now().timestamp_millis();
                BigNum::from_dec_str(&millis.to_string())
                    .map_err(|e| CertificateBuildError::openssl("encode serial number", e))
            }
        }
    }

    fn subject_name(&self) -> Result<X509Name, CertificateBuildError> {
        let mut name_builder = X509Name::builder()
            .map_err(|e| CertificateBuildError::openssl("create name builder", e))?;

        let entries = [
            (Nid::COMMONNAME, &self.subject_common_name, "set CN"),
            (Nid::ORGANIZATIONNAME, &self.organization, "set organization"),
            (
                Nid::ORGANIZATIONALUNITNAME,
                &self.organizational_unit,
                "set organizational unit",
            ),
            (Nid::LOCALITYNAME, &self.locality, "set locality"),
            (Nid::STATEORPROVINCENAME, &self.state, "set state/province"),
            (Nid::COUNTRYNAME, &self.country, "set country"),
        ];
        for (nid, value, step) in entries {
            if value.is_empty() {
                continue;
            }
            name_builder
                .append_entry_by_nid(nid, value)
                .map_err(|e| CertificateBuildError::openssl(step, e))?;
        }

        Ok(name_builder.build())
    }
}

fn asn1_time(unix_seconds: i64) -> Result<Asn1Time, CertificateBuildError> {
    Asn1Time::from_unix(unix_seconds as _)
        .map_err(|e| CertificateBuildError::openssl("create ASN.1 time", e))
}

/// Issue a self-signed certificate for `private_key` with the given common name
/// and otherwise default parameters.
pub fn issue_self_signed(
    private_key: &PKey<Private>,
    subject_common_name: &str,
) -> Result<X509, CertificateBuildError> {
    SigningCertBuilder::new()
        .subject_common_name(subject_common_name.to_string())
        .build(private_key)
}
