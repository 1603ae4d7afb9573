use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub key_store: KeyStoreConfig,
    #[serde(default)]
    pub passphrase: PassphraseConfig,
    /// Process-level configuration values consulted by the passphrase resolver
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub certificate: CertificateConfig,
    #[serde(default)]
    pub signing: SigningConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyStoreConfig {
    #[serde(default = "default_key_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            path: default_key_store_path(),
            key_alias: default_key_alias(),
            key_bits: default_key_bits(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_key_store_path() -> PathBuf {
    PathBuf::from(".cert_keystore.p12")
}

fn default_key_alias() -> String {
    "authorKey".to_string()
}

fn default_key_bits() -> u32 {
    4096
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PassphraseConfig {
    #[serde(default = "default_passphrase_key")]
    pub env_var: String,
    #[serde(default = "default_passphrase_key")]
    pub property: String,
    /// Last-resort passphrase. Insecure for production use.
    #[serde(default = "default_passphrase_fallback")]
    pub fallback: String,
}

impl Default for PassphraseConfig {
    fn default() -> Self {
        Self {
            env_var: default_passphrase_key(),
            property: default_passphrase_key(),
            fallback: default_passphrase_fallback(),
        }
    }
}

fn default_passphrase_key() -> String {
    "CERT_PWD".to_string()
}

fn default_passphrase_fallback() -> String {
    "changeit".to_string()
}

/// How certificate serial numbers are generated
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SerialPolicy {
    /// Cryptographically random 128-bit serial
    #[default]
    Random128,
    /// Milliseconds since the Unix epoch. Collides under rapid re-issuance.
    WallClockMillis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfig {
    #[serde(default = "default_cert_cn")]
    pub common_name: String,
    #[serde(default = "default_cert_org")]
    pub organization: String,
    #[serde(default = "default_cert_ou")]
    pub organizational_unit: String,
    #[serde(default = "default_cert_locality")]
    pub locality: String,
    #[serde(default = "default_cert_state")]
    pub state: String,
    #[serde(default = "default_cert_country")]
    pub country: String,
    #[serde(default = "default_cert_validity")]
    pub validity_days: u32,
    #[serde(default)]
    pub serial_policy: SerialPolicy,
    #[serde(default = "default_extended_key_usage")]
    pub extended_key_usage: Vec<String>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            common_name: default_cert_cn(),
            organization: default_cert_org(),
            organizational_unit: default_cert_ou(),
            locality: default_cert_locality(),
            state: default_cert_state(),
            country: default_cert_country(),
            validity_days: default_cert_validity(),
            serial_policy: SerialPolicy::default(),
            extended_key_usage: default_extended_key_usage(),
        }
    }
}

fn default_cert_cn() -> String {
    "Ken Kousen".to_string()
}

fn default_cert_org() -> String {
    "Tales from the Jar Side".to_string()
}

fn default_cert_ou() -> String {
    "PDF Signing".to_string()
}

fn default_cert_locality() -> String {
    "Connecticut".to_string()
}

fn default_cert_state() -> String {
    "CT".to_string()
}

fn default_cert_country() -> String {
    "US".to_string()
}

fn default_cert_validity() -> u32 {
    3650 // 10 years
}

fn default_extended_key_usage() -> Vec<String> {
    vec![
        crate::generate_signing_cert::OID_EMAIL_PROTECTION.to_string(),
        crate::generate_signing_cert::OID_CODE_SIGNING.to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SigningConfig {
    #[serde(default = "default_cert_cn")]
    pub display_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub location: String,
    /// Bytes reserved for the encoded signed-data structure
    #[serde(default = "default_signature_reserve")]
    pub signature_reserve_bytes: usize,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            display_name: default_cert_cn(),
            reason: String::new(),
            location: String::new(),
            signature_reserve_bytes: default_signature_reserve(),
        }
    }
}

fn default_signature_reserve() -> usize {
    crate::signing::DEFAULT_SIGNATURE_SIZE * 2
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        Self::from_toml(&config_str)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }
}
