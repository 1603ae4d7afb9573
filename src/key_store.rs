//! Durable signing identity store
//!
//! [`KeyMaterialStore::ensure`] is the only way key material comes into
//! existence. Against a fresh path it generates an RSA key pair, issues the
//! self-signed certificate and writes a PKCS#12 container; against an existing
//! container it is a pure load.
//!
//! # Concurrency
//! First-time creation runs under a path-scoped [`PathLock`], re-checks for the
//! container once the lock is held, and publishes the file with a no-clobber
//! rename. Two callers racing on a fresh path therefore end up with the same
//! identity. Loads take no lock.
//!
//! # Example
//! ```no_run
//! use pki_seal::key_store::KeyMaterialStore;
//! use pki_seal::passphrase::PassphraseResolver;
//! use pki_seal::configs::AppConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load()?;
//! let store = KeyMaterialStore::from_config(&config);
//! let material = store.ensure()?;
//! assert!(material.certificate().is_some());
//! # Ok(())
//! # }
//! ```

use crate::configs::AppConfig;
use crate::error::KeyMaterialError;
use crate::fingerprint::fingerprint;
use crate::generate_signing_cert::SigningCertBuilder;
use crate::key_material::KeyMaterial;
use crate::passphrase::{PassphraseResolver, ResolvedPassphrase};
use crate::path_lock::PathLock;
use crate::pfx_container::{decode_pfx, encode_pfx};
use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

const RSA_KEY_SIZE_DEFAULT: u32 = 4096;
const DEFAULT_KEY_ALIAS: &str = "authorKey";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Generate an RSA key pair of `bits` bits
pub fn generate_key_pair(bits: u32) -> Result<PKey<Private>, ErrorStack> {
    let rsa = Rsa::generate(bits)?;
    PKey::from_rsa(rsa)
}

/// Owner of the key/certificate container at one path
#[derive(Debug, Clone)]
pub struct KeyMaterialStore {
    path: PathBuf,
    key_alias: String,
    key_bits: u32,
    lock_timeout: Duration,
    resolver: PassphraseResolver,
    cert_builder: SigningCertBuilder,
}

impl KeyMaterialStore {
    /// Store with default parameters: 4096-bit RSA, alias `authorKey`, and the
    /// default certificate subject.
    pub fn new(path: impl Into<PathBuf>, resolver: PassphraseResolver) -> Self {
        Self {
            path: path.into(),
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            key_bits: RSA_KEY_SIZE_DEFAULT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            resolver,
            cert_builder: SigningCertBuilder::from_config(&Default::default()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            path: config.key_store.path.clone(),
            key_alias: config.key_store.key_alias.clone(),
            key_bits: config.key_store.key_bits,
            lock_timeout: Duration::from_millis(config.key_store.lock_timeout_ms),
            resolver: PassphraseResolver::from_config(config),
            cert_builder: SigningCertBuilder::from_config(&config.certificate),
        }
    }

    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_certificate_builder(mut self, builder: SigningCertBuilder) -> Self {
        self.cert_builder = builder;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the container, creating it first if it does not exist
    ///
    /// # Errors
    /// - [`KeyMaterialError::Create`] if key generation, certificate building,
    ///   serialization, directory creation, locking or the write fails.
    /// - [`KeyMaterialError::Load`] if a container exists but cannot be opened
    ///   (wrong passphrase, corrupt file) or lacks a usable key entry.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn ensure(&self) -> Result<KeyMaterial, KeyMaterialError> {
        let passphrase = self.resolver.resolve();

        if self.path.exists() {
            let passphrase = passphrase.ok_or_else(|| {
                KeyMaterialError::load(&self.path, "no passphrase source yielded a value")
            })?;
            return self.load(&passphrase);
        }

        let passphrase = passphrase.ok_or_else(|| {
            KeyMaterialError::create(&self.path, "no passphrase source yielded a value")
        })?;

        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent).map_err(|e| {
                KeyMaterialError::create(
                    &self.path,
                    format!("cannot create directory {}: {}", parent.display(), e),
                )
            })?;
        }

        let _lock = PathLock::acquire(&self.path, self.lock_timeout)
            .map_err(|e| KeyMaterialError::create(&self.path, e))?;

        if self.path.exists() {
            tracing::debug!("container appeared while waiting for the lock");
            return self.load(&passphrase);
        }

        self.create(&passphrase)
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    fn load(&self, passphrase: &ResolvedPassphrase) -> Result<KeyMaterial, KeyMaterialError> {
        let der = fs::read(&self.path).map_err(|e| KeyMaterialError::load(&self.path, e))?;

        let material = decode_pfx(&der, passphrase.expose()).map_err(|e| {
            KeyMaterialError::load(
                &self.path,
                format!("cannot open container (wrong passphrase or corrupt file): {}", e),
            )
        })?;

        if let Some(problem) = material.completeness_problem() {
            return Err(KeyMaterialError::load(&self.path, problem));
        }

        tracing::info!(chain_len = material.chain().len(), "loaded signing identity");
        Ok(material)
    }

    fn create(&self, passphrase: &ResolvedPassphrase) -> Result<KeyMaterial, KeyMaterialError> {
        let private_key = generate_key_pair(self.key_bits).map_err(|e| {
            KeyMaterialError::create(&self.path, format!("failed to generate RSA keypair: {}", e))
        })?;

        let certificate = self
            .cert_builder
            .build(&private_key)
            .map_err(|e| KeyMaterialError::create(&self.path, e))?;
        let chain = vec![certificate];

        let der = encode_pfx(&private_key, &chain, &self.key_alias, passphrase.expose())
            .map_err(|e| {
                KeyMaterialError::create(&self.path, format!("failed to serialize container: {}", e))
            })?;

        if !self.write_new(&der)? {
            tracing::warn!("container was created outside the lock; loading it instead");
            return self.load(passphrase);
        }

        let material = KeyMaterial::from_parts(Some(&private_key), chain)
            .map_err(|e| KeyMaterialError::create(&self.path, e))?;

        if let Some(leaf) = material.certificate() {
            match fingerprint(leaf) {
                Ok(fp) => tracing::info!(
                    fingerprint = %fp,
                    key_bits = self.key_bits,
                    "created signing identity"
                ),
                Err(e) => tracing::warn!(error = %e, "created signing identity without fingerprint"),
            }
        }
        Ok(material)
    }

    /// Write-then-rename without replacing an existing file. Returns `false`
    /// if the target already exists.
    fn write_new(&self, der: &[u8]) -> Result<bool, KeyMaterialError> {
        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));

        // NamedTempFile is created 0600 on Unix
        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| KeyMaterialError::create(&self.path, e))?;
        temp.write_all(der)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| KeyMaterialError::create(&self.path, e))?;

        match temp.persist_noclobber(&self.path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(KeyMaterialError::create(&self.path, e.error)),
        }
    }
}

/// Load or create the container at `path`
pub fn ensure(
    path: impl Into<PathBuf>,
    resolver: PassphraseResolver,
) -> Result<KeyMaterial, KeyMaterialError> {
    KeyMaterialStore::new(path, resolver).ensure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::PassphraseSource;
    use std::collections::HashMap;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn fast_store(path: &Path, passphrase: &str) -> KeyMaterialStore {
        KeyMaterialStore::new(path, PassphraseResolver::fixed(passphrase)).with_key_bits(2048)
    }

    fn chain_der(material: &KeyMaterial) -> Vec<Vec<u8>> {
        material
            .chain()
            .iter()
            .map(|cert| cert.to_der().unwrap())
            .collect()
    }

    #[test]
    fn test_fresh_path_creates_self_signed_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");

        let material = fast_store(&path, "pw").ensure().unwrap();
        assert!(path.exists());
        assert!(!PathLock::lock_path_for(&path).exists());

        let leaf = material.certificate().unwrap();
        assert_eq!(
            leaf.subject_name().to_der().unwrap(),
            leaf.issuer_name().to_der().unwrap()
        );
        let span = leaf.not_before().diff(leaf.not_after()).unwrap();
        assert_eq!((span.days, span.secs), (3650, 0));
        assert!(material.completeness_problem().is_none());
    }

    #[test]
    fn test_second_ensure_is_pure_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        let store = fast_store(&path, "pw");

        let first = store.ensure().unwrap();
        let bytes_after_create = fs::read(&path).unwrap();
        let second = store.ensure().unwrap();

        assert_eq!(chain_der(&first), chain_der(&second));
        assert_eq!(fs::read(&path).unwrap(), bytes_after_create);
        assert!(first
            .public_key()
            .unwrap()
            .public_eq(second.public_key().unwrap()));
    }

    #[test]
    fn test_wrong_passphrase_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        fast_store(&path, "right").ensure().unwrap();

        let err = fast_store(&path, "wrong").ensure().unwrap_err();
        assert!(matches!(err, KeyMaterialError::Load { .. }), "{err}");
    }

    #[test]
    fn test_corrupt_container_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        fs::write(&path, b"definitely not pkcs12").unwrap();

        let err = fast_store(&path, "pw").ensure().unwrap_err();
        assert!(matches!(err, KeyMaterialError::Load { .. }));
        // The corrupt file is left untouched
        assert_eq!(fs::read(&path).unwrap(), b"definitely not pkcs12");
    }

    #[test]
    fn test_parent_directories_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("keystore.p12");

        fast_store(&path, "pw").ensure().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_parent_is_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let path = blocker.join("keystore.p12");

        let err = fast_store(&path, "pw").ensure().unwrap_err();
        assert!(matches!(err, KeyMaterialError::Create { .. }));
    }

    #[test]
    fn test_missing_passphrase_kind_depends_on_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        let silent = PassphraseResolver::new(
            vec![PassphraseSource::Property("ABSENT".to_string())],
            HashMap::new(),
        );

        let err = KeyMaterialStore::new(&path, silent.clone()).ensure().unwrap_err();
        assert!(matches!(err, KeyMaterialError::Create { .. }));

        fast_store(&path, "pw").ensure().unwrap();
        let err = KeyMaterialStore::new(&path, silent).ensure().unwrap_err();
        assert!(matches!(err, KeyMaterialError::Load { .. }));
    }

    #[test]
    fn test_held_lock_times_out_as_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        let _held = PathLock::acquire(&path, Duration::from_secs(1)).unwrap();

        let err = fast_store(&path, "pw")
            .with_lock_timeout(Duration::from_millis(100))
            .ensure()
            .unwrap_err();
        assert!(matches!(err, KeyMaterialError::Create { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_concurrent_first_ensure_yields_one_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = fast_store(&path, "pw");
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    chain_der(&store.ensure().unwrap())
                })
            })
            .collect();

        let chains: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(chains.windows(2).all(|pair| pair[0] == pair[1]));
        assert!(!PathLock::lock_path_for(&path).exists());
    }

    #[test]
    fn test_store_uses_configured_subject() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.key_store.path = dir.path().join("configured.p12");
        config.key_store.key_bits = 2048;
        config.certificate.common_name = "Configured Signer".to_string();
        config
            .properties
            .insert("CERT_PWD".to_string(), "configured".to_string());

        let material = KeyMaterialStore::from_config(&config).ensure().unwrap();
        let text = String::from_utf8(material.certificate().unwrap().to_text().unwrap()).unwrap();
        assert!(text.contains("Configured Signer"));
    }
}
