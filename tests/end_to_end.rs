//! Store → sign → verify → tamper, against a throwaway container path

use pki_seal::configs::AppConfig;
use pki_seal::error::VerificationError;
use pki_seal::fingerprint::fingerprint;
use pki_seal::key_store::KeyMaterialStore;
use pki_seal::passphrase::PassphraseResolver;
use pki_seal::signing::{DocumentSigner, SignatureVerifier};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_sign_verify_and_detect_tamper() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys").join("author.p12");

    let store = KeyMaterialStore::new(&path, PassphraseResolver::fixed("end-to-end"));
    let material = store.ensure().unwrap();
    assert!(path.exists());

    let leaf = material.certificate().unwrap();
    assert_eq!(
        leaf.subject_name().to_der().unwrap(),
        leaf.issuer_name().to_der().unwrap()
    );
    assert_eq!(material.public_key().unwrap().bits(), 4096);

    let document = b"PLACEHOLDR";
    assert_eq!(document.len(), 10);
    let signed = DocumentSigner::new()
        .sign(document, &material, "Ken Kousen", "Course completion", "Connecticut")
        .unwrap();
    assert!(signed.len() > document.len());
    assert_eq!(&signed[..document.len()], document);

    let verifier = SignatureVerifier::new();
    let verified = verifier.verify(&signed).unwrap();
    assert_eq!(verified.metadata.signer_display_name, "Ken Kousen");
    assert_eq!(verified.metadata.reason, "Course completion");
    assert_eq!(verified.metadata.location, "Connecticut");
    assert_eq!(verified.signed_revision_len, document.len());
    assert_eq!(verified.fingerprint, fingerprint(leaf).unwrap());

    let mut tampered = signed.clone();
    tampered[4] ^= 0x20;
    assert!(matches!(
        verifier.verify(&tampered),
        Err(VerificationError::DigestMismatch)
    ));

    // A reload yields the same identity and still verifies earlier output
    let reloaded = store.ensure().unwrap();
    assert_eq!(
        reloaded.certificate().unwrap().to_der().unwrap(),
        leaf.to_der().unwrap()
    );
    assert!(verifier.verify(&signed).is_ok());
}

#[test]
fn test_configured_pipeline() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.p12");
    let config = AppConfig::from_toml(&format!(
        r#"
        [key_store]
        path = '{}'
        key_bits = 2048

        [passphrase]
        env_var = "PKI_SEAL_E2E_UNSET_VARIABLE"
        property = "cert.password"

        [properties]
        "cert.password" = "from-properties"

        [certificate]
        common_name = "Configured Signer"

        [signing]
        display_name = "Configured Signer"
        reason = "Certificate of completion"
        location = "Online"
        "#,
        path.display()
    ))
    .unwrap();

    let store = KeyMaterialStore::from_config(&config).with_lock_timeout(Duration::from_secs(5));
    let material = store.ensure().unwrap();

    let signed = DocumentSigner::from_config(&config.signing)
        .sign_document(b"configured document", &material)
        .unwrap();
    let verified = SignatureVerifier::new().verify(&signed).unwrap();
    assert_eq!(verified.metadata.signer_display_name, "Configured Signer");
    assert_eq!(verified.metadata.reason, "Certificate of completion");

    // The property passphrase opens the container; another one does not
    let wrong = KeyMaterialStore::new(&path, PassphraseResolver::fixed("changeit"));
    assert!(wrong.ensure().is_err());
}
