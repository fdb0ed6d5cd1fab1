//! Keystore loading and batch runs over files and directories.

mod common;

use std::sync::Arc;

use common::{
    certified_pdf, http_error, minimal_pdf, write_pdf, StubTransport, TestPki, CA_ISSUERS_URL, CRL_URL, OCSP_URL,
};
use pdf_ltv_signer::batch::BatchSigner;
use pdf_ltv_signer::config::SignerConfig;
use pdf_ltv_signer::signatures::{Keystore, SignatureVerifier, SigningStep, VerificationStatus};
use pdf_ltv_signer::{Error, KeystoreError};

const ALIAS: &str = "digsig";
const PASSWORD: &str = "123456";

/// Serves the CRL and the root; OCSP and everything else is down.
fn revocation_transport(pki: &TestPki) -> Arc<StubTransport> {
    let crl = pki.crl(&[]);
    let root = pki.root_der();
    StubTransport::new(move |req| match req.url.as_str() {
        CRL_URL => Ok(crl.clone()),
        CA_ISSUERS_URL => Ok(root.clone()),
        OCSP_URL => Err(http_error(OCSP_URL, "HTTP 503 Service Unavailable")),
        other => Err(http_error(other, "HTTP 404 Not Found")),
    })
}

fn keystore_file(pki: &TestPki, dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("digsig.store");
    std::fs::write(&path, pki.pkcs12(ALIAS, PASSWORD)).unwrap();
    path
}

#[test]
fn test_keystore_loads_chain_leaf_first() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let keystore = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, Some(ALIAS)).unwrap();

    assert_eq!(keystore.alias(), Some(ALIAS));
    assert_eq!(keystore.chain(), &[pki.leaf_der(), pki.root_der()][..]);
    let holder = keystore.holder().unwrap();
    assert_eq!(holder.name.as_deref(), Some("Test Signer"));
    assert_eq!(holder.location.as_deref(), Some("Jakarta"));
    assert_eq!(holder.country.as_deref(), Some("ID"));
    let debug = format!("{:?}", keystore);
    assert!(!debug.contains(PASSWORD));
}

#[test]
fn test_keystore_wrong_password() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let err = Keystore::load(keystore_file(&pki, dir.path()), "wrong", Some(ALIAS)).unwrap_err();
    assert!(matches!(err, KeystoreError::Decrypt(_)), "got {:?}", err);
}

#[test]
fn test_keystore_unknown_alias() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let err = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, Some("other")).unwrap_err();
    match err {
        KeystoreError::AliasNotFound { requested, available } => {
            assert_eq!(requested, "other");
            assert_eq!(available, vec![ALIAS.to_string()]);
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_keystore_missing_file() {
    let err = Keystore::load("/nonexistent/digsig.store", PASSWORD, None).unwrap_err();
    assert!(matches!(err, KeystoreError::Io { .. }));
}

#[test]
fn test_sign_single_file_with_ltv() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "sign_me.pdf", &minimal_pdf());
    let keystore = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, Some(ALIAS)).unwrap();

    let config = SignerConfig::default().without_tsa().with_reason("Created and signed");
    let report = BatchSigner::new(keystore, config)
        .unwrap()
        .with_transport(revocation_transport(&pki))
        .sign_path(&input)
        .unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.signed.len(), 1);
    assert_eq!(report.ltv.len(), 1);
    assert!(report.ltv[0].is_complete(), "missing: {:?}", report.ltv[0].missing);

    let signed = dir.path().join("sign_me_signed.pdf");
    let ltv = dir.path().join("sign_me_signed_LTV.pdf");
    assert_eq!(report.signed[0].output, signed);
    assert_eq!(report.ltv[0].output, ltv);
    assert!(signed.exists() && ltv.exists());

    let results = SignatureVerifier::new().verify_document(&ltv).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, VerificationStatus::Valid, "messages: {:?}", results[0].messages);
    // Name and location fall back to the certificate subject
    let mut doc = pdf_ltv_signer::PdfDocument::open(&signed).unwrap();
    let sig = doc.existing_signatures().unwrap().remove(0).value.unwrap();
    assert_eq!(sig.get("Name").and_then(|o| o.as_string()), Some(&b"Test Signer"[..]));
    assert_eq!(sig.get("Reason").and_then(|o| o.as_string()), Some(&b"Created and signed"[..]));
}

#[test]
fn test_directory_run_continues_past_failures() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_pdf(&docs, "a_good.pdf", &minimal_pdf());
    write_pdf(&docs, "b_broken.pdf", b"%PDF-1.4\nthis is not a pdf\n");
    write_pdf(&docs, "c_locked.pdf", &certified_pdf(1));
    write_pdf(&docs, "d_good.pdf", &minimal_pdf());
    std::fs::write(docs.join("notes.txt"), b"ignored").unwrap();
    let keystore = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, None).unwrap();

    let config = SignerConfig::default().without_tsa().with_ltv(false);
    let report = BatchSigner::new(keystore, config)
        .unwrap()
        .with_transport(StubTransport::offline())
        .sign_path(&docs)
        .unwrap();

    assert_eq!(report.attempted(), 4);
    assert_eq!(report.signed.len(), 2);
    assert!(report.ltv.is_empty(), "LTV disabled");
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 2);

    let broken = &report.failures[0];
    assert!(broken.input.ends_with("b_broken.pdf"));
    assert_eq!(broken.step, SigningStep::Load);
    let locked = &report.failures[1];
    assert!(locked.input.ends_with("c_locked.pdf"));
    assert_eq!(locked.step, SigningStep::ReservePlaceholder);
    assert!(matches!(locked.error, Error::DocumentLocked { permission: 1 }));

    assert!(docs.join("a_good_signed.pdf").exists());
    assert!(docs.join("d_good_signed.pdf").exists());
    assert!(!docs.join("b_broken_signed.pdf").exists());
    assert!(!docs.join("c_locked_signed.pdf").exists());
}

#[test]
fn test_rerun_skips_previous_outputs() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_pdf(&docs, "report.pdf", &minimal_pdf());
    let keystore = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, None).unwrap();
    let signer = BatchSigner::new(keystore, SignerConfig::default().without_tsa().with_ltv(false))
        .unwrap()
        .with_transport(StubTransport::offline());

    signer.sign_path(&docs).unwrap();
    let second = signer.sign_path(&docs).unwrap();
    assert_eq!(second.signed.len(), 1, "report_signed.pdf is not signed again");
    assert!(!docs.join("report_signed_signed.pdf").exists());
}

#[test]
fn test_add_ltv_to_signed_directory() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let keystore = Keystore::load(keystore_file(&pki, dir.path()), PASSWORD, None).unwrap();
    let input = write_pdf(dir.path(), "contract.pdf", &minimal_pdf());
    let signer = BatchSigner::new(keystore, SignerConfig::default().without_tsa().with_ltv(false))
        .unwrap()
        .with_transport(StubTransport::offline());
    signer.sign_path(&input).unwrap();

    let ltv_signer = BatchSigner::ltv_only(SignerConfig::default())
        .unwrap()
        .with_transport(revocation_transport(&pki));
    let report = ltv_signer.add_ltv_path(dir.path().join("contract_signed.pdf")).unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.ltv.len(), 1);
    assert!(dir.path().join("contract_signed_LTV.pdf").exists());

    // An unsigned file in the LTV pass is a failure, not an abort
    let report = ltv_signer.add_ltv_path(&input).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, SigningStep::Ltv);
}

#[test]
fn test_ltv_only_signer_cannot_sign() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "x.pdf", &minimal_pdf());
    let signer = BatchSigner::ltv_only(SignerConfig::default()).unwrap();
    let err = signer.sign_file(&input, &dir.path().join("x_signed.pdf")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_parameters_file() {
    let dir = tempfile::tempdir().unwrap();
    let params = dir.path().join("params.json");
    std::fs::write(
        &params,
        r#"{"alias": "digsig", "reason": "Created and signed", "location": "Bandung", "ltv": false, "unknown": 1}"#,
    )
    .unwrap();
    let config = SignerConfig::from_json_file(&params).unwrap();
    assert_eq!(config.alias.as_deref(), Some(ALIAS));
    assert_eq!(config.reason, "Created and signed");
    assert_eq!(config.location.as_deref(), Some("Bandung"));
    assert!(!config.ltv);

    std::fs::write(&params, "{ not json").unwrap();
    assert!(matches!(SignerConfig::from_json_file(&params), Err(Error::Config(_))));
}
