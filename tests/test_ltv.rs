//! Long-term validation: revocation fetching and the Document Security Store.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    http_error, minimal_pdf, write_pdf, CertSpec, OcspAnswer, StubTransport, TestPki, CA_ISSUERS_URL, CRL_URL,
    OCSP_URL,
};
use openssl::ocsp::{OcspResponse, OcspResponseStatus};
use pdf_ltv_signer::document::PdfDocument;
use pdf_ltv_signer::object::{Dict, Object};
use pdf_ltv_signer::signatures::{
    DigestAlgorithm, IncrementalSigner, RevocationFetcher, SignatureRequest, SignatureVerifier, SigningIdentity,
    ValidationInfoAssembler, VerificationStatus,
};
use pdf_ltv_signer::Error;

fn try_later() -> Vec<u8> {
    OcspResponse::create(OcspResponseStatus::TRY_LATER, None)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Responder with no OCSP service, a CRL and the root at caIssuers.
fn crl_transport(pki: &TestPki, crl: Vec<u8>) -> Arc<StubTransport> {
    let root = pki.root_der();
    StubTransport::new(move |req| match req.url.as_str() {
        OCSP_URL => Ok(try_later()),
        CRL_URL => Ok(crl.clone()),
        CA_ISSUERS_URL => Ok(root.clone()),
        other => Err(http_error(other, "HTTP 404 Not Found")),
    })
}

/// Responder answering OCSP with `answer`, with the CRL and root also served.
fn ocsp_transport(pki: &TestPki, answer: OcspAnswer) -> Arc<StubTransport> {
    let responder = pki.ocsp_responder(answer);
    let crl = pki.crl(&[]);
    let root = pki.root_der();
    StubTransport::new(move |req| match req.url.as_str() {
        OCSP_URL => Ok(responder.respond(&req.body)),
        CRL_URL => Ok(crl.clone()),
        CA_ISSUERS_URL => Ok(root.clone()),
        other => Err(http_error(other, "HTTP 404 Not Found")),
    })
}

fn signed_pdf(dir: &Path, identity: SigningIdentity) -> PathBuf {
    let input = write_pdf(dir, "doc.pdf", &minimal_pdf());
    let output = dir.join("doc_signed.pdf");
    IncrementalSigner::with_transport(StubTransport::offline())
        .sign(&SignatureRequest::new(&input), identity, &output)
        .unwrap();
    output
}

fn hex_upper(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// The /DSS dictionary of the newest revision.
fn load_dss(doc: &mut PdfDocument) -> Dict {
    let catalog = doc.catalog().unwrap();
    doc.resolve_entry(&catalog, "DSS")
        .unwrap()
        .expect("catalog has /DSS")
        .as_dict()
        .cloned()
        .unwrap()
}

/// Decoded streams of a DSS array.
fn dss_blobs(doc: &mut PdfDocument, dss: &Dict, key: &str) -> Vec<Vec<u8>> {
    let items = dss.get(key).and_then(Object::as_array).cloned().unwrap_or_default();
    items
        .iter()
        .map(|item| doc.resolve(item).unwrap().decode_stream_data().unwrap())
        .collect()
}

fn signature_contents(doc: &mut PdfDocument) -> Vec<u8> {
    let signatures = doc.existing_signatures().unwrap();
    signatures[0]
        .value
        .as_ref()
        .and_then(|v| v.get("Contents"))
        .and_then(Object::as_string)
        .unwrap()
        .to_vec()
}

#[test]
fn test_dss_with_crl_fallback() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.identity());
    let ltv = dir.path().join("doc_signed_LTV.pdf");
    let crl = pki.crl(&[]);
    let transport = crl_transport(&pki, crl.clone());

    let report = ValidationInfoAssembler::new(transport.clone())
        .add_ltv(&signed, &ltv)
        .unwrap();
    assert_eq!(report.output, ltv);
    assert_eq!(report.covered, 1, "the leaf is covered, the root needs no evidence");
    assert!(report.is_complete(), "missing: {:?}", report.missing);

    let urls = transport.urls();
    assert_eq!(urls.first().map(String::as_str), Some(OCSP_URL), "OCSP is tried first");
    assert!(urls.iter().any(|u| u == CRL_URL));

    let signed_bytes = std::fs::read(&signed).unwrap();
    let ltv_bytes = std::fs::read(&ltv).unwrap();
    assert_eq!(&ltv_bytes[..signed_bytes.len()], signed_bytes.as_slice());

    let mut doc = PdfDocument::open(&ltv).unwrap();
    let dss = load_dss(&mut doc);
    assert_eq!(dss.get("Type").and_then(Object::as_name), Some("DSS"));
    let certs = dss_blobs(&mut doc, &dss, "Certs");
    assert_eq!(certs.len(), 2);
    assert!(certs.contains(&pki.leaf_der()) && certs.contains(&pki.root_der()));
    assert_eq!(dss_blobs(&mut doc, &dss, "CRLs"), vec![crl]);
    assert!(dss_blobs(&mut doc, &dss, "OCSPs").is_empty());

    let contents = signature_contents(&mut doc);
    let vri_key = hex_upper(&DigestAlgorithm::Sha1.digest(&contents));
    let vri = dss.get("VRI").and_then(Object::as_dict).unwrap();
    assert_eq!(vri.len(), 1);
    let entry = vri.get(&vri_key).and_then(Object::as_dict).expect("VRI keyed by SHA-1 of /Contents");
    assert_eq!(entry.get("Cert").and_then(Object::as_array).map(Vec::len), Some(2));
    assert_eq!(entry.get("CRL").and_then(Object::as_array).map(Vec::len), Some(1));
    assert!(entry.get("TU").and_then(Object::as_string).is_some());

    let catalog = doc.catalog().unwrap();
    let extensions = doc.resolve_entry(&catalog, "Extensions").unwrap().unwrap();
    let esic = extensions.as_dict().and_then(|e| e.get("ESIC")).and_then(Object::as_dict).unwrap();
    assert_eq!(esic.get("ExtensionLevel").and_then(Object::as_integer), Some(5));

    let results = SignatureVerifier::new().verify_document(&ltv).unwrap();
    assert_eq!(results[0].status, VerificationStatus::Valid, "messages: {:?}", results[0].messages);
    assert!(!results[0].covers_whole_document);
}

#[test]
fn test_unreachable_revocation_sources_are_reported() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.identity());
    let ltv = dir.path().join("doc_signed_LTV.pdf");

    let report = ValidationInfoAssembler::new(StubTransport::offline())
        .add_ltv(&signed, &ltv)
        .unwrap();
    assert_eq!(report.covered, 0);
    assert_eq!(report.missing.len(), 1);
    match &report.missing[0] {
        Error::RevocationUnavailable { subject, reason } => {
            assert!(subject.contains("Test Signer"));
            assert!(reason.contains("OCSP") && reason.contains("CRL"), "reason: {}", reason);
        },
        other => panic!("unexpected {:?}", other),
    }

    // What could be gathered is still written
    let mut doc = PdfDocument::open(&ltv).unwrap();
    let dss = load_dss(&mut doc);
    assert_eq!(dss_blobs(&mut doc, &dss, "Certs").len(), 2);
    assert!(dss_blobs(&mut doc, &dss, "CRLs").is_empty());
}

#[test]
fn test_missing_issuer_is_fetched_from_ca_issuers() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.leaf_only_identity());
    let ltv = dir.path().join("doc_signed_LTV.pdf");
    let transport = crl_transport(&pki, pki.crl(&[]));

    let report = ValidationInfoAssembler::new(transport.clone())
        .add_ltv(&signed, &ltv)
        .unwrap();
    assert!(report.is_complete(), "missing: {:?}", report.missing);
    assert!(transport.urls().iter().any(|u| u == CA_ISSUERS_URL));

    let mut doc = PdfDocument::open(&ltv).unwrap();
    let dss = load_dss(&mut doc);
    let certs = dss_blobs(&mut doc, &dss, "Certs");
    assert!(certs.contains(&pki.root_der()), "fetched issuer is embedded");
}

#[test]
fn test_second_pass_merges_existing_dss() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.identity());
    let first = dir.path().join("doc_signed_LTV.pdf");
    let second = dir.path().join("doc_signed_LTV_LTV.pdf");
    let transport = crl_transport(&pki, pki.crl(&[]));
    let assembler = ValidationInfoAssembler::new(transport);

    assembler.add_ltv(&signed, &first).unwrap();
    assembler.add_ltv(&first, &second).unwrap();

    let mut first_doc = PdfDocument::open(&first).unwrap();
    let first_dss = load_dss(&mut first_doc);
    let mut doc = PdfDocument::open(&second).unwrap();
    let dss = load_dss(&mut doc);
    assert_eq!(dss_blobs(&mut doc, &dss, "Certs").len(), 2, "certificates are not duplicated");
    assert_eq!(dss_blobs(&mut doc, &dss, "CRLs").len(), 1, "identical CRL is not duplicated");
    assert_eq!(dss.get("VRI").and_then(Object::as_dict).map(Dict::len), Some(1));
    assert_eq!(
        dss.get("Certs"),
        first_dss.get("Certs"),
        "existing certificate streams are reused"
    );
    assert_eq!(
        first_doc.catalog().unwrap().get("DSS"),
        doc.catalog().unwrap().get("DSS"),
        "the DSS object is updated in place"
    );
}

#[test]
fn test_unsigned_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "plain.pdf", &minimal_pdf());
    let output = dir.path().join("plain_LTV.pdf");
    let err = ValidationInfoAssembler::new(StubTransport::offline())
        .add_ltv(&input, &output)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPdf(_)), "got {:?}", err);
    assert!(!output.exists());
}

#[test]
fn test_fetcher_reports_revoked_certificate() {
    let pki = TestPki::new();
    let crl = pki.crl(&[&pki.leaf_cert]);
    let fetcher = RevocationFetcher::new(crl_transport(&pki, crl.clone()));

    let entry = fetcher.fetch(&pki.leaf_der(), Some(pki.root_der().as_slice())).unwrap();
    assert!(entry.revoked);
    assert_eq!(entry.crl, Some(crl));
    assert_eq!(entry.ocsp_response, None);
    assert_eq!(entry.certificate_digest, DigestAlgorithm::Sha1.digest(&pki.leaf_der()));
}

#[test]
fn test_fetcher_rejects_crl_from_other_issuer() {
    let pki = TestPki::new();
    let mut other_root = CertSpec::root();
    other_root.common_name = "Other Root CA".to_string();
    let stranger = TestPki::with_specs(other_root, CertSpec::leaf("Stranger"), common::rsa_key());
    let fetcher = RevocationFetcher::new(crl_transport(&pki, stranger.crl(&[])));

    let err = fetcher.fetch(&pki.leaf_der(), Some(pki.root_der().as_slice())).unwrap_err();
    assert!(matches!(err, Error::RevocationUnavailable { .. }), "got {:?}", err);
}

#[test]
fn test_fetcher_without_urls() {
    let pki = TestPki::new();
    let fetcher = RevocationFetcher::new(StubTransport::offline());
    // The root names neither an OCSP responder nor a CRL
    let err = fetcher.fetch(&pki.root_der(), Some(pki.root_der().as_slice())).unwrap_err();
    assert!(err.to_string().contains("no OCSP responder"), "{}", err);
}

#[test]
fn test_good_ocsp_response_is_preferred() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.identity());
    let ltv = dir.path().join("doc_signed_LTV.pdf");
    let transport = ocsp_transport(&pki, OcspAnswer::Good);

    let report = ValidationInfoAssembler::new(transport.clone())
        .add_ltv(&signed, &ltv)
        .unwrap();
    assert!(report.is_complete(), "missing: {:?}", report.missing);
    assert_eq!(report.covered, 1);
    let urls = transport.urls();
    assert_eq!(urls, vec![OCSP_URL.to_string()], "the CRL is not needed");
    assert_eq!(transport.calls()[0].content_type.as_deref(), Some("application/ocsp-request"));

    let mut doc = PdfDocument::open(&ltv).unwrap();
    let dss = load_dss(&mut doc);
    let ocsps = dss_blobs(&mut doc, &dss, "OCSPs");
    assert_eq!(ocsps.len(), 1);
    assert_eq!(OcspResponse::from_der(&ocsps[0]).unwrap().status(), OcspResponseStatus::SUCCESSFUL);
    assert!(dss_blobs(&mut doc, &dss, "CRLs").is_empty());

    let contents = signature_contents(&mut doc);
    let vri_key = hex_upper(&DigestAlgorithm::Sha1.digest(&contents));
    let vri = dss.get("VRI").and_then(Object::as_dict).unwrap();
    let entry = vri.get(&vri_key).and_then(Object::as_dict).unwrap();
    assert_eq!(entry.get("OCSP").and_then(Object::as_array).map(Vec::len), Some(1));
    assert_eq!(entry.get("CRL").and_then(Object::as_array).map(Vec::len), Some(0));
}

#[test]
fn test_fetcher_reports_ocsp_revocation() {
    let pki = TestPki::new();
    let fetcher = RevocationFetcher::new(ocsp_transport(&pki, OcspAnswer::Revoked));

    let entry = fetcher.fetch(&pki.leaf_der(), Some(pki.root_der().as_slice())).unwrap();
    assert!(entry.revoked);
    assert!(entry.ocsp_response.is_some());
    assert_eq!(entry.crl, None);
}

#[test]
fn test_crl_used_when_issuer_is_unknown() {
    let pki = TestPki::new();
    let dir = tempfile::tempdir().unwrap();
    let signed = signed_pdf(dir.path(), pki.leaf_only_identity());
    let ltv = dir.path().join("doc_signed_LTV.pdf");
    let crl = pki.crl(&[]);
    let transport = StubTransport::new(move |req| match req.url.as_str() {
        CRL_URL => Ok(crl.clone()),
        other => Err(http_error(other, "HTTP 503 Service Unavailable")),
    });

    let report = ValidationInfoAssembler::new(transport.clone())
        .add_ltv(&signed, &ltv)
        .unwrap();
    assert!(report.is_complete(), "missing: {:?}", report.missing);
    assert_eq!(report.covered, 1);
    let urls = transport.urls();
    assert!(urls.iter().any(|u| u == CRL_URL));
    assert!(!urls.iter().any(|u| u == OCSP_URL), "OCSP cannot be asked without the issuer");

    let mut doc = PdfDocument::open(&ltv).unwrap();
    let dss = load_dss(&mut doc);
    assert_eq!(dss_blobs(&mut doc, &dss, "CRLs").len(), 1);
}

#[test]
fn test_timeouts_everywhere_report_a_timeout() {
    let pki = TestPki::new();
    let fetcher = RevocationFetcher::new(StubTransport::new(|req| {
        Err(Error::NetworkTimeout {
            url: req.url.clone(),
            timeout_secs: 15,
        })
    }));

    let err = fetcher.fetch(&pki.leaf_der(), Some(pki.root_der().as_slice())).unwrap_err();
    match err {
        Error::NetworkTimeout { url, timeout_secs } => {
            assert_eq!(url, CRL_URL);
            assert_eq!(timeout_secs, 15);
        },
        other => panic!("unexpected {:?}", other),
    }

    // A mix of timeouts and other failures stays a revocation failure
    let fetcher = RevocationFetcher::new(StubTransport::new(|req| match req.url.as_str() {
        OCSP_URL => Err(Error::NetworkTimeout {
            url: req.url.clone(),
            timeout_secs: 15,
        }),
        other => Err(http_error(other, "HTTP 404 Not Found")),
    }));
    let err = fetcher.fetch(&pki.leaf_der(), Some(pki.root_der().as_slice())).unwrap_err();
    match err {
        Error::RevocationUnavailable { reason, .. } => {
            assert!(reason.contains("OCSP") && reason.contains("CRL"), "reason: {}", reason);
        },
        other => panic!("unexpected {:?}", other),
    }
}
