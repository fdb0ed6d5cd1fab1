//! Shared fixtures for the integration tests: a small test PKI, minimal
//! PDFs, and an in-process transport that plays TSA, OCSP responder and CRL
//! server.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{EncapsulatedContentInfo, SignedData, SignerInfos};
use der::asn1::{Any, BitString, GeneralizedTime, Int, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode, Sequence, Tag, TagNumber};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use spki::AlgorithmIdentifierOwned;
use x509_tsp::{MessageImprint, TimeStampReq};

use pdf_ltv_signer::signatures::transport::BasicAuth;
use pdf_ltv_signer::signatures::{DigestAlgorithm, HttpTransport, SigningIdentity};
use pdf_ltv_signer::{Error, Result};

pub const OCSP_URL: &str = "http://ocsp.test.invalid/";
pub const CRL_URL: &str = "http://crl.test.invalid/root.crl";
pub const CA_ISSUERS_URL: &str = "http://certs.test.invalid/root.cer";
pub const TSA_URL: &str = "http://tsa.test.invalid/tsr";

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_CT_TST_INFO: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const ID_PKIX_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");
const TSA_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.13762.3");

// ---------------------------------------------------------------------------
// Keys and certificates
// ---------------------------------------------------------------------------

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// What goes into a test certificate.
#[derive(Debug, Clone)]
pub struct CertSpec {
    pub common_name: String,
    pub serial: u32,
    pub ca: bool,
    /// Leaf allows digitalSignature / nonRepudiation
    pub signing_usage: bool,
    /// Add AIA (OCSP + caIssuers) and CRL distribution point extensions
    pub revocation_urls: bool,
    /// Validity window relative to now, in days
    pub valid_from_days: i64,
    pub valid_to_days: i64,
}

impl CertSpec {
    pub fn root() -> Self {
        Self {
            common_name: "Test Root CA".to_string(),
            serial: 1,
            ca: true,
            signing_usage: false,
            revocation_urls: false,
            valid_from_days: -1,
            valid_to_days: 3650,
        }
    }

    pub fn leaf(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            serial: 1001,
            ca: false,
            signing_usage: true,
            revocation_urls: true,
            valid_from_days: -1,
            valid_to_days: 365,
        }
    }
}

fn days_from_now(days: i64) -> Asn1Time {
    let at = chrono::Utc::now().timestamp() + days * 86_400;
    Asn1Time::from_unix(at as _).unwrap()
}

/// Issue a certificate for `key`; self-signed when `issuer` is None.
#[allow(deprecated)]
pub fn issue_cert(spec: &CertSpec, key: &PKey<Private>, issuer: Option<(&X509, &PKey<Private>)>) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, &spec.common_name).unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "PDF Signer Test").unwrap();
    name.append_entry_by_nid(Nid::LOCALITYNAME, "Jakarta").unwrap();
    name.append_entry_by_nid(Nid::COUNTRYNAME, "ID").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(spec.serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&days_from_now(spec.valid_from_days)).unwrap();
    builder.set_not_after(&days_from_now(spec.valid_to_days)).unwrap();

    if spec.ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
            .unwrap();
    } else {
        let mut usage = KeyUsage::new();
        usage.critical();
        if spec.signing_usage {
            usage.digital_signature().non_repudiation();
        } else {
            usage.key_encipherment();
        }
        builder.append_extension(usage.build().unwrap()).unwrap();
    }
    if spec.revocation_urls {
        let aia = format!("OCSP;URI:{},caIssuers;URI:{}", OCSP_URL, CA_ISSUERS_URL);
        builder
            .append_extension(X509Extension::new_nid(None, None, Nid::INFO_ACCESS, &aia).unwrap())
            .unwrap();
        builder
            .append_extension(
                X509Extension::new_nid(None, None, Nid::CRL_DISTRIBUTION_POINTS, &format!("URI:{}", CRL_URL))
                    .unwrap(),
            )
            .unwrap();
    }

    let signing_key = issuer.map(|(_, k)| k).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// Root CA plus one end-entity signer.
pub struct TestPki {
    pub root_key: PKey<Private>,
    pub root_cert: X509,
    pub leaf_key: PKey<Private>,
    pub leaf_cert: X509,
}

impl TestPki {
    /// RSA signer with AIA and CRL distribution point.
    pub fn new() -> Self {
        Self::with_leaf(CertSpec::leaf("Test Signer"), rsa_key())
    }

    pub fn with_leaf(spec: CertSpec, leaf_key: PKey<Private>) -> Self {
        Self::with_specs(CertSpec::root(), spec, leaf_key)
    }

    pub fn with_specs(root: CertSpec, spec: CertSpec, leaf_key: PKey<Private>) -> Self {
        let root_key = rsa_key();
        let root_cert = issue_cert(&root, &root_key, None);
        let leaf_cert = issue_cert(&spec, &leaf_key, Some((&root_cert, &root_key)));
        Self {
            root_key,
            root_cert,
            leaf_key,
            leaf_cert,
        }
    }

    pub fn leaf_der(&self) -> Vec<u8> {
        self.leaf_cert.to_der().unwrap()
    }

    pub fn root_der(&self) -> Vec<u8> {
        self.root_cert.to_der().unwrap()
    }

    pub fn key_der(&self) -> Vec<u8> {
        self.leaf_key.private_key_to_pkcs8().unwrap()
    }

    /// Identity over the full chain.
    pub fn identity(&self) -> SigningIdentity {
        SigningIdentity::from_der_parts(&self.key_der(), vec![self.leaf_der(), self.root_der()], DigestAlgorithm::Sha256)
            .unwrap()
    }

    /// Identity carrying only the leaf, so the issuer must be fetched.
    pub fn leaf_only_identity(&self) -> SigningIdentity {
        SigningIdentity::from_der_parts(&self.key_der(), vec![self.leaf_der()], DigestAlgorithm::Sha256).unwrap()
    }

    /// PKCS#12 container with the leaf key, leaf certificate and root.
    pub fn pkcs12(&self, alias: &str, password: &str) -> Vec<u8> {
        let mut ca = Stack::new().unwrap();
        ca.push(self.root_cert.clone()).unwrap();
        Pkcs12::builder()
            .name(alias)
            .pkey(&self.leaf_key)
            .cert(&self.leaf_cert)
            .ca(ca)
            .build2(password)
            .unwrap()
            .to_der()
            .unwrap()
    }

    /// CRL signed by the root, listing `revoked`.
    pub fn crl(&self, revoked: &[&X509]) -> Vec<u8> {
        let root = x509_cert::Certificate::from_der(&self.root_der()).unwrap();
        let validity = x509_cert::time::Validity::from_now(Duration::from_secs(7 * 86_400)).unwrap();
        let entries: Vec<x509_cert::crl::RevokedCert> = revoked
            .iter()
            .map(|cert| {
                let parsed = x509_cert::Certificate::from_der(&cert.to_der().unwrap()).unwrap();
                x509_cert::crl::RevokedCert {
                    serial_number: parsed.tbs_certificate.serial_number,
                    revocation_date: validity.not_before,
                    crl_entry_extensions: None,
                }
            })
            .collect();
        let algorithm = AlgorithmIdentifierOwned {
            oid: SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        };
        let tbs = x509_cert::crl::TbsCertList {
            version: x509_cert::Version::V2,
            signature: algorithm.clone(),
            issuer: root.tbs_certificate.subject,
            this_update: validity.not_before,
            next_update: Some(validity.not_after),
            revoked_certificates: if entries.is_empty() { None } else { Some(entries) },
            crl_extensions: None,
        };
        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &self.root_key).unwrap();
        let signature = signer.sign_oneshot_to_vec(&tbs.to_der().unwrap()).unwrap();
        x509_cert::crl::CertificateList {
            tbs_cert_list: tbs,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&signature).unwrap(),
        }
        .to_der()
        .unwrap()
    }
}

impl TestPki {
    /// OCSP responder answering for certificates issued by the root.
    pub fn ocsp_responder(&self, status: OcspAnswer) -> OcspResponder {
        OcspResponder {
            cert: self.root_cert.clone(),
            key: self.root_key.clone(),
            status,
        }
    }
}

/// A PKI shared by tests that only need some signer.
pub fn shared_pki() -> &'static TestPki {
    static PKI: std::sync::OnceLock<TestPki> = std::sync::OnceLock::new();
    PKI.get_or_init(TestPki::new)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Classic-xref PDF made of `objects`, numbered from 1; object 1 is the catalog.
pub fn build_pdf(objects: &[&str]) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}

/// Same objects, indexed by an uncompressed cross-reference stream.
pub fn build_pdf_xref_stream(objects: &[&str]) -> Vec<u8> {
    let mut pdf = b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_id = objects.len() + 1;
    let xref = pdf.len();
    offsets.push(xref);

    let mut rows = vec![0u8, 0, 0, 0, 0, 0xFF, 0xFF];
    for offset in &offsets {
        rows.push(1);
        rows.extend_from_slice(&(*offset as u32).to_be_bytes());
        rows.extend_from_slice(&[0, 0]);
    }
    pdf.extend_from_slice(
        format!(
            "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            xref_id,
            xref_id + 1,
            rows.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&rows);
    pdf.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref).as_bytes());
    pdf
}

const PAGE_OBJECTS: [&str; 4] = [
    "<< /Type /Catalog /Pages 2 0 R >>",
    "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
    "<< /Length 45 >>\nstream\nBT /F1 12 Tf 72 720 Td (Sign me please) Tj ET\nendstream",
];

/// One-page document with a classic xref table.
pub fn minimal_pdf() -> Vec<u8> {
    build_pdf(&PAGE_OBJECTS)
}

/// One-page document with a cross-reference stream.
pub fn minimal_pdf_xref_stream() -> Vec<u8> {
    build_pdf_xref_stream(&PAGE_OBJECTS)
}

/// Document already certified with DocMDP `permission`.
pub fn certified_pdf(permission: i64) -> Vec<u8> {
    let catalog = "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [5 0 R] /SigFlags 3 >> /Perms << /DocMDP 6 0 R >> >>";
    let sig = format!(
        "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached /ByteRange [0 0 0 0] /Contents <00> \
         /Reference [<< /Type /SigRef /TransformMethod /DocMDP /TransformParams << /Type /TransformParams /P {} /V /1.2 >> >>] >>",
        permission
    );
    build_pdf(&[
        catalog,
        PAGE_OBJECTS[1],
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>",
        PAGE_OBJECTS[3],
        "<< /Type /Annot /Subtype /Widget /FT /Sig /T (Certification) /V 6 0 R /Rect [0 0 0 0] /P 3 0 R >>",
        &sig,
    ])
}

pub fn write_pdf(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Network stub
// ---------------------------------------------------------------------------

/// One request seen by [`StubTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub auth: Option<(String, String)>,
}

type Handler = Box<dyn Fn(&RecordedRequest) -> Result<Vec<u8>> + Send + Sync>;

/// In-process [`HttpTransport`] answering through a closure.
pub struct StubTransport {
    handler: Handler,
    calls: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn new(handler: impl Fn(&RecordedRequest) -> Result<Vec<u8>> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every request fails as if the host were unreachable.
    pub fn offline() -> Arc<Self> {
        Self::new(|req| Err(http_error(&req.url, "connection refused")))
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }

    fn handle(&self, request: RecordedRequest) -> Result<Vec<u8>> {
        let response = (self.handler)(&request);
        self.calls.lock().unwrap().push(request);
        response
    }
}

impl HttpTransport for StubTransport {
    fn post(&self, url: &str, content_type: &str, _accept: &str, body: &[u8], auth: BasicAuth<'_>) -> Result<Vec<u8>> {
        self.handle(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            content_type: Some(content_type.to_string()),
            body: body.to_vec(),
            auth: auth.map(|(u, p)| (u.to_string(), p.to_string())),
        })
    }

    fn get(&self, url: &str, _accept: &str) -> Result<Vec<u8>> {
        self.handle(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            content_type: None,
            body: Vec::new(),
            auth: None,
        })
    }
}

pub fn http_error(url: &str, reason: &str) -> Error {
    Error::Http {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Mock time-stamp authority
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Sequence)]
struct MockTstInfo {
    version: u8,
    policy: ObjectIdentifier,
    message_imprint: MessageImprint,
    serial_number: Int,
    gen_time: GeneralizedTime,
    nonce: Option<Int>,
}

#[derive(Clone, Debug, Sequence)]
struct MockStatusInfo {
    status: u8,
}

#[derive(Clone, Debug, Sequence)]
struct MockTimeStampResp {
    status: MockStatusInfo,
    token: Option<ContentInfo>,
}

/// How the mock TSA misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsaBehaviour {
    Grant,
    Reject,
    WrongNonce,
    WrongImprint,
}

/// RFC 3161 reply to `request_der`. The token carries no signer.
pub fn tsa_response(request_der: &[u8], behaviour: TsaBehaviour) -> Vec<u8> {
    let request = TimeStampReq::from_der(request_der).unwrap();
    if behaviour == TsaBehaviour::Reject {
        return MockTimeStampResp {
            status: MockStatusInfo { status: 2 },
            token: None,
        }
        .to_der()
        .unwrap();
    }

    let mut message_imprint = request.message_imprint.clone();
    if behaviour == TsaBehaviour::WrongImprint {
        message_imprint.hashed_message = OctetString::new(vec![0u8; 32]).unwrap();
    }
    let nonce = match behaviour {
        TsaBehaviour::WrongNonce => Some(Int::new(&[0x42, 0x42]).unwrap()),
        _ => request.nonce.clone(),
    };
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap();
    let tst_info = MockTstInfo {
        version: 1,
        policy: TSA_POLICY,
        message_imprint,
        serial_number: Int::new(&[0x01, 0x23]).unwrap(),
        gen_time: GeneralizedTime::from_unix_duration(Duration::from_secs(now.as_secs())).unwrap(),
        nonce,
    };

    let econtent = OctetString::new(tst_info.to_der().unwrap()).unwrap();
    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: SetOfVec::try_from(vec![AlgorithmIdentifierOwned {
            oid: SHA256,
            parameters: None,
        }])
        .unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_CT_TST_INFO,
            econtent: Some(Any::encode_from(&econtent).unwrap()),
        },
        certificates: None,
        crls: None,
        signer_infos: SignerInfos(SetOfVec::new()),
    };
    let token = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data).unwrap(),
    };
    MockTimeStampResp {
        status: MockStatusInfo { status: 0 },
        token: Some(token),
    }
    .to_der()
    .unwrap()
}

/// Transport that serves the mock TSA at [`TSA_URL`] and fails everything else.
pub fn tsa_transport(behaviour: TsaBehaviour) -> Arc<StubTransport> {
    StubTransport::new(move |req| {
        if req.url == TSA_URL {
            Ok(tsa_response(&req.body, behaviour))
        } else {
            Err(http_error(&req.url, "HTTP 404 Not Found"))
        }
    })
}

// ---------------------------------------------------------------------------
// Mock OCSP responder
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Sequence)]
struct MockOcspCertRequest {
    req_cert: Any,
    #[asn1(context_specific = "0", optional = "true")]
    extensions: Option<Any>,
}

#[derive(Clone, Debug, Sequence)]
struct MockTbsOcspRequest {
    #[asn1(context_specific = "0", optional = "true")]
    version: Option<u8>,
    #[asn1(context_specific = "1", optional = "true")]
    requestor_name: Option<Any>,
    request_list: Vec<MockOcspCertRequest>,
    #[asn1(context_specific = "2", optional = "true")]
    extensions: Option<Any>,
}

#[derive(Clone, Debug, Sequence)]
struct MockOcspRequest {
    tbs_request: MockTbsOcspRequest,
    #[asn1(context_specific = "0", optional = "true")]
    signature: Option<Any>,
}

#[derive(Clone, Debug, Sequence)]
struct MockSingleResponse {
    cert_id: Any,
    cert_status: Any,
    this_update: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    next_update: Option<GeneralizedTime>,
}

#[derive(Clone, Debug, Sequence)]
struct MockResponseData {
    responder_id: Any,
    produced_at: GeneralizedTime,
    responses: Vec<MockSingleResponse>,
}

#[derive(Clone, Debug, Sequence)]
struct MockBasicOcspResponse {
    tbs_response_data: MockResponseData,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: BitString,
}

#[derive(Clone, Debug, Sequence)]
struct MockResponseBytes {
    response_type: ObjectIdentifier,
    response: OctetString,
}

#[derive(Clone, Debug, Sequence)]
struct MockOcspResponse {
    status: Any,
    #[asn1(context_specific = "0", optional = "true")]
    response_bytes: Option<MockResponseBytes>,
}

/// Certificate status the mock responder reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspAnswer {
    Good,
    Revoked,
}

/// Signs BasicOCSPResponses with the root key, echoing each requested CertID.
#[derive(Clone)]
pub struct OcspResponder {
    cert: X509,
    key: PKey<Private>,
    status: OcspAnswer,
}

fn context_tag(number: TagNumber, constructed: bool) -> Tag {
    Tag::ContextSpecific { constructed, number }
}

fn generalized_time(offset_secs: u64) -> GeneralizedTime {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap();
    GeneralizedTime::from_unix_duration(Duration::from_secs(now.as_secs() + offset_secs)).unwrap()
}

impl OcspResponder {
    /// DER OCSPResponse for `request_der`.
    pub fn respond(&self, request_der: &[u8]) -> Vec<u8> {
        let request = MockOcspRequest::from_der(request_der).unwrap();
        let now = generalized_time(0);
        let cert_status = match self.status {
            OcspAnswer::Good => Any::new(context_tag(TagNumber::N0, false), Vec::new()).unwrap(),
            OcspAnswer::Revoked => Any::new(context_tag(TagNumber::N1, true), now.to_der().unwrap()).unwrap(),
        };
        let responses = request
            .tbs_request
            .request_list
            .iter()
            .map(|single| MockSingleResponse {
                cert_id: single.req_cert.clone(),
                cert_status: cert_status.clone(),
                this_update: now,
                next_update: Some(generalized_time(86_400)),
            })
            .collect();

        let root = x509_cert::Certificate::from_der(&self.cert.to_der().unwrap()).unwrap();
        let key_bits = root.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes();
        let key_hash = OctetString::new(openssl::sha::sha1(key_bits).to_vec()).unwrap();
        let tbs = MockResponseData {
            responder_id: Any::new(context_tag(TagNumber::N2, true), key_hash.to_der().unwrap()).unwrap(),
            produced_at: now,
            responses,
        };

        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &self.key).unwrap();
        let signature = signer.sign_oneshot_to_vec(&tbs.to_der().unwrap()).unwrap();
        let basic = MockBasicOcspResponse {
            tbs_response_data: tbs,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: SHA256_WITH_RSA,
                parameters: Some(Any::null()),
            },
            signature: BitString::from_bytes(&signature).unwrap(),
        };
        MockOcspResponse {
            status: Any::new(Tag::Enumerated, vec![0u8]).unwrap(),
            response_bytes: Some(MockResponseBytes {
                response_type: ID_PKIX_OCSP_BASIC,
                response: OctetString::new(basic.to_der().unwrap()).unwrap(),
            }),
        }
        .to_der()
        .unwrap()
    }
}
