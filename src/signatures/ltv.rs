//! Long-term validation: a Document Security Store appended to a signed PDF.
//!
//! Every signature's chain (and the chain of its timestamp token, when one is
//! embedded) is completed and covered with OCSP or CRL evidence. The result
//! goes into `/DSS` as a second incremental update, so the signed revision's
//! bytes and byte range are untouched.
//!
//! ```text
//! /DSS << /Certs [..] /OCSPs [..] /CRLs [..]
//!         /VRI << /<SHA1(Contents)> << /Cert [..] /OCSP [..] /CRL [..] /TU (D:..) >> >> >>
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::Decode;
use indexmap::IndexMap;

use crate::decoders::flate_encode;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::signatures::cms_builder::{decode_signed_data, embedded_certificates, only_signer};
use crate::signatures::embedder::embedded_token;
use crate::signatures::identity::{is_self_issued, issued_by, parse_certificate};
use crate::signatures::revocation::{RevocationFetcher, ValidationEntry};
use crate::signatures::transport::{HttpTransport, ReqwestTransport, DEFAULT_TIMEOUT};
use crate::signatures::types::DigestAlgorithm;
use crate::writer::object_serializer::{dict, hex_upper, name, pdf_date, reference};
use crate::writer::{IncrementalUpdate, PendingFile};

/// Longest issuer chain walked from a signer certificate.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// Outcome of one LTV pass.
#[derive(Debug)]
pub struct LtvReport {
    /// Written document
    pub output: PathBuf,
    /// Certificates with embedded revocation evidence
    pub covered: usize,
    /// One error per certificate left without evidence: `NetworkTimeout`
    /// when every source timed out, `RevocationUnavailable` otherwise
    pub missing: Vec<Error>,
}

impl LtvReport {
    /// Every non-root certificate has evidence.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A DSS blob and, if it came from the document, its existing stream.
#[derive(Debug, Clone)]
struct Blob {
    der: Vec<u8>,
    existing: Option<ObjectRef>,
}

/// Deduplicated DSS content keyed by SHA-1 of each blob.
#[derive(Debug, Default)]
struct DssStore {
    certs: IndexMap<Vec<u8>, Blob>,
    ocsps: IndexMap<Vec<u8>, Blob>,
    crls: IndexMap<Vec<u8>, Blob>,
    vri: IndexMap<String, VriEntry>,
    existing_vri: Dict,
}

/// Digests of the material relevant to one signature.
#[derive(Debug, Default)]
struct VriEntry {
    certs: Vec<Vec<u8>>,
    ocsps: Vec<Vec<u8>>,
    crls: Vec<Vec<u8>>,
}

fn insert_blob(map: &mut IndexMap<Vec<u8>, Blob>, der: Vec<u8>, existing: Option<ObjectRef>) -> Vec<u8> {
    let key = DigestAlgorithm::Sha1.digest(&der);
    map.entry(key.clone()).or_insert(Blob { der, existing });
    key
}

fn push_unique(list: &mut Vec<Vec<u8>>, key: Vec<u8>) {
    if !list.contains(&key) {
        list.push(key);
    }
}

/// Collects revocation evidence and writes the DSS.
pub struct ValidationInfoAssembler {
    fetcher: RevocationFetcher,
    max_depth: usize,
}

impl std::fmt::Debug for ValidationInfoAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationInfoAssembler")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl ValidationInfoAssembler {
    /// Assembler fetching through `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            fetcher: RevocationFetcher::new(transport),
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    /// Assembler over `reqwest` with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(timeout)?)))
    }

    /// Assembler over `reqwest` with the default 15 second timeout.
    pub fn with_default_transport() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Limit the issuer walk.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Append a DSS revision to `input`, writing the result to `output`.
    ///
    /// Certificates without evidence do not fail the call: they are listed in
    /// [`LtvReport::missing`] and everything that was gathered is written.
    pub fn add_ltv(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<LtvReport> {
        let input = input.as_ref();
        let mut doc = PdfDocument::open(input)?;
        let signatures = doc.existing_signatures()?;
        if signatures.is_empty() {
            return Err(Error::InvalidPdf(format!("{} has no signatures", input.display())));
        }

        let mut store = DssStore::default();
        let dss_ref = self.load_existing_dss(&mut doc, &mut store)?;

        let mut evidence: HashMap<Vec<u8>, Option<ValidationEntry>> = HashMap::new();
        let mut missing = Vec::new();
        for field in &signatures {
            let contents = match field.value.as_ref().and_then(|v| v.get("Contents")).and_then(Object::as_string) {
                Some(contents) => contents.to_vec(),
                None => {
                    log::warn!("signature field {} has no /Contents, skipped", field.name);
                    continue;
                },
            };
            let vri_key = hex_upper(&DigestAlgorithm::Sha1.digest(&contents));
            let mut vri = VriEntry::default();

            let signed_data = decode_signed_data(&contents)?;
            let mut chains = vec![self.complete_chain(signer_chain(&signed_data)?)?];
            if let Some(token) = embedded_token(&contents)? {
                match decode_signed_data(&token).and_then(|data| signer_chain(&data)) {
                    Ok(tsa) => chains.push(self.complete_chain(tsa)?),
                    Err(e) => log::debug!("timestamp token of {} has no usable chain: {}", field.name, e),
                }
            }

            for chain in chains {
                for (i, cert) in chain.iter().enumerate() {
                    let key = insert_blob(&mut store.certs, cert.clone(), None);
                    push_unique(&mut vri.certs, key.clone());
                    if is_self_issued(&parse_certificate(cert)?) {
                        continue;
                    }
                    if !evidence.contains_key(&key) {
                        let entry = match self.fetcher.fetch(cert, chain.get(i + 1).map(Vec::as_slice)) {
                            Ok(entry) => Some(entry),
                            Err(e) => {
                                log::warn!("{}: {}", input.display(), e);
                                missing.push(e);
                                None
                            },
                        };
                        evidence.insert(key.clone(), entry);
                    }
                    if let Some(Some(entry)) = evidence.get(&key) {
                        if let Some(ocsp) = &entry.ocsp_response {
                            let key = insert_blob(&mut store.ocsps, ocsp.clone(), None);
                            push_unique(&mut vri.ocsps, key);
                        }
                        if let Some(crl) = &entry.crl {
                            let key = insert_blob(&mut store.crls, crl.clone(), None);
                            push_unique(&mut vri.crls, key);
                        }
                    }
                }
            }
            log::debug!(
                "signature {}: VRI {} with {} certs, {} OCSP, {} CRL",
                field.name,
                vri_key,
                vri.certs.len(),
                vri.ocsps.len(),
                vri.crls.len()
            );
            store.vri.insert(vri_key, vri);
        }

        let covered = evidence.values().filter(|e| e.is_some()).count();
        let output = self.write_dss(&mut doc, store, dss_ref, output.as_ref())?;
        log::info!(
            "added LTV data {} -> {} ({} certificates covered, {} missing)",
            input.display(),
            output.display(),
            covered,
            missing.len()
        );
        Ok(LtvReport {
            output,
            covered,
            missing,
        })
    }

    /// Walk issuers from the leaf, fetching any the signature does not carry.
    fn complete_chain(&self, (leaf, mut pool): (Vec<u8>, Vec<Vec<u8>>)) -> Result<Vec<Vec<u8>>> {
        let mut chain = vec![leaf];
        while chain.len() < self.max_depth {
            let current_der = chain[chain.len() - 1].clone();
            let current = parse_certificate(&current_der)?;
            if is_self_issued(&current) {
                break;
            }
            let mut found = None;
            for (i, candidate) in pool.iter().enumerate() {
                if issued_by(&current, &parse_certificate(candidate)?) {
                    found = Some(i);
                    break;
                }
            }
            let issuer = match found {
                Some(i) => pool.swap_remove(i),
                None => match self.fetcher.fetch_issuer(&current_der)? {
                    Some(issuer) => issuer,
                    None => {
                        log::debug!("issuer of '{}' not found", current.subject());
                        break;
                    },
                },
            };
            if chain.contains(&issuer) {
                break;
            }
            chain.push(issuer);
        }
        Ok(chain)
    }

    fn load_existing_dss(&self, doc: &mut PdfDocument, store: &mut DssStore) -> Result<Option<ObjectRef>> {
        let catalog = doc.catalog()?;
        let dss_ref = catalog.get("DSS").and_then(Object::as_reference);
        let dss = match doc.resolve_entry(&catalog, "DSS")? {
            Some(Object::Dictionary(dss)) => dss,
            _ => return Ok(None),
        };
        for (key, map) in [("Certs", &mut store.certs), ("OCSPs", &mut store.ocsps), ("CRLs", &mut store.crls)] {
            let items = doc.resolve_entry(&dss, key)?;
            for item in items.as_ref().and_then(Object::as_array).cloned().unwrap_or_default() {
                let existing = item.as_reference();
                let stream = doc.resolve(&item)?;
                match stream.decode_stream_data() {
                    Ok(data) => {
                        insert_blob(map, data, existing);
                    },
                    Err(e) => log::warn!("dropping unreadable /DSS /{} entry: {}", key, e),
                }
            }
        }
        if let Some(Object::Dictionary(vri)) = doc.resolve_entry(&dss, "VRI")? {
            store.existing_vri = vri;
        }
        log::debug!(
            "merging existing DSS: {} certs, {} OCSP, {} CRL, {} VRI",
            store.certs.len(),
            store.ocsps.len(),
            store.crls.len(),
            store.existing_vri.len()
        );
        Ok(dss_ref)
    }

    fn write_dss(
        &self,
        doc: &mut PdfDocument,
        store: DssStore,
        dss_ref: Option<ObjectRef>,
        output: &Path,
    ) -> Result<PathBuf> {
        let mut update = IncrementalUpdate::new(doc);
        let certs = write_streams(&mut update, &store.certs)?;
        let ocsps = write_streams(&mut update, &store.ocsps)?;
        let crls = write_streams(&mut update, &store.crls)?;

        let refs = |keys: &[Vec<u8>], written: &IndexMap<Vec<u8>, ObjectRef>| {
            Object::Array(keys.iter().filter_map(|k| written.get(k)).map(|r| reference(*r)).collect())
        };
        let now = pdf_date(Utc::now());
        let mut vri = store.existing_vri;
        for (key, entry) in &store.vri {
            vri.insert(
                key.clone(),
                dict([
                    ("Cert", refs(&entry.certs, &certs)),
                    ("OCSP", refs(&entry.ocsps, &ocsps)),
                    ("CRL", refs(&entry.crls, &crls)),
                    ("TU", now.clone()),
                ]),
            );
        }

        let all = |written: &IndexMap<Vec<u8>, ObjectRef>| Object::Array(written.values().map(|r| reference(*r)).collect());
        let mut dss = Dict::new();
        dss.insert("Type".to_string(), name("DSS"));
        dss.insert("Certs".to_string(), all(&certs));
        dss.insert("OCSPs".to_string(), all(&ocsps));
        dss.insert("CRLs".to_string(), all(&crls));
        dss.insert("VRI".to_string(), Object::Dictionary(vri));
        let dss_ref = dss_ref.unwrap_or_else(|| update.allocate());
        update.put(dss_ref, Object::Dictionary(dss));

        let catalog_ref = doc.catalog_ref()?;
        let mut catalog = doc.catalog()?;
        let mut extensions = match doc.resolve_entry(&catalog, "Extensions")? {
            Some(Object::Dictionary(ext)) => ext,
            _ => Dict::new(),
        };
        extensions.insert(
            "ESIC".to_string(),
            dict([("BaseVersion", name("1.7")), ("ExtensionLevel", Object::Integer(5))]),
        );
        catalog.insert("Extensions".to_string(), Object::Dictionary(extensions));
        catalog.insert("DSS".to_string(), reference(dss_ref));
        update.put(catalog_ref, Object::Dictionary(catalog));

        let rendered = update.render()?;
        let pending = PendingFile::create(output, &[doc.data(), &rendered.bytes])?;
        pending.persist()
    }
}

/// Write new blobs as Flate streams; existing ones keep their object.
fn write_streams(
    update: &mut IncrementalUpdate,
    blobs: &IndexMap<Vec<u8>, Blob>,
) -> Result<IndexMap<Vec<u8>, ObjectRef>> {
    let mut written = IndexMap::with_capacity(blobs.len());
    for (key, blob) in blobs {
        let r = match blob.existing {
            Some(r) => r,
            None => {
                let r = update.allocate();
                let mut stream_dict = Dict::new();
                stream_dict.insert("Filter".to_string(), name("FlateDecode"));
                update.put(
                    r,
                    Object::Stream {
                        dict: stream_dict,
                        data: bytes::Bytes::from(flate_encode(&blob.der)?),
                    },
                );
                r
            },
        };
        written.insert(key.clone(), r);
    }
    Ok(written)
}

/// The signer certificate and the remaining embedded certificates.
fn signer_chain(signed_data: &SignedData) -> Result<(Vec<u8>, Vec<Vec<u8>>)> {
    let mut certs = embedded_certificates(signed_data)?;
    if certs.is_empty() {
        return Err(Error::Encoding("signature carries no certificates".to_string()));
    }
    let signer = only_signer(signed_data)?;
    let mut leaf_index = 0;
    if let SignerIdentifier::IssuerAndSerialNumber(isn) = &signer.sid {
        for (i, der) in certs.iter().enumerate() {
            let cert = x509_cert::Certificate::from_der(der)?;
            if cert.tbs_certificate.serial_number == isn.serial_number && cert.tbs_certificate.issuer == isn.issuer {
                leaf_index = i;
                break;
            }
        }
    }
    let leaf = certs.remove(leaf_index);
    Ok((leaf, certs))
}
