//! Incremental PDF signing.
//!
//! A signature is added as a new revision appended to the unmodified
//! original: a signature dictionary with fixed-width `/ByteRange` and
//! `/Contents` placeholders, a signature field widget on the first page, and
//! the updated page, form and catalog objects. Once the revision is on disk
//! the bytes outside the `/Contents` gap are digested, the CMS is built
//! (and optionally timestamped) and its hex encoding is written into the gap.
//!
//! ```text
//! Unsigned -> PlaceholderReserved -> Digested -> CmsBuilt
//!     -> [TimestampPending -> TimestampEmbedded] -> Finalized
//! ```
//!
//! Everything is written to a temporary file that is renamed onto the output
//! path only after the signature bytes are in place.

use std::path::Path;
use std::sync::Arc;

use crate::document::{AcroFormLocation, PdfDocument, SignatureField};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::signatures::byterange::{
    byte_range_placeholder, contents_placeholder, encode_contents, format_byte_range, signature_capacity, ByteRange,
    ByteRangeDigester,
};
use crate::signatures::cms_builder::{signature_value, DetachedSignatureBuilder};
use crate::signatures::embedder::TimestampEmbedder;
use crate::signatures::identity::SigningIdentity;
use crate::signatures::timestamp::{TimestampClient, TsaConfig};
use crate::signatures::transport::HttpTransport;
use crate::signatures::types::{
    DigestAlgorithm, SignOutcome, SignWarning, SignatureRequest, SigningStep, TimestampPolicy,
};
use crate::writer::object_serializer::{dict, name, pdf_date, reference, text_string, ObjectSerializer};
use crate::writer::{IncrementalUpdate, PendingFile};

/// Widget flags: Print | Locked.
const WIDGET_FLAGS: i64 = 132;
/// AcroForm flags: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;
/// DocMDP level for a certification signature: form filling and signing allowed.
const CERTIFY_PERMISSION: i64 = 2;
/// DocMDP level that forbids any change.
const LOCKED_PERMISSION: i64 = 1;

/// Progress of one signing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    /// Nothing written yet
    Unsigned,
    /// Revision with placeholders written to the temporary file
    PlaceholderReserved,
    /// ByteRange digest computed
    Digested,
    /// CMS SignedData built
    CmsBuilt,
    /// Waiting on the TSA
    TimestampPending,
    /// Token added as an unsigned attribute
    TimestampEmbedded,
    /// Signature written and output renamed into place
    Finalized,
}

impl SigningState {
    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: SigningState) -> bool {
        use SigningState::*;
        matches!(
            (self, next),
            (Unsigned, PlaceholderReserved)
                | (PlaceholderReserved, Digested)
                | (Digested, CmsBuilt)
                | (CmsBuilt, TimestampPending)
                | (CmsBuilt, Finalized)
                | (TimestampPending, TimestampEmbedded)
                | (TimestampPending, Finalized)
                | (TimestampEmbedded, Finalized)
        )
    }
}

/// Placeholder revision ready to be written after the original bytes.
#[derive(Debug)]
struct PreparedRevision {
    section: Vec<u8>,
    range: ByteRange,
    capacity: usize,
    certify: bool,
    field_name: String,
}

/// Signs documents by appending an incremental update.
pub struct IncrementalSigner {
    transport: Option<Arc<dyn HttpTransport>>,
    builder: DetachedSignatureBuilder,
    embedder: TimestampEmbedder,
}

impl std::fmt::Debug for IncrementalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalSigner")
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl Default for IncrementalSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalSigner {
    /// Signer that talks to TSAs over `reqwest`.
    pub fn new() -> Self {
        Self {
            transport: None,
            builder: DetachedSignatureBuilder::new(),
            embedder: TimestampEmbedder::new(),
        }
    }

    /// Signer that sends TSA requests through `transport`.
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new()
        }
    }

    /// Sign `request.source` into `output`.
    ///
    /// The identity is consumed; its key is released when the CMS is built.
    /// On any error the output path is left untouched.
    pub fn sign(
        &self,
        request: &SignatureRequest,
        identity: SigningIdentity,
        output: impl AsRef<Path>,
    ) -> Result<SignOutcome> {
        let source = request.source.display().to_string();
        let mut state = SigningState::Unsigned;

        // Key and certificate checks come before any file or network work
        identity.check_usable(request.signing_time)?;
        let mut doc = PdfDocument::open(&request.source)?;
        let revision = prepare_revision(&mut doc, request, &identity)?;
        let pending = PendingFile::create(output.as_ref(), &[doc.data(), &revision.section])?;
        drop(doc);
        advance(&source, &mut state, SigningState::PlaceholderReserved);

        let digest_algorithm = identity.digest_algorithm();
        let digest = ByteRangeDigester::new(digest_algorithm).digest_file(pending.path(), &revision.range)?;
        advance(&source, &mut state, SigningState::Digested);

        let mut cms = self.builder.build(&digest, identity, request)?;
        advance(&source, &mut state, SigningState::CmsBuilt);

        let mut warnings = Vec::new();
        let mut timestamped = false;
        if let Some(tsa) = &request.tsa {
            advance(&source, &mut state, SigningState::TimestampPending);
            match self.timestamp(&cms, digest_algorithm, tsa) {
                Ok(extended) => {
                    cms = extended;
                    timestamped = true;
                    advance(&source, &mut state, SigningState::TimestampEmbedded);
                },
                Err(e) if e.is_recoverable_timestamp_failure() && request.timestamp_policy == TimestampPolicy::Continue => {
                    log::warn!("{}: continuing without timestamp: {}", source, e);
                    warnings.push(SignWarning {
                        step: SigningStep::Timestamp,
                        reason: e.to_string(),
                    });
                },
                Err(e) => return Err(e),
            }
        }

        let hex = encode_contents(&cms, revision.capacity)?;
        pending.write_at(revision.range.gap().0, hex.as_bytes())?;
        let output = pending.persist()?;
        advance(&source, &mut state, SigningState::Finalized);

        log::info!(
            "signed {} -> {} (field {}, {} of {} CMS bytes used{}{})",
            source,
            output.display(),
            revision.field_name,
            cms.len(),
            revision.capacity,
            if revision.certify { ", certified" } else { "" },
            if timestamped { ", timestamped" } else { "" }
        );
        Ok(SignOutcome {
            output,
            timestamped,
            certified: revision.certify,
            warnings,
        })
    }

    fn timestamp(&self, cms: &[u8], algorithm: DigestAlgorithm, tsa: &TsaConfig) -> Result<Vec<u8>> {
        let client = match &self.transport {
            Some(transport) => TimestampClient::new(Arc::clone(transport)),
            None => TimestampClient::for_config(tsa).map_err(|e| Error::TimestampUnavailable {
                url: tsa.url.clone(),
                reason: e.to_string(),
            })?,
        };
        let imprint = algorithm.digest(&signature_value(cms)?);
        let token = client.request_timestamp(&imprint, algorithm, tsa)?;
        self.embedder.embed(cms, &token)
    }
}

fn advance(source: &str, state: &mut SigningState, next: SigningState) {
    debug_assert!(state.can_advance_to(next), "{:?} -> {:?}", state, next);
    log::debug!("{}: {:?} -> {:?}", source, state, next);
    *state = next;
}

/// Check DocMDP, build the placeholder revision and fill in its ByteRange.
fn prepare_revision(
    doc: &mut PdfDocument,
    request: &SignatureRequest,
    identity: &SigningIdentity,
) -> Result<PreparedRevision> {
    if let Some(permission) = doc.docmdp_permission()? {
        if permission == LOCKED_PERMISSION {
            return Err(Error::DocumentLocked { permission });
        }
    }
    let fields = doc.signature_fields()?;
    let certify = request.certify && fields.iter().all(|f| f.value.is_none());
    let chain_sizes: Vec<usize> = identity.chain_der().iter().map(Vec::len).collect();
    let capacity = signature_capacity(&chain_sizes, identity.signature_len(), request.tsa.is_some());
    let field_name = unique_field_name(&fields);

    let mut update = IncrementalUpdate::new(doc);
    let sig_ref = update.allocate();
    let field_ref = update.allocate();
    let page_ref = doc.page_ref(0)?;

    let placeholder = SignaturePlaceholder::new(request, capacity, certify);
    update.put_raw(sig_ref, placeholder.body.clone());
    update.put(
        field_ref,
        dict([
            ("Type", name("Annot")),
            ("Subtype", name("Widget")),
            ("FT", name("Sig")),
            ("T", text_string(&field_name)),
            ("V", reference(sig_ref)),
            ("Rect", Object::Array(vec![Object::Integer(0); 4])),
            ("F", Object::Integer(WIDGET_FLAGS)),
            ("P", reference(page_ref)),
        ]),
    );
    add_annotation(doc, &mut update, page_ref, field_ref)?;

    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;
    let mut catalog_dirty = false;
    match doc.acroform()? {
        AcroFormLocation::Indirect(form_ref, form) => {
            let form = add_form_field(doc, &mut update, form, field_ref)?;
            update.put(form_ref, Object::Dictionary(form));
        },
        AcroFormLocation::Inline(form) => {
            let form = add_form_field(doc, &mut update, form, field_ref)?;
            catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
            catalog_dirty = true;
        },
        AcroFormLocation::Absent => {
            let form_ref = update.allocate();
            update.put(
                form_ref,
                dict([
                    ("Fields", Object::Array(vec![reference(field_ref)])),
                    ("SigFlags", Object::Integer(SIG_FLAGS)),
                ]),
            );
            catalog.insert("AcroForm".to_string(), reference(form_ref));
            catalog_dirty = true;
        },
    }
    if certify {
        let mut perms = match doc.resolve_entry(&catalog, "Perms")? {
            Some(Object::Dictionary(perms)) => perms,
            _ => Dict::new(),
        };
        perms.insert("DocMDP".to_string(), reference(sig_ref));
        catalog.insert("Perms".to_string(), Object::Dictionary(perms));
        catalog_dirty = true;
    }
    if catalog_dirty {
        update.put(catalog_ref, Object::Dictionary(catalog));
    }

    let rendered = update.render()?;
    let body_offset = rendered
        .body_offset(sig_ref.id)
        .ok_or_else(|| Error::InvalidPdf("signature dictionary missing from revision".to_string()))?;
    let base = doc.len();
    let gap_start = body_offset + placeholder.contents_at as u64;
    let gap_end = gap_start + placeholder.contents_len as u64;
    let range = ByteRange::around_gap(gap_start, gap_end, base + rendered.bytes.len() as u64);

    let mut section = rendered.bytes;
    let byte_range = format_byte_range(&range);
    let at = (body_offset + placeholder.byte_range_at as u64 - base) as usize;
    section[at..at + byte_range.len()].copy_from_slice(byte_range.as_bytes());

    log::debug!(
        "reserved {} CMS bytes for field {} (ByteRange {:?}, certify: {})",
        capacity,
        field_name,
        range.to_array(),
        certify
    );
    Ok(PreparedRevision {
        section,
        range,
        capacity,
        certify,
        field_name,
    })
}

/// Serialized signature dictionary and where its placeholders sit in it.
#[derive(Debug)]
struct SignaturePlaceholder {
    body: Vec<u8>,
    byte_range_at: usize,
    contents_at: usize,
    contents_len: usize,
}

impl SignaturePlaceholder {
    fn new(request: &SignatureRequest, capacity: usize, certify: bool) -> Self {
        let serializer = ObjectSerializer::compact();
        let mut body = b"<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /".to_vec();
        body.extend_from_slice(request.sub_filter.as_pdf_name().as_bytes());
        body.extend_from_slice(b" /ByteRange ");
        let byte_range_at = body.len();
        body.extend_from_slice(byte_range_placeholder().as_bytes());
        body.extend_from_slice(b" /Contents ");
        let contents_at = body.len();
        let contents = contents_placeholder(capacity);
        body.extend_from_slice(contents.as_bytes());

        let mut entries = vec![
            ("M", pdf_date(request.signing_time)),
            ("Name", text_string(&request.signer_name)),
            ("Reason", text_string(&request.reason)),
            ("Location", text_string(&request.location)),
        ];
        if certify {
            entries.push((
                "Reference",
                Object::Array(vec![dict([
                    ("Type", name("SigRef")),
                    ("TransformMethod", name("DocMDP")),
                    (
                        "TransformParams",
                        dict([
                            ("Type", name("TransformParams")),
                            ("P", Object::Integer(CERTIFY_PERMISSION)),
                            ("V", name("1.2")),
                        ]),
                    ),
                ])]),
            ));
        }
        for (key, value) in entries {
            body.push(b' ');
            serializer.write_object(&mut body, &name(key));
            body.push(b' ');
            serializer.write_object(&mut body, &value);
        }
        body.extend_from_slice(b" >>");

        Self {
            body,
            byte_range_at,
            contents_at,
            contents_len: contents.len(),
        }
    }
}

/// `Signature<n>` not yet used by any signature field.
fn unique_field_name(fields: &[SignatureField]) -> String {
    let mut n = fields.len() + 1;
    loop {
        let candidate = format!("Signature{}", n);
        if fields.iter().all(|f| f.name != candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Append the widget to the page's /Annots, wherever that array lives.
fn add_annotation(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate,
    page_ref: ObjectRef,
    widget: ObjectRef,
) -> Result<()> {
    let mut page = doc.load_object(page_ref)?.expect_dict()?.clone();
    match page.get("Annots").cloned() {
        Some(Object::Reference(annots_ref)) => {
            let mut annots = doc.load_object(annots_ref)?.as_array().cloned().unwrap_or_default();
            annots.push(reference(widget));
            update.put(annots_ref, Object::Array(annots));
        },
        Some(Object::Array(mut annots)) => {
            annots.push(reference(widget));
            page.insert("Annots".to_string(), Object::Array(annots));
            update.put(page_ref, Object::Dictionary(page));
        },
        _ => {
            page.insert("Annots".to_string(), Object::Array(vec![reference(widget)]));
            update.put(page_ref, Object::Dictionary(page));
        },
    }
    Ok(())
}

/// Register the field in the form and set /SigFlags.
fn add_form_field(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate,
    mut form: Dict,
    field: ObjectRef,
) -> Result<Dict> {
    match form.get("Fields").cloned() {
        Some(Object::Reference(fields_ref)) => {
            let mut fields = doc.load_object(fields_ref)?.as_array().cloned().unwrap_or_default();
            fields.push(reference(field));
            update.put(fields_ref, Object::Array(fields));
        },
        Some(Object::Array(mut fields)) => {
            fields.push(reference(field));
            form.insert("Fields".to_string(), Object::Array(fields));
        },
        _ => {
            form.insert("Fields".to_string(), Object::Array(vec![reference(field)]));
        },
    }
    form.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
    Ok(form)
}
