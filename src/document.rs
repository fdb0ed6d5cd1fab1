//! Read access to an existing PDF, limited to what signing needs.
//!
//! The whole file is held in memory: signing appends to it and must know the
//! exact original length, and object lookup is random access anyway.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::parse_indirect_object;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntry, XRefKind};

const MAX_RECURSION_DEPTH: u32 = 100;
const MAX_TREE_DEPTH: usize = 50;

/// Where the interactive form dictionary lives.
#[derive(Debug, Clone, PartialEq)]
pub enum AcroFormLocation {
    /// Catalog has no /AcroForm
    Absent,
    /// /AcroForm is a direct dictionary inside the catalog
    Inline(Dict),
    /// /AcroForm is an indirect object
    Indirect(ObjectRef, Dict),
}

impl AcroFormLocation {
    /// The form dictionary, if any.
    pub fn dict(&self) -> Option<&Dict> {
        match self {
            AcroFormLocation::Absent => None,
            AcroFormLocation::Inline(d) | AcroFormLocation::Indirect(_, d) => Some(d),
        }
    }
}

/// A `/FT /Sig` form field found in the document.
#[derive(Debug, Clone)]
pub struct SignatureField {
    /// Field object
    pub field_ref: ObjectRef,
    /// Fully qualified field name
    pub name: String,
    /// Indirect signature dictionary in /V, when signed
    pub value_ref: Option<ObjectRef>,
    /// Resolved signature dictionary, when signed
    pub value: Option<Dict>,
}

/// An opened PDF document.
pub struct PdfDocument {
    data: Vec<u8>,
    path: Option<PathBuf>,
    version: (u8, u8),
    xref: CrossRefTable,
    object_cache: HashMap<ObjectRef, Object>,
    resolving_stack: HashSet<ObjectRef>,
    depth: u32,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("len", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a PDF document from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let mut doc = Self::from_bytes(data)?;
        doc.path = Some(path.as_ref().to_path_buf());
        Ok(doc)
    }

    /// Parse a PDF held in memory.
    ///
    /// Encrypted documents are refused: an incremental update would have to
    /// encrypt every string it writes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let version = parse_header(&data)?;
        let offset = find_xref_offset(&data)?;
        let xref = parse_xref(&data, offset)?;
        if xref.trailer().contains_key("Encrypt") {
            return Err(Error::Unsupported("signing encrypted documents".to_string()));
        }
        log::debug!(
            "opened PDF {}.{} ({} bytes, {} xref entries, {:?})",
            version.0,
            version.1,
            data.len(),
            xref.len(),
            xref.kind()
        );
        Ok(Self {
            data,
            path: None,
            version,
            xref,
            object_cache: HashMap::new(),
            resolving_stack: HashSet::new(),
            depth: 0,
        })
    }

    /// Original file bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the original file; every new section starts here.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// True for an empty buffer (never the case for a parsed document).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Path the document was opened from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Merged cross-reference information.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Format of the newest cross-reference section.
    pub fn xref_kind(&self) -> XRefKind {
        self.xref.kind()
    }

    /// Load an indirect object, consulting the cache first.
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if !self.resolving_stack.insert(obj_ref) {
            return Err(Error::CircularReference(obj_ref));
        }
        self.depth += 1;

        let result = match self.xref.get(obj_ref.id).copied() {
            Some(XRefEntry::InUse { offset, .. }) => self.load_uncompressed(obj_ref, offset),
            Some(XRefEntry::Compressed { stream_id, index }) => {
                self.load_object(ObjectRef::new(stream_id, 0)).and_then(|stream| {
                    crate::objstm::object_from_stream(&stream, index, obj_ref.id)
                })
            },
            Some(XRefEntry::Free) | None => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        };

        self.depth -= 1;
        self.resolving_stack.remove(&obj_ref);

        let obj = result?;
        self.object_cache.insert(obj_ref, obj.clone());
        Ok(obj)
    }

    fn load_uncompressed(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        let (_, (found, obj)) = parse_indirect_object(&self.data[start..]).map_err(|e| {
            Error::ParseError {
                offset: start,
                reason: format!("object {}: {:?}", obj_ref, e),
            }
        })?;
        if found.id != obj_ref.id {
            return Err(Error::InvalidPdf(format!(
                "xref points object {} at offset {} but found {}",
                obj_ref, offset, found
            )));
        }
        Ok(obj)
    }

    /// Follow a reference; direct objects are returned as they are.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.load_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Resolve `dict[key]`, treating a missing key as `None`.
    pub fn resolve_entry(&mut self, dict: &Dict, key: &str) -> Result<Option<Object>> {
        match dict.get(key) {
            Some(obj) => self.resolve(obj).map(Some),
            None => Ok(None),
        }
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer /Root is not a reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&mut self) -> Result<Dict> {
        let root = self.catalog_ref()?;
        let obj = self.load_object(root)?;
        Ok(obj.expect_dict()?.clone())
    }

    /// Reference to the page at `index` in document order.
    pub fn page_ref(&mut self, index: usize) -> Result<ObjectRef> {
        let catalog = self.catalog()?;
        let pages = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog has no /Pages reference".to_string()))?;
        let mut remaining = index;
        self.find_page(pages, &mut remaining, 0)?
            .ok_or_else(|| Error::InvalidPdf(format!("page {} not found", index)))
    }

    fn find_page(&mut self, node: ObjectRef, remaining: &mut usize, depth: usize) -> Result<Option<ObjectRef>> {
        if depth > MAX_TREE_DEPTH {
            log::warn!("page tree deeper than {} levels, stopping", MAX_TREE_DEPTH);
            return Ok(None);
        }
        let obj = self.load_object(node)?;
        let dict = obj.expect_dict()?;
        let kids = match dict.get("Kids") {
            Some(kids) => self.resolve(kids)?,
            None if *remaining == 0 => return Ok(Some(node)),
            None => {
                *remaining -= 1;
                return Ok(None);
            },
        };
        for kid in kids.as_array().cloned().unwrap_or_default() {
            if let Some(kid_ref) = kid.as_reference() {
                if let Some(found) = self.find_page(kid_ref, remaining, depth + 1)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Locate the interactive form dictionary.
    pub fn acroform(&mut self) -> Result<AcroFormLocation> {
        let catalog = self.catalog()?;
        Ok(match catalog.get("AcroForm") {
            None => AcroFormLocation::Absent,
            Some(Object::Reference(r)) => {
                let r = *r;
                let obj = self.load_object(r)?;
                AcroFormLocation::Indirect(r, obj.expect_dict()?.clone())
            },
            Some(Object::Dictionary(d)) => AcroFormLocation::Inline(d.clone()),
            Some(other) => {
                log::warn!("ignoring /AcroForm of type {}", other.type_name());
                AcroFormLocation::Absent
            },
        })
    }

    /// Every signature field in the form, signed or not.
    pub fn signature_fields(&mut self) -> Result<Vec<SignatureField>> {
        let form = self.acroform()?;
        let fields = match form.dict().and_then(|d| d.get("Fields")).cloned() {
            Some(fields) => self.resolve(&fields)?,
            None => return Ok(Vec::new()),
        };
        let mut found = Vec::new();
        for field in fields.as_array().cloned().unwrap_or_default() {
            if let Some(r) = field.as_reference() {
                self.collect_signature_fields(r, String::new(), None, 0, &mut found)?;
            }
        }
        Ok(found)
    }

    fn collect_signature_fields(
        &mut self,
        field_ref: ObjectRef,
        parent_name: String,
        inherited_ft: Option<String>,
        depth: usize,
        out: &mut Vec<SignatureField>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Ok(());
        }
        let obj = self.load_object(field_ref)?;
        let dict = obj.expect_dict()?.clone();
        let partial = dict.get("T").and_then(Object::as_string).map(|t| String::from_utf8_lossy(t).into_owned());
        let name = match (parent_name.is_empty(), partial) {
            (_, None) => parent_name.clone(),
            (true, Some(t)) => t,
            (false, Some(t)) => format!("{}.{}", parent_name, t),
        };
        let ft = dict.get("FT").and_then(Object::as_name).map(str::to_string).or(inherited_ft);

        if let Some(kids) = dict.get("Kids") {
            let kids = self.resolve(kids)?;
            let field_kids: Vec<ObjectRef> = kids.as_array().into_iter().flatten().filter_map(Object::as_reference).collect();
            let mut has_field_kids = false;
            for kid in field_kids {
                let kid_obj = self.load_object(kid)?;
                // Widget-only kids carry no /T and belong to this field
                if kid_obj.as_dict().is_some_and(|d| d.contains_key("T")) {
                    has_field_kids = true;
                    self.collect_signature_fields(kid, name.clone(), ft.clone(), depth + 1, out)?;
                }
            }
            if has_field_kids {
                return Ok(());
            }
        }

        if ft.as_deref() == Some("Sig") {
            let value_ref = dict.get("V").and_then(Object::as_reference);
            let value = match dict.get("V") {
                Some(v) => self.resolve(v)?.as_dict().cloned(),
                None => None,
            };
            out.push(SignatureField {
                field_ref,
                name,
                value_ref,
                value,
            });
        }
        Ok(())
    }

    /// Signature dictionaries already present, in field order.
    pub fn existing_signatures(&mut self) -> Result<Vec<SignatureField>> {
        Ok(self
            .signature_fields()?
            .into_iter()
            .filter(|f| f.value.is_some())
            .collect())
    }

    /// DocMDP permission of a certification signature, if the document has one.
    ///
    /// Follows `/Perms /DocMDP` to the signature dictionary, then its
    /// `/Reference` entries to the DocMDP `/TransformParams /P`. A DocMDP
    /// signature without an explicit `/P` means 2.
    pub fn docmdp_permission(&mut self) -> Result<Option<i64>> {
        let catalog = self.catalog()?;
        let perms = match self.resolve_entry(&catalog, "Perms")? {
            Some(p) => p,
            None => return Ok(None),
        };
        let sig = match perms.as_dict().map(|d| d.clone()) {
            Some(d) => match self.resolve_entry(&d, "DocMDP")? {
                Some(sig) => sig,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let sig_dict = sig.expect_dict()?.clone();
        let references = self.resolve_entry(&sig_dict, "Reference")?;
        for reference in references.as_ref().and_then(Object::as_array).cloned().unwrap_or_default() {
            let reference = self.resolve(&reference)?;
            let Some(ref_dict) = reference.as_dict().cloned() else { continue };
            if ref_dict.get("TransformMethod").and_then(Object::as_name) != Some("DocMDP") {
                continue;
            }
            let params = self.resolve_entry(&ref_dict, "TransformParams")?;
            let p = params
                .as_ref()
                .and_then(Object::as_dict)
                .and_then(|d| d.get("P"))
                .and_then(Object::as_integer)
                .unwrap_or(2);
            return Ok(Some(p));
        }
        Ok(Some(2))
    }
}

/// Parse `%PDF-M.m` from the first kilobyte.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let head = &data[..data.len().min(1024)];
    let marker = b"%PDF-";
    let pos = head.windows(marker.len()).position(|w| w == marker).ok_or_else(|| {
        Error::InvalidHeader(String::from_utf8_lossy(&head[..head.len().min(8)]).into_owned())
    })?;
    let version = &head[pos + marker.len()..];
    match version {
        [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => Ok((major - b'0', minor - b'0')),
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&version[..version.len().min(8)]).into_owned(),
        )),
    }
}
