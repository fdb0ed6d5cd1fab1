//! Incremental updates: new and replaced objects appended after the
//! original bytes, with a cross-reference section chaining back via `/Prev`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::decoders::flate_encode;
use crate::document::PdfDocument;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::object_serializer::ObjectSerializer;
use crate::xref::XRefKind;

#[derive(Debug, Clone)]
enum Body {
    Object(Object),
    /// Pre-serialized body, written verbatim between `obj` and `endobj`
    Raw(Vec<u8>),
}

/// Collects objects for one incremental revision.
#[derive(Debug, Clone)]
pub struct IncrementalUpdate {
    base_len: u64,
    needs_newline: bool,
    prev_xref: u64,
    kind: XRefKind,
    prev_size: u32,
    next_id: u32,
    trailer_base: Dict,
    objects: BTreeMap<u32, (u16, Body)>,
}

/// The rendered section and where each object landed.
#[derive(Debug, Clone)]
pub struct RenderedUpdate {
    /// Bytes to append after the original file
    pub bytes: Vec<u8>,
    /// Absolute file offset of the first body byte of every written object
    pub body_offsets: BTreeMap<u32, u64>,
    /// Absolute offset of the new cross-reference section
    pub xref_offset: u64,
}

impl RenderedUpdate {
    /// Absolute offset of an object's body.
    pub fn body_offset(&self, id: u32) -> Option<u64> {
        self.body_offsets.get(&id).copied()
    }
}

impl IncrementalUpdate {
    /// Start a revision on top of `doc`.
    pub fn new(doc: &PdfDocument) -> Self {
        let data = doc.data();
        let needs_newline = !matches!(data.last(), Some(b'\n') | Some(b'\r'));
        let xref = doc.xref();
        let mut trailer_base = Dict::new();
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = xref.trailer().get(key) {
                trailer_base.insert(key.to_string(), value.clone());
            }
        }
        if !trailer_base.contains_key("ID") {
            let digest = Sha256::digest(data);
            let id = Object::String(digest[..16].to_vec());
            trailer_base.insert("ID".to_string(), Object::Array(vec![id.clone(), id]));
        }
        let next_id = xref.next_object_id();
        Self {
            base_len: doc.len(),
            needs_newline,
            prev_xref: xref.start_offset(),
            kind: doc.xref_kind(),
            prev_size: next_id,
            next_id,
            trailer_base,
            objects: BTreeMap::new(),
        }
    }

    /// Reserve a fresh object number.
    pub fn allocate(&mut self) -> ObjectRef {
        let r = ObjectRef::new(self.next_id, 0);
        self.next_id += 1;
        r
    }

    /// Add or replace an object.
    pub fn put(&mut self, r: ObjectRef, obj: Object) {
        self.objects.insert(r.id, (r.gen, Body::Object(obj)));
    }

    /// Add an object whose body was serialized by the caller.
    pub fn put_raw(&mut self, r: ObjectRef, body: Vec<u8>) {
        self.objects.insert(r.id, (r.gen, Body::Raw(body)));
    }

    /// Number of objects in this revision.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize the revision: objects, cross-reference section, trailer.
    pub fn render(&self) -> Result<RenderedUpdate> {
        let serializer = ObjectSerializer::new();
        let mut out = Vec::new();
        if self.needs_newline {
            out.push(b'\n');
        }
        let mut offsets = BTreeMap::new();
        let mut body_offsets = BTreeMap::new();

        for (&id, (gen, body)) in &self.objects {
            offsets.insert(id, (self.base_len + out.len() as u64, *gen));
            out.extend_from_slice(format!("{} {} obj\n", id, gen).as_bytes());
            body_offsets.insert(id, self.base_len + out.len() as u64);
            match body {
                Body::Object(obj) => serializer.write_object(&mut out, obj),
                Body::Raw(raw) => out.extend_from_slice(raw),
            }
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = self.base_len + out.len() as u64;
        match self.kind {
            XRefKind::Table => self.write_table(&mut out, &offsets),
            XRefKind::Stream => self.write_stream(&mut out, &mut offsets, xref_offset)?,
        }
        out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());

        log::debug!(
            "incremental update: {} objects, {} bytes, xref at {}",
            self.objects.len(),
            out.len(),
            xref_offset
        );
        Ok(RenderedUpdate {
            bytes: out,
            body_offsets,
            xref_offset,
        })
    }

    fn trailer(&self, size: u32) -> Dict {
        let mut trailer = self.trailer_base.clone();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.prev_xref as i64));
        trailer
    }

    fn size(&self, extra: u32) -> u32 {
        let max_written = self.objects.keys().max().map(|m| m + 1).unwrap_or(0);
        self.prev_size.max(max_written).max(extra)
    }

    fn write_table(&self, out: &mut Vec<u8>, offsets: &BTreeMap<u32, (u64, u16)>) {
        out.extend_from_slice(b"xref\n");
        for run in consecutive_runs(offsets.keys().copied()) {
            out.extend_from_slice(format!("{} {}\n", run.0, run.1).as_bytes());
            for id in run.0..run.0 + run.1 {
                let (offset, gen) = offsets[&id];
                out.extend_from_slice(format!("{:010} {:05} n \n", offset, gen).as_bytes());
            }
        }
        let trailer = Object::Dictionary(self.trailer(self.size(0)));
        out.extend_from_slice(b"trailer\n");
        ObjectSerializer::new().write_object(out, &trailer);
        out.push(b'\n');
    }

    fn write_stream(
        &self,
        out: &mut Vec<u8>,
        offsets: &mut BTreeMap<u32, (u64, u16)>,
        xref_offset: u64,
    ) -> Result<()> {
        let stream_id = self.next_id;
        offsets.insert(stream_id, (xref_offset, 0));

        let max_offset = offsets.values().map(|(offset, _)| *offset).max().unwrap_or(0);
        let width = (1..8).find(|w| max_offset < 1u64 << (8 * w)).unwrap_or(8);
        let mut rows = Vec::new();
        let mut index = Vec::new();
        for (first, count) in consecutive_runs(offsets.keys().copied()) {
            index.push(Object::Integer(first as i64));
            index.push(Object::Integer(count as i64));
            for id in first..first + count {
                let (offset, gen) = offsets[&id];
                rows.push(1u8);
                rows.extend_from_slice(&offset.to_be_bytes()[8 - width..]);
                rows.extend_from_slice(&gen.to_be_bytes());
            }
        }

        let mut dict = self.trailer(self.size(stream_id + 1));
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![Object::Integer(1), Object::Integer(width as i64), Object::Integer(2)]),
        );
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(flate_encode(&rows)?),
        };
        out.extend_from_slice(&ObjectSerializer::new().serialize_indirect(stream_id, 0, &stream));
        Ok(())
    }
}

/// Group sorted ids into `(first, count)` runs for xref subsections.
fn consecutive_runs(ids: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for id in ids {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == id => *count += 1,
            _ => runs.push((id, 1)),
        }
    }
    runs
}
