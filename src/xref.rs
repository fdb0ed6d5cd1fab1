//! Cross-reference parsing.
//!
//! Maps object numbers to byte offsets (or object-stream slots) across every
//! revision of the file. Supports classic `xref` tables with their `trailer`
//! and PDF 1.5 cross-reference streams, following `/Prev` (and `/XRefStm` in
//! hybrid files) from the newest section backwards.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object};

const MAX_PREV_DEPTH: u32 = 100;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free slot
    Free,
    /// Object stored at a byte offset
    InUse {
        /// Byte offset of `id gen obj`
        offset: u64,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing object stream
        stream_id: u32,
        /// Index within the stream
        index: u32,
    },
}

/// Kind of the newest cross-reference section, which the next incremental
/// update must mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// `xref` keyword table followed by `trailer`
    Table,
    /// `/Type /XRef` stream
    Stream,
}

/// Merged cross-reference information for a document.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dict,
    kind: XRefKind,
    start_offset: u64,
}

impl CrossRefTable {
    fn new(kind: XRefKind, start_offset: u64) -> Self {
        Self {
            entries: HashMap::new(),
            trailer: Dict::new(),
            kind,
            start_offset,
        }
    }

    /// Look up an object number.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(&id)
    }

    /// Merged trailer. Keys from newer sections win.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Format of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Offset named by the final `startxref`; becomes `/Prev` of the next update.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Smallest object number not yet used by any revision.
    pub fn next_object_id(&self) -> u32 {
        let from_size = self.trailer.get("Size").and_then(Object::as_integer).unwrap_or(0).max(0) as u32;
        let from_entries = self.entries.keys().max().map(|m| m + 1).unwrap_or(1);
        from_size.max(from_entries).max(1)
    }

    /// Number of known entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold an older section in: existing entries and trailer keys are kept.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }
}

/// Locate the offset after the final `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::InvalidXref("startxref not found".to_string()))?;
    match token(&tail[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => Ok(offset as u64),
        _ => Err(Error::InvalidXref("startxref is not followed by an offset".to_string())),
    }
}

/// Parse every cross-reference section reachable from `offset`.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table = parse_section_chain(data, offset, 0, &mut visited)?;
    table.start_offset = offset;
    if !table.trailer.contains_key("Root") {
        return Err(Error::InvalidXref("trailer has no /Root".to_string()));
    }
    Ok(table)
}

fn parse_section_chain(
    data: &[u8],
    offset: u64,
    depth: u32,
    visited: &mut HashSet<u64>,
) -> Result<CrossRefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::RecursionLimitExceeded(MAX_PREV_DEPTH));
    }
    if !visited.insert(offset) {
        return Err(Error::InvalidXref(format!("/Prev loop at offset {}", offset)));
    }
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| Error::InvalidXref(format!("offset {} beyond end of file", offset)))?;

    let body = skip_leading_whitespace(&data[start..]);
    let mut section = if body.starts_with(b"xref") {
        log::debug!("classic xref table at offset {}", offset);
        parse_table(body, offset)?
    } else {
        log::debug!("xref stream at offset {}", offset);
        parse_stream(body, offset)?
    };

    // Hybrid files point at an xref stream holding compressed objects
    if let Some(stm) = section.trailer.get("XRefStm").and_then(Object::as_integer) {
        match parse_section_chain(data, stm as u64, depth + 1, visited) {
            Ok(hybrid) => {
                for (id, entry) in hybrid.entries {
                    section.entries.entry(id).or_insert(entry);
                }
            },
            Err(e) => log::warn!("ignoring unreadable /XRefStm at {}: {}", stm, e),
        }
    }

    if let Some(prev) = section.trailer.get("Prev").and_then(Object::as_integer) {
        let older = parse_section_chain(data, prev as u64, depth + 1, visited)?;
        section.merge_older(older);
    }

    Ok(section)
}

fn skip_leading_whitespace(input: &[u8]) -> &[u8] {
    let n = input.iter().take_while(|c| c.is_ascii_whitespace()).count();
    &input[n..]
}

/// Split the next whitespace-delimited ASCII word off `input`.
fn next_word(input: &[u8]) -> (&[u8], &[u8]) {
    let input = skip_leading_whitespace(input);
    let end = input.iter().position(|c| c.is_ascii_whitespace()).unwrap_or(input.len());
    (&input[..end], &input[end..])
}

fn word_number(word: &[u8]) -> Option<u64> {
    std::str::from_utf8(word).ok()?.parse().ok()
}

fn parse_table(body: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new(XRefKind::Table, offset);
    let mut rest = &body[4..];

    loop {
        let (word, after) = next_word(rest);
        if word.starts_with(b"trailer") {
            rest = &skip_leading_whitespace(rest)[b"trailer".len()..];
            break;
        }
        let first = word_number(word).ok_or_else(|| {
            Error::InvalidXref(format!("bad subsection header in table at {}", offset))
        })?;
        let (count_word, after) = next_word(after);
        let count = word_number(count_word)
            .ok_or_else(|| Error::InvalidXref(format!("bad subsection count in table at {}", offset)))?;
        rest = after;

        for i in 0..count {
            let (off_word, after) = next_word(rest);
            let (gen_word, after) = next_word(after);
            let (kind_word, after) = next_word(after);
            rest = after;
            let (entry_offset, gen) = match (word_number(off_word), word_number(gen_word)) {
                (Some(o), Some(g)) => (o, g as u16),
                _ => return Err(Error::InvalidXref(format!("bad entry in table at {}", offset))),
            };
            let entry = match kind_word {
                b"n" => XRefEntry::InUse { offset: entry_offset, gen },
                b"f" => XRefEntry::Free,
                _ => return Err(Error::InvalidXref(format!("bad entry type in table at {}", offset))),
            };
            table.entries.entry((first + i) as u32).or_insert(entry);
        }
    }

    match parse_object(rest) {
        Ok((_, Object::Dictionary(trailer))) => table.trailer = trailer,
        _ => return Err(Error::InvalidXref(format!("unreadable trailer after table at {}", offset))),
    }
    Ok(table)
}

fn parse_stream(body: &[u8], offset: u64) -> Result<CrossRefTable> {
    let (_, (_, obj)) = parse_indirect_object(body)
        .map_err(|e| Error::InvalidXref(format!("no xref stream at {}: {:?}", offset, e)))?;
    let dict = match &obj {
        Object::Stream { dict, .. } => dict.clone(),
        _ => return Err(Error::InvalidXref(format!("object at {} is not a stream", offset))),
    };
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::InvalidXref(format!("stream at {} is not /Type /XRef", offset)));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|v| v.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(Error::InvalidXref("xref stream /W must have three entries".to_string()));
    }
    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0);
    let index: Vec<i64> = match dict.get("Index").and_then(Object::as_array) {
        Some(arr) => arr.iter().filter_map(Object::as_integer).collect(),
        None => vec![0, size],
    };

    let data = obj.decode_stream_data()?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(Error::InvalidXref("xref stream /W is all zero".to_string()));
    }
    let mut rows = data.chunks_exact(row_len);
    let mut table = CrossRefTable::new(XRefKind::Stream, offset);

    for pair in index.chunks(2) {
        let (first, count) = match pair {
            [first, count] => (*first, *count),
            _ => break,
        };
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                log::warn!("xref stream at {} shorter than its /Index", offset);
                break;
            };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_int(f1) };
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::InUse {
                    offset: read_int(f2),
                    gen: read_int(f3) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream_id: read_int(f2) as u32,
                    index: read_int(f3) as u32,
                },
                _ => continue,
            };
            table.entries.entry((first + i) as u32).or_insert(entry);
        }
    }

    let mut trailer = dict;
    for key in ["Filter", "DecodeParms", "Length", "W", "Index", "Type"] {
        trailer.remove(key);
    }
    table.trailer = trailer;
    Ok(table)
}

/// Big-endian integer of arbitrary width.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
