//! ByteRange handling for PDF signatures.
//!
//! The ByteRange is an array of four integers
//! `[offset1, length1, offset2, length2]` naming the two signed regions of
//! the file. The gap between them holds the hex-encoded `/Contents` string
//! (angle brackets included), which is the only part of the file the
//! signature does not cover.
//!
//! The digester reads the two regions in fixed-size chunks, so signing and
//! verifying large documents never needs the whole file in memory.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};
use crate::signatures::types::DigestAlgorithm;

/// Read buffer size for streaming digests.
const CHUNK_SIZE: usize = 64 * 1024;

/// Width reserved for each ByteRange integer in the placeholder array.
const BYTE_RANGE_DIGITS: usize = 10;

/// Binary overhead reserved for signed attributes, SignerInfo and SignedData framing.
const CMS_STRUCTURE_OVERHEAD: usize = 1024;

/// Budget for an RFC 3161 token carrying the TSA's own chain.
const TIMESTAMP_TOKEN_ESTIMATE: usize = 8 * 1024;

const KIB: usize = 1024;

/// The four ByteRange offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start of the first region (always 0 for a well-formed signature)
    pub start1: u64,
    /// Length of the first region
    pub len1: u64,
    /// Start of the second region, just after the `/Contents` string
    pub start2: u64,
    /// Length of the second region
    pub len2: u64,
}

impl ByteRange {
    /// Byte range that excludes `[gap_start, gap_end)` from a file of `file_len` bytes.
    pub fn around_gap(gap_start: u64, gap_end: u64, file_len: u64) -> Self {
        Self {
            start1: 0,
            len1: gap_start,
            start2: gap_end,
            len2: file_len.saturating_sub(gap_end),
        }
    }

    /// Validate raw `/ByteRange` integers against a file length.
    ///
    /// Rejects negative values, regions outside the file and overlapping or
    /// out-of-order regions.
    pub fn from_array(values: &[i64], file_len: u64) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedByteRange {
            ranges: values.to_vec(),
            file_len,
            reason: reason.to_string(),
        };
        let [start1, len1, start2, len2] = match values {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => return Err(malformed("expected exactly four integers")),
        };
        if [start1, len1, start2, len2].iter().any(|v| *v < 0) {
            return Err(malformed("negative offset or length"));
        }
        let range = Self {
            start1: start1 as u64,
            len1: len1 as u64,
            start2: start2 as u64,
            len2: len2 as u64,
        };
        range.validate(file_len).map_err(|e| match e {
            Error::MalformedByteRange { reason, .. } => malformed(&reason),
            other => other,
        })?;
        Ok(range)
    }

    /// Check both regions fit in the file and do not overlap.
    pub fn validate(&self, file_len: u64) -> Result<()> {
        let malformed = |reason: String| Error::MalformedByteRange {
            ranges: self.to_array().to_vec(),
            file_len,
            reason,
        };
        let end1 = self
            .start1
            .checked_add(self.len1)
            .ok_or_else(|| malformed("first region overflows".to_string()))?;
        let end2 = self
            .start2
            .checked_add(self.len2)
            .ok_or_else(|| malformed("second region overflows".to_string()))?;
        if end1 > file_len {
            return Err(malformed(format!("first region ends at {} past end of file", end1)));
        }
        if end2 > file_len {
            return Err(malformed(format!("second region ends at {} past end of file", end2)));
        }
        if self.start2 < end1 {
            return Err(malformed(format!(
                "second region starts at {} inside the first region ending at {}",
                self.start2, end1
            )));
        }
        Ok(())
    }

    /// Offsets as written in the PDF.
    pub fn to_array(&self) -> [i64; 4] {
        [self.start1 as i64, self.len1 as i64, self.start2 as i64, self.len2 as i64]
    }

    /// The excluded `[start, end)` region between the two signed parts.
    pub fn gap(&self) -> (u64, u64) {
        (self.start1 + self.len1, self.start2)
    }

    /// Whether the second region runs to the end of a file of `file_len` bytes.
    pub fn covers_to_end(&self, file_len: u64) -> bool {
        self.start1 == 0 && self.start2 + self.len2 == file_len
    }

    /// Number of bytes that go into the digest.
    pub fn signed_len(&self) -> u64 {
        self.len1 + self.len2
    }
}

/// Computes the digest of the bytes outside the signature gap.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeDigester {
    algorithm: DigestAlgorithm,
    chunk_size: usize,
}

impl ByteRangeDigester {
    /// Digester for the given algorithm.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the read buffer size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Digest algorithm in use.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Digest a file on disk.
    pub fn digest_file(&self, path: impl AsRef<Path>, range: &ByteRange) -> Result<Vec<u8>> {
        let file = File::open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        self.digest_reader(BufReader::new(file), file_len, range)
    }

    /// Digest an in-memory document.
    pub fn digest_bytes(&self, data: &[u8], range: &ByteRange) -> Result<Vec<u8>> {
        self.digest_reader(std::io::Cursor::new(data), data.len() as u64, range)
    }

    /// Digest `[start1, start1+len1)` followed by `[start2, start2+len2)`.
    pub fn digest_reader<R: Read + Seek>(&self, mut reader: R, file_len: u64, range: &ByteRange) -> Result<Vec<u8>> {
        range.validate(file_len)?;
        let mut state = self.algorithm.hasher();
        let mut buf = vec![0u8; self.chunk_size];
        for (start, len) in [(range.start1, range.len1), (range.start2, range.len2)] {
            reader.seek(SeekFrom::Start(start))?;
            let mut remaining = len;
            while remaining > 0 {
                let want = remaining.min(buf.len() as u64) as usize;
                reader.read_exact(&mut buf[..want]).map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => Error::MalformedByteRange {
                        ranges: range.to_array().to_vec(),
                        file_len,
                        reason: "file shorter than its ByteRange".to_string(),
                    },
                    _ => Error::Io(e),
                })?;
                state.update(&buf[..want]);
                remaining -= want as u64;
            }
        }
        log::debug!(
            "{} digest over {} bytes, gap {:?}",
            self.algorithm.name(),
            range.signed_len(),
            range.gap()
        );
        Ok(state.finalize())
    }
}

/// Binary capacity to reserve for the CMS blob.
///
/// The sum of the chain's DER sizes, the raw signature size, a fixed
/// allowance for attributes and framing, and a timestamp token estimate when
/// a TSA is configured, rounded up to a whole KiB.
pub fn signature_capacity(chain_der_sizes: &[usize], signature_len: usize, with_timestamp: bool) -> usize {
    let mut total: usize = chain_der_sizes.iter().sum();
    total += signature_len + CMS_STRUCTURE_OVERHEAD;
    if with_timestamp {
        total += TIMESTAMP_TOKEN_ESTIMATE;
    }
    total.div_ceil(KIB) * KIB
}

/// `/Contents` placeholder: `<` + `2 * capacity` zeros + `>`.
pub fn contents_placeholder(capacity: usize) -> String {
    format!("<{}>", "0".repeat(capacity * 2))
}

/// Hex-encode a CMS blob into a `/Contents` value of exactly the placeholder's width.
pub fn encode_contents(cms: &[u8], capacity: usize) -> Result<String> {
    if cms.len() > capacity {
        return Err(Error::SignatureTooLarge {
            needed: cms.len(),
            reserved: capacity,
        });
    }
    let mut hex = String::with_capacity(capacity * 2 + 2);
    hex.push('<');
    hex.push_str(&crate::writer::object_serializer::hex_upper(cms));
    hex.extend(std::iter::repeat('0').take((capacity - cms.len()) * 2));
    hex.push('>');
    Ok(hex)
}

/// Fixed-width `/ByteRange` array; every value fits ten digits.
pub fn byte_range_placeholder() -> String {
    format_byte_range(&ByteRange::around_gap(0, 0, 0))
}

/// Render a ByteRange, space-padded to the placeholder's width.
pub fn format_byte_range(range: &ByteRange) -> String {
    let values = range.to_array();
    let body = format!("[{} {} {} {}", values[0], values[1], values[2], values[3]);
    let width = 4 * BYTE_RANGE_DIGITS + 4;
    format!("{:<width$}]", body, width = width)
}
