//! FlateDecode (zlib/deflate) via flate2.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!("FlateDecode partial recovery: {} bytes before error: {}", output.len(), e);
                Ok(output)
            },
            Err(e) => {
                // Some writers emit raw deflate without the zlib wrapper
                output.clear();
                DeflateDecoder::new(input)
                    .read_to_end(&mut output)
                    .map_err(|_| Error::Decode(format!("FlateDecode failed: {}", e)))?;
                Ok(output)
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress data for a /FlateDecode stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
