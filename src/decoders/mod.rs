//! Stream decoders for the filters a signer meets in practice.
//!
//! Cross-reference streams, object streams and DSS streams are FlateDecode,
//! optionally with a PNG or TIFF predictor. Other filters only appear in
//! page content, which signing never decodes.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use flate::{flate_encode, FlateDecoder};
pub use predictor::{decode_predictor, DecodeParams};

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in /Filter (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Apply each filter in order, then the predictor when one is set.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder),
            _ => return Err(Error::UnsupportedFilter(filter_name.clone())),
        };
        current = decoder.decode(&current)?;
        log::trace!("{} produced {} bytes", decoder.name(), current.len());
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}
