//! PNG and TIFF predictors, as used by cross-reference streams.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        let start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { output[start + i - bpp] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    let stride = row_len + 1;
    if data.len() % stride != 0 {
        return Err(Error::Decode(format!(
            "Predictor data length {} is not a multiple of row size {}",
            data.len(),
            stride
        )));
    }

    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];
    for row in data.chunks(stride) {
        let tag = row[0];
        let mut cur = row[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(Error::Decode(format!("Invalid PNG filter type {}", other))),
            };
            cur[i] = cur[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&cur);
        prev = cur;
    }
    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
