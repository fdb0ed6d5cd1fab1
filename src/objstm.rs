//! Object streams (PDF 1.5 compressed objects).
//!
//! The decoded stream starts with `/N` pairs of `id offset`; object bodies
//! begin at `/First`.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;

/// Extract the object at `index` from an object stream, checking its number.
pub fn object_from_stream(stream: &Object, index: u32, expected_id: u32) -> Result<Object> {
    let dict = stream.expect_dict()?;
    let n = dict.get("N").and_then(Object::as_integer).unwrap_or(0).max(0) as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream without /First".to_string()))?
        .max(0) as usize;

    let data = stream.decode_stream_data()?;
    let header = &data[..first.min(data.len())];
    let pairs = read_header(header, n)?;

    let (id, offset) = pairs
        .get(index as usize)
        .copied()
        .ok_or_else(|| Error::ObjectNotFound(expected_id, 0))?;
    if id != expected_id {
        return Err(Error::InvalidPdf(format!(
            "object stream slot {} holds object {}, expected {}",
            index, id, expected_id
        )));
    }

    let start = first.checked_add(offset).ok_or_else(|| {
        Error::InvalidPdf(format!("object stream offset of object {} overflows", expected_id))
    })?;
    if start >= data.len() {
        return Err(Error::UnexpectedEof);
    }
    parse_object(&data[start..])
        .map(|(_, obj)| obj)
        .map_err(|e| Error::ParseError {
            offset: start,
            reason: format!("object {} in object stream: {:?}", expected_id, e),
        })
}

fn read_header(mut input: &[u8], n: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let (rest, id) = match token(input) {
            Ok((rest, Token::Integer(id))) => (rest, id),
            _ => return Err(Error::InvalidPdf("bad object stream header".to_string())),
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(offset))) => (rest, offset),
            _ => return Err(Error::InvalidPdf("bad object stream header".to_string())),
        };
        pairs.push((id as u32, offset.max(0) as usize));
        input = rest;
    }
    Ok(pairs)
}
