//! PDF object parser.
//!
//! Recursive descent over lexer tokens: scalars map directly, arrays and
//! dictionaries recurse, and a dictionary followed by `stream` becomes a
//! stream object.

use nom::IResult;

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object, ObjectRef};

/// Decode escape sequences in a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` and line continuations.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        i += 1;
        match raw[i] {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' => {
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            d @ b'0'..=b'7' => {
                let mut code = (d - b'0') as u16;
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i + 1) {
                        Some(&n @ b'0'..=b'7') => {
                            code = code * 8 + (n - b'0') as u16;
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            },
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Decode hex string digits; whitespace is ignored and an odd digit is padded with 0.
pub fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex.iter().copied().filter(|c| !c.is_ascii_whitespace()).collect();
    let mut out = Vec::with_capacity(digits.len().div_ceil(2));
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0])?;
        let lo = match pair.get(1) {
            Some(&c) => hex_value(c)?,
            None => 0,
        };
        out.push(hi << 4 | lo);
    }
    Ok(out)
}

fn hex_value(c: u8) -> Result<u8> {
    (c as char)
        .to_digit(16)
        .map(|v| v as u8)
        .ok_or_else(|| Error::Decode(format!("invalid hex digit '{}'", c as char)))
}

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse one direct object.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            // "id gen R" is a reference; anything else is a plain integer
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((input, Object::String(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::HexDigit))),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input)?;
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (rest, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }
            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(fail(input, nom::error::ErrorKind::Tag)),
    }
}

/// Parse `id gen obj <object> endobj`.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = match token(input)? {
        (rest, Token::Integer(id)) => (rest, id),
        _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
    };
    let (rest, gen) = match token(rest)? {
        (rest, Token::Integer(gen)) => (rest, gen),
        _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
    };
    let (rest, _) = match token(rest)? {
        (rest, Token::ObjStart) => (rest, ()),
        _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
    };
    let (rest, obj) = parse_object(rest)?;
    // A missing endobj is tolerated
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };
    Ok((rest, (ObjectRef::new(id as u32, gen as u16), obj)))
}

fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    // An indirect /Length cannot be resolved here; fall back to scanning
    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length.max(0) as usize;
        if input.len() >= length {
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, input[..length].to_vec()));
            }
            log::debug!("/Length {} does not end at endstream, scanning", length);
        }
    }

    let keyword = b"endstream";
    let pos = input
        .windows(keyword.len())
        .position(|w| w == keyword)
        .ok_or_else(|| fail(input, nom::error::ErrorKind::Eof))?;
    let mut end = pos;
    if end > 0 && input[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && input[end - 1] == b'\r' {
        end -= 1;
    }
    Ok((&input[pos + keyword.len()..], input[..end].to_vec()))
}

fn parse_array(mut input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(input) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, obj) = parse_object(input)?;
        items.push(obj);
        input = rest;
    }
}

fn parse_dictionary(mut input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    loop {
        let (rest, tok) = token(input)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                // null-valued entries are equivalent to absent ones
                if !value.is_null() {
                    dict.insert(key, value);
                }
                input = rest;
            },
            _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
        }
    }
}
