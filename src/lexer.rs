//! PDF lexer (tokenizer) built on nom.
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped
//! before every token. String escapes are left for the parser; name `#XX`
//! escapes are decoded here.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Literal string bytes, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Hexadecimal string digits, whitespace preserved
    HexString(&'a [u8]),
    /// Name without the leading slash, `#XX` decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in an indirect reference
    R,
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, ws) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) if ws.is_empty() => break,
            Err(_) => {},
        }
    }
    Ok((remaining, ()))
}

fn number_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), opt(digit1)))(rest)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(number_error(input));
    }

    let negative = sign == Some('-');
    match frac_part {
        Some(frac) => {
            let int_str = int_part.map(std::str::from_utf8).transpose().map_err(|_| number_error(input))?;
            let frac_str = frac.map(std::str::from_utf8).transpose().map_err(|_| number_error(input))?;
            let text = format!("{}.{}", int_str.unwrap_or("0"), frac_str.unwrap_or("0"));
            let num: f64 = text.parse().map_err(|_| number_error(input))?;
            Ok((rest, Token::Real(if negative { -num } else { num })))
        },
        None => {
            let digits = int_part.ok_or_else(|| number_error(input))?;
            let text = std::str::from_utf8(digits).map_err(|_| number_error(input))?;
            let num: i64 = text.parse().map_err(|_| number_error(input))?;
            Ok((rest, Token::Integer(if negative { -num } else { num })))
        },
    }
}

/// Literal strings may nest balanced parentheses; `\` escapes the next byte.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;
    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
            },
            _ => {},
        }
        pos += 1;
    }
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a raw name. Invalid sequences are kept.
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(|c: u8| !is_whitespace(c) && !is_delimiter(c)), |bytes| {
            Token::Name(decode_name_escapes(bytes))
        }),
    )(input)
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}
