//! PDF object serialization.

use crate::object::{Dict, Object, ObjectRef};

/// Serializer for PDF objects.
///
/// Dictionary keys are written in sorted order so output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    compact: bool,
}

impl ObjectSerializer {
    /// Serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with minimal whitespace.
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an indirect object definition: `{id} {gen} obj\n{object}\nendobj\n`.
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Append an object to `w`.
    pub fn write_object(&self, w: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { &b"true"[..] } else { &b"false"[..] }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(w, *r),
            Object::String(s) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(arr) => {
                w.push(b'[');
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        w.push(b' ');
                    }
                    self.write_object(w, item);
                }
                w.push(b']');
            },
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.write_dictionary(w, &dict);
                w.extend_from_slice(b"\nstream\n");
                w.extend_from_slice(data);
                w.extend_from_slice(b"\nendstream");
            },
            Object::Reference(r) => w.extend_from_slice(r.to_string().as_bytes()),
        }
    }

    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dict) {
        w.extend_from_slice(b"<<");
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();
        for key in keys {
            w.extend_from_slice(if self.compact { b" " } else { b"\n" });
            write_name(w, key);
            w.push(b' ');
            self.write_object(w, &dict[key]);
        }
        w.extend_from_slice(if self.compact || dict.is_empty() { b" >>" } else { b"\n>>" });
    }
}

fn write_real(w: &mut Vec<u8>, value: f64) {
    if value.fract() == 0.0 {
        w.extend_from_slice((value as i64).to_string().as_bytes());
    } else {
        let formatted = format!("{:.5}", value);
        w.extend_from_slice(formatted.trim_end_matches('0').trim_end_matches('.').as_bytes());
    }
}

/// Literal syntax for printable ASCII, hex otherwise.
fn write_string(w: &mut Vec<u8>, data: &[u8]) {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));
    if printable {
        w.push(b'(');
        for &byte in data {
            match byte {
                b'(' => w.extend_from_slice(b"\\("),
                b')' => w.extend_from_slice(b"\\)"),
                b'\\' => w.extend_from_slice(b"\\\\"),
                b'\n' => w.extend_from_slice(b"\\n"),
                b'\r' => w.extend_from_slice(b"\\r"),
                b'\t' => w.extend_from_slice(b"\\t"),
                _ => w.push(byte),
            }
        }
        w.push(b')');
    } else {
        w.push(b'<');
        w.extend_from_slice(hex_upper(data).as_bytes());
        w.push(b'>');
    }
}

/// Names escape delimiters, whitespace and non-ASCII bytes as `#XX`.
fn write_name(w: &mut Vec<u8>, name: &str) {
    w.push(b'/');
    for byte in name.bytes() {
        match byte {
            b'!' | b'"' | b'$' | b'&' | b'\'' | b'*'..=b'.' | b'0'..=b'9' | b';' | b'?' | b'@' | b'A'..=b'Z'
            | b'^'..=b'z' | b'|' | b'~' => w.push(byte),
            _ => w.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
        }
    }
}

/// Uppercase hex encoding.
pub fn hex_upper(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Name object.
pub fn name(value: &str) -> Object {
    Object::Name(value.to_string())
}

/// Text string object; non-ASCII text is written as UTF-16BE with a BOM.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        Object::String(value.as_bytes().to_vec())
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes)
    }
}

/// PDF date string (`D:YYYYMMDDHHmmSS+00'00'`) for a UTC instant.
pub fn pdf_date(time: chrono::DateTime<chrono::Utc>) -> Object {
    Object::String(time.format("D:%Y%m%d%H%M%S+00'00'").to_string().into_bytes())
}

/// Reference object.
pub fn reference(r: ObjectRef) -> Object {
    Object::Reference(r)
}

/// Dictionary object from key/value pairs.
pub fn dict<const N: usize>(entries: [(&str, Object); N]) -> Object {
    Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize(&Object::Integer(-3)), b"-3");
        assert_eq!(s.serialize(&Object::Real(1.5)), b"1.5");
        assert_eq!(s.serialize(&Object::Real(2.0)), b"2");
        assert_eq!(s.serialize(&Object::Boolean(true)), b"true");
        assert_eq!(s.serialize(&reference(ObjectRef::new(4, 0))), b"4 0 R");
    }

    #[test]
    fn test_string_escaping() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize(&Object::String(b"a(b)\\".to_vec())), b"(a\\(b\\)\\\\)");
        assert_eq!(s.serialize(&Object::String(vec![0x00, 0xFF])), b"<00FF>");
    }

    #[test]
    fn test_name_escaping() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize(&name("A B")), b"/A#20B");
        assert_eq!(s.serialize(&name("adbe.pkcs7.detached")), b"/adbe.pkcs7.detached");
    }

    #[test]
    fn test_dictionary_sorted() {
        let s = ObjectSerializer::compact();
        let obj = dict([("Type", name("Sig")), ("Filter", name("Adobe.PPKLite"))]);
        assert_eq!(s.serialize(&obj), b"<< /Filter /Adobe.PPKLite /Type /Sig >>");
    }

    #[test]
    fn test_stream_gets_length() {
        let s = ObjectSerializer::compact();
        let obj = Object::Stream {
            dict: Dict::new(),
            data: bytes::Bytes::from_static(b"abc"),
        };
        assert_eq!(s.serialize(&obj), b"<< /Length 3 >>\nstream\nabc\nendstream");
    }

    #[test]
    fn test_indirect_round_trips_through_parser() {
        let s = ObjectSerializer::new();
        let obj = dict([("P", Object::Integer(2)), ("V", name("1.2"))]);
        let bytes = s.serialize_indirect(9, 0, &obj);
        let (_, (r, parsed)) = crate::parser::parse_indirect_object(&bytes).unwrap();
        assert_eq!(r, ObjectRef::new(9, 0));
        assert_eq!(parsed, obj);
    }

    #[test]
    fn test_pdf_date() {
        use chrono::TimeZone;
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(pdf_date(time), Object::String(b"D:20240305070809+00'00'".to_vec()));
    }

    #[test]
    fn test_text_string_utf16() {
        assert_eq!(text_string("Jakarta"), Object::String(b"Jakarta".to_vec()));
        assert_eq!(text_string("é"), Object::String(vec![0xFE, 0xFF, 0x00, 0xE9]));
    }
}
