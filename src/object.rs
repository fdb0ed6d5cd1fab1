//! PDF object types.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Dictionary storage used by [`Object::Dictionary`] and [`Object::Stream`].
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (without the leading /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Stream (dictionary + raw, still-encoded data)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Like [`Object::as_dict`] but returns a typed error.
    pub fn expect_dict(&self) -> Result<&Dict> {
        self.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: self.type_name().to_string(),
        })
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// Only FlateDecode (with optional PNG/TIFF predictors) is supported, which
    /// covers cross-reference streams, object streams and DSS streams.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let filters = dict.get("Filter").map(filter_names).unwrap_or_default();
                let params = decode_params(dict.get("DecodeParms"));
                if filters.is_empty() && params.is_none() {
                    return Ok(data.to_vec());
                }
                crate::decoders::decode_stream_with_params(data, &filters, params.as_ref())
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

/// The /Filter entry is either a single name or an array of names.
fn filter_names(filter: &Object) -> Vec<String> {
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}

fn decode_params(params: Option<&Object>) -> Option<crate::decoders::DecodeParams> {
    let dict = match params? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().find_map(|obj| obj.as_dict())?,
        _ => return None,
    };
    let get = |key: &str, default: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(default);
    Some(crate::decoders::DecodeParams {
        predictor: get("Predictor", 1),
        columns: get("Columns", 1).max(1) as usize,
        colors: get("Colors", 1).max(1) as usize,
        bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
    })
}
