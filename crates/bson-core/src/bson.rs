//! The closed set of value kinds.
//!
//! [`Bson`] is a sum type over every kind the wire format can carry. There is
//! no null case: an absent value is `Option::None`, both as a
//! document entry and as an array element.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::datetime::DateTime;
use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::element::{deserialize_variant, serialize_variant, Element, Generic};
use crate::error::Result;
use crate::oid::ObjectId;
use crate::options::DepthBudget;
use crate::raw;
use crate::slot::Slot;
use crate::types::{BinarySubtype, ElementType};
use crate::variant::{with_variant, Variant};

/// Ordered sequence of optional values.
pub type Array = Vec<Option<Bson>>;

/// One value of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Bson {
    Double(f64),
    String(String),
    Binary(Binary),
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime),
    RegularExpression(Regex),
    JavaScriptCodeWithScope(JavaScriptCodeWithScope),
    Int32(i32),
    Int64(i64),
    Decimal128(Decimal128),
    MinKey,
    MaxKey,
    Document(Document),
    Array(Array),
}

impl Bson {
    pub fn element_type(&self) -> ElementType {
        match self {
            Bson::Double(_) => ElementType::Double,
            Bson::String(_) => ElementType::String,
            Bson::Binary(_) => ElementType::Binary,
            Bson::ObjectId(_) => ElementType::ObjectId,
            Bson::Boolean(_) => ElementType::Boolean,
            Bson::DateTime(_) => ElementType::DateTime,
            Bson::RegularExpression(_) => ElementType::RegularExpression,
            Bson::JavaScriptCodeWithScope(_) => ElementType::JavaScriptCodeWithScope,
            Bson::Int32(_) => ElementType::Int32,
            Bson::Int64(_) => ElementType::Int64,
            Bson::Decimal128(_) => ElementType::Decimal128,
            Bson::MinKey => ElementType::MinKey,
            Bson::MaxKey => ElementType::MaxKey,
            Bson::Document(_) => ElementType::EmbeddedDocument,
            Bson::Array(_) => ElementType::Array,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bson::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Bson::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Bson::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Bson::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Bson::ObjectId(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Bson::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Bson::Document(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Bson::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The generic shape of this value as plain data.
    pub(crate) fn to_slot(&self) -> Slot {
        with_variant!(self, v => v.to_slot())
    }

    pub(crate) fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        with_variant!(self, v => v.serialize_generic(serializer, budget))
    }

    pub(crate) fn check_depth(&self, budget: DepthBudget) -> Result<()> {
        with_variant!(self, v => v.check_depth(budget))
    }
}

/// Relaxed Extended JSON. A value too deep to encode shows the error.
impl fmt::Display for Bson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(err) => write!(f, "<{err}>"),
        }
    }
}

impl Serialize for Bson {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Element::borrowed(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Element::deserialize(deserializer).map(Element::into_bson)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Bson {
                fn from(v: $ty) -> Self {
                    Bson::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    f64 => Double,
    f32 => Double,
    String => String,
    &str => String,
    bool => Boolean,
    i32 => Int32,
    i16 => Int32,
    i8 => Int32,
    u8 => Int32,
    u16 => Int32,
    i64 => Int64,
    u32 => Int64,
    Binary => Binary,
    ObjectId => ObjectId,
    DateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTime,
    Regex => RegularExpression,
    JavaScriptCodeWithScope => JavaScriptCodeWithScope,
    Decimal128 => Decimal128,
    Document => Document,
    Array => Array,
}

impl From<&String> for Bson {
    fn from(v: &String) -> Self {
        Bson::String(v.clone())
    }
}

impl From<Vec<Bson>> for Bson {
    fn from(items: Vec<Bson>) -> Self {
        Bson::Array(items.into_iter().map(Some).collect())
    }
}

// ============================================================================
// Binary
// ============================================================================

/// Bytes tagged with a subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: BinarySubtype, bytes: impl Into<Vec<u8>>) -> Self {
        Binary {
            subtype,
            bytes: bytes.into(),
        }
    }
}

fn subtype_from_hex(s: &str) -> Option<BinarySubtype> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(s, 16).ok().map(BinarySubtype::from)
}

impl Variant for Binary {
    const ELEMENT_TYPE: ElementType = ElementType::Binary;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_binary(out, self)
    }

    fn to_slot(&self) -> Slot {
        Slot::map([(
            "$binary",
            Slot::map([
                ("base64", Slot::Str(STANDARD.encode(&self.bytes))),
                ("subType", Slot::Str(format!("{:02x}", u8::from(self.subtype)))),
            ]),
        )])
    }

    /// Canonical `{"$binary": {"base64", "subType"}}`, the legacy
    /// `{"$binary", "$type"}` pair, or raw bytes from byte-capable formats.
    fn from_slot(slot: &Slot) -> Option<Self> {
        if let Slot::Bytes(bytes) = slot {
            return Some(Binary::new(BinarySubtype::Generic, bytes.clone()));
        }
        let (data, subtype) = match slot.wrapped("$binary") {
            Some(inner) => {
                let [data, subtype] = inner.exact_fields(["base64", "subType"])?;
                (data, subtype)
            }
            None => {
                let [data, subtype] = slot.exact_fields(["$binary", "$type"])?;
                (data, subtype)
            }
        };
        Some(Binary {
            subtype: subtype_from_hex(subtype.as_str()?)?,
            bytes: STANDARD.decode(data.as_str()?).ok()?,
        })
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Binary(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}

// ============================================================================
// Regular expression
// ============================================================================

/// A pattern with its option letters, which are kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pattern: String,
    options: String,
}

impl Regex {
    /// Build a regex; the option letters are sorted.
    pub fn new(pattern: impl Into<String>, options: impl AsRef<str>) -> Self {
        let mut chars: Vec<char> = options.as_ref().chars().collect();
        chars.sort_unstable();
        Regex {
            pattern: pattern.into(),
            options: chars.into_iter().collect(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Option letters in sorted order.
    pub fn options(&self) -> &str {
        &self.options
    }
}

impl Variant for Regex {
    const ELEMENT_TYPE: ElementType = ElementType::RegularExpression;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_regex(out, self)
    }

    fn to_slot(&self) -> Slot {
        Slot::map([(
            "$regularExpression",
            Slot::map([
                ("pattern", Slot::Str(self.pattern.clone())),
                ("options", Slot::Str(self.options.clone())),
            ]),
        )])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        let [pattern, options] = match slot.wrapped("$regularExpression") {
            Some(inner) => inner.exact_fields(["pattern", "options"])?,
            None => slot.exact_fields(["$regex", "$options"])?,
        };
        Some(Regex::new(pattern.as_str()?, options.as_str()?))
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::RegularExpression(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Serialize for Regex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Regex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}

// ============================================================================
// Code with scope
// ============================================================================

/// JavaScript source together with the variables it closes over.
#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptCodeWithScope {
    pub code: String,
    pub scope: Document,
}

impl Variant for JavaScriptCodeWithScope {
    const ELEMENT_TYPE: ElementType = ElementType::JavaScriptCodeWithScope;

    fn write_payload(&self, out: &mut Vec<u8>, budget: DepthBudget) -> Result<()> {
        raw::write_code_with_scope(out, self, budget)
    }

    fn to_slot(&self) -> Slot {
        Slot::map([
            ("$code", Slot::Str(self.code.clone())),
            ("$scope", self.scope.to_slot()),
        ])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        let [code, scope] = slot.exact_fields(["$code", "$scope"])?;
        Some(JavaScriptCodeWithScope {
            code: code.as_str()?.to_string(),
            scope: Document::from_slot(scope)?,
        })
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::JavaScriptCodeWithScope(v) => Ok(v),
            other => Err(other),
        }
    }

    fn check_depth(&self, budget: DepthBudget) -> Result<()> {
        self.scope.check_depth(budget)
    }

    /// The scope goes through the document's own keyed encoding.
    fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("$code", &self.code)?;
        map.serialize_entry("$scope", &Generic(&self.scope, budget))?;
        map.end()
    }
}

impl Serialize for JavaScriptCodeWithScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for JavaScriptCodeWithScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}
