//! Wire-level type tags.
//!
//! Every element in a native document starts with one of these bytes. The
//! set is closed: tags for deprecated or unsupported kinds (undefined,
//! db-pointer, plain code, symbol, timestamp) are rejected when reading.

use std::fmt;

use crate::error::BsonError;

/// The type byte that prefixes an element on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    EmbeddedDocument = 0x03,
    Array = 0x04,
    Binary = 0x05,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    RegularExpression = 0x0B,
    JavaScriptCodeWithScope = 0x0F,
    Int32 = 0x10,
    Int64 = 0x12,
    Decimal128 = 0x13,
    MaxKey = 0x7F,
    MinKey = 0xFF,
}

impl ElementType {
    /// The raw tag byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Map a tag byte onto the closed set.
    pub fn from_u8(tag: u8) -> Option<Self> {
        let ty = match tag {
            0x01 => ElementType::Double,
            0x02 => ElementType::String,
            0x03 => ElementType::EmbeddedDocument,
            0x04 => ElementType::Array,
            0x05 => ElementType::Binary,
            0x07 => ElementType::ObjectId,
            0x08 => ElementType::Boolean,
            0x09 => ElementType::DateTime,
            0x0A => ElementType::Null,
            0x0B => ElementType::RegularExpression,
            0x0F => ElementType::JavaScriptCodeWithScope,
            0x10 => ElementType::Int32,
            0x12 => ElementType::Int64,
            0x13 => ElementType::Decimal128,
            0x7F => ElementType::MaxKey,
            0xFF => ElementType::MinKey,
            _ => return None,
        };
        Some(ty)
    }
}

impl TryFrom<u8> for ElementType {
    type Error = BsonError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        ElementType::from_u8(tag).ok_or(BsonError::UnsupportedElementType(tag))
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Double => "double",
            ElementType::String => "string",
            ElementType::EmbeddedDocument => "document",
            ElementType::Array => "array",
            ElementType::Binary => "binary",
            ElementType::ObjectId => "objectId",
            ElementType::Boolean => "bool",
            ElementType::DateTime => "date",
            ElementType::Null => "null",
            ElementType::RegularExpression => "regex",
            ElementType::JavaScriptCodeWithScope => "javascriptWithScope",
            ElementType::Int32 => "int",
            ElementType::Int64 => "long",
            ElementType::Decimal128 => "decimal",
            ElementType::MaxKey => "maxKey",
            ElementType::MinKey => "minKey",
        };
        f.write_str(name)
    }
}

/// Subtype byte carried by binary elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    /// Deprecated layout with an inner length prefix.
    BinaryOld,
    UuidOld,
    Uuid,
    Md5,
    Encrypted,
    /// 0x80 through 0xFF.
    UserDefined(u8),
    /// Any other byte, kept verbatim so it round-trips.
    Reserved(u8),
}

impl From<u8> for BinarySubtype {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BinarySubtype::Generic,
            0x01 => BinarySubtype::Function,
            0x02 => BinarySubtype::BinaryOld,
            0x03 => BinarySubtype::UuidOld,
            0x04 => BinarySubtype::Uuid,
            0x05 => BinarySubtype::Md5,
            0x06 => BinarySubtype::Encrypted,
            0x80..=0xFF => BinarySubtype::UserDefined(byte),
            other => BinarySubtype::Reserved(other),
        }
    }
}

impl From<BinarySubtype> for u8 {
    fn from(subtype: BinarySubtype) -> u8 {
        match subtype {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::BinaryOld => 0x02,
            BinarySubtype::UuidOld => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::Encrypted => 0x06,
            BinarySubtype::UserDefined(b) | BinarySubtype::Reserved(b) => b,
        }
    }
}
