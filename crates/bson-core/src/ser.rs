//! Native serializer: any `Serialize` value → framed document bytes.
//!
//! Each element's type byte is written as a placeholder before its key and
//! patched once the value has been seen, so a value can pick its own wire
//! type. Containers reserve their length prefix and fill it in on close.
//! Values that already hold wire bytes ([`crate::Element`],
//! [`crate::Document`] and the concrete kinds) hand them over as an opaque
//! unit, which is spliced in verbatim.
//!
//! ```
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Reading {
//!     name: &'static str,
//!     hits: i64,
//! }
//!
//! let bytes = bson_core::to_vec(&Reading { name: "p", hits: 2 }).unwrap();
//! let doc = bson_core::Document::from_slice(&bytes).unwrap();
//! assert_eq!(doc.get_i64("hits").unwrap(), 2);
//! ```

use serde::ser::{self, Impossible, Serialize};
use tracing::trace;

use crate::document::Document;
use crate::element::{DOCUMENT_TOKEN, ELEMENT_TOKEN};
use crate::error::{BsonError, Result};
use crate::options::{CodecOptions, DepthBudget};
use crate::raw;
use crate::types::{BinarySubtype, ElementType};

/// Encode a value as one native document.
pub fn to_vec<T: ?Sized + Serialize>(value: &T) -> Result<Vec<u8>> {
    to_vec_with_options(value, CodecOptions::default())
}

pub fn to_vec_with_options<T: ?Sized + Serialize>(value: &T, options: CodecOptions) -> Result<Vec<u8>> {
    let mut serializer = Serializer::with_options(options);
    value.serialize(&mut serializer)?;
    let bytes = serializer.into_vec();
    trace!(len = bytes.len(), "serialized native document");
    Ok(bytes)
}

/// Encode a value and read it back as a [`Document`].
pub fn to_document<T: ?Sized + Serialize>(value: &T) -> Result<Document> {
    Document::from_slice(&to_vec(value)?)
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Element,
    Document,
}

/// An open document or array: where its length prefix lives and the depth
/// budget to restore when it closes.
#[derive(Debug, Clone, Copy)]
struct Frame {
    start: usize,
    saved: DepthBudget,
}

#[derive(Debug)]
pub struct Serializer {
    bytes: Vec<u8>,
    /// Placeholder type byte of the element being written; `None` at the top level.
    type_index: Option<usize>,
    token: Option<Token>,
    budget: DepthBudget,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer::with_options(CodecOptions::default())
    }

    pub fn with_options(options: CodecOptions) -> Self {
        Serializer {
            bytes: Vec::new(),
            type_index: None,
            token: None,
            budget: options.into(),
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    fn set_type(&mut self, ty: ElementType) -> Result<()> {
        match self.type_index.take() {
            Some(i) => {
                self.bytes[i] = ty.as_u8();
                Ok(())
            }
            None if ty == ElementType::EmbeddedDocument => Ok(()),
            None => Err(BsonError::TopLevelNotDocument(ty)),
        }
    }

    /// Start the next element: placeholder type byte, then the key.
    fn key(&mut self, key: &str) -> Result<()> {
        self.type_index = Some(self.bytes.len());
        self.bytes.push(0);
        raw::write_cstring(&mut self.bytes, key)
    }

    fn open(&mut self, ty: ElementType) -> Result<Frame> {
        self.set_type(ty)?;
        let saved = self.budget;
        self.budget = saved.descend()?;
        Ok(Frame {
            start: raw::begin_len(&mut self.bytes),
            saved,
        })
    }

    fn close(&mut self, frame: Frame) -> Result<()> {
        self.bytes.push(0);
        raw::patch_len(&mut self.bytes, frame.start)?;
        self.budget = frame.saved;
        Ok(())
    }

    /// Append wire bytes received under a reserved newtype name.
    fn splice(&mut self, token: Token, bytes: &[u8]) -> Result<()> {
        let (tag, payload) = match token {
            Token::Document => (ElementType::EmbeddedDocument, bytes),
            Token::Element => {
                let (&tag, payload) = bytes
                    .split_first()
                    .ok_or_else(|| BsonError::malformed(0, "empty element"))?;
                (ElementType::try_from(tag)?, payload)
            }
        };
        raw::check_depth(tag, payload, 0, self.budget)?;
        self.set_type(tag)?;
        self.bytes.extend_from_slice(payload);
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.set_type(ElementType::Int32)?;
        raw::write_i32(&mut self.bytes, v)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.set_type(ElementType::Int64)?;
        raw::write_i64(&mut self.bytes, v)
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::new()
    }
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = BsonError;
    type SerializeSeq = ArraySerializer<'a>;
    type SerializeTuple = ArraySerializer<'a>;
    type SerializeTupleStruct = ArraySerializer<'a>;
    type SerializeTupleVariant = VariantSerializer<'a>;
    type SerializeMap = DocumentSerializer<'a>;
    type SerializeStruct = DocumentSerializer<'a>;
    type SerializeStructVariant = VariantSerializer<'a>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.set_type(ElementType::Boolean)?;
        self.bytes.push(u8::from(v));
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.write_i32(i32::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.write_i32(i32::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.write_i32(v)
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.write_i64(v)
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.write_i32(i32::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.write_i32(i32::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.write_i64(i64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        let v = i64::try_from(v)
            .map_err(|_| BsonError::ValueOutOfRange(format!("u64 {v} does not fit in an Int64")))?;
        self.write_i64(v)
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.set_type(ElementType::Double)?;
        raw::write_f64(&mut self.bytes, v)
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.set_type(ElementType::String)?;
        raw::write_string(&mut self.bytes, v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        if let Some(token) = self.token.take() {
            return self.splice(token, v);
        }
        self.set_type(ElementType::Binary)?;
        raw::write_binary(
            &mut self.bytes,
            &crate::bson::Binary::new(BinarySubtype::Generic, v),
        )
    }

    fn serialize_none(self) -> Result<()> {
        self.set_type(ElementType::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.set_type(ElementType::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<()> {
        let token = match name {
            ELEMENT_TOKEN => Token::Element,
            DOCUMENT_TOKEN => Token::Document,
            _ => return value.serialize(self),
        };
        self.token = Some(token);
        value.serialize(&mut *self)?;
        match self.token.take() {
            None => Ok(()),
            Some(_) => Err(BsonError::Message(format!("{name} must carry raw bytes"))),
        }
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        let frame = self.open(ElementType::EmbeddedDocument)?;
        self.key(variant)?;
        value.serialize(&mut *self)?;
        self.close(frame)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<ArraySerializer<'a>> {
        let frame = self.open(ElementType::Array)?;
        Ok(ArraySerializer {
            ser: self,
            frame,
            index: 0,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ArraySerializer<'a>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<ArraySerializer<'a>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantSerializer<'a>> {
        let outer = self.open(ElementType::EmbeddedDocument)?;
        self.key(variant)?;
        let inner = self.open(ElementType::Array)?;
        Ok(VariantSerializer {
            ser: self,
            outer,
            inner,
            index: 0,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<DocumentSerializer<'a>> {
        let frame = self.open(ElementType::EmbeddedDocument)?;
        Ok(DocumentSerializer {
            ser: self,
            frame,
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<DocumentSerializer<'a>> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantSerializer<'a>> {
        let outer = self.open(ElementType::EmbeddedDocument)?;
        self.key(variant)?;
        let inner = self.open(ElementType::EmbeddedDocument)?;
        Ok(VariantSerializer {
            ser: self,
            outer,
            inner,
            index: 0,
        })
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

pub struct ArraySerializer<'a> {
    ser: &'a mut Serializer,
    frame: Frame,
    index: usize,
}

impl ArraySerializer<'_> {
    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.ser.key(&self.index.to_string())?;
        self.index += 1;
        value.serialize(&mut *self.ser)
    }
}

impl ser::SerializeSeq for ArraySerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.ser.close(self.frame)
    }
}

impl ser::SerializeTuple for ArraySerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.ser.close(self.frame)
    }
}

impl ser::SerializeTupleStruct for ArraySerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.ser.close(self.frame)
    }
}

pub struct DocumentSerializer<'a> {
    ser: &'a mut Serializer,
    frame: Frame,
    key: Option<String>,
}

impl DocumentSerializer<'_> {
    fn field<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.ser.key(key)?;
        value.serialize(&mut *self.ser)
    }
}

impl ser::SerializeMap for DocumentSerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| BsonError::Message("map value serialized before its key".into()))?;
        self.field(&key, value)
    }

    fn end(self) -> Result<()> {
        self.ser.close(self.frame)
    }
}

impl ser::SerializeStruct for DocumentSerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.ser.close(self.frame)
    }
}

/// `{variant: [..]}` or `{variant: {..}}`.
pub struct VariantSerializer<'a> {
    ser: &'a mut Serializer,
    outer: Frame,
    inner: Frame,
    index: usize,
}

impl VariantSerializer<'_> {
    fn finish(self) -> Result<()> {
        self.ser.close(self.inner)?;
        self.ser.close(self.outer)
    }
}

impl ser::SerializeTupleVariant for VariantSerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.ser.key(&self.index.to_string())?;
        self.index += 1;
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for VariantSerializer<'_> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.ser.key(key)?;
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

/// Map keys become C strings; scalars are stringified.
struct KeySerializer;

fn key_error() -> BsonError {
    BsonError::Message("document keys must be strings or scalars".into())
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = BsonError;
    type SerializeSeq = Impossible<String, BsonError>;
    type SerializeTuple = Impossible<String, BsonError>;
    type SerializeTupleStruct = Impossible<String, BsonError>;
    type SerializeTupleVariant = Impossible<String, BsonError>;
    type SerializeMap = Impossible<String, BsonError>;
    type SerializeStruct = Impossible<String, BsonError>;
    type SerializeStructVariant = Impossible<String, BsonError>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(key_error())
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(key_error())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(key_error())
    }

    fn serialize_none(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(key_error())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_error())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_error())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(key_error())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(key_error())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_error())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_error())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(key_error())
    }
}
