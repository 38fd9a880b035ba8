//! Native deserializer: framed document bytes → any `Deserialize` value.
//!
//! Decoding is lazy: a [`Deserializer`] is a view of one element (its type
//! byte and payload slice) and nested documents are walked only as the
//! visitor asks for them. Strings and binary data are lent out borrowed from
//! the input.

use byteorder::{ByteOrder, LittleEndian};
use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor};
use serde::Deserialize;

use crate::document::Document;
use crate::element::{DOCUMENT_TOKEN, ELEMENT_TOKEN};
use crate::error::{BsonError, Result};
use crate::options::{CodecOptions, DepthBudget};
use crate::raw::{self, RawElement, RawIter};
use crate::types::ElementType;

/// Decode one native document. Bytes after the document are an error.
pub fn from_slice<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    from_slice_with_options(bytes, CodecOptions::default())
}

pub fn from_slice_with_options<'de, T: Deserialize<'de>>(
    bytes: &'de [u8],
    options: CodecOptions,
) -> Result<T> {
    T::deserialize(Deserializer::with_options(bytes, options)?)
}

/// Decode a value from a [`Document`] by way of its native bytes.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    let bytes = doc.to_vec()?;
    from_slice(&bytes)
}

#[derive(Debug, Clone, Copy)]
pub struct Deserializer<'de> {
    tag: ElementType,
    payload: &'de [u8],
    /// Absolute offset of `payload` in the original input.
    offset: usize,
    budget: DepthBudget,
}

impl<'de> Deserializer<'de> {
    pub fn new(bytes: &'de [u8]) -> Result<Self> {
        Deserializer::with_options(bytes, CodecOptions::default())
    }

    /// View `bytes` as a top-level document.
    pub fn with_options(bytes: &'de [u8], options: CodecOptions) -> Result<Self> {
        if let Some(prefix) = bytes.get(..4) {
            let declared = LittleEndian::read_i32(prefix);
            if declared >= 0 && (declared as usize) < bytes.len() {
                return Err(BsonError::malformed(
                    declared as usize,
                    "trailing bytes after top-level document",
                ));
            }
        }
        raw::check_frame(bytes, 0)?;
        Ok(Deserializer {
            tag: ElementType::EmbeddedDocument,
            payload: bytes,
            offset: 0,
            budget: options.into(),
        })
    }

    fn child(element: RawElement<'de>, budget: DepthBudget) -> Self {
        Deserializer {
            tag: element.tag,
            payload: element.payload,
            offset: element.offset,
            budget,
        }
    }

    fn str(&self) -> Result<&'de str> {
        raw::string_payload(self.payload, self.offset)
    }

    /// `[type byte] + payload`, the unit handed to an element visitor.
    fn element_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.payload.len());
        bytes.push(self.tag.as_u8());
        bytes.extend_from_slice(self.payload);
        bytes
    }
}

impl<'de> de::Deserializer<'de> for Deserializer<'de> {
    type Error = BsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.tag {
            ElementType::Double => visitor.visit_f64(LittleEndian::read_f64(self.payload)),
            ElementType::String => visitor.visit_borrowed_str(self.str()?),
            ElementType::EmbeddedDocument => visitor.visit_map(DocumentAccess::new(self)?),
            ElementType::Array => visitor.visit_seq(ArrayAccess::new(self)?),
            ElementType::Null => visitor.visit_unit(),
            ElementType::Int32 => visitor.visit_i32(LittleEndian::read_i32(self.payload)),
            ElementType::Int64 => visitor.visit_i64(LittleEndian::read_i64(self.payload)),
            // Everything else is reported through its generic shape.
            tag => match raw::read_value(tag, self.payload, self.offset, self.budget)? {
                Some(value) => value.to_slot().deserialize_any(visitor),
                None => visitor.visit_unit(),
            },
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.tag {
            ElementType::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.tag {
            ElementType::Binary => {
                let (_, data) = raw::binary_parts(self.payload, self.offset)?;
                visitor.visit_borrowed_bytes(data)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match name {
            ELEMENT_TOKEN => {
                raw::check_depth(self.tag, self.payload, self.offset, self.budget)?;
                visitor.visit_byte_buf(self.element_bytes())
            }
            DOCUMENT_TOKEN => {
                if self.tag != ElementType::EmbeddedDocument {
                    return Err(BsonError::TypeMismatch {
                        expected: ElementType::EmbeddedDocument,
                        found: self.tag,
                    });
                }
                raw::check_depth(self.tag, self.payload, self.offset, self.budget)?;
                visitor.visit_borrowed_bytes(self.payload)
            }
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.tag {
            ElementType::String => visitor.visit_enum(self.str()?.into_deserializer()),
            ElementType::EmbeddedDocument => {
                let budget = self.budget.descend()?;
                let mut elements = RawIter::new(self.payload, self.offset)?;
                let (Some(first), None) = (elements.next().transpose()?, elements.next().transpose()?)
                else {
                    return Err(BsonError::malformed(
                        self.offset,
                        "an enum document must have exactly one key",
                    ));
                };
                visitor.visit_enum(EnumAccess {
                    variant: first.key,
                    value: Deserializer::child(first, budget),
                })
            }
            other => Err(BsonError::Message(format!("expected an enum, found {other}"))),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        unit unit_struct seq tuple tuple_struct map struct identifier
    }
}

struct DocumentAccess<'de> {
    elements: RawIter<'de>,
    budget: DepthBudget,
    current: Option<RawElement<'de>>,
}

impl<'de> DocumentAccess<'de> {
    fn new(de: Deserializer<'de>) -> Result<Self> {
        Ok(DocumentAccess {
            elements: RawIter::new(de.payload, de.offset)?,
            budget: de.budget.descend()?,
            current: None,
        })
    }
}

impl<'de> de::MapAccess<'de> for DocumentAccess<'de> {
    type Error = BsonError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(element) = self.elements.next().transpose()? else {
            return Ok(None);
        };
        self.current = Some(element);
        seed.deserialize(BorrowedStrDeserializer::<BsonError>::new(element.key))
            .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let element = self
            .current
            .take()
            .ok_or_else(|| BsonError::Message("value requested before key".into()))?;
        seed.deserialize(Deserializer::child(element, self.budget))
    }
}

struct ArrayAccess<'de> {
    elements: RawIter<'de>,
    budget: DepthBudget,
}

impl<'de> ArrayAccess<'de> {
    fn new(de: Deserializer<'de>) -> Result<Self> {
        Ok(ArrayAccess {
            elements: RawIter::new(de.payload, de.offset)?,
            budget: de.budget.descend()?,
        })
    }
}

impl<'de> de::SeqAccess<'de> for ArrayAccess<'de> {
    type Error = BsonError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.elements.next().transpose()? {
            Some(element) => seed
                .deserialize(Deserializer::child(element, self.budget))
                .map(Some),
            None => Ok(None),
        }
    }
}

struct EnumAccess<'de> {
    variant: &'de str,
    value: Deserializer<'de>,
}

impl<'de> de::EnumAccess<'de> for EnumAccess<'de> {
    type Error = BsonError;
    type Variant = Deserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Deserializer<'de>)> {
        let variant = seed.deserialize(BorrowedStrDeserializer::<BsonError>::new(self.variant))?;
        Ok((variant, self.value))
    }
}

impl<'de> de::VariantAccess<'de> for Deserializer<'de> {
    type Error = BsonError;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(self, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_map(self, visitor)
    }
}
