//! Buffered single-value slot for tag-free backends.
//!
//! A generic deserializer can only be driven once, while trial decoding needs
//! to try the same value against several candidate kinds. `Slot` captures
//! whatever the backend reports through `deserialize_any` so the candidates
//! in [`crate::element::TRIAL_ORDER`] can inspect it as many times as needed.
//!
//! The same type is also the generic shape of the special kinds (`{"$oid": ..}`
//! and friends): it serializes through any serde backend and can itself be
//! used as a deserializer.

use std::fmt;

use serde::de::value::{MapAccessDeserializer, MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::error::BsonError;
use crate::options::DepthBudget;

/// A value as reported by a self-describing backend, before any kind is chosen.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Slot>),
    /// Keys are kept as slots: some backends report non-string keys.
    Map(Vec<(Slot, Slot)>),
}

impl Slot {
    /// Build a map slot from string keys, preserving order.
    pub(crate) fn map<const N: usize>(entries: [(&str, Slot); N]) -> Slot {
        Slot::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Slot::Str(k.to_string()), v))
                .collect(),
        )
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Slot::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Match a map whose key set is exactly `keys` (in any order) and return
    /// the values in the order of `keys`.
    pub(crate) fn exact_fields<const N: usize>(&self, keys: [&str; N]) -> Option<[&Slot; N]> {
        let Slot::Map(entries) = self else {
            return None;
        };
        if entries.len() != N {
            return None;
        }
        let mut found: [Option<&Slot>; N] = [None; N];
        for (key, value) in entries {
            let key = key.as_str()?;
            let idx = keys.iter().position(|k| *k == key)?;
            if found[idx].replace(value).is_some() {
                return None;
            }
        }
        let mut out = [&Slot::Null; N];
        for (slot, value) in out.iter_mut().zip(found) {
            *slot = value?;
        }
        Some(out)
    }

    /// Shorthand for a single-key wrapper such as `{"$oid": ...}`.
    pub(crate) fn wrapped(&self, key: &str) -> Option<&Slot> {
        self.exact_fields([key]).map(|[v]| v)
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::Null => serializer.serialize_none(),
            Slot::Bool(b) => serializer.serialize_bool(*b),
            Slot::I64(n) => serializer.serialize_i64(*n),
            Slot::U64(n) => serializer.serialize_u64(*n),
            Slot::F64(f) => serializer.serialize_f64(*f),
            Slot::Str(s) => serializer.serialize_str(s),
            Slot::Bytes(b) => serializer.serialize_bytes(b),
            Slot::Seq(items) => serializer.collect_seq(items),
            Slot::Map(entries) => serializer.collect_map(entries.iter().map(|(k, v)| (k, v))),
        }
    }
}

/// Captures one value from a generic deserializer into a [`Slot`], bounding
/// the nesting depth.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotSeed {
    budget: DepthBudget,
}

impl SlotSeed {
    /// Capture within the widened allowance of `budget`.
    pub(crate) fn new(budget: DepthBudget) -> Self {
        SlotSeed {
            budget: budget.widened(),
        }
    }

    fn descend<E: de::Error>(self) -> Result<Self, E> {
        self.budget
            .descend()
            .map(|budget| SlotSeed { budget })
            .map_err(E::custom)
    }
}

impl<'de> DeserializeSeed<'de> for SlotSeed {
    type Value = Slot;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Slot, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for SlotSeed {
    type Value = Slot;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any self-describing value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Slot, E> {
        Ok(Slot::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Slot, E> {
        Ok(Slot::I64(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Slot, E> {
        Ok(Slot::U64(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Slot, E> {
        Ok(Slot::F64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Slot, E> {
        Ok(Slot::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Slot, E> {
        Ok(Slot::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Slot, E> {
        Ok(Slot::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Slot, E> {
        Ok(Slot::Bytes(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Slot, E> {
        Ok(Slot::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Slot, E> {
        Ok(Slot::Null)
    }

    fn visit_some<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Slot, D::Error> {
        self.deserialize(deserializer)
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Slot, D::Error> {
        self.deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Slot, A::Error> {
        let child = self.descend()?;
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(child)? {
            items.push(item);
        }
        Ok(Slot::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Slot, A::Error> {
        let child = self.descend()?;
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(1024));
        while let Some(key) = map.next_key_seed(child)? {
            let value = map.next_value_seed(child)?;
            entries.push((key, value));
        }
        Ok(Slot::Map(entries))
    }
}

impl<'de> IntoDeserializer<'de, BsonError> for Slot {
    type Deserializer = Slot;

    fn into_deserializer(self) -> Slot {
        self
    }
}

impl<'de> de::Deserializer<'de> for Slot {
    type Error = BsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BsonError> {
        match self {
            Slot::Null => visitor.visit_unit(),
            Slot::Bool(b) => visitor.visit_bool(b),
            Slot::I64(n) => visitor.visit_i64(n),
            Slot::U64(n) => visitor.visit_u64(n),
            Slot::F64(f) => visitor.visit_f64(f),
            Slot::Str(s) => visitor.visit_string(s),
            Slot::Bytes(b) => visitor.visit_byte_buf(b),
            Slot::Seq(items) => {
                let mut seq = SeqDeserializer::<_, BsonError>::new(items.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            Slot::Map(entries) => {
                let mut map = MapDeserializer::<_, BsonError>::new(entries.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BsonError> {
        match self {
            Slot::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BsonError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BsonError> {
        match self {
            Slot::Str(variant) => visitor.visit_enum(variant.into_deserializer()),
            Slot::Map(entries) if entries.len() == 1 => visitor.visit_enum(
                MapAccessDeserializer::new(MapDeserializer::new(entries.into_iter())),
            ),
            other => Err(de::Error::invalid_type(other.unexpected(), &"enum variant")),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

impl Slot {
    fn unexpected(&self) -> de::Unexpected<'_> {
        match self {
            Slot::Null => de::Unexpected::Unit,
            Slot::Bool(b) => de::Unexpected::Bool(*b),
            Slot::I64(n) => de::Unexpected::Signed(*n),
            Slot::U64(n) => de::Unexpected::Unsigned(*n),
            Slot::F64(f) => de::Unexpected::Float(*f),
            Slot::Str(s) => de::Unexpected::Str(s),
            Slot::Bytes(b) => de::Unexpected::Bytes(b),
            Slot::Seq(_) => de::Unexpected::Seq,
            Slot::Map(_) => de::Unexpected::Map,
        }
    }
}
