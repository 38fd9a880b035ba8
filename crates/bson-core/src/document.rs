//! Ordered documents and their serde bridge.
//!
//! A [`Document`] maps string keys to optional values and keeps insertion
//! order. A key can be present with a null value, which is not the same as
//! the key being absent:
//!
//! ```
//! use bson_core::{doc, Bson};
//!
//! let mut doc = doc! { "z": 1, "a": null };
//! doc.insert("m", "three");
//!
//! assert_eq!(doc.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
//! assert_eq!(doc.get_entry("a"), Some(None));
//! assert_eq!(doc.get_entry("b"), None);
//! assert_eq!(doc.get("z"), Some(&Bson::Int32(1)));
//! ```
//!
//! Re-inserting an existing key replaces its value but keeps its position.
//!
//! ## Serde bridge
//!
//! With a native backend the document travels as its complete wire bytes.
//! With a generic backend it becomes a keyed container: each entry is
//! written as an explicit null or as an [`Element`], and read back in the
//! order the backend enumerates the keys.
//!
//! A document whose key set is exactly that of an Extended JSON shape (such
//! as `{"$oid": ..}`) would read back as that kind, so it is written inside
//! a `{"$document": {..}}` wrapper, which the decoder removes:
//!
//! ```
//! use bson_core::{doc, Document};
//!
//! let doc = doc! { "$numberLong": "5" };
//! let json = serde_json::to_string(&doc).unwrap();
//! assert_eq!(json, r#"{"$document":{"$numberLong":"5"}}"#);
//! assert_eq!(serde_json::from_str::<Document>(&json).unwrap(), doc);
//! ```

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt};
use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, MapAccess, Visitor};
use serde::ser::{self, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::bson::{Array, Bson};
use crate::datetime::DateTime;
use crate::element::{
    trial_decode, Backend, Element, ElementSeed, Generic, NativeBytes, RawBytes, DOCUMENT_TOKEN,
};
use crate::error::{BsonError, Result};
use crate::oid::ObjectId;
use crate::options::{CodecOptions, DepthBudget};
use crate::raw;
use crate::slot::{Slot, SlotSeed};
use crate::types::ElementType;
use crate::variant::Variant;

/// Generic-shape wrapper around a document that would otherwise read back
/// as another kind.
pub(crate) const DOCUMENT_WRAPPER: &str = "$document";

/// Key sets the trial decoder reads as something other than a document.
const RESERVED_KEY_SETS: &[&[&str]] = &[
    &["$oid"],
    &["$numberLong"],
    &["$numberDouble"],
    &["$numberDecimal"],
    &["$numberDecimalBytes"],
    &["$binary"],
    &["$binary", "$type"],
    &["$date"],
    &["$regularExpression"],
    &["$regex", "$options"],
    &["$code", "$scope"],
    &["$minKey"],
    &["$maxKey"],
    &[DOCUMENT_WRAPPER],
];

/// Ordered mapping from string keys to optional values.
#[derive(Debug, Clone, Default)]
pub struct Document {
    entries: IndexMap<String, Option<Bson>>,
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Document::default()
    }

    /// Insert or replace. Returns the previous entry when the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Option<Bson>> {
        self.insert_entry(key.into(), Some(value.into()))
    }

    /// Set `key` to an explicit null.
    pub fn insert_null(&mut self, key: impl Into<String>) -> Option<Option<Bson>> {
        self.insert_entry(key.into(), None)
    }

    pub(crate) fn insert_entry(&mut self, key: String, value: Option<Bson>) -> Option<Option<Bson>> {
        self.entries.insert(key, value)
    }

    /// The value at `key`; `None` if the key is absent or null.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.get_entry(key).flatten()
    }

    /// `None` if absent, `Some(None)` if present with null.
    pub fn get_entry(&self, key: &str) -> Option<Option<&Bson>> {
        self.entries.get(key).map(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.entries.get_mut(key)?.as_mut()
    }

    pub fn is_null(&self, key: &str) -> bool {
        self.get_entry(key) == Some(None)
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Option<Bson>> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in insertion order; explicit nulls come out as `None`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Bson>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Number of entries, nulls included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: ElementType,
        pick: impl FnOnce(&'a Bson) -> Option<T>,
    ) -> Result<T> {
        match self.get_entry(key) {
            None => Err(BsonError::KeyNotFound(key.to_string())),
            Some(value) => value.and_then(pick).ok_or_else(|| BsonError::UnexpectedType {
                key: key.to_string(),
                expected,
            }),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.typed(key, ElementType::String, Bson::as_str)
    }

    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.typed(key, ElementType::Int32, Bson::as_i32)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.typed(key, ElementType::Int64, Bson::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.typed(key, ElementType::Double, Bson::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.typed(key, ElementType::Boolean, Bson::as_bool)
    }

    pub fn get_object_id(&self, key: &str) -> Result<ObjectId> {
        self.typed(key, ElementType::ObjectId, Bson::as_object_id)
    }

    pub fn get_datetime(&self, key: &str) -> Result<DateTime> {
        self.typed(key, ElementType::DateTime, Bson::as_datetime)
    }

    pub fn get_document(&self, key: &str) -> Result<&Document> {
        self.typed(key, ElementType::EmbeddedDocument, Bson::as_document)
    }

    pub fn get_array(&self, key: &str) -> Result<&Array> {
        self.typed(key, ElementType::Array, Bson::as_array)
    }

    /// True when the key set alone would make the generic shape read back
    /// as another kind.
    fn has_reserved_keys(&self) -> bool {
        RESERVED_KEY_SETS
            .iter()
            .any(|set| set.len() == self.len() && set.iter().all(|key| self.contains_key(key)))
    }

    fn from_slot_entries(entries: &[(Slot, Slot)]) -> Option<Document> {
        let mut doc = Document {
            entries: IndexMap::with_capacity(entries.len()),
        };
        for (key, value) in entries {
            let value = match value {
                Slot::Null => None,
                other => Some(trial_decode(other)?),
            };
            doc.insert_entry(key.as_str()?.to_string(), value);
        }
        Some(doc)
    }

    // ------------------------------------------------------------------------
    // Native bytes
    // ------------------------------------------------------------------------

    /// Encode as one framed native document.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.to_vec_with_options(CodecOptions::default())
    }

    pub fn to_vec_with_options(&self, options: CodecOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        raw::write_document(&mut out, self, options.into())?;
        trace!(len = out.len(), entries = self.len(), "document encoded");
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.to_vec()?)?;
        Ok(())
    }

    /// Parse exactly one document; trailing bytes are an error.
    pub fn from_slice(bytes: &[u8]) -> Result<Document> {
        Document::from_slice_with_options(bytes, CodecOptions::default())
    }

    pub fn from_slice_with_options(bytes: &[u8], options: CodecOptions) -> Result<Document> {
        raw::read_document(bytes, 0, options.into())
    }

    /// Read one length-prefixed document from a stream.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Document> {
        let declared = reader.read_i32::<LittleEndian>()?;
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| *len >= raw::MIN_DOCUMENT_LEN)
            .ok_or_else(|| BsonError::malformed(0, format!("invalid document length {declared}")))?;
        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(&declared.to_le_bytes());
        reader.take((len - 4) as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(BsonError::malformed(bytes.len(), "unexpected end of input"));
        }
        Document::from_slice(&bytes)
    }
}

impl PartialEq for Document {
    /// Same entries in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.entries.iter().eq(other.entries.iter())
    }
}

// ============================================================================
// Variant
// ============================================================================

/// The keyed container of a document whose own level is already spent.
struct Entries<'a>(&'a Document, DepthBudget);

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0.iter() {
            map.serialize_entry(key, &value.map(|v| Generic(v, self.1)))?;
        }
        map.end()
    }
}

impl Variant for Document {
    const ELEMENT_TYPE: ElementType = ElementType::EmbeddedDocument;

    fn write_payload(&self, out: &mut Vec<u8>, budget: DepthBudget) -> Result<()> {
        raw::write_document(out, self, budget)
    }

    fn to_slot(&self) -> Slot {
        let entries = Slot::Map(
            self.iter()
                .map(|(key, value)| {
                    (
                        Slot::Str(key.to_string()),
                        value.map_or(Slot::Null, Bson::to_slot),
                    )
                })
                .collect(),
        );
        if self.has_reserved_keys() {
            Slot::map([(DOCUMENT_WRAPPER, entries)])
        } else {
            entries
        }
    }

    /// Any map with string keys whose values all decode. A `$document`
    /// wrapper around a map is removed.
    fn from_slot(slot: &Slot) -> Option<Self> {
        let Slot::Map(entries) = slot else {
            return None;
        };
        match slot.wrapped(DOCUMENT_WRAPPER) {
            Some(Slot::Map(inner)) => Document::from_slot_entries(inner),
            _ => Document::from_slot_entries(entries),
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Document(v) => Ok(v),
            other => Err(other),
        }
    }

    fn check_depth(&self, budget: DepthBudget) -> Result<()> {
        let budget = budget.descend()?;
        self.entries
            .values()
            .flatten()
            .try_for_each(|value| value.check_depth(budget))
    }

    fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        let entries = Entries(self, budget.descend().map_err(ser::Error::custom)?);
        if !self.has_reserved_keys() {
            return entries.serialize(serializer);
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(DOCUMENT_WRAPPER, &entries)?;
        map.end()
    }
}

// ============================================================================
// Serde bridge
// ============================================================================

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match Backend::of_serializer(&serializer) {
            Backend::Native => {
                let bytes = self.to_vec().map_err(ser::Error::custom)?;
                serializer.serialize_newtype_struct(DOCUMENT_TOKEN, &RawBytes(&bytes))
            }
            Backend::Generic => self.serialize_generic(serializer, DepthBudget::default()),
        }
    }
}

/// Decodes a [`Document`] with an explicit nesting limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSeed {
    budget: DepthBudget,
}

impl DocumentSeed {
    /// A seed that rejects documents nested deeper than `options.max_depth`.
    pub fn new(options: CodecOptions) -> Self {
        DocumentSeed {
            budget: options.into(),
        }
    }
}

impl<'de> DeserializeSeed<'de> for DocumentSeed {
    type Value = Document;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Document, D::Error> {
        match Backend::of_deserializer(&deserializer) {
            Backend::Native => deserializer
                .deserialize_newtype_struct(DOCUMENT_TOKEN, NativeBytes::document(self.budget)),
            Backend::Generic => deserializer.deserialize_map(self),
        }
    }
}

impl<'de> Visitor<'de> for DocumentSeed {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Document, A::Error> {
        let child = self.budget.descend().map_err(de::Error::custom)?;
        let mut doc = Document::new();
        let mut pending = map.next_key::<String>()?;

        // A leading `$document` key is a wrapper only when it is the sole key.
        if pending.as_deref() == Some(DOCUMENT_WRAPPER) {
            let first = map.next_value_seed(SlotSeed::new(child))?;
            pending = map.next_key::<String>()?;
            if pending.is_none() {
                let doc = Document::from_slot(&Slot::map([(DOCUMENT_WRAPPER, first)]))
                    .ok_or_else(|| de::Error::custom(BsonError::NoMatchingVariant))?;
                doc.check_depth(self.budget).map_err(de::Error::custom)?;
                return Ok(doc);
            }
            let value = match first {
                Slot::Null => None,
                other => {
                    let value = trial_decode(&other)
                        .ok_or_else(|| de::Error::custom(BsonError::NoMatchingVariant))?;
                    value.check_depth(child).map_err(de::Error::custom)?;
                    Some(value)
                }
            };
            doc.insert_entry(DOCUMENT_WRAPPER.to_string(), value);
        }

        let seed = OptionalElement(ElementSeed::with_budget(child));
        while let Some(key) = pending {
            let value = map.next_value_seed(seed)?;
            doc.insert_entry(key, value.map(Element::into_bson));
            pending = map.next_key::<String>()?;
        }
        Ok(doc)
    }
}

/// An entry value: explicit null, or one element.
#[derive(Clone, Copy)]
struct OptionalElement(ElementSeed);

impl<'de> DeserializeSeed<'de> for OptionalElement {
    type Value = Option<Element<'static>>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_option(self)
    }
}

impl<'de> Visitor<'de> for OptionalElement {
    type Value = Option<Element<'static>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null or a value")
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error> {
        self.0.deserialize(deserializer).map(Some)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        DocumentSeed::default().deserialize(deserializer)
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Relaxed Extended JSON. A document too deep to encode shows the error.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(err) => write!(f, "<{err}>"),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Bson)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, Bson)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k, Some(v))).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<Bson>)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, Option<Bson>)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert_entry(key.into(), value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Option<Bson>);
    type IntoIter = indexmap::map::IntoIter<String, Option<Bson>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a str, Option<&'a Bson>);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Build a [`Document`] literal. `null` stores an explicit null; array
/// literals may mix kinds and nulls.
///
/// ```
/// use bson_core::doc;
///
/// let doc = doc! {
///     "name": "sensor",
///     "tags": ["a", null, 3],
///     "nested": doc! { "ok": true },
///     "missing": null,
/// };
/// assert_eq!(doc.len(), 4);
/// ```
#[macro_export]
macro_rules! doc {
    (@entries $doc:ident;) => {};
    (@entries $doc:ident; $key:tt : null $(, $($rest:tt)*)?) => {
        $doc.insert_null($key);
        $crate::doc!(@entries $doc; $($($rest)*)?);
    };
    (@entries $doc:ident; $key:tt : [ $($items:tt)* ] $(, $($rest:tt)*)?) => {
        $doc.insert($key, $crate::Bson::Array($crate::doc!(@array $($items)*)));
        $crate::doc!(@entries $doc; $($($rest)*)?);
    };
    (@entries $doc:ident; $key:tt : $value:expr $(, $($rest:tt)*)?) => {
        $doc.insert($key, $value);
        $crate::doc!(@entries $doc; $($($rest)*)?);
    };

    (@array) => { ::std::vec::Vec::new() };
    (@array $($items:tt)+) => {{
        let mut items: $crate::Array = ::std::vec::Vec::new();
        $crate::doc!(@items items; $($items)+);
        items
    }};
    (@items $items:ident;) => {};
    (@items $items:ident; null $(, $($rest:tt)*)?) => {
        $items.push(::std::option::Option::None);
        $crate::doc!(@items $items; $($($rest)*)?);
    };
    (@items $items:ident; $item:expr $(, $($rest:tt)*)?) => {
        $items.push(::std::option::Option::Some($crate::Bson::from($item)));
        $crate::doc!(@items $items; $($($rest)*)?);
    };

    () => { $crate::Document::new() };
    ( $($tt:tt)+ ) => {{
        let mut document = $crate::Document::new();
        $crate::doc!(@entries document; $($tt)+);
        document
    }};
}
