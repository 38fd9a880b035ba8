//! The type-erased element wrapper.
//!
//! [`Element`] is the single point where a [`Bson`] value crosses into or out
//! of `serde`. What happens there depends on the backend on the other side:
//!
//! - **Native** backends (anything reporting `is_human_readable() == false`,
//!   including this crate's own [`crate::ser::Serializer`] and
//!   [`crate::de::Deserializer`]) exchange the value's wire bytes as one
//!   opaque unit through a reserved newtype name. The native serializer
//!   splices those bytes straight into its output; other compact formats
//!   store them as a byte string.
//! - **Generic** backends carry no type tag, so encoding emits a tag-free
//!   shape (canonical Extended JSON) and decoding buffers the value once and
//!   tries each kind in [`TRIAL_ORDER`], keeping the first that parses.
//!
//! ```
//! use bson_core::{Bson, Element};
//!
//! let json = serde_json::to_string(&Element::new(Bson::Int64(7))).unwrap();
//! assert_eq!(json, r#"{"$numberLong":"7"}"#);
//!
//! let back: Element = serde_json::from_str(&json).unwrap();
//! assert_eq!(back.into_bson(), Bson::Int64(7));
//!
//! // A float stays a float even when it looks integral.
//! let three: Bson = serde_json::from_str("3.0").unwrap();
//! assert_eq!(three, Bson::Double(3.0));
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::de::{self, DeserializeSeed, Visitor};
use serde::ser::{self, Serialize, Serializer};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::bson::{Array, Binary, Bson, JavaScriptCodeWithScope, Regex};
use crate::datetime::DateTime;
use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::error::{BsonError, Result};
use crate::oid::ObjectId;
use crate::options::{CodecOptions, DepthBudget};
use crate::raw;
use crate::slot::{Slot, SlotSeed};
use crate::types::ElementType;
use crate::variant::{MaxKey, MinKey, Variant};

/// Reserved newtype name carrying `[type byte] + payload` for one value.
pub(crate) const ELEMENT_TOKEN: &str = "$__bson_core::private::Element";
/// Reserved newtype name carrying a complete framed document.
pub(crate) const DOCUMENT_TOKEN: &str = "$__bson_core::private::Document";

// ============================================================================
// Backend capability
// ============================================================================

/// Which protocol a serde backend speaks with this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Wire bytes pass through as opaque units.
    Native,
    /// Tag-free shapes and trial decoding.
    Generic,
}

impl Backend {
    /// The protocol to use with `serializer`.
    pub fn of_serializer<S: Serializer>(serializer: &S) -> Backend {
        if serializer.is_human_readable() {
            Backend::Generic
        } else {
            Backend::Native
        }
    }

    /// The protocol to use with `deserializer`.
    pub fn of_deserializer<'de, D: de::Deserializer<'de>>(deserializer: &D) -> Backend {
        if deserializer.is_human_readable() {
            Backend::Generic
        } else {
            Backend::Native
        }
    }
}

/// Bytes handed to a native serializer under one of the reserved names.
pub(crate) struct RawBytes<'a>(pub &'a [u8]);

impl Serialize for RawBytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

/// A value written through its generic shape with a running depth budget.
pub(crate) struct Generic<'a, T>(pub &'a T, pub DepthBudget);

impl Serialize for Generic<'_, Bson> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_generic(serializer, self.1)
    }
}

impl Serialize for Generic<'_, Document> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_generic(serializer, self.1)
    }
}

/// Receives the opaque unit from a native deserializer and parses it.
pub(crate) struct NativeBytes<T> {
    parse: fn(&[u8], DepthBudget) -> Result<T>,
    budget: DepthBudget,
}

impl NativeBytes<Option<Bson>> {
    pub(crate) fn element(budget: DepthBudget) -> Self {
        NativeBytes {
            parse: raw::read_element_bytes,
            budget,
        }
    }
}

impl NativeBytes<Document> {
    pub(crate) fn document(budget: DepthBudget) -> Self {
        NativeBytes {
            parse: |bytes, budget| raw::read_document(bytes, 0, budget),
            budget,
        }
    }
}

impl<'de, T> Visitor<'de> for NativeBytes<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("native BSON bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<T, E> {
        (self.parse)(v, self.budget).map_err(E::custom)
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<T, D::Error> {
        deserializer.deserialize_bytes(self)
    }

    /// Formats that write byte strings as sequences of integers.
    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<T, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        self.visit_bytes(&bytes)
    }
}

// ============================================================================
// Per-kind serde plumbing
// ============================================================================

/// `Serialize` body shared by the concrete kinds.
pub(crate) fn serialize_variant<V: Variant, S: Serializer>(
    value: &V,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match Backend::of_serializer(&serializer) {
        Backend::Native => {
            let mut bytes = vec![V::ELEMENT_TYPE.as_u8()];
            value
                .write_payload(&mut bytes, DepthBudget::default())
                .map_err(ser::Error::custom)?;
            serializer.serialize_newtype_struct(ELEMENT_TOKEN, &RawBytes(&bytes))
        }
        Backend::Generic => value.serialize_generic(serializer, DepthBudget::default()),
    }
}

/// `Deserialize` body shared by the concrete kinds: the native path checks
/// the stored kind, the generic path accepts only this kind's shape.
pub(crate) fn deserialize_variant<'de, V: Variant, D: de::Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<V, D::Error> {
    match Backend::of_deserializer(&deserializer) {
        Backend::Native => {
            let value = deserializer
                .deserialize_newtype_struct(ELEMENT_TOKEN, NativeBytes::element(DepthBudget::default()))?;
            let mismatch = |found: ElementType| -> D::Error {
                de::Error::custom(BsonError::TypeMismatch {
                    expected: V::ELEMENT_TYPE,
                    found,
                })
            };
            match value {
                Some(value) => V::from_bson(value).map_err(|other| mismatch(other.element_type())),
                None => Err(mismatch(ElementType::Null)),
            }
        }
        Backend::Generic => {
            let budget = DepthBudget::default();
            let slot = SlotSeed::new(budget).deserialize(deserializer)?;
            let value = V::from_slot(&slot).ok_or_else(|| {
                de::Error::custom(format!("expected a {} value", V::ELEMENT_TYPE))
            })?;
            value.check_depth(budget).map_err(de::Error::custom)?;
            Ok(value)
        }
    }
}

// ============================================================================
// Trial decoding
// ============================================================================

/// One kind the generic decoder may try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Double,
    String,
    Binary,
    ObjectId,
    Boolean,
    DateTime,
    RegularExpression,
    JavaScriptCodeWithScope,
    /// A platform-sized signed integer, stored as Int32 when it fits and
    /// Int64 otherwise.
    NativeInt,
    Int32,
    Int64,
    Decimal128,
    MinKey,
    MaxKey,
    Array,
    Document,
}

/// The order in which a buffered generic value is matched. The first
/// candidate that parses wins, so an ambiguous value always resolves the
/// same way (`3.0` is a Double, `3` an Int32, `{"$oid": ..}` an ObjectId).
pub const TRIAL_ORDER: [Candidate; 16] = [
    Candidate::Double,
    Candidate::String,
    Candidate::Binary,
    Candidate::ObjectId,
    Candidate::Boolean,
    Candidate::DateTime,
    Candidate::RegularExpression,
    Candidate::JavaScriptCodeWithScope,
    Candidate::NativeInt,
    Candidate::Int32,
    Candidate::Int64,
    Candidate::Decimal128,
    Candidate::MinKey,
    Candidate::MaxKey,
    Candidate::Array,
    Candidate::Document,
];

fn native_int(slot: &Slot) -> Option<Bson> {
    let n = match slot {
        Slot::I64(n) => isize::try_from(*n).ok()?,
        Slot::U64(n) => isize::try_from(*n).ok()?,
        _ => return None,
    };
    let n = n as i64;
    Some(i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32))
}

impl Candidate {
    fn parse(self, slot: &Slot) -> Option<Bson> {
        match self {
            Candidate::Double => f64::from_slot(slot).map(Bson::Double),
            Candidate::String => String::from_slot(slot).map(Bson::String),
            Candidate::Binary => Binary::from_slot(slot).map(Bson::Binary),
            Candidate::ObjectId => ObjectId::from_slot(slot).map(Bson::ObjectId),
            Candidate::Boolean => bool::from_slot(slot).map(Bson::Boolean),
            Candidate::DateTime => DateTime::from_slot(slot).map(Bson::DateTime),
            Candidate::RegularExpression => Regex::from_slot(slot).map(Bson::RegularExpression),
            Candidate::JavaScriptCodeWithScope => {
                JavaScriptCodeWithScope::from_slot(slot).map(Bson::JavaScriptCodeWithScope)
            }
            Candidate::NativeInt => native_int(slot),
            Candidate::Int32 => i32::from_slot(slot).map(Bson::Int32),
            Candidate::Int64 => i64::from_slot(slot).map(Bson::Int64),
            Candidate::Decimal128 => Decimal128::from_slot(slot).map(Bson::Decimal128),
            Candidate::MinKey => MinKey::from_slot(slot).map(|_| Bson::MinKey),
            Candidate::MaxKey => MaxKey::from_slot(slot).map(|_| Bson::MaxKey),
            Candidate::Array => Array::from_slot(slot).map(Bson::Array),
            Candidate::Document => Document::from_slot(slot).map(Bson::Document),
        }
    }
}

/// Run [`TRIAL_ORDER`] over a buffered value. Null is not a kind, so it
/// never matches.
pub(crate) fn trial_decode(slot: &Slot) -> Option<Bson> {
    let found = TRIAL_ORDER
        .iter()
        .find_map(|candidate| candidate.parse(slot).map(|value| (*candidate, value)));
    match found {
        Some((candidate, value)) => {
            trace!(?candidate, "trial decode matched");
            Some(value)
        }
        None => {
            debug!(?slot, "no candidate matched buffered value");
            None
        }
    }
}

// ============================================================================
// Element
// ============================================================================

/// Carries exactly one value across a serde boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<'a>(Cow<'a, Bson>);

impl Element<'static> {
    /// Wrap an owned value.
    pub fn new(value: Bson) -> Self {
        Element(Cow::Owned(value))
    }
}

impl<'a> Element<'a> {
    /// Wrap a borrowed value, for encoding without a clone.
    pub fn borrowed(value: &'a Bson) -> Self {
        Element(Cow::Borrowed(value))
    }

    /// The wrapped value.
    pub fn get(&self) -> &Bson {
        &self.0
    }

    pub fn into_bson(self) -> Bson {
        self.0.into_owned()
    }
}

impl Serialize for Element<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = self.get();
        match Backend::of_serializer(&serializer) {
            Backend::Native => {
                let bytes =
                    raw::element_bytes(value, DepthBudget::default()).map_err(ser::Error::custom)?;
                trace!(kind = %value.element_type(), len = bytes.len(), "native element");
                serializer.serialize_newtype_struct(ELEMENT_TOKEN, &RawBytes(&bytes))
            }
            Backend::Generic => value.serialize_generic(serializer, DepthBudget::default()),
        }
    }
}

/// Decodes an [`Element`] with an explicit nesting limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementSeed {
    budget: DepthBudget,
}

impl ElementSeed {
    /// A seed that rejects values nested deeper than `options.max_depth`.
    pub fn new(options: CodecOptions) -> Self {
        ElementSeed::with_budget(options.into())
    }

    pub(crate) fn with_budget(budget: DepthBudget) -> Self {
        ElementSeed { budget }
    }
}

impl<'de> DeserializeSeed<'de> for ElementSeed {
    type Value = Element<'static>;

    fn deserialize<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Element<'static>, D::Error> {
        match Backend::of_deserializer(&deserializer) {
            Backend::Native => deserializer
                .deserialize_newtype_struct(ELEMENT_TOKEN, NativeBytes::element(self.budget))?
                .map(Element::new)
                .ok_or_else(|| de::Error::custom(BsonError::NoMatchingVariant)),
            Backend::Generic => {
                let slot = SlotSeed::new(self.budget).deserialize(deserializer)?;
                let value = trial_decode(&slot)
                    .ok_or_else(|| de::Error::custom(BsonError::NoMatchingVariant))?;
                value.check_depth(self.budget).map_err(de::Error::custom)?;
                Ok(Element::new(value))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Element<'static> {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        ElementSeed::default().deserialize(deserializer)
    }
}
