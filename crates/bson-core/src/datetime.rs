//! Millisecond-precision UTC instants.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bson::Bson;
use crate::element::{deserialize_variant, serialize_variant};
use crate::error::{BsonError, Result};
use crate::options::DepthBudget;
use crate::raw;
use crate::slot::Slot;
use crate::types::ElementType;
use crate::variant::Variant;

/// Milliseconds since the Unix epoch. The full `i64` range is representable
/// even where `chrono` cannot express the instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime(i64);

impl DateTime {
    pub const MIN: DateTime = DateTime(i64::MIN);
    pub const MAX: DateTime = DateTime(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        DateTime(millis)
    }

    pub fn now() -> Self {
        DateTime::from_chrono(Utc::now())
    }

    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }

    /// Sub-millisecond precision is truncated.
    pub fn from_chrono(dt: chrono::DateTime<Utc>) -> Self {
        DateTime(dt.timestamp_millis())
    }

    /// `None` when the instant is outside what `chrono` supports.
    pub fn to_chrono(self) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::from_timestamp_millis(self.0)
    }

    pub fn try_to_rfc3339_string(self) -> Option<String> {
        self.to_chrono()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn parse_rfc3339_str(s: &str) -> Result<Self> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| DateTime::from_chrono(dt.with_timezone(&Utc)))
            .map_err(|e| BsonError::Message(format!("invalid RFC 3339 date {s:?}: {e}")))
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(dt: chrono::DateTime<Utc>) -> Self {
        DateTime::from_chrono(dt)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_to_rfc3339_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "DateTime({})", self.0),
        }
    }
}

impl Variant for DateTime {
    const ELEMENT_TYPE: ElementType = ElementType::DateTime;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_i64(out, self.0)
    }

    fn to_slot(&self) -> Slot {
        Slot::map([("$date", self.0.to_slot())])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        let inner = slot.wrapped("$date")?;
        match inner {
            Slot::Str(s) => DateTime::parse_rfc3339_str(s).ok(),
            other => i64::from_slot(other).map(DateTime),
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::DateTime(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Serialize for DateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}
