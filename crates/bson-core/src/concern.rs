//! Read and write concern options.
//!
//! Both are small owned values layered on the codec: they encode to and
//! decode from documents, and their `Display` output is the relaxed Extended
//! JSON of that encoding. Cloning yields an independent copy.
//!
//! ```
//! use bson_core::{ReadConcern, ReadConcernLevel, WriteConcern, W};
//!
//! let rc = ReadConcern::new(ReadConcernLevel::Majority);
//! assert_eq!(rc.to_string(), r#"{"level":"majority"}"#);
//!
//! let wc = WriteConcern::new().w(W::Majority).journal(true);
//! assert_eq!(wc.to_string(), r#"{"w":"majority","j":true}"#);
//! assert!(wc.is_acknowledged());
//! ```

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bson::Bson;
use crate::de::from_document;
use crate::document::Document;
use crate::error::Result;
use crate::ser::to_document;

/// Integer spelling of [`W::Majority`].
pub const W_MAJORITY: i32 = -3;
const W_UNACKNOWLEDGED: i32 = 0;
const W_ERRORS_IGNORED: i32 = -1;

// ============================================================================
// Read concern
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadConcernLevel {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

impl ReadConcernLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for ReadConcernLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equal when the levels are equal. The level is kept as a string so
/// levels this crate does not know about survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConcern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl ReadConcern {
    pub fn new(level: ReadConcernLevel) -> Self {
        ReadConcern::from_level(level.as_str())
    }

    pub fn from_level(level: impl Into<String>) -> Self {
        ReadConcern {
            level: Some(level.into()),
        }
    }

    /// Takes `level` when it holds a string and ignores everything else.
    pub fn from_document(doc: &Document) -> Self {
        ReadConcern {
            level: doc.get("level").and_then(Bson::as_str).map(str::to_string),
        }
    }

    /// No level set: the server decides.
    pub fn is_default(&self) -> bool {
        self.level.is_none()
    }

    pub fn to_document(&self) -> Result<Document> {
        to_document(self)
    }
}

impl From<ReadConcernLevel> for ReadConcern {
    fn from(level: ReadConcernLevel) -> Self {
        ReadConcern::new(level)
    }
}

impl fmt::Display for ReadConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self))
    }
}

/// Relaxed Extended JSON of the encoded document, or an empty string when
/// encoding fails.
fn describe<T: Serialize>(value: &T) -> String {
    to_document(value)
        .map(|doc| doc.to_string())
        .unwrap_or_default()
}

// ============================================================================
// Write concern
// ============================================================================

/// How many nodes must acknowledge a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum W {
    Number(i32),
    Tag(String),
    Majority,
}

impl Serialize for W {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            W::Number(n) => serializer.serialize_i32(*n),
            W::Tag(tag) => serializer.serialize_str(tag),
            W::Majority => serializer.serialize_str("majority"),
        }
    }
}

struct WVisitor;

impl<'de> Visitor<'de> for WVisitor {
    type Value = W;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an int32 node count or a tag string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<W, E> {
        match i32::try_from(v) {
            Ok(W_MAJORITY) => Ok(W::Majority),
            Ok(n) => Ok(W::Number(n)),
            Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<W, E> {
        i32::try_from(v)
            .map(W::Number)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<W, E> {
        Ok(match v {
            "majority" => W::Majority,
            tag => W::Tag(tag.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for W {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(WVisitor)
    }
}

/// Acknowledgement requirements for writes. Equality compares the encoded
/// description, so two concerns that encode the same way are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteConcern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<W>,
    #[serde(rename = "j", default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<bool>,
    #[serde(rename = "wtimeout", default, skip_serializing_if = "Option::is_none")]
    pub wtimeout_ms: Option<i32>,
}

impl WriteConcern {
    pub fn new() -> Self {
        WriteConcern::default()
    }

    pub fn w(mut self, w: W) -> Self {
        self.w = Some(w);
        self
    }

    pub fn journal(mut self, journal: bool) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn wtimeout_ms(mut self, wtimeout_ms: i32) -> Self {
        self.wtimeout_ms = Some(wtimeout_ms);
        self
    }

    /// Read `w`, `j` and `wtimeout` from a document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        from_document(doc)
    }

    pub fn to_document(&self) -> Result<Document> {
        to_document(self)
    }

    fn unacknowledged_w(&self) -> bool {
        matches!(self.w, Some(W::Number(W_UNACKNOWLEDGED | W_ERRORS_IGNORED)))
    }

    /// Whether the server reports back on the write.
    pub fn is_acknowledged(&self) -> bool {
        !self.unacknowledged_w() || self.journal == Some(true)
    }

    /// Nothing set.
    pub fn is_default(&self) -> bool {
        self.w.is_none() && self.journal.is_none() && self.wtimeout_ms.is_none()
    }

    /// Rejects negative timeouts and node counts, and journaling combined
    /// with an unacknowledged `w`.
    pub fn is_valid(&self) -> bool {
        if self.wtimeout_ms.is_some_and(|t| t < 0) {
            return false;
        }
        if matches!(self.w, Some(W::Number(n)) if n < W_ERRORS_IGNORED) {
            return false;
        }
        !(self.journal == Some(true) && self.unacknowledged_w())
    }
}

impl PartialEq for WriteConcern {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for WriteConcern {}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self))
    }
}
