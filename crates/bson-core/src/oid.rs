//! 12-byte object identifiers.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bson::Bson;
use crate::datetime::DateTime;
use crate::element::{deserialize_variant, serialize_variant};
use crate::error::{BsonError, Result};
use crate::options::DepthBudget;
use crate::slot::Slot;
use crate::types::ElementType;
use crate::variant::Variant;

const MAX_COUNTER: u32 = 0x00FF_FFFF;

/// A 12-byte identifier: 4-byte big-endian seconds timestamp, 5 bytes unique
/// to this process, and a 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    bytes: [u8; 12],
}

/// Seed mixed from the process id and start time; feeds both the
/// process-unique bytes and the counter's starting point.
fn process_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| {
        let mut hasher = DefaultHasher::new();
        std::process::id().hash(&mut hasher);
        chrono::Utc::now().timestamp_nanos_opt().hash(&mut hasher);
        hasher.finish()
    })
}

fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| AtomicU32::new((process_seed() >> 40) as u32 & MAX_COUNTER));
    counter.fetch_add(1, Ordering::Relaxed) & MAX_COUNTER
}

impl ObjectId {
    /// Generate a fresh id from the current time.
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let unique = process_seed().to_be_bytes();
        let counter = next_counter().to_be_bytes();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&unique[..5]);
        bytes[9..].copy_from_slice(&counter[1..]);
        ObjectId { bytes }
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId { bytes }
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.bytes
    }

    /// Parse 24 hexadecimal characters.
    pub fn parse_str(s: &str) -> Result<Self> {
        let invalid = || BsonError::Message(format!("invalid ObjectId hex string {s:?}"));
        if s.len() != 24 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(ObjectId { bytes })
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The creation time embedded in the first four bytes.
    pub fn timestamp(&self) -> DateTime {
        let mut secs = [0u8; 4];
        secs.copy_from_slice(&self.bytes[..4]);
        DateTime::from_millis(i64::from(u32::from_be_bytes(secs)) * 1000)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse_str(s)
    }
}

impl From<[u8; 12]> for ObjectId {
    fn from(bytes: [u8; 12]) -> Self {
        ObjectId::from_bytes(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectId").field(&self.to_hex()).finish()
    }
}

impl Variant for ObjectId {
    const ELEMENT_TYPE: ElementType = ElementType::ObjectId;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        out.extend_from_slice(&self.bytes);
        Ok(())
    }

    fn to_slot(&self) -> Slot {
        Slot::map([("$oid", Slot::Str(self.to_hex()))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        ObjectId::parse_str(slot.wrapped("$oid")?.as_str()?).ok()
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::ObjectId(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}
