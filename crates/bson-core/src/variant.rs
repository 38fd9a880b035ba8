//! The capability every concrete kind provides.
//!
//! A kind knows its wire tag, how to append its payload to native bytes, its
//! tag-free generic shape, and a strict parser that recognises that shape in
//! a buffered [`Slot`]. The primitives, the min/max markers and arrays are
//! implemented here; the richer kinds implement it next to their own type.

use serde::ser::{self, Serialize, Serializer};

use crate::bson::{Array, Bson};
use crate::element::Generic;
use crate::error::Result;
use crate::options::DepthBudget;
use crate::raw;
use crate::slot::Slot;
use crate::types::ElementType;

pub(crate) trait Variant: Sized {
    const ELEMENT_TYPE: ElementType;

    /// Append the payload (everything after the type byte and key).
    fn write_payload(&self, out: &mut Vec<u8>, budget: DepthBudget) -> Result<()>;

    /// The generic shape as plain data.
    fn to_slot(&self) -> Slot;

    /// Recognise this kind's generic shape, and nothing else.
    fn from_slot(slot: &Slot) -> Option<Self>;

    /// Unwrap the matching `Bson` case, handing the value back otherwise.
    fn from_bson(value: Bson) -> std::result::Result<Self, Bson>;

    /// Write the generic shape. Containers spend one level of `budget`.
    fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        _budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.to_slot().serialize(serializer)
    }

    /// Fail once nested documents and arrays go past `budget`.
    fn check_depth(&self, _budget: DepthBudget) -> Result<()> {
        Ok(())
    }
}

/// Run `$body` with `$v` bound to the concrete kind held by a `Bson`.
macro_rules! with_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            $crate::bson::Bson::Double($v) => $body,
            $crate::bson::Bson::String($v) => $body,
            $crate::bson::Bson::Binary($v) => $body,
            $crate::bson::Bson::ObjectId($v) => $body,
            $crate::bson::Bson::Boolean($v) => $body,
            $crate::bson::Bson::DateTime($v) => $body,
            $crate::bson::Bson::RegularExpression($v) => $body,
            $crate::bson::Bson::JavaScriptCodeWithScope($v) => $body,
            $crate::bson::Bson::Int32($v) => $body,
            $crate::bson::Bson::Int64($v) => $body,
            $crate::bson::Bson::Decimal128($v) => $body,
            $crate::bson::Bson::MinKey => {
                let $v = &$crate::variant::MinKey;
                $body
            }
            $crate::bson::Bson::MaxKey => {
                let $v = &$crate::variant::MaxKey;
                $body
            }
            $crate::bson::Bson::Document($v) => $body,
            $crate::bson::Bson::Array($v) => $body,
        }
    };
}
pub(crate) use with_variant;

impl Variant for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::Double;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_f64(out, *self)
    }

    fn to_slot(&self) -> Slot {
        if self.is_finite() {
            return Slot::F64(*self);
        }
        let text = if self.is_nan() {
            "NaN"
        } else if self.is_sign_positive() {
            "Infinity"
        } else {
            "-Infinity"
        };
        Slot::map([("$numberDouble", Slot::Str(text.to_string()))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        if let Slot::F64(v) = slot {
            return Some(*v);
        }
        match slot.wrapped("$numberDouble")?.as_str()? {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Double(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Variant for String {
    const ELEMENT_TYPE: ElementType = ElementType::String;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_string(out, self)
    }

    fn to_slot(&self) -> Slot {
        Slot::Str(self.clone())
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        slot.as_str().map(str::to_string)
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::String(v) => Ok(v),
            other => Err(other),
        }
    }

    fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        _budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self)
    }
}

impl Variant for bool {
    const ELEMENT_TYPE: ElementType = ElementType::Boolean;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        out.push(u8::from(*self));
        Ok(())
    }

    fn to_slot(&self) -> Slot {
        Slot::Bool(*self)
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        match slot {
            Slot::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Boolean(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Variant for i32 {
    const ELEMENT_TYPE: ElementType = ElementType::Int32;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_i32(out, *self)
    }

    fn to_slot(&self) -> Slot {
        Slot::I64(i64::from(*self))
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        match slot {
            Slot::I64(n) => i32::try_from(*n).ok(),
            Slot::U64(n) => i32::try_from(*n).ok(),
            _ => None,
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Int32(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Variant for i64 {
    const ELEMENT_TYPE: ElementType = ElementType::Int64;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        raw::write_i64(out, *self)
    }

    fn to_slot(&self) -> Slot {
        Slot::map([("$numberLong", Slot::Str(self.to_string()))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        match slot {
            Slot::I64(n) => Some(*n),
            Slot::U64(n) => i64::try_from(*n).ok(),
            _ => slot.wrapped("$numberLong")?.as_str()?.parse().ok(),
        }
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Int64(v) => Ok(v),
            other => Err(other),
        }
    }
}

/// Marker for the min-key kind; compares below every other value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MinKey;

/// Marker for the max-key kind; compares above every other value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MaxKey;

fn is_marker(slot: &Slot, key: &str) -> bool {
    matches!(slot.wrapped(key), Some(Slot::I64(1) | Slot::U64(1)))
}

impl Variant for MinKey {
    const ELEMENT_TYPE: ElementType = ElementType::MinKey;

    fn write_payload(&self, _out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        Ok(())
    }

    fn to_slot(&self) -> Slot {
        Slot::map([("$minKey", Slot::I64(1))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        is_marker(slot, "$minKey").then_some(MinKey)
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::MinKey => Ok(MinKey),
            other => Err(other),
        }
    }
}

impl Variant for MaxKey {
    const ELEMENT_TYPE: ElementType = ElementType::MaxKey;

    fn write_payload(&self, _out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        Ok(())
    }

    fn to_slot(&self) -> Slot {
        Slot::map([("$maxKey", Slot::I64(1))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        is_marker(slot, "$maxKey").then_some(MaxKey)
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::MaxKey => Ok(MaxKey),
            other => Err(other),
        }
    }
}

impl Variant for Array {
    const ELEMENT_TYPE: ElementType = ElementType::Array;

    fn write_payload(&self, out: &mut Vec<u8>, budget: DepthBudget) -> Result<()> {
        raw::write_array(out, self, budget)
    }

    fn to_slot(&self) -> Slot {
        Slot::Seq(
            self.iter()
                .map(|item| item.as_ref().map_or(Slot::Null, Bson::to_slot))
                .collect(),
        )
    }

    /// Every element must itself survive trial decoding; nulls are kept in place.
    fn from_slot(slot: &Slot) -> Option<Self> {
        let Slot::Seq(items) = slot else {
            return None;
        };
        items
            .iter()
            .map(|item| match item {
                Slot::Null => Some(None),
                other => crate::element::trial_decode(other).map(Some),
            })
            .collect()
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Array(v) => Ok(v),
            other => Err(other),
        }
    }

    fn check_depth(&self, budget: DepthBudget) -> Result<()> {
        let budget = budget.descend()?;
        self.iter().flatten().try_for_each(|item| item.check_depth(budget))
    }

    /// Each element is re-wrapped so it keeps its own concrete kind.
    fn serialize_generic<S: Serializer>(
        &self,
        serializer: S,
        budget: DepthBudget,
    ) -> std::result::Result<S::Ok, S::Error> {
        let budget = budget.descend().map_err(ser::Error::custom)?;
        serializer.collect_seq(self.iter().map(|item| item.as_ref().map(|v| Generic(v, budget))))
    }
}
