//! IEEE 754-2008 128-bit decimals in the binary integer decimal (BID) encoding.
//!
//! Values are stored as their 16 wire bytes. Parsing and formatting follow
//! the canonical string rules: at most 34 significant digits, exponents in
//! `-6176..=6111`, plain notation while the adjusted exponent is at least -6
//! and the exponent is not positive, scientific notation otherwise. Inexact
//! input (digits that would need rounding) is rejected rather than rounded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bson::Bson;
use crate::element::{deserialize_variant, serialize_variant};
use crate::error::{BsonError, Result};
use crate::options::DepthBudget;
use crate::slot::Slot;
use crate::types::ElementType;
use crate::variant::Variant;

const EXPONENT_BIAS: i32 = 6176;
const MIN_EXPONENT: i32 = -6176;
const MAX_EXPONENT: i32 = 6111;
const MAX_DIGITS: usize = 34;
/// 10^34 - 1
const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999_999_999_999_999_999_999;

const SIGN_BIT: u128 = 1 << 127;
const INFINITY_BITS: u128 = 0b11110 << 122;
const NAN_BITS: u128 = 0b11111 << 122;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128 {
    bytes: [u8; 16],
}

/// What the 128 bits describe once decoded.
enum Parts {
    NaN,
    Infinity { negative: bool },
    Finite { negative: bool, exponent: i32, coefficient: u128 },
}

impl Decimal128 {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Decimal128 { bytes }
    }

    /// The wire (little-endian) bytes.
    pub const fn bytes(&self) -> [u8; 16] {
        self.bytes
    }

    fn from_bits(bits: u128) -> Self {
        Decimal128 {
            bytes: bits.to_le_bytes(),
        }
    }

    fn parts(&self) -> Parts {
        let bits = u128::from_le_bytes(self.bytes);
        let negative = bits & SIGN_BIT != 0;
        let combination = (bits >> 122) & 0b11111;
        if combination == 0b11111 {
            return Parts::NaN;
        }
        if combination == 0b11110 {
            return Parts::Infinity { negative };
        }
        let (biased, coefficient) = if (bits >> 125) & 0b11 == 0b11 {
            // Large-coefficient form; any such coefficient exceeds 34 digits.
            ((bits >> 111) & 0x3FFF, 0)
        } else {
            let coefficient = bits & ((1 << 113) - 1);
            let coefficient = if coefficient > MAX_COEFFICIENT { 0 } else { coefficient };
            ((bits >> 113) & 0x3FFF, coefficient)
        };
        Parts::Finite {
            negative,
            exponent: biased as i32 - EXPONENT_BIAS,
            coefficient,
        }
    }

    fn from_parts(negative: bool, exponent: i32, coefficient: u128) -> Self {
        let biased = (exponent + EXPONENT_BIAS) as u128;
        let sign = if negative { SIGN_BIT } else { 0 };
        Decimal128::from_bits(sign | (biased << 113) | coefficient)
    }

    /// The canonical quiet NaN.
    pub fn nan() -> Self {
        Decimal128::from_bits(NAN_BITS)
    }

    /// Positive or negative infinity.
    pub fn infinity(negative: bool) -> Self {
        Decimal128::from_bits(INFINITY_BITS | if negative { SIGN_BIT } else { 0 })
    }

    pub fn is_nan(&self) -> bool {
        matches!(self.parts(), Parts::NaN)
    }

    /// Whether the string form parses back to these exact bytes. Signed or
    /// signalling NaNs, NaN payloads and out-of-range coefficients do not.
    pub fn is_canonical(&self) -> bool {
        self.to_string().parse::<Decimal128>().is_ok_and(|parsed| parsed == *self)
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, exponent, coefficient) = match self.parts() {
            Parts::NaN => return f.write_str("NaN"),
            Parts::Infinity { negative } => {
                return f.write_str(if negative { "-Infinity" } else { "Infinity" })
            }
            Parts::Finite {
                negative,
                exponent,
                coefficient,
            } => (negative, exponent, coefficient),
        };
        if negative {
            f.write_str("-")?;
        }
        let digits = coefficient.to_string();
        let adjusted = exponent + digits.len() as i32 - 1;

        if exponent > 0 || adjusted < -6 {
            let (first, rest) = digits.split_at(1);
            f.write_str(first)?;
            if !rest.is_empty() {
                write!(f, ".{rest}")?;
            }
            return write!(f, "E{}{adjusted}", if adjusted >= 0 { "+" } else { "" });
        }
        if exponent == 0 {
            return f.write_str(&digits);
        }
        let scale = (-exponent) as usize;
        if digits.len() > scale {
            let (whole, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{whole}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

impl fmt::Debug for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal128({self})")
    }
}

impl FromStr for Decimal128 {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| BsonError::Message(format!("invalid Decimal128 {s:?}: {why}"));

        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if body.eq_ignore_ascii_case("nan") {
            return Ok(Decimal128::nan());
        }
        if body.eq_ignore_ascii_case("inf") || body.eq_ignore_ascii_case("infinity") {
            return Ok(Decimal128::infinity(negative));
        }

        let (mantissa, exp_part) = match body.find(['e', 'E']) {
            Some(i) => (&body[..i], Some(&body[i + 1..])),
            None => (body, None),
        };
        let mut exponent: i64 = match exp_part {
            Some(e) => e.parse().map_err(|_| invalid("bad exponent"))?,
            None => 0,
        };

        let mut digits = String::with_capacity(mantissa.len());
        let mut seen_point = false;
        for c in mantissa.chars() {
            match c {
                '0'..='9' => {
                    digits.push(c);
                    if seen_point {
                        exponent -= 1;
                    }
                }
                '.' if !seen_point => seen_point = true,
                _ => return Err(invalid("unexpected character")),
            }
        }
        if digits.is_empty() {
            return Err(invalid("no digits"));
        }

        let mut significant = digits.trim_start_matches('0');
        if significant.is_empty() {
            significant = "0";
        }
        // Trailing zeros may be folded into the exponent when there are too many digits.
        let mut significant = significant.to_string();
        while significant.len() > MAX_DIGITS && significant.ends_with('0') {
            significant.pop();
            exponent += 1;
        }
        if significant.len() > MAX_DIGITS {
            return Err(invalid("more than 34 significant digits"));
        }
        let mut coefficient: u128 = significant.parse().map_err(|_| invalid("bad digits"))?;

        if coefficient == 0 {
            exponent = exponent.clamp(i64::from(MIN_EXPONENT), i64::from(MAX_EXPONENT));
        }
        while exponent > i64::from(MAX_EXPONENT) {
            if coefficient * 10 > MAX_COEFFICIENT {
                return Err(invalid("exponent overflow"));
            }
            coefficient *= 10;
            exponent -= 1;
        }
        while exponent < i64::from(MIN_EXPONENT) {
            if coefficient % 10 != 0 {
                return Err(invalid("exponent underflow"));
            }
            coefficient /= 10;
            exponent += 1;
        }
        Ok(Decimal128::from_parts(negative, exponent as i32, coefficient))
    }
}

impl Variant for Decimal128 {
    const ELEMENT_TYPE: ElementType = ElementType::Decimal128;

    fn write_payload(&self, out: &mut Vec<u8>, _budget: DepthBudget) -> Result<()> {
        out.extend_from_slice(&self.bytes);
        Ok(())
    }

    /// `{"$numberDecimal": text}`, or the wire bytes as hex when the text
    /// would not restore them.
    fn to_slot(&self) -> Slot {
        if self.is_canonical() {
            return Slot::map([("$numberDecimal", Slot::Str(self.to_string()))]);
        }
        let hex: String = self.bytes.iter().map(|b| format!("{b:02x}")).collect();
        Slot::map([("$numberDecimalBytes", Slot::Str(hex))])
    }

    fn from_slot(slot: &Slot) -> Option<Self> {
        if let Some(text) = slot.wrapped("$numberDecimal") {
            return text.as_str()?.parse().ok();
        }
        let hex = slot.wrapped("$numberDecimalBytes")?.as_str()?;
        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).ok()?;
        }
        Some(Decimal128::from_bytes(bytes))
    }

    fn from_bson(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Decimal128(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl Serialize for Decimal128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_variant(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Decimal128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_variant(deserializer)
    }
}
