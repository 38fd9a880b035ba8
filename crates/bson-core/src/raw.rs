//! Byte-level reading and writing of the native layout.
//!
//! Layout (little-endian throughout):
//!
//! ```text
//! document := int32 total_len, element*, 0x00
//! element  := type_byte, cstring key, payload
//! ```
//!
//! Readers work on borrowed slices and report absolute byte offsets in
//! [`BsonError::Malformed`]. Writers append to a `Vec<u8>`.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::bson::{Array, Binary, Bson, JavaScriptCodeWithScope, Regex};
use crate::datetime::DateTime;
use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::error::{BsonError, Result};
use crate::oid::ObjectId;
use crate::options::DepthBudget;
use crate::types::{BinarySubtype, ElementType};
use crate::variant::{with_variant, Variant};

/// Smallest possible document: length prefix plus terminator.
pub(crate) const MIN_DOCUMENT_LEN: usize = 5;

// ============================================================================
// Writing
// ============================================================================

pub(crate) fn write_i32(out: &mut Vec<u8>, v: i32) -> Result<()> {
    out.write_i32::<LittleEndian>(v)?;
    Ok(())
}

pub(crate) fn write_i64(out: &mut Vec<u8>, v: i64) -> Result<()> {
    out.write_i64::<LittleEndian>(v)?;
    Ok(())
}

pub(crate) fn write_f64(out: &mut Vec<u8>, v: f64) -> Result<()> {
    out.write_f64::<LittleEndian>(v)?;
    Ok(())
}

/// Length prefix for a payload that must fit an int32.
fn len_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| BsonError::ValueOutOfRange(format!("length {len} exceeds i32")))
}

pub(crate) fn write_cstring(out: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(BsonError::InvalidKey(s.to_string()));
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

pub(crate) fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    write_i32(out, len_i32(s.len() + 1)?)?;
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

/// Reserve a length prefix and return its position for [`patch_len`].
pub(crate) fn begin_len(out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.extend_from_slice(&[0; 4]);
    start
}

/// Fill in the length prefix reserved at `start` with everything written since.
pub(crate) fn patch_len(out: &mut [u8], start: usize) -> Result<()> {
    let len = len_i32(out.len() - start)?;
    LittleEndian::write_i32(&mut out[start..start + 4], len);
    Ok(())
}

/// One element: type byte, key, payload. `None` writes a null.
pub(crate) fn write_element(
    out: &mut Vec<u8>,
    key: &str,
    value: Option<&Bson>,
    budget: DepthBudget,
) -> Result<()> {
    let ty = value.map_or(ElementType::Null, Bson::element_type);
    out.push(ty.as_u8());
    write_cstring(out, key)?;
    match value {
        Some(value) => value.write_payload(out, budget),
        None => Ok(()),
    }
}

pub(crate) fn write_document(out: &mut Vec<u8>, doc: &Document, budget: DepthBudget) -> Result<()> {
    let budget = budget.descend()?;
    let start = begin_len(out);
    for (key, value) in doc.iter() {
        write_element(out, key, value, budget)?;
    }
    out.push(0);
    patch_len(out, start)
}

pub(crate) fn write_array(out: &mut Vec<u8>, items: &Array, budget: DepthBudget) -> Result<()> {
    let budget = budget.descend()?;
    let start = begin_len(out);
    for (i, item) in items.iter().enumerate() {
        write_element(out, &i.to_string(), item.as_ref(), budget)?;
    }
    out.push(0);
    patch_len(out, start)
}

pub(crate) fn write_binary(out: &mut Vec<u8>, binary: &Binary) -> Result<()> {
    let old = binary.subtype == BinarySubtype::BinaryOld;
    let inner = len_i32(binary.bytes.len())?;
    let total = if old { len_i32(binary.bytes.len() + 4)? } else { inner };
    write_i32(out, total)?;
    out.push(u8::from(binary.subtype));
    if old {
        write_i32(out, inner)?;
    }
    out.extend_from_slice(&binary.bytes);
    Ok(())
}

pub(crate) fn write_regex(out: &mut Vec<u8>, regex: &Regex) -> Result<()> {
    for part in [regex.pattern(), regex.options()] {
        if part.as_bytes().contains(&0) {
            return Err(BsonError::Message(format!(
                "regular expression part {part:?} contains a NUL byte"
            )));
        }
        write_cstring(out, part)?;
    }
    Ok(())
}

pub(crate) fn write_code_with_scope(
    out: &mut Vec<u8>,
    code: &JavaScriptCodeWithScope,
    budget: DepthBudget,
) -> Result<()> {
    let start = begin_len(out);
    write_string(out, &code.code)?;
    write_document(out, &code.scope, budget)?;
    patch_len(out, start)
}

/// `[type byte] + payload` for a single value, the unit handed across the
/// native token protocol.
pub(crate) fn element_bytes(value: &Bson, budget: DepthBudget) -> Result<Vec<u8>> {
    let mut out = vec![value.element_type().as_u8()];
    value.write_payload(&mut out, budget)?;
    Ok(out)
}

impl Bson {
    pub(crate) fn write_payload(&self, out: &mut Vec<u8>, budget: DepthBudget) -> Result<()> {
        with_variant!(self, v => v.write_payload(out, budget))
    }
}

// ============================================================================
// Reading
// ============================================================================

/// An element located inside a document slice. `offset` is the absolute
/// position of the payload, for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawElement<'a> {
    pub key: &'a str,
    pub tag: ElementType,
    pub payload: &'a [u8],
    pub offset: usize,
}

fn read_i32_at(bytes: &[u8], at: usize, base: usize) -> Result<i32> {
    bytes
        .get(at..at + 4)
        .map(LittleEndian::read_i32)
        .ok_or_else(|| BsonError::malformed(base + at, "unexpected end of input"))
}

/// Length prefix of a document or string, checked to be non-negative.
fn read_len_at(bytes: &[u8], at: usize, base: usize) -> Result<usize> {
    let len = read_i32_at(bytes, at, base)?;
    usize::try_from(len).map_err(|_| BsonError::malformed(base + at, format!("negative length {len}")))
}

fn utf8(bytes: &[u8], offset: usize) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| BsonError::malformed(offset + e.valid_up_to(), "invalid UTF-8"))
}

/// A NUL-terminated string at the start of `bytes`; returns it and the bytes consumed.
fn read_cstring(bytes: &[u8], base: usize) -> Result<(&str, usize)> {
    let end = bytes
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| BsonError::malformed(base, "unterminated C string"))?;
    Ok((utf8(&bytes[..end], base)?, end + 1))
}

/// Check the framing of a document slice: prefix equals slice length and
/// the last byte is the terminator.
pub(crate) fn check_frame(bytes: &[u8], base: usize) -> Result<()> {
    if bytes.len() < MIN_DOCUMENT_LEN {
        return Err(BsonError::malformed(base, "document shorter than 5 bytes"));
    }
    let declared = read_len_at(bytes, 0, base)?;
    if declared != bytes.len() {
        return Err(BsonError::malformed(
            base,
            format!("document length {declared} does not match {} available bytes", bytes.len()),
        ));
    }
    if bytes[bytes.len() - 1] != 0 {
        return Err(BsonError::malformed(base + bytes.len() - 1, "missing document terminator"));
    }
    Ok(())
}

/// Size of the payload for `tag` at the start of `rest`.
fn payload_len(tag: ElementType, rest: &[u8], base: usize) -> Result<usize> {
    let len = match tag {
        ElementType::Double | ElementType::DateTime | ElementType::Int64 => 8,
        ElementType::Int32 => 4,
        ElementType::Boolean => 1,
        ElementType::ObjectId => 12,
        ElementType::Decimal128 => 16,
        ElementType::Null | ElementType::MinKey | ElementType::MaxKey => 0,
        ElementType::String => 4 + read_len_at(rest, 0, base)?,
        ElementType::EmbeddedDocument | ElementType::Array | ElementType::JavaScriptCodeWithScope => {
            read_len_at(rest, 0, base)?
        }
        ElementType::Binary => 5 + read_len_at(rest, 0, base)?,
        ElementType::RegularExpression => {
            let (_, pattern) = read_cstring(rest, base)?;
            let (_, options) = read_cstring(&rest[pattern..], base + pattern)?;
            pattern + options
        }
    };
    if len > rest.len() {
        return Err(BsonError::malformed(
            base,
            format!("{tag} payload of {len} bytes runs past the end of its document"),
        ));
    }
    Ok(len)
}

/// Iterates the elements of a framed document slice.
pub(crate) struct RawIter<'a> {
    doc: &'a [u8],
    pos: usize,
    base: usize,
    done: bool,
}

impl<'a> RawIter<'a> {
    pub(crate) fn new(doc: &'a [u8], base: usize) -> Result<Self> {
        check_frame(doc, base)?;
        Ok(RawIter {
            doc,
            pos: 4,
            base,
            done: false,
        })
    }

    fn read_next(&mut self) -> Result<Option<RawElement<'a>>> {
        let end = self.doc.len() - 1;
        let tag_at = self.pos;
        if tag_at == end {
            return Ok(None);
        }
        let tag = self.doc[tag_at];
        let tag = ElementType::from_u8(tag).ok_or(BsonError::UnsupportedElementType(tag))?;
        let key_at = tag_at + 1;
        let (key, key_len) = read_cstring(&self.doc[key_at..end], self.base + key_at)?;
        let payload_at = key_at + key_len;
        let len = payload_len(tag, &self.doc[payload_at..end], self.base + payload_at)?;
        self.pos = payload_at + len;
        Ok(Some(RawElement {
            key,
            tag,
            payload: &self.doc[payload_at..payload_at + len],
            offset: self.base + payload_at,
        }))
    }
}

impl<'a> Iterator for RawIter<'a> {
    type Item = Result<RawElement<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.read_next().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

pub(crate) fn read_document(bytes: &[u8], base: usize, budget: DepthBudget) -> Result<Document> {
    let budget = budget.descend()?;
    let mut doc = Document::new();
    for element in RawIter::new(bytes, base)? {
        let element = element?;
        let value = read_value(element.tag, element.payload, element.offset, budget)?;
        doc.insert_entry(element.key.to_string(), value);
    }
    Ok(doc)
}

pub(crate) fn read_array(bytes: &[u8], base: usize, budget: DepthBudget) -> Result<Array> {
    let budget = budget.descend()?;
    RawIter::new(bytes, base)?
        .map(|element| {
            let element = element?;
            read_value(element.tag, element.payload, element.offset, budget)
        })
        .collect()
}

/// The binary subtype and data, with the old-binary inner length removed.
pub(crate) fn binary_parts(payload: &[u8], offset: usize) -> Result<(BinarySubtype, &[u8])> {
    let subtype = BinarySubtype::from(payload[4]);
    let data = &payload[5..];
    if subtype != BinarySubtype::BinaryOld {
        return Ok((subtype, data));
    }
    let inner = read_len_at(data, 0, offset + 5)?;
    if inner + 4 != data.len() {
        return Err(BsonError::malformed(
            offset + 5,
            format!("old binary inner length {inner} does not match outer length {}", data.len()),
        ));
    }
    Ok((subtype, &data[4..]))
}

/// The text of a string payload (length prefix and terminator removed).
pub(crate) fn string_payload(payload: &[u8], offset: usize) -> Result<&str> {
    match payload.split_last() {
        Some((0, body)) if body.len() >= 4 => utf8(&body[4..], offset + 4),
        _ => Err(BsonError::malformed(offset, "string is not NUL-terminated")),
    }
}

fn fixed<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[..N]);
    out
}

/// Decode one payload whose extent has already been established by
/// [`RawIter`]. `Null` yields `None`.
pub(crate) fn read_value(
    tag: ElementType,
    payload: &[u8],
    offset: usize,
    budget: DepthBudget,
) -> Result<Option<Bson>> {
    let value = match tag {
        ElementType::Null => return Ok(None),
        ElementType::Double => Bson::Double(LittleEndian::read_f64(payload)),
        ElementType::String => Bson::String(string_payload(payload, offset)?.to_string()),
        ElementType::EmbeddedDocument => Bson::Document(read_document(payload, offset, budget)?),
        ElementType::Array => Bson::Array(read_array(payload, offset, budget)?),
        ElementType::Binary => {
            let (subtype, bytes) = binary_parts(payload, offset)?;
            Bson::Binary(Binary {
                subtype,
                bytes: bytes.to_vec(),
            })
        }
        ElementType::ObjectId => Bson::ObjectId(ObjectId::from_bytes(fixed(payload))),
        ElementType::Boolean => match payload[0] {
            0 => Bson::Boolean(false),
            1 => Bson::Boolean(true),
            other => return Err(BsonError::malformed(offset, format!("invalid boolean byte {other}"))),
        },
        ElementType::DateTime => Bson::DateTime(DateTime::from_millis(LittleEndian::read_i64(payload))),
        ElementType::RegularExpression => {
            let (pattern, used) = read_cstring(payload, offset)?;
            let (options, _) = read_cstring(&payload[used..], offset + used)?;
            Bson::RegularExpression(Regex::new(pattern, options))
        }
        ElementType::JavaScriptCodeWithScope => Bson::JavaScriptCodeWithScope(read_code_with_scope(
            payload, offset, budget,
        )?),
        ElementType::Int32 => Bson::Int32(LittleEndian::read_i32(payload)),
        ElementType::Int64 => Bson::Int64(LittleEndian::read_i64(payload)),
        ElementType::Decimal128 => Bson::Decimal128(Decimal128::from_bytes(fixed(payload))),
        ElementType::MinKey => Bson::MinKey,
        ElementType::MaxKey => Bson::MaxKey,
    };
    Ok(Some(value))
}

fn read_code_with_scope(payload: &[u8], offset: usize, budget: DepthBudget) -> Result<JavaScriptCodeWithScope> {
    let total = read_len_at(payload, 0, offset)?;
    if total != payload.len() {
        return Err(BsonError::malformed(offset, "code-with-scope length mismatch"));
    }
    let string_len = 4 + read_len_at(payload, 4, offset + 4)?;
    let scope_at = 4 + string_len;
    if scope_at > payload.len() {
        return Err(BsonError::malformed(offset + 4, "code string runs past its element"));
    }
    let code = string_payload(&payload[4..scope_at], offset + 4)?.to_string();
    let scope = read_document(&payload[scope_at..], offset + scope_at, budget)?;
    Ok(JavaScriptCodeWithScope { code, scope })
}

/// Decode a `[type byte] + payload` unit as produced by [`element_bytes`].
pub(crate) fn read_element_bytes(bytes: &[u8], budget: DepthBudget) -> Result<Option<Bson>> {
    let (&tag, rest) = bytes
        .split_first()
        .ok_or_else(|| BsonError::malformed(0, "empty element"))?;
    let tag = ElementType::try_from(tag)?;
    let len = payload_len(tag, rest, 1)?;
    if len != rest.len() {
        return Err(BsonError::malformed(1 + len, "trailing bytes after element"));
    }
    read_value(tag, rest, 1, budget)
}

/// Walk the containers nested in a payload without materializing anything,
/// failing once `budget` runs out.
pub(crate) fn check_depth(tag: ElementType, payload: &[u8], offset: usize, budget: DepthBudget) -> Result<()> {
    match tag {
        ElementType::EmbeddedDocument | ElementType::Array => {
            let budget = budget.descend()?;
            for element in RawIter::new(payload, offset)? {
                let element = element?;
                check_depth(element.tag, element.payload, element.offset, budget)?;
            }
            Ok(())
        }
        ElementType::JavaScriptCodeWithScope => {
            let string_len = 4 + read_len_at(payload, 4, offset + 4)?;
            let scope_at = 4 + string_len;
            match payload.get(scope_at..) {
                Some(scope) => check_depth(ElementType::EmbeddedDocument, scope, offset + scope_at, budget),
                None => Err(BsonError::malformed(offset + 4, "code string runs past its element")),
            }
        }
        _ => Ok(()),
    }
}
