/// Tests for the concrete value kinds: ObjectId, DateTime, Decimal128, Regex,
/// Binary, wire tags and the `Bson` accessors.
use bson_core::{
    doc, Binary, BinarySubtype, Bson, BsonError, DateTime, Decimal128, Document, Element,
    ElementType, ObjectId, Regex,
};
use chrono::{TimeZone, Utc};

fn json_roundtrip(value: &Bson) -> Bson {
    let json = serde_json::to_string(&Element::borrowed(value)).unwrap();
    serde_json::from_str::<Element<'static>>(&json)
        .unwrap_or_else(|e| panic!("failed to decode {json}: {e}"))
        .into_bson()
}

fn native_roundtrip(value: &Bson) -> Bson {
    let doc = doc! { "v": value.clone() };
    Document::from_slice(&doc.to_vec().unwrap())
        .unwrap()
        .get("v")
        .cloned()
        .unwrap()
}

fn canon(s: &str) -> String {
    s.parse::<Decimal128>().unwrap().to_string()
}

// ============================================================================
// ObjectId
// ============================================================================

#[test]
fn object_id_hex_round_trip() {
    let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
    assert_eq!(oid.to_hex(), "507f1f77bcf86cd799439011");
    assert_eq!(oid.bytes()[0], 0x50);
    assert!(ObjectId::parse_str("507f1f77").is_err());
    assert!(ObjectId::parse_str("zz7f1f77bcf86cd799439011").is_err());
}

#[test]
fn generated_ids_differ_and_carry_the_time() {
    let before = Utc::now().timestamp();
    let a = ObjectId::new();
    let b = ObjectId::new();
    assert_ne!(a, b);
    assert_eq!(a.bytes()[4..9], b.bytes()[4..9]);
    let secs = a.timestamp().timestamp_millis() / 1000;
    assert!(secs >= before && secs <= before + 5);
}

// ============================================================================
// DateTime
// ============================================================================

#[test]
fn chrono_conversion_keeps_millis() {
    let dt = Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap();
    let ours = DateTime::from(dt);
    assert_eq!(ours.timestamp_millis(), dt.timestamp_millis());
    assert_eq!(ours.to_chrono(), Some(dt));
    assert_eq!(ours.to_string(), "2024-03-15T14:00:00.000Z");
}

#[test]
fn extreme_instants_display_as_raw_millis() {
    assert_eq!(DateTime::MAX.to_string(), format!("DateTime({})", i64::MAX));
    assert!(DateTime::MIN.to_chrono().is_none());
    assert_eq!(
        json_roundtrip(&Bson::DateTime(DateTime::MIN)),
        Bson::DateTime(DateTime::MIN)
    );
}

#[test]
fn rfc3339_parsing() {
    assert_eq!(
        DateTime::parse_rfc3339_str("1970-01-01T00:00:01Z").unwrap(),
        DateTime::from_millis(1000)
    );
    assert!(DateTime::parse_rfc3339_str("yesterday").is_err());
}

// ============================================================================
// Decimal128
// ============================================================================

#[test]
fn decimal_plain_notation() {
    assert_eq!(canon("0"), "0");
    assert_eq!(canon("-0"), "-0");
    assert_eq!(canon("1.50"), "1.50");
    assert_eq!(canon("-12.345"), "-12.345");
    assert_eq!(canon("0.001234"), "0.001234");
    assert_eq!(
        canon("123456789012345678901234567890.1234"),
        "123456789012345678901234567890.1234"
    );
}

#[test]
fn decimal_scientific_notation() {
    assert_eq!(canon("1E+3"), "1E+3");
    assert_eq!(canon("1.23e-10"), "1.23E-10");
    assert_eq!(canon("0.0000001"), "1E-7");
    assert_eq!(canon("1E6144"), "1E+6144");
}

#[test]
fn decimal_specials() {
    assert_eq!(canon("NaN"), "NaN");
    assert_eq!(canon("-infinity"), "-Infinity");
    assert_eq!(canon("Inf"), "Infinity");
    assert!(Decimal128::nan().is_nan());
    assert_eq!(Decimal128::infinity(true).to_string(), "-Infinity");
}

#[test]
fn decimal_known_bit_pattern() {
    let one: Decimal128 = "1".parse().unwrap();
    let mut expected = [0u8; 16];
    expected[0] = 1;
    expected[14] = 0x40;
    expected[15] = 0x30;
    assert_eq!(one.bytes(), expected);
}

#[test]
fn decimal_rejects_inexact_input() {
    assert!("12345678901234567890123456789012345".parse::<Decimal128>().is_err());
    assert!("1.2.3".parse::<Decimal128>().is_err());
    assert!("".parse::<Decimal128>().is_err());
    assert!("1E-6200".parse::<Decimal128>().is_err());
}

#[test]
fn decimal_oversized_zero_exponent_is_clamped() {
    assert_eq!(canon("0E+9999"), "0E+6111");
}

fn nan_with(last: u8) -> Decimal128 {
    let mut bytes = Decimal128::nan().bytes();
    bytes[15] = last;
    Decimal128::from_bytes(bytes)
}

#[test]
fn non_canonical_decimals_keep_their_bytes_through_json() {
    let mut oversized = [0xff; 16];
    oversized[14] = 0x41;
    oversized[15] = 0x30;
    let patterns = [
        nan_with(0xfc),
        nan_with(0x7e),
        Decimal128::from_bytes(oversized),
        {
            let mut payload = Decimal128::nan().bytes();
            payload[0] = 7;
            Decimal128::from_bytes(payload)
        },
    ];
    for decimal in patterns {
        assert!(!decimal.is_canonical(), "{decimal:?}");
        let json = serde_json::to_string(&decimal).unwrap();
        assert!(json.contains("$numberDecimalBytes"), "{json}");
        let back: Decimal128 = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bytes(), decimal.bytes(), "{json}");

        let value = Bson::Decimal128(decimal);
        assert_eq!(json_roundtrip(&value), value);
    }
}

#[test]
fn non_canonical_decimal_hex_is_in_wire_order() {
    let decimal = nan_with(0xfc);
    let json = serde_json::to_string(&decimal).unwrap();
    assert_eq!(
        json,
        r#"{"$numberDecimalBytes":"000000000000000000000000000000fc"}"#
    );
}

#[test]
fn canonical_decimals_keep_the_text_shape() {
    for text in ["1.5", "-0", "NaN", "-Infinity", "1E+6144"] {
        let decimal: Decimal128 = text.parse().unwrap();
        assert!(decimal.is_canonical(), "{text}");
        assert_eq!(
            serde_json::to_string(&decimal).unwrap(),
            format!(r#"{{"$numberDecimal":"{text}"}}"#)
        );
    }
}

#[test]
fn malformed_decimal_hex_is_not_a_decimal() {
    for hex in ["00", "+0000000000000000000000000000000", "zz000000000000000000000000000000"] {
        let json = format!(r#"{{"$numberDecimalBytes":"{hex}"}}"#);
        let value = serde_json::from_str::<Element<'static>>(&json)
            .unwrap()
            .into_bson();
        assert_eq!(value.element_type(), ElementType::EmbeddedDocument, "{json}");
    }
}

// ============================================================================
// Regex
// ============================================================================

#[test]
fn regex_options_are_sorted() {
    let re = Regex::new("^a", "xmi");
    assert_eq!(re.pattern(), "^a");
    assert_eq!(re.options(), "imx");
}

#[test]
fn regex_options_stay_sorted_through_both_backends() {
    let value = Bson::RegularExpression(Regex::new("a", "xi"));
    assert_eq!(json_roundtrip(&value), value);
    assert_eq!(native_roundtrip(&value), value);
    match native_roundtrip(&value) {
        Bson::RegularExpression(re) => assert_eq!(re.options(), "ix"),
        other => panic!("expected a regex, got {other:?}"),
    }
}

#[test]
fn unsorted_regex_input_is_normalized() {
    let json = r#"{"$regularExpression":{"pattern":"a","options":"xi"}}"#;
    let re: Regex = serde_json::from_str(json).unwrap();
    assert_eq!(re.options(), "ix");
    assert_eq!(re, Regex::new("a", "ix"));
}

// ============================================================================
// Binary and wire tags
// ============================================================================

#[test]
fn legacy_binary_shape_with_user_subtype() {
    let json = r#"{"$binary":"AQID","$type":"80"}"#;
    let binary: Binary = serde_json::from_str(json).unwrap();
    assert_eq!(binary.bytes, [1, 2, 3]);
    assert_eq!(binary.subtype, BinarySubtype::UserDefined(0x80));
}

#[test]
fn binary_shape_with_extra_keys_is_a_document() {
    let json = r#"{"$binary":{"base64":"AQID","subType":"00","extra":true}}"#;
    let value = serde_json::from_str::<Element<'static>>(json)
        .unwrap()
        .into_bson();
    assert_eq!(value.element_type(), ElementType::EmbeddedDocument);
}

#[test]
fn binary_subtype_must_be_hex() {
    let json = r#"{"$binary":"AQID","$type":"+1"}"#;
    let value = serde_json::from_str::<Element<'static>>(json)
        .unwrap()
        .into_bson();
    assert_eq!(value.element_type(), ElementType::EmbeddedDocument);
}

#[test]
fn unsupported_tags_are_rejected() {
    for tag in [0x00, 0x06, 0x0C, 0x0D, 0x0E, 0x11, 0x14] {
        assert!(matches!(
            ElementType::try_from(tag),
            Err(BsonError::UnsupportedElementType(t)) if t == tag
        ));
    }
}

#[test]
fn subtype_bytes_survive_conversion() {
    for byte in 0u8..=255 {
        assert_eq!(u8::from(BinarySubtype::from(byte)), byte);
    }
}

// ============================================================================
// Bson
// ============================================================================

#[test]
fn element_types_follow_the_variant() {
    assert_eq!(Bson::from(1i32).element_type(), ElementType::Int32);
    assert_eq!(Bson::from(1u32).element_type(), ElementType::Int64);
    assert_eq!(Bson::from("x").element_type(), ElementType::String);
    assert_eq!(Bson::MaxKey.element_type(), ElementType::MaxKey);
    assert_eq!(
        Bson::from(vec![Bson::from(1.5)]).element_type(),
        ElementType::Array
    );
}

#[test]
fn accessors_are_kind_strict() {
    let v = Bson::Int64(5);
    assert_eq!(v.as_i64(), Some(5));
    assert_eq!(v.as_i32(), None);
    assert_eq!(v.as_f64(), None);
}
