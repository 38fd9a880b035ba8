/// Tests for ordered documents: entry semantics, typed access, and the
/// serde bridge across both backends.
use bson_core::{
    doc, Binary, BinarySubtype, Bson, BsonError, CodecOptions, Document, DocumentSeed, ElementType,
    JavaScriptCodeWithScope, ObjectId,
};
use serde::de::DeserializeSeed;

fn json_roundtrip(doc: &Document) -> Document {
    let json = serde_json::to_string(doc).unwrap();
    serde_json::from_str(&json).unwrap_or_else(|e| panic!("failed to decode {json}: {e}"))
}

fn native_roundtrip(doc: &Document) -> Document {
    Document::from_slice(&doc.to_vec().unwrap()).unwrap()
}

// ============================================================================
// Entries
// ============================================================================

#[test]
fn null_differs_from_absent() {
    let doc = doc! { "present": null };
    assert_eq!(doc.get_entry("present"), Some(None));
    assert_eq!(doc.get_entry("absent"), None);
    assert_eq!(doc.get("present"), None);
    assert!(doc.contains_key("present"));
    assert!(!doc.contains_key("absent"));
    assert!(doc.is_null("present"));
    assert!(!doc.is_null("absent"));
}

#[test]
fn insertion_order_is_kept() {
    let doc = doc! { "z": 1, "a": 2, "m": 3 };
    assert_eq!(doc.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
    assert_eq!(native_roundtrip(&doc).keys().collect::<Vec<_>>(), ["z", "a", "m"]);
    assert_eq!(json_roundtrip(&doc).keys().collect::<Vec<_>>(), ["z", "a", "m"]);
    assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn duplicate_key_overwrites_in_place() {
    let mut doc = Document::new();
    doc.insert("a", 1);
    doc.insert("b", 2);
    assert_eq!(doc.insert("a", "again"), Some(Some(Bson::Int32(1))));
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(doc.get("a"), Some(&Bson::String("again".into())));
}

#[test]
fn duplicate_key_in_json_input_keeps_last_value_at_first_position() {
    let doc: Document = serde_json::from_str(r#"{"a":1,"b":2,"a":3}"#).unwrap();
    assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(doc.get_i32("a").unwrap(), 3);
}

#[test]
fn get_mut_edits_in_place() {
    let mut doc = doc! { "n": 1 };
    if let Some(Bson::Int32(n)) = doc.get_mut("n") {
        *n += 41;
    }
    assert_eq!(doc.get_i32("n").unwrap(), 42);
}

#[test]
fn reinsert_keeps_position() {
    let mut doc = doc! { "a": 1, "b": 2 };
    assert_eq!(doc.insert("a", "one"), Some(Some(Bson::Int32(1))));
    assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(doc.get_str("a").unwrap(), "one");
}

#[test]
fn remove_reports_null_entries() {
    let mut doc = doc! { "a": null };
    assert_eq!(doc.remove("a"), Some(None));
    assert_eq!(doc.remove("a"), None);
    assert!(doc.is_empty());
}

#[test]
fn remove_keeps_the_order_of_the_rest() {
    let mut doc = doc! { "a": 1, "b": 2, "c": 3 };
    doc.remove("a");
    assert_eq!(doc.keys().collect::<Vec<_>>(), ["b", "c"]);
    assert_eq!(doc, doc! { "b": 2, "c": 3 });
}

#[test]
fn equality_is_order_sensitive() {
    assert_ne!(doc! { "a": 1, "b": 2 }, doc! { "b": 2, "a": 1 });
    assert_eq!(doc! { "a": 1, "b": null }, doc! { "a": 1, "b": null });
}

#[test]
fn array_literals_keep_nulls() {
    let doc = doc! { "xs": [1, null, "two"] };
    assert_eq!(
        doc.get_array("xs").unwrap(),
        &vec![Some(Bson::Int32(1)), None, Some(Bson::String("two".into()))]
    );
}

#[test]
fn collects_from_pairs() {
    let doc: Document = vec![("a", Some(Bson::Int32(1))), ("b", None)]
        .into_iter()
        .collect();
    assert!(doc.is_null("b"));
    let keys: Vec<_> = doc.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["a", "b"]);
}

#[test]
fn iter_yields_nulls_as_none() {
    let doc = doc! { "a": 1, "b": null };
    let entries: Vec<_> = doc.iter().collect();
    assert_eq!(entries, [("a", Some(&Bson::Int32(1))), ("b", None)]);
}

// ============================================================================
// Typed access
// ============================================================================

#[test]
fn typed_getters() {
    let when = bson_core::DateTime::from_millis(10);
    let oid = bson_core::ObjectId::new();
    let doc = doc! {
        "s": "text",
        "i": 1,
        "l": 2i64,
        "f": 0.5,
        "b": true,
        "o": oid,
        "d": when,
        "sub": doc! { "x": 1 },
        "arr": [1, 2],
    };
    assert_eq!(doc.get_str("s").unwrap(), "text");
    assert_eq!(doc.get_i32("i").unwrap(), 1);
    assert_eq!(doc.get_i64("l").unwrap(), 2);
    assert_eq!(doc.get_f64("f").unwrap(), 0.5);
    assert!(doc.get_bool("b").unwrap());
    assert_eq!(doc.get_object_id("o").unwrap(), oid);
    assert_eq!(doc.get_datetime("d").unwrap(), when);
    assert_eq!(doc.get_document("sub").unwrap().get_i32("x").unwrap(), 1);
    assert_eq!(doc.get_array("arr").unwrap().len(), 2);
}

#[test]
fn typed_getter_errors_name_the_key() {
    let doc = doc! { "s": "text" };
    match doc.get_i32("s") {
        Err(BsonError::UnexpectedType { key, expected }) => {
            assert_eq!(key, "s");
            assert_eq!(expected, ElementType::Int32);
        }
        other => panic!("expected UnexpectedType, got {other:?}"),
    }
    assert!(matches!(doc.get_str("t"), Err(BsonError::KeyNotFound(k)) if k == "t"));
}

#[test]
fn typed_getters_treat_null_as_mistyped() {
    let doc = doc! { "n": 1, "gone": null };
    assert!(matches!(doc.get_i64("n"), Err(BsonError::UnexpectedType { .. })));
    assert!(matches!(doc.get_i32("gone"), Err(BsonError::UnexpectedType { .. })));
    assert!(doc.is_null("gone"));
}

// ============================================================================
// Native bytes
// ============================================================================

#[test]
fn empty_document_is_five_bytes() {
    assert_eq!(Document::new().to_vec().unwrap(), [5, 0, 0, 0, 0]);
}

#[test]
fn known_wire_layout() {
    // {"hello": "world"}
    let expected = [
        0x16, 0x00, 0x00, 0x00, 0x02, b'h', b'e', b'l', b'l', b'o', 0x00, 0x06, 0x00, 0x00, 0x00,
        b'w', b'o', b'r', b'l', b'd', 0x00, 0x00,
    ];
    assert_eq!(doc! { "hello": "world" }.to_vec().unwrap(), expected);
    assert_eq!(Document::from_slice(&expected).unwrap(), doc! { "hello": "world" });
}

#[test]
fn write_to_matches_to_vec() {
    let doc = doc! { "a": [1, null], "b": doc! {} };
    let mut out = Vec::new();
    doc.write_to(&mut out).unwrap();
    assert_eq!(out, doc.to_vec().unwrap());
}

#[test]
fn truncated_bytes_are_malformed() {
    let bytes = doc! { "a": "bcd" }.to_vec().unwrap();
    for cut in [0, 3, 4, bytes.len() - 1] {
        assert!(
            Document::from_slice(&bytes[..cut]).is_err(),
            "cut at {cut} should fail"
        );
    }
}

#[test]
fn frame_errors_carry_offsets() {
    assert!(matches!(
        Document::from_slice(&[9, 0, 0, 0, 0]),
        Err(BsonError::Malformed { offset: 0, .. })
    ));
    assert!(matches!(
        Document::from_slice(&[5, 0, 0, 0, 1]),
        Err(BsonError::Malformed { .. })
    ));
}

#[test]
fn reader_needs_the_whole_document() {
    let bytes = doc! { "k": "v" }.to_vec().unwrap();
    assert_eq!(Document::from_reader(&bytes[..]).unwrap(), doc! { "k": "v" });
    assert!(Document::from_reader(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn old_binary_keeps_its_inner_length_on_the_wire() {
    let doc = doc! { "b": Binary::new(BinarySubtype::BinaryOld, vec![0xAA, 0xBB]) };
    let expected = [
        19, 0, 0, 0, 0x05, b'b', 0x00, 6, 0, 0, 0, 2, 2, 0, 0, 0, 0xAA, 0xBB, 0x00,
    ];
    assert_eq!(doc.to_vec().unwrap(), expected);
    assert_eq!(native_roundtrip(&doc), doc);
}

#[test]
fn unsupported_wire_tag_is_reported() {
    // {"a": <symbol "x">}
    let bytes = [
        0x0e, 0x00, 0x00, 0x00, 0x0e, b'a', 0x00, 0x02, 0x00, 0x00, 0x00, b'x', 0x00, 0x00,
    ];
    assert!(matches!(
        Document::from_slice(&bytes),
        Err(BsonError::UnsupportedElementType(0x0e))
    ));
}

#[test]
fn nesting_limit_on_native_reads() {
    let deep = doc! { "a": doc! { "b": doc! { "c": 1 } } };
    let bytes = deep.to_vec().unwrap();
    assert!(Document::from_slice_with_options(&bytes, CodecOptions::new().max_depth(4)).is_ok());
    assert!(matches!(
        Document::from_slice_with_options(&bytes, CodecOptions::new().max_depth(2)),
        Err(BsonError::DepthExceeded(2))
    ));
}

#[test]
fn nesting_limit_on_native_writes() {
    let deep = doc! { "a": doc! { "b": doc! { "c": 1 } } };
    assert!(matches!(
        deep.to_vec_with_options(CodecOptions::new().max_depth(2)),
        Err(BsonError::DepthExceeded(2))
    ));
}

// ============================================================================
// Serde bridge
// ============================================================================

#[test]
fn json_shape_is_extended_json() {
    let doc = doc! {
        "n": 1,
        "l": 2i64,
        "gone": null,
        "list": [1.5, null],
    };
    assert_eq!(
        serde_json::to_string(&doc).unwrap(),
        r#"{"n":1,"l":{"$numberLong":"2"},"gone":null,"list":[1.5,null]}"#
    );
    assert_eq!(json_roundtrip(&doc), doc);
}

#[test]
fn display_is_extended_json() {
    assert_eq!(doc! { "a": true, "b": null }.to_string(), r#"{"a":true,"b":null}"#);
}

#[test]
fn json_value_input_is_accepted() {
    let value = serde_json::json!({"a": [1, {"b": "c"}], "d": null});
    let doc: Document = serde_json::from_value(value).unwrap();
    assert_eq!(doc, doc! { "a": [1, doc! { "b": "c" }], "d": null });
}

#[test]
fn non_map_input_is_rejected() {
    assert!(serde_json::from_str::<Document>("[1, 2]").is_err());
    assert!(serde_json::from_str::<Document>("3").is_err());
}

#[test]
fn seed_limits_generic_nesting() {
    let json = r#"{"a":{"b":{"c":1}}}"#;
    let seed = DocumentSeed::new(CodecOptions::new().max_depth(3));
    assert!(seed
        .deserialize(&mut serde_json::Deserializer::from_str(json))
        .is_ok());

    let seed = DocumentSeed::new(CodecOptions::new().max_depth(2));
    assert!(seed
        .deserialize(&mut serde_json::Deserializer::from_str(json))
        .is_err());
}

#[test]
fn nested_document_inside_struct_uses_native_bytes() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Envelope {
        id: i32,
        body: Document,
    }
    let env = Envelope {
        id: 9,
        body: doc! { "k": [1i64, null], "inner": doc! { "x": "y" } },
    };
    let bytes = bson_core::to_vec(&env).unwrap();
    let back: Envelope = bson_core::from_slice(&bytes).unwrap();
    assert_eq!(back, env);

    let json = serde_json::to_string(&env).unwrap();
    let back: Envelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back, env);
}

// ============================================================================
// Documents shaped like special kinds
// ============================================================================

/// Documents whose key set alone reads as a tagged kind.
fn shaped_documents() -> Vec<Document> {
    vec![
        doc! { "$oid": "507f1f77bcf86cd799439011" },
        doc! { "$numberLong": "5" },
        doc! { "$numberDouble": "NaN" },
        doc! { "$numberDecimal": "1.5" },
        doc! { "$numberDecimalBytes": "000000000000000000000000000000fc" },
        doc! { "$binary": doc! { "base64": "AQI=", "subType": "00" } },
        doc! { "$binary": "AQI=", "$type": "00" },
        doc! { "$type": "00", "$binary": "AQI=" },
        doc! { "$date": doc! { "$numberLong": "0" } },
        doc! { "$date": "1970-01-01T00:00:00Z" },
        doc! { "$date": 42 },
        doc! { "$regularExpression": doc! { "pattern": "a", "options": "" } },
        doc! { "$regex": "a", "$options": "i" },
        doc! { "$code": "f()", "$scope": doc! {} },
        doc! { "$minKey": 1 },
        doc! { "$maxKey": 1 },
        doc! { "$document": doc! { "a": 1 } },
        doc! { "$document": 5 },
    ]
}

#[test]
fn shaped_documents_stay_documents_through_json() {
    for inner in shaped_documents() {
        let outer = doc! { "x": inner.clone(), "list": [inner.clone(), null] };
        let back = json_roundtrip(&outer);
        assert_eq!(back, outer, "via {}", serde_json::to_string(&outer).unwrap());
        assert_eq!(back.get_document("x").unwrap(), &inner);
        assert_eq!(back, native_roundtrip(&outer));
    }
}

#[test]
fn shaped_top_level_documents_survive_json() {
    for doc in shaped_documents() {
        assert_eq!(json_roundtrip(&doc), doc);
        let value = Bson::Document(doc.clone());
        let json = serde_json::to_string(&value).unwrap();
        let back: Bson = serde_json::from_str(&json).unwrap();
        assert_eq!(back.element_type(), ElementType::EmbeddedDocument, "{json}");
        assert_eq!(back, value);
    }
}

#[test]
fn shaped_documents_are_wrapped_on_the_way_out() {
    let doc = doc! {
        "x": doc! { "$oid": "507f1f77bcf86cd799439011" },
        "n": doc! { "$numberLong": "5" },
    };
    assert_eq!(
        serde_json::to_string(&doc).unwrap(),
        r#"{"x":{"$document":{"$oid":"507f1f77bcf86cd799439011"}},"n":{"$document":{"$numberLong":"5"}}}"#
    );
    let back = json_roundtrip(&doc);
    assert!(back.get_document("x").is_ok());
    assert!(back.get_document("n").is_ok());
    assert_eq!(back, doc);
}

#[test]
fn real_special_kinds_are_not_wrapped() {
    let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
    let doc = doc! { "x": oid, "n": 5i64 };
    assert_eq!(
        serde_json::to_string(&doc).unwrap(),
        r#"{"x":{"$oid":"507f1f77bcf86cd799439011"},"n":{"$numberLong":"5"}}"#
    );
    assert_eq!(json_roundtrip(&doc), doc);
}

#[test]
fn shaped_scope_of_code_survives_json() {
    let code = JavaScriptCodeWithScope {
        code: "x".into(),
        scope: doc! { "$numberLong": "5" },
    };
    let doc = doc! { "js": code.clone() };
    let back = json_roundtrip(&doc);
    assert_eq!(back, doc);
    assert_eq!(back.get("js"), Some(&Bson::JavaScriptCodeWithScope(code)));
}

#[test]
fn shaped_keys_among_others_are_left_alone() {
    let doc = doc! { "$oid": "507f1f77bcf86cd799439011", "extra": 1 };
    assert_eq!(
        serde_json::to_string(&doc).unwrap(),
        r#"{"$oid":"507f1f77bcf86cd799439011","extra":1}"#
    );
    assert_eq!(json_roundtrip(&doc), doc);

    let doc: Document = serde_json::from_str(r#"{"$document":5,"b":1}"#).unwrap();
    assert_eq!(doc, doc! { "$document": 5, "b": 1 });
}

// ============================================================================
// Large documents
// ============================================================================

#[test]
fn large_documents_decode_in_order() {
    const KEYS: usize = 50_000;
    let doc: Document = (0..KEYS).map(|i| (format!("k{i}"), Bson::Int32(i as i32))).collect();
    assert_eq!(doc.len(), KEYS);

    for back in [native_roundtrip(&doc), json_roundtrip(&doc)] {
        assert_eq!(back.len(), KEYS);
        assert_eq!(back.keys().next(), Some("k0"));
        assert_eq!(back.keys().last(), Some("k49999"));
        assert_eq!(back.get_i32("k31337").unwrap(), 31337);
        assert_eq!(back, doc);
    }
}

#[test]
fn large_document_with_repeated_keys_overwrites() {
    let mut json = String::from("{");
    for i in 0..20_000 {
        json.push_str(&format!(r#""k{}":{i},"#, i % 1_000));
    }
    json.push_str(r#""end":true}"#);
    let doc: Document = serde_json::from_str(&json).unwrap();
    assert_eq!(doc.len(), 1_001);
    assert_eq!(doc.keys().next(), Some("k0"));
    assert_eq!(doc.get_i32("k0").unwrap(), 19_000);
    assert_eq!(doc.get_i32("k999").unwrap(), 19_999);
}

// ============================================================================
// Nesting limits on the generic path
// ============================================================================

fn nested(levels: usize) -> Document {
    let mut doc = doc! { "leaf": 1 };
    for _ in 1..levels {
        doc = doc! { "d": doc };
    }
    doc
}

#[test]
fn generic_encode_stops_at_the_default_limit() {
    let deep = nested(150);
    assert!(matches!(deep.to_vec(), Err(BsonError::DepthExceeded(100))));

    let err = serde_json::to_string(&deep).unwrap_err();
    assert!(err.to_string().contains("maximum nesting depth of 100"), "{err}");

    let err = serde_json::to_string(&Bson::Document(deep)).unwrap_err();
    assert!(err.to_string().contains("maximum nesting depth of 100"), "{err}");
}

#[test]
fn generic_and_native_limits_agree() {
    let at_limit = nested(100);
    assert!(at_limit.to_vec().is_ok());
    assert_eq!(json_roundtrip(&at_limit), at_limit);

    let over = nested(101);
    assert!(over.to_vec().is_err());
    assert!(serde_json::to_string(&over).is_err());
}

#[test]
fn generic_decode_reports_the_configured_limit() {
    let json = r#"{"a":{"b":{"c":1}}}"#;
    let seed = DocumentSeed::new(CodecOptions::new().max_depth(2));
    let err = seed
        .deserialize(&mut serde_json::Deserializer::from_str(json))
        .unwrap_err();
    assert!(err.to_string().contains("maximum nesting depth of 2"), "{err}");

    let over = format!("{}1{}", r#"{"d":"#.repeat(101), "}".repeat(101));
    let err = serde_json::from_str::<Document>(&over).unwrap_err();
    assert!(err.to_string().contains("maximum nesting depth of 100"), "{err}");
}
