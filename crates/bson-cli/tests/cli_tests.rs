//! Integration tests for the `bson` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to exercise the encode, decode,
//! and inspect subcommands through the actual binary, including stdin/stdout
//! piping, file I/O, error handling, and roundtrip correctness.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: path to the sample.json fixture.
fn sample_json_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sample.json")
}

/// Helper: read the sample.json fixture as a string.
fn sample_json() -> String {
    std::fs::read_to_string(sample_json_path()).expect("sample.json fixture must exist")
}

/// Helper: encode JSON text and return the native bytes.
fn encode(json: &str) -> Vec<u8> {
    let output = Command::cargo_bin("bson")
        .unwrap()
        .arg("encode")
        .write_stdin(json)
        .output()
        .expect("encode should run");
    assert!(output.status.success(), "encode failed: {output:?}");
    output.stdout
}

/// Helper: a unique temp path per test so parallel runs don't collide.
fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("bson-cli-test-{}-{name}", std::process::id()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encode subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn encode_stdin_to_stdout() {
    // {"a": 1} is 12 bytes on the wire
    let bytes = encode(r#"{"a":1}"#);
    assert_eq!(bytes, [0x0c, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]);
}

#[test]
fn encode_file_to_file() {
    let output_path = temp_path("encode.bson");
    let _ = std::fs::remove_file(&output_path);

    Command::cargo_bin("bson")
        .unwrap()
        .args(["encode", "-i", sample_json_path(), "-o"])
        .arg(&output_path)
        .assert()
        .success();

    let content = std::fs::read(&output_path).expect("output file must exist");
    let declared = i32::from_le_bytes([content[0], content[1], content[2], content[3]]);
    assert_eq!(declared as usize, content.len());

    let _ = std::fs::remove_file(&output_path);
}

#[test]
fn encode_invalid_json_fails() {
    Command::cargo_bin("bson")
        .unwrap()
        .arg("encode")
        .write_stdin("this is not valid json {{{")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse Extended JSON document"));
}

#[test]
fn encode_top_level_array_fails() {
    Command::cargo_bin("bson")
        .unwrap()
        .arg("encode")
        .write_stdin("[1, 2, 3]")
        .assert()
        .failure();
}

#[test]
fn encode_respects_max_depth() {
    Command::cargo_bin("bson")
        .unwrap()
        .args(["--max-depth", "2", "encode"])
        .write_stdin(r#"{"a":{"b":{"c":1}}}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum nesting depth"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Decode subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn decode_stdin_to_stdout() {
    let bytes = encode(r#"{"name":"Alice","age":30,"big":{"$numberLong":"5"}}"#);

    Command::cargo_bin("bson")
        .unwrap()
        .arg("decode")
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout(predicate::str::diff(
            r#"{"name":"Alice","age":30,"big":{"$numberLong":"5"}}"#.to_string() + "\n",
        ));
}

#[test]
fn decode_pretty() {
    let bytes = encode(r#"{"a":1}"#);

    Command::cargo_bin("bson")
        .unwrap()
        .args(["decode", "--pretty"])
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout(predicate::str::diff("{\n  \"a\": 1\n}\n"));
}

#[test]
fn decode_file_to_file() {
    let bson_path = temp_path("decode-input.bson");
    let json_path = temp_path("decode-output.json");
    let _ = std::fs::remove_file(&bson_path);
    let _ = std::fs::remove_file(&json_path);

    Command::cargo_bin("bson")
        .unwrap()
        .args(["encode", "-i", sample_json_path(), "-o"])
        .arg(&bson_path)
        .assert()
        .success();

    Command::cargo_bin("bson")
        .unwrap()
        .args(["decode", "-i"])
        .arg(&bson_path)
        .arg("-o")
        .arg(&json_path)
        .assert()
        .success();

    let content = std::fs::read_to_string(&json_path).expect("output JSON file must exist");
    assert!(content.contains("Alice"), "Decoded JSON should contain 'Alice'");
    assert!(content.contains("Portland"), "Decoded JSON should contain 'Portland'");
    assert!(
        content.contains(r#""$oid":"507f1f77bcf86cd799439011""#),
        "Decoded JSON should keep the ObjectId shape"
    );

    let _ = std::fs::remove_file(&bson_path);
    let _ = std::fs::remove_file(&json_path);
}

#[test]
fn decode_truncated_input_fails() {
    let bytes = encode(r#"{"name":"Alice"}"#);

    Command::cargo_bin("bson")
        .unwrap()
        .arg("decode")
        .write_stdin(&bytes[..bytes.len() - 2])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode BSON"));
}

#[test]
fn decode_missing_file_fails() {
    Command::cargo_bin("bson")
        .unwrap()
        .args(["decode", "-i", "/nonexistent/input.bson"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Inspect subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn inspect_lists_types_in_order() {
    let bytes = encode(&sample_json());

    let output = Command::cargo_bin("bson")
        .unwrap()
        .arg("inspect")
        .write_stdin(bytes)
        .output()
        .expect("inspect should run");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let kinds: Vec<&str> = stdout
        .lines()
        .skip(1)
        .map(|line| line.trim().split(' ').nth(1).unwrap_or(""))
        .collect();
    assert_eq!(
        kinds,
        ["objectId", "string", "int", "long", "double", "date", "document", "array", "null"]
    );
    assert!(stdout.starts_with(&format!("{} bytes, 9 keys", encode(&sample_json()).len())));
}

#[test]
fn inspect_reports_element_sizes() {
    // type byte + "a\0" + int32
    let bytes = encode(r#"{"a":1}"#);

    Command::cargo_bin("bson")
        .unwrap()
        .arg("inspect")
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout(predicate::str::contains("a: int (7 bytes)"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Roundtrip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_encode_decode_pipeline() {
    let input: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
    let bytes = encode(&sample_json());

    let decode_output = Command::cargo_bin("bson")
        .unwrap()
        .arg("decode")
        .write_stdin(bytes)
        .output()
        .expect("decode should run");
    assert!(decode_output.status.success());

    let output: serde_json::Value =
        serde_json::from_slice(&decode_output.stdout).expect("decode output must be JSON");
    assert_eq!(input, output);
}

#[test]
fn no_subcommand_shows_usage() {
    Command::cargo_bin("bson")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
