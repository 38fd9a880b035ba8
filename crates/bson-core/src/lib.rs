//! # bson-core
//!
//! A BSON document model with a type-erased bridge into `serde`.
//!
//! Documents are ordered maps from string keys to optional [`Bson`] values.
//! Every value can cross any serde backend through the [`Element`] wrapper:
//! native backends move wire bytes around untouched, while tag-free backends
//! such as `serde_json` see canonical Extended JSON and get the concrete kind
//! back by ordered trial decoding ([`TRIAL_ORDER`]).
//!
//! ## Quick start
//!
//! ```rust
//! use bson_core::{doc, Bson, Document};
//!
//! let doc = doc! { "n": 1, "pi": 3.0, "gone": null, "big": 1i64 << 40 };
//!
//! // Native bytes
//! let bytes = doc.to_vec().unwrap();
//! assert_eq!(Document::from_slice(&bytes).unwrap(), doc);
//!
//! // Through serde_json, with every kind preserved
//! let json = serde_json::to_string(&doc).unwrap();
//! assert_eq!(json, r#"{"n":1,"pi":3.0,"gone":null,"big":{"$numberLong":"1099511627776"}}"#);
//! let back: Document = serde_json::from_str(&json).unwrap();
//! assert_eq!(back, doc);
//! assert_eq!(back.get("pi"), Some(&Bson::Double(3.0)));
//! ```
//!
//! ## Modules
//!
//! - [`bson`]: the closed value set and the Binary, Regex and code-with-scope kinds
//! - [`document`]: ordered documents, `doc!`, and their serde bridge
//! - [`element`]: the type-erased wrapper, backend detection, trial order
//! - [`ser`] / [`de`]: the native binary serializer and deserializer
//! - [`concern`]: read and write concern options
//! - [`error`]: error types

pub mod bson;
pub mod concern;
pub mod datetime;
pub mod de;
pub mod decimal128;
pub mod document;
pub mod element;
pub mod error;
pub mod oid;
pub mod options;
pub mod ser;
pub mod types;

mod raw;
mod slot;
mod variant;

pub use crate::bson::{Array, Binary, Bson, JavaScriptCodeWithScope, Regex};
pub use concern::{ReadConcern, ReadConcernLevel, WriteConcern, W};
pub use datetime::DateTime;
pub use de::{from_document, from_slice, from_slice_with_options};
pub use decimal128::Decimal128;
pub use document::{Document, DocumentSeed};
pub use element::{Backend, Candidate, Element, ElementSeed, TRIAL_ORDER};
pub use error::{BsonError, Result};
pub use oid::ObjectId;
pub use options::{CodecOptions, DEFAULT_MAX_DEPTH};
pub use ser::{to_document, to_vec, to_vec_with_options};
pub use types::{BinarySubtype, ElementType};
