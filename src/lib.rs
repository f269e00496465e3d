//! Content-schema language: parse `.rengbis` schema text, resolve imports
//! into scopes, and validate decoded data against the resulting tree.
//!
//! Pipeline: text → [`parse_document`] → [`Document`] → [`SchemaLoader`]
//! (follows imports, rewrites references into shared [`Schema::Link`]
//! slots) → [`ResolvedSchema`] → [`validate`] against a [`Value`] produced
//! by a format [`Decoder`].
//!
//! Design goals:
//! - Schema variants are a closed sum type; parser, resolver and validator
//!   dispatch exhaustively, so a new variant is a compile-checked change.
//! - References resolve to shared table slots, never inlined copies, so
//!   recursive definitions form a graph and everything terminates.
//! - Validation never fails fast: every violation is reported with the
//!   structural path where it occurred.
//! - All outputs are immutable after construction; parse, resolve and
//!   validate calls can run on independent threads without coordination.
//!
//! ```
//! use rengbis::{parse, validate_standalone, JsonDecoder, Decoder};
//!
//! let schema = parse("= { name: text, age: number }").unwrap();
//! let value = JsonDecoder.decode(r#"{"name":"Ada","age":36}"#).unwrap();
//! assert!(validate_standalone(&value, &schema).is_valid());
//! ```

pub mod parser;
pub mod resolver;
pub mod schema;
pub mod validator;
pub mod value;

pub use parser::{parse, parse_document, ParseError};
pub use resolver::{LoadError, ResolvedSchema, SchemaLoader};
pub use schema::{
    BinaryConstraints, Bound, CompiledRegex, DefId, Document, FieldLabel, ListConstraints,
    NumericConstraints, ObjectField, Schema, TextConstraints, TimeBound, TimeConstraints,
    UniqueKey,
};
pub use validator::{
    validate, validate_standalone, validate_text, Path, PathSegment, ValidationError,
    ValidationResult, Violation,
};
pub use value::{DecodeError, Decoder, JsonDecoder, Value};
