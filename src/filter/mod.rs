//! Metadata filter predicates
//!
//! - `predicate`: the [`FilterPredicate`] tree, validation and local evaluation
//! - `parser`: textual grammar and free-text clause extraction
//! - `schema`: the known metadata fields

pub mod parser;
pub mod predicate;
pub mod schema;

pub use parser::{parse_llm_reply, FilterParser};
pub use predicate::{CompareOp, CompiledPredicate, FilterPredicate};
pub use schema::{FieldKind, FieldSpec, MetadataSchema, TEXT_FIELD};
