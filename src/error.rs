//! Error taxonomy for the flatten / join / project stages.
//!
//! Structural problems (bad document shape, unknown key or mapping field)
//! abort a run. Per-row data-quality problems are not errors at all: they
//! land in a [`crate::report::RunReport`] instead, except for coercion
//! failures under strict mode.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The document is not an object or a list of objects
    #[error("malformed input in '{source_name}': {detail}")]
    MalformedInput { source_name: String, detail: String },

    /// A list was found at a path that was not declared for explosion
    #[error("unsupported shape in '{source_name}' at '{path}': {detail}")]
    UnsupportedShape {
        source_name: String,
        path: String,
        detail: String,
    },

    /// The same path is a container in one record and a scalar in another
    #[error("type conflict in '{source_name}': '{path}' is a scalar in some records and a nested structure in others")]
    TypeConflict { source_name: String, path: String },

    /// An exploded element field lands on a path a sibling already owns
    #[error("field '{path}' in '{source_name}' is produced by both an exploded element and its parent")]
    DuplicateField { source_name: String, path: String },

    #[error("invalid explosion path '{path}': {detail}")]
    InvalidExplosionPath { path: String, detail: String },

    #[error("join key path '{path}' not found in '{record_set}'")]
    KeyPathNotFound { record_set: String, path: String },

    #[error("output field '{alias}' references unknown source field '{path}'")]
    UnknownSourceField { alias: String, path: String },

    #[error("invalid source expression '{expression}': {detail}")]
    InvalidExpression { expression: String, detail: String },

    #[error("output alias '{alias}' is declared more than once")]
    DuplicateAlias { alias: String },

    /// Only raised in strict mode; otherwise recorded per row
    #[error("row {row}: cannot coerce value '{value}' of '{alias}' to {target}")]
    CoercionFailure {
        row: usize,
        alias: String,
        value: String,
        target: String,
    },
}
