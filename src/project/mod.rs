//! Projection of a joined record set into the final output schema

pub mod mapping;
pub mod projector;

pub use mapping::{FieldRef, FieldType, OutputField, SchemaMapping, Side, SourceExpr};
pub use projector::Projector;
