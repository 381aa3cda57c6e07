//! Collaborator interfaces for byte-level I/O
//!
//! The flatten / join / project core only ever sees in-memory values. Reading
//! source bytes, persisting the final table and registering it in a catalog
//! go through the traits below, so the core runs the same against local
//! files, in-memory fakes, or a remote store.

pub mod fs;
pub mod memory;
pub mod parse;

use crate::project::OutputField;
use crate::types::RecordSet;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use fs::{FsCatalog, FsSourceReader, JsonLinesSink, JsonLinesWriter};
pub use memory::{MemoryCatalog, MemorySink, MemorySource};
pub use parse::decode_documents;

/// Fetches the raw bytes of a JSON document (or document list)
pub trait SourceReader: Send + Sync {
    fn fetch(&self, source_id: &str) -> Result<Vec<u8>>;
}

/// Receipt for a stored record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub destination: String,
    pub rows_written: usize,
}

/// Persists a finalized record set; owns the serialization format
pub trait SinkWriter: Send + Sync {
    fn store(&self, records: &RecordSet, destination: &str) -> Result<Acknowledgement>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

/// A column as the catalog sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Records the final table schema. Registering an existing table is not an error.
pub trait CatalogRegistrar: Send + Sync {
    fn register_schema(&self, table: &str, fields: &[OutputField]) -> Result<RegisterOutcome>;
}

pub fn catalog_columns(fields: &[OutputField]) -> Vec<CatalogColumn> {
    fields
        .iter()
        .map(|field| CatalogColumn {
            name: field.alias.clone(),
            column_type: field.field_type.catalog_name().to_string(),
        })
        .collect()
}
