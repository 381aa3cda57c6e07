//! In-memory collaborators, for tests and embedding

use crate::io::{
    catalog_columns, Acknowledgement, CatalogColumn, CatalogRegistrar, RegisterOutcome, SinkWriter,
    SourceReader,
};
use crate::project::OutputField;
use crate::types::RecordSet;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemorySource {
    documents: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn insert(&mut self, source_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.documents.insert(source_id.into(), bytes.into());
    }

    pub fn with_json(mut self, source_id: impl Into<String>, document: &Value) -> Self {
        self.insert(source_id, document.to_string());
        self
    }
}

impl SourceReader for MemorySource {
    fn fetch(&self, source_id: &str) -> Result<Vec<u8>> {
        self.documents
            .get(source_id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown source: {}", source_id))
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<HashMap<String, RecordSet>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn get(&self, destination: &str) -> Option<RecordSet> {
        self.stored.lock().ok()?.get(destination).cloned()
    }
}

impl SinkWriter for MemorySink {
    fn store(&self, records: &RecordSet, destination: &str) -> Result<Acknowledgement> {
        let mut stored = self.stored.lock().map_err(|_| anyhow!("Sink lock poisoned"))?;
        stored.insert(destination.to_string(), records.clone());
        Ok(Acknowledgement {
            destination: destination.to_string(),
            rows_written: records.len(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Mutex<HashMap<String, Vec<CatalogColumn>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog::default()
    }

    pub fn columns(&self, table: &str) -> Option<Vec<CatalogColumn>> {
        self.tables.lock().ok()?.get(table).cloned()
    }
}

impl CatalogRegistrar for MemoryCatalog {
    fn register_schema(&self, table: &str, fields: &[OutputField]) -> Result<RegisterOutcome> {
        let mut tables = self.tables.lock().map_err(|_| anyhow!("Catalog lock poisoned"))?;
        if tables.contains_key(table) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        tables.insert(table.to_string(), catalog_columns(fields));
        Ok(RegisterOutcome::Created)
    }
}
