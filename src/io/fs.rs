use crate::io::{
    catalog_columns, Acknowledgement, CatalogRegistrar, RegisterOutcome, SinkWriter, SourceReader,
};
use crate::project::OutputField;
use crate::types::RecordSet;
use anyhow::{Context, Result};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Writes finalized rows as JSON Lines, one object per row, columns in
/// schema order
pub struct JsonLinesWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesWriter { writer }
    }

    pub fn write_records(&mut self, records: &RecordSet) -> Result<usize> {
        for row in records.rows() {
            let json = serde_json::to_string(row).context("Failed to serialize record")?;
            writeln!(self.writer, "{}", json).context("Failed to write record")?;
        }
        Ok(records.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}

/// Reads sources from files under a root directory
#[derive(Debug, Clone)]
pub struct FsSourceReader {
    root: PathBuf,
}

impl FsSourceReader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FsSourceReader {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SourceReader for FsSourceReader {
    fn fetch(&self, source_id: &str) -> Result<Vec<u8>> {
        let path = self.root.join(source_id);
        std::fs::read(&path).with_context(|| format!("Failed to read source: {}", path.display()))
    }
}

/// Stores record sets as `.jsonl` files under a root directory
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    root: PathBuf,
}

impl JsonLinesSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        JsonLinesSink {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SinkWriter for JsonLinesSink {
    fn store(&self, records: &RecordSet, destination: &str) -> Result<Acknowledgement> {
        let path = self.root.join(destination);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }

        let file = File::create(&path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut writer = JsonLinesWriter::new(BufWriter::new(file));
        let rows_written = writer.write_records(records)?;
        writer.flush()?;

        Ok(Acknowledgement {
            destination: path.display().to_string(),
            rows_written,
        })
    }
}

/// Keeps one `<table>.schema.json` file per registered table
#[derive(Debug, Clone)]
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FsCatalog {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{}.schema.json", table))
    }
}

impl CatalogRegistrar for FsCatalog {
    fn register_schema(&self, table: &str, fields: &[OutputField]) -> Result<RegisterOutcome> {
        std::fs::create_dir_all(&self.root).context("Failed to create catalog directory")?;

        let path = self.schema_path(table);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(RegisterOutcome::AlreadyExists),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create catalog entry: {}", path.display()))
            }
        };

        let entry = json!({
            "table": table,
            "columns": catalog_columns(fields),
        });
        serde_json::to_writer_pretty(BufWriter::new(file), &entry)
            .context("Failed to write catalog entry")?;

        Ok(RegisterOutcome::Created)
    }
}
