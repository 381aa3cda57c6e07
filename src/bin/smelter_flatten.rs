//! smelter-flatten: Flatten one nested JSON source into JSON Lines rows
//!
//! Usage:
//!   # Flatten a file, one row per order item
//!   smelter-flatten orders.json --explode 'orders[].items'
//!
//!   # Read from stdin, keep orders with no items as a null row
//!   cat orders.json | smelter-flatten --explode 'orders[].items' --empty-list null-row
//!
//!   # Pre-split records (top-level array or NDJSON), nothing exploded
//!   smelter-flatten users.jsonl

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelter::flatten::{EmptyListPolicy, ExplosionSpec, Flattener};
use smelter::io::{decode_documents, JsonLinesWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "smelter-flatten")]
#[command(about = "Flatten nested JSON into dot-path keyed rows", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// List to explode into rows, e.g. `orders[].items`
    #[arg(long)]
    explode: Option<String>,

    /// What a record with an empty target list becomes
    #[arg(long, default_value = "drop")]
    empty_list: EmptyListPolicy,

    /// Keep the list path as a prefix on exploded element fields
    #[arg(long)]
    prefix_elements: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut content = Vec::new();
    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open file: {}", path))?,
        )),
        None => Box::new(std::io::stdin()),
    };
    BufReader::new(reader).read_to_end(&mut content)?;

    let documents = decode_documents(&content)?;

    let name = args
        .input
        .as_deref()
        .and_then(|path| Path::new(path).file_stem())
        .and_then(|stem| stem.to_str())
        .unwrap_or("stdin");
    let mut flattener = Flattener::new(name);
    if let Some(path) = &args.explode {
        let spec = ExplosionSpec::parse(path)?
            .with_empty_list(args.empty_list)
            .with_prefix_elements(args.prefix_elements);
        flattener = flattener.with_explosion(spec);
    }

    let records = flattener.flatten_all(&documents)?;

    let mut writer = JsonLinesWriter::new(BufWriter::new(std::io::stdout().lock()));
    writer.write_records(&records)?;
    writer.flush()?;

    Ok(())
}
