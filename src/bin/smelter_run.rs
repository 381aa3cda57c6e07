//! smelter-run: Execute a flatten / join / project pipeline from a config file
//!
//! Usage:
//!   # Read sources from ./data, write output and catalog entries under ./out
//!   smelter-run pipeline.json --input-dir ./data --output-dir ./out
//!
//!   # Abort on the first value that cannot be coerced
//!   RUST_LOG=debug smelter-run pipeline.json --strict
//!
//! The run outcome (status, rows written, recorded issues) is printed to
//! stdout as JSON. The exit code is non-zero when the run failed.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::Parser;
use smelter::io::{FsCatalog, FsSourceReader, JsonLinesSink};
use smelter::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smelter-run")]
#[command(about = "Flatten, join and project JSON sources into one table", long_about = None)]
struct Args {
    /// Pipeline config (JSON)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Directory source ids are resolved against
    #[arg(long, default_value = ".")]
    input_dir: PathBuf,

    /// Directory the output destination is resolved against
    #[arg(long, short = 'o', default_value = ".")]
    output_dir: PathBuf,

    /// Directory for catalog schema entries (defaults to <output-dir>/catalog)
    #[arg(long)]
    catalog_dir: Option<PathBuf>,

    /// Fail the run on coercion failures instead of nulling the value
    #[arg(long)]
    strict: bool,

    /// Flatten sources one at a time
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_file(&args.config)?;
    if args.strict {
        config.strict = true;
    }
    if args.sequential {
        config.parallel = false;
    }

    let catalog_dir = args
        .catalog_dir
        .unwrap_or_else(|| args.output_dir.join("catalog"));
    info!(
        config = %args.config.display(),
        sources = config.sources.len(),
        joins = config.joins.len(),
        "starting run"
    );

    let reader = FsSourceReader::new(&args.input_dir);
    let sink = JsonLinesSink::new(&args.output_dir);
    let catalog = FsCatalog::new(&catalog_dir);

    let outcome = Pipeline::new(config, &reader, &sink, &catalog).run();
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.passed() {
        std::process::exit(1);
    }
    Ok(())
}
