//! Pipeline orchestration
//!
//! Flattens each configured source (concurrently when allowed), folds the
//! join steps left to right, projects the result, then hands it to the sink
//! and the catalog.

pub mod config;
pub mod orchestrator;

pub use config::{JoinStep, OutputConfig, PipelineConfig, SourceConfig};
pub use orchestrator::{Pipeline, RunOutcome, RunStatus, StageFailure};
