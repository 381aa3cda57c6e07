use crate::io::{decode_documents, CatalogRegistrar, RegisterOutcome, SinkWriter, SourceReader};
use crate::pipeline::config::{PipelineConfig, SourceConfig};
use crate::project::Projector;
use crate::report::{IssueKind, RunReport, Stage};
use crate::types::RecordSet;
use anyhow::{anyhow, Context};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// A fatal error, tagged with the stage that raised it
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl StageFailure {
    fn new(stage: Stage, error: impl Into<anyhow::Error>) -> Self {
        StageFailure {
            stage,
            error: error.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {:#}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed { stage: Stage, message: String },
}

/// What a run reports back: pass/fail plus every recorded row-level issue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    #[serde(flatten)]
    pub status: RunStatus,
    pub rows_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<RegisterOutcome>,
    pub report: RunReport,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// Sequences flatten, join and project for one configured run. Byte-level
/// I/O is delegated to the collaborators it is constructed with.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    reader: &'a dyn SourceReader,
    sink: &'a dyn SinkWriter,
    catalog: &'a dyn CatalogRegistrar,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        reader: &'a dyn SourceReader,
        sink: &'a dyn SinkWriter,
        catalog: &'a dyn CatalogRegistrar,
    ) -> Self {
        Pipeline {
            config,
            reader,
            sink,
            catalog,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute the whole run. Never panics on bad input; failures come back
    /// as a `Failed` status alongside whatever the report collected so far.
    pub fn run(&self) -> RunOutcome {
        let mut report = RunReport::new();

        let result = self
            .transform(&mut report)
            .and_then(|records| self.publish(&records));

        match result {
            Ok((rows_written, catalog)) => {
                info!(rows_written, issues = report.len(), "run passed");
                RunOutcome {
                    status: RunStatus::Passed,
                    rows_written,
                    catalog: Some(catalog),
                    report,
                }
            }
            Err(failure) => {
                warn!(stage = %failure.stage, "run failed: {:#}", failure.error);
                RunOutcome {
                    status: RunStatus::Failed {
                        stage: failure.stage,
                        message: format!("{:#}", failure.error),
                    },
                    rows_written: 0,
                    catalog: None,
                    report,
                }
            }
        }
    }

    /// Read, flatten, join and project, without writing anything
    pub fn transform(&self, report: &mut RunReport) -> Result<RecordSet, StageFailure> {
        let sets = self.load_sources(report)?;
        let joined = self.join_chain(&sets, report)?;

        let projector = Projector::new(self.config.mapping.clone())
            .with_strict(self.config.strict)
            .with_name(self.config.output.table.clone());
        projector
            .validate(&joined)
            .map_err(|e| StageFailure::new(Stage::Project, e))?;
        let projected = projector
            .project(&joined, report)
            .map_err(|e| StageFailure::new(Stage::Project, e))?;

        info!(
            rows = projected.len(),
            fields = projected.schema().len(),
            "projection finished"
        );
        Ok(projected)
    }

    fn load_sources(&self, report: &mut RunReport) -> Result<HashMap<String, RecordSet>, StageFailure> {
        let sources = self.config.referenced_sources();

        let loaded: Vec<(RecordSet, RunReport)> = if self.config.parallel {
            sources
                .par_iter()
                .map(|source| self.load_source(source))
                .collect::<Result<_, _>>()?
        } else {
            sources
                .iter()
                .map(|source| self.load_source(source))
                .collect::<Result<_, _>>()?
        };

        // Declaration order, however the sources were loaded
        let mut sets = HashMap::with_capacity(loaded.len());
        for (set, source_report) in loaded {
            report.merge(source_report);
            sets.insert(set.name().to_string(), set);
        }
        Ok(sets)
    }

    fn load_source(&self, source: &SourceConfig) -> Result<(RecordSet, RunReport), StageFailure> {
        let bytes = self
            .reader
            .fetch(&source.source_id)
            .with_context(|| format!("Failed to fetch source '{}'", source.name))
            .map_err(|e| StageFailure::new(Stage::Read, e))?;
        let documents = decode_documents(&bytes)
            .with_context(|| format!("Failed to decode source '{}'", source.name))
            .map_err(|e| StageFailure::new(Stage::Read, e))?;

        let mut report = RunReport::new();
        let set = source
            .flattener()
            .and_then(|flattener| flattener.flatten_with_report(&documents, &mut report))
            .map_err(|e| StageFailure::new(Stage::Flatten, e))?;

        info!(
            source = %source.name,
            documents = documents.len(),
            rows = set.len(),
            fields = set.schema().len(),
            dropped = report.count(IssueKind::EmptyExplosion),
            "source flattened"
        );
        Ok((set, report))
    }

    fn join_chain(
        &self,
        sets: &HashMap<String, RecordSet>,
        report: &mut RunReport,
    ) -> Result<RecordSet, StageFailure> {
        let lookup = |name: &str| {
            sets.get(name).ok_or_else(|| {
                StageFailure::new(Stage::Join, anyhow!("Source '{}' was not loaded", name))
            })
        };

        let mut current = lookup(self.config.base.as_str())?.clone();
        for step in &self.config.joins {
            let right = lookup(step.source.as_str())?;
            debug!(left = current.name(), right = right.name(), "joining");
            current = step
                .joiner()
                .join(&current, right, report)
                .map_err(|e| StageFailure::new(Stage::Join, e))?;
        }
        Ok(current)
    }

    fn publish(&self, records: &RecordSet) -> Result<(usize, RegisterOutcome), StageFailure> {
        let output = &self.config.output;

        let ack = self
            .sink
            .store(records, &output.destination)
            .map_err(|e| StageFailure::new(Stage::Write, e))?;
        info!(destination = %ack.destination, rows = ack.rows_written, "output stored");

        let outcome = self
            .catalog
            .register_schema(&output.table, self.config.mapping.fields())
            .map_err(|e| StageFailure::new(Stage::Register, e))?;
        info!(table = %output.table, ?outcome, "catalog updated");

        Ok((ack.rows_written, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryCatalog, MemorySink, MemorySource};
    use crate::types::Scalar;
    use serde_json::json;

    fn config(value: serde_json::Value) -> PipelineConfig {
        PipelineConfig::from_json(&value.to_string()).unwrap()
    }

    #[test]
    fn test_single_source_run() {
        let source = MemorySource::new().with_json(
            "users.json",
            &json!({"users": [{"user_id": "u1", "contact": {"email": "a@example.com"}}]}),
        );
        let sink = MemorySink::new();
        let catalog = MemoryCatalog::new();
        let config = config(json!({
            "sources": [{"name": "users", "source_id": "users.json", "explode": "users[]"}],
            "base": "users",
            "mapping": [{"alias": "email", "source": "contact.email"}],
            "output": {"destination": "out", "table": "users_flat"}
        }));

        let outcome = Pipeline::new(config, &source, &sink, &catalog).run();

        assert!(outcome.passed());
        assert_eq!(outcome.rows_written, 1);
        assert_eq!(outcome.catalog, Some(RegisterOutcome::Created));
        let stored = sink.get("out").unwrap();
        assert_eq!(stored.rows()[0].get("email"), Some(&Scalar::from("a@example.com")));
    }

    #[test]
    fn test_missing_source_fails_in_read_stage() {
        let source = MemorySource::new();
        let sink = MemorySink::new();
        let catalog = MemoryCatalog::new();
        let config = config(json!({
            "sources": [{"name": "users", "source_id": "users.json"}],
            "base": "users",
            "mapping": [{"alias": "id", "source": "id"}],
            "output": {"destination": "out", "table": "t"}
        }));

        let outcome = Pipeline::new(config, &source, &sink, &catalog).run();

        assert!(matches!(outcome.status, RunStatus::Failed { stage: Stage::Read, .. }));
        assert!(sink.get("out").is_none());
        assert!(catalog.columns("t").is_none());
    }

    #[test]
    fn test_unknown_mapping_field_fails_before_writing() {
        let source = MemorySource::new().with_json("a.json", &json!([{"id": "1"}]));
        let sink = MemorySink::new();
        let catalog = MemoryCatalog::new();
        let config = config(json!({
            "sources": [{"name": "a", "source_id": "a.json"}],
            "base": "a",
            "mapping": [{"alias": "x", "source": "nope"}],
            "output": {"destination": "out", "table": "t"}
        }));

        let outcome = Pipeline::new(config, &source, &sink, &catalog).run();

        match outcome.status {
            RunStatus::Failed { stage, message } => {
                assert_eq!(stage, Stage::Project);
                assert!(message.contains("nope"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(sink.get("out").is_none());
    }

    #[test]
    fn test_sequential_and_parallel_runs_agree() {
        let source = MemorySource::new()
            .with_json("l.json", &json!([{"k": "a"}, {"k": "b"}]))
            .with_json("r.json", &json!([{"rk": "a", "v": "1"}]));
        let mapping = json!([{"alias": "k", "source": "k"}, {"alias": "v", "source": "v"}]);

        let mut results = Vec::new();
        for parallel in [true, false] {
            let sink = MemorySink::new();
            let catalog = MemoryCatalog::new();
            let config = config(json!({
                "sources": [
                    {"name": "l", "source_id": "l.json"},
                    {"name": "r", "source_id": "r.json"}
                ],
                "base": "l",
                "joins": [{"source": "r", "on": [["k", "rk"]]}],
                "mapping": mapping,
                "output": {"destination": "out", "table": "t"},
                "parallel": parallel
            }));
            let outcome = Pipeline::new(config, &source, &sink, &catalog).run();
            assert!(outcome.passed());
            assert_eq!(outcome.report.count(IssueKind::UnmatchedJoin), 1);
            results.push(sink.get("out").unwrap());
        }

        assert_eq!(results[0], results[1]);
    }
}
