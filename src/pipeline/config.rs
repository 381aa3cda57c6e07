//! Declarative run configuration
//!
//! Everything that varies between runs (which list to explode per source,
//! join order and keys, the output mapping) is data loaded from JSON:
//!
//! ```json
//! {
//!   "sources": [
//!     {"name": "orders", "source_id": "orders.json", "explode": "orders[].items"},
//!     {"name": "users", "source_id": "users.json", "explode": "users[]"}
//!   ],
//!   "base": "orders",
//!   "joins": [{"source": "users", "on": [["customer_id", "user_id"]]}],
//!   "mapping": [{"alias": "email", "source": "contact.email"}],
//!   "output": {"destination": "merged/merged.jsonl", "table": "merged_data"}
//! }
//! ```

use crate::flatten::{EmptyListPolicy, ExplosionSpec, Flattener};
use crate::join::{JoinKey, Joiner, DEFAULT_LEFT_QUALIFIER, DEFAULT_RIGHT_QUALIFIER};
use crate::project::SchemaMapping;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Name used by `base` and join steps
    pub name: String,
    /// Identifier handed to the source reader
    pub source_id: String,
    #[serde(default)]
    pub explode: Option<String>,
    #[serde(default)]
    pub empty_list: EmptyListPolicy,
    #[serde(default)]
    pub prefix_elements: bool,
}

impl SourceConfig {
    pub fn flattener(&self) -> crate::Result<Flattener> {
        let flattener = Flattener::new(self.name.clone());
        match &self.explode {
            Some(path) => {
                let spec = ExplosionSpec::parse(path)?
                    .with_empty_list(self.empty_list)
                    .with_prefix_elements(self.prefix_elements);
                Ok(flattener.with_explosion(spec))
            }
            None => Ok(flattener),
        }
    }
}

fn default_left_qualifier() -> String {
    DEFAULT_LEFT_QUALIFIER.to_string()
}

fn default_right_qualifier() -> String {
    DEFAULT_RIGHT_QUALIFIER.to_string()
}

/// One step of the left-to-right join chain
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinStep {
    /// Source joined onto the running result
    pub source: String,
    pub on: JoinKey,
    #[serde(default = "default_left_qualifier")]
    pub left_qualifier: String,
    #[serde(default = "default_right_qualifier")]
    pub right_qualifier: String,
}

impl JoinStep {
    pub fn joiner(&self) -> Joiner {
        Joiner::new(self.on.clone())
            .with_qualifiers(self.left_qualifier.clone(), self.right_qualifier.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Identifier handed to the sink writer
    pub destination: String,
    /// Table name registered in the catalog
    pub table: String,
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub sources: Vec<SourceConfig>,
    pub base: String,
    #[serde(default)]
    pub joins: Vec<JoinStep>,
    pub mapping: SchemaMapping,
    pub output: OutputConfig,
    /// Abort on coercion failures instead of nulling the value
    #[serde(default)]
    pub strict: bool,
    /// Flatten independent sources concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(text).context("Failed to parse pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        PipelineConfig::from_json(&text)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Sources the run actually reads: the base, then each join step's source
    pub fn referenced_sources(&self) -> Vec<&SourceConfig> {
        let mut seen = HashSet::new();
        std::iter::once(self.base.as_str())
            .chain(self.joins.iter().map(|j| j.source.as_str()))
            .filter(|name| seen.insert(*name))
            .filter_map(|name| self.source(name))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                bail!("Source '{}' is declared more than once", source.name);
            }
            source
                .flattener()
                .with_context(|| format!("Invalid explosion path for source '{}'", source.name))?;
        }

        if self.source(&self.base).is_none() {
            bail!("Base source '{}' is not declared", self.base);
        }

        for (idx, step) in self.joins.iter().enumerate() {
            if self.source(&step.source).is_none() {
                bail!("Join step {} references undeclared source '{}'", idx + 1, step.source);
            }
            if step.on.is_empty() {
                bail!("Join step {} has no key pairs", idx + 1);
            }
            if step.left_qualifier == step.right_qualifier {
                bail!("Join step {} uses the same qualifier for both sides", idx + 1);
            }
        }

        if self.mapping.is_empty() {
            bail!("Mapping declares no output fields");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> serde_json::Value {
        json!({
            "sources": [
                {"name": "orders", "source_id": "orders.json", "explode": "orders[].items"},
                {"name": "users", "source_id": "users.json", "explode": "users[]"}
            ],
            "base": "orders",
            "joins": [{"source": "users", "on": [["customer_id", "user_id"]]}],
            "mapping": [{"alias": "email", "source": "contact.email"}],
            "output": {"destination": "merged.jsonl", "table": "merged"}
        })
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let config = PipelineConfig::from_json(&base_config().to_string()).unwrap();

        assert!(config.parallel);
        assert!(!config.strict);
        assert_eq!(config.joins[0].left_qualifier, "left");
        assert_eq!(config.joins[0].on.pairs()[0], ("customer_id".to_string(), "user_id".to_string()));
        assert_eq!(config.referenced_sources().len(), 2);
    }

    #[test]
    fn test_unknown_join_source_is_rejected() {
        let mut value = base_config();
        value["joins"][0]["source"] = json!("products");

        let err = PipelineConfig::from_json(&value.to_string()).unwrap_err();

        assert!(err.to_string().contains("products"));
    }

    #[test]
    fn test_bad_explosion_path_is_rejected() {
        let mut value = base_config();
        value["sources"][0]["explode"] = json!("orders[0]");

        assert!(PipelineConfig::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_duplicate_source_names_are_rejected() {
        let mut value = base_config();
        value["sources"][1]["name"] = json!("orders");
        value["joins"] = json!([]);

        assert!(PipelineConfig::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut value = base_config();
        value["output"]["format"] = json!("parquet");

        assert!(PipelineConfig::from_json(&value.to_string()).is_err());
    }
}
