//! # Smelter - JSON flatten / join / project toolkit
//!
//! Normalizes heterogeneous nested JSON record collections into flat tables
//! and merges several of them into one canonical output schema.
//!
//! ## Modules
//!
//! - **flatten**: Turn nested JSON into dot-path keyed rows, exploding declared lists
//! - **join**: Left-outer join record sets on declared key pairs
//! - **project**: Map joined fields onto a typed, ordered output schema
//! - **pipeline**: Run the whole sequence from a declarative config
//! - **io**: Source / sink / catalog collaborators
//!
//! ## Quick Start
//!
//! ```rust
//! use smelter::flatten::{ExplosionSpec, Flattener};
//! use smelter::Scalar;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = json!({"orders": [{
//!     "order_id": "1",
//!     "customer_id": "9",
//!     "items": [{"item_id": "a", "product_name": "X", "quantity": "2", "price": "5.0"}]
//! }]});
//!
//! let flattener = Flattener::new("orders")
//!     .with_explosion(ExplosionSpec::parse("orders[].items")?);
//! let records = flattener.flatten(&data)?;
//!
//! assert_eq!(records.len(), 1);
//! assert_eq!(records.rows()[0].get("item_id"), Some(&Scalar::from("a")));
//! # Ok(())
//! # }
//! ```
//!
//! ### Join and project
//!
//! ```rust
//! use smelter::flatten::Flattener;
//! use smelter::join::{JoinKey, Joiner};
//! use smelter::project::{FieldType, OutputField, Projector, SchemaMapping};
//! use smelter::RunReport;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let orders = Flattener::new("orders").flatten(&json!([{"order_id": "1", "customer_id": "u1"}]))?;
//! let users = Flattener::new("users").flatten(&json!([
//!     {"user_id": "u1", "name": {"first_name": "Ada", "last_name": "Lovelace"}}
//! ]))?;
//!
//! let mut report = RunReport::new();
//! let joined = Joiner::new(JoinKey::on("customer_id", "user_id")).join(&orders, &users, &mut report)?;
//!
//! let mapping = SchemaMapping::new(vec![
//!     OutputField::parse("order_id", "order_id", FieldType::Integer)?,
//!     OutputField::parse("full_name", r#"concat(" ", name.first_name, name.last_name)"#, FieldType::String)?,
//! ])?;
//! let output = Projector::new(mapping).project(&joined, &mut report)?;
//!
//! assert_eq!(output.schema(), &["order_id", "full_name"]);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result as AnyResult};

pub mod error;
pub mod flatten;
pub mod io;
pub mod join;
pub mod pipeline;
pub mod project;
pub mod report;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use flatten::{EmptyListPolicy, ExplosionSpec, Flattener};
pub use join::{JoinKey, Joiner};
pub use pipeline::{Pipeline, PipelineConfig, RunOutcome, RunStatus};
pub use project::{FieldType, OutputField, Projector, SchemaMapping, SourceExpr};
pub use report::{Issue, IssueKind, RunReport, Stage};
pub use types::{Record, RecordSet, Scalar};

/// Decode raw source bytes (a JSON document or newline-delimited documents)
/// and flatten them into one record set
pub fn flatten_json(name: &str, bytes: &[u8], explosion: Option<ExplosionSpec>) -> AnyResult<RecordSet> {
    let documents = io::decode_documents(bytes)?;

    let mut flattener = Flattener::new(name);
    if let Some(spec) = explosion {
        flattener = flattener.with_explosion(spec);
    }

    flattener
        .flatten_all(&documents)
        .with_context(|| format!("Failed to flatten '{}'", name))
}
