use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// A flattened leaf value. Containers never survive into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// The kind of a [`Scalar`], used to compare join keys and report mismatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
}

impl Scalar {
    /// Convert a JSON leaf. Returns `None` for arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Integer(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Boolean(b) => Value::Bool(*b),
            Scalar::Integer(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Null => ScalarKind::Null,
            Scalar::Boolean(_) => ScalarKind::Boolean,
            Scalar::Integer(_) => ScalarKind::Integer,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::String(_) => ScalarKind::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            // "5.0", not "5"
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

/// One flat row: field path -> value, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn get(&self, path: &str) -> Option<&Scalar> {
        self.fields.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    /// Insert a value, returning the previous one if the path was taken
    pub fn insert(&mut self, path: impl Into<String>, value: Scalar) -> Option<Scalar> {
        self.fields.insert(path.into(), value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as a JSON object with fields in record order
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A finalized table: every row carries exactly the fields in `schema`, in
/// schema order. Produced by [`RecordSetBuilder::finish`] and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    name: String,
    schema: Vec<String>,
    rows: Vec<Record>,
}

impl RecordSet {
    /// An empty set with a fixed schema
    pub fn empty(name: impl Into<String>, schema: Vec<String>) -> Self {
        RecordSet {
            name: name.into(),
            schema,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn has_field(&self, path: &str) -> bool {
        self.schema.iter().any(|f| f == path)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accumulates records and tracks the union of their field paths in
/// first-seen order.
#[derive(Debug)]
pub struct RecordSetBuilder {
    name: String,
    schema: IndexSet<String>,
    /// Paths that held a nested object in at least one record
    containers: HashSet<String>,
    rows: Vec<Record>,
}

impl RecordSetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        RecordSetBuilder {
            name: name.into(),
            schema: IndexSet::new(),
            containers: HashSet::new(),
            rows: Vec::new(),
        }
    }

    /// Record that `path` held a nested object whose fields were flattened
    /// beneath it
    pub fn mark_container(&mut self, path: impl Into<String>) {
        self.containers.insert(path.into());
    }

    /// Make `path` part of the schema even if no row ever carries it
    pub fn declare_field(&mut self, path: impl Into<String>) {
        self.schema.insert(path.into());
    }

    pub fn push(&mut self, record: Record) {
        for path in record.paths() {
            if !self.schema.contains(path) {
                self.schema.insert(path.to_string());
            }
        }
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a path that holds a non-null scalar in some row while it was
    /// flattened as a nested object in others (`contact` vs `contact.email`).
    pub fn container_conflict(&self) -> Option<String> {
        if self.containers.is_empty() {
            return None;
        }

        self.schema
            .iter()
            .filter(|path| self.containers.contains(path.as_str()))
            .find(|path| {
                self.rows
                    .iter()
                    .any(|row| row.get(path).is_some_and(|v| !v.is_null()))
            })
            .cloned()
    }

    /// Freeze the schema and pad every row with nulls so that each one holds
    /// exactly the schema's fields, in schema order.
    pub fn finish(self) -> RecordSet {
        let schema: Vec<String> = self.schema.into_iter().collect();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                schema
                    .iter()
                    .map(|path| {
                        let value = row.fields.swap_remove(path).unwrap_or(Scalar::Null);
                        (path.clone(), value)
                    })
                    .collect()
            })
            .collect();

        RecordSet {
            name: self.name,
            schema,
            rows,
        }
    }
}
