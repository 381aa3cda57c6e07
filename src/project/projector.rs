use crate::error::{Error, Result};
use crate::project::mapping::{FieldRef, FieldType, OutputField, SchemaMapping, SourceExpr};
use crate::report::{Issue, IssueKind, RunReport, Stage};
use crate::types::{Record, RecordSet, RecordSetBuilder, Scalar};
use tracing::debug;

/// An output field whose references are bound to concrete input paths
#[derive(Debug)]
enum Bound<'a> {
    Path(String),
    Concat {
        paths: Vec<String>,
        separator: &'a str,
        null_default: Option<&'a str>,
    },
}

/// Applies a [`SchemaMapping`] to a record set
#[derive(Debug, Clone)]
pub struct Projector {
    name: String,
    mapping: SchemaMapping,
    strict: bool,
}

impl Projector {
    pub fn new(mapping: SchemaMapping) -> Self {
        Projector {
            name: "projection".to_string(),
            mapping,
            strict: false,
        }
    }

    /// Abort on the first coercion failure instead of nulling the value
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// Check every reference against the input schema before touching a row
    pub fn validate(&self, input: &RecordSet) -> Result<()> {
        self.bind(input).map(|_| ())
    }

    pub fn project(&self, input: &RecordSet, report: &mut RunReport) -> Result<RecordSet> {
        let bound = self.bind(input)?;

        let mut builder = RecordSetBuilder::new(self.name.clone());
        for alias in self.mapping.aliases() {
            builder.declare_field(alias);
        }

        let mut failures = 0usize;
        for (row_idx, row) in input.rows().iter().enumerate() {
            let mut out = Record::new();
            for (field, binding) in self.mapping.fields().iter().zip(&bound) {
                let raw = evaluate(binding, row);
                let value = match coerce(&raw, field.field_type) {
                    Some(value) => value,
                    None if self.strict => {
                        return Err(Error::CoercionFailure {
                            row: row_idx,
                            alias: field.alias.clone(),
                            value: raw.to_string(),
                            target: field.field_type.to_string(),
                        });
                    }
                    None => {
                        failures += 1;
                        report.push(Issue {
                            stage: Stage::Project,
                            kind: IssueKind::CoercionFailure,
                            row: Some(row_idx),
                            field: Some(field.alias.clone()),
                            detail: format!("cannot coerce '{}' to {}", raw, field.field_type),
                        });
                        Scalar::Null
                    }
                };
                out.insert(field.alias.clone(), value);
            }
            builder.push(out);
        }

        debug!(
            rows = builder.len(),
            fields = self.mapping.len(),
            coercion_failures = failures,
            "projection complete"
        );

        Ok(builder.finish())
    }

    fn bind(&self, input: &RecordSet) -> Result<Vec<Bound<'_>>> {
        self.mapping
            .fields()
            .iter()
            .map(|field| bind_field(field, input))
            .collect()
    }
}

fn bind_field<'a>(field: &'a OutputField, input: &RecordSet) -> Result<Bound<'a>> {
    match &field.source {
        SourceExpr::Ref(r) => resolve(&field.alias, r, input).map(Bound::Path),
        SourceExpr::Concat {
            parts,
            separator,
            null_default,
        } => {
            let paths = parts
                .iter()
                .map(|part| resolve(&field.alias, part, input))
                .collect::<Result<Vec<_>>>()?;
            Ok(Bound::Concat {
                paths,
                separator,
                null_default: null_default.as_deref(),
            })
        }
    }
}

/// Find the input path a reference reads. A side-pinned reference prefers
/// the qualified copy a join produced and falls back to the plain path when
/// the field was never ambiguous.
fn resolve(alias: &str, reference: &FieldRef, input: &RecordSet) -> Result<String> {
    let unknown = |path: String| Error::UnknownSourceField {
        alias: alias.to_string(),
        path,
    };

    match reference.side {
        None if input.has_field(&reference.path) => Ok(reference.path.clone()),
        None => Err(unknown(reference.path.clone())),
        Some(side) => {
            let qualified = format!("{}.{}", side.qualifier(), reference.path);
            if input.has_field(&qualified) {
                Ok(qualified)
            } else if input.has_field(&reference.path) {
                Ok(reference.path.clone())
            } else {
                Err(unknown(qualified))
            }
        }
    }
}

fn evaluate(binding: &Bound<'_>, row: &Record) -> Scalar {
    match binding {
        Bound::Path(path) => row.get(path).cloned().unwrap_or(Scalar::Null),
        Bound::Concat {
            paths,
            separator,
            null_default,
        } => {
            let mut pieces = Vec::with_capacity(paths.len());
            for path in paths {
                match row.get(path) {
                    Some(value) if !value.is_null() => pieces.push(value.to_string()),
                    _ => match null_default {
                        Some(default) => pieces.push(default.to_string()),
                        None => return Scalar::Null,
                    },
                }
            }
            Scalar::String(pieces.join(*separator))
        }
    }
}

/// Cast a raw value to the declared type. `None` means the value cannot be
/// represented; null always passes through.
fn coerce(value: &Scalar, target: FieldType) -> Option<Scalar> {
    if value.is_null() {
        return Some(Scalar::Null);
    }

    match target {
        FieldType::String => Some(Scalar::String(value.to_string())),
        FieldType::Integer => match value {
            Scalar::Integer(i) => Some(Scalar::Integer(*i)),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(Scalar::Integer(*f as i64))
            }
            Scalar::String(s) => s.trim().parse::<i64>().ok().map(Scalar::Integer),
            _ => None,
        },
        FieldType::Float => match value {
            Scalar::Integer(i) => Some(Scalar::Float(*i as f64)),
            Scalar::Float(f) => Some(Scalar::Float(*f)),
            Scalar::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Scalar::Float),
            _ => None,
        },
    }
}
