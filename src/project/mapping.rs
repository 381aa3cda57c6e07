//! Declarative output schema definitions
//!
//! Source expressions can be written as text:
//!
//! - `contact.email` reads a field directly
//! - `right::product_name` reads the right-hand copy of a field that a join
//!   qualified because both sides carried it
//! - `concat(" ", name.first_name, name.last_name)` joins fields with a separator
//!
//! or as structured JSON objects (`{"field": ..}`, `{"field": .., "side": ..}`,
//! `{"concat": [..], "separator": .., "null_default": ..}`).

use crate::error::{Error, Result};
use crate::join::{DEFAULT_LEFT_QUALIFIER, DEFAULT_RIGHT_QUALIFIER};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

static FIELD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[^\s,()":]+$"#).expect("field pattern is valid"));

static QUALIFIED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(left|right)::([^\s,()":]+)$"#).expect("qualified pattern is valid")
});

static CONCAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^concat\(\s*"((?:[^"\\]|\\.)*)"\s*,(.+)\)$"#).expect("concat pattern is valid")
});

/// Declared output type of a column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
}

impl FieldType {
    /// Type name used when registering the table in a data catalog
    pub fn catalog_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "int",
            FieldType::Float => "float",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
        };
        f.write_str(name)
    }
}

/// Which join input a qualified reference draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn qualifier(&self) -> &'static str {
        match self {
            Side::Left => DEFAULT_LEFT_QUALIFIER,
            Side::Right => DEFAULT_RIGHT_QUALIFIER,
        }
    }
}

/// A reference to one input field, optionally pinned to a join side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub path: String,
    pub side: Option<Side>,
}

impl FieldRef {
    pub fn direct(path: impl Into<String>) -> Self {
        FieldRef {
            path: path.into(),
            side: None,
        }
    }

    pub fn from_side(side: Side, path: impl Into<String>) -> Self {
        FieldRef {
            path: path.into(),
            side: Some(side),
        }
    }

    fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(caps) = QUALIFIED_REGEX.captures(text) {
            let side = if &caps[1] == "left" { Side::Left } else { Side::Right };
            return Ok(FieldRef::from_side(side, &caps[2]));
        }
        if FIELD_REGEX.is_match(text) {
            return Ok(FieldRef::direct(text));
        }
        Err(Error::InvalidExpression {
            expression: text.to_string(),
            detail: "expected a field path or left::/right:: reference".to_string(),
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Some(side) => write!(f, "{}::{}", side.qualifier(), self.path),
            None => f.write_str(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ExprRepr")]
pub enum SourceExpr {
    Ref(FieldRef),
    Concat {
        parts: Vec<FieldRef>,
        separator: String,
        /// Substituted for null parts; when absent a null part nulls the result
        null_default: Option<String>,
    },
}

impl SourceExpr {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let Some(caps) = CONCAT_REGEX.captures(text) else {
            return FieldRef::parse(text).map(SourceExpr::Ref);
        };

        let separator = unescape(&caps[1]);
        let parts = caps[2]
            .split(',')
            .map(FieldRef::parse)
            .collect::<Result<Vec<_>>>()?;
        SourceExpr::concat(parts, separator, None)
    }

    pub fn concat(parts: Vec<FieldRef>, separator: impl Into<String>, null_default: Option<String>) -> Result<Self> {
        let separator = separator.into();
        if parts.len() < 2 {
            return Err(Error::InvalidExpression {
                expression: format!("concat({:?}, ..)", separator),
                detail: "concatenation needs at least two fields".to_string(),
            });
        }
        Ok(SourceExpr::Concat {
            parts,
            separator,
            null_default,
        })
    }

    /// Every field this expression reads
    pub fn references(&self) -> Vec<&FieldRef> {
        match self {
            SourceExpr::Ref(r) => vec![r],
            SourceExpr::Concat { parts, .. } => parts.iter().collect(),
        }
    }
}

impl FromStr for SourceExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SourceExpr::parse(s)
    }
}

impl fmt::Display for SourceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceExpr::Ref(r) => write!(f, "{}", r),
            SourceExpr::Concat { parts, separator, .. } => {
                write!(f, "concat({:?}", separator)?;
                for part in parts {
                    write!(f, ", {}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExprRepr {
    Text(String),
    Concat {
        concat: Vec<String>,
        #[serde(default)]
        separator: String,
        #[serde(default)]
        null_default: Option<String>,
    },
    Qualified {
        field: String,
        side: Side,
    },
    Field {
        field: String,
    },
}

impl TryFrom<ExprRepr> for SourceExpr {
    type Error = Error;

    fn try_from(repr: ExprRepr) -> Result<Self> {
        match repr {
            ExprRepr::Text(text) => SourceExpr::parse(&text),
            ExprRepr::Concat {
                concat,
                separator,
                null_default,
            } => {
                let parts = concat
                    .iter()
                    .map(|p| FieldRef::parse(p))
                    .collect::<Result<Vec<_>>>()?;
                SourceExpr::concat(parts, separator, null_default)
            }
            ExprRepr::Qualified { field, side } => Ok(SourceExpr::Ref(FieldRef::from_side(side, field))),
            ExprRepr::Field { field } => Ok(SourceExpr::Ref(FieldRef::direct(field))),
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// One column of the final schema
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputField {
    pub alias: String,
    pub source: SourceExpr,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
}

impl OutputField {
    pub fn new(alias: impl Into<String>, source: SourceExpr, field_type: FieldType) -> Self {
        OutputField {
            alias: alias.into(),
            source,
            field_type,
        }
    }

    /// Build from expression text
    pub fn parse(alias: impl Into<String>, source: &str, field_type: FieldType) -> Result<Self> {
        Ok(OutputField::new(alias, SourceExpr::parse(source)?, field_type))
    }
}

/// Ordered list of output fields with unique aliases
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<OutputField>")]
pub struct SchemaMapping {
    fields: Vec<OutputField>,
}

impl SchemaMapping {
    pub fn new(fields: Vec<OutputField>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.alias.as_str()) {
                return Err(Error::DuplicateAlias {
                    alias: field.alias.clone(),
                });
            }
        }
        Ok(SchemaMapping { fields })
    }

    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Vec<OutputField>> for SchemaMapping {
    type Error = Error;

    fn try_from(fields: Vec<OutputField>) -> Result<Self> {
        SchemaMapping::new(fields)
    }
}
