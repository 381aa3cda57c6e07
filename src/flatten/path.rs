//! Explosion path parsing
//!
//! An explosion path names the list (or chain of lists) whose elements each
//! become their own output row, e.g. `orders[].items`. Segments are separated
//! by dots; a `[]` suffix marks an intermediate list to explode. The final
//! segment always names a list.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^.\[\]\s]+)(\[\])?$").expect("segment pattern is valid")
});

/// What to emit for a document whose explosion list is empty or missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyListPolicy {
    /// Emit no row at all
    #[default]
    Drop,
    /// Emit one row carrying the parent's fields, element fields null
    #[serde(alias = "null-row")]
    NullRow,
}

impl FromStr for EmptyListPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drop" => Ok(EmptyListPolicy::Drop),
            "null-row" | "null_row" => Ok(EmptyListPolicy::NullRow),
            other => Err(format!("unknown empty-list policy '{}'", other)),
        }
    }
}

/// One step along an explosion path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub key: String,
    /// The value at `key` is a list to explode (otherwise an object to descend into)
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplosionSpec {
    raw: String,
    segments: Vec<PathSegment>,
    pub empty_list: EmptyListPolicy,
    /// Prefix exploded element fields with the list's key path
    pub prefix_elements: bool,
}

impl ExplosionSpec {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |detail: &str| Error::InvalidExplosionPath {
            path: path.to_string(),
            detail: detail.to_string(),
        };

        if path.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        for part in path.split('.') {
            let caps = SEGMENT_REGEX
                .captures(part)
                .ok_or_else(|| invalid(&format!("bad segment '{}'", part)))?;
            segments.push(PathSegment {
                key: caps[1].to_string(),
                list: caps.get(2).is_some(),
            });
        }

        if let Some(last) = segments.last_mut() {
            last.list = true;
        }

        Ok(ExplosionSpec {
            raw: path.to_string(),
            segments,
            empty_list: EmptyListPolicy::default(),
            prefix_elements: false,
        })
    }

    pub fn with_empty_list(mut self, policy: EmptyListPolicy) -> Self {
        self.empty_list = policy;
        self
    }

    pub fn with_prefix_elements(mut self, prefix: bool) -> Self {
        self.prefix_elements = prefix;
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ExplosionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExplosionSpec::parse(s)
    }
}

impl fmt::Display for ExplosionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
