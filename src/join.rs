//! Left-outer joins over finalized record sets
//!
//! The right side is indexed by its key tuple first, then every left row
//! probes the index. Rows with a null key component never match, and key
//! components of different kinds never compare equal. One left row matching
//! several right rows fans out into several output rows.
//!
//! Field paths present on both sides are kept twice, under source-qualified
//! names (`left.path` / `right.path` by default), so nothing is dropped on
//! collision.

use crate::error::{Error, Result};
use crate::report::{Issue, IssueKind, RunReport, Stage};
use crate::types::{Record, RecordSet, RecordSetBuilder, Scalar, ScalarKind};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const DEFAULT_LEFT_QUALIFIER: &str = "left";
pub const DEFAULT_RIGHT_QUALIFIER: &str = "right";

/// Ordered `(left path, right path)` equality pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinKey {
    pairs: Vec<(String, String)>,
}

impl JoinKey {
    pub fn new<L, R>(pairs: impl IntoIterator<Item = (L, R)>) -> Self
    where
        L: Into<String>,
        R: Into<String>,
    {
        JoinKey {
            pairs: pairs
                .into_iter()
                .map(|(l, r)| (l.into(), r.into()))
                .collect(),
        }
    }

    /// Single pair shorthand
    pub fn on(left: impl Into<String>, right: impl Into<String>) -> Self {
        JoinKey::new([(left.into(), right.into())])
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Hashable form of a non-null key component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyAtom {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl KeyAtom {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Null => None,
            Scalar::Boolean(b) => Some(KeyAtom::Bool(*b)),
            Scalar::Integer(i) => Some(KeyAtom::Int(*i)),
            Scalar::Float(f) => Some(KeyAtom::Float(OrderedFloat(*f))),
            Scalar::String(s) => Some(KeyAtom::Str(s.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Joiner {
    key: JoinKey,
    left_qualifier: String,
    right_qualifier: String,
}

impl Joiner {
    pub fn new(key: JoinKey) -> Self {
        Joiner {
            key,
            left_qualifier: DEFAULT_LEFT_QUALIFIER.to_string(),
            right_qualifier: DEFAULT_RIGHT_QUALIFIER.to_string(),
        }
    }

    pub fn with_qualifiers(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_qualifier = left.into();
        self.right_qualifier = right.into();
        self
    }

    pub fn key(&self) -> &JoinKey {
        &self.key
    }

    /// Join `left` with `right`, recording unmatched rows and key kind
    /// mismatches in `report`
    pub fn join(&self, left: &RecordSet, right: &RecordSet, report: &mut RunReport) -> Result<RecordSet> {
        self.validate(left, right)?;
        Ok(self.left_outer(left, right, report))
    }

    fn validate(&self, left: &RecordSet, right: &RecordSet) -> Result<()> {
        for (l, r) in self.key.pairs() {
            if !left.has_field(l) {
                return Err(Error::KeyPathNotFound {
                    record_set: left.name().to_string(),
                    path: l.clone(),
                });
            }
            if !right.has_field(r) {
                return Err(Error::KeyPathNotFound {
                    record_set: right.name().to_string(),
                    path: r.clone(),
                });
            }
        }
        Ok(())
    }

    fn left_outer(&self, left: &RecordSet, right: &RecordSet, report: &mut RunReport) -> RecordSet {
        let (left_names, right_names) =
            output_names(left, right, &self.left_qualifier, &self.right_qualifier);

        let mut builder = RecordSetBuilder::new(format!("{}+{}", left.name(), right.name()));
        for name in left_names.iter().chain(right_names.iter()) {
            builder.declare_field(name.clone());
        }

        // Build phase: the whole right side is indexed before any probe
        let right_paths: Vec<&str> = self.key.pairs().iter().map(|(_, r)| r.as_str()).collect();
        let mut index: HashMap<Vec<KeyAtom>, Vec<usize>> = HashMap::new();
        let mut right_kinds: Vec<HashSet<ScalarKind>> = vec![HashSet::new(); right_paths.len()];

        for (idx, row) in right.rows().iter().enumerate() {
            if let Some(key) = key_tuple(row, &right_paths) {
                for (kinds, path) in right_kinds.iter_mut().zip(&right_paths) {
                    if let Some(v) = row.get(path) {
                        kinds.insert(v.kind());
                    }
                }
                index.entry(key).or_default().push(idx);
            }
        }

        // Probe phase
        let left_paths: Vec<&str> = self.key.pairs().iter().map(|(l, _)| l.as_str()).collect();
        let mut unmatched = 0usize;

        for (row_idx, row) in left.rows().iter().enumerate() {
            let matches = match key_tuple(row, &left_paths) {
                Some(key) => {
                    let found = index.get(&key);
                    if found.is_none() {
                        self.note_kind_mismatch(row_idx, row, &left_paths, &right_kinds, report);
                    }
                    found
                }
                None => {
                    report.push(Issue {
                        stage: Stage::Join,
                        kind: IssueKind::NullJoinKey,
                        row: Some(row_idx),
                        field: None,
                        detail: format!("null key component in '{}'", left.name()),
                    });
                    None
                }
            };

            match matches {
                Some(right_rows) => {
                    for &right_idx in right_rows {
                        let partner = &right.rows()[right_idx];
                        builder.push(merge_rows(left, row, &left_names, right, Some(partner), &right_names));
                    }
                }
                None => {
                    unmatched += 1;
                    report.push(Issue {
                        stage: Stage::Join,
                        kind: IssueKind::UnmatchedJoin,
                        row: Some(row_idx),
                        field: None,
                        detail: format!("no row in '{}' matches", right.name()),
                    });
                    builder.push(merge_rows(left, row, &left_names, right, None, &right_names));
                }
            }
        }

        debug!(
            left = left.name(),
            right = right.name(),
            left_rows = left.len(),
            output_rows = builder.len(),
            unmatched,
            "join complete"
        );

        builder.finish()
    }

    fn note_kind_mismatch(
        &self,
        row_idx: usize,
        row: &Record,
        left_paths: &[&str],
        right_kinds: &[HashSet<ScalarKind>],
        report: &mut RunReport,
    ) {
        for (path, kinds) in left_paths.iter().zip(right_kinds) {
            let Some(value) = row.get(path) else { continue };
            if !kinds.is_empty() && !kinds.contains(&value.kind()) {
                report.push(Issue {
                    stage: Stage::Join,
                    kind: IssueKind::TypeMismatch,
                    row: Some(row_idx),
                    field: Some(path.to_string()),
                    detail: format!(
                        "key value of kind {:?} cannot equal right-side values of kind {:?}",
                        value.kind(),
                        kinds
                    ),
                });
            }
        }
    }
}

/// Output names for both sides' fields. A path carried by both sides is
/// qualified (`left.path` / `right.path`). When that name is already taken,
/// e.g. by a column an earlier join in a chain qualified, the qualifier gets
/// a numeric suffix (`left2.path`) until the name is unique.
fn output_names(
    left: &RecordSet,
    right: &RecordSet,
    left_qualifier: &str,
    right_qualifier: &str,
) -> (Vec<String>, Vec<String>) {
    // Unqualified names are reserved first so a qualified name never shadows one
    let mut taken: HashSet<String> = left
        .schema()
        .iter()
        .filter(|path| !right.has_field(path))
        .chain(right.schema().iter().filter(|path| !left.has_field(path)))
        .cloned()
        .collect();

    let mut assign = |side: &RecordSet, other: &RecordSet, qualifier: &str| -> Vec<String> {
        side.schema()
            .iter()
            .map(|path| {
                if !other.has_field(path) {
                    return path.clone();
                }
                let mut name = format!("{}.{}", qualifier, path);
                let mut n = 2;
                while taken.contains(&name) {
                    name = format!("{}{}.{}", qualifier, n, path);
                    n += 1;
                }
                taken.insert(name.clone());
                name
            })
            .collect()
    };

    let left_names = assign(left, right, left_qualifier);
    let right_names = assign(right, left, right_qualifier);
    (left_names, right_names)
}

fn key_tuple(row: &Record, paths: &[&str]) -> Option<Vec<KeyAtom>> {
    paths
        .iter()
        .map(|path| row.get(path).and_then(KeyAtom::from_scalar))
        .collect()
}

fn merge_rows(
    left: &RecordSet,
    left_row: &Record,
    left_names: &[String],
    right: &RecordSet,
    right_row: Option<&Record>,
    right_names: &[String],
) -> Record {
    let left_fields = left.schema().iter().zip(left_names).map(|(path, name)| {
        let value = left_row.get(path).cloned().unwrap_or(Scalar::Null);
        (name.clone(), value)
    });
    let right_fields = right.schema().iter().zip(right_names).map(|(path, name)| {
        let value = right_row
            .and_then(|r| r.get(path))
            .cloned()
            .unwrap_or(Scalar::Null);
        (name.clone(), value)
    });
    left_fields.chain(right_fields).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::Flattener;
    use serde_json::json;

    fn set(name: &str, rows: serde_json::Value) -> RecordSet {
        Flattener::new(name).flatten(&rows).unwrap()
    }

    #[test]
    fn test_one_to_one_join() {
        let orders = set("orders", json!([
            {"order_id": "1", "customer_id": "u1"},
            {"order_id": "2", "customer_id": "u2"}
        ]));
        let users = set("users", json!([
            {"user_id": "u1", "email": "a@example.com"},
            {"user_id": "u2", "email": "b@example.com"}
        ]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("customer_id", "user_id"))
            .join(&orders, &users, &mut report)
            .unwrap();

        assert_eq!(joined.len(), orders.len());
        assert_eq!(joined.schema(), &["order_id", "customer_id", "user_id", "email"]);
        assert_eq!(joined.rows()[1].get("email"), Some(&Scalar::from("b@example.com")));
        assert!(report.is_empty());
    }

    #[test]
    fn test_unmatched_left_rows_are_null_padded() {
        let left = set("l", json!([{"k": "a"}, {"k": "b"}, {"k": "c"}]));
        let right = set("r", json!([{"rk": "a", "v": "1"}, {"rk": "c", "v": "3"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("k", "rk"))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.rows()[1].get("v"), Some(&Scalar::Null));
        assert_eq!(joined.rows()[1].get("rk"), Some(&Scalar::Null));
        assert_eq!(report.count(IssueKind::UnmatchedJoin), 1);
        assert_eq!(report.issues()[0].row, Some(1));
    }

    #[test]
    fn test_no_matches_keeps_every_left_row() {
        let left = set("l", json!([{"k": "a"}, {"k": "b"}]));
        let right = set("r", json!([{"rk": "z", "v": "1"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("k", "rk"))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.len(), 2);
        assert!(joined.rows().iter().all(|r| r.get("v") == Some(&Scalar::Null)));
    }

    #[test]
    fn test_duplicate_matches_fan_out() {
        let left = set("l", json!([{"k": "a"}, {"k": "b"}]));
        let right = set("r", json!([
            {"rk": "a", "v": "1"},
            {"rk": "a", "v": "2"},
            {"rk": "b", "v": "3"}
        ]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("k", "rk"))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.len(), 3);
        let values: Vec<&Scalar> = joined.rows().iter().filter_map(|r| r.get("v")).collect();
        assert_eq!(values, vec![&Scalar::from("1"), &Scalar::from("2"), &Scalar::from("3")]);
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = set("l", json!([{"k": null, "x": "1"}]));
        let right = set("r", json!([{"rk": null, "v": "1"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("k", "rk"))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows()[0].get("v"), Some(&Scalar::Null));
        assert_eq!(report.count(IssueKind::NullJoinKey), 1);
    }

    #[test]
    fn test_kind_mismatch_is_a_non_match() {
        let left = set("l", json!([{"k": 9}]));
        let right = set("r", json!([{"rk": "9", "v": "x"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("k", "rk"))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.rows()[0].get("v"), Some(&Scalar::Null));
        assert_eq!(report.count(IssueKind::TypeMismatch), 1);
    }

    #[test]
    fn test_colliding_paths_are_qualified() {
        let orders = set("orders", json!([{"item_id": "i1", "product_name": "X"}]));
        let products = set("products", json!([{"product_name": "X", "category": "toys"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("product_name", "product_name"))
            .join(&orders, &products, &mut report)
            .unwrap();

        assert_eq!(
            joined.schema(),
            &["item_id", "left.product_name", "right.product_name", "category"]
        );
        assert_eq!(joined.rows()[0].get("category"), Some(&Scalar::from("toys")));
    }

    #[test]
    fn test_custom_qualifiers() {
        let a = set("a", json!([{"id": "1"}]));
        let b = set("b", json!([{"id": "1"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::on("id", "id"))
            .with_qualifiers("orders", "users")
            .join(&a, &b, &mut report)
            .unwrap();

        assert_eq!(joined.schema(), &["orders.id", "users.id"]);
    }

    #[test]
    fn test_composite_key() {
        let left = set("l", json!([{"a": "1", "b": "x"}, {"a": "1", "b": "y"}]));
        let right = set("r", json!([{"ra": "1", "rb": "y", "v": "hit"}]));
        let mut report = RunReport::new();

        let joined = Joiner::new(JoinKey::new([("a", "ra"), ("b", "rb")]))
            .join(&left, &right, &mut report)
            .unwrap();

        assert_eq!(joined.rows()[0].get("v"), Some(&Scalar::Null));
        assert_eq!(joined.rows()[1].get("v"), Some(&Scalar::from("hit")));
    }

    #[test]
    fn test_missing_key_path_is_fatal() {
        let left = set("orders", json!([{"k": "a"}]));
        let right = set("users", json!([{"rk": "a"}]));
        let mut report = RunReport::new();

        let err = Joiner::new(JoinKey::on("k", "user_id"))
            .join(&left, &right, &mut report)
            .unwrap_err();

        assert_eq!(
            err,
            Error::KeyPathNotFound { record_set: "users".into(), path: "user_id".into() }
        );
    }

    #[test]
    fn test_chained_joins() {
        let orders = set("orders", json!([{"order_id": "1", "customer_id": "u1", "product_name": "X"}]));
        let users = set("users", json!([{"user_id": "u1"}]));
        let products = set("products", json!([{"product_name": "X", "category": "toys"}]));
        let mut report = RunReport::new();

        let step1 = Joiner::new(JoinKey::on("customer_id", "user_id"))
            .join(&orders, &users, &mut report)
            .unwrap();
        let step2 = Joiner::new(JoinKey::on("product_name", "product_name"))
            .join(&step1, &products, &mut report)
            .unwrap();

        assert_eq!(step2.len(), 1);
        assert!(step2.has_field("user_id"));
        assert!(step2.has_field("right.product_name"));
        assert_eq!(step2.name(), "orders+users+products");
    }

    #[test]
    fn test_chained_collisions_keep_every_column() {
        let source = |name: &str| set(name, json!([{"id": name, "k": "1"}]));
        let (a, b, c, d) = (source("a"), source("b"), source("c"), source("d"));
        let mut report = RunReport::new();
        let on_k = |left: &str| Joiner::new(JoinKey::on(left, "k"));

        let ab = on_k("k").join(&a, &b, &mut report).unwrap();
        let abc = on_k("left.k").join(&ab, &c, &mut report).unwrap();
        let abcd = on_k("k").join(&abc, &d, &mut report).unwrap();

        assert_eq!(abc.schema(), &["left.id", "left.k", "right.id", "right.k", "id", "k"]);
        assert_eq!(
            abcd.schema(),
            &["left.id", "left.k", "right.id", "right.k", "left2.id", "left2.k", "right2.id", "right2.k"]
        );
        let row = &abcd.rows()[0];
        assert_eq!(row.len(), abcd.schema().len());
        let ids: Vec<&Scalar> = ["left.id", "right.id", "left2.id", "right2.id"]
            .iter()
            .filter_map(|path| row.get(path))
            .collect();
        assert_eq!(
            ids,
            vec![&Scalar::from("a"), &Scalar::from("b"), &Scalar::from("c"), &Scalar::from("d")]
        );
        assert!(report.is_empty());
    }
}
