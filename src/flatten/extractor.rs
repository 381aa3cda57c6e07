use crate::error::{Error, Result};
use crate::flatten::path::{EmptyListPolicy, ExplosionSpec, PathSegment};
use crate::report::{Issue, IssueKind, RunReport, Stage};
use crate::types::{Record, RecordSet, RecordSetBuilder, Scalar};
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// What one root record's walk observed besides its rows
#[derive(Debug, Default)]
struct Walk {
    /// Paths flattened as nested objects
    containers: Vec<String>,
    /// Locations of explosion targets that were empty, missing or null
    dropped: Vec<String>,
}

/// Turns nested JSON documents into flat, dot-path keyed rows
#[derive(Debug, Clone)]
pub struct Flattener {
    name: String,
    explosion: Option<ExplosionSpec>,
}

impl Flattener {
    pub fn new(name: impl Into<String>) -> Self {
        Flattener {
            name: name.into(),
            explosion: None,
        }
    }

    pub fn with_explosion(mut self, spec: ExplosionSpec) -> Self {
        self.explosion = Some(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flatten one document: an object, or a list of objects treated as
    /// pre-split root records
    pub fn flatten(&self, document: &Value) -> Result<RecordSet> {
        self.flatten_all(std::iter::once(document))
    }

    /// Flatten a stream of documents into a single record set
    pub fn flatten_all<'a, I>(&self, documents: I) -> Result<RecordSet>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.flatten_with_report(documents, &mut RunReport::new())
    }

    /// Like [`Flattener::flatten_all`], recording every root record whose
    /// explosion target was empty and therefore produced no row
    pub fn flatten_with_report<'a, I>(&self, documents: I, report: &mut RunReport) -> Result<RecordSet>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut builder = RecordSetBuilder::new(self.name.clone());
        let mut root = 0usize;

        for document in documents {
            match document {
                Value::Object(obj) => {
                    self.flatten_root(obj, root, &mut builder, report)?;
                    root += 1;
                }
                Value::Array(arr) => {
                    for (idx, item) in arr.iter().enumerate() {
                        match item {
                            Value::Object(obj) => {
                                self.flatten_root(obj, root, &mut builder, report)?;
                                root += 1;
                            }
                            other => {
                                return Err(self.malformed(format!(
                                    "element {} of the top-level list is {}, expected an object",
                                    idx,
                                    json_kind(other)
                                )))
                            }
                        }
                    }
                }
                other => {
                    return Err(self.malformed(format!(
                        "document is {}, expected an object or a list of objects",
                        json_kind(other)
                    )))
                }
            }
        }

        if let Some(path) = builder.container_conflict() {
            return Err(Error::TypeConflict {
                source_name: self.name.clone(),
                path,
            });
        }

        Ok(builder.finish())
    }

    fn flatten_root(
        &self,
        obj: &Map<String, Value>,
        root: usize,
        builder: &mut RecordSetBuilder,
        report: &mut RunReport,
    ) -> Result<()> {
        let segments = self
            .explosion
            .as_ref()
            .map(|spec| spec.segments())
            .unwrap_or(&[]);

        let mut walk = Walk::default();
        for record in self.expand(obj, "", "", segments, Record::new(), &mut walk)? {
            builder.push(record);
        }

        for path in walk.containers {
            builder.mark_container(path);
        }
        for location in walk.dropped {
            report.push(Issue {
                stage: Stage::Flatten,
                kind: IssueKind::EmptyExplosion,
                row: Some(root),
                field: Some(location),
                detail: format!("explosion target in '{}' is empty, no row emitted", self.name),
            });
        }
        Ok(())
    }

    /// Flatten `obj` on top of `base`, exploding the list named by the first
    /// remaining segment. Returns one record per leaf element reached.
    /// `location` spells out where `obj` sits in the document, list indices
    /// included.
    fn expand(
        &self,
        obj: &Map<String, Value>,
        prefix: &str,
        location: &str,
        segments: &[PathSegment],
        base: Record,
        walk: &mut Walk,
    ) -> Result<Vec<Record>> {
        let mut record = base;
        let target = segments.first();

        // Shared fields first, so every exploded row carries them
        for (key, value) in obj {
            if target.is_some_and(|t| &t.key == key) {
                continue;
            }
            self.flatten_value(&mut record, &join_path(prefix, key), value, walk)?;
        }

        let Some(target) = target else {
            return Ok(vec![record]);
        };
        let rest = &segments[1..];
        let target_path = join_path(prefix, &target.key);
        let target_location = join_path(location, &target.key);

        let value = obj.get(&target.key).unwrap_or(&NULL);

        if !target.list {
            return match value {
                Value::Object(child) => {
                    walk.containers.push(target_path.clone());
                    self.expand(
                        child,
                        &format!("{}.", target_path),
                        &format!("{}.", target_location),
                        rest,
                        record,
                        walk,
                    )
                }
                Value::Null => Ok(self.empty_explosion(record, target_location, walk)),
                other => Err(self.unsupported(
                    &target_path,
                    format!("expected an object on the explosion path, found {}", json_kind(other)),
                )),
            };
        }

        let elements = match value {
            Value::Array(arr) => arr,
            Value::Null => return Ok(self.empty_explosion(record, target_location, walk)),
            other => {
                return Err(self.unsupported(
                    &target_path,
                    format!("expected a list to explode, found {}", json_kind(other)),
                ))
            }
        };

        if elements.is_empty() {
            return Ok(self.empty_explosion(record, target_location, walk));
        }

        let element_prefix = if self.prefix_elements() {
            format!("{}.", target_path)
        } else {
            String::new()
        };

        let mut rows = Vec::with_capacity(elements.len());
        for (idx, element) in elements.iter().enumerate() {
            match element {
                Value::Object(child) => {
                    if self.prefix_elements() {
                        walk.containers.push(target_path.clone());
                    }
                    let element_location = format!("{}[{}].", target_location, idx);
                    rows.extend(self.expand(
                        child,
                        &element_prefix,
                        &element_location,
                        rest,
                        record.clone(),
                        walk,
                    )?);
                }
                Value::Array(_) => {
                    return Err(self.unsupported(&target_path, "list directly inside an exploded list"));
                }
                scalar => {
                    if !rest.is_empty() {
                        return Err(self.unsupported(
                            &target_path,
                            "explosion path continues below a list of scalars",
                        ));
                    }
                    let mut row = record.clone();
                    self.insert_scalar(&mut row, &target_path, scalar)?;
                    rows.push(row);
                }
            }
        }

        Ok(rows)
    }

    /// Recursively write a value under `path`, expanding nested objects
    fn flatten_value(&self, record: &mut Record, path: &str, value: &Value, walk: &mut Walk) -> Result<()> {
        match value {
            Value::Object(obj) => {
                walk.containers.push(path.to_string());
                for (key, nested) in obj {
                    self.flatten_value(record, &format!("{}.{}", path, key), nested, walk)?;
                }
                Ok(())
            }
            Value::Array(_) => Err(self.unsupported(
                path,
                "list found at a path not declared for explosion",
            )),
            scalar => self.insert_scalar(record, path, scalar),
        }
    }

    fn insert_scalar(&self, record: &mut Record, path: &str, value: &Value) -> Result<()> {
        let scalar = Scalar::from_json(value).unwrap_or(Scalar::Null);
        if record.insert(path, scalar).is_some() {
            return Err(Error::DuplicateField {
                source_name: self.name.clone(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn empty_explosion(&self, record: Record, location: String, walk: &mut Walk) -> Vec<Record> {
        let policy = self
            .explosion
            .as_ref()
            .map(|spec| spec.empty_list)
            .unwrap_or_default();

        match policy {
            EmptyListPolicy::Drop => {
                walk.dropped.push(location);
                Vec::new()
            }
            EmptyListPolicy::NullRow => vec![record],
        }
    }

    fn prefix_elements(&self) -> bool {
        self.explosion.as_ref().is_some_and(|spec| spec.prefix_elements)
    }

    fn malformed(&self, detail: String) -> Error {
        Error::MalformedInput {
            source_name: self.name.clone(),
            detail,
        }
    }

    fn unsupported(&self, path: &str, detail: impl Into<String>) -> Error {
        Error::UnsupportedShape {
            source_name: self.name.clone(),
            path: path.to_string(),
            detail: detail.into(),
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exploding(path: &str) -> Flattener {
        Flattener::new("test").with_explosion(ExplosionSpec::parse(path).unwrap())
    }

    #[test]
    fn test_flat_object_is_unchanged() {
        let input = json!({"id": "1", "name": "Alice", "age": 30, "active": true});

        let set = Flattener::new("users").flatten(&input).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.schema(), &["id", "name", "age", "active"]);
        let row = &set.rows()[0];
        assert_eq!(row.get("name"), Some(&Scalar::from("Alice")));
        assert_eq!(row.get("age"), Some(&Scalar::Integer(30)));
        assert_eq!(row.get("active"), Some(&Scalar::Boolean(true)));
    }

    #[test]
    fn test_nested_objects_become_dot_paths() {
        let input = json!({
            "user_id": "u1",
            "name": {"first_name": "Ada", "last_name": "Lovelace"},
            "contact": {"email": "ada@example.com", "phone": {"mobile": "555"}}
        });

        let set = Flattener::new("users").flatten(&input).unwrap();

        assert_eq!(
            set.schema(),
            &["user_id", "name.first_name", "name.last_name", "contact.email", "contact.phone.mobile"]
        );
        assert_eq!(set.rows()[0].get("contact.phone.mobile"), Some(&Scalar::from("555")));
    }

    #[test]
    fn test_top_level_list_is_split_into_roots() {
        let input = json!([{"id": "1"}, {"id": "2", "extra": "x"}]);

        let set = Flattener::new("t").flatten(&input).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0].get("extra"), Some(&Scalar::Null));
    }

    #[test]
    fn test_orders_items_scenario() {
        let input = json!({"orders": [{
            "order_id": "1",
            "customer_id": "9",
            "items": [{"item_id": "a", "product_name": "X", "quantity": "2", "price": "5.0"}]
        }]});

        let set = exploding("orders[].items").flatten(&input).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.schema(),
            &["order_id", "customer_id", "item_id", "product_name", "quantity", "price"]
        );
        let row = &set.rows()[0];
        assert_eq!(row.get("order_id"), Some(&Scalar::from("1")));
        assert_eq!(row.get("customer_id"), Some(&Scalar::from("9")));
        assert_eq!(row.get("item_id"), Some(&Scalar::from("a")));
        assert_eq!(row.get("price"), Some(&Scalar::from("5.0")));
    }

    #[test]
    fn test_explosion_row_count_matches_elements() {
        let input = json!({
            "order_id": "1",
            "items": [{"item_id": "a"}, {"item_id": "b"}, {"item_id": "c"}]
        });

        let set = exploding("items").flatten(&input).unwrap();

        assert_eq!(set.len(), 3);
        for row in set.rows() {
            assert_eq!(row.get("order_id"), Some(&Scalar::from("1")));
        }
    }

    #[test]
    fn test_empty_explosion_list_yields_no_rows() {
        let input = json!({"order_id": "1", "items": []});

        let set = exploding("items").flatten(&input).unwrap();

        assert!(set.is_empty());
    }

    #[test]
    fn test_empty_explosion_list_null_row_policy() {
        let input = json!([
            {"order_id": "1", "items": []},
            {"order_id": "2", "items": [{"item_id": "a"}]}
        ]);
        let spec = ExplosionSpec::parse("items")
            .unwrap()
            .with_empty_list(EmptyListPolicy::NullRow);

        let set = Flattener::new("orders").with_explosion(spec).flatten(&input).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0].get("item_id"), Some(&Scalar::Null));
        assert_eq!(set.rows()[1].get("item_id"), Some(&Scalar::from("a")));
    }

    #[test]
    fn test_nested_explosion() {
        let input = json!({"orders": [
            {"order_id": "1", "items": [
                {"item_id": "a", "parts": [{"part": "p1"}, {"part": "p2"}]},
                {"item_id": "b", "parts": [{"part": "p3"}]}
            ]}
        ]});

        let set = exploding("orders[].items[].parts").flatten(&input).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.schema(), &["order_id", "item_id", "part"]);
        assert_eq!(set.rows()[2].get("item_id"), Some(&Scalar::from("b")));
    }

    #[test]
    fn test_prefixed_elements() {
        let input = json!({"id": "1", "tags": [{"name": "x"}]});
        let spec = ExplosionSpec::parse("tags").unwrap().with_prefix_elements(true);

        let set = Flattener::new("t").with_explosion(spec).flatten(&input).unwrap();

        assert_eq!(set.schema(), &["id", "tags.name"]);
    }

    #[test]
    fn test_scalar_list_explosion() {
        let input = json!({"id": "1", "tags": ["rust", "json"]});

        let set = exploding("tags").flatten(&input).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[1].get("tags"), Some(&Scalar::from("json")));
    }

    #[test]
    fn test_undeclared_list_is_rejected() {
        let input = json!({"id": 1, "tags": ["a", "b"]});

        let err = Flattener::new("t").flatten(&input).unwrap_err();

        assert!(matches!(err, Error::UnsupportedShape { ref path, .. } if path == "tags"));
    }

    #[test]
    fn test_malformed_documents() {
        let flattener = Flattener::new("t");
        assert!(matches!(flattener.flatten(&json!("text")), Err(Error::MalformedInput { .. })));
        assert!(matches!(flattener.flatten(&json!([1, 2])), Err(Error::MalformedInput { .. })));
    }

    #[test]
    fn test_type_conflict_is_reported() {
        let input = json!([
            {"contact": {"email": "a@example.com"}},
            {"contact": "unknown"}
        ]);

        let err = Flattener::new("users").flatten(&input).unwrap_err();

        assert_eq!(
            err,
            Error::TypeConflict { source_name: "users".into(), path: "contact".into() }
        );
    }

    #[test]
    fn test_element_field_colliding_with_parent() {
        let input = json!({"id": "1", "items": [{"id": "a"}]});

        let err = exploding("items").flatten(&input).unwrap_err();

        assert!(matches!(err, Error::DuplicateField { ref path, .. } if path == "id"));
    }

    #[test]
    fn test_dotted_keys_are_not_nested_objects() {
        let input = json!({"a": 1, "a.b": 2});

        let set = Flattener::new("t").flatten(&input).unwrap();

        assert_eq!(set.schema(), &["a", "a.b"]);
        assert_eq!(set.rows()[0].get("a"), Some(&Scalar::Integer(1)));
    }

    #[test]
    fn test_dropped_roots_are_reported() {
        let input = json!({"orders": [
            {"order_id": "1", "items": [{"item_id": "a"}]},
            {"order_id": "2", "items": []},
            {"order_id": "3"}
        ]});
        let mut report = RunReport::new();

        let set = exploding("orders[].items")
            .flatten_with_report(std::iter::once(&input), &mut report)
            .unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(report.count(IssueKind::EmptyExplosion), 2);
        let locations: Vec<_> = report.issues().iter().map(|i| i.field.as_deref()).collect();
        assert_eq!(locations, vec![Some("orders[1].items"), Some("orders[2].items")]);
        assert!(report.issues().iter().all(|i| i.stage == Stage::Flatten && i.row == Some(0)));
    }

    #[test]
    fn test_null_row_policy_reports_nothing() {
        let input = json!([{"order_id": "1", "items": []}]);
        let spec = ExplosionSpec::parse("items")
            .unwrap()
            .with_empty_list(EmptyListPolicy::NullRow);
        let mut report = RunReport::new();

        let set = Flattener::new("orders")
            .with_explosion(spec)
            .flatten_with_report(std::iter::once(&input), &mut report)
            .unwrap();

        assert_eq!(set.len(), 1);
        assert!(report.is_empty());
    }
}
