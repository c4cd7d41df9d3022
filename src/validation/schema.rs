//! A small declarative validator over JSON values.
//!
//! A [`Schema`] walks a value, collects `(path, message)` issues and returns
//! a cleaned copy in which stripped fields are removed. Rules can depend on
//! sibling values through [`Schema::when`], and string fields that may hold
//! a YAML escape hatch go through [`Schema::maybe_yaml`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

pub const REQUIRED: &str = "is required";
pub const INVALID_YAML: &str = "Invalid YAML";

pub type Test = Arc<dyn Fn(&Value, &TestContext<'_>) -> Result<(), String> + Send + Sync>;
pub type Condition = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;
pub type YamlTest = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// What a custom test sees besides the value under test.
pub struct TestContext<'a> {
    pub root: &'a Value,
    pub path: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// The input with stripped fields removed.
    pub value: Value,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Clone)]
enum Kind {
    Any,
    String,
    Number,
    Bool,
    Array(Box<Schema>),
    Object(Vec<(&'static str, Schema)>),
    Strip,
    When {
        field: &'static str,
        is: Condition,
        then: Box<Schema>,
        otherwise: Box<Schema>,
    },
    MaybeYaml {
        schema: Box<Schema>,
        test: Option<YamlTest>,
    },
    Yaml(Option<YamlTest>),
}

#[derive(Clone)]
enum Check {
    Matches(Regex, &'static str),
    MinItems(usize, &'static str),
    OneOf(Vec<&'static str>),
    Test(Test),
}

#[derive(Clone)]
pub struct Schema {
    kind: Kind,
    required: bool,
    checks: Vec<Check>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Any => "any",
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Bool => "bool",
            Kind::Array(_) => "array",
            Kind::Object(_) => "object",
            Kind::Strip => "strip",
            Kind::When { .. } => "when",
            Kind::MaybeYaml { .. } => "maybe_yaml",
            Kind::Yaml(_) => "yaml",
        };
        f.debug_struct("Schema")
            .field("kind", &kind)
            .field("required", &self.required)
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl Schema {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            checks: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    pub fn string() -> Self {
        Self::of(Kind::String)
    }

    /// Numbers or numeric strings; an empty string counts as absent.
    pub fn number() -> Self {
        Self::of(Kind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(Kind::Bool)
    }

    pub fn array(items: Schema) -> Self {
        Self::of(Kind::Array(Box::new(items)))
    }

    pub fn object(fields: impl IntoIterator<Item = (&'static str, Schema)>) -> Self {
        Self::of(Kind::Object(fields.into_iter().collect()))
    }

    /// Removes the field from the cleaned value without checking it.
    pub fn strip() -> Self {
        Self::of(Kind::Strip)
    }

    /// Picks `then` or `otherwise` from the value of a sibling field.
    /// `field` may be a dotted path below the enclosing object.
    pub fn when(
        field: &'static str,
        is: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static,
        then: Schema,
        otherwise: Schema,
    ) -> Self {
        Self::of(Kind::When {
            field,
            is: Arc::new(is),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// `then` when the sibling `field` equals one of `values`, stripped
    /// otherwise.
    pub fn when_in(field: &'static str, values: &'static [&'static str], then: Schema) -> Self {
        Self::when(
            field,
            move |sibling| {
                sibling
                    .and_then(Value::as_str)
                    .is_some_and(|found| values.contains(&found))
            },
            then,
            Schema::strip(),
        )
    }

    /// A string is checked as YAML, anything else against `schema`.
    pub fn maybe_yaml(schema: Schema, test: Option<YamlTest>) -> Self {
        Self::of(Kind::MaybeYaml {
            schema: Box::new(schema),
            test,
        })
    }

    pub fn yaml(test: Option<YamlTest>) -> Self {
        Self::of(Kind::Yaml(test))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Non-empty strings must match `pattern`.
    pub fn matches(mut self, pattern: &Regex, message: &'static str) -> Self {
        self.checks.push(Check::Matches(pattern.clone(), message));
        self
    }

    pub fn min_items(mut self, min: usize, message: &'static str) -> Self {
        self.checks.push(Check::MinItems(min, message));
        self
    }

    pub fn one_of(mut self, values: &[&'static str]) -> Self {
        self.checks.push(Check::OneOf(values.to_vec()));
        self
    }

    pub fn test(
        mut self,
        test: impl Fn(&Value, &TestContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.checks.push(Check::Test(Arc::new(test)));
        self
    }

    pub fn validate(&self, value: &Value) -> ValidationReport {
        let mut walk = Walk {
            root: value,
            path: Vec::new(),
            issues: Vec::new(),
        };
        let cleaned = self.apply(Some(value), None, &mut walk).unwrap_or(Value::Null);
        ValidationReport {
            issues: walk.issues,
            value: cleaned,
        }
    }

    /// Returns the cleaned value, `None` when the field should be absent.
    fn apply(
        &self,
        value: Option<&Value>,
        parent: Option<&Map<String, Value>>,
        walk: &mut Walk,
    ) -> Option<Value> {
        match &self.kind {
            Kind::Strip => return None,
            Kind::When {
                field,
                is,
                then,
                otherwise,
            } => {
                let sibling = parent.and_then(|map| lookup(map, field));
                let branch = if is(sibling) { then } else { otherwise };
                return branch.apply(value, parent, walk);
            }
            Kind::MaybeYaml { schema, test } => {
                return if matches!(value, Some(Value::String(_))) {
                    Schema::yaml(test.clone()).apply(value, parent, walk)
                } else {
                    schema.apply(value, parent, walk)
                };
            }
            _ => {}
        }

        let blank = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => {
                text.is_empty() && matches!(self.kind, Kind::String | Kind::Number | Kind::Yaml(_))
            }
            Some(_) => false,
        };
        if blank {
            if self.required {
                walk.report(REQUIRED);
            }
            return value.cloned();
        }
        let value = value?;

        let cleaned = match &self.kind {
            Kind::Any => value.clone(),
            Kind::String => {
                if !value.is_string() {
                    walk.report("must be a string");
                    return Some(value.clone());
                }
                value.clone()
            }
            Kind::Number => {
                let numeric = match value {
                    Value::Number(_) => true,
                    Value::String(text) => text.trim().parse::<f64>().is_ok(),
                    _ => false,
                };
                if !numeric {
                    walk.report("must be a number");
                    return Some(value.clone());
                }
                value.clone()
            }
            Kind::Bool => {
                if !value.is_boolean() {
                    walk.report("must be a boolean");
                    return Some(value.clone());
                }
                value.clone()
            }
            Kind::Array(items) => {
                let Some(list) = value.as_array() else {
                    walk.report("must be a list");
                    return Some(value.clone());
                };
                let mut cleaned = Vec::with_capacity(list.len());
                for (index, item) in list.iter().enumerate() {
                    walk.path.push(format!("[{index}]"));
                    if let Some(item) = items.apply(Some(item), None, walk) {
                        cleaned.push(item);
                    }
                    walk.path.pop();
                }
                Value::Array(cleaned)
            }
            Kind::Object(fields) => {
                let Some(map) = value.as_object() else {
                    walk.report("must be an object");
                    return Some(value.clone());
                };
                let mut cleaned = map.clone();
                for (key, schema) in fields {
                    walk.path.push((*key).to_string());
                    match schema.apply(map.get(*key), Some(map), walk) {
                        Some(field) => {
                            cleaned.insert((*key).to_string(), field);
                        }
                        None => {
                            cleaned.remove(*key);
                        }
                    }
                    walk.path.pop();
                }
                Value::Object(cleaned)
            }
            Kind::Yaml(test) => {
                let Some(text) = value.as_str() else {
                    walk.report("must be a YAML string");
                    return Some(value.clone());
                };
                match serde_yaml::from_str::<Value>(text) {
                    Ok(parsed) => {
                        if let Some(test) = test {
                            if let Err(message) = test(&parsed) {
                                walk.report(message);
                            }
                        }
                    }
                    Err(_) => walk.report(INVALID_YAML),
                }
                value.clone()
            }
            Kind::Strip | Kind::When { .. } | Kind::MaybeYaml { .. } => value.clone(),
        };

        self.run_checks(&cleaned, walk);
        Some(cleaned)
    }

    fn run_checks(&self, value: &Value, walk: &mut Walk) {
        for check in &self.checks {
            let outcome = match check {
                Check::Matches(pattern, message) => match value.as_str() {
                    Some(text) if !text.is_empty() && !pattern.is_match(text) => {
                        Err((*message).to_string())
                    }
                    _ => Ok(()),
                },
                Check::MinItems(min, message) => match value.as_array() {
                    Some(list) if list.len() < *min => Err((*message).to_string()),
                    _ => Ok(()),
                },
                Check::OneOf(allowed) => match value.as_str() {
                    Some(text) if allowed.contains(&text) => Ok(()),
                    _ => Err(format!("must be one of {}", allowed.join(", "))),
                },
                Check::Test(test) => {
                    let path = walk.path_string();
                    let context = TestContext {
                        root: walk.root,
                        path: &path,
                    };
                    test(value, &context)
                }
            };
            if let Err(message) = outcome {
                walk.report(message);
            }
        }
    }
}

struct Walk<'r> {
    root: &'r Value,
    path: Vec<String>,
    issues: Vec<ValidationIssue>,
}

impl Walk<'_> {
    fn path_string(&self) -> String {
        let mut joined = String::new();
        for segment in &self.path {
            if !joined.is_empty() && !segment.starts_with('[') {
                joined.push('.');
            }
            joined.push_str(segment);
        }
        joined
    }

    fn report(&mut self, message: impl Into<String>) {
        let path = self.path_string();
        self.issues.push(ValidationIssue {
            path,
            message: message.into(),
        });
    }
}

fn lookup<'v>(map: &'v Map<String, Value>, field: &str) -> Option<&'v Value> {
    let mut segments = field.split('.');
    let first = segments.next()?;
    segments.try_fold(map.get(first)?, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(report: &ValidationReport) -> Vec<(String, String)> {
        report
            .issues
            .iter()
            .map(|issue| (issue.path.clone(), issue.message.clone()))
            .collect()
    }

    #[test]
    fn required_fields_report_paths() {
        let schema = Schema::object([(
            "streams",
            Schema::array(Schema::object([("name", Schema::string().required())])),
        )]);
        let report = schema.validate(&json!({"streams": [{"name": "a"}, {"name": ""}]}));
        assert_eq!(
            messages(&report),
            vec![("streams[1].name".to_string(), REQUIRED.to_string())]
        );
    }

    #[test]
    fn when_strips_fields_of_other_variants() {
        let schema = Schema::object([
            ("type", Schema::string().required()),
            (
                "header",
                Schema::when_in("type", &["WaitTimeFromHeader"], Schema::string().required()),
            ),
        ]);
        let report = schema.validate(&json!({"type": "ConstantBackoffStrategy", "header": "x"}));
        assert!(report.is_valid());
        assert_eq!(report.value, json!({"type": "ConstantBackoffStrategy"}));

        let report = schema.validate(&json!({"type": "WaitTimeFromHeader"}));
        assert_eq!(
            messages(&report),
            vec![("header".to_string(), REQUIRED.to_string())]
        );
    }

    #[test]
    fn when_reads_dotted_sibling_paths() {
        let schema = Schema::object([
            ("strategy", Schema::any()),
            (
                "pageSizeOption",
                Schema::when(
                    "strategy.page_size",
                    |size| size.is_some_and(|size| !size.is_null()),
                    Schema::any().required(),
                    Schema::strip(),
                ),
            ),
        ]);
        let report = schema.validate(&json!({"strategy": {"page_size": 10}}));
        assert_eq!(report.issues.len(), 1);
        let report = schema.validate(&json!({"strategy": {}, "pageSizeOption": {}}));
        assert!(report.is_valid());
        assert!(report.value.get("pageSizeOption").is_none());
    }

    #[test]
    fn maybe_yaml_checks_parsed_fragment() {
        let only_objects: YamlTest = Arc::new(|parsed| {
            if parsed.is_object() {
                Ok(())
            } else {
                Err("must be an object".to_string())
            }
        });
        let schema = Schema::object([(
            "paginator",
            Schema::maybe_yaml(
                Schema::object([("strategy", Schema::any().required())]),
                Some(only_objects),
            ),
        )]);
        assert!(schema.validate(&json!({"paginator": "type: Custom"})).is_valid());
        assert_eq!(
            messages(&schema.validate(&json!({"paginator": "[a, b"}))),
            vec![("paginator".to_string(), INVALID_YAML.to_string())]
        );
        assert_eq!(
            messages(&schema.validate(&json!({"paginator": "- a"}))),
            vec![("paginator".to_string(), "must be an object".to_string())]
        );
        assert_eq!(
            messages(&schema.validate(&json!({"paginator": {}}))),
            vec![("paginator.strategy".to_string(), REQUIRED.to_string())]
        );
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        let schema = Schema::object([("max_retries", Schema::number())]);
        assert!(schema.validate(&json!({"max_retries": "3"})).is_valid());
        assert!(schema.validate(&json!({"max_retries": ""})).is_valid());
        assert!(!schema.validate(&json!({"max_retries": "three"})).is_valid());
    }

    #[test]
    fn tests_see_the_root() {
        let schema = Schema::object([(
            "name",
            Schema::string().test(|value, context| {
                if context.root.get("taken").and_then(Value::as_str) == value.as_str() {
                    Err(format!("{} is taken", context.path))
                } else {
                    Ok(())
                }
            }),
        )]);
        let report = schema.validate(&json!({"taken": "a", "name": "a"}));
        assert_eq!(
            messages(&report),
            vec![("name".to_string(), "name is taken".to_string())]
        );
    }
}
