use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::builder::locked_inputs::LockedInputTemplate;
use crate::builder::types::{KeyValueList, YamlOr};
use crate::error::{CompatibilityError, ConversionError};
use crate::interpolation::{config_key, ConfigReferenceError};

pub(crate) type Converted<T> = Result<T, ConversionError>;

/// Where a conversion happens: the stream being converted (if any) and the
/// connection specification used to validate config references.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub stream: Option<&'a str>,
    pub spec: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn global(spec: Option<&'a Value>) -> Self {
        Self { stream: None, spec }
    }

    pub fn for_stream<'b>(&self, stream: &'b str) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            stream: Some(stream),
            spec: self.spec,
        }
    }

    pub fn error(&self, reason: impl Into<String>) -> ConversionError {
        CompatibilityError::new(self.stream, reason).into()
    }

    pub fn fail<T>(&self, reason: impl Into<String>) -> Converted<T> {
        Err(self.error(reason))
    }
}

/// Returns the object behind `value`, failing if it has keys outside
/// `known`.
pub(crate) fn known_fields<'v>(
    scope: &Scope,
    value: &'v Value,
    component: &str,
    known: &[&str],
) -> Converted<&'v Map<String, Value>> {
    let Some(map) = value.as_object() else {
        return scope.fail(format!("{component} must be an object"));
    };
    let unknown: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|key| !known.contains(key))
        .collect();
    if !unknown.is_empty() {
        return scope.fail(format!(
            "{component} contains fields unsupported by the UI: {}",
            unknown.join(", ")
        ));
    }
    Ok(map)
}

/// The keys of `map` that are not in `known`, in declaration order.
pub(crate) fn unknown_fields(map: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn expect_type(scope: &Scope, value: &Value, component: &str, expected: &str) -> Converted<()> {
    match value.get("type").and_then(Value::as_str) {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => scope.fail(format!("{component} must be a {expected}, found {kind}")),
        None => scope.fail(format!("{component} must be a {expected}")),
    }
}

pub(crate) fn optional_string(
    scope: &Scope,
    map: &Map<String, Value>,
    field: &str,
    component: &str,
) -> Converted<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => scope.fail(format!("{component}.{field} must be a string")),
    }
}

pub(crate) fn required_string(
    scope: &Scope,
    map: &Map<String, Value>,
    field: &str,
    component: &str,
) -> Converted<String> {
    optional_string(scope, map, field, component)?
        .ok_or_else(|| scope.error(format!("{component}.{field} is required")))
}

pub(crate) fn optional_bool(
    scope: &Scope,
    map: &Map<String, Value>,
    field: &str,
    component: &str,
) -> Converted<Option<bool>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => scope.fail(format!("{component}.{field} must be a boolean")),
    }
}

pub(crate) fn string_list(scope: &Scope, value: &Value, component: &str) -> Converted<Vec<String>> {
    let Some(items) = value.as_array() else {
        return scope.fail(format!("{component} must be a list of strings"));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(text) => Ok(text.clone()),
            _ => scope.fail(format!("{component} must be a list of strings")),
        })
        .collect()
}

/// Converts an object of string values into ordered key/value pairs.
pub(crate) fn string_pairs(
    scope: &Scope,
    value: Option<&Value>,
    component: &str,
) -> Converted<KeyValueList> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Some(map) = value.as_object() else {
        return scope.fail(format!("{component} must be an object"));
    };
    map.iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key.clone(), text.clone())),
            _ => scope.fail(format!("all {component} values must be strings")),
        })
        .collect()
}

/// Accepts JSON numbers, kept as written, and numeric strings.
pub(crate) fn number(scope: &Scope, value: &Value, component: &str) -> Converted<Number> {
    let parsed = match value {
        Value::Number(number) => Some(number.clone()),
        Value::String(text) => serde_json::from_str::<Number>(text.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| scope.error(format!("{component} must be a number")))
}

pub(crate) fn dump_yaml(value: &Value) -> Converted<String> {
    Ok(serde_yaml::to_string(value)?)
}

/// Runs a component converter and degrades a compatibility failure to the
/// verbatim YAML of the fragment. Any other failure propagates.
pub(crate) fn convert_or_dump<T>(
    scope: &Scope,
    fragment: Option<&Value>,
    component: &str,
    convert: impl FnOnce(&Value) -> Converted<Option<T>>,
) -> Converted<Option<YamlOr<T>>> {
    let Some(fragment) = fragment else {
        return Ok(None);
    };
    match convert(fragment) {
        Ok(converted) => Ok(converted.map(YamlOr::Builder)),
        Err(ConversionError::Compatibility(err)) => {
            warn!(
                stream = scope.stream.unwrap_or_default(),
                component,
                reason = %err.reason,
                "component kept as YAML"
            );
            Ok(Some(YamlOr::Yaml(dump_yaml(fragment)?)))
        }
        Err(other) => Err(other),
    }
}

/// Extracts the config key referenced by `value` and checks the spec
/// property it names against `template`.
pub(crate) fn spec_key(
    scope: &Scope,
    path: &str,
    value: Option<&Value>,
    template: &LockedInputTemplate,
) -> Converted<String> {
    let key = match value {
        Some(Value::String(text)) => match config_key(text) {
            Ok(key) => key,
            Err(ConfigReferenceError::NotInterpolated) => {
                return scope.fail(format!(
                    "{path} must be of the form {{{{ config[\"key\"] }}}}"
                ))
            }
            Err(ConfigReferenceError::Nested(_)) => {
                return scope.fail(format!(
                    "{path} points to a nested config path, but only top-level config fields are supported"
                ))
            }
        },
        Some(Value::Array(segments)) => match segments.as_slice() {
            [] => return scope.fail(format!("{path} has an empty path")),
            [Value::String(key)] => key.clone(),
            [_] => return scope.fail(format!("{path} must point to a config field")),
            _ => {
                return scope.fail(format!(
                    "{path} points to a nested config path, but only top-level config fields are supported"
                ))
            }
        },
        _ => return scope.fail(format!("{path} must point to a config field")),
    };

    let prefix = format!("{path} references spec key \"{key}\", which must");
    let Some(definition) = scope
        .spec
        .and_then(|spec| spec.get("properties"))
        .and_then(|properties| properties.get(&key))
    else {
        return scope.fail(format!("{prefix} appear in the spec"));
    };
    if template.required {
        let required = scope
            .spec
            .and_then(|spec| spec.get("required"))
            .and_then(Value::as_array)
            .is_some_and(|list| list.iter().any(|item| item.as_str() == Some(key.as_str())));
        if !required {
            return scope.fail(format!("{prefix} be required"));
        }
    }
    if definition.get("type").and_then(Value::as_str) != Some("string") {
        return scope.fail(format!("{prefix} be of type string"));
    }
    if template.secret && definition.get("airbyte_secret").and_then(Value::as_bool) != Some(true) {
        return scope.fail(format!("{prefix} have airbyte_secret set to true"));
    }
    if let Some(pattern) = template.pattern {
        if definition.get("pattern").and_then(Value::as_str) != Some(pattern) {
            return scope.fail(format!("{prefix} have pattern \"{pattern}\""));
        }
    }
    Ok(key)
}
