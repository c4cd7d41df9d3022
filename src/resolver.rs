//! `$ref` expansion for manifest documents.
//!
//! The resolver walks the document depth-first and keeps an explicit stack
//! of the pointers currently being expanded. Revisiting a pointer that is
//! still on the stack is a cycle; the same pointer used twice along separate
//! branches is ordinary sharing and expands twice.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RefResolutionError, ResolveError};
use crate::manifest::deep_merge;

const REF_KEY: &str = "$ref";

static POINTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(/[^/]+)+$").expect("valid pointer pattern"));

/// Collaborator boundary for turning a raw manifest into a resolved one.
pub trait ManifestResolver {
    fn resolve_manifest(&mut self, manifest: &Value) -> Result<Value, ResolveError>;
}

/// In-process resolver backed by [`resolve`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalResolver;

impl ManifestResolver for LocalResolver {
    fn resolve_manifest(&mut self, manifest: &Value) -> Result<Value, ResolveError> {
        Ok(resolve(manifest)?)
    }
}

/// Returns a deep copy of `document` with every `$ref` inlined.
pub fn resolve(document: &Value) -> Result<Value, RefResolutionError> {
    let mut stack = Vec::new();
    let resolved = resolve_node(document, document, "#", &mut stack)?;
    debug!("resolved manifest references");
    Ok(resolved)
}

fn resolve_node(
    root: &Value,
    node: &Value,
    location: &str,
    stack: &mut Vec<String>,
) -> Result<Value, RefResolutionError> {
    match node {
        Value::Object(map) => match map.get(REF_KEY) {
            Some(reference) => resolve_reference(root, map, reference, location, stack),
            None => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let child = child_location(location, key);
                    out.insert(key.clone(), resolve_node(root, value, &child, stack)?);
                }
                Ok(Value::Object(out))
            }
        },
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                resolve_node(root, item, &child_location(location, &index.to_string()), stack)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        scalar => Ok(scalar.clone()),
    }
}

fn resolve_reference(
    root: &Value,
    map: &Map<String, Value>,
    reference: &Value,
    location: &str,
    stack: &mut Vec<String>,
) -> Result<Value, RefResolutionError> {
    let Some(pointer) = reference.as_str() else {
        return Err(RefResolutionError::NonStringRef {
            location: location.to_string(),
        });
    };
    if !POINTER.is_match(pointer) {
        return Err(RefResolutionError::InvalidPointer {
            pointer: pointer.to_string(),
            location: location.to_string(),
        });
    }
    if let Some(position) = stack.iter().position(|entry| entry == pointer) {
        let mut chain = stack[position..].to_vec();
        chain.push(pointer.to_string());
        return Err(RefResolutionError::Cycle { chain });
    }

    let target = lookup(root, pointer).ok_or_else(|| RefResolutionError::Dangling {
        pointer: pointer.to_string(),
        location: location.to_string(),
    })?;
    if !(target.is_object() || target.is_array()) {
        return Err(RefResolutionError::NotAnObject {
            pointer: pointer.to_string(),
            location: location.to_string(),
        });
    }
    let has_siblings = map.keys().any(|key| key != REF_KEY);
    if target.is_array() && has_siblings {
        return Err(RefResolutionError::ArrayWithSiblings {
            pointer: pointer.to_string(),
            location: location.to_string(),
        });
    }

    stack.push(pointer.to_string());
    let expanded = resolve_node(root, target, pointer, stack);
    stack.pop();
    let mut expanded = expanded?;

    let mut siblings = Map::new();
    for (key, value) in map.iter().filter(|(key, _)| key.as_str() != REF_KEY) {
        let child = child_location(location, key);
        siblings.insert(key.clone(), resolve_node(root, value, &child, stack)?);
    }
    if !siblings.is_empty() {
        deep_merge(&mut expanded, Value::Object(siblings));
    }
    Ok(expanded)
}

fn lookup<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut current = root;
    for raw in pointer.trim_start_matches('#').split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn child_location(parent: &str, key: &str) -> String {
    let escaped = key.replace('~', "~0").replace('/', "~1");
    format!("{parent}/{escaped}")
}
