//! Helpers for `{{ config[...] }}` interpolation strings.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKET_CHAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\{\{\s*config((?:\[\s*(?:'[^']*'|"[^"]*")\s*\])+)\s*\}\}$"#)
        .expect("valid bracket pattern")
});
static BRACKET_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[\s*(?:'([^']*)'|"([^"]*)")\s*\]"#).expect("valid segment pattern")
});
static DOT_CHAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\{\s*config((?:\.[A-Za-z0-9_-]+)+)\s*\}\}$").expect("valid dot pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReferenceError {
    NotInterpolated,
    Nested(Vec<String>),
}

/// Returns the config path referenced by `value`, or `None` if the string is
/// not exactly one config reference.
pub fn config_path(value: &str) -> Option<Vec<String>> {
    let trimmed = value.trim();
    if let Some(captures) = BRACKET_CHAIN.captures(trimmed) {
        let chain = captures.get(1)?.as_str();
        let segments: Vec<String> = BRACKET_SEGMENT
            .captures_iter(chain)
            .filter_map(|segment| segment.get(1).or_else(|| segment.get(2)))
            .map(|m| m.as_str().to_string())
            .collect();
        return non_empty(segments);
    }
    if let Some(captures) = DOT_CHAIN.captures(trimmed) {
        let chain = captures.get(1)?.as_str();
        let segments = chain
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        return non_empty(segments);
    }
    None
}

fn non_empty(segments: Vec<String>) -> Option<Vec<String>> {
    if segments.is_empty() || segments.iter().any(String::is_empty) {
        None
    } else {
        Some(segments)
    }
}

/// Extracts the top-level config key; nested paths are rejected.
pub fn config_key(value: &str) -> Result<String, ConfigReferenceError> {
    match config_path(value) {
        None => Err(ConfigReferenceError::NotInterpolated),
        Some(mut path) if path.len() == 1 => Ok(path.remove(0)),
        Some(path) => Err(ConfigReferenceError::Nested(path)),
    }
}

pub fn extract_config_key(value: &str) -> Option<String> {
    config_key(value).ok()
}

pub fn interpolate_config_key(key: &str) -> String {
    format!("{{{{ config[\"{key}\"] }}}}")
}
