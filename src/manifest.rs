//! Manifest document vocabulary and structural helpers.

use serde_json::{Map, Value};

pub const DEFAULT_MANIFEST_VERSION: &str = "6.7.0";

pub const DECLARATIVE_SOURCE: &str = "DeclarativeSource";
pub const DECLARATIVE_STREAM: &str = "DeclarativeStream";
pub const SIMPLE_RETRIEVER: &str = "SimpleRetriever";
pub const ASYNC_RETRIEVER: &str = "AsyncRetriever";
pub const HTTP_REQUESTER: &str = "HttpRequester";
pub const CHECK_STREAM: &str = "CheckStream";
pub const CHECK_DYNAMIC_STREAM: &str = "CheckDynamicStream";
pub const SPEC: &str = "Spec";
pub const INLINE_SCHEMA_LOADER: &str = "InlineSchemaLoader";
pub const RECORD_SELECTOR: &str = "RecordSelector";
pub const RECORD_FILTER: &str = "RecordFilter";
pub const DPATH_EXTRACTOR: &str = "DpathExtractor";
pub const REQUEST_OPTION: &str = "RequestOption";
pub const REQUEST_PATH: &str = "RequestPath";
pub const DEFAULT_PAGINATOR: &str = "DefaultPaginator";
pub const NO_PAGINATION: &str = "NoPagination";
pub const DATETIME_BASED_CURSOR: &str = "DatetimeBasedCursor";
pub const MIN_MAX_DATETIME: &str = "MinMaxDatetime";
pub const LIST_PARTITION_ROUTER: &str = "ListPartitionRouter";
pub const SUBSTREAM_PARTITION_ROUTER: &str = "SubstreamPartitionRouter";
pub const CUSTOM_PARTITION_ROUTER: &str = "CustomPartitionRouter";
pub const PARENT_STREAM_CONFIG: &str = "ParentStreamConfig";
pub const DEFAULT_ERROR_HANDLER: &str = "DefaultErrorHandler";
pub const COMPOSITE_ERROR_HANDLER: &str = "CompositeErrorHandler";
pub const HTTP_RESPONSE_FILTER: &str = "HttpResponseFilter";
pub const ADD_FIELDS: &str = "AddFields";
pub const REMOVE_FIELDS: &str = "RemoveFields";

pub const NO_AUTH: &str = "NoAuth";
pub const API_KEY_AUTHENTICATOR: &str = "ApiKeyAuthenticator";
pub const BEARER_AUTHENTICATOR: &str = "BearerAuthenticator";
pub const BASIC_HTTP_AUTHENTICATOR: &str = "BasicHttpAuthenticator";
pub const OAUTH_AUTHENTICATOR: &str = "OAuthAuthenticator";
pub const SESSION_TOKEN_AUTHENTICATOR: &str = "SessionTokenAuthenticator";
pub const SESSION_TOKEN_REQUEST_API_KEY: &str = "ApiKey";
pub const SESSION_TOKEN_REQUEST_BEARER: &str = "Bearer";

pub const BASE_REQUESTER_REF: &str = "#/definitions/base_requester";
pub const STREAM_REF_PREFIX: &str = "#/definitions/streams/";

pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub const NOW_UTC_SENTINEL: &str = "{{ now_utc().strftime('%Y-%m-%dT%H:%M:%SZ') }}";

pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Top-level keys in display order; anything else follows alphabetically.
const DISPLAY_KEY_ORDER: [&str; 9] = [
    "version",
    "type",
    "description",
    "check",
    "definitions",
    "streams",
    "spec",
    "metadata",
    "schemas",
];

pub fn type_of(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key.clone(), sort_keys(val));
            }
            Value::Object(sorted)
        }
        Value::Array(list) => Value::Array(list.iter().map(sort_keys).collect()),
        _ => value.clone(),
    }
}

/// Key-order independent serialization used for structural matching.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

/// Merges `overlay` into `target`; objects merge key by key, any other
/// overlay value replaces the target value.
pub fn deep_merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let nested = overlay_value.is_object()
                    && target_map.get(&key).is_some_and(Value::is_object);
                match target_map.get_mut(&key) {
                    Some(existing) if nested => deep_merge(existing, overlay_value),
                    _ => {
                        target_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

pub fn to_pretty_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Serializes a manifest with the canonical top-level key order.
pub fn to_display_yaml(manifest: &Value, blank_lines: bool) -> Result<String, serde_yaml::Error> {
    let Some(map) = manifest.as_object() else {
        return serde_yaml::to_string(manifest);
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by_key(|key| {
        let rank = DISPLAY_KEY_ORDER
            .iter()
            .position(|known| *known == key.as_str())
            .unwrap_or(DISPLAY_KEY_ORDER.len());
        (rank, key.as_str())
    });

    let mut sections = Vec::with_capacity(keys.len());
    for key in keys {
        let mut section = Map::new();
        section.insert(key.clone(), map[key.as_str()].clone());
        sections.push(serde_yaml::to_string(&Value::Object(section))?);
    }
    let separator = if blank_lines { "\n" } else { "" };
    Ok(sections.join(separator))
}
