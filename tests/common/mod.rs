#![allow(dead_code)]

use serde_json::{json, Value};

pub const API_TOKEN: &str = "{{ config[\"api_key\"] }}";

pub fn api_key_authenticator() -> Value {
    json!({
        "type": "ApiKeyAuthenticator",
        "api_token": API_TOKEN,
        "inject_into": {"type": "RequestOption", "inject_into": "header", "field_name": "X-Api-Key"}
    })
}

pub fn connection_specification() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["api_key"],
        "properties": {
            "api_key": {"type": "string", "title": "API Key", "airbyte_secret": true, "order": 0}
        },
        "additionalProperties": true
    })
}

pub fn users_stream() -> Value {
    json!({
        "type": "DeclarativeStream",
        "name": "users",
        "primary_key": ["id"],
        "retriever": {
            "type": "SimpleRetriever",
            "requester": {
                "$ref": "#/definitions/base_requester",
                "path": "/users",
                "http_method": "GET",
                "request_parameters": {"limit": "50"}
            },
            "record_selector": {
                "type": "RecordSelector",
                "extractor": {"type": "DpathExtractor", "field_path": ["data"]}
            },
            "paginator": {
                "type": "DefaultPaginator",
                "pagination_strategy": {"type": "PageIncrement", "page_size": 50, "start_from_page": 1},
                "page_token_option": {
                    "type": "RequestOption",
                    "inject_into": "request_parameter",
                    "field_name": "page"
                }
            }
        },
        "schema_loader": {
            "type": "InlineSchemaLoader",
            "schema": {"type": "object", "properties": {"id": {"type": "string"}}}
        }
    })
}

pub fn posts_stream() -> Value {
    json!({
        "type": "DeclarativeStream",
        "name": "posts",
        "retriever": {
            "type": "SimpleRetriever",
            "requester": {
                "$ref": "#/definitions/base_requester",
                "path": "/users/{{ stream_partition.user_id }}/posts",
                "http_method": "GET"
            },
            "record_selector": {
                "type": "RecordSelector",
                "extractor": {"type": "DpathExtractor", "field_path": []}
            },
            "partition_router": {
                "type": "SubstreamPartitionRouter",
                "parent_stream_configs": [{
                    "type": "ParentStreamConfig",
                    "parent_key": "id",
                    "partition_field": "user_id",
                    "stream": {"$ref": "#/definitions/streams/users"}
                }]
            }
        }
    })
}

/// A manifest in the exact shape produced by export.
pub fn manifest() -> Value {
    json!({
        "version": "6.7.0",
        "type": "DeclarativeSource",
        "check": {"type": "CheckStream", "stream_names": ["users"]},
        "definitions": {
            "base_requester": {
                "type": "HttpRequester",
                "url_base": "https://api.example.com/v1",
                "authenticator": api_key_authenticator()
            },
            "streams": {
                "users": users_stream(),
                "posts": posts_stream()
            }
        },
        "streams": [
            {"$ref": "#/definitions/streams/users"},
            {"$ref": "#/definitions/streams/posts"}
        ],
        "spec": {
            "type": "Spec",
            "connection_specification": connection_specification()
        }
    })
}

/// A manifest with inline requesters and no shared definitions.
pub fn inline_manifest(streams: Vec<Value>) -> Value {
    json!({
        "version": "6.7.0",
        "type": "DeclarativeSource",
        "check": {"type": "CheckStream", "stream_names": []},
        "streams": streams,
        "spec": {
            "type": "Spec",
            "connection_specification": connection_specification()
        }
    })
}

pub fn inline_stream(name: &str, authenticator: Value) -> Value {
    json!({
        "type": "DeclarativeStream",
        "name": name,
        "retriever": {
            "type": "SimpleRetriever",
            "requester": {
                "type": "HttpRequester",
                "url_base": "https://api.example.com/v1",
                "path": format!("/{name}"),
                "http_method": "GET",
                "authenticator": authenticator
            },
            "record_selector": {
                "type": "RecordSelector",
                "extractor": {"type": "DpathExtractor", "field_path": []}
            }
        }
    })
}

/// Builds a manifest in export shape around `streams`. Spec properties get
/// their `order` from their position.
pub fn export_manifest(
    authenticator: Option<Value>,
    streams: Vec<Value>,
    properties: Vec<(&str, Value)>,
    required: &[&str],
) -> Value {
    let mut definitions = serde_json::Map::new();
    let has_sync = streams
        .iter()
        .any(|stream| stream["retriever"]["type"] == json!("SimpleRetriever"));
    if has_sync {
        let mut base = json!({"type": "HttpRequester", "url_base": "https://api.example.com/v1"});
        if let Some(authenticator) = authenticator {
            base["authenticator"] = authenticator;
        }
        definitions.insert("base_requester".into(), base);
    }
    let names: Vec<String> = streams
        .iter()
        .map(|stream| stream["name"].as_str().unwrap_or_default().to_string())
        .collect();
    let stream_definitions: serde_json::Map<String, Value> = names
        .iter()
        .cloned()
        .zip(streams)
        .collect();
    definitions.insert("streams".into(), Value::Object(stream_definitions));

    let properties: serde_json::Map<String, Value> = properties
        .into_iter()
        .enumerate()
        .map(|(order, (key, mut definition))| {
            definition["order"] = json!(order);
            (key.to_string(), definition)
        })
        .collect();

    let check_streams = vec![names[0].clone()];
    let stream_refs: Vec<Value> = names
        .iter()
        .map(|name| json!({"$ref": format!("#/definitions/streams/{name}")}))
        .collect();

    json!({
        "version": "6.7.0",
        "type": "DeclarativeSource",
        "check": {"type": "CheckStream", "stream_names": check_streams},
        "definitions": definitions,
        "streams": stream_refs,
        "spec": {
            "type": "Spec",
            "connection_specification": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "required": required,
                "properties": properties,
                "additionalProperties": true
            }
        }
    })
}

/// A synchronous stream in export shape; `requester` and `stream` entries
/// are merged over the defaults.
pub fn sync_stream(name: &str, requester: Value, retriever: Value, stream: Value) -> Value {
    let mut base_requester = json!({
        "$ref": "#/definitions/base_requester",
        "path": format!("/{name}"),
        "http_method": "GET"
    });
    merge_into(&mut base_requester, requester);
    let mut base_retriever = json!({
        "type": "SimpleRetriever",
        "requester": base_requester,
        "record_selector": {
            "type": "RecordSelector",
            "extractor": {"type": "DpathExtractor", "field_path": []}
        }
    });
    merge_into(&mut base_retriever, retriever);
    let mut definition = json!({
        "type": "DeclarativeStream",
        "name": name,
        "retriever": base_retriever
    });
    merge_into(&mut definition, stream);
    definition
}

fn merge_into(target: &mut Value, extra: Value) {
    if let (Some(target), Value::Object(extra)) = (target.as_object_mut(), extra) {
        for (key, value) in extra {
            target.insert(key, value);
        }
    }
}

pub fn api_key_property() -> (&'static str, Value) {
    (
        "api_key",
        json!({"type": "string", "title": "API Key", "airbyte_secret": true}),
    )
}
