//! Resolved manifest → builder form values.
//!
//! Failures come in two tiers. Document and stream level problems abort the
//! conversion with a [`CompatibilityError`](crate::error::CompatibilityError).
//! Self-contained components (record selector, paginator, incremental sync,
//! error handler, transformations) degrade to their verbatim YAML instead.

mod auth;
mod components;
mod incremental;
mod partition;
mod support;

use std::cmp::Ordering;

use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::locked_inputs::derive_locked_inputs;
use crate::builder::types::{
    AsyncRequest, AsyncRequester, AsyncStatusMapping, BuilderFormInput, BuilderFormValues,
    BuilderGlobal, BuilderStream, PollingTimeout, StreamRequest, SyncRequest, YamlOr,
};
use crate::error::ConversionError;
use crate::manifest::{
    type_of, ASYNC_RETRIEVER, CHECK_DYNAMIC_STREAM, DECLARATIVE_STREAM, DPATH_EXTRACTOR,
    HTTP_REQUESTER, SIMPLE_RETRIEVER,
};
use crate::resolver::ManifestResolver;

use self::auth::{authenticator, full_url, relevant_authenticator};
use self::components::{
    decoder, error_handler, http_method, paginator, primary_key, record_selector,
    request_options, schema, transformations,
};
use self::incremental::incremental_sync;
use self::partition::{partition_routers, StreamIndex};
use self::support::{
    convert_or_dump, dump_yaml, expect_type, known_fields, string_list, unknown_fields,
    Converted, Scope,
};

const SYNC_STREAM_FIELDS: [&str; 7] = [
    "type",
    "name",
    "primary_key",
    "retriever",
    "schema_loader",
    "incremental_sync",
    "transformations",
];
const ASYNC_STREAM_FIELDS: [&str; 5] = ["type", "name", "primary_key", "retriever", "schema_loader"];
const SIMPLE_RETRIEVER_FIELDS: [&str; 6] = [
    "type",
    "requester",
    "record_selector",
    "paginator",
    "partition_router",
    "decoder",
];
const ASYNC_RETRIEVER_FIELDS: [&str; 9] = [
    "type",
    "creation_requester",
    "polling_requester",
    "download_requester",
    "status_mapping",
    "status_extractor",
    "download_target_extractor",
    "record_selector",
    "polling_job_timeout",
];
const HTTP_REQUESTER_FIELDS: [&str; 10] = [
    "type",
    "url_base",
    "path",
    "http_method",
    "authenticator",
    "request_parameters",
    "request_headers",
    "request_body_data",
    "request_body_json",
    "error_handler",
];
const ASYNC_REQUESTER_FIELDS: [&str; 10] = [
    "type",
    "url",
    "url_base",
    "path",
    "http_method",
    "request_parameters",
    "request_headers",
    "request_body_data",
    "request_body_json",
    "error_handler",
];

/// Resolves `manifest` through `resolver` and converts the result.
pub fn convert_to_builder_form_values(
    resolver: &mut dyn ManifestResolver,
    manifest: &Value,
) -> Result<BuilderFormValues, ConversionError> {
    let resolved = resolver.resolve_manifest(manifest)?;
    manifest_to_builder(&resolved)
}

/// Converts an already resolved manifest into builder form values.
pub fn manifest_to_builder(manifest: &Value) -> Result<BuilderFormValues, ConversionError> {
    let connection_spec = manifest.pointer("/spec/connection_specification");
    let scope = Scope::global(connection_spec);

    if manifest.pointer("/check/type").and_then(Value::as_str) == Some(CHECK_DYNAMIC_STREAM) {
        return scope.fail("check of type CheckDynamicStream is not supported");
    }
    let streams: &[Value] = manifest
        .get("streams")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (index, stream) in streams.iter().enumerate() {
        let kind = type_of(stream).unwrap_or_default();
        if kind != DECLARATIVE_STREAM {
            let name = stream_name(stream, index);
            return scope.fail(format!("stream {name} of type {kind} is not supported"));
        }
    }

    let first = FirstRequester::find(&scope, streams)?;
    let global = BuilderGlobal {
        url_base: first
            .url_base
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        authenticator: YamlOr::Builder(authenticator(&scope, first.authenticator)?),
    };

    let index = StreamIndex::new(streams);
    let builder_streams = streams
        .iter()
        .enumerate()
        .map(|(position, stream)| convert_stream(&scope, stream, position, &index, &first))
        .collect::<Converted<Vec<_>>>()?;

    let locked = derive_locked_inputs(&global.authenticator, &builder_streams);
    let mut inputs = spec_inputs(connection_spec);
    for input in &mut inputs {
        input.is_locked = locked.contains_key(&input.key);
    }

    let check_streams = manifest
        .pointer("/check/stream_names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(BuilderFormValues {
        global,
        inputs,
        streams: builder_streams,
        check_streams,
        description: manifest
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

pub(crate) fn stream_name(stream: &Value, index: usize) -> String {
    stream
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("stream_{index}"))
}

/// The requester of the first synchronous stream sets the shared url base
/// and authenticator.
struct FirstRequester<'a> {
    url_base: Option<&'a Value>,
    authenticator: Option<&'a Value>,
}

impl<'a> FirstRequester<'a> {
    fn find(scope: &Scope, streams: &'a [Value]) -> Converted<Self> {
        for (index, stream) in streams.iter().enumerate() {
            let Some(retriever) = stream.get("retriever") else {
                continue;
            };
            if type_of(retriever) != Some(SIMPLE_RETRIEVER) {
                continue;
            }
            let name = stream_name(stream, index);
            let Some(requester) = retriever.get("requester") else {
                return scope.for_stream(&name).fail("SimpleRetriever.requester is required");
            };
            expect_type(&scope.for_stream(&name), requester, "requester", HTTP_REQUESTER)?;
            return Ok(Self {
                url_base: requester.get("url_base"),
                authenticator: requester.get("authenticator"),
            });
        }
        Ok(Self {
            url_base: None,
            authenticator: None,
        })
    }
}

fn convert_stream(
    scope: &Scope,
    stream: &Value,
    position: usize,
    index: &StreamIndex,
    first: &FirstRequester,
) -> Converted<BuilderStream> {
    let name = stream_name(stream, position);
    let scope = scope.for_stream(&name);
    let Some(stream_map) = stream.as_object() else {
        return scope.fail("stream must be an object");
    };
    let Some(retriever) = stream_map.get("retriever") else {
        return scope.fail("stream has no retriever");
    };
    let converted = match type_of(retriever) {
        Some(SIMPLE_RETRIEVER) => sync_stream(&scope, stream_map, retriever, position, index, first)?,
        Some(ASYNC_RETRIEVER) => async_stream(&scope, stream_map, retriever)?,
        _ => {
            return scope.fail(format!(
                "doesn't use a {SIMPLE_RETRIEVER} or {ASYNC_RETRIEVER}"
            ))
        }
    };
    let primary_key = primary_key(&scope, stream_map.get("primary_key"))?;
    let schema = schema(&scope, stream_map.get("schema_loader"))?;
    debug!(stream = %name, "converted stream to builder form");
    Ok(BuilderStream {
        id: position.to_string(),
        name: name.clone(),
        primary_key,
        schema,
        unsupported_fields: converted.unsupported_fields,
        request: converted.request,
    })
}

struct ConvertedRequest {
    request: StreamRequest,
    unsupported_fields: Option<String>,
}

fn sync_stream(
    scope: &Scope,
    stream_map: &Map<String, Value>,
    retriever: &Value,
    position: usize,
    index: &StreamIndex,
    first: &FirstRequester,
) -> Converted<ConvertedRequest> {
    let retriever_map = retriever
        .as_object()
        .ok_or_else(|| scope.error("retriever must be an object"))?;
    let Some(requester) = retriever_map.get("requester") else {
        return scope.fail("SimpleRetriever.requester is required");
    };
    expect_type(scope, requester, "requester", HTTP_REQUESTER)?;
    let requester_map = requester
        .as_object()
        .ok_or_else(|| scope.error("requester must be an object"))?;

    if requester_map.get("url_base") != first.url_base {
        return scope.fail("url_base does not match the first stream's");
    }
    if relevant_authenticator(requester_map.get("authenticator"))
        != relevant_authenticator(first.authenticator)
    {
        return scope.fail("authenticator does not match the first stream's");
    }

    let routing = partition_routers(scope, retriever_map.get("partition_router"), position, index)?;
    let request = SyncRequest {
        url_path: requester_map
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        http_method: http_method(scope, requester_map.get("http_method"))?,
        decoder: decoder(scope, retriever_map.get("decoder"))?,
        request_options: request_options(scope, requester_map)?,
        record_selector: convert_or_dump(
            scope,
            retriever_map.get("record_selector"),
            "record_selector",
            |value| record_selector(scope, value),
        )?,
        paginator: convert_or_dump(scope, retriever_map.get("paginator"), "paginator", |value| {
            paginator(scope, value)
        })?,
        incremental_sync: convert_or_dump(
            scope,
            stream_map.get("incremental_sync"),
            "incremental_sync",
            |value| incremental_sync(scope, value),
        )?,
        parent_stream: routing.parent_stream,
        parameterized_requests: routing.parameterized_requests,
        error_handler: convert_or_dump(
            scope,
            requester_map.get("error_handler"),
            "error_handler",
            |value| error_handler(scope, value),
        )?,
        transformations: convert_or_dump(
            scope,
            stream_map.get("transformations"),
            "transformations",
            |value| transformations(scope, value),
        )?,
    };

    let mut retriever_extra = unknown_fields(retriever_map, &SIMPLE_RETRIEVER_FIELDS);
    let requester_extra = unknown_fields(requester_map, &HTTP_REQUESTER_FIELDS);
    if !requester_extra.is_empty() {
        retriever_extra.insert("requester".into(), Value::Object(requester_extra));
    }
    Ok(ConvertedRequest {
        request: StreamRequest::Sync(request),
        unsupported_fields: unsupported_bag(stream_map, &SYNC_STREAM_FIELDS, retriever_extra)?,
    })
}

fn async_stream(
    scope: &Scope,
    stream_map: &Map<String, Value>,
    retriever: &Value,
) -> Converted<ConvertedRequest> {
    let retriever_map = retriever
        .as_object()
        .ok_or_else(|| scope.error("retriever must be an object"))?;
    let mut retriever_extra = unknown_fields(retriever_map, &ASYNC_RETRIEVER_FIELDS);

    let mut requester = |field: &str| -> Converted<AsyncRequester> {
        let Some(requester) = retriever_map.get(field) else {
            return scope.fail(format!("AsyncRetriever.{field} is required"));
        };
        let (converted, extra) = async_requester(scope, requester, field)?;
        if !extra.is_empty() {
            retriever_extra.insert(field.to_string(), Value::Object(extra));
        }
        Ok(converted)
    };
    let creation_requester = requester("creation_requester")?;
    let polling_requester = requester("polling_requester")?;
    let download_requester = requester("download_requester")?;

    let status_mapping = match retriever_map.get("status_mapping") {
        None => AsyncStatusMapping::default(),
        Some(mapping) => {
            known_fields(
                scope,
                mapping,
                "status_mapping",
                &["type", "completed", "failed", "running", "timeout"],
            )?;
            serde_json::from_value(mapping.clone())
                .map_err(|err| scope.error(format!("status_mapping is invalid: {err}")))?
        }
    };
    let polling_timeout = match retriever_map.get("polling_job_timeout") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => Some(PollingTimeout::Number(
            number
                .as_i64()
                .ok_or_else(|| scope.error("polling_job_timeout must be an integer"))?,
        )),
        Some(Value::String(text)) => Some(PollingTimeout::Custom(text.clone())),
        Some(_) => return scope.fail("polling_job_timeout must be a number or a string"),
    };

    let request = AsyncRequest {
        creation_requester,
        polling_requester,
        download_requester,
        status_mapping,
        status_extractor: dpath_extractor(scope, retriever_map.get("status_extractor"), "status_extractor")?,
        download_target_extractor: dpath_extractor(
            scope,
            retriever_map.get("download_target_extractor"),
            "download_target_extractor",
        )?,
        record_selector: convert_or_dump(
            scope,
            retriever_map.get("record_selector"),
            "record_selector",
            |value| record_selector(scope, value),
        )?,
        polling_timeout,
    };
    Ok(ConvertedRequest {
        request: StreamRequest::Async(request),
        unsupported_fields: unsupported_bag(stream_map, &ASYNC_STREAM_FIELDS, retriever_extra)?,
    })
}

fn async_requester(
    scope: &Scope,
    requester: &Value,
    field: &str,
) -> Converted<(AsyncRequester, Map<String, Value>)> {
    expect_type(scope, requester, field, HTTP_REQUESTER)?;
    let requester_map = requester
        .as_object()
        .ok_or_else(|| scope.error(format!("{field} must be an object")))?;
    let converted = AsyncRequester {
        url: full_url(requester_map),
        http_method: http_method(scope, requester_map.get("http_method"))?,
        request_options: request_options(scope, requester_map)?,
        error_handler: convert_or_dump(
            scope,
            requester_map.get("error_handler"),
            "error_handler",
            |value| error_handler(scope, value),
        )?,
    };
    Ok((converted, unknown_fields(requester_map, &ASYNC_REQUESTER_FIELDS)))
}

fn dpath_extractor(scope: &Scope, value: Option<&Value>, field: &str) -> Converted<Vec<String>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let map = known_fields(scope, value, field, &["type", "field_path"])?;
    expect_type(scope, value, field, DPATH_EXTRACTOR)?;
    match map.get("field_path") {
        None => Ok(Vec::new()),
        Some(path) => string_list(scope, path, &format!("{field}.field_path")),
    }
}

fn unsupported_bag(
    stream_map: &Map<String, Value>,
    known: &[&str],
    retriever_extra: Map<String, Value>,
) -> Converted<Option<String>> {
    let mut bag = unknown_fields(stream_map, known);
    if !retriever_extra.is_empty() {
        bag.insert("retriever".into(), Value::Object(retriever_extra));
    }
    if bag.is_empty() {
        return Ok(None);
    }
    Ok(Some(dump_yaml(&Value::Object(bag))?))
}

/// Spec properties ordered by their `order` attribute; unordered properties
/// follow in declaration order.
fn spec_inputs(connection_spec: Option<&Value>) -> Vec<BuilderFormInput> {
    let Some(spec) = connection_spec else {
        return Vec::new();
    };
    let required: Vec<&str> = spec
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(properties) = spec.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut entries: Vec<(&String, &Value)> = properties.iter().collect();
    entries.sort_by(|(_, a), (_, b)| {
        let a = a.get("order").and_then(Value::as_f64);
        let b = b.get("order").and_then(Value::as_f64);
        match (a, b) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });

    entries
        .into_iter()
        .enumerate()
        .map(|(position, (key, definition))| {
            let mut definition = definition.as_object().cloned().unwrap_or_default();
            definition.insert("order".into(), Value::from(position));
            BuilderFormInput {
                key: key.clone(),
                required: required.contains(&key.as_str()),
                definition,
                is_locked: false,
            }
        })
        .collect()
}
