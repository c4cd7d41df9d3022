//! Builder form values → declarative manifest.
//!
//! This direction never fails. YAML fragments that do not parse are carried
//! into the manifest as plain strings so nothing the user typed is lost.

mod auth;

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::builder::types::{
    AsyncRequest, AsyncRequester, BuilderBackoffStrategy, BuilderCursor, BuilderDatetime,
    BuilderDecoder, BuilderErrorHandler, BuilderFormValues, BuilderIncrementalSync,
    BuilderPaginationStrategy, BuilderPaginator, BuilderParameterizedRequests,
    BuilderParentStream, BuilderRecordSelector, BuilderRequestBody, BuilderRequestOption,
    BuilderRequestOptions, BuilderResponseFilter, BuilderStream, BuilderTransformation,
    FilterMode, InjectInto, ListValues, PollingTimeout, StreamRequest, SyncRequest, YamlOr,
};
use crate::manifest::{
    deep_merge, ADD_FIELDS, ASYNC_RETRIEVER, BASE_REQUESTER_REF, CANONICAL_DATETIME_FORMAT,
    CHECK_STREAM, COMPOSITE_ERROR_HANDLER, DATETIME_BASED_CURSOR, DECLARATIVE_SOURCE,
    DECLARATIVE_STREAM, DEFAULT_ERROR_HANDLER, DEFAULT_MANIFEST_VERSION, DEFAULT_PAGINATOR,
    DPATH_EXTRACTOR, HTTP_REQUESTER, HTTP_RESPONSE_FILTER, INLINE_SCHEMA_LOADER,
    JSON_SCHEMA_DRAFT, LIST_PARTITION_ROUTER, MIN_MAX_DATETIME, NOW_UTC_SENTINEL,
    PARENT_STREAM_CONFIG, RECORD_FILTER, RECORD_SELECTOR, REMOVE_FIELDS, REQUEST_OPTION,
    REQUEST_PATH, SIMPLE_RETRIEVER, SPEC, STREAM_REF_PREFIX, SUBSTREAM_PARTITION_ROUTER,
};

/// Settings for manifest generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestOptions {
    pub version: String,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_MANIFEST_VERSION.to_string(),
        }
    }
}

pub fn builder_to_manifest(values: &BuilderFormValues) -> Value {
    builder_to_manifest_with(values, &ManifestOptions::default())
}

pub fn builder_to_manifest_with(values: &BuilderFormValues, options: &ManifestOptions) -> Value {
    let names: HashMap<&str, &str> = values
        .streams
        .iter()
        .map(|stream| (stream.id.as_str(), stream.name.as_str()))
        .collect();

    let mut definitions = Map::new();
    if values.streams.iter().any(|stream| stream.sync_request().is_some()) {
        let mut base = Map::new();
        base.insert("type".into(), json!(HTTP_REQUESTER));
        base.insert("url_base".into(), json!(values.global.url_base));
        let authenticator = match &values.global.authenticator {
            YamlOr::Builder(authenticator) => auth::authenticator(authenticator),
            YamlOr::Yaml(text) => yaml_fragment(text, "authenticator", None),
        };
        insert_some(&mut base, "authenticator", authenticator);
        definitions.insert("base_requester".into(), Value::Object(base));
    }

    let mut stream_definitions = Map::new();
    let mut stream_refs = Vec::new();
    for stream in &values.streams {
        if stream_definitions.contains_key(&stream.name) {
            warn!(stream = %stream.name, "duplicate stream name overwrites earlier definition");
        }
        stream_definitions.insert(stream.name.clone(), stream_manifest(stream, &names));
        stream_refs.push(json!({"$ref": stream_ref(&stream.name)}));
        debug!(stream = %stream.name, "converted stream to manifest");
    }
    definitions.insert("streams".into(), Value::Object(stream_definitions));

    let mut manifest = Map::new();
    manifest.insert("version".into(), json!(options.version));
    manifest.insert("type".into(), json!(DECLARATIVE_SOURCE));
    insert_some(
        &mut manifest,
        "description",
        values.description.as_ref().map(|d| json!(d)),
    );
    manifest.insert(
        "check".into(),
        json!({"type": CHECK_STREAM, "stream_names": values.check_streams}),
    );
    manifest.insert("definitions".into(), Value::Object(definitions));
    manifest.insert("streams".into(), Value::Array(stream_refs));
    manifest.insert("spec".into(), spec(values));
    Value::Object(manifest)
}

fn stream_ref(name: &str) -> String {
    let escaped = name.replace('~', "~0").replace('/', "~1");
    format!("{STREAM_REF_PREFIX}{escaped}")
}

fn spec(values: &BuilderFormValues) -> Value {
    let required: Vec<&str> = values
        .inputs
        .iter()
        .filter(|input| input.required)
        .map(|input| input.key.as_str())
        .collect();
    let properties: Map<String, Value> = values
        .inputs
        .iter()
        .enumerate()
        .map(|(order, input)| {
            let mut definition = input.definition.clone();
            definition.insert("order".into(), json!(order));
            (input.key.clone(), Value::Object(definition))
        })
        .collect();
    json!({
        "type": SPEC,
        "connection_specification": {
            "$schema": JSON_SCHEMA_DRAFT,
            "type": "object",
            "required": required,
            "properties": properties,
            "additionalProperties": true
        }
    })
}

pub(super) fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

/// Parses a YAML escape hatch; text that is not valid YAML is kept as a
/// string. Empty fragments yield nothing.
fn yaml_fragment(text: &str, component: &str, stream: Option<&str>) -> Option<Value> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                stream = stream.unwrap_or_default(),
                component,
                error = %err,
                "YAML fragment does not parse, keeping it as text"
            );
            Some(Value::String(text.to_string()))
        }
    }
}

fn stream_manifest(stream: &BuilderStream, names: &HashMap<&str, &str>) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(DECLARATIVE_STREAM));
    map.insert("name".into(), json!(stream.name));
    if !stream.primary_key.is_empty() {
        map.insert("primary_key".into(), json!(stream.primary_key));
    }

    match &stream.request {
        StreamRequest::Sync(request) => sync_stream(&mut map, stream, request, names),
        StreamRequest::Async(request) => {
            map.insert("retriever".into(), async_retriever(stream, request));
        }
    }

    if let Some(schema) = &stream.schema {
        match serde_json::from_str::<Value>(schema) {
            Ok(schema) => {
                map.insert(
                    "schema_loader".into(),
                    json!({"type": INLINE_SCHEMA_LOADER, "schema": schema}),
                );
            }
            Err(err) => warn!(stream = %stream.name, error = %err, "schema is not valid JSON, dropping it"),
        }
    }

    let mut manifest = Value::Object(map);
    if let Some(bag) = &stream.unsupported_fields {
        match yaml_fragment(bag, "unsupported_fields", Some(&stream.name)) {
            Some(extra @ Value::Object(_)) => deep_merge(&mut manifest, extra),
            Some(_) => warn!(stream = %stream.name, "unsupported fields are not an object, ignoring them"),
            None => {}
        }
    }
    manifest
}

fn sync_stream(
    map: &mut Map<String, Value>,
    stream: &BuilderStream,
    request: &SyncRequest,
    names: &HashMap<&str, &str>,
) {
    let name = stream.name.as_str();
    let mut requester = Map::new();
    requester.insert("$ref".into(), json!(BASE_REQUESTER_REF));
    requester.insert("path".into(), json!(request.url_path));
    requester.insert("http_method".into(), json!(request.http_method.as_str()));
    requester_options(&mut requester, &request.request_options);
    if let Some(handlers) = &request.error_handler {
        insert_some(&mut requester, "error_handler", yaml_or_error_handlers(handlers, name));
    }

    let mut retriever = Map::new();
    retriever.insert("type".into(), json!(SIMPLE_RETRIEVER));
    retriever.insert("requester".into(), Value::Object(requester));
    retriever.insert(
        "record_selector".into(),
        record_selector_or_default(request.record_selector.as_ref(), name),
    );
    if let Some(paginator) = &request.paginator {
        let value = match paginator {
            YamlOr::Builder(paginator) => Some(paginator_manifest(paginator)),
            YamlOr::Yaml(text) => yaml_fragment(text, "paginator", Some(name)),
        };
        insert_some(&mut retriever, "paginator", value);
    }
    let mut routers = partition_routers(request, name, names);
    if routers.len() > 1 {
        retriever.insert("partition_router".into(), Value::Array(routers));
    } else if let Some(router) = routers.pop() {
        retriever.insert("partition_router".into(), router);
    }
    insert_some(&mut retriever, "decoder", decoder(&request.decoder));
    map.insert("retriever".into(), Value::Object(retriever));

    if let Some(incremental) = &request.incremental_sync {
        let value = match incremental {
            YamlOr::Builder(incremental) => Some(incremental_sync(incremental)),
            YamlOr::Yaml(text) => yaml_fragment(text, "incremental_sync", Some(name)),
        };
        insert_some(map, "incremental_sync", value);
    }
    if let Some(transformations) = &request.transformations {
        let value = match transformations {
            YamlOr::Builder(list) if list.is_empty() => None,
            YamlOr::Builder(list) => Some(Value::Array(list.iter().map(transformation).collect())),
            YamlOr::Yaml(text) => yaml_fragment(text, "transformations", Some(name)),
        };
        insert_some(map, "transformations", value);
    }
}

fn async_retriever(stream: &BuilderStream, request: &AsyncRequest) -> Value {
    let name = stream.name.as_str();
    let mapping = &request.status_mapping;
    let mut retriever = Map::new();
    retriever.insert("type".into(), json!(ASYNC_RETRIEVER));
    retriever.insert(
        "creation_requester".into(),
        async_requester(&request.creation_requester, name),
    );
    retriever.insert(
        "polling_requester".into(),
        async_requester(&request.polling_requester, name),
    );
    retriever.insert(
        "download_requester".into(),
        async_requester(&request.download_requester, name),
    );
    retriever.insert(
        "status_mapping".into(),
        json!({
            "type": "AsyncJobStatusMap",
            "completed": mapping.completed,
            "failed": mapping.failed,
            "running": mapping.running,
            "timeout": mapping.timeout,
        }),
    );
    retriever.insert(
        "status_extractor".into(),
        dpath_extractor(&request.status_extractor),
    );
    retriever.insert(
        "download_target_extractor".into(),
        dpath_extractor(&request.download_target_extractor),
    );
    retriever.insert(
        "record_selector".into(),
        record_selector_or_default(request.record_selector.as_ref(), name),
    );
    if let Some(timeout) = &request.polling_timeout {
        let value = match timeout {
            PollingTimeout::Number(minutes) => json!(minutes),
            PollingTimeout::Custom(text) => json!(text),
        };
        retriever.insert("polling_job_timeout".into(), value);
    }
    Value::Object(retriever)
}

fn async_requester(requester: &AsyncRequester, stream: &str) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(HTTP_REQUESTER));
    map.insert("url_base".into(), json!(requester.url));
    map.insert("http_method".into(), json!(requester.http_method.as_str()));
    requester_options(&mut map, &requester.request_options);
    if let Some(handlers) = &requester.error_handler {
        insert_some(&mut map, "error_handler", yaml_or_error_handlers(handlers, stream));
    }
    Value::Object(map)
}

fn dpath_extractor(path: &[String]) -> Value {
    json!({"type": DPATH_EXTRACTOR, "field_path": path})
}

pub(super) fn requester_options(map: &mut Map<String, Value>, options: &BuilderRequestOptions) {
    if !options.request_parameters.is_empty() {
        map.insert(
            "request_parameters".into(),
            pairs_object(&options.request_parameters),
        );
    }
    if !options.request_headers.is_empty() {
        map.insert("request_headers".into(), pairs_object(&options.request_headers));
    }
    match &options.request_body {
        BuilderRequestBody::JsonList { values } if values.is_empty() => {}
        BuilderRequestBody::JsonList { values } => {
            map.insert("request_body_json".into(), pairs_object(values));
        }
        BuilderRequestBody::FormList { values } => {
            map.insert("request_body_data".into(), pairs_object(values));
        }
        BuilderRequestBody::StringFreeform { value } => {
            map.insert("request_body_data".into(), json!(value));
        }
        BuilderRequestBody::JsonString { value } => {
            map.insert("request_body_json".into(), json!(value));
        }
        BuilderRequestBody::JsonFreeform { value } => {
            let body = serde_json::from_str::<Value>(value).unwrap_or_else(|err| {
                warn!(error = %err, "request body is not valid JSON, sending it as text");
                Value::String(value.clone())
            });
            map.insert("request_body_json".into(), body);
        }
    }
}

fn pairs_object(pairs: &[(String, String)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(key, value)| (key.clone(), json!(value)))
            .collect(),
    )
}

pub(super) fn request_option(option: &BuilderRequestOption) -> Value {
    if option.inject_into == InjectInto::Path {
        return json!({"type": REQUEST_PATH});
    }
    let mut map = Map::new();
    map.insert("type".into(), json!(REQUEST_OPTION));
    map.insert("inject_into".into(), json!(option.inject_into.as_str()));
    insert_some(&mut map, "field_name", option.field_name.as_ref().map(|n| json!(n)));
    insert_some(&mut map, "field_path", option.field_path.as_ref().map(|p| json!(p)));
    Value::Object(map)
}

fn decoder(decoder: &BuilderDecoder) -> Option<Value> {
    match decoder {
        BuilderDecoder::Json => None,
        other => Some(decoder_value(other)),
    }
}

fn decoder_value(decoder: &BuilderDecoder) -> Value {
    match decoder {
        BuilderDecoder::Json => json!({"type": "JsonDecoder"}),
        BuilderDecoder::Xml => json!({"type": "XmlDecoder"}),
        BuilderDecoder::JsonLines => json!({"type": "JsonlDecoder"}),
        BuilderDecoder::Iterable => json!({"type": "IterableDecoder"}),
        BuilderDecoder::Csv {
            delimiter,
            encoding,
        } => {
            let mut map = Map::new();
            map.insert("type".into(), json!("CsvDecoder"));
            insert_some(&mut map, "delimiter", delimiter.as_ref().map(|d| json!(d)));
            insert_some(&mut map, "encoding", encoding.as_ref().map(|e| json!(e)));
            Value::Object(map)
        }
        BuilderDecoder::Gzip { decoder } => {
            json!({"type": "GzipDecoder", "decoder": decoder_value(decoder)})
        }
        BuilderDecoder::Zip { decoder } => {
            json!({"type": "ZipfileDecoder", "decoder": decoder_value(decoder)})
        }
    }
}

fn record_selector_or_default(
    selector: Option<&YamlOr<BuilderRecordSelector>>,
    stream: &str,
) -> Value {
    let default = BuilderRecordSelector {
        field_path: Vec::new(),
        filter_condition: None,
        normalize_to_schema: false,
    };
    match selector {
        None => record_selector(&default),
        Some(YamlOr::Builder(selector)) => record_selector(selector),
        Some(YamlOr::Yaml(text)) => yaml_fragment(text, "record_selector", Some(stream))
            .unwrap_or_else(|| record_selector(&default)),
    }
}

fn record_selector(selector: &BuilderRecordSelector) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(RECORD_SELECTOR));
    map.insert("extractor".into(), dpath_extractor(&selector.field_path));
    if let Some(condition) = &selector.filter_condition {
        map.insert(
            "record_filter".into(),
            json!({"type": RECORD_FILTER, "condition": condition}),
        );
    }
    if selector.normalize_to_schema {
        map.insert("schema_normalization".into(), json!("Default"));
    }
    Value::Object(map)
}

fn paginator_manifest(paginator: &BuilderPaginator) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(DEFAULT_PAGINATOR));
    map.insert(
        "pagination_strategy".into(),
        pagination_strategy(&paginator.strategy),
    );
    insert_some(
        &mut map,
        "page_token_option",
        paginator.page_token_option.as_ref().map(request_option),
    );
    insert_some(
        &mut map,
        "page_size_option",
        paginator.page_size_option.as_ref().map(request_option),
    );
    Value::Object(map)
}

fn pagination_strategy(strategy: &BuilderPaginationStrategy) -> Value {
    let mut map = Map::new();
    match strategy {
        BuilderPaginationStrategy::OffsetIncrement {
            page_size,
            inject_on_first_request,
        } => {
            map.insert("type".into(), json!("OffsetIncrement"));
            insert_some(&mut map, "page_size", page_size.clone());
            insert_some(
                &mut map,
                "inject_on_first_request",
                inject_on_first_request.map(Value::Bool),
            );
        }
        BuilderPaginationStrategy::PageIncrement {
            page_size,
            start_from_page,
            inject_on_first_request,
        } => {
            map.insert("type".into(), json!("PageIncrement"));
            insert_some(&mut map, "page_size", page_size.clone());
            insert_some(&mut map, "start_from_page", start_from_page.map(Value::from));
            insert_some(
                &mut map,
                "inject_on_first_request",
                inject_on_first_request.map(Value::Bool),
            );
        }
        BuilderPaginationStrategy::CursorPagination { page_size, cursor } => {
            map.insert("type".into(), json!("CursorPagination"));
            let (cursor_value, stop_condition) = cursor_expressions(cursor);
            map.insert("cursor_value".into(), json!(cursor_value));
            insert_some(&mut map, "stop_condition", stop_condition.map(Value::String));
            insert_some(&mut map, "page_size", page_size.clone());
        }
    }
    Value::Object(map)
}

fn cursor_expressions(cursor: &BuilderCursor) -> (String, Option<String>) {
    let (source, path) = match cursor {
        BuilderCursor::Response { path } => ("response", path),
        BuilderCursor::Headers { path } => ("headers", path),
        BuilderCursor::Custom {
            cursor_value,
            stop_condition,
        } => return (cursor_value.clone(), stop_condition.clone()),
    };
    let chain: String = path.iter().map(|segment| access_segment(segment)).collect();
    (
        format!("{{{{ {source}{chain} }}}}"),
        Some(format!("{{{{ not {source}{chain} }}}}")),
    )
}

fn access_segment(segment: &str) -> String {
    let digits = segment.strip_prefix('-').unwrap_or(segment);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("[{segment}]")
    } else {
        format!(".get(\"{segment}\", {{}})")
    }
}

fn partition_routers(
    request: &SyncRequest,
    stream: &str,
    names: &HashMap<&str, &str>,
) -> Vec<Value> {
    let mut routers = Vec::new();
    match &request.parameterized_requests {
        None => {}
        Some(YamlOr::Builder(requests)) => routers.extend(requests.iter().map(list_router)),
        Some(YamlOr::Yaml(text)) => match yaml_fragment(text, "parameterized_requests", Some(stream)) {
            Some(Value::Array(items)) => routers.extend(items),
            Some(other) => routers.push(other),
            None => {}
        },
    }
    match &request.parent_stream {
        None => {}
        Some(YamlOr::Builder(parent)) => {
            routers.extend(substream_router(parent, stream, names));
        }
        Some(YamlOr::Yaml(text)) => match yaml_fragment(text, "parent_stream", Some(stream)) {
            Some(Value::Array(items)) => routers.extend(items),
            Some(other) => routers.push(other),
            None => {}
        },
    }
    routers
}

fn list_router(request: &BuilderParameterizedRequests) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(LIST_PARTITION_ROUTER));
    map.insert("cursor_field".into(), json!(request.cursor_field));
    let values = match &request.values {
        ListValues::List(values) => json!(values),
        ListValues::Variable(variable) => json!(variable),
    };
    map.insert("values".into(), values);
    insert_some(
        &mut map,
        "request_option",
        request.request_option.as_ref().map(request_option),
    );
    Value::Object(map)
}

fn substream_router(
    parent: &BuilderParentStream,
    stream: &str,
    names: &HashMap<&str, &str>,
) -> Option<Value> {
    let Some(parent_name) = names.get(parent.parent_stream_reference.as_str()) else {
        warn!(
            stream,
            reference = %parent.parent_stream_reference,
            "parent stream reference does not match any stream, dropping it"
        );
        return None;
    };
    let mut config = Map::new();
    config.insert("type".into(), json!(PARENT_STREAM_CONFIG));
    config.insert("parent_key".into(), json!(parent.parent_key));
    config.insert("partition_field".into(), json!(parent.partition_field));
    config.insert("stream".into(), json!({"$ref": stream_ref(parent_name)}));
    insert_some(
        &mut config,
        "request_option",
        parent.request_option.as_ref().map(request_option),
    );
    insert_some(
        &mut config,
        "incremental_dependency",
        parent.incremental_dependency.map(Value::Bool),
    );
    Some(json!({
        "type": SUBSTREAM_PARTITION_ROUTER,
        "parent_stream_configs": [config],
    }))
}

fn incremental_sync(incremental: &BuilderIncrementalSync) -> Value {
    let datetime_format = incremental
        .datetime_format
        .clone()
        .or_else(|| incremental.cursor_datetime_formats.first().cloned())
        .unwrap_or_default();

    let mut map = Map::new();
    map.insert("type".into(), json!(DATETIME_BASED_CURSOR));
    map.insert("cursor_field".into(), json!(incremental.cursor_field));
    map.insert("datetime_format".into(), json!(datetime_format));
    map.insert(
        "cursor_datetime_formats".into(),
        json!(incremental.cursor_datetime_formats),
    );
    map.insert(
        "start_datetime".into(),
        datetime(&incremental.start_datetime),
    );
    let emit_end = match incremental.filter_mode {
        FilterMode::Range => true,
        FilterMode::NoFilter => incremental.end_datetime != BuilderDatetime::Now,
        FilterMode::Start => false,
    };
    if emit_end {
        map.insert("end_datetime".into(), datetime(&incremental.end_datetime));
    }
    if incremental.filter_mode == FilterMode::NoFilter {
        map.insert("is_data_feed".into(), Value::Bool(true));
    }
    insert_some(
        &mut map,
        "start_time_option",
        incremental.start_time_option.as_ref().map(request_option),
    );
    insert_some(
        &mut map,
        "end_time_option",
        incremental.end_time_option.as_ref().map(request_option),
    );
    insert_some(
        &mut map,
        "lookback_window",
        incremental.lookback_window.as_ref().map(|w| json!(w)),
    );
    if let Some(slicer) = &incremental.slicer {
        map.insert("step".into(), json!(slicer.step));
        map.insert("cursor_granularity".into(), json!(slicer.cursor_granularity));
    }
    Value::Object(map)
}

fn datetime(datetime: &BuilderDatetime) -> Value {
    let (value, format) = match datetime {
        BuilderDatetime::UserInput { value } => (value.as_str(), Some(CANONICAL_DATETIME_FORMAT)),
        BuilderDatetime::Now => (NOW_UTC_SENTINEL, Some(CANONICAL_DATETIME_FORMAT)),
        BuilderDatetime::Custom { value, format } => (value.as_str(), format.as_deref()),
    };
    let mut map = Map::new();
    map.insert("type".into(), json!(MIN_MAX_DATETIME));
    map.insert("datetime".into(), json!(value));
    insert_some(&mut map, "datetime_format", format.map(|f| json!(f)));
    Value::Object(map)
}

fn yaml_or_error_handlers(handlers: &YamlOr<Vec<BuilderErrorHandler>>, stream: &str) -> Option<Value> {
    match handlers {
        YamlOr::Builder(handlers) => error_handlers(handlers),
        YamlOr::Yaml(text) => yaml_fragment(text, "error_handler", Some(stream)),
    }
}

/// One handler becomes a `DefaultErrorHandler`, several are wrapped in a
/// `CompositeErrorHandler`.
pub(super) fn error_handlers(handlers: &[BuilderErrorHandler]) -> Option<Value> {
    match handlers {
        [] => None,
        [single] => Some(error_handler(single)),
        several => Some(json!({
            "type": COMPOSITE_ERROR_HANDLER,
            "error_handlers": several.iter().map(error_handler).collect::<Vec<_>>(),
        })),
    }
}

fn error_handler(handler: &BuilderErrorHandler) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(DEFAULT_ERROR_HANDLER));
    insert_some(&mut map, "max_retries", handler.max_retries.map(Value::from));
    if let Some(strategy) = &handler.backoff_strategy {
        map.insert("backoff_strategies".into(), json!([backoff_strategy(strategy)]));
    }
    if let Some(filter) = &handler.response_filter {
        map.insert("response_filters".into(), json!([response_filter(filter)]));
    }
    Value::Object(map)
}

fn backoff_strategy(strategy: &BuilderBackoffStrategy) -> Value {
    let mut map = Map::new();
    match strategy {
        BuilderBackoffStrategy::ConstantBackoffStrategy {
            backoff_time_in_seconds,
        } => {
            map.insert("type".into(), json!("ConstantBackoffStrategy"));
            map.insert(
                "backoff_time_in_seconds".into(),
                Value::Number(backoff_time_in_seconds.clone()),
            );
        }
        BuilderBackoffStrategy::ExponentialBackoffStrategy { factor } => {
            map.insert("type".into(), json!("ExponentialBackoffStrategy"));
            insert_some(&mut map, "factor", factor.clone().map(Value::Number));
        }
        BuilderBackoffStrategy::WaitTimeFromHeader {
            header,
            regex,
            max_waiting_time_in_seconds,
        } => {
            map.insert("type".into(), json!("WaitTimeFromHeader"));
            map.insert("header".into(), json!(header));
            insert_some(&mut map, "regex", regex.as_ref().map(|r| json!(r)));
            insert_some(
                &mut map,
                "max_waiting_time_in_seconds",
                max_waiting_time_in_seconds.clone().map(Value::Number),
            );
        }
        BuilderBackoffStrategy::WaitUntilTimeFromHeader {
            header,
            regex,
            min_wait,
        } => {
            map.insert("type".into(), json!("WaitUntilTimeFromHeader"));
            map.insert("header".into(), json!(header));
            insert_some(&mut map, "regex", regex.as_ref().map(|r| json!(r)));
            insert_some(&mut map, "min_wait", min_wait.clone().map(Value::Number));
        }
    }
    Value::Object(map)
}

fn response_filter(filter: &BuilderResponseFilter) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(HTTP_RESPONSE_FILTER));
    insert_some(&mut map, "action", filter.action.as_ref().map(|a| json!(a)));
    insert_some(
        &mut map,
        "error_message",
        filter.error_message.as_ref().map(|m| json!(m)),
    );
    insert_some(
        &mut map,
        "error_message_contains",
        filter.error_message_contains.as_ref().map(|m| json!(m)),
    );
    if let Some(codes) = &filter.http_codes {
        let codes: Vec<Value> = codes
            .iter()
            .map(|code| {
                code.trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| json!(code))
            })
            .collect();
        map.insert("http_codes".into(), Value::Array(codes));
    }
    insert_some(
        &mut map,
        "predicate",
        filter.predicate.as_ref().map(|p| json!(p)),
    );
    Value::Object(map)
}

fn transformation(transformation: &BuilderTransformation) -> Value {
    match transformation {
        BuilderTransformation::Add { path, value } => json!({
            "type": ADD_FIELDS,
            "fields": [{"type": "AddedFieldDefinition", "path": path, "value": value}],
        }),
        BuilderTransformation::Remove { path } => json!({
            "type": REMOVE_FIELDS,
            "field_pointers": [path],
        }),
    }
}
