use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use super::support::{
    expect_type, known_fields, number, optional_bool, optional_string, required_string,
    string_list, string_pairs, Converted, Scope,
};
use crate::builder::types::{
    BuilderBackoffStrategy, BuilderCursor, BuilderDecoder, BuilderErrorHandler,
    BuilderPaginationStrategy, BuilderPaginator, BuilderRecordSelector, BuilderRequestBody,
    BuilderRequestOption, BuilderRequestOptions, BuilderResponseFilter, BuilderTransformation,
    HttpMethod, InjectInto,
};
use crate::manifest::{
    sort_keys, to_pretty_json, type_of, ADD_FIELDS, COMPOSITE_ERROR_HANDLER,
    DEFAULT_ERROR_HANDLER, DEFAULT_PAGINATOR, DPATH_EXTRACTOR, HTTP_RESPONSE_FILTER,
    INLINE_SCHEMA_LOADER, NO_PAGINATION, RECORD_FILTER, RECORD_SELECTOR, REMOVE_FIELDS,
    REQUEST_OPTION, REQUEST_PATH,
};

static SAFE_ACCESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\{\{ (response|headers)((?:\.get\("[^"]+", \{\}\)|\[-?\d+\])+) \}\}$"#)
        .expect("valid access pattern")
});
static SAFE_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\{\{ not (response|headers)((?:\.get\("[^"]+", \{\}\)|\[-?\d+\])+) \}\}$"#)
        .expect("valid stop pattern")
});
static ACCESS_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\.get\("([^"]+)", \{\}\)|\[(-?\d+)\]"#).expect("valid segment pattern")
});

pub(crate) fn http_method(scope: &Scope, value: Option<&Value>) -> Converted<HttpMethod> {
    match value.and_then(Value::as_str) {
        None if value.is_none() => Ok(HttpMethod::Get),
        Some("GET") => Ok(HttpMethod::Get),
        Some("POST") => Ok(HttpMethod::Post),
        _ => scope.fail("http_method must be GET or POST"),
    }
}

pub(crate) fn primary_key(scope: &Scope, value: Option<&Value>) -> Converted<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(key)) => Ok(vec![key.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(key) => Ok(key.clone()),
                Value::Array(_) => scope.fail("primary_key contains nested arrays"),
                _ => scope.fail("primary_key must be a string or a list of strings"),
            })
            .collect(),
        Some(_) => scope.fail("primary_key must be a string or a list of strings"),
    }
}

/// Inline schemas are kept as pretty, key-sorted JSON text.
pub(crate) fn schema(scope: &Scope, value: Option<&Value>) -> Converted<Option<String>> {
    let Some(loader) = value else {
        return Ok(None);
    };
    if loader.is_array() {
        return scope.fail("schema_loader must be a single InlineSchemaLoader");
    }
    let map = known_fields(scope, loader, "schema_loader", &["type", "schema"])?;
    expect_type(scope, loader, "schema_loader", INLINE_SCHEMA_LOADER)?;
    match map.get("schema") {
        None | Some(Value::Null) => Ok(None),
        Some(schema) => Ok(Some(to_pretty_json(&sort_keys(schema))?)),
    }
}

pub(crate) fn decoder(scope: &Scope, value: Option<&Value>) -> Converted<BuilderDecoder> {
    let Some(value) = value else {
        return Ok(BuilderDecoder::Json);
    };
    let decoder = match type_of(value) {
        Some("JsonDecoder") => {
            known_fields(scope, value, "JsonDecoder", &["type"])?;
            BuilderDecoder::Json
        }
        Some("XmlDecoder") => {
            known_fields(scope, value, "XmlDecoder", &["type"])?;
            BuilderDecoder::Xml
        }
        Some("JsonlDecoder") => {
            known_fields(scope, value, "JsonlDecoder", &["type"])?;
            BuilderDecoder::JsonLines
        }
        Some("IterableDecoder") => {
            known_fields(scope, value, "IterableDecoder", &["type"])?;
            BuilderDecoder::Iterable
        }
        Some("CsvDecoder") => {
            let map = known_fields(scope, value, "CsvDecoder", &["type", "delimiter", "encoding"])?;
            BuilderDecoder::Csv {
                delimiter: optional_string(scope, map, "delimiter", "CsvDecoder")?,
                encoding: optional_string(scope, map, "encoding", "CsvDecoder")?,
            }
        }
        Some("GzipDecoder") => {
            let map = known_fields(scope, value, "GzipDecoder", &["type", "decoder"])?;
            BuilderDecoder::Gzip {
                decoder: Box::new(decoder(scope, map.get("decoder"))?),
            }
        }
        Some("ZipfileDecoder") => {
            let map = known_fields(scope, value, "ZipfileDecoder", &["type", "decoder"])?;
            BuilderDecoder::Zip {
                decoder: Box::new(decoder(scope, map.get("decoder"))?),
            }
        }
        Some(other) => return scope.fail(format!("decoder type {other} is not supported")),
        None => return scope.fail("decoder must have a type"),
    };
    Ok(decoder)
}

pub(crate) fn request_options(
    scope: &Scope,
    requester: &Map<String, Value>,
) -> Converted<BuilderRequestOptions> {
    Ok(BuilderRequestOptions {
        request_parameters: string_pairs(scope, requester.get("request_parameters"), "request_parameters")?,
        request_headers: string_pairs(scope, requester.get("request_headers"), "request_headers")?,
        request_body: request_body(scope, requester)?,
    })
}

fn request_body(scope: &Scope, requester: &Map<String, Value>) -> Converted<BuilderRequestBody> {
    match requester.get("request_body_data") {
        Some(data @ Value::Object(_)) => {
            return Ok(BuilderRequestBody::FormList {
                values: string_pairs(scope, Some(data), "request_body_data")?,
            })
        }
        Some(Value::String(text)) => {
            return Ok(BuilderRequestBody::StringFreeform { value: text.clone() })
        }
        Some(Value::Null) | None => {}
        Some(_) => return scope.fail("request_body_data must be an object or a string"),
    }
    match requester.get("request_body_json") {
        None | Some(Value::Null) => Ok(BuilderRequestBody::default()),
        Some(Value::String(text)) => Ok(BuilderRequestBody::JsonString { value: text.clone() }),
        Some(Value::Object(map)) if map.values().all(Value::is_string) => {
            Ok(BuilderRequestBody::JsonList {
                values: string_pairs(scope, requester.get("request_body_json"), "request_body_json")?,
            })
        }
        Some(json) => Ok(BuilderRequestBody::JsonFreeform {
            value: to_pretty_json(json)?,
        }),
    }
}

pub(crate) fn request_option(
    scope: &Scope,
    value: &Value,
    component: &str,
) -> Converted<BuilderRequestOption> {
    if type_of(value) == Some(REQUEST_PATH) {
        known_fields(scope, value, component, &["type"])?;
        return Ok(BuilderRequestOption {
            inject_into: InjectInto::Path,
            field_name: None,
            field_path: None,
        });
    }
    let map = known_fields(
        scope,
        value,
        component,
        &["type", "inject_into", "field_name", "field_path"],
    )?;
    expect_type(scope, value, component, REQUEST_OPTION)?;
    let inject_into = match map.get("inject_into").and_then(Value::as_str) {
        Some("request_parameter") => InjectInto::RequestParameter,
        Some("header") => InjectInto::Header,
        Some("body_data") => InjectInto::BodyData,
        Some("body_json") => InjectInto::BodyJson,
        _ => {
            return scope.fail(format!(
                "{component}.inject_into must be one of request_parameter, header, body_data, body_json"
            ))
        }
    };
    let field_name = optional_string(scope, map, "field_name", component)?;
    let field_path = match map.get("field_path") {
        None | Some(Value::Null) => None,
        Some(path) => Some(string_list(scope, path, &format!("{component}.field_path"))?),
    };
    match (field_name, field_path) {
        (Some(_), Some(_)) => scope.fail(format!(
            "{component} cannot set both field_name and field_path"
        )),
        (Some(name), None) if inject_into == InjectInto::BodyJson => Ok(BuilderRequestOption {
            inject_into,
            field_name: None,
            field_path: Some(vec![name]),
        }),
        (field_name, field_path) => Ok(BuilderRequestOption {
            inject_into,
            field_name,
            field_path,
        }),
    }
}

fn optional_request_option(
    scope: &Scope,
    map: &Map<String, Value>,
    field: &str,
    component: &str,
) -> Converted<Option<BuilderRequestOption>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(request_option(scope, value, &format!("{component}.{field}"))?)),
    }
}

pub(crate) fn record_selector(
    scope: &Scope,
    value: &Value,
) -> Converted<Option<BuilderRecordSelector>> {
    let map = known_fields(
        scope,
        value,
        RECORD_SELECTOR,
        &["type", "extractor", "record_filter", "schema_normalization"],
    )?;
    expect_type(scope, value, RECORD_SELECTOR, RECORD_SELECTOR)?;

    let field_path = match map.get("extractor") {
        None => Vec::new(),
        Some(extractor) => {
            let extractor_map =
                known_fields(scope, extractor, DPATH_EXTRACTOR, &["type", "field_path"])?;
            expect_type(scope, extractor, "extractor", DPATH_EXTRACTOR)?;
            match extractor_map.get("field_path") {
                None => Vec::new(),
                Some(path) => string_list(scope, path, "DpathExtractor.field_path")?,
            }
        }
    };
    let filter_condition = match map.get("record_filter") {
        None | Some(Value::Null) => None,
        Some(filter) => {
            let filter_map = known_fields(scope, filter, RECORD_FILTER, &["type", "condition"])?;
            expect_type(scope, filter, "record_filter", RECORD_FILTER)?;
            optional_string(scope, filter_map, "condition", RECORD_FILTER)?
        }
    };
    let normalize_to_schema = match map.get("schema_normalization").and_then(Value::as_str) {
        None | Some("None") => false,
        Some("Default") => true,
        Some(other) => return scope.fail(format!("schema_normalization {other} is not supported")),
    };

    if field_path.is_empty() && filter_condition.is_none() && !normalize_to_schema {
        return Ok(None);
    }
    Ok(Some(BuilderRecordSelector {
        field_path,
        filter_condition,
        normalize_to_schema,
    }))
}

pub(crate) fn paginator(scope: &Scope, value: &Value) -> Converted<Option<BuilderPaginator>> {
    match type_of(value) {
        Some(NO_PAGINATION) => return Ok(None),
        Some(DEFAULT_PAGINATOR) => {}
        Some(other) => return scope.fail(format!("paginator type {other} is not supported")),
        None => return scope.fail("paginator must have a type"),
    }
    let map = known_fields(
        scope,
        value,
        DEFAULT_PAGINATOR,
        &["type", "pagination_strategy", "page_token_option", "page_size_option"],
    )?;
    let Some(strategy) = map.get("pagination_strategy") else {
        return scope.fail("DefaultPaginator.pagination_strategy is required");
    };
    Ok(Some(BuilderPaginator {
        strategy: pagination_strategy(scope, strategy)?,
        page_token_option: optional_request_option(scope, map, "page_token_option", DEFAULT_PAGINATOR)?,
        page_size_option: optional_request_option(scope, map, "page_size_option", DEFAULT_PAGINATOR)?,
    }))
}

fn pagination_strategy(scope: &Scope, value: &Value) -> Converted<BuilderPaginationStrategy> {
    let kind = type_of(value).unwrap_or_default();
    match kind {
        "OffsetIncrement" => {
            let map = known_fields(
                scope,
                value,
                kind,
                &["type", "page_size", "inject_on_first_request"],
            )?;
            Ok(BuilderPaginationStrategy::OffsetIncrement {
                page_size: page_size(scope, map, kind)?,
                inject_on_first_request: optional_bool(scope, map, "inject_on_first_request", kind)?,
            })
        }
        "PageIncrement" => {
            let map = known_fields(
                scope,
                value,
                kind,
                &["type", "page_size", "start_from_page", "inject_on_first_request"],
            )?;
            let start_from_page = match map.get("start_from_page") {
                None | Some(Value::Null) => None,
                Some(start) => Some(
                    start
                        .as_i64()
                        .ok_or_else(|| scope.error("PageIncrement.start_from_page must be an integer"))?,
                ),
            };
            Ok(BuilderPaginationStrategy::PageIncrement {
                page_size: page_size(scope, map, kind)?,
                start_from_page,
                inject_on_first_request: optional_bool(scope, map, "inject_on_first_request", kind)?,
            })
        }
        "CursorPagination" => {
            let map = known_fields(
                scope,
                value,
                kind,
                &["type", "cursor_value", "stop_condition", "page_size"],
            )?;
            let cursor_value = required_string(scope, map, "cursor_value", kind)?;
            let stop_condition = optional_string(scope, map, "stop_condition", kind)?;
            Ok(BuilderPaginationStrategy::CursorPagination {
                page_size: page_size(scope, map, kind)?,
                cursor: cursor(cursor_value, stop_condition),
            })
        }
        other => scope.fail(format!("pagination strategy {other} is not supported")),
    }
}

fn page_size(scope: &Scope, map: &Map<String, Value>, component: &str) -> Converted<Option<Value>> {
    match map.get("page_size") {
        None | Some(Value::Null) => Ok(None),
        Some(size @ (Value::Number(_) | Value::String(_))) => Ok(Some(size.clone())),
        Some(_) => scope.fail(format!("{component}.page_size must be a number or a string")),
    }
}

/// Recognizes the safe `response`/`headers` access form produced by the
/// form; anything else stays a custom cursor.
fn cursor(cursor_value: String, stop_condition: Option<String>) -> BuilderCursor {
    let access = SAFE_ACCESS.captures(&cursor_value);
    let stop = stop_condition.as_deref().and_then(|stop| SAFE_STOP.captures(stop));
    if let (Some(access), Some(stop)) = (access, stop) {
        let source = &access[1];
        let chain = &access[2];
        if source == &stop[1] && chain == &stop[2] {
            let path = access_path(chain);
            return if source == "headers" {
                BuilderCursor::Headers { path }
            } else {
                BuilderCursor::Response { path }
            };
        }
    }
    BuilderCursor::Custom {
        cursor_value,
        stop_condition,
    }
}

fn access_path(chain: &str) -> Vec<String> {
    ACCESS_SEGMENT
        .captures_iter(chain)
        .filter_map(|segment| segment.get(1).or_else(|| segment.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub(crate) fn error_handler(
    scope: &Scope,
    value: &Value,
) -> Converted<Option<Vec<BuilderErrorHandler>>> {
    match type_of(value) {
        Some(COMPOSITE_ERROR_HANDLER) => {
            let map = known_fields(scope, value, COMPOSITE_ERROR_HANDLER, &["type", "error_handlers"])?;
            let Some(handlers) = map.get("error_handlers").and_then(Value::as_array) else {
                return scope.fail("CompositeErrorHandler.error_handlers must be a list");
            };
            // Fewer than two handlers export as a bare DefaultErrorHandler.
            if handlers.len() < 2 {
                return scope.fail("CompositeErrorHandler must wrap at least two error handlers");
            }
            handlers
                .iter()
                .map(|handler| default_error_handler(scope, handler))
                .collect::<Converted<Vec<_>>>()
                .map(Some)
        }
        _ => Ok(Some(vec![default_error_handler(scope, value)?])),
    }
}

fn default_error_handler(scope: &Scope, value: &Value) -> Converted<BuilderErrorHandler> {
    let map = known_fields(
        scope,
        value,
        DEFAULT_ERROR_HANDLER,
        &["type", "max_retries", "backoff_strategies", "response_filters"],
    )?;
    expect_type(scope, value, "error handler", DEFAULT_ERROR_HANDLER)?;

    let max_retries = match map.get("max_retries") {
        None | Some(Value::Null) => None,
        Some(retries) => Some(
            retries
                .as_i64()
                .ok_or_else(|| scope.error("DefaultErrorHandler.max_retries must be an integer"))?,
        ),
    };
    let backoff_strategy = match single_entry(scope, map, "backoff_strategies")? {
        None => None,
        Some(strategy) => Some(backoff_strategy(scope, strategy)?),
    };
    let response_filter = match single_entry(scope, map, "response_filters")? {
        None => None,
        Some(filter) => Some(response_filter(scope, filter)?),
    };
    Ok(BuilderErrorHandler {
        max_retries,
        backoff_strategy,
        response_filter,
    })
}

fn single_entry<'v>(
    scope: &Scope,
    map: &'v Map<String, Value>,
    field: &str,
) -> Converted<Option<&'v Value>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single)),
            _ => scope.fail(format!("DefaultErrorHandler.{field} has more than one entry")),
        },
        Some(_) => scope.fail(format!("DefaultErrorHandler.{field} must be a list")),
    }
}

fn backoff_strategy(scope: &Scope, value: &Value) -> Converted<BuilderBackoffStrategy> {
    let kind = type_of(value).unwrap_or_default();
    match kind {
        "ConstantBackoffStrategy" => {
            let map = known_fields(scope, value, kind, &["type", "backoff_time_in_seconds"])?;
            let Some(seconds) = map.get("backoff_time_in_seconds") else {
                return scope.fail("ConstantBackoffStrategy.backoff_time_in_seconds is required");
            };
            Ok(BuilderBackoffStrategy::ConstantBackoffStrategy {
                backoff_time_in_seconds: number(scope, seconds, "backoff_time_in_seconds")?,
            })
        }
        "ExponentialBackoffStrategy" => {
            let map = known_fields(scope, value, kind, &["type", "factor"])?;
            Ok(BuilderBackoffStrategy::ExponentialBackoffStrategy {
                factor: optional_number(scope, map, "factor")?,
            })
        }
        "WaitTimeFromHeader" => {
            let map = known_fields(
                scope,
                value,
                kind,
                &["type", "header", "regex", "max_waiting_time_in_seconds"],
            )?;
            Ok(BuilderBackoffStrategy::WaitTimeFromHeader {
                header: required_string(scope, map, "header", kind)?,
                regex: optional_string(scope, map, "regex", kind)?,
                max_waiting_time_in_seconds: optional_number(scope, map, "max_waiting_time_in_seconds")?,
            })
        }
        "WaitUntilTimeFromHeader" => {
            let map = known_fields(scope, value, kind, &["type", "header", "regex", "min_wait"])?;
            Ok(BuilderBackoffStrategy::WaitUntilTimeFromHeader {
                header: required_string(scope, map, "header", kind)?,
                regex: optional_string(scope, map, "regex", kind)?,
                min_wait: optional_number(scope, map, "min_wait")?,
            })
        }
        other => scope.fail(format!("backoff strategy {other} is not supported")),
    }
}

fn optional_number(scope: &Scope, map: &Map<String, Value>, field: &str) -> Converted<Option<Number>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(number(scope, value, field)?)),
    }
}

fn response_filter(scope: &Scope, value: &Value) -> Converted<BuilderResponseFilter> {
    let map = known_fields(
        scope,
        value,
        HTTP_RESPONSE_FILTER,
        &[
            "type",
            "action",
            "error_message",
            "error_message_contains",
            "http_codes",
            "predicate",
        ],
    )?;
    expect_type(scope, value, "response filter", HTTP_RESPONSE_FILTER)?;
    let http_codes = match map.get("http_codes") {
        None | Some(Value::Null) => None,
        Some(Value::Array(codes)) => Some(
            codes
                .iter()
                .map(|code| match code {
                    Value::Number(number) => Ok(number.to_string()),
                    Value::String(text) => Ok(text.clone()),
                    _ => scope.fail("HttpResponseFilter.http_codes must be numbers"),
                })
                .collect::<Converted<Vec<_>>>()?,
        ),
        Some(_) => return scope.fail("HttpResponseFilter.http_codes must be a list"),
    };
    Ok(BuilderResponseFilter {
        action: optional_string(scope, map, "action", HTTP_RESPONSE_FILTER)?,
        error_message: optional_string(scope, map, "error_message", HTTP_RESPONSE_FILTER)?,
        error_message_contains: optional_string(
            scope,
            map,
            "error_message_contains",
            HTTP_RESPONSE_FILTER,
        )?,
        http_codes,
        predicate: optional_string(scope, map, "predicate", HTTP_RESPONSE_FILTER)?,
    })
}

pub(crate) fn transformations(
    scope: &Scope,
    value: &Value,
) -> Converted<Option<Vec<BuilderTransformation>>> {
    let Some(items) = value.as_array() else {
        return scope.fail("transformations must be a list");
    };
    let mut converted = Vec::new();
    for item in items {
        match type_of(item) {
            Some(ADD_FIELDS) => {
                let map = known_fields(scope, item, ADD_FIELDS, &["type", "fields"])?;
                let Some(fields) = map.get("fields").and_then(Value::as_array) else {
                    return scope.fail("AddFields.fields must be a list");
                };
                for field in fields {
                    let field_map = known_fields(
                        scope,
                        field,
                        "AddFields.fields",
                        &["type", "path", "value"],
                    )?;
                    let Some(path) = field_map.get("path") else {
                        return scope.fail("AddFields.fields.path is required");
                    };
                    converted.push(BuilderTransformation::Add {
                        path: string_list(scope, path, "AddFields.fields.path")?,
                        value: required_string(scope, field_map, "value", "AddFields.fields")?,
                    });
                }
            }
            Some(REMOVE_FIELDS) => {
                let map = known_fields(scope, item, REMOVE_FIELDS, &["type", "field_pointers"])?;
                let Some(pointers) = map.get("field_pointers").and_then(Value::as_array) else {
                    return scope.fail("RemoveFields.field_pointers must be a list");
                };
                for pointer in pointers {
                    converted.push(BuilderTransformation::Remove {
                        path: string_list(scope, pointer, "RemoveFields.field_pointers")?,
                    });
                }
            }
            Some(other) => return scope.fail(format!("transformation {other} is not supported")),
            None => return scope.fail("transformations must have a type"),
        }
    }
    Ok(if converted.is_empty() { None } else { Some(converted) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Scope<'static> {
        Scope::global(None)
    }

    #[test]
    fn cursor_recognizes_safe_access() {
        let cursor = cursor(
            r#"{{ response.get("meta", {}).get("next", {})[0] }}"#.into(),
            Some(r#"{{ not response.get("meta", {}).get("next", {})[0] }}"#.into()),
        );
        assert_eq!(
            cursor,
            BuilderCursor::Response {
                path: vec!["meta".into(), "next".into(), "0".into()]
            }
        );
        let custom = super::cursor("{{ last_record.id }}".into(), None);
        assert!(matches!(custom, BuilderCursor::Custom { .. }));
    }

    #[test]
    fn request_body_kinds() {
        let scope = scope();
        let body = |requester: Value| {
            request_body(&scope, requester.as_object().expect("object")).expect("body")
        };
        assert_eq!(body(json!({})), BuilderRequestBody::JsonList { values: vec![] });
        assert_eq!(
            body(json!({"request_body_data": {"a": "1"}})),
            BuilderRequestBody::FormList {
                values: vec![("a".into(), "1".into())]
            }
        );
        assert_eq!(
            body(json!({"request_body_json": "raw"})),
            BuilderRequestBody::JsonString { value: "raw".into() }
        );
        assert_eq!(
            body(json!({"request_body_data": "a=1"})),
            BuilderRequestBody::StringFreeform { value: "a=1".into() }
        );
        assert!(matches!(
            body(json!({"request_body_json": {"a": 1}})),
            BuilderRequestBody::JsonFreeform { .. }
        ));
    }

    #[test]
    fn body_json_field_name_becomes_path() {
        let option = request_option(
            &scope(),
            &json!({"type": "RequestOption", "inject_into": "body_json", "field_name": "page"}),
            "page_token_option",
        )
        .expect("converts");
        assert_eq!(option.field_path, Some(vec!["page".to_string()]));
        assert!(request_option(
            &scope(),
            &json!({
                "type": "RequestOption",
                "inject_into": "header",
                "field_name": "a",
                "field_path": ["a"]
            }),
            "page_token_option",
        )
        .is_err());
    }

    #[test]
    fn primary_key_shapes() {
        let scope = scope();
        assert_eq!(primary_key(&scope, Some(&json!("id"))).ok(), Some(vec!["id".to_string()]));
        assert_eq!(
            primary_key(&scope, Some(&json!(["id", "ts"]))).ok(),
            Some(vec!["id".to_string(), "ts".to_string()])
        );
        assert!(primary_key(&scope, Some(&json!([["id"]]))).is_err());
    }

    #[test]
    fn single_handler_composite_is_incompatible() {
        let err = error_handler(
            &scope(),
            &json!({
                "type": "CompositeErrorHandler",
                "error_handlers": [{"type": "DefaultErrorHandler", "max_retries": 3}]
            }),
        )
        .expect_err("single composite");
        assert!(err.compatibility().is_some());
    }

    #[test]
    fn composite_error_handler_flattens() {
        let handlers = error_handler(
            &scope(),
            &json!({
                "type": "CompositeErrorHandler",
                "error_handlers": [
                    {"type": "DefaultErrorHandler", "max_retries": 3},
                    {
                        "type": "DefaultErrorHandler",
                        "backoff_strategies": [{"type": "ConstantBackoffStrategy", "backoff_time_in_seconds": "5"}],
                        "response_filters": [{"type": "HttpResponseFilter", "action": "RETRY", "http_codes": [429]}]
                    }
                ]
            }),
        )
        .expect("converts")
        .expect("present");
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].max_retries, Some(3));
        assert_eq!(
            handlers[1].backoff_strategy,
            Some(BuilderBackoffStrategy::ConstantBackoffStrategy {
                backoff_time_in_seconds: Number::from(5)
            })
        );
        assert_eq!(
            handlers[1].response_filter.as_ref().and_then(|f| f.http_codes.clone()),
            Some(vec!["429".to_string()])
        );
    }
}
