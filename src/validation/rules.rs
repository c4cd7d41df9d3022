use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::schema::{Schema, TestContext, YamlTest, REQUIRED};
use crate::manifest::{
    API_KEY_AUTHENTICATOR, CUSTOM_PARTITION_ROUTER, LIST_PARTITION_ROUTER, OAUTH_AUTHENTICATOR,
    SESSION_TOKEN_AUTHENTICATOR, SESSION_TOKEN_REQUEST_API_KEY, SUBSTREAM_PARTITION_ROUTER,
};

static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{.+\}\}$").expect("valid interpolation pattern"));

const PATTERN_ERROR: &str = "must be an interpolated value like {{ ... }}";
const NON_PATH_INJECT_INTO: [&str; 4] = ["request_parameter", "header", "body_data", "body_json"];
const INJECT_INTO: [&str; 5] = ["request_parameter", "header", "path", "body_data", "body_json"];

/// The validator for serialized builder form values.
pub(crate) static FORM_SCHEMA: Lazy<Schema> = Lazy::new(form_schema);

fn form_schema() -> Schema {
    Schema::object([
        ("global", global_schema().required()),
        (
            "inputs",
            Schema::array(Schema::object([(
                "key",
                Schema::string().required().test(unique_input_key),
            )])),
        ),
        (
            "streams",
            Schema::array(stream_schema())
                .min_items(1, "at least one stream is required")
                .test(acyclic_parents),
        ),
        ("checkStreams", Schema::array(Schema::string().test(known_stream_name))),
    ])
}

fn global_schema() -> Schema {
    Schema::object([
        ("urlBase", Schema::string().required()),
        ("authenticator", Schema::maybe_yaml(authenticator_schema(), None)),
    ])
}

fn stream_schema() -> Schema {
    let sync = |schema: Schema| Schema::when_in("requestType", &["sync"], schema);
    let asynchronous = |schema: Schema| Schema::when_in("requestType", &["async"], schema);
    Schema::object([
        ("name", Schema::string().required().test(unique_stream_name)),
        ("requestType", Schema::string().required().one_of(&["sync", "async"])),
        ("primaryKey", Schema::array(Schema::string())),
        ("schema", json_string()),
        ("unsupportedFields", Schema::yaml(Some(object_yaml()))),
        ("urlPath", sync(Schema::string().required())),
        ("httpMethod", sync(http_method_schema())),
        ("requestOptions", sync(request_options_schema())),
        ("recordSelector", Schema::maybe_yaml(record_selector_schema(), None)),
        ("paginator", sync(Schema::maybe_yaml(paginator_schema(), None))),
        ("incrementalSync", sync(Schema::maybe_yaml(incremental_sync_schema(), None))),
        (
            "parentStream",
            sync(Schema::maybe_yaml(
                parent_stream_schema(),
                Some(router_kinds(&[SUBSTREAM_PARTITION_ROUTER, CUSTOM_PARTITION_ROUTER])),
            )),
        ),
        (
            "parameterizedRequests",
            sync(Schema::maybe_yaml(
                Schema::array(parameterized_request_schema()),
                Some(list_routers()),
            )),
        ),
        ("errorHandler", sync(Schema::maybe_yaml(error_handler_schema(), None))),
        ("transformations", sync(Schema::maybe_yaml(transformations_schema(), None))),
        ("creationRequester", asynchronous(async_requester_schema().required())),
        ("pollingRequester", asynchronous(async_requester_schema().required())),
        ("downloadRequester", asynchronous(async_requester_schema().required())),
        (
            "statusMapping",
            asynchronous(Schema::object([
                ("completed", Schema::array(Schema::string())),
                ("failed", Schema::array(Schema::string())),
                ("running", Schema::array(Schema::string())),
                ("timeout", Schema::array(Schema::string())),
            ])),
        ),
        ("statusExtractor", asynchronous(Schema::array(Schema::string()))),
        ("downloadTargetExtractor", asynchronous(Schema::array(Schema::string()))),
    ])
}

fn http_method_schema() -> Schema {
    Schema::string().one_of(&["GET", "POST"])
}

fn interpolation_string() -> Schema {
    Schema::string().matches(&INTERPOLATION, PATTERN_ERROR)
}

fn json_string() -> Schema {
    Schema::string().test(|value, _| match value.as_str() {
        Some(text) if !text.is_empty() => serde_json::from_str::<Value>(text)
            .map(|_| ())
            .map_err(|_| "must be valid JSON".to_string()),
        _ => Ok(()),
    })
}

fn key_value_list() -> Schema {
    Schema::array(Schema::array(Schema::string().required()))
}

fn non_path_request_option() -> Schema {
    Schema::object([
        ("inject_into", Schema::string().required().one_of(&NON_PATH_INJECT_INTO)),
        (
            "field_name",
            Schema::when(
                "field_path",
                |path| path.map_or(true, Value::is_null),
                Schema::string().required(),
                Schema::any(),
            ),
        ),
    ])
}

fn request_options_schema() -> Schema {
    Schema::object([
        ("requestParameters", key_value_list()),
        ("requestHeaders", key_value_list()),
        (
            "requestBody",
            Schema::object([
                ("values", Schema::when_in("type", &["form_list", "json_list"], key_value_list())),
                (
                    "value",
                    Schema::when(
                        "type",
                        |kind| kind.and_then(Value::as_str) == Some("json_freeform"),
                        json_string().test(|value, _| {
                            let parsed = value.as_str().and_then(|text| serde_json::from_str::<Value>(text).ok());
                            match parsed {
                                Some(Value::Array(_)) => Err("must not be a JSON array".to_string()),
                                _ => Ok(()),
                            }
                        }),
                        Schema::when_in("type", &["string_freeform", "json_string"], Schema::string()),
                    ),
                ),
            ]),
        ),
    ])
}

fn inject_into_when_api_key() -> Schema {
    Schema::when_in("type", &[API_KEY_AUTHENTICATOR], non_path_request_option().required())
}

fn authenticator_schema() -> Schema {
    let oauth = |schema: Schema| Schema::when_in("type", &[OAUTH_AUTHENTICATOR], schema);
    let session = |schema: Schema| Schema::when_in("type", &[SESSION_TOKEN_AUTHENTICATOR], schema);
    Schema::object([
        ("type", Schema::string().required()),
        ("inject_into", inject_into_when_api_key()),
        ("token_refresh_endpoint", oauth(Schema::string().required())),
        (
            "refresh_token_updater",
            oauth(Schema::object([("refresh_token_name", Schema::string())])),
        ),
        ("refresh_request_body", oauth(key_value_list())),
        (
            "login_requester",
            session(
                Schema::object([
                    ("url", Schema::string().required()),
                    (
                        "authenticator",
                        Schema::object([("inject_into", inject_into_when_api_key())]),
                    ),
                    ("error_handler", error_handler_schema()),
                    ("http_method", http_method_schema()),
                    ("request_options", request_options_schema()),
                ])
                .required(),
            ),
        ),
        (
            "session_token_path",
            session(
                Schema::array(Schema::string())
                    .required()
                    .min_items(1, REQUIRED),
            ),
        ),
        ("expiration_duration", session(Schema::string())),
        (
            "request_authentication",
            session(Schema::object([(
                "inject_into",
                Schema::when_in(
                    "type",
                    &[SESSION_TOKEN_REQUEST_API_KEY],
                    non_path_request_option().required(),
                ),
            )])),
        ),
    ])
}

fn record_selector_schema() -> Schema {
    Schema::object([
        ("fieldPath", Schema::array(Schema::string())),
        ("filterCondition", interpolation_string()),
        ("normalizeToSchema", Schema::boolean()),
    ])
}

fn paginator_schema() -> Schema {
    let custom = |kind: Option<&Value>| kind.and_then(Value::as_str) == Some("custom");
    Schema::object([
        (
            "pageSizeOption",
            Schema::when(
                "strategy.page_size",
                |size| match size {
                    Some(Value::Number(number)) => number.as_f64() != Some(0.0),
                    Some(Value::String(text)) => !text.is_empty(),
                    _ => false,
                },
                non_path_request_option(),
                Schema::strip(),
            ),
        ),
        (
            "pageTokenOption",
            Schema::object([
                ("inject_into", Schema::string().required().one_of(&INJECT_INTO)),
                (
                    "field_name",
                    Schema::when(
                        "inject_into",
                        |inject| {
                            inject.and_then(Value::as_str) != Some("path")
                                && inject.is_some()
                        },
                        Schema::string(),
                        Schema::strip(),
                    ),
                ),
            ]),
        ),
        (
            "strategy",
            Schema::object([
                ("type", Schema::string().required()),
                ("page_size", Schema::number()),
                (
                    "cursor",
                    Schema::when_in(
                        "type",
                        &["CursorPagination"],
                        Schema::object([
                            (
                                "cursor_value",
                                Schema::when(
                                    "type",
                                    custom,
                                    Schema::string().required(),
                                    Schema::strip(),
                                ),
                            ),
                            (
                                "stop_condition",
                                Schema::when("type", custom, interpolation_string(), Schema::strip()),
                            ),
                            (
                                "path",
                                Schema::when(
                                    "type",
                                    move |kind| !custom(kind),
                                    Schema::array(Schema::string()).min_items(1, REQUIRED),
                                    Schema::strip(),
                                ),
                            ),
                        ])
                        .required(),
                    ),
                ),
                (
                    "start_from_page",
                    Schema::when_in("type", &["PageIncrement"], Schema::number()),
                ),
            ])
            .required(),
        ),
    ])
}

fn datetime_schema() -> Schema {
    Schema::object([
        ("type", Schema::string().required().one_of(&["user_input", "now", "custom"])),
        (
            "value",
            Schema::when_in("type", &["user_input", "custom"], Schema::string().required()),
        ),
    ])
}

fn incremental_sync_schema() -> Schema {
    let not_data_feed = |kind: Option<&Value>| kind.and_then(Value::as_str) != Some("no_filter");
    let range = |kind: Option<&Value>| kind.and_then(Value::as_str) == Some("range");
    Schema::object([
        ("cursor_field", Schema::string().required()),
        (
            "filter_mode",
            Schema::string().required().one_of(&["range", "start", "no_filter"]),
        ),
        (
            "slicer",
            Schema::when(
                "filter_mode",
                not_data_feed,
                Schema::object([
                    ("cursor_granularity", Schema::string().required()),
                    ("step", Schema::string().required()),
                ]),
                Schema::any(),
            ),
        ),
        ("start_datetime", datetime_schema().required()),
        (
            "end_datetime",
            Schema::when("filter_mode", range, datetime_schema().required(), Schema::any()),
        ),
        ("datetime_format", Schema::string()),
        (
            "cursor_datetime_formats",
            Schema::array(Schema::string())
                .required()
                .min_items(1, REQUIRED),
        ),
        (
            "start_time_option",
            Schema::when("filter_mode", not_data_feed, non_path_request_option(), Schema::any()),
        ),
        (
            "end_time_option",
            Schema::when("filter_mode", range, non_path_request_option(), Schema::any()),
        ),
        ("lookback_window", Schema::string()),
    ])
}

fn parent_stream_schema() -> Schema {
    Schema::object([
        ("parent_key", Schema::string().required()),
        (
            "parentStreamReference",
            Schema::string().required().test(existing_stream_id),
        ),
        ("partition_field", Schema::string().required()),
        ("request_option", non_path_request_option()),
        ("incremental_dependency", Schema::boolean()),
    ])
}

fn parameterized_request_schema() -> Schema {
    Schema::object([
        ("cursor_field", Schema::string().required()),
        (
            "values",
            Schema::object([
                ("type", Schema::string().required().one_of(&["list", "variable"])),
                (
                    "value",
                    Schema::when(
                        "type",
                        |kind| kind.and_then(Value::as_str) == Some("list"),
                        Schema::array(Schema::string()).required().min_items(1, REQUIRED),
                        Schema::string().required().matches(&INTERPOLATION, PATTERN_ERROR),
                    ),
                ),
            ])
            .required(),
        ),
        ("request_option", non_path_request_option()),
    ])
}

fn error_handler_schema() -> Schema {
    Schema::array(Schema::object([
        ("max_retries", Schema::number()),
        (
            "backoff_strategy",
            Schema::object([
                ("type", Schema::string().required()),
                (
                    "backoff_time_in_seconds",
                    Schema::when_in("type", &["ConstantBackoffStrategy"], Schema::number().required()),
                ),
                ("factor", Schema::when_in("type", &["ExponentialBackoffStrategy"], Schema::number())),
                (
                    "header",
                    Schema::when_in(
                        "type",
                        &["WaitTimeFromHeader", "WaitUntilTimeFromHeader"],
                        Schema::string().required(),
                    ),
                ),
                (
                    "regex",
                    Schema::when_in("type", &["WaitTimeFromHeader", "WaitUntilTimeFromHeader"], Schema::string()),
                ),
                (
                    "max_waiting_time_in_seconds",
                    Schema::when_in("type", &["WaitTimeFromHeader"], Schema::number()),
                ),
                ("min_wait", Schema::when_in("type", &["WaitUntilTimeFromHeader"], Schema::number())),
            ]),
        ),
        (
            "response_filter",
            Schema::object([
                ("error_message_contains", Schema::string()),
                ("predicate", interpolation_string()),
                ("http_codes", Schema::array(Schema::string())),
                ("error_message", Schema::string()),
            ]),
        ),
    ]))
}

fn transformations_schema() -> Schema {
    Schema::array(Schema::object([
        ("type", Schema::string().required().one_of(&["add", "remove"])),
        ("path", Schema::array(Schema::string()).required().min_items(1, REQUIRED)),
        ("value", Schema::when_in("type", &["add"], Schema::string().required())),
    ]))
}

fn async_requester_schema() -> Schema {
    Schema::object([
        ("url", Schema::string().required()),
        ("httpMethod", http_method_schema()),
        ("requestOptions", request_options_schema()),
        ("errorHandler", Schema::maybe_yaml(error_handler_schema(), None)),
    ])
}

fn object_yaml() -> YamlTest {
    Arc::new(|parsed| {
        if parsed.is_object() {
            Ok(())
        } else {
            Err("unsupported fields must be a YAML object".to_string())
        }
    })
}

/// Parsed partition router overrides may only use `allowed` router kinds.
fn router_kinds(allowed: &'static [&'static str]) -> YamlTest {
    Arc::new(move |parsed| check_router_kinds(parsed, allowed))
}

fn check_router_kinds(router: &Value, allowed: &[&str]) -> Result<(), String> {
    if let Some(routers) = router.as_array() {
        return routers
            .iter()
            .try_for_each(|router| check_router_kinds(router, allowed));
    }
    match router.get("type").and_then(Value::as_str) {
        None => Err("partition router must have a type".to_string()),
        Some(kind) if allowed.contains(&kind) => Ok(()),
        Some(kind) => Err(format!(
            "partition router type {kind} is not allowed here, expected one of {}",
            allowed.join(", ")
        )),
    }
}

fn list_routers() -> YamlTest {
    Arc::new(|parsed| {
        check_router_kinds(parsed, &[LIST_PARTITION_ROUTER]).map_err(|message| {
            format!("{message}. Use the parent stream field for other router kinds")
        })?;
        let routers: Vec<&Value> = match parsed.as_array() {
            Some(items) => items.iter().collect(),
            None => vec![parsed],
        };
        for router in routers {
            match router.get("values") {
                Some(Value::Array(_)) => {}
                Some(Value::String(text)) if INTERPOLATION.is_match(text) => {}
                _ => {
                    return Err(
                        "ListPartitionRouter values must be a list or an interpolated string"
                            .to_string(),
                    )
                }
            }
        }
        Ok(())
    })
}

fn streams(root: &Value) -> &[Value] {
    root.get("streams")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn unique_stream_name(value: &Value, context: &TestContext<'_>) -> Result<(), String> {
    let count = streams(context.root)
        .iter()
        .filter(|stream| stream.get("name") == Some(value))
        .count();
    if count > 1 {
        Err("stream names must be unique".to_string())
    } else {
        Ok(())
    }
}

fn unique_input_key(value: &Value, context: &TestContext<'_>) -> Result<(), String> {
    let count = context
        .root
        .get("inputs")
        .and_then(Value::as_array)
        .map_or(0, |inputs| {
            inputs
                .iter()
                .filter(|input| input.get("key") == Some(value))
                .count()
        });
    if count > 1 {
        Err("input keys must be unique".to_string())
    } else {
        Ok(())
    }
}

fn known_stream_name(value: &Value, context: &TestContext<'_>) -> Result<(), String> {
    if streams(context.root)
        .iter()
        .any(|stream| stream.get("name") == Some(value))
    {
        Ok(())
    } else {
        Err(format!("check stream {value} does not exist"))
    }
}

fn existing_stream_id(value: &Value, context: &TestContext<'_>) -> Result<(), String> {
    if streams(context.root)
        .iter()
        .any(|stream| stream.get("id") == Some(value))
    {
        Ok(())
    } else {
        Err("parent stream does not exist".to_string())
    }
}

/// Follows builder parent references from every stream; reports the first
/// stream whose chain loops back on itself.
fn acyclic_parents(value: &Value, _: &TestContext<'_>) -> Result<(), String> {
    let Some(streams) = value.as_array() else {
        return Ok(());
    };
    let parents: HashMap<&str, &str> = streams
        .iter()
        .filter_map(|stream| {
            let id = stream.get("id")?.as_str()?;
            let parent = stream
                .get("parentStream")?
                .get("parentStreamReference")?
                .as_str()?;
            Some((id, parent))
        })
        .collect();
    let name_of = |id: &str| {
        streams
            .iter()
            .find(|stream| stream.get("id").and_then(Value::as_str) == Some(id))
            .and_then(|stream| stream.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string()
    };

    for start in parents.keys() {
        let mut seen = HashSet::new();
        let mut current = *start;
        while let Some(parent) = parents.get(current) {
            if !seen.insert(current) {
                break;
            }
            if parent == start {
                return Err(format!(
                    "stream {} has a parent stream cycle",
                    name_of(*start)
                ));
            }
            current = *parent;
        }
    }
    Ok(())
}
