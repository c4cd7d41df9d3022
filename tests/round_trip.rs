mod common;

use connector_builder_rs::builder::types::{
    BuilderAuthenticator, BuilderRequestBody, StreamRequest, YamlOr,
};
use connector_builder_rs::convert::{builder_to_manifest, manifest_to_builder};
use connector_builder_rs::resolver::resolve;
use serde_json::{json, Value};

#[test]
fn exported_shape_survives_a_round_trip() {
    let original = common::manifest();
    let form = manifest_to_builder(&resolve(&original).unwrap()).unwrap();
    let exported = builder_to_manifest(&form);

    assert_eq!(exported, original);
    assert_eq!(resolve(&exported).unwrap(), resolve(&original).unwrap());
}

#[test]
fn form_values_survive_export_and_import() {
    let form = manifest_to_builder(&resolve(&common::manifest()).unwrap()).unwrap();
    let again = manifest_to_builder(&resolve(&builder_to_manifest(&form)).unwrap()).unwrap();
    assert_eq!(again, form);
}

#[test]
fn imported_form_carries_shared_settings() {
    let form = manifest_to_builder(&resolve(&common::manifest()).unwrap()).unwrap();

    assert_eq!(form.global.url_base, "https://api.example.com/v1");
    let YamlOr::Builder(BuilderAuthenticator::ApiKeyAuthenticator { api_token, .. }) =
        &form.global.authenticator
    else {
        panic!("expected an API key authenticator");
    };
    assert_eq!(api_token, common::API_TOKEN);
    assert_eq!(form.check_streams, vec!["users".to_string()]);

    assert_eq!(form.inputs.len(), 1);
    assert_eq!(form.inputs[0].key, "api_key");
    assert!(form.inputs[0].required);
    assert!(form.inputs[0].is_locked);

    let ids: Vec<&str> = form.streams.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1"]);
    let StreamRequest::Sync(posts) = &form.streams[1].request else {
        panic!("expected a sync stream");
    };
    let Some(YamlOr::Builder(parent)) = &posts.parent_stream else {
        panic!("expected a parent stream");
    };
    assert_eq!(parent.parent_stream_reference, "0");
    assert_eq!(parent.partition_field, "user_id");
    assert!(posts.record_selector.is_none());
}

#[test]
fn forms_without_sync_streams_skip_the_base_requester() {
    let form = manifest_to_builder(&resolve(&common::manifest()).unwrap()).unwrap();
    let mut empty = form.clone();
    empty.streams.clear();
    let exported = builder_to_manifest(&empty);
    assert!(exported["definitions"].get("base_requester").is_none());
    assert_eq!(exported["streams"], json!([]));
}

fn api_key_manifest(streams: Vec<Value>) -> Value {
    common::export_manifest(
        Some(common::api_key_authenticator()),
        streams,
        vec![common::api_key_property()],
        &["api_key"],
    )
}

fn request_body_manifests() -> Vec<(&'static str, Value)> {
    let post = |name: &str, body: Value| {
        let mut requester = json!({"http_method": "POST"});
        if let (Some(requester), Value::Object(body)) = (requester.as_object_mut(), body) {
            requester.extend(body);
        }
        common::sync_stream(name, requester, json!({}), json!({}))
    };
    vec![
        (
            "json list body",
            api_key_manifest(vec![post(
                "search",
                json!({
                    "request_headers": {"Accept": "application/json"},
                    "request_body_json": {"query": "{{ config['api_key'] }}", "kind": "user"}
                }),
            )]),
        ),
        (
            "form list body",
            api_key_manifest(vec![post(
                "search",
                json!({"request_body_data": {"grant": "all"}}),
            )]),
        ),
        (
            "raw data body",
            api_key_manifest(vec![post("search", json!({"request_body_data": "a=1&b=2"}))]),
        ),
        (
            "json string body",
            api_key_manifest(vec![post(
                "search",
                json!({"request_body_json": "{\"q\": \"{{ config['x'] }}\"}"}),
            )]),
        ),
        (
            "freeform json body",
            api_key_manifest(vec![post(
                "search",
                json!({"request_body_json": {"filter": {"ids": [1, 2]}, "limit": 10}}),
            )]),
        ),
    ]
}

fn error_handler_manifests() -> Vec<(&'static str, Value)> {
    vec![
        (
            "default error handler",
            api_key_manifest(vec![common::sync_stream(
                "users",
                json!({
                    "error_handler": {
                        "type": "DefaultErrorHandler",
                        "max_retries": 5,
                        "backoff_strategies": [
                            {"type": "ConstantBackoffStrategy", "backoff_time_in_seconds": 5}
                        ],
                        "response_filters": [
                            {"type": "HttpResponseFilter", "action": "IGNORE", "http_codes": [404]}
                        ]
                    }
                }),
                json!({}),
                json!({}),
            )]),
        ),
        (
            "composite error handler",
            api_key_manifest(vec![common::sync_stream(
                "users",
                json!({
                    "error_handler": {
                        "type": "CompositeErrorHandler",
                        "error_handlers": [
                            {
                                "type": "DefaultErrorHandler",
                                "backoff_strategies": [
                                    {"type": "ExponentialBackoffStrategy", "factor": 2}
                                ]
                            },
                            {
                                "type": "DefaultErrorHandler",
                                "backoff_strategies": [{
                                    "type": "WaitTimeFromHeader",
                                    "header": "Retry-After",
                                    "max_waiting_time_in_seconds": 30
                                }]
                            },
                            {
                                "type": "DefaultErrorHandler",
                                "backoff_strategies": [{
                                    "type": "WaitUntilTimeFromHeader",
                                    "header": "X-Reset",
                                    "min_wait": 1.5
                                }],
                                "response_filters": [{
                                    "type": "HttpResponseFilter",
                                    "action": "RETRY",
                                    "error_message_contains": "slow down"
                                }]
                            }
                        ]
                    }
                }),
                json!({}),
                json!({}),
            )]),
        ),
    ]
}

fn retriever_manifests() -> Vec<(&'static str, Value)> {
    vec![
        (
            "cursor pagination with filtered selector",
            api_key_manifest(vec![common::sync_stream(
                "events",
                json!({}),
                json!({
                    "record_selector": {
                        "type": "RecordSelector",
                        "extractor": {"type": "DpathExtractor", "field_path": ["items"]},
                        "record_filter": {"type": "RecordFilter", "condition": "{{ record.active }}"},
                        "schema_normalization": "Default"
                    },
                    "paginator": {
                        "type": "DefaultPaginator",
                        "pagination_strategy": {
                            "type": "CursorPagination",
                            "cursor_value": "{{ response.get(\"next\", {}) }}",
                            "stop_condition": "{{ not response.get(\"next\", {}) }}",
                            "page_size": 100
                        },
                        "page_token_option": {
                            "type": "RequestOption",
                            "inject_into": "request_parameter",
                            "field_name": "cursor"
                        },
                        "page_size_option": {
                            "type": "RequestOption",
                            "inject_into": "request_parameter",
                            "field_name": "limit"
                        }
                    },
                    "decoder": {
                        "type": "GzipDecoder",
                        "decoder": {"type": "CsvDecoder", "delimiter": ";"}
                    }
                }),
                json!({"primary_key": ["id"]}),
            )]),
        ),
        (
            "list partition router",
            api_key_manifest(vec![common::sync_stream(
                "regions",
                json!({}),
                json!({
                    "partition_router": {
                        "type": "ListPartitionRouter",
                        "cursor_field": "region",
                        "values": ["eu", "us"],
                        "request_option": {
                            "type": "RequestOption",
                            "inject_into": "request_parameter",
                            "field_name": "region"
                        }
                    }
                }),
                json!({}),
            )]),
        ),
        (
            "transformations",
            api_key_manifest(vec![common::sync_stream(
                "users",
                json!({}),
                json!({}),
                json!({
                    "transformations": [
                        {
                            "type": "AddFields",
                            "fields": [
                                {"type": "AddedFieldDefinition", "path": ["source"], "value": "api"}
                            ]
                        },
                        {"type": "RemoveFields", "field_pointers": [["internal"]]}
                    ]
                }),
            )]),
        ),
    ]
}

fn incremental_manifest() -> Value {
    common::export_manifest(
        Some(common::api_key_authenticator()),
        vec![common::sync_stream(
            "events",
            json!({}),
            json!({}),
            json!({
                "incremental_sync": {
                    "type": "DatetimeBasedCursor",
                    "cursor_field": "updated_at",
                    "datetime_format": "%Y-%m-%dT%H:%M:%SZ",
                    "cursor_datetime_formats": ["%Y-%m-%dT%H:%M:%SZ"],
                    "start_datetime": {
                        "type": "MinMaxDatetime",
                        "datetime": "{{ config[\"start_date\"] }}",
                        "datetime_format": "%Y-%m-%dT%H:%M:%SZ"
                    },
                    "end_datetime": {
                        "type": "MinMaxDatetime",
                        "datetime": "{{ now_utc().strftime('%Y-%m-%dT%H:%M:%SZ') }}",
                        "datetime_format": "%Y-%m-%dT%H:%M:%SZ"
                    },
                    "start_time_option": {
                        "type": "RequestOption",
                        "inject_into": "request_parameter",
                        "field_name": "since"
                    },
                    "step": "P1M",
                    "cursor_granularity": "PT1S"
                }
            }),
        )],
        vec![
            common::api_key_property(),
            (
                "start_date",
                json!({
                    "type": "string",
                    "title": "Start date",
                    "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z$",
                    "format": "date-time"
                }),
            ),
        ],
        &["api_key", "start_date"],
    )
}

fn oauth_manifest() -> Value {
    common::export_manifest(
        Some(json!({
            "type": "OAuthAuthenticator",
            "client_id": "{{ config[\"client_id\"] }}",
            "client_secret": "{{ config[\"client_secret\"] }}",
            "refresh_token": "{{ config[\"client_refresh_token\"] }}",
            "token_refresh_endpoint": "https://api.example.com/oauth/token",
            "grant_type": "refresh_token",
            "scopes": ["read"],
            "refresh_request_body": {"audience": "api"},
            "refresh_token_updater": {
                "refresh_token_name": "refresh_token",
                "access_token_config_path": ["oauth_access_token"],
                "refresh_token_config_path": ["client_refresh_token"],
                "token_expiry_date_config_path": ["oauth_token_expiry_date"]
            }
        })),
        vec![common::sync_stream("users", json!({}), json!({}), json!({}))],
        vec![
            ("client_id", json!({"type": "string", "airbyte_secret": true})),
            ("client_secret", json!({"type": "string", "airbyte_secret": true})),
            ("client_refresh_token", json!({"type": "string", "airbyte_secret": true})),
            ("oauth_access_token", json!({"type": "string", "airbyte_secret": true})),
            ("oauth_token_expiry_date", json!({"type": "string"})),
        ],
        &["client_id", "client_secret", "client_refresh_token"],
    )
}

fn session_token_manifest() -> Value {
    common::export_manifest(
        Some(json!({
            "type": "SessionTokenAuthenticator",
            "login_requester": {
                "type": "HttpRequester",
                "url_base": "https://api.example.com/v1/login",
                "http_method": "POST",
                "authenticator": {
                    "type": "BasicHttpAuthenticator",
                    "username": "{{ config[\"username\"] }}",
                    "password": "{{ config[\"password\"] }}"
                },
                "request_body_json": {"grant": "session"}
            },
            "session_token_path": ["token"],
            "expiration_duration": "PT1H",
            "request_authentication": {"type": "Bearer"},
            "decoder": {"type": "JsonDecoder"}
        })),
        vec![common::sync_stream("users", json!({}), json!({}), json!({}))],
        vec![
            ("username", json!({"type": "string"})),
            ("password", json!({"type": "string", "airbyte_secret": true})),
        ],
        &["username"],
    )
}

fn async_manifest() -> Value {
    let requester = |url: &str, method: &str| {
        json!({"type": "HttpRequester", "url_base": url, "http_method": method})
    };
    common::export_manifest(
        None,
        vec![json!({
            "type": "DeclarativeStream",
            "name": "reports",
            "retriever": {
                "type": "AsyncRetriever",
                "creation_requester": requester("https://api.example.com/v1/reports", "POST"),
                "polling_requester": requester(
                    "https://api.example.com/v1/reports/{{ creation_response['id'] }}",
                    "GET"
                ),
                "download_requester": requester("{{ download_target }}", "GET"),
                "status_mapping": {
                    "type": "AsyncJobStatusMap",
                    "completed": ["done"],
                    "failed": ["error"],
                    "running": ["pending"],
                    "timeout": ["expired"]
                },
                "status_extractor": {"type": "DpathExtractor", "field_path": ["status"]},
                "download_target_extractor": {"type": "DpathExtractor", "field_path": ["url"]},
                "record_selector": {
                    "type": "RecordSelector",
                    "extractor": {"type": "DpathExtractor", "field_path": []}
                },
                "polling_job_timeout": 15
            }
        })],
        Vec::new(),
        &[],
    )
}

#[test]
fn supported_components_survive_a_round_trip() {
    let mut manifests = request_body_manifests();
    manifests.extend(error_handler_manifests());
    manifests.extend(retriever_manifests());
    manifests.push(("incremental sync", incremental_manifest()));
    manifests.push(("oauth", oauth_manifest()));
    manifests.push(("session token", session_token_manifest()));
    manifests.push(("async retriever", async_manifest()));

    for (name, original) in manifests {
        let form = manifest_to_builder(&resolve(&original).unwrap())
            .unwrap_or_else(|err| panic!("{name}: {err}"));
        let exported = builder_to_manifest(&form);
        assert_eq!(exported, original, "{name}: exported manifest differs");

        let again = manifest_to_builder(&resolve(&exported).unwrap())
            .unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(again, form, "{name}: form values differ");
    }
}

#[test]
fn json_string_body_stays_a_json_body() {
    let manifest = request_body_manifests()
        .into_iter()
        .find(|(name, _)| *name == "json string body")
        .map(|(_, manifest)| manifest)
        .unwrap();
    let form = manifest_to_builder(&resolve(&manifest).unwrap()).unwrap();
    let StreamRequest::Sync(request) = &form.streams[0].request else {
        panic!("expected a sync stream");
    };
    assert_eq!(
        request.request_options.request_body,
        BuilderRequestBody::JsonString {
            value: "{\"q\": \"{{ config['x'] }}\"}".into()
        }
    );

    let exported = builder_to_manifest(&form);
    let requester = &exported["definitions"]["streams"]["search"]["retriever"]["requester"];
    assert_eq!(
        requester.get("request_body_json"),
        Some(&json!("{\"q\": \"{{ config['x'] }}\"}"))
    );
    assert!(requester.get("request_body_data").is_none());
}

#[test]
fn integer_backoff_times_stay_integers() {
    let (_, manifest) = error_handler_manifests().remove(0);
    let form = manifest_to_builder(&resolve(&manifest).unwrap()).unwrap();
    let exported = builder_to_manifest(&form);
    let handler = &exported["definitions"]["streams"]["users"]["retriever"]["requester"]["error_handler"];
    assert_eq!(
        handler["backoff_strategies"][0]["backoff_time_in_seconds"],
        json!(5)
    );
    assert!(handler["backoff_strategies"][0]["backoff_time_in_seconds"].is_u64());
}

#[test]
fn single_handler_composite_is_kept_verbatim() {
    let handler = json!({
        "type": "CompositeErrorHandler",
        "error_handlers": [{"type": "DefaultErrorHandler", "max_retries": 2}]
    });
    let original = api_key_manifest(vec![common::sync_stream(
        "users",
        json!({"error_handler": handler}),
        json!({}),
        json!({}),
    )]);
    let form = manifest_to_builder(&resolve(&original).unwrap()).unwrap();
    let StreamRequest::Sync(request) = &form.streams[0].request else {
        panic!("expected a sync stream");
    };
    assert!(matches!(request.error_handler, Some(YamlOr::Yaml(_))));
    assert_eq!(builder_to_manifest(&form), original);
}
