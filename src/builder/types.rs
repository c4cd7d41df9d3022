use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A form component that either maps onto builder fields or is carried as
/// verbatim YAML text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlOr<T> {
    Yaml(String),
    Builder(T),
}

impl<T> YamlOr<T> {
    pub fn as_builder(&self) -> Option<&T> {
        match self {
            YamlOr::Builder(value) => Some(value),
            YamlOr::Yaml(_) => None,
        }
    }

    pub fn is_yaml(&self) -> bool {
        matches!(self, YamlOr::Yaml(_))
    }
}

pub type KeyValueList = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderFormValues {
    pub global: BuilderGlobal,
    #[serde(default)]
    pub inputs: Vec<BuilderFormInput>,
    #[serde(default)]
    pub streams: Vec<BuilderStream>,
    #[serde(default)]
    pub check_streams: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderGlobal {
    #[serde(default)]
    pub url_base: String,
    pub authenticator: YamlOr<BuilderAuthenticator>,
}

impl Default for BuilderGlobal {
    fn default() -> Self {
        Self {
            url_base: String::new(),
            authenticator: YamlOr::Builder(BuilderAuthenticator::NoAuth),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderFormInput {
    pub key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub definition: Map<String, Value>,
    #[serde(default)]
    pub is_locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderStream {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
    pub schema: Option<String>,
    pub unsupported_fields: Option<String>,
    #[serde(flatten)]
    pub request: StreamRequest,
}

impl BuilderStream {
    pub fn sync_request(&self) -> Option<&SyncRequest> {
        match &self.request {
            StreamRequest::Sync(sync) => Some(sync),
            StreamRequest::Async(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "requestType", rename_all = "lowercase")]
pub enum StreamRequest {
    Sync(SyncRequest),
    Async(AsyncRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub url_path: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub decoder: BuilderDecoder,
    #[serde(default)]
    pub request_options: BuilderRequestOptions,
    pub record_selector: Option<YamlOr<BuilderRecordSelector>>,
    pub paginator: Option<YamlOr<BuilderPaginator>>,
    pub incremental_sync: Option<YamlOr<BuilderIncrementalSync>>,
    pub parent_stream: Option<YamlOr<BuilderParentStream>>,
    pub parameterized_requests: Option<YamlOr<Vec<BuilderParameterizedRequests>>>,
    pub error_handler: Option<YamlOr<Vec<BuilderErrorHandler>>>,
    pub transformations: Option<YamlOr<Vec<BuilderTransformation>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncRequest {
    pub creation_requester: AsyncRequester,
    pub polling_requester: AsyncRequester,
    pub download_requester: AsyncRequester,
    #[serde(default)]
    pub status_mapping: AsyncStatusMapping,
    #[serde(default)]
    pub status_extractor: Vec<String>,
    #[serde(default)]
    pub download_target_extractor: Vec<String>,
    pub record_selector: Option<YamlOr<BuilderRecordSelector>>,
    pub polling_timeout: Option<PollingTimeout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncRequester {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub request_options: BuilderRequestOptions,
    pub error_handler: Option<YamlOr<Vec<BuilderErrorHandler>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncStatusMapping {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub running: Vec<String>,
    pub timeout: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PollingTimeout {
    Number(i64),
    Custom(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuilderDecoder {
    #[default]
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "XML")]
    Xml,
    #[serde(rename = "JSON Lines")]
    JsonLines,
    #[serde(rename = "Iterable")]
    Iterable,
    #[serde(rename = "CSV")]
    Csv {
        delimiter: Option<String>,
        encoding: Option<String>,
    },
    #[serde(rename = "gzip")]
    Gzip { decoder: Box<BuilderDecoder> },
    #[serde(rename = "ZIP file")]
    Zip { decoder: Box<BuilderDecoder> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderRequestOptions {
    #[serde(default)]
    pub request_parameters: KeyValueList,
    #[serde(default)]
    pub request_headers: KeyValueList,
    #[serde(default)]
    pub request_body: BuilderRequestBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuilderRequestBody {
    JsonList { values: KeyValueList },
    JsonFreeform { value: String },
    /// A `request_body_json` given as one templated string.
    JsonString { value: String },
    FormList { values: KeyValueList },
    StringFreeform { value: String },
}

impl Default for BuilderRequestBody {
    fn default() -> Self {
        BuilderRequestBody::JsonList { values: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectInto {
    RequestParameter,
    Header,
    BodyData,
    BodyJson,
    Path,
}

impl InjectInto {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectInto::RequestParameter => "request_parameter",
            InjectInto::Header => "header",
            InjectInto::BodyData => "body_data",
            InjectInto::BodyJson => "body_json",
            InjectInto::Path => "path",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderRequestOption {
    pub inject_into: InjectInto,
    pub field_name: Option<String>,
    pub field_path: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderRecordSelector {
    #[serde(default)]
    pub field_path: Vec<String>,
    pub filter_condition: Option<String>,
    #[serde(default)]
    pub normalize_to_schema: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderPaginator {
    pub strategy: BuilderPaginationStrategy,
    pub page_token_option: Option<BuilderRequestOption>,
    pub page_size_option: Option<BuilderRequestOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuilderPaginationStrategy {
    OffsetIncrement {
        page_size: Option<Value>,
        inject_on_first_request: Option<bool>,
    },
    PageIncrement {
        page_size: Option<Value>,
        start_from_page: Option<i64>,
        inject_on_first_request: Option<bool>,
    },
    CursorPagination {
        page_size: Option<Value>,
        cursor: BuilderCursor,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuilderCursor {
    Response {
        path: Vec<String>,
    },
    Headers {
        path: Vec<String>,
    },
    Custom {
        cursor_value: String,
        stop_condition: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Range,
    Start,
    NoFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuilderDatetime {
    UserInput { value: String },
    Now,
    Custom { value: String, format: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderSlicer {
    pub step: String,
    pub cursor_granularity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderIncrementalSync {
    pub cursor_field: String,
    pub cursor_datetime_formats: Vec<String>,
    pub datetime_format: Option<String>,
    pub start_datetime: BuilderDatetime,
    pub end_datetime: BuilderDatetime,
    pub start_time_option: Option<BuilderRequestOption>,
    pub end_time_option: Option<BuilderRequestOption>,
    pub lookback_window: Option<String>,
    pub slicer: Option<BuilderSlicer>,
    pub filter_mode: FilterMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderParentStream {
    pub parent_key: String,
    pub partition_field: String,
    #[serde(rename = "parentStreamReference")]
    pub parent_stream_reference: String,
    pub request_option: Option<BuilderRequestOption>,
    pub incremental_dependency: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ListValues {
    List(Vec<String>),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderParameterizedRequests {
    pub cursor_field: String,
    pub values: ListValues,
    pub request_option: Option<BuilderRequestOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderErrorHandler {
    pub max_retries: Option<i64>,
    pub backoff_strategy: Option<BuilderBackoffStrategy>,
    pub response_filter: Option<BuilderResponseFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuilderBackoffStrategy {
    ConstantBackoffStrategy {
        backoff_time_in_seconds: Number,
    },
    ExponentialBackoffStrategy {
        factor: Option<Number>,
    },
    WaitTimeFromHeader {
        header: String,
        regex: Option<String>,
        max_waiting_time_in_seconds: Option<Number>,
    },
    WaitUntilTimeFromHeader {
        header: String,
        regex: Option<String>,
        min_wait: Option<Number>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderResponseFilter {
    pub action: Option<String>,
    pub error_message: Option<String>,
    pub error_message_contains: Option<String>,
    pub http_codes: Option<Vec<String>>,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuilderTransformation {
    Add { path: Vec<String>, value: String },
    Remove { path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuilderAuthenticator {
    NoAuth,
    ApiKeyAuthenticator {
        api_token: String,
        inject_into: BuilderRequestOption,
    },
    BearerAuthenticator {
        api_token: String,
    },
    BasicHttpAuthenticator {
        username: String,
        password: Option<String>,
    },
    OAuthAuthenticator(BuilderOAuth),
    SessionTokenAuthenticator(BuilderSessionToken),
}

impl BuilderAuthenticator {
    pub fn type_name(&self) -> &'static str {
        use crate::manifest::*;
        match self {
            BuilderAuthenticator::NoAuth => NO_AUTH,
            BuilderAuthenticator::ApiKeyAuthenticator { .. } => API_KEY_AUTHENTICATOR,
            BuilderAuthenticator::BearerAuthenticator { .. } => BEARER_AUTHENTICATOR,
            BuilderAuthenticator::BasicHttpAuthenticator { .. } => BASIC_HTTP_AUTHENTICATOR,
            BuilderAuthenticator::OAuthAuthenticator(_) => OAUTH_AUTHENTICATOR,
            BuilderAuthenticator::SessionTokenAuthenticator(_) => SESSION_TOKEN_AUTHENTICATOR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderOAuth {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
    pub token_refresh_endpoint: String,
    #[serde(default)]
    pub grant_type: GrantType,
    pub scopes: Option<Vec<String>>,
    pub access_token_name: Option<String>,
    pub expires_in_name: Option<String>,
    pub token_expiry_date_format: Option<String>,
    #[serde(default)]
    pub refresh_request_body: KeyValueList,
    pub refresh_token_updater: Option<BuilderRefreshTokenUpdater>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderRefreshTokenUpdater {
    pub refresh_token_name: Option<String>,
    /// Interpolated reference to the config key receiving the access token.
    pub access_token: String,
    /// Interpolated reference to the config key receiving the expiry date.
    pub token_expiry_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderSessionToken {
    pub login_requester: BuilderLoginRequester,
    pub session_token_path: Vec<String>,
    pub expiration_duration: Option<String>,
    pub request_authentication: SessionRequestAuthentication,
    #[serde(default)]
    pub decoder: SessionDecoder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderLoginRequester {
    pub url: String,
    pub authenticator: Box<BuilderAuthenticator>,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub request_options: BuilderRequestOptions,
    pub error_handler: Option<Vec<BuilderErrorHandler>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionRequestAuthentication {
    ApiKey { inject_into: BuilderRequestOption },
    Bearer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionDecoder {
    #[default]
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "XML")]
    Xml,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_serializes_with_request_type_tag() {
        let stream = BuilderStream {
            id: "0".into(),
            name: "users".into(),
            primary_key: vec!["id".into()],
            schema: None,
            unsupported_fields: None,
            request: StreamRequest::Sync(SyncRequest {
                url_path: "/users".into(),
                http_method: HttpMethod::Get,
                decoder: BuilderDecoder::Json,
                request_options: BuilderRequestOptions::default(),
                record_selector: None,
                paginator: Some(YamlOr::Yaml("type: Custom\n".into())),
                incremental_sync: None,
                parent_stream: None,
                parameterized_requests: None,
                error_handler: None,
                transformations: None,
            }),
        };
        let value = serde_json::to_value(&stream).expect("serialize");
        assert_eq!(value["requestType"], json!("sync"));
        assert_eq!(value["urlPath"], json!("/users"));
        assert_eq!(value["httpMethod"], json!("GET"));
        assert_eq!(value["paginator"], json!("type: Custom\n"));
        assert_eq!(value["requestOptions"]["requestBody"]["type"], json!("json_list"));

        let back: BuilderStream = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, stream);
    }

    #[test]
    fn authenticator_uses_type_tag() {
        let auth: YamlOr<BuilderAuthenticator> = serde_json::from_value(json!({
            "type": "BearerAuthenticator",
            "api_token": "{{ config[\"api_key\"] }}"
        }))
        .expect("deserialize");
        assert_eq!(
            auth,
            YamlOr::Builder(BuilderAuthenticator::BearerAuthenticator {
                api_token: "{{ config[\"api_key\"] }}".into()
            })
        );
        let yaml: YamlOr<BuilderAuthenticator> =
            serde_json::from_value(json!("type: CustomAuthenticator\n")).expect("yaml");
        assert!(yaml.is_yaml());
    }
}
