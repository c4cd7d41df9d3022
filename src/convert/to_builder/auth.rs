use serde_json::{Map, Value};

use super::components::{error_handler, http_method, request_option, request_options};
use super::support::{
    expect_type, known_fields, optional_string, required_string, spec_key, string_list,
    string_pairs, Converted, Scope,
};
use crate::builder::locked_inputs::locked_input_template;
use crate::builder::types::{
    BuilderAuthenticator, BuilderLoginRequester, BuilderOAuth, BuilderRefreshTokenUpdater,
    BuilderRequestOption, BuilderSessionToken, GrantType, InjectInto, SessionDecoder,
    SessionRequestAuthentication,
};
use crate::interpolation::{extract_config_key, interpolate_config_key};
use crate::manifest::{
    type_of, API_KEY_AUTHENTICATOR, BASIC_HTTP_AUTHENTICATOR, BEARER_AUTHENTICATOR,
    HTTP_REQUESTER, NO_AUTH, OAUTH_AUTHENTICATOR, SESSION_TOKEN_AUTHENTICATOR,
    SESSION_TOKEN_REQUEST_API_KEY, SESSION_TOKEN_REQUEST_BEARER,
};

/// Keys that decide whether two authenticators are the same.
pub(crate) const RELEVANT_AUTHENTICATOR_KEYS: [&str; 22] = [
    "type",
    "api_token",
    "header",
    "inject_into",
    "username",
    "password",
    "client_id",
    "client_secret",
    "refresh_token",
    "token_refresh_endpoint",
    "grant_type",
    "scopes",
    "access_token_name",
    "expires_in_name",
    "token_expiry_date_format",
    "refresh_request_body",
    "refresh_token_updater",
    "login_requester",
    "session_token_path",
    "expiration_duration",
    "request_authentication",
    "decoder",
];

const LOGIN_REQUESTER_FIELDS: [&str; 11] = [
    "type",
    "url",
    "url_base",
    "path",
    "authenticator",
    "http_method",
    "request_parameters",
    "request_headers",
    "request_body_data",
    "request_body_json",
    "error_handler",
];

pub(crate) fn relevant_authenticator(value: Option<&Value>) -> Option<Map<String, Value>> {
    let value = value?;
    if type_of(value) == Some(NO_AUTH) {
        return None;
    }
    let map = value.as_object()?;
    Some(
        map.iter()
            .filter(|(key, _)| RELEVANT_AUTHENTICATOR_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

pub(crate) fn authenticator(scope: &Scope, value: Option<&Value>) -> Converted<BuilderAuthenticator> {
    let Some(value) = value else {
        return Ok(BuilderAuthenticator::NoAuth);
    };
    let kind = type_of(value).unwrap_or_default();
    match kind {
        NO_AUTH => {
            known_fields(scope, value, NO_AUTH, &["type"])?;
            Ok(BuilderAuthenticator::NoAuth)
        }
        API_KEY_AUTHENTICATOR => {
            let map = known_fields(scope, value, kind, &["type", "api_token", "header", "inject_into"])?;
            let api_token = secret_field(scope, map, kind, "api_token")?;
            let inject_into = match (map.get("inject_into"), map.get("header")) {
                (Some(_), Some(_)) => {
                    return scope.fail("ApiKeyAuthenticator cannot set both inject_into and the deprecated header")
                }
                (Some(option), None) => request_option(scope, option, "ApiKeyAuthenticator.inject_into")?,
                (None, Some(Value::String(header))) => BuilderRequestOption {
                    inject_into: InjectInto::Header,
                    field_name: Some(header.clone()),
                    field_path: None,
                },
                _ => return scope.fail("ApiKeyAuthenticator requires inject_into or header"),
            };
            Ok(BuilderAuthenticator::ApiKeyAuthenticator {
                api_token,
                inject_into,
            })
        }
        BEARER_AUTHENTICATOR => {
            let map = known_fields(scope, value, kind, &["type", "api_token"])?;
            Ok(BuilderAuthenticator::BearerAuthenticator {
                api_token: secret_field(scope, map, kind, "api_token")?,
            })
        }
        BASIC_HTTP_AUTHENTICATOR => {
            let map = known_fields(scope, value, kind, &["type", "username", "password"])?;
            let password = match map.get("password") {
                None | Some(Value::Null) => None,
                Some(_) => Some(secret_field(scope, map, kind, "password")?),
            };
            Ok(BuilderAuthenticator::BasicHttpAuthenticator {
                username: secret_field(scope, map, kind, "username")?,
                password,
            })
        }
        OAUTH_AUTHENTICATOR => Ok(BuilderAuthenticator::OAuthAuthenticator(oauth(scope, value)?)),
        SESSION_TOKEN_AUTHENTICATOR => Ok(BuilderAuthenticator::SessionTokenAuthenticator(
            session_token(scope, value)?,
        )),
        "" => scope.fail("authenticator must have a type"),
        other => scope.fail(format!("authenticator {other} is not supported")),
    }
}

/// Reads a field that must hold a config reference and returns it in the
/// normalized interpolation form.
fn secret_field(
    scope: &Scope,
    map: &Map<String, Value>,
    owner: &str,
    field: &str,
) -> Converted<String> {
    let Some(template) = locked_input_template(owner, field) else {
        return scope.fail(format!("{owner}.{field} is not supported"));
    };
    let key = spec_key(scope, &format!("{owner}.{field}"), map.get(field), template)?;
    Ok(interpolate_config_key(&key))
}

fn oauth(scope: &Scope, value: &Value) -> Converted<BuilderOAuth> {
    let kind = OAUTH_AUTHENTICATOR;
    let map = known_fields(
        scope,
        value,
        kind,
        &[
            "type",
            "client_id",
            "client_secret",
            "refresh_token",
            "token_refresh_endpoint",
            "grant_type",
            "scopes",
            "access_token_name",
            "expires_in_name",
            "token_expiry_date_format",
            "refresh_request_body",
            "refresh_token_updater",
        ],
    )?;
    let grant_type = match optional_string(scope, map, "grant_type", kind)?.as_deref() {
        None | Some("refresh_token") => GrantType::RefreshToken,
        Some("client_credentials") => GrantType::ClientCredentials,
        Some(other) => return scope.fail(format!("OAuthAuthenticator grant_type {other} is not supported")),
    };
    let refresh_token = match (grant_type, map.get("refresh_token")) {
        (GrantType::RefreshToken, _) | (_, Some(_)) => {
            Some(secret_field(scope, map, kind, "refresh_token")?)
        }
        (GrantType::ClientCredentials, None) => None,
    };
    let scopes = match map.get("scopes") {
        None | Some(Value::Null) => None,
        Some(scopes) => Some(string_list(scope, scopes, "OAuthAuthenticator.scopes")?),
    };

    let refresh_token_updater = match map.get("refresh_token_updater") {
        None | Some(Value::Null) => None,
        Some(updater) => {
            let Some(refresh_token) = refresh_token.as_deref() else {
                return scope.fail("OAuthAuthenticator.refresh_token_updater requires a refresh_token");
            };
            Some(refresh_token_updater(scope, updater, refresh_token)?)
        }
    };

    Ok(BuilderOAuth {
        client_id: secret_field(scope, map, kind, "client_id")?,
        client_secret: secret_field(scope, map, kind, "client_secret")?,
        refresh_token,
        token_refresh_endpoint: required_string(scope, map, "token_refresh_endpoint", kind)?,
        grant_type,
        scopes,
        access_token_name: optional_string(scope, map, "access_token_name", kind)?,
        expires_in_name: optional_string(scope, map, "expires_in_name", kind)?,
        token_expiry_date_format: optional_string(scope, map, "token_expiry_date_format", kind)?,
        refresh_request_body: string_pairs(scope, map.get("refresh_request_body"), "refresh_request_body")?,
        refresh_token_updater,
    })
}

fn refresh_token_updater(
    scope: &Scope,
    value: &Value,
    refresh_token: &str,
) -> Converted<BuilderRefreshTokenUpdater> {
    let component = "OAuthAuthenticator.refresh_token_updater";
    let map = known_fields(
        scope,
        value,
        component,
        &[
            "refresh_token_name",
            "access_token_config_path",
            "refresh_token_config_path",
            "token_expiry_date_config_path",
        ],
    )?;

    let refresh_key = extract_config_key(refresh_token).unwrap_or_default();
    let refresh_path = match map.get("refresh_token_config_path") {
        Some(path) => string_list(scope, path, &format!("{component}.refresh_token_config_path"))?,
        None => Vec::new(),
    };
    if refresh_path != [refresh_key.clone()] {
        return scope.fail(format!(
            "{component}.refresh_token_config_path needs to match the config path used for refresh_token ([\"{refresh_key}\"])"
        ));
    }

    let config_path_key = |field: &str| -> Converted<String> {
        let owner_field = format!("refresh_token_updater.{field}");
        let Some(template) = locked_input_template(OAUTH_AUTHENTICATOR, &owner_field) else {
            return scope.fail(format!("{component}.{field} is not supported"));
        };
        let key = spec_key(scope, &format!("{component}.{field}"), map.get(field), template)?;
        Ok(interpolate_config_key(&key))
    };

    Ok(BuilderRefreshTokenUpdater {
        refresh_token_name: optional_string(scope, map, "refresh_token_name", component)?,
        access_token: config_path_key("access_token_config_path")?,
        token_expiry_date: config_path_key("token_expiry_date_config_path")?,
    })
}

fn session_token(scope: &Scope, value: &Value) -> Converted<BuilderSessionToken> {
    let kind = SESSION_TOKEN_AUTHENTICATOR;
    let map = known_fields(
        scope,
        value,
        kind,
        &[
            "type",
            "login_requester",
            "session_token_path",
            "expiration_duration",
            "request_authentication",
            "decoder",
        ],
    )?;

    let Some(login) = map.get("login_requester") else {
        return scope.fail("SessionTokenAuthenticator.login_requester is required");
    };
    let login_map = known_fields(scope, login, "login_requester", &LOGIN_REQUESTER_FIELDS)?;
    expect_type(scope, login, "login_requester", HTTP_REQUESTER)?;
    let login_auth = authenticator(scope, login_map.get("authenticator"))?;
    if matches!(
        login_auth,
        BuilderAuthenticator::OAuthAuthenticator(_) | BuilderAuthenticator::SessionTokenAuthenticator(_)
    ) {
        return scope.fail(format!(
            "login_requester authenticator {} is not supported",
            login_auth.type_name()
        ));
    }
    let error_handlers = match login_map.get("error_handler") {
        None | Some(Value::Null) => None,
        Some(handler) => error_handler(scope, handler)?,
    };
    let login_requester = BuilderLoginRequester {
        url: full_url(login_map),
        authenticator: Box::new(login_auth),
        http_method: http_method(scope, login_map.get("http_method"))?,
        request_options: request_options(scope, login_map)?,
        error_handler: error_handlers,
    };

    let Some(token_path) = map.get("session_token_path") else {
        return scope.fail("SessionTokenAuthenticator.session_token_path is required");
    };
    let request_authentication = match map.get("request_authentication") {
        Some(auth) if type_of(auth) == Some(SESSION_TOKEN_REQUEST_BEARER) => {
            known_fields(scope, auth, "request_authentication", &["type"])?;
            SessionRequestAuthentication::Bearer
        }
        Some(auth) if type_of(auth) == Some(SESSION_TOKEN_REQUEST_API_KEY) => {
            let auth_map = known_fields(scope, auth, "request_authentication", &["type", "inject_into"])?;
            let Some(option) = auth_map.get("inject_into") else {
                return scope.fail("request_authentication.inject_into is required");
            };
            SessionRequestAuthentication::ApiKey {
                inject_into: request_option(scope, option, "request_authentication.inject_into")?,
            }
        }
        _ => return scope.fail("request_authentication must be ApiKey or Bearer"),
    };
    let decoder = match map.get("decoder").and_then(type_of) {
        None | Some("JsonDecoder") => SessionDecoder::Json,
        Some("XmlDecoder") => SessionDecoder::Xml,
        Some(other) => return scope.fail(format!("session token decoder {other} is not supported")),
    };

    Ok(BuilderSessionToken {
        login_requester,
        session_token_path: string_list(scope, token_path, "session_token_path")?,
        expiration_duration: optional_string(scope, map, "expiration_duration", kind)?,
        request_authentication,
        decoder,
    })
}

/// `url` wins; otherwise `url_base` and `path` are joined.
pub(crate) fn full_url(requester: &Map<String, Value>) -> String {
    if let Some(url) = requester.get("url").and_then(Value::as_str) {
        return url.to_string();
    }
    let base = requester.get("url_base").and_then(Value::as_str);
    let path = requester.get("path").and_then(Value::as_str);
    match (base, path) {
        (Some(base), Some(path)) if !path.is_empty() => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        (Some(base), _) => base.to_string(),
        (None, Some(path)) => path.to_string(),
        (None, None) => String::new(),
    }
}
