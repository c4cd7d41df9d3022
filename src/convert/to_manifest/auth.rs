use serde_json::{json, Map, Value};

use super::{error_handlers, insert_some, request_option, requester_options};
use crate::builder::types::{
    BuilderAuthenticator, BuilderOAuth, BuilderSessionToken, SessionDecoder,
    SessionRequestAuthentication,
};
use crate::interpolation::extract_config_key;
use crate::manifest::{
    HTTP_REQUESTER, SESSION_TOKEN_REQUEST_API_KEY, SESSION_TOKEN_REQUEST_BEARER,
};

/// `None` stands for no authenticator at all.
pub(super) fn authenticator(auth: &BuilderAuthenticator) -> Option<Value> {
    let kind = auth.type_name();
    let value = match auth {
        BuilderAuthenticator::NoAuth => return None,
        BuilderAuthenticator::ApiKeyAuthenticator {
            api_token,
            inject_into,
        } => json!({
            "type": kind,
            "api_token": api_token,
            "inject_into": request_option(inject_into),
        }),
        BuilderAuthenticator::BearerAuthenticator { api_token } => json!({
            "type": kind,
            "api_token": api_token,
        }),
        BuilderAuthenticator::BasicHttpAuthenticator { username, password } => {
            let mut map = Map::new();
            map.insert("type".into(), json!(kind));
            map.insert("username".into(), json!(username));
            insert_some(&mut map, "password", password.as_ref().map(|p| json!(p)));
            Value::Object(map)
        }
        BuilderAuthenticator::OAuthAuthenticator(oauth) => oauth_authenticator(kind, oauth),
        BuilderAuthenticator::SessionTokenAuthenticator(session) => {
            session_token_authenticator(kind, session)
        }
    };
    Some(value)
}

fn config_path(reference: &str) -> Value {
    let key = extract_config_key(reference).unwrap_or_else(|| reference.to_string());
    json!([key])
}

fn oauth_authenticator(kind: &str, oauth: &BuilderOAuth) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(kind));
    map.insert("client_id".into(), json!(oauth.client_id));
    map.insert("client_secret".into(), json!(oauth.client_secret));
    insert_some(&mut map, "refresh_token", oauth.refresh_token.as_ref().map(|t| json!(t)));
    map.insert(
        "token_refresh_endpoint".into(),
        json!(oauth.token_refresh_endpoint),
    );
    map.insert("grant_type".into(), json!(oauth.grant_type.as_str()));
    insert_some(&mut map, "scopes", oauth.scopes.as_ref().map(|s| json!(s)));
    insert_some(
        &mut map,
        "access_token_name",
        oauth.access_token_name.as_ref().map(|n| json!(n)),
    );
    insert_some(
        &mut map,
        "expires_in_name",
        oauth.expires_in_name.as_ref().map(|n| json!(n)),
    );
    insert_some(
        &mut map,
        "token_expiry_date_format",
        oauth.token_expiry_date_format.as_ref().map(|f| json!(f)),
    );
    if !oauth.refresh_request_body.is_empty() {
        let body: Map<String, Value> = oauth
            .refresh_request_body
            .iter()
            .map(|(key, value)| (key.clone(), json!(value)))
            .collect();
        map.insert("refresh_request_body".into(), Value::Object(body));
    }
    if let Some(updater) = &oauth.refresh_token_updater {
        let mut updater_map = Map::new();
        insert_some(
            &mut updater_map,
            "refresh_token_name",
            updater.refresh_token_name.as_ref().map(|n| json!(n)),
        );
        updater_map.insert(
            "access_token_config_path".into(),
            config_path(&updater.access_token),
        );
        if let Some(refresh_token) = &oauth.refresh_token {
            updater_map.insert(
                "refresh_token_config_path".into(),
                config_path(refresh_token),
            );
        }
        updater_map.insert(
            "token_expiry_date_config_path".into(),
            config_path(&updater.token_expiry_date),
        );
        map.insert("refresh_token_updater".into(), Value::Object(updater_map));
    }
    Value::Object(map)
}

fn session_token_authenticator(kind: &str, session: &BuilderSessionToken) -> Value {
    let login = &session.login_requester;
    let mut requester = Map::new();
    requester.insert("type".into(), json!(HTTP_REQUESTER));
    requester.insert("url_base".into(), json!(login.url));
    requester.insert("http_method".into(), json!(login.http_method.as_str()));
    insert_some(&mut requester, "authenticator", authenticator(&login.authenticator));
    requester_options(&mut requester, &login.request_options);
    if let Some(handlers) = &login.error_handler {
        insert_some(&mut requester, "error_handler", error_handlers(handlers));
    }

    let request_authentication = match &session.request_authentication {
        SessionRequestAuthentication::ApiKey { inject_into } => json!({
            "type": SESSION_TOKEN_REQUEST_API_KEY,
            "inject_into": request_option(inject_into),
        }),
        SessionRequestAuthentication::Bearer => json!({"type": SESSION_TOKEN_REQUEST_BEARER}),
    };
    let decoder = match session.decoder {
        SessionDecoder::Json => "JsonDecoder",
        SessionDecoder::Xml => "XmlDecoder",
    };

    let mut map = Map::new();
    map.insert("type".into(), json!(kind));
    map.insert("login_requester".into(), Value::Object(requester));
    map.insert(
        "session_token_path".into(),
        json!(session.session_token_path),
    );
    insert_some(
        &mut map,
        "expiration_duration",
        session.expiration_duration.as_ref().map(|d| json!(d)),
    );
    map.insert("request_authentication".into(), request_authentication);
    map.insert("decoder".into(), json!({"type": decoder}));
    Value::Object(map)
}
