//! Spec inputs owned by authenticator and incremental-sync wiring.
//!
//! Certain form fields can only hold a reference to a config key. The keys
//! they reference become "locked" inputs: the user cannot delete them and
//! their definition is pinned to the template of the owning field.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::builder::types::{
    BuilderAuthenticator, BuilderDatetime, BuilderFormInput, BuilderStream, YamlOr,
};
use crate::interpolation::extract_config_key;
use crate::manifest::{
    API_KEY_AUTHENTICATOR, BASIC_HTTP_AUTHENTICATOR, BEARER_AUTHENTICATOR, DATETIME_BASED_CURSOR,
    OAUTH_AUTHENTICATOR,
};

const DATETIME_PATTERN: &str = "^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z$";

/// Definition constraints for a field that must reference a config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedInputTemplate {
    pub owner: &'static str,
    pub field: &'static str,
    pub key: &'static str,
    pub title: &'static str,
    pub description: Option<&'static str>,
    pub required: bool,
    pub secret: bool,
    pub pattern: Option<&'static str>,
    pub format: Option<&'static str>,
}

impl LockedInputTemplate {
    const fn new(
        owner: &'static str,
        field: &'static str,
        key: &'static str,
        title: &'static str,
    ) -> Self {
        Self {
            owner,
            field,
            key,
            title,
            description: None,
            required: true,
            secret: false,
            pattern: None,
            format: None,
        }
    }

    const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    const fn datetime(mut self) -> Self {
        self.pattern = Some(DATETIME_PATTERN);
        self.format = Some("date-time");
        self
    }

    const fn described(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn definition(&self) -> Map<String, Value> {
        let mut definition = Map::new();
        definition.insert("type".into(), json!("string"));
        definition.insert("title".into(), json!(self.title));
        if let Some(description) = self.description {
            definition.insert("description".into(), json!(description));
        }
        if self.secret {
            definition.insert("airbyte_secret".into(), json!(true));
        }
        if let Some(pattern) = self.pattern {
            definition.insert("pattern".into(), json!(pattern));
        }
        if let Some(format) = self.format {
            definition.insert("format".into(), json!(format));
        }
        definition
    }

    pub fn to_input(&self, key: &str) -> BuilderFormInput {
        BuilderFormInput {
            key: key.to_string(),
            required: self.required,
            definition: self.definition(),
            is_locked: true,
        }
    }
}

static TEMPLATES: [LockedInputTemplate; 11] = [
    LockedInputTemplate::new(API_KEY_AUTHENTICATOR, "api_token", "api_key", "API Key").secret(),
    LockedInputTemplate::new(BEARER_AUTHENTICATOR, "api_token", "api_key", "API Key").secret(),
    LockedInputTemplate::new(BASIC_HTTP_AUTHENTICATOR, "username", "username", "Username"),
    LockedInputTemplate::new(BASIC_HTTP_AUTHENTICATOR, "password", "password", "Password")
        .secret()
        .optional(),
    LockedInputTemplate::new(OAUTH_AUTHENTICATOR, "client_id", "client_id", "Client ID").secret(),
    LockedInputTemplate::new(OAUTH_AUTHENTICATOR, "client_secret", "client_secret", "Client secret")
        .secret(),
    LockedInputTemplate::new(
        OAUTH_AUTHENTICATOR,
        "refresh_token",
        "client_refresh_token",
        "Refresh token",
    )
    .secret(),
    LockedInputTemplate::new(
        OAUTH_AUTHENTICATOR,
        "refresh_token_updater.access_token_config_path",
        "oauth_access_token",
        "Access token",
    )
    .secret()
    .optional()
    .described("The current access token. This field might be overridden by the connector based on the token refresh endpoint response."),
    LockedInputTemplate::new(
        OAUTH_AUTHENTICATOR,
        "refresh_token_updater.token_expiry_date_config_path",
        "oauth_token_expiry_date",
        "Token expiry date",
    )
    .optional()
    .described("The date the current access token expires in. This field might be overridden by the connector based on the token refresh endpoint response."),
    LockedInputTemplate::new(DATETIME_BASED_CURSOR, "start_datetime", "start_date", "Start date")
        .datetime(),
    LockedInputTemplate::new(DATETIME_BASED_CURSOR, "end_datetime", "end_date", "End date")
        .datetime(),
];

/// Looks up the template for `field` of the component of kind `owner`.
pub fn locked_input_template(owner: &str, field: &str) -> Option<&'static LockedInputTemplate> {
    TEMPLATES
        .iter()
        .find(|template| template.owner == owner && template.field == field)
}

/// Computes the spec keys implicitly owned by the form. Values that do not
/// reference a config key contribute nothing.
pub fn derive_locked_inputs(
    authenticator: &YamlOr<BuilderAuthenticator>,
    streams: &[BuilderStream],
) -> BTreeMap<String, BuilderFormInput> {
    let mut locked = BTreeMap::new();
    if let YamlOr::Builder(auth) = authenticator {
        collect_authenticator(auth, &mut locked);
    }
    for stream in streams {
        let Some(sync) = stream.sync_request() else {
            continue;
        };
        let Some(YamlOr::Builder(incremental)) = &sync.incremental_sync else {
            continue;
        };
        if let BuilderDatetime::UserInput { value } = &incremental.start_datetime {
            add_locked(&mut locked, DATETIME_BASED_CURSOR, "start_datetime", value);
        }
        if let BuilderDatetime::UserInput { value } = &incremental.end_datetime {
            add_locked(&mut locked, DATETIME_BASED_CURSOR, "end_datetime", value);
        }
    }
    locked
}

fn collect_authenticator(auth: &BuilderAuthenticator, locked: &mut BTreeMap<String, BuilderFormInput>) {
    let owner = auth.type_name();
    match auth {
        BuilderAuthenticator::NoAuth => {}
        BuilderAuthenticator::ApiKeyAuthenticator { api_token, .. }
        | BuilderAuthenticator::BearerAuthenticator { api_token } => {
            add_locked(locked, owner, "api_token", api_token);
        }
        BuilderAuthenticator::BasicHttpAuthenticator { username, password } => {
            add_locked(locked, owner, "username", username);
            if let Some(password) = password {
                add_locked(locked, owner, "password", password);
            }
        }
        BuilderAuthenticator::OAuthAuthenticator(oauth) => {
            add_locked(locked, owner, "client_id", &oauth.client_id);
            add_locked(locked, owner, "client_secret", &oauth.client_secret);
            if let Some(refresh_token) = &oauth.refresh_token {
                add_locked(locked, owner, "refresh_token", refresh_token);
            }
            if let Some(updater) = &oauth.refresh_token_updater {
                add_locked(
                    locked,
                    owner,
                    "refresh_token_updater.access_token_config_path",
                    &updater.access_token,
                );
                add_locked(
                    locked,
                    owner,
                    "refresh_token_updater.token_expiry_date_config_path",
                    &updater.token_expiry_date,
                );
            }
        }
        BuilderAuthenticator::SessionTokenAuthenticator(session) => {
            collect_authenticator(&session.login_requester.authenticator, locked);
        }
    }
}

fn add_locked(
    locked: &mut BTreeMap<String, BuilderFormInput>,
    owner: &str,
    field: &str,
    value: &str,
) {
    let (Some(template), Some(key)) = (locked_input_template(owner, field), extract_config_key(value))
    else {
        return;
    };
    locked.entry(key.clone()).or_insert_with(|| template.to_input(&key));
}

/// Brings `inputs` in line with the locked set: matching inputs are locked
/// and take the template constraints, missing ones are appended, and inputs
/// that were locked but left the set are removed.
pub fn reconcile_inputs(
    inputs: &[BuilderFormInput],
    locked: &BTreeMap<String, BuilderFormInput>,
) -> Vec<BuilderFormInput> {
    let mut reconciled = Vec::with_capacity(inputs.len() + locked.len());
    for input in inputs {
        match locked.get(&input.key) {
            Some(template) => reconciled.push(lock_input(input, template)),
            None if input.is_locked => {}
            None => reconciled.push(input.clone()),
        }
    }
    for (key, template) in locked {
        if !inputs.iter().any(|input| &input.key == key) {
            reconciled.push(template.clone());
        }
    }
    reconciled
}

fn lock_input(input: &BuilderFormInput, template: &BuilderFormInput) -> BuilderFormInput {
    let mut definition = input.definition.clone();
    for (field, value) in &template.definition {
        let user_text = matches!(field.as_str(), "title" | "description");
        if user_text && definition.contains_key(field) {
            continue;
        }
        definition.insert(field.clone(), value.clone());
    }
    BuilderFormInput {
        key: input.key.clone(),
        required: template.required,
        definition,
        is_locked: true,
    }
}
