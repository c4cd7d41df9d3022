use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use serde_json::{json, Value};

use crate::builder::{derive_locked_inputs, sync_locked_inputs, BuilderFormValues};
use crate::convert::{builder_to_manifest_with, convert_to_builder_form_values, ManifestOptions};
use crate::error::{RefResolutionError, ResolveError};
use crate::manifest::{to_display_yaml, DEFAULT_MANIFEST_VERSION};
use crate::registry::{Context, Registry};
use crate::resolver::{resolve, ManifestResolver};
use crate::validation::validate_form_values;

pub const RESOLVE_CONTRACT: &str = "builder://contract/manifest/resolve@1";
pub const RESOLVE_LOCAL_IMPL: &str = "builder://impl/manifest/resolve-local@1";
pub const TO_BUILDER_CONTRACT: &str = "builder://contract/manifest/to-builder@1";
pub const TO_MANIFEST_CONTRACT: &str = "builder://contract/builder/to-manifest@1";
pub const LOCKED_INPUTS_CONTRACT: &str = "builder://contract/builder/locked-inputs@1";
pub const VALIDATE_CONTRACT: &str = "builder://contract/builder/validate@1";
pub const FORMAT_YAML_CONTRACT: &str = "builder://contract/manifest/format-yaml@1";

fn outputs(keys: &[&str]) -> Option<Arc<Vec<String>>> {
    Some(Arc::new(keys.iter().map(|key| key.to_string()).collect()))
}

/// Registers every conversion contract and binds manifest resolution to
/// the in-process resolver. Rebinding [`RESOLVE_CONTRACT`] swaps the
/// resolver used by `to-builder`.
pub fn register_builder_contracts(registry: &Registry) {
    registry.register_with_outputs(RESOLVE_LOCAL_IMPL, resolve_local, outputs(&["manifest"]));
    registry.set_binding(RESOLVE_CONTRACT, RESOLVE_LOCAL_IMPL);

    registry.register_with_outputs(TO_BUILDER_CONTRACT, to_builder, outputs(&["formValues"]));
    registry.register_with_outputs(TO_MANIFEST_CONTRACT, to_manifest, outputs(&["manifest"]));
    registry.register_with_outputs(
        LOCKED_INPUTS_CONTRACT,
        locked_inputs,
        outputs(&["inputs", "lockedKeys"]),
    );
    registry.register_with_outputs(VALIDATE_CONTRACT, validate, outputs(&["valid", "issues"]));
    registry.register_with_outputs(FORMAT_YAML_CONTRACT, format_yaml, outputs(&["text"]));
}

fn required_field<'a>(input: &'a Value, field: &str) -> Result<&'a Value> {
    input
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| anyhow!("{field} must be provided"))
}

fn form_values(input: &Value) -> Result<BuilderFormValues> {
    let raw = required_field(input, "formValues")?;
    serde_json::from_value(raw.clone()).context("formValues do not decode")
}

fn resolve_local(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let manifest = required_field(&input, "manifest")?;
    let resolved = resolve(manifest)?;
    Ok(json!({ "manifest": resolved }))
}

/// Resolves manifests through whatever implementation the registry binds
/// to [`RESOLVE_CONTRACT`].
pub struct ContractResolver<'a> {
    ctx: &'a mut Context,
}

impl<'a> ContractResolver<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self { ctx }
    }
}

impl ManifestResolver for ContractResolver<'_> {
    fn resolve_manifest(&mut self, manifest: &Value) -> Result<Value, ResolveError> {
        let mut output = self
            .ctx
            .call(RESOLVE_CONTRACT, json!({ "manifest": manifest }), None)
            .map_err(|err| match err.downcast::<RefResolutionError>() {
                Ok(reference) => ResolveError::Reference(reference),
                Err(err) => ResolveError::Remote(err),
            })?;
        match output.get_mut("manifest").map(Value::take) {
            Some(resolved) if resolved.is_object() => Ok(resolved),
            _ => Err(ResolveError::Remote(anyhow!(
                "{RESOLVE_CONTRACT} did not return a manifest object"
            ))),
        }
    }
}

fn to_builder(ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let manifest = required_field(&input, "manifest")?;
    let mut resolver = ContractResolver::new(ctx);
    let values = convert_to_builder_form_values(&mut resolver, manifest)?;
    Ok(json!({ "formValues": serde_json::to_value(values)? }))
}

fn to_manifest(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let values = form_values(&input)?;
    let version = input
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_MANIFEST_VERSION)
        .to_string();
    let manifest = builder_to_manifest_with(&values, &ManifestOptions { version });
    Ok(json!({ "manifest": manifest }))
}

fn locked_inputs(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let values = form_values(&input)?;
    let locked = derive_locked_inputs(&values.global.authenticator, &values.streams);
    let inputs = sync_locked_inputs(&values);
    Ok(json!({
        "inputs": serde_json::to_value(inputs)?,
        "lockedKeys": locked.keys().collect::<Vec<_>>(),
    }))
}

fn validate(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let raw = required_field(&input, "formValues")?;
    let report = validate_form_values(raw);
    Ok(json!({
        "valid": report.is_valid(),
        "issues": serde_json::to_value(&report.issues)?,
    }))
}

fn format_yaml(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let manifest = required_field(&input, "manifest")?;
    let blank_lines = input
        .get("blankLines")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let text = to_display_yaml(manifest, blank_lines).context("manifest does not encode as YAML")?;
    Ok(json!({ "text": text }))
}
