mod common;

use connector_builder_rs::contracts::{
    register_builder_contracts, FORMAT_YAML_CONTRACT, LOCKED_INPUTS_CONTRACT, RESOLVE_CONTRACT,
    RESOLVE_LOCAL_IMPL, TO_BUILDER_CONTRACT, TO_MANIFEST_CONTRACT, VALIDATE_CONTRACT,
};
use connector_builder_rs::{
    ConversionError, Context, RefResolutionError, Registry, ResolveError,
};
use serde_json::{json, Value};

fn setup() -> Registry {
    let registry = Registry::new();
    register_builder_contracts(&registry);
    registry
}

#[test]
fn resolve_contract_is_bound_to_the_local_resolver() {
    let registry = setup();
    let mut ctx = registry.context();
    assert_eq!(
        ctx.binding_for(RESOLVE_CONTRACT).as_deref(),
        Some(RESOLVE_LOCAL_IMPL)
    );
    let out = ctx
        .call(RESOLVE_CONTRACT, json!({"manifest": common::manifest()}), None)
        .unwrap();
    assert_eq!(
        out["manifest"]["streams"][0]["retriever"]["requester"]["url_base"],
        json!("https://api.example.com/v1")
    );
}

#[test]
fn to_builder_then_to_manifest_reproduces_the_manifest() {
    let registry = setup();
    let mut ctx = registry.context();
    let form = ctx
        .call(TO_BUILDER_CONTRACT, json!({"manifest": common::manifest()}), None)
        .unwrap();
    let out = ctx
        .call(
            TO_MANIFEST_CONTRACT,
            json!({"formValues": form["formValues"], "version": "6.7.0"}),
            None,
        )
        .unwrap();
    assert_eq!(out, json!({"manifest": common::manifest()}));
}

#[test]
fn to_builder_uses_the_bound_resolver() {
    let registry = setup();
    registry.register(
        "test://impl/resolve-fixture@1",
        |_ctx: &mut Context, _input: Value, _meta: Option<Value>| -> anyhow::Result<Value> {
            Ok(json!({"manifest": connector_builder_rs::resolve(&common::manifest())?}))
        },
    );
    registry.set_binding(RESOLVE_CONTRACT, "test://impl/resolve-fixture@1");

    let mut ctx = registry.context();
    let out = ctx
        .call(TO_BUILDER_CONTRACT, json!({"manifest": {}}), None)
        .unwrap();
    assert_eq!(out["formValues"]["streams"][1]["name"], json!("posts"));
}

#[test]
fn failing_resolver_surfaces_through_to_builder() {
    let registry = setup();
    registry.register(
        "test://impl/resolve-offline@1",
        |_ctx: &mut Context, _input: Value, _meta: Option<Value>| -> anyhow::Result<Value> {
            Err(anyhow::anyhow!("resolver offline"))
        },
    );
    registry.set_binding(RESOLVE_CONTRACT, "test://impl/resolve-offline@1");

    let mut ctx = registry.context();
    let err = ctx
        .call(TO_BUILDER_CONTRACT, json!({"manifest": {}}), None)
        .unwrap_err();
    assert!(format!("{err:#}").contains("resolver offline"));
}

#[test]
fn local_reference_errors_keep_their_type() {
    let registry = setup();
    let mut ctx = registry.context();
    let manifest = json!({
        "version": "6.7.0",
        "streams": [{"$ref": "#/definitions/streams/missing"}]
    });
    let err = ctx
        .call(TO_BUILDER_CONTRACT, json!({ "manifest": manifest }), None)
        .unwrap_err();
    let conversion = err
        .downcast_ref::<ConversionError>()
        .expect("conversion error");
    assert!(matches!(
        conversion,
        ConversionError::Resolve(ResolveError::Reference(RefResolutionError::Dangling { .. }))
    ));
}

#[test]
fn locked_inputs_contract_reports_keys() {
    let registry = setup();
    let mut ctx = registry.context();
    let form = ctx
        .call(TO_BUILDER_CONTRACT, json!({"manifest": common::manifest()}), None)
        .unwrap();
    let out = ctx
        .call(LOCKED_INPUTS_CONTRACT, form.clone(), None)
        .unwrap();
    assert_eq!(out["lockedKeys"], json!(["api_key"]));
    assert_eq!(out["inputs"][0]["isLocked"], json!(true));
}

#[test]
fn validate_contract_reports_issues() {
    let registry = setup();
    let mut ctx = registry.context();
    let out = ctx
        .call(
            VALIDATE_CONTRACT,
            json!({"formValues": {"global": {"urlBase": ""}, "streams": []}}),
            None,
        )
        .unwrap();
    assert_eq!(out["valid"], json!(false));
    let paths: Vec<&str> = out["issues"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|issue| issue["path"].as_str())
        .collect();
    assert_eq!(paths, vec!["global.urlBase", "streams"]);
}

#[test]
fn format_yaml_orders_sections() {
    let registry = setup();
    let mut ctx = registry.context();
    let out = ctx
        .call(
            FORMAT_YAML_CONTRACT,
            json!({"manifest": common::manifest(), "blankLines": false}),
            None,
        )
        .unwrap();
    let text = out["text"].as_str().unwrap();
    assert!(text.starts_with("version:"));
    let parsed: Value = serde_yaml::from_str(text).unwrap();
    assert_eq!(parsed, common::manifest());
}

#[test]
fn missing_inputs_are_errors() {
    let registry = setup();
    let mut ctx = registry.context();
    let err = ctx.call(TO_MANIFEST_CONTRACT, json!({}), None).unwrap_err();
    assert_eq!(err.to_string(), "formValues must be provided");
}
