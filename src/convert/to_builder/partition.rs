use std::collections::HashMap;

use serde_json::Value;

use super::components::request_option;
use super::support::{
    expect_type, known_fields, optional_bool, required_string, string_list, Converted, Scope,
};
use crate::builder::types::{
    BuilderParameterizedRequests, BuilderParentStream, BuilderRequestOption, ListValues, YamlOr,
};
use crate::manifest::{
    canonical_json, type_of, LIST_PARTITION_ROUTER, PARENT_STREAM_CONFIG,
    SUBSTREAM_PARTITION_ROUTER,
};

/// Maps the canonical JSON of every stream to the positions it occupies.
pub(crate) struct StreamIndex {
    positions: HashMap<String, Vec<usize>>,
}

impl StreamIndex {
    pub fn new(streams: &[Value]) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, stream) in streams.iter().enumerate() {
            positions.entry(canonical_json(stream)).or_default().push(index);
        }
        Self { positions }
    }

    fn lookup(&self, stream: &Value) -> &[usize] {
        self.positions
            .get(&canonical_json(stream))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub(crate) struct PartitionRouting {
    pub parent_stream: Option<YamlOr<BuilderParentStream>>,
    pub parameterized_requests: Option<YamlOr<Vec<BuilderParameterizedRequests>>>,
}

pub(crate) fn partition_routers(
    scope: &Scope,
    value: Option<&Value>,
    own_index: usize,
    streams: &StreamIndex,
) -> Converted<PartitionRouting> {
    let routers: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(PartitionRouting::default()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };

    let mut parent = None;
    let mut parameterized = Vec::new();
    for router in routers {
        match type_of(router) {
            Some(LIST_PARTITION_ROUTER) => parameterized.push(list_router(scope, router)?),
            Some(SUBSTREAM_PARTITION_ROUTER) => {
                if parent.is_some() {
                    return scope.fail("only one SubstreamPartitionRouter is supported");
                }
                parent = Some(substream_router(scope, router, own_index, streams)?);
            }
            Some(other) => return scope.fail(format!("partition router {other} is not supported")),
            None => return scope.fail("partition_router must have a type"),
        }
    }

    Ok(PartitionRouting {
        parent_stream: parent.map(YamlOr::Builder),
        parameterized_requests: (!parameterized.is_empty()).then_some(YamlOr::Builder(parameterized)),
    })
}

fn list_router(scope: &Scope, value: &Value) -> Converted<BuilderParameterizedRequests> {
    let map = known_fields(
        scope,
        value,
        LIST_PARTITION_ROUTER,
        &["type", "cursor_field", "values", "request_option"],
    )?;
    let values = match map.get("values") {
        Some(Value::String(variable)) => ListValues::Variable(variable.clone()),
        Some(list @ Value::Array(_)) => {
            ListValues::List(string_list(scope, list, "ListPartitionRouter.values")?)
        }
        _ => return scope.fail("ListPartitionRouter.values must be a list or an interpolated string"),
    };
    Ok(BuilderParameterizedRequests {
        cursor_field: required_string(scope, map, "cursor_field", LIST_PARTITION_ROUTER)?,
        values,
        request_option: optional_option(scope, map.get("request_option"), LIST_PARTITION_ROUTER)?,
    })
}

fn substream_router(
    scope: &Scope,
    value: &Value,
    own_index: usize,
    streams: &StreamIndex,
) -> Converted<BuilderParentStream> {
    let map = known_fields(
        scope,
        value,
        SUBSTREAM_PARTITION_ROUTER,
        &["type", "parent_stream_configs"],
    )?;
    let config = match map.get("parent_stream_configs").and_then(Value::as_array) {
        Some(configs) if configs.len() == 1 => &configs[0],
        Some(_) => {
            return scope.fail("SubstreamPartitionRouter must have exactly one parent_stream_configs entry")
        }
        None => return scope.fail("SubstreamPartitionRouter.parent_stream_configs must be a list"),
    };
    let config_map = known_fields(
        scope,
        config,
        PARENT_STREAM_CONFIG,
        &[
            "type",
            "parent_key",
            "partition_field",
            "stream",
            "request_option",
            "incremental_dependency",
        ],
    )?;
    if config_map.contains_key("type") {
        expect_type(scope, config, "parent_stream_configs", PARENT_STREAM_CONFIG)?;
    }

    let Some(parent) = config_map.get("stream") else {
        return scope.fail("ParentStreamConfig.stream is required");
    };
    let reference = match streams.lookup(parent) {
        [] => return scope.fail("parent stream does not match any stream in the manifest"),
        [index] if *index == own_index => return scope.fail("parent stream references itself"),
        [index] => index.to_string(),
        _ => return scope.fail("parent stream matches more than one stream in the manifest"),
    };

    Ok(BuilderParentStream {
        parent_key: required_string(scope, config_map, "parent_key", PARENT_STREAM_CONFIG)?,
        partition_field: required_string(scope, config_map, "partition_field", PARENT_STREAM_CONFIG)?,
        parent_stream_reference: reference,
        request_option: optional_option(scope, config_map.get("request_option"), PARENT_STREAM_CONFIG)?,
        incremental_dependency: optional_bool(
            scope,
            config_map,
            "incremental_dependency",
            PARENT_STREAM_CONFIG,
        )?,
    })
}

fn optional_option(
    scope: &Scope,
    value: Option<&Value>,
    component: &str,
) -> Converted<Option<BuilderRequestOption>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(option) => Ok(Some(request_option(
            scope,
            option,
            &format!("{component}.request_option"),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_matches_structurally() {
        let streams = vec![
            json!({"name": "a", "type": "DeclarativeStream"}),
            json!({"type": "DeclarativeStream", "name": "b"}),
        ];
        let index = StreamIndex::new(&streams);
        assert_eq!(index.lookup(&json!({"type": "DeclarativeStream", "name": "a"})), &[0]);
        assert!(index.lookup(&json!({"name": "c"})).is_empty());
    }

    #[test]
    fn list_router_values() {
        let scope = Scope::global(None);
        let routing = partition_routers(
            &scope,
            Some(&json!([
                {"type": "ListPartitionRouter", "cursor_field": "section", "values": ["a", "b"]},
                {"type": "ListPartitionRouter", "cursor_field": "region", "values": "{{ config['regions'] }}"}
            ])),
            0,
            &StreamIndex::new(&[]),
        )
        .expect("converts");
        let Some(YamlOr::Builder(requests)) = routing.parameterized_requests else {
            panic!("expected parameterized requests");
        };
        assert_eq!(requests[0].values, ListValues::List(vec!["a".into(), "b".into()]));
        assert_eq!(
            requests[1].values,
            ListValues::Variable("{{ config['regions'] }}".into())
        );
        assert!(routing.parent_stream.is_none());
    }

    #[test]
    fn self_reference_is_rejected() {
        let stream = json!({"type": "DeclarativeStream", "name": "a"});
        let index = StreamIndex::new(std::slice::from_ref(&stream));
        let router = json!({
            "type": "SubstreamPartitionRouter",
            "parent_stream_configs": [{
                "type": "ParentStreamConfig",
                "parent_key": "id",
                "partition_field": "parent_id",
                "stream": stream
            }]
        });
        let scope = Scope::global(None);
        assert!(partition_routers(&scope, Some(&router), 0, &index).is_err());
    }
}
