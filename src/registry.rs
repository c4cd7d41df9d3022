use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use tracing::debug;

const CONTRACT_PREFIX: &str = "builder://contract/";

struct FuncEntry {
    func: Arc<dyn Func>,
    outputs: Option<Arc<Vec<String>>>,
}

struct RegistryInner {
    funcs: HashMap<String, Arc<FuncEntry>>,
    bindings: HashMap<String, String>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            funcs: HashMap::new(),
            bindings: HashMap::new(),
        }
    }
}

/// Named JSON-in/JSON-out functions plus contract → implementation
/// bindings. Clones share the same table.
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub trait Func: Send + Sync {
    fn call(&self, ctx: &mut Context, input: Value, meta: Option<Value>) -> Result<Value>;
}

impl<F> Func for F
where
    F: Fn(&mut Context, Value, Option<Value>) -> Result<Value> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context, input: Value, meta: Option<Value>) -> Result<Value> {
        (self)(ctx, input, meta)
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::new())),
        }
    }

    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Func + 'static,
    {
        self.register_entry(name, func, None);
    }

    /// Registers `func` and keeps only `outputs` keys of its result.
    pub fn register_with_outputs<F>(
        &self,
        name: impl Into<String>,
        func: F,
        outputs: Option<Arc<Vec<String>>>,
    ) where
        F: Func + 'static,
    {
        self.register_entry(name, func, outputs);
    }

    fn register_entry<F>(&self, name: impl Into<String>, func: F, outputs: Option<Arc<Vec<String>>>)
    where
        F: Func + 'static,
    {
        let entry = Arc::new(FuncEntry {
            func: Arc::new(func),
            outputs,
        });
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.funcs.insert(name.into(), entry);
    }

    pub fn set_binding(&self, contract: impl Into<String>, implementation: impl Into<String>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner
            .bindings
            .insert(contract.into(), implementation.into());
    }

    pub fn call(
        &self,
        ctx: &mut Context,
        name: &str,
        input: Value,
        meta: Option<Value>,
    ) -> Result<Value> {
        ctx.call(name, input, meta)
    }

    pub fn context(&self) -> Context {
        Context {
            registry: self.inner.clone(),
            depth: 0,
        }
    }
}

fn enforce_outputs(value: Value, allowed: &[String]) -> Value {
    if allowed.is_empty() {
        return value;
    }
    match value {
        Value::Object(mut map) => {
            let mut filtered = Map::new();
            for key in allowed {
                let entry = map.remove(key).unwrap_or(Value::Null);
                filtered.insert(key.clone(), entry);
            }
            Value::Object(filtered)
        }
        other => other,
    }
}

/// Direct registrations win over bindings; an unbound contract id is
/// reported separately from an unknown function.
fn find_entry(inner: &RegistryInner, name: &str) -> (Option<Arc<FuncEntry>>, bool) {
    if let Some(entry) = inner.funcs.get(name) {
        return (Some(entry.clone()), false);
    }
    if let Some(binding) = inner.bindings.get(name) {
        return (inner.funcs.get(binding).cloned(), false);
    }
    (None, name.starts_with(CONTRACT_PREFIX))
}

/// Call context handed to every function; nested calls go through it.
pub struct Context {
    registry: Arc<Mutex<RegistryInner>>,
    depth: usize,
}

impl Context {
    pub fn call(&mut self, name: &str, input: Value, meta: Option<Value>) -> Result<Value> {
        let (maybe_entry, missing_contract_binding) = {
            let inner = self.registry.lock().expect("registry poisoned");
            find_entry(&inner, name)
        };
        let Some(entry) = maybe_entry else {
            if missing_contract_binding {
                return Err(anyhow!("No binding for contract: {name}"));
            }
            return Err(anyhow!("function not found: {name}"));
        };

        debug!(name, depth = self.depth, "calling function");
        self.depth += 1;
        let result = entry.func.call(self, input, meta);
        self.depth -= 1;

        let value = result?;
        Ok(match &entry.outputs {
            Some(allowed) => enforce_outputs(value, allowed),
            None => value,
        })
    }

    pub fn binding_for(&self, contract: &str) -> Option<String> {
        let inner = self.registry.lock().expect("registry poisoned");
        inner.bindings.get(contract).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contracts_resolve_through_bindings() {
        let registry = Registry::new();
        registry.register("builder://impl/echo@1", |_ctx: &mut Context, input, _meta| Ok(input));
        registry.set_binding("builder://contract/echo@1", "builder://impl/echo@1");

        let mut ctx = registry.context();
        let out = ctx
            .call("builder://contract/echo@1", json!({"a": 1}), None)
            .expect("bound contract");
        assert_eq!(out, json!({"a": 1}));
        assert_eq!(
            ctx.binding_for("builder://contract/echo@1").as_deref(),
            Some("builder://impl/echo@1")
        );
    }

    #[test]
    fn missing_contract_binding_is_distinct() {
        let registry = Registry::new();
        let mut ctx = registry.context();
        let err = ctx
            .call("builder://contract/missing@1", json!({}), None)
            .expect_err("unbound");
        assert_eq!(err.to_string(), "No binding for contract: builder://contract/missing@1");
        let err = ctx.call("other@1", json!({}), None).expect_err("unknown");
        assert_eq!(err.to_string(), "function not found: other@1");
    }

    #[test]
    fn outputs_are_filtered() {
        let registry = Registry::new();
        registry.register_with_outputs(
            "builder://impl/wide@1",
            |_ctx: &mut Context, _input, _meta| Ok(json!({"keep": 1, "drop": 2})),
            Some(Arc::new(vec!["keep".to_string(), "missing".to_string()])),
        );
        let out = registry
            .call(&mut registry.context(), "builder://impl/wide@1", json!({}), None)
            .expect("call");
        assert_eq!(out, json!({"keep": 1, "missing": null}));
    }
}
