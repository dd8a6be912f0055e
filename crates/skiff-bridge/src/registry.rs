// SPDX-License-Identifier: MIT
//
// Function table and dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// A callable native capability.
///
/// `params` is `None` when the caller sent no parameters (an absent payload
/// and the literal string `"[]"` are both treated as no-parameters).
pub trait BridgeFunction: Send + Sync {
    fn invoke(&self, params: Option<&Value>) -> BridgeResult;
}

impl<F> BridgeFunction for F
where
    F: Fn(Option<&Value>) -> BridgeResult + Send + Sync,
{
    fn invoke(&self, params: Option<&Value>) -> BridgeResult {
        self(params)
    }
}

/// Name-addressed table of native functions.
///
/// Registration happens during startup; calls arrive on webview threads, so
/// the table sits behind a read-write lock rather than requiring `&mut`.
#[derive(Default)]
pub struct BridgeRegistry {
    functions: RwLock<HashMap<String, Arc<dyn BridgeFunction>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a dotted name ("Browser.Open"). A second
    /// registration under the same name replaces the first.
    pub fn register(&self, name: impl Into<String>, function: impl BridgeFunction + 'static) {
        let name = name.into();
        debug!(%name, "bridge function registered");
        let mut functions = match self.functions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.insert(name, Arc::new(function));
    }

    /// Whether a function is registered under `name`. The webview probes
    /// this before dispatching so unsupported calls can fall back locally.
    pub fn exists(&self, name: &str) -> bool {
        let functions = match self.functions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.contains_key(name)
    }

    /// Remove a registration. Only test harnesses need this at runtime.
    pub fn unregister(&self, name: &str) {
        let mut functions = match self.functions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.remove(name);
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<String> {
        let functions = match self.functions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.keys().cloned().collect()
    }

    /// Dispatch a call from the UI.
    ///
    /// Returns `None` when no function is registered under `name`: the
    /// webview side treats an absent reply as "not a native call" and falls
    /// through to its own handling. Every other outcome produces a JSON
    /// string, either the function's result or an error envelope.
    pub fn call(&self, name: &str, raw_params: Option<&str>) -> Option<String> {
        let function = {
            let functions = match self.functions.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            functions.get(name).cloned()
        };

        let Some(function) = function else {
            warn!(%name, "bridge call to unregistered function");
            return None;
        };

        let params = match parse_params(raw_params) {
            Ok(params) => params,
            Err(err) => {
                warn!(%name, error = %err, "bridge call rejected");
                return Some(err.to_payload());
            }
        };

        match function.invoke(params.as_ref()) {
            Ok(value) => Some(value.to_string()),
            Err(err) => {
                warn!(%name, code = err.wire_code(), error = %err, "bridge call failed");
                Some(err.to_payload())
            }
        }
    }
}

/// Decode the raw parameter string.
///
/// Historic UI clients send `"[]"` to mean "no parameters" even for
/// functions that take an object, so that literal maps to `None` before any
/// JSON parsing happens.
fn parse_params(raw: Option<&str>) -> Result<Option<Value>, BridgeError> {
    let raw = match raw {
        None => return Ok(None),
        Some(raw) => raw.trim(),
    };
    if raw.is_empty() || raw == "[]" {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| BridgeError::InvalidJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> BridgeRegistry {
        let registry = BridgeRegistry::new();
        registry.register("Test.Echo", |params: Option<&Value>| {
            Ok(params.cloned().unwrap_or(Value::Null))
        });
        registry.register("Test.Fail", |_params: Option<&Value>| {
            Err(BridgeError::ExecutionFailed("boom".into()))
        });
        registry
    }

    #[test]
    fn unknown_function_returns_none() {
        let registry = echo_registry();
        assert!(registry.call("Nope.Missing", Some("{}")).is_none());
    }

    #[test]
    fn success_returns_raw_json_result() {
        let registry = echo_registry();
        let out = registry.call("Test.Echo", Some(r#"{"a":1}"#)).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn empty_array_literal_means_no_parameters() {
        let registry = echo_registry();
        let out = registry.call("Test.Echo", Some("[]")).unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn malformed_json_yields_invalid_json_envelope() {
        let registry = echo_registry();
        let out = registry.call("Test.Echo", Some("{not json")).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "INVALID_JSON");
    }

    #[test]
    fn function_error_becomes_envelope() {
        let registry = echo_registry();
        let out = registry.call("Test.Fail", None).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["code"], "EXECUTION_FAILED");
        assert_eq!(value["message"], "execution failed: boom");
    }

    #[test]
    fn exists_reflects_registration_and_removal() {
        let registry = echo_registry();
        assert!(registry.exists("Test.Echo"));
        assert!(!registry.exists("Nope.Missing"));
        registry.unregister("Test.Echo");
        assert!(!registry.exists("Test.Echo"));
        assert!(registry.call("Test.Echo", None).is_none());
    }

    #[test]
    fn re_registration_replaces() {
        let registry = echo_registry();
        registry.register("Test.Echo", |_: Option<&Value>| Ok(json!("v2")));
        let out = registry.call("Test.Echo", None).unwrap();
        assert_eq!(out, "\"v2\"");
    }
}
