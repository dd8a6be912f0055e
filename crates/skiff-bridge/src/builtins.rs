// SPDX-License-Identifier: MIT
//
// Built-in bridge functions every Skiff app ships with.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use skiff_core::{EventBus, LifecycleEvent, SkiffError};
use tracing::info;

use crate::error::BridgeError;
use crate::registry::BridgeRegistry;
use crate::traits::PlatformShell;

/// Shared state the builtins close over.
#[derive(Clone)]
pub struct BuiltinContext {
    /// Version string of the installed bundle.
    pub app_version: String,
    pub shell: Arc<dyn PlatformShell>,
    pub events: EventBus,
}

#[derive(Deserialize)]
struct UrlParams {
    url: String,
}

#[derive(Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Deserialize)]
struct KeyValueParams {
    key: String,
    value: String,
}

/// Register the standard function set on `registry`.
pub fn register_builtins(registry: &BridgeRegistry, ctx: BuiltinContext) {
    let version = ctx.app_version.clone();
    registry.register("App.Version", move |_params: Option<&Value>| {
        Ok(json!(version))
    });

    let shell = Arc::clone(&ctx.shell);
    registry.register("App.Platform", move |_params: Option<&Value>| {
        Ok(json!(shell.platform_name()))
    });

    // Opening a browser is handled by the host shell: the builtin only
    // validates and announces, so webview and non-webview hosts can react
    // however suits them.
    let events = ctx.events.clone();
    registry.register("Browser.Open", move |params: Option<&Value>| {
        let UrlParams { url } = decode_params(params)?;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(BridgeError::InvalidParameters(format!(
                "not an http(s) URL: {url}"
            )));
        }
        info!(%url, "external browser requested");
        events.emit(LifecycleEvent::NavigateExternal { url });
        Ok(json!(true))
    });

    let shell = Arc::clone(&ctx.shell);
    registry.register("SecureStore.Set", move |params: Option<&Value>| {
        let KeyValueParams { key, value } = decode_params(params)?;
        shell.store(&key, &value).map_err(store_error)?;
        Ok(json!(true))
    });

    let shell = Arc::clone(&ctx.shell);
    registry.register("SecureStore.Get", move |params: Option<&Value>| {
        let KeyParams { key } = decode_params(params)?;
        let value = shell.load(&key).map_err(store_error)?;
        Ok(value.map(Value::String).unwrap_or(Value::Null))
    });

    let shell = Arc::clone(&ctx.shell);
    registry.register("SecureStore.Delete", move |params: Option<&Value>| {
        let KeyParams { key } = decode_params(params)?;
        shell.delete(&key).map_err(store_error)?;
        Ok(json!(true))
    });
}

fn decode_params<T: DeserializeOwned>(params: Option<&Value>) -> Result<T, BridgeError> {
    let params = params.ok_or_else(|| BridgeError::InvalidParameters("parameters required".into()))?;
    serde_json::from_value(params.clone())
        .map_err(|e| BridgeError::InvalidParameters(e.to_string()))
}

fn store_error(err: SkiffError) -> BridgeError {
    match err {
        SkiffError::PlatformUnavailable => {
            BridgeError::ExecutionFailed("secure storage unavailable on this platform".into())
        }
        other => BridgeError::ExecutionFailed(other.to_string()),
    }
}
