//! WebExtension APIs: `storage.sync` and `runtime.sendMessage`.

use ipb_core::dom::BlockNotifier;
use ipb_core::{KeyValueStore, StoreError};
use js_sys::{Function, Object, Promise, Reflect, JSON};
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// The extension namespace: `browser` where available, `chrome` otherwise.
fn extension_namespace() -> Option<JsValue> {
    let global = js_sys::global();
    ["browser", "chrome"]
        .into_iter()
        .filter_map(|name| Reflect::get(&global, &JsValue::from_str(name)).ok())
        .find(|value| value.is_object())
}

fn lookup(target: &JsValue, path: &[&str]) -> Option<JsValue> {
    path.iter().try_fold(target.clone(), |current, key| {
        Reflect::get(&current, &JsValue::from_str(key))
            .ok()
            .filter(|value| !value.is_undefined() && !value.is_null())
    })
}

fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

// =============================================================================
// Storage
// =============================================================================

/// `storage.sync` as a [`KeyValueStore`].
pub struct BrowserStorage {
    area: JsValue,
}

impl BrowserStorage {
    pub fn sync() -> Result<Self, StoreError> {
        let area = extension_namespace()
            .and_then(|namespace| lookup(&namespace, &["storage", "sync"]))
            .ok_or_else(|| StoreError::Unavailable("storage.sync is not exposed".to_string()))?;
        Ok(Self { area })
    }

    async fn call(&self, method: &str, argument: &JsValue) -> Result<JsValue, StoreError> {
        let function: Function = Reflect::get(&self.area, &JsValue::from_str(method))
            .ok()
            .and_then(|value| value.dyn_into().ok())
            .ok_or_else(|| StoreError::Unavailable(format!("storage.sync.{method} is missing")))?;

        let pending = function
            .call1(&self.area, argument)
            .map_err(|err| StoreError::Rejected(describe(&err)))?;
        let promise: Promise = pending
            .dyn_into()
            .map_err(|_| StoreError::Unavailable(format!("storage.sync.{method} did not return a promise")))?;

        JsFuture::from(promise)
            .await
            .map_err(|err| StoreError::Rejected(describe(&err)))
    }
}

fn to_js(key: &str, value: &Value) -> Result<JsValue, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        key: key.to_string(),
        reason,
    };
    let text = serde_json::to_string(value).map_err(|err| malformed(err.to_string()))?;
    JSON::parse(&text).map_err(|err| malformed(describe(&err)))
}

fn from_js(key: &str, value: &JsValue) -> Result<Value, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        key: key.to_string(),
        reason,
    };
    let text: String = JSON::stringify(value)
        .map_err(|err| malformed(describe(&err)))?
        .into();
    serde_json::from_str(&text).map_err(|err| malformed(err.to_string()))
}

impl KeyValueStore for BrowserStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let items = self.call("get", &JsValue::from_str(key)).await?;
        let value = Reflect::get(&items, &JsValue::from_str(key)).map_err(|err| StoreError::Rejected(describe(&err)))?;
        if value.is_undefined() {
            return Ok(None);
        }
        from_js(key, &value).map(Some)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let items = Object::new();
        Reflect::set(&items, &JsValue::from_str(key), &to_js(key, &value)?)
            .map_err(|err| StoreError::Rejected(describe(&err)))?;
        self.call("set", &items).await.map(|_| ())
    }
}

// =============================================================================
// Badge Notification
// =============================================================================

/// Sends `"blocked"` to the background page once per new rule.
pub struct RuntimeNotifier {
    send_message: Option<(JsValue, Function)>,
    on_reject: Closure<dyn FnMut(JsValue)>,
}

impl RuntimeNotifier {
    pub fn new() -> Self {
        let send_message = extension_namespace()
            .and_then(|namespace| lookup(&namespace, &["runtime"]))
            .and_then(|runtime| {
                let function = lookup(&runtime, &["sendMessage"])?.dyn_into::<Function>().ok()?;
                Some((runtime, function))
            });
        Self {
            send_message,
            on_reject: Closure::new(|_: JsValue| {}),
        }
    }
}

impl Default for RuntimeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockNotifier for RuntimeNotifier {
    fn blocked(&self) {
        let Some((runtime, function)) = &self.send_message else {
            return;
        };
        // Rejects when no listener is registered.
        if let Ok(pending) = function.call1(runtime, &JsValue::from_str("blocked")) {
            if let Ok(promise) = pending.dyn_into::<Promise>() {
                let _ = promise.catch(&self.on_reject);
            }
        }
    }
}
