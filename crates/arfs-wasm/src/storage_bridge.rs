//! JavaScript key-value storage bridge for WASM.
//!
//! Implements the `StateBackend` trait by calling JavaScript callback functions
//! provided by the host page. Callbacks may be sync or async; plain return
//! values are wrapped in a resolved Promise before awaiting.

use arfs_core::store::{Result, StateBackend, StoreError};
use async_trait::async_trait;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

/// JavaScript storage bridge.
///
/// Holds JS callback functions for storage operations. The TypeScript side
/// creates this with callbacks that wrap `localStorage`, IndexedDB or similar.
///
/// # Example (TypeScript side)
///
/// ```typescript
/// const bridge = new JsStorageBridge(
///   (key) => localStorage.getItem(key),
///   (key, value) => localStorage.setItem(key, value),
///   (key) => localStorage.removeItem(key),
///   () => Object.keys(localStorage),
/// );
/// ```
#[wasm_bindgen]
pub struct JsStorageBridge {
    get_fn: js_sys::Function,
    set_fn: js_sys::Function,
    remove_fn: js_sys::Function,
    keys_fn: js_sys::Function,
}

#[wasm_bindgen]
impl JsStorageBridge {
    /// Create a new storage bridge with JS callback functions.
    ///
    /// `get` must yield a string or `null`/`undefined`; `keys` an array of strings.
    #[wasm_bindgen(constructor)]
    pub fn new(
        get_fn: js_sys::Function,
        set_fn: js_sys::Function,
        remove_fn: js_sys::Function,
        keys_fn: js_sys::Function,
    ) -> Self {
        Self {
            get_fn,
            set_fn,
            remove_fn,
            keys_fn,
        }
    }
}

/// Call a JS function and await its result, whether or not it returned a Promise.
async fn call_js_async(func: &js_sys::Function, args: &[JsValue]) -> std::result::Result<JsValue, JsValue> {
    let js_args = args.iter().collect::<js_sys::Array>();
    let value = func.apply(&JsValue::NULL, &js_args)?;
    JsFuture::from(js_sys::Promise::resolve(&value)).await
}

/// Convert a thrown JS value to a backend error.
fn js_err_to_store_err(err: JsValue) -> StoreError {
    let msg = err
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(&err, &"message".into())
                .ok()
                .and_then(|v| v.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err));
    StoreError::Backend(msg)
}

#[async_trait(?Send)]
impl StateBackend for JsStorageBridge {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result = call_js_async(&self.get_fn, &[key.into()])
            .await
            .map_err(js_err_to_store_err)?;

        if result.is_null() || result.is_undefined() {
            return Ok(None);
        }
        result
            .as_string()
            .map(Some)
            .ok_or_else(|| StoreError::Backend(format!("Value for {} is not a string", key)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        call_js_async(&self.set_fn, &[key.into(), value.into()])
            .await
            .map_err(js_err_to_store_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        call_js_async(&self.remove_fn, &[key.into()])
            .await
            .map_err(js_err_to_store_err)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let result = call_js_async(&self.keys_fn, &[])
            .await
            .map_err(js_err_to_store_err)?;

        serde_wasm_bindgen::from_value(result)
            .map_err(|e| StoreError::Backend(format!("Invalid key list: {}", e)))
    }
}
