//! WASM bindings for arfs-core.
//!
//! Provides the bridge between TypeScript (browser app) and Rust (arfs-core).
//!
//! # Architecture
//!
//! The TypeScript app creates a `JsStorageBridge` with callbacks that access
//! browser storage. This bridge implements the `StateBackend` trait, allowing
//! the Rust `SyncStateStore` to persist drive snapshots through JavaScript.
//!
//! ```text
//! TypeScript                    WASM (Rust)
//! ──────────                    ───────────
//! localStorage ──callbacks──> JsStorageBridge
//!                                   │
//!                                   ▼
//!                           impl StateBackend
//!                                   │
//!                                   ▼
//!                           SyncStateStore<JsStorageBridge>
//!                                   │
//!                                   ▼
//!                           WasmSyncStateStore (exposed to JS)
//! ```
//!
//! **Note**: This crate only compiles for `wasm32` targets. When building for native
//! targets (e.g., during `cargo check --workspace`), this crate provides no exports.

#[cfg(target_arch = "wasm32")]
mod storage_bridge;

#[cfg(target_arch = "wasm32")]
pub use storage_bridge::JsStorageBridge;

// ============================================================================
// All WASM-specific code is gated behind target_arch = "wasm32"
// This allows `cargo check --workspace` to succeed on native targets.
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod wasm_impl {
    use super::*;
    use arfs_core::state::{SerializedSyncState, deserialize_sync_state, serialize_sync_state};
    use arfs_core::{EntityId, FolderHierarchy, HierarchyEntry, ParentFolderId, SyncStateStore};
    use std::cell::RefCell;
    use tracing_subscriber::layer::SubscriberExt;
    use wasm_bindgen::prelude::*;

    // ========== Callback Logger Layer ==========

    // WASM is single-threaded, so the callback lives in thread-local storage
    thread_local! {
        static LOGGER_CALLBACK: RefCell<Option<js_sys::Function>> = const { RefCell::new(None) };
    }

    /// A tracing layer that invokes a JavaScript callback for each log event.
    struct JsCallbackLayer;

    impl<S> tracing_subscriber::Layer<S> for JsCallbackLayer
    where
        S: tracing::Subscriber,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            LOGGER_CALLBACK.with(|cb| {
                let Some(callback) = cb.borrow().as_ref().cloned() else {
                    return;
                };
                let metadata = event.metadata();

                let mut visitor = MessageVisitor::default();
                event.record(&mut visitor);

                let timestamp = web_time::SystemTime::now()
                    .duration_since(web_time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as f64)
                    .unwrap_or(0.0);

                let js_event = js_sys::Object::new();
                let _ = js_sys::Reflect::set(&js_event, &"level".into(), &metadata.level().as_str().into());
                let _ = js_sys::Reflect::set(&js_event, &"target".into(), &metadata.target().into());
                let _ = js_sys::Reflect::set(&js_event, &"message".into(), &visitor.message.into());
                let _ = js_sys::Reflect::set(&js_event, &"timestamp".into(), &timestamp.into());

                let _ = callback.call1(&JsValue::NULL, &js_event);
            });
        }
    }

    /// Collects the `message` field, with any other fields appended as `name=value`.
    #[derive(Default)]
    struct MessageVisitor {
        message: String,
    }

    impl MessageVisitor {
        fn push(&mut self, name: &str, value: String) {
            if name == "message" {
                self.message.insert_str(0, &value);
            } else {
                if !self.message.is_empty() {
                    self.message.push(' ');
                }
                self.message.push_str(&format!("{}={}", name, value));
            }
        }
    }

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.push(field.name(), format!("{:?}", value));
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.push(field.name(), value.to_string());
        }
    }

    /// Initialize the WASM module (sets up panic hook and tracing for better debugging).
    ///
    /// Accepts an optional configuration object:
    /// - `init()` - console-only logging (default)
    /// - `init({ logger: (event) => {...} })` - callback + console logging
    ///
    /// The logger callback receives events with: `{ level, target, message, timestamp }`
    #[wasm_bindgen]
    pub fn init(config: Option<js_sys::Object>) {
        console_error_panic_hook::set_once();

        let callback = config
            .as_ref()
            .and_then(|cfg| js_sys::Reflect::get(cfg, &"logger".into()).ok())
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok());

        let console_config = tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::DEBUG)
            .build();

        match callback {
            Some(cb) => {
                LOGGER_CALLBACK.with(|cell| {
                    *cell.borrow_mut() = Some(cb);
                });
                let subscriber = tracing_subscriber::registry()
                    .with(JsCallbackLayer)
                    .with(tracing_wasm::WASMLayer::new(console_config));
                tracing::subscriber::set_global_default(subscriber).ok();
            }
            None => tracing_wasm::set_as_global_default_with_config(console_config),
        }

        tracing::info!("arfs-wasm initialized");
    }

    /// Get version string
    #[wasm_bindgen]
    pub fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn js_err(e: impl std::fmt::Display) -> JsError {
        JsError::new(&e.to_string())
    }

    fn parse_drive_id(raw: &str) -> Result<EntityId, JsError> {
        raw.parse()
            .map_err(|e| JsError::new(&format!("Invalid drive ID: {}", e)))
    }

    /// Drive snapshot store exposed to TypeScript.
    ///
    /// Snapshots cross the boundary in their serialized form:
    /// `{ driveId, drivePrivacy, lastSyncedBlockHeight, lastSyncedTimestamp, entityStates }`.
    #[wasm_bindgen]
    pub struct WasmSyncStateStore {
        inner: SyncStateStore<JsStorageBridge>,
    }

    #[wasm_bindgen]
    impl WasmSyncStateStore {
        #[wasm_bindgen(constructor)]
        pub fn new(bridge: JsStorageBridge) -> Self {
            Self {
                inner: SyncStateStore::new(bridge),
            }
        }

        /// Drive IDs with a stored snapshot, sorted.
        pub async fn list(&self) -> Result<js_sys::Array, JsError> {
            let drives = self.inner.list().await.map_err(js_err)?;
            Ok(drives
                .iter()
                .map(|id| JsValue::from(id.to_string()))
                .collect())
        }

        /// Stored snapshot of a drive, or `null`.
        pub async fn load(&self, drive_id: &str) -> Result<JsValue, JsError> {
            let drive_id = parse_drive_id(drive_id)?;
            match self.inner.load(&drive_id).await.map_err(js_err)? {
                Some(state) => serde_wasm_bindgen::to_value(&serialize_sync_state(&state)).map_err(js_err),
                None => Ok(JsValue::NULL),
            }
        }

        /// Validate and store a serialized snapshot under its own drive ID.
        pub async fn save(&self, snapshot: JsValue) -> Result<(), JsError> {
            let serialized: SerializedSyncState = serde_wasm_bindgen::from_value(snapshot).map_err(js_err)?;
            let state = deserialize_sync_state(&serialized).map_err(js_err)?;
            self.inner.save(&state.drive_id, &state).await.map_err(js_err)
        }

        pub async fn clear(&self, drive_id: &str) -> Result<(), JsError> {
            let drive_id = parse_drive_id(drive_id)?;
            self.inner.clear(&drive_id).await.map_err(js_err)
        }

        /// Remove every snapshot. Keys the store did not write are left alone.
        #[wasm_bindgen(js_name = clearAll)]
        pub async fn clear_all(&self) -> Result<(), JsError> {
            self.inner.clear_all().await.map_err(js_err)
        }

        /// Map of folder ID to its path (e.g. `/Drive/docs/`) for a stored drive.
        ///
        /// Folders whose ancestry does not reach the drive root are omitted.
        #[wasm_bindgen(js_name = folderPaths)]
        pub async fn folder_paths(&self, drive_id: &str) -> Result<JsValue, JsError> {
            let drive_id = parse_drive_id(drive_id)?;
            let Some(state) = self.inner.load(&drive_id).await.map_err(js_err)? else {
                return Err(JsError::new(&format!("No snapshot for drive {}", drive_id)));
            };

            let hierarchy = FolderHierarchy::from_sync_state(&state);
            let paths: std::collections::BTreeMap<String, String> = hierarchy
                .folders()
                .filter_map(|folder| {
                    let id = folder.folder_id();
                    hierarchy
                        .path_to_folder_id(ParentFolderId::Folder(id))
                        .ok()
                        .map(|path| (id.to_string(), path))
                })
                .collect();

            let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
            serde::Serialize::serialize(&paths, &serializer).map_err(js_err)
        }
    }
}

// Re-export wasm_impl contents at crate root for wasm32 targets
#[cfg(target_arch = "wasm32")]
pub use wasm_impl::*;
