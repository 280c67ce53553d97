//! SyncStateStore: per-drive persistence of sync snapshots.
//!
//! The store owns key naming and serialization; backends only move strings.
//!
//! Implementations of `StateBackend`:
//! - `InMemoryBackend` - For testing
//! - `JsStorageBridge` (in arfs-wasm) - Browser storage via JS callbacks
//! - `NativeStateBackend` (in arfs-sync) - One JSON file per key on disk
//!
//! Uses `target_arch = "wasm32"` for conditional compilation instead of feature flags
//! to avoid Cargo's feature unification issues when building the workspace.

use crate::ids::EntityId;
use crate::state::{self, DriveSyncState, StateError};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] StateError),

    #[error("Drive mismatch: saving state of {actual} under {expected}")]
    DriveMismatch { expected: EntityId, actual: EntityId },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Prefix of every key the store writes.
pub const KEY_PREFIX: &str = "arfs-sync-state/";

/// String key/value storage.
///
/// On native platforms, implementations must be `Send + Sync` for use across threads.
/// On WASM (wasm32), these bounds are relaxed since WASM is single-threaded.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg(not(target_arch = "wasm32"))]
pub trait StateBackend: Send + Sync {
    /// Value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key` (no-op if absent)
    async fn remove(&self, key: &str) -> Result<()>;

    /// All stored keys
    async fn keys(&self) -> Result<Vec<String>>;
}

/// String key/value storage (WASM version without Send + Sync).
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg(target_arch = "wasm32")]
pub trait StateBackend {
    /// Value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key` (no-op if absent)
    async fn remove(&self, key: &str) -> Result<()>;

    /// All stored keys
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory backend for testing
#[derive(Default)]
pub struct InMemoryBackend {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value, bypassing the store (for tests that inspect stored JSON)
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StateBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.values.read().unwrap().keys().cloned().collect())
    }
}

// Lets the engine and a test share one backend
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg(not(target_arch = "wasm32"))]
impl<T: StateBackend + ?Sized> StateBackend for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }
}

/// Durable map of drive ID to its last sync snapshot.
pub struct SyncStateStore<B> {
    backend: B,
}

impl<B: StateBackend> SyncStateStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(drive_id: &EntityId) -> String {
        format!("{}{}", KEY_PREFIX, drive_id)
    }

    /// Replace the snapshot of `drive_id`.
    pub async fn save(&self, drive_id: &EntityId, state: &DriveSyncState) -> Result<()> {
        if state.drive_id != *drive_id {
            return Err(StoreError::DriveMismatch {
                expected: *drive_id,
                actual: state.drive_id,
            });
        }
        let json = state::to_json(state)?;
        self.backend.set(&Self::key(drive_id), &json).await?;
        debug!(
            "Saved sync state for {} at height {} ({} entities)",
            drive_id,
            state.last_synced_block_height,
            state.entity_states.len()
        );
        Ok(())
    }

    pub async fn load(&self, drive_id: &EntityId) -> Result<Option<DriveSyncState>> {
        match self.backend.get(&Self::key(drive_id)).await? {
            Some(json) => Ok(Some(state::from_json(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, drive_id: &EntityId) -> Result<()> {
        self.backend.remove(&Self::key(drive_id)).await
    }

    /// Drives with a stored snapshot, sorted.
    pub async fn list(&self) -> Result<Vec<EntityId>> {
        let mut drives = Vec::new();
        for key in self.backend.keys().await? {
            let Some(raw) = key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            match raw.parse() {
                Ok(id) => drives.push(id),
                Err(_) => warn!("Ignoring malformed sync state key: {}", key),
            }
        }
        drives.sort();
        Ok(drives)
    }

    /// Remove every snapshot this store wrote. Other keys are left alone.
    pub async fn clear_all(&self) -> Result<()> {
        for drive_id in self.list().await? {
            self.clear(&drive_id).await?;
        }
        Ok(())
    }
}
