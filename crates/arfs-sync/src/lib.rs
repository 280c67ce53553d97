//! arfs-sync library: native persistence and configuration for drive sync.
//!
//! The binary is a thin layer over these modules, which integration tests
//! also use directly.

pub mod config;
pub mod inspect;
pub mod native_store;

// Re-export key types for convenience
pub use config::{Config, ConfigError, STATE_DIR_ENV};
pub use native_store::NativeStateBackend;

use arfs_core::SyncStateStore;

/// Snapshot store backed by files in `config.state_dir`.
pub fn open_store(config: &Config) -> SyncStateStore<NativeStateBackend> {
    SyncStateStore::new(NativeStateBackend::new(config.state_dir.clone()))
}
