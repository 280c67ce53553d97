//! arfs-core: Shared Rust library for reconstructing ArFS drives from ledger records.
//!
//! This crate provides the core functionality for:
//! - Building typed drive, folder and file entities from tagged ledger records
//! - Decrypting private drives (AES-256-GCM, HKDF-derived keys)
//! - Collapsing revisions and rebuilding folder hierarchies
//! - Incremental sync with persisted per-drive snapshots
//! - LedgerClient and StateBackend trait abstractions

pub mod builder;
pub mod crypto;
pub mod decryptor;
pub mod drives;
pub mod entity;
pub mod events;
pub mod hierarchy;
pub mod ids;
pub mod ledger;
pub mod revision;
pub mod state;
pub mod store;
pub mod sync_engine;
pub mod tags;

pub use builder::{EntityBuilder, EntityError};
pub use crypto::{CryptoError, DriveKey, DriveSigner, FileKey, SymmetricKey};
pub use decryptor::{KeySource, PrivateKeyDecryptor, ResolvedKey};
pub use drives::{all_drives_for_address, latest_drive_header};
pub use entity::{Drive, DriveAccess, EntityMetadata, File, FileOrFolder, Folder, SafeDrive, Sealed};
pub use events::{EventBus, Subscription, SyncEvent};
pub use hierarchy::{FolderHierarchy, FolderTreeNode, HierarchyEntry, HierarchyError};
pub use ids::{EntityId, IdError, ParentFolderId, TransactionId, UnixTime};
pub use ledger::{GqlNode, InMemoryLedger, LedgerClient, LedgerError, LedgerPage, LedgerQuery};
pub use revision::{RevisionCollapser, Revisioned, collapse};
pub use state::{DriveSyncState, EntitySyncState, SerializedSyncState};
pub use store::{InMemoryBackend, StateBackend, StoreError, SyncStateStore};
pub use sync_engine::{
    IncrementalSyncEngine, IncrementalSyncError, PartialSyncResult, SyncChangeSet, SyncFailure, SyncOptions,
    SyncProgress, SyncResult, SyncStats,
};
pub use tags::{DrivePrivacy, EntityType, GqlTag};
