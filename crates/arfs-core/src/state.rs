//! Persisted per-drive sync snapshot and its JSON wire format.
//!
//! `DriveSyncState` is the in-memory form used by the engine. Every backend
//! stores the same `SerializedSyncState` JSON:
//!
//! ```json
//! {
//!   "driveId": "…",
//!   "drivePrivacy": "public",
//!   "lastSyncedBlockHeight": 1000000,
//!   "lastSyncedTimestamp": 1700000000,
//!   "entityStates": [
//!     { "entityId": "…", "txId": "…", "blockHeight": 999999,
//!       "parentFolderId": "root folder", "name": "Docs", "entityType": "folder" }
//!   ]
//! }
//! ```
//!
//! Entity states are written sorted by entity ID so the output is stable.

use crate::entity::FileOrFolder;
use crate::ids::{EntityId, ParentFolderId, TransactionId, UnixTime};
use crate::tags::{DrivePrivacy, EntityType};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid {field} in sync state: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Last-seen revision of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySyncState {
    pub entity_id: EntityId,
    pub tx_id: TransactionId,
    pub block_height: u64,
    /// `None` only for entities recorded without parent information
    pub parent_folder_id: Option<ParentFolderId>,
    pub name: String,
    pub entity_type: EntityType,
}

impl EntitySyncState {
    /// Snapshot a built entity. Pending revisions have no height and are not
    /// recorded.
    pub fn from_entity(entity: &FileOrFolder) -> Option<Self> {
        let meta = entity.meta();
        Some(Self {
            entity_id: entity.entity_id(),
            tx_id: meta.tx_id.clone(),
            block_height: meta.block_height?,
            parent_folder_id: Some(entity.parent_folder_id()),
            name: entity.name().to_string(),
            entity_type: entity.entity_type(),
        })
    }

    /// Same revision as `other` (transaction and height both match).
    pub fn same_revision(&self, other: &Self) -> bool {
        self.tx_id == other.tx_id && self.block_height == other.block_height
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSyncState {
    pub drive_id: EntityId,
    pub drive_privacy: DrivePrivacy,
    pub last_synced_block_height: u64,
    pub last_synced_timestamp: UnixTime,
    pub entity_states: HashMap<EntityId, EntitySyncState>,
}

impl DriveSyncState {
    /// State of a drive that has never been synced.
    pub fn empty(drive_id: EntityId, drive_privacy: DrivePrivacy) -> Self {
        Self {
            drive_id,
            drive_privacy,
            last_synced_block_height: 0,
            last_synced_timestamp: UnixTime::default(),
            entity_states: HashMap::new(),
        }
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntitySyncState> {
        self.entity_states.get(id)
    }

    /// Folder records, in no particular order.
    pub fn folders(&self) -> impl Iterator<Item = &EntitySyncState> {
        self.entity_states
            .values()
            .filter(|s| s.entity_type == EntityType::Folder)
    }

    pub fn files(&self) -> impl Iterator<Item = &EntitySyncState> {
        self.entity_states
            .values()
            .filter(|s| s.entity_type == EntityType::File)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEntityState {
    pub entity_id: String,
    pub tx_id: String,
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSyncState {
    pub drive_id: String,
    pub drive_privacy: String,
    pub last_synced_block_height: u64,
    pub last_synced_timestamp: u64,
    #[serde(default)]
    pub entity_states: Vec<SerializedEntityState>,
}

pub fn serialize_sync_state(state: &DriveSyncState) -> SerializedSyncState {
    let mut entity_states: Vec<&EntitySyncState> = state.entity_states.values().collect();
    entity_states.sort_by_key(|s| s.entity_id);

    SerializedSyncState {
        drive_id: state.drive_id.to_string(),
        drive_privacy: state.drive_privacy.to_string(),
        last_synced_block_height: state.last_synced_block_height,
        last_synced_timestamp: state.last_synced_timestamp.as_secs(),
        entity_states: entity_states
            .into_iter()
            .map(|s| SerializedEntityState {
                entity_id: s.entity_id.to_string(),
                tx_id: s.tx_id.to_string(),
                block_height: s.block_height,
                parent_folder_id: s.parent_folder_id.map(|p| p.to_string()),
                name: s.name.clone(),
                entity_type: s.entity_type.to_string(),
            })
            .collect(),
    }
}

pub fn deserialize_sync_state(serialized: &SerializedSyncState) -> Result<DriveSyncState> {
    let mut entity_states = HashMap::with_capacity(serialized.entity_states.len());
    for raw in &serialized.entity_states {
        let state = EntitySyncState {
            entity_id: field("entityId", &raw.entity_id)?,
            tx_id: field("txId", &raw.tx_id)?,
            block_height: raw.block_height,
            parent_folder_id: raw
                .parent_folder_id
                .as_deref()
                .map(|p| field("parentFolderId", p))
                .transpose()?,
            name: raw.name.clone(),
            entity_type: field("entityType", &raw.entity_type)?,
        };
        entity_states.insert(state.entity_id, state);
    }

    Ok(DriveSyncState {
        drive_id: field("driveId", &serialized.drive_id)?,
        drive_privacy: field("drivePrivacy", &serialized.drive_privacy)?,
        last_synced_block_height: serialized.last_synced_block_height,
        last_synced_timestamp: UnixTime::new(serialized.last_synced_timestamp),
        entity_states,
    })
}

pub fn to_json(state: &DriveSyncState) -> Result<String> {
    Ok(serde_json::to_string(&serialize_sync_state(state))?)
}

pub fn from_json(json: &str) -> Result<DriveSyncState> {
    let serialized: SerializedSyncState = serde_json::from_str(json)?;
    deserialize_sync_state(&serialized)
}

fn field<T>(name: &'static str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| StateError::InvalidField {
        field: name,
        reason: e.to_string(),
    })
}
