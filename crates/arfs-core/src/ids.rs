//! Identifier and time newtypes shared by every ArFS entity.
//!
//! `EntityId` wraps a UUID but displays as the lowercase hyphenated string the
//! ledger tags carry. `TransactionId` is validated against the 43-character
//! base64url alphabet. `ParentFolderId` makes the "no parent" case of a root
//! folder an explicit sentinel instead of an absent value.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid entity ID: {0}")]
    InvalidEntityId(String),
    #[error("Invalid transaction ID: {0}")]
    InvalidTransactionId(String),
    #[error("Invalid unix time: {0}")]
    InvalidUnixTime(String),
}

/// Stable identifier of a drive, folder, or file across all of its revisions.
///
/// # Examples
/// ```
/// use arfs_core::EntityId;
///
/// let id: EntityId = "e3b0c442-98fc-4c14-9afb-f4c8996fb924".parse().unwrap();
/// assert_eq!(id.to_string(), "e3b0c442-98fc-4c14-9afb-f4c8996fb924");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a new random (v4) entity ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw UUID bytes, used as key-derivation input.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only the hyphenated form appears in ledger tags
        if s.len() != 36 {
            return Err(IdError::InvalidEntityId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdError::InvalidEntityId(s.to_string()))
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl serde::Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Length of a ledger transaction ID.
pub const TRANSACTION_ID_LEN: usize = 43;

/// Identifier of one ledger record (one revision of an entity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TransactionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == TRANSACTION_ID_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(IdError::InvalidTransactionId(s.to_string()))
        }
    }
}

impl serde::Serialize for TransactionId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TransactionId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rendering of the root sentinel in logs and persisted snapshots.
pub const ROOT_FOLDER_MARKER: &str = "root folder";

/// Parent of a folder or file.
///
/// Root folders carry no `Parent-Folder-Id` tag; they get `Root` so that "no
/// parent" can never be confused with "parent is entity X".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentFolderId {
    Root,
    Folder(EntityId),
}

impl ParentFolderId {
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// The parent's entity ID, or `None` for the root sentinel.
    pub fn folder_id(&self) -> Option<EntityId> {
        match self {
            Self::Root => None,
            Self::Folder(id) => Some(*id),
        }
    }
}

impl From<EntityId> for ParentFolderId {
    fn from(id: EntityId) -> Self {
        Self::Folder(id)
    }
}

impl Display for ParentFolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str(ROOT_FOLDER_MARKER),
            Self::Folder(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for ParentFolderId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT_FOLDER_MARKER {
            return Ok(Self::Root);
        }
        s.parse().map(Self::Folder)
    }
}

/// Seconds since the Unix epoch, as carried by the `Unix-Time` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UnixTime(u64);

impl UnixTime {
    pub fn new(seconds: u64) -> Self {
        Self(seconds)
    }

    pub fn now() -> Self {
        let seconds = web_time::SystemTime::now()
            .duration_since(web_time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(seconds)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Display for UnixTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UnixTime {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| IdError::InvalidUnixTime(s.to_string()))
    }
}

impl From<u64> for UnixTime {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}
