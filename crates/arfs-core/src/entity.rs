//! Typed ArFS entities recovered from ledger records.

use crate::crypto::DriveKey;
use crate::ids::{EntityId, ParentFolderId, TransactionId, UnixTime};
use crate::tags::{Cipher, DriveAuthMode, DrivePrivacy, EntityType, GqlTag};

/// Fields common to every entity revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub app_name: String,
    pub app_version: String,
    /// ArFS protocol version
    pub arfs: String,
    pub content_type: String,
    pub drive_id: EntityId,
    pub entity_type: EntityType,
    /// Transaction that carried this revision
    pub tx_id: TransactionId,
    pub unix_time: UnixTime,
    /// Block the revision was mined in (`None` while pending)
    pub block_height: Option<u64>,
    /// Tags outside the ArFS vocabulary, passed through untouched
    pub custom_tags: Vec<GqlTag>,
}

/// Cipher parameters of a private folder or file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherInfo {
    pub cipher: Cipher,
    /// Base64url-encoded IV from the `Cipher-IV` tag
    pub cipher_iv: String,
}

/// Cipher parameters of a private drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveCipherInfo {
    pub auth_mode: DriveAuthMode,
    pub cipher: Cipher,
    pub cipher_iv: String,
    /// Key that decrypted the drive metadata, when known
    pub drive_key: Option<DriveKey>,
}

/// Drive visibility and, for private drives, the cipher parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveAccess {
    Public,
    Private(DriveCipherInfo),
}

impl DriveAccess {
    pub fn privacy(&self) -> DrivePrivacy {
        match self {
            Self::Public => DrivePrivacy::Public,
            Self::Private(_) => DrivePrivacy::Private,
        }
    }

    pub fn drive_key(&self) -> Option<&DriveKey> {
        match self {
            Self::Public => None,
            Self::Private(info) => info.drive_key.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub meta: EntityMetadata,
    pub name: String,
    pub root_folder_id: EntityId,
    pub access: DriveAccess,
}

impl Drive {
    pub fn drive_id(&self) -> EntityId {
        self.meta.drive_id
    }

    pub fn privacy(&self) -> DrivePrivacy {
        self.access.privacy()
    }
}

/// A field that may still be sealed behind an unknown key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sealed<T> {
    Revealed(T),
    Encrypted,
}

impl<T> Sealed<T> {
    pub fn revealed(&self) -> Option<&T> {
        match self {
            Self::Revealed(value) => Some(value),
            Self::Encrypted => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted)
    }
}

/// Drive built by the safe builder: undecryptable fields are `Sealed::Encrypted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeDrive {
    pub meta: EntityMetadata,
    pub name: Sealed<String>,
    pub root_folder_id: Sealed<EntityId>,
    pub access: DriveAccess,
}

impl SafeDrive {
    pub fn drive_id(&self) -> EntityId {
        self.meta.drive_id
    }

    pub fn privacy(&self) -> DrivePrivacy {
        self.access.privacy()
    }

    /// Convert to a fully decrypted drive, if nothing is sealed.
    pub fn into_drive(self) -> Option<Drive> {
        match (self.name, self.root_folder_id) {
            (Sealed::Revealed(name), Sealed::Revealed(root_folder_id)) => Some(Drive {
                meta: self.meta,
                name,
                root_folder_id,
                access: self.access,
            }),
            _ => None,
        }
    }
}

impl From<Drive> for SafeDrive {
    fn from(drive: Drive) -> Self {
        Self {
            meta: drive.meta,
            name: Sealed::Revealed(drive.name),
            root_folder_id: Sealed::Revealed(drive.root_folder_id),
            access: drive.access,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub meta: EntityMetadata,
    pub entity_id: EntityId,
    pub parent_folder_id: ParentFolderId,
    pub name: String,
    pub last_modified: UnixTime,
    /// `None` for public folders
    pub encryption: Option<CipherInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub meta: EntityMetadata,
    pub entity_id: EntityId,
    pub parent_folder_id: ParentFolderId,
    pub name: String,
    /// Last-modified time reported by the uploader, in milliseconds
    pub last_modified_millis: u64,
    pub size: u64,
    pub data_tx_id: TransactionId,
    pub data_content_type: String,
    /// `None` for public files
    pub encryption: Option<CipherInfo>,
}

/// A folder or file revision, as streamed by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOrFolder {
    Folder(Folder),
    File(File),
}

impl FileOrFolder {
    pub fn meta(&self) -> &EntityMetadata {
        match self {
            Self::Folder(folder) => &folder.meta,
            Self::File(file) => &file.meta,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Folder(folder) => folder.entity_id,
            Self::File(file) => file.entity_id,
        }
    }

    pub fn parent_folder_id(&self) -> ParentFolderId {
        match self {
            Self::Folder(folder) => folder.parent_folder_id,
            Self::File(file) => file.parent_folder_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.name,
            Self::File(file) => &file.name,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Folder(_) => EntityType::Folder,
            Self::File(_) => EntityType::File,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }
}
