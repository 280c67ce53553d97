//! EntityBuilder: turns one ledger record into one typed entity.
//!
//! Every builder shares a single parse step (`TagReader`) and only constructs
//! the entity once all required tags and body fields are present and well
//! typed, so a malformed record never yields a half-populated entity.
//!
//! - Strict builders (`public_*`, `private_*`, `folder`, `file`) fail with
//!   `InvalidEntityState` for malformed records and `DecryptionFailed` when the
//!   supplied key does not open a private body.
//! - `safe_drive` never fails on decryption: fields it cannot open come back
//!   as `Sealed::Encrypted`.

use crate::crypto::{self, DriveKey};
use crate::decryptor::PrivateKeyDecryptor;
use crate::entity::{
    CipherInfo, Drive, DriveAccess, DriveCipherInfo, EntityMetadata, File, FileOrFolder, Folder, SafeDrive,
    Sealed,
};
use crate::ids::{EntityId, ParentFolderId, TransactionId, UnixTime};
use crate::ledger::{GqlNode, LedgerClient, LedgerError};
use crate::tags::{self, Cipher, DriveAuthMode, DrivePrivacy, EntityType, GqlTag};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Invalid entity state in {tx_id}: {reason}")]
    InvalidEntityState { tx_id: TransactionId, reason: String },

    #[error("Decryption failed for {tx_id}: {reason}")]
    DecryptionFailed { tx_id: TransactionId, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl EntityError {
    pub fn tx_id(&self) -> Option<&TransactionId> {
        match self {
            Self::InvalidEntityState { tx_id, .. } | Self::DecryptionFailed { tx_id, .. } => Some(tx_id),
            Self::Ledger(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EntityError>;

/// Fallback content type for file bodies that do not declare one.
const DEFAULT_DATA_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveMetadataJson {
    name: String,
    root_folder_id: String,
}

#[derive(Deserialize)]
struct FolderMetadataJson {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadataJson {
    name: String,
    size: u64,
    last_modified_date: u64,
    data_tx_id: String,
    #[serde(default = "default_data_content_type")]
    data_content_type: String,
}

fn default_data_content_type() -> String {
    DEFAULT_DATA_CONTENT_TYPE.to_string()
}

/// Shared parse step over a record's tags.
struct TagReader<'a> {
    node: &'a GqlNode,
    /// First value of each known tag
    known: HashMap<&'a str, &'a str>,
    custom: Vec<GqlTag>,
}

impl<'a> TagReader<'a> {
    fn new(node: &'a GqlNode) -> Self {
        let mut known = HashMap::new();
        let mut custom = Vec::new();
        for tag in &node.tags {
            if tag.is_known() {
                known.entry(tag.name.as_str()).or_insert(tag.value.as_str());
            } else {
                custom.push(tag.clone());
            }
        }
        Self { node, known, custom }
    }

    fn invalid(&self, reason: impl Into<String>) -> EntityError {
        EntityError::InvalidEntityState {
            tx_id: self.node.id.clone(),
            reason: reason.into(),
        }
    }

    fn decryption_failed(&self, reason: impl Into<String>) -> EntityError {
        EntityError::DecryptionFailed {
            tx_id: self.node.id.clone(),
            reason: reason.into(),
        }
    }

    fn optional(&self, name: &str) -> Option<&'a str> {
        self.known.get(name).copied()
    }

    fn required(&self, name: &'static str) -> Result<&'a str> {
        self.optional(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| self.invalid(format!("missing {} tag", name)))
    }

    fn parse<T>(&self, name: &'static str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.required(name)?;
        raw.parse()
            .map_err(|e| self.invalid(format!("bad {} tag: {}", name, e)))
    }

    fn parse_optional<T>(&self, name: &'static str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            None => Ok(None),
            Some(_) => self.parse(name).map(Some),
        }
    }

    fn is_private(&self) -> bool {
        self.optional(tags::CIPHER).is_some()
    }

    fn metadata(&self, expected: EntityType) -> Result<EntityMetadata> {
        let entity_type: EntityType = self.parse(tags::ENTITY_TYPE)?;
        if entity_type != expected {
            return Err(self.invalid(format!("expected {} record, found {}", expected, entity_type)));
        }
        Ok(EntityMetadata {
            app_name: self.required(tags::APP_NAME)?.to_string(),
            app_version: self.required(tags::APP_VERSION)?.to_string(),
            arfs: self.required(tags::ARFS)?.to_string(),
            content_type: self.required(tags::CONTENT_TYPE)?.to_string(),
            drive_id: self.parse(tags::DRIVE_ID)?,
            entity_type,
            tx_id: self.node.id.clone(),
            unix_time: self.parse::<UnixTime>(tags::UNIX_TIME)?,
            block_height: self.node.block_height(),
            custom_tags: self.custom.clone(),
        })
    }

    fn cipher_info(&self) -> Result<CipherInfo> {
        Ok(CipherInfo {
            cipher: self.parse::<Cipher>(tags::CIPHER)?,
            cipher_iv: self.required(tags::CIPHER_IV)?.to_string(),
        })
    }

    /// Missing `Parent-Folder-Id` means a root folder.
    fn parent_folder_id(&self) -> Result<ParentFolderId> {
        Ok(self
            .parse_optional::<EntityId>(tags::PARENT_FOLDER_ID)?
            .map_or(ParentFolderId::Root, ParentFolderId::Folder))
    }

    fn json<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| self.invalid(format!("bad metadata body: {}", e)))
    }

    fn json_value<T: DeserializeOwned>(&self, value: serde_json::Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| self.invalid(format!("bad metadata body: {}", e)))
    }

    fn open(&self, key: &DriveKey, cipher_iv: &str, body: &[u8]) -> Result<Vec<u8>> {
        crypto::decrypt(key, cipher_iv, body).map_err(|e| self.decryption_failed(e.to_string()))
    }
}

/// Builds entities from ledger records, fetching bodies through `ledger`.
pub struct EntityBuilder<'a, L: ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient + ?Sized> EntityBuilder<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    async fn body(&self, node: &GqlNode) -> Result<Vec<u8>> {
        Ok(self.ledger.fetch_body(&node.id).await?)
    }

    // ========== Drives ==========

    pub async fn public_drive(&self, node: &GqlNode) -> Result<Drive> {
        let reader = TagReader::new(node);
        let meta = reader.metadata(EntityType::Drive)?;
        let privacy: DrivePrivacy = reader.parse(tags::DRIVE_PRIVACY)?;
        if privacy != DrivePrivacy::Public {
            return Err(reader.invalid("expected a public drive"));
        }

        let body = self.body(node).await?;
        let json: DriveMetadataJson = reader.json(&body)?;
        let root_folder_id = parse_root_folder_id(&reader, &json.root_folder_id)?;

        Ok(Drive {
            meta,
            name: json.name,
            root_folder_id,
            access: DriveAccess::Public,
        })
    }

    pub async fn private_drive(&self, node: &GqlNode, key: &DriveKey) -> Result<Drive> {
        let reader = TagReader::new(node);
        let (meta, cipher_info) = private_drive_tags(&reader)?;

        let body = self.body(node).await?;
        let plaintext = reader.open(key, &cipher_info.cipher_iv, &body)?;
        let json: DriveMetadataJson = reader.json(&plaintext)?;
        let root_folder_id = parse_root_folder_id(&reader, &json.root_folder_id)?;

        Ok(Drive {
            meta,
            name: json.name,
            root_folder_id,
            access: DriveAccess::Private(DriveCipherInfo {
                drive_key: Some(key.clone()),
                ..cipher_info
            }),
        })
    }

    /// Build a drive of either privacy without ever failing on decryption.
    ///
    /// Private drive keys come from `decryptor`; when none fits, name and root
    /// folder are `Sealed::Encrypted`.
    pub async fn safe_drive(&self, node: &GqlNode, decryptor: &PrivateKeyDecryptor) -> Result<SafeDrive> {
        let reader = TagReader::new(node);
        let privacy: DrivePrivacy = reader.parse(tags::DRIVE_PRIVACY)?;
        if privacy == DrivePrivacy::Public {
            return self.public_drive(node).await.map(SafeDrive::from);
        }

        let (meta, cipher_info) = private_drive_tags(&reader)?;
        let body = self.body(node).await?;

        match decryptor.resolve(&meta.drive_id, &cipher_info.cipher_iv, &body) {
            Some(resolved) => {
                let json: DriveMetadataJson = reader.json_value(resolved.json)?;
                let root_folder_id = parse_root_folder_id(&reader, &json.root_folder_id)?;
                Ok(SafeDrive {
                    meta,
                    name: Sealed::Revealed(json.name),
                    root_folder_id: Sealed::Revealed(root_folder_id),
                    access: DriveAccess::Private(DriveCipherInfo {
                        drive_key: Some(resolved.key),
                        ..cipher_info
                    }),
                })
            }
            None => Ok(SafeDrive {
                meta,
                name: Sealed::Encrypted,
                root_folder_id: Sealed::Encrypted,
                access: DriveAccess::Private(cipher_info),
            }),
        }
    }

    // ========== Folders ==========

    pub async fn public_folder(&self, node: &GqlNode) -> Result<Folder> {
        let reader = TagReader::new(node);
        if reader.is_private() {
            return Err(reader.invalid("expected a public folder"));
        }
        let (meta, entity_id, parent_folder_id) = folder_tags(&reader)?;

        let body = self.body(node).await?;
        let json: FolderMetadataJson = reader.json(&body)?;

        Ok(Folder {
            last_modified: meta.unix_time,
            meta,
            entity_id,
            parent_folder_id,
            name: json.name,
            encryption: None,
        })
    }

    pub async fn private_folder(&self, node: &GqlNode, drive_key: &DriveKey) -> Result<Folder> {
        let reader = TagReader::new(node);
        if !reader.is_private() {
            return Err(reader.invalid("expected a private folder"));
        }
        let (meta, entity_id, parent_folder_id) = folder_tags(&reader)?;
        let cipher_info = reader.cipher_info()?;

        let body = self.body(node).await?;
        let plaintext = reader.open(drive_key, &cipher_info.cipher_iv, &body)?;
        let json: FolderMetadataJson = reader.json(&plaintext)?;

        Ok(Folder {
            last_modified: meta.unix_time,
            meta,
            entity_id,
            parent_folder_id,
            name: json.name,
            encryption: Some(cipher_info),
        })
    }

    /// Build a folder, choosing the public or private path from its tags.
    pub async fn folder(&self, node: &GqlNode, drive_key: Option<&DriveKey>) -> Result<Folder> {
        let reader = TagReader::new(node);
        match (reader.is_private(), drive_key) {
            (false, _) => self.public_folder(node).await,
            (true, Some(key)) => self.private_folder(node, key).await,
            (true, None) => Err(reader.decryption_failed("private folder and no drive key")),
        }
    }

    // ========== Files ==========

    pub async fn public_file(&self, node: &GqlNode) -> Result<File> {
        let reader = TagReader::new(node);
        if reader.is_private() {
            return Err(reader.invalid("expected a public file"));
        }
        let (meta, entity_id, parent_folder_id) = file_tags(&reader)?;

        let body = self.body(node).await?;
        let json: FileMetadataJson = reader.json(&body)?;
        file_from_json(&reader, meta, entity_id, parent_folder_id, json, None)
    }

    pub async fn private_file(&self, node: &GqlNode, drive_key: &DriveKey) -> Result<File> {
        let reader = TagReader::new(node);
        if !reader.is_private() {
            return Err(reader.invalid("expected a private file"));
        }
        let (meta, entity_id, parent_folder_id) = file_tags(&reader)?;
        let cipher_info = reader.cipher_info()?;

        let file_key = crypto::derive_file_key(drive_key, &entity_id)
            .map_err(|e| reader.decryption_failed(e.to_string()))?;
        let body = self.body(node).await?;
        let plaintext = reader.open(&file_key, &cipher_info.cipher_iv, &body)?;
        let json: FileMetadataJson = reader.json(&plaintext)?;
        file_from_json(&reader, meta, entity_id, parent_folder_id, json, Some(cipher_info))
    }

    /// Build a file, choosing the public or private path from its tags.
    pub async fn file(&self, node: &GqlNode, drive_key: Option<&DriveKey>) -> Result<File> {
        let reader = TagReader::new(node);
        match (reader.is_private(), drive_key) {
            (false, _) => self.public_file(node).await,
            (true, Some(key)) => self.private_file(node, key).await,
            (true, None) => Err(reader.decryption_failed("private file and no drive key")),
        }
    }

    /// Dispatch on `Entity-Type` for records of a drive's contents.
    pub async fn file_or_folder(&self, node: &GqlNode, drive_key: Option<&DriveKey>) -> Result<FileOrFolder> {
        let reader = TagReader::new(node);
        match reader.parse::<EntityType>(tags::ENTITY_TYPE)? {
            EntityType::Folder => self.folder(node, drive_key).await.map(FileOrFolder::Folder),
            EntityType::File => self.file(node, drive_key).await.map(FileOrFolder::File),
            EntityType::Drive => Err(reader.invalid("expected a folder or file record")),
        }
    }
}

fn parse_root_folder_id(reader: &TagReader<'_>, raw: &str) -> Result<EntityId> {
    raw.parse()
        .map_err(|e| reader.invalid(format!("bad rootFolderId: {}", e)))
}

fn private_drive_tags(reader: &TagReader<'_>) -> Result<(EntityMetadata, DriveCipherInfo)> {
    let meta = reader.metadata(EntityType::Drive)?;
    let privacy: DrivePrivacy = reader.parse(tags::DRIVE_PRIVACY)?;
    if privacy != DrivePrivacy::Private {
        return Err(reader.invalid("expected a private drive"));
    }
    let cipher_info = DriveCipherInfo {
        auth_mode: reader.parse::<DriveAuthMode>(tags::DRIVE_AUTH_MODE)?,
        cipher: reader.parse::<Cipher>(tags::CIPHER)?,
        cipher_iv: reader.required(tags::CIPHER_IV)?.to_string(),
        drive_key: None,
    };
    Ok((meta, cipher_info))
}

fn folder_tags(reader: &TagReader<'_>) -> Result<(EntityMetadata, EntityId, ParentFolderId)> {
    let meta = reader.metadata(EntityType::Folder)?;
    let entity_id: EntityId = reader.parse(tags::FOLDER_ID)?;
    let parent_folder_id = reader.parent_folder_id()?;
    Ok((meta, entity_id, parent_folder_id))
}

fn file_tags(reader: &TagReader<'_>) -> Result<(EntityMetadata, EntityId, ParentFolderId)> {
    let meta = reader.metadata(EntityType::File)?;
    let entity_id: EntityId = reader.parse(tags::FILE_ID)?;
    // Files always live in a folder
    let parent: EntityId = reader.parse(tags::PARENT_FOLDER_ID)?;
    Ok((meta, entity_id, ParentFolderId::Folder(parent)))
}

fn file_from_json(
    reader: &TagReader<'_>,
    meta: EntityMetadata,
    entity_id: EntityId,
    parent_folder_id: ParentFolderId,
    json: FileMetadataJson,
    encryption: Option<CipherInfo>,
) -> Result<File> {
    let data_tx_id: TransactionId = json
        .data_tx_id
        .parse()
        .map_err(|e| reader.invalid(format!("bad dataTxId: {}", e)))?;
    Ok(File {
        meta,
        entity_id,
        parent_folder_id,
        name: json.name,
        last_modified_millis: json.last_modified_date,
        size: json.size,
        data_tx_id,
        data_content_type: json.data_content_type,
        encryption,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use crate::crypto::SymmetricKey;
    use crate::ledger::InMemoryLedger;

    #[tokio::test]
    async fn test_public_folder_with_parent() {
        let ledger = InMemoryLedger::new();
        let (drive, folder, parent) = (EntityId::generate(), EntityId::generate(), EntityId::generate());
        let record = fixtures::public_folder(&ledger, 1, Some(100), drive, folder, parent.into(), "Docs");

        let built = EntityBuilder::new(&ledger).public_folder(&record).await.unwrap();
        assert_eq!(built.entity_id, folder);
        assert_eq!(built.parent_folder_id, ParentFolderId::Folder(parent));
        assert_eq!(built.name, "Docs");
        assert_eq!(built.meta.drive_id, drive);
        assert_eq!(built.meta.block_height, Some(100));
        assert!(built.encryption.is_none());
    }

    #[tokio::test]
    async fn test_folder_without_parent_tag_is_root() {
        let ledger = InMemoryLedger::new();
        let record = fixtures::public_folder(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "My Drive",
        );

        let built = EntityBuilder::new(&ledger).public_folder(&record).await.unwrap();
        assert_eq!(built.parent_folder_id, ParentFolderId::Root);
    }

    #[tokio::test]
    async fn test_unknown_tags_preserved() {
        let ledger = InMemoryLedger::new();
        let mut record = fixtures::public_folder(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "x",
        );
        record.tags.push(GqlTag::new("Boost", "1"));

        let built = EntityBuilder::new(&ledger).public_folder(&record).await.unwrap();
        assert_eq!(built.meta.custom_tags, vec![GqlTag::new("Boost", "1")]);
    }

    #[tokio::test]
    async fn test_missing_required_tag_fails_closed() {
        let ledger = InMemoryLedger::new();
        let mut record = fixtures::public_file(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            EntityId::generate(),
            "a.txt",
        );
        record.tags.retain(|t| t.name != tags::UNIX_TIME);

        let err = EntityBuilder::new(&ledger).public_file(&record).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidEntityState { .. }));
        assert!(err.to_string().contains("Unix-Time"));
    }

    #[tokio::test]
    async fn test_wrong_entity_type_rejected() {
        let ledger = InMemoryLedger::new();
        let record = fixtures::public_folder(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "x",
        );

        let err = EntityBuilder::new(&ledger).public_file(&record).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidEntityState { .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_state() {
        let ledger = InMemoryLedger::new();
        let record = fixtures::public_folder(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "x",
        );
        ledger.insert(record.clone(), b"{\"title\":\"no name\"}".to_vec());

        let err = EntityBuilder::new(&ledger).public_folder(&record).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidEntityState { .. }));
    }

    #[tokio::test]
    async fn test_public_file() {
        let ledger = InMemoryLedger::new();
        let (drive, file, parent) = (EntityId::generate(), EntityId::generate(), EntityId::generate());
        let record = fixtures::public_file(&ledger, 3, Some(9), drive, file, parent, "notes.txt");

        let built = EntityBuilder::new(&ledger).file(&record, None).await.unwrap();
        assert_eq!(built.entity_id, file);
        assert_eq!(built.size, 1024);
        assert_eq!(built.data_content_type, "text/plain");
        assert_eq!(built.data_tx_id, fixtures::tx(10_003));
    }

    #[tokio::test]
    async fn test_private_folder_and_file() {
        let ledger = InMemoryLedger::new();
        let key = SymmetricKey::generate();
        let (drive, folder, file) = (EntityId::generate(), EntityId::generate(), EntityId::generate());
        let folder_record =
            fixtures::private_folder(&ledger, 1, Some(1), drive, folder, ParentFolderId::Root, "Secret", &key);
        let file_record = fixtures::private_file(&ledger, 2, Some(2), drive, file, folder, "plan.pdf", &key);

        let builder = EntityBuilder::new(&ledger);
        let built_folder = builder.folder(&folder_record, Some(&key)).await.unwrap();
        assert_eq!(built_folder.name, "Secret");
        assert_eq!(built_folder.encryption.as_ref().unwrap().cipher, Cipher::Aes256Gcm);

        let built_file = builder.file(&file_record, Some(&key)).await.unwrap();
        assert_eq!(built_file.name, "plan.pdf");
        assert_eq!(built_file.data_content_type, DEFAULT_DATA_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_wrong_key_is_decryption_failure() {
        let ledger = InMemoryLedger::new();
        let key = SymmetricKey::generate();
        let record = fixtures::private_folder(
            &ledger,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "Secret",
            &key,
        );

        let builder = EntityBuilder::new(&ledger);
        let err = builder
            .private_folder(&record, &SymmetricKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::DecryptionFailed { .. }));

        let err = builder.folder(&record, None).await.unwrap_err();
        assert!(matches!(err, EntityError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn test_private_drive_strict_and_safe() {
        let ledger = InMemoryLedger::new();
        let key = SymmetricKey::generate();
        let (drive_id, root) = (EntityId::generate(), EntityId::generate());
        let record = fixtures::private_drive(&ledger, 1, Some(5), drive_id, root, "Vault", &key);
        let builder = EntityBuilder::new(&ledger);

        let drive = builder.private_drive(&record, &key).await.unwrap();
        assert_eq!(drive.name, "Vault");
        assert_eq!(drive.root_folder_id, root);
        assert_eq!(drive.access.drive_key(), Some(&key));
        assert_eq!(drive.privacy(), DrivePrivacy::Private);

        // No usable key: sealed placeholders, not an error
        let sealed = builder
            .safe_drive(&record, &PrivateKeyDecryptor::new())
            .await
            .unwrap();
        assert!(sealed.name.is_encrypted());
        assert!(sealed.root_folder_id.is_encrypted());
        assert!(sealed.access.drive_key().is_none());

        let decryptor = PrivateKeyDecryptor::new().with_candidate_keys([key.clone()]);
        let opened = builder.safe_drive(&record, &decryptor).await.unwrap();
        assert_eq!(opened.clone().into_drive().unwrap(), drive);
        assert_eq!(opened.name.revealed().map(String::as_str), Some("Vault"));
    }

    #[tokio::test]
    async fn test_safe_drive_public() {
        let ledger = InMemoryLedger::new();
        let (drive_id, root) = (EntityId::generate(), EntityId::generate());
        let record = fixtures::public_drive(&ledger, 1, Some(5), drive_id, root, "Shared");

        let safe = EntityBuilder::new(&ledger)
            .safe_drive(&record, &PrivateKeyDecryptor::new())
            .await
            .unwrap();
        assert_eq!(safe.root_folder_id, Sealed::Revealed(root));
        assert_eq!(safe.privacy(), DrivePrivacy::Public);
    }

    #[tokio::test]
    async fn test_missing_body_is_ledger_error() {
        let ledger = InMemoryLedger::new();
        let other = InMemoryLedger::new();
        let record = fixtures::public_folder(
            &other,
            1,
            Some(1),
            EntityId::generate(),
            EntityId::generate(),
            ParentFolderId::Root,
            "x",
        );

        let err = EntityBuilder::new(&ledger).public_folder(&record).await.unwrap_err();
        assert!(matches!(err, EntityError::Ledger(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_or_folder_dispatch() {
        let ledger = InMemoryLedger::new();
        let drive = EntityId::generate();
        let folder = EntityId::generate();
        let folder_record = fixtures::public_folder(&ledger, 1, Some(1), drive, folder, ParentFolderId::Root, "r");
        let file_record = fixtures::public_file(&ledger, 2, Some(2), drive, EntityId::generate(), folder, "f");
        let drive_record = fixtures::public_drive(&ledger, 3, Some(3), drive, folder, "d");

        let builder = EntityBuilder::new(&ledger);
        assert!(matches!(
            builder.file_or_folder(&folder_record, None).await.unwrap(),
            FileOrFolder::Folder(_)
        ));
        assert!(matches!(
            builder.file_or_folder(&file_record, None).await.unwrap(),
            FileOrFolder::File(_)
        ));
        assert!(builder.file_or_folder(&drive_record, None).await.is_err());
    }
}
