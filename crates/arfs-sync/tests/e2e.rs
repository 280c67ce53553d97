//! End-to-end tests for arfs-sync.
//!
//! Runs the sync engine against an in-memory ledger with snapshots persisted
//! through the native file backend, including across simulated restarts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arfs_core::ledger::BlockInfo;
use arfs_core::tags;
use arfs_core::{
    EntityId, GqlNode, GqlTag, InMemoryLedger, IncrementalSyncEngine, ParentFolderId, SyncFailure, SyncOptions,
    SyncStateStore, TransactionId,
};
use arfs_sync::{Config, NativeStateBackend, inspect, open_store};
use serde_json::json;
use tempfile::TempDir;

const OWNER: &str = "e2e-owner";

// Shared so drives written to one ledger never reuse a transaction ID
static NEXT_SEED: AtomicU64 = AtomicU64::new(1);

/// Builds ledger records for one public drive.
struct DriveWriter {
    ledger: Arc<InMemoryLedger>,
    drive_id: EntityId,
}

impl DriveWriter {
    fn new(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            ledger,
            drive_id: EntityId::generate(),
        }
    }

    fn tx(&self) -> TransactionId {
        let seed = NEXT_SEED.fetch_add(1, Ordering::Relaxed);
        format!("{:0>43}", seed).parse().unwrap()
    }

    fn record(&mut self, entity_type: &str, height: u64, mut extra: Vec<GqlTag>, body: serde_json::Value) {
        let id = self.tx();
        let mut tags = vec![
            GqlTag::new(tags::APP_NAME, "ArDrive-Core"),
            GqlTag::new(tags::APP_VERSION, "2.0.0"),
            GqlTag::new(tags::ARFS, "0.15"),
            GqlTag::new(tags::CONTENT_TYPE, tags::JSON_CONTENT_TYPE),
            GqlTag::new(tags::DRIVE_ID, self.drive_id.to_string()),
            GqlTag::new(tags::ENTITY_TYPE, entity_type),
            GqlTag::new(tags::UNIX_TIME, (1_700_000_000 + height).to_string()),
        ];
        tags.append(&mut extra);
        let node = GqlNode {
            id,
            tags,
            block: Some(BlockInfo {
                height,
                timestamp: 1_700_000_000 + height,
            }),
            owner: OWNER.to_string(),
        };
        self.ledger.insert(node, body.to_string().into_bytes());
    }

    fn drive(&mut self, height: u64, root: EntityId, name: &str) {
        let privacy = vec![GqlTag::new(tags::DRIVE_PRIVACY, "public")];
        self.record("drive", height, privacy, json!({ "name": name, "rootFolderId": root.to_string() }));
    }

    fn folder(&mut self, height: u64, folder_id: EntityId, parent: ParentFolderId, name: &str) {
        let mut extra = vec![GqlTag::new(tags::FOLDER_ID, folder_id.to_string())];
        if let ParentFolderId::Folder(parent) = parent {
            extra.push(GqlTag::new(tags::PARENT_FOLDER_ID, parent.to_string()));
        }
        self.record("folder", height, extra, json!({ "name": name }));
    }

    fn file(&mut self, height: u64, file_id: EntityId, parent: EntityId, name: &str) {
        let extra = vec![
            GqlTag::new(tags::FILE_ID, file_id.to_string()),
            GqlTag::new(tags::PARENT_FOLDER_ID, parent.to_string()),
        ];
        let data_tx = self.tx();
        self.record(
            "file",
            height,
            extra,
            json!({
                "name": name,
                "size": 2048,
                "lastModifiedDate": 1_700_000_000_000u64,
                "dataTxId": data_tx.to_string(),
                "dataContentType": "text/markdown",
            }),
        );
    }
}

fn native_engine(
    ledger: &Arc<InMemoryLedger>,
    dir: &TempDir,
) -> IncrementalSyncEngine<Arc<InMemoryLedger>, NativeStateBackend> {
    let store = SyncStateStore::new(NativeStateBackend::new(dir.path()));
    IncrementalSyncEngine::new(Arc::clone(ledger), store)
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(InMemoryLedger::new());
    let mut writer = DriveWriter::new(Arc::clone(&ledger));
    let (root, docs, note) = (EntityId::generate(), EntityId::generate(), EntityId::generate());
    writer.drive(100, root, "Notes");
    writer.folder(100, root, ParentFolderId::Root, "Notes");
    writer.folder(101, docs, root.into(), "docs");
    writer.file(102, note, docs, "todo.md");
    let drive_id = writer.drive_id;

    let first = native_engine(&ledger, &dir)
        .sync(&drive_id, OWNER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.changes.added.len(), 3);
    assert_eq!(first.new_sync_state.last_synced_block_height, 102);

    // New process, same state directory
    writer.folder(200, docs, root.into(), "documents");
    let engine = native_engine(&ledger, &dir);
    let second = engine.sync(&drive_id, OWNER, SyncOptions::default()).await.unwrap();

    let last_query = ledger.queries().last().cloned().unwrap();
    assert_eq!(last_query.min_height, Some(103));
    assert!(second.changes.added.is_empty());
    assert_eq!(second.changes.modified.len(), 1);
    assert_eq!(second.changes.modified[0].name, "documents");
    assert_eq!(second.new_sync_state.last_synced_block_height, 200);

    let reloaded = engine.store().load(&drive_id).await.unwrap().unwrap();
    assert_eq!(reloaded, second.new_sync_state);
    assert_eq!(
        inspect::tree_lines(&reloaded),
        vec!["/Notes/", "/Notes/documents/", "/Notes/documents/todo.md"]
    );
}

#[tokio::test]
async fn test_failed_sync_leaves_snapshot_file_untouched() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(InMemoryLedger::new());
    let mut writer = DriveWriter::new(Arc::clone(&ledger));
    let root = EntityId::generate();
    writer.drive(10, root, "Drive");
    writer.folder(10, root, ParentFolderId::Root, "Drive");
    let drive_id = writer.drive_id;

    native_engine(&ledger, &dir)
        .sync(&drive_id, OWNER, SyncOptions::default())
        .await
        .unwrap();
    let file = dir.path().join(format!("arfs-sync-state%2F{}.json", drive_id));
    let before = std::fs::read_to_string(&file).unwrap();

    writer.folder(20, EntityId::generate(), root.into(), "new");
    writer.folder(21, EntityId::generate(), root.into(), "newer");
    let queries_so_far = ledger.queries().len();
    // Header query succeeds, second entity page fails
    ledger.fail_on_query(3);
    let err = native_engine(&ledger, &dir)
        .sync(&drive_id, OWNER, SyncOptions::default().page_size(1))
        .await
        .unwrap_err();

    assert!(matches!(err.kind, SyncFailure::Ledger(_)));
    assert!(ledger.queries().len() > queries_so_far);
    assert_eq!(err.partial_result.stats.total_processed, 1);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), before);
}

#[tokio::test]
async fn test_open_store_lists_and_clears() {
    let dir = TempDir::new().unwrap();
    let config = Config::resolve(dir.path().to_str()).unwrap();
    let ledger = Arc::new(InMemoryLedger::new());

    let mut drives = Vec::new();
    for name in ["One", "Two"] {
        let mut writer = DriveWriter::new(Arc::clone(&ledger));
        let root = EntityId::generate();
        writer.drive(5, root, name);
        writer.folder(5, root, ParentFolderId::Root, name);
        native_engine(&ledger, &dir)
            .sync(&writer.drive_id, OWNER, SyncOptions::default())
            .await
            .unwrap();
        drives.push(writer.drive_id);
    }
    drives.sort();

    let store = open_store(&config);
    assert_eq!(store.list().await.unwrap(), drives);

    store.clear(&drives[0]).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec![drives[1]]);
    store.clear_all().await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}
