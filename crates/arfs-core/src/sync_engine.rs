//! IncrementalSyncEngine: brings a drive's snapshot up to date with the ledger.
//!
//! A sync runs as follows:
//!
//! 1. Load the previous snapshot (from the options or the store). None means a
//!    full sync.
//! 2. Fetch the drive header to learn its privacy and drive key.
//! 3. Page through the drive's folder and file records, newest first, starting
//!    just above the previous snapshot's block height. Records on a page are
//!    built concurrently and consumed in ledger order.
//! 4. Classify the current revisions against the previous snapshot as added,
//!    modified, or (after a complete unfloored scan) unreachable.
//! 5. Save the merged snapshot. Nothing is saved when a sync fails.
//!
//! With `stop_after_known_count`, the scan stops once that many consecutive
//! records match revisions already in the snapshot.

use crate::builder::{EntityBuilder, EntityError};
use crate::crypto::DriveKey;
use crate::decryptor::PrivateKeyDecryptor;
use crate::drives;
use crate::entity::{FileOrFolder, Folder, SafeDrive};
use crate::events::{EventBus, SyncEvent};
use crate::hierarchy::FolderHierarchy;
use crate::ids::{EntityId, UnixTime};
use crate::ledger::{GqlNode, LedgerClient, LedgerError, LedgerQuery, TagFilter, DEFAULT_PAGE_SIZE};
use crate::revision::RevisionCollapser;
use crate::state::{DriveSyncState, EntitySyncState};
use crate::store::{StateBackend, StoreError, SyncStateStore};
use crate::tags::{self, EntityType};

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of record bodies fetched and decrypted at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Drive not found")]
    DriveNotFound,

    #[error("Sync cancelled")]
    Cancelled,
}

/// What a failed sync had accomplished before it stopped.
#[derive(Debug, Clone, Default)]
pub struct PartialSyncResult {
    /// Current revisions built so far
    pub entities: Vec<FileOrFolder>,
    pub stats: SyncStats,
    /// Cursor of the last fully consumed page; pass as `resume_cursor`
    pub last_cursor: Option<String>,
}

#[derive(Debug, Error)]
#[error("Sync of drive {drive_id} failed: {kind}")]
pub struct IncrementalSyncError {
    pub drive_id: EntityId,
    #[source]
    pub kind: SyncFailure,
    pub partial_result: PartialSyncResult,
}

pub type Result<T> = std::result::Result<T, IncrementalSyncError>;

/// Progress after each page. `total` stays `None` while records are still
/// streaming in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub processed: usize,
    pub total: Option<usize>,
}

pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

pub struct SyncOptions {
    /// Use this snapshot instead of the stored one
    pub prior_state: Option<DriveSyncState>,
    /// Stop after this many consecutive already-known records
    pub stop_after_known_count: Option<usize>,
    /// Ignore the previous height and scan the whole drive
    pub full_rescan: bool,
    /// Key for a private drive; tried before the engine's decryptor
    pub drive_key: Option<DriveKey>,
    pub page_size: usize,
    /// Upper bound on concurrent body fetches within a page
    pub concurrency: usize,
    pub on_progress: Option<ProgressCallback>,
    /// Checked between pages
    pub cancel: Option<Arc<AtomicBool>>,
    /// Resume paging after this cursor (from a failed sync's partial result)
    pub resume_cursor: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            prior_state: None,
            stop_after_known_count: None,
            full_rescan: false,
            drive_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            on_progress: None,
            cancel: None,
            resume_cursor: None,
        }
    }
}

impl SyncOptions {
    pub fn with_prior_state(mut self, state: DriveSyncState) -> Self {
        self.prior_state = Some(state);
        self
    }

    pub fn stop_after_known(mut self, count: usize) -> Self {
        self.stop_after_known_count = Some(count);
        self
    }

    pub fn full_rescan(mut self) -> Self {
        self.full_rescan = true;
        self
    }

    pub fn with_drive_key(mut self, key: DriveKey) -> Self {
        self.drive_key = Some(key);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(SyncProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn resume_from(mut self, cursor: impl Into<String>) -> Self {
        self.resume_cursor = Some(cursor.into());
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn report(&self, progress: SyncProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Ledger records consumed, including skipped ones
    pub total_processed: usize,
    pub pages_fetched: usize,
    /// Pending records left for a later sync
    pub skipped_pending: usize,
    /// Records that failed to build
    pub skipped_invalid: usize,
    pub added: usize,
    pub modified: usize,
    pub unreachable: usize,
    /// Scan ended on a run of known records rather than the end of the ledger
    pub stopped_early: bool,
}

/// Entity states that changed relative to the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncChangeSet {
    pub added: Vec<EntitySyncState>,
    pub modified: Vec<EntitySyncState>,
    /// In the previous snapshot but no longer found on the ledger
    pub unreachable: Vec<EntitySyncState>,
}

impl SyncChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.unreachable.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.unreachable.len()
    }
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub drive: SafeDrive,
    /// Current revisions observed in this sync, newest first
    pub entities: Vec<FileOrFolder>,
    pub changes: SyncChangeSet,
    pub new_sync_state: DriveSyncState,
    pub stats: SyncStats,
}

impl SyncResult {
    /// Hierarchy of the folders observed in this sync. Complete only when the
    /// sync scanned the whole drive.
    pub fn folder_hierarchy(&self) -> FolderHierarchy<Folder> {
        FolderHierarchy::new_from_entities(self.entities.iter().filter_map(|e| e.as_folder().cloned()))
    }

    /// Hierarchy of every folder in the new snapshot.
    pub fn snapshot_hierarchy(&self) -> FolderHierarchy<EntitySyncState> {
        FolderHierarchy::from_sync_state(&self.new_sync_state)
    }
}

/// Where the scan stands after each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Streaming { known_streak: usize },
    /// Hit `stop_after_known_count` known records in a row
    Stopped,
    /// Consumed the last page
    Exhausted,
}

impl ScanState {
    fn start() -> Self {
        Self::Streaming { known_streak: 0 }
    }

    fn record(self, known: bool, stop_after: Option<usize>) -> Self {
        match self {
            Self::Streaming { known_streak } => {
                let known_streak = if known { known_streak + 1 } else { 0 };
                match stop_after {
                    Some(limit) if limit > 0 && known_streak >= limit => Self::Stopped,
                    _ => Self::Streaming { known_streak },
                }
            }
            done => done,
        }
    }

    fn end_of_page(self, has_next_page: bool) -> Self {
        match self {
            Self::Streaming { .. } if !has_next_page => Self::Exhausted,
            other => other,
        }
    }

    fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

/// Accumulated work of one sync, kept so a failure can report it.
struct ScanProgress {
    collapser: RevisionCollapser<FileOrFolder>,
    stats: SyncStats,
    last_cursor: Option<String>,
    max_height: u64,
    /// Entities whose records were seen but could not be built
    unbuilt: HashSet<EntityId>,
}

impl ScanProgress {
    fn new(resume_cursor: Option<String>) -> Self {
        Self {
            collapser: RevisionCollapser::new(),
            stats: SyncStats::default(),
            last_cursor: resume_cursor,
            max_height: 0,
            unbuilt: HashSet::new(),
        }
    }

    fn partial(&self) -> PartialSyncResult {
        PartialSyncResult {
            entities: self.collapser.iter().cloned().collect(),
            stats: self.stats.clone(),
            last_cursor: self.last_cursor.clone(),
        }
    }
}

pub struct IncrementalSyncEngine<L, B> {
    ledger: L,
    store: SyncStateStore<B>,
    decryptor: Arc<PrivateKeyDecryptor>,
    events: Option<EventBus>,
}

impl<L: LedgerClient, B: StateBackend> IncrementalSyncEngine<L, B> {
    pub fn new(ledger: L, store: SyncStateStore<B>) -> Self {
        Self {
            ledger,
            store,
            decryptor: Arc::new(PrivateKeyDecryptor::new()),
            events: None,
        }
    }

    /// Keys used to open private drives.
    pub fn with_decryptor(mut self, decryptor: Arc<PrivateKeyDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &SyncStateStore<B> {
        &self.store
    }

    pub fn decryptor(&self) -> &PrivateKeyDecryptor {
        &self.decryptor
    }

    /// Sync `drive_id` as created by `owner`.
    pub async fn sync(&self, drive_id: &EntityId, owner: &str, mut options: SyncOptions) -> Result<SyncResult> {
        let mut progress = ScanProgress::new(options.resume_cursor.clone());

        // 1. Previous snapshot
        let prior = match options.prior_state.take() {
            Some(state) => Some(state),
            None => self
                .store
                .load(drive_id)
                .await
                .map_err(|e| self.fail(drive_id, e.into(), &progress))?,
        };
        let prior = prior.filter(|state| {
            let matches = state.drive_id == *drive_id;
            if !matches {
                warn!("Ignoring prior state of drive {} passed for {}", state.drive_id, drive_id);
            }
            matches
        });

        // 2. Drive header
        let drive = drives::latest_drive_header(
            &self.ledger,
            drive_id,
            Some(owner),
            &self.decryptor,
            options.drive_key.as_ref(),
        )
        .await
        .map_err(|e| self.fail(drive_id, e.into(), &progress))?
        .ok_or_else(|| self.fail(drive_id, SyncFailure::DriveNotFound, &progress))?;

        let drive_key = drive
            .access
            .drive_key()
            .cloned()
            .or_else(|| options.drive_key.clone());
        if drive.privacy() == tags::DrivePrivacy::Private && drive_key.is_none() {
            warn!("No key for private drive {}; its entities will be skipped", drive_id);
        }

        // 3. Page through entity records
        let min_height = match &prior {
            Some(state) if !options.full_rescan => Some(state.last_synced_block_height + 1),
            _ => None,
        };
        let mut query = LedgerQuery::new(vec![
            TagFilter::new(tags::DRIVE_ID, [drive_id.to_string()]),
            TagFilter::new(
                tags::ENTITY_TYPE,
                [EntityType::Folder.as_str(), EntityType::File.as_str()],
            ),
        ])
        .owner(owner)
        .min_height(min_height)
        .first(options.page_size.max(1))
        .cursor(options.resume_cursor.clone());

        debug!(
            "Syncing drive {} from height {:?} (prior state: {})",
            drive_id,
            min_height,
            prior.is_some()
        );

        let prior_states = prior.as_ref().map(|s| &s.entity_states);
        let builder = EntityBuilder::new(&self.ledger);
        let mut scan = ScanState::start();

        while scan.is_streaming() {
            if options.is_cancelled() {
                return Err(self.fail(drive_id, SyncFailure::Cancelled, &progress));
            }

            let page = self
                .ledger
                .query(&query)
                .await
                .map_err(|e| self.fail(drive_id, e.into(), &progress))?;
            progress.stats.pages_fetched += 1;

            let (pending, confirmed): (Vec<_>, Vec<_>) = page
                .edges
                .iter()
                .map(|edge| &edge.node)
                .partition(|node| node.block.is_none());

            let built: Vec<_> = stream::iter(confirmed.iter())
                .map(|node| builder.file_or_folder(node, drive_key.as_ref()))
                .buffered(options.concurrency.max(1))
                .collect()
                .await;

            progress.stats.total_processed += pending.len();
            progress.stats.skipped_pending += pending.len();

            for (node, result) in confirmed.iter().zip(built) {
                progress.stats.total_processed += 1;
                let entity = match result {
                    Ok(entity) => entity,
                    Err(EntityError::Ledger(e)) => {
                        return Err(self.fail(drive_id, e.into(), &progress));
                    }
                    Err(e) => {
                        warn!("Skipping record {}: {}", node.id, e);
                        progress.stats.skipped_invalid += 1;
                        progress.unbuilt.extend(record_entity_id(node));
                        continue;
                    }
                };

                let Some(state) = EntitySyncState::from_entity(&entity) else {
                    continue;
                };
                progress.max_height = progress.max_height.max(state.block_height);

                let known = prior_states
                    .and_then(|states| states.get(&state.entity_id))
                    .is_some_and(|prior| prior.same_revision(&state));
                progress.collapser.push(entity);

                scan = scan.record(known, options.stop_after_known_count);
                if scan == ScanState::Stopped {
                    debug!("Stopping after {} known records", options.stop_after_known_count.unwrap_or(0));
                    break;
                }
            }

            // A page abandoned mid-way is still the furthest point reached
            progress.last_cursor = page.last_cursor().map(String::from).or(progress.last_cursor.take());
            scan = scan.end_of_page(page.has_next_page);

            options.report(SyncProgress {
                processed: progress.stats.total_processed,
                total: None,
            });
            self.emit(SyncEvent::PageFetched {
                drive_id: drive_id.to_string(),
                page: progress.stats.pages_fetched,
                records: page.edges.len(),
                processed: progress.stats.total_processed,
            });

            if scan.is_streaming() {
                if progress.last_cursor.is_none() {
                    // Nothing to resume from; treat as the end
                    scan = ScanState::Exhausted;
                } else {
                    query = query.cursor(progress.last_cursor.clone());
                }
            }
        }
        progress.stats.stopped_early = scan == ScanState::Stopped;

        // 4. Classify against the previous snapshot
        let complete_scan = min_height.is_none() && options.resume_cursor.is_none() && scan == ScanState::Exhausted;
        let mut entity_states: HashMap<EntityId, EntitySyncState> =
            prior.as_ref().map(|s| s.entity_states.clone()).unwrap_or_default();
        let mut changes = SyncChangeSet::default();
        // Unbuildable records still prove their entity exists
        let mut observed = progress.unbuilt.clone();

        for entity in progress.collapser.iter() {
            let Some(state) = EntitySyncState::from_entity(entity) else {
                continue;
            };
            observed.insert(state.entity_id);
            match entity_states.get(&state.entity_id) {
                None => changes.added.push(state.clone()),
                Some(previous) if previous.same_revision(&state) => continue,
                Some(previous) if previous.block_height > state.block_height => continue,
                Some(_) => changes.modified.push(state.clone()),
            }
            entity_states.insert(state.entity_id, state);
        }

        if complete_scan {
            let mut gone: Vec<EntityId> = entity_states
                .keys()
                .filter(|id| !observed.contains(*id))
                .copied()
                .collect();
            gone.sort();
            for id in gone {
                if let Some(state) = entity_states.remove(&id) {
                    changes.unreachable.push(state);
                }
            }
        }

        progress.stats.added = changes.added.len();
        progress.stats.modified = changes.modified.len();
        progress.stats.unreachable = changes.unreachable.len();

        // 5. Persist
        let prior_height = prior.as_ref().map_or(0, |s| s.last_synced_block_height);
        let new_sync_state = DriveSyncState {
            drive_id: *drive_id,
            drive_privacy: drive.privacy(),
            last_synced_block_height: prior_height.max(progress.max_height),
            last_synced_timestamp: UnixTime::now(),
            entity_states,
        };
        self.store
            .save(drive_id, &new_sync_state)
            .await
            .map_err(|e| self.fail(drive_id, e.into(), &progress))?;

        options.report(SyncProgress {
            processed: progress.stats.total_processed,
            total: Some(progress.stats.total_processed),
        });
        self.emit(SyncEvent::SyncCompleted {
            drive_id: drive_id.to_string(),
            added: changes.added.len(),
            modified: changes.modified.len(),
            unreachable: changes.unreachable.len(),
            block_height: new_sync_state.last_synced_block_height,
        });
        info!(
            "Synced drive {}: {} added, {} modified, {} unreachable, height {}",
            drive_id,
            changes.added.len(),
            changes.modified.len(),
            changes.unreachable.len(),
            new_sync_state.last_synced_block_height
        );

        Ok(SyncResult {
            drive,
            entities: progress.collapser.into_vec(),
            changes,
            new_sync_state,
            stats: progress.stats,
        })
    }

    fn fail(&self, drive_id: &EntityId, kind: SyncFailure, progress: &ScanProgress) -> IncrementalSyncError {
        warn!("Sync of drive {} failed: {}", drive_id, kind);
        self.emit(SyncEvent::SyncFailed {
            drive_id: drive_id.to_string(),
            reason: kind.to_string(),
            processed: progress.stats.total_processed,
        });
        IncrementalSyncError {
            drive_id: *drive_id,
            kind,
            partial_result: progress.partial(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

/// Entity ID named by a folder or file record's tags.
fn record_entity_id(node: &GqlNode) -> Option<EntityId> {
    let id_tag = match node.tag(tags::ENTITY_TYPE)?.parse::<EntityType>().ok()? {
        EntityType::Folder => tags::FOLDER_ID,
        EntityType::File => tags::FILE_ID,
        EntityType::Drive => return None,
    };
    node.tag(id_tag)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fixtures;
    use crate::crypto::SymmetricKey;
    use crate::ids::ParentFolderId;
    use crate::ledger::InMemoryLedger;
    use crate::store::InMemoryBackend;
    use std::sync::Mutex;

    const OWNER: &str = "owner-address";

    type Engine = IncrementalSyncEngine<Arc<InMemoryLedger>, Arc<InMemoryBackend>>;

    fn engine(ledger: &Arc<InMemoryLedger>, backend: &Arc<InMemoryBackend>) -> Engine {
        IncrementalSyncEngine::new(ledger.clone(), SyncStateStore::new(backend.clone()))
    }

    /// A public drive with a root folder; returns (drive, root folder).
    fn public_drive(ledger: &InMemoryLedger) -> (EntityId, EntityId) {
        let (drive, root) = (EntityId::generate(), EntityId::generate());
        fixtures::public_drive(ledger, 900, Some(1), drive, root, "Drive");
        (drive, root)
    }

    #[test]
    fn test_scan_state_transitions() {
        let limit = Some(2);
        let s = ScanState::start().record(true, limit);
        assert_eq!(s, ScanState::Streaming { known_streak: 1 });
        let s = s.record(false, limit);
        assert_eq!(s, ScanState::Streaming { known_streak: 0 });
        let s = s.record(true, limit).record(true, limit);
        assert_eq!(s, ScanState::Stopped);
        assert_eq!(s.record(false, limit), ScanState::Stopped);
        assert_eq!(s.end_of_page(false), ScanState::Stopped);

        let s = ScanState::start().record(true, None).record(true, None);
        assert_eq!(s, ScanState::Streaming { known_streak: 2 });
        assert_eq!(s.end_of_page(true), s);
        assert_eq!(s.end_of_page(false), ScanState::Exhausted);

        // Zero disables early stop
        assert!(ScanState::start().record(true, Some(0)).is_streaming());
    }

    #[tokio::test]
    async fn test_first_sync_adds_everything() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, root) = public_drive(&ledger);
        let docs = EntityId::generate();
        fixtures::public_folder(&ledger, 1, Some(10), drive, root, ParentFolderId::Root, "Drive");
        fixtures::public_folder(&ledger, 2, Some(11), drive, docs, root.into(), "Docs");
        fixtures::public_file(&ledger, 3, Some(12), drive, EntityId::generate(), docs, "a.txt");

        let result = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(result.changes.added.len(), 3);
        assert!(result.changes.modified.is_empty());
        assert_eq!(result.new_sync_state.last_synced_block_height, 12);
        assert_eq!(result.entities[0].name(), "a.txt", "newest first");
        assert_eq!(
            result.folder_hierarchy().path_to_folder_id(docs.into()).unwrap(),
            "/Drive/Docs/"
        );

        let stored = SyncStateStore::new(backend.clone()).load(&drive).await.unwrap().unwrap();
        assert_eq!(stored, result.new_sync_state);
    }

    #[tokio::test]
    async fn test_diff_detects_rename() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        let f1 = EntityId::generate();
        fixtures::public_folder(&ledger, 1, Some(999_999), drive, f1, ParentFolderId::Root, "old-name");
        fixtures::public_folder(&ledger, 2, Some(1_000_000), drive, f1, ParentFolderId::Root, "new-name");

        let mut prior = DriveSyncState::empty(drive, tags::DrivePrivacy::Public);
        prior.last_synced_block_height = 999_999;
        prior.entity_states.insert(
            f1,
            EntitySyncState {
                entity_id: f1,
                tx_id: fixtures::tx(1),
                block_height: 999_999,
                parent_folder_id: Some(ParentFolderId::Root),
                name: "old-name".into(),
                entity_type: EntityType::Folder,
            },
        );

        let result = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default().with_prior_state(prior))
            .await
            .unwrap();

        assert!(result.changes.added.is_empty());
        assert_eq!(result.changes.modified.len(), 1);
        assert_eq!(result.changes.modified[0].entity_id, f1);
        assert_eq!(result.changes.modified[0].name, "new-name");
        assert_eq!(result.new_sync_state.last_synced_block_height, 1_000_000);
        assert_eq!(result.new_sync_state.entity(&f1).unwrap().name, "new-name");

        // Only records above the previous height were requested
        let entity_query = ledger
            .queries()
            .into_iter()
            .find(|q| q.tag_values(tags::ENTITY_TYPE).is_some_and(|v| v.contains(&"folder".to_string())))
            .unwrap();
        assert_eq!(entity_query.min_height, Some(1_000_000));
        assert_eq!(entity_query.owner.as_deref(), Some(OWNER));
        assert_eq!(result.stats.total_processed, 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_result_and_store_untouched() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        fixtures::public_folder(&ledger, 1, Some(20), drive, EntityId::generate(), ParentFolderId::Root, "a");
        fixtures::public_folder(&ledger, 2, Some(10), drive, EntityId::generate(), ParentFolderId::Root, "b");

        // Query 1 is the drive header, 2 the first page, 3 the second page
        ledger.fail_on_query(3);
        let sync = engine(&ledger, &backend);
        let err = sync
            .sync(&drive, OWNER, SyncOptions::default().page_size(1))
            .await
            .unwrap_err();

        assert!(matches!(err.kind, SyncFailure::Ledger(LedgerError::Network(_))));
        assert_eq!(err.drive_id, drive);
        assert_eq!(err.partial_result.stats.total_processed, 1);
        assert_eq!(err.partial_result.entities.len(), 1);
        assert!(backend.is_empty(), "nothing persisted on failure");

        // Resume where the failed sync stopped
        let cursor = err.partial_result.last_cursor.unwrap();
        let result = sync
            .sync(&drive, OWNER, SyncOptions::default().page_size(1).resume_from(cursor))
            .await
            .unwrap();
        assert_eq!(result.stats.total_processed, 1);
        assert_eq!(result.entities[0].name(), "b");
    }

    #[tokio::test]
    async fn test_early_stop_after_known_records() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        for n in 1..=5 {
            fixtures::public_folder(&ledger, n, Some(n * 10), drive, EntityId::generate(), ParentFolderId::Root, "f");
        }
        let sync = engine(&ledger, &backend);
        sync.sync(&drive, OWNER, SyncOptions::default()).await.unwrap();

        fixtures::public_folder(&ledger, 6, Some(60), drive, EntityId::generate(), ParentFolderId::Root, "new");
        let result = sync
            .sync(&drive, OWNER, SyncOptions::default().full_rescan().stop_after_known(2).page_size(2))
            .await
            .unwrap();

        assert!(result.stats.stopped_early);
        assert_eq!(result.stats.total_processed, 3);
        assert_eq!(result.changes.added.len(), 1);
        assert!(result.changes.unreachable.is_empty());
        assert_eq!(result.new_sync_state.entity_states.len(), 6);
        assert_eq!(result.new_sync_state.last_synced_block_height, 60);
    }

    #[tokio::test]
    async fn test_full_rescan_reports_unreachable() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        let kept = EntityId::generate();
        fixtures::public_folder(&ledger, 1, Some(5), drive, kept, ParentFolderId::Root, "kept");

        let ghost = EntityId::generate();
        let mut prior = DriveSyncState::empty(drive, tags::DrivePrivacy::Public);
        prior.last_synced_block_height = 5;
        prior.entity_states.insert(
            ghost,
            EntitySyncState {
                entity_id: ghost,
                tx_id: fixtures::tx(77),
                block_height: 3,
                parent_folder_id: Some(ParentFolderId::Root),
                name: "ghost".into(),
                entity_type: EntityType::Folder,
            },
        );

        let sync = engine(&ledger, &backend);
        // Incremental: the floor hides everything, nothing is unreachable
        let result = sync
            .sync(&drive, OWNER, SyncOptions::default().with_prior_state(prior.clone()))
            .await
            .unwrap();
        assert!(result.changes.is_empty());

        let result = sync
            .sync(&drive, OWNER, SyncOptions::default().with_prior_state(prior).full_rescan())
            .await
            .unwrap();
        assert_eq!(result.changes.unreachable.len(), 1);
        assert_eq!(result.changes.unreachable[0].entity_id, ghost);
        assert_eq!(result.changes.added.len(), 1);
        assert!(result.new_sync_state.entity(&ghost).is_none());
        assert!(result.new_sync_state.entity(&kept).is_some());
    }

    #[tokio::test]
    async fn test_pending_and_invalid_records_skipped() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        fixtures::public_folder(&ledger, 1, Some(5), drive, EntityId::generate(), ParentFolderId::Root, "ok");
        fixtures::public_folder(&ledger, 2, None, drive, EntityId::generate(), ParentFolderId::Root, "pending");
        let scratch = InMemoryLedger::new();
        let bad = fixtures::public_folder(&scratch, 3, Some(6), drive, EntityId::generate(), ParentFolderId::Root, "bad");
        ledger.insert(bad, b"not json".to_vec());

        let result = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(result.stats.skipped_pending, 1);
        assert_eq!(result.stats.skipped_invalid, 1);
        assert_eq!(result.stats.total_processed, 3);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.new_sync_state.last_synced_block_height, 5);
    }

    #[tokio::test]
    async fn test_missing_drive() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let err = engine(&ledger, &backend)
            .sync(&EntityId::generate(), OWNER, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, SyncFailure::DriveNotFound));
    }

    #[tokio::test]
    async fn test_cancelled_sync_saves_nothing() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, root) = public_drive(&ledger);
        fixtures::public_folder(&ledger, 1, Some(5), drive, root, ParentFolderId::Root, "root");

        let cancel = Arc::new(AtomicBool::new(true));
        let err = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default().with_cancel(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, SyncFailure::Cancelled));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_private_drive_with_candidate_key() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let key = SymmetricKey::generate();
        let (drive, root) = (EntityId::generate(), EntityId::generate());
        fixtures::private_drive(&ledger, 900, Some(1), drive, root, "Vault", &key);
        fixtures::private_folder(&ledger, 1, Some(2), drive, root, ParentFolderId::Root, "Vault", &key);
        fixtures::private_file(&ledger, 2, Some(3), drive, EntityId::generate(), root, "secret.pdf", &key);

        let decryptor = Arc::new(PrivateKeyDecryptor::new().with_candidate_keys([key.clone()]));
        let result = engine(&ledger, &backend)
            .with_decryptor(decryptor.clone())
            .sync(&drive, OWNER, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.stats.skipped_invalid, 0);
        assert_eq!(result.new_sync_state.drive_privacy, tags::DrivePrivacy::Private);
        assert_eq!(decryptor.cached_key(&drive), Some(key));
    }

    #[tokio::test]
    async fn test_private_drive_without_key_skips_entities() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let key = SymmetricKey::generate();
        let (drive, root) = (EntityId::generate(), EntityId::generate());
        fixtures::private_drive(&ledger, 900, Some(1), drive, root, "Vault", &key);
        fixtures::private_folder(&ledger, 1, Some(2), drive, root, ParentFolderId::Root, "Vault", &key);

        let result = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default())
            .await
            .unwrap();
        assert!(result.drive.name.is_encrypted());
        assert_eq!(result.stats.skipped_invalid, 1);
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_full_rescan_keeps_entities_it_cannot_decrypt() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let key = SymmetricKey::generate();
        let (drive, root) = (EntityId::generate(), EntityId::generate());
        fixtures::private_drive(&ledger, 900, Some(1), drive, root, "Vault", &key);
        fixtures::private_folder(&ledger, 1, Some(2), drive, root, ParentFolderId::Root, "Vault", &key);
        fixtures::private_file(&ledger, 2, Some(3), drive, EntityId::generate(), root, "secret.pdf", &key);

        let decryptor = Arc::new(PrivateKeyDecryptor::new().with_candidate_keys([key]));
        let first = engine(&ledger, &backend)
            .with_decryptor(decryptor)
            .sync(&drive, OWNER, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.new_sync_state.entity_states.len(), 2);

        // Same records, no key this time
        let result = engine(&ledger, &backend)
            .sync(&drive, OWNER, SyncOptions::default().full_rescan())
            .await
            .unwrap();
        assert_eq!(result.stats.skipped_invalid, 2);
        assert!(result.changes.unreachable.is_empty());
        assert_eq!(result.new_sync_state.entity_states, first.new_sync_state.entity_states);

        let stored = SyncStateStore::new(backend.clone()).load(&drive).await.unwrap().unwrap();
        assert_eq!(stored.entity_states.len(), 2);
    }

    #[test]
    fn test_record_entity_id_reads_id_tag() {
        let ledger = InMemoryLedger::new();
        let (drive, folder_id, file_id) = (EntityId::generate(), EntityId::generate(), EntityId::generate());
        let folder = fixtures::public_folder(&ledger, 1, Some(1), drive, folder_id, ParentFolderId::Root, "f");
        let file = fixtures::public_file(&ledger, 2, Some(1), drive, file_id, folder_id, "a.txt");
        let drive_node = fixtures::public_drive(&ledger, 3, Some(1), drive, folder_id, "Drive");

        assert_eq!(record_entity_id(&folder), Some(folder_id));
        assert_eq!(record_entity_id(&file), Some(file_id));
        assert_eq!(record_entity_id(&drive_node), None);
    }

    #[tokio::test]
    async fn test_progress_and_events() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        for n in 1..=3 {
            fixtures::public_folder(&ledger, n, Some(n), drive, EntityId::generate(), ParentFolderId::Root, "f");
        }

        let reports = Arc::new(Mutex::new(Vec::new()));
        let reports_clone = Arc::clone(&reports);
        let events = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = events.subscribe(move |event| seen_clone.lock().unwrap().push(event.clone()));

        engine(&ledger, &backend)
            .with_event_bus(events.clone())
            .sync(
                &drive,
                OWNER,
                SyncOptions::default()
                    .page_size(2)
                    .on_progress(move |p| reports_clone.lock().unwrap().push(p)),
            )
            .await
            .unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(
            *reports,
            vec![
                SyncProgress { processed: 2, total: None },
                SyncProgress { processed: 3, total: None },
                SyncProgress { processed: 3, total: Some(3) },
            ]
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[2], SyncEvent::SyncCompleted { added: 3, .. }));
    }

    #[tokio::test]
    async fn test_second_sync_uses_stored_state() {
        let ledger = Arc::new(InMemoryLedger::new());
        let backend = Arc::new(InMemoryBackend::new());
        let (drive, _) = public_drive(&ledger);
        fixtures::public_folder(&ledger, 1, Some(7), drive, EntityId::generate(), ParentFolderId::Root, "a");

        let sync = engine(&ledger, &backend);
        sync.sync(&drive, OWNER, SyncOptions::default()).await.unwrap();
        let again = sync.sync(&drive, OWNER, SyncOptions::default()).await.unwrap();

        assert!(again.changes.is_empty());
        assert_eq!(again.stats.total_processed, 0);
        assert_eq!(again.new_sync_state.last_synced_block_height, 7);
        assert_eq!(again.new_sync_state.entity_states.len(), 1);
    }
}
