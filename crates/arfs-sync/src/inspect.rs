//! Human-readable views of a stored sync snapshot.

use arfs_core::{DriveSyncState, FolderHierarchy, ParentFolderId, UnixTime};
use tracing::warn;

/// One-line description: drive, privacy, height and entity counts.
pub fn summary(state: &DriveSyncState) -> String {
    format!(
        "{}  {:<7}  height {:>8}  synced {}  {} folders, {} files",
        state.drive_id,
        state.drive_privacy.as_str(),
        state.last_synced_block_height,
        format_time(state.last_synced_timestamp),
        state.folders().count(),
        state.files().count(),
    )
}

fn format_time(time: UnixTime) -> String {
    if time.as_secs() == 0 {
        "never".to_string()
    } else {
        format!("@{}", time.as_secs())
    }
}

/// Full path of every folder and file in the snapshot, sorted.
///
/// Entities whose ancestry cannot be walked to the drive root are listed
/// under `?/` with their bare name.
pub fn tree_lines(state: &DriveSyncState) -> Vec<String> {
    let hierarchy = FolderHierarchy::from_sync_state(state);

    let mut lines: Vec<String> = Vec::new();
    for folder in state.folders() {
        match hierarchy.path_to_folder_id(ParentFolderId::Folder(folder.entity_id)) {
            Ok(path) => lines.push(path),
            Err(e) => {
                warn!("No path for folder {}: {}", folder.entity_id, e);
                lines.push(format!("?/{}/", folder.name));
            }
        }
    }
    for file in state.files() {
        let parent = file.parent_folder_id.unwrap_or(ParentFolderId::Root);
        match hierarchy.file_path(parent, &file.name) {
            Ok(path) => lines.push(path),
            Err(e) => {
                warn!("No path for file {}: {}", file.entity_id, e);
                lines.push(format!("?/{}", file.name));
            }
        }
    }
    lines.sort();
    lines
}
