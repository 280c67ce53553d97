//! FolderHierarchy: the folder tree of one drive.
//!
//! Nodes live in an arena keyed by entity ID; a node's parent is stored as an
//! ID, not a reference. Construction places every folder after its
//! ancestors regardless of input order. A parent that is missing from the
//! input, or that would close a cycle, leaves the node as a root of its own
//! subtree.
//!
//! Paths are rendered oldest ancestor first, slash-joined, with a leading and
//! trailing slash: a folder `B` under `A` under the drive root is `/A/B/`.

use crate::entity::{File, Folder};
use crate::ids::{EntityId, ParentFolderId, TransactionId};
use crate::state::{DriveSyncState, EntitySyncState};

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Cannot compute path in a subtree: root folder {0} has a parent")]
    CannotComputeSubtreePath(EntityId),

    #[error("Folder not found in hierarchy: {0}")]
    FolderNotFound(EntityId),
}

pub type Result<T> = std::result::Result<T, HierarchyError>;

/// A folder record that can be placed in a hierarchy.
pub trait HierarchyEntry {
    fn folder_id(&self) -> EntityId;
    fn parent(&self) -> ParentFolderId;
    fn name(&self) -> &str;
    fn tx_id(&self) -> &TransactionId;
}

impl HierarchyEntry for Folder {
    fn folder_id(&self) -> EntityId {
        self.entity_id
    }

    fn parent(&self) -> ParentFolderId {
        self.parent_folder_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tx_id(&self) -> &TransactionId {
        &self.meta.tx_id
    }
}

impl HierarchyEntry for EntitySyncState {
    fn folder_id(&self) -> EntityId {
        self.entity_id
    }

    // Records without parent information sit at the drive root
    fn parent(&self) -> ParentFolderId {
        self.parent_folder_id.unwrap_or(ParentFolderId::Root)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tx_id(&self) -> &TransactionId {
        &self.tx_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTreeNode {
    pub id: EntityId,
    /// Parent node, if it is part of this hierarchy
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
}

#[derive(Debug)]
pub struct FolderHierarchy<T = Folder> {
    entities: HashMap<EntityId, T>,
    nodes: HashMap<EntityId, FolderTreeNode>,
    /// Entity IDs in input order
    order: Vec<EntityId>,
    root: OnceLock<Option<EntityId>>,
}

impl<T: HierarchyEntry> FolderHierarchy<T> {
    /// Build from a drive's current folders. Later duplicates of an ID
    /// replace earlier ones.
    pub fn new_from_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let mut by_id = HashMap::new();
        let mut order = Vec::new();
        for entity in entities {
            let id = entity.folder_id();
            if by_id.insert(id, entity).is_none() {
                order.push(id);
            }
        }

        let mut nodes: HashMap<EntityId, FolderTreeNode> = HashMap::with_capacity(order.len());
        for &start in &order {
            if nodes.contains_key(&start) {
                continue;
            }

            // Unplaced ancestors, nearest first
            let mut chain = vec![start];
            let mut seen = HashSet::from([start]);
            let mut current = start;
            while let Some(parent) = by_id[&current].parent().folder_id() {
                if !by_id.contains_key(&parent) || nodes.contains_key(&parent) || !seen.insert(parent) {
                    break;
                }
                chain.push(parent);
                current = parent;
            }

            // Place top-down so every link points at a node already placed
            for &id in chain.iter().rev() {
                let parent = by_id[&id]
                    .parent()
                    .folder_id()
                    .filter(|p| nodes.contains_key(p));
                match parent {
                    Some(p) => {
                        if let Some(parent_node) = nodes.get_mut(&p) {
                            parent_node.children.push(id);
                        }
                    }
                    None if !by_id[&id].parent().is_root() => {
                        debug!("Folder {} has no reachable parent, treating as subtree root", id);
                    }
                    None => {}
                }
                nodes.insert(
                    id,
                    FolderTreeNode {
                        id,
                        parent,
                        children: Vec::new(),
                    },
                );
            }
        }

        Self {
            entities: by_id,
            nodes,
            order,
            root: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.entities.get(id)
    }

    pub fn node(&self, id: &EntityId) -> Option<&FolderTreeNode> {
        self.nodes.get(id)
    }

    /// Folders in input order.
    pub fn folders(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// The first folder that sits directly under the drive root. Without one,
    /// the node reached by walking parent links up from the first folder.
    pub fn root_node(&self) -> Option<&FolderTreeNode> {
        let root = self.root.get_or_init(|| {
            let drive_root = self
                .order
                .iter()
                .find(|id| self.entities.get(id).is_some_and(|entity| entity.parent().is_root()));
            match drive_root {
                Some(id) => Some(*id),
                None => self.order.first().map(|id| self.topmost(id)),
            }
        });
        root.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// Furthest ancestor of `id` within this hierarchy, or `id` itself.
    fn topmost(&self, id: &EntityId) -> EntityId {
        let mut current = *id;
        while let Some(parent) = self.nodes.get(&current).and_then(|node| node.parent) {
            current = parent;
        }
        current
    }

    pub fn children_of(&self, id: &EntityId) -> Result<Vec<&T>> {
        let node = self.require(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.entities.get(child))
            .collect())
    }

    /// Ancestor IDs within this hierarchy, nearest first.
    pub fn ancestors_of(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let mut current = self.require(id)?;
        let mut ancestors = Vec::new();
        while let Some(parent) = current.parent.and_then(|p| self.nodes.get(&p)) {
            ancestors.push(parent.id);
            current = parent;
        }
        Ok(ancestors)
    }

    /// `folder_id` followed by its descendants, depth-first.
    ///
    /// `max_depth` of `Some(0)` yields only `folder_id`; `None` means no limit.
    pub fn folder_id_subtree_from_folder_id(
        &self,
        folder_id: &EntityId,
        max_depth: Option<usize>,
    ) -> Result<Vec<EntityId>> {
        self.require(folder_id)?;

        let mut ids = Vec::new();
        let mut stack = vec![(*folder_id, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            ids.push(id);
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                // Reversed so children pop in insertion order
                stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
            }
        }
        Ok(ids)
    }

    /// Render one segment per folder from the drive root down to `folder_id`.
    fn render_path(&self, folder_id: ParentFolderId, segment: impl Fn(&T) -> String) -> Result<String> {
        let id = match folder_id {
            ParentFolderId::Root => return Ok("/".to_string()),
            ParentFolderId::Folder(id) => id,
        };

        let ancestors = self.ancestors_of(&id)?;
        let top = ancestors.last().copied().unwrap_or(id);
        if !self.entity(&top)?.parent().is_root() {
            return Err(HierarchyError::CannotComputeSubtreePath(top));
        }

        let mut segments = vec![segment(self.entity(&id)?)];
        for ancestor in ancestors {
            segments.push(segment(self.entity(&ancestor)?));
        }
        segments.reverse();
        Ok(format!("/{}/", segments.join("/")))
    }

    /// Folder names from the drive root down to `folder_id`.
    pub fn path_to_folder_id(&self, folder_id: ParentFolderId) -> Result<String> {
        self.render_path(folder_id, |entity| entity.name().to_string())
    }

    /// Like `path_to_folder_id`, with entity IDs as segments.
    pub fn entity_path_to_folder_id(&self, folder_id: ParentFolderId) -> Result<String> {
        self.render_path(folder_id, |entity| entity.folder_id().to_string())
    }

    /// Like `path_to_folder_id`, with transaction IDs as segments.
    pub fn tx_path_to_folder_id(&self, folder_id: ParentFolderId) -> Result<String> {
        self.render_path(folder_id, |entity| entity.tx_id().to_string())
    }

    /// Path of a file named `file_name` in `parent_folder_id`.
    pub fn file_path(&self, parent_folder_id: ParentFolderId, file_name: &str) -> Result<String> {
        Ok(format!("{}{}", self.path_to_folder_id(parent_folder_id)?, file_name))
    }

    pub fn path_to_file(&self, file: &File) -> Result<String> {
        self.file_path(file.parent_folder_id, &file.name)
    }

    fn require(&self, id: &EntityId) -> Result<&FolderTreeNode> {
        self.nodes.get(id).ok_or(HierarchyError::FolderNotFound(*id))
    }

    fn entity(&self, id: &EntityId) -> Result<&T> {
        self.entities.get(id).ok_or(HierarchyError::FolderNotFound(*id))
    }
}

impl<T: HierarchyEntry + Clone> FolderHierarchy<T> {
    /// A new hierarchy holding `folder_id` and its descendants.
    ///
    /// Paths cannot be computed in the result unless `folder_id` is a root
    /// folder.
    pub fn sub_tree_of(&self, folder_id: &EntityId, max_depth: Option<usize>) -> Result<Self> {
        let ids = self.folder_id_subtree_from_folder_id(folder_id, max_depth)?;
        Ok(Self::new_from_entities(
            ids.iter().filter_map(|id| self.entities.get(id).cloned()),
        ))
    }
}

impl FolderHierarchy<EntitySyncState> {
    /// Hierarchy of the folders recorded in a sync snapshot.
    pub fn from_sync_state(state: &DriveSyncState) -> Self {
        let mut folders: Vec<EntitySyncState> = state.folders().cloned().collect();
        folders.sort_by_key(|f| f.entity_id);
        Self::new_from_entities(folders)
    }
}
