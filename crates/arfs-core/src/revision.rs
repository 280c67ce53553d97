//! Collapse entity revisions down to the current one per entity ID.
//!
//! Ordering between two revisions of one entity:
//!
//! 1. Pending (unmined) beats any mined revision
//! 2. Higher block height wins
//! 3. At equal height, later `Unix-Time` wins
//! 4. Full ties keep whichever revision was seen first
//!
//! The result preserves the order in which entity IDs first appeared, so
//! feeding newest-first pages in yields newest-first entities out.

use crate::entity::{Drive, EntityMetadata, File, FileOrFolder, Folder, SafeDrive};
use crate::ids::{EntityId, UnixTime};

use std::cmp::Ordering;
use std::collections::HashMap;

/// An entity with revision metadata.
pub trait Revisioned {
    /// The ID shared by every revision of this entity.
    fn revision_key(&self) -> EntityId;

    fn metadata(&self) -> &EntityMetadata;
}

impl Revisioned for Drive {
    fn revision_key(&self) -> EntityId {
        self.meta.drive_id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

impl Revisioned for SafeDrive {
    fn revision_key(&self) -> EntityId {
        self.meta.drive_id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

impl Revisioned for Folder {
    fn revision_key(&self) -> EntityId {
        self.entity_id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

impl Revisioned for File {
    fn revision_key(&self) -> EntityId {
        self.entity_id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

impl Revisioned for FileOrFolder {
    fn revision_key(&self) -> EntityId {
        self.entity_id()
    }

    fn metadata(&self) -> &EntityMetadata {
        self.meta()
    }
}

/// Sort key of a revision. Pending sorts above every mined height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RevisionRank {
    height: Option<u64>,
    unix_time: UnixTime,
}

impl RevisionRank {
    fn of(meta: &EntityMetadata) -> Self {
        Self {
            height: meta.block_height,
            unix_time: meta.unix_time,
        }
    }
}

impl Ord for RevisionRank {
    fn cmp(&self, other: &Self) -> Ordering {
        let height = match (self.height, other.height) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        };
        height.then_with(|| self.unix_time.cmp(&other.unix_time))
    }
}

impl PartialOrd for RevisionRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Streaming collapser; revisions may arrive in any order.
pub struct RevisionCollapser<T> {
    slots: Vec<T>,
    index: HashMap<EntityId, usize>,
}

impl<T: Revisioned> Default for RevisionCollapser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Revisioned> RevisionCollapser<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Offer one revision. Returns true when it became the current revision
    /// of its entity.
    pub fn push(&mut self, entity: T) -> bool {
        let key = entity.revision_key();
        match self.index.get(&key) {
            Some(&slot) => {
                let current = &mut self.slots[slot];
                if RevisionRank::of(entity.metadata()) > RevisionRank::of(current.metadata()) {
                    *current = entity;
                    true
                } else {
                    false
                }
            }
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(entity);
                true
            }
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.index.get(id).map(|&slot| &self.slots[slot])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    /// Current revisions in first-appearance order.
    pub fn into_vec(self) -> Vec<T> {
        self.slots
    }
}

impl<T: Revisioned> Extend<T> for RevisionCollapser<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for entity in iter {
            self.push(entity);
        }
    }
}

impl<T: Revisioned> FromIterator<T> for RevisionCollapser<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collapser = Self::new();
        collapser.extend(iter);
        collapser
    }
}

/// Keep only the latest revision of each entity.
pub fn collapse<T: Revisioned>(entities: impl IntoIterator<Item = T>) -> Vec<T> {
    entities.into_iter().collect::<RevisionCollapser<T>>().into_vec()
}
