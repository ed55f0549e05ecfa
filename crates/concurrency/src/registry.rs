//! Snapshots registry
//!
//! Holds the current snapshot of every collection, addressable by name or
//! id. Readers take a short read lock and clone an `Arc`; the commit path
//! swaps entries under the write lock. The name index is updated in the same
//! critical section as the snapshot, so lookups by name and by id always
//! agree.

use crate::snapshot::{Snapshot, ScopedSnapshot};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;
use vecmeta_core::{Id, MetaError, ResourceKind, Result};

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: FxHashMap<Id, ScopedSnapshot>,
    name_to_id: FxHashMap<String, Id>,
}

/// Current snapshot per collection
#[derive(Debug, Default)]
pub struct Snapshots {
    inner: RwLock<RegistryInner>,
}

impl Snapshots {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of the collection named `name`
    pub fn get_by_name(&self, name: &str) -> Result<ScopedSnapshot> {
        let inner = self.inner.read();
        inner
            .name_to_id
            .get(name)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
            .ok_or_else(|| MetaError::not_found(format!("collection '{}'", name)))
    }

    /// Current snapshot of collection `collection_id`
    pub fn get_by_id(&self, collection_id: Id) -> Result<ScopedSnapshot> {
        self.inner
            .read()
            .by_id
            .get(&collection_id)
            .cloned()
            .ok_or_else(|| MetaError::resource_not_found(ResourceKind::Collection, collection_id))
    }

    /// Make `snapshot` the current snapshot of its collection
    ///
    /// The previous snapshot stays valid for anyone still holding it.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if another live collection owns the name;
    /// `InvalidArgument` if the snapshot is older than the installed one.
    pub fn install(&self, snapshot: Snapshot) -> Result<ScopedSnapshot> {
        let collection_id = snapshot.collection_id();
        let name = snapshot.name().to_string();
        let snapshot = Arc::new(snapshot);

        let mut inner = self.inner.write();
        if let Some(owner) = inner.name_to_id.get(&name) {
            if *owner != collection_id {
                return Err(MetaError::already_exists(format!("collection '{}'", name)));
            }
        }
        if let Some(current) = inner.by_id.get(&collection_id) {
            if current.commit_id() > snapshot.commit_id() {
                return Err(MetaError::invalid_argument(format!(
                    "snapshot {} of '{}' is older than installed snapshot {}",
                    snapshot.commit_id(),
                    name,
                    current.commit_id()
                )));
            }
        }

        inner.name_to_id.insert(name.clone(), collection_id);
        inner.by_id.insert(collection_id, Arc::clone(&snapshot));
        debug!(
            target: "vecmeta::catalog",
            collection = %name,
            commit = snapshot.commit_id(),
            lsn = snapshot.lsn(),
            "Installed snapshot"
        );
        Ok(snapshot)
    }

    /// Remove a collection; outstanding readers keep their snapshot
    pub fn drop_collection(&self, collection_id: Id) -> Option<ScopedSnapshot> {
        let mut inner = self.inner.write();
        let removed = inner.by_id.remove(&collection_id)?;
        if inner.name_to_id.get(removed.name()) == Some(&collection_id) {
            inner.name_to_id.remove(removed.name());
        }
        Some(removed)
    }

    /// Whether any current snapshot reaches `(kind, id)`
    pub fn references(&self, kind: ResourceKind, id: Id) -> bool {
        self.inner
            .read()
            .by_id
            .values()
            .any(|snap| snap.contains(kind, id))
    }

    /// Whether a collection with this name is registered
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.read().name_to_id.contains_key(name)
    }

    /// Registered collection names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().name_to_id.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every current snapshot, ordered by collection id
    pub fn all(&self) -> Vec<ScopedSnapshot> {
        let mut snaps: Vec<ScopedSnapshot> = self.inner.read().by_id.values().cloned().collect();
        snaps.sort_by_key(|s| s.collection_id());
        snaps
    }

    /// Number of registered collections
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Whether no collection is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every collection
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.name_to_id.clear();
    }
}
