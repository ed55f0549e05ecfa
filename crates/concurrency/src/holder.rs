//! Resource holders
//!
//! One [`ResourceHolder`] per resource kind caches loaded records by id and
//! hands out [`Scoped`] pins. Entries stay cached after the last pin drops;
//! they leave the cache only when the garbage collector reclaims them.
//!
//! Loading and reclaiming both run under the DashMap shard lock of the id,
//! so a record can never be pinned in between "pin count is zero" and the
//! physical delete.

use crate::scoped::{HolderEntry, Scoped};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use vecmeta_core::{
    Collection, CollectionCommit, Field, FieldCommit, FieldElement, Id, MetaError, Partition,
    PartitionCommit, Resource, ResourceKind, Result, SchemaCommit, Segment, SegmentCommit,
    SegmentFile, Store, StoreExt,
};

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Result of a reclaim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaim {
    /// The delete callback ran and the cache entry (if any) is gone
    Reclaimed,
    /// A scoped handle still pins the record; nothing was done
    Pinned(usize),
}

/// Per-kind cache of loaded records
pub struct ResourceHolder<T: Resource> {
    entries: FxDashMap<Id, Arc<HolderEntry<T>>>,
    store: Arc<dyn Store>,
}

impl<T: Resource> ResourceHolder<T> {
    /// Create an empty holder reading from `store`
    pub fn new(store: Arc<dyn Store>) -> Self {
        ResourceHolder {
            entries: DashMap::with_hasher(Default::default()),
            store,
        }
    }

    /// Pin the record with `id`, loading it from the store on first access
    ///
    /// Soft-deleted records load too; only a missing record is `NotFound`.
    pub fn load(&self, id: Id) -> Result<Scoped<T>> {
        match self.entries.entry(id) {
            Entry::Occupied(slot) => Ok(Scoped::new(Arc::clone(slot.get()))),
            Entry::Vacant(slot) => {
                let resource: T = self.store.get_resource(id)?;
                let entry = Arc::new(HolderEntry::new(resource));
                let scoped = Scoped::new(Arc::clone(&entry));
                slot.insert(entry);
                Ok(scoped)
            }
        }
    }

    /// Pin a record only if it is already cached
    pub fn get_cached(&self, id: Id) -> Option<Scoped<T>> {
        self.entries.get(&id).map(|e| Scoped::new(Arc::clone(e.value())))
    }

    /// Pin count of `id` (0 if not cached)
    pub fn pin_count(&self, id: Id) -> usize {
        self.entries.get(&id).map(|e| e.value().pins()).unwrap_or(0)
    }

    /// Run `delete` and drop the cache entry, unless the record is pinned
    ///
    /// `delete` runs while the id's shard is locked, so no concurrent `load`
    /// can pin the record until it has finished.
    pub fn reclaim(&self, id: Id, delete: impl FnOnce() -> Result<()>) -> Result<Reclaim> {
        match self.entries.entry(id) {
            Entry::Occupied(slot) => {
                let pins = slot.get().pins();
                if pins > 0 {
                    return Ok(Reclaim::Pinned(pins));
                }
                delete()?;
                slot.remove();
                Ok(Reclaim::Reclaimed)
            }
            Entry::Vacant(_slot) => {
                delete()?;
                Ok(Reclaim::Reclaimed)
            }
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every unpinned entry; returns how many were dropped
    pub fn clear_unpinned(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.pins() > 0);
        before - self.entries.len()
    }
}

/// The full set of holders, one per resource kind
pub struct Holders {
    store: Arc<dyn Store>,
    collections: ResourceHolder<Collection>,
    fields: ResourceHolder<Field>,
    field_elements: ResourceHolder<FieldElement>,
    partitions: ResourceHolder<Partition>,
    segments: ResourceHolder<Segment>,
    segment_files: ResourceHolder<SegmentFile>,
    collection_commits: ResourceHolder<CollectionCommit>,
    schema_commits: ResourceHolder<SchemaCommit>,
    field_commits: ResourceHolder<FieldCommit>,
    partition_commits: ResourceHolder<PartitionCommit>,
    segment_commits: ResourceHolder<SegmentCommit>,
}

/// Resource types that have a holder
pub trait Held: Resource {
    /// The holder for this type
    fn holder(holders: &Holders) -> &ResourceHolder<Self>;
}

macro_rules! impl_held {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl Held for $ty {
                fn holder(holders: &Holders) -> &ResourceHolder<Self> {
                    &holders.$field
                }
            }
        )*

        impl Holders {
            /// Build empty holders over `store`
            pub fn new(store: Arc<dyn Store>) -> Self {
                Holders {
                    $($field: ResourceHolder::new(Arc::clone(&store)),)*
                    store,
                }
            }

            /// Pin count of a record of any kind
            pub fn pin_count(&self, kind: ResourceKind, id: Id) -> usize {
                match kind {
                    $(ResourceKind::$ty => self.$field.pin_count(id),)*
                }
            }

            /// Reclaim a record of any kind; see [`ResourceHolder::reclaim`]
            pub fn reclaim(
                &self,
                kind: ResourceKind,
                id: Id,
                delete: impl FnOnce() -> Result<()>,
            ) -> Result<Reclaim> {
                match kind {
                    $(ResourceKind::$ty => self.$field.reclaim(id, delete),)*
                }
            }

            /// Total number of cached entries across kinds
            pub fn cached_len(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            /// Drop every unpinned cache entry
            pub fn clear_unpinned(&self) -> usize {
                0 $(+ self.$field.clear_unpinned())*
            }
        }
    };
}

impl_held!(
    Collection => collections,
    Field => fields,
    FieldElement => field_elements,
    Partition => partitions,
    Segment => segments,
    SegmentFile => segment_files,
    CollectionCommit => collection_commits,
    SchemaCommit => schema_commits,
    FieldCommit => field_commits,
    PartitionCommit => partition_commits,
    SegmentCommit => segment_commits,
);

impl Holders {
    /// Pin a record through its holder
    pub fn load<T: Held>(&self, id: Id) -> Result<Scoped<T>> {
        T::holder(self).load(id)
    }

    /// Pin a record, mapping `NotFound` to a dangling-reference error from `parent`
    pub fn load_child<T: Held>(&self, parent: ResourceKind, parent_id: Id, id: Id) -> Result<Scoped<T>> {
        self.load(id).map_err(|e| match e {
            MetaError::NotFound(_) => MetaError::internal(format!(
                "{} {} references missing {} {}",
                parent,
                parent_id,
                T::KIND,
                id
            )),
            other => other,
        })
    }

    /// The store the holders read from
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

impl std::fmt::Debug for Holders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holders")
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}
