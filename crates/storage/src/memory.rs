//! Sharded in-memory store
//!
//! Each resource kind gets its own table: a DashMap of records keyed by id
//! plus an atomic id allocator. Tables are created once at construction and
//! never added or removed, so the outer map is read without locking.
//!
//! Records are never edited after `put`; only their lifecycle state moves
//! from `Active` to `SoftDeleted`, and then the record is removed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace, warn};
use vecmeta_core::{
    Id, MetaError, RecordState, ResourceKind, ResourceRecord, Result, Store, StoredRecord,
};

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Records and id allocator for one resource kind
#[derive(Debug)]
struct KindTable {
    /// Next id to hand out; ids start at 1 so 0 can mean "unallocated"
    next_id: AtomicU64,
    records: FxDashMap<Id, StoredRecord>,
}

impl KindTable {
    fn new() -> Self {
        KindTable {
            next_id: AtomicU64::new(1),
            records: DashMap::with_hasher(Default::default()),
        }
    }

    /// Ensure future allocations are strictly above `id`
    fn bump(&self, id: Id) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    /// Hand out the next id; `Id::MAX` is never allocated
    fn allocate(&self, kind: ResourceKind) -> Result<Id> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| {
                error!(target: "vecmeta::store", %kind, "Id space exhausted");
                MetaError::internal(format!("id space of {} exhausted", kind))
            })
    }
}

/// In-memory append-only store
///
/// Thread-safe: all operations take at most one shard lock of one kind.
#[derive(Debug)]
pub struct MemoryStore {
    tables: FxHashMap<ResourceKind, KindTable>,
}

impl MemoryStore {
    /// Create an empty store with a table for every kind
    pub fn new() -> Self {
        let mut tables = FxHashMap::default();
        for kind in ResourceKind::ALL {
            tables.insert(kind, KindTable::new());
        }
        MemoryStore { tables }
    }

    fn table(&self, kind: ResourceKind) -> Result<&KindTable> {
        self.tables
            .get(&kind)
            .ok_or_else(|| MetaError::internal(format!("no table for kind {}", kind)))
    }

    /// Whether a record exists (live or soft-deleted)
    pub fn contains(&self, kind: ResourceKind, id: Id) -> bool {
        self.tables
            .get(&kind)
            .map(|t| t.records.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of records of `kind` (live and soft-deleted)
    pub fn len(&self, kind: ResourceKind) -> usize {
        self.tables.get(&kind).map(|t| t.records.len()).unwrap_or(0)
    }

    /// Whether the store holds no records at all
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|t| t.records.is_empty())
    }

    /// Highest id ever allocated or observed for `kind` (0 if none)
    pub fn watermark(&self, kind: ResourceKind) -> Id {
        self.tables
            .get(&kind)
            .map(|t| t.next_id.load(Ordering::SeqCst) - 1)
            .unwrap_or(0)
    }

    // ========================================================================
    // Replay hooks
    // ========================================================================

    /// Insert or overwrite a record with an explicit state, bypassing conflict checks
    ///
    /// Used when rebuilding state from a log; also advances the allocator.
    pub fn restore(&self, record: ResourceRecord, state: RecordState) -> Result<()> {
        let table = self.table(record.kind())?;
        let id = record.id();
        table.bump(id);
        table.records.insert(id, StoredRecord { record, state });
        Ok(())
    }

    /// Remove a record regardless of state, returning whether it existed
    pub fn remove(&self, kind: ResourceKind, id: Id) -> Result<bool> {
        Ok(self.table(kind)?.records.remove(&id).is_some())
    }

    /// Advance the allocator of `kind` past `id`
    pub fn bump_watermark(&self, kind: ResourceKind, id: Id) -> Result<()> {
        self.table(kind)?.bump(id);
        Ok(())
    }

    /// Copy of every record of `kind` with its state, in id order
    pub fn dump(&self, kind: ResourceKind) -> Result<Vec<StoredRecord>> {
        let table = self.table(kind)?;
        let mut out: Vec<StoredRecord> = table.records.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.record.id());
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn allocate_id(&self, kind: ResourceKind) -> Result<Id> {
        self.table(kind)?.allocate(kind)
    }

    fn put(&self, record: ResourceRecord) -> Result<()> {
        let kind = record.kind();
        let id = record.id();
        if id == 0 {
            return Err(MetaError::invalid_argument(format!(
                "cannot put {} without an allocated id",
                kind
            )));
        }
        let table = self.table(kind)?;
        match table.records.entry(id) {
            Entry::Occupied(_) => {
                warn!(target: "vecmeta::store", %kind, id, "Rejected put of an existing id");
                Err(MetaError::Conflict { kind, id })
            }
            Entry::Vacant(slot) => {
                table.bump(id);
                slot.insert(StoredRecord {
                    record,
                    state: RecordState::Active,
                });
                Ok(())
            }
        }
    }

    fn get(&self, kind: ResourceKind, id: Id) -> Result<StoredRecord> {
        self.table(kind)?
            .records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| MetaError::resource_not_found(kind, id))
    }

    fn scan(
        &self,
        kind: ResourceKind,
        filter: &dyn Fn(&ResourceRecord) -> bool,
    ) -> Result<Vec<ResourceRecord>> {
        let table = self.table(kind)?;
        let mut out: Vec<ResourceRecord> = table
            .records
            .iter()
            .filter(|e| e.value().state == RecordState::Active && filter(&e.value().record))
            .map(|e| e.value().record.clone())
            .collect();
        out.sort_by_key(|r| r.id());
        Ok(out)
    }

    fn soft_delete(&self, kind: ResourceKind, id: Id) -> Result<()> {
        let table = self.table(kind)?;
        match table.records.get_mut(&id) {
            Some(mut entry) => {
                entry.state = RecordState::SoftDeleted;
                Ok(())
            }
            None => Err(MetaError::resource_not_found(kind, id)),
        }
    }

    fn hard_delete(&self, kind: ResourceKind, id: Id) -> Result<()> {
        let table = self.table(kind)?;
        match table.records.entry(id) {
            Entry::Occupied(slot) => {
                if slot.get().state != RecordState::SoftDeleted {
                    return Err(MetaError::invalid_argument(format!(
                        "{} {} is active and cannot be hard-deleted",
                        kind, id
                    )));
                }
                slot.remove();
                trace!(target: "vecmeta::store", %kind, id, "Hard-deleted record");
                Ok(())
            }
            Entry::Vacant(_) => Err(MetaError::resource_not_found(kind, id)),
        }
    }

    fn soft_deleted_ids(&self, kind: ResourceKind) -> Result<Vec<Id>> {
        let table = self.table(kind)?;
        let mut ids: Vec<Id> = table
            .records
            .iter()
            .filter(|e| e.value().state == RecordState::SoftDeleted)
            .map(|e| *e.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    static_assertions::assert_impl_all!(super::MemoryStore: Send, Sync);

    use super::*;
    use vecmeta_core::{Collection, ErrorKind, Partition, Resource, StoreExt};

    fn collection(store: &MemoryStore, name: &str) -> Collection {
        let mut c = Collection::new(name);
        store.allocate(&mut c).unwrap();
        c
    }

    #[test]
    fn test_allocate_is_monotonic_per_kind() {
        let store = MemoryStore::new();
        let a = store.allocate_id(ResourceKind::Segment).unwrap();
        let b = store.allocate_id(ResourceKind::Segment).unwrap();
        let c = store.allocate_id(ResourceKind::Partition).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, 1);
    }

    #[test]
    fn test_allocator_stops_at_id_space_end() {
        let store = MemoryStore::new();
        store.bump_watermark(ResourceKind::Segment, Id::MAX).unwrap();
        let err = store.allocate_id(ResourceKind::Segment).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let mut c = Collection::new("edge");
        c.id = Id::MAX - 1;
        store.restore(c.into_record(), RecordState::Active).unwrap();
        assert_eq!(
            store.allocate_id(ResourceKind::Collection).unwrap_err().kind(),
            ErrorKind::Internal
        );
        assert_eq!(store.allocate_id(ResourceKind::Partition).unwrap(), 1);
    }

    #[test]
    fn test_put_get() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();
        let back: Collection = store.get_resource(c.id).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_put_duplicate_is_conflict() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();
        let err = store.put_resource(c).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_put_without_id_rejected() {
        let store = MemoryStore::new();
        let err = store.put_resource(Collection::new("c")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(ResourceKind::Segment, 42).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_soft_deleted_remains_readable_but_not_scanned() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();
        store.soft_delete(ResourceKind::Collection, c.id).unwrap();

        let stored = store.get(ResourceKind::Collection, c.id).unwrap();
        assert!(stored.is_soft_deleted());
        assert!(store
            .scan(ResourceKind::Collection, &|_| true)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.soft_deleted_ids(ResourceKind::Collection).unwrap(),
            vec![c.id]
        );
    }

    #[test]
    fn test_soft_delete_is_idempotent() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();
        store.soft_delete(ResourceKind::Collection, c.id).unwrap();
        store.soft_delete(ResourceKind::Collection, c.id).unwrap();
    }

    #[test]
    fn test_hard_delete_requires_soft_delete() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();

        let err = store.hard_delete(ResourceKind::Collection, c.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        store.soft_delete(ResourceKind::Collection, c.id).unwrap();
        store.hard_delete(ResourceKind::Collection, c.id).unwrap();
        assert!(!store.contains(ResourceKind::Collection, c.id));

        let err = store.hard_delete(ResourceKind::Collection, c.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_ids_never_reused_after_hard_delete() {
        let store = MemoryStore::new();
        let c = collection(&store, "c");
        store.put_resource(c.clone()).unwrap();
        store.soft_delete(ResourceKind::Collection, c.id).unwrap();
        store.hard_delete(ResourceKind::Collection, c.id).unwrap();
        let next = store.allocate_id(ResourceKind::Collection).unwrap();
        assert!(next > c.id);
    }

    #[test]
    fn test_scan_filter_and_order() {
        let store = MemoryStore::new();
        for name in ["p3", "p1", "p2"] {
            let mut p = Partition::new(name, 7);
            store.allocate(&mut p).unwrap();
            store.put_resource(p).unwrap();
        }
        let mut other = Partition::new("x", 8);
        store.allocate(&mut other).unwrap();
        store.put_resource(other).unwrap();

        let parts: Vec<Partition> = store.scan_resources(|p: &Partition| p.collection_id == 7).unwrap();
        let ids: Vec<_> = parts.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_restore_advances_allocator() {
        let store = MemoryStore::new();
        let mut c = Collection::new("c");
        c.id = 40;
        store
            .restore(c.into_record(), RecordState::SoftDeleted)
            .unwrap();
        assert_eq!(store.watermark(ResourceKind::Collection), 40);
        assert_eq!(store.allocate_id(ResourceKind::Collection).unwrap(), 41);
        assert!(store
            .get(ResourceKind::Collection, 40)
            .unwrap()
            .is_soft_deleted());
    }

    #[test]
    fn test_concurrent_allocation_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..500)
                        .map(|_| store.allocate_id(ResourceKind::SegmentFile).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
