//! Core traits for store abstraction
//!
//! This module defines the Store trait that lets the catalog swap the
//! in-memory store for the durable log-backed store (or a relational backend)
//! without touching upper layers (holders, snapshots, operations).
//!
//! A store is an append-only map keyed by `(ResourceKind, Id)`:
//! - records are never updated in place
//! - superseded records are soft-deleted and stay readable by id
//! - only soft-deleted records may be hard-deleted

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};
use crate::resource::{Resource, ResourceRecord};
use crate::types::{Id, ResourceKind};

/// Lifecycle state of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    /// Reachable (or about to be reachable) from a published snapshot
    Active,
    /// Superseded; candidate for garbage collection
    SoftDeleted,
}

/// A record together with its lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// The persisted record
    pub record: ResourceRecord,
    /// Current lifecycle state
    pub state: RecordState,
}

impl StoredRecord {
    /// Whether the record has been soft-deleted
    pub fn is_soft_deleted(&self) -> bool {
        self.state == RecordState::SoftDeleted
    }
}

/// Append-only persistence contract
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
///
/// Crash atomicity is required per `put`, not per batch: snapshot publication
/// only depends on the root CollectionCommit landing atomically.
pub trait Store: Send + Sync {
    /// Return a fresh id for `kind`, strictly greater than any id handed out before
    fn allocate_id(&self, kind: ResourceKind) -> Result<Id>;

    /// Persist an immutable record
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a record with the same kind and id exists
    /// (live or soft-deleted).
    fn put(&self, record: ResourceRecord) -> Result<()>;

    /// Fetch a record by id, live or soft-deleted
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist or was hard-deleted.
    fn get(&self, kind: ResourceKind, id: Id) -> Result<StoredRecord>;

    /// Live (not soft-deleted) records of `kind` accepted by `filter`, in id order
    fn scan(
        &self,
        kind: ResourceKind,
        filter: &dyn Fn(&ResourceRecord) -> bool,
    ) -> Result<Vec<ResourceRecord>>;

    /// Mark a record as superseded; idempotent
    fn soft_delete(&self, kind: ResourceKind, id: Id) -> Result<()>;

    /// Physically remove a soft-deleted record
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the record is still active and `NotFound`
    /// if it does not exist.
    fn hard_delete(&self, kind: ResourceKind, id: Id) -> Result<()>;

    /// Ids of soft-deleted records of `kind`, in id order
    fn soft_deleted_ids(&self, kind: ResourceKind) -> Result<Vec<Id>>;

    /// Push buffered writes to the backend
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Typed conveniences over [`Store`]
pub trait StoreExt: Store {
    /// Allocate an id for `resource` if it does not have one yet
    fn allocate<T: Resource>(&self, resource: &mut T) -> Result<()> {
        if resource.id() == 0 {
            resource.set_id(self.allocate_id(T::KIND)?);
        }
        Ok(())
    }

    /// Persist a typed record
    fn put_resource<T: Resource>(&self, resource: T) -> Result<()> {
        self.put(resource.into_record())
    }

    /// Fetch a typed record (live or soft-deleted)
    fn get_resource<T: Resource>(&self, id: Id) -> Result<T> {
        let stored = self.get(T::KIND, id)?;
        T::from_record(stored.record).ok_or_else(|| {
            MetaError::internal(format!("store returned wrong kind for {} {}", T::KIND, id))
        })
    }

    /// Live typed records accepted by `filter`, in id order
    fn scan_resources<T: Resource>(&self, filter: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        let records = self.scan(T::KIND, &|_| true)?;
        Ok(records
            .into_iter()
            .filter_map(T::from_record)
            .filter(|r| filter(r))
            .collect())
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
