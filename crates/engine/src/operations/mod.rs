//! Operations
//!
//! An operation is built against a parent snapshot, stages proposals in
//! memory and publishes them with [`Operation::push`]. Push runs in the
//! collection's commit lane:
//!
//! 1. re-read the latest installed snapshot
//! 2. reject a stale parent (strict operations) or rebase onto the latest
//! 3. reject an lsn older than the latest snapshot's
//! 4. persist new records leaves first, then the commits above them, then
//!    the new root CollectionCommit
//! 5. load and install the new snapshot
//! 6. soft-delete what the old tree reached and the new one does not, and
//!    queue it for garbage collection
//!
//! If any step fails, every record written by the operation is soft-deleted
//! and queued for GC, and the registry is left untouched.

mod collection;
#[cfg(test)]
pub(crate) mod fixtures;
mod index;
mod partition;
mod segment;
mod soft_delete;

pub use collection::{CreateCollectionOperation, DropCollectionOperation};
pub use index::{AddFieldElementOperation, DropAllIndexOperation, DropIndexOperation};
pub use partition::{CreatePartitionOperation, DropPartitionOperation};
pub use segment::{BuildOperation, MergeOperation, NewSegmentOperation};
pub use soft_delete::SoftDeleteOperation;

use crate::catalog::Catalog;
use crate::commit::CommitTxn;
use crate::context::OperationContext;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use vecmeta_concurrency::{ScopedSnapshot, Snapshot};
use vecmeta_core::{CollectionCommit, Id, Lsn, MetaError, ResourceKind, Result};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Create a collection with its schema
    CreateCollection,
    /// Drop a collection and its subtree
    DropCollection,
    /// Add partitions
    CreatePartition,
    /// Remove a partition
    DropPartition,
    /// Add a segment and its files
    NewSegment,
    /// Attach an index file to a segment
    Build,
    /// Replace segments by one merged segment
    Merge,
    /// Remove one index element and its files
    DropIndex,
    /// Remove every index element (optionally of one field)
    DropAllIndex,
    /// Attach an element to a field
    AddFieldElement,
    /// Soft-delete one unreachable record
    SoftDelete,
}

impl OperationType {
    /// Stable name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::CreateCollection => "CreateCollection",
            OperationType::DropCollection => "DropCollection",
            OperationType::CreatePartition => "CreatePartition",
            OperationType::DropPartition => "DropPartition",
            OperationType::NewSegment => "NewSegment",
            OperationType::Build => "Build",
            OperationType::Merge => "Merge",
            OperationType::DropIndex => "DropIndex",
            OperationType::DropAllIndex => "DropAllIndex",
            OperationType::AddFieldElement => "AddFieldElement",
            OperationType::SoftDelete => "SoftDelete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Accepting proposals
    Staging,
    /// Handed to the executor
    Pushed,
    /// Committed
    Done,
    /// Push failed; nothing was published
    Failed,
    /// Cancelled before push
    Cancelled,
}

/// A staged mutation of one collection
pub trait Operation: Send {
    /// Kind of the operation
    fn op_type(&self) -> OperationType;

    /// Id unique within the process
    fn id(&self) -> u64;

    /// Current lifecycle state
    fn state(&self) -> OperationState;

    /// Upstream WAL position carried by the operation
    fn lsn(&self) -> Lsn;

    /// Commit the staged proposals
    ///
    /// # Errors
    ///
    /// `StaleSnapshot` if the parent was superseded and the operation cannot
    /// be rebased, `Cancelled` after [`Operation::cancel`], and any
    /// validation or store error.
    fn push(&mut self) -> Result<()>;

    /// Snapshot published by a successful push
    fn snapshot(&self) -> Result<ScopedSnapshot>;

    /// Abandon the operation before push
    fn cancel(&mut self) -> Result<()>;

    /// Records written by a successful push, in write order
    fn written(&self) -> &[(ResourceKind, Id)];
}

/// Result of running an operation against the latest snapshot
pub(crate) enum Outcome {
    /// A new root was written and must be installed
    Committed(CollectionCommit),
    /// Nothing to publish; the latest snapshot (if any) stays current
    Unchanged(Option<ScopedSnapshot>),
    /// The collection was dropped
    Dropped(Id),
}

/// Which locks a commit needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    /// Name lock only (new collections)
    Names,
    /// The collection's commit lane
    Collection(Id),
    /// Name lock, then the collection's lane
    NamesAndCollection(Id),
}

/// State shared by every operation
pub(crate) struct OperationBase {
    id: u64,
    op_type: OperationType,
    catalog: Arc<Catalog>,
    context: OperationContext,
    parent: Option<ScopedSnapshot>,
    state: OperationState,
    result: Option<ScopedSnapshot>,
    written: Vec<(ResourceKind, Id)>,
}

impl OperationBase {
    pub(crate) fn new(
        op_type: OperationType,
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: Option<ScopedSnapshot>,
    ) -> Self {
        OperationBase {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            op_type,
            catalog: Arc::clone(catalog),
            context,
            parent,
            state: OperationState::Staging,
            result: None,
            written: Vec::new(),
        }
    }

    pub(crate) fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub(crate) fn lsn(&self) -> Lsn {
        self.context.lsn
    }

    /// The parent snapshot; every operation except CreateCollection has one
    pub(crate) fn parent(&self) -> Result<&ScopedSnapshot> {
        self.parent
            .as_ref()
            .ok_or_else(|| MetaError::internal(format!("{} has no parent snapshot", self.op_type)))
    }

    pub(crate) fn ensure_staging(&self) -> Result<()> {
        match self.state {
            OperationState::Staging => Ok(()),
            OperationState::Cancelled => Err(MetaError::Cancelled(format!(
                "{} operation {}",
                self.op_type, self.id
            ))),
            state => Err(MetaError::invalid_argument(format!(
                "{} operation {} is {:?}, not staging",
                self.op_type, self.id, state
            ))),
        }
    }

    pub(crate) fn snapshot(&self) -> Result<ScopedSnapshot> {
        match (self.state, &self.result) {
            (OperationState::Done, Some(snapshot)) => Ok(Arc::clone(snapshot)),
            (OperationState::Done, None) => Err(MetaError::not_found(format!(
                "{} operation {} published no snapshot",
                self.op_type, self.id
            ))),
            (state, _) => Err(MetaError::invalid_argument(format!(
                "{} operation {} is {:?}",
                self.op_type, self.id, state
            ))),
        }
    }

    pub(crate) fn cancel(&mut self) -> Result<()> {
        self.ensure_staging()?;
        self.state = OperationState::Cancelled;
        debug!(target: "vecmeta::op", op = %self.op_type, id = self.id, "Cancelled");
        Ok(())
    }
}

/// The per-operation part of the commit protocol
pub(crate) trait Execute {
    fn base(&self) -> &OperationBase;

    fn base_mut(&mut self) -> &mut OperationBase;

    /// Locks the commit runs under
    fn lane(&self) -> Result<Lane> {
        Ok(Lane::Collection(self.base().parent()?.collection_id()))
    }

    /// Check staged input before any lock is taken
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Write the operation's records against `latest`
    fn execute(&mut self, txn: &mut CommitTxn<'_>, latest: Option<&ScopedSnapshot>)
        -> Result<Outcome>;
}

/// The latest snapshot an operation needs, or `NotFound`
pub(crate) fn require_latest<'a>(
    latest: Option<&'a ScopedSnapshot>,
    collection_id: Id,
) -> Result<&'a ScopedSnapshot> {
    latest.ok_or_else(|| MetaError::resource_not_found(ResourceKind::Collection, collection_id))
}

/// `StaleSnapshot` unless `latest` is still `parent`
pub(crate) fn ensure_current(parent: &Snapshot, latest: &Snapshot) -> Result<()> {
    if parent.commit_id() != latest.commit_id() {
        return Err(MetaError::StaleSnapshot {
            collection_id: latest.collection_id(),
            parent: parent.commit_id(),
            current: latest.commit_id(),
        });
    }
    Ok(())
}

pub(crate) fn push_operation<O: Execute + ?Sized>(op: &mut O) -> Result<()> {
    op.base().ensure_staging()?;
    op.base_mut().state = OperationState::Pushed;

    let catalog = Arc::clone(op.base().catalog());
    let result = catalog
        .ensure_open()
        .and_then(|_| op.validate())
        .and_then(|_| op.lane())
        .and_then(|lane| {
            let executor = catalog.executor();
            let published = match lane {
                Lane::Names => executor.run_with_names(|| commit(op, &catalog, None)),
                Lane::Collection(cid) => executor.run_in_lane(cid, || commit(op, &catalog, Some(cid))),
                Lane::NamesAndCollection(cid) => {
                    executor.run_with_names_in_lane(cid, || commit(op, &catalog, Some(cid)))
                }
            };
            if let (Ok(Published::Dropped(cid)), Lane::NamesAndCollection(_)) = (&published, lane) {
                executor.retire(*cid);
            }
            published
        });

    let base = op.base_mut();
    match result {
        Ok(published) => {
            base.state = OperationState::Done;
            base.result = match published {
                Published::Snapshot(snapshot) => Some(snapshot),
                Published::Nothing | Published::Dropped(_) => None,
            };
            Ok(())
        }
        Err(e) => {
            base.state = OperationState::Failed;
            if e.is_stale() {
                debug!(target: "vecmeta::op", op = %base.op_type, id = base.id, error = %e, "Rejected stale operation");
            } else {
                warn!(target: "vecmeta::op", op = %base.op_type, id = base.id, error = %e, "Operation failed");
            }
            Err(e)
        }
    }
}

enum Published {
    Snapshot(ScopedSnapshot),
    Nothing,
    Dropped(Id),
}

/// Runs inside the lane
fn commit<O: Execute + ?Sized>(
    op: &mut O,
    catalog: &Catalog,
    collection_id: Option<Id>,
) -> Result<Published> {
    let lsn = op.base().lsn();
    let latest = match collection_id {
        Some(cid) => catalog.snapshots().get_by_id(cid).ok(),
        None => None,
    };
    if let Some(latest) = &latest {
        if lsn < latest.lsn() {
            return Err(MetaError::invalid_argument(format!(
                "lsn {} is older than lsn {} of collection '{}'",
                lsn,
                latest.lsn(),
                latest.name()
            )));
        }
    }

    let mut txn = CommitTxn::new(catalog.store().as_ref(), lsn);
    let published = op
        .execute(&mut txn, latest.as_ref())
        .and_then(|outcome| publish(catalog, outcome, latest.as_ref()));
    match published {
        Ok(published) => {
            if let Published::Snapshot(snapshot) = &published {
                debug!(
                    target: "vecmeta::op",
                    op = %op.base().op_type,
                    id = op.base().id,
                    collection = %snapshot.name(),
                    commit = snapshot.commit_id(),
                    lsn,
                    written = txn.written().len(),
                    "Committed"
                );
            }
            op.base_mut().written = txn.into_written();
            Ok(published)
        }
        Err(e) => {
            rollback(catalog, op.base(), txn.into_written());
            Err(e)
        }
    }
}

fn publish(
    catalog: &Catalog,
    outcome: Outcome,
    latest: Option<&ScopedSnapshot>,
) -> Result<Published> {
    match outcome {
        Outcome::Committed(root) => {
            let snapshot = Snapshot::load(catalog.holders(), root.id)?;
            let installed = catalog.snapshots().install(snapshot)?;
            if let Some(previous) = latest {
                let current = installed.resource_ids();
                let superseded = previous
                    .resource_ids()
                    .into_iter()
                    .filter(|key| !current.contains(key));
                catalog.retire(superseded);
            }
            Ok(Published::Snapshot(installed))
        }
        Outcome::Unchanged(Some(snapshot)) => Ok(Published::Snapshot(snapshot)),
        Outcome::Unchanged(None) => Ok(Published::Nothing),
        Outcome::Dropped(collection_id) => {
            catalog.snapshots().drop_collection(collection_id);
            if let Some(previous) = latest {
                catalog.retire(previous.resource_ids());
            }
            Ok(Published::Dropped(collection_id))
        }
    }
}

fn rollback(catalog: &Catalog, base: &OperationBase, written: Vec<(ResourceKind, Id)>) {
    if written.is_empty() {
        return;
    }
    warn!(
        target: "vecmeta::op",
        op = %base.op_type,
        id = base.id,
        records = written.len(),
        "Rolling back partially written operation"
    );
    catalog.retire(written.into_iter().rev());
}

/// Implements [`Operation`] by delegating to `base` and [`push_operation`]
macro_rules! impl_operation {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::operations::Operation for $ty {
                fn op_type(&self) -> $crate::operations::OperationType {
                    self.base.op_type
                }

                fn id(&self) -> u64 {
                    self.base.id
                }

                fn state(&self) -> $crate::operations::OperationState {
                    self.base.state
                }

                fn lsn(&self) -> vecmeta_core::Lsn {
                    self.base.lsn()
                }

                fn push(&mut self) -> vecmeta_core::Result<()> {
                    $crate::operations::push_operation(self)
                }

                fn snapshot(&self) -> vecmeta_core::Result<vecmeta_concurrency::ScopedSnapshot> {
                    self.base.snapshot()
                }

                fn cancel(&mut self) -> vecmeta_core::Result<()> {
                    self.base.cancel()
                }

                fn written(&self) -> &[(vecmeta_core::ResourceKind, vecmeta_core::Id)] {
                    &self.base.written
                }
            }
        )*
    };
}

pub(crate) use impl_operation;
