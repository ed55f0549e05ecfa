//! Generic soft delete

use super::{
    push_operation, require_latest, CommitTxn, Execute, Lane, Operation, OperationBase,
    OperationState, OperationType, Outcome,
};
use crate::catalog::Catalog;
use crate::context::OperationContext;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use vecmeta_concurrency::ScopedSnapshot;
use vecmeta_core::{Id, Lsn, MetaError, Resource, ResourceKind, Result, StoreExt};

/// Soft-delete one record and queue it for garbage collection
///
/// A record still reachable from the collection's current snapshot is
/// rejected with `InvalidArgument`; use the structural operations to
/// unlink it first. Soft-deleting a `Collection` drops the collection.
pub struct SoftDeleteOperation<T: Resource> {
    base: OperationBase,
    id: Id,
    collection_id: Id,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Resource> SoftDeleteOperation<T> {
    /// Target record `id` of type `T`
    pub fn new(catalog: &Arc<Catalog>, context: OperationContext, id: Id) -> Result<Self> {
        let record = catalog.store().get_resource::<T>(id)?;
        Ok(SoftDeleteOperation {
            base: OperationBase::new(OperationType::SoftDelete, catalog, context, None),
            id,
            collection_id: record.collection_id(),
            _kind: PhantomData,
        })
    }

    /// Id of the target record
    pub fn target(&self) -> (ResourceKind, Id) {
        (T::KIND, self.id)
    }
}

impl<T: Resource> Execute for SoftDeleteOperation<T> {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn lane(&self) -> Result<Lane> {
        match T::KIND {
            ResourceKind::Collection => Ok(Lane::NamesAndCollection(self.collection_id)),
            _ => Ok(Lane::Collection(self.collection_id)),
        }
    }

    fn execute(
        &mut self,
        _txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let catalog = self.base.catalog();
        if T::KIND == ResourceKind::Collection {
            require_latest(latest, self.collection_id)?;
            catalog.store().soft_delete(T::KIND, self.id)?;
            return Ok(Outcome::Dropped(self.collection_id));
        }

        if catalog.snapshots().references(T::KIND, self.id) {
            return Err(MetaError::invalid_argument(format!(
                "{} {} is referenced by the current snapshot",
                T::KIND,
                self.id
            )));
        }
        catalog.retire([(T::KIND, self.id)]);
        debug!(target: "vecmeta::op", kind = %T::KIND, id = self.id, "Soft-deleted record");
        Ok(Outcome::Unchanged(latest.cloned()))
    }
}

impl<T: Resource> Operation for SoftDeleteOperation<T> {
    fn op_type(&self) -> OperationType {
        self.base.op_type
    }

    fn id(&self) -> u64 {
        self.base.id
    }

    fn state(&self) -> OperationState {
        self.base.state
    }

    fn lsn(&self) -> Lsn {
        self.base.lsn()
    }

    fn push(&mut self) -> Result<()> {
        push_operation(self)
    }

    fn snapshot(&self) -> Result<ScopedSnapshot> {
        self.base.snapshot()
    }

    fn cancel(&mut self) -> Result<()> {
        self.base.cancel()
    }

    fn written(&self) -> &[(ResourceKind, Id)] {
        &self.base.written
    }
}
