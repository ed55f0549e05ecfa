//! Partition operations
//!
//! Both operations rebase onto the latest snapshot: a partition created or
//! dropped by someone else in between does not invalidate them as long as
//! the names still make sense.

use super::{
    impl_operation, require_latest, CommitTxn, Execute, OperationBase, OperationType, Outcome,
};
use crate::catalog::Catalog;
use crate::commit::CommitPlan;
use crate::context::{OperationContext, PartitionContext};
use std::sync::Arc;
use tracing::debug;
use vecmeta_concurrency::ScopedSnapshot;
use vecmeta_core::{
    MetaError, Partition, ResourceKind, Result, DEFAULT_PARTITION_NAME,
};

/// Add one or more partitions to a collection
pub struct CreatePartitionOperation {
    base: OperationBase,
    staged: Vec<Partition>,
}

impl CreatePartitionOperation {
    /// Stage against `parent`
    pub fn new(catalog: &Arc<Catalog>, context: OperationContext, parent: ScopedSnapshot) -> Self {
        CreatePartitionOperation {
            base: OperationBase::new(OperationType::CreatePartition, catalog, context, Some(parent)),
            staged: Vec::new(),
        }
    }

    /// Stage a partition; its id is allocated now, the record is written on push
    pub fn commit_new_partition(&mut self, context: PartitionContext) -> Result<Partition> {
        self.base.ensure_staging()?;
        context.validate()?;
        let parent = self.base.parent()?;
        if parent.has_partition(&context.name)
            || self.staged.iter().any(|p| p.name == context.name)
        {
            return Err(MetaError::already_exists(format!(
                "partition '{}' in collection '{}'",
                context.name,
                parent.name()
            )));
        }

        let mut partition = Partition::new(context.name, parent.collection_id());
        partition.params = context.params;
        partition.id = self.base.catalog().allocate_id(ResourceKind::Partition)?;
        self.staged.push(partition.clone());
        Ok(partition)
    }

    /// Partitions staged so far
    pub fn partitions(&self) -> &[Partition] {
        &self.staged
    }
}

impl Execute for CreatePartitionOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        if self.staged.is_empty() {
            return Err(MetaError::invalid_argument("no partition staged"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let latest = require_latest(latest, self.base.parent()?.collection_id())?;
        let mut plan = CommitPlan::default();
        for partition in &self.staged {
            if latest.has_partition(&partition.name) {
                return Err(MetaError::already_exists(format!(
                    "partition '{}' in collection '{}'",
                    partition.name,
                    latest.name()
                )));
            }
            plan.add_partition(txn.write(partition.clone())?);
        }
        debug!(
            target: "vecmeta::op",
            collection = %latest.name(),
            partitions = self.staged.len(),
            "Creating partitions"
        );
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

/// Remove a partition with all its segments
///
/// `_default` cannot be dropped.
pub struct DropPartitionOperation {
    base: OperationBase,
    context: PartitionContext,
}

impl DropPartitionOperation {
    /// Stage against `parent`
    pub fn new(
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: ScopedSnapshot,
        partition: PartitionContext,
    ) -> Self {
        DropPartitionOperation {
            base: OperationBase::new(OperationType::DropPartition, catalog, context, Some(parent)),
            context: partition,
        }
    }
}

impl Execute for DropPartitionOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        self.context.validate()?;
        if self.context.name == DEFAULT_PARTITION_NAME {
            return Err(MetaError::invalid_argument(format!(
                "partition '{}' cannot be dropped",
                DEFAULT_PARTITION_NAME
            )));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let latest = require_latest(latest, self.base.parent()?.collection_id())?;
        let partition = latest.get_partition(&self.context.name)?;
        let mut plan = CommitPlan::default();
        plan.drop_partition(partition.id);
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

impl_operation!(CreatePartitionOperation, DropPartitionOperation);
