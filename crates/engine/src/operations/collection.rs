//! Collection lifecycle operations

use super::{
    impl_operation, require_latest, CommitTxn, Execute, Lane, OperationBase, OperationType,
    Outcome,
};
use crate::catalog::Catalog;
use crate::context::{CreateCollectionContext, OperationContext};
use std::sync::Arc;
use tracing::info;
use vecmeta_concurrency::ScopedSnapshot;
use vecmeta_core::{
    CollectionCommit, FieldCommit, Mappings, MetaError, Partition, PartitionCommit, ResourceKind,
    Result, SchemaCommit, DEFAULT_PARTITION_NAME,
};

/// Create a collection with its schema, an empty `_default` partition and
/// its first commit
pub struct CreateCollectionOperation {
    base: OperationBase,
    context: CreateCollectionContext,
}

impl CreateCollectionOperation {
    /// Stage a new operation
    pub fn new(catalog: &Arc<Catalog>, context: CreateCollectionContext) -> Self {
        let lsn = OperationContext::new(context.lsn);
        CreateCollectionOperation {
            base: OperationBase::new(OperationType::CreateCollection, catalog, lsn, None),
            context,
        }
    }
}

impl Execute for CreateCollectionOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn lane(&self) -> Result<Lane> {
        Ok(Lane::Names)
    }

    fn validate(&self) -> Result<()> {
        self.context.validate()
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        _latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let catalog = self.base.catalog();
        let name = &self.context.collection.name;
        if catalog.snapshots().contains_name(name) {
            return Err(MetaError::already_exists(format!("collection '{}'", name)));
        }

        let mut collection = self.context.collection.clone();
        collection.id = 0;
        let collection = txn.write(collection)?;
        let cid = collection.id;

        let mut field_commits = Mappings::new();
        for schema in &self.context.fields {
            let mut field = schema.field.clone();
            field.id = 0;
            field.collection_id = cid;
            let field = txn.write(field)?;

            let mut elements = Mappings::new();
            for element in &schema.elements {
                let mut element = element.clone();
                element.id = 0;
                element.collection_id = cid;
                element.field_id = field.id;
                elements.insert(txn.write(element)?.id);
            }
            let fc = txn.write(FieldCommit::new(cid, field.id, elements))?;
            field_commits.insert(fc.id);
        }
        let schema = txn.write(SchemaCommit::new(cid, field_commits))?;

        let partition = txn.write(Partition::new(DEFAULT_PARTITION_NAME, cid))?;
        let pc = txn.write(PartitionCommit::new(cid, partition.id, Mappings::new()))?;
        let root = txn.write(CollectionCommit::new(
            cid,
            schema.id,
            Mappings::from([pc.id]),
        ))?;

        info!(
            target: "vecmeta::op",
            collection = %collection.name,
            id = cid,
            fields = self.context.fields.len(),
            lsn = collection.lsn,
            "Created collection"
        );
        Ok(Outcome::Committed(root))
    }
}

/// Drop a collection and retire its whole tree
///
/// Readers holding a snapshot of the collection keep it; new lookups by name
/// or id fail with `NotFound`.
pub struct DropCollectionOperation {
    base: OperationBase,
}

impl DropCollectionOperation {
    /// Stage against `parent`
    pub fn new(catalog: &Arc<Catalog>, context: OperationContext, parent: ScopedSnapshot) -> Self {
        DropCollectionOperation {
            base: OperationBase::new(OperationType::DropCollection, catalog, context, Some(parent)),
        }
    }
}

impl Execute for DropCollectionOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn lane(&self) -> Result<Lane> {
        Ok(Lane::NamesAndCollection(self.base.parent()?.collection_id()))
    }

    fn execute(
        &mut self,
        _txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let cid = self.base.parent()?.collection_id();
        let latest = require_latest(latest, cid)?;
        // Recovery skips collections whose record is soft-deleted
        self.base
            .catalog()
            .store()
            .soft_delete(ResourceKind::Collection, cid)?;
        info!(
            target: "vecmeta::op",
            collection = %latest.name(),
            id = cid,
            "Dropped collection"
        );
        Ok(Outcome::Dropped(cid))
    }
}

impl_operation!(CreateCollectionOperation, DropCollectionOperation);
