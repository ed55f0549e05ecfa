//! Index element operations
//!
//! An index is a [`FieldElement`] of an index type together with the
//! segment files built for it. Dropping an index removes both; adding an
//! element only extends the schema, files follow through `Build`.

use super::{
    impl_operation, require_latest, CommitTxn, Execute, OperationBase, OperationType, Outcome,
};
use crate::catalog::Catalog;
use crate::commit::CommitPlan;
use crate::context::OperationContext;
use std::sync::Arc;
use tracing::info;
use vecmeta_concurrency::{ScopedSnapshot, Snapshot};
use vecmeta_core::{FieldElement, FieldElementType, Id, MetaError, Result, SegmentFile};

/// Stage removal of an element and every file built for it
fn drop_element(plan: &mut CommitPlan, snapshot: &Snapshot, element_id: Id) -> usize {
    plan.drop_element(element_id);
    let mut files = 0;
    for file in snapshot.get_resources::<SegmentFile>() {
        if file.field_element_id == element_id {
            plan.drop_file(file.id);
            files += 1;
        }
    }
    files
}

/// Drop one index element of a field
pub struct DropIndexOperation {
    base: OperationBase,
    field_name: String,
    element_name: String,
}

impl DropIndexOperation {
    /// Stage against `parent`
    pub fn new(
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: ScopedSnapshot,
        field_name: impl Into<String>,
        element_name: impl Into<String>,
    ) -> Self {
        DropIndexOperation {
            base: OperationBase::new(OperationType::DropIndex, catalog, context, Some(parent)),
            field_name: field_name.into(),
            element_name: element_name.into(),
        }
    }
}

impl Execute for DropIndexOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let latest = require_latest(latest, self.base.parent()?.collection_id())?;
        let element = latest.get_field_element(&self.field_name, &self.element_name)?;
        if element.element_type == FieldElementType::Raw {
            return Err(MetaError::invalid_argument(format!(
                "raw element '{}' of field '{}' cannot be dropped",
                self.element_name, self.field_name
            )));
        }

        let mut plan = CommitPlan::default();
        let files = drop_element(&mut plan, latest, element.id);
        info!(
            target: "vecmeta::op",
            collection = %latest.name(),
            field = %self.field_name,
            element = %self.element_name,
            files,
            "Dropping index"
        );
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

/// Drop every index element, optionally of one field only
///
/// Publishes nothing when there is no index to drop.
pub struct DropAllIndexOperation {
    base: OperationBase,
    field_name: Option<String>,
}

impl DropAllIndexOperation {
    /// Stage against `parent`
    pub fn new(
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: ScopedSnapshot,
        field_name: Option<String>,
    ) -> Self {
        DropAllIndexOperation {
            base: OperationBase::new(OperationType::DropAllIndex, catalog, context, Some(parent)),
            field_name,
        }
    }
}

impl Execute for DropAllIndexOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let latest = require_latest(latest, self.base.parent()?.collection_id())?;
        let field_id = match &self.field_name {
            Some(name) => Some(latest.get_field(name)?.id),
            None => None,
        };

        let mut plan = CommitPlan::default();
        let mut elements = 0;
        let mut files = 0;
        for element in latest.get_resources::<FieldElement>() {
            if !element.element_type.is_index() || field_id.map_or(false, |id| id != element.field_id) {
                continue;
            }
            files += drop_element(&mut plan, latest, element.id);
            elements += 1;
        }
        if elements == 0 {
            return Ok(Outcome::Unchanged(Some(Arc::clone(latest))));
        }
        info!(
            target: "vecmeta::op",
            collection = %latest.name(),
            elements,
            files,
            "Dropping all indexes"
        );
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

/// Attach a new element to an existing field
pub struct AddFieldElementOperation {
    base: OperationBase,
    field_name: String,
    element: FieldElement,
}

impl AddFieldElementOperation {
    /// `element` ids are ignored and assigned on push
    pub fn new(
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: ScopedSnapshot,
        field_name: impl Into<String>,
        element: FieldElement,
    ) -> Self {
        AddFieldElementOperation {
            base: OperationBase::new(OperationType::AddFieldElement, catalog, context, Some(parent)),
            field_name: field_name.into(),
            element,
        }
    }

    /// The element; carries its assigned id after a successful push
    pub fn element(&self) -> &FieldElement {
        &self.element
    }
}

impl Execute for AddFieldElementOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        if self.element.name.trim().is_empty() {
            return Err(MetaError::invalid_argument("field element name is empty"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let latest = require_latest(latest, self.base.parent()?.collection_id())?;
        let field = latest.get_field(&self.field_name)?;
        if latest
            .get_field_element(&self.field_name, &self.element.name)
            .is_ok()
        {
            return Err(MetaError::already_exists(format!(
                "field element '{}' on field '{}'",
                self.element.name, self.field_name
            )));
        }

        let mut element = self.element.clone();
        element.id = 0;
        element.collection_id = latest.collection_id();
        element.field_id = field.id;
        let element = txn.write(element)?;

        let mut plan = CommitPlan::default();
        plan.add_element(element.clone());
        let root = plan.apply(txn, latest)?;
        self.element = element;
        Ok(Outcome::Committed(root))
    }
}

impl_operation!(DropIndexOperation, DropAllIndexOperation, AddFieldElementOperation);
