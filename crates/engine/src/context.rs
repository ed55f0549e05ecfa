//! Operation inputs
//!
//! Contexts are plain values built by the caller and validated before any
//! state is touched. Validation failures are `InvalidArgument` and never
//! mutate the store or the registry.

use std::collections::BTreeSet;
use vecmeta_core::{
    Collection, Field, FieldElement, FieldElementType, Id, Lsn, MetaError, Params, Result,
};

/// Settings shared by every operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Upstream WAL position, stored verbatim on every record the operation writes
    pub lsn: Lsn,
}

impl OperationContext {
    /// Context carrying `lsn`
    pub fn new(lsn: Lsn) -> Self {
        OperationContext { lsn }
    }
}

/// One field of a new collection together with its elements
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field definition; id and collection id are assigned on commit
    pub field: Field,
    /// Elements attached to the field at creation
    pub elements: Vec<FieldElement>,
}

impl FieldSchema {
    /// Field with no elements
    pub fn new(field: Field) -> Self {
        FieldSchema {
            field,
            elements: Vec::new(),
        }
    }

    /// Attach an element named `name`
    pub fn with_element(mut self, name: impl Into<String>, element_type: FieldElementType) -> Self {
        self.elements.push(FieldElement::new(0, 0, name, element_type));
        self
    }
}

/// Input of [`CreateCollectionOperation`](crate::CreateCollectionOperation)
#[derive(Debug, Clone)]
pub struct CreateCollectionContext {
    /// The collection record; id is assigned on commit
    pub collection: Collection,
    /// Schema, in field order
    pub fields: Vec<FieldSchema>,
    /// Upstream WAL position
    pub lsn: Lsn,
}

impl CreateCollectionContext {
    /// Context for a collection named `name` with no fields yet
    pub fn new(name: impl Into<String>, lsn: Lsn) -> Self {
        CreateCollectionContext {
            collection: Collection::new(name),
            fields: Vec::new(),
            lsn,
        }
    }

    /// Append a field
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Reject empty names, a missing schema and duplicate names
    pub fn validate(&self) -> Result<()> {
        if self.collection.name.trim().is_empty() {
            return Err(MetaError::invalid_argument("collection name is empty"));
        }
        if self.fields.is_empty() {
            return Err(MetaError::invalid_argument(format!(
                "collection '{}' has no fields",
                self.collection.name
            )));
        }
        let mut field_names = BTreeSet::new();
        for schema in &self.fields {
            let name = schema.field.name.as_str();
            if name.trim().is_empty() {
                return Err(MetaError::invalid_argument("field name is empty"));
            }
            if !field_names.insert(name) {
                return Err(MetaError::invalid_argument(format!(
                    "duplicate field '{}'",
                    name
                )));
            }
            let mut element_names = BTreeSet::new();
            for element in &schema.elements {
                if element.name.trim().is_empty() {
                    return Err(MetaError::invalid_argument(format!(
                        "field '{}' has an element with an empty name",
                        name
                    )));
                }
                if !element_names.insert(element.name.as_str()) {
                    return Err(MetaError::invalid_argument(format!(
                        "duplicate element '{}' on field '{}'",
                        element.name, name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Names a partition to create or drop
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionContext {
    /// Partition name, unique within the collection
    pub name: String,
    /// Free-form partition parameters
    pub params: Params,
}

impl PartitionContext {
    /// Context for partition `name`
    pub fn new(name: impl Into<String>) -> Self {
        PartitionContext {
            name: name.into(),
            params: Params::new(),
        }
    }

    /// Attach parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MetaError::invalid_argument("partition name is empty"));
        }
        Ok(())
    }
}

/// Describes one segment file to attach
///
/// The field and element are named; they are resolved against the
/// operation's parent snapshot when the file is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFileContext {
    /// Field the file stores data for
    pub field_name: String,
    /// Element of that field (raw data or an index)
    pub field_element_name: String,
    /// Target segment; `None` means the segment staged by the same operation
    pub segment_id: Option<Id>,
    /// File size in bytes
    pub size: u64,
    /// Rows covered by the file
    pub row_count: u64,
}

impl SegmentFileContext {
    /// File of `field_name`/`field_element_name` for the staged segment
    pub fn new(field_name: impl Into<String>, field_element_name: impl Into<String>) -> Self {
        SegmentFileContext {
            field_name: field_name.into(),
            field_element_name: field_element_name.into(),
            segment_id: None,
            size: 0,
            row_count: 0,
        }
    }

    /// Target an existing segment
    pub fn for_segment(mut self, segment_id: Id) -> Self {
        self.segment_id = Some(segment_id);
        self
    }

    /// Set size and row count
    pub fn with_stats(mut self, size: u64, row_count: u64) -> Self {
        self.size = size;
        self.row_count = row_count;
        self
    }
}
