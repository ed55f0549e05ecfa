//! Shared setup for operation tests

use super::{CreateCollectionOperation, CreatePartitionOperation, NewSegmentOperation, Operation};
use crate::catalog::Catalog;
use crate::context::{
    CreateCollectionContext, FieldSchema, OperationContext, PartitionContext, SegmentFileContext,
};
use std::sync::Arc;
use vecmeta_concurrency::ScopedSnapshot;
use vecmeta_core::{Field, FieldElementType, FieldType, Lsn, Segment};

/// "vector" (VECTOR + "ivfsq8") and "int" (INT32)
pub(crate) fn schema(name: &str, lsn: Lsn) -> CreateCollectionContext {
    CreateCollectionContext::new(name, lsn)
        .with_field(
            FieldSchema::new(Field::new("vector", 0, FieldType::Vector))
                .with_element("ivfsq8", FieldElementType::Ivfsq8),
        )
        .with_field(FieldSchema::new(Field::new("int", 1, FieldType::Int32)))
}

/// Like [`schema`] with an explicit "raw" element on "vector"
pub(crate) fn indexed_schema(name: &str, lsn: Lsn) -> CreateCollectionContext {
    CreateCollectionContext::new(name, lsn)
        .with_field(
            FieldSchema::new(Field::new("vector", 0, FieldType::Vector))
                .with_element("raw", FieldElementType::Raw)
                .with_element("ivfsq8", FieldElementType::Ivfsq8),
        )
        .with_field(FieldSchema::new(Field::new("int", 1, FieldType::Int32)))
}

pub(crate) fn create_collection(catalog: &Arc<Catalog>, name: &str, lsn: Lsn) -> ScopedSnapshot {
    let mut op = CreateCollectionOperation::new(catalog, schema(name, lsn));
    op.push().unwrap();
    op.snapshot().unwrap()
}

pub(crate) fn create_indexed_collection(
    catalog: &Arc<Catalog>,
    name: &str,
    lsn: Lsn,
) -> ScopedSnapshot {
    let mut op = CreateCollectionOperation::new(catalog, indexed_schema(name, lsn));
    op.push().unwrap();
    op.snapshot().unwrap()
}

pub(crate) fn create_partition(
    catalog: &Arc<Catalog>,
    parent: &ScopedSnapshot,
    name: &str,
    lsn: Lsn,
) -> ScopedSnapshot {
    let mut op =
        CreatePartitionOperation::new(catalog, OperationContext::new(lsn), Arc::clone(parent));
    op.commit_new_partition(PartitionContext::new(name)).unwrap();
    op.push().unwrap();
    op.snapshot().unwrap()
}

/// New segment of `rows` rows in `partition` with one file of `size` bytes
/// per named element of "vector"
pub(crate) fn add_segment(
    catalog: &Arc<Catalog>,
    parent: &ScopedSnapshot,
    partition: &str,
    rows: u64,
    elements: &[&str],
    size: u64,
    lsn: Lsn,
) -> (ScopedSnapshot, Segment) {
    let mut op = NewSegmentOperation::new(catalog, OperationContext::new(lsn), Arc::clone(parent));
    let segment = op.commit_new_segment(partition, rows).unwrap();
    for element in elements {
        op.commit_new_segment_file(
            SegmentFileContext::new("vector", *element).with_stats(size, rows),
        )
        .unwrap();
    }
    op.push().unwrap();
    (op.snapshot().unwrap(), segment)
}
