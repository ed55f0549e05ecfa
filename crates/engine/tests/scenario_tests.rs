//! End-to-end scenarios for vecmeta-engine
//!
//! Each test walks one user-visible story through the public API:
//!
//! 1. **Create + enumerate** - schema round-trips through a snapshot
//! 2. **Partition lifecycle** - create/drop with an older snapshot kept alive
//! 3. **Segment append** - a segment with one index file
//! 4. **Stale operation** - a strict operation loses to an intervening commit
//! 5. **Drop index** - index files leave the tree and are collected
//! 6. **Drop collection** - old handles survive, new lookups fail
//!
//! The last group races rebased segment operations against schema changes.

use std::sync::Arc;
use std::time::Duration;

use vecmeta_concurrency::ScopedSnapshot;
use vecmeta_core::{
    ErrorKind, Field, FieldElementType, FieldType, RecordState, ResourceKind, Segment, SegmentFile,
};
use vecmeta_engine::{
    BuildOperation, Catalog, CreateCollectionContext, CreateCollectionOperation,
    CreatePartitionOperation, DropAllIndexOperation, DropCollectionOperation, DropIndexOperation,
    DropPartitionOperation, FieldSchema, MergeOperation, NewSegmentOperation, Operation,
    OperationContext, PartitionContext, SegmentFileContext,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_c(catalog: &Arc<Catalog>, raw: bool) {
    let mut vector = FieldSchema::new(Field::new("vector", 0, FieldType::Vector));
    if raw {
        vector = vector.with_element("raw", FieldElementType::Raw);
    }
    let context = CreateCollectionContext::new("C", 1)
        .with_field(vector.with_element("ivfsq8", FieldElementType::Ivfsq8))
        .with_field(FieldSchema::new(Field::new("int", 1, FieldType::Int32)));
    let mut op = CreateCollectionOperation::new(catalog, context);
    op.push().unwrap();
}

/// Two `_default` segments (100 and 200 rows) carrying `elements`, at lsn 2 and 3
fn add_segments(catalog: &Arc<Catalog>, elements: &[&str]) -> ScopedSnapshot {
    for (i, rows) in [100u64, 200].iter().enumerate() {
        let mut op = NewSegmentOperation::new(
            catalog,
            OperationContext::new(2 + i as u64),
            catalog.get_snapshot("C").unwrap(),
        );
        op.commit_new_segment("_default", *rows).unwrap();
        for element in elements {
            op.commit_new_segment_file(SegmentFileContext::new("vector", *element).with_stats(10, *rows))
                .unwrap();
        }
        op.push().unwrap();
    }
    catalog.get_snapshot("C").unwrap()
}

fn partitions(catalog: &Arc<Catalog>) -> Vec<String> {
    catalog.get_snapshot("C").unwrap().partition_names()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_create_and_enumerate() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, false);

    let snapshot = catalog.get_snapshot("C").unwrap();
    assert_eq!(snapshot.partition_names(), vec!["_default".to_string()]);
    assert_eq!(snapshot.field_names().len(), 2);

    let vector = snapshot.get_field("vector").unwrap();
    assert_eq!(vector.field_type, FieldType::Vector);
    let elements = snapshot.get_field_elements(vector.id).unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].name, "ivfsq8");
    assert_eq!(elements[0].element_type, FieldElementType::Ivfsq8);

    let int = snapshot.get_field("int").unwrap();
    assert_eq!(int.field_type, FieldType::Int32);
    assert!(snapshot.get_field_elements(int.id).unwrap().is_empty());
}

#[test]
fn test_partition_lifecycle() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, false);

    let mut create = CreatePartitionOperation::new(
        &catalog,
        OperationContext::new(2),
        catalog.get_snapshot("C").unwrap(),
    );
    create.commit_new_partition(PartitionContext::new("P1")).unwrap();
    create.push().unwrap();
    let after_create = create.snapshot().unwrap();
    assert_eq!(partitions(&catalog), vec!["P1".to_string(), "_default".to_string()]);

    let mut drop_op = DropPartitionOperation::new(
        &catalog,
        OperationContext::new(3),
        catalog.get_snapshot("C").unwrap(),
        PartitionContext::new("P1"),
    );
    drop_op.push().unwrap();
    assert_eq!(partitions(&catalog), vec!["_default".to_string()]);

    assert_eq!(
        after_create.partition_names(),
        vec!["P1".to_string(), "_default".to_string()]
    );
}

#[test]
fn test_segment_append() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, false);
    let mut create = CreatePartitionOperation::new(
        &catalog,
        OperationContext::new(2),
        catalog.get_snapshot("C").unwrap(),
    );
    create.commit_new_partition(PartitionContext::new("P1")).unwrap();
    create.push().unwrap();

    let mut op = NewSegmentOperation::new(
        &catalog,
        OperationContext::new(4),
        catalog.get_snapshot("C").unwrap(),
    );
    let segment = op.commit_new_segment("P1", 1000).unwrap();
    let file = op
        .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").with_stats(4096, 1000))
        .unwrap();
    op.push().unwrap();

    let snapshot = catalog.get_snapshot("C").unwrap();
    let p1 = snapshot.get_partition("P1").unwrap();
    let segments = snapshot.get_partition_segments(p1.id).unwrap();
    assert_eq!(segments.iter().map(|s| s.id).collect::<Vec<_>>(), vec![segment.id]);
    let files = snapshot.get_segment_files(segment.id).unwrap();
    assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![file.id]);
    assert_eq!(snapshot.lsn(), 4);
    assert_eq!(snapshot.row_count(), 1000);
    assert_eq!(snapshot.size(), 4096);
}

#[test]
fn test_stale_operation() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, false);
    let mut create = CreatePartitionOperation::new(
        &catalog,
        OperationContext::new(2),
        catalog.get_snapshot("C").unwrap(),
    );
    create.commit_new_partition(PartitionContext::new("P1")).unwrap();
    create.push().unwrap();
    let v1 = catalog.get_snapshot("C").unwrap();

    let mut append = NewSegmentOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v1));
    append.commit_new_segment("P1", 10).unwrap();
    append
        .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8"))
        .unwrap();

    let mut drop_op = DropPartitionOperation::new(
        &catalog,
        OperationContext::new(3),
        Arc::clone(&v1),
        PartitionContext::new("P1"),
    );
    drop_op.push().unwrap();
    let v2 = drop_op.snapshot().unwrap();

    let err = append.push().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleSnapshot);

    let current = catalog.get_snapshot("C").unwrap();
    assert_eq!(current.commit_id(), v2.commit_id());
    assert_eq!(current.resource_ids(), v2.resource_ids());
}

#[test]
fn test_drop_index() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, true);

    let before = add_segments(&catalog, &["raw", "ivfsq8"]);
    let ivf = before.get_field_element("vector", "ivfsq8").unwrap().id;
    let index_files: Vec<_> = before
        .get_resources::<SegmentFile>()
        .into_iter()
        .filter(|f| f.field_element_id == ivf)
        .map(|f| f.id)
        .collect();
    assert_eq!(index_files.len(), 2);

    let mut op = DropIndexOperation::new(
        &catalog,
        OperationContext::new(5),
        Arc::clone(&before),
        "vector",
        "ivfsq8",
    );
    op.push().unwrap();

    let after = catalog.get_snapshot("C").unwrap();
    let raw = after.get_field_element("vector", "raw").unwrap().id;
    let default = after.get_partition("_default").unwrap();
    for segment in after.get_partition_segments(default.id).unwrap() {
        let files = after.get_segment_files(segment.id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].field_element_id, raw);
    }
    for id in &index_files {
        assert_eq!(
            catalog.record_state(ResourceKind::SegmentFile, *id).unwrap(),
            RecordState::SoftDeleted
        );
    }

    drop(before);
    drop(op);
    assert!(catalog.wait_for_gc(Duration::from_secs(5)));
    for id in &index_files {
        assert_eq!(
            catalog
                .record_state(ResourceKind::SegmentFile, *id)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}

#[test]
fn test_drop_collection() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, false);

    let handle = catalog.get_snapshot("C").unwrap();
    let mut op = DropCollectionOperation::new(&catalog, OperationContext::new(2), Arc::clone(&handle));
    op.push().unwrap();

    assert!(!catalog.has_collection("C"));
    assert_eq!(catalog.get_snapshot("C").unwrap_err().kind(), ErrorKind::NotFound);

    assert_eq!(handle.name(), "C");
    assert_eq!(handle.partition_names(), vec!["_default".to_string()]);
    let vector = handle.get_field("vector").unwrap();
    assert_eq!(vector.name, "vector");
    assert!(catalog.pin_count(ResourceKind::Field, vector.id) >= 1);
}

// ============================================================================
// Rebase against schema changes
// ============================================================================

#[test]
fn test_merge_racing_drop_index_is_stale() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, true);
    let v = add_segments(&catalog, &["raw", "ivfsq8"]);
    let ivf = v.get_field_element("vector", "ivfsq8").unwrap().id;

    let mut merge = MergeOperation::new(
        &catalog,
        OperationContext::new(7),
        Arc::clone(&v),
        v.get_resource_ids::<Segment>(),
    )
    .unwrap();
    let merged = merge.commit_new_segment().unwrap();
    merge
        .commit_new_segment_file(SegmentFileContext::new("vector", "raw").with_stats(20, 300))
        .unwrap();
    merge
        .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").with_stats(6, 300))
        .unwrap();

    let mut drop_op = DropIndexOperation::new(
        &catalog,
        OperationContext::new(6),
        Arc::clone(&v),
        "vector",
        "ivfsq8",
    );
    drop_op.push().unwrap();
    let dropped = drop_op.snapshot().unwrap();

    assert_eq!(merge.push().unwrap_err().kind(), ErrorKind::StaleSnapshot);
    assert_eq!(catalog.load::<Segment>(merged.id).unwrap_err().kind(), ErrorKind::NotFound);

    let current = catalog.get_snapshot("C").unwrap();
    assert_eq!(current.commit_id(), dropped.commit_id());
    assert!(!current.contains(ResourceKind::FieldElement, ivf));
    assert!(current
        .get_resources::<SegmentFile>()
        .iter()
        .all(|f| f.field_element_id != ivf));
}

#[test]
fn test_raw_merge_rebases_over_drop_index() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, true);
    let v = add_segments(&catalog, &["raw", "ivfsq8"]);
    let sources = v.get_resource_ids::<Segment>();

    let mut merge =
        MergeOperation::new(&catalog, OperationContext::new(7), Arc::clone(&v), sources.clone())
            .unwrap();
    let merged = merge.commit_new_segment().unwrap();
    merge
        .commit_new_segment_file(SegmentFileContext::new("vector", "raw").with_stats(20, 300))
        .unwrap();

    let mut drop_op = DropIndexOperation::new(
        &catalog,
        OperationContext::new(6),
        Arc::clone(&v),
        "vector",
        "ivfsq8",
    );
    drop_op.push().unwrap();
    merge.push().unwrap();

    let current = catalog.get_snapshot("C").unwrap();
    assert_eq!(current.get_resource_ids::<Segment>(), vec![merged.id]);
    assert_eq!(current.get_segment_files(merged.id).unwrap().len(), 1);
    assert_eq!(current.get_resources::<SegmentFile>().len(), 1);
    assert_eq!(current.row_count(), 300);
    for id in sources {
        assert!(!current.contains(ResourceKind::Segment, id));
    }
}

#[test]
fn test_build_racing_drop_all_index_is_stale() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, true);
    let v = add_segments(&catalog, &["raw"]);
    let segment = v.get_resource_ids::<Segment>()[0];

    let mut build = BuildOperation::new(&catalog, OperationContext::new(6), Arc::clone(&v));
    build
        .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").for_segment(segment))
        .unwrap();

    let mut drop_all = DropAllIndexOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v), None);
    drop_all.push().unwrap();
    let dropped = drop_all.snapshot().unwrap();

    assert_eq!(build.push().unwrap_err().kind(), ErrorKind::StaleSnapshot);
    assert!(!build.reused_existing());

    let current = catalog.get_snapshot("C").unwrap();
    assert_eq!(current.commit_id(), dropped.commit_id());
    assert_eq!(
        current.get_field_element("vector", "ivfsq8").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(current.get_segment_files(segment).unwrap().len(), 1);
}

#[test]
fn test_build_on_merged_away_segment_is_stale() {
    let catalog = Catalog::ephemeral().unwrap();
    create_c(&catalog, true);
    let v = add_segments(&catalog, &["raw"]);
    let sources = v.get_resource_ids::<Segment>();

    let mut build = BuildOperation::new(&catalog, OperationContext::new(6), Arc::clone(&v));
    build
        .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").for_segment(sources[0]))
        .unwrap();

    let mut merge =
        MergeOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v), sources).unwrap();
    merge.commit_new_segment().unwrap();
    merge
        .commit_new_segment_file(SegmentFileContext::new("vector", "raw"))
        .unwrap();
    merge.push().unwrap();
    let merged = merge.snapshot().unwrap();

    assert_eq!(build.push().unwrap_err().kind(), ErrorKind::StaleSnapshot);
    assert_eq!(catalog.get_snapshot("C").unwrap().commit_id(), merged.commit_id());
}
