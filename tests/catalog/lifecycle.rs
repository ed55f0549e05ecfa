//! Open / publish / reopen lifecycle
//!
//! Each durability mode is taken through the same sequence and checked for
//! what survives a clean shutdown.

use crate::common::*;

fn populate(catalog: &std::sync::Arc<Catalog>) {
    create_collection(catalog, "docs");
    create_partition(catalog, "docs", "2026-10", 2);
    append_segment(catalog, "docs", "2026-10", 100, 3);
    append_segment(catalog, "docs", "_default", 50, 4);
}

#[test]
fn test_standard_mode_survives_clean_shutdown() {
    let mut test = TestCatalog::new();
    populate(test.catalog());
    let before = test.catalog().get_snapshot("docs").unwrap().resource_ids();

    test.reopen();
    let snapshot = test.catalog().get_snapshot("docs").unwrap();
    assert_eq!(snapshot.resource_ids(), before);
    assert_eq!(snapshot.row_count(), 150);
    assert_eq!(snapshot.lsn(), 4);
    assert_eq!(
        snapshot.partition_names(),
        vec!["2026-10".to_string(), "_default".to_string()]
    );
}

#[test]
fn test_always_mode_survives_clean_shutdown() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());

    test.reopen();
    assert_eq!(test.catalog().config().durability, "always");
    let snapshot = test.catalog().get_snapshot("docs").unwrap();
    assert_eq!(snapshot.get_resources::<Segment>().len(), 2);
    assert_eq!(snapshot.get_resources::<SegmentFile>().len(), 2);
}

#[test]
fn test_cache_mode_keeps_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let catalog = Catalog::open_with_config(dir.path(), CatalogConfig::cache()).unwrap();
        populate(&catalog);
        assert!(catalog.has_collection("docs"));
        catalog.shutdown().unwrap();
    }
    assert!(!dir.path().join("meta.log").exists());

    let catalog = Catalog::open(dir.path()).unwrap();
    assert!(catalog.collection_names().is_empty());
}

#[test]
fn test_reopening_in_process_returns_same_catalog() {
    let test = TestCatalog::new();
    let again = Catalog::open(test.path()).unwrap();
    assert!(std::sync::Arc::ptr_eq(test.catalog(), &again));
}

#[test]
fn test_shut_down_catalog_rejects_operations_but_serves_reads() {
    let test = TestCatalog::new();
    let catalog = test.catalog();
    populate(catalog);
    let held = catalog.get_snapshot("docs").unwrap();
    catalog.shutdown().unwrap();

    let mut op = CreatePartitionOperation::new(catalog, OperationContext::new(5), held.clone());
    op.commit_new_partition(PartitionContext::new("late")).unwrap();
    assert_eq!(op.push().unwrap_err().kind(), ErrorKind::InvalidArgument);

    assert_eq!(held.row_count(), 150);
    assert!(catalog.get_snapshot("docs").is_ok());
}

#[test]
fn test_dropped_collection_frees_its_name_across_reopen() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());
    {
        let catalog = test.catalog();
        let mut op = DropCollectionOperation::new(
            catalog,
            OperationContext::new(5),
            catalog.get_snapshot("docs").unwrap(),
        );
        op.push().unwrap();
    }
    settle(test.catalog());

    test.reopen();
    let catalog = test.catalog();
    assert!(!catalog.has_collection("docs"));
    create_collection(catalog, "docs");
    let snapshot = catalog.get_snapshot("docs").unwrap();
    assert_eq!(snapshot.row_count(), 0);
    assert_eq!(snapshot.partition_names(), vec!["_default".to_string()]);
}

#[test]
fn test_compaction_shrinks_log_and_keeps_state() {
    let mut test = TestCatalog::new_strict();
    create_collection(test.catalog(), "docs");
    for lsn in 2..40 {
        append_segment(test.catalog(), "docs", "_default", 10, lsn);
    }
    settle(test.catalog());
    let before = test.catalog().get_snapshot("docs").unwrap().resource_ids();

    let size = file_size(&test.log_path());
    test.catalog().compact().unwrap();
    assert!(file_size(&test.log_path()) < size);

    test.reopen();
    let snapshot = test.catalog().get_snapshot("docs").unwrap();
    assert_eq!(snapshot.resource_ids(), before);
    assert_eq!(snapshot.row_count(), 380);
}
