//! Crash Recovery Tests
//!
//! Simulates crashes by damaging the tail of `meta.log` between a close and
//! the next open, then checks the catalog comes back at the last intact
//! commit.

use crate::common::*;
use std::io::Write;

fn populate(catalog: &std::sync::Arc<Catalog>) {
    create_collection(catalog, "docs");
    create_partition(catalog, "docs", "P1", 2);
    append_segment(catalog, "docs", "P1", 64, 3);
    settle(catalog);
}

#[test]
fn test_torn_operation_is_invisible_after_reopen() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());
    let before = test.catalog().get_snapshot("docs").unwrap().resource_ids();
    let intact = file_size(&test.log_path());

    create_partition(test.catalog(), "docs", "P2", 4);
    test.close();
    assert!(file_size(&test.log_path()) > intact);

    // Cut inside the first frame of the partition operation
    truncate_file(&test.log_path(), intact + 3);
    test.catalog = Some(Catalog::open(test.path()).unwrap());

    let catalog = test.catalog();
    let snapshot = catalog.get_snapshot("docs").unwrap();
    assert!(!snapshot.has_partition("P2"));
    assert_eq!(snapshot.resource_ids(), before);
    assert_eq!(snapshot.lsn(), 3);

    // The catalog keeps working on top of the recovered state
    create_partition(catalog, "docs", "P2", 4);
    assert!(catalog.get_snapshot("docs").unwrap().has_partition("P2"));
}

#[test]
fn test_garbage_tail_is_ignored() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());
    let before = test.catalog().get_snapshot("docs").unwrap().resource_ids();
    test.close();

    let mut log = std::fs::OpenOptions::new()
        .append(true)
        .open(test.log_path())
        .unwrap();
    log.write_all(&[0xAB; 37]).unwrap();
    drop(log);

    test.catalog = Some(Catalog::open(test.path()).unwrap());
    let snapshot = test.catalog().get_snapshot("docs").unwrap();
    assert_eq!(snapshot.resource_ids(), before);
    assert_eq!(snapshot.row_count(), 64);
}

#[test]
fn test_lost_log_means_empty_catalog() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());
    test.close();

    std::fs::remove_file(test.log_path()).unwrap();
    test.catalog = Some(Catalog::open(test.path()).unwrap());
    assert!(test.catalog().collection_names().is_empty());
}

#[test]
fn test_recovered_catalog_does_not_reuse_ids() {
    let mut test = TestCatalog::new_strict();
    populate(test.catalog());
    let old_segment = test
        .catalog()
        .get_snapshot("docs")
        .unwrap()
        .get_resources::<Segment>()[0]
        .id;

    test.reopen();
    let fresh = append_segment(test.catalog(), "docs", "P1", 8, 4);
    assert!(fresh.id > old_segment);
}
