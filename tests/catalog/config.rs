//! vecmeta.toml handling at open

use crate::common::*;

#[test]
fn test_first_open_writes_default_config() {
    let test = TestCatalog::new();
    let content = std::fs::read_to_string(test.path().join("vecmeta.toml")).unwrap();
    assert!(content.contains("durability = \"standard\""));
    assert_eq!(test.catalog().config(), &CatalogConfig::default());
}

#[test]
fn test_explicit_config_is_persisted_for_next_open() {
    let mut test = TestCatalog::new_strict();
    test.close();

    test.catalog = Some(Catalog::open(test.path()).unwrap());
    assert_eq!(test.catalog().config(), &always_config());
}

#[test]
fn test_invalid_durability_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("vecmeta.toml"), "durability = \"turbo\"\n").unwrap();
    let err = Catalog::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!dir.path().join("meta.log").exists());
}

#[test]
fn test_malformed_config_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("vecmeta.toml"), "durability = [").unwrap();
    let err = Catalog::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_compact_on_open_keeps_state() {
    let mut test = TestCatalog::new_strict();
    create_collection(test.catalog(), "docs");
    for lsn in 2..10 {
        append_segment(test.catalog(), "docs", "_default", 5, lsn);
    }
    settle(test.catalog());
    let before = test.catalog().get_snapshot("docs").unwrap().resource_ids();
    let size = file_size(&test.log_path());
    test.close();

    let config = CatalogConfig {
        compact_on_open: true,
        ..always_config()
    };
    test.catalog = Some(Catalog::open_with_config(test.path(), config).unwrap());
    assert!(file_size(&test.log_path()) < size);
    assert_eq!(
        test.catalog().get_snapshot("docs").unwrap().resource_ids(),
        before
    );
}
