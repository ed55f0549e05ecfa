//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use tempfile::TempDir;
pub use vecmeta::{
    Catalog, CatalogConfig, CreateCollectionContext, CreateCollectionOperation,
    CreatePartitionOperation, DropCollectionOperation, ErrorKind, Field, FieldElementType,
    FieldSchema, FieldType, NewSegmentOperation, Operation, OperationContext, PartitionContext,
    ResourceKind, Segment, SegmentFile, SegmentFileContext,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_LOGGING: Once = Once::new();

/// Route catalog logs through the test harness; `RUST_LOG` is not consulted
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

/// Config with every put synced before it returns
pub fn always_config() -> CatalogConfig {
    CatalogConfig {
        durability: "always".to_string(),
        ..CatalogConfig::default()
    }
}

// ============================================================================
// TestCatalog - on-disk catalog that can be reopened
// ============================================================================

/// Catalog in a temp directory
pub struct TestCatalog {
    pub catalog: Option<Arc<Catalog>>,
    pub dir: TempDir,
}

impl TestCatalog {
    /// Catalog with the default ("standard") configuration
    pub fn new() -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        TestCatalog {
            catalog: Some(catalog),
            dir,
        }
    }

    /// Catalog syncing every write
    pub fn new_strict() -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open_with_config(dir.path(), always_config()).unwrap();
        TestCatalog {
            catalog: Some(catalog),
            dir,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.catalog.as_ref().unwrap()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("meta.log")
    }

    /// Shut down, drop every handle and open again from disk
    pub fn reopen(&mut self) {
        self.close();
        self.catalog = Some(Catalog::open(self.dir.path()).unwrap());
    }

    /// Shut down and drop the catalog without reopening
    pub fn close(&mut self) {
        if let Some(catalog) = self.catalog.take() {
            catalog.shutdown().unwrap();
        }
    }
}

// ============================================================================
// Catalog helpers
// ============================================================================

/// Schema with a vector field (raw + ivfsq8) and an int field
pub fn schema(name: &str) -> CreateCollectionContext {
    CreateCollectionContext::new(name, 1)
        .with_field(
            FieldSchema::new(Field::new("vector", 0, FieldType::Vector))
                .with_element("raw", FieldElementType::Raw)
                .with_element("ivfsq8", FieldElementType::Ivfsq8),
        )
        .with_field(FieldSchema::new(Field::new("id", 1, FieldType::Int64)))
}

pub fn create_collection(catalog: &Arc<Catalog>, name: &str) {
    let mut op = CreateCollectionOperation::new(catalog, schema(name));
    op.push().unwrap();
}

pub fn create_partition(catalog: &Arc<Catalog>, collection: &str, partition: &str, lsn: u64) {
    let mut op = CreatePartitionOperation::new(
        catalog,
        OperationContext::new(lsn),
        catalog.get_snapshot(collection).unwrap(),
    );
    op.commit_new_partition(PartitionContext::new(partition))
        .unwrap();
    op.push().unwrap();
}

/// Append one segment with a raw file; returns the segment
pub fn append_segment(
    catalog: &Arc<Catalog>,
    collection: &str,
    partition: &str,
    rows: u64,
    lsn: u64,
) -> Segment {
    let mut op = NewSegmentOperation::new(
        catalog,
        OperationContext::new(lsn),
        catalog.get_snapshot(collection).unwrap(),
    );
    let segment = op.commit_new_segment(partition, rows).unwrap();
    op.commit_new_segment_file(SegmentFileContext::new("vector", "raw").with_stats(rows * 4, rows))
        .unwrap();
    op.push().unwrap();
    segment
}

/// Wait for background collection to go idle
pub fn settle(catalog: &Arc<Catalog>) {
    assert!(catalog.wait_for_gc(Duration::from_secs(5)), "gc did not settle");
}

// ============================================================================
// File helpers
// ============================================================================

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}
