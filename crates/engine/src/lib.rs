//! Catalog engine for vecmeta
//!
//! This crate ties the lower layers together:
//! - Catalog: open/shutdown, recovery, snapshot lookup
//! - Operations: staged mutations published as new CollectionCommits
//! - OperationExecutor: per-collection FIFO commit lanes
//! - EventExecutor: background garbage collection of superseded records
//!
//! The engine is the only component that writes to the store. Everything
//! above it reads through scoped snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
mod commit;
pub mod config;
pub mod context;
pub mod events;
pub mod executor;
pub mod operations;

pub use catalog::Catalog;
pub use config::{CatalogConfig, GcConfig, CONFIG_FILE_NAME};
pub use context::{
    CreateCollectionContext, FieldSchema, OperationContext, PartitionContext, SegmentFileContext,
};
pub use events::{EventExecutor, GcEvent, GcStats};
pub use executor::OperationExecutor;
pub use operations::{
    AddFieldElementOperation, BuildOperation, CreateCollectionOperation, CreatePartitionOperation,
    DropAllIndexOperation, DropCollectionOperation, DropIndexOperation, DropPartitionOperation,
    MergeOperation, NewSegmentOperation, Operation, OperationState, OperationType,
    SoftDeleteOperation,
};
