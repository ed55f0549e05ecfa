//! vecmeta - snapshot-based collection metadata for vector databases
//!
//! vecmeta tracks the metadata of vector collections: schema (fields and
//! their index elements), partitions, segments and the files built for
//! them. Every change is published as a new immutable snapshot; readers
//! pin a snapshot and see a consistent tree for as long as they hold it.
//!
//! # Quick Start
//!
//! ```ignore
//! use vecmeta::{Catalog, CreateCollectionContext, CreateCollectionOperation, Operation};
//!
//! let catalog = Catalog::ephemeral()?;
//! let mut op = CreateCollectionOperation::new(&catalog, CreateCollectionContext::new("docs", 1));
//! op.push()?;
//!
//! let snapshot = catalog.get_snapshot("docs")?;
//! assert_eq!(snapshot.partition_names(), vec!["_default".to_string()]);
//! ```
//!
//! # Architecture
//!
//! Mutations go through operations, which the [`Catalog`] serialises per
//! collection. Storage, durability and snapshot internals live in their
//! own crates and are re-exported here for callers that need them.

pub use vecmeta_concurrency::{ScopedSnapshot, Snapshot};
pub use vecmeta_core::{
    Collection, CollectionCommit, ErrorKind, Field, FieldCommit, FieldElement, FieldElementType,
    FieldType, Id, Lsn, MetaError, Partition, PartitionCommit, RecordState, Resource,
    ResourceKind, Result, SchemaCommit, Segment, SegmentCommit, SegmentFile, Store, StoreExt,
};
pub use vecmeta_durability::{DurabilityMode, DurableStore};
pub use vecmeta_engine::*;
pub use vecmeta_storage::MemoryStore;
