//! Core types and traits for vecmeta
//!
//! This crate defines the foundational types shared by every layer of the
//! collection metadata catalog:
//! - Id / Lsn / Mappings: identity and commit mapping primitives
//! - ResourceKind: discriminates the catalog record types
//! - Entities: Collection, Field, FieldElement, Partition, Segment, SegmentFile
//! - Commits: CollectionCommit, SchemaCommit, FieldCommit, PartitionCommit, SegmentCommit
//! - ResourceRecord: tagged union persisted by a store
//! - Store: append-only persistence contract
//! - MetaError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commits;
pub mod entities;
pub mod error;
pub mod resource;
pub mod traits;
pub mod types;

pub use commits::{
    CollectionCommit, FieldCommit, PartitionCommit, SchemaCommit, SegmentCommit,
};
pub use entities::{Collection, Field, FieldElement, Partition, Segment, SegmentFile};
pub use error::{ErrorKind, MetaError, Result};
pub use resource::{Commit, Resource, ResourceRecord};
pub use traits::{RecordState, Store, StoreExt, StoredRecord};
pub use types::{
    now_micros, FieldElementType, FieldType, Id, Lsn, Mappings, Params, ResourceKind,
    DEFAULT_PARTITION_NAME,
};
