//! Concurrency layer for vecmeta
//!
//! This crate implements the read side of the catalog:
//! - ResourceHolder / Holders: per-kind caches of loaded records
//! - Scoped: refcounted pins that keep records from being hard-deleted
//! - Snapshot: the fully resolved, pinned tree under one CollectionCommit
//! - Snapshots: registry of the current snapshot per collection
//! - IterateHandler: typed, id-ordered walks over a snapshot
//!
//! Readers never take more than a short read lock; all mutation of holders
//! and the registry happens on the commit and GC paths in `vecmeta-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod holder;
pub mod iterate;
pub mod registry;
pub mod scoped;
pub mod snapshot;
pub mod testing;

pub use holder::{Held, Holders, Reclaim, ResourceHolder};
pub use iterate::{IterateHandler, PartitionCollector, SegmentFileCollector};
pub use registry::Snapshots;
pub use scoped::{HolderEntry, Scoped};
pub use snapshot::{ResourceTables, ScopedSnapshot, Snapshot, SnapshotResource};
