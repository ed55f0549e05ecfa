//! Commit records
//!
//! A commit is an immutable mapping set naming the live children of one
//! entity. The tree is:
//!
//! ```text
//! CollectionCommit ── schema_id ──> SchemaCommit ──> FieldCommit ──> FieldElement
//!        │
//!        └── mappings ──> PartitionCommit ──> SegmentCommit ──> SegmentFile
//! ```
//!
//! Commits own ids only. A change anywhere in the tree produces new commits
//! on the path up to a new CollectionCommit.

use serde::{Deserialize, Serialize};

use crate::types::{now_micros, Id, Lsn, Mappings};

/// Snapshot root: the state of one collection at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCommit {
    /// Record id
    pub id: Id,
    /// Collection described
    pub collection_id: Id,
    /// Schema in effect
    pub schema_id: Id,
    /// Live PartitionCommit ids
    pub mappings: Mappings,
    /// Lsn of the operation that published the commit
    pub lsn: Lsn,
    /// Total rows across partitions
    pub row_count: u64,
    /// Total bytes across partitions
    pub size: u64,
    /// Creation time in microseconds
    pub created_on: i64,
}

impl CollectionCommit {
    /// Create an unallocated collection commit
    pub fn new(collection_id: Id, schema_id: Id, mappings: Mappings) -> Self {
        CollectionCommit {
            id: 0,
            collection_id,
            schema_id,
            mappings,
            lsn: 0,
            row_count: 0,
            size: 0,
            created_on: now_micros(),
        }
    }
}

/// Field set of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCommit {
    /// Record id
    pub id: Id,
    /// Collection described
    pub collection_id: Id,
    /// Live FieldCommit ids
    pub mappings: Mappings,
    /// Lsn of the operation that published the commit
    pub lsn: Lsn,
}

impl SchemaCommit {
    /// Create an unallocated schema commit
    pub fn new(collection_id: Id, mappings: Mappings) -> Self {
        SchemaCommit {
            id: 0,
            collection_id,
            mappings,
            lsn: 0,
        }
    }
}

/// Element set of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCommit {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Field described
    pub field_id: Id,
    /// Live FieldElement ids
    pub mappings: Mappings,
    /// Lsn of the operation that published the commit
    pub lsn: Lsn,
}

impl FieldCommit {
    /// Create an unallocated field commit
    pub fn new(collection_id: Id, field_id: Id, mappings: Mappings) -> Self {
        FieldCommit {
            id: 0,
            collection_id,
            field_id,
            mappings,
            lsn: 0,
        }
    }
}

/// Segment set of a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionCommit {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Partition described
    pub partition_id: Id,
    /// Live SegmentCommit ids
    pub mappings: Mappings,
    /// Lsn of the operation that published the commit
    pub lsn: Lsn,
    /// Total rows across segments
    pub row_count: u64,
    /// Total bytes across segments
    pub size: u64,
}

impl PartitionCommit {
    /// Create an unallocated partition commit
    pub fn new(collection_id: Id, partition_id: Id, mappings: Mappings) -> Self {
        PartitionCommit {
            id: 0,
            collection_id,
            partition_id,
            mappings,
            lsn: 0,
            row_count: 0,
            size: 0,
        }
    }
}

/// File set of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCommit {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Owning partition
    pub partition_id: Id,
    /// Segment described
    pub segment_id: Id,
    /// Live SegmentFile ids
    pub mappings: Mappings,
    /// Lsn of the operation that published the commit
    pub lsn: Lsn,
    /// Rows in the segment
    pub row_count: u64,
    /// Total bytes of the live files
    pub size: u64,
}

impl SegmentCommit {
    /// Create an unallocated segment commit
    pub fn new(collection_id: Id, partition_id: Id, segment_id: Id, mappings: Mappings) -> Self {
        SegmentCommit {
            id: 0,
            collection_id,
            partition_id,
            segment_id,
            mappings,
            lsn: 0,
            row_count: 0,
            size: 0,
        }
    }
}
