//! Catalog entity records
//!
//! Entities are plain values. Once persisted they are never edited; a logical
//! change produces a new record with a new id and new commit records above it.
//! Parent pointers (`collection_id`, `partition_id`, ...) are back references
//! resolved by lookup, never ownership.

use serde::{Deserialize, Serialize};

use crate::types::{now_micros, FieldElementType, FieldType, Id, Lsn, Params};

/// A named table of vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Record id (0 until allocated)
    pub id: Id,
    /// Globally unique name among live collections
    pub name: String,
    /// Free-form parameters
    #[serde(default)]
    pub params: Params,
    /// Lsn of the operation that created the collection
    pub lsn: Lsn,
    /// Creation time in microseconds
    pub created_on: i64,
}

impl Collection {
    /// Create an unallocated collection record
    pub fn new(name: impl Into<String>) -> Self {
        Collection {
            id: 0,
            name: name.into(),
            params: Params::new(),
            lsn: 0,
            created_on: now_micros(),
        }
    }

    /// Attach parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// A column of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Name, unique within the collection
    pub name: String,
    /// Ordinal position in the schema
    pub num: u32,
    /// Data type
    pub field_type: FieldType,
    /// Free-form parameters (e.g. vector dimension)
    #[serde(default)]
    pub params: Params,
    /// Lsn of the operation that created the field
    pub lsn: Lsn,
}

impl Field {
    /// Create an unallocated field record
    pub fn new(name: impl Into<String>, num: u32, field_type: FieldType) -> Self {
        Field {
            id: 0,
            collection_id: 0,
            name: name.into(),
            num,
            field_type,
            params: Params::new(),
            lsn: 0,
        }
    }

    /// Attach parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// An index or encoding attached to a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldElement {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Field the element belongs to
    pub field_id: Id,
    /// Name, unique within the field
    pub name: String,
    /// What the element stores
    pub element_type: FieldElementType,
    /// Free-form parameters (e.g. index build options)
    #[serde(default)]
    pub params: Params,
    /// Lsn of the operation that created the element
    pub lsn: Lsn,
}

impl FieldElement {
    /// Create an unallocated field element record
    pub fn new(
        collection_id: Id,
        field_id: Id,
        name: impl Into<String>,
        element_type: FieldElementType,
    ) -> Self {
        FieldElement {
            id: 0,
            collection_id,
            field_id,
            name: name.into(),
            element_type,
            params: Params::new(),
            lsn: 0,
        }
    }

    /// Attach parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// A named subset of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Name, unique within the collection
    pub name: String,
    /// Free-form parameters
    #[serde(default)]
    pub params: Params,
    /// Lsn of the operation that created the partition
    pub lsn: Lsn,
    /// Creation time in microseconds
    pub created_on: i64,
}

impl Partition {
    /// Create an unallocated partition record
    pub fn new(name: impl Into<String>, collection_id: Id) -> Self {
        Partition {
            id: 0,
            collection_id,
            name: name.into(),
            params: Params::new(),
            lsn: 0,
            created_on: now_micros(),
        }
    }
}

/// An immutable shard of a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Owning partition
    pub partition_id: Id,
    /// Number of rows stored in the segment
    pub row_count: u64,
    /// Lsn of the operation that created the segment
    pub lsn: Lsn,
    /// Creation time in microseconds
    pub created_on: i64,
}

impl Segment {
    /// Create an unallocated segment record
    pub fn new(collection_id: Id, partition_id: Id, row_count: u64) -> Self {
        Segment {
            id: 0,
            collection_id,
            partition_id,
            row_count,
            lsn: 0,
            created_on: now_micros(),
        }
    }
}

/// One file (raw data, index or delete list) in a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFile {
    /// Record id
    pub id: Id,
    /// Owning collection
    pub collection_id: Id,
    /// Owning partition
    pub partition_id: Id,
    /// Owning segment
    pub segment_id: Id,
    /// Element whose data the file holds
    pub field_element_id: Id,
    /// Size in bytes
    pub size: u64,
    /// Rows covered by the file
    pub row_count: u64,
    /// Lsn of the operation that created the file
    pub lsn: Lsn,
}

impl SegmentFile {
    /// Create an unallocated segment file record
    pub fn new(
        collection_id: Id,
        partition_id: Id,
        segment_id: Id,
        field_element_id: Id,
    ) -> Self {
        SegmentFile {
            id: 0,
            collection_id,
            partition_id,
            segment_id,
            field_element_id,
            size: 0,
            row_count: 0,
            lsn: 0,
        }
    }
}
