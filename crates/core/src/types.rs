//! Identity, kind and schema enums for catalog records
//!
//! Every record in the catalog is addressed by `(ResourceKind, Id)`. Ids are
//! allocated per kind, strictly increasing, and never reused.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a catalog record, unique within its kind
pub type Id = u64;

/// Opaque log sequence number supplied by the caller and stored verbatim
pub type Lsn = u64;

/// Set of child ids named by a commit record
///
/// `BTreeSet` keeps the set ordered so serialized commits are deterministic.
pub type Mappings = BTreeSet<Id>;

/// Free-form JSON parameters attached to collections, fields and elements
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Name of the partition every collection is created with
pub const DEFAULT_PARTITION_NAME: &str = "_default";

/// Current wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Discriminates the record types persisted by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A named vector table
    Collection,
    /// A column of a collection
    Field,
    /// An index or encoding attached to a field
    FieldElement,
    /// A named subset of a collection
    Partition,
    /// An immutable shard of a partition
    Segment,
    /// One file of a segment
    SegmentFile,
    /// Snapshot root
    CollectionCommit,
    /// Versioned field set of a collection
    SchemaCommit,
    /// Versioned element set of a field
    FieldCommit,
    /// Versioned segment set of a partition
    PartitionCommit,
    /// Versioned file set of a segment
    SegmentCommit,
}

impl ResourceKind {
    /// All kinds, leaves before the commits that reference them
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Collection,
        ResourceKind::Field,
        ResourceKind::FieldElement,
        ResourceKind::Partition,
        ResourceKind::Segment,
        ResourceKind::SegmentFile,
        ResourceKind::SegmentCommit,
        ResourceKind::PartitionCommit,
        ResourceKind::FieldCommit,
        ResourceKind::SchemaCommit,
        ResourceKind::CollectionCommit,
    ];

    /// Stable lowercase name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Collection => "collection",
            ResourceKind::Field => "field",
            ResourceKind::FieldElement => "field_element",
            ResourceKind::Partition => "partition",
            ResourceKind::Segment => "segment",
            ResourceKind::SegmentFile => "segment_file",
            ResourceKind::CollectionCommit => "collection_commit",
            ResourceKind::SchemaCommit => "schema_commit",
            ResourceKind::FieldCommit => "field_commit",
            ResourceKind::PartitionCommit => "partition_commit",
            ResourceKind::SegmentCommit => "segment_commit",
        }
    }

    /// Whether records of this kind are commit records (they own mappings)
    pub fn is_commit(&self) -> bool {
        matches!(
            self,
            ResourceKind::CollectionCommit
                | ResourceKind::SchemaCommit
                | ResourceKind::FieldCommit
                | ResourceKind::PartitionCommit
                | ResourceKind::SegmentCommit
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Boolean scalar
    Bool,
    /// 8-bit integer
    Int8,
    /// 16-bit integer
    Int16,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Row identifier
    Uid,
    /// Dense float vector
    Vector,
    /// Binary vector
    BinaryVector,
}

impl FieldType {
    /// Whether the field stores vectors
    pub fn is_vector(&self) -> bool {
        matches!(self, FieldType::Vector | FieldType::BinaryVector)
    }
}

/// Kind of data a field element describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldElementType {
    /// Raw field data
    Raw,
    /// Bloom filter over the field's ids
    BloomFilter,
    /// Deleted document list
    DeletedDocs,
    /// IVF index with scalar quantization
    Ivfsq8,
    /// IVF index without quantization
    IvfFlat,
    /// HNSW graph index
    Hnsw,
}

impl FieldElementType {
    /// Whether the element is a secondary index that can be dropped and rebuilt
    pub fn is_index(&self) -> bool {
        matches!(
            self,
            FieldElementType::Ivfsq8 | FieldElementType::IvfFlat | FieldElementType::Hnsw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_puts_leaves_first() {
        let pos = |k: ResourceKind| ResourceKind::ALL.iter().position(|x| *x == k).unwrap();
        assert!(pos(ResourceKind::SegmentFile) < pos(ResourceKind::SegmentCommit));
        assert!(pos(ResourceKind::SegmentCommit) < pos(ResourceKind::PartitionCommit));
        assert!(pos(ResourceKind::PartitionCommit) < pos(ResourceKind::CollectionCommit));
        assert!(pos(ResourceKind::FieldCommit) < pos(ResourceKind::SchemaCommit));
    }

    #[test]
    fn test_commit_kinds() {
        let commits: Vec<_> = ResourceKind::ALL
            .iter()
            .filter(|k| k.is_commit())
            .collect();
        assert_eq!(commits.len(), 5);
        assert!(!ResourceKind::Segment.is_commit());
    }

    #[test]
    fn test_index_element_types() {
        assert!(FieldElementType::Ivfsq8.is_index());
        assert!(FieldElementType::Hnsw.is_index());
        assert!(!FieldElementType::Raw.is_index());
        assert!(!FieldElementType::DeletedDocs.is_index());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::SegmentFile.to_string(), "segment_file");
    }
}
