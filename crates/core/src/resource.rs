//! Resource trait and the tagged record persisted by stores
//!
//! Stores are not generic: they persist [`ResourceRecord`], a tagged union of
//! every record type. The [`Resource`] trait converts between a concrete
//! record type and the tagged form so upper layers stay typed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commits::{CollectionCommit, FieldCommit, PartitionCommit, SchemaCommit, SegmentCommit};
use crate::entities::{Collection, Field, FieldElement, Partition, Segment, SegmentFile};
use crate::types::{Id, Lsn, Mappings, ResourceKind};

/// A concrete catalog record type
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    /// Kind tag of this record type
    const KIND: ResourceKind;

    /// Record id (0 while unallocated)
    fn id(&self) -> Id;

    /// Assign the allocated id
    fn set_id(&mut self, id: Id);

    /// Collection this record belongs to (a collection returns its own id)
    fn collection_id(&self) -> Id;

    /// Lsn stamped on the record
    fn lsn(&self) -> Lsn;

    /// Stamp the lsn of the operation creating the record
    fn set_lsn(&mut self, lsn: Lsn);

    /// Wrap into the tagged form
    fn into_record(self) -> ResourceRecord;

    /// Unwrap from the tagged form, `None` on kind mismatch
    fn from_record(record: ResourceRecord) -> Option<Self>;
}

/// A record that names children through a mapping set
pub trait Commit: Resource {
    /// Child ids
    fn mappings(&self) -> &Mappings;

    /// Mutable child ids, used while building a new commit
    fn mappings_mut(&mut self) -> &mut Mappings;
}

/// Tagged union of every persisted record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceRecord {
    /// Collection record
    Collection(Collection),
    /// Field record
    Field(Field),
    /// Field element record
    FieldElement(FieldElement),
    /// Partition record
    Partition(Partition),
    /// Segment record
    Segment(Segment),
    /// Segment file record
    SegmentFile(SegmentFile),
    /// Collection commit record
    CollectionCommit(CollectionCommit),
    /// Schema commit record
    SchemaCommit(SchemaCommit),
    /// Field commit record
    FieldCommit(FieldCommit),
    /// Partition commit record
    PartitionCommit(PartitionCommit),
    /// Segment commit record
    SegmentCommit(SegmentCommit),
}

macro_rules! impl_resource {
    ($ty:ident, $owner:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn id(&self) -> Id {
                self.id
            }

            fn set_id(&mut self, id: Id) {
                self.id = id;
            }

            fn collection_id(&self) -> Id {
                self.$owner
            }

            fn lsn(&self) -> Lsn {
                self.lsn
            }

            fn set_lsn(&mut self, lsn: Lsn) {
                self.lsn = lsn;
            }

            fn into_record(self) -> ResourceRecord {
                ResourceRecord::$ty(self)
            }

            fn from_record(record: ResourceRecord) -> Option<Self> {
                match record {
                    ResourceRecord::$ty(r) => Some(r),
                    _ => None,
                }
            }
        }
    };
}

macro_rules! impl_commit {
    ($ty:ident) => {
        impl_resource!($ty, collection_id);

        impl Commit for $ty {
            fn mappings(&self) -> &Mappings {
                &self.mappings
            }

            fn mappings_mut(&mut self) -> &mut Mappings {
                &mut self.mappings
            }
        }
    };
}

impl_resource!(Collection, id);
impl_resource!(Field, collection_id);
impl_resource!(FieldElement, collection_id);
impl_resource!(Partition, collection_id);
impl_resource!(Segment, collection_id);
impl_resource!(SegmentFile, collection_id);
impl_commit!(CollectionCommit);
impl_commit!(SchemaCommit);
impl_commit!(FieldCommit);
impl_commit!(PartitionCommit);
impl_commit!(SegmentCommit);

macro_rules! dispatch {
    ($record:expr, $r:ident => $body:expr) => {
        match $record {
            ResourceRecord::Collection($r) => $body,
            ResourceRecord::Field($r) => $body,
            ResourceRecord::FieldElement($r) => $body,
            ResourceRecord::Partition($r) => $body,
            ResourceRecord::Segment($r) => $body,
            ResourceRecord::SegmentFile($r) => $body,
            ResourceRecord::CollectionCommit($r) => $body,
            ResourceRecord::SchemaCommit($r) => $body,
            ResourceRecord::FieldCommit($r) => $body,
            ResourceRecord::PartitionCommit($r) => $body,
            ResourceRecord::SegmentCommit($r) => $body,
        }
    };
}

impl ResourceRecord {
    /// Kind tag
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRecord::Collection(_) => ResourceKind::Collection,
            ResourceRecord::Field(_) => ResourceKind::Field,
            ResourceRecord::FieldElement(_) => ResourceKind::FieldElement,
            ResourceRecord::Partition(_) => ResourceKind::Partition,
            ResourceRecord::Segment(_) => ResourceKind::Segment,
            ResourceRecord::SegmentFile(_) => ResourceKind::SegmentFile,
            ResourceRecord::CollectionCommit(_) => ResourceKind::CollectionCommit,
            ResourceRecord::SchemaCommit(_) => ResourceKind::SchemaCommit,
            ResourceRecord::FieldCommit(_) => ResourceKind::FieldCommit,
            ResourceRecord::PartitionCommit(_) => ResourceKind::PartitionCommit,
            ResourceRecord::SegmentCommit(_) => ResourceKind::SegmentCommit,
        }
    }

    /// Record id
    pub fn id(&self) -> Id {
        dispatch!(self, r => r.id())
    }

    /// Owning collection id
    pub fn collection_id(&self) -> Id {
        dispatch!(self, r => r.collection_id())
    }

    /// Mapping set, for commit records only
    pub fn mappings(&self) -> Option<&Mappings> {
        match self {
            ResourceRecord::CollectionCommit(c) => Some(&c.mappings),
            ResourceRecord::SchemaCommit(c) => Some(&c.mappings),
            ResourceRecord::FieldCommit(c) => Some(&c.mappings),
            ResourceRecord::PartitionCommit(c) => Some(&c.mappings),
            ResourceRecord::SegmentCommit(c) => Some(&c.mappings),
            _ => None,
        }
    }
}
