//! Test fixtures
//!
//! Writes a small, well-formed collection tree straight into a store so the
//! holder, snapshot and registry layers can be exercised without operations.

use std::sync::Arc;
use vecmeta_core::{
    Collection, CollectionCommit, Field, FieldCommit, FieldElement, FieldElementType, FieldType,
    Id, Lsn, Mappings, Partition, PartitionCommit, Result, SchemaCommit, Segment, SegmentCommit,
    SegmentFile, Store, StoreExt, DEFAULT_PARTITION_NAME,
};

/// Ids of a seeded collection
#[derive(Debug, Clone)]
pub struct SeededCollection {
    /// Collection id
    pub collection_id: Id,
    /// Root CollectionCommit id
    pub commit_id: Id,
    /// SchemaCommit id
    pub schema_id: Id,
    /// The "vector" field
    pub field_id: Id,
    /// The raw element of "vector"
    pub raw_element_id: Id,
    /// The "ivfsq8" element of "vector"
    pub index_element_id: Id,
    /// The "_default" partition
    pub partition_id: Id,
    /// PartitionCommit of "_default"
    pub partition_commit_id: Id,
    /// Segments in "_default"
    pub segment_ids: Vec<Id>,
    /// Every segment file, two per segment (raw then index)
    pub file_ids: Vec<Id>,
}

fn put<T: vecmeta_core::Resource>(store: &Arc<dyn Store>, mut resource: T, lsn: Lsn) -> Result<T> {
    store.allocate(&mut resource)?;
    resource.set_lsn(lsn);
    store.put_resource(resource.clone())?;
    Ok(resource)
}

/// Seed collection `name` with a "vector" field (raw + ivfsq8 elements) and
/// `segments` segments of 100 rows in "_default", each with a raw and an
/// index file of 10 bytes.
pub fn seed_collection(
    store: &Arc<dyn Store>,
    name: &str,
    segments: usize,
    lsn: Lsn,
) -> Result<SeededCollection> {
    let collection = put(store, Collection::new(name), lsn)?;
    let cid = collection.id;

    let mut field = Field::new("vector", 0, FieldType::Vector);
    field.collection_id = cid;
    let field = put(store, field, lsn)?;
    let raw = put(
        store,
        FieldElement::new(cid, field.id, "raw", FieldElementType::Raw),
        lsn,
    )?;
    let index = put(
        store,
        FieldElement::new(cid, field.id, "ivfsq8", FieldElementType::Ivfsq8),
        lsn,
    )?;
    let fc = put(
        store,
        FieldCommit::new(cid, field.id, Mappings::from([raw.id, index.id])),
        lsn,
    )?;
    let schema = put(store, SchemaCommit::new(cid, Mappings::from([fc.id])), lsn)?;

    let partition = put(store, Partition::new(DEFAULT_PARTITION_NAME, cid), lsn)?;
    let mut segment_ids = Vec::new();
    let mut file_ids = Vec::new();
    let mut segment_commits = Mappings::new();
    let mut rows = 0;
    let mut bytes = 0;
    for _ in 0..segments {
        let segment = put(store, Segment::new(cid, partition.id, 100), lsn)?;
        let mut files = Mappings::new();
        for element in [&raw, &index] {
            let mut file = SegmentFile::new(cid, partition.id, segment.id, element.id);
            file.size = 10;
            file.row_count = 100;
            let file = put(store, file, lsn)?;
            files.insert(file.id);
            file_ids.push(file.id);
        }
        let mut sc = SegmentCommit::new(cid, partition.id, segment.id, files);
        sc.row_count = 100;
        sc.size = 20;
        let sc = put(store, sc, lsn)?;
        segment_commits.insert(sc.id);
        segment_ids.push(segment.id);
        rows += 100;
        bytes += 20;
    }
    let mut pc = PartitionCommit::new(cid, partition.id, segment_commits);
    pc.row_count = rows;
    pc.size = bytes;
    let pc = put(store, pc, lsn)?;

    let mut cc = CollectionCommit::new(cid, schema.id, Mappings::from([pc.id]));
    cc.row_count = rows;
    cc.size = bytes;
    let cc = put(store, cc, lsn)?;

    Ok(SeededCollection {
        collection_id: cid,
        commit_id: cc.id,
        schema_id: schema.id,
        field_id: field.id,
        raw_element_id: raw.id,
        index_element_id: index.id,
        partition_id: partition.id,
        partition_commit_id: pc.id,
        segment_ids,
        file_ids,
    })
}

/// Publish a copy of `seeded`'s root commit with a new id and `lsn`
pub fn recommit(store: &Arc<dyn Store>, seeded: &SeededCollection, lsn: Lsn) -> Result<Id> {
    let current: CollectionCommit = store.get_resource(seeded.commit_id)?;
    let mut next = current;
    next.id = 0;
    let next = put(store, next, lsn)?;
    Ok(next.id)
}
