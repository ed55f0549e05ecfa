//! Building new commit trees
//!
//! [`CommitTxn`] persists records for one operation and remembers what it
//! wrote so a failed commit can be rolled back. [`CommitPlan`] collects the
//! additions and removals an operation wants and rewrites the tree of a base
//! snapshot bottom-up: only the commits on a path to a change get a new
//! version, everything else keeps its id.

use std::collections::BTreeSet;
use vecmeta_concurrency::Snapshot;
use vecmeta_core::{
    CollectionCommit, FieldCommit, FieldElement, Id, Lsn, Mappings, MetaError, Partition,
    PartitionCommit, Resource, ResourceKind, Result, SchemaCommit, Segment, SegmentCommit,
    SegmentFile, Store, StoreExt,
};

/// Records written by one operation
pub(crate) struct CommitTxn<'a> {
    store: &'a dyn Store,
    lsn: Lsn,
    written: Vec<(ResourceKind, Id)>,
}

impl<'a> CommitTxn<'a> {
    pub(crate) fn new(store: &'a dyn Store, lsn: Lsn) -> Self {
        CommitTxn {
            store,
            lsn,
            written: Vec::new(),
        }
    }

    /// Allocate an id if needed, stamp the lsn and persist
    pub(crate) fn write<T: Resource>(&mut self, mut resource: T) -> Result<T> {
        self.store.allocate(&mut resource)?;
        resource.set_lsn(self.lsn);
        self.store.put_resource(resource.clone())?;
        self.written.push((T::KIND, resource.id()));
        Ok(resource)
    }

    pub(crate) fn written(&self) -> &[(ResourceKind, Id)] {
        &self.written
    }

    pub(crate) fn into_written(self) -> Vec<(ResourceKind, Id)> {
        self.written
    }
}

/// Changes to apply on top of a base snapshot
///
/// Added records must already be written through the same [`CommitTxn`].
#[derive(Debug, Default)]
pub(crate) struct CommitPlan {
    new_partitions: Vec<Partition>,
    dropped_partitions: BTreeSet<Id>,
    new_segments: Vec<Segment>,
    dropped_segments: BTreeSet<Id>,
    new_files: Vec<SegmentFile>,
    dropped_files: BTreeSet<Id>,
    new_elements: Vec<FieldElement>,
    dropped_elements: BTreeSet<Id>,
}

struct Aggregate {
    commit_id: Id,
    row_count: u64,
    size: u64,
}

impl CommitPlan {
    pub(crate) fn add_partition(&mut self, partition: Partition) {
        self.new_partitions.push(partition);
    }

    pub(crate) fn drop_partition(&mut self, partition_id: Id) {
        self.dropped_partitions.insert(partition_id);
    }

    pub(crate) fn add_segment(&mut self, segment: Segment) {
        self.new_segments.push(segment);
    }

    pub(crate) fn drop_segment(&mut self, segment_id: Id) {
        self.dropped_segments.insert(segment_id);
    }

    pub(crate) fn add_file(&mut self, file: SegmentFile) {
        self.new_files.push(file);
    }

    pub(crate) fn drop_file(&mut self, file_id: Id) {
        self.dropped_files.insert(file_id);
    }

    pub(crate) fn add_element(&mut self, element: FieldElement) {
        self.new_elements.push(element);
    }

    pub(crate) fn drop_element(&mut self, element_id: Id) {
        self.dropped_elements.insert(element_id);
    }

    fn touches_schema(&self) -> bool {
        !self.new_elements.is_empty() || !self.dropped_elements.is_empty()
    }

    /// Every addition must hang off something live in `base` or added here
    fn check_targets(&self, base: &Snapshot) -> Result<()> {
        for partition_id in &self.dropped_partitions {
            base.get_resource::<Partition>(*partition_id)?;
        }
        for segment_id in &self.dropped_segments {
            base.get_resource::<Segment>(*segment_id)?;
        }
        for element_id in &self.dropped_elements {
            base.get_resource::<FieldElement>(*element_id)?;
        }

        let partition_live = |id: Id| {
            (base.contains(ResourceKind::Partition, id) && !self.dropped_partitions.contains(&id))
                || self.new_partitions.iter().any(|p| p.id == id)
        };
        for segment in &self.new_segments {
            if !partition_live(segment.partition_id) {
                return Err(MetaError::resource_not_found(
                    ResourceKind::Partition,
                    segment.partition_id,
                ));
            }
        }

        let segment_live = |id: Id| {
            (base.contains(ResourceKind::Segment, id) && !self.dropped_segments.contains(&id))
                || self.new_segments.iter().any(|s| s.id == id)
        };
        for file in &self.new_files {
            if !segment_live(file.segment_id) {
                return Err(MetaError::resource_not_found(
                    ResourceKind::Segment,
                    file.segment_id,
                ));
            }
        }

        for element in &self.new_elements {
            if !base.contains(ResourceKind::Field, element.field_id) {
                return Err(MetaError::resource_not_found(
                    ResourceKind::Field,
                    element.field_id,
                ));
            }
        }
        Ok(())
    }

    fn file_size(&self, base: &Snapshot, file_id: Id) -> Result<u64> {
        match self.new_files.iter().find(|f| f.id == file_id) {
            Some(file) => Ok(file.size),
            None => Ok(base.get_resource::<SegmentFile>(file_id)?.size),
        }
    }

    fn write_segment_commit(
        &self,
        txn: &mut CommitTxn<'_>,
        base: &Snapshot,
        segment: &Segment,
        files: Mappings,
    ) -> Result<Aggregate> {
        let mut size = 0;
        for file_id in &files {
            size += self.file_size(base, *file_id)?;
        }
        let mut sc = SegmentCommit::new(base.collection_id(), segment.partition_id, segment.id, files);
        sc.row_count = segment.row_count;
        sc.size = size;
        let sc = txn.write(sc)?;
        Ok(Aggregate {
            commit_id: sc.id,
            row_count: sc.row_count,
            size: sc.size,
        })
    }

    fn new_files_of(&self, segment_id: Id) -> impl Iterator<Item = Id> + '_ {
        self.new_files
            .iter()
            .filter(move |f| f.segment_id == segment_id)
            .map(|f| f.id)
    }

    fn rewrite_partition(
        &self,
        txn: &mut CommitTxn<'_>,
        base: &Snapshot,
        partition_id: Id,
        current: Option<&PartitionCommit>,
    ) -> Result<Aggregate> {
        let mut segment_commits = Mappings::new();
        let mut changed = current.is_none();
        let mut row_count = 0;
        let mut size = 0;

        if let Some(pc) = current {
            for sc_id in &pc.mappings {
                let sc = base.get_resource::<SegmentCommit>(*sc_id)?;
                if self.dropped_segments.contains(&sc.segment_id) {
                    changed = true;
                    continue;
                }
                let mut files = sc.mappings.clone();
                files.retain(|id| !self.dropped_files.contains(id));
                files.extend(self.new_files_of(sc.segment_id));

                let aggregate = if files == sc.mappings {
                    Aggregate {
                        commit_id: sc.id,
                        row_count: sc.row_count,
                        size: sc.size,
                    }
                } else {
                    changed = true;
                    let segment = base.get_resource::<Segment>(sc.segment_id)?;
                    self.write_segment_commit(txn, base, &segment, files)?
                };
                segment_commits.insert(aggregate.commit_id);
                row_count += aggregate.row_count;
                size += aggregate.size;
            }
        }

        for segment in self.new_segments.iter().filter(|s| s.partition_id == partition_id) {
            changed = true;
            let files: Mappings = self.new_files_of(segment.id).collect();
            let aggregate = self.write_segment_commit(txn, base, segment, files)?;
            segment_commits.insert(aggregate.commit_id);
            row_count += aggregate.row_count;
            size += aggregate.size;
        }

        if let (false, Some(pc)) = (changed, current) {
            return Ok(Aggregate {
                commit_id: pc.id,
                row_count: pc.row_count,
                size: pc.size,
            });
        }

        let mut pc = PartitionCommit::new(base.collection_id(), partition_id, segment_commits);
        pc.row_count = row_count;
        pc.size = size;
        let pc = txn.write(pc)?;
        Ok(Aggregate {
            commit_id: pc.id,
            row_count,
            size,
        })
    }

    fn rewrite_schema(&self, txn: &mut CommitTxn<'_>, base: &Snapshot) -> Result<Id> {
        let schema = base.get_schema_commit();
        if !self.touches_schema() {
            return Ok(schema.id);
        }

        let mut field_commits = Mappings::new();
        for fc_id in &schema.mappings {
            let fc = base.get_resource::<FieldCommit>(*fc_id)?;
            let mut elements = fc.mappings.clone();
            elements.retain(|id| !self.dropped_elements.contains(id));
            elements.extend(
                self.new_elements
                    .iter()
                    .filter(|e| e.field_id == fc.field_id)
                    .map(|e| e.id),
            );
            if elements == fc.mappings {
                field_commits.insert(fc.id);
            } else {
                let next = txn.write(FieldCommit::new(base.collection_id(), fc.field_id, elements))?;
                field_commits.insert(next.id);
            }
        }
        let schema = txn.write(SchemaCommit::new(base.collection_id(), field_commits))?;
        Ok(schema.id)
    }

    /// Write every commit on a path to a change, ending with the new root
    pub(crate) fn apply(&self, txn: &mut CommitTxn<'_>, base: &Snapshot) -> Result<CollectionCommit> {
        self.check_targets(base)?;
        let schema_id = self.rewrite_schema(txn, base)?;

        let mut partition_commits = Mappings::new();
        let mut row_count = 0;
        let mut size = 0;
        for pc in base.get_resources::<PartitionCommit>() {
            if self.dropped_partitions.contains(&pc.partition_id) {
                continue;
            }
            let aggregate = self.rewrite_partition(txn, base, pc.partition_id, Some(&*pc))?;
            partition_commits.insert(aggregate.commit_id);
            row_count += aggregate.row_count;
            size += aggregate.size;
        }
        for partition in &self.new_partitions {
            let aggregate = self.rewrite_partition(txn, base, partition.id, None)?;
            partition_commits.insert(aggregate.commit_id);
            row_count += aggregate.row_count;
            size += aggregate.size;
        }

        let mut cc = CollectionCommit::new(base.collection_id(), schema_id, partition_commits);
        cc.row_count = row_count;
        cc.size = size;
        txn.write(cc)
    }
}
