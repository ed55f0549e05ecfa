//! Segment operations: append, index build and merge

use super::{
    ensure_current, impl_operation, require_latest, CommitTxn, Execute, OperationBase,
    OperationType, Outcome,
};
use crate::catalog::Catalog;
use crate::commit::CommitPlan;
use crate::context::{OperationContext, SegmentFileContext};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use vecmeta_concurrency::{ScopedSnapshot, Snapshot};
use vecmeta_core::{
    Id, MetaError, ResourceKind, Result, Segment, SegmentFile,
};

/// Resolve a file context against `snapshot` for a file of `segment`
fn stage_file(
    catalog: &Catalog,
    snapshot: &Snapshot,
    segment: &Segment,
    context: &SegmentFileContext,
) -> Result<SegmentFile> {
    let element = snapshot.get_field_element(&context.field_name, &context.field_element_name)?;
    let mut file = SegmentFile::new(
        snapshot.collection_id(),
        segment.partition_id,
        segment.id,
        element.id,
    );
    file.size = context.size;
    file.row_count = context.row_count;
    file.id = catalog.allocate_id(ResourceKind::SegmentFile)?;
    Ok(file)
}

fn duplicate_element(files: &[SegmentFile], file: &SegmentFile, context: &SegmentFileContext) -> Result<()> {
    if files
        .iter()
        .any(|f| f.segment_id == file.segment_id && f.field_element_id == file.field_element_id)
    {
        return Err(MetaError::already_exists(format!(
            "file of '{}/{}' on segment {}",
            context.field_name, context.field_element_name, file.segment_id
        )));
    }
    Ok(())
}

/// Staged work that no longer fits the latest snapshot
fn rebase_conflict(parent: &Snapshot, latest: &Snapshot) -> MetaError {
    MetaError::StaleSnapshot {
        collection_id: latest.collection_id(),
        parent: parent.commit_id(),
        current: latest.commit_id(),
    }
}

/// Target segment of a file context when only the staged segment is allowed
fn staged_target<'a>(segment: Option<&'a Segment>, context: &SegmentFileContext) -> Result<&'a Segment> {
    let segment = segment.ok_or_else(|| {
        MetaError::invalid_argument("stage the segment before its files")
    })?;
    match context.segment_id {
        Some(id) if id != segment.id => Err(MetaError::invalid_argument(format!(
            "file targets segment {} but the operation stages segment {}",
            id, segment.id
        ))),
        _ => Ok(segment),
    }
}

/// Add one segment to a partition together with its files
///
/// Strict: any commit to the collection after the parent snapshot fails the
/// push with `StaleSnapshot`.
pub struct NewSegmentOperation {
    base: OperationBase,
    segment: Option<Segment>,
    files: Vec<SegmentFile>,
}

impl NewSegmentOperation {
    /// Stage against `parent`
    pub fn new(catalog: &Arc<Catalog>, context: OperationContext, parent: ScopedSnapshot) -> Self {
        NewSegmentOperation {
            base: OperationBase::new(OperationType::NewSegment, catalog, context, Some(parent)),
            segment: None,
            files: Vec::new(),
        }
    }

    /// Stage the segment in partition `partition_name`
    pub fn commit_new_segment(&mut self, partition_name: &str, row_count: u64) -> Result<Segment> {
        self.base.ensure_staging()?;
        if self.segment.is_some() {
            return Err(MetaError::invalid_argument(
                "a NewSegment operation stages exactly one segment",
            ));
        }
        let parent = self.base.parent()?;
        let partition = parent.get_partition(partition_name)?;
        let mut segment = Segment::new(parent.collection_id(), partition.id, row_count);
        segment.id = self.base.catalog().allocate_id(ResourceKind::Segment)?;
        self.segment = Some(segment.clone());
        Ok(segment)
    }

    /// Stage a file of the staged segment
    pub fn commit_new_segment_file(&mut self, context: SegmentFileContext) -> Result<SegmentFile> {
        self.base.ensure_staging()?;
        let segment = staged_target(self.segment.as_ref(), &context)?;
        let file = stage_file(self.base.catalog(), self.base.parent()?, segment, &context)?;
        duplicate_element(&self.files, &file, &context)?;
        self.files.push(file.clone());
        Ok(file)
    }

    /// Staged segment
    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    /// Staged files
    pub fn files(&self) -> &[SegmentFile] {
        &self.files
    }
}

impl Execute for NewSegmentOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        if self.segment.is_none() {
            return Err(MetaError::invalid_argument("no segment staged"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let parent = self.base.parent()?;
        let latest = require_latest(latest, parent.collection_id())?;
        ensure_current(parent, latest)?;

        let segment = self
            .segment
            .clone()
            .ok_or_else(|| MetaError::invalid_argument("no segment staged"))?;
        let mut plan = CommitPlan::default();
        plan.add_segment(txn.write(segment)?);
        for file in &self.files {
            plan.add_file(txn.write(file.clone())?);
        }
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

/// Attach one index file to an existing segment
///
/// Rebased onto the latest snapshot. If the segment already carries a file
/// of the same element the operation publishes nothing and
/// [`BuildOperation::segment_file`] returns the existing file. A segment
/// merged away or an element dropped since staging fails with
/// `StaleSnapshot`.
pub struct BuildOperation {
    base: OperationBase,
    file: Option<SegmentFile>,
    reused: bool,
}

impl BuildOperation {
    /// Stage against `parent`
    pub fn new(catalog: &Arc<Catalog>, context: OperationContext, parent: ScopedSnapshot) -> Self {
        BuildOperation {
            base: OperationBase::new(OperationType::Build, catalog, context, Some(parent)),
            file: None,
            reused: false,
        }
    }

    /// Stage the file; `context.segment_id` is required
    pub fn commit_new_segment_file(&mut self, context: SegmentFileContext) -> Result<SegmentFile> {
        self.base.ensure_staging()?;
        if self.file.is_some() {
            return Err(MetaError::invalid_argument("a Build operation stages exactly one file"));
        }
        let segment_id = context
            .segment_id
            .ok_or_else(|| MetaError::invalid_argument("Build needs a target segment"))?;
        let parent = self.base.parent()?;
        let segment = parent.get_resource::<Segment>(segment_id)?;
        let element = parent.get_field_element(&context.field_name, &context.field_element_name)?;

        if let Some(existing) = parent.find_segment_file(segment_id, element.id) {
            self.reused = true;
            self.file = Some(existing.to_owned_resource());
            return Ok(existing.to_owned_resource());
        }
        let file = stage_file(self.base.catalog(), parent, &segment, &context)?;
        self.file = Some(file.clone());
        Ok(file)
    }

    /// The built file, or the one already attached
    pub fn segment_file(&self) -> Option<&SegmentFile> {
        self.file.as_ref()
    }

    /// Whether the segment already had the file and nothing was written
    pub fn reused_existing(&self) -> bool {
        self.reused
    }
}

impl Execute for BuildOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(MetaError::invalid_argument("no segment file staged"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let parent = self.base.parent()?;
        let latest = require_latest(latest, parent.collection_id())?;
        let file = self
            .file
            .clone()
            .ok_or_else(|| MetaError::invalid_argument("no segment file staged"))?;
        if !latest.contains(ResourceKind::Segment, file.segment_id) {
            return Err(rebase_conflict(parent, latest));
        }

        if let Some(existing) = latest.find_segment_file(file.segment_id, file.field_element_id) {
            debug!(
                target: "vecmeta::op",
                segment = file.segment_id,
                element = file.field_element_id,
                file = existing.id,
                "Index file already built"
            );
            self.reused = true;
            self.file = Some(existing.to_owned_resource());
            return Ok(Outcome::Unchanged(Some(Arc::clone(latest))));
        }
        if !latest.contains(ResourceKind::FieldElement, file.field_element_id) {
            return Err(rebase_conflict(parent, latest));
        }

        let mut plan = CommitPlan::default();
        plan.add_file(txn.write(file)?);
        Ok(Outcome::Committed(plan.apply(txn, latest)?))
    }
}

/// Replace segments of one partition by a single merged segment
///
/// Rebased onto the latest snapshot as long as every source segment and
/// every field element of the staged files is still live; otherwise the push
/// fails with `StaleSnapshot`.
pub struct MergeOperation {
    base: OperationBase,
    sources: Vec<Id>,
    partition_id: Id,
    source_rows: u64,
    segment: Option<Segment>,
    files: Vec<SegmentFile>,
}

impl MergeOperation {
    /// Merge `sources`, which must be distinct live segments of one partition
    pub fn new(
        catalog: &Arc<Catalog>,
        context: OperationContext,
        parent: ScopedSnapshot,
        sources: Vec<Id>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(MetaError::invalid_argument("merge needs at least one segment"));
        }
        let distinct: BTreeSet<Id> = sources.iter().copied().collect();
        if distinct.len() != sources.len() {
            return Err(MetaError::invalid_argument("merge sources contain duplicates"));
        }

        let mut partitions = BTreeSet::new();
        let mut source_rows = 0;
        for id in &sources {
            let segment = parent.get_resource::<Segment>(*id)?;
            partitions.insert(segment.partition_id);
            source_rows += segment.row_count;
        }
        let partition_id = match partitions.len() {
            1 => partitions.into_iter().next().unwrap_or_default(),
            _ => {
                return Err(MetaError::invalid_argument(
                    "merge sources span several partitions",
                ))
            }
        };

        Ok(MergeOperation {
            base: OperationBase::new(OperationType::Merge, catalog, context, Some(parent)),
            sources,
            partition_id,
            source_rows,
            segment: None,
            files: Vec::new(),
        })
    }

    /// Stage the merged segment; its row count is the sum of the sources'
    pub fn commit_new_segment(&mut self) -> Result<Segment> {
        self.base.ensure_staging()?;
        if self.segment.is_some() {
            return Err(MetaError::invalid_argument("merged segment already staged"));
        }
        let parent = self.base.parent()?;
        let mut segment = Segment::new(parent.collection_id(), self.partition_id, self.source_rows);
        segment.id = self.base.catalog().allocate_id(ResourceKind::Segment)?;
        self.segment = Some(segment.clone());
        Ok(segment)
    }

    /// Stage a file of the merged segment
    pub fn commit_new_segment_file(&mut self, context: SegmentFileContext) -> Result<SegmentFile> {
        self.base.ensure_staging()?;
        let segment = staged_target(self.segment.as_ref(), &context)?;
        let file = stage_file(self.base.catalog(), self.base.parent()?, segment, &context)?;
        duplicate_element(&self.files, &file, &context)?;
        self.files.push(file.clone());
        Ok(file)
    }

    /// Segments being merged
    pub fn sources(&self) -> &[Id] {
        &self.sources
    }

    /// Staged merged segment
    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }
}

impl Execute for MergeOperation {
    fn base(&self) -> &OperationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        &mut self.base
    }

    fn validate(&self) -> Result<()> {
        if self.segment.is_none() {
            return Err(MetaError::invalid_argument("no merged segment staged"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        txn: &mut CommitTxn<'_>,
        latest: Option<&ScopedSnapshot>,
    ) -> Result<Outcome> {
        let parent = self.base.parent()?;
        let latest = require_latest(latest, parent.collection_id())?;
        let sources_live = self
            .sources
            .iter()
            .all(|id| latest.contains(ResourceKind::Segment, *id));
        let elements_live = self
            .files
            .iter()
            .all(|f| latest.contains(ResourceKind::FieldElement, f.field_element_id));
        if !sources_live || !elements_live {
            return Err(rebase_conflict(parent, latest));
        }

        let segment = self
            .segment
            .clone()
            .ok_or_else(|| MetaError::invalid_argument("no merged segment staged"))?;
        let mut plan = CommitPlan::default();
        for id in &self.sources {
            plan.drop_segment(*id);
        }
        plan.add_segment(txn.write(segment)?);
        for file in &self.files {
            plan.add_file(txn.write(file.clone())?);
        }
        let root = plan.apply(txn, latest)?;
        info!(
            target: "vecmeta::op",
            collection = %latest.name(),
            sources = self.sources.len(),
            rows = self.source_rows,
            "Merged segments"
        );
        Ok(Outcome::Committed(root))
    }
}

impl_operation!(NewSegmentOperation, BuildOperation, MergeOperation);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PartitionContext;
    use crate::operations::fixtures::{add_segment, create_indexed_collection, create_partition};
    use crate::operations::{DropPartitionOperation, Operation, OperationState};
    use vecmeta_core::{ErrorKind, RecordState};

    fn with_partition(catalog: &Arc<Catalog>) -> ScopedSnapshot {
        let v1 = create_indexed_collection(catalog, "C", 1);
        create_partition(catalog, &v1, "P1", 2)
    }

    #[test]
    fn test_new_segment_with_file() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);

        let mut op = NewSegmentOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v2));
        let segment = op.commit_new_segment("P1", 100).unwrap();
        let file = op
            .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").with_stats(32, 100))
            .unwrap();
        op.push().unwrap();
        let v3 = op.snapshot().unwrap();

        let p1 = v3.get_partition("P1").unwrap();
        let segments = v3.get_partition_segments(p1.id).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, segment.id);
        let files = v3.get_segment_files(segment.id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, file.id);
        assert_eq!(files[0].lsn, 4);
        assert_eq!(v3.row_count(), 100);
        assert_eq!(v3.size(), 32);
        assert_eq!(v3.lsn(), 4);
        assert!(v2.get_partition_segments(p1.id).unwrap().is_empty());
    }

    #[test]
    fn test_stale_new_segment_rejected() {
        let catalog = Catalog::ephemeral().unwrap();
        let v1 = with_partition(&catalog);

        let mut op = NewSegmentOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v1));
        let segment = op.commit_new_segment("P1", 10).unwrap();
        op.commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8"))
            .unwrap();

        let mut drop_op = DropPartitionOperation::new(
            &catalog,
            OperationContext::new(3),
            Arc::clone(&v1),
            PartitionContext::new("P1"),
        );
        drop_op.push().unwrap();
        let v2 = drop_op.snapshot().unwrap();

        let err = op.push().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleSnapshot);
        assert_eq!(op.state(), OperationState::Failed);
        assert!(op.written().is_empty());
        assert!(catalog.load::<Segment>(segment.id).is_err());

        let current = catalog.get_snapshot("C").unwrap();
        assert_eq!(current.commit_id(), v2.commit_id());
        assert_eq!(current.partition_names(), vec!["_default".to_string()]);
    }

    #[test]
    fn test_segment_rules() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let mut op = NewSegmentOperation::new(&catalog, OperationContext::new(3), v2);

        let err = op
            .commit_new_segment_file(SegmentFileContext::new("vector", "raw"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            op.commit_new_segment("nope", 1).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        op.commit_new_segment("P1", 1).unwrap();
        assert_eq!(
            op.commit_new_segment("P1", 1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        op.commit_new_segment_file(SegmentFileContext::new("vector", "raw"))
            .unwrap();
        assert_eq!(
            op.commit_new_segment_file(SegmentFileContext::new("vector", "raw"))
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            op.commit_new_segment_file(SegmentFileContext::new("vector", "hnsw"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(op.files().len(), 1);
    }

    #[test]
    fn test_build_attaches_index_file() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, segment) = add_segment(&catalog, &v2, "P1", 50, &["raw"], 8, 3);

        let mut op = BuildOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v3));
        let file = op
            .commit_new_segment_file(
                SegmentFileContext::new("vector", "ivfsq8")
                    .for_segment(segment.id)
                    .with_stats(16, 50),
            )
            .unwrap();
        op.push().unwrap();
        assert!(!op.reused_existing());
        let v4 = op.snapshot().unwrap();
        assert_eq!(v4.get_segment_files(segment.id).unwrap().len(), 2);
        assert_eq!(v4.size(), 24);
        assert_eq!(op.segment_file().unwrap().id, file.id);
    }

    #[test]
    fn test_identical_builds_produce_one_file() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, segment) = add_segment(&catalog, &v2, "P1", 50, &["raw"], 8, 3);

        let context = SegmentFileContext::new("vector", "ivfsq8")
            .for_segment(segment.id)
            .with_stats(16, 50);
        let mut first = BuildOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v3));
        let mut second = BuildOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v3));
        first.commit_new_segment_file(context.clone()).unwrap();
        second.commit_new_segment_file(context).unwrap();

        first.push().unwrap();
        let published = first.snapshot().unwrap();
        second.push().unwrap();

        assert!(second.reused_existing());
        assert!(second.written().is_empty());
        assert_eq!(
            second.segment_file().unwrap().id,
            first.segment_file().unwrap().id
        );
        assert_eq!(second.snapshot().unwrap().commit_id(), published.commit_id());
        assert_eq!(catalog.get_snapshot("C").unwrap().commit_id(), published.commit_id());
        assert_eq!(published.get_segment_files(segment.id).unwrap().len(), 2);
    }

    #[test]
    fn test_build_against_existing_file_reuses_it() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, segment) = add_segment(&catalog, &v2, "P1", 5, &["raw", "ivfsq8"], 8, 3);
        let existing = v3
            .get_segment_files(segment.id)
            .unwrap()
            .into_iter()
            .find(|f| f.field_element_id == v3.get_field_element("vector", "ivfsq8").unwrap().id)
            .unwrap();

        let mut op = BuildOperation::new(&catalog, OperationContext::new(4), Arc::clone(&v3));
        let file = op
            .commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").for_segment(segment.id))
            .unwrap();
        assert_eq!(file.id, existing.id);
        op.push().unwrap();
        assert!(op.reused_existing());
        assert_eq!(op.snapshot().unwrap().commit_id(), v3.commit_id());
    }

    #[test]
    fn test_build_requires_segment() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let mut op = BuildOperation::new(&catalog, OperationContext::new(3), v2);
        assert_eq!(
            op.commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8"))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            op.commit_new_segment_file(SegmentFileContext::new("vector", "ivfsq8").for_segment(999))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_merge_replaces_sources() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, s1) = add_segment(&catalog, &v2, "P1", 10, &["raw"], 4, 3);
        let (v4, s2) = add_segment(&catalog, &v3, "P1", 20, &["raw"], 6, 4);
        let old_files: Vec<Id> = [s1.id, s2.id]
            .iter()
            .flat_map(|id| v4.get_segment_files(*id).unwrap())
            .map(|f| f.id)
            .collect();

        let mut op = MergeOperation::new(
            &catalog,
            OperationContext::new(5),
            Arc::clone(&v4),
            vec![s1.id, s2.id],
        )
        .unwrap();
        let merged = op.commit_new_segment().unwrap();
        assert_eq!(merged.row_count, 30);
        op.commit_new_segment_file(SegmentFileContext::new("vector", "raw").with_stats(10, 30))
            .unwrap();
        op.push().unwrap();
        let v5 = op.snapshot().unwrap();

        let p1 = v5.get_partition("P1").unwrap();
        let segments = v5.get_partition_segments(p1.id).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, merged.id);
        assert!(!v5.contains(ResourceKind::Segment, s1.id));
        assert!(!v5.contains(ResourceKind::Segment, s2.id));
        assert_eq!(v5.row_count(), 30);
        assert_eq!(v5.size(), 10);
        for id in old_files {
            assert!(!v5.contains(ResourceKind::SegmentFile, id));
            assert_eq!(
                catalog.record_state(ResourceKind::SegmentFile, id).unwrap(),
                RecordState::SoftDeleted
            );
        }
        assert_eq!(v4.get_partition_segments(p1.id).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_with_vanished_source_is_stale() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, s1) = add_segment(&catalog, &v2, "P1", 10, &["raw"], 4, 3);
        let (v4, s2) = add_segment(&catalog, &v3, "P1", 20, &["raw"], 6, 4);

        let mut first = MergeOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v4), vec![s1.id, s2.id]).unwrap();
        let mut second = MergeOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v4), vec![s1.id]).unwrap();
        first.commit_new_segment().unwrap();
        let merged = second.commit_new_segment().unwrap();
        first.push().unwrap();

        assert_eq!(second.push().unwrap_err().kind(), ErrorKind::StaleSnapshot);
        assert!(catalog.load::<Segment>(merged.id).is_err());
        let current = catalog.get_snapshot("C").unwrap();
        assert_eq!(current.commit_id(), first.snapshot().unwrap().commit_id());
    }

    #[test]
    fn test_merge_rebases_over_unrelated_commits() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, s1) = add_segment(&catalog, &v2, "P1", 10, &["raw"], 4, 3);

        let mut op = MergeOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v3), vec![s1.id]).unwrap();
        op.commit_new_segment().unwrap();
        let (_v4, s2) = add_segment(&catalog, &v3, "_default", 7, &["raw"], 1, 4);
        op.push().unwrap();

        let v5 = op.snapshot().unwrap();
        assert!(v5.contains(ResourceKind::Segment, s2.id));
        assert!(!v5.contains(ResourceKind::Segment, s1.id));
        assert_eq!(v5.row_count(), 17);
    }

    #[test]
    fn test_merge_input_validation() {
        let catalog = Catalog::ephemeral().unwrap();
        let v2 = with_partition(&catalog);
        let (v3, s1) = add_segment(&catalog, &v2, "P1", 10, &["raw"], 4, 3);
        let (v4, s2) = add_segment(&catalog, &v3, "_default", 10, &["raw"], 4, 4);

        let err = |sources: Vec<Id>| {
            MergeOperation::new(&catalog, OperationContext::new(5), Arc::clone(&v4), sources)
                .err()
                .map(|e| e.kind())
        };
        assert_eq!(err(vec![]), Some(ErrorKind::InvalidArgument));
        assert_eq!(err(vec![s1.id, s1.id]), Some(ErrorKind::InvalidArgument));
        assert_eq!(err(vec![s1.id, s2.id]), Some(ErrorKind::InvalidArgument));
        assert_eq!(err(vec![424242]), Some(ErrorKind::NotFound));
        assert_eq!(err(vec![s1.id]), None);
    }
}
