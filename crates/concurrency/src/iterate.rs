//! Typed snapshot iteration
//!
//! [`Snapshot::iterate`](crate::Snapshot::iterate) walks every reachable
//! resource of one type in id order and feeds it to an [`IterateHandler`].
//! An error from any hook stops the walk; `post_iterate` runs only after a
//! complete walk.

use vecmeta_core::{Id, Partition, Result, SegmentFile};

/// Visitor over the resources of one type in a snapshot
pub trait IterateHandler<T> {
    /// Called once before the first resource
    fn pre_iterate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called for each resource in id order
    fn handle(&mut self, resource: &T) -> Result<()>;

    /// Called once after the last resource, only if no hook failed
    fn post_iterate(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects partition names in partition id order
#[derive(Debug, Default)]
pub struct PartitionCollector {
    names: Vec<String>,
}

impl PartitionCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Names collected so far
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Consume the collector
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

impl IterateHandler<Partition> for PartitionCollector {
    fn pre_iterate(&mut self) -> Result<()> {
        self.names.clear();
        Ok(())
    }

    fn handle(&mut self, partition: &Partition) -> Result<()> {
        self.names.push(partition.name.clone());
        Ok(())
    }
}

/// Collects ids of segment files accepted by a predicate
pub struct SegmentFileCollector<F> {
    filter: F,
    ids: Vec<Id>,
}

impl<F> SegmentFileCollector<F>
where
    F: FnMut(&SegmentFile) -> bool,
{
    /// Collect files for which `filter` returns true
    pub fn new(filter: F) -> Self {
        SegmentFileCollector {
            filter,
            ids: Vec::new(),
        }
    }

    /// Ids collected so far
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Consume the collector
    pub fn into_ids(self) -> Vec<Id> {
        self.ids
    }
}

impl<F> IterateHandler<SegmentFile> for SegmentFileCollector<F>
where
    F: FnMut(&SegmentFile) -> bool,
{
    fn pre_iterate(&mut self) -> Result<()> {
        self.ids.clear();
        Ok(())
    }

    fn handle(&mut self, file: &SegmentFile) -> Result<()> {
        if (self.filter)(file) {
            self.ids.push(file.id);
        }
        Ok(())
    }
}
