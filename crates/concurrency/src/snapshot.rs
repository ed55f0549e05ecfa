//! Collection snapshots
//!
//! A [`Snapshot`] is the fully resolved tree under one CollectionCommit.
//! Construction loads every reachable commit and resource through the
//! holders and keeps a [`Scoped`] pin on each, so nothing a snapshot can
//! return is ever hard-deleted while the snapshot lives.
//!
//! Snapshots never change after construction. Commits own ids only; parent
//! pointers such as `Segment::partition_id` are resolved through the
//! snapshot's indexes, never through ownership.

use crate::holder::{Held, Holders};
use crate::iterate::IterateHandler;
use crate::scoped::Scoped;
use std::collections::{BTreeMap, BTreeSet};
use vecmeta_core::{
    Collection, CollectionCommit, Field, FieldCommit, FieldElement, Id, Lsn, MetaError,
    Partition, PartitionCommit, Resource, ResourceKind, Result, SchemaCommit, Segment,
    SegmentCommit, SegmentFile,
};

/// Shared handle on an installed snapshot
pub type ScopedSnapshot = std::sync::Arc<Snapshot>;

/// Pinned resources of a snapshot, one table per kind
#[derive(Debug, Default)]
pub struct ResourceTables {
    collections: BTreeMap<Id, Scoped<Collection>>,
    fields: BTreeMap<Id, Scoped<Field>>,
    field_elements: BTreeMap<Id, Scoped<FieldElement>>,
    partitions: BTreeMap<Id, Scoped<Partition>>,
    segments: BTreeMap<Id, Scoped<Segment>>,
    segment_files: BTreeMap<Id, Scoped<SegmentFile>>,
    collection_commits: BTreeMap<Id, Scoped<CollectionCommit>>,
    schema_commits: BTreeMap<Id, Scoped<SchemaCommit>>,
    field_commits: BTreeMap<Id, Scoped<FieldCommit>>,
    partition_commits: BTreeMap<Id, Scoped<PartitionCommit>>,
    segment_commits: BTreeMap<Id, Scoped<SegmentCommit>>,
}

/// Resource types a snapshot can enumerate
pub trait SnapshotResource: Held {
    /// The snapshot table for this type
    fn table(tables: &ResourceTables) -> &BTreeMap<Id, Scoped<Self>>;

    /// Mutable table, used while resolving the tree
    fn table_mut(tables: &mut ResourceTables) -> &mut BTreeMap<Id, Scoped<Self>>;
}

macro_rules! impl_tables {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl SnapshotResource for $ty {
                fn table(tables: &ResourceTables) -> &BTreeMap<Id, Scoped<Self>> {
                    &tables.$field
                }

                fn table_mut(tables: &mut ResourceTables) -> &mut BTreeMap<Id, Scoped<Self>> {
                    &mut tables.$field
                }
            }
        )*

        impl ResourceTables {
            /// Whether `(kind, id)` is pinned by this snapshot
            pub fn contains(&self, kind: ResourceKind, id: Id) -> bool {
                match kind {
                    $(ResourceKind::$ty => self.$field.contains_key(&id),)*
                }
            }

            /// Ids of `kind` in this snapshot, ascending
            pub fn ids(&self, kind: ResourceKind) -> Vec<Id> {
                match kind {
                    $(ResourceKind::$ty => self.$field.keys().copied().collect(),)*
                }
            }

            /// Total number of pinned resources
            pub fn len(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            /// Whether no resource is pinned
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }
    };
}

impl_tables!(
    Collection => collections,
    Field => fields,
    FieldElement => field_elements,
    Partition => partitions,
    Segment => segments,
    SegmentFile => segment_files,
    CollectionCommit => collection_commits,
    SchemaCommit => schema_commits,
    FieldCommit => field_commits,
    PartitionCommit => partition_commits,
    SegmentCommit => segment_commits,
);

/// Immutable view of one collection at one CollectionCommit
#[derive(Debug)]
pub struct Snapshot {
    commit: Scoped<CollectionCommit>,
    collection: Scoped<Collection>,
    schema: Scoped<SchemaCommit>,
    tables: ResourceTables,
    partition_names: BTreeMap<String, Id>,
    field_names: BTreeMap<String, Id>,
    element_names: BTreeMap<(Id, String), Id>,
    partition_commit_of: BTreeMap<Id, Id>,
    segment_commit_of: BTreeMap<Id, Id>,
    field_commit_of: BTreeMap<Id, Id>,
}

/// Records that `child` belongs to the expected collection
fn check_owner<T: Resource>(child: &T, collection_id: Id) -> Result<()> {
    if child.collection_id() != collection_id {
        return Err(MetaError::internal(format!(
            "{} {} belongs to collection {}, expected {}",
            T::KIND,
            child.id(),
            child.collection_id(),
            collection_id
        )));
    }
    Ok(())
}

fn insert<T: SnapshotResource>(tables: &mut ResourceTables, scoped: Scoped<T>) {
    T::table_mut(tables).insert(scoped.id(), scoped);
}

fn insert_name(index: &mut BTreeMap<String, Id>, kind: ResourceKind, name: &str, id: Id) -> Result<()> {
    if let Some(existing) = index.insert(name.to_string(), id) {
        return Err(MetaError::internal(format!(
            "duplicate {} name '{}' ({} and {})",
            kind, name, existing, id
        )));
    }
    Ok(())
}

impl Snapshot {
    /// Resolve the tree under CollectionCommit `commit_id`
    ///
    /// # Errors
    ///
    /// `NotFound` if the root commit does not exist; `Internal` if any
    /// mapping dangles or a child belongs to another collection.
    pub fn load(holders: &Holders, commit_id: Id) -> Result<Snapshot> {
        let commit = holders.load::<CollectionCommit>(commit_id)?;
        let collection_id = commit.collection_id;
        let collection = holders.load_child::<Collection>(
            ResourceKind::CollectionCommit,
            commit_id,
            collection_id,
        )?;
        let schema =
            holders.load_child::<SchemaCommit>(ResourceKind::CollectionCommit, commit_id, commit.schema_id)?;
        check_owner(&*schema, collection_id)?;

        let mut tables = ResourceTables::default();
        let mut partition_names = BTreeMap::new();
        let mut field_names = BTreeMap::new();
        let mut element_names = BTreeMap::new();
        let mut partition_commit_of = BTreeMap::new();
        let mut segment_commit_of = BTreeMap::new();
        let mut field_commit_of = BTreeMap::new();

        // Schema subtree
        for &fc_id in schema.mappings.iter() {
            let fc = holders.load_child::<FieldCommit>(ResourceKind::SchemaCommit, schema.id, fc_id)?;
            check_owner(&*fc, collection_id)?;
            let field = holders.load_child::<Field>(ResourceKind::FieldCommit, fc_id, fc.field_id)?;
            check_owner(&*field, collection_id)?;
            insert_name(&mut field_names, ResourceKind::Field, &field.name, field.id)?;

            for &fe_id in fc.mappings.iter() {
                let element =
                    holders.load_child::<FieldElement>(ResourceKind::FieldCommit, fc_id, fe_id)?;
                check_owner(&*element, collection_id)?;
                if element.field_id != field.id {
                    return Err(MetaError::internal(format!(
                        "field element {} belongs to field {}, listed under field {}",
                        element.id, element.field_id, field.id
                    )));
                }
                if element_names
                    .insert((field.id, element.name.clone()), element.id)
                    .is_some()
                {
                    return Err(MetaError::internal(format!(
                        "duplicate field element name '{}' on field '{}'",
                        element.name, field.name
                    )));
                }
                insert(&mut tables, element);
            }

            field_commit_of.insert(field.id, fc.id);
            insert(&mut tables, field);
            insert(&mut tables, fc);
        }

        // Data subtree
        for &pc_id in commit.mappings.iter() {
            let pc =
                holders.load_child::<PartitionCommit>(ResourceKind::CollectionCommit, commit_id, pc_id)?;
            check_owner(&*pc, collection_id)?;
            let partition =
                holders.load_child::<Partition>(ResourceKind::PartitionCommit, pc_id, pc.partition_id)?;
            check_owner(&*partition, collection_id)?;
            insert_name(&mut partition_names, ResourceKind::Partition, &partition.name, partition.id)?;

            for &sc_id in pc.mappings.iter() {
                let sc =
                    holders.load_child::<SegmentCommit>(ResourceKind::PartitionCommit, pc_id, sc_id)?;
                check_owner(&*sc, collection_id)?;
                let segment =
                    holders.load_child::<Segment>(ResourceKind::SegmentCommit, sc_id, sc.segment_id)?;
                if segment.partition_id != partition.id {
                    return Err(MetaError::internal(format!(
                        "segment {} belongs to partition {}, listed under partition {}",
                        segment.id, segment.partition_id, partition.id
                    )));
                }

                for &sf_id in sc.mappings.iter() {
                    let file =
                        holders.load_child::<SegmentFile>(ResourceKind::SegmentCommit, sc_id, sf_id)?;
                    if file.segment_id != segment.id {
                        return Err(MetaError::internal(format!(
                            "segment file {} belongs to segment {}, listed under segment {}",
                            file.id, file.segment_id, segment.id
                        )));
                    }
                    insert(&mut tables, file);
                }

                segment_commit_of.insert(segment.id, sc.id);
                insert(&mut tables, segment);
                insert(&mut tables, sc);
            }

            partition_commit_of.insert(partition.id, pc.id);
            insert(&mut tables, partition);
            insert(&mut tables, pc);
        }

        insert(&mut tables, collection.clone());
        insert(&mut tables, schema.clone());
        insert(&mut tables, commit.clone());

        Ok(Snapshot {
            commit,
            collection,
            schema,
            tables,
            partition_names,
            field_names,
            element_names,
            partition_commit_of,
            segment_commit_of,
            field_commit_of,
        })
    }

    // ========================================================================
    // Root accessors
    // ========================================================================

    /// The root CollectionCommit
    pub fn get_collection_commit(&self) -> &Scoped<CollectionCommit> {
        &self.commit
    }

    /// The collection record
    pub fn get_collection(&self) -> &Scoped<Collection> {
        &self.collection
    }

    /// The schema commit in effect
    pub fn get_schema_commit(&self) -> &Scoped<SchemaCommit> {
        &self.schema
    }

    /// Id of the root commit; snapshots are addressed by it
    pub fn commit_id(&self) -> Id {
        self.commit.id
    }

    /// Collection id
    pub fn collection_id(&self) -> Id {
        self.collection.id
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.collection.name
    }

    /// Lsn stored on the root commit
    pub fn lsn(&self) -> Lsn {
        self.commit.lsn
    }

    /// Total rows across partitions
    pub fn row_count(&self) -> u64 {
        self.commit.row_count
    }

    /// Total bytes across partitions
    pub fn size(&self) -> u64 {
        self.commit.size
    }

    // ========================================================================
    // Generic lookup
    // ========================================================================

    /// Pin a reachable resource by id
    pub fn get_resource<T: SnapshotResource>(&self, id: Id) -> Result<Scoped<T>> {
        T::table(&self.tables)
            .get(&id)
            .cloned()
            .ok_or_else(|| MetaError::resource_not_found(T::KIND, id))
    }

    /// Every reachable resource of type T, in id order
    pub fn get_resources<T: SnapshotResource>(&self) -> Vec<Scoped<T>> {
        T::table(&self.tables).values().cloned().collect()
    }

    /// Ids of every reachable resource of type T, ascending
    pub fn get_resource_ids<T: SnapshotResource>(&self) -> Vec<Id> {
        T::table(&self.tables).keys().copied().collect()
    }

    /// Whether `(kind, id)` is reachable from the root
    pub fn contains(&self, kind: ResourceKind, id: Id) -> bool {
        self.tables.contains(kind, id)
    }

    /// Every reachable `(kind, id)` pair
    pub fn resource_ids(&self) -> BTreeSet<(ResourceKind, Id)> {
        let mut out = BTreeSet::new();
        for kind in ResourceKind::ALL {
            for id in self.tables.ids(kind) {
                out.insert((kind, id));
            }
        }
        out
    }

    /// Number of pinned resources
    pub fn resource_count(&self) -> usize {
        self.tables.len()
    }

    /// Walk every reachable T in id order
    pub fn iterate<T, H>(&self, handler: &mut H) -> Result<()>
    where
        T: SnapshotResource,
        H: IterateHandler<T> + ?Sized,
    {
        handler.pre_iterate()?;
        for resource in T::table(&self.tables).values() {
            handler.handle(resource)?;
        }
        handler.post_iterate()
    }

    // ========================================================================
    // Partitions and segments
    // ========================================================================

    /// Partition by name
    pub fn get_partition(&self, name: &str) -> Result<Scoped<Partition>> {
        let id = self
            .partition_names
            .get(name)
            .ok_or_else(|| MetaError::not_found(format!("partition '{}' in '{}'", name, self.name())))?;
        self.get_resource(*id)
    }

    /// Whether a partition with this name is live
    pub fn has_partition(&self, name: &str) -> bool {
        self.partition_names.contains_key(name)
    }

    /// Live partition names in name order
    pub fn partition_names(&self) -> Vec<String> {
        self.partition_names.keys().cloned().collect()
    }

    /// Commit currently describing a partition
    pub fn get_partition_commit(&self, partition_id: Id) -> Result<Scoped<PartitionCommit>> {
        let id = self
            .partition_commit_of
            .get(&partition_id)
            .ok_or_else(|| MetaError::resource_not_found(ResourceKind::Partition, partition_id))?;
        self.get_resource(*id)
    }

    /// Live segments of a partition, in id order
    pub fn get_partition_segments(&self, partition_id: Id) -> Result<Vec<Scoped<Segment>>> {
        let pc = self.get_partition_commit(partition_id)?;
        pc.mappings
            .iter()
            .map(|sc_id| {
                let sc = self.get_resource::<SegmentCommit>(*sc_id)?;
                self.get_resource::<Segment>(sc.segment_id)
            })
            .collect::<Result<Vec<_>>>()
            .map(|mut segments| {
                segments.sort_by_key(|s| s.id);
                segments
            })
    }

    /// Commit currently describing a segment
    pub fn get_segment_commit(&self, segment_id: Id) -> Result<Scoped<SegmentCommit>> {
        let id = self
            .segment_commit_of
            .get(&segment_id)
            .ok_or_else(|| MetaError::resource_not_found(ResourceKind::Segment, segment_id))?;
        self.get_resource(*id)
    }

    /// Files of a segment, in id order
    pub fn get_segment_files(&self, segment_id: Id) -> Result<Vec<Scoped<SegmentFile>>> {
        let sc = self.get_segment_commit(segment_id)?;
        sc.mappings
            .iter()
            .map(|id| self.get_resource::<SegmentFile>(*id))
            .collect()
    }

    /// The file of a segment carrying `field_element_id`, if any
    pub fn find_segment_file(&self, segment_id: Id, field_element_id: Id) -> Option<Scoped<SegmentFile>> {
        let sc = self.get_segment_commit(segment_id).ok()?;
        sc.mappings
            .iter()
            .filter_map(|id| self.get_resource::<SegmentFile>(*id).ok())
            .find(|f| f.field_element_id == field_element_id)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Field by name
    pub fn get_field(&self, name: &str) -> Result<Scoped<Field>> {
        let id = self
            .field_names
            .get(name)
            .ok_or_else(|| MetaError::not_found(format!("field '{}' in '{}'", name, self.name())))?;
        self.get_resource(*id)
    }

    /// Live field names in name order
    pub fn field_names(&self) -> Vec<String> {
        self.field_names.keys().cloned().collect()
    }

    /// Commit currently describing a field
    pub fn get_field_commit(&self, field_id: Id) -> Result<Scoped<FieldCommit>> {
        let id = self
            .field_commit_of
            .get(&field_id)
            .ok_or_else(|| MetaError::resource_not_found(ResourceKind::Field, field_id))?;
        self.get_resource(*id)
    }

    /// Elements attached to a field, in id order
    pub fn get_field_elements(&self, field_id: Id) -> Result<Vec<Scoped<FieldElement>>> {
        let fc = self.get_field_commit(field_id)?;
        fc.mappings
            .iter()
            .map(|id| self.get_resource::<FieldElement>(*id))
            .collect()
    }

    /// Element of a field by names
    pub fn get_field_element(&self, field_name: &str, element_name: &str) -> Result<Scoped<FieldElement>> {
        let field = self.get_field(field_name)?;
        let id = self
            .element_names
            .get(&(field.id, element_name.to_string()))
            .ok_or_else(|| {
                MetaError::not_found(format!(
                    "field element '{}' on field '{}'",
                    element_name, field_name
                ))
            })?;
        self.get_resource(*id)
    }
}
