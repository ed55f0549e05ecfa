//! Startup recovery
//!
//! Rebuilds the snapshots registry from whatever the store holds:
//!
//! 1. For every live Collection, install the snapshot of its highest live
//!    CollectionCommit that loads cleanly. A collection with no usable
//!    commit was never published and is soft-deleted.
//! 2. Soft-delete every live record no installed snapshot reaches. These are
//!    leftovers of operations interrupted between their first write and the
//!    root commit, or superseded records whose soft delete was lost.
//! 3. Queue every soft-deleted record for garbage collection.

use crate::events::{EventExecutor, GcEvent};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use vecmeta_concurrency::{Holders, Snapshot, Snapshots};
use vecmeta_core::{Collection, CollectionCommit, Id, ResourceKind, Result, Store, StoreExt};

/// Counters reported after recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RecoveryReport {
    pub collections: usize,
    pub abandoned: usize,
    pub swept: usize,
    pub gc_queued: usize,
}

pub(crate) fn recover(
    store: &Arc<dyn Store>,
    holders: &Holders,
    snapshots: &Snapshots,
    events: &EventExecutor,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    let mut commits_of: BTreeMap<Id, Vec<Id>> = BTreeMap::new();
    for commit in store.scan_resources::<CollectionCommit>(|_| true)? {
        commits_of
            .entry(commit.collection_id)
            .or_default()
            .push(commit.id);
    }

    for collection in store.scan_resources::<Collection>(|_| true)? {
        let candidates = commits_of.remove(&collection.id).unwrap_or_default();
        let mut installed = false;
        for commit_id in candidates.into_iter().rev() {
            let snapshot = match Snapshot::load(holders, commit_id) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        target: "vecmeta::catalog",
                        collection = %collection.name,
                        commit = commit_id,
                        error = %e,
                        "Skipping unloadable commit"
                    );
                    continue;
                }
            };
            match snapshots.install(snapshot) {
                Ok(_) => {
                    installed = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        target: "vecmeta::catalog",
                        collection = %collection.name,
                        commit = commit_id,
                        error = %e,
                        "Could not install recovered snapshot"
                    );
                    break;
                }
            }
        }

        if installed {
            report.collections += 1;
        } else {
            warn!(
                target: "vecmeta::catalog",
                collection = %collection.name,
                id = collection.id,
                "Collection has no usable commit, abandoning"
            );
            store.soft_delete(ResourceKind::Collection, collection.id)?;
            report.abandoned += 1;
        }
    }

    let reachable: BTreeSet<(ResourceKind, Id)> = snapshots
        .all()
        .iter()
        .flat_map(|snap| snap.resource_ids())
        .collect();
    for kind in ResourceKind::ALL {
        for record in store.scan(kind, &|_| true)? {
            let id = record.id();
            if !reachable.contains(&(kind, id)) {
                debug!(target: "vecmeta::catalog", %kind, id, "Sweeping unreachable record");
                store.soft_delete(kind, id)?;
                report.swept += 1;
            }
        }
    }

    for kind in ResourceKind::ALL {
        for id in store.soft_deleted_ids(kind)? {
            if events.submit(GcEvent::new(kind, id)) {
                report.gc_queued += 1;
            }
        }
    }

    Ok(report)
}
