//! Log-backed store
//!
//! `DurableStore` keeps the authoritative state in a [`MemoryStore`] and
//! writes every mutation to the record log before applying it. All mutations
//! go through the log mutex, so the in-memory order always matches the log
//! order. Reads never take the log lock.

use crate::format::LogEntry;
use crate::log::{LogCounters, RecordLog};
use crate::mode::DurabilityMode;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vecmeta_core::{
    Id, MetaError, RecordState, ResourceKind, ResourceRecord, Result, Store, StoredRecord,
};
use vecmeta_storage::MemoryStore;

/// Store that persists records in an append-only log
pub struct DurableStore {
    memory: MemoryStore,
    log: Mutex<RecordLog>,
    dir: PathBuf,
}

impl DurableStore {
    /// Open (or create) the store in `dir`, replaying its log.
    pub fn open(dir: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let (log, report) = RecordLog::open(&dir, mode)?;

        let memory = MemoryStore::new();
        let replayed = report.entries.len();
        for entry in report.entries {
            Self::apply(&memory, entry)?;
        }

        info!(
            target: "vecmeta::store",
            dir = %dir.display(),
            mode = mode.description(),
            replayed,
            truncated_bytes = report.truncated_bytes,
            "Opened durable store"
        );

        Ok(DurableStore {
            memory,
            log: Mutex::new(log),
            dir,
        })
    }

    /// Apply one replayed entry to the in-memory state
    fn apply(memory: &MemoryStore, entry: LogEntry) -> Result<()> {
        match entry {
            LogEntry::Put(record) => memory.restore(record, RecordState::Active),
            LogEntry::SoftDelete { kind, id } => {
                let stored = memory.get(kind, id).map_err(|_| {
                    MetaError::corruption(format!("soft delete of unknown {} {}", kind, id))
                })?;
                memory.restore(stored.record, RecordState::SoftDeleted)
            }
            LogEntry::HardDelete { kind, id } => {
                memory.remove(kind, id)?;
                Ok(())
            }
            LogEntry::Watermark { kind, id } => memory.bump_watermark(kind, id),
        }
    }

    /// Rewrite the log so it holds only the current records.
    ///
    /// Hard-deleted records and superseded state transitions disappear;
    /// per-kind watermarks are kept so ids are never handed out twice.
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        let before = log.size();

        let mut entries = Vec::new();
        for kind in ResourceKind::ALL {
            let watermark = self.memory.watermark(kind);
            if watermark > 0 {
                entries.push(LogEntry::Watermark {
                    kind,
                    id: watermark,
                });
            }
            for stored in self.memory.dump(kind)? {
                let id = stored.record.id();
                let soft_deleted = stored.is_soft_deleted();
                entries.push(LogEntry::Put(stored.record));
                if soft_deleted {
                    entries.push(LogEntry::SoftDelete { kind, id });
                }
            }
        }

        log.rewrite(&entries)?;
        info!(
            target: "vecmeta::store",
            before_bytes = before,
            after_bytes = log.size(),
            entries = entries.len(),
            "Compacted record log"
        );
        Ok(())
    }

    /// Directory holding the log
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current log size in bytes
    pub fn log_size(&self) -> u64 {
        self.log.lock().size()
    }

    /// Cumulative log counters
    pub fn log_counters(&self) -> LogCounters {
        self.log.lock().counters()
    }

    /// Durability mode the log was opened with
    pub fn mode(&self) -> DurabilityMode {
        self.log.lock().mode()
    }

    /// Number of records of `kind` (live and soft-deleted)
    pub fn len(&self, kind: ResourceKind) -> usize {
        self.memory.len(kind)
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

impl Store for DurableStore {
    fn allocate_id(&self, kind: ResourceKind) -> Result<Id> {
        self.memory.allocate_id(kind)
    }

    fn put(&self, record: ResourceRecord) -> Result<()> {
        let kind = record.kind();
        let id = record.id();
        if id == 0 {
            return Err(MetaError::invalid_argument(format!(
                "cannot put {} without an allocated id",
                kind
            )));
        }

        let mut log = self.log.lock();
        if self.memory.contains(kind, id) {
            return Err(MetaError::Conflict { kind, id });
        }
        log.append(&LogEntry::Put(record.clone()))?;
        self.memory.put(record)
    }

    fn get(&self, kind: ResourceKind, id: Id) -> Result<StoredRecord> {
        self.memory.get(kind, id)
    }

    fn scan(
        &self,
        kind: ResourceKind,
        filter: &dyn Fn(&ResourceRecord) -> bool,
    ) -> Result<Vec<ResourceRecord>> {
        self.memory.scan(kind, filter)
    }

    fn soft_delete(&self, kind: ResourceKind, id: Id) -> Result<()> {
        let mut log = self.log.lock();
        if self.memory.get(kind, id)?.is_soft_deleted() {
            return Ok(());
        }
        log.append(&LogEntry::SoftDelete { kind, id })?;
        self.memory.soft_delete(kind, id)
    }

    fn hard_delete(&self, kind: ResourceKind, id: Id) -> Result<()> {
        let mut log = self.log.lock();
        if !self.memory.get(kind, id)?.is_soft_deleted() {
            return Err(MetaError::invalid_argument(format!(
                "{} {} is active and cannot be hard-deleted",
                kind, id
            )));
        }
        log.append(&LogEntry::HardDelete { kind, id })?;
        debug!(target: "vecmeta::store", %kind, id, "Hard-deleted record");
        self.memory.hard_delete(kind, id)
    }

    fn soft_deleted_ids(&self, kind: ResourceKind) -> Result<Vec<Id>> {
        self.memory.soft_deleted_ids(kind)
    }

    fn flush(&self) -> Result<()> {
        self.log.lock().sync()
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
