//! Catalog: the entry point of the engine
//!
//! A `Catalog` owns the store, the resource holders, the snapshots registry
//! and both executors. Open order:
//!
//! 1. create the data directory
//! 2. load and validate `vecmeta.toml`
//! 3. take the exclusive `LOCK` file
//! 4. open the store (replaying `meta.log` unless the mode is "cache")
//! 5. build holders and the registry
//! 6. start the event executor
//! 7. recover: install the newest valid snapshot of every collection
//!
//! `shutdown` and `Drop` tear down in reverse order.

mod recovery;
pub mod registry;

use crate::config::{self, CatalogConfig};
use crate::events::{EventExecutor, GcEvent, GcStats};
use crate::executor::OperationExecutor;
use parking_lot::Mutex;
use registry::OPEN_CATALOGS;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use vecmeta_concurrency::{Holders, ScopedSnapshot, Snapshots};
use vecmeta_core::{Id, MetaError, RecordState, Resource, ResourceKind, Result, Store, StoreExt};
use vecmeta_durability::{DurabilityMode, DurableStore};
use vecmeta_storage::MemoryStore;

/// Lock file taken for the lifetime of an on-disk catalog
pub const LOCK_FILE_NAME: &str = "LOCK";

/// How long `shutdown` waits for queued garbage collection
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Collection metadata catalog
///
/// Always handed out as `Arc<Catalog>`; operations keep a clone for the
/// commit path.
pub struct Catalog {
    data_dir: PathBuf,
    config: CatalogConfig,
    store: Arc<dyn Store>,
    durable: Option<Arc<DurableStore>>,
    holders: Arc<Holders>,
    snapshots: Arc<Snapshots>,
    executor: OperationExecutor,
    events: EventExecutor,
    accepting_operations: AtomicBool,
    flush_shutdown: Arc<AtomicBool>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
    _lock_file: Option<File>,
}

impl Catalog {
    /// Open the catalog in `path`, reading (or creating) `vecmeta.toml`.
    ///
    /// # Example
    ///
    /// ```text
    /// use vecmeta_engine::Catalog;
    ///
    /// let catalog = Catalog::open("/var/lib/vecmeta")?;
    /// let snap = catalog.get_snapshot("docs")?;
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(config::CONFIG_FILE_NAME);
        CatalogConfig::write_default_if_missing(&config_path)?;
        let cfg = CatalogConfig::from_file(&config_path)?;

        Self::open_inner(&data_dir, cfg)
    }

    /// Open the catalog in `path` with an explicit configuration.
    ///
    /// The configuration is written to `vecmeta.toml` so a later
    /// [`Catalog::open`] picks up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: CatalogConfig) -> Result<Arc<Self>> {
        cfg.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(config::CONFIG_FILE_NAME);
        cfg.write_to_file(&config_path)?;

        Self::open_inner(&data_dir, cfg)
    }

    /// In-memory catalog with no data directory
    pub fn ephemeral() -> Result<Arc<Self>> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Self::with_store(store, CatalogConfig::cache())
    }

    /// Catalog over a caller-supplied store
    ///
    /// The catalog is not registered process-wide and takes no lock file.
    /// Existing records in `store` are recovered as on a normal open.
    pub fn with_store(store: Arc<dyn Store>, cfg: CatalogConfig) -> Result<Arc<Self>> {
        cfg.validate()?;
        let catalog = Self::build(PathBuf::new(), cfg, store, None, None)?;
        Ok(Arc::new(catalog))
    }

    fn open_inner(data_dir: &Path, cfg: CatalogConfig) -> Result<Arc<Self>> {
        let mode = cfg.durability_mode()?;
        let canonical_path = data_dir.canonicalize()?;

        // Held for the whole open so two threads never build the same catalog
        let mut open_catalogs = OPEN_CATALOGS.lock();
        if let Some(weak) = open_catalogs.get(&canonical_path) {
            if let Some(catalog) = weak.upgrade() {
                info!(target: "vecmeta::catalog", path = ?canonical_path, "Returning existing catalog instance");
                return Ok(catalog);
            }
        }

        let lock_path = canonical_path.join(LOCK_FILE_NAME);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            MetaError::invalid_argument(format!(
                "catalog at '{}' is already in use by another process",
                canonical_path.display()
            ))
        })?;

        let (store, durable): (Arc<dyn Store>, Option<Arc<DurableStore>>) = match mode {
            DurabilityMode::Cache => (Arc::new(MemoryStore::new()), None),
            _ => {
                let durable = Arc::new(DurableStore::open(&canonical_path, mode)?);
                (Arc::clone(&durable) as Arc<dyn Store>, Some(durable))
            }
        };

        let catalog = Arc::new(Self::build(
            canonical_path.clone(),
            cfg,
            store,
            durable,
            Some(lock_file),
        )?);
        open_catalogs.insert(canonical_path, Arc::downgrade(&catalog));
        Ok(catalog)
    }

    fn build(
        data_dir: PathBuf,
        config: CatalogConfig,
        store: Arc<dyn Store>,
        durable: Option<Arc<DurableStore>>,
        lock_file: Option<File>,
    ) -> Result<Self> {
        let holders = Arc::new(Holders::new(Arc::clone(&store)));
        let snapshots = Arc::new(Snapshots::new());
        let events = EventExecutor::start(
            Arc::clone(&store),
            Arc::clone(&holders),
            Arc::clone(&snapshots),
            &config.gc,
        )?;

        let report = recovery::recover(&store, &holders, &snapshots, &events)?;
        info!(
            target: "vecmeta::catalog",
            dir = %data_dir.display(),
            durability = %config.durability,
            collections = report.collections,
            abandoned = report.abandoned,
            swept = report.swept,
            gc_queued = report.gc_queued,
            "Recovery complete"
        );

        if config.compact_on_open {
            if let Some(durable) = &durable {
                durable.compact()?;
            }
        }

        let flush_shutdown = Arc::new(AtomicBool::new(false));
        let flush_handle = match &durable {
            Some(durable) => match durable.mode() {
                DurabilityMode::Standard { interval_ms, .. } => Some(spawn_flush_thread(
                    Arc::clone(durable),
                    Arc::clone(&flush_shutdown),
                    Duration::from_millis(interval_ms),
                )?),
                _ => None,
            },
            None => None,
        };

        Ok(Catalog {
            data_dir,
            config,
            store,
            durable,
            holders,
            snapshots,
            executor: OperationExecutor::new(),
            events,
            accepting_operations: AtomicBool::new(true),
            flush_shutdown,
            flush_handle: Mutex::new(flush_handle),
            _lock_file: lock_file,
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current snapshot of the collection named `name`
    pub fn get_snapshot(&self, name: &str) -> Result<ScopedSnapshot> {
        self.snapshots.get_by_name(name)
    }

    /// Current snapshot of collection `collection_id`
    pub fn get_snapshot_by_id(&self, collection_id: Id) -> Result<ScopedSnapshot> {
        self.snapshots.get_by_id(collection_id)
    }

    /// Whether a collection named `name` exists
    pub fn has_collection(&self, name: &str) -> bool {
        self.snapshots.contains_name(name)
    }

    /// Names of every collection, sorted
    pub fn collection_names(&self) -> Vec<String> {
        self.snapshots.names()
    }

    /// Read any record straight from the store, live or soft-deleted
    pub fn load<T: Resource>(&self, id: Id) -> Result<T> {
        self.store.get_resource(id)
    }

    /// Lifecycle state of a stored record
    pub fn record_state(&self, kind: ResourceKind, id: Id) -> Result<RecordState> {
        Ok(self.store.get(kind, id)?.state)
    }

    /// Number of scoped handles pinning a record
    pub fn pin_count(&self, kind: ResourceKind, id: Id) -> usize {
        self.holders.pin_count(kind, id)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Garbage collector counters
    pub fn gc_stats(&self) -> GcStats {
        self.events.stats()
    }

    /// Wait until the garbage collector is idle; false on timeout
    pub fn wait_for_gc(&self, timeout: Duration) -> bool {
        self.events.wait_idle(timeout)
    }

    /// Rewrite the record log; no-op for in-memory catalogs
    pub fn compact(&self) -> Result<()> {
        match &self.durable {
            Some(durable) => durable.compact(),
            None => Ok(()),
        }
    }

    /// Flush buffered store writes
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Data directory; empty for in-memory catalogs
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Active configuration
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Commits published since open
    pub fn committed_operations(&self) -> u64 {
        self.executor.committed()
    }

    /// Whether operations are still accepted
    pub fn is_open(&self) -> bool {
        self.accepting_operations.load(Ordering::SeqCst)
    }

    /// Stop accepting operations, drain GC and flush the store.
    ///
    /// Readers holding snapshots keep them. The lock file is released when
    /// the last handle to the catalog is dropped.
    pub fn shutdown(&self) -> Result<()> {
        self.accepting_operations.store(false, Ordering::SeqCst);

        if !self.events.drain(SHUTDOWN_DRAIN_TIMEOUT) {
            warn!(target: "vecmeta::gc", stats = ?self.events.stats(), "GC did not drain before shutdown");
        } else {
            let left = self.events.stats().queue_depth;
            if left > 0 {
                debug!(target: "vecmeta::gc", left, "Leaving pinned records for the next open");
            }
        }
        self.events.shutdown();
        self.stop_flush_thread();
        self.store.flush()?;

        info!(target: "vecmeta::catalog", dir = %self.data_dir.display(), "Catalog shut down");
        Ok(())
    }

    fn stop_flush_thread(&self) {
        self.flush_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }
    }

    // ========================================================================
    // Commit path
    // ========================================================================

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MetaError::invalid_argument("catalog is shut down"))
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn holders(&self) -> &Holders {
        &self.holders
    }

    pub(crate) fn snapshots(&self) -> &Snapshots {
        &self.snapshots
    }

    pub(crate) fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub(crate) fn allocate_id(&self, kind: ResourceKind) -> Result<Id> {
        self.store.allocate_id(kind)
    }

    /// Soft-delete records that left the tree and queue them for GC
    pub(crate) fn retire(&self, records: impl IntoIterator<Item = (ResourceKind, Id)>) -> usize {
        let mut retired = 0;
        for (kind, id) in records {
            if let Err(e) = self.store.soft_delete(kind, id) {
                warn!(target: "vecmeta::gc", %kind, id, error = %e, "Failed to soft-delete superseded record");
                continue;
            }
            self.events.submit(GcEvent::new(kind, id));
            retired += 1;
        }
        if retired > 0 {
            debug!(target: "vecmeta::gc", retired, "Queued superseded records");
        }
        retired
    }
}

/// Periodic sync of the record log in "standard" mode
fn spawn_flush_thread(
    durable: Arc<DurableStore>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("vecmeta-log-flush".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = durable.flush() {
                    warn!(target: "vecmeta::store", error = %e, "Background log sync failed");
                }
            }
        })
        .map_err(|e| MetaError::internal(format!("failed to spawn log flush thread: {}", e)))
}

impl Drop for Catalog {
    fn drop(&mut self) {
        self.events.shutdown();
        self.stop_flush_thread();
        let _ = self.store.flush();

        if !self.data_dir.as_os_str().is_empty() {
            let mut open_catalogs = OPEN_CATALOGS.lock();
            let dead = open_catalogs
                .get(&self.data_dir)
                .map_or(false, |weak| weak.strong_count() == 0);
            if dead {
                open_catalogs.remove(&self.data_dir);
            }
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("data_dir", &self.data_dir)
            .field("durability", &self.config.durability)
            .field("collections", &self.snapshots.len())
            .finish_non_exhaustive()
    }
}
