//! Durability mode configuration
//!
//! Controls record log sync behavior (Cache, Standard, Always).

/// Durability mode for record log appends
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Cache | Never, no file | Everything |
/// | Always | Every put | Zero |
/// | Standard | Periodic | Up to interval/batch |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// In-memory only; the log file is never written
    Cache,

    /// fsync after every appended frame
    Always,

    /// fsync every N frames OR every T milliseconds
    ///
    /// Frames are still handed to the OS on every append, so only a machine
    /// crash (not a process crash) can lose the unsynced window.
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum frames between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Whether this mode writes a log file at all
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// Whether every append is followed by fsync
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "Cache (in-memory, all data lost on exit)",
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Standard { .. } => "Standard (balanced speed/safety)",
        }
    }

    /// Standard mode with a 100ms interval and 1000-frame batches
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}
