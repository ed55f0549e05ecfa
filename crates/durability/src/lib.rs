//! Durability layer for vecmeta
//!
//! This crate persists catalog records in an append-only record log:
//! - Log file format with header, length prefix and CRC32 per frame
//! - RecordLog: appends frames with Cache / Standard / Always sync behavior
//! - DurableStore: `Store` implementation that logs every mutation before
//!   applying it to an in-memory `MemoryStore`, and replays the log on open
//! - Compaction: rewrite the log with only the current records
//!
//! Each `put` is one frame, so a crash leaves either the whole record or a
//! torn tail that replay truncates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod log;
pub mod mode;
pub mod store;

pub use format::{FrameError, LogEntry, LogHeader, LOG_FILE_NAME, LOG_HEADER_SIZE, LOG_MAGIC};
pub use log::{LogCounters, RecordLog, ReplayReport};
pub use mode::DurabilityMode;
pub use store::DurableStore;
