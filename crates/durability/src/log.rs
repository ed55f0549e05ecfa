//! Record log writer and replay.
//!
//! A `RecordLog` owns the open `meta.log` file. Opening an existing log
//! replays every intact frame and truncates a torn tail so the next append
//! starts at a frame boundary.

use crate::format::{FrameError, LogEntry, LogHeader, LOG_FILE_NAME, LOG_HEADER_SIZE};
use crate::mode::DurabilityMode;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use vecmeta_core::{MetaError, Result};

/// Cumulative log counters, never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCounters {
    /// Frames appended
    pub appends: u64,
    /// fsync calls
    pub sync_calls: u64,
    /// Bytes written (frames only)
    pub bytes_written: u64,
}

/// Outcome of replaying an existing log
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Intact entries in file order
    pub entries: Vec<LogEntry>,
    /// Bytes cut from a torn tail (0 if the log ended cleanly)
    pub truncated_bytes: u64,
}

/// Append-only record log
pub struct RecordLog {
    /// Open file (None when DurabilityMode::Cache)
    file: Option<File>,
    path: PathBuf,
    mode: DurabilityMode,
    header: LogHeader,
    write_position: u64,
    writes_since_sync: usize,
    last_sync_time: Instant,
    has_unsynced_data: bool,
    counters: LogCounters,
}

impl RecordLog {
    /// Path of the log file inside `dir`
    pub fn log_path(dir: &Path) -> PathBuf {
        dir.join(LOG_FILE_NAME)
    }

    /// Open the log in `dir`, creating it if missing, and replay it.
    pub fn open(dir: &Path, mode: DurabilityMode) -> Result<(Self, ReplayReport)> {
        let path = Self::log_path(dir);

        if !mode.requires_log() {
            let log = RecordLog {
                file: None,
                path,
                mode,
                header: LogHeader::new(uuid::Uuid::new_v4().into_bytes()),
                write_position: 0,
                writes_since_sync: 0,
                last_sync_time: Instant::now(),
                has_unsynced_data: false,
                counters: LogCounters::default(),
            };
            return Ok((log, ReplayReport::default()));
        }

        fs::create_dir_all(dir)?;
        if !path.exists() {
            let log = Self::create(&path, mode, uuid::Uuid::new_v4().into_bytes())?;
            return Ok((log, ReplayReport::default()));
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut header_bytes = [0u8; LOG_HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|e| {
            MetaError::corruption(format!("record log header unreadable: {}", e))
        })?;
        let header = LogHeader::from_bytes(&header_bytes)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let (entries, valid_len) = Self::decode_frames(&buffer)?;

        let original_size = (LOG_HEADER_SIZE + buffer.len()) as u64;
        let valid_end = (LOG_HEADER_SIZE + valid_len) as u64;
        let truncated_bytes = original_size - valid_end;
        if truncated_bytes > 0 {
            warn!(
                target: "vecmeta::store",
                path = %path.display(),
                truncated_bytes,
                "Truncating torn record log tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_end))?;

        debug!(
            target: "vecmeta::store",
            path = %path.display(),
            entries = entries.len(),
            "Replayed record log"
        );

        let log = RecordLog {
            file: Some(file),
            path,
            mode,
            header,
            write_position: valid_end,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            counters: LogCounters::default(),
        };
        Ok((
            log,
            ReplayReport {
                entries,
                truncated_bytes,
            },
        ))
    }

    /// Create a fresh log file at `path` with the given store UUID.
    fn create(path: &Path, mode: DurabilityMode, store_uuid: [u8; 16]) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        let header = LogHeader::new(store_uuid);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(RecordLog {
            file: Some(file),
            path: path.to_path_buf(),
            mode,
            header,
            write_position: LOG_HEADER_SIZE as u64,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            counters: LogCounters::default(),
        })
    }

    /// Decode frames until the data ends or a torn tail is found.
    ///
    /// Returns the entries and the number of bytes they occupy. A damaged
    /// frame followed by more data is corruption, not a torn write.
    fn decode_frames(buffer: &[u8]) -> Result<(Vec<LogEntry>, usize)> {
        let mut entries = Vec::new();
        let mut offset = 0;

        while offset < buffer.len() {
            match LogEntry::from_frame(&buffer[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(FrameError::InsufficientData) if !Self::has_frame_after(buffer, offset) => break,
                Err(FrameError::ChecksumMismatch { .. }) if Self::is_last_frame(buffer, offset) => {
                    break
                }
                Err(e) => {
                    return Err(MetaError::corruption(format!(
                        "record log frame at offset {}: {}",
                        LOG_HEADER_SIZE + offset,
                        e
                    )))
                }
            }
        }

        Ok((entries, offset))
    }

    /// Whether an intact frame starts anywhere after `offset`
    ///
    /// A torn write only ever damages the last frame, so a short frame with
    /// decodable data behind it has a corrupt length field.
    fn has_frame_after(buffer: &[u8], offset: usize) -> bool {
        (offset + 1..buffer.len()).any(|start| LogEntry::from_frame(&buffer[start..]).is_ok())
    }

    /// Whether the frame starting at `offset` claims to end exactly at the buffer end
    fn is_last_frame(buffer: &[u8], offset: usize) -> bool {
        let remaining = &buffer[offset..];
        if remaining.len() < 4 {
            return true;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&remaining[0..4]);
        4 + u32::from_le_bytes(len_bytes) as usize == remaining.len()
    }

    /// Append one entry, syncing according to the durability mode.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(()),
        };

        let frame = entry.to_frame()?;
        if let Err(e) = file.write_all(&frame) {
            // Drop any partial frame so later appends stay aligned.
            let _ = file.set_len(self.write_position);
            let _ = file.seek(SeekFrom::Start(self.write_position));
            return Err(e.into());
        }

        self.write_position += frame.len() as u64;
        self.writes_since_sync += 1;
        self.has_unsynced_data = true;
        self.counters.appends += 1;
        self.counters.bytes_written += frame.len() as u64;

        self.maybe_sync()
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let due = match self.mode {
            DurabilityMode::Cache => false,
            DurabilityMode::Always => true,
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_sync >= batch_size
                    || self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms
            }
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// fsync any unsynced frames
    pub fn sync(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            if self.has_unsynced_data {
                file.sync_data()?;
                self.counters.sync_calls += 1;
                self.has_unsynced_data = false;
            }
        }
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        Ok(())
    }

    /// Atomically replace the log with `entries`.
    ///
    /// Writes a temp file with the same store UUID, fsyncs it, renames it over
    /// the log and reopens for appending.
    pub fn rewrite(&mut self, entries: &[LogEntry]) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }

        let tmp_path = self.path.with_extension("log.compact");
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let mut replacement = Self::create(&tmp_path, self.mode, self.header.store_uuid)?;
        for entry in entries {
            let frame = entry.to_frame()?;
            if let Some(file) = replacement.file.as_mut() {
                file.write_all(&frame)?;
            }
            replacement.write_position += frame.len() as u64;
        }
        if let Some(file) = replacement.file.as_mut() {
            file.sync_all()?;
        }
        drop(replacement);

        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.write_position = file.seek(SeekFrom::End(0))?;
        self.file = Some(file);
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
        Ok(())
    }

    /// Current file size in bytes (0 in Cache mode)
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store UUID recorded in the header
    pub fn store_uuid(&self) -> [u8; 16] {
        self.header.store_uuid
    }

    /// Durability mode
    pub fn mode(&self) -> DurabilityMode {
        self.mode
    }

    /// Cumulative counters
    pub fn counters(&self) -> LogCounters {
        self.counters.clone()
    }
}

impl Drop for RecordLog {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}
