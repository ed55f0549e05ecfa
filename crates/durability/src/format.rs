//! Record log file format.
//!
//! The catalog keeps a single log file, `meta.log`, in its data directory.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Log Header (32 bytes)              │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ Frame 2                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! The length covers version, payload and CRC. The CRC covers version and
//! payload. The payload is a MessagePack-encoded [`LogEntry`].

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use vecmeta_core::{Id, MetaError, ResourceKind, ResourceRecord, Result};

/// Name of the log file inside the catalog directory
pub const LOG_FILE_NAME: &str = "meta.log";

/// Magic bytes identifying a record log: "VMLG"
pub const LOG_MAGIC: [u8; 4] = *b"VMLG";

/// Current log file format version
pub const LOG_FORMAT_VERSION: u32 = 1;

/// Size of the log header in bytes
pub const LOG_HEADER_SIZE: usize = 32;

/// Current frame format version
pub const FRAME_FORMAT_VERSION: u8 = 1;

/// Smallest possible frame body: version byte + CRC
const MIN_FRAME_BODY: usize = 5;

/// Log header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Magic bytes: "VMLG"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Store UUID, preserved across compactions
    pub store_uuid: [u8; 16],
}

impl LogHeader {
    /// Create a header for a new store
    pub fn new(store_uuid: [u8; 16]) -> Self {
        LogHeader {
            magic: LOG_MAGIC,
            format_version: LOG_FORMAT_VERSION,
            store_uuid,
        }
    }

    /// Serialize header to bytes; the last 8 bytes are reserved zeros.
    pub fn to_bytes(&self) -> [u8; LOG_HEADER_SIZE] {
        let mut bytes = [0u8; LOG_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        bytes[8..24].copy_from_slice(&self.store_uuid);
        bytes
    }

    /// Deserialize and validate a header
    pub fn from_bytes(bytes: &[u8; LOG_HEADER_SIZE]) -> Result<Self> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != LOG_MAGIC {
            return Err(MetaError::corruption("invalid record log magic bytes"));
        }

        let format_version = LittleEndian::read_u32(&bytes[4..8]);
        if format_version != LOG_FORMAT_VERSION {
            return Err(MetaError::corruption(format!(
                "unsupported record log version {}",
                format_version
            )));
        }

        let mut store_uuid = [0u8; 16];
        store_uuid.copy_from_slice(&bytes[8..24]);
        Ok(LogHeader {
            magic,
            format_version,
            store_uuid,
        })
    }
}

/// One logged store mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// A new immutable record (always lands Active)
    Put(ResourceRecord),
    /// Record moved to SoftDeleted
    SoftDelete {
        /// Record kind
        kind: ResourceKind,
        /// Record id
        id: Id,
    },
    /// Record physically removed
    HardDelete {
        /// Record kind
        kind: ResourceKind,
        /// Record id
        id: Id,
    },
    /// Allocator high-water mark, written by compaction so removed ids stay retired
    Watermark {
        /// Record kind
        kind: ResourceKind,
        /// Highest id ever handed out
        id: Id,
    },
}

impl LogEntry {
    /// Encode as a complete frame: length + version + payload + crc32
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self)?;

        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(FRAME_FORMAT_VERSION);
        body.extend_from_slice(&payload);
        let crc = compute_crc(&body);

        let total_len = body.len() + 4;
        let mut frame = vec![0u8; 4];
        LittleEndian::write_u32(&mut frame[0..4], total_len as u32);
        frame.extend_from_slice(&body);
        let mut crc_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut crc_bytes, crc);
        frame.extend_from_slice(&crc_bytes);
        Ok(frame)
    }

    /// Decode one frame from the front of `bytes`.
    ///
    /// Returns (entry, bytes_consumed) on success.
    pub fn from_frame(bytes: &[u8]) -> std::result::Result<(Self, usize), FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::InsufficientData);
        }

        let length = LittleEndian::read_u32(&bytes[0..4]) as usize;
        if length < MIN_FRAME_BODY {
            return Err(FrameError::InvalidFormat);
        }
        if bytes.len() < 4 + length {
            return Err(FrameError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let stored_crc = LittleEndian::read_u32(&bytes[4 + length - 4..4 + length]);
        let computed_crc = compute_crc(body);
        if stored_crc != computed_crc {
            return Err(FrameError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        if body[0] != FRAME_FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion(body[0]));
        }

        let entry: LogEntry =
            rmp_serde::from_slice(&body[1..]).map_err(|e| FrameError::Payload(e.to_string()))?;
        Ok((entry, 4 + length))
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Frame parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Not enough data to parse a frame
    #[error("Insufficient data to parse frame")]
    InsufficientData,

    /// Frame length field is impossible
    #[error("Invalid frame format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame
        expected: u32,
        /// Checksum computed over the frame body
        computed: u32,
    },

    /// Unsupported frame version
    #[error("Unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// CRC matched but the payload did not decode
    #[error("Undecodable payload: {0}")]
    Payload(String),
}

impl FrameError {
    /// Whether the error can be explained by a write cut short at the tail
    pub fn is_torn_write(&self) -> bool {
        matches!(
            self,
            FrameError::InsufficientData | FrameError::ChecksumMismatch { .. }
        )
    }
}
