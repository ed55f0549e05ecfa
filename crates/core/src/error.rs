//! Error types for the metadata catalog
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every variant maps onto an [`ErrorKind`], the coarse status the surrounding
//! server converts into its own wire-level error.

use crate::types::{Id, ResourceKind};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, MetaError>;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Id or name resolution failed
    NotFound,
    /// Unique-name constraint violated
    AlreadyExists,
    /// Parent snapshot is no longer current and the operation cannot be rebased
    StaleSnapshot,
    /// Staged context failed validation
    InvalidArgument,
    /// Store rejected a put for id reuse
    Conflict,
    /// Store backend failure
    Io,
    /// Operation cancelled before push
    Cancelled,
    /// Broken internal invariant
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::StaleSnapshot => "StaleSnapshot",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Io => "IOError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// Error types for the catalog
#[derive(Debug, Error)]
pub enum MetaError {
    /// Record or name lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name already taken within its scope
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Parent snapshot was superseded by another commit
    #[error("Stale snapshot for collection {collection_id}: parent commit {parent}, current commit {current}")]
    StaleSnapshot {
        /// Collection the operation targets
        collection_id: Id,
        /// Commit the operation was built against
        parent: Id,
        /// Commit currently installed
        current: Id,
    },

    /// Input failed validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store already holds a record with this id
    #[error("Conflict: {kind} {id} already exists in store")]
    Conflict {
        /// Record kind
        kind: ResourceKind,
        /// Duplicate id
        id: Id,
    },

    /// I/O error from the store backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// On-disk data failed integrity checks
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Operation was cancelled before push
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaError::NotFound(_) => ErrorKind::NotFound,
            MetaError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            MetaError::StaleSnapshot { .. } => ErrorKind::StaleSnapshot,
            MetaError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MetaError::Conflict { .. } => ErrorKind::Conflict,
            MetaError::Io(_) | MetaError::Serialization(_) | MetaError::Corruption(_) => {
                ErrorKind::Io
            }
            MetaError::Cancelled(_) => ErrorKind::Cancelled,
            MetaError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Lookup failure for a free-form subject
    pub fn not_found(what: impl Into<String>) -> Self {
        MetaError::NotFound(what.into())
    }

    /// Lookup failure for a record
    pub fn resource_not_found(kind: ResourceKind, id: Id) -> Self {
        MetaError::NotFound(format!("{} {}", kind, id))
    }

    /// Unique-name violation
    pub fn already_exists(what: impl Into<String>) -> Self {
        MetaError::AlreadyExists(what.into())
    }

    /// Validation failure
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        MetaError::InvalidArgument(msg.into())
    }

    /// Internal invariant violation
    pub fn internal(msg: impl Into<String>) -> Self {
        MetaError::Internal(msg.into())
    }

    /// Integrity failure
    pub fn corruption(msg: impl Into<String>) -> Self {
        MetaError::Corruption(msg.into())
    }

    /// Whether this error is a stale-snapshot rejection
    pub fn is_stale(&self) -> bool {
        self.kind() == ErrorKind::StaleSnapshot
    }
}

impl From<rmp_serde::encode::Error> for MetaError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MetaError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MetaError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        MetaError::Serialization(e.to_string())
    }
}
