//! Unified error types for the Strata workspace.
//!
//! Every failure surfaced by the metadata store, the snapshot drivers, or the
//! snapshotter façade is a [`SnapshotError`]. Callers branch on
//! [`SnapshotError::kind`] rather than on individual variants.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`SnapshotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested key, name, or parent does not exist.
    NotFound,
    /// A record with the same key or name already exists.
    AlreadyExists,
    /// The operation is not valid for the record or transaction state.
    InvalidState,
    /// A committed snapshot is still referenced as a parent.
    InUse,
    /// The metadata store could not be opened, read, or persisted.
    StoreUnavailable,
    /// A filesystem or volume operation failed.
    StorageFailure,
    /// The operation context was cancelled before the metadata commit.
    Cancelled,
    /// The snapshotter configuration is invalid.
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::InvalidState => "invalid state",
            Self::InUse => "in use",
            Self::StoreUnavailable => "store unavailable",
            Self::StorageFailure => "storage failure",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid configuration",
        };
        f.write_str(s)
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A snapshot, parent, or driver was not found.
    #[error("{what} not found: {key}")]
    NotFound {
        /// Type of the missing resource.
        what: &'static str,
        /// Key or name that failed to resolve.
        key: String,
    },

    /// A snapshot or registration with the same identifier already exists.
    #[error("{what} already exists: {key}")]
    AlreadyExists {
        /// Type of the conflicting resource.
        what: &'static str,
        /// Conflicting key or name.
        key: String,
    },

    /// The operation is not valid in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the violated state requirement.
        message: String,
    },

    /// A committed snapshot still has dependents.
    #[error("snapshot {name} is in use by {dependents} dependent snapshot(s)")]
    InUse {
        /// Name of the committed snapshot.
        name: String,
        /// Number of records that reference it as a parent.
        dependents: usize,
    },

    /// The metadata store is unreachable or corrupt.
    #[error("metadata store unavailable at {path}: {message}")]
    StoreUnavailable {
        /// Path of the metadata file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A filesystem I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A storage backend operation failed for a reason other than plain I/O.
    #[error("storage failure: {message}")]
    Storage {
        /// Description of the failed operation.
        message: String,
    },

    /// The operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    /// Builds an [`SnapshotError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the taxonomy kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::StoreUnavailable { .. } | Self::Serialization { .. } => {
                ErrorKind::StoreUnavailable
            }
            Self::Io { .. } | Self::Storage { .. } => ErrorKind::StorageFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config { .. } => ErrorKind::InvalidConfig,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SnapshotError>;
