//! Error types for the local state backend.

use std::path::PathBuf;

use stratus_core::CodecError;
use thiserror::Error;

use crate::lock::LockInfo;

/// Result type alias for state store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur while reading or writing the state file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StoreError::Io { op, path, source }
    }
}

/// Errors that can occur while acquiring or releasing the state lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot lock state path {0:?}: no file name")]
    InvalidPath(PathBuf),

    #[error("failed to lock state file {path:?}: {source}")]
    Acquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The marker could not be examined by a lock info query.
    #[error("failed to inspect lock for state file {path:?}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "state file {path:?} locked, created: {}, expires: {}, reason: {}, who: {}, id: {}",
        .info.time, .info.expires, .info.reason, .info.who, .info.id
    )]
    Locked { path: PathBuf, info: Box<LockInfo> },

    /// Held by someone whose lock info is missing or unreadable. Also what a
    /// competitor sees between marker creation and the info write.
    #[error("state file {path:?} locked, but no info found: {detail}")]
    LockedWithoutInfo { path: PathBuf, detail: String },

    #[error("could not encode lock info for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write lock info for {path:?}: {source}")]
    WriteInfo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock on {path:?} is held by {held_by}, not {presented}")]
    TokenMismatch {
        path: PathBuf,
        held_by: String,
        presented: String,
    },
}

impl LockError {
    /// True for the two variants reporting that another holder owns the lock.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Locked { .. } | LockError::LockedWithoutInfo { .. })
    }

    /// The competing holder's info, when it could be read.
    pub fn holder(&self) -> Option<&LockInfo> {
        match self {
            LockError::Locked { info, .. } => Some(&**info),
            _ => None,
        }
    }
}
