//! Error types for the box engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while opening or using a box.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] boxguard_storage::StorageError),

    /// I/O error outside the record log (lock file, directory, rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another handle, in this or another process, holds the box lock.
    #[error("box '{name}' is locked by another handle")]
    BoxLocked {
        /// Normalized box name.
        name: String,
    },

    /// The box name cannot be used as a file stem.
    #[error("invalid box name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The record log is damaged and crash recovery is disabled.
    #[error("box log corrupted: {message}")]
    Corrupted {
        /// Description of the damage.
        message: String,
    },

    /// Frame checksum mismatch.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame body.
        actual: u32,
    },

    /// A key or value does not fit the frame format.
    #[error("entry too large: {message}")]
    EntryTooLarge {
        /// Which part is too large and by how much.
        message: String,
    },
}

impl EngineError {
    /// Creates a lock contention error.
    pub fn box_locked(name: impl Into<String>) -> Self {
        Self::BoxLocked { name: name.into() }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an entry-too-large error.
    pub fn entry_too_large(message: impl Into<String>) -> Self {
        Self::EntryTooLarge {
            message: message.into(),
        }
    }

    /// Returns true if the error means "someone else holds the lock right
    /// now", which is the only failure worth retrying an open for.
    #[must_use]
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::BoxLocked { .. })
    }
}
