//! Error types for guarded box access.

use boxguard_engine::EngineError;
use thiserror::Error;

/// Result type for guarded box operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors returned by [`crate::GuardedBox`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// The engine failed; passed through unchanged.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The box stayed locked for every allowed open attempt.
    #[error("could not open box '{name}' after {attempts} attempts: {source}")]
    OpenExhausted {
        /// Box name.
        name: String,
        /// Number of open attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: EngineError,
    },

    /// A synchronous operation was called on a multi-owner accessor.
    #[error("{operation} is not supported in multi-owner mode")]
    MultiOwnerUnsupported {
        /// The rejected operation.
        operation: &'static str,
    },

    /// A synchronous operation was called before the box was opened.
    #[error("box '{name}' is not yet opened")]
    NotOpened {
        /// Box name.
        name: String,
    },

    /// An operation that needs resident values was called on a lazy box.
    #[error("{operation} requires a regular box but '{name}' is lazy")]
    RegularBoxRequired {
        /// The rejected operation.
        operation: &'static str,
        /// Box name.
        name: String,
    },

    /// A value could not be encoded or decoded.
    #[error("value codec error: {0}")]
    Codec(String),
}

impl GuardError {
    /// Creates a not-opened error.
    pub fn not_opened(name: impl Into<String>) -> Self {
        Self::NotOpened { name: name.into() }
    }

    /// Creates a regular-box-required error.
    pub fn regular_box_required(operation: &'static str, name: impl Into<String>) -> Self {
        Self::RegularBoxRequired {
            operation,
            name: name.into(),
        }
    }

    /// Returns true for errors caused by calling the accessor the wrong way.
    ///
    /// These are raised immediately and never retried.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::MultiOwnerUnsupported { .. } | Self::NotOpened { .. } | Self::RegularBoxRequired { .. }
        )
    }
}
