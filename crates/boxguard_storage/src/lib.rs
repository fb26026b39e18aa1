//! # boxguard storage
//!
//! Byte-store backends that box logs are written to.
//!
//! Backends are **opaque**: they append, read back and truncate bytes and know
//! nothing about frames, keys or checksums. The box engine owns the log format.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway boxes
//! - [`FileBackend`] - For boxes persisted in a file
//!
//! ## Example
//!
//! ```rust
//! use boxguard_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
