//! # boxguard engine
//!
//! Embedded key-value boxes, one record log file per box.
//!
//! This crate provides:
//! - [`BoxEngine`] to open named boxes in a root directory
//! - [`KvBox`] (values in memory) and [`LazyKvBox`] (values read on demand)
//! - An exclusive per-box file lock, so one handle per box exists across
//!   all processes ([`EngineError::BoxLocked`] otherwise)
//! - Crash recovery of torn log tails and automatic compaction
//!
//! Boxes are synchronous. Coordinating several owners of one box is left to
//! the caller; `boxguard` builds that on top of this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
mod handle;
mod kv_box;
mod lazy_box;
mod log;
pub mod record;

pub use config::{CompactionStrategy, EngineConfig};
pub use dir::{normalize_box_name, BoxFiles, BoxPaths, MAX_NAME_LEN};
pub use engine::BoxEngine;
pub use error::{EngineError, EngineResult};
pub use handle::BoxHandle;
pub use kv_box::KvBox;
pub use lazy_box::LazyKvBox;
pub use log::{BoxLog, ValueSlot};
