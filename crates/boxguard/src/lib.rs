//! # boxguard
//!
//! Guarded access to boxguard boxes from one process or several.
//!
//! A box can only be held by one handle at a time across every process on
//! the machine. [`GuardedBox`] wraps a box name with one of two policies:
//!
//! - **Single owner**: open once on first use and keep the box; concurrent
//!   first callers share that open. Synchronous `*_sync` methods work once
//!   it is open.
//! - **Multi owner**: open, operate and close around every call, retrying
//!   the open with a fixed delay while another process holds the box.
//!
//! ```rust,no_run
//! use boxguard::{AccessorConfig, GuardedBox};
//! use boxguard_engine::BoxEngine;
//!
//! # async fn run() -> boxguard::GuardResult<()> {
//! let counters: GuardedBox<u64> = GuardedBox::new(
//!     BoxEngine::new("./boxes"),
//!     AccessorConfig::new("counters").multi_owner(true).max_tries(50),
//! );
//!
//! let seen = counters.get("visits").await?.unwrap_or(0);
//! counters.put("visits", &(seen + 1)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod codec;
mod config;
mod error;
mod opener;
mod retry;
mod signal;
mod sleeper;

pub use accessor::GuardedBox;
pub use config::{AccessorConfig, DEFAULT_RETRY_DELAY};
pub use error::{GuardError, GuardResult};
pub use opener::BoxOpener;
pub use sleeper::{SleepFuture, Sleeper, TokioSleeper};

pub use boxguard_engine::{BoxEngine, EngineConfig, EngineError};
