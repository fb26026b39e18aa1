//! # boxguard testkit
//!
//! Test utilities for boxguard.
//!
//! This crate provides:
//! - Temporary engine fixtures and accessor helpers
//! - A scripted writer ([`run_worker`]) shared by the `boxguard-worker`
//!   binary and the in-process tests
//! - [`CountingSleeper`] to observe how often an accessor had to wait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxguard_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn writes_survive() {
//!     let boxes = TestBoxes::new();
//!     let settings = boxes.multi::<String>("settings");
//!     settings.put("theme", &"dark".to_string()).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::worker::*;
}

pub use fixtures::*;
pub use worker::*;
