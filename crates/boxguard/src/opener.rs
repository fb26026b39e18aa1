//! The seam between an accessor and the engine.

use boxguard_engine::{BoxEngine, BoxHandle, EngineResult};

/// Opens boxes on behalf of a [`crate::GuardedBox`].
///
/// Implemented by [`BoxEngine`]; tests wrap it to count or fail opens.
pub trait BoxOpener: Send + Sync {
    /// Opens box `name`, the lazy variant if `lazy` is set.
    ///
    /// # Errors
    ///
    /// Must return an error for which
    /// [`boxguard_engine::EngineError::is_lock_contention`] is true when the
    /// box is held elsewhere; only those errors are retried.
    fn open(&self, name: &str, lazy: bool) -> EngineResult<BoxHandle>;
}

impl BoxOpener for BoxEngine {
    fn open(&self, name: &str, lazy: bool) -> EngineResult<BoxHandle> {
        self.open_handle(name, lazy)
    }
}
