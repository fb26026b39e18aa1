//! Engine configuration.

/// When a box rewrites its log to drop superseded frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionStrategy {
    /// Minimum number of superseded frames before compaction is considered.
    pub min_deleted_entries: usize,
    /// Superseded frames as a fraction of live entries that triggers compaction.
    pub deleted_ratio: f64,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        Self {
            min_deleted_entries: 60,
            deleted_ratio: 0.15,
        }
    }
}

impl CompactionStrategy {
    /// A strategy that never compacts automatically.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            min_deleted_entries: usize::MAX,
            deleted_ratio: f64::INFINITY,
        }
    }

    /// Returns true if a box with `live` entries and `deleted` superseded
    /// frames should be compacted.
    #[must_use]
    pub fn should_compact(&self, live: usize, deleted: usize) -> bool {
        if deleted <= self.min_deleted_entries {
            return false;
        }
        if live == 0 {
            return true;
        }
        deleted as f64 / live as f64 > self.deleted_ratio
    }
}

/// Configuration used by [`crate::BoxEngine`] for every box it opens.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether to sync the log after every write batch.
    pub sync_on_write: bool,

    /// Whether a torn or damaged log tail is cut off on open instead of
    /// failing the open.
    pub crash_recovery: bool,

    /// Automatic compaction policy.
    pub compaction: CompactionStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            crash_recovery: true,
            compaction: CompactionStrategy::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every write batch.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether damaged log tails are recovered.
    #[must_use]
    pub const fn crash_recovery(mut self, value: bool) -> Self {
        self.crash_recovery = value;
        self
    }

    /// Sets the compaction strategy.
    #[must_use]
    pub const fn compaction(mut self, strategy: CompactionStrategy) -> Self {
        self.compaction = strategy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert!(config.sync_on_write);
        assert!(config.crash_recovery);
        assert_eq!(config.compaction, CompactionStrategy::default());
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .sync_on_write(false)
            .crash_recovery(false)
            .compaction(CompactionStrategy::never());

        assert!(!config.sync_on_write);
        assert!(!config.crash_recovery);
        assert!(!config.compaction.should_compact(0, 1_000_000));
    }

    #[test]
    fn default_strategy_thresholds() {
        let strategy = CompactionStrategy::default();
        assert!(!strategy.should_compact(10, 60));
        assert!(strategy.should_compact(10, 61));
        assert!(!strategy.should_compact(1_000, 100));
        assert!(strategy.should_compact(0, 61));
    }
}
