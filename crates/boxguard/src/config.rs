//! Accessor configuration.

use std::time::Duration;

/// Delay between open attempts when none is configured.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a [`crate::GuardedBox`] reaches its box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorConfig {
    /// Box name.
    pub name: String,

    /// Open and close the box around every operation so other processes
    /// can use it in between.
    pub multi_owner: bool,

    /// Open the lazy box variant.
    pub lazy: bool,

    /// Open attempts before giving up on a locked box; `None` retries
    /// forever.
    pub max_tries: Option<u32>,

    /// Delay between open attempts.
    pub retry_delay: Duration,
}

impl AccessorConfig {
    /// Creates a single-owner, regular-box configuration for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multi_owner: false,
            lazy: false,
            max_tries: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets whether the box is shared with other processes.
    #[must_use]
    pub fn multi_owner(mut self, value: bool) -> Self {
        self.multi_owner = value;
        self
    }

    /// Sets whether the lazy box variant is used.
    #[must_use]
    pub fn lazy(mut self, value: bool) -> Self {
        self.lazy = value;
        self
    }

    /// Caps the number of open attempts. A cap of 0 is treated as 1.
    #[must_use]
    pub fn max_tries(mut self, tries: u32) -> Self {
        self.max_tries = Some(tries.max(1));
        self
    }

    /// Removes the attempt cap.
    #[must_use]
    pub fn unbounded_retries(mut self) -> Self {
        self.max_tries = None;
        self
    }

    /// Sets the delay between open attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
