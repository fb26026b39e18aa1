//! Opening a box that other processes may be holding.

use crate::config::AccessorConfig;
use crate::error::{GuardError, GuardResult};
use crate::opener::BoxOpener;
use crate::sleeper::Sleeper;
use boxguard_engine::BoxHandle;
use tracing::{debug, warn};

/// How often an unbounded retry loop reports that it is still waiting.
const UNBOUNDED_WARN_EVERY: u32 = 100;

/// Opens the configured box, sleeping and retrying while it is locked.
///
/// With `max_tries = Some(k)` at most `k` opens are attempted and the last
/// contention error is returned inside [`GuardError::OpenExhausted`]. With
/// `None` the loop runs until the lock is free or the future is dropped.
/// Errors other than lock contention are returned at once.
pub(crate) async fn open_with_retry(
    opener: &dyn BoxOpener,
    sleeper: &dyn Sleeper,
    config: &AccessorConfig,
) -> GuardResult<BoxHandle> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let err = match opener.open(&config.name, config.lazy) {
            Ok(handle) => {
                if attempt > 1 {
                    debug!(box_name = %config.name, attempt, "opened box after retrying");
                }
                return Ok(handle);
            }
            Err(e) if e.is_lock_contention() => e,
            Err(e) => return Err(e.into()),
        };

        match config.max_tries {
            Some(max) if attempt >= max => {
                debug!(box_name = %config.name, attempts = attempt, "giving up on locked box");
                return Err(GuardError::OpenExhausted {
                    name: config.name.clone(),
                    attempts: attempt,
                    source: err,
                });
            }
            None if attempt % UNBOUNDED_WARN_EVERY == 0 => {
                warn!(
                    box_name = %config.name,
                    attempt,
                    delay_ms = config.retry_delay.as_millis() as u64,
                    "box still locked by another owner"
                );
            }
            _ => {
                debug!(box_name = %config.name, attempt, "box locked, retrying");
            }
        }

        sleeper.sleep(config.retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::SleepFuture;
    use boxguard_engine::{BoxEngine, EngineError, EngineResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Reports the box as locked for the first `locked_for` attempts.
    struct FlakyOpener {
        engine: BoxEngine,
        locked_for: u32,
        attempts: AtomicU32,
    }

    impl BoxOpener for FlakyOpener {
        fn open(&self, name: &str, lazy: bool) -> EngineResult<BoxHandle> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.locked_for {
                return Err(EngineError::box_locked(name));
            }
            self.engine.open_handle(name, lazy)
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
            self.waits.lock().push(duration);
            Box::pin(std::future::ready(()))
        }
    }

    fn flaky(root: &std::path::Path, locked_for: u32) -> FlakyOpener {
        FlakyOpener {
            engine: BoxEngine::new(root),
            locked_for,
            attempts: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn opens_after_contention_clears() {
        let temp = tempdir().unwrap();
        let opener = flaky(temp.path(), 4);
        let sleeper = RecordingSleeper::default();
        let config = AccessorConfig::new("s").retry_delay(Duration::from_millis(7));

        let handle = open_with_retry(&opener, &sleeper, &config).await.unwrap();

        assert_eq!(handle.name(), "s");
        assert_eq!(opener.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(*sleeper.waits.lock(), vec![Duration::from_millis(7); 4]);
    }

    #[tokio::test]
    async fn cap_is_exact() {
        let temp = tempdir().unwrap();
        let opener = flaky(temp.path(), u32::MAX);
        let sleeper = RecordingSleeper::default();
        let config = AccessorConfig::new("s").max_tries(3);

        let err = open_with_retry(&opener, &sleeper, &config).await.unwrap_err();

        assert!(matches!(
            err,
            GuardError::OpenExhausted { ref name, attempts: 3, source: EngineError::BoxLocked { .. } }
                if name == "s"
        ));
        assert_eq!(opener.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.waits.lock().len(), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let temp = tempdir().unwrap();
        let opener = flaky(temp.path(), 0);
        let sleeper = RecordingSleeper::default();
        let config = AccessorConfig::new("not a valid name");

        let err = open_with_retry(&opener, &sleeper, &config).await.unwrap_err();

        assert!(matches!(err, GuardError::Engine(EngineError::InvalidName { .. })));
        assert_eq!(opener.attempts.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits.lock().is_empty());
    }
}
