//! Test fixtures and accessor helpers.

use boxguard::{AccessorConfig, GuardedBox};
use boxguard_engine::BoxEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Retry delay used by [`TestBoxes::multi`], short enough for tests.
pub const FAST_RETRY_DELAY: Duration = Duration::from_millis(2);

/// A box engine over a temporary directory that is removed on drop.
pub struct TestBoxes {
    engine: BoxEngine,
    _temp_dir: TempDir,
}

impl TestBoxes {
    /// Creates an engine over a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            engine: BoxEngine::new(temp_dir.path()),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &BoxEngine {
        &self.engine
    }

    /// Returns the root directory of the boxes.
    pub fn root(&self) -> &Path {
        self.engine.root()
    }

    /// Returns a single-owner accessor for box `name`.
    pub fn single<V>(&self, name: &str) -> GuardedBox<V>
    where
        V: Serialize + DeserializeOwned,
    {
        GuardedBox::new(self.engine.clone(), AccessorConfig::new(name))
    }

    /// Returns a multi-owner accessor for box `name` with unbounded,
    /// fast retries.
    pub fn multi<V>(&self, name: &str) -> GuardedBox<V>
    where
        V: Serialize + DeserializeOwned,
    {
        GuardedBox::new(
            self.engine.clone(),
            AccessorConfig::new(name)
                .multi_owner(true)
                .retry_delay(FAST_RETRY_DELAY),
        )
    }
}

impl Default for TestBoxes {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with an engine over a temporary directory.
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&BoxEngine) -> R,
{
    let boxes = TestBoxes::new();
    f(boxes.engine())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_engine_opens_boxes() {
        with_temp_engine(|engine| {
            let mut settings = engine.open_box("settings").unwrap();
            settings.put("k", b"v".to_vec()).unwrap();
            assert!(engine.root().join("settings.box").exists());
        });
    }

    #[tokio::test]
    async fn accessors_share_the_root() {
        let boxes = TestBoxes::new();
        let writer = boxes.multi::<u32>("counters");
        writer.put("a", &1).await.unwrap();

        let reader = boxes.single::<u32>("counters");
        assert_eq!(reader.get("a").await.unwrap(), Some(1));
    }
}
