//! Opening boxes by name.

use crate::config::EngineConfig;
use crate::dir::{normalize_box_name, BoxFiles, BoxPaths};
use crate::error::EngineResult;
use crate::handle::BoxHandle;
use crate::kv_box::KvBox;
use crate::lazy_box::LazyKvBox;
use std::path::{Path, PathBuf};

/// Opens named boxes stored in one root directory.
///
/// The engine itself is cheap and holds no files; every open takes the box's
/// exclusive lock, so at most one handle per box exists across all
/// processes.
///
/// # Example
///
/// ```rust,no_run
/// use boxguard_engine::BoxEngine;
///
/// let engine = BoxEngine::new("data/boxes");
/// let mut settings = engine.open_box("settings")?;
/// settings.put("theme", b"dark".to_vec())?;
/// settings.close()?;
/// # Ok::<(), boxguard_engine::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BoxEngine {
    root: PathBuf,
    config: EngineConfig,
}

impl BoxEngine {
    /// Creates an engine for `root` with the default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, EngineConfig::default())
    }

    /// Creates an engine for `root` with a custom configuration.
    pub fn with_config(root: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens (creating if missing) the regular box `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::BoxLocked`] if another handle holds the
    /// box, [`crate::EngineError::InvalidName`] for unusable names, or an
    /// error from replaying the log.
    pub fn open_box(&self, name: &str) -> EngineResult<KvBox> {
        let files = BoxFiles::lock(&self.root, &normalize_box_name(name)?)?;
        KvBox::open(files, &self.config)
    }

    /// Opens (creating if missing) the lazy box `name`.
    ///
    /// # Errors
    ///
    /// Same as [`BoxEngine::open_box`].
    pub fn open_lazy_box(&self, name: &str) -> EngineResult<LazyKvBox> {
        let files = BoxFiles::lock(&self.root, &normalize_box_name(name)?)?;
        LazyKvBox::open(files, &self.config)
    }

    /// Opens box `name` as a lazy or regular handle.
    ///
    /// # Errors
    ///
    /// Same as [`BoxEngine::open_box`].
    pub fn open_handle(&self, name: &str, lazy: bool) -> EngineResult<BoxHandle> {
        if lazy {
            self.open_lazy_box(name).map(BoxHandle::from)
        } else {
            self.open_box(name).map(BoxHandle::from)
        }
    }

    /// Returns the record log path box `name` would use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::InvalidName`] for unusable names.
    pub fn box_path(&self, name: &str) -> EngineResult<PathBuf> {
        Ok(BoxPaths::new(&self.root, &normalize_box_name(name)?).log_path())
    }

    /// Returns true if box `name` has a record log on disk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::InvalidName`] for unusable names.
    pub fn box_exists(&self, name: &str) -> EngineResult<bool> {
        Ok(BoxPaths::new(&self.root, &normalize_box_name(name)?).exists())
    }

    /// Deletes box `name` from disk without opening it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::BoxLocked`] if the box is open anywhere.
    pub fn delete_box_from_disk(&self, name: &str) -> EngineResult<()> {
        BoxFiles::lock(&self.root, &normalize_box_name(name)?)?.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn open_handle_picks_variant() {
        let temp = tempdir().unwrap();
        let engine = BoxEngine::new(temp.path());

        let regular = engine.open_handle("a", false).unwrap();
        assert!(!regular.is_lazy());
        let lazy = engine.open_handle("b", true).unwrap();
        assert!(lazy.is_lazy());
    }

    #[test]
    fn names_are_case_insensitive() {
        let temp = tempdir().unwrap();
        let engine = BoxEngine::new(temp.path());

        let _open = engine.open_box("Settings").unwrap();
        assert!(matches!(
            engine.open_lazy_box("SETTINGS"),
            Err(EngineError::BoxLocked { ref name }) if name == "settings"
        ));
        assert_eq!(engine.box_path("Settings").unwrap(), temp.path().join("settings.box"));
    }

    #[test]
    fn box_exists_tracks_lifecycle() {
        let temp = tempdir().unwrap();
        let engine = BoxEngine::new(temp.path());

        assert!(!engine.box_exists("notes").unwrap());
        engine.open_box("notes").unwrap().close().unwrap();
        assert!(engine.box_exists("notes").unwrap());

        engine.delete_box_from_disk("notes").unwrap();
        assert!(!engine.box_exists("notes").unwrap());
    }

    #[test]
    fn delete_from_disk_refuses_open_box() {
        let temp = tempdir().unwrap();
        let engine = BoxEngine::new(temp.path());

        let _open = engine.open_box("notes").unwrap();
        assert!(engine.delete_box_from_disk("notes").unwrap_err().is_lock_contention());
    }

    #[test]
    fn invalid_name_is_rejected_before_touching_disk() {
        let temp = tempdir().unwrap();
        let engine = BoxEngine::new(temp.path().join("never-created"));

        assert!(matches!(engine.open_box("a/b"), Err(EngineError::InvalidName { .. })));
        assert!(!engine.root().exists());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, Vec<u8>),
        Delete(u8),
        Clear,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            8 => (0u8..16, proptest::collection::vec(any::<u8>(), 0..32)).prop_map(|(k, v)| Op::Put(k, v)),
            3 => (0u8..16).prop_map(Op::Delete),
            1 => Just(Op::Clear),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reopened_box_matches_model(ops in proptest::collection::vec(op_strategy(), 0..200), lazy in any::<bool>()) {
            let temp = tempdir().unwrap();
            let engine = BoxEngine::with_config(temp.path(), EngineConfig::default().sync_on_write(false));
            let mut model = BTreeMap::new();

            let mut handle = engine.open_handle("model", lazy).unwrap();
            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        handle.put(format!("k{k}"), v.clone()).unwrap();
                        model.insert(format!("k{k}"), v);
                    }
                    Op::Delete(k) => {
                        let key = format!("k{k}");
                        prop_assert_eq!(handle.delete(&key).unwrap(), model.remove(&key).is_some());
                    }
                    Op::Clear => {
                        prop_assert_eq!(handle.clear().unwrap(), model.len());
                        model.clear();
                    }
                }
            }
            handle.close().unwrap();

            let reopened = engine.open_handle("model", !lazy).unwrap();
            prop_assert_eq!(reopened.entries().unwrap(), model);
        }
    }
}
