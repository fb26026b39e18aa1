//! A handle over either box variant.

use crate::error::EngineResult;
use crate::kv_box::KvBox;
use crate::lazy_box::LazyKvBox;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An open box of either kind.
///
/// Operations that both variants support are forwarded; values come back
/// owned because a lazy box has to read them from disk.
#[derive(Debug)]
pub enum BoxHandle {
    /// All values resident in memory.
    Regular(KvBox),
    /// Keys resident, values read on demand.
    Lazy(LazyKvBox),
}

impl BoxHandle {
    /// Returns the box name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Regular(b) => b.name(),
            Self::Lazy(b) => b.name(),
        }
    }

    /// Returns true for lazy boxes.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    /// Returns the regular box, if this is one.
    #[must_use]
    pub fn as_regular(&self) -> Option<&KvBox> {
        match self {
            Self::Regular(b) => Some(b),
            Self::Lazy(_) => None,
        }
    }

    /// Returns the record log path, or `None` for in-memory boxes.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Regular(b) => b.path(),
            Self::Lazy(b) => b.path(),
        }
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if a lazy box fails to read the value.
    pub fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        match self {
            Self::Regular(b) => Ok(b.get(key).map(<[u8]>::to_vec)),
            Self::Lazy(b) => b.get(key),
        }
    }

    /// Returns every entry, reading values from disk for lazy boxes.
    ///
    /// # Errors
    ///
    /// Returns an error if a lazy box fails to read a value.
    pub fn entries(&self) -> EngineResult<BTreeMap<String, Vec<u8>>> {
        match self {
            Self::Regular(b) => Ok(b.values().clone()),
            Self::Lazy(b) => b
                .keys()
                .map(|k| -> EngineResult<(String, Vec<u8>)> {
                    Ok((k.to_string(), b.get(k)?.unwrap_or_default()))
                })
                .collect(),
        }
    }

    /// Returns every key in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::Regular(b) => b.keys().map(str::to_string).collect(),
            Self::Lazy(b) => b.keys().map(str::to_string).collect(),
        }
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Regular(b) => b.contains_key(key),
            Self::Lazy(b) => b.contains_key(key),
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Regular(b) => b.len(),
            Self::Lazy(b) => b.len(),
        }
    }

    /// Returns true if the box holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.put(key, value),
            Self::Lazy(b) => b.put(key, value),
        }
    }

    /// Stores every entry with a single log write.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn put_all(&mut self, entries: Vec<(String, Vec<u8>)>) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.put_all(entries),
            Self::Lazy(b) => b.put_all(entries),
        }
    }

    /// Removes `key`. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn delete(&mut self, key: &str) -> EngineResult<bool> {
        match self {
            Self::Regular(b) => b.delete(key),
            Self::Lazy(b) => b.delete(key),
        }
    }

    /// Removes every present key in `keys` and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn delete_all(&mut self, keys: &[&str]) -> EngineResult<usize> {
        match self {
            Self::Regular(b) => b.delete_all(keys),
            Self::Lazy(b) => b.delete_all(keys),
        }
    }

    /// Removes every entry and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be truncated.
    pub fn clear(&mut self) -> EngineResult<usize> {
        match self {
            Self::Regular(b) => b.clear(),
            Self::Lazy(b) => b.clear(),
        }
    }

    /// Rewrites the log with only the live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails.
    pub fn compact(&mut self) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.compact(),
            Self::Lazy(b) => b.compact(),
        }
    }

    /// Flushes and syncs the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn flush(&mut self) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.flush(),
            Self::Lazy(b) => b.flush(),
        }
    }

    /// Flushes the log and releases the box lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(self) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.close(),
            Self::Lazy(b) => b.close(),
        }
    }

    /// Closes the box and removes its files from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn delete_from_disk(self) -> EngineResult<()> {
        match self {
            Self::Regular(b) => b.delete_from_disk(),
            Self::Lazy(b) => b.delete_from_disk(),
        }
    }
}

impl From<KvBox> for BoxHandle {
    fn from(b: KvBox) -> Self {
        Self::Regular(b)
    }
}

impl From<LazyKvBox> for BoxHandle {
    fn from(b: LazyKvBox) -> Self {
        Self::Lazy(b)
    }
}
