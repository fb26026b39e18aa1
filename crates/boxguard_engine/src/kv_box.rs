//! Regular boxes: every value is kept in memory.

use crate::config::{CompactionStrategy, EngineConfig};
use crate::dir::BoxFiles;
use crate::error::EngineResult;
use crate::log::BoxLog;
use crate::record::Record;
use boxguard_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// A box that loads every entry into memory when opened.
///
/// Reads never touch disk. Writes append to the record log before the
/// in-memory map is updated, so a failed write leaves the map unchanged.
#[derive(Debug)]
pub struct KvBox {
    name: String,
    files: Option<BoxFiles>,
    log: BoxLog,
    entries: BTreeMap<String, Vec<u8>>,
    compaction: CompactionStrategy,
}

impl KvBox {
    /// Opens a box whose lock is already held by `files`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or replayed.
    pub fn open(files: BoxFiles, config: &EngineConfig) -> EngineResult<Self> {
        let (mut log, frames) = BoxLog::open_file(files.paths(), config)?;

        let mut entries = BTreeMap::new();
        let mut superseded = 0;
        for frame in frames {
            let replaced = match frame.record {
                Record::Put { key, value } => entries.insert(key, value).is_some(),
                Record::Delete { key } => {
                    // the delete frame itself is dead weight too
                    superseded += 1;
                    entries.remove(&key).is_some()
                }
            };
            if replaced {
                superseded += 1;
            }
        }
        log.note_superseded(superseded);

        debug!(box_name = files.paths().name(), entries = entries.len(), "opened box");
        Ok(Self {
            name: files.paths().name().to_string(),
            files: Some(files),
            log,
            entries,
            compaction: config.compaction,
        })
    }

    /// Creates a box that lives only in memory and holds no lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty log cannot be initialized.
    pub fn in_memory(name: &str, config: &EngineConfig) -> EngineResult<Self> {
        let (log, _) = BoxLog::open_with_backend(name, Box::new(InMemoryBackend::new()), config)?;
        Ok(Self {
            name: name.to_string(),
            files: None,
            log,
            entries: BTreeMap::new(),
            compaction: config.compaction,
        })
    }

    /// Returns the box name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the record log path, or `None` for in-memory boxes.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.files.as_ref().map(|f| f.paths().log_path())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Returns every entry.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.entries
    }

    /// Returns every key in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the box holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> EngineResult<()> {
        self.put_all(vec![(key.into(), value)])
    }

    /// Stores every entry with a single log write.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails; no entry is applied then.
    pub fn put_all(&mut self, entries: Vec<(String, Vec<u8>)>) -> EngineResult<()> {
        let records: Vec<Record> = entries
            .into_iter()
            .map(|(key, value)| Record::Put { key, value })
            .collect();
        self.log.append(&records)?;

        let mut superseded = 0;
        for record in records {
            if let Record::Put { key, value } = record {
                if self.entries.insert(key, value).is_some() {
                    superseded += 1;
                }
            }
        }
        self.log.note_superseded(superseded);
        self.maybe_compact()
    }

    /// Removes `key`. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn delete(&mut self, key: &str) -> EngineResult<bool> {
        Ok(self.delete_all(&[key])? == 1)
    }

    /// Removes every present key in `keys` with a single log write and
    /// returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn delete_all(&mut self, keys: &[&str]) -> EngineResult<usize> {
        let mut present: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| self.entries.contains_key(*k))
            .collect();
        present.sort_unstable();
        present.dedup();
        if present.is_empty() {
            return Ok(0);
        }

        let records: Vec<Record> = present
            .iter()
            .map(|k| Record::Delete { key: (*k).to_string() })
            .collect();
        self.log.append(&records)?;

        for key in &present {
            self.entries.remove(*key);
        }
        // each removal kills a put frame and leaves a delete frame behind
        self.log.note_superseded(present.len() * 2);
        self.maybe_compact()?;
        Ok(present.len())
    }

    /// Removes every entry and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be truncated.
    pub fn clear(&mut self) -> EngineResult<usize> {
        self.log.clear()?;
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }

    /// Rewrites the log with only the live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails.
    pub fn compact(&mut self) -> EngineResult<()> {
        let live = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.log.compact(live)?;
        Ok(())
    }

    fn maybe_compact(&mut self) -> EngineResult<()> {
        if self
            .compaction
            .should_compact(self.entries.len(), self.log.superseded())
        {
            self.compact()?;
        }
        Ok(())
    }

    /// Flushes and syncs the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn flush(&mut self) -> EngineResult<()> {
        self.log.flush()
    }

    /// Flushes the log and releases the box lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails. The lock is released
    /// either way.
    pub fn close(mut self) -> EngineResult<()> {
        let flushed = self.log.flush();
        debug!(box_name = %self.name, "closed box");
        drop(self.files.take());
        flushed
    }

    /// Closes the box and removes its files from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn delete_from_disk(self) -> EngineResult<()> {
        let Self { name, files, log, .. } = self;
        drop(log);
        if let Some(files) = files {
            files.remove()?;
        }
        debug!(box_name = %name, "deleted box from disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use tempfile::tempdir;

    fn open(root: &std::path::Path, config: &EngineConfig) -> KvBox {
        KvBox::open(BoxFiles::lock(root, "settings").unwrap(), config).unwrap()
    }

    #[test]
    fn put_get_delete() {
        let mut b = KvBox::in_memory("mem", &EngineConfig::default()).unwrap();

        b.put("theme", b"dark".to_vec()).unwrap();
        assert_eq!(b.get("theme"), Some(&b"dark"[..]));
        assert!(b.contains_key("theme"));

        assert!(b.delete("theme").unwrap());
        assert!(!b.delete("theme").unwrap());
        assert!(b.is_empty());
    }

    #[test]
    fn entries_survive_reopen() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();

        {
            let mut b = open(temp.path(), &config);
            b.put_all(vec![
                ("a".into(), b"1".to_vec()),
                ("b".into(), b"2".to_vec()),
                ("c".into(), b"3".to_vec()),
            ])
            .unwrap();
            b.put("a", b"one".to_vec()).unwrap();
            b.delete("b").unwrap();
            b.close().unwrap();
        }

        let b = open(temp.path(), &config);
        assert_eq!(b.keys().collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(b.get("a"), Some(&b"one"[..]));
    }

    #[test]
    fn open_box_holds_lock_until_close() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();

        let b = open(temp.path(), &config);
        assert!(matches!(
            BoxFiles::lock(temp.path(), "settings"),
            Err(EngineError::BoxLocked { .. })
        ));

        b.close().unwrap();
        let _again = open(temp.path(), &config);
    }

    #[test]
    fn clear_survives_reopen() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();

        {
            let mut b = open(temp.path(), &config);
            b.put("a", b"1".to_vec()).unwrap();
            b.put("b", b"2".to_vec()).unwrap();
            assert_eq!(b.clear().unwrap(), 2);
            b.put("c", b"3".to_vec()).unwrap();
        }

        let b = open(temp.path(), &config);
        assert_eq!(b.len(), 1);
        assert_eq!(b.get("c"), Some(&b"3"[..]));
    }

    #[test]
    fn overwrites_trigger_compaction() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();
        let path;

        {
            let mut b = open(temp.path(), &config);
            for i in 0..200u32 {
                b.put("counter", i.to_le_bytes().to_vec()).unwrap();
            }
            path = b.path().unwrap();
        }

        // 200 frames of 24 bytes each would be ~4.8 KB without compaction
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size < 2_048, "log was not compacted: {size} bytes");

        let b = open(temp.path(), &config);
        assert_eq!(b.get("counter"), Some(&199u32.to_le_bytes()[..]));
    }

    #[test]
    fn delete_from_disk_removes_files() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();

        let mut b = open(temp.path(), &config);
        b.put("a", b"1".to_vec()).unwrap();
        let path = b.path().unwrap();
        b.delete_from_disk().unwrap();

        assert!(!path.exists());
        let b = open(temp.path(), &config);
        assert!(b.is_empty());
    }
}
