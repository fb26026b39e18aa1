//! Lazy boxes: only keys are kept in memory.

use crate::config::{CompactionStrategy, EngineConfig};
use crate::dir::BoxFiles;
use crate::error::EngineResult;
use crate::log::{BoxLog, ValueSlot};
use crate::record::Record;
use boxguard_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// A box that keeps only its keys and the log position of each value in
/// memory. Every `get` reads the value from the log.
#[derive(Debug)]
pub struct LazyKvBox {
    name: String,
    files: Option<BoxFiles>,
    log: BoxLog,
    slots: BTreeMap<String, ValueSlot>,
    compaction: CompactionStrategy,
}

impl LazyKvBox {
    /// Opens a box whose lock is already held by `files`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or replayed.
    pub fn open(files: BoxFiles, config: &EngineConfig) -> EngineResult<Self> {
        let (mut log, frames) = BoxLog::open_file(files.paths(), config)?;

        let mut slots = BTreeMap::new();
        let mut superseded = 0;
        for frame in &frames {
            let replaced = match &frame.record {
                Record::Put { key, .. } => slots.insert(key.clone(), ValueSlot::from(frame)).is_some(),
                Record::Delete { key } => {
                    superseded += 1;
                    slots.remove(key).is_some()
                }
            };
            if replaced {
                superseded += 1;
            }
        }
        log.note_superseded(superseded);

        debug!(box_name = files.paths().name(), entries = slots.len(), "opened lazy box");
        Ok(Self {
            name: files.paths().name().to_string(),
            files: Some(files),
            log,
            slots,
            compaction: config.compaction,
        })
    }

    /// Creates a lazy box that lives only in memory and holds no lock.
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
            slots: BTreeMap::new(),
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

    /// Reads the value stored under `key` from the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        match self.slots.get(key) {
            Some(slot) => Ok(Some(self.log.read_value(*slot)?)),
            None => Ok(None),
        }
    }

    /// Returns every key in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the box holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
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
        let new_slots = self.log.append(&records)?;

        let mut superseded = 0;
        for (record, slot) in records.into_iter().zip(new_slots) {
            if let Record::Put { key, .. } = record {
                if self.slots.insert(key, slot).is_some() {
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
            .filter(|k| self.slots.contains_key(*k))
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
            self.slots.remove(*key);
        }
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
        let removed = self.slots.len();
        self.slots.clear();
        Ok(removed)
    }

    /// Rewrites the log with only the live entries.
    ///
    /// Every live value is read back from the current log first.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or the rewrite fails.
    pub fn compact(&mut self) -> EngineResult<()> {
        let mut live = Vec::with_capacity(self.slots.len());
        for (key, slot) in &self.slots {
            live.push((key.clone(), self.log.read_value(*slot)?));
        }
        self.slots = self.log.compact(live)?.into_iter().collect();
        Ok(())
    }

    fn maybe_compact(&mut self) -> EngineResult<()> {
        if self
            .compaction
            .should_compact(self.slots.len(), self.log.superseded())
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
        debug!(box_name = %self.name, "closed lazy box");
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
        debug!(box_name = %name, "deleted lazy box from disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_box::KvBox;
    use tempfile::tempdir;

    #[test]
    fn values_are_read_from_log() {
        let mut b = LazyKvBox::in_memory("mem", &EngineConfig::default()).unwrap();

        b.put("a", b"alpha".to_vec()).unwrap();
        b.put("b", b"beta".to_vec()).unwrap();
        b.put("a", b"again".to_vec()).unwrap();

        assert_eq!(b.get("a").unwrap().as_deref(), Some(&b"again"[..]));
        assert_eq!(b.get("b").unwrap().as_deref(), Some(&b"beta"[..]));
        assert_eq!(b.get("missing").unwrap(), None);
    }

    #[test]
    fn lazy_and_regular_share_the_format() {
        let temp = tempdir().unwrap();
        let config = EngineConfig::default();

        {
            let mut regular = KvBox::open(BoxFiles::lock(temp.path(), "shared").unwrap(), &config).unwrap();
            regular.put("k", b"written by regular".to_vec()).unwrap();
            regular.close().unwrap();
        }

        let mut lazy = LazyKvBox::open(BoxFiles::lock(temp.path(), "shared").unwrap(), &config).unwrap();
        assert_eq!(lazy.get("k").unwrap().unwrap(), b"written by regular");
        lazy.put("k2", b"written by lazy".to_vec()).unwrap();
        lazy.close().unwrap();

        let regular = KvBox::open(BoxFiles::lock(temp.path(), "shared").unwrap(), &config).unwrap();
        assert_eq!(regular.get("k2"), Some(&b"written by lazy"[..]));
    }

    #[test]
    fn compaction_rewrites_slots() {
        let mut b = LazyKvBox::in_memory("mem", &EngineConfig::default()).unwrap();

        for i in 0..150u32 {
            b.put("hot", i.to_le_bytes().to_vec()).unwrap();
            b.put(format!("cold-{}", i % 3), vec![i as u8]).unwrap();
        }
        b.compact().unwrap();

        assert_eq!(b.len(), 4);
        assert_eq!(b.get("hot").unwrap().unwrap(), 149u32.to_le_bytes());
        assert_eq!(b.get("cold-2").unwrap().unwrap(), vec![149u8]);
    }

    #[test]
    fn delete_all_counts_present_keys() {
        let mut b = LazyKvBox::in_memory("mem", &EngineConfig::default()).unwrap();
        b.put("a", vec![1]).unwrap();
        b.put("b", vec![2]).unwrap();

        assert_eq!(b.delete_all(&["a", "a", "missing"]).unwrap(), 1);
        assert_eq!(b.keys().collect::<Vec<_>>(), ["b"]);
        assert_eq!(b.clear().unwrap(), 1);
        assert!(b.is_empty());
    }
}
