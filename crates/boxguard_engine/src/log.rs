//! The append-only record log behind every box.

use crate::config::EngineConfig;
use crate::dir::{sync_directory, BoxPaths};
use crate::error::{EngineError, EngineResult};
use crate::record::{encode_header, scan, Record, ScannedFrame, HEADER_LEN};
use boxguard_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::fs;
use tracing::{debug, warn};

/// Where a value lives inside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSlot {
    /// Absolute offset of the value bytes.
    pub offset: u64,
    /// Length of the value bytes.
    pub len: u32,
}

impl From<&ScannedFrame> for ValueSlot {
    fn from(frame: &ScannedFrame) -> Self {
        Self {
            offset: frame.value_offset,
            len: frame.value_len,
        }
    }
}

/// Record log of one box.
///
/// Owns the storage backend and counts superseded frames so the owning box
/// can decide when to compact.
pub struct BoxLog {
    name: String,
    backend: Box<dyn StorageBackend>,
    paths: Option<BoxPaths>,
    sync_on_write: bool,
    superseded: usize,
    // set when compaction lost the file handle; every later call fails
    poisoned: bool,
}

impl std::fmt::Debug for BoxLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLog")
            .field("name", &self.name)
            .field("paths", &self.paths)
            .field("superseded", &self.superseded)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl BoxLog {
    /// Opens the log file of a locked box and replays it.
    ///
    /// Returns the log and every intact frame in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the header is invalid,
    /// or the tail is damaged while crash recovery is off.
    pub fn open_file(
        paths: &BoxPaths,
        config: &EngineConfig,
    ) -> EngineResult<(Self, Vec<ScannedFrame>)> {
        let backend = FileBackend::open(&paths.log_path())?;
        let mut log = Self {
            name: paths.name().to_string(),
            backend: Box::new(backend),
            paths: Some(paths.clone()),
            sync_on_write: config.sync_on_write,
            superseded: 0,
            poisoned: false,
        };
        let frames = log.replay(config.crash_recovery)?;
        Ok((log, frames))
    }

    /// Opens a log over an arbitrary backend, e.g. [`InMemoryBackend`].
    ///
    /// # Errors
    ///
    /// Same as [`BoxLog::open_file`].
    pub fn open_with_backend(
        name: &str,
        backend: Box<dyn StorageBackend>,
        config: &EngineConfig,
    ) -> EngineResult<(Self, Vec<ScannedFrame>)> {
        let mut log = Self {
            name: name.to_string(),
            backend,
            paths: None,
            sync_on_write: config.sync_on_write,
            superseded: 0,
            poisoned: false,
        };
        let frames = log.replay(config.crash_recovery)?;
        Ok((log, frames))
    }

    fn replay(&mut self, crash_recovery: bool) -> EngineResult<Vec<ScannedFrame>> {
        let size = self.backend.size()?;
        if size < HEADER_LEN {
            if size > 0 && !crash_recovery {
                return Err(EngineError::corrupted(format!(
                    "box '{}' log header is truncated",
                    self.name
                )));
            }
            self.backend.truncate(0)?;
            self.backend.append(&encode_header())?;
            self.backend.sync()?;
            return Ok(Vec::new());
        }

        let bytes = self.backend.read_all()?;
        let outcome = scan(&bytes)?;

        if let Some(damage) = outcome.damage {
            if !crash_recovery {
                return Err(EngineError::corrupted(format!(
                    "box '{}' at offset {}: {damage}",
                    self.name, outcome.valid_len
                )));
            }
            warn!(
                box_name = %self.name,
                valid_len = outcome.valid_len,
                total_len = bytes.len(),
                error = %damage,
                "truncating damaged box log tail"
            );
            self.backend.truncate(outcome.valid_len)?;
        }

        debug!(box_name = %self.name, frames = outcome.frames.len(), "replayed box log");
        Ok(outcome.frames)
    }

    fn ensure_usable(&self) -> EngineResult<()> {
        if self.poisoned {
            return Err(EngineError::corrupted(format!(
                "box '{}' lost its log file during compaction and must be reopened",
                self.name
            )));
        }
        Ok(())
    }

    /// Appends `records` as one write and returns the slot of each record's
    /// value, in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded or the write fails.
    pub fn append(&mut self, records: &[Record]) -> EngineResult<Vec<ValueSlot>> {
        self.ensure_usable()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let base = self.backend.size()?;
        let mut buf = Vec::new();
        let mut slots = Vec::with_capacity(records.len());

        for record in records {
            let frame_start = base + buf.len() as u64;
            let frame = record.encode_frame()?;
            let value_offset = frame_start + record.value_offset_in_frame() as u64;
            let len = (frame.len() as u64 - (value_offset - frame_start)) as u32;
            slots.push(ValueSlot {
                offset: value_offset,
                len,
            });
            buf.extend_from_slice(&frame);
        }

        self.backend.append(&buf)?;
        if self.sync_on_write {
            self.backend.sync()?;
        }
        Ok(slots)
    }

    /// Reads a value back from the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot lies outside the log or the read fails.
    pub fn read_value(&self, slot: ValueSlot) -> EngineResult<Vec<u8>> {
        self.ensure_usable()?;
        Ok(self.backend.read_at(slot.offset, slot.len as usize)?)
    }

    /// Drops every frame, keeping only the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation fails.
    pub fn clear(&mut self) -> EngineResult<()> {
        self.ensure_usable()?;
        self.backend.truncate(HEADER_LEN)?;
        self.superseded = 0;
        Ok(())
    }

    /// Records that `count` frames no longer describe live entries.
    pub fn note_superseded(&mut self, count: usize) {
        self.superseded += count;
    }

    /// Returns the number of frames that no longer describe live entries.
    #[must_use]
    pub fn superseded(&self) -> usize {
        self.superseded
    }

    /// Rewrites the log so it holds exactly one put frame per live entry.
    ///
    /// File-backed logs are written to the scratch file, synced and renamed
    /// over the log. Returns the new slot of every entry, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, writing or renaming fails. On a failed
    /// rename the previous log stays in place and is reopened. If no log can
    /// be reopened the log is poisoned: every later call returns
    /// [`EngineError::Corrupted`] instead of writing to nowhere.
    pub fn compact(&mut self, live: Vec<(String, Vec<u8>)>) -> EngineResult<Vec<(String, ValueSlot)>> {
        self.ensure_usable()?;
        let mut buf = encode_header().to_vec();
        let mut slots = Vec::with_capacity(live.len());

        for (key, value) in live {
            let frame_start = buf.len() as u64;
            let len = value.len() as u32;
            let record = Record::Put {
                key: key.clone(),
                value,
            };
            let offset = frame_start + record.value_offset_in_frame() as u64;
            buf.extend_from_slice(&record.encode_frame()?);
            slots.push((key, ValueSlot { offset, len }));
        }

        let before = self.backend.size()?;
        match &self.paths {
            Some(paths) => {
                let log_path = paths.log_path();
                let scratch_path = paths.compact_path();

                let mut scratch = FileBackend::create_truncated(&scratch_path)?;
                scratch.append(&buf)?;
                scratch.sync()?;
                drop(scratch);

                // Release our handle on the old log before replacing it.
                self.backend = Box::new(InMemoryBackend::new());
                let renamed = fs::rename(&scratch_path, &log_path);
                match FileBackend::open(&log_path) {
                    Ok(reopened) => self.backend = Box::new(reopened),
                    Err(e) => {
                        self.poisoned = true;
                        warn!(box_name = %self.name, error = %e, "could not reopen box log after compaction");
                        return Err(e.into());
                    }
                }
                renamed?;
                sync_directory(paths.root())?;
            }
            None => {
                self.backend.truncate(0)?;
                self.backend.append(&buf)?;
                self.backend.sync()?;
            }
        }

        debug!(
            box_name = %self.name,
            before,
            after = buf.len(),
            dropped_frames = self.superseded,
            "compacted box log"
        );
        self.superseded = 0;
        Ok(slots)
    }

    /// Flushes pending writes to the OS and syncs them.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn flush(&mut self) -> EngineResult<()> {
        self.ensure_usable()?;
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }
}
