//! File-backed storage for box logs.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A storage backend writing to a single file.
///
/// `flush()` hands data to the OS, `sync()` calls `File::sync_all()`.
///
/// The file handle is kept behind a mutex because `read_at` has to seek, and
/// seeking needs exclusive access to the handle.
///
/// # Example
///
/// ```no_run
/// use boxguard_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("settings.box")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, false)
    }

    /// Creates the file at `path`, discarding any previous content.
    ///
    /// Used for compaction scratch files.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_truncated(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, truncate: bool) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let in_bounds = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if !data.is_empty() {
            // a recovered log may have been truncated behind the cursor
            let file = self.file.get_mut();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            self.size += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(self.file.get_mut().flush()?)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(self.file.get_mut().sync_all()?)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }
        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn appends_return_their_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        let mut backend = FileBackend::open(&path).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);

        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_all().unwrap(), b"persistent data");
    }

    #[test]
    fn append_after_truncate_overwrites_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"good-torn").unwrap();
        backend.truncate(4).unwrap();

        assert_eq!(backend.append(b"!").unwrap(), 4);
        assert_eq!(backend.read_all().unwrap(), b"good!");
    }

    #[test]
    fn truncate_cannot_grow() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.box");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"abc").unwrap();

        let result = backend.truncate(10);
        assert!(matches!(
            result,
            Err(StorageError::TruncateBeyondEnd {
                requested: 10,
                size: 3
            })
        ));
    }

    #[test]
    fn create_truncated_discards_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.boxc");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"stale").unwrap();
        }

        let backend = FileBackend::create_truncated(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }
}
