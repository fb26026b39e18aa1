//! Box file layout and locking.
//!
//! Every box lives in the engine's root directory as a small set of files:
//!
//! ```text
//! <root>/
//! ├─ <name>.box     # Record log
//! ├─ <name>.lock    # Advisory lock, one holder across all processes
//! └─ <name>.boxc    # Compaction scratch file, renamed over <name>.box
//! ```
//!
//! The lock file is what makes a box single-holder. Opening takes a
//! non-blocking exclusive lock and fails with [`EngineError::BoxLocked`] when
//! anybody else has it. The lock file is never deleted: every process must
//! lock the same inode, and a process may already hold an open descriptor
//! of it while waiting for its turn.

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_EXTENSION: &str = "box";
const LOCK_EXTENSION: &str = "lock";
const COMPACT_EXTENSION: &str = "boxc";

/// Longest accepted box name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Lower-cases `name` and checks it can be used as a file stem.
///
/// # Errors
///
/// Returns [`EngineError::InvalidName`] for empty or overlong names and for
/// names containing anything other than `[a-z0-9_-]` after lower-casing.
pub fn normalize_box_name(name: &str) -> EngineResult<String> {
    let invalid = |reason| EngineError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 255 bytes"));
    }

    let normalized = name.to_ascii_lowercase();
    if !normalized
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
    {
        return Err(invalid("only letters, digits, '_' and '-' are allowed"));
    }

    Ok(normalized)
}

/// Paths of one box inside a root directory. Holds no lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxPaths {
    name: String,
    root: PathBuf,
}

impl BoxPaths {
    /// Builds the paths for an already normalized box name.
    #[must_use]
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: root.to_path_buf(),
        }
    }

    /// Returns the normalized box name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory the box lives in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.file(LOG_EXTENSION)
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.file(LOCK_EXTENSION)
    }

    /// Returns the path of the compaction scratch file.
    #[must_use]
    pub fn compact_path(&self) -> PathBuf {
        self.file(COMPACT_EXTENSION)
    }

    /// Returns true if a record log exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.log_path().exists()
    }

    fn file(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", self.name))
    }
}

/// The files of an open box, holding its exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct BoxFiles {
    paths: BoxPaths,
    _lock_file: File,
}

impl BoxFiles {
    /// Creates `root` if needed and takes the exclusive lock of box `name`.
    ///
    /// `name` must already be normalized.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BoxLocked`] if the lock is held elsewhere, or an
    /// I/O error if the directory or lock file cannot be created.
    pub fn lock(root: &Path, name: &str) -> EngineResult<Self> {
        fs::create_dir_all(root)?;
        let paths = BoxPaths::new(root, name);

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(paths.lock_path())?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::box_locked(name));
        }

        Ok(Self {
            paths,
            _lock_file: lock_file,
        })
    }

    /// Returns the paths of the locked box.
    #[must_use]
    pub fn paths(&self) -> &BoxPaths {
        &self.paths
    }

    /// Deletes the record log and any compaction scratch file, then
    /// releases the lock.
    ///
    /// The lock file stays in place so the next holder locks the same file
    /// as everybody still waiting on it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file exists but cannot be removed.
    pub fn remove(self) -> EngineResult<()> {
        remove_if_exists(&self.paths.log_path())?;
        remove_if_exists(&self.paths.compact_path())?;
        sync_directory(self.paths.root())?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> EngineResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Syncs a directory so creates, renames and deletes inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> EngineResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> EngineResult<()> {
    // NTFS journals metadata; directories cannot be fsynced there
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_are_lowercased() {
        assert_eq!(normalize_box_name("Settings_V2").unwrap(), "settings_v2");
        assert_eq!(normalize_box_name("a-b-1").unwrap(), "a-b-1");
    }

    #[test]
    fn bad_names_are_rejected() {
        for name in ["", "../escape", "with space", "dots.box", "ünïcode"] {
            assert!(
                matches!(normalize_box_name(name), Err(EngineError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(normalize_box_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(normalize_box_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn lock_creates_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("boxes");

        let files = BoxFiles::lock(&root, "settings").unwrap();
        assert!(root.is_dir());
        assert!(files.paths().lock_path().exists());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();

        let _first = BoxFiles::lock(temp.path(), "settings").unwrap();
        let second = BoxFiles::lock(temp.path(), "settings");
        assert!(matches!(second, Err(EngineError::BoxLocked { ref name }) if name == "settings"));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();

        {
            let _files = BoxFiles::lock(temp.path(), "settings").unwrap();
        }

        let _again = BoxFiles::lock(temp.path(), "settings").unwrap();
    }

    #[test]
    fn different_boxes_do_not_contend() {
        let temp = tempdir().unwrap();

        let _a = BoxFiles::lock(temp.path(), "a").unwrap();
        let _b = BoxFiles::lock(temp.path(), "b").unwrap();
    }

    #[test]
    fn remove_deletes_files_and_unlocks() {
        let temp = tempdir().unwrap();

        let files = BoxFiles::lock(temp.path(), "settings").unwrap();
        let paths = files.paths().clone();
        fs::write(paths.log_path(), b"log").unwrap();

        files.remove().unwrap();
        assert!(!paths.exists());
        assert!(paths.lock_path().exists());

        let _again = BoxFiles::lock(temp.path(), "settings").unwrap();
    }

    #[test]
    fn waiter_and_newcomer_contend_after_remove() {
        let temp = tempdir().unwrap();

        let holder = BoxFiles::lock(temp.path(), "shared").unwrap();
        let waiter = OpenOptions::new()
            .read(true)
            .write(true)
            .open(holder.paths().lock_path())
            .unwrap();
        assert!(waiter.try_lock_exclusive().is_err());

        holder.remove().unwrap();

        // the waiter's descriptor still names the live lock file
        assert!(waiter.try_lock_exclusive().is_ok());
        assert!(matches!(
            BoxFiles::lock(temp.path(), "shared"),
            Err(EngineError::BoxLocked { .. })
        ));

        drop(waiter);
        let _next = BoxFiles::lock(temp.path(), "shared").unwrap();
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let paths = BoxPaths::new(temp.path(), "settings");

        assert_eq!(paths.log_path(), temp.path().join("settings.box"));
        assert_eq!(paths.lock_path(), temp.path().join("settings.lock"));
        assert_eq!(paths.compact_path(), temp.path().join("settings.boxc"));
    }
}
