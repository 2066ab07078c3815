//! Lock discipline for named-file writes.
//!
//! Every mutable on-disk name in this codebase (references, the index,
//! pending-operation markers) is updated the same way: open `<path>.lock`
//! with create+exclusive, write the new contents, then either `commit`
//! (rename `.lock` over the target) or `rollback` (unlink `.lock`). Two
//! writers racing for the same path never corrupt it — the loser's
//! `acquire` fails with [`LockError::LockDenied`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("unable to lock '{path}': already locked")]
    LockDenied { path: PathBuf },

    #[error("unable to lock '{path}': parent directory does not exist")]
    MissingParent { path: PathBuf },

    #[error("unable to lock '{path}': permission denied")]
    NoPermission { path: PathBuf },

    #[error("lock for '{path}' already committed or rolled back")]
    StaleLock { path: PathBuf },

    #[error(transparent)]
    Io(#[from] io::Error),
}

const LOCK_SUFFIX: &str = ".lock";

/// RAII guard over `<path>.lock`. Dropping without `commit`/`rollback`
/// rolls back implicitly.
pub struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    done: bool,
}

impl LockFile {
    /// Acquire a lock on `path` by creating `path.lock` exclusively.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = append_suffix(&path, LOCK_SUFFIX);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| classify_open_error(e, &lock_path))?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            done: false,
        })
    }

    /// Like [`acquire`](Self::acquire), but returns `Ok(None)` instead of
    /// [`LockError::LockDenied`] when another writer already holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(path) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::LockDenied { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| LockError::StaleLock {
            path: self.path.clone(),
        })
    }

    /// Write the full new contents of the locked file.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file_mut()?.write_all(bytes)?;
        Ok(())
    }

    /// Close the lock file and atomically rename it over the target.
    pub fn commit(mut self) -> Result<()> {
        if self.done {
            return Err(LockError::StaleLock { path: self.path.clone() });
        }
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&self.lock_path, &self.path)?;
        self.done = true;
        Ok(())
    }

    /// Discard the pending write, leaving the target untouched.
    pub fn rollback(mut self) -> Result<()> {
        if self.done {
            return Err(LockError::StaleLock { path: self.path.clone() });
        }
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.done = true;
        Ok(())
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already committed or rolled back"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already committed or rolled back"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.done {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn classify_open_error(e: io::Error, lock_path: &Path) -> LockError {
    match e.kind() {
        io::ErrorKind::AlreadyExists => LockError::LockDenied {
            path: lock_path.to_path_buf(),
        },
        io::ErrorKind::NotFound => LockError::MissingParent {
            path: lock_path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => LockError::NoPermission {
            path: lock_path.to_path_buf(),
        },
        _ => LockError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"old").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"new").unwrap();
        lock.commit().unwrap();

        assert!(!dir.path().join("test.txt.lock").exists());
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn rollback_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"original").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"discarded").unwrap();
        lock.rollback().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!dir.path().join("test.txt.lock").exists());
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"original").unwrap();

        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"dropped").unwrap();
        }

        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!dir.path().join("test.txt.lock").exists());
    }

    #[test]
    fn concurrent_acquire_denied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"content").unwrap();

        let _first = LockFile::acquire(&target).unwrap();
        match LockFile::acquire(&target) {
            Err(LockError::LockDenied { .. }) => {}
            other => panic!("expected LockDenied, got {other:?}"),
        }
        assert!(LockFile::try_acquire(&target).unwrap().is_none());
    }

    #[test]
    fn missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nope").join("test.txt");
        match LockFile::acquire(&target) {
            Err(LockError::MissingParent { .. }) => {}
            other => panic!("expected MissingParent, got {other:?}"),
        }
    }

    #[test]
    fn new_file_can_be_locked() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("brand_new.txt");
        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"created").unwrap();
        lock.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"created");
    }
}
