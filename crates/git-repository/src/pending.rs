//! Crash-recoverable marker for an in-progress merge/cherry-pick/revert.
//!
//! C git records this kind of state as a handful of loosely-related files
//! (`MERGE_HEAD`, `MERGE_MSG`, `CHERRY_PICK_HEAD`, `REVERT_HEAD`). This
//! collapses them into one typed, exclusively-created file so a crashed
//! `--continue`/`--abort` has exactly one thing to check for.

use std::fs;
use std::path::{Path, PathBuf};

use git_hash::Oid;
use git_lock::LockFile;

use crate::RepoError;

/// Which operation left a pending marker behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Merge,
    CherryPick,
    Revert,
}

impl OperationKind {
    fn file_name(self) -> &'static str {
        match self {
            OperationKind::Merge => "MERGE_HEAD",
            OperationKind::CherryPick => "CHERRY_PICK_HEAD",
            OperationKind::Revert => "REVERT_HEAD",
        }
    }
}

/// The marker itself: which operation, and the OIDs it needs to resume or
/// unwind (the commit(s) being merged/picked/reverted, one per line).
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub heads: Vec<Oid>,
    pub message: Option<String>,
}

impl PendingOperation {
    /// Start a new pending operation, failing if one is already recorded.
    pub fn begin(git_dir: &Path, kind: OperationKind, heads: Vec<Oid>, message: Option<String>) -> Result<Self, RepoError> {
        let marker_path = Self::marker_path(git_dir, kind);
        if marker_path.exists() {
            return Err(RepoError::InvalidGitDir {
                path: marker_path,
                reason: "an operation is already in progress".to_string(),
            });
        }

        let mut body = String::new();
        for head in &heads {
            body.push_str(&head.to_hex());
            body.push('\n');
        }
        let mut lock = LockFile::acquire(&marker_path)?;
        lock.write_all(body.as_bytes())?;
        lock.commit()?;

        if let Some(ref msg) = message {
            fs::write(git_dir.join("MERGE_MSG"), msg)?;
        }

        Ok(Self { kind, heads, message })
    }

    /// Load a pending operation of the given kind if one is recorded.
    pub fn load(git_dir: &Path, kind: OperationKind) -> Result<Option<Self>, RepoError> {
        let marker_path = Self::marker_path(git_dir, kind);
        if !marker_path.exists() {
            return Ok(None);
        }
        let body = fs::read_to_string(&marker_path)?;
        let heads = body
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| Oid::from_hex(l.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RepoError::InvalidGitDir {
                path: marker_path.clone(),
                reason: "corrupt OID in marker".to_string(),
            })?;
        let message = fs::read_to_string(git_dir.join("MERGE_MSG")).ok();
        Ok(Some(Self { kind, heads, message }))
    }

    /// Clear the marker (and its message file), on successful `--continue`
    /// or explicit `--abort`.
    pub fn clear(git_dir: &Path, kind: OperationKind) -> Result<(), RepoError> {
        let marker_path = Self::marker_path(git_dir, kind);
        if marker_path.exists() {
            fs::remove_file(&marker_path)?;
        }
        let msg_path = git_dir.join("MERGE_MSG");
        if msg_path.exists() {
            fs::remove_file(&msg_path)?;
        }
        Ok(())
    }

    fn marker_path(git_dir: &Path, kind: OperationKind) -> PathBuf {
        git_dir.join(kind.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex: &str) -> Oid {
        Oid::from_hex(hex).unwrap()
    }

    #[test]
    fn begin_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let head = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        PendingOperation::begin(dir.path(), OperationKind::Merge, vec![head], Some("merge topic".into())).unwrap();

        let loaded = PendingOperation::load(dir.path(), OperationKind::Merge).unwrap().unwrap();
        assert_eq!(loaded.heads, vec![head]);
        assert_eq!(loaded.message.as_deref(), Some("merge topic"));
    }

    #[test]
    fn begin_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let head = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        PendingOperation::begin(dir.path(), OperationKind::Merge, vec![head], None).unwrap();
        let result = PendingOperation::begin(dir.path(), OperationKind::Merge, vec![head], None);
        assert!(result.is_err());
    }

    #[test]
    fn clear_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let head = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        PendingOperation::begin(dir.path(), OperationKind::Merge, vec![head], Some("msg".into())).unwrap();
        PendingOperation::clear(dir.path(), OperationKind::Merge).unwrap();
        assert!(PendingOperation::load(dir.path(), OperationKind::Merge).unwrap().is_none());
        assert!(!dir.path().join("MERGE_MSG").exists());
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PendingOperation::load(dir.path(), OperationKind::CherryPick).unwrap().is_none());
    }
}
