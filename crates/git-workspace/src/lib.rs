//! Diff-to-filesystem migration: taking a clean tree diff (from a merge or
//! a checkout) and making the working tree and the index agree with it.
//!
//! [`migrate`] is the only entry point. It runs pre-flight checks before
//! touching anything, then executes in a fixed order — deletes, directory
//! removals, directory creations, updates, creates — updating the index in
//! lockstep so a failure partway through rolls back the index lock without
//! committing a half-applied view.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bstr::BString;
use git_diff::{DiffResult, FileDiff, FileStatus};
use git_hash::Oid;
use git_index::entry::StatData;
use git_index::{Index, IndexError};
use git_object::{Blob, FileMode, Object};
use git_odb::ObjectDatabase;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("'{0}' exists and is not a directory")]
    PathCollision(BString),

    #[error("'{0}' has local modifications")]
    WorkingTreeConflict(BString),

    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    #[error("expected a blob for {0}, found a {1}")]
    ExpectedBlob(Oid, String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Lock(#[from] git_lock::LockError),
}

/// Paths touched by a successful [`migrate`] call, for callers that want to
/// report what changed.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub created: Vec<BString>,
    pub updated: Vec<BString>,
    pub deleted: Vec<BString>,
}

/// Apply `diff` to `work_tree`, updating the index at `index_path` in
/// lockstep. On any error the index lock is rolled back and the function
/// returns before committing — files already written to the working tree
/// before the failing step are not rolled back (see the core's ordering
/// guarantees around workspace mutation).
pub fn migrate(odb: &ObjectDatabase, work_tree: &Path, index_path: &Path, diff: &DiffResult) -> Result<MigrationReport, WorkspaceError> {
    let (mut index, lock) = Index::load_for_update(index_path)?;

    match apply_diff(odb, work_tree, diff, &mut index) {
        Ok(report) => {
            index.write_updates(lock)?;
            Ok(report)
        }
        Err(err) => {
            let _ = Index::release_lock(lock);
            Err(err)
        }
    }
}

/// Materialize a merge collision side as an untracked `<path>~<side>` file.
/// Never touches the index — the path it writes to is, by construction,
/// not a path the merge result tracks.
pub fn write_collision_file(odb: &ObjectDatabase, work_tree: &Path, path: &BString, oid: Oid, mode: FileMode) -> Result<(), WorkspaceError> {
    let full_path = work_tree.join(path_to_relative(path));
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_blob_file(odb, &full_path, oid, mode)
}

fn apply_diff(odb: &ObjectDatabase, work_tree: &Path, diff: &DiffResult, index: &mut Index) -> Result<MigrationReport, WorkspaceError> {
    let mut deletes = Vec::new();
    let mut updates = Vec::new();
    let mut creates = Vec::new();

    for file in &diff.files {
        match file.status {
            FileStatus::Deleted => deletes.push(file),
            FileStatus::Added => creates.push(file),
            FileStatus::Modified | FileStatus::TypeChanged => updates.push(file),
        }
    }

    preflight(work_tree, &deletes, &creates)?;

    let mut report = MigrationReport::default();

    for file in &deletes {
        let path = file.path();
        let full_path = work_tree.join(path_to_relative(path));
        if full_path.exists() {
            fs::remove_file(&full_path)?;
        }
        index.remove(&path_to_relative(path));
        report.deleted.push(path.clone());
    }

    remove_empty_directories(work_tree, deletes.iter().map(|f| f.path()));
    create_ancestor_directories(work_tree, creates.iter().chain(updates.iter()).map(|f| f.path()))?;

    for file in &updates {
        write_entry(odb, work_tree, index, file)?;
        report.updated.push(file.path().clone());
    }

    for file in &creates {
        write_entry(odb, work_tree, index, file)?;
        report.created.push(file.path().clone());
    }

    Ok(report)
}

fn preflight(work_tree: &Path, deletes: &[&FileDiff], creates: &[&FileDiff]) -> Result<(), WorkspaceError> {
    for file in creates {
        let path = file.path();
        let mut ancestor = PathBuf::new();
        for component in path_to_relative(path).components() {
            ancestor.push(component);
            if ancestor == path_to_relative(path) {
                break;
            }
            let full = work_tree.join(&ancestor);
            match fs::symlink_metadata(&full) {
                Ok(meta) if !meta.is_dir() => return Err(WorkspaceError::PathCollision(path.clone())),
                _ => {}
            }
        }
    }

    for file in deletes {
        let path = file.path();
        let full_path = work_tree.join(path_to_relative(path));
        let Some(old_oid) = file.old_oid else { continue };
        let Ok(current) = fs::read(&full_path) else { continue };
        let current_oid = Object::Blob(Blob::new(current)).compute_oid();
        if current_oid != old_oid {
            return Err(WorkspaceError::WorkingTreeConflict(path.clone()));
        }
    }

    Ok(())
}

/// Remove directories left empty by a set of deletes, deepest first.
/// Best-effort: a directory that still has other tracked or untracked
/// content fails with `NotEmpty` and is silently skipped.
fn remove_empty_directories<'a>(work_tree: &Path, deleted_paths: impl Iterator<Item = &'a BString>) {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for path in deleted_paths {
        let mut ancestor = path_to_relative(path);
        while let Some(parent) = ancestor.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent.to_path_buf());
            ancestor = parent.to_path_buf();
        }
    }
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    dirs.dedup();
    for dir in dirs {
        // Best-effort: a directory that still has other content fails
        // and is left alone.
        let _ = fs::remove_dir(work_tree.join(&dir));
    }
}

/// Create ancestor directories for a set of paths about to be written,
/// shallowest first so that nested directories build on their parents.
fn create_ancestor_directories<'a>(work_tree: &Path, paths: impl Iterator<Item = &'a BString>) -> Result<(), WorkspaceError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for path in paths {
        if let Some(parent) = path_to_relative(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent.to_path_buf());
        }
    }
    dirs.sort_by_key(|d| d.components().count());
    dirs.dedup();
    for dir in dirs {
        fs::create_dir_all(work_tree.join(&dir))?;
    }
    Ok(())
}

fn write_entry(odb: &ObjectDatabase, work_tree: &Path, index: &mut Index, file: &FileDiff) -> Result<(), WorkspaceError> {
    let path = file.path();
    let relative = path_to_relative(path);
    let full_path = work_tree.join(&relative);
    let oid = file.new_oid.ok_or_else(|| WorkspaceError::ObjectNotFound(Oid::NULL))?;
    let mode = file.new_mode.unwrap_or(FileMode::Regular);

    if full_path.exists() {
        fs::remove_file(&full_path)?;
    }
    write_blob_file(odb, &full_path, oid, mode)?;

    let stat = fs::symlink_metadata(&full_path).map(|meta| StatData::from_metadata(&meta)).unwrap_or_default();
    index.add(relative, oid, mode, stat);
    Ok(())
}

fn write_blob_file(odb: &ObjectDatabase, full_path: &Path, oid: Oid, mode: FileMode) -> Result<(), WorkspaceError> {
    let blob = match odb.read(&oid)?.ok_or(WorkspaceError::ObjectNotFound(oid))? {
        Object::Blob(b) => b,
        other => return Err(WorkspaceError::ExpectedBlob(oid, other.object_type().to_string())),
    };

    if mode.is_symlink() {
        let target = String::from_utf8_lossy(&blob.data).into_owned();
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, full_path)?;
        #[cfg(not(unix))]
        fs::write(full_path, target)?;
        return Ok(());
    }

    let mut out = OpenOptions::new().write(true).create_new(true).open(full_path)?;
    out.write_all(&blob.data)?;

    #[cfg(unix)]
    if mode == FileMode::Executable {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = out.metadata()?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(full_path, perms)?;
    }

    Ok(())
}

fn path_to_relative(path: &BString) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(path.as_slice()).into_owned())
}
