//! Staging index entries: one record per `(path, stage)` pair.
//!
//! Entries carry no behavior of their own; `key`, `times_match`, and
//! `stat_match` are free functions over the record rather than methods, so
//! comparison logic stays in one place instead of spreading across impls.

use std::fs::Metadata;
use std::path::PathBuf;

use git_hash::Oid;
use git_object::FileMode;

use crate::IndexError;

/// Conflict stage. `Normal` is the resolved entry; `Base`/`Ours`/`Theirs`
/// hold the three sides of an unmerged path and are mutually exclusive
/// with `Normal` for the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Normal = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self, IndexError> {
        match v {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            other => Err(IndexError::InvalidEntry {
                offset: 0,
                reason: format!("invalid stage: {other}"),
            }),
        }
    }
}

/// Cached filesystem metadata, used to cheaply decide whether a working-tree
/// file might have changed without rereading its content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    /// Create from file system metadata.
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    /// Create from file system metadata (non-Unix fallback).
    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Default::default()
        }
    }
}

/// Extended per-entry flags beyond the base stage/assume-valid bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags {
    /// CE_VALID: assume the entry is unchanged.
    pub assume_valid: bool,
    /// CE_INTENT_TO_ADD: placeholder for `git add -N`.
    pub intent_to_add: bool,
    /// CE_SKIP_WORKTREE: the entry should not be checked out.
    pub skip_worktree: bool,
}

impl EntryFlags {
    pub fn has_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

/// A single staged path at a given conflict stage.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub oid: Oid,
    pub mode: FileMode,
    pub stage: Stage,
    pub stat: StatData,
    pub flags: EntryFlags,
}

/// The `(path, stage)` pair identifying an entry's slot in the index map.
pub fn key(entry: &Entry) -> (PathBuf, u8) {
    (entry.path.clone(), entry.stage.as_u8())
}

/// True when cached and on-disk timestamps agree.
pub fn times_match(stat: &StatData, meta: &Metadata) -> bool {
    let disk = StatData::from_metadata(meta);
    stat.mtime_secs == disk.mtime_secs
        && stat.mtime_nsecs == disk.mtime_nsecs
        && stat.ctime_secs == disk.ctime_secs
        && stat.ctime_nsecs == disk.ctime_nsecs
}

/// True when every stat field used for change detection matches, meaning
/// the entry can be trusted without rereading the file's content. Mirrors
/// C git's `ie_match_stat` heuristics.
pub fn stat_match(entry: &Entry, meta: &Metadata) -> bool {
    let disk = StatData::from_metadata(meta);
    if entry.stat.size != disk.size {
        return false;
    }
    if !times_match(&entry.stat, meta) {
        return false;
    }
    if entry.stat.ino != 0 && disk.ino != 0 && entry.stat.ino != disk.ino {
        return false;
    }
    if entry.stat.dev != 0 && disk.dev != 0 && entry.stat.dev != disk.dev {
        return false;
    }
    true
}
