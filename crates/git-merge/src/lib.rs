//! Common-ancestor search, three-way tree/content/mode merge.
//!
//! [`ancestor::merge_base`] finds the commits a merge should diff against.
//! [`three_way::merge_trees`] applies the resulting base(s) to produce a
//! merged tree, reporting unresolved paths as [`Conflict`] values for the
//! caller to stage and untracked [`CollisionWrite`] values for it to write
//! into the workspace.
//! [`content::merge3`] and [`mode::merge`] are the per-file and per-mode
//! building blocks `three_way` calls for every path both sides touched.

pub mod ancestor;
pub mod content;
pub mod mode;
pub mod three_way;

use bstr::BString;
use git_hash::Oid;
use git_object::FileMode;

/// One side of a recorded conflict (base/ours/theirs), or `None` when that
/// side has no entry for the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSide {
    pub oid: Oid,
    pub mode: FileMode,
}

/// A path left unresolved by [`three_way::merge_trees`].
#[derive(Debug, Clone)]
pub struct Conflict {
    pub path: BString,
    pub base: Option<ConflictSide>,
    pub ours: Option<ConflictSide>,
    pub theirs: Option<ConflictSide>,
}

/// A side's content that a collision forced out to `<path>~<side>` rather
/// than into the merged tree. The caller (workspace migration) is
/// responsible for materializing this as an untracked file.
#[derive(Debug, Clone)]
pub struct CollisionWrite {
    pub path: BString,
    pub oid: Oid,
    pub mode: FileMode,
}

/// Outcome of [`three_way::merge_trees`].
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// Already merged: `base_oids == [right]`.
    AlreadyUpToDate,
    /// Fast-forward: `base_oids == [left]`. Caller should migrate to
    /// `right`'s tree and move the branch ref, not write a merge commit.
    FastForward(Oid),
    /// A tree was produced. Empty `conflicts` means every path merged
    /// cleanly.
    Merged {
        tree: Oid,
        conflicts: Vec<Conflict>,
        collisions: Vec<CollisionWrite>,
    },
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        match self {
            Self::AlreadyUpToDate | Self::FastForward(_) => true,
            Self::Merged { conflicts, .. } => conflicts.is_empty(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no merge base found")]
    NoMergeBase,

    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    #[error("expected {expected} object, got {actual} for {oid}")]
    UnexpectedObjectType {
        oid: Oid,
        expected: &'static str,
        actual: String,
    },

    #[error(transparent)]
    Diff(#[from] git_diff::DiffError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),
}
