//! Commit graph walking and revision expression resolution.
//!
//! [`RevisionWalker`] enumerates commits reachable from a set of inclusion
//! roots but not from exclusion roots, in reverse committer-date order,
//! optionally restricted to commits that touch at least one path in a
//! filter. [`range`] parses the small expression grammar (`R`, `^R`,
//! `A..B`, or a workspace path) used to build a walker's start points.

mod objects;
mod range;
mod walk;

pub use objects::list_objects;
pub use range::{parse_revision_list, resolve_revision, ParsedRevisions};
pub use walk::{CommitFlags, RevisionWalker, WalkOptions};

use git_hash::Oid;

/// Errors produced by revision walking and revision expression resolution.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("commit not found: {0}")]
    CommitNotFound(Oid),

    #[error("object is not a commit: {0}")]
    NotACommit(Oid),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Diff(#[from] git_diff::DiffError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
