//! Core revision walk: reverse committer-date traversal over inclusion and
//! exclusion start points.

use std::collections::{HashMap, HashSet};

use bstr::BString;
use git_diff::{tree_diff, DiffOptions};
use git_hash::Oid;
use git_object::{Commit, Object};
use git_odb::ObjectDatabase;

use crate::RevWalkError;

/// Per-commit state flags, as a small bitset over a `u8`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitFlags(u8);

impl CommitFlags {
    /// The commit has been enqueued at least once.
    pub const SEEN: Self = Self(1 << 0);
    /// The commit's parents have already been enqueued; a later call to
    /// enqueue them again is a no-op. Pre-setting this on a start point
    /// suppresses graph walking past it (see [`WalkOptions::walk`]).
    pub const ADDED: Self = Self(1 << 1);
    /// Reachable from an exclusion start point; never yielded.
    pub const UNINTERESTING: Self = Self(1 << 2);
    /// Simplified away by path filtering; not yielded, but its followed
    /// parent still is enqueued.
    pub const TREESAME: Self = Self(1 << 3);
    /// Reserved for callers that want to mark commits already emitted.
    pub const RESULT: Self = Self(1 << 4);
    /// Reserved for merge-base-style algorithms sharing this flag set.
    pub const STALE: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for CommitFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Options controlling a [`RevisionWalker`].
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Restrict output to commits that touch at least one of these paths.
    pub path_filter: Option<Vec<BString>>,
    /// `false` for fetch negotiation: yield only the start points themselves,
    /// without walking parents.
    pub walk: bool,
}

impl WalkOptions {
    pub fn new() -> Self {
        Self {
            path_filter: None,
            walk: true,
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerates commits reachable from inclusion roots but not from exclusion
/// roots, newest-first by committer timestamp.
pub struct RevisionWalker<'a> {
    odb: &'a ObjectDatabase,
    queue: Vec<(Oid, i64)>,
    flags: HashMap<Oid, CommitFlags>,
    seen: HashSet<Oid>,
    commits: HashMap<Oid, Commit>,
    include_roots: Vec<Oid>,
    exclude_roots: Vec<Oid>,
    limited: bool,
    limit_applied: bool,
    options: WalkOptions,
}

impl<'a> RevisionWalker<'a> {
    pub fn new(odb: &'a ObjectDatabase, options: WalkOptions) -> Self {
        Self {
            odb,
            queue: Vec::new(),
            flags: HashMap::new(),
            seen: HashSet::new(),
            commits: HashMap::new(),
            include_roots: Vec::new(),
            exclude_roots: Vec::new(),
            limited: false,
            limit_applied: false,
            options,
        }
    }

    /// Add an inclusion (positive) start point.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn push(&mut self, oid: Oid) -> Result<(), RevWalkError> {
        tracing::debug!(%oid, "starting revision walk from");
        self.include_roots.push(oid);
        self.push_point(oid, false)
    }

    /// Add an exclusion (negative, `^R`) start point. All of its ancestors
    /// are marked [`CommitFlags::UNINTERESTING`] immediately.
    pub fn hide(&mut self, oid: Oid) -> Result<(), RevWalkError> {
        self.exclude_roots.push(oid);
        self.limited = true;
        self.push_point(oid, true)?;

        let mut stack = vec![oid];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let commit = self.commit(current)?.clone();
            for parent in &commit.parents {
                let already_uninteresting =
                    self.flag(*parent).contains(CommitFlags::UNINTERESTING);
                self.insert_flag(*parent, CommitFlags::UNINTERESTING);
                if !already_uninteresting {
                    stack.push(*parent);
                }
            }
        }
        Ok(())
    }

    /// Objects reachable from this walker's inclusion roots but not from its
    /// exclusion roots: every unique commit, tree, and blob OID.
    pub fn objects(&self) -> Result<Vec<Oid>, RevWalkError> {
        crate::objects::list_objects(self.odb, &self.include_roots, &self.exclude_roots)
    }

    fn push_point(&mut self, oid: Oid, uninteresting: bool) -> Result<(), RevWalkError> {
        if uninteresting {
            self.insert_flag(oid, CommitFlags::UNINTERESTING);
        }
        if !self.options.walk {
            // Gate add_parents on ADDED: pre-marking start points here makes
            // the first add_parents call for them a no-op, so the walk never
            // descends past the inputs.
            self.insert_flag(oid, CommitFlags::ADDED);
        }
        if self.seen.insert(oid) {
            self.insert_flag(oid, CommitFlags::SEEN);
            let date = self.commit(oid)?.committer.date.timestamp;
            self.insert_sorted(oid, date);
        }
        Ok(())
    }

    fn insert_sorted(&mut self, oid: Oid, date: i64) {
        let pos = self
            .queue
            .iter()
            .position(|(_, d)| *d < date)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, (oid, date));
    }

    fn flag(&self, oid: Oid) -> CommitFlags {
        self.flags.get(&oid).copied().unwrap_or_default()
    }

    fn insert_flag(&mut self, oid: Oid, flag: CommitFlags) {
        self.flags.entry(oid).or_default().insert(flag);
    }

    fn commit(&mut self, oid: Oid) -> Result<&Commit, RevWalkError> {
        if !self.commits.contains_key(&oid) {
            let obj = self
                .odb
                .read(&oid)?
                .ok_or(RevWalkError::CommitNotFound(oid))?;
            match obj {
                Object::Commit(c) => {
                    self.commits.insert(oid, c);
                }
                _ => return Err(RevWalkError::NotACommit(oid)),
            }
        }
        Ok(self.commits.get(&oid).expect("just inserted"))
    }

    /// Enqueue `oid`'s parents, applying path simplification if a filter is
    /// set. A no-op once `oid` is flagged `ADDED`.
    fn add_parents(&mut self, oid: Oid) -> Result<(), RevWalkError> {
        if self.flag(oid).contains(CommitFlags::ADDED) {
            return Ok(());
        }
        self.insert_flag(oid, CommitFlags::ADDED);

        let commit = self.commit(oid)?.clone();
        let parents = self.simplified_parents(oid, &commit)?;
        let uninteresting = self.flag(oid).contains(CommitFlags::UNINTERESTING);

        for parent in parents {
            if uninteresting {
                self.insert_flag(parent, CommitFlags::UNINTERESTING);
            }
            if self.seen.insert(parent) {
                self.insert_flag(parent, CommitFlags::SEEN);
                let date = self.commit(parent)?.committer.date.timestamp;
                self.insert_sorted(parent, date);
            }
        }
        Ok(())
    }

    /// Pick the parent(s) to follow under the active path filter, marking
    /// `oid` `TREESAME` when a parent carries no filtered change.
    fn simplified_parents(&mut self, oid: Oid, commit: &Commit) -> Result<Vec<Oid>, RevWalkError> {
        let Some(paths) = self.options.path_filter.clone() else {
            return Ok(commit.parents.clone());
        };
        let diff_options = DiffOptions {
            pathspec: Some(paths),
            ..Default::default()
        };

        if commit.parents.is_empty() {
            let diff = tree_diff(self.odb, None, Some(&commit.tree), &diff_options)?;
            if diff.is_empty() {
                self.insert_flag(oid, CommitFlags::TREESAME);
            }
            return Ok(Vec::new());
        }

        for parent in &commit.parents {
            let parent_tree = self.commit(*parent)?.tree;
            let diff = tree_diff(self.odb, Some(&parent_tree), Some(&commit.tree), &diff_options)?;
            if diff.is_empty() {
                self.insert_flag(oid, CommitFlags::TREESAME);
                return Ok(vec![*parent]);
            }
        }
        Ok(commit.parents.clone())
    }

    /// Drain the queue into a limited output list per the stopping rule:
    /// queue empty, or the oldest output commit is no older than the newest
    /// queued commit and every queued commit is already `UNINTERESTING`.
    fn limit_list(&mut self) -> Result<(), RevWalkError> {
        let mut output: Vec<(Oid, i64)> = Vec::new();

        loop {
            let should_stop = match (output.last(), self.queue.first()) {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some(&(_, oldest_output_date)), Some(&(_, newest_queue_date))) => {
                    let all_uninteresting = self
                        .queue
                        .iter()
                        .all(|(o, _)| self.flag(*o).contains(CommitFlags::UNINTERESTING));
                    oldest_output_date >= newest_queue_date && all_uninteresting
                }
            };
            if should_stop {
                break;
            }

            let (oid, date) = self.queue.remove(0);
            self.add_parents(oid)?;
            if !self.flag(oid).contains(CommitFlags::UNINTERESTING) {
                output.push((oid, date));
            }
        }

        self.queue = output;
        self.limit_applied = true;
        Ok(())
    }
}

impl Iterator for RevisionWalker<'_> {
    type Item = Result<Oid, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limited && !self.limit_applied {
            if let Err(e) = self.limit_list() {
                return Some(Err(e));
            }
        }

        loop {
            if self.queue.is_empty() {
                return None;
            }
            let (oid, _) = self.queue.remove(0);

            if !self.limited {
                if let Err(e) = self.add_parents(oid) {
                    return Some(Err(e));
                }
            }

            let flags = self.flag(oid);
            if flags.contains(CommitFlags::UNINTERESTING) || flags.contains(CommitFlags::TREESAME)
            {
                continue;
            }
            return Some(Ok(oid));
        }
    }
}
