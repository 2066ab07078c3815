//! Tree-to-tree diff.
//!
//! Walks two tree objects in parallel (sorted by git's tree entry order),
//! identifying added, deleted, modified, and type-changed entries, with
//! optional recursion pruned by a [`PathFilter`]. This is the shared
//! implementation object-database prefix search, revision-walk path
//! simplification, and three-way tree merge all call — object lookups go
//! through `git_odb::ObjectDatabase` directly rather than a trait, since
//! every caller in this workspace already depends on that crate.

use std::collections::HashMap;

use bstr::BString;
use git_hash::Oid;
use git_object::{FileMode, Object, Tree, TreeEntry};
use git_odb::ObjectDatabase;

use crate::algorithm;
use crate::binary::is_binary;
use crate::{DiffError, DiffOptions, DiffResult, FileDiff, FileStatus};

/// A trie over allow-listed paths, used to prune `tree_diff` recursion to
/// only the subtrees a caller cares about.
///
/// A node becomes "matched" once a full allow-listed path has been consumed
/// walking down to it; every entry beneath a matched node passes
/// unconditionally from then on — the same behavior as `git log -- dir`
/// showing every file under `dir` once `dir` itself is on the pathspec.
#[derive(Debug, Default, Clone)]
pub struct PathFilter {
    root: Option<FilterNode>,
}

#[derive(Debug, Default, Clone)]
struct FilterNode {
    children: HashMap<Vec<u8>, FilterNode>,
    matched: bool,
}

impl PathFilter {
    /// Build a filter from a list of slash-separated paths. An empty list
    /// matches everything (no filtering).
    pub fn new(paths: &[BString]) -> Self {
        if paths.is_empty() {
            return Self { root: None };
        }
        let mut root = FilterNode::default();
        for path in paths {
            let mut node = &mut root;
            for component in path.split(|&b| b == b'/') {
                if component.is_empty() {
                    continue;
                }
                node = node.children.entry(component.to_vec()).or_default();
            }
            node.matched = true;
        }
        Self { root: Some(root) }
    }

    /// A filter that matches every path.
    pub fn all() -> Self {
        Self { root: None }
    }

    fn state(&self) -> FilterState<'_> {
        match &self.root {
            None => FilterState::All,
            Some(node) => FilterState::Node(node),
        }
    }
}

#[derive(Clone, Copy)]
enum FilterState<'a> {
    All,
    Node(&'a FilterNode),
}

impl<'a> FilterState<'a> {
    /// Descend into a child entry by name. `None` means this entry and
    /// everything beneath it is excluded.
    fn descend(&self, name: &[u8]) -> Option<FilterState<'a>> {
        match self {
            FilterState::All => Some(FilterState::All),
            FilterState::Node(node) => {
                if node.matched {
                    return Some(FilterState::All);
                }
                node.children.get(name).map(FilterState::Node)
            }
        }
    }

    /// Whether the path leading to this state is itself allow-listed
    /// (as opposed to merely being an ancestor directory of one).
    fn is_match(&self) -> bool {
        match self {
            FilterState::All => true,
            FilterState::Node(node) => node.matched,
        }
    }
}

/// Diff two trees, producing a list of file-level changes.
///
/// Either tree OID can be `None` to represent an empty tree (e.g. for
/// initial commits).
pub fn tree_diff(
    odb: &ObjectDatabase,
    old_tree: Option<&Oid>,
    new_tree: Option<&Oid>,
    options: &DiffOptions,
) -> Result<DiffResult, DiffError> {
    let old = match old_tree {
        Some(oid) => Some(read_tree(odb, oid)?),
        None => None,
    };
    let new = match new_tree {
        Some(oid) => Some(read_tree(odb, oid)?),
        None => None,
    };

    let old_entries = old.as_ref().map_or(&[][..], |t| &t.entries);
    let new_entries = new.as_ref().map_or(&[][..], |t| &t.entries);

    let filter = match &options.pathspec {
        Some(paths) => PathFilter::new(paths),
        None => PathFilter::all(),
    };

    let mut files = Vec::new();
    let prefix = BString::from("");
    diff_tree_entries(
        odb,
        old_entries,
        new_entries,
        &prefix,
        filter.state(),
        options,
        &mut files,
    )?;

    Ok(DiffResult { files })
}

/// Read and parse a tree object from the ODB.
fn read_tree(odb: &ObjectDatabase, oid: &Oid) -> Result<Tree, DiffError> {
    let obj = odb
        .read(oid)
        .map_err(|e| DiffError::ObjectRead {
            oid: *oid,
            source: e,
        })?
        .ok_or(DiffError::ObjectNotFound(*oid))?;

    match obj {
        Object::Tree(tree) => Ok(tree),
        other => Err(DiffError::UnexpectedObjectType {
            oid: *oid,
            expected: "tree",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Read blob data from the ODB.
pub(crate) fn read_blob(odb: &ObjectDatabase, oid: &Oid) -> Result<Vec<u8>, DiffError> {
    let obj = odb
        .read(oid)
        .map_err(|e| DiffError::ObjectRead {
            oid: *oid,
            source: e,
        })?
        .ok_or(DiffError::ObjectNotFound(*oid))?;

    match obj {
        Object::Blob(blob) => Ok(blob.data),
        other => Err(DiffError::UnexpectedObjectType {
            oid: *oid,
            expected: "blob",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Recursively diff two sets of sorted tree entries.
#[allow(clippy::too_many_arguments)]
fn diff_tree_entries(
    odb: &ObjectDatabase,
    old_entries: &[TreeEntry],
    new_entries: &[TreeEntry],
    prefix: &BString,
    filter: FilterState<'_>,
    options: &DiffOptions,
    files: &mut Vec<FileDiff>,
) -> Result<(), DiffError> {
    let mut oi = 0;
    let mut ni = 0;

    while oi < old_entries.len() || ni < new_entries.len() {
        match (old_entries.get(oi), new_entries.get(ni)) {
            (Some(old_entry), Some(new_entry)) => {
                let cmp = TreeEntry::cmp_entries(old_entry, new_entry);
                match cmp {
                    std::cmp::Ordering::Less => {
                        collect_deleted(odb, old_entry, prefix, filter, options, files)?;
                        oi += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        collect_added(odb, new_entry, prefix, filter, options, files)?;
                        ni += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        if old_entry.oid != new_entry.oid || old_entry.mode != new_entry.mode {
                            collect_modified(
                                odb, old_entry, new_entry, prefix, filter, options, files,
                            )?;
                        }
                        oi += 1;
                        ni += 1;
                    }
                }
            }
            (Some(old_entry), None) => {
                collect_deleted(odb, old_entry, prefix, filter, options, files)?;
                oi += 1;
            }
            (None, Some(new_entry)) => {
                collect_added(odb, new_entry, prefix, filter, options, files)?;
                ni += 1;
            }
            (None, None) => break,
        }
    }

    Ok(())
}

/// Build the full path for a tree entry.
fn full_path(prefix: &BString, name: &BString) -> BString {
    if prefix.is_empty() {
        name.clone()
    } else {
        let mut p = prefix.clone();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

/// Collect a deleted entry (recursing into trees).
fn collect_deleted(
    odb: &ObjectDatabase,
    entry: &TreeEntry,
    prefix: &BString,
    filter: FilterState<'_>,
    options: &DiffOptions,
    files: &mut Vec<FileDiff>,
) -> Result<(), DiffError> {
    let Some(child) = filter.descend(entry.name.as_slice()) else {
        return Ok(());
    };
    let path = full_path(prefix, &entry.name);

    if entry.mode.is_tree() {
        let tree = read_tree(odb, &entry.oid)?;
        diff_tree_entries(odb, &tree.entries, &[], &path, child, options, files)?;
    } else {
        if !child.is_match() {
            return Ok(());
        }
        let blob_data = read_blob(odb, &entry.oid)?;
        let binary = is_binary(&blob_data);
        let hunks = if binary {
            Vec::new()
        } else {
            algorithm::diff_lines(&blob_data, &[], options.algorithm, options.context_lines)
        };
        files.push(FileDiff {
            status: FileStatus::Deleted,
            old_path: Some(path),
            new_path: None,
            old_mode: Some(entry.mode),
            new_mode: None,
            old_oid: Some(entry.oid),
            new_oid: None,
            hunks,
            is_binary: binary,
        });
    }
    Ok(())
}

/// Collect an added entry (recursing into trees).
fn collect_added(
    odb: &ObjectDatabase,
    entry: &TreeEntry,
    prefix: &BString,
    filter: FilterState<'_>,
    options: &DiffOptions,
    files: &mut Vec<FileDiff>,
) -> Result<(), DiffError> {
    let Some(child) = filter.descend(entry.name.as_slice()) else {
        return Ok(());
    };
    let path = full_path(prefix, &entry.name);

    if entry.mode.is_tree() {
        let tree = read_tree(odb, &entry.oid)?;
        diff_tree_entries(odb, &[], &tree.entries, &path, child, options, files)?;
    } else {
        if !child.is_match() {
            return Ok(());
        }
        let blob_data = read_blob(odb, &entry.oid)?;
        let binary = is_binary(&blob_data);
        let hunks = if binary {
            Vec::new()
        } else {
            algorithm::diff_lines(&[], &blob_data, options.algorithm, options.context_lines)
        };
        files.push(FileDiff {
            status: FileStatus::Added,
            old_path: None,
            new_path: Some(path),
            old_mode: None,
            new_mode: Some(entry.mode),
            old_oid: None,
            new_oid: Some(entry.oid),
            hunks,
            is_binary: binary,
        });
    }
    Ok(())
}

/// Collect a modified or type-changed entry.
#[allow(clippy::too_many_arguments)]
fn collect_modified(
    odb: &ObjectDatabase,
    old_entry: &TreeEntry,
    new_entry: &TreeEntry,
    prefix: &BString,
    filter: FilterState<'_>,
    options: &DiffOptions,
    files: &mut Vec<FileDiff>,
) -> Result<(), DiffError> {
    let Some(child) = filter.descend(old_entry.name.as_slice()) else {
        return Ok(());
    };
    let path = full_path(prefix, &old_entry.name);

    let old_is_tree = old_entry.mode.is_tree();
    let new_is_tree = new_entry.mode.is_tree();

    if old_is_tree && new_is_tree {
        let old_tree = read_tree(odb, &old_entry.oid)?;
        let new_tree = read_tree(odb, &new_entry.oid)?;
        diff_tree_entries(
            odb,
            &old_tree.entries,
            &new_tree.entries,
            &path,
            child,
            options,
            files,
        )?;
    } else if old_is_tree && !new_is_tree {
        // Tree replaced by file: delete tree contents, add file.
        let old_tree = read_tree(odb, &old_entry.oid)?;
        diff_tree_entries(odb, &old_tree.entries, &[], &path, child, options, files)?;
        if child.is_match() {
            let blob_data = read_blob(odb, &new_entry.oid)?;
            let binary = is_binary(&blob_data);
            let hunks = if binary {
                Vec::new()
            } else {
                algorithm::diff_lines(&[], &blob_data, options.algorithm, options.context_lines)
            };
            files.push(FileDiff {
                status: FileStatus::Added,
                old_path: None,
                new_path: Some(path),
                old_mode: None,
                new_mode: Some(new_entry.mode),
                old_oid: None,
                new_oid: Some(new_entry.oid),
                hunks,
                is_binary: binary,
            });
        }
    } else if !old_is_tree && new_is_tree {
        // File replaced by tree: delete file, add tree contents.
        if child.is_match() {
            let blob_data = read_blob(odb, &old_entry.oid)?;
            let binary = is_binary(&blob_data);
            let hunks = if binary {
                Vec::new()
            } else {
                algorithm::diff_lines(&blob_data, &[], options.algorithm, options.context_lines)
            };
            files.push(FileDiff {
                status: FileStatus::Deleted,
                old_path: Some(path.clone()),
                new_path: None,
                old_mode: Some(old_entry.mode),
                new_mode: None,
                old_oid: Some(old_entry.oid),
                new_oid: None,
                hunks,
                is_binary: binary,
            });
        }
        let new_tree = read_tree(odb, &new_entry.oid)?;
        diff_tree_entries(odb, &[], &new_tree.entries, &path, child, options, files)?;
    } else {
        // Both are non-tree entries.
        if !child.is_match() {
            return Ok(());
        }

        let status = if old_entry.mode != new_entry.mode
            && !mode_content_type_equal(old_entry.mode, new_entry.mode)
        {
            FileStatus::TypeChanged
        } else {
            FileStatus::Modified
        };

        let old_data = read_blob(odb, &old_entry.oid)?;
        let new_data = read_blob(odb, &new_entry.oid)?;
        let binary = is_binary(&old_data) || is_binary(&new_data);
        let hunks = if binary {
            Vec::new()
        } else {
            algorithm::diff_lines(&old_data, &new_data, options.algorithm, options.context_lines)
        };

        files.push(FileDiff {
            status,
            old_path: Some(path.clone()),
            new_path: Some(path),
            old_mode: Some(old_entry.mode),
            new_mode: Some(new_entry.mode),
            old_oid: Some(old_entry.oid),
            new_oid: Some(new_entry.oid),
            hunks,
            is_binary: binary,
        });
    }

    Ok(())
}

/// Check whether two modes represent the same content type
/// (e.g., Regular and Executable are both blob types).
fn mode_content_type_equal(a: FileMode, b: FileMode) -> bool {
    a.is_blob() == b.is_blob() && a.is_symlink() == b.is_symlink() && a.is_gitlink() == b.is_gitlink()
}
