//! Three-way tree merge: shortcut cases, per-path content/mode merge, and
//! file/directory collision handling.

use std::collections::BTreeMap;

use bstr::BString;
use git_diff::{tree_diff, DiffOptions, FileDiff, FileStatus};
use git_hash::Oid;
use git_object::{Blob, FileMode, Object, Tree, TreeEntry};
use git_odb::ObjectDatabase;

use crate::content::{merge3, MergeLabels};
use crate::{CollisionWrite, Conflict, ConflictSide, MergeError, MergeOutcome};

/// A path's resolved content in the tree under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlatEntry {
    oid: Oid,
    mode: FileMode,
}

/// Three-way merge `left_oid` (HEAD) and `right_oid` (incoming) against
/// `base_oids`. `base_oids` holds the merge-base commits found by
/// [`crate::ancestor::merge_base`]; only the first is used as the diff
/// base when more than one remains (recursive virtual-base synthesis for
/// crisscross merges is not implemented — see `ancestor::merge_base_single`).
#[tracing::instrument(level = "debug", skip(odb))]
pub fn merge_trees(odb: &ObjectDatabase, left_oid: Oid, right_oid: Oid, base_oids: &[Oid]) -> Result<MergeOutcome, MergeError> {
    if base_oids == [right_oid] {
        tracing::debug!("already up to date");
        return Ok(MergeOutcome::AlreadyUpToDate);
    }
    if base_oids == [left_oid] {
        tracing::debug!(%right_oid, "fast-forward");
        return Ok(MergeOutcome::FastForward(right_oid));
    }

    let base_tree = match base_oids.first() {
        Some(oid) => Some(commit_tree(odb, *oid)?),
        None => None,
    };
    let left_tree = commit_tree(odb, left_oid)?;
    let right_tree = commit_tree(odb, right_oid)?;

    let diff_opts = DiffOptions::default();
    let left_diff = tree_diff(odb, base_tree.as_ref(), Some(&left_tree), &diff_opts)?;
    let right_diff = tree_diff(odb, base_tree.as_ref(), Some(&right_tree), &diff_opts)?;

    let mut entries = base_tree
        .map(|oid| flatten_tree(odb, &oid))
        .transpose()?
        .unwrap_or_default();

    let left_changes = build_change_map(&left_diff.files);
    let right_changes = build_change_map(&right_diff.files);

    let mut conflicts = Vec::new();
    let mut collisions = Vec::new();

    let mut paths: Vec<BString> = left_changes.keys().chain(right_changes.keys()).cloned().collect();
    paths.sort();
    paths.dedup();

    for path in &paths {
        let left_fd = left_changes.get(path);
        let right_fd = right_changes.get(path);

        match (left_fd, right_fd) {
            (Some(fd), None) => apply_change(&mut entries, path, fd),
            (None, Some(fd)) => apply_change(&mut entries, path, fd),
            (Some(left_fd), Some(right_fd)) => {
                if same_change(left_fd, right_fd) {
                    apply_change(&mut entries, path, right_fd);
                    continue;
                }
                merge_path(odb, path, left_fd, right_fd, &mut entries, &mut conflicts)?;
            }
            (None, None) => unreachable!(),
        }
    }

    resolve_directory_collisions(&mut entries, &mut conflicts, &mut collisions, &left_changes, &right_changes);

    if !conflicts.is_empty() {
        let tree = write_tree(odb, &entries)?;
        tracing::debug!(%tree, num_conflicts = conflicts.len(), "merged with conflicts");
        return Ok(MergeOutcome::Merged { tree, conflicts, collisions });
    }

    let tree = write_tree(odb, &entries)?;
    tracing::debug!(%tree, "merged cleanly");
    Ok(MergeOutcome::Merged { tree, conflicts, collisions })
}

fn same_change(a: &FileDiff, b: &FileDiff) -> bool {
    a.status == b.status && a.new_oid == b.new_oid && a.new_mode == b.new_mode
}

fn merge_path(
    odb: &ObjectDatabase,
    path: &BString,
    left_fd: &FileDiff,
    right_fd: &FileDiff,
    entries: &mut BTreeMap<BString, FlatEntry>,
    conflicts: &mut Vec<Conflict>,
) -> Result<(), MergeError> {
    let base_oid = left_fd.old_oid;
    let base_mode = left_fd.old_mode;
    let left_oid = left_fd.new_oid;
    let right_oid = right_fd.new_oid;

    let base_data = read_blob(odb, base_oid)?;
    let left_data = read_blob(odb, left_oid)?;
    let right_data = read_blob(odb, right_oid)?;

    let labels = MergeLabels { ours: "HEAD", theirs: "incoming" };
    let (content_ok, merged_content) = merge3(
        base_data.as_deref(),
        left_data.as_deref(),
        right_data.as_deref(),
        git_diff::DiffAlgorithm::Myers,
        labels,
    );
    let (mode_ok, merged_mode) = crate::mode::merge(base_mode, left_fd.new_mode, right_fd.new_mode);

    if content_ok && mode_ok {
        match (left_oid, merged_mode) {
            (_, None) => {
                entries.remove(path);
            }
            _ => {
                let oid = odb.write(&Object::Blob(Blob::new(merged_content)))?;
                entries.insert(path.clone(), FlatEntry { oid, mode: merged_mode.unwrap_or(FileMode::Regular) });
            }
        }
        return Ok(());
    }

    conflicts.push(Conflict {
        path: path.clone(),
        base: base_oid.zip(base_mode).map(|(oid, mode)| ConflictSide { oid, mode }),
        ours: left_oid.zip(left_fd.new_mode).map(|(oid, mode)| ConflictSide { oid, mode }),
        theirs: right_oid.zip(right_fd.new_mode).map(|(oid, mode)| ConflictSide { oid, mode }),
    });
    Ok(())
}

/// Detect paths that are entries in the result map while also being a
/// directory prefix of some other entry (one side turned a file into a
/// directory, the other kept or modified the file). The file side's
/// content is pulled out as an untracked `<path>~<side>` write and the
/// path itself is left to the directory.
fn resolve_directory_collisions(
    entries: &mut BTreeMap<BString, FlatEntry>,
    conflicts: &mut Vec<Conflict>,
    collisions: &mut Vec<CollisionWrite>,
    left_changes: &std::collections::HashMap<BString, &FileDiff>,
    right_changes: &std::collections::HashMap<BString, &FileDiff>,
) {
    let paths: Vec<BString> = entries.keys().cloned().collect();
    let mut to_remove = Vec::new();

    for path in &paths {
        let mut prefix = path.clone();
        prefix.push(b'/');
        let is_directory_prefix = entries.keys().any(|other| other.len() > prefix.len() && other.starts_with(prefix.as_slice()));
        if !is_directory_prefix {
            continue;
        }

        let entry = entries[path];
        let side = if left_changes.get(path).map(|fd| fd.new_oid) == Some(Some(entry.oid)) {
            "ours"
        } else {
            "theirs"
        };
        collisions.push(CollisionWrite {
            path: BString::from(format!("{path}~{side}")),
            oid: entry.oid,
            mode: entry.mode,
        });
        conflicts.push(Conflict {
            path: path.clone(),
            base: None,
            ours: left_changes.get(path).and_then(|fd| fd.new_oid.zip(fd.new_mode)).map(|(oid, mode)| ConflictSide { oid, mode }),
            theirs: right_changes.get(path).and_then(|fd| fd.new_oid.zip(fd.new_mode)).map(|(oid, mode)| ConflictSide { oid, mode }),
        });
        to_remove.push(path.clone());
    }

    for path in to_remove {
        entries.remove(&path);
    }
}

fn apply_change(entries: &mut BTreeMap<BString, FlatEntry>, path: &BString, fd: &FileDiff) {
    match fd.status {
        FileStatus::Deleted => {
            entries.remove(path);
        }
        FileStatus::Added | FileStatus::Modified | FileStatus::TypeChanged => {
            if let (Some(oid), Some(mode)) = (fd.new_oid, fd.new_mode) {
                entries.insert(path.clone(), FlatEntry { oid, mode });
            }
        }
    }
}

fn build_change_map(files: &[FileDiff]) -> std::collections::HashMap<BString, &FileDiff> {
    files.iter().map(|fd| (fd.path().clone(), fd)).collect()
}

fn commit_tree(odb: &ObjectDatabase, commit_oid: Oid) -> Result<Oid, MergeError> {
    match odb.read(&commit_oid)?.ok_or(MergeError::ObjectNotFound(commit_oid))? {
        Object::Commit(c) => Ok(c.tree),
        other => Err(MergeError::UnexpectedObjectType {
            oid: commit_oid,
            expected: "commit",
            actual: other.object_type().to_string(),
        }),
    }
}

fn read_tree(odb: &ObjectDatabase, oid: &Oid) -> Result<Tree, MergeError> {
    match odb.read(oid)?.ok_or(MergeError::ObjectNotFound(*oid))? {
        Object::Tree(t) => Ok(t),
        other => Err(MergeError::UnexpectedObjectType {
            oid: *oid,
            expected: "tree",
            actual: other.object_type().to_string(),
        }),
    }
}

fn read_blob(odb: &ObjectDatabase, oid: Option<Oid>) -> Result<Option<Vec<u8>>, MergeError> {
    let Some(oid) = oid else { return Ok(None) };
    match odb.read(&oid)?.ok_or(MergeError::ObjectNotFound(oid))? {
        Object::Blob(b) => Ok(Some(b.data)),
        other => Err(MergeError::UnexpectedObjectType {
            oid,
            expected: "blob",
            actual: other.object_type().to_string(),
        }),
    }
}

fn flatten_tree(odb: &ObjectDatabase, tree_oid: &Oid) -> Result<BTreeMap<BString, FlatEntry>, MergeError> {
    flatten_into(odb, tree_oid, &BString::from(""))
}

fn flatten_into(odb: &ObjectDatabase, tree_oid: &Oid, prefix: &BString) -> Result<BTreeMap<BString, FlatEntry>, MergeError> {
    let tree = read_tree(odb, tree_oid)?;
    let mut map = BTreeMap::new();
    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            let mut p = prefix.clone();
            p.push(b'/');
            p.extend_from_slice(&entry.name);
            p
        };
        if entry.mode.is_tree() {
            map.extend(flatten_into(odb, &entry.oid, &path)?);
        } else {
            map.insert(path, FlatEntry { oid: entry.oid, mode: entry.mode });
        }
    }
    Ok(map)
}

fn write_tree(odb: &ObjectDatabase, entries: &BTreeMap<BString, FlatEntry>) -> Result<Oid, MergeError> {
    let mut top: BTreeMap<BString, Vec<(BString, FlatEntry)>> = BTreeMap::new();
    let mut direct = Vec::new();

    for (path, entry) in entries {
        if let Some(pos) = path.iter().position(|&b| b == b'/') {
            let dir = BString::from(&path[..pos]);
            let rest = BString::from(&path[pos + 1..]);
            top.entry(dir).or_default().push((rest, *entry));
        } else {
            direct.push(TreeEntry { mode: entry.mode, name: path.clone(), oid: entry.oid });
        }
    }

    for (dir, sub) in &top {
        let sub_map: BTreeMap<BString, FlatEntry> = sub.iter().cloned().collect();
        let sub_oid = write_tree(odb, &sub_map)?;
        direct.push(TreeEntry { mode: FileMode::Tree, name: dir.clone(), oid: sub_oid });
    }

    direct.sort_by(TreeEntry::cmp_entries);
    Ok(odb.write(&Object::Tree(Tree { entries: direct }))?)
}
