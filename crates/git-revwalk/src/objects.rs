//! Object emission: after a commit walk, enumerate the unique tree and blob
//! entries reachable from the yielded commits, skipping anything reachable
//! only from the excluded (uninteresting) side.

use std::collections::HashSet;

use git_hash::Oid;
use git_object::Object;
use git_odb::ObjectDatabase;

use crate::RevWalkError;

/// List every commit, tree, and blob OID reachable from `include` but not
/// from `exclude`.
pub fn list_objects(
    odb: &ObjectDatabase,
    include: &[Oid],
    exclude: &[Oid],
) -> Result<Vec<Oid>, RevWalkError> {
    let mut excluded = HashSet::new();
    for oid in exclude {
        mark_reachable(odb, *oid, &mut excluded)?;
    }

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for oid in include {
        collect_reachable(odb, *oid, &mut seen, &excluded, &mut result)?;
    }
    Ok(result)
}

fn mark_reachable(odb: &ObjectDatabase, start: Oid, seen: &mut HashSet<Oid>) -> Result<(), RevWalkError> {
    let mut stack = vec![start];
    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        let Some(obj) = odb.read(&oid)? else {
            continue;
        };
        match obj {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                stack.extend(commit.parents);
            }
            Object::Tree(tree) => stack.extend(tree.entries.into_iter().map(|e| e.oid)),
            Object::Blob(_) => {}
        }
    }
    Ok(())
}

fn collect_reachable(
    odb: &ObjectDatabase,
    start: Oid,
    seen: &mut HashSet<Oid>,
    excluded: &HashSet<Oid>,
    result: &mut Vec<Oid>,
) -> Result<(), RevWalkError> {
    let mut stack = vec![start];
    while let Some(oid) = stack.pop() {
        if excluded.contains(&oid) || !seen.insert(oid) {
            continue;
        }
        let Some(obj) = odb.read(&oid)? else {
            continue;
        };
        result.push(oid);
        match obj {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                stack.extend(commit.parents);
            }
            Object::Tree(tree) => stack.extend(tree.entries.into_iter().map(|e| e.oid)),
            Object::Blob(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::{Blob, Tree, TreeEntry};
    use git_utils::date::{GitDate, Signature};
    use tempfile::tempdir;

    fn sig() -> Signature {
        Signature {
            name: "author".into(),
            email: "author@example.com".into(),
            date: GitDate::new(1000, 0),
        }
    }

    #[test]
    fn lists_commit_tree_and_blob() {
        let dir = tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let blob = odb.write(&Object::Blob(Blob::new(b"hi".to_vec()))).unwrap();
        let tree = odb
            .write(&Object::Tree(Tree {
                entries: vec![TreeEntry {
                    name: "a.txt".into(),
                    mode: git_object::FileMode::Regular,
                    oid: blob,
                }],
            }))
            .unwrap();
        let commit = odb
            .write(&Object::Commit(git_object::Commit {
                tree,
                parents: vec![],
                author: sig(),
                committer: sig(),
                message: "msg".into(),
            }))
            .unwrap();

        let objects = list_objects(&odb, &[commit], &[]).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.contains(&commit));
        assert!(objects.contains(&tree));
        assert!(objects.contains(&blob));
    }

    #[test]
    fn excludes_shared_history() {
        let dir = tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let tree = odb.write(&Object::Tree(Tree { entries: Vec::new() })).unwrap();
        let base = odb
            .write(&Object::Commit(git_object::Commit {
                tree,
                parents: vec![],
                author: sig(),
                committer: sig(),
                message: "base".into(),
            }))
            .unwrap();
        let tip = odb
            .write(&Object::Commit(git_object::Commit {
                tree,
                parents: vec![base],
                author: sig(),
                committer: sig(),
                message: "tip".into(),
            }))
            .unwrap();

        let objects = list_objects(&odb, &[tip], &[base]).unwrap();
        assert_eq!(objects, vec![tip]);
    }
}
