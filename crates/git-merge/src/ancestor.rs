//! Common-ancestor search: the `CommonAncestors` BFS and the minimal-set
//! reduction and base selection built on top of it.

use std::collections::HashMap;

use git_hash::Oid;
use git_object::{Commit, Object};
use git_odb::ObjectDatabase;

use crate::MergeError;

const PARENT1: u8 = 1 << 0;
const PARENT2: u8 = 1 << 1;
const STALE: u8 = 1 << 2;

/// Find every common ancestor of `a` and `bs`, reduced to the minimal set
/// (no returned ancestor is itself reachable from another returned
/// ancestor).
pub fn merge_base(odb: &ObjectDatabase, a: Oid, bs: &[Oid]) -> Result<Vec<Oid>, MergeError> {
    let candidates = common_ancestors(odb, a, bs)?;
    minimal_set(odb, candidates)
}

/// Pick a single base commit for a two-way merge: the sole minimal common
/// ancestor, or (when several remain) the oldest one. Recursive-merge
/// synthesis of a virtual base from multiple candidates is not implemented;
/// callers that need higher-fidelity merges across crisscross histories
/// should treat the returned base as a reasonable approximation.
pub fn merge_base_single(odb: &ObjectDatabase, a: Oid, bs: &[Oid]) -> Result<Oid, MergeError> {
    let mut candidates = merge_base(odb, a, bs)?;
    if candidates.is_empty() {
        return Err(MergeError::NoMergeBase);
    }
    if candidates.len() == 1 {
        return Ok(candidates.remove(0));
    }
    let mut oldest = candidates[0];
    let mut oldest_date = commit_date(odb, oldest)?;
    for &c in &candidates[1..] {
        let date = commit_date(odb, c)?;
        if date < oldest_date {
            oldest = c;
            oldest_date = date;
        }
    }
    Ok(oldest)
}

fn common_ancestors(odb: &ObjectDatabase, a: Oid, bs: &[Oid]) -> Result<Vec<Oid>, MergeError> {
    let mut flags: HashMap<Oid, u8> = HashMap::new();
    let mut queue: Vec<(i64, Oid)> = Vec::new();
    let mut result = Vec::new();

    seed(odb, a, PARENT1, &mut flags, &mut queue)?;
    for &b in bs {
        seed(odb, b, PARENT2, &mut flags, &mut queue)?;
    }

    while let Some(oid) = pop_newest(&mut queue) {
        let stored = flags.get(&oid).copied().unwrap_or(0);
        let mut propagate = stored & (PARENT1 | PARENT2 | STALE);
        if propagate == (PARENT1 | PARENT2) {
            result.push(oid);
            propagate |= STALE;
        }

        let commit = read_commit(odb, oid)?;
        for parent in commit.parents {
            let existing = flags.get(&parent).copied().unwrap_or(0);
            if existing & propagate == propagate {
                continue;
            }
            flags.insert(parent, existing | propagate);
            push_sorted(odb, &mut queue, parent)?;
        }
    }

    Ok(result)
}

/// Drop any candidate that another candidate can reach by walking parents —
/// it isn't a *minimal* common ancestor if some other candidate descends
/// from it.
fn minimal_set(odb: &ObjectDatabase, candidates: Vec<Oid>) -> Result<Vec<Oid>, MergeError> {
    let mut minimal = Vec::new();
    for (i, &candidate) in candidates.iter().enumerate() {
        let mut dominated = false;
        for (j, &other) in candidates.iter().enumerate() {
            if i == j {
                continue;
            }
            if is_ancestor(odb, candidate, other)? {
                dominated = true;
                break;
            }
        }
        if !dominated {
            minimal.push(candidate);
        }
    }
    Ok(minimal)
}

/// True if `ancestor` can be reached by walking `descendant`'s parents.
fn is_ancestor(odb: &ObjectDatabase, ancestor: Oid, descendant: Oid) -> Result<bool, MergeError> {
    if ancestor == descendant {
        return Ok(false);
    }
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![descendant];
    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        let commit = read_commit(odb, oid)?;
        for parent in commit.parents {
            if parent == ancestor {
                return Ok(true);
            }
            stack.push(parent);
        }
    }
    Ok(false)
}

fn seed(
    odb: &ObjectDatabase,
    oid: Oid,
    flag: u8,
    flags: &mut HashMap<Oid, u8>,
    queue: &mut Vec<(i64, Oid)>,
) -> Result<(), MergeError> {
    let existing = flags.get(&oid).copied().unwrap_or(0);
    if existing & flag == flag {
        return Ok(());
    }
    flags.insert(oid, existing | flag);
    push_sorted(odb, queue, oid)
}

fn push_sorted(odb: &ObjectDatabase, queue: &mut Vec<(i64, Oid)>, oid: Oid) -> Result<(), MergeError> {
    let date = commit_date(odb, oid)?;
    let pos = queue.partition_point(|(d, _)| *d > date);
    queue.insert(pos, (date, oid));
    Ok(())
}

fn pop_newest(queue: &mut Vec<(i64, Oid)>) -> Option<Oid> {
    if queue.is_empty() {
        None
    } else {
        Some(queue.remove(0).1)
    }
}

fn commit_date(odb: &ObjectDatabase, oid: Oid) -> Result<i64, MergeError> {
    Ok(read_commit(odb, oid)?.committer.date.timestamp)
}

fn read_commit(odb: &ObjectDatabase, oid: Oid) -> Result<Commit, MergeError> {
    match odb.read(&oid)?.ok_or(MergeError::ObjectNotFound(oid))? {
        Object::Commit(c) => Ok(c),
        other => Err(MergeError::UnexpectedObjectType {
            oid,
            expected: "commit",
            actual: other.object_type().to_string(),
        }),
    }
}
