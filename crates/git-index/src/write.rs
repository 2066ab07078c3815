//! Index file writing.

use git_hash::Oid;
use git_object::{ObjectType, Tree, TreeEntry};
use git_odb::ObjectDatabase;

use crate::entry::Entry;
use crate::extensions::tree::CacheTree;
use crate::{Index, IndexError, Stage};

/// Magic bytes at the start of every index file.
const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Serialize the index to bytes: header, entries in `(path, stage)` order,
/// extensions, then a trailing SHA-1 checksum of everything before it.
pub fn serialize_index(index: &Index) -> Result<Vec<u8>, IndexError> {
    let mut buf = Vec::new();

    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&2u32.to_be_bytes());
    buf.extend_from_slice(&(index.len() as u32).to_be_bytes());

    for entry in index.each_entry() {
        write_entry(&mut buf, entry);
    }

    if let Some(tree) = index.cache_tree() {
        let tree_data = tree.serialize();
        buf.extend_from_slice(CacheTree::SIGNATURE);
        buf.extend_from_slice(&(tree_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&tree_data);
    }

    for ext in &index.unknown_extensions {
        buf.extend_from_slice(&ext.signature);
        buf.extend_from_slice(&(ext.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }

    let checksum = git_hash::hasher::Hasher::digest(&buf);
    buf.extend_from_slice(checksum.as_bytes());

    Ok(buf)
}

/// Write a single v2 cache entry.
fn write_entry(buf: &mut Vec<u8>, entry: &Entry) {
    let entry_start = buf.len();
    let path_bytes = path_to_bytes(&entry.path);

    buf.extend_from_slice(&entry.stat.ctime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ctime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.dev.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ino.to_be_bytes());
    buf.extend_from_slice(&entry.mode.raw().to_be_bytes());
    buf.extend_from_slice(&entry.stat.uid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.gid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.size.to_be_bytes());

    buf.extend_from_slice(entry.oid.as_bytes());

    let name_len = std::cmp::min(path_bytes.len(), 0xFFF) as u16;
    let mut flags: u16 = name_len;
    flags |= (entry.stage.as_u8() as u16) << 12;
    if entry.flags.assume_valid {
        flags |= 0x8000;
    }
    buf.extend_from_slice(&flags.to_be_bytes());

    buf.extend_from_slice(&path_bytes);

    // Pad using C git's formula: entry_size = ((40 + 20 + 2 + name_len + 8) & ~7)
    let entry_size = (40 + 20 + 2 + path_bytes.len() + 8) & !7;
    let current_len = buf.len() - entry_start;
    let padding = entry_size - current_len;
    buf.resize(buf.len() + padding, 0);
}

#[cfg(unix)]
fn path_to_bytes(path: &std::path::Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_bytes(path: &std::path::Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Build a tree hierarchy from the current stage-0 (resolved) entries.
pub fn write_tree_from_index(index: &Index, odb: &ObjectDatabase) -> Result<Oid, IndexError> {
    let entries: Vec<&Entry> = index
        .each_entry()
        .filter(|e| e.stage == Stage::Normal)
        .collect();

    if entries.is_empty() {
        let tree = Tree::new();
        let tree_bytes = tree.serialize_content();
        return Ok(odb.write_raw(ObjectType::Tree, &tree_bytes)?);
    }

    build_tree(&entries, std::path::Path::new(""), odb)
}

/// Recursively build tree objects from entries sorted by path.
fn build_tree(
    entries: &[&Entry],
    prefix: &std::path::Path,
    odb: &ObjectDatabase,
) -> Result<Oid, IndexError> {
    let mut tree_entries: Vec<TreeEntry> = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let entry = entries[i];
        let relative = entry.path.strip_prefix(prefix).unwrap_or(&entry.path);
        let mut components = relative.components();
        let first = components.next().expect("non-empty relative path");
        let rest: std::path::PathBuf = components.collect();

        if rest.as_os_str().is_empty() {
            tree_entries.push(TreeEntry {
                mode: entry.mode,
                name: path_to_bytes(std::path::Path::new(first.as_os_str())).into(),
                oid: entry.oid,
            });
            i += 1;
        } else {
            let subtree_end = entries[i..]
                .iter()
                .position(|e| {
                    let rel = e.path.strip_prefix(prefix).unwrap_or(&e.path);
                    rel.components().next() != Some(first)
                })
                .map(|pos| i + pos)
                .unwrap_or(entries.len());

            let subtree_entries = &entries[i..subtree_end];
            let new_prefix = prefix.join(first.as_os_str());
            let subtree_oid = build_tree(subtree_entries, &new_prefix, odb)?;

            tree_entries.push(TreeEntry {
                mode: git_object::FileMode::Tree,
                name: path_to_bytes(std::path::Path::new(first.as_os_str())).into(),
                oid: subtree_oid,
            });

            i = subtree_end;
        }
    }

    let mut tree = Tree::new();
    tree.entries = tree_entries;
    tree.sort();
    let tree_bytes = tree.serialize_content();
    Ok(odb.write_raw(ObjectType::Tree, &tree_bytes)?)
}
