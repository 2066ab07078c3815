//! Staging index for git.
//!
//! The index sits between the working tree and the object database,
//! tracking every path git considers tracked at its current staged
//! content, keyed by `(path, stage)`. Stage 0 is the resolved entry;
//! stages 1-3 hold the base/ours/theirs sides of an unmerged conflict and
//! never coexist with stage 0 for the same path.

pub mod entry;
pub mod extensions;
mod read;
mod write;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use git_hash::Oid;
use git_lock::LockFile;
use git_object::FileMode;
use git_odb::ObjectDatabase;

pub use entry::{key, stat_match, times_match, Entry, EntryFlags, Stage, StatData};
pub use extensions::tree::{CacheTree, CacheTreeNode};
pub use extensions::RawExtension;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid extension '{sig}': {reason}")]
    InvalidExtension { sig: String, reason: String },

    #[error("failed to lock '{path}'")]
    LockFailed { path: PathBuf },

    #[error(transparent)]
    Lock(#[from] git_lock::LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),
}

/// The staging index.
///
/// `children` mirrors every tracked path under each of its ancestor
/// directories, so a file/directory collision (adding `a` when `a/b` is
/// tracked, or adding `a/b` when `a` is tracked as a file) can be resolved
/// without a linear scan of `entries`.
#[derive(Debug, Clone)]
pub struct Index {
    version: u32,
    entries: BTreeMap<(PathBuf, u8), Entry>,
    children: HashMap<PathBuf, BTreeSet<PathBuf>>,
    cache_tree: Option<CacheTree>,
    unknown_extensions: Vec<RawExtension>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            version: 2,
            entries: BTreeMap::new(),
            children: HashMap::new(),
            cache_tree: None,
            unknown_extensions: Vec::new(),
        }
    }

    /// Read an index from `path`, or an empty index if it doesn't exist yet.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read(path)?;
        read::parse_index(&data)
    }

    /// Write the index to `path` directly (no lock discipline). Prefer
    /// [`Index::load_for_update`]/[`Index::write_updates`] when racing
    /// against other writers.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let data = write::serialize_index(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Acquire `path.lock` and read the current index for an update cycle.
    pub fn load_for_update(path: impl AsRef<Path>) -> Result<(Self, LockFile), IndexError> {
        let path = path.as_ref();
        let lock = LockFile::acquire(path).map_err(|_| IndexError::LockFailed {
            path: path.to_path_buf(),
        })?;
        let index = Self::read_from(path)?;
        Ok((index, lock))
    }

    /// Serialize and commit the index through a lock acquired via
    /// [`Index::load_for_update`].
    pub fn write_updates(&self, mut lock: LockFile) -> Result<(), IndexError> {
        let data = write::serialize_index(self)?;
        lock.write_all(&data)?;
        lock.commit()?;
        Ok(())
    }

    /// Abandon an update cycle, leaving the on-disk index untouched.
    pub fn release_lock(lock: LockFile) -> Result<(), IndexError> {
        lock.rollback()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Drop every entry and cached tree state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.cache_tree = None;
    }

    /// True if any path has an unresolved conflict (a stage 1-3 entry).
    pub fn conflict(&self) -> bool {
        self.entries.keys().any(|(_, stage)| *stage != 0)
    }

    pub fn entry_for(&self, path: &Path, stage: u8) -> Option<&Entry> {
        self.entries.get(&(path.to_path_buf(), stage))
    }

    /// True if `path` itself is tracked, at any stage.
    pub fn tracked_file(&self, path: &Path) -> bool {
        (0u8..=3).any(|stage| self.entries.contains_key(&(path.to_path_buf(), stage)))
    }

    /// True if any tracked path is nested under `path`.
    pub fn tracked_directory(&self, path: &Path) -> bool {
        self.children.get(path).is_some_and(|set| !set.is_empty())
    }

    pub fn tracked(&self, path: &Path) -> bool {
        self.tracked_file(path) || self.tracked_directory(path)
    }

    /// Every entry in `(path, stage)` order.
    pub fn each_entry(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Stage a resolved entry at `path`, resolving any file/directory
    /// collision with existing entries and clearing prior conflict stages.
    pub fn add(&mut self, path: PathBuf, oid: Oid, mode: FileMode, stat: StatData) {
        self.resolve_collisions(&path);
        for stage in 1u8..=3 {
            self.entries.remove(&(path.clone(), stage));
        }
        if let Some(ref mut tree) = self.cache_tree {
            tree.invalidate(bstr::BStr::new(path.to_string_lossy().as_bytes()));
        }
        let entry = Entry {
            path: path.clone(),
            oid,
            mode,
            stage: Stage::Normal,
            stat,
            flags: EntryFlags::default(),
        };
        self.insert_entry(entry);
    }

    /// Remove every entry for `path` (all stages).
    pub fn remove(&mut self, path: &Path) {
        let mut removed_any = false;
        for stage in 0u8..=3 {
            if self.entries.remove(&(path.to_path_buf(), stage)).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.unlink(path);
            if let Some(ref mut tree) = self.cache_tree {
                tree.invalidate(bstr::BStr::new(path.to_string_lossy().as_bytes()));
            }
        }
    }

    /// Replace `path`'s entries with an unmerged conflict set: up to three
    /// sides (base, ours, theirs) staged at stages 1, 2, and 3. A `None`
    /// side means that side has no entry (e.g. added-by-them).
    pub fn add_conflict_set(&mut self, path: PathBuf, sides: [Option<(Oid, FileMode)>; 3]) {
        self.resolve_collisions(&path);
        self.entries.remove(&(path.clone(), 0));
        for (i, side) in sides.into_iter().enumerate() {
            let stage = Stage::from_u8((i + 1) as u8).expect("1..=3 is always a valid stage");
            match side {
                Some((oid, mode)) => {
                    let entry = Entry {
                        path: path.clone(),
                        oid,
                        mode,
                        stage,
                        stat: StatData::default(),
                        flags: EntryFlags::default(),
                    };
                    self.insert_entry(entry);
                }
                None => {
                    self.entries.remove(&(path.clone(), stage.as_u8()));
                }
            }
        }
        if !self.tracked_file(&path) {
            self.unlink(&path);
        }
        if let Some(ref mut tree) = self.cache_tree {
            tree.invalidate(bstr::BStr::new(path.to_string_lossy().as_bytes()));
        }
    }

    pub fn cache_tree(&self) -> Option<&CacheTree> {
        self.cache_tree.as_ref()
    }

    pub fn cache_tree_mut(&mut self) -> Option<&mut CacheTree> {
        self.cache_tree.as_mut()
    }

    pub fn set_cache_tree(&mut self, tree: Option<CacheTree>) {
        self.cache_tree = tree;
    }

    /// Build a tree hierarchy from the current stage-0 entries.
    pub fn write_tree(&self, odb: &ObjectDatabase) -> Result<Oid, IndexError> {
        write::write_tree_from_index(self, odb)
    }

    /// Insert an entry verbatim, without collision resolution. Used when
    /// reconstructing an index from a trusted on-disk file, which is
    /// already collision-free by construction.
    pub(crate) fn insert_raw(&mut self, entry: Entry) {
        self.link(&entry.path);
        self.entries.insert(key(&entry), entry);
    }

    fn insert_entry(&mut self, entry: Entry) {
        self.insert_raw(entry);
    }

    fn link(&mut self, path: &Path) {
        for ancestor in ancestors_of(path) {
            self.children
                .entry(ancestor.to_path_buf())
                .or_default()
                .insert(path.to_path_buf());
        }
    }

    fn unlink(&mut self, path: &Path) {
        for ancestor in ancestors_of(path) {
            if let Some(set) = self.children.get_mut(ancestor) {
                set.remove(path);
                if set.is_empty() {
                    self.children.remove(ancestor);
                }
            }
        }
    }

    /// Drop whichever existing entries collide with staging a new entry at
    /// `path`: an ancestor directory currently tracked as a file (file
    /// replacing a directory) or any path nested under `path` (directory
    /// replacing a file).
    fn resolve_collisions(&mut self, path: &Path) {
        for ancestor in ancestors_of(path) {
            if self.entries.contains_key(&(ancestor.to_path_buf(), 0)) {
                self.remove(ancestor);
            }
        }
        if let Some(descendants) = self.children.remove(path) {
            for descendant in descendants {
                self.remove(&descendant);
            }
        }
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

fn ancestors_of(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors()
        .skip(1)
        .take_while(|p| !p.as_os_str().is_empty())
}
