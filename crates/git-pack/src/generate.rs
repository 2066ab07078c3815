//! Pack generation: turn a set of candidate objects into a pack stream,
//! delta-compressing where it pays off.
//!
//! Given a set of candidate objects (typically everything reachable from a
//! revision walk restricted to "wants minus haves"), [`Packer`] sorts them
//! so similar objects cluster together, slides a window over the sorted
//! list looking for good delta bases, and writes the result as a single
//! pack stream with OFS_DELTA back-references.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_hash::hasher::Hasher;
use git_hash::Oid;
use git_object::ObjectType;

use crate::delta::compute::compute_delta;
use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
use crate::{PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION, PackError};

/// Window size for the delta candidate search.
const WINDOW: usize = 8;

/// Maximum delta chain depth before a base is no longer considered.
const MAX_DEPTH: usize = 50;

/// Objects smaller than this are not worth delta-compressing.
const MIN_DELTA_CANDIDATE_SIZE: u64 = 50;

/// Objects larger than this are excluded from delta consideration.
const MAX_DELTA_CANDIDATE_SIZE: u64 = 1 << 29;

/// An object to include in a generated pack.
pub struct CandidateEntry {
    pub oid: Oid,
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    /// Workspace path this object was found at, if any. Objects that share
    /// a directory and basename sort adjacently, which makes them much more
    /// likely to delta well against each other.
    pub path: Option<PathBuf>,
}

/// Trait for resolving objects by OID. Implemented by the object database.
pub trait ObjectResolver {
    /// Read an object by OID. Returns None if not found.
    fn read_object(&self, oid: &Oid) -> Result<Option<crate::PackedObject>, PackError>;
}

/// Result of pack generation.
#[derive(Debug)]
pub struct PackGenerationResult {
    pub num_objects: u32,
    pub bytes_written: u64,
    pub checksum: Oid,
}

struct ResolvedEntry {
    oid: Oid,
    obj_type: ObjectType,
    data: Vec<u8>,
    dirname: String,
    basename: String,
    /// Within [MIN_DELTA_CANDIDATE_SIZE, MAX_DELTA_CANDIDATE_SIZE]: eligible
    /// to be used as a delta source or target.
    eligible: bool,
    /// Current delta chain depth (0 = stored whole).
    depth: usize,
    base_index: Option<usize>,
    delta: Option<Vec<u8>>,
}

fn split_path(path: &Option<PathBuf>) -> (String, String) {
    match path {
        None => (String::new(), String::new()),
        Some(p) => {
            let basename = p
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dirname = p
                .parent()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (dirname, basename)
        }
    }
}

fn type_rank(t: ObjectType) -> u8 {
    match t {
        ObjectType::Commit => 0,
        ObjectType::Tree => 1,
        ObjectType::Blob => 2,
    }
}

fn type_num(t: ObjectType) -> u8 {
    match t {
        ObjectType::Commit => 1,
        ObjectType::Tree => 2,
        ObjectType::Blob => 3,
    }
}

/// Sorts candidates, searches for delta bases within a sliding window, and
/// writes a pack stream with the accepted deltas as OFS_DELTA entries.
pub struct Packer {
    window: usize,
    max_depth: usize,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packer {
    pub fn new() -> Self {
        Self {
            window: WINDOW,
            max_depth: MAX_DEPTH,
        }
    }

    /// Generate a pack containing `candidates` and write it to `output`.
    pub fn pack(
        &self,
        candidates: Vec<CandidateEntry>,
        output: &mut dyn Write,
    ) -> Result<PackGenerationResult, PackError> {
        if candidates.is_empty() {
            return Ok(PackGenerationResult {
                num_objects: 0,
                bytes_written: 0,
                checksum: Oid::NULL,
            });
        }

        let mut entries: Vec<ResolvedEntry> = candidates
            .into_iter()
            .map(|c| {
                let size = c.data.len() as u64;
                let eligible =
                    (MIN_DELTA_CANDIDATE_SIZE..=MAX_DELTA_CANDIDATE_SIZE).contains(&size);
                let (dirname, basename) = split_path(&c.path);
                ResolvedEntry {
                    oid: c.oid,
                    obj_type: c.obj_type,
                    data: c.data,
                    dirname,
                    basename,
                    eligible,
                    depth: 0,
                    base_index: None,
                    delta: None,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            type_rank(a.obj_type)
                .cmp(&type_rank(b.obj_type))
                .then_with(|| a.basename.cmp(&b.basename))
                .then_with(|| a.dirname.cmp(&b.dirname))
                .then_with(|| a.data.len().cmp(&b.data.len()))
        });

        self.find_deltas(&mut entries);
        write_pack(&entries, output)
    }

    /// Slide a `window`-entry window in reverse sort order, trying each
    /// candidate target against every source currently in the window.
    fn find_deltas(&self, entries: &mut [ResolvedEntry]) {
        let mut window: VecDeque<usize> = VecDeque::with_capacity(self.window);
        for i in (0..entries.len()).rev() {
            if entries[i].eligible {
                for &source_idx in window.iter() {
                    self.try_delta(entries, i, source_idx);
                }
            }
            window.push_front(i);
            if window.len() > self.window {
                window.pop_back();
            }
        }
    }

    fn try_delta(&self, entries: &mut [ResolvedEntry], target_idx: usize, source_idx: usize) {
        if entries[target_idx].obj_type != entries[source_idx].obj_type {
            return;
        }
        if !entries[source_idx].eligible {
            return;
        }

        let source_depth = entries[source_idx].depth;
        if source_depth > self.max_depth {
            return;
        }
        let ref_depth = source_depth + 1;
        if ref_depth > self.max_depth {
            return;
        }

        let target_size = entries[target_idx].data.len() as u64;
        let source_size = entries[source_idx].data.len() as u64;
        if target_size < source_size / 32 {
            return;
        }

        let max_delta_size: u64 = match &entries[target_idx].delta {
            Some(current) => current.len() as u64,
            None => {
                let base = (target_size as f64 / 2.0 - 20.0).max(0.0);
                let scale =
                    (self.max_depth - source_depth) as f64 / (self.max_depth + 1 - ref_depth) as f64;
                (base * scale) as u64
            }
        };
        if max_delta_size == 0 {
            return;
        }

        let delta = compute_delta(&entries[source_idx].data, &entries[target_idx].data);
        if (delta.len() as u64) < max_delta_size {
            entries[target_idx].depth = ref_depth;
            entries[target_idx].base_index = Some(source_idx);
            entries[target_idx].delta = Some(delta);
        }
    }
}

fn collect_write_order(entries: &[ResolvedEntry], idx: usize, written: &mut [bool], order: &mut Vec<usize>) {
    if written[idx] {
        return;
    }
    if let Some(base_idx) = entries[idx].base_index {
        collect_write_order(entries, base_idx, written, order);
    }
    written[idx] = true;
    order.push(idx);
}

fn write_pack(entries: &[ResolvedEntry], output: &mut dyn Write) -> Result<PackGenerationResult, PackError> {
    let mut hasher = Hasher::new();
    let mut total_bytes: u64 = 0;

    let mut header = [0u8; PACK_HEADER_SIZE];
    header[0..4].copy_from_slice(PACK_SIGNATURE);
    header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
    header[8..12].copy_from_slice(&(entries.len() as u32).to_be_bytes());
    output.write_all(&header)?;
    hasher.update(&header);
    total_bytes += header.len() as u64;

    // Bases must be written (and their offset known) before any delta that
    // references them via OFS_DELTA.
    let mut written = vec![false; entries.len()];
    let mut order = Vec::with_capacity(entries.len());
    for i in 0..entries.len() {
        collect_write_order(entries, i, &mut written, &mut order);
    }

    let mut offsets: Vec<u64> = vec![0; entries.len()];

    for idx in order {
        let entry = &entries[idx];
        let offset = total_bytes;
        offsets[idx] = offset;

        let (type_num, ofs_bytes, payload): (u8, Vec<u8>, &[u8]) =
            match (&entry.delta, entry.base_index) {
                (Some(delta_bytes), Some(base_idx)) => {
                    let base_offset = offsets[base_idx];
                    (6, encode_ofs_delta_offset(offset - base_offset), delta_bytes.as_slice())
                }
                _ => (type_num(entry.obj_type), Vec::new(), entry.data.as_slice()),
            };

        let entry_header = encode_entry_header(type_num, payload.len() as u64);
        output.write_all(&entry_header)?;
        hasher.update(&entry_header);
        total_bytes += entry_header.len() as u64;

        if !ofs_bytes.is_empty() {
            output.write_all(&ofs_bytes)?;
            hasher.update(&ofs_bytes);
            total_bytes += ofs_bytes.len() as u64;
        }

        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()?;
        }
        output.write_all(&compressed)?;
        hasher.update(&compressed);
        total_bytes += compressed.len() as u64;
    }

    let checksum = hasher.finalize();
    output.write_all(checksum.as_bytes())?;
    total_bytes += checksum.as_bytes().len() as u64;

    Ok(PackGenerationResult {
        num_objects: entries.len() as u32,
        bytes_written: total_bytes,
        checksum,
    })
}

/// Generate a pack containing the given objects, without path context for
/// the delta-clustering sort. Convenience wrapper around [`Packer`] for
/// callers that only have a flat `(oid, type, data)` list.
#[tracing::instrument(level = "debug", skip(objects, output))]
pub fn generate_pack(
    objects: &[(Oid, ObjectType, Vec<u8>)],
    output: &mut dyn Write,
) -> Result<PackGenerationResult, PackError> {
    let candidates = objects
        .iter()
        .map(|(oid, obj_type, data)| CandidateEntry {
            oid: *oid,
            obj_type: *obj_type,
            data: data.clone(),
            path: None,
        })
        .collect();
    let result = Packer::new().pack(candidates, output)?;
    tracing::debug!(num_objects = result.num_objects, bytes = result.bytes_written, "generated pack");
    Ok(result)
}
