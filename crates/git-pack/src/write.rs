//! Consuming and producing pack streams.
//!
//! `PackWriter` / `build_pack_index` / `create_pack` produce a new pack from
//! objects this process already has. `Unpacker` and `Indexer` are the two
//! strategies for consuming a pack stream received from a peer (fetch/push);
//! `pack::PackFile` plays the role of `Reader`, the third strategy, since a
//! pack already on disk is looked up through its `.idx` rather than scanned.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use git_hash::hasher::Hasher;
use git_hash::Oid;
use git_object::ObjectType;

use crate::entry::{encode_entry_header, parse_entry_header};
use crate::{
    IDX_SIGNATURE, IDX_VERSION, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION, PackEntryType,
    PackError,
};

/// A written pack entry, used for index construction.
struct PackWriterEntry {
    oid: Oid,
    offset: u64,
    crc32: u32,
}

/// Builder for creating new packfiles.
pub struct PackWriter {
    file: std::fs::File,
    hasher: Hasher,
    num_objects: u32,
    entries: Vec<PackWriterEntry>,
    path: PathBuf,
    /// When true, allow delta bases that reference objects not in this pack.
    thin: bool,
    /// Current write position (byte offset).
    position: u64,
}

impl PackWriter {
    /// Create a new pack writer at the given path.
    ///
    /// Writes the pack header immediately; call `add_object` / `add_delta`
    /// to append entries, then `finish` to write the trailer.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let mut file = std::fs::File::create(&path)?;
        let mut hasher = Hasher::new();

        // Write placeholder header (num_objects will be fixed in finish)
        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&0u32.to_be_bytes()); // placeholder

        file.write_all(&header)?;
        hasher.update(&header);

        Ok(Self {
            file,
            hasher,
            num_objects: 0,
            entries: Vec::new(),
            path,
            thin: false,
            position: PACK_HEADER_SIZE as u64,
        })
    }

    /// Enable or disable thin pack mode.
    ///
    /// In thin pack mode, delta bases may reference objects not included
    /// in the pack. The receiver is expected to already have those objects.
    pub fn set_thin(&mut self, thin: bool) {
        self.thin = thin;
    }

    /// Add a full (non-delta) object to the pack.
    pub fn add_object(&mut self, obj_type: ObjectType, data: &[u8]) -> Result<(), PackError> {
        let type_num = match obj_type {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
        };

        let oid = Hasher::hash_object(std::str::from_utf8(obj_type.as_bytes()).unwrap(), data);

        let offset = self.position;
        let header = encode_entry_header(type_num, data.len() as u64);

        // Compress data
        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?;
        }

        // CRC32 of header + compressed data
        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);
        let crc_val = crc.finalize();

        // Write to file and hasher
        self.write_bytes(&header)?;
        self.write_bytes(&compressed)?;

        self.entries.push(PackWriterEntry {
            oid,
            offset,
            crc32: crc_val,
        });
        self.num_objects += 1;

        Ok(())
    }

    /// Add a REF_DELTA entry referencing a base object by OID.
    pub fn add_delta(
        &mut self,
        base_oid: Oid,
        target_oid: Oid,
        delta_data: &[u8],
    ) -> Result<(), PackError> {
        let offset = self.position;
        let header = encode_entry_header(7, delta_data.len() as u64); // REF_DELTA

        // Compress delta data
        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
            encoder.write_all(delta_data)?;
            encoder.finish()?;
        }

        // CRC32 of header + base_oid + compressed
        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(base_oid.as_bytes());
        crc.update(&compressed);
        let crc_val = crc.finalize();

        // Write to file and hasher
        self.write_bytes(&header)?;
        self.write_bytes(base_oid.as_bytes())?;
        self.write_bytes(&compressed)?;

        self.entries.push(PackWriterEntry {
            oid: target_oid,
            offset,
            crc32: crc_val,
        });
        self.num_objects += 1;

        Ok(())
    }

    /// Finish writing the pack: fix header, write checksum trailer.
    ///
    /// Returns the path to the .pack file and its checksum.
    pub fn finish(mut self) -> Result<(PathBuf, Oid), PackError> {
        // Fix the object count in the header
        use std::io::Seek;
        self.file.seek(std::io::SeekFrom::Start(0))?;

        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&self.num_objects.to_be_bytes());

        self.file.write_all(&header)?;
        self.file.seek(std::io::SeekFrom::End(0))?;

        // Recompute the checksum from scratch, since the header changed
        // after the hasher already saw the placeholder.
        drop(self.file);

        let pack_content = std::fs::read(&self.path)?;
        let checksum = Hasher::digest(&pack_content);

        // Append checksum to the file
        let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(checksum.as_bytes())?;

        Ok((self.path.clone(), checksum))
    }

    /// Get the entries written so far (for index building).
    pub fn entries(&self) -> impl Iterator<Item = (&Oid, u64, u32)> {
        self.entries.iter().map(|e| (&e.oid, e.offset, e.crc32))
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }
}

/// Build a v2 pack index (.idx) from a list of (OID, offset, CRC32) entries
/// and a pack checksum. Writes the index to the given path.
pub fn build_pack_index(
    idx_path: &Path,
    entries: &mut [(Oid, u64, u32)],
    pack_checksum: &Oid,
) -> Result<PathBuf, PackError> {
    // Sort by OID
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();

    // Header
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    // Fanout table
    let mut fanout = [0u32; 256];
    for (oid, _, _) in entries.iter() {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }

    // OIDs
    for (oid, _, _) in entries.iter() {
        buf.extend_from_slice(oid.as_bytes());
    }

    // CRC32
    for (_, _, crc) in entries.iter() {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    // Offsets — check if we need 64-bit table
    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            let idx = large_offsets.len() as u32;
            buf.extend_from_slice(&(0x8000_0000u32 | idx).to_be_bytes());
            large_offsets.push(*offset);
        } else {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }

    // 64-bit offset table
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    // Pack checksum
    buf.extend_from_slice(pack_checksum.as_bytes());

    // Index checksum
    let idx_checksum = Hasher::digest(&buf);
    buf.extend_from_slice(idx_checksum.as_bytes());

    let idx_path = idx_path.to_path_buf();
    std::fs::write(&idx_path, &buf)?;

    Ok(idx_path)
}

/// Convenience function: create a pack and its index from a set of objects.
///
/// Returns `(pack_path, idx_path, checksum)`.
pub fn create_pack(
    dir: &Path,
    name: &str,
    objects: &[(ObjectType, Vec<u8>)],
) -> Result<(PathBuf, PathBuf, Oid), PackError> {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));

    let mut writer = PackWriter::new(&pack_path)?;
    for (obj_type, data) in objects {
        writer.add_object(*obj_type, data)?;
    }

    // Collect entries before finishing
    let mut entries: Vec<(Oid, u64, u32)> = writer
        .entries()
        .map(|(oid, off, crc)| (*oid, off, crc))
        .collect();

    let (pack_path, checksum) = writer.finish()?;

    build_pack_index(&idx_path, &mut entries, &checksum)?;

    Ok((pack_path, idx_path, checksum))
}

/// Validate a pack stream's header and return its declared object count.
fn validate_pack_header(data: &[u8]) -> Result<u32, PackError> {
    if data.len() < PACK_HEADER_SIZE {
        return Err(PackError::InvalidHeader("stream too short".into()));
    }
    if &data[0..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("bad PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    Ok(u32::from_be_bytes([data[8], data[9], data[10], data[11]]))
}

/// Decompress a zlib stream embedded at the start of `compressed`, returning
/// the decompressed bytes and the number of input bytes the stream occupied
/// (needed to find the next entry header when scanning a pack sequentially,
/// since entries carry no explicit compressed-length field).
fn decompress_tracked(compressed: &[u8], expected_size: usize) -> Result<(Vec<u8>, usize), PackError> {
    let mut inflater = Decompress::new(true);
    let mut output = vec![0u8; expected_size.max(16)];

    loop {
        let out_pos = inflater.total_out() as usize;
        if out_pos == output.len() {
            output.resize(output.len() * 2, 0);
        }
        let status = inflater
            .decompress(&compressed[inflater.total_in() as usize..], &mut output[out_pos..], FlushDecompress::None)
            .map_err(|_| PackError::InvalidDelta {
                offset: 0,
                reason: "zlib stream corrupt".into(),
            })?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if inflater.total_in() as usize >= compressed.len() {
                    return Err(PackError::InvalidDelta {
                        offset: 0,
                        reason: "truncated zlib stream".into(),
                    });
                }
            }
        }
    }

    let consumed = inflater.total_in() as usize;
    let produced = inflater.total_out() as usize;
    output.truncate(produced);
    Ok((output, consumed))
}

/// Sink a decoded object is stored to. Implemented over a loose object store
/// by callers (typically `git-odb`) without `git-pack` depending on it directly.
pub trait LooseSink {
    fn store(&mut self, obj_type: ObjectType, data: &[u8]) -> Result<Oid, PackError>;
}

/// `transfer.unpackLimit`: packs at or below this many objects are unpacked
/// into loose objects rather than kept as a single indexed pack.
pub const DEFAULT_UNPACK_LIMIT: usize = 100;

/// Expands every object in a small incoming pack stream and stores each one
/// loosely, resolving deltas inline against objects already seen earlier in
/// the same stream.
pub struct Unpacker;

impl Unpacker {
    /// Unpack a complete in-memory pack stream (header through trailer).
    /// Returns the number of objects unpacked.
    pub fn unpack(data: &[u8], sink: &mut dyn LooseSink) -> Result<usize, PackError> {
        let num_objects = validate_pack_header(data)?;

        let mut pos = PACK_HEADER_SIZE;
        let mut by_offset: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
        let mut by_oid: HashMap<Oid, (ObjectType, Vec<u8>)> = HashMap::new();

        for _ in 0..num_objects {
            let entry_offset = pos as u64;
            let entry = parse_entry_header(&data[pos..], entry_offset)?;
            let compressed = &data[entry.data_offset as usize..];
            let (raw, consumed) = decompress_tracked(compressed, entry.uncompressed_size)?;

            let (obj_type, resolved) = match entry.entry_type {
                PackEntryType::Commit | PackEntryType::Tree | PackEntryType::Blob => (
                    entry.entry_type.to_object_type().expect("non-delta type"),
                    raw,
                ),
                PackEntryType::OfsDelta { base_offset } => {
                    let (base_type, base_data) = by_offset
                        .get(&base_offset)
                        .ok_or(PackError::MissingBase(Oid::NULL))?;
                    (*base_type, crate::delta::apply::apply_delta(base_data, &raw)?)
                }
                PackEntryType::RefDelta { base_oid } => {
                    let (base_type, base_data) = by_oid
                        .get(&base_oid)
                        .ok_or(PackError::MissingBase(base_oid))?;
                    (*base_type, crate::delta::apply::apply_delta(base_data, &raw)?)
                }
            };

            let oid = sink.store(obj_type, &resolved)?;
            by_offset.insert(entry_offset, (obj_type, resolved.clone()));
            by_oid.insert(oid, (obj_type, resolved));

            pos = entry.data_offset as usize + consumed;
        }

        Ok(num_objects as usize)
    }
}

/// An entry recorded while indexing a large incoming pack, pending delta
/// resolution if its base hadn't been seen yet.
struct PendingEntry {
    offset: u64,
    crc32: u32,
    entry_type: PackEntryType,
    data_offset: usize,
    uncompressed_size: usize,
}

/// Writes a large incoming pack stream verbatim to disk and builds its
/// `.idx` alongside it. Delta entries whose base appears later in the
/// stream are resolved in a second pass once every object's OID is known.
pub struct Indexer;

impl Indexer {
    /// Write `data` to `pack_path` and build `idx_path` for it.
    pub fn index(
        data: &[u8],
        pack_path: &Path,
        idx_path: &Path,
    ) -> Result<Oid, PackError> {
        std::fs::write(pack_path, data)?;

        let num_objects = validate_pack_header(data)?;
        let pack_checksum_bytes = &data[data.len() - Oid::LEN..];
        let pack_checksum = Oid::from_slice(pack_checksum_bytes)
            .map_err(|_| PackError::InvalidHeader("bad trailing checksum".into()))?;

        let mut pending = Vec::with_capacity(num_objects as usize);
        let mut pos = PACK_HEADER_SIZE;
        for _ in 0..num_objects {
            let entry_offset = pos as u64;
            let entry = parse_entry_header(&data[pos..], entry_offset)?;
            let compressed = &data[entry.data_offset as usize..];
            let (_, consumed) = decompress_tracked(compressed, entry.uncompressed_size)?;

            let mut crc = crc32fast::Hasher::new();
            crc.update(&data[pos..entry.data_offset as usize + consumed]);

            pending.push(PendingEntry {
                offset: entry_offset,
                crc32: crc.finalize(),
                entry_type: entry.entry_type,
                data_offset: entry.data_offset as usize,
                uncompressed_size: entry.uncompressed_size,
            });

            pos = entry.data_offset as usize + consumed;
        }

        // Two-phase delta resolution: resolve every non-delta entry first,
        // then repeatedly sweep the remaining deltas until none can make
        // progress (their base appeared later in the stream but has since
        // been resolved by this sweep).
        let mut resolved_by_offset: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
        let mut resolved_oid_by_offset: HashMap<u64, Oid> = HashMap::new();
        let mut resolved_by_oid: HashMap<Oid, (ObjectType, Vec<u8>)> = HashMap::new();
        let mut unresolved: Vec<usize> = (0..pending.len()).collect();

        loop {
            let mut progressed = false;
            let mut still_unresolved = Vec::new();

            for idx in unresolved {
                let entry = &pending[idx];
                let base = match entry.entry_type {
                    PackEntryType::Commit | PackEntryType::Tree | PackEntryType::Blob => {
                        Some((
                            entry.entry_type.to_object_type().expect("non-delta type"),
                            Vec::new(),
                        ))
                    }
                    PackEntryType::OfsDelta { base_offset } => {
                        resolved_by_offset.get(&base_offset).cloned()
                    }
                    PackEntryType::RefDelta { base_oid } => {
                        resolved_by_oid.get(&base_oid).cloned()
                    }
                };

                let Some((base_type, base_data)) = base else {
                    still_unresolved.push(idx);
                    continue;
                };

                let compressed = &data[entry.data_offset..];
                let (raw, _) = decompress_tracked(compressed, entry.uncompressed_size)?;
                let content = match entry.entry_type {
                    PackEntryType::Commit | PackEntryType::Tree | PackEntryType::Blob => raw,
                    _ => crate::delta::apply::apply_delta(&base_data, &raw)?,
                };

                let oid = Hasher::hash_object(
                    std::str::from_utf8(base_type.as_bytes()).unwrap(),
                    &content,
                );
                resolved_oid_by_offset.insert(entry.offset, oid);
                resolved_by_offset.insert(entry.offset, (base_type, content.clone()));
                resolved_by_oid.insert(oid, (base_type, content));
                progressed = true;
            }

            unresolved = still_unresolved;
            if unresolved.is_empty() || !progressed {
                break;
            }
        }

        if !unresolved.is_empty() {
            return Err(PackError::MissingBase(Oid::NULL));
        }

        let mut idx_entries: Vec<(Oid, u64, u32)> = pending
            .iter()
            .map(|e| {
                (
                    *resolved_oid_by_offset.get(&e.offset).expect("resolved above"),
                    e.offset,
                    e.crc32,
                )
            })
            .collect();

        build_pack_index(idx_path, &mut idx_entries, &pack_checksum)?;
        Ok(pack_checksum)
    }
}
