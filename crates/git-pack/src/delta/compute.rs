//! Compute deltas between objects.
//!
//! A simplified version of git's diff-delta algorithm. The encoder builds a
//! hash table of fixed-size (`W`-byte) blocks from the source, then scans
//! the target looking for matching blocks. A hit is extended both forward
//! and backward across the match boundary before being emitted as a copy
//! instruction; everything else becomes insert instructions.

use std::collections::HashMap;

use super::{encode_copy, encode_insert, write_varint};

/// Block size for the hash index (the "W" window named alongside this
/// algorithm): large enough to keep false-positive collisions rare, small
/// enough to find matches in short, heavily-edited objects.
const BLOCK_SIZE: usize = 8;

/// How many source occurrences of a block hash to remember; extra
/// occurrences past this are not indexed; first fit still usually finds the
/// best match in practice for git-sized objects.
const MAX_CANDIDATES_PER_BLOCK: usize = 8;

/// Compute a delta that transforms `source` into `target`.
///
/// Returns the raw delta byte stream that can be applied with `apply_delta`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();

    delta.extend_from_slice(&write_varint(source.len()));
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    let index = build_block_index(source);

    let mut tpos = 0;
    let mut pending_insert: Vec<u8> = Vec::new();

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        if remaining >= BLOCK_SIZE {
            let block = &target[tpos..tpos + BLOCK_SIZE];
            if let Some(candidates) = index.get(block) {
                if let Some((src_offset, match_start, match_len)) =
                    best_match(source, candidates, target, tpos, pending_insert.len())
                {
                    // Un-pend any insert bytes now covered by the backward extension.
                    pending_insert.truncate(pending_insert.len() - (tpos - match_start));
                    flush_insert(&mut delta, &mut pending_insert);

                    emit_copy(&mut delta, src_offset, match_len);
                    tpos = match_start + match_len;
                    continue;
                }
            }
        }

        pending_insert.push(target[tpos]);
        tpos += 1;

        if pending_insert.len() == 127 {
            flush_insert(&mut delta, &mut pending_insert);
        }
    }

    flush_insert(&mut delta, &mut pending_insert);

    delta
}

/// Build a hash map from `BLOCK_SIZE` chunks of source to their offsets,
/// keeping up to `MAX_CANDIDATES_PER_BLOCK` occurrences per distinct block.
fn build_block_index(source: &[u8]) -> HashMap<&[u8], Vec<usize>> {
    let mut index: HashMap<&[u8], Vec<usize>> = HashMap::new();
    if source.len() < BLOCK_SIZE {
        return index;
    }
    for offset in 0..=source.len() - BLOCK_SIZE {
        let block = &source[offset..offset + BLOCK_SIZE];
        let slots = index.entry(block).or_default();
        if slots.len() < MAX_CANDIDATES_PER_BLOCK {
            slots.push(offset);
        }
    }
    index
}

/// Among the candidate source offsets for a block hit at `tgt_off`, pick the
/// one whose match (after forward and backward extension) is longest.
/// Returns `(source_offset, target_match_start, match_len)`.
fn best_match(
    source: &[u8],
    candidates: &[usize],
    target: &[u8],
    tgt_off: usize,
    insert_backlog: usize,
) -> Option<(usize, usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;

    for &src_off in candidates {
        let back = backward_extent(source, src_off, target, tgt_off).min(insert_backlog);
        let fwd = forward_extent(source, src_off + BLOCK_SIZE, target, tgt_off + BLOCK_SIZE);
        let len = back + BLOCK_SIZE + fwd;
        let match_start = tgt_off - back;
        let resolved_src_off = src_off - back;

        if best.map(|(_, _, best_len)| len > best_len).unwrap_or(true) {
            best = Some((resolved_src_off, match_start, len));
        }
    }

    best
}

fn forward_extent(source: &[u8], mut src: usize, target: &[u8], mut tgt: usize) -> usize {
    let mut len = 0;
    while src < source.len() && tgt < target.len() && source[src] == target[tgt] {
        src += 1;
        tgt += 1;
        len += 1;
    }
    len
}

fn backward_extent(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let mut len = 0;
    while len < src_off
        && len < tgt_off
        && source[src_off - len - 1] == target[tgt_off - len - 1]
    {
        len += 1;
    }
    len
}

/// Flush pending insert bytes as one or more insert instructions.
fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    while !pending.is_empty() {
        let chunk_len = std::cmp::min(pending.len(), 127);
        let chunk: Vec<u8> = pending.drain(..chunk_len).collect();
        delta.extend_from_slice(&encode_insert(&chunk));
    }
}

/// Emit a copy instruction, splitting into multiple if needed (max copy size = 0xffffff).
fn emit_copy(delta: &mut Vec<u8>, offset: usize, mut size: usize) {
    let mut off = offset;
    while size > 0 {
        let chunk = std::cmp::min(size, 0x00ff_ffff); // max 24-bit size
        delta.extend_from_slice(&encode_copy(off as u64, chunk));
        off += chunk;
        size -= chunk;
    }
}
