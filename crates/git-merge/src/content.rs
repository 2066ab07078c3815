//! Blob three-way merge.
//!
//! Absence shortcuts handle modify/delete; identity shortcuts handle the
//! common case where only one side touched the file. Otherwise a Myers diff
//! from base to each side is split into change regions and interleaved,
//! emitting conflict markers for overlapping regions.

use git_diff::algorithm::{diff_edits, split_lines, Edit, EditOp};
use git_diff::DiffAlgorithm;

/// Labels used in conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'a> {
    pub ours: &'a str,
    pub theirs: &'a str,
}

impl Default for MergeLabels<'_> {
    fn default() -> Self {
        Self { ours: "ours", theirs: "theirs" }
    }
}

/// Three-way merge of a single blob's content.
///
/// `left`/`right` absence means that side deleted the file (already
/// established to be a real change, not simply "unchanged since base" —
/// callers filter that case out before reaching here). Returns `(true,
/// merged)` when the merge is clean, `(false, content)` otherwise —
/// `content` in the unclean case is still the best value to stage (the
/// surviving side on a modify/delete conflict, or marker-interleaved text
/// on a content conflict).
pub fn merge3(
    base: Option<&[u8]>,
    left: Option<&[u8]>,
    right: Option<&[u8]>,
    algorithm: DiffAlgorithm,
    labels: MergeLabels<'_>,
) -> (bool, Vec<u8>) {
    let (left, right) = match (left, right) {
        (None, Some(right)) => return (false, right.to_vec()),
        (Some(left), None) => return (false, left.to_vec()),
        (None, None) => return (true, Vec::new()),
        (Some(l), Some(r)) => (l, r),
    };
    let base = base.unwrap_or(&[]);

    if left == base || left == right {
        return (true, right.to_vec());
    }
    if right == base {
        return (true, left.to_vec());
    }

    let base_lines = split_lines(base);
    let left_lines = split_lines(left);
    let right_lines = split_lines(right);

    let edits_left = diff_edits(base, left, algorithm);
    let edits_right = diff_edits(base, right, algorithm);

    let hunks_left = collect_change_regions(&edits_left);
    let hunks_right = collect_change_regions(&edits_right);

    merge_regions(&base_lines, &left_lines, &right_lines, &hunks_left, &hunks_right, labels)
}

/// A contiguous region of changes relative to the base.
#[derive(Debug, Clone)]
struct ChangeRegion {
    base_start: usize,
    base_len: usize,
    new_start: usize,
    new_len: usize,
}

fn collect_change_regions(edits: &[Edit]) -> Vec<ChangeRegion> {
    let mut regions = Vec::new();
    let mut i = 0;

    while i < edits.len() {
        if edits[i].op == EditOp::Equal {
            i += 1;
            continue;
        }

        let base_start = edits[i].old_index;
        let new_start = edits[i].new_index;
        let mut base_end = base_start;
        let mut new_end = new_start;

        while i < edits.len() && edits[i].op != EditOp::Equal {
            match edits[i].op {
                EditOp::Delete => base_end = edits[i].old_index + 1,
                EditOp::Insert => new_end = edits[i].new_index + 1,
                EditOp::Equal => unreachable!(),
            }
            i += 1;
        }

        regions.push(ChangeRegion {
            base_start,
            base_len: base_end - base_start,
            new_start,
            new_len: new_end - new_start,
        });
    }

    regions
}

fn merge_regions(
    base_lines: &[&[u8]],
    left_lines: &[&[u8]],
    right_lines: &[&[u8]],
    hunks_left: &[ChangeRegion],
    hunks_right: &[ChangeRegion],
    labels: MergeLabels<'_>,
) -> (bool, Vec<u8>) {
    let mut output: Vec<u8> = Vec::new();
    let mut conflicts = 0;

    let mut base_pos = 0;
    let mut li = 0;
    let mut ri = 0;

    while li < hunks_left.len() || ri < hunks_right.len() {
        let l_region = hunks_left.get(li);
        let r_region = hunks_right.get(ri);

        match (l_region, r_region) {
            (Some(l), Some(r)) => {
                let l_end = l.base_start + l.base_len;
                let r_end = r.base_start + r.base_len;

                if l_end < r.base_start || (l_end == r.base_start && l.base_start < r.base_start) {
                    emit_base_lines(&mut output, base_lines, base_pos, l.base_start);
                    emit_lines(&mut output, left_lines, l.new_start, l.new_len);
                    base_pos = l_end;
                    li += 1;
                } else if r_end < l.base_start || (r_end == l.base_start && r.base_start < l.base_start) {
                    emit_base_lines(&mut output, base_lines, base_pos, r.base_start);
                    emit_lines(&mut output, right_lines, r.new_start, r.new_len);
                    base_pos = r_end;
                    ri += 1;
                } else {
                    let left_content = collect_lines(left_lines, l.new_start, l.new_len);
                    let right_content = collect_lines(right_lines, r.new_start, r.new_len);

                    let overlap_start = l.base_start.min(r.base_start);
                    let overlap_end = l_end.max(r_end);

                    emit_base_lines(&mut output, base_lines, base_pos, overlap_start);

                    if left_content == right_content {
                        output.extend_from_slice(&left_content);
                    } else {
                        conflicts += 1;
                        emit_conflict(&mut output, &left_content, &right_content, labels);
                    }

                    base_pos = overlap_end;
                    li += 1;
                    ri += 1;
                }
            }
            (Some(l), None) => {
                let l_end = l.base_start + l.base_len;
                emit_base_lines(&mut output, base_lines, base_pos, l.base_start);
                emit_lines(&mut output, left_lines, l.new_start, l.new_len);
                base_pos = l_end;
                li += 1;
            }
            (None, Some(r)) => {
                let r_end = r.base_start + r.base_len;
                emit_base_lines(&mut output, base_lines, base_pos, r.base_start);
                emit_lines(&mut output, right_lines, r.new_start, r.new_len);
                base_pos = r_end;
                ri += 1;
            }
            (None, None) => unreachable!(),
        }
    }

    emit_base_lines(&mut output, base_lines, base_pos, base_lines.len());

    (conflicts == 0, output)
}

fn emit_base_lines(output: &mut Vec<u8>, base_lines: &[&[u8]], from: usize, to: usize) {
    for i in from..to {
        if i < base_lines.len() {
            output.extend_from_slice(base_lines[i]);
            output.push(b'\n');
        }
    }
}

fn emit_lines(output: &mut Vec<u8>, lines: &[&[u8]], start: usize, count: usize) {
    for i in start..start + count {
        if i < lines.len() {
            output.extend_from_slice(lines[i]);
            output.push(b'\n');
        }
    }
}

fn collect_lines(lines: &[&[u8]], start: usize, count: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in start..start + count {
        if i < lines.len() {
            buf.extend_from_slice(lines[i]);
            buf.push(b'\n');
        }
    }
    buf
}

fn emit_conflict(output: &mut Vec<u8>, left_content: &[u8], right_content: &[u8], labels: MergeLabels<'_>) {
    output.extend_from_slice(b"<<<<<<< ");
    output.extend_from_slice(labels.ours.as_bytes());
    output.push(b'\n');
    output.extend_from_slice(left_content);
    output.extend_from_slice(b"=======\n");
    output.extend_from_slice(right_content);
    output.extend_from_slice(b">>>>>>> ");
    output.extend_from_slice(labels.theirs.as_bytes());
    output.push(b'\n');
}
