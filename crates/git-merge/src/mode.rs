//! Mode three-way merge: the same absence/identity shortcuts as blob
//! content merge, but no line-level fallback — a genuine mode conflict has
//! no textual resolution, so the unclean case just reports a side to stage.

use git_object::FileMode;

/// Three-way merge of a single path's mode.
pub fn merge(base: Option<FileMode>, left: Option<FileMode>, right: Option<FileMode>) -> (bool, Option<FileMode>) {
    let (left, right) = match (left, right) {
        (None, right) => return (false, right),
        (Some(left), None) => return (false, Some(left)),
        (Some(left), Some(right)) => (left, right),
    };

    if Some(left) == base || left == right {
        return (true, Some(right));
    }
    if Some(right) == base {
        return (true, Some(left));
    }

    (false, Some(left))
}
