//! Alternates file parsing and recursive loading.
//!
//! The file `.git/objects/info/alternates` contains one path per line,
//! pointing to other object directories. Each alternate is itself an
//! object store that may have its own alternates file (forming a chain).
//! Circular chains are detected and rejected.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{ObjectDatabase, OdbError};

/// Maximum depth for recursive alternates loading (matches C git).
const MAX_ALTERNATES_DEPTH: usize = 5;

/// Load alternates for the given objects directory.
///
/// Returns a list of ObjectDatabase instances, one per alternate.
pub fn load_alternates(objects_dir: &Path) -> Result<Vec<ObjectDatabase>, OdbError> {
    let mut visited = HashSet::new();
    let canonical = objects_dir
        .canonicalize()
        .unwrap_or_else(|_| objects_dir.to_path_buf());
    visited.insert(canonical);
    load_alternates_recursive(objects_dir, &mut visited, 0)
}

/// Recursively load alternates, tracking visited paths to detect cycles.
fn load_alternates_recursive(
    objects_dir: &Path,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<Vec<ObjectDatabase>, OdbError> {
    if depth >= MAX_ALTERNATES_DEPTH {
        return Err(OdbError::Alternates(format!(
            "alternates chain too deep (>{MAX_ALTERNATES_DEPTH} levels)"
        )));
    }

    let alternates_path = objects_dir.join("info").join("alternates");
    if !alternates_path.is_file() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&alternates_path).map_err(|e| {
        OdbError::Alternates(format!(
            "failed to read {}: {}",
            alternates_path.display(),
            e
        ))
    })?;

    let mut result = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Resolve relative paths (relative to the objects directory)
        let alt_path = if Path::new(line).is_absolute() {
            PathBuf::from(line)
        } else {
            objects_dir.join(line)
        };

        // Skip non-existent directories
        if !alt_path.is_dir() {
            continue;
        }

        // Canonicalize for cycle detection
        let canonical = alt_path.canonicalize().unwrap_or_else(|_| alt_path.clone());

        // Detect circular alternates
        if !visited.insert(canonical.clone()) {
            return Err(OdbError::CircularAlternates(alt_path));
        }

        // Open the alternate's loose store and packs
        let loose = git_loose::LooseObjectStore::open(&alt_path);
        let packs = ObjectDatabase::discover_packs(&alt_path)?;

        // Recursively load this alternate's alternates
        let nested_alternates = load_alternates_recursive(&alt_path, visited, depth + 1)?;

        result.push(ObjectDatabase::from_parts(
            loose,
            packs,
            nested_alternates,
            alt_path,
        ));
    }

    Ok(result)
}

/// Parse an alternates file and return the raw paths (for testing).
pub fn parse_alternates_file(path: &Path) -> Result<Vec<PathBuf>, OdbError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| OdbError::Alternates(format!("failed to read {}: {}", path.display(), e)))?;

    let base_dir = path.parent().and_then(|p| p.parent()).unwrap_or(path);

    Ok(content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            if Path::new(l).is_absolute() {
                PathBuf::from(l)
            } else {
                base_dir.join(l)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_alternates_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let alts = load_alternates(dir.path()).unwrap();
        assert!(alts.is_empty());
    }

    #[test]
    fn parses_alternates_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let info_dir = dir.path().join("info");
        fs::create_dir_all(&info_dir).unwrap();
        fs::write(info_dir.join("alternates"), "/some/other/objects\n# comment\n").unwrap();

        let paths = parse_alternates_file(&info_dir.join("alternates")).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/some/other/objects")]);
    }

    #[test]
    fn loads_existing_alternate_directory() {
        let dir = tempfile::tempdir().unwrap();
        let alt_dir = dir.path().join("alt-objects");
        fs::create_dir_all(&alt_dir).unwrap();

        let info_dir = dir.path().join("info");
        fs::create_dir_all(&info_dir).unwrap();
        fs::write(
            info_dir.join("alternates"),
            alt_dir.to_str().unwrap().to_owned() + "\n",
        )
        .unwrap();

        let alts = load_alternates(dir.path()).unwrap();
        assert_eq!(alts.len(), 1);
    }
}
