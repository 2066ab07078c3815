//! Revision expression resolution: `R`, `^R`, `A..B`, and path filters.
//!
//! The grammar is deliberately small and parsed by hand rather than with a
//! regex: a leading `^` excludes, `..` splits an asymmetric range into an
//! exclude/include pair, and anything left that doesn't resolve to an
//! object is treated as a path added to the filter set.

use bstr::BString;
use git_hash::Oid;
use git_odb::ObjectDatabase;
use git_ref::{RefName, RefStore};

use crate::RevWalkError;

/// The inclusion roots, exclusion roots, and path filter parsed from a list
/// of revision expressions.
#[derive(Debug, Clone, Default)]
pub struct ParsedRevisions {
    pub include: Vec<Oid>,
    pub exclude: Vec<Oid>,
    pub paths: Vec<BString>,
}

/// Parse a list of revision expressions (`R`, `^R`, `A..B`, or a workspace
/// path). If the net result names no start points, `HEAD` is included.
pub fn parse_revision_list(
    odb: &ObjectDatabase,
    refs: &dyn RefStore,
    specs: &[&str],
) -> Result<ParsedRevisions, RevWalkError> {
    let mut out = ParsedRevisions::default();

    for spec in specs {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }

        if let Some(rest) = spec.strip_prefix('^') {
            out.exclude.push(resolve_revision(odb, refs, rest.trim())?);
            continue;
        }

        if let Some((a, b)) = spec.split_once("..") {
            match (resolve_revision(odb, refs, a.trim()), resolve_revision(odb, refs, b.trim())) {
                (Ok(from), Ok(to)) => {
                    out.exclude.push(from);
                    out.include.push(to);
                    continue;
                }
                _ => {
                    out.paths.push(BString::from(spec));
                    continue;
                }
            }
        }

        match resolve_revision(odb, refs, spec) {
            Ok(oid) => out.include.push(oid),
            Err(_) => out.paths.push(BString::from(spec)),
        }
    }

    if out.include.is_empty() && out.exclude.is_empty() {
        out.include.push(resolve_revision(odb, refs, "HEAD")?);
    }

    Ok(out)
}

/// Resolve a single revision expression to an object ID: a full or
/// unambiguous abbreviated hex OID, or a ref name (tried as given, then
/// under `refs/heads/` and `refs/remotes/`).
pub fn resolve_revision(odb: &ObjectDatabase, refs: &dyn RefStore, rev: &str) -> Result<Oid, RevWalkError> {
    let rev = rev.trim();
    if rev.is_empty() {
        return Err(RevWalkError::InvalidRevision("empty revision".into()));
    }

    if rev.len() == Oid::HEX_LEN && rev.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(oid) = Oid::from_hex(rev) {
            return Ok(oid);
        }
    }
    if rev.len() >= 4 && rev.len() < Oid::HEX_LEN && rev.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(oid) = odb.resolve_prefix(rev) {
            return Ok(oid);
        }
    }

    for candidate in ref_candidates(rev) {
        if let Some(name) = RefName::new(candidate.clone()).ok() {
            if let Some(oid) = resolve_ref(refs, &name)? {
                return Ok(oid);
            }
        }
    }

    Err(RevWalkError::InvalidRevision(format!("cannot resolve '{rev}'")))
}

fn ref_candidates(rev: &str) -> Vec<String> {
    if rev == "HEAD" {
        return vec!["HEAD".to_string()];
    }
    vec![
        rev.to_string(),
        format!("refs/heads/{rev}"),
        format!("refs/remotes/{rev}"),
        format!("refs/{rev}"),
    ]
}

fn resolve_ref(refs: &dyn RefStore, name: &RefName) -> Result<Option<Oid>, RevWalkError> {
    let reference = if name.as_str() == "HEAD" {
        Some(refs.current_ref()?)
    } else {
        refs.read(name)?
    };
    match reference {
        Some(r) => Ok(Some(r.peel_to_oid(refs)?)),
        None => Ok(None),
    }
}
