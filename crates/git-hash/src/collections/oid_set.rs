use std::collections::HashSet;

use crate::Oid;

/// Hash set of Oids.
pub struct OidSet {
    inner: HashSet<Oid>,
}

impl OidSet {
    pub fn new() -> Self {
        Self {
            inner: HashSet::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: HashSet::with_capacity(cap),
        }
    }

    /// Insert an OID. Returns `true` if the OID was newly inserted.
    pub fn insert(&mut self, oid: Oid) -> bool {
        self.inner.insert(oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.inner.contains(oid)
    }

    pub fn remove(&mut self, oid: &Oid) -> bool {
        self.inner.remove(oid)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Oid> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear()
    }
}

impl Default for OidSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Oid> for OidSet {
    fn from_iter<I: IntoIterator<Item = Oid>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
