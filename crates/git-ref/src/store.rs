use std::collections::HashMap;

use git_hash::Oid;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// Trait for pluggable reference storage backends.
///
/// The default implementation is `FilesRefStore` (loose refs + packed-refs).
pub trait RefStore: Send + Sync {
    /// Read a ref by name. Returns `None` if it does not exist.
    fn read(&self, name: &RefName) -> Result<Option<Reference>, RefError>;

    /// Unconditionally point `name` at `new_target`, creating it if absent.
    fn update(&self, name: &RefName, new_target: Oid) -> Result<(), RefError>;

    /// Point `name` at `new_target`, but only if its current value matches
    /// `old_target` (`None` means the ref must not currently exist).
    fn compare_and_swap(
        &self,
        name: &RefName,
        old_target: Option<Oid>,
        new_target: Oid,
    ) -> Result<(), RefError>;

    /// Create `refs/heads/<short_name>`, failing if it already exists.
    fn create_branch(&self, short_name: &str, target: Oid) -> Result<(), RefError>;

    /// Delete `refs/heads/<short_name>`.
    fn delete_branch(&self, short_name: &str) -> Result<(), RefError>;

    /// Read `HEAD` (direct if detached, symbolic otherwise).
    fn current_ref(&self) -> Result<Reference, RefError>;

    /// List refs under an optional prefix, sorted by full ref name.
    fn list_refs(
        &self,
        prefix: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<Reference, RefError>> + '_>, RefError>;

    /// Group every direct ref by the object it points at.
    fn reverse_map(&self) -> Result<HashMap<Oid, Vec<RefName>>, RefError> {
        let mut map: HashMap<Oid, Vec<RefName>> = HashMap::new();
        for r in self.list_refs(None)? {
            if let Reference::Direct { name, target } = r? {
                map.entry(target).or_default().push(name);
            }
        }
        Ok(map)
    }

    /// The display form of a ref name with its category prefix stripped
    /// (`refs/heads/main` -> `main`).
    fn short_name(&self, name: &RefName) -> String {
        name.short_name().to_string()
    }
}

/// Atomic batch of ref updates.
///
/// Collects multiple ref updates and applies them atomically:
/// all succeed or all fail.
pub struct RefTransaction {
    pub(crate) updates: Vec<RefUpdate>,
}

/// A single update within a transaction.
pub struct RefUpdate {
    pub name: RefName,
    pub action: RefUpdateAction,
}

/// The action to perform on a ref within a transaction.
pub enum RefUpdateAction {
    /// Create a new ref (fails if it already exists).
    Create { new_target: Oid },
    /// Update an existing ref with compare-and-swap check.
    Update { old_target: Oid, new_target: Oid },
    /// Delete a ref with compare-and-swap check.
    Delete { old_target: Oid },
    /// Set a symbolic ref to point to another ref.
    SetSymbolic { target: RefName },
}

impl RefTransaction {
    /// Create a new empty transaction.
    pub fn new() -> Self {
        Self {
            updates: Vec::new(),
        }
    }

    /// Add an update (CAS) operation to the transaction.
    pub fn update(&mut self, name: RefName, old: Oid, new: Oid) {
        self.updates.push(RefUpdate {
            name,
            action: RefUpdateAction::Update {
                old_target: old,
                new_target: new,
            },
        });
    }

    /// Add a create operation to the transaction.
    pub fn create(&mut self, name: RefName, target: Oid) {
        self.updates.push(RefUpdate {
            name,
            action: RefUpdateAction::Create { new_target: target },
        });
    }

    /// Add a delete operation to the transaction.
    pub fn delete(&mut self, name: RefName, old: Oid) {
        self.updates.push(RefUpdate {
            name,
            action: RefUpdateAction::Delete { old_target: old },
        });
    }

    /// Add a set-symbolic operation to the transaction.
    pub fn set_symbolic(&mut self, name: RefName, target: RefName) {
        self.updates.push(RefUpdate {
            name,
            action: RefUpdateAction::SetSymbolic { target },
        });
    }

    /// Get the list of updates in this transaction.
    pub fn updates(&self) -> &[RefUpdate] {
        &self.updates
    }

    /// Check if the transaction is empty.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

impl Default for RefTransaction {
    fn default() -> Self {
        Self::new()
    }
}
