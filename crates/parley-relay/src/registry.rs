//! Session registry — the live mapping from participant name to transport
//! endpoint.
//!
//! One live session per name, enforced at registration. The registry is
//! the sole source of roster broadcasts: `list()` always reflects the
//! table as it is right now.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The name already has a live session. The existing holder is never
    /// disturbed; the rejected caller must inform the requester.
    #[error("name {0:?} is already registered")]
    NameTaken(String),
}

/// Shared name → endpoint table. Cheap to clone; all clones see the same
/// entries. Safe for concurrent use from every connection task.
pub struct Registry<E> {
    entries: Arc<DashMap<String, E>>,
}

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<E: Clone> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name. Case-sensitive exact match; a taken name is rejected
    /// without touching the existing entry.
    pub fn register(&self, name: &str, endpoint: E) -> Result<(), RegistryError> {
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::NameTaken(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Ok(())
            }
        }
    }

    /// Replace an entry unconditionally. Used for same-address datagram
    /// re-announcements, where the name holder is refreshing itself.
    pub fn replace(&self, name: &str, endpoint: E) {
        self.entries.insert(name.to_string(), endpoint);
    }

    /// Release a name. Idempotent — unregistering an absent name is a
    /// no-op. Returns the endpoint that was removed, if any.
    pub fn unregister(&self, name: &str) -> Option<E> {
        self.entries.remove(name).map(|(_, endpoint)| endpoint)
    }

    pub fn lookup(&self, name: &str) -> Option<E> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Sorted names of every live session.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every (name, endpoint) pair. Taken eagerly so callers
    /// never hold table locks across await points.
    pub fn snapshot(&self) -> Vec<(String, E)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
