//! Triple-indexed entity registry.
//!
//! The same container is used for worlds-within-a-client and
//! models-within-a-world: entries are owned by the registry (keyed by their
//! never-reused local id, which doubles as a stable handle) and indexed two
//! further ways, by server id and by name. Back-references between entities
//! are plain [`LocalId`] handles into the owning registry, never pointers.
//!
//! The server-id index is allowed to be incomplete: entries that have not
//! been materialized yet (server id zero) are simply absent from it, and the
//! index is rebuilt entry-by-entry as creation replies arrive.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::ids::{LocalId, ServerId};

/// Error type for registry index maintenance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The given local id is not present in this registry.
    #[error("no entry with local id {0}")]
    UnknownLocal(LocalId),

    /// Attempted to index an entry under the reserved server id 0.
    #[error("cannot index local id {0} under server id 0")]
    UnassignedServerId(LocalId),
}

/// Implemented by everything a [`Registry`] can hold.
pub trait Registered {
    fn local_id(&self) -> LocalId;
    fn server_id(&self) -> ServerId;
    fn set_server_id(&mut self, id: ServerId);
    fn name(&self) -> &str;
}

/// Arena plus triple index over entries exposing local id, server id and
/// name. Lookup on an absent key returns `None`, never an error — callers
/// decide whether absence is fatal.
pub struct Registry<T: Registered> {
    entries: HashMap<LocalId, T>,
    /// Local ids in insertion order; drives creation-order iteration.
    order: Vec<LocalId>,
    by_server: HashMap<ServerId, LocalId>,
    by_name: HashMap<String, LocalId>,
}

impl<T: Registered> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            by_server: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Inserts an entry, indexing it by local id and by name.
    ///
    /// An existing entry under the same name is evicted entirely
    /// (last-registered wins), keeping the at-most-one-per-name invariant.
    /// The entry's server id is not indexed here; that happens later via
    /// [`bind_server_id`](Self::bind_server_id) once a real id is known.
    pub fn insert(&mut self, entry: T) -> LocalId {
        if let Some(&stale) = self.by_name.get(entry.name()) {
            self.remove(stale);
        }

        let local = entry.local_id();
        self.by_name.insert(entry.name().to_string(), local);
        self.order.push(local);
        self.entries.insert(local, entry);
        local
    }

    /// Installs a freshly-learned server id on an entry and (re)builds the
    /// server-id index for it, dropping any stale mapping under the entry's
    /// previous server id first.
    ///
    /// # Errors
    ///
    /// Fails if the local id is unknown or the server id is the reserved
    /// zero value.
    pub fn bind_server_id(&mut self, local: LocalId, server: ServerId) -> Result<(), RegistryError> {
        if !server.is_assigned() {
            return Err(RegistryError::UnassignedServerId(local));
        }
        let entry = self
            .entries
            .get_mut(&local)
            .ok_or(RegistryError::UnknownLocal(local))?;

        let old = entry.server_id();
        if old.is_assigned() {
            self.by_server.remove(&old);
        }
        entry.set_server_id(server);
        self.by_server.insert(server, local);
        Ok(())
    }

    pub fn get(&self, local: LocalId) -> Option<&T> {
        self.entries.get(&local)
    }

    pub fn get_mut(&mut self, local: LocalId) -> Option<&mut T> {
        self.entries.get_mut(&local)
    }

    /// Looks an entry up by server id. Never matches unmaterialized
    /// entries: the reserved zero id is not a valid key.
    pub fn lookup_by_server(&self, server: ServerId) -> Option<&T> {
        if !server.is_assigned() {
            return None;
        }
        self.by_server.get(&server).and_then(|l| self.entries.get(l))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).and_then(|l| self.entries.get(l))
    }

    /// Resolves a name to its handle without borrowing the entry.
    pub fn handle_by_name(&self, name: &str) -> Option<LocalId> {
        self.by_name.get(name).copied()
    }

    /// Resolves a server id to its handle without borrowing the entry.
    pub fn handle_by_server(&self, server: ServerId) -> Option<LocalId> {
        if !server.is_assigned() {
            return None;
        }
        self.by_server.get(&server).copied()
    }

    /// Removes an entry from all three indices and returns it.
    /// A no-op (returning `None`) when the local id is unknown; indices the
    /// entry was never in are tolerated.
    pub fn remove(&mut self, local: LocalId) -> Option<T> {
        let entry = self.entries.remove(&local)?;
        self.order.retain(|&l| l != local);
        if entry.server_id().is_assigned() {
            self.by_server.remove(&entry.server_id());
        }
        // Only drop the name mapping if it still points at this entry;
        // an eviction-by-name may already have repointed it.
        if self.by_name.get(entry.name()) == Some(&local) {
            self.by_name.remove(entry.name());
        }
        Some(entry)
    }

    /// Iterates entries in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|l| self.entries.get(l))
    }

    /// Local ids in creation order, detached from the registry borrow.
    pub fn local_ids(&self) -> Vec<LocalId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Registered> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
