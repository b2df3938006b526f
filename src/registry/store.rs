//! Ordered registry implementation
//!
//! Insertion-ordered id → entity maps owned by the session controller.
//! They are only mutated on the session context, so there is no locking
//! here; anything handed to outside readers is an immutable [`Snapshot`].

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use super::entry::{Connection, Stream};
use super::error::RegistryError;
use super::id::{ConnectionId, StreamId};

/// An entity that can live in an [`OrderedRegistry`]
pub trait RegistryEntry: Clone {
    type Id: Clone + Eq + Hash + Display + Debug;

    /// Name used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;
}

impl RegistryEntry for Connection {
    type Id = ConnectionId;
    const KIND: &'static str = "connection";

    fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl RegistryEntry for Stream {
    type Id = StreamId;
    const KIND: &'static str = "stream";

    fn id(&self) -> &StreamId {
        &self.id
    }
}

/// Insertion-ordered registry of live entities
#[derive(Debug, Clone)]
pub struct OrderedRegistry<E: RegistryEntry> {
    entries: IndexMap<E::Id, E>,
}

/// Registry of connections in a session
pub type ConnectionRegistry = OrderedRegistry<Connection>;

/// Registry of streams in a session
pub type StreamRegistry = OrderedRegistry<Stream>;

impl<E: RegistryEntry> OrderedRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Insert an entity.
    ///
    /// Returns `false` (and leaves the existing entry and its position
    /// untouched) if the id is already live, so a duplicate creation event
    /// is harmless.
    pub fn insert(&mut self, entry: E) -> bool {
        let id = entry.id().clone();
        if self.entries.contains_key(&id) {
            tracing::debug!(kind = E::KIND, id = %id, "Duplicate insert ignored");
            return false;
        }

        self.entries.insert(id.clone(), entry);
        tracing::debug!(kind = E::KIND, id = %id, total = self.entries.len(), "Registered");
        true
    }

    /// Remove an entity, preserving the order of the remaining ones.
    ///
    /// Removing an id that is not live returns `None`.
    pub fn remove(&mut self, id: &E::Id) -> Option<E> {
        let removed = self.entries.shift_remove(id);
        if removed.is_some() {
            tracing::debug!(kind = E::KIND, id = %id, total = self.entries.len(), "Unregistered");
        }
        removed
    }

    /// Remove every entity matching `predicate`, returning them in insertion order
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> Vec<E> {
        let ids: Vec<E::Id> = self
            .entries
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.id().clone())
            .collect();

        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn get(&self, id: &E::Id) -> Result<&E, RegistryError> {
        self.entries
            .get(id)
            .ok_or_else(|| RegistryError::not_found(E::KIND, id))
    }

    pub fn get_mut(&mut self, id: &E::Id) -> Result<&mut E, RegistryError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::not_found(E::KIND, id))
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    /// Remove everything, returning the entities in insertion order
    pub fn clear(&mut self) -> Vec<E> {
        let drained: Vec<E> = self.entries.drain(..).map(|(_, e)| e).collect();
        if !drained.is_empty() {
            tracing::debug!(kind = E::KIND, removed = drained.len(), "Registry cleared");
        }
        drained
    }

    /// Immutable copy for external readers
    pub fn snapshot(&self) -> Snapshot<E> {
        Snapshot {
            entries: Arc::new(self.entries.clone()),
        }
    }
}

impl<E: RegistryEntry> Default for OrderedRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a registry
///
/// Cheap to clone and safe to read from any thread; it never changes after
/// it is taken.
#[derive(Debug, Clone)]
pub struct Snapshot<E: RegistryEntry> {
    entries: Arc<IndexMap<E::Id, E>>,
}

impl<E: RegistryEntry> Snapshot<E> {
    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &E::Id> {
        self.entries.keys()
    }
}
