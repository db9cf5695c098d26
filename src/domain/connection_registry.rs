//! Membership set of live broadcast connections.
//!
//! [`ConnectionRegistry`] is mutated by every connection session (add on
//! open, remove on close) and by the broadcast loop (remove on failed
//! delivery). Readers take a point-in-time [`ConnectionRegistry::snapshot`]
//! and iterate it without holding the lock.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{ConnectionHandle, ConnectionId};

/// Set of live connection handles keyed by [`ConnectionId`].
///
/// # Concurrency
///
/// - `add`/`remove` take the write lock for a single map operation.
/// - `snapshot` clones the handles under the read lock, so a broadcast can
///   iterate while sessions register and deregister concurrently.
/// - A removed handle may still appear in a snapshot taken just before the
///   removal; delivering to it is harmless and at worst fails.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle. Returns `false` if it was already present.
    pub async fn add(&self, handle: ConnectionHandle) -> bool {
        let mut map = self.connections.write().await;
        if map.contains_key(&handle.id()) {
            return false;
        }
        map.insert(handle.id(), handle);
        true
    }

    /// Deregisters a handle. Returns `false` if it was not present.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.connections.write().await.remove(&id).is_some()
    }

    /// Deregisters every handle in `ids` under a single lock acquisition.
    ///
    /// Returns the number of handles actually removed.
    pub async fn remove_all(&self, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut map = self.connections.write().await;
        ids.iter().filter(|id| map.remove(*id).is_some()).count()
    }

    /// Returns a point-in-time copy of all registered handles.
    pub async fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Returns `true` if the handle with the given ID is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Returns the number of registered handles.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no handles are registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Drops every registered handle.
    pub async fn clear(&self) {
        self.connections.write().await.clear();
    }
}
