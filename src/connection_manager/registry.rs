use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::connection::Connection;
use super::stats::ConnectionStats;

/// Per-user connection list. Users rarely hold more than a few sessions.
type UserConnections = SmallVec<[Arc<Connection>; 4]>;

/// Dual index over live connections: by connection id and by user id
pub struct Registry {
    /// connection_id -> Connection
    connections: DashMap<String, Arc<Connection>>,
    /// user_id -> connections, in insertion order
    user_index: DashMap<String, UserConnections>,
    /// Serializes index mutation so both maps change inside one critical section
    index_lock: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            index_lock: Mutex::new(()),
        }
    }

    /// Register a connection in both indices
    pub fn insert(&self, connection: Arc<Connection>) {
        let _guard = self.index_lock.lock();

        if let Some(user_id) = connection.user_id() {
            self.user_index
                .entry(user_id.to_string())
                .or_default()
                .push(connection.clone());
        }
        self.connections
            .insert(connection.id().to_string(), connection);
    }

    /// Unregister a connection. Returns the removed entry, or `None` if it
    /// was already gone.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let _guard = self.index_lock.lock();

        let (_, connection) = self.connections.remove(connection_id)?;

        if let Some(user_id) = connection.user_id() {
            // Linear scan; per-user fan-out is small
            if let Some(mut user_conns) = self.user_index.get_mut(user_id) {
                user_conns.retain(|c| c.id() != connection_id);
                if user_conns.is_empty() {
                    drop(user_conns);
                    self.user_index.remove(user_id);
                }
            }
        }

        Some(connection)
    }

    /// Get connection by ID
    pub fn lookup(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Get all connections for a user. Never returns an empty list.
    pub fn lookup_user(&self, user_id: &str) -> Option<Vec<Arc<Connection>>> {
        self.user_index
            .get(user_id)
            .map(|conns| conns.iter().cloned().collect())
    }

    /// First alive connection of `user_id` carrying `app_tag`.
    /// Stale entries are skipped, not evicted.
    pub fn lookup_user_by_tag(&self, user_id: &str, app_tag: &str) -> Option<Arc<Connection>> {
        self.user_index.get(user_id).and_then(|conns| {
            conns
                .iter()
                .find(|c| c.is_alive() && c.app_tag() == Some(app_tag))
                .cloned()
        })
    }

    /// Snapshot of every registered connection
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let mut apps: HashMap<String, usize> = HashMap::new();
        let mut anonymous = 0;
        for entry in self.connections.iter() {
            let connection = entry.value();
            if let Some(tag) = connection.app_tag() {
                *apps.entry(tag.to_string()).or_default() += 1;
            }
            if connection.user_id().is_none() {
                anonymous += 1;
            }
        }

        ConnectionStats {
            total_connections: self.connections.len(),
            unique_users: self.user_index.len(),
            anonymous_connections: anonymous,
            apps,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
