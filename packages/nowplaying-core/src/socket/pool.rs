//! Registry of authenticated connections.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::connection::Connection;

/// Concurrent map of connection id to connection.
///
/// Only connections that completed INITIALIZE live here; broadcasts go to
/// exactly this set.
#[derive(Default)]
pub struct Pool {
    connections: DashMap<String, Arc<Connection>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns `false` and leaves the existing entry in
    /// place if the id is already registered.
    pub fn insert(&self, conn: Arc<Connection>) -> bool {
        match self.connections.entry(conn.id().to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Removes whatever connection is registered under `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Removes `conn` only if it is the registered instance for its id.
    ///
    /// A rejected duplicate shares its id with the registered connection and
    /// must not evict it when it goes away.
    pub fn remove_connection(&self, conn: &Arc<Connection>) -> bool {
        self.connections
            .remove_if(conn.id(), |_, registered| Arc::ptr_eq(registered, conn))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the registered connections.
    ///
    /// Collected up front so no shard lock is held while sending.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Removes and returns every registered connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.into_iter().filter_map(|id| self.remove(&id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::test_support::transport;

    fn conn(id: &str) -> Arc<Connection> {
        let (sink, stream, _client) = transport();
        Connection::with_id(id, sink, stream)
    }

    #[test]
    fn duplicate_ids_keep_the_first_entry() {
        let pool = Pool::new();
        let first = conn("a");
        let second = conn("a");

        assert!(pool.insert(Arc::clone(&first)));
        assert!(!pool.insert(Arc::clone(&second)));
        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&pool.get("a").unwrap(), &first));
    }

    #[test]
    fn removing_a_duplicate_leaves_the_original() {
        let pool = Pool::new();
        let first = conn("a");
        let second = conn("a");
        pool.insert(Arc::clone(&first));

        assert!(!pool.remove_connection(&second));
        assert!(pool.contains("a"));
        assert!(pool.remove_connection(&first));
        assert!(pool.is_empty());
    }

    #[test]
    fn drain_empties_the_pool() {
        let pool = Pool::new();
        for id in ["a", "b", "c"] {
            pool.insert(conn(id));
        }
        assert_eq!(pool.connections().len(), 3);
        assert_eq!(pool.drain().len(), 3);
        assert!(pool.is_empty());
    }
}
