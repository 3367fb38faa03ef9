use crate::core::connection::Connection;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Live server-side connections keyed by id
///
/// Lookups and snapshots share a read lock and run concurrently; inserts and
/// removals take the write lock. Entries are whole `Arc<Connection>`s, so a
/// snapshot never sees a half-registered connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Arc<Connection>) {
        self.connections
            .write()
            .insert(connection.id().to_string(), connection);
    }

    /// Insert unless `limit` entries are already present (0 = unlimited)
    ///
    /// Check and insert happen under one write lock, so concurrent handshakes
    /// cannot overshoot the limit.
    pub fn insert_bounded(&self, connection: Arc<Connection>, limit: usize) -> bool {
        let mut connections = self.connections.write();
        if limit > 0 && connections.len() >= limit {
            return false;
        }
        connections.insert(connection.id().to_string(), connection);
        true
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Point-in-time copy of every entry, order unspecified
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::message::Message;
    use crate::transport::{FrameReader, FrameWriter, TransportParts};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Nothing;

    #[async_trait]
    impl FrameReader for Nothing {
        async fn next(&mut self) -> Option<Result<Message>> {
            None
        }
    }

    #[async_trait]
    impl FrameWriter for Nothing {
        async fn send(&mut self, _message: Message) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn connection() -> Arc<Connection> {
        let parts = TransportParts {
            reader: Box::new(Nothing),
            writer: Box::new(Nothing),
            remote_addr: "127.0.0.1:1".into(),
            user_agent: None,
        };
        Connection::establish(parts, false, Duration::from_secs(1), CancellationToken::new()).0
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = ConnectionRegistry::new();
        let conn = connection();
        let id = conn.id().to_string();

        registry.insert(Arc::clone(&conn));
        assert_eq!(registry.count(), 1);
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &conn));

        assert!(registry.remove(&id).is_some());
        // Second removal is a no-op
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_bounded() {
        let registry = ConnectionRegistry::new();
        assert!(registry.insert_bounded(connection(), 2));
        assert!(registry.insert_bounded(connection(), 2));
        assert!(!registry.insert_bounded(connection(), 2));
        assert_eq!(registry.count(), 2);

        let unlimited = ConnectionRegistry::new();
        for _ in 0..10 {
            assert!(unlimited.insert_bounded(connection(), 0));
        }
        assert_eq!(unlimited.count(), 10);
    }

    #[test]
    fn test_concurrent_insert_remove() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let conn = connection();
                        let id = conn.id().to_string();
                        registry.insert(conn);
                        assert!(registry.snapshot().iter().all(|c| !c.id().is_empty()));
                        registry.remove(&id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 0);
    }
}
