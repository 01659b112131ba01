use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Mutex;

use crate::connection::{Connection, ConnectionId};

/// The set of live client handles on the server.
///
/// All mutation goes through a single mutex. Broadcasts work from a copy
/// taken under that lock, so a slow recipient never holds up the accept loop
/// or another task's removal.
#[derive(Debug)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn register(&self, connection: Arc<Connection>) {
        let mut connections = self.connections.lock().await;
        connections.insert(connection.id(), connection);
    }

    /// Removes the handle if present. Returns `None` when it was already gone.
    ///
    /// The caller owns closing whatever comes back.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        connections.remove(&id)
    }

    pub async fn snapshot_for_broadcast(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.lock().await;
        connections.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
