use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::{
    connection::{Connection, ConnectionId},
    registry::Registry,
};

/// Outcome of one fan-out, used for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub pruned: Vec<ConnectionId>,
}

/// Sends `message` to every registered handle except `origin`.
///
/// Writes run concurrently and are best-effort: a recipient whose write fails
/// is treated as disconnected, so it is closed and dropped from the registry
/// right here rather than waiting for its own receive task to notice.
pub async fn broadcast(registry: &Registry, message: &[u8], origin: ConnectionId) -> Delivery {
    let recipients: Vec<Arc<Connection>> = registry
        .snapshot_for_broadcast()
        .await
        .into_iter()
        .filter(|connection| connection.id() != origin)
        .collect();

    let results = join_all(recipients.iter().map(|connection| connection.send(message))).await;

    let mut delivery = Delivery::default();
    for (connection, result) in recipients.iter().zip(results) {
        match result {
            Ok(()) => delivery.delivered += 1,
            Err(err) => {
                debug!(id = connection.id(), peer = %connection.peer(), error = %err, "delivery failed");
                prune(registry, connection).await;
                delivery.pruned.push(connection.id());
            }
        }
    }

    delivery
}

async fn prune(registry: &Registry, connection: &Connection) {
    connection.close().await;
    if registry.unregister(connection.id()).await.is_some() {
        info!(id = connection.id(), peer = %connection.peer(), "dropped unreachable client");
    }
}
