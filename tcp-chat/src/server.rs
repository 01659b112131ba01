use std::{
    future::Future,
    net::{SocketAddr, SocketAddrV4},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpSocket, TcpStream, tcp::OwnedReadHalf},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast::broadcast,
    connection::{Connection, READ_CHUNK_SIZE},
    error::ConnectionError,
    registry::Registry,
};

/// Pending-connection queue length used when none is configured.
pub const DEFAULT_BACKLOG: u32 = 5;

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new()),
        }
    }

    /// Binds and starts listening. Failure here is fatal for the process.
    pub fn bind(addr: SocketAddrV4, backlog: u32) -> Result<Self> {
        let socket = TcpSocket::new_v4().context("failed to create listening socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(addr.into())
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket
            .listen(backlog)
            .with_context(|| format!("failed to listen on {addr}"))?;
        Ok(Self::new(listener))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of the live connections, valid after `run*` consumes `self`.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts until `shutdown` resolves. Connected clients are left alone.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    let clients = registry.len().await;
                    info!(clients, "server no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry).await;
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => accept_connection(stream, peer, registry).await,
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

async fn accept_connection(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    let (reader, writer) = stream.into_split();
    let connection = Arc::new(Connection::new(registry.next_id(), peer, writer));

    registry.register(Arc::clone(&connection)).await;
    info!(peer = %peer, id = connection.id(), "new connection");

    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let reason = receive_loop(reader, &connection, &registry).await;
        disconnect(&registry, &connection, reason).await;
    });
}

/// Relays every chunk read from `reader` until the connection is gone.
async fn receive_loop(
    mut reader: OwnedReadHalf,
    connection: &Connection,
    registry: &Registry,
) -> ConnectionError {
    let mut closed = connection.closed_signal();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = select! {
            read = reader.read(&mut buf) => read,
            _ = closed.wait_for(|closed| *closed) => return ConnectionError::Closed,
        };

        match read {
            Ok(0) => return ConnectionError::PeerClosed,
            Ok(n) => {
                let delivery = broadcast(registry, &buf[..n], connection.id()).await;
                debug!(
                    id = connection.id(),
                    bytes = n,
                    delivered = delivery.delivered,
                    pruned = delivery.pruned.len(),
                    "relayed message"
                );
            }
            Err(err) => return ConnectionError::from(err),
        }
    }
}

async fn disconnect(registry: &Registry, connection: &Connection, reason: ConnectionError) {
    registry.unregister(connection.id()).await;
    connection.close().await;
    info!(peer = %connection.peer(), id = connection.id(), reason = %reason, "client disconnected");
}
