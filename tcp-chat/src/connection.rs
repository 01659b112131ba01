use std::{fmt, net::SocketAddr};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, watch},
};
use tracing::debug;

use crate::error::ConnectionError;

/// Largest payload a single read hands to the broadcast engine.
///
/// There is no framing on the wire: whatever one read returns is one message.
pub const READ_CHUNK_SIZE: usize = 1024;

pub type ConnectionId = u64;

type Transport = Box<dyn AsyncWrite + Send + Unpin>;

/// Server-side handle for one accepted client.
///
/// Holds the write half of the stream. The read half stays with the
/// connection's receive task, which watches [`Connection::closed_signal`] so
/// a close issued from any other task also ends the read loop.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    // `None` once closed; writes after that never reach the transport.
    writer: Mutex<Option<Transport>>,
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    pub fn new<W>(id: ConnectionId, peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id,
            peer,
            writer: Mutex::new(Some(Box::new(writer))),
            closed_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Writes the whole payload, or fails with a classified error.
    ///
    /// Concurrent senders are serialized on the writer lock so two broadcasts
    /// never interleave partial writes on the same stream.
    pub async fn send(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(ConnectionError::Closed);
        };
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shuts the write half down and wakes the receive task.
    ///
    /// Safe to call any number of times from any task.
    pub async fn close(&self) {
        let stream = self.writer.lock().await.take();
        self.closed_tx.send_replace(true);

        if let Some(mut stream) = stream {
            if let Err(err) = stream.shutdown().await {
                debug!(id = self.id, peer = %self.peer, error = ?err, "shutdown after close failed");
            }
        }
    }

    /// Watch channel that flips to `true` once [`Connection::close`] has run.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn local_peer() -> SocketAddr {
        "127.0.0.1:40000".parse().expect("valid socket address")
    }

    #[tokio::test]
    async fn send_writes_payload_to_transport() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let connection = Connection::new(1, local_peer(), writer);

        connection.send(b"hello").await.expect("send should succeed");

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.expect("read payload");
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let connection = Connection::new(7, local_peer(), writer);

        connection.close().await;
        connection.close().await;

        assert!(connection.is_closed());
        let result = connection.send(b"late").await;
        assert!(matches!(result, Err(ConnectionError::Closed)));

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.expect("read to eof");
        assert!(rest.is_empty(), "closed handle must not write");
    }

    #[tokio::test]
    async fn close_wakes_signal_watchers() {
        let (writer, _reader) = tokio::io::duplex(64);
        let connection = Connection::new(3, local_peer(), writer);
        let mut signal = connection.closed_signal();

        connection.close().await;

        let closed = signal.wait_for(|closed| *closed).await.map(|v| *v);
        assert_eq!(closed.ok(), Some(true));
    }

    #[tokio::test]
    async fn send_to_dropped_peer_fails() {
        let (writer, reader) = tokio::io::duplex(64);
        let connection = Connection::new(2, local_peer(), writer);
        drop(reader);

        let result = connection.send(b"nobody home").await;
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }
}
