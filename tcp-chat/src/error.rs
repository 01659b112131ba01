use std::io;

use thiserror::Error;

/// Why a single connection stopped being usable.
///
/// Every variant is handled the same way by the server (unregister and close
/// the handle) and by the client (stop the session); the split only exists
/// so logs say what actually happened.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer reset or aborted the connection.
    #[error("connection reset by peer")]
    Reset(#[source] io::Error),

    /// The peer finished its side of the stream (zero-length read).
    #[error("peer closed the connection")]
    PeerClosed,

    /// The handle was already closed locally, or the pipe is gone.
    #[error("connection is closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Self::Reset(err),
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => Self::Closed,
            io::ErrorKind::UnexpectedEof => Self::PeerClosed,
            _ => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transport_errors() {
        let reset = ConnectionError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(reset, ConnectionError::Reset(_)));

        let aborted = ConnectionError::from(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(matches!(aborted, ConnectionError::Reset(_)));

        let pipe = ConnectionError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(pipe, ConnectionError::Closed));

        let eof = ConnectionError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(eof, ConnectionError::PeerClosed));

        let other = ConnectionError::from(io::Error::other("boom"));
        assert!(matches!(other, ConnectionError::Io(_)));
    }
}
