use scenewright_core::{FrameError, RemoteError};
use std::fmt;
use std::time::Duration;

/// Why the client stopped tracking in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the socket.
    SocketClosed,
    /// The spawned editor process closed its stdout.
    ServerExited,
    /// [`BridgeClient::dispose`](crate::BridgeClient::dispose) was called.
    Disposed,
    /// Reading from the transport failed.
    Transport(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::SocketClosed => f.write_str("socket closed"),
            CloseReason::ServerExited => f.write_str("server exited"),
            CloseReason::Disposed => f.write_str("client disposed"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Errors returned by [`BridgeClient`](crate::BridgeClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connecting to {addr} timed out after {after:?}")]
    ConnectTimeout { addr: String, after: Duration },
    #[error("could not start editor process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("request '{method}' (id {id}) timed out after {after:?}")]
    Timeout {
        method: String,
        id: u64,
        after: Duration,
    },
    #[error("connection closed: {0}")]
    Closed(CloseReason),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("remote error: {0}")]
    Remote(RemoteError),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. }
                | ClientError::ConnectTimeout { .. }
                | ClientError::HandshakeTimeout(_)
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed(_))
    }

    /// The structured failure, when the editor answered with `ok: false`.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ClientError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_deadline_counts_as_a_timeout() {
        let connect = ClientError::ConnectTimeout {
            addr: "127.0.0.1:6550".into(),
            after: Duration::from_millis(5),
        };
        assert!(connect.is_timeout());
        assert!(ClientError::HandshakeTimeout(Duration::from_secs(1)).is_timeout());
        assert!(!ClientError::Closed(CloseReason::Disposed).is_timeout());
    }
}
