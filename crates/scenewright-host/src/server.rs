//! Bridge server.
//!
//! All requests, from every connection, funnel through one dispatcher thread,
//! so the host sees strictly sequential calls. Connections only parse frames
//! and wait for replies.

use crate::dispatch::{self, Dispatcher};
use crate::handshake::HandshakeGate;
use scenewright_core::{
    Capabilities, FrameError, FrameReader, FrameWriter, RemoteError, Request, Response,
    ServerHello,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

/// How long a fresh connection may take to send `hello`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

struct Job {
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, RemoteError>>,
}

/// Sends requests to the dispatcher thread.
#[derive(Clone)]
pub struct DispatcherHandle {
    jobs: mpsc::Sender<Job>,
}

impl DispatcherHandle {
    /// Move `dispatcher` onto a blocking thread and serve jobs until every
    /// handle is dropped.
    pub fn spawn(mut dispatcher: Dispatcher) -> Self {
        let (jobs, mut rx) = mpsc::channel::<Job>(64);
        tokio::task::spawn_blocking(move || {
            while let Some(job) = rx.blocking_recv() {
                let outcome = dispatcher.dispatch(&job.method, &job.params);
                let _ = job.reply.send(outcome);
            }
            tracing::debug!("dispatcher stopped");
        });
        Self { jobs }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let (reply, outcome) = oneshot::channel();
        let job = Job {
            method: method.to_string(),
            params,
            reply,
        };
        if self.jobs.send(job).await.is_err() {
            return Err(RemoteError::failed("editor host has stopped"));
        }
        outcome
            .await
            .unwrap_or_else(|_| Err(RemoteError::failed("editor host dropped the request")))
    }
}

/// Marks the single authenticated session; released on drop.
struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(busy.clone()))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Accepts connections, authenticates them and forwards their requests.
#[derive(Clone)]
pub struct EditorServer {
    dispatcher: DispatcherHandle,
    gate: Arc<HandshakeGate>,
    capabilities: Arc<Capabilities>,
    busy: Arc<AtomicBool>,
    handshake_timeout: Duration,
}

impl EditorServer {
    pub fn new(dispatcher: Dispatcher, token: impl Into<String>) -> Self {
        let gate = HandshakeGate::new(token);
        if gate.is_open() {
            tracing::warn!("no token configured; any client will be accepted");
        }
        Self {
            dispatcher: DispatcherHandle::spawn(dispatcher),
            gate: Arc::new(gate),
            capabilities: Arc::new(dispatch::capabilities()),
            busy: Arc::new(AtomicBool::new(false)),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, HostError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| HostError::Bind { addr, source })
    }

    /// Accept loop; each connection runs on its own task.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HostError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("editor bridge listening on {}", addr);
        }
        loop {
            let (stream, peer) = listener.accept().await.map_err(HostError::Accept)?;
            let _ = stream.set_nodelay(true);
            let server = self.clone();
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                if let Err(e) = server.serve_session(reader, writer, &peer.to_string()).await {
                    tracing::warn!("connection {} failed: {}", peer, e);
                }
            });
        }
    }

    /// Serve one session over stdin/stdout.
    pub async fn serve_stdio(self) -> Result<(), HostError> {
        self.serve_session(tokio::io::stdin(), tokio::io::stdout(), "stdio")
            .await
    }

    /// Handshake, then answer requests until the peer disconnects.
    pub async fn serve_session<R, W>(&self, reader: R, writer: W, peer: &str) -> Result<(), HostError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = FrameReader::new(reader);
        let mut writer = FrameWriter::new(writer);

        let first = match tokio::time::timeout(self.handshake_timeout, reader.next_frame::<Value>())
            .await
        {
            Ok(frame) => match frame? {
                Some(frame) => frame,
                None => return Ok(()),
            },
            Err(_) => {
                tracing::warn!("{} sent no hello within {:?}", peer, self.handshake_timeout);
                return reject(&mut writer, "handshake timed out").await;
            }
        };

        if let Err(reason) = self.gate.check(&first) {
            tracing::warn!("rejected handshake from {}: {}", peer, reason);
            return reject(&mut writer, &reason).await;
        }
        let Some(_session) = SessionSlot::acquire(&self.busy) else {
            tracing::warn!("rejected {}: another session is active", peer);
            return reject(&mut writer, "session busy").await;
        };

        writer
            .send(&ServerHello::HelloOk {
                capabilities: (*self.capabilities).clone(),
            })
            .await?;
        tracing::info!("{} authenticated", peer);

        while let Some(frame) = reader.next_frame::<Value>().await? {
            let request: Request = match serde_json::from_value(frame) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!("ignoring non-request frame from {}: {}", peer, e);
                    continue;
                }
            };
            tracing::debug!("{} -> {} (id {})", peer, request.method, request.id);
            let outcome = self.dispatcher.call(&request.method, request.params).await;
            writer.send(&Response::from_outcome(request.id, outcome)).await?;
        }

        tracing::info!("{} disconnected", peer);
        Ok(())
    }
}

async fn reject<W: AsyncWrite + Unpin>(
    writer: &mut FrameWriter<W>,
    reason: &str,
) -> Result<(), HostError> {
    writer
        .send(&ServerHello::HelloError {
            error: reason.to_string(),
        })
        .await?;
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EditorHost;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn dispatcher_handle_serializes_calls() {
        let dir = TempDir::new().unwrap();
        let handle = DispatcherHandle::spawn(Dispatcher::new(EditorHost::new(dir.path(), false)));
        let (a, b) = tokio::join!(
            handle.call("write_text_file", json!({"path": "res://a.txt", "content": "a"})),
            handle.call("ping", json!({}))
        );
        assert_eq!(a.unwrap()["written"], true);
        assert_eq!(b.unwrap()["pong"], true);
    }

    #[test]
    fn session_slot_is_exclusive() {
        let busy = Arc::new(AtomicBool::new(false));
        let first = SessionSlot::acquire(&busy).unwrap();
        assert!(SessionSlot::acquire(&busy).is_none());
        drop(first);
        assert!(SessionSlot::acquire(&busy).is_some());
    }
}
