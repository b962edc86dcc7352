//! Authenticated bridge connection.

use crate::correlator::PendingRequests;
use crate::error::{ClientError, CloseReason};
use scenewright_core::{
    Capabilities, FrameReader, FrameWriter, HelloRequest, Request, Response, ServerFrame,
    ServerHello,
};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Shared {
    next_id: AtomicU64,
    pending: PendingRequests,
}

/// Work for the writer task. A frame, once dequeued, is always written whole.
enum Outgoing {
    Frame(Request),
    Close(Option<oneshot::Sender<()>>),
}

/// Stops tracking a request when its caller goes away, however that happens.
struct Tracked<'a> {
    pending: &'a PendingRequests,
    id: u64,
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.id);
    }
}

/// A connection to an editor that has completed the `hello` handshake.
///
/// Requests may be issued concurrently from `&self`; responses are matched by
/// id in whatever order they arrive.
pub struct BridgeClient {
    shared: Arc<Shared>,
    capabilities: Capabilities,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl BridgeClient {
    /// Connect over TCP and authenticate.
    ///
    /// `timeout` bounds the connect and the wait for `hello_ok` separately.
    pub async fn connect(
        host: &str,
        port: u16,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let addr = format!("{host}:{port}");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
            Err(_) => return Err(ClientError::ConnectTimeout { addr, after: timeout }),
        };
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        tracing::debug!("connected to editor at {}", addr);
        Self::handshake(
            read_half,
            write_half,
            token,
            timeout,
            CloseReason::SocketClosed,
            None,
        )
        .await
    }

    /// Spawn an editor speaking the protocol on its stdin/stdout and
    /// authenticate. The process is killed when the client is dropped.
    pub async fn spawn(
        mut command: Command,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(ClientError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Spawn(std::io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Spawn(std::io::Error::other("stdout not captured")))?;
        Self::handshake(
            stdout,
            stdin,
            token,
            timeout,
            CloseReason::ServerExited,
            Some(child),
        )
        .await
    }

    /// Authenticate over an already-open byte stream pair.
    pub async fn from_streams<R, W>(
        reader: R,
        writer: W,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::handshake(reader, writer, token, timeout, CloseReason::SocketClosed, None).await
    }

    async fn handshake<R, W>(
        reader: R,
        writer: W,
        token: &str,
        timeout: Duration,
        eof_reason: CloseReason,
        child: Option<Child>,
    ) -> Result<Self, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut reader = FrameReader::new(reader);
        let mut writer: FrameWriter<BoxedWriter> = FrameWriter::new(Box::new(writer));
        writer.send(&HelloRequest::new(token)).await?;

        let hello = match tokio::time::timeout(timeout, await_hello(&mut reader, &eof_reason)).await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                let _ = writer.shutdown().await;
                return Err(ClientError::HandshakeTimeout(timeout));
            }
        };

        let capabilities = match hello {
            ServerHello::HelloOk { capabilities } => capabilities,
            ServerHello::HelloError { error } => {
                tracing::warn!("editor refused handshake: {}", error);
                return Err(ClientError::HandshakeRejected(error));
            }
        };
        tracing::info!(
            "bridge authenticated (protocol {}, plugin {}, {} methods)",
            capabilities.protocol,
            capabilities.plugin_version,
            capabilities.methods.len()
        );

        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: PendingRequests::new(),
        });
        let (outgoing, queue) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(reader, shared.clone(), eof_reason));
        let writer = tokio::spawn(write_loop(writer, queue, shared.clone()));

        Ok(Self {
            shared,
            capabilities,
            outgoing,
            reader,
            writer,
            child: Mutex::new(child),
        })
    }

    /// Capabilities the editor advertised in `hello_ok`.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Issue a request and return its result, or the editor's structured
    /// failure as [`ClientError::Remote`].
    ///
    /// A timeout means the outcome is unknown: the editor may still apply the
    /// operation after the client has stopped waiting. The frame itself is
    /// still written in full, so later requests are unaffected.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        self.request_response(method, params, timeout)
            .await?
            .into_result()
            .map_err(ClientError::Remote)
    }

    /// Like [`request`](Self::request) but returns the raw response frame.
    pub async fn request_response(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut rx = self
            .shared
            .pending
            .register(id, method, Instant::now() + timeout)?;
        let _tracked = Tracked {
            pending: &self.shared.pending,
            id,
        };

        let frame = Request::new(id, method, params);
        if self.outgoing.send(Outgoing::Frame(frame)).is_err() {
            return Err(ClientError::Closed(self.close_reason()));
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(settled)) => settled,
            Ok(Err(_)) => Err(ClientError::Closed(self.close_reason())),
            Err(_) => {
                if self.shared.pending.is_tracked(id) {
                    Err(self.expire(id, method, timeout))
                } else {
                    // Settled in the same instant the deadline passed.
                    rx.try_recv()
                        .unwrap_or_else(|_| Err(ClientError::Closed(self.close_reason())))
                }
            }
        }
    }

    fn expire(&self, id: u64, method: &str, after: Duration) -> ClientError {
        self.shared.pending.forget(id);
        tracing::debug!("request {} (id {}) timed out after {:?}", method, id, after);
        ClientError::Timeout {
            method: method.to_string(),
            id,
            after,
        }
    }

    fn close_reason(&self) -> CloseReason {
        self.shared
            .pending
            .close_reason()
            .unwrap_or(CloseReason::Disposed)
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the connection is unusable (lost or disposed).
    pub fn is_closed(&self) -> bool {
        self.shared.pending.close_reason().is_some()
    }

    /// Reject everything in flight, stop reading, and refuse further requests.
    pub fn dispose(&self) {
        let rejected = self.shared.pending.fail_all(CloseReason::Disposed);
        self.reader.abort();
        let _ = self.outgoing.send(Outgoing::Close(None));
        if let Some(child) = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_mut()
        {
            let _ = child.start_kill();
        }
        if rejected > 0 {
            tracing::debug!("dispose rejected {} pending request(s)", rejected);
        }
    }

    /// Dispose, then give the transport (and a spawned editor) up to `grace`
    /// to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        let child = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.shared.pending.fail_all(CloseReason::Disposed);
        self.reader.abort();

        let deadline = tokio::time::Instant::now() + grace;
        let (done, closed) = oneshot::channel();
        if self.outgoing.send(Outgoing::Close(Some(done))).is_ok() {
            let _ = tokio::time::timeout_at(deadline, closed).await;
        }
        self.writer.abort();

        if let Some(mut child) = child {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("editor process exited: {}", status),
                Ok(Err(e)) => tracing::warn!("waiting for editor process failed: {}", e),
                Err(_) => {
                    tracing::warn!("editor process did not exit within {:?}; killing", grace);
                    let _ = child.kill().await;
                }
            }
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.shared.pending.fail_all(CloseReason::Disposed);
        self.reader.abort();
    }
}

async fn await_hello<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    eof_reason: &CloseReason,
) -> Result<ServerHello, ClientError> {
    loop {
        match reader.next_frame::<ServerFrame>().await? {
            Some(ServerFrame::Hello(hello)) => return Ok(hello),
            Some(ServerFrame::Response(response)) => {
                tracing::debug!("ignoring response {} before handshake", response.id);
            }
            None => return Err(ClientError::Closed(eof_reason.clone())),
        }
    }
}

async fn write_loop(
    mut writer: FrameWriter<BoxedWriter>,
    mut queue: mpsc::UnboundedReceiver<Outgoing>,
    shared: Arc<Shared>,
) {
    while let Some(outgoing) = queue.recv().await {
        match outgoing {
            Outgoing::Frame(request) => {
                if let Err(e) = writer.send(&request).await {
                    let reason = CloseReason::Transport(e.to_string());
                    let rejected = shared.pending.fail_all(reason.clone());
                    tracing::warn!(
                        "writing to the bridge failed ({}); rejected {} pending request(s)",
                        reason,
                        rejected
                    );
                    return;
                }
            }
            Outgoing::Close(done) => {
                let _ = writer.shutdown().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    shared: Arc<Shared>,
    eof_reason: CloseReason,
) {
    let reason = loop {
        match reader.next_frame::<ServerFrame>().await {
            Ok(Some(ServerFrame::Response(response))) => {
                let id = response.id;
                if !shared.pending.resolve(response) {
                    tracing::debug!("ignoring response for untracked id {}", id);
                }
            }
            Ok(Some(ServerFrame::Hello(_))) => {
                tracing::debug!("ignoring handshake frame after authentication");
            }
            Ok(None) => break eof_reason,
            Err(e) => break CloseReason::Transport(e.to_string()),
        }
    };

    let rejected = shared.pending.fail_all(reason.clone());
    if rejected > 0 {
        tracing::warn!(
            "bridge connection lost ({}); rejected {} pending request(s)",
            reason,
            rejected
        );
    } else {
        tracing::debug!("bridge connection ended ({})", reason);
    }
}
