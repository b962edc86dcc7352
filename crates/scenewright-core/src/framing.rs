//! Newline-delimited JSON framing.
//!
//! Every frame is one JSON document followed by `\n`. JSON encoding never
//! produces a raw newline, so the delimiter is unambiguous. Lines that do not
//! decode are dropped; a malformed peer can waste bandwidth but cannot wedge
//! the connection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8 * 1024;

/// Errors raised by the framed transport.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Growable byte buffer that yields complete lines.
///
/// Partial lines stay buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Remove and return the next complete line, without its `\n`.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Bytes buffered but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Read half of a framed transport.
pub struct FrameReader<R> {
    reader: R,
    buffer: LineBuffer,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: LineBuffer::new(),
        }
    }

    /// Next frame that decodes as `T`, or `None` at end of stream.
    ///
    /// Cancel safe: bytes already read stay in the internal buffer, so this
    /// can sit in a `select!` arm.
    pub async fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            while let Some(line) = self.buffer.next_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<T>(&line) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        tracing::debug!("dropping malformed frame ({} bytes): {}", line.len(), e);
                    }
                }
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buffer.pending() > 0 {
                    tracing::debug!(
                        "stream ended with {} unterminated bytes",
                        self.buffer.pending()
                    );
                }
                return Ok(None);
            }
            self.buffer.extend(&chunk[..n]);
        }
    }
}

/// Write half of a framed transport.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode `frame`, append `\n` and flush.
    pub async fn send<T: Serialize>(&mut self, frame: &T) -> Result<(), FrameError> {
        let mut bytes = serde_json::to_vec(frame)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
