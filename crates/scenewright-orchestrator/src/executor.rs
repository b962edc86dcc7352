//! Where operation batches run.
//!
//! The engine only knows [`OpExecutor`]. [`BridgeExecutor`] sends each batch
//! over an authenticated [`BridgeClient`]; [`HeadlessExecutor`] runs it on an
//! in-process editor host.

use crate::error::OrchestratorError;
use crate::registry::MacroOp;
use scenewright_client::BridgeClient;
use scenewright_host::{BATCH_METHOD, Dispatcher, DispatcherHandle, EditorHost};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

/// Runs a list of operations as one stop-on-error batch.
///
/// A batch failure comes back as [`OrchestratorError::Batch`] carrying the
/// editor's `index`/`completed`/`cause` details. Operations before the failing
/// one stay applied.
#[allow(async_fn_in_trait)]
pub trait OpExecutor {
    async fn execute(&self, ops: &[MacroOp]) -> Result<Value, OrchestratorError>;
}

fn batch_params(ops: &[MacroOp]) -> Value {
    json!({ "operations": ops, "stop_on_error": true })
}

pub struct BridgeExecutor {
    client: BridgeClient,
    timeout: Duration,
}

impl BridgeExecutor {
    /// `timeout` bounds each batch request. When it elapses the batch's
    /// outcome is unknown.
    pub fn new(client: BridgeClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub fn into_client(self) -> BridgeClient {
        self.client
    }
}

impl OpExecutor for BridgeExecutor {
    async fn execute(&self, ops: &[MacroOp]) -> Result<Value, OrchestratorError> {
        tracing::debug!("sending batch of {} operation(s)", ops.len());
        Ok(self
            .client
            .request(BATCH_METHOD, batch_params(ops), self.timeout)
            .await?)
    }
}

/// An editor host living in this process.
#[derive(Clone)]
pub struct HeadlessExecutor {
    handle: DispatcherHandle,
}

impl HeadlessExecutor {
    /// Must be called inside a tokio runtime.
    pub fn new(root: &Path, unsafe_mode: bool) -> Self {
        let host = EditorHost::new(root, unsafe_mode);
        Self {
            handle: DispatcherHandle::spawn(Dispatcher::new(host)),
        }
    }

    pub fn from_handle(handle: DispatcherHandle) -> Self {
        Self { handle }
    }
}

impl OpExecutor for HeadlessExecutor {
    async fn execute(&self, ops: &[MacroOp]) -> Result<Value, OrchestratorError> {
        self.handle
            .call(BATCH_METHOD, batch_params(ops))
            .await
            .map_err(OrchestratorError::Batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenewright_core::ErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn headless_batches_stop_on_error() {
        let dir = TempDir::new().unwrap();
        let executor = HeadlessExecutor::new(dir.path(), false);

        let ok = executor
            .execute(&[MacroOp::new(
                "write_text_file",
                json!({"path": "res://a.txt", "content": "A"}),
            )])
            .await
            .unwrap();
        assert_eq!(ok["completed"], 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "A");

        let err = executor
            .execute(&[
                MacroOp::new("write_text_file", json!({"path": "res://b.txt", "content": "B"})),
                MacroOp::new("read_text_file", json!({"path": "res://missing.txt"})),
                MacroOp::new("write_text_file", json!({"path": "res://c.txt", "content": "C"})),
            ])
            .await
            .unwrap_err();
        let OrchestratorError::Batch(remote) = err else {
            panic!("expected a batch failure, got {err:?}");
        };
        assert_eq!(remote.kind(), Some(ErrorKind::Failed));
        assert_eq!(remote.details["index"], 1);
        assert_eq!(remote.details["completed"], 1);
        assert!(dir.path().join("b.txt").exists());
        assert!(!dir.path().join("c.txt").exists());
    }
}
