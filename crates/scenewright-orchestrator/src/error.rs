use scenewright_client::ClientError;
use scenewright_core::RemoteError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A macro id that is not in the registry, with the ids that are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownMacro {
    pub id: String,
    pub supported: Vec<String>,
}

impl fmt::Display for UnknownMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown macro '{}' (supported: {})",
            self.id,
            self.supported.join(", ")
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest schema version {found} is not supported (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    UnknownMacro(UnknownMacro),
    #[error("macro '{0}' is registered twice")]
    DuplicateMacro(String),
    #[error("invalid '{operation}' operation: {reason}")]
    InvalidOp { operation: String, reason: String },
    #[error("{action} is blocked; enable {guard} to allow it")]
    Blocked { action: String, guard: &'static str },
    #[error("no run manifest at {0}")]
    NoManifest(PathBuf),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("operation batch failed: {0}")]
    Batch(RemoteError),
    #[error(transparent)]
    Bridge(ClientError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ClientError> for OrchestratorError {
    /// Remote failures are batch failures; everything else is transport.
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Remote(remote) => OrchestratorError::Batch(remote),
            other => OrchestratorError::Bridge(other),
        }
    }
}

impl From<UnknownMacro> for OrchestratorError {
    fn from(err: UnknownMacro) -> Self {
        OrchestratorError::UnknownMacro(err)
    }
}
