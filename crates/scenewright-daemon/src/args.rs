use crate::config::{BridgeConfig, ConfigError, Overrides};
use clap::Args;
use std::path::PathBuf;

/// Connection and policy flags shared by both binaries.
#[derive(Debug, Clone, Args)]
pub struct BridgeArgs {
    /// Project root.
    #[arg(long, env = "SCENEWRIGHT_PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Address to bind or connect to.
    #[arg(long, env = "SCENEWRIGHT_HOST")]
    pub host: Option<String>,

    /// Bridge port.
    #[arg(long, env = "SCENEWRIGHT_PORT")]
    pub port: Option<u16>,

    /// Shared secret for the hello handshake.
    #[arg(long, env = "SCENEWRIGHT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File holding the token, read once at start.
    #[arg(long, env = "SCENEWRIGHT_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Allow destructive operations and forced overwrites.
    #[arg(long = "unsafe", env = "SCENEWRIGHT_UNSAFE")]
    pub unsafe_mode: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "SCENEWRIGHT_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

impl BridgeArgs {
    pub fn load(&self) -> Result<BridgeConfig, ConfigError> {
        BridgeConfig::load(
            self.project.clone(),
            Overrides {
                host: self.host.clone(),
                port: self.port,
                token: self.token.clone(),
                token_file: self.token_file.clone(),
                unsafe_mode: self.unsafe_mode,
                request_timeout_ms: self.timeout_ms,
            },
        )
    }
}
