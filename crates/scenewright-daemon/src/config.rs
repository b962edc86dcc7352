//! Layered bridge configuration.
//!
//! # Load order
//!
//! 1. Compiled defaults
//! 2. Project file (`<project>/.scenewright/config.toml`)
//! 3. Environment (`SCENEWRIGHT_*`, read by clap)
//! 4. Command-line flags
//!
//! Each layer overrides the previous. Layers 3 and 4 arrive together as
//! [`Overrides`].

use scenewright_host::STATE_DIR;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6550;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

const CONFIG_FILE: &str = "config.toml";
const TOKEN_FILE: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid host '{0}'")]
    Host(String),
}

/// `config.toml` contents. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    #[serde(rename = "unsafe")]
    pub unsafe_mode: Option<bool>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A missing file is an empty layer.
    pub fn load(project: &Path) -> Result<Self, ConfigError> {
        let path = project.join(STATE_DIR).join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }
}

/// Values from the environment and the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub unsafe_mode: bool,
    pub request_timeout_ms: Option<u64>,
}

/// Resolved settings shared by the editor server and the orchestration CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub project: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub token: String,
    pub unsafe_mode: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl BridgeConfig {
    pub fn load(project: impl Into<PathBuf>, overrides: Overrides) -> Result<Self, ConfigError> {
        let project = project.into();
        let file = FileConfig::load(&project)?;
        Self::resolve(project, file, overrides)
    }

    pub fn resolve(
        project: PathBuf,
        file: FileConfig,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let host = overrides
            .host
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host.parse::<IpAddr>().map_err(|_| ConfigError::Host(host.clone()))?;

        let token = match overrides.token.or(file.token) {
            Some(token) => token,
            None => read_token(&project, overrides.token_file.or(file.token_file))?,
        };
        if token.is_empty() {
            tracing::warn!("no bridge token configured; any local client can connect");
        }

        Ok(Self {
            host,
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            token,
            unsafe_mode: overrides.unsafe_mode || file.unsafe_mode.unwrap_or(false),
            request_timeout: Duration::from_millis(
                overrides
                    .request_timeout_ms
                    .or(file.request_timeout_ms)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            connect_timeout: Duration::from_millis(
                file.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            project,
        })
    }
}

/// Read the side-channel token once, trimmed.
///
/// The default location may be absent (empty token); an explicitly named
/// file must exist.
fn read_token(project: &Path, explicit: Option<PathBuf>) -> Result<String, ConfigError> {
    let (path, required) = match explicit {
        Some(path) if path.is_relative() => (project.join(path), true),
        Some(path) => (path, true),
        None => (project.join(STATE_DIR).join(TOKEN_FILE), false),
    };
    match std::fs::read_to_string(&path) {
        Ok(token) => {
            tracing::debug!("read bridge token from {}", path.display());
            Ok(token.trim().to_string())
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}
