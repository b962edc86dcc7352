//! Core types for the scenewright editor bridge.
//!
//! This crate provides the protocol primitives shared by both ends of the
//! bridge: the wire messages, newline-delimited framing, the structured error
//! payload, runtime values and project path resolution. It performs no
//! networking of its own.

mod error;
mod framing;
mod message;
mod paths;
mod variant;

pub use error::{ErrorKind, RemoteError};
pub use framing::{FrameError, FrameReader, FrameWriter, LineBuffer};
pub use message::{ClientFrame, HelloRequest, Request, Response, ServerFrame, ServerHello};
pub use paths::{PathError, ProjectPath};
pub use variant::{ObjectRef, Variant};

use serde::{Deserialize, Serialize};

/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: &str = "1";

/// Capabilities advertised by the editor in `hello_ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Protocol revision.
    pub protocol: String,
    /// Version of the editor-side plugin.
    pub plugin_version: String,
    /// Method names the dispatcher accepts.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl Capabilities {
    /// Whether `method` was advertised.
    pub fn supports(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_lookup() {
        let caps = Capabilities {
            protocol: PROTOCOL_VERSION.into(),
            plugin_version: "0.1.0".into(),
            methods: vec!["ping".into(), "batch".into()],
        };
        assert!(caps.supports("batch"));
        assert!(!caps.supports("call"));
    }

    #[test]
    fn capabilities_methods_default_to_empty() {
        let caps: Capabilities =
            serde_json::from_str(r#"{"protocol":"1","plugin_version":"x"}"#).unwrap();
        assert!(caps.methods.is_empty());
    }
}
