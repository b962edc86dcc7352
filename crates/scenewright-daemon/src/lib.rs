//! Binaries for scenewright.
//!
//! - `scenewright-editor` hosts an editor in-process and serves the bridge
//!   over TCP or stdio, or runs a single batch headlessly.
//! - `scenewright` lists, plans, runs, resumes and validates macros, over the
//!   bridge or `--headless`.
//!
//! Both resolve their settings through [`config::BridgeConfig`].

mod args;
pub mod cli;
pub mod config;
pub mod editor;
pub mod logging;

pub use args::BridgeArgs;

use serde::Serialize;
use serde_json::Value;
use std::process::ExitCode;

/// What a command prints, and whether it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub ok: bool,
    pub output: Value,
}

impl Outcome {
    /// Nothing to print.
    pub fn done() -> Self {
        Self {
            ok: true,
            output: Value::Null,
        }
    }

    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self {
            ok: true,
            output: serde_json::to_value(value)?,
        })
    }

    pub fn report<T: Serialize>(ok: bool, value: &T) -> anyhow::Result<Self> {
        Ok(Self {
            ok,
            output: serde_json::to_value(value)?,
        })
    }

    /// Print the output as pretty JSON on stdout.
    pub fn finish(self) -> anyhow::Result<ExitCode> {
        if !self.output.is_null() {
            println!("{}", serde_json::to_string_pretty(&self.output)?);
        }
        Ok(if self.ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
