//! Macro orchestration for scenewright.
//!
//! A macro is a pure generator of editor operations. Running it expands the
//! operations, drops the ones whose effect is already on disk, executes the
//! rest as one batch and records the outcome in a manifest that survives
//! crashes and drives `resume`.

pub mod catalog;
mod engine;
mod error;
mod executor;
pub mod manifest;
mod prepare;
mod registry;

pub use engine::{Orchestrator, RunOptions, RunReport, ValidationReport};
pub use error::{ManifestError, OrchestratorError, UnknownMacro};
pub use executor::{BridgeExecutor, HeadlessExecutor, OpExecutor};
pub use manifest::{MacroRunRecord, ManifestStore, RunManifest, RunStatus};
pub use prepare::{PrepareResult, prepare};
pub use registry::{MacroDefinition, MacroInfo, MacroOp, MacroPlan, OpKind, Registry};
