//! Headless scenewright editor.
//!
//!   scenewright-editor serve --project ./game --port 6550 --token-file ./token
//!   scenewright-editor stdio --project ./game
//!   scenewright-editor batch --project ./game --ops ops.json

use clap::Parser;
use scenewright_daemon::editor::{self, EditorCli};
use scenewright_daemon::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init("scenewright=info")?;
    editor::run(EditorCli::parse()).await?.finish()
}
