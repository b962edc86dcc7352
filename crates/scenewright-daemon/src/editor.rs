//! `scenewright-editor`: the headless editor host.

use crate::Outcome;
use crate::args::BridgeArgs;
use crate::config::BridgeConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use scenewright_host::{Dispatcher, EditorHost, EditorServer};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "scenewright-editor", version, about = "Headless scenewright editor host")]
pub struct EditorCli {
    #[command(subcommand)]
    pub command: EditorCommand,
}

#[derive(Debug, Subcommand)]
pub enum EditorCommand {
    /// Serve the bridge over TCP, one authenticated session at a time.
    Serve(BridgeArgs),
    /// Serve the bridge over stdin/stdout.
    Stdio(BridgeArgs),
    /// Run a JSON list of operations and print the batch result.
    Batch {
        #[command(flatten)]
        bridge: BridgeArgs,
        /// JSON file with `[{operation, params}]` or `{operations: [...]}`; `-` for stdin.
        #[arg(long)]
        ops: PathBuf,
        /// Run every operation even after a failure.
        #[arg(long)]
        keep_going: bool,
    },
}

fn server(config: &BridgeConfig) -> EditorServer {
    let host = EditorHost::new(&config.project, config.unsafe_mode);
    EditorServer::new(Dispatcher::new(host), config.token.clone())
}

pub async fn run(cli: EditorCli) -> anyhow::Result<Outcome> {
    match cli.command {
        EditorCommand::Serve(args) => {
            let config = args.load()?;
            let server = server(&config);
            let listener = EditorServer::bind(SocketAddr::new(config.host, config.port)).await?;
            tracing::info!(
                "editor for {} listening on {} (unsafe mode {})",
                config.project.display(),
                listener.local_addr()?,
                if config.unsafe_mode { "on" } else { "off" }
            );
            server.serve(listener).await?;
            Ok(Outcome::done())
        }
        EditorCommand::Stdio(args) => {
            let config = args.load()?;
            tracing::info!("editor for {} serving stdio", config.project.display());
            server(&config).serve_stdio().await?;
            Ok(Outcome::done())
        }
        EditorCommand::Batch {
            bridge,
            ops,
            keep_going,
        } => {
            let config = bridge.load()?;
            let operations = read_operations(&ops)?;
            Ok(run_batch(&config, operations, !keep_going))
        }
    }
}

/// Execute `operations` on a fresh in-process host.
pub fn run_batch(config: &BridgeConfig, operations: Value, stop_on_error: bool) -> Outcome {
    let mut dispatcher = Dispatcher::new(EditorHost::new(&config.project, config.unsafe_mode));
    let params = json!({ "operations": operations, "stop_on_error": stop_on_error });
    match dispatcher.batch(&params) {
        Ok(result) => Outcome {
            ok: result["failed"] == 0,
            output: result,
        },
        Err(error) => Outcome {
            ok: false,
            output: json!({ "ok": false, "error": error }),
        },
    }
}

fn read_operations(path: &Path) -> anyhow::Result<Value> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading operations from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading operations from {}", path.display()))?
    };
    let parsed: Value = serde_json::from_str(&text).context("operations are not valid JSON")?;
    match parsed {
        Value::Array(_) => Ok(parsed),
        Value::Object(mut map) => map
            .remove("operations")
            .context("expected an 'operations' array"),
        _ => anyhow::bail!("expected a JSON array of operations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> BridgeConfig {
        BridgeConfig::resolve(
            dir.path().to_path_buf(),
            FileConfig::default(),
            Overrides {
                token: Some("t".into()),
                ..Overrides::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn parses_subcommands() {
        let cli = EditorCli::parse_from([
            "scenewright-editor",
            "serve",
            "--project",
            "/tmp/game",
            "--port",
            "7001",
            "--unsafe",
        ]);
        let EditorCommand::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.project, PathBuf::from("/tmp/game"));
        assert_eq!(args.port, Some(7001));
        assert!(args.unsafe_mode);

        let cli = EditorCli::parse_from(["scenewright-editor", "batch", "--ops", "ops.json"]);
        assert!(matches!(cli.command, EditorCommand::Batch { keep_going: false, .. }));
    }

    #[test]
    fn batch_runs_headless() {
        let dir = TempDir::new().unwrap();
        let ops = json!([
            {"operation": "write_text_file", "params": {"path": "res://a.txt", "content": "A"}},
            {"operation": "read_text_file", "params": {"path": "res://a.txt"}},
        ]);
        let outcome = run_batch(&config(&dir), ops, true);
        assert!(outcome.ok);
        assert_eq!(outcome.output["completed"], 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "A");
    }

    #[test]
    fn batch_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let ops = json!([{"operation": "read_text_file", "params": {"path": "res://none.txt"}}]);
        let outcome = run_batch(&config(&dir), ops.clone(), true);
        assert!(!outcome.ok);
        assert_eq!(outcome.output["error"]["details"]["index"], 0);

        let outcome = run_batch(&config(&dir), ops, false);
        assert!(!outcome.ok);
        assert_eq!(outcome.output["failed"], 1);
    }

    #[test]
    fn operations_file_accepts_both_shapes() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("list.json");
        std::fs::write(&list, r#"[{"operation": "ping"}]"#).unwrap();
        assert_eq!(read_operations(&list).unwrap().as_array().unwrap().len(), 1);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"operations": [{"operation": "ping"}]}"#).unwrap();
        assert!(read_operations(&wrapped).unwrap().is_array());

        std::fs::write(&wrapped, "42").unwrap();
        assert!(read_operations(&wrapped).is_err());
    }
}
