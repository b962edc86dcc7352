//! `scenewright`: list, plan and run macros against an editor.

use crate::Outcome;
use crate::args::BridgeArgs;
use crate::config::BridgeConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use scenewright_client::BridgeClient;
use scenewright_orchestrator::catalog;
use scenewright_orchestrator::{
    BridgeExecutor, HeadlessExecutor, MacroOp, OpExecutor, Orchestrator, OrchestratorError,
    Registry, RunOptions, UnknownMacro,
};
use serde_json::{Value, json};
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "scenewright", version, about = "Idempotent, resumable scene macros")]
pub struct Cli {
    #[command(flatten)]
    pub bridge: BridgeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the built-in macros.
    List,
    /// Show one macro with its operations.
    Describe { id: String },
    /// Expand macros without diffing or executing.
    Plan {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Run macros in order; all of them when none are named.
    Run(RunArgs),
    /// Continue the last run from its manifest.
    Resume {
        #[arg(long)]
        headless: bool,
    },
    /// Validate artifacts; those in the manifest when none are named.
    Validate {
        paths: Vec<String>,
        #[arg(long)]
        headless: bool,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    pub ids: Vec<String>,
    /// Overwrite artifacts whose content differs (needs --unsafe).
    #[arg(long)]
    pub force: bool,
    /// Print the expanded operations and stop.
    #[arg(long)]
    pub dry_run: bool,
    /// Validate every scene the run creates.
    #[arg(long)]
    pub validate: bool,
    /// Instance the produced scenes into one main scene.
    #[arg(long)]
    pub compose: bool,
    /// Execute in-process instead of over the bridge.
    #[arg(long)]
    pub headless: bool,
}

/// Either transport, chosen per invocation.
enum Executor {
    Bridge(BridgeExecutor),
    Headless(HeadlessExecutor),
}

impl Executor {
    async fn open(config: &BridgeConfig, headless: bool) -> anyhow::Result<Self> {
        if headless {
            return Ok(Self::Headless(HeadlessExecutor::new(
                &config.project,
                config.unsafe_mode,
            )));
        }
        let host = config.host.to_string();
        let client = BridgeClient::connect(&host, config.port, &config.token, config.connect_timeout)
            .await
            .with_context(|| format!("connecting to editor at {host}:{}", config.port))?;
        Ok(Self::Bridge(BridgeExecutor::new(client, config.request_timeout)))
    }

    async fn close(self) {
        if let Self::Bridge(bridge) = self {
            bridge.into_client().shutdown(SHUTDOWN_GRACE).await;
        }
    }
}

impl OpExecutor for Executor {
    async fn execute(&self, ops: &[MacroOp]) -> Result<Value, OrchestratorError> {
        match self {
            Self::Bridge(bridge) => bridge.execute(ops).await,
            Self::Headless(headless) => headless.execute(ops).await,
        }
    }
}

fn unknown(err: UnknownMacro) -> Outcome {
    Outcome {
        ok: false,
        output: json!({ "ok": false, "error": "unknown_macro", "unknownMacro": err }),
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let registry = catalog::builtin()?;
    match cli.command {
        Command::List => Ok(Outcome::json(&registry.list())?),
        Command::Describe { id } => match registry.describe(&id) {
            Ok(info) => Ok(Outcome::json(&info)?),
            Err(err) => Ok(unknown(err)),
        },
        Command::Plan { ids } => match registry.plan(&ids) {
            Ok(plans) => Ok(Outcome::json(&plans)?),
            Err(err) => Ok(unknown(err)),
        },
        Command::Run(args) => {
            let config = cli.bridge.load()?;
            // A dry run never opens the bridge.
            let executor = Executor::open(&config, args.headless || args.dry_run).await?;
            let orchestrator = Orchestrator::new(registry, &config.project, executor)
                .with_unsafe_mode(config.unsafe_mode);
            let ids = run_ids(registry, &args.ids);
            let options = RunOptions {
                force_regenerate: args.force,
                dry_run: args.dry_run,
                validate: args.validate,
                compose: args.compose,
            };
            let result = orchestrator.run(&ids, options).await;
            orchestrator.into_executor().close().await;
            match result {
                Ok(report) => Outcome::report(report.ok, &report),
                Err(OrchestratorError::UnknownMacro(err)) => Ok(unknown(err)),
                Err(err) => Err(err.into()),
            }
        }
        Command::Resume { headless } => {
            let config = cli.bridge.load()?;
            let executor = Executor::open(&config, headless).await?;
            let orchestrator = Orchestrator::new(registry, &config.project, executor)
                .with_unsafe_mode(config.unsafe_mode);
            let result = orchestrator.resume().await;
            orchestrator.into_executor().close().await;
            let report = result?;
            Outcome::report(report.ok, &report)
        }
        Command::Validate { paths, headless } => {
            let config = cli.bridge.load()?;
            let executor = Executor::open(&config, headless).await?;
            let orchestrator = Orchestrator::new(registry, &config.project, executor);
            let result = orchestrator
                .validate((!paths.is_empty()).then_some(paths))
                .await;
            orchestrator.into_executor().close().await;
            let report = result?;
            Outcome::report(report.ok, &report)
        }
    }
}

fn run_ids(registry: &Registry, ids: &[String]) -> Vec<String> {
    if ids.is_empty() {
        registry.ids().map(str::to_string).collect()
    } else {
        ids.to_vec()
    }
}
