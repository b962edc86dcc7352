//! Run orchestration: expand, diff, execute, record.
//!
//! Each macro's surviving operations go to the executor as one stop-on-error
//! batch. The manifest is persisted after every record, so a crash or a failed
//! batch leaves an accurate account of what finished and [`Orchestrator::resume`]
//! can pick up from there. Nothing is rolled back.

use crate::catalog::{COMPOSE_ID, COMPOSE_OUTPUT, compose_ops};
use crate::error::{OrchestratorError, UnknownMacro};
use crate::executor::OpExecutor;
use crate::manifest::{MacroRunRecord, ManifestStore, RunManifest, RunStatus};
use crate::prepare::{PrepareResult, prepare_in_background};
use crate::registry::{MacroDefinition, MacroInfo, MacroOp, MacroPlan, Registry};
use chrono::Utc;
use scenewright_core::RemoteError;
use scenewright_host::{SCENE_SUFFIX, UNSAFE_GUARD};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Replace artifacts whose content differs. Needs unsafe mode.
    pub force_regenerate: bool,
    /// Expand only; touch neither the editor, the disk nor the manifest.
    pub dry_run: bool,
    /// Validate every scene the run creates.
    pub validate: bool,
    /// Instance the produced scenes into [`COMPOSE_OUTPUT`] at the end.
    pub compose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub ok: bool,
    /// Only for dry runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<MacroPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<RunManifest>,
}

impl RunReport {
    fn finished(manifest: RunManifest) -> Self {
        Self {
            ok: manifest.ok(),
            plans: Vec::new(),
            manifest: Some(manifest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RemoteError>,
}

pub struct Orchestrator<'r, E> {
    registry: &'r Registry,
    project: PathBuf,
    executor: E,
    unsafe_mode: bool,
    store: ManifestStore,
}

impl<'r, E: OpExecutor> Orchestrator<'r, E> {
    pub fn new(registry: &'r Registry, project: impl Into<PathBuf>, executor: E) -> Self {
        let project = project.into();
        Self {
            registry,
            store: ManifestStore::for_project(&project),
            project,
            executor,
            unsafe_mode: false,
        }
    }

    pub fn with_unsafe_mode(mut self, unsafe_mode: bool) -> Self {
        self.unsafe_mode = unsafe_mode;
        self
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    pub fn list(&self) -> Vec<MacroInfo> {
        self.registry.list()
    }

    pub fn describe(&self, id: &str) -> Result<MacroInfo, UnknownMacro> {
        self.registry.describe(id)
    }

    pub fn plan<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<MacroPlan>, UnknownMacro> {
        self.registry.plan(ids)
    }

    /// Run `ids` in order, starting a fresh manifest.
    ///
    /// A failed batch is not an error: the run halts, the failure is recorded
    /// and the report comes back with `ok == false`.
    pub async fn run<S: AsRef<str>>(
        &self,
        ids: &[S],
        options: RunOptions,
    ) -> Result<RunReport, OrchestratorError> {
        let macros = self.registry.resolve(ids)?;

        if options.dry_run {
            let mut plans = self.registry.plan(ids)?;
            if options.compose {
                plans.push(MacroPlan {
                    macro_id: COMPOSE_ID.to_string(),
                    operations: compose_ops(&scene_outputs(&macros)),
                });
            }
            return Ok(RunReport {
                ok: true,
                plans,
                manifest: None,
            });
        }

        if options.force_regenerate && !self.unsafe_mode {
            return Err(OrchestratorError::Blocked {
                action: "force_regenerate".to_string(),
                guard: UNSAFE_GUARD,
            });
        }

        let mut manifest = RunManifest::new(
            macros.iter().map(|m| m.id.to_string()).collect(),
            options.force_regenerate,
            options.validate,
            options.compose.then(|| COMPOSE_OUTPUT.to_string()),
        );
        tracing::info!(
            "run {} started: {}",
            manifest.run_id,
            manifest.requested.join(", ")
        );
        self.store.save(&manifest).await?;
        self.execute(&mut manifest, &macros, options.force_regenerate, options.validate)
            .await?;
        Ok(RunReport::finished(manifest))
    }

    /// Continue the persisted run with every macro whose last record is not
    /// `done`, in their original order, without forcing.
    pub async fn resume(&self) -> Result<RunReport, OrchestratorError> {
        let mut manifest = self
            .store
            .load()
            .await?
            .ok_or_else(|| OrchestratorError::NoManifest(self.store.path().to_path_buf()))?;

        let pending = manifest.pending();
        if pending.is_empty() && !manifest.compose_pending() {
            tracing::info!("run {} has nothing pending", manifest.run_id);
            return Ok(RunReport::finished(manifest));
        }

        let macros = self.registry.resolve(&pending)?;
        tracing::info!("resuming run {}: {}", manifest.run_id, pending.join(", "));
        manifest.ended_at = None;
        let validate = manifest.validate;
        self.execute(&mut manifest, &macros, false, validate).await?;
        Ok(RunReport::finished(manifest))
    }

    /// Check artifacts through the editor as one stop-on-error batch.
    ///
    /// Without `paths`, checks every artifact the manifest knows to exist.
    /// Scenes are structurally validated; other files must be readable.
    pub async fn validate(
        &self,
        paths: Option<Vec<String>>,
    ) -> Result<ValidationReport, OrchestratorError> {
        let paths = match paths {
            Some(paths) => paths,
            None => self
                .store
                .load()
                .await?
                .ok_or_else(|| OrchestratorError::NoManifest(self.store.path().to_path_buf()))?
                .artifacts(),
        };
        let ops: Vec<MacroOp> = paths.iter().map(|p| validation_op(p)).collect();
        if ops.is_empty() {
            return Ok(ValidationReport {
                ok: true,
                paths,
                failure: None,
            });
        }
        match self.executor.execute(&ops).await {
            Ok(_) => Ok(ValidationReport {
                ok: true,
                paths,
                failure: None,
            }),
            Err(OrchestratorError::Batch(remote)) => {
                tracing::warn!("validation failed: {}", remote);
                Ok(ValidationReport {
                    ok: false,
                    paths,
                    failure: Some(remote),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(
        &self,
        manifest: &mut RunManifest,
        macros: &[&MacroDefinition],
        force: bool,
        validate: bool,
    ) -> Result<(), OrchestratorError> {
        for (i, def) in macros.iter().enumerate() {
            let record = self.run_step(def.id, (def.build_ops)(), force, validate).await?;
            let failed = record.status == RunStatus::Failed;
            manifest.macros.push(record);

            if failed {
                let reason = format!("halted after '{}' failed", def.id);
                for rest in &macros[i + 1..] {
                    manifest.macros.push(MacroRunRecord::skipped(rest.id, reason.as_str()));
                }
                if manifest.compose.is_some() {
                    manifest.macros.push(MacroRunRecord::skipped(COMPOSE_ID, reason.as_str()));
                }
                manifest.ended_at = Some(Utc::now());
                self.store.save(manifest).await?;
                return Ok(());
            }
            self.store.save(manifest).await?;
        }

        if manifest.compose_pending() {
            let sources = self.compose_sources(&manifest.requested);
            let record = self
                .run_step(COMPOSE_ID, compose_ops(&sources), force, validate)
                .await?;
            manifest.macros.push(record);
        }
        manifest.ended_at = Some(Utc::now());
        self.store.save(manifest).await?;
        Ok(())
    }

    async fn run_step(
        &self,
        id: &str,
        ops: Vec<MacroOp>,
        force: bool,
        validate: bool,
    ) -> Result<MacroRunRecord, OrchestratorError> {
        let mut prepared = prepare_in_background(ops, self.project.clone(), force).await?;
        if validate {
            for path in prepared.created.iter().filter(|p| p.ends_with(SCENE_SUFFIX)) {
                prepared.ops.push(validation_op(path));
            }
        }

        if prepared.ops.is_empty() {
            tracing::info!("{}: nothing to do ({})", id, summary(&prepared));
            return Ok(
                MacroRunRecord::from_prepare(id, RunStatus::Done, &prepared)
                    .with_summary(summary(&prepared)),
            );
        }

        match self.executor.execute(&prepared.ops).await {
            Ok(_) => {
                tracing::info!("{}: done ({})", id, summary(&prepared));
                let mut record = MacroRunRecord::from_prepare(id, RunStatus::Done, &prepared)
                    .with_summary(summary(&prepared));
                record.operations_executed = prepared.ops.len();
                Ok(record)
            }
            Err(OrchestratorError::Batch(remote)) => {
                tracing::warn!("{}: batch failed: {}", id, remote);
                let mut record = MacroRunRecord::from_prepare(id, RunStatus::Failed, &prepared)
                    .with_summary(remote.message.clone());
                record.operations_executed = remote
                    .details
                    .get("completed")
                    .and_then(Value::as_u64)
                    .map_or(0, |n| n as usize);
                record.details = Some(Value::Object(remote.details));
                Ok(record)
            }
            Err(OrchestratorError::Bridge(err)) => {
                // The editor may still apply a timed-out batch.
                tracing::warn!("{}: transport failed: {}", id, err);
                let mut record = MacroRunRecord::from_prepare(id, RunStatus::Failed, &prepared)
                    .with_summary(err.to_string());
                record.details = Some(json!({
                    "transport": err.to_string(),
                    "outcomeUnknown": err.is_timeout(),
                }));
                Ok(record)
            }
            Err(other) => Err(other),
        }
    }

    fn compose_sources(&self, ids: &[String]) -> Vec<&'static str> {
        let macros: Vec<&MacroDefinition> = ids
            .iter()
            .filter_map(|id| self.registry.get(id).ok())
            .collect();
        scene_outputs(&macros)
    }
}

fn scene_outputs(macros: &[&MacroDefinition]) -> Vec<&'static str> {
    macros
        .iter()
        .flat_map(|m| m.outputs.iter().copied())
        .filter(|o| o.ends_with(SCENE_SUFFIX))
        .collect()
}

fn validation_op(path: &str) -> MacroOp {
    if path.ends_with(SCENE_SUFFIX) {
        MacroOp::new("validate_scene", json!({ "path": path }))
    } else {
        MacroOp::new("read_text_file", json!({ "path": path }))
    }
}

fn summary(prepared: &PrepareResult) -> String {
    format!(
        "{} created, {} unchanged, {} existing, {} different",
        prepared.created.len(),
        prepared.skipped_unchanged.len(),
        prepared.skipped_existing.len(),
        prepared.skipped_different.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::HeadlessExecutor;
    use tempfile::TempDir;

    fn two_files() -> Vec<MacroOp> {
        vec![
            MacroOp::new("write_text_file", json!({"path": "res://one.txt", "content": "1"})),
            MacroOp::new("write_text_file", json!({"path": "res://two.txt", "content": "2"})),
        ]
    }

    fn registry() -> Registry {
        Registry::new(vec![MacroDefinition {
            id: "files",
            title: "Files",
            description: "two text files",
            outputs: &["res://one.txt", "res://two.txt"],
            build_ops: two_files,
        }])
        .unwrap()
    }

    #[tokio::test]
    async fn dry_run_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let orchestrator =
            Orchestrator::new(&registry, dir.path(), HeadlessExecutor::new(dir.path(), false));
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let report = orchestrator.run(&["files"], options).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.plans[0].operations.len(), 2);
        assert!(report.manifest.is_none());
        assert!(!dir.path().join("one.txt").exists());
        assert!(!orchestrator.store().path().exists());
    }

    #[tokio::test]
    async fn force_without_unsafe_mode_is_blocked() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let orchestrator =
            Orchestrator::new(&registry, dir.path(), HeadlessExecutor::new(dir.path(), false));
        let options = RunOptions {
            force_regenerate: true,
            ..RunOptions::default()
        };
        let err = orchestrator.run(&["files"], options).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Blocked { guard: "unsafe_mode", .. }));
        assert!(!orchestrator.store().path().exists());
    }

    #[tokio::test]
    async fn unknown_macro_fails_before_any_work() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let orchestrator =
            Orchestrator::new(&registry, dir.path(), HeadlessExecutor::new(dir.path(), false));
        let err = orchestrator
            .run(&["files", "nope"], RunOptions::default())
            .await
            .unwrap_err();
        let OrchestratorError::UnknownMacro(unknown) = err else {
            panic!("expected unknown macro, got {err:?}");
        };
        assert_eq!(unknown.id, "nope");
        assert_eq!(unknown.supported, ["files"]);
        assert!(!dir.path().join("one.txt").exists());
    }

    #[tokio::test]
    async fn validate_uses_manifest_artifacts() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let orchestrator =
            Orchestrator::new(&registry, dir.path(), HeadlessExecutor::new(dir.path(), false));
        assert!(matches!(
            orchestrator.validate(None).await.unwrap_err(),
            OrchestratorError::NoManifest(_)
        ));

        orchestrator.run(&["files"], RunOptions::default()).await.unwrap();
        let report = orchestrator.validate(None).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.paths, ["res://one.txt", "res://two.txt"]);

        std::fs::remove_file(dir.path().join("two.txt")).unwrap();
        let report = orchestrator.validate(None).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.failure.unwrap().details["index"], 1);
    }
}
