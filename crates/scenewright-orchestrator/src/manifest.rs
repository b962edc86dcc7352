//! Persisted run manifests.
//!
//! The manifest lives at `<project>/.scenewright/manifest.json`. Every save
//! writes a sibling temp file and renames it over the target, so a reader
//! never observes a partially written manifest.

use crate::catalog::COMPOSE_ID;
use crate::error::ManifestError;
use crate::prepare::PrepareResult;
use chrono::{DateTime, Utc};
use scenewright_host::STATE_DIR;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroRunRecord {
    pub macro_id: String,
    pub status: RunStatus,
    pub operations_planned: usize,
    pub operations_executed: usize,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub skipped_existing: Vec<String>,
    #[serde(default)]
    pub skipped_unchanged: Vec<String>,
    #[serde(default)]
    pub skipped_different: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl MacroRunRecord {
    pub fn from_prepare(macro_id: &str, status: RunStatus, prepared: &PrepareResult) -> Self {
        Self {
            macro_id: macro_id.to_string(),
            status,
            operations_planned: prepared.planned_ops,
            operations_executed: 0,
            created: prepared.created.clone(),
            skipped_existing: prepared.skipped_existing.clone(),
            skipped_unchanged: prepared.skipped_unchanged.clone(),
            skipped_different: prepared.skipped_different.clone(),
            summary: None,
            details: None,
        }
    }

    /// A macro that never started because an earlier one failed.
    pub fn skipped(macro_id: &str, reason: impl Into<String>) -> Self {
        Self {
            summary: Some(reason.into()),
            ..Self::from_prepare(macro_id, RunStatus::Skipped, &PrepareResult::default())
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Macro ids of the run, in execution order.
    #[serde(default)]
    pub requested: Vec<String>,
    /// Compose output, when the run composes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<String>,
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub validate: bool,
    /// Append-only.
    pub macros: Vec<MacroRunRecord>,
}

impl RunManifest {
    pub fn new(
        requested: Vec<String>,
        force_regenerate: bool,
        validate: bool,
        compose: Option<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            requested,
            compose,
            force_regenerate,
            validate,
            macros: Vec::new(),
        }
    }

    /// Status of the most recent record for `id`.
    pub fn last_status(&self, id: &str) -> Option<RunStatus> {
        self.macros
            .iter()
            .rev()
            .find(|r| r.macro_id == id)
            .map(|r| r.status)
    }

    /// Requested macros whose last record is not `done`, in request order.
    pub fn pending(&self) -> Vec<String> {
        self.requested
            .iter()
            .filter(|id| self.last_status(id) != Some(RunStatus::Done))
            .cloned()
            .collect()
    }

    pub fn compose_pending(&self) -> bool {
        self.compose.is_some() && self.last_status(COMPOSE_ID) != Some(RunStatus::Done)
    }

    /// Every requested step finished.
    pub fn ok(&self) -> bool {
        self.pending().is_empty() && !self.compose_pending()
    }

    /// Artifacts known to exist after the run: created or left untouched by
    /// each step's latest successful record.
    pub fn artifacts(&self) -> Vec<String> {
        let mut ids: Vec<&str> = self.requested.iter().map(String::as_str).collect();
        if self.compose.is_some() {
            ids.push(COMPOSE_ID);
        }
        let mut paths = Vec::new();
        for id in ids {
            let Some(record) = self.macros.iter().rev().find(|r| r.macro_id == id) else {
                continue;
            };
            if record.status != RunStatus::Done {
                continue;
            }
            for path in record
                .created
                .iter()
                .chain(&record.skipped_existing)
                .chain(&record.skipped_unchanged)
                .chain(&record.skipped_different)
            {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }
}

/// Reads and atomically replaces a project's manifest.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn for_project(root: &Path) -> Self {
        Self {
            path: root.join(STATE_DIR).join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// `None` when no run has been recorded yet.
    pub async fn load(&self) -> Result<Option<RunManifest>, ManifestError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ManifestError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let parse_error = |source| ManifestError::Parse {
            path: self.path.clone(),
            source,
        };
        let raw: Value = serde_json::from_slice(&bytes).map_err(parse_error)?;
        let found = raw
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if found != u64::from(SCHEMA_VERSION) {
            return Err(ManifestError::UnsupportedSchema {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: SCHEMA_VERSION,
            });
        }
        serde_json::from_value(raw).map(Some).map_err(parse_error)
    }

    pub async fn save(&self, manifest: &RunManifest) -> Result<(), ManifestError> {
        let io_error = |source| ManifestError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(manifest).map_err(|source| ManifestError::Parse {
            path: self.path.clone(),
            source,
        })?;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await.map_err(io_error)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(io_error)?;
        tracing::debug!("saved manifest {} ({} records)", self.path.display(), manifest.macros.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, status: RunStatus) -> MacroRunRecord {
        MacroRunRecord::from_prepare(id, status, &PrepareResult::default())
    }

    #[test]
    fn pending_uses_the_last_record() {
        let mut manifest = RunManifest::new(
            vec!["a".into(), "b".into(), "c".into()],
            false,
            false,
            None,
        );
        manifest.macros.push(record("a", RunStatus::Done));
        manifest.macros.push(record("b", RunStatus::Failed));
        manifest.macros.push(MacroRunRecord::skipped("c", "halted"));
        assert_eq!(manifest.pending(), ["b", "c"]);
        assert!(!manifest.ok());

        manifest.macros.push(record("b", RunStatus::Done));
        manifest.macros.push(record("c", RunStatus::Done));
        assert!(manifest.pending().is_empty());
        assert!(manifest.ok());
    }

    #[test]
    fn compose_counts_as_a_step() {
        let mut manifest = RunManifest::new(vec!["a".into()], false, false, Some("res://m.scene.json".into()));
        manifest.macros.push(record("a", RunStatus::Done));
        assert!(manifest.compose_pending());
        manifest.macros.push(record(COMPOSE_ID, RunStatus::Done));
        assert!(manifest.ok());
    }

    #[tokio::test]
    async fn save_then_load_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_project(dir.path());
        assert!(store.load().await.unwrap().is_none());

        let mut manifest = RunManifest::new(vec!["a".into()], false, true, None);
        let mut done = record("a", RunStatus::Done);
        done.created = vec!["res://x.scene.json".into(), "res://x.gd".into()];
        manifest.macros.push(done);
        store.save(&manifest).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.artifacts(), ["res://x.scene.json", "res://x.gd"]);
        assert!(!store.path().with_extension("json.tmp").exists());

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"schemaVersion\": 1"));
        assert!(text.contains("\"runId\""));
    }

    #[tokio::test]
    async fn unknown_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_project(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"schemaVersion": 7, "macros": []}"#).unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedSchema { found: 7, .. }));
    }
}
