//! Diffing desired operations against what is already on disk.
//!
//! Two passes over the op list:
//!
//! 1. every `create_scene` whose target exists (and no force) marks that
//!    artifact as skip-existing;
//! 2. ops addressed at a skip-existing artifact are dropped, text writes are
//!    compared byte-for-byte with the current file, everything else passes.
//!
//! Kept ops that will replace an existing artifact carry `overwrite: true` so
//! the editor applies its own unsafe-mode guard.

use crate::error::OrchestratorError;
use crate::registry::{MacroOp, OpKind};
use scenewright_core::ProjectPath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResult {
    pub planned_ops: usize,
    /// The subset to execute, in original order.
    pub ops: Vec<MacroOp>,
    pub created: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub skipped_unchanged: Vec<String>,
    pub skipped_different: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, path: &ProjectPath) {
    let path = path.to_string();
    if !list.contains(&path) {
        list.push(path);
    }
}

fn parse_target(op: &MacroOp, raw: Option<&str>) -> Result<ProjectPath, OrchestratorError> {
    let invalid = |reason: String| OrchestratorError::InvalidOp {
        operation: op.operation.clone(),
        reason,
    };
    raw.ok_or_else(|| invalid("missing path".into()))?
        .parse()
        .map_err(|e| invalid(format!("{e}")))
}

/// [`prepare`] on the blocking pool, since it stats and reads project files.
pub async fn prepare_in_background(
    ops: Vec<MacroOp>,
    root: PathBuf,
    force_regenerate: bool,
) -> Result<PrepareResult, OrchestratorError> {
    tokio::task::spawn_blocking(move || prepare(&ops, &root, force_regenerate)).await?
}

pub fn prepare(
    ops: &[MacroOp],
    root: &Path,
    force_regenerate: bool,
) -> Result<PrepareResult, OrchestratorError> {
    let mut result = PrepareResult {
        planned_ops: ops.len(),
        ..PrepareResult::default()
    };

    let mut skip_existing = HashSet::new();
    for op in ops.iter().filter(|op| op.kind() == OpKind::CreateArtifact) {
        let target = parse_target(op, op.artifact())?;
        if !force_regenerate && target.to_fs_path(root).exists() {
            skip_existing.insert(target);
        }
    }

    for op in ops {
        let target = match op.kind() {
            OpKind::Other => {
                result.ops.push(op.clone());
                continue;
            }
            _ => parse_target(op, op.artifact())?,
        };

        if skip_existing.contains(&target) {
            if op.kind() == OpKind::CreateArtifact {
                push_unique(&mut result.skipped_existing, &target);
            }
            continue;
        }

        let fs_path = target.to_fs_path(root);
        match op.kind() {
            OpKind::WriteText => {
                let desired = op.param("content").ok_or_else(|| OrchestratorError::InvalidOp {
                    operation: op.operation.clone(),
                    reason: "missing content".into(),
                })?;
                match std::fs::read(&fs_path) {
                    Err(_) if !fs_path.exists() => {
                        push_unique(&mut result.created, &target);
                        result.ops.push(op.clone());
                    }
                    Ok(current) if current == desired.as_bytes() => {
                        push_unique(&mut result.skipped_unchanged, &target);
                    }
                    _ if !force_regenerate => {
                        push_unique(&mut result.skipped_different, &target);
                    }
                    _ => {
                        push_unique(&mut result.created, &target);
                        result.ops.push(op.with_param("overwrite", true));
                    }
                }
            }
            OpKind::CreateArtifact => {
                push_unique(&mut result.created, &target);
                if fs_path.exists() {
                    result.ops.push(op.with_param("overwrite", true));
                } else {
                    result.ops.push(op.clone());
                }
            }
            OpKind::Nested | OpKind::Other => result.ops.push(op.clone()),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &str, content: &str) -> MacroOp {
        MacroOp::new("write_text_file", json!({"path": path, "content": content}))
    }

    fn scene_ops() -> Vec<MacroOp> {
        vec![
            MacroOp::new("create_scene", json!({"path": "res://s.scene.json"})),
            MacroOp::new(
                "add_node",
                json!({"scene": "res://s.scene.json", "name": "A", "class": "Node2D"}),
            ),
            MacroOp::new("save_scene", json!({"scene": "res://s.scene.json"})),
            MacroOp::new("filesystem_scan", json!({})),
        ]
    }

    #[test]
    fn fresh_project_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let mut ops = scene_ops();
        ops.push(write("res://a.txt", "X"));
        let result = prepare(&ops, dir.path(), false).unwrap();
        assert_eq!(result.planned_ops, 5);
        assert_eq!(result.ops, ops);
        assert_eq!(result.created, ["res://s.scene.json", "res://a.txt"]);
    }

    #[test]
    fn text_writes_are_compared_by_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("same.txt"), "X").unwrap();
        std::fs::write(dir.path().join("diff.txt"), "Y").unwrap();
        let ops = vec![
            write("res://same.txt", "X"),
            write("res://diff.txt", "X"),
            write("res://new.txt", "X"),
        ];

        let result = prepare(&ops, dir.path(), false).unwrap();
        assert_eq!(result.skipped_unchanged, ["res://same.txt"]);
        assert_eq!(result.skipped_different, ["res://diff.txt"]);
        assert_eq!(result.created, ["res://new.txt"]);
        assert_eq!(result.ops.len(), 1);

        let forced = prepare(&ops, dir.path(), true).unwrap();
        assert_eq!(forced.skipped_unchanged, ["res://same.txt"]);
        assert_eq!(forced.created, ["res://diff.txt", "res://new.txt"]);
        assert_eq!(forced.ops[0].params["overwrite"], true);
        assert!(forced.ops[1].params.get("overwrite").is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn background_prepare_sees_the_same_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("same.txt"), "X").unwrap();
        let ops = vec![write("res://same.txt", "X"), write("res://new.txt", "X")];

        let result = prepare_in_background(ops.clone(), dir.path().to_path_buf(), false)
            .await
            .unwrap();
        assert_eq!(result, prepare(&ops, dir.path(), false).unwrap());
        assert_eq!(result.skipped_unchanged, ["res://same.txt"]);

        let err = prepare_in_background(vec![write("../out.txt", "X")], dir.path().into(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOp { .. }));
    }

    #[test]
    fn existing_artifact_drops_its_nested_ops() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("s.scene.json"), "{}").unwrap();
        let result = prepare(&scene_ops(), dir.path(), false).unwrap();
        assert_eq!(result.skipped_existing, ["res://s.scene.json"]);
        assert_eq!(result.ops.len(), 1);
        assert_eq!(result.ops[0].operation, "filesystem_scan");

        let forced = prepare(&scene_ops(), dir.path(), true).unwrap();
        assert_eq!(forced.ops.len(), 4);
        assert_eq!(forced.ops[0].params["overwrite"], true);
        assert_eq!(forced.created, ["res://s.scene.json"]);
    }

    #[test]
    fn paths_outside_the_project_are_invalid() {
        let dir = TempDir::new().unwrap();
        let err = prepare(&[write("../escape.txt", "X")], dir.path(), false).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOp { .. }));
    }
}
