//! Macro definitions and the immutable registry that holds them.

use crate::error::{OrchestratorError, UnknownMacro};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One primitive, data-only instruction for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroOp {
    pub operation: String,
    #[serde(default)]
    pub params: Value,
}

/// How the diff engine treats an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Creates the artifact at its `path` (a scene).
    CreateArtifact,
    /// Writes `content` to its `path`.
    WriteText,
    /// Edits the artifact named by its `scene` parameter.
    Nested,
    Other,
}

impl MacroOp {
    pub fn new(operation: impl Into<String>, params: Value) -> Self {
        Self {
            operation: operation.into(),
            params,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self.operation.as_str() {
            "create_scene" => OpKind::CreateArtifact,
            "write_text_file" => OpKind::WriteText,
            _ if self.param("scene").is_some() => OpKind::Nested,
            _ => OpKind::Other,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// The artifact this operation addresses, if any.
    pub fn artifact(&self) -> Option<&str> {
        match self.kind() {
            OpKind::CreateArtifact | OpKind::WriteText => self.param("path"),
            OpKind::Nested => self.param("scene"),
            OpKind::Other => None,
        }
    }

    /// Copy with one more parameter set.
    pub fn with_param(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut params = match &self.params {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        params.insert(name.to_string(), value.into());
        Self::new(self.operation.clone(), Value::Object(params))
    }
}

/// An immutable macro: metadata plus a pure op generator.
#[derive(Debug, Clone, Copy)]
pub struct MacroDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub outputs: &'static [&'static str],
    /// Must not perform I/O; identical calls yield identical lists.
    pub build_ops: fn() -> Vec<MacroOp>,
}

/// Serializable view of a definition for `list`/`describe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub outputs: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<MacroOp>>,
}

/// Raw expansion of one macro.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroPlan {
    pub macro_id: String,
    pub operations: Vec<MacroOp>,
}

/// Macros by id, in registration order.
#[derive(Debug, Clone)]
pub struct Registry {
    macros: Vec<MacroDefinition>,
}

impl Registry {
    pub fn new(macros: Vec<MacroDefinition>) -> Result<Self, OrchestratorError> {
        let mut seen = HashSet::new();
        for def in &macros {
            if !seen.insert(def.id) {
                return Err(OrchestratorError::DuplicateMacro(def.id.to_string()));
            }
        }
        Ok(Self { macros })
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.macros.iter().map(|m| m.id)
    }

    pub fn get(&self, id: &str) -> Result<&MacroDefinition, UnknownMacro> {
        self.macros
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| UnknownMacro {
                id: id.to_string(),
                supported: self.ids().map(str::to_string).collect(),
            })
    }

    /// Every id must resolve; the first unknown one is reported.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&MacroDefinition>, UnknownMacro> {
        ids.iter().map(|id| self.get(id.as_ref())).collect()
    }

    pub fn list(&self) -> Vec<MacroInfo> {
        self.macros.iter().map(|m| info(m, false)).collect()
    }

    pub fn describe(&self, id: &str) -> Result<MacroInfo, UnknownMacro> {
        self.get(id).map(|m| info(m, true))
    }

    /// Expand without diffing or executing.
    pub fn plan<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<MacroPlan>, UnknownMacro> {
        Ok(self
            .resolve(ids)?
            .into_iter()
            .map(|m| MacroPlan {
                macro_id: m.id.to_string(),
                operations: (m.build_ops)(),
            })
            .collect())
    }
}

fn info(def: &MacroDefinition, with_ops: bool) -> MacroInfo {
    MacroInfo {
        id: def.id,
        title: def.title,
        description: def.description,
        outputs: def.outputs,
        operations: with_ops.then(|| (def.build_ops)()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one() -> Vec<MacroOp> {
        vec![MacroOp::new(
            "write_text_file",
            json!({"path": "res://one.txt", "content": "1"}),
        )]
    }

    fn def(id: &'static str) -> MacroDefinition {
        MacroDefinition {
            id,
            title: "One",
            description: "writes one.txt",
            outputs: &["res://one.txt"],
            build_ops: one,
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Registry::new(vec![def("a"), def("a")]).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateMacro(id) if id == "a"));
    }

    #[test]
    fn unknown_macro_names_the_supported_set() {
        let registry = Registry::new(vec![def("a"), def("b")]).unwrap();
        let err = registry.resolve(&["a", "zzz"]).unwrap_err();
        assert_eq!(err.id, "zzz");
        assert_eq!(err.supported, ["a", "b"]);
    }

    #[test]
    fn op_kinds_and_artifacts() {
        let create = MacroOp::new("create_scene", json!({"path": "res://s.scene.json"}));
        let nested = MacroOp::new("add_node", json!({"scene": "res://s.scene.json"}));
        let other = MacroOp::new("filesystem_scan", json!({}));
        assert_eq!(create.kind(), OpKind::CreateArtifact);
        assert_eq!(nested.artifact(), Some("res://s.scene.json"));
        assert_eq!(other.artifact(), None);
        assert_eq!(create.with_param("overwrite", true).params["overwrite"], true);
    }

    #[test]
    fn plan_is_pure_and_repeatable() {
        let registry = Registry::new(vec![def("a")]).unwrap();
        assert_eq!(registry.plan(&["a"]).unwrap(), registry.plan(&["a"]).unwrap());
        assert!(registry.describe("a").unwrap().operations.is_some());
        assert!(registry.list()[0].operations.is_none());
    }
}
