//! Scene documents: a named tree of nodes persisted as JSON.
//!
//! Node paths are relative to the scene root: `.` is the root itself,
//! `Player/Sprite` is the `Sprite` child of the root's `Player` child.

use scenewright_core::{ProjectPath, Variant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// File suffix of scene artifacts.
pub const SCENE_SUFFIX: &str = ".scene.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConnection {
    pub signal: String,
    /// Node path of the receiver, relative to the scene root.
    pub target: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Process-unique instance handle; not persisted.
    pub id: u64,
    pub name: String,
    pub class: String,
    pub properties: BTreeMap<String, Variant>,
    pub script: Option<ProjectPath>,
    /// Scene this node instances, if any.
    pub instance: Option<ProjectPath>,
    pub connections: Vec<SignalConnection>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(id: u64, name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            class: class.into(),
            properties: BTreeMap::new(),
            script: None,
            instance: None,
            connections: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    fn find_path_of(&self, id: u64, here: &str) -> Option<String> {
        if self.id == id {
            return Some(here.to_string());
        }
        self.children
            .iter()
            .find_map(|c| c.find_path_of(id, &join(here, &c.name)))
    }

    fn find_id_mut(&mut self, id: u64) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_id_mut(id))
    }
}

/// Split a node path into segments; the root yields none.
pub fn segments(node_path: &str) -> Vec<&str> {
    node_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Child path of `parent`.
pub fn join(parent: &str, name: &str) -> String {
    if segments(parent).is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", segments(parent).join("/"), name)
    }
}

/// `(parent_path, name)` for a non-root path.
pub fn split_parent(node_path: &str) -> Option<(String, String)> {
    let mut segs = segments(node_path);
    let name = segs.pop()?;
    let parent = if segs.is_empty() {
        ".".to_string()
    } else {
        segs.join("/")
    };
    Some((parent, name.to_string()))
}

/// An open scene.
#[derive(Debug, Clone)]
pub struct SceneDocument {
    pub path: ProjectPath,
    pub root: Node,
    /// Modified since the last load/save.
    pub dirty: bool,
}

impl SceneDocument {
    pub fn new(path: ProjectPath, root: Node) -> Self {
        Self {
            path,
            root,
            dirty: false,
        }
    }

    pub fn node(&self, node_path: &str) -> Option<&Node> {
        segments(node_path)
            .into_iter()
            .try_fold(&self.root, |node, seg| node.child(seg))
    }

    pub fn node_mut(&mut self, node_path: &str) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for seg in segments(node_path) {
            node = node.children.iter_mut().find(|c| c.name == seg)?;
        }
        Some(node)
    }

    /// Path of the node with handle `id`, if it lives in this scene.
    pub fn path_of(&self, id: u64) -> Option<String> {
        self.root.find_path_of(id, ".")
    }

    pub fn node_by_id_mut(&mut self, id: u64) -> Option<&mut Node> {
        self.root.find_id_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.root.subtree_len()
    }

    /// Structural problems: duplicate sibling names and dangling signal
    /// targets.
    pub fn structural_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.walk(&self.root, ".", &mut |path, node| {
            let mut seen = HashSet::new();
            for child in &node.children {
                if !seen.insert(child.name.as_str()) {
                    problems.push(format!("duplicate child name '{}' under {}", child.name, path));
                }
            }
            for conn in &node.connections {
                if self.node(&conn.target).is_none() {
                    problems.push(format!(
                        "signal '{}' on {} targets missing node '{}'",
                        conn.signal, path, conn.target
                    ));
                }
            }
        });
        problems
    }

    /// Visit every node with its path, parents first.
    pub fn walk<'a>(&'a self, node: &'a Node, path: &str, visit: &mut impl FnMut(&str, &'a Node)) {
        visit(path, node);
        for child in &node.children {
            self.walk(child, &join(path, &child.name), visit);
        }
    }

    /// Pretty JSON as written to disk.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = SceneFile {
            format: FORMAT_VERSION,
            root: NodeFile::from_node(&self.root),
        };
        let mut text = serde_json::to_string_pretty(&file)?;
        text.push('\n');
        Ok(text)
    }

    /// Parse a scene file, assigning fresh handles from `next_id`.
    pub fn parse(
        path: ProjectPath,
        text: &str,
        next_id: &mut impl FnMut() -> u64,
    ) -> Result<Self, serde_json::Error> {
        let file: SceneFile = serde_json::from_str(text)?;
        Ok(Self::new(path, file.root.into_node(next_id)))
    }
}

#[derive(Serialize, Deserialize)]
struct SceneFile {
    format: u32,
    root: NodeFile,
}

#[derive(Serialize, Deserialize)]
struct NodeFile {
    name: String,
    #[serde(rename = "type")]
    class: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<ProjectPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance: Option<ProjectPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    connections: Vec<SignalConnection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeFile>,
}

impl NodeFile {
    fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            class: node.class.clone(),
            properties: node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_tagged_json()))
                .collect(),
            script: node.script.clone(),
            instance: node.instance.clone(),
            connections: node.connections.clone(),
            children: node.children.iter().map(NodeFile::from_node).collect(),
        }
    }

    fn into_node(self, next_id: &mut impl FnMut() -> u64) -> Node {
        let mut node = Node::new(next_id(), self.name, self.class);
        node.properties = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Variant::from_json(v)))
            .collect();
        node.script = self.script;
        node.instance = self.instance;
        node.connections = self.connections;
        node.children = self
            .children
            .into_iter()
            .map(|c| c.into_node(next_id))
            .collect();
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SceneDocument {
        let mut root = Node::new(1, "Player", "CharacterBody2D");
        let mut sprite = Node::new(2, "Sprite", "Sprite2D");
        sprite
            .properties
            .insert("position".into(), Variant::Vector2(4.0, 8.0));
        root.children.push(sprite);
        root.children.push(Node::new(3, "Shape", "CollisionShape2D"));
        SceneDocument::new("res://player.scene.json".parse().unwrap(), root)
    }

    #[test]
    fn path_helpers() {
        assert_eq!(join(".", "A"), "A");
        assert_eq!(join("A/B", "C"), "A/B/C");
        assert_eq!(split_parent("A/B"), Some(("A".into(), "B".into())));
        assert_eq!(split_parent("A"), Some((".".into(), "A".into())));
        assert_eq!(split_parent("."), None);
    }

    #[test]
    fn lookup_by_path_and_id() {
        let mut doc = sample();
        assert_eq!(doc.node(".").unwrap().name, "Player");
        assert_eq!(doc.node("Sprite").unwrap().class, "Sprite2D");
        assert!(doc.node("Sprite/Missing").is_none());
        assert_eq!(doc.path_of(3).as_deref(), Some("Shape"));
        assert_eq!(doc.node_by_id_mut(2).unwrap().name, "Sprite");
        assert_eq!(doc.node_count(), 3);
    }

    #[test]
    fn json_roundtrip_reassigns_ids() {
        let doc = sample();
        let text = doc.to_json().unwrap();
        let mut next = 100;
        let parsed = SceneDocument::parse(doc.path.clone(), &text, &mut || {
            next += 1;
            next
        })
        .unwrap();
        assert_eq!(parsed.root.id, 101);
        assert_eq!(
            parsed.node("Sprite").unwrap().properties["position"],
            Variant::Vector2(4.0, 8.0)
        );
        assert_eq!(parsed.to_json().unwrap(), text);
    }

    #[test]
    fn dangling_connection_is_reported() {
        let mut doc = sample();
        doc.root.connections.push(SignalConnection {
            signal: "ready".into(),
            target: "Ghost".into(),
            method: "_on_ready".into(),
        });
        doc.root.children.push(Node::new(4, "Shape", "Node2D"));
        let problems = doc.structural_problems();
        assert_eq!(problems.len(), 2);
    }
}
