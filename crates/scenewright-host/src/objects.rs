//! Reflective access to host objects.
//!
//! `call`/`set`/`get`/`inspect_object` address a [`Target`], which resolves to
//! a `&mut dyn HostObject` regardless of whether it names a singleton, a node
//! or a resource.

use crate::classdb;
use crate::scene::Node;
use scenewright_core::{ProjectPath, RemoteError, Variant};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Singletons refused unless unsafe mode is on: raw OS access, raw file
/// access and global project settings.
pub const BLOCKED_SINGLETONS: &[&str] = &["OS", "FileAccess", "ProjectSettings"];

/// Uniform member access over every addressable object.
pub trait HostObject: Send {
    fn class_name(&self) -> &str;

    fn instance_id(&self) -> Option<u64> {
        None
    }

    fn property_names(&self) -> Vec<String>;

    fn get(&self, property: &str) -> Option<Variant>;

    fn set(&mut self, property: &str, value: Variant) -> Result<(), RemoteError>;

    fn method_names(&self) -> Vec<&'static str>;

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError>;
}

fn no_method(class: &str, method: &str) -> RemoteError {
    RemoteError::not_found("method", format!("{class}.{method}"))
}

fn read_only(class: &str, property: &str) -> RemoteError {
    RemoteError::invalid_param("property", format!("{class}.{property} is read-only"))
}

fn arg<'a>(args: &'a [Variant], index: usize, method: &str) -> Result<&'a Variant, RemoteError> {
    args.get(index).ok_or_else(|| {
        RemoteError::invalid_param("args", format!("{method} expects an argument at position {index}"))
    })
}

fn str_arg<'a>(args: &'a [Variant], index: usize, method: &str) -> Result<&'a str, RemoteError> {
    arg(args, index, method)?.as_str().ok_or_else(|| {
        RemoteError::invalid_param("args", format!("{method} expects a string at position {index}"))
    })
}

/// How a reflective request names its object.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Singleton(String),
    Node(NodeRef),
    Resource(ResourceRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    /// Path in the edited scene.
    Path(String),
    Id(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRef {
    Path(ProjectPath),
    Id(u64),
}

impl Target {
    /// Parse `{"kind": "singleton"|"node"|"resource", "name"|"path"|"id": ..}`.
    pub fn from_json(value: &Value) -> Result<Self, RemoteError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RemoteError::invalid_param("target", "expected an object"))?;
        let kind = obj
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::missing_param("target.kind"))?;
        let id = obj.get("id").and_then(Value::as_u64);
        let path = obj.get("path").and_then(Value::as_str);

        match kind {
            "singleton" => obj
                .get("name")
                .and_then(Value::as_str)
                .map(|n| Target::Singleton(n.to_string()))
                .ok_or_else(|| RemoteError::missing_param("target.name")),
            "node" => match (id, path) {
                (Some(id), _) => Ok(Target::Node(NodeRef::Id(id))),
                (None, Some(p)) => Ok(Target::Node(NodeRef::Path(p.to_string()))),
                (None, None) => Err(RemoteError::missing_param("target.path")),
            },
            "resource" => match (id, path) {
                (Some(id), _) => Ok(Target::Resource(ResourceRef::Id(id))),
                (None, Some(p)) => p
                    .parse()
                    .map(|p| Target::Resource(ResourceRef::Path(p)))
                    .map_err(|e| RemoteError::invalid_param("target.path", e)),
                (None, None) => Err(RemoteError::missing_param("target.path")),
            },
            other => Err(RemoteError::invalid_param(
                "target.kind",
                format!("expected singleton, node or resource, got '{other}'"),
            )),
        }
    }

    /// The identifier used in not-found errors.
    pub fn identifier(&self) -> Value {
        match self {
            Target::Singleton(name) => Value::from(name.as_str()),
            Target::Node(NodeRef::Path(p)) => Value::from(p.as_str()),
            Target::Node(NodeRef::Id(id)) | Target::Resource(ResourceRef::Id(id)) => {
                Value::from(*id)
            }
            Target::Resource(ResourceRef::Path(p)) => Value::from(p.to_string()),
        }
    }
}

/// Properties that are node attributes rather than entries in the
/// property map.
const NODE_ATTRIBUTES: &[&str] = &["name", "class", "script", "instance"];

impl HostObject for Node {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn instance_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn property_names(&self) -> Vec<String> {
        NODE_ATTRIBUTES
            .iter()
            .map(|s| s.to_string())
            .chain(self.properties.keys().cloned())
            .collect()
    }

    fn get(&self, property: &str) -> Option<Variant> {
        match property {
            "name" => Some(Variant::from(self.name.as_str())),
            "class" => Some(Variant::from(self.class.as_str())),
            "script" => Some(
                self.script
                    .as_ref()
                    .map(|p| Variant::from(p.to_string()))
                    .unwrap_or_default(),
            ),
            "instance" => Some(
                self.instance
                    .as_ref()
                    .map(|p| Variant::from(p.to_string()))
                    .unwrap_or_default(),
            ),
            other => self.properties.get(other).cloned(),
        }
    }

    fn set(&mut self, property: &str, value: Variant) -> Result<(), RemoteError> {
        if NODE_ATTRIBUTES.contains(&property) {
            return Err(read_only(&self.class, property));
        }
        self.properties.insert(property.to_string(), value);
        Ok(())
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec![
            "get_child_count",
            "get_children",
            "get_class",
            "is_class",
            "has_node",
        ]
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_child_count" => Ok(Variant::Int(self.children.len() as i64)),
            "get_children" => Ok(Variant::Array(
                self.children
                    .iter()
                    .map(|c| Variant::from(c.name.as_str()))
                    .collect(),
            )),
            "get_class" => Ok(Variant::from(self.class.as_str())),
            "is_class" => Ok(Variant::Bool(classdb::is_a(
                &self.class,
                str_arg(args, 0, method)?,
            ))),
            "has_node" => {
                let path = str_arg(args, 0, method)?;
                let found = crate::scene::segments(path)
                    .into_iter()
                    .try_fold(&*self, |node, seg| node.child(seg))
                    .is_some();
                Ok(Variant::Bool(found))
            }
            _ => Err(no_method(&self.class, method)),
        }
    }
}

/// A text-backed resource (script, shader, plain text) loaded from disk.
#[derive(Debug, Clone)]
pub struct TextResource {
    pub id: u64,
    pub path: ProjectPath,
    pub fs_path: PathBuf,
    pub text: String,
    class: &'static str,
}

impl TextResource {
    pub fn load(id: u64, path: ProjectPath, root: &Path) -> std::io::Result<Self> {
        let fs_path = path.to_fs_path(root);
        let text = std::fs::read_to_string(&fs_path)?;
        let class = match path.file_name().rsplit('.').next() {
            Some("gd") => "GDScript",
            Some("gdshader") => "Shader",
            Some("json") => "JSON",
            _ => "TextFile",
        };
        Ok(Self {
            id,
            path,
            fs_path,
            text,
            class,
        })
    }
}

impl HostObject for TextResource {
    fn class_name(&self) -> &str {
        self.class
    }

    fn instance_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn property_names(&self) -> Vec<String> {
        vec!["resource_path".into(), "text".into()]
    }

    fn get(&self, property: &str) -> Option<Variant> {
        match property {
            "resource_path" => Some(Variant::from(self.path.to_string())),
            "text" | "source_code" => Some(Variant::from(self.text.as_str())),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Variant) -> Result<(), RemoteError> {
        match property {
            "text" | "source_code" => {
                self.text = value
                    .as_str()
                    .ok_or_else(|| RemoteError::invalid_param("value", "expected a string"))?
                    .to_string();
                Ok(())
            }
            other => Err(read_only(self.class, other)),
        }
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec!["get_line_count", "reload"]
    }

    fn call(&mut self, method: &str, _args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_line_count" => Ok(Variant::Int(self.text.lines().count() as i64)),
            "reload" => {
                self.text = std::fs::read_to_string(&self.fs_path).map_err(|e| {
                    RemoteError::failed(format!("reloading {} failed: {e}", self.path))
                })?;
                Ok(Variant::Nil)
            }
            _ => Err(no_method(self.class, method)),
        }
    }
}

struct Engine {
    time_scale: f64,
    physics_ticks_per_second: i64,
}

impl HostObject for Engine {
    fn class_name(&self) -> &str {
        "Engine"
    }

    fn property_names(&self) -> Vec<String> {
        vec!["time_scale".into(), "physics_ticks_per_second".into()]
    }

    fn get(&self, property: &str) -> Option<Variant> {
        match property {
            "time_scale" => Some(Variant::Float(self.time_scale)),
            "physics_ticks_per_second" => Some(Variant::Int(self.physics_ticks_per_second)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Variant) -> Result<(), RemoteError> {
        match (property, value) {
            ("time_scale", Variant::Float(v)) => self.time_scale = v,
            ("time_scale", Variant::Int(v)) => self.time_scale = v as f64,
            ("physics_ticks_per_second", Variant::Int(v)) if v > 0 => {
                self.physics_ticks_per_second = v
            }
            ("time_scale" | "physics_ticks_per_second", other) => {
                return Err(RemoteError::invalid_param(
                    "value",
                    format!("unsupported value {other} for Engine.{property}"),
                ));
            }
            (other, _) => return Err(RemoteError::not_found("property", format!("Engine.{other}"))),
        }
        Ok(())
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec!["get_version_info"]
    }

    fn call(&mut self, method: &str, _args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_version_info" => Ok(Variant::Dictionary(vec![
                (Variant::from("name"), Variant::from("scenewright")),
                (
                    Variant::from("string"),
                    Variant::from(env!("CARGO_PKG_VERSION")),
                ),
            ])),
            _ => Err(no_method("Engine", method)),
        }
    }
}

#[derive(Default)]
struct ProjectSettings {
    settings: BTreeMap<String, Variant>,
}

impl HostObject for ProjectSettings {
    fn class_name(&self) -> &str {
        "ProjectSettings"
    }

    fn property_names(&self) -> Vec<String> {
        self.settings.keys().cloned().collect()
    }

    fn get(&self, property: &str) -> Option<Variant> {
        self.settings.get(property).cloned()
    }

    fn set(&mut self, property: &str, value: Variant) -> Result<(), RemoteError> {
        self.settings.insert(property.to_string(), value);
        Ok(())
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec!["get_setting", "set_setting", "has_setting", "clear"]
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_setting" => {
                let name = str_arg(args, 0, method)?;
                Ok(self
                    .settings
                    .get(name)
                    .cloned()
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or_default())
            }
            "set_setting" => {
                let name = str_arg(args, 0, method)?.to_string();
                let value = arg(args, 1, method)?.clone();
                self.settings.insert(name, value);
                Ok(Variant::Nil)
            }
            "has_setting" => Ok(Variant::Bool(
                self.settings.contains_key(str_arg(args, 0, method)?),
            )),
            "clear" => {
                self.settings.remove(str_arg(args, 0, method)?);
                Ok(Variant::Nil)
            }
            _ => Err(no_method("ProjectSettings", method)),
        }
    }
}

struct Os;

impl HostObject for Os {
    fn class_name(&self) -> &str {
        "OS"
    }

    fn property_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn get(&self, _property: &str) -> Option<Variant> {
        None
    }

    fn set(&mut self, property: &str, _value: Variant) -> Result<(), RemoteError> {
        Err(read_only("OS", property))
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec![
            "get_name",
            "get_environment",
            "has_environment",
            "get_processor_count",
        ]
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_name" => Ok(Variant::from(std::env::consts::OS)),
            "get_environment" => Ok(Variant::from(
                std::env::var(str_arg(args, 0, method)?).unwrap_or_default(),
            )),
            "has_environment" => Ok(Variant::Bool(
                std::env::var_os(str_arg(args, 0, method)?).is_some(),
            )),
            "get_processor_count" => Ok(Variant::Int(
                std::thread::available_parallelism()
                    .map(|n| n.get() as i64)
                    .unwrap_or(1),
            )),
            _ => Err(no_method("OS", method)),
        }
    }
}

struct FileAccess {
    root: PathBuf,
}

impl FileAccess {
    fn resolve(&self, raw: &str) -> Result<PathBuf, RemoteError> {
        let path: ProjectPath = raw
            .parse()
            .map_err(|e| RemoteError::invalid_param("args", e))?;
        Ok(path.to_fs_path(&self.root))
    }
}

impl HostObject for FileAccess {
    fn class_name(&self) -> &str {
        "FileAccess"
    }

    fn property_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn get(&self, _property: &str) -> Option<Variant> {
        None
    }

    fn set(&mut self, property: &str, _value: Variant) -> Result<(), RemoteError> {
        Err(read_only("FileAccess", property))
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec!["file_exists", "get_file_as_string"]
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "file_exists" => Ok(Variant::Bool(
                self.resolve(str_arg(args, 0, method)?)?.is_file(),
            )),
            "get_file_as_string" => {
                let raw = str_arg(args, 0, method)?;
                std::fs::read_to_string(self.resolve(raw)?)
                    .map(Variant::from)
                    .map_err(|_| RemoteError::not_found("file", raw))
            }
            _ => Err(no_method("FileAccess", method)),
        }
    }
}

struct ClassDb;

impl HostObject for ClassDb {
    fn class_name(&self) -> &str {
        "ClassDB"
    }

    fn property_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn get(&self, _property: &str) -> Option<Variant> {
        None
    }

    fn set(&mut self, property: &str, _value: Variant) -> Result<(), RemoteError> {
        Err(read_only("ClassDB", property))
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec![
            "class_exists",
            "get_parent_class",
            "get_class_list",
            "is_parent_class",
        ]
    }

    fn call(&mut self, method: &str, args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "class_exists" => Ok(Variant::Bool(classdb::exists(str_arg(args, 0, method)?))),
            "get_parent_class" => Ok(Variant::from(
                classdb::parent(str_arg(args, 0, method)?).unwrap_or(""),
            )),
            "get_class_list" => Ok(Variant::Array(classdb::all().map(Variant::from).collect())),
            "is_parent_class" => Ok(Variant::Bool(classdb::is_a(
                str_arg(args, 0, method)?,
                str_arg(args, 1, method)?,
            ))),
            _ => Err(no_method("ClassDB", method)),
        }
    }
}

/// Read-only view of editor state, built per request.
pub struct EditorInterface {
    pub edited_scene: Option<ProjectPath>,
    pub open_scenes: Vec<ProjectPath>,
}

impl HostObject for EditorInterface {
    fn class_name(&self) -> &str {
        "EditorInterface"
    }

    fn property_names(&self) -> Vec<String> {
        vec!["edited_scene".into(), "open_scenes".into()]
    }

    fn get(&self, property: &str) -> Option<Variant> {
        match property {
            "edited_scene" => Some(
                self.edited_scene
                    .as_ref()
                    .map(|p| Variant::from(p.to_string()))
                    .unwrap_or_default(),
            ),
            "open_scenes" => Some(Variant::Array(
                self.open_scenes
                    .iter()
                    .map(|p| Variant::from(p.to_string()))
                    .collect(),
            )),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, _value: Variant) -> Result<(), RemoteError> {
        Err(read_only("EditorInterface", property))
    }

    fn method_names(&self) -> Vec<&'static str> {
        vec!["get_edited_scene_root", "get_open_scenes"]
    }

    fn call(&mut self, method: &str, _args: &[Variant]) -> Result<Variant, RemoteError> {
        match method {
            "get_edited_scene_root" => self
                .get("edited_scene")
                .ok_or_else(|| no_method("EditorInterface", method)),
            "get_open_scenes" => self
                .get("open_scenes")
                .ok_or_else(|| no_method("EditorInterface", method)),
            _ => Err(no_method("EditorInterface", method)),
        }
    }
}

/// Registered singletons by name.
pub struct Singletons {
    entries: BTreeMap<&'static str, Box<dyn HostObject>>,
}

impl Singletons {
    pub fn new(project_root: &Path) -> Self {
        let mut entries: BTreeMap<&'static str, Box<dyn HostObject>> = BTreeMap::new();
        entries.insert(
            "Engine",
            Box::new(Engine {
                time_scale: 1.0,
                physics_ticks_per_second: 60,
            }),
        );
        entries.insert("ProjectSettings", Box::new(ProjectSettings::default()));
        entries.insert("OS", Box::new(Os));
        entries.insert(
            "FileAccess",
            Box::new(FileAccess {
                root: project_root.to_path_buf(),
            }),
        );
        entries.insert("ClassDB", Box::new(ClassDb));
        Self { entries }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn HostObject + 'static)> {
        self.entries.get_mut(name).map(|b| b.as_mut())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_parsing() {
        assert_eq!(
            Target::from_json(&json!({"kind": "singleton", "name": "Engine"})).unwrap(),
            Target::Singleton("Engine".into())
        );
        assert_eq!(
            Target::from_json(&json!({"kind": "node", "id": 12})).unwrap(),
            Target::Node(NodeRef::Id(12))
        );
        assert_eq!(
            Target::from_json(&json!({"kind": "node", "path": "Player/Sprite"})).unwrap(),
            Target::Node(NodeRef::Path("Player/Sprite".into()))
        );
        let err = Target::from_json(&json!({"kind": "window"})).unwrap_err();
        assert_eq!(err.kind(), Some(scenewright_core::ErrorKind::InvalidParam));
        let err = Target::from_json(&json!({"kind": "resource"})).unwrap_err();
        assert_eq!(err.kind(), Some(scenewright_core::ErrorKind::MissingParam));
    }

    #[test]
    fn node_attributes_are_read_only() {
        let mut node = Node::new(1, "Root", "Node2D");
        assert!(HostObject::set(&mut node, "name", Variant::from("x")).is_err());
        HostObject::set(&mut node, "visible", Variant::Bool(false)).unwrap();
        assert_eq!(node.get("visible"), Some(Variant::Bool(false)));
        assert_eq!(node.get("name"), Some(Variant::from("Root")));
        assert_eq!(
            node.call("is_class", &[Variant::from("CanvasItem")]).unwrap(),
            Variant::Bool(true)
        );
    }

    #[test]
    fn project_settings_defaults() {
        let mut settings = ProjectSettings::default();
        settings
            .call("set_setting", &[Variant::from("a/b"), Variant::Int(3)])
            .unwrap();
        assert_eq!(
            settings.call("get_setting", &[Variant::from("a/b")]).unwrap(),
            Variant::Int(3)
        );
        assert_eq!(
            settings
                .call("get_setting", &[Variant::from("missing"), Variant::Bool(true)])
                .unwrap(),
            Variant::Bool(true)
        );
    }

    #[test]
    fn unknown_method_is_not_found() {
        let mut engine = Engine {
            time_scale: 1.0,
            physics_ticks_per_second: 60,
        };
        let err = engine.call("explode", &[]).unwrap_err();
        assert_eq!(err.kind(), Some(scenewright_core::ErrorKind::NotFound));
    }
}
