//! The editor host: open scenes, cached resources, singletons and the undo
//! log, plus every named operation the dispatcher exposes.
//!
//! Scene mutations never touch a document directly. They are expressed as a
//! [`Mutation`] and either queued on the open action or applied as a
//! single-step action, so every edit lands in the undo history.

use crate::classdb;
use crate::objects::{
    BLOCKED_SINGLETONS, EditorInterface, HostObject, NodeRef, ResourceRef, Singletons,
    TextResource, Target,
};
use crate::scene::{self, Node, SCENE_SUFFIX, SceneDocument, SignalConnection};
use crate::undo::{CommittedAction, Mutation, UndoLog};
use scenewright_core::{ProjectPath, RemoteError, Variant};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the guard that gates destructive operations.
pub const UNSAFE_GUARD: &str = "unsafe_mode";

/// Project-local state directory; hidden from filesystem scans.
pub const STATE_DIR: &str = ".scenewright";

pub struct EditorHost {
    root: PathBuf,
    unsafe_mode: bool,
    scenes: BTreeMap<ProjectPath, SceneDocument>,
    edited: Option<ProjectPath>,
    next_id: u64,
    resources: BTreeMap<u64, TextResource>,
    singletons: Singletons,
    undo: UndoLog,
}

impl EditorHost {
    pub fn new(root: impl Into<PathBuf>, unsafe_mode: bool) -> Self {
        let root = root.into();
        Self {
            singletons: Singletons::new(&root),
            root,
            unsafe_mode,
            scenes: BTreeMap::new(),
            edited: None,
            next_id: 0,
            resources: BTreeMap::new(),
            undo: UndoLog::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unsafe_mode(&self) -> bool {
        self.unsafe_mode
    }

    pub fn edited_scene(&self) -> Option<&ProjectPath> {
        self.edited.as_ref()
    }

    pub fn scene(&self, path: &ProjectPath) -> Option<&SceneDocument> {
        self.scenes.get(path)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.history_len()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fs(&self, path: &ProjectPath) -> PathBuf {
        path.to_fs_path(&self.root)
    }

    fn require_unsafe(&self, subject: &str) -> Result<(), RemoteError> {
        if self.unsafe_mode {
            Ok(())
        } else {
            Err(RemoteError::blocked(subject, UNSAFE_GUARD))
        }
    }

    fn write_file(&self, path: &ProjectPath, contents: &str) -> Result<(), RemoteError> {
        let fs_path = self.fs(path);
        if let Some(dir) = fs_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                RemoteError::failed(format!("creating directory for {path} failed: {e}"))
            })?;
        }
        std::fs::write(&fs_path, contents)
            .map_err(|e| RemoteError::failed(format!("writing {path} failed: {e}")))
    }

    fn load_scene(&mut self, path: &ProjectPath) -> Result<SceneDocument, RemoteError> {
        let text = std::fs::read_to_string(self.fs(path))
            .map_err(|_| RemoteError::not_found("scene", path.to_string()))?;
        let next_id = &mut self.next_id;
        SceneDocument::parse(path.clone(), &text, &mut || {
            *next_id += 1;
            *next_id
        })
        .map_err(|e| {
            RemoteError::failed(format!("{path} is not a valid scene: {e}"))
                .with_detail("path", path.to_string())
        })
    }

    /// The scene named by `scene`, or the edited scene.
    pub fn scene_path(&self, scene: Option<ProjectPath>) -> Result<ProjectPath, RemoteError> {
        match scene {
            Some(path) if self.scenes.contains_key(&path) => Ok(path),
            Some(path) => Err(RemoteError::invalid_state(format!("scene {path} is not open"))
                .with_detail("scene", path.to_string())),
            None => self
                .edited
                .clone()
                .ok_or_else(|| RemoteError::invalid_state("no scene is being edited")),
        }
    }

    fn doc(&self, scene: &ProjectPath) -> Result<&SceneDocument, RemoteError> {
        self.scenes
            .get(scene)
            .ok_or_else(|| RemoteError::invalid_state(format!("scene {scene} is not open")))
    }

    fn doc_mut(&mut self, scene: &ProjectPath) -> Result<&mut SceneDocument, RemoteError> {
        self.scenes
            .get_mut(scene)
            .ok_or_else(|| RemoteError::invalid_state(format!("scene {scene} is not open")))
    }

    fn node(&self, scene: &ProjectPath, node_path: &str) -> Result<&Node, RemoteError> {
        self.doc(scene)?
            .node(node_path)
            .ok_or_else(|| RemoteError::not_found("node", node_path))
    }

    // ---- scenes ----------------------------------------------------------

    /// Write a new scene with a single root node and make it the edited scene.
    pub fn create_scene(
        &mut self,
        path: ProjectPath,
        root_class: &str,
        root_name: Option<&str>,
        overwrite: bool,
    ) -> Result<Value, RemoteError> {
        if !path.has_suffix(SCENE_SUFFIX) {
            return Err(RemoteError::invalid_param(
                "path",
                format!("scene paths must end in {SCENE_SUFFIX}"),
            ));
        }
        if !classdb::is_node_class(root_class) {
            return Err(RemoteError::invalid_param(
                "root_class",
                format!("'{root_class}' is not an instantiable node class"),
            ));
        }
        if self.fs(&path).exists() {
            if !overwrite {
                return Err(RemoteError::invalid_state(format!("{path} already exists"))
                    .with_detail("path", path.to_string()));
            }
            self.require_unsafe(&path.to_string())?;
        }

        let name = root_name.unwrap_or_else(|| path.stem()).to_string();
        let id = self.alloc_id();
        let doc = SceneDocument::new(path.clone(), Node::new(id, name, root_class));
        self.write_file(&path, &doc.to_json().map_err(|e| RemoteError::failed(e.to_string()))?)?;

        self.undo.discard_scene(&path);
        self.scenes.insert(path.clone(), doc);
        self.edited = Some(path.clone());
        tracing::debug!("created scene {}", path);
        Ok(json!({ "path": path.to_string(), "root_id": id }))
    }

    /// Load a scene from disk (or focus it if already open).
    pub fn open_scene(&mut self, path: ProjectPath) -> Result<Value, RemoteError> {
        if !self.scenes.contains_key(&path) {
            let doc = self.load_scene(&path)?;
            self.scenes.insert(path.clone(), doc);
        }
        self.edited = Some(path.clone());
        let doc = self.doc(&path)?;
        Ok(json!({
            "path": path.to_string(),
            "root_id": doc.root.id,
            "node_count": doc.node_count(),
        }))
    }

    pub fn save_scene(&mut self, scene: Option<ProjectPath>) -> Result<Value, RemoteError> {
        let path = self.scene_path(scene)?;
        let text = self
            .doc(&path)?
            .to_json()
            .map_err(|e| RemoteError::failed(e.to_string()))?;
        self.write_file(&path, &text)?;
        self.doc_mut(&path)?.dirty = false;
        Ok(json!({ "path": path.to_string(), "bytes": text.len() }))
    }

    /// Drop an open scene, discarding unsaved edits and its undo history.
    pub fn close_scene(&mut self, scene: Option<ProjectPath>) -> Result<Value, RemoteError> {
        let path = self.scene_path(scene)?;
        let doc = self.scenes.remove(&path);
        self.undo.discard_scene(&path);
        if self.edited.as_ref() == Some(&path) {
            self.edited = None;
        }
        Ok(json!({
            "path": path.to_string(),
            "discarded_changes": doc.is_some_and(|d| d.dirty),
        }))
    }

    // ---- nodes -----------------------------------------------------------

    pub fn add_node(
        &mut self,
        scene: Option<ProjectPath>,
        parent: &str,
        name: &str,
        class: &str,
        properties: Vec<(String, Variant)>,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        if !classdb::is_node_class(class) {
            return Err(RemoteError::invalid_param(
                "class",
                format!("'{class}' is not an instantiable node class"),
            ));
        }
        validate_node_name(name)?;
        let mut node = Node::new(self.alloc_id(), name, class);
        for (property, value) in properties {
            HostObject::set(&mut node, &property, value)?;
        }
        let id = node.id;
        let path = scene::join(parent, name);
        let queued = self.mutate(Mutation::AddNode {
            scene,
            parent: parent.to_string(),
            node,
            index: None,
        })?;
        Ok(with_queued(json!({ "path": path, "id": id }), queued))
    }

    pub fn remove_node(
        &mut self,
        scene: Option<ProjectPath>,
        node_path: &str,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        if scene::segments(node_path).is_empty() {
            return Err(RemoteError::invalid_param("path", "the scene root cannot be removed"));
        }
        let queued = self.mutate(Mutation::RemoveNode {
            scene,
            path: node_path.to_string(),
        })?;
        Ok(with_queued(json!({ "removed": node_path }), queued))
    }

    /// Add a node that instances another saved scene.
    pub fn instance_scene(
        &mut self,
        scene: Option<ProjectPath>,
        parent: &str,
        source: ProjectPath,
        name: Option<&str>,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        if source == scene {
            return Err(RemoteError::invalid_param("source", "a scene cannot instance itself"));
        }
        let template = self.load_scene(&source)?;
        let name = name.unwrap_or(template.root.name.as_str()).to_string();
        validate_node_name(&name)?;
        let mut node = Node::new(self.alloc_id(), &name, &template.root.class);
        node.instance = Some(source.clone());
        let id = node.id;
        let path = scene::join(parent, &name);
        let queued = self.mutate(Mutation::AddNode {
            scene,
            parent: parent.to_string(),
            node,
            index: None,
        })?;
        Ok(with_queued(
            json!({ "path": path, "id": id, "source": source.to_string() }),
            queued,
        ))
    }

    pub fn set_property(
        &mut self,
        scene: Option<ProjectPath>,
        node: &str,
        property: &str,
        value: Variant,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        let queued = self.mutate(Mutation::SetProperty {
            scene,
            node: node.to_string(),
            property: property.to_string(),
            value: Some(value),
        })?;
        Ok(with_queued(json!({ "node": node, "property": property }), queued))
    }

    pub fn get_property(
        &self,
        scene: Option<ProjectPath>,
        node: &str,
        property: &str,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        let node = self.node(&scene, node)?;
        node.get(property)
            .map(|v| json!({ "value": v.to_json(), "type": v.type_name() }))
            .ok_or_else(|| RemoteError::not_found("property", format!("{}.{property}", node.name)))
    }

    pub fn connect_signal(
        &mut self,
        scene: Option<ProjectPath>,
        node: &str,
        connection: SignalConnection,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        let queued = self.mutate(Mutation::Connect {
            scene,
            node: node.to_string(),
            connection,
        })?;
        Ok(with_queued(json!({ "connected": true }), queued))
    }

    pub fn attach_script(
        &mut self,
        scene: Option<ProjectPath>,
        node: &str,
        script: ProjectPath,
    ) -> Result<Value, RemoteError> {
        let scene = self.scene_path(scene)?;
        if !self.fs(&script).is_file() {
            return Err(RemoteError::not_found("script", script.to_string()));
        }
        let queued = self.mutate(Mutation::AttachScript {
            scene,
            node: node.to_string(),
            script: Some(script.clone()),
        })?;
        Ok(with_queued(
            json!({ "node": node, "script": script.to_string() }),
            queued,
        ))
    }

    // ---- files -----------------------------------------------------------

    /// Write `content` to `path`.
    ///
    /// Identical content is a no-op. Different content requires `overwrite`,
    /// which in turn requires unsafe mode.
    pub fn write_text_file(
        &mut self,
        path: ProjectPath,
        content: &str,
        overwrite: bool,
    ) -> Result<Value, RemoteError> {
        let fs_path = self.fs(&path);
        if fs_path.is_dir() {
            return Err(RemoteError::invalid_param("path", format!("{path} is a directory")));
        }
        if let Ok(existing) = std::fs::read(&fs_path) {
            if existing == content.as_bytes() {
                return Ok(json!({ "path": path.to_string(), "written": false }));
            }
            if !overwrite {
                return Err(RemoteError::invalid_state(format!(
                    "{path} exists with different content"
                ))
                .with_detail("path", path.to_string()));
            }
            self.require_unsafe(&path.to_string())?;
        }
        self.write_file(&path, content)?;
        for resource in self.resources.values_mut().filter(|r| r.path == path) {
            resource.text = content.to_string();
        }
        Ok(json!({ "path": path.to_string(), "written": true, "bytes": content.len() }))
    }

    pub fn read_text_file(&self, path: ProjectPath) -> Result<Value, RemoteError> {
        std::fs::read_to_string(self.fs(&path))
            .map(|content| json!({ "path": path.to_string(), "content": content }))
            .map_err(|_| RemoteError::not_found("file", path.to_string()))
    }

    /// Every file under the project root except the state directory.
    pub fn filesystem_scan(&self) -> Result<Value, RemoteError> {
        let mut files = Vec::new();
        let walker = walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != STATE_DIR);
        for entry in walker {
            let entry = entry.map_err(|e| RemoteError::failed(format!("scan failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            files.push(format!("res://{}", relative.join("/")));
        }
        Ok(json!({ "count": files.len(), "files": files }))
    }

    /// Refresh cached copies of `paths` from disk.
    pub fn reimport(&mut self, paths: Vec<ProjectPath>) -> Result<Value, RemoteError> {
        let mut reloaded_scenes = Vec::new();
        for path in &paths {
            if !self.fs(path).is_file() {
                return Err(RemoteError::not_found("file", path.to_string()));
            }
            for resource in self.resources.values_mut().filter(|r| &r.path == path) {
                resource
                    .call("reload", &[])
                    .map_err(|e| e.with_detail("path", path.to_string()))?;
            }
            let clean = self.scenes.get(path).is_some_and(|d| !d.dirty);
            if clean {
                let doc = self.load_scene(path)?;
                self.undo.discard_scene(path);
                self.scenes.insert(path.clone(), doc);
                reloaded_scenes.push(path.to_string());
            }
        }
        Ok(json!({
            "reimported": paths.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "reloaded_scenes": reloaded_scenes,
        }))
    }

    /// Check a saved scene for structural problems and broken references.
    pub fn validate_scene(&mut self, path: ProjectPath) -> Result<Value, RemoteError> {
        let doc = self.load_scene(&path)?;
        let mut problems = doc.structural_problems();
        doc.walk(&doc.root, ".", &mut |node_path, node| {
            if !classdb::is_node_class(&node.class) {
                problems.push(format!("{node_path}: unknown node class '{}'", node.class));
            }
            if let Some(script) = node.script.as_ref().filter(|s| !self.fs(s).is_file()) {
                problems.push(format!("{node_path}: missing script {script}"));
            }
            if let Some(source) = node.instance.as_ref().filter(|s| !self.fs(s).is_file()) {
                problems.push(format!("{node_path}: missing instanced scene {source}"));
            }
        });

        if problems.is_empty() {
            Ok(json!({
                "path": path.to_string(),
                "valid": true,
                "node_count": doc.node_count(),
            }))
        } else {
            Err(RemoteError::failed(format!(
                "{path} has {} problem(s)",
                problems.len()
            ))
            .with_detail("path", path.to_string())
            .with_detail("problems", problems))
        }
    }

    // ---- undo ------------------------------------------------------------

    pub fn begin_action(&mut self, name: &str) -> Result<Value, RemoteError> {
        self.undo.begin(name)?;
        Ok(json!({ "action": name }))
    }

    /// Apply the open action's mutations in order.
    ///
    /// If one fails, the ones already applied are reverted and nothing is
    /// pushed onto the history.
    pub fn commit_action(&mut self) -> Result<Value, RemoteError> {
        let (name, forward) = self.undo.take_open()?;
        let mut steps = Vec::with_capacity(forward.len());
        for (index, mutation) in forward.into_iter().enumerate() {
            match self.apply(mutation.clone()) {
                Ok(inverse) => steps.push((mutation, inverse)),
                Err(cause) => {
                    self.revert(&steps);
                    return Err(RemoteError::failed(format!(
                        "action '{name}' failed at step {index}: {}",
                        cause.message
                    ))
                    .with_detail("action", name)
                    .with_detail("index", index)
                    .with_detail("cause", json!(cause)));
                }
            }
        }
        let applied = steps.len();
        self.undo.push(CommittedAction {
            name: name.clone(),
            steps,
        });
        Ok(json!({ "action": name, "applied": applied }))
    }

    pub fn undo(&mut self) -> Result<Value, RemoteError> {
        if let Some(open) = self.undo.open_name() {
            return Err(RemoteError::invalid_state(format!(
                "cannot undo while action '{open}' is open"
            )));
        }
        let action = self
            .undo
            .pop()
            .ok_or_else(|| RemoteError::invalid_state("nothing to undo"))?;
        for (index, (_, inverse)) in action.steps.iter().enumerate().rev() {
            self.apply(inverse.clone()).map_err(|cause| {
                RemoteError::failed(format!("undo of '{}' failed", action.name))
                    .with_detail("index", index)
                    .with_detail("cause", json!(cause))
            })?;
        }
        Ok(json!({ "undone": action.name, "steps": action.steps.len() }))
    }

    /// Queue on the open action, or apply immediately as its own action.
    /// Returns the queue position when queued.
    fn mutate(&mut self, mutation: Mutation) -> Result<Option<usize>, RemoteError> {
        match self.undo.record(mutation) {
            Ok(position) => Ok(Some(position)),
            Err(mutation) => {
                let inverse = self.apply(mutation.clone())?;
                self.undo.push(CommittedAction {
                    name: mutation.label().to_string(),
                    steps: vec![(mutation, inverse)],
                });
                Ok(None)
            }
        }
    }

    fn revert(&mut self, steps: &[(Mutation, Mutation)]) {
        for (_, inverse) in steps.iter().rev() {
            if let Err(e) = self.apply(inverse.clone()) {
                tracing::warn!("rollback step {} failed: {}", inverse.label(), e);
            }
        }
    }

    /// Apply one mutation, returning its inverse.
    fn apply(&mut self, mutation: Mutation) -> Result<Mutation, RemoteError> {
        let doc = self.doc_mut(mutation.scene())?;
        let inverse = match mutation {
            Mutation::AddNode {
                scene,
                parent,
                node,
                index,
            } => {
                let parent_node = doc
                    .node_mut(&parent)
                    .ok_or_else(|| RemoteError::not_found("node", parent.as_str()))?;
                if parent_node.child(&node.name).is_some() {
                    return Err(RemoteError::invalid_state(format!(
                        "'{}' already has a child named '{}'",
                        parent, node.name
                    )));
                }
                let path = scene::join(&parent, &node.name);
                match index {
                    Some(i) if i <= parent_node.children.len() => {
                        parent_node.children.insert(i, node)
                    }
                    _ => parent_node.children.push(node),
                }
                Mutation::RemoveNode { scene, path }
            }
            Mutation::RemoveNode { scene, path } => {
                let (parent, name) = scene::split_parent(&path).ok_or_else(|| {
                    RemoteError::invalid_param("path", "the scene root cannot be removed")
                })?;
                let parent_node = doc
                    .node_mut(&parent)
                    .ok_or_else(|| RemoteError::not_found("node", path.as_str()))?;
                let position = parent_node
                    .children
                    .iter()
                    .position(|c| c.name == name)
                    .ok_or_else(|| RemoteError::not_found("node", path.as_str()))?;
                let node = parent_node.children.remove(position);
                Mutation::AddNode {
                    scene,
                    parent,
                    node,
                    index: Some(position),
                }
            }
            Mutation::SetProperty {
                scene,
                node,
                property,
                value,
            } => {
                let target = doc
                    .node_mut(&node)
                    .ok_or_else(|| RemoteError::not_found("node", node.as_str()))?;
                let previous = target.properties.get(&property).cloned();
                match value {
                    Some(value) => HostObject::set(target, &property, value)?,
                    None => {
                        target.properties.remove(&property);
                    }
                }
                Mutation::SetProperty {
                    scene,
                    node,
                    property,
                    value: previous,
                }
            }
            Mutation::AttachScript {
                scene,
                node,
                script,
            } => {
                let target = doc
                    .node_mut(&node)
                    .ok_or_else(|| RemoteError::not_found("node", node.as_str()))?;
                let previous = std::mem::replace(&mut target.script, script);
                Mutation::AttachScript {
                    scene,
                    node,
                    script: previous,
                }
            }
            Mutation::Connect {
                scene,
                node,
                connection,
            } => {
                if doc.node(&connection.target).is_none() {
                    return Err(RemoteError::not_found("node", connection.target.as_str()));
                }
                let source = doc
                    .node_mut(&node)
                    .ok_or_else(|| RemoteError::not_found("node", node.as_str()))?;
                if source.connections.contains(&connection) {
                    return Err(RemoteError::invalid_state(format!(
                        "signal '{}' of {} is already connected to {}.{}",
                        connection.signal, node, connection.target, connection.method
                    )));
                }
                source.connections.push(connection.clone());
                Mutation::Disconnect {
                    scene,
                    node,
                    connection,
                }
            }
            Mutation::Disconnect {
                scene,
                node,
                connection,
            } => {
                let source = doc
                    .node_mut(&node)
                    .ok_or_else(|| RemoteError::not_found("node", node.as_str()))?;
                let position = source
                    .connections
                    .iter()
                    .position(|c| c == &connection)
                    .ok_or_else(|| RemoteError::not_found("connection", connection.signal.as_str()))?;
                source.connections.remove(position);
                Mutation::Connect {
                    scene,
                    node,
                    connection,
                }
            }
        };
        doc.dirty = true;
        Ok(inverse)
    }

    // ---- reflection ------------------------------------------------------

    /// Run `f` against the object `target` resolves to.
    fn with_object<R>(
        &mut self,
        target: &Target,
        f: impl FnOnce(&mut dyn HostObject) -> Result<R, RemoteError>,
    ) -> Result<R, RemoteError> {
        match target {
            Target::Singleton(name) => {
                if BLOCKED_SINGLETONS.contains(&name.as_str()) && !self.unsafe_mode {
                    return Err(RemoteError::blocked(name, UNSAFE_GUARD));
                }
                if name == "EditorInterface" {
                    let mut view = EditorInterface {
                        edited_scene: self.edited.clone(),
                        open_scenes: self.scenes.keys().cloned().collect(),
                    };
                    return f(&mut view);
                }
                let object = self
                    .singletons
                    .get_mut(name)
                    .ok_or_else(|| RemoteError::not_found("singleton", name.as_str()))?;
                f(object)
            }
            Target::Node(reference) => {
                let (scene, path) = self.locate_node(reference)?;
                let node = self
                    .doc_mut(&scene)?
                    .node_mut(&path)
                    .ok_or_else(|| RemoteError::not_found("node", target.identifier()))?;
                f(node)
            }
            Target::Resource(reference) => {
                let id = self.resource_id(reference)?;
                let resource = self
                    .resources
                    .get_mut(&id)
                    .ok_or_else(|| RemoteError::not_found("resource", id))?;
                f(resource)
            }
        }
    }

    /// `(scene, node path)` for a node reference. Paths resolve in the
    /// edited scene; ids search every open scene.
    fn locate_node(&self, reference: &NodeRef) -> Result<(ProjectPath, String), RemoteError> {
        match reference {
            NodeRef::Path(path) => {
                let scene = self.scene_path(None)?;
                self.node(&scene, path)?;
                Ok((scene, path.clone()))
            }
            NodeRef::Id(id) => self
                .scenes
                .iter()
                .find_map(|(scene, doc)| doc.path_of(*id).map(|p| (scene.clone(), p)))
                .ok_or_else(|| RemoteError::not_found("node", *id)),
        }
    }

    /// Cached resource id, loading the resource on first use by path.
    fn resource_id(&mut self, reference: &ResourceRef) -> Result<u64, RemoteError> {
        match reference {
            ResourceRef::Id(id) if self.resources.contains_key(id) => Ok(*id),
            ResourceRef::Id(id) => Err(RemoteError::not_found("resource", *id)),
            ResourceRef::Path(path) => {
                if let Some(found) = self.resources.values().find(|r| &r.path == path) {
                    return Ok(found.id);
                }
                let id = self.alloc_id();
                let resource = TextResource::load(id, path.clone(), &self.root)
                    .map_err(|_| RemoteError::not_found("resource", path.to_string()))?;
                self.resources.insert(id, resource);
                Ok(id)
            }
        }
    }

    pub fn call(
        &mut self,
        target: &Target,
        method: &str,
        args: &[Variant],
    ) -> Result<Value, RemoteError> {
        let value = self.with_object(target, |object| object.call(method, args))?;
        Ok(json!({ "value": value.to_json() }))
    }

    pub fn get(&mut self, target: &Target, property: &str) -> Result<Value, RemoteError> {
        let value = self.with_object(target, |object| {
            object.get(property).ok_or_else(|| {
                RemoteError::not_found("property", format!("{}.{property}", object.class_name()))
            })
        })?;
        Ok(json!({ "value": value.to_json(), "type": value.type_name() }))
    }

    /// Node targets go through the undo log; everything else is set in place.
    pub fn set(
        &mut self,
        target: &Target,
        property: &str,
        value: Variant,
    ) -> Result<Value, RemoteError> {
        if let Target::Node(reference) = target {
            let (scene, path) = self.locate_node(reference)?;
            return self.set_property(Some(scene), &path, property, value);
        }
        self.with_object(target, |object| object.set(property, value))?;
        Ok(json!({ "property": property }))
    }

    pub fn inspect_object(&mut self, target: &Target) -> Result<Value, RemoteError> {
        self.with_object(target, |object| {
            let properties: serde_json::Map<String, Value> = object
                .property_names()
                .into_iter()
                .filter_map(|name| object.get(&name).map(|v| (name, v.to_json())))
                .collect();
            Ok(json!({
                "class": object.class_name(),
                "id": object.instance_id(),
                "ancestry": classdb::ancestry(object.class_name()),
                "properties": properties,
                "methods": object.method_names(),
            }))
        })
    }

    pub fn inspect_class(&self, class: &str) -> Result<Value, RemoteError> {
        if !classdb::exists(class) {
            return Err(RemoteError::not_found("class", class));
        }
        Ok(json!({
            "class": class,
            "parent": classdb::parent(class),
            "ancestry": classdb::ancestry(class),
            "instantiable": classdb::is_node_class(class),
        }))
    }

    pub fn singleton_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.singletons.names().collect();
        names.push("EditorInterface");
        names.sort_unstable();
        names
    }
}

fn validate_node_name(name: &str) -> Result<(), RemoteError> {
    if name.is_empty() || name == "." || name.contains(['/', ':', '@']) {
        return Err(RemoteError::invalid_param(
            "name",
            format!("'{name}' is not a valid node name"),
        ));
    }
    Ok(())
}

fn with_queued(mut result: Value, queued: Option<usize>) -> Value {
    if let (Some(position), Value::Object(map)) = (queued, &mut result) {
        map.insert("queued".into(), json!(position));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenewright_core::ErrorKind;
    use tempfile::TempDir;

    fn res(p: &str) -> ProjectPath {
        p.parse().unwrap()
    }

    fn host_with_scene(unsafe_mode: bool) -> (TempDir, EditorHost) {
        let dir = TempDir::new().unwrap();
        let mut host = EditorHost::new(dir.path(), unsafe_mode);
        host.create_scene(res("res://player.scene.json"), "CharacterBody2D", Some("Player"), false)
            .unwrap();
        (dir, host)
    }

    #[test]
    fn single_mutations_are_undoable() {
        let (_dir, mut host) = host_with_scene(false);
        host.add_node(None, ".", "Sprite", "Sprite2D", Vec::new())
            .unwrap();
        host.set_property(None, "Sprite", "position", Variant::Vector2(1.0, 2.0))
            .unwrap();
        assert_eq!(host.undo_depth(), 2);

        host.undo().unwrap();
        let scene = host.scene(&res("res://player.scene.json")).unwrap();
        assert!(scene.node("Sprite").unwrap().properties.is_empty());

        host.undo().unwrap();
        let scene = host.scene(&res("res://player.scene.json")).unwrap();
        assert!(scene.node("Sprite").is_none());
        assert_eq!(host.undo().unwrap_err().kind(), Some(ErrorKind::InvalidState));
    }

    #[test]
    fn actions_apply_on_commit_and_roll_back_on_failure() {
        let (_dir, mut host) = host_with_scene(false);
        host.begin_action("build").unwrap();
        let queued = host
            .add_node(None, ".", "Hud", "CanvasLayer", Vec::new())
            .unwrap();
        assert_eq!(queued["queued"], 1);
        host.add_node(None, "Hud", "Score", "Label", Vec::new())
            .unwrap();
        host.add_node(None, "Missing", "Orphan", "Label", Vec::new())
            .unwrap();

        let err = host.commit_action().unwrap_err();
        assert_eq!(err.details["index"], 2);
        let scene = host.scene(&res("res://player.scene.json")).unwrap();
        assert!(scene.node("Hud").is_none(), "partial commit was not reverted");
        assert_eq!(host.undo_depth(), 0);
    }

    #[test]
    fn committed_action_undoes_as_one() {
        let (_dir, mut host) = host_with_scene(false);
        host.begin_action("build").unwrap();
        host.add_node(None, ".", "Hud", "CanvasLayer", Vec::new())
            .unwrap();
        host.add_node(None, "Hud", "Score", "Label", Vec::new())
            .unwrap();
        assert_eq!(host.commit_action().unwrap()["applied"], 2);
        assert_eq!(host.undo_depth(), 1);
        host.undo().unwrap();
        let scene = host.scene(&res("res://player.scene.json")).unwrap();
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn remove_then_undo_restores_position() {
        let (_dir, mut host) = host_with_scene(false);
        for name in ["A", "B", "C"] {
            host.add_node(None, ".", name, "Node2D", Vec::new()).unwrap();
        }
        host.remove_node(None, "B").unwrap();
        host.undo().unwrap();
        let scene = host.scene(&res("res://player.scene.json")).unwrap();
        let names: Vec<_> = scene.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn text_file_overwrite_is_gated() {
        let dir = TempDir::new().unwrap();
        let mut host = EditorHost::new(dir.path(), false);
        let path = res("res://out/a.txt");
        assert_eq!(host.write_text_file(path.clone(), "X", false).unwrap()["written"], true);
        assert_eq!(host.write_text_file(path.clone(), "X", false).unwrap()["written"], false);
        assert_eq!(
            host.write_text_file(path.clone(), "Y", false).unwrap_err().kind(),
            Some(ErrorKind::InvalidState)
        );
        let blocked = host.write_text_file(path.clone(), "Y", true).unwrap_err();
        assert_eq!(blocked.kind(), Some(ErrorKind::Blocked));
        assert_eq!(blocked.details["guard"], UNSAFE_GUARD);
        assert_eq!(std::fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "X");

        let mut host = EditorHost::new(dir.path(), true);
        host.write_text_file(path, "Y", true).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "Y");
    }

    #[test]
    fn saved_scene_validates() {
        let (dir, mut host) = host_with_scene(false);
        host.write_text_file(res("res://player.gd"), "extends CharacterBody2D\n", false)
            .unwrap();
        host.attach_script(None, ".", res("res://player.gd")).unwrap();
        host.save_scene(None).unwrap();
        let report = host.validate_scene(res("res://player.scene.json")).unwrap();
        assert_eq!(report["valid"], true);

        std::fs::remove_file(dir.path().join("player.gd")).unwrap();
        let err = host.validate_scene(res("res://player.scene.json")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Failed));
        assert_eq!(err.details["problems"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn blocked_singletons_need_unsafe_mode() {
        let dir = TempDir::new().unwrap();
        let mut host = EditorHost::new(dir.path(), false);
        let os = Target::Singleton("OS".into());
        let err = host.call(&os, "get_name", &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Blocked));
        assert_eq!(err.details["subject"], "OS");

        let engine = Target::Singleton("Engine".into());
        assert_eq!(host.get(&engine, "time_scale").unwrap()["value"], 1.0);

        let mut host = EditorHost::new(dir.path(), true);
        assert!(host.call(&os, "get_name", &[]).is_ok());
    }

    #[test]
    fn nodes_resolve_by_path_and_id() {
        let (_dir, mut host) = host_with_scene(false);
        let added = host
            .add_node(None, ".", "Sprite", "Sprite2D", Vec::new())
            .unwrap();
        let id = added["id"].as_u64().unwrap();

        let by_id = Target::Node(NodeRef::Id(id));
        host.set(&by_id, "visible", Variant::Bool(false)).unwrap();
        let by_path = Target::Node(NodeRef::Path("Sprite".into()));
        assert_eq!(host.get(&by_path, "visible").unwrap()["value"], false);
        assert_eq!(host.undo_depth(), 2);

        let missing = Target::Node(NodeRef::Id(9999));
        let err = host.inspect_object(&missing).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.details["identifier"], 9999);
    }

    #[test]
    fn scan_skips_state_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(dir.path().join(STATE_DIR).join("token"), "t").unwrap();
        let mut host = EditorHost::new(dir.path(), false);
        host.write_text_file(res("res://b/c.txt"), "1", false).unwrap();
        let scan = host.filesystem_scan().unwrap();
        assert_eq!(scan["files"], json!(["res://b/c.txt"]));
    }
}
