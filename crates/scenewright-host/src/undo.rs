//! Undo-bracketed mutation log.
//!
//! A transaction is opened with `begin`, collects forward [`Mutation`]s, and
//! on `commit` hands them back for application. Each applied mutation yields
//! its inverse; the `(forward, inverse)` pairs are kept in the history so
//! `undo` can apply the inverses in reverse order.

use crate::scene::{Node, SignalConnection};
use scenewright_core::{ProjectPath, RemoteError, Variant};

/// A reversible edit to an open scene.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddNode {
        scene: ProjectPath,
        parent: String,
        node: Node,
        /// Sibling position; `None` appends.
        index: Option<usize>,
    },
    RemoveNode {
        scene: ProjectPath,
        path: String,
    },
    SetProperty {
        scene: ProjectPath,
        node: String,
        property: String,
        /// `None` erases the property.
        value: Option<Variant>,
    },
    AttachScript {
        scene: ProjectPath,
        node: String,
        script: Option<ProjectPath>,
    },
    Connect {
        scene: ProjectPath,
        node: String,
        connection: SignalConnection,
    },
    Disconnect {
        scene: ProjectPath,
        node: String,
        connection: SignalConnection,
    },
}

impl Mutation {
    pub fn scene(&self) -> &ProjectPath {
        match self {
            Mutation::AddNode { scene, .. }
            | Mutation::RemoveNode { scene, .. }
            | Mutation::SetProperty { scene, .. }
            | Mutation::AttachScript { scene, .. }
            | Mutation::Connect { scene, .. }
            | Mutation::Disconnect { scene, .. } => scene,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mutation::AddNode { .. } => "add_node",
            Mutation::RemoveNode { .. } => "remove_node",
            Mutation::SetProperty { .. } => "set_property",
            Mutation::AttachScript { .. } => "attach_script",
            Mutation::Connect { .. } => "connect_signal",
            Mutation::Disconnect { .. } => "disconnect_signal",
        }
    }
}

/// A committed transaction.
#[derive(Debug, Clone)]
pub struct CommittedAction {
    pub name: String,
    pub steps: Vec<(Mutation, Mutation)>,
}

#[derive(Debug)]
struct OpenAction {
    name: String,
    forward: Vec<Mutation>,
}

#[derive(Debug, Default)]
pub struct UndoLog {
    open: Option<OpenAction>,
    history: Vec<CommittedAction>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_name(&self) -> Option<&str> {
        self.open.as_ref().map(|a| a.name.as_str())
    }

    pub fn begin(&mut self, name: &str) -> Result<(), RemoteError> {
        if let Some(open) = &self.open {
            return Err(RemoteError::invalid_state(format!(
                "action '{}' is already open; commit it before beginning '{}'",
                open.name, name
            ))
            .with_detail("open_action", open.name.clone()));
        }
        self.open = Some(OpenAction {
            name: name.to_string(),
            forward: Vec::new(),
        });
        Ok(())
    }

    /// Queue a mutation on the open action. Returns it back when none is open.
    pub fn record(&mut self, mutation: Mutation) -> Result<usize, Mutation> {
        match &mut self.open {
            Some(open) => {
                open.forward.push(mutation);
                Ok(open.forward.len())
            }
            None => Err(mutation),
        }
    }

    /// Close the open action, returning its name and queued mutations.
    pub fn take_open(&mut self) -> Result<(String, Vec<Mutation>), RemoteError> {
        let open = self
            .open
            .take()
            .ok_or_else(|| RemoteError::invalid_state("commit_action called with no open action"))?;
        Ok((open.name, open.forward))
    }

    pub fn push(&mut self, action: CommittedAction) {
        self.history.push(action);
    }

    pub fn pop(&mut self) -> Option<CommittedAction> {
        self.history.pop()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Forget history touching `scene` (its document was reloaded or closed).
    pub fn discard_scene(&mut self, scene: &ProjectPath) {
        self.history
            .retain(|action| action.steps.iter().all(|(fwd, _)| fwd.scene() != scene));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(value: i64) -> Mutation {
        Mutation::SetProperty {
            scene: "res://a.scene.json".parse().unwrap(),
            node: ".".into(),
            property: "v".into(),
            value: Some(Variant::Int(value)),
        }
    }

    #[test]
    fn nested_begin_is_rejected() {
        let mut log = UndoLog::new();
        log.begin("outer").unwrap();
        let err = log.begin("inner").unwrap_err();
        assert_eq!(err.kind(), Some(scenewright_core::ErrorKind::InvalidState));
        assert_eq!(log.open_name(), Some("outer"));
    }

    #[test]
    fn commit_without_begin_is_rejected() {
        let mut log = UndoLog::new();
        assert!(log.take_open().is_err());
    }

    #[test]
    fn record_requires_open_action() {
        let mut log = UndoLog::new();
        assert!(log.record(set(1)).is_err());
        log.begin("edit").unwrap();
        assert_eq!(log.record(set(1)), Ok(1));
        assert_eq!(log.record(set(2)), Ok(2));
        let (name, forward) = log.take_open().unwrap();
        assert_eq!(name, "edit");
        assert_eq!(forward.len(), 2);
        assert!(!log.is_open());
    }

    #[test]
    fn discard_scene_drops_matching_history() {
        let mut log = UndoLog::new();
        log.push(CommittedAction {
            name: "x".into(),
            steps: vec![(set(1), set(0))],
        });
        log.discard_scene(&"res://a.scene.json".parse().unwrap());
        assert_eq!(log.history_len(), 0);
    }
}
