//! Known node classes and their inheritance.

/// `(class, parent)`; `Object` is the only class without a parent.
const CLASSES: &[(&str, Option<&str>)] = &[
    ("Object", None),
    ("Node", Some("Object")),
    ("CanvasItem", Some("Node")),
    ("Node2D", Some("CanvasItem")),
    ("Node3D", Some("Node")),
    ("Control", Some("CanvasItem")),
    ("CanvasLayer", Some("Node")),
    ("Label", Some("Control")),
    ("Button", Some("Control")),
    ("ProgressBar", Some("Control")),
    ("Sprite2D", Some("Node2D")),
    ("AnimatedSprite2D", Some("Node2D")),
    ("Camera2D", Some("Node2D")),
    ("Marker2D", Some("Node2D")),
    ("TileMap", Some("Node2D")),
    ("CollisionObject2D", Some("Node2D")),
    ("Area2D", Some("CollisionObject2D")),
    ("PhysicsBody2D", Some("CollisionObject2D")),
    ("CharacterBody2D", Some("PhysicsBody2D")),
    ("RigidBody2D", Some("PhysicsBody2D")),
    ("StaticBody2D", Some("PhysicsBody2D")),
    ("CollisionShape2D", Some("Node2D")),
    ("Timer", Some("Node")),
    ("AudioStreamPlayer", Some("Node")),
];

/// Classes that cannot be placed in a scene tree.
const ABSTRACT: &[&str] = &[
    "Object",
    "CanvasItem",
    "CollisionObject2D",
    "PhysicsBody2D",
];

pub fn exists(class: &str) -> bool {
    CLASSES.iter().any(|(c, _)| *c == class)
}

pub fn parent(class: &str) -> Option<&'static str> {
    CLASSES
        .iter()
        .find(|(c, _)| *c == class)
        .and_then(|(_, p)| *p)
}

/// `class` followed by its ancestors, nearest first.
pub fn ancestry(class: &str) -> Vec<&'static str> {
    let mut chain = Vec::new();
    let mut current = CLASSES.iter().find(|(c, _)| *c == class).map(|(c, _)| *c);
    while let Some(c) = current {
        chain.push(c);
        current = parent(c);
    }
    chain
}

pub fn is_a(class: &str, ancestor: &str) -> bool {
    ancestry(class).contains(&ancestor)
}

/// Whether `class` can be instantiated as a node.
pub fn is_node_class(class: &str) -> bool {
    is_a(class, "Node") && !ABSTRACT.contains(&class)
}

pub fn all() -> impl Iterator<Item = &'static str> {
    CLASSES.iter().map(|(c, _)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inheritance_chain() {
        assert_eq!(
            ancestry("CharacterBody2D"),
            vec![
                "CharacterBody2D",
                "PhysicsBody2D",
                "CollisionObject2D",
                "Node2D",
                "CanvasItem",
                "Node",
                "Object"
            ]
        );
        assert!(is_a("Label", "Control"));
        assert!(!is_a("Label", "Node2D"));
    }

    #[test]
    fn node_classes() {
        assert!(is_node_class("Sprite2D"));
        assert!(!is_node_class("PhysicsBody2D"));
        assert!(!is_node_class("Object"));
        assert!(!is_node_class("Banana"));
        assert!(all().count() > 10);
    }
}
