//! Built-in macros.

use crate::error::OrchestratorError;
use crate::registry::{MacroDefinition, MacroOp, Registry};
use once_cell::sync::Lazy;
use serde_json::{Value, json};

/// Output of the compose step.
pub const COMPOSE_OUTPUT: &str = "res://generated/main.scene.json";

/// Record id used for the compose step in run manifests.
pub const COMPOSE_ID: &str = "compose";

static BUILTIN: Lazy<Result<Registry, String>> = Lazy::new(|| {
    Registry::new(vec![
        MacroDefinition {
            id: "game_state",
            title: "Game state autoload",
            description: "Global score/lives/level state script meant to be registered as an autoload.",
            outputs: &["res://generated/scripts/game_state.gd"],
            build_ops: game_state,
        },
        MacroDefinition {
            id: "player",
            title: "Player character",
            description: "CharacterBody2D player scene with sprite, collision shape and movement script.",
            outputs: &[
                "res://generated/scripts/player.gd",
                "res://generated/scenes/player.scene.json",
            ],
            build_ops: player,
        },
        MacroDefinition {
            id: "enemy",
            title: "Patrolling enemy",
            description: "Enemy scene with a hitbox wired to its script.",
            outputs: &[
                "res://generated/scripts/enemy.gd",
                "res://generated/scenes/enemy.scene.json",
            ],
            build_ops: enemy,
        },
        MacroDefinition {
            id: "hud",
            title: "Heads-up display",
            description: "CanvasLayer with score label and health bar.",
            outputs: &[
                "res://generated/scripts/hud.gd",
                "res://generated/scenes/hud.scene.json",
            ],
            build_ops: hud,
        },
        MacroDefinition {
            id: "level",
            title: "Level shell",
            description: "Level root with camera, tile map and a spawn point.",
            outputs: &["res://generated/scenes/level.scene.json"],
            build_ops: level,
        },
    ])
    .map_err(|e| match e {
        OrchestratorError::DuplicateMacro(id) => id,
        other => other.to_string(),
    })
});

/// The process-wide built-in registry.
pub fn builtin() -> Result<&'static Registry, OrchestratorError> {
    BUILTIN
        .as_ref()
        .map_err(|e| OrchestratorError::DuplicateMacro(e.clone()))
}

/// Ops that instance every scene in `scenes` under a new top-level scene.
pub fn compose_ops(scenes: &[&str]) -> Vec<MacroOp> {
    let mut ops = vec![create_scene(COMPOSE_OUTPUT, "Node2D", "Main")];
    for source in scenes {
        ops.push(MacroOp::new(
            "instance_scene",
            json!({ "scene": COMPOSE_OUTPUT, "parent": ".", "source": source }),
        ));
    }
    ops.push(save(COMPOSE_OUTPUT));
    ops
}

fn write(path: &str, content: &str) -> MacroOp {
    MacroOp::new("write_text_file", json!({ "path": path, "content": content }))
}

fn create_scene(path: &str, root_class: &str, root_name: &str) -> MacroOp {
    MacroOp::new(
        "create_scene",
        json!({ "path": path, "root_class": root_class, "root_name": root_name }),
    )
}

fn add_node(scene: &str, parent: &str, name: &str, class: &str, properties: Value) -> MacroOp {
    MacroOp::new(
        "add_node",
        json!({
            "scene": scene,
            "parent": parent,
            "name": name,
            "class": class,
            "properties": properties,
        }),
    )
}

fn attach_script(scene: &str, node: &str, script: &str) -> MacroOp {
    MacroOp::new(
        "attach_script",
        json!({ "scene": scene, "node": node, "script": script }),
    )
}

fn save(scene: &str) -> MacroOp {
    MacroOp::new("save_scene", json!({ "scene": scene }))
}

fn vec2(x: f64, y: f64) -> Value {
    json!({ "@type": "Vector2", "x": x, "y": y })
}

const GAME_STATE_GD: &str = r#"extends Node

signal score_changed(score: int)
signal lives_changed(lives: int)

var score := 0
var lives := 3
var level := 1

func add_score(points: int) -> void:
	score += points
	score_changed.emit(score)

func lose_life() -> void:
	lives = max(lives - 1, 0)
	lives_changed.emit(lives)

func reset() -> void:
	score = 0
	lives = 3
	level = 1
"#;

const PLAYER_GD: &str = r#"extends CharacterBody2D

@export var speed := 220.0
@export var jump_velocity := -380.0

var gravity: float = ProjectSettings.get_setting("physics/2d/default_gravity")

func _physics_process(delta: float) -> void:
	if not is_on_floor():
		velocity.y += gravity * delta
	if Input.is_action_just_pressed("ui_accept") and is_on_floor():
		velocity.y = jump_velocity
	velocity.x = Input.get_axis("ui_left", "ui_right") * speed
	move_and_slide()
"#;

const ENEMY_GD: &str = r#"extends CharacterBody2D

@export var speed := 80.0
@export var patrol_distance := 160.0

var _origin := Vector2.ZERO
var _direction := 1.0

func _ready() -> void:
	_origin = position

func _physics_process(_delta: float) -> void:
	if abs(position.x - _origin.x) > patrol_distance:
		_direction = -_direction
	velocity.x = speed * _direction
	move_and_slide()

func _on_hitbox_body_entered(body: Node2D) -> void:
	if body.name == "Player":
		GameState.lose_life()
"#;

const HUD_GD: &str = r#"extends CanvasLayer

func _ready() -> void:
	GameState.score_changed.connect(_on_score_changed)
	GameState.lives_changed.connect(_on_lives_changed)

func _on_score_changed(score: int) -> void:
	$Score.text = "Score: %d" % score

func _on_lives_changed(lives: int) -> void:
	$Health.value = lives
"#;

fn game_state() -> Vec<MacroOp> {
    vec![write("res://generated/scripts/game_state.gd", GAME_STATE_GD)]
}

fn player() -> Vec<MacroOp> {
    let scene = "res://generated/scenes/player.scene.json";
    let script = "res://generated/scripts/player.gd";
    vec![
        write(script, PLAYER_GD),
        create_scene(scene, "CharacterBody2D", "Player"),
        add_node(scene, ".", "Sprite", "Sprite2D", json!({ "centered": true })),
        add_node(
            scene,
            ".",
            "Collision",
            "CollisionShape2D",
            json!({ "position": vec2(0.0, 4.0) }),
        ),
        attach_script(scene, ".", script),
        save(scene),
    ]
}

fn enemy() -> Vec<MacroOp> {
    let scene = "res://generated/scenes/enemy.scene.json";
    let script = "res://generated/scripts/enemy.gd";
    vec![
        write(script, ENEMY_GD),
        create_scene(scene, "CharacterBody2D", "Enemy"),
        add_node(scene, ".", "Sprite", "Sprite2D", json!({})),
        add_node(scene, ".", "Collision", "CollisionShape2D", json!({})),
        add_node(scene, ".", "Hitbox", "Area2D", json!({ "monitoring": true })),
        add_node(scene, "Hitbox", "Shape", "CollisionShape2D", json!({})),
        attach_script(scene, ".", script),
        MacroOp::new(
            "connect_signal",
            json!({
                "scene": scene,
                "node": "Hitbox",
                "signal": "body_entered",
                "target": ".",
                "method": "_on_hitbox_body_entered",
            }),
        ),
        save(scene),
    ]
}

fn hud() -> Vec<MacroOp> {
    let scene = "res://generated/scenes/hud.scene.json";
    let script = "res://generated/scripts/hud.gd";
    vec![
        write(script, HUD_GD),
        create_scene(scene, "CanvasLayer", "Hud"),
        add_node(
            scene,
            ".",
            "Score",
            "Label",
            json!({ "text": "Score: 0", "position": vec2(16.0, 16.0) }),
        ),
        add_node(
            scene,
            ".",
            "Health",
            "ProgressBar",
            json!({ "max_value": 3, "value": 3, "position": vec2(16.0, 48.0) }),
        ),
        attach_script(scene, ".", script),
        save(scene),
    ]
}

fn level() -> Vec<MacroOp> {
    let scene = "res://generated/scenes/level.scene.json";
    vec![
        create_scene(scene, "Node2D", "Level"),
        add_node(scene, ".", "Tiles", "TileMap", json!({})),
        add_node(scene, ".", "Camera", "Camera2D", json!({ "zoom": vec2(2.0, 2.0) })),
        add_node(
            scene,
            ".",
            "SpawnPoint",
            "Marker2D",
            json!({ "position": vec2(64.0, 200.0) }),
        ),
        MacroOp::new(
            "set_property",
            json!({
                "scene": scene,
                "node": "Camera",
                "property": "position_smoothing_enabled",
                "value": true,
            }),
        ),
        save(scene),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OpKind;

    #[test]
    fn builtin_catalog_is_consistent() {
        let registry = builtin().unwrap();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, ["game_state", "player", "enemy", "hud", "level"]);

        for def in registry.list() {
            let ops = (registry.get(def.id).unwrap().build_ops)();
            // Every declared output is produced by some op.
            for output in def.outputs {
                assert!(
                    ops.iter().any(|op| op.param("path") == Some(*output)),
                    "{} never writes {output}",
                    def.id
                );
            }
            // Nested ops only address scenes the macro itself creates.
            for op in ops.iter().filter(|op| op.kind() == OpKind::Nested) {
                assert!(def.outputs.iter().any(|o| Some(*o) == op.artifact()));
            }
        }
    }

    #[test]
    fn compose_instances_each_scene() {
        let ops = compose_ops(&["res://a.scene.json", "res://b.scene.json"]);
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].param("path"), Some(COMPOSE_OUTPUT));
        assert_eq!(ops[2].param("source"), Some("res://b.scene.json"));
        assert_eq!(ops[3].operation, "save_scene");
    }
}
