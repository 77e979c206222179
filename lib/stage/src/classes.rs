//! The class taxonomy the stage understands: single-inheritance chains and
//! the signals each class exposes by default.

/// (class, parent). Roots ("Node") have no entry.
const PARENTS: &[(&str, &str)] = &[
    ("CanvasItem", "Node"),
    ("Node2D", "CanvasItem"),
    ("Control", "CanvasItem"),
    ("Node3D", "Node"),
    // 2D
    ("Sprite2D", "Node2D"),
    ("AnimatedSprite2D", "Node2D"),
    ("Camera2D", "Node2D"),
    ("CollisionObject2D", "Node2D"),
    ("PhysicsBody2D", "CollisionObject2D"),
    ("CharacterBody2D", "PhysicsBody2D"),
    ("RigidBody2D", "PhysicsBody2D"),
    ("StaticBody2D", "PhysicsBody2D"),
    ("Area2D", "CollisionObject2D"),
    ("RayCast2D", "Node2D"),
    ("TileMapLayer", "Node2D"),
    ("GPUParticles2D", "Node2D"),
    ("CPUParticles2D", "Node2D"),
    ("VisibleOnScreenNotifier2D", "Node2D"),
    ("AudioStreamPlayer2D", "Node2D"),
    ("NavigationAgent2D", "Node"),
    // 3D
    ("Sprite3D", "Node3D"),
    ("AnimatedSprite3D", "Node3D"),
    ("Camera3D", "Node3D"),
    ("MeshInstance3D", "Node3D"),
    ("CollisionObject3D", "Node3D"),
    ("PhysicsBody3D", "CollisionObject3D"),
    ("CharacterBody3D", "PhysicsBody3D"),
    ("RigidBody3D", "PhysicsBody3D"),
    ("StaticBody3D", "PhysicsBody3D"),
    ("Area3D", "CollisionObject3D"),
    ("RayCast3D", "Node3D"),
    ("GPUParticles3D", "Node3D"),
    ("CPUParticles3D", "Node3D"),
    ("AudioStreamPlayer3D", "Node3D"),
    ("NavigationAgent3D", "Node"),
    // UI
    ("BaseButton", "Control"),
    ("Button", "BaseButton"),
    ("Label", "Control"),
    ("LineEdit", "Control"),
    ("TextEdit", "Control"),
    ("RichTextLabel", "Control"),
    ("Range", "Control"),
    ("ProgressBar", "Range"),
    ("Container", "Control"),
    // Plain nodes
    ("Timer", "Node"),
    ("AudioStreamPlayer", "Node"),
    ("AnimationPlayer", "Node"),
    ("AnimationTree", "Node"),
];

/// (owning class, signal, argument count).
const SIGNALS: &[(&str, &str, usize)] = &[
    ("Timer", "timeout", 0),
    ("BaseButton", "pressed", 0),
    ("Area2D", "body_entered", 1),
    ("Area2D", "body_exited", 1),
    ("Area2D", "area_entered", 1),
    ("Area2D", "area_exited", 1),
    ("Area3D", "body_entered", 1),
    ("Area3D", "body_exited", 1),
    ("Area3D", "area_entered", 1),
    ("Area3D", "area_exited", 1),
    ("RigidBody2D", "body_entered", 1),
    ("RigidBody2D", "body_exited", 1),
    ("RigidBody2D", "sleeping_state_changed", 0),
    ("RigidBody3D", "body_entered", 1),
    ("RigidBody3D", "body_exited", 1),
    ("RigidBody3D", "sleeping_state_changed", 0),
    ("AnimationPlayer", "animation_finished", 1),
    ("AnimationTree", "animation_finished", 1),
    ("AnimatedSprite2D", "animation_finished", 0),
    ("AnimatedSprite3D", "animation_finished", 0),
    ("VisibleOnScreenNotifier2D", "screen_entered", 0),
    ("VisibleOnScreenNotifier2D", "screen_exited", 0),
    ("AudioStreamPlayer", "finished", 0),
    ("AudioStreamPlayer2D", "finished", 0),
    ("AudioStreamPlayer3D", "finished", 0),
    ("NavigationAgent2D", "target_reached", 0),
    ("NavigationAgent2D", "navigation_finished", 0),
    ("NavigationAgent3D", "target_reached", 0),
    ("NavigationAgent3D", "navigation_finished", 0),
];

pub fn parent_of(class: &str) -> Option<&'static str> {
    PARENTS
        .iter()
        .find(|(child, _)| *child == class)
        .map(|(_, parent)| *parent)
}

/// Inheritance-aware class test.
pub fn is_class(class: &str, ancestor: &str) -> bool {
    let mut cursor = class;
    loop {
        if cursor == ancestor {
            return true;
        }
        match parent_of(cursor) {
            Some(parent) => cursor = parent,
            None => return false,
        }
    }
}

/// Every signal a class exposes, own and inherited.
pub fn signals_of(class: &str) -> Vec<(&'static str, usize)> {
    let mut out = Vec::new();
    let mut cursor = class;
    loop {
        for (owner, signal, argc) in SIGNALS {
            if *owner == cursor {
                out.push((*signal, *argc));
            }
        }
        match parent_of(cursor) {
            Some(parent) => cursor = parent,
            None => return out,
        }
    }
}
