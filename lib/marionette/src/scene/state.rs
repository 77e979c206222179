//! Deep introspection of a single node.
//!
//! A node is inspected against a closed, iteration-ordered registry of
//! capability readers. Every reader whose predicate matches contributes its
//! own disjoint set of fields on top of the common preamble, so a
//! `CharacterBody2D` with an attached script reports its transform, its
//! kinematic state, and its script variables in one flat map.

use crate::serialize;
use serde_json::{Map, Value as Json};
use strand::contract::{Engine, InstanceId, SpatialKind};

trait CapabilityReader: Sync {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool;
    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>);
}

/// The registry. Order is fixed; each reader owns a disjoint key set, so
/// tie-breaks cannot arise.
static READERS: &[&dyn CapabilityReader] = &[
    &Transform,
    &UiLayout,
    &CanvasItem,
    &KinematicBody,
    &RigidBody,
    &AnimationPlayer,
    &AnimatedSprite,
    &Area,
    &TimerReader,
    &AudioPlayer,
    &Particles,
    &Camera2D,
    &Camera3D,
    &NavigationAgent,
    &Raycast,
    &TileMapLayer,
    &ProgressWidget,
    &TextInput,
    &LabelButton,
];

/// Reads the full state map for one node: preamble, every matching
/// capability, then script properties, groups and connected signals.
pub fn read_state(engine: &dyn Engine, id: InstanceId, relative_path: &str) -> Map<String, Json> {
    let mut out = Map::new();

    out.insert("name".into(), Json::String(engine.node_name(id).unwrap_or_default()));
    out.insert("type".into(), Json::String(engine.class_name(id).unwrap_or_default()));
    out.insert("path".into(), Json::String(relative_path.to_string()));

    for reader in READERS {
        if reader.applies(engine, id) {
            reader.read(engine, id, &mut out);
        }
    }

    let mut properties = Map::new();
    for script_property in engine.script_properties(id) {
        if let Ok(value) = engine.get_property(id, &script_property.name) {
            properties.insert(script_property.name, serialize::to_json(&value));
        }
    }
    if !properties.is_empty() {
        out.insert("properties".into(), Json::Object(properties));
    }

    let groups: Vec<Json> = engine
        .groups(id)
        .into_iter()
        .filter(|group| !group.starts_with('_'))
        .map(Json::String)
        .collect();
    if !groups.is_empty() {
        out.insert("groups".into(), Json::Array(groups));
    }

    let signals: Vec<Json> = engine
        .signal_list(id)
        .into_iter()
        .filter(|signal| signal.connection_count > 0)
        .map(|signal| Json::String(signal.name))
        .collect();
    if !signals.is_empty() {
        out.insert("connected_signals".into(), Json::Array(signals));
    }

    out
}

/// Copies properties into the output map under new keys, skipping any the
/// node does not actually expose.
fn copy_props(engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>, fields: &[(&str, &str)]) {
    for (key, property) in fields {
        if let Ok(value) = engine.get_property(id, property) {
            out.insert((*key).to_string(), serialize::to_json(&value));
        }
    }
}

fn is_any(engine: &dyn Engine, id: InstanceId, classes: &[&str]) -> bool {
    classes.iter().any(|class| engine.is_class(id, class))
}

struct Transform;

impl CapabilityReader for Transform {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.spatial_kind(id) != SpatialKind::None
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("position", "position"),
                ("global_position", "global_position"),
                ("rotation", "rotation"),
                ("scale", "scale"),
            ],
        );
    }
}

struct UiLayout;

impl CapabilityReader for UiLayout {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.screen_rect(id).is_some()
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        if let Some(rect) = engine.screen_rect(id) {
            out.insert("size".into(), serde_json::json!([rect.w, rect.h]));
            out.insert("global_position".into(), serde_json::json!([rect.x, rect.y]));
        }
        out.insert("visible_in_tree".into(), Json::Bool(engine.is_visible(id)));
    }
}

struct CanvasItem;

impl CapabilityReader for CanvasItem {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "CanvasItem")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("modulate", "modulate"),
                ("self_modulate", "self_modulate"),
                ("z_index", "z_index"),
            ],
        );
        out.insert("visible_in_tree".into(), Json::Bool(engine.is_visible(id)));
    }
}

struct KinematicBody;

impl CapabilityReader for KinematicBody {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["CharacterBody2D", "CharacterBody3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("velocity", "velocity"),
                ("is_on_floor", "is_on_floor"),
                ("is_on_wall", "is_on_wall"),
                ("is_on_ceiling", "is_on_ceiling"),
                ("slide_collision_count", "slide_collision_count"),
                ("slide_collisions", "slide_collisions"),
            ],
        );
    }
}

struct RigidBody;

impl CapabilityReader for RigidBody {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["RigidBody2D", "RigidBody3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("linear_velocity", "linear_velocity"),
                ("angular_velocity", "angular_velocity"),
                ("sleeping", "sleeping"),
                ("mass", "mass"),
                ("gravity_scale", "gravity_scale"),
                ("contact_monitor", "contact_monitor"),
            ],
        );
        // Friction and bounce only exist when an override material is set.
        if let Ok(material) = engine.get_property(id, "physics_material_override") {
            if material != strand::value::Value::Nil {
                copy_props(engine, id, out, &[("friction", "friction"), ("bounce", "bounce")]);
            }
        }
    }
}

struct AnimationPlayer;

impl CapabilityReader for AnimationPlayer {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "AnimationPlayer")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("current_animation", "current_animation"),
                ("animation_position", "current_animation_position"),
                ("is_playing", "playing"),
            ],
        );
    }
}

struct AnimatedSprite;

impl CapabilityReader for AnimatedSprite {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["AnimatedSprite2D", "AnimatedSprite3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[("animation", "animation"), ("frame", "frame"), ("is_playing", "playing")],
        );
    }
}

struct Area;

impl CapabilityReader for Area {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["Area2D", "Area3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("overlapping_bodies", "overlapping_bodies"),
                ("overlapping_areas", "overlapping_areas"),
            ],
        );
    }
}

struct TimerReader;

impl CapabilityReader for TimerReader {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "Timer")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("time_left", "time_left"),
                ("is_stopped", "stopped"),
                ("wait_time", "wait_time"),
                ("one_shot", "one_shot"),
                ("autostart", "autostart"),
            ],
        );
    }
}

struct AudioPlayer;

impl CapabilityReader for AudioPlayer {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(
            engine,
            id,
            &["AudioStreamPlayer", "AudioStreamPlayer2D", "AudioStreamPlayer3D"],
        )
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("playing", "playing"),
                ("stream", "stream"),
                ("volume_db", "volume_db"),
                ("bus", "bus"),
            ],
        );
        if is_any(engine, id, &["AudioStreamPlayer2D", "AudioStreamPlayer3D"]) {
            copy_props(
                engine,
                id,
                out,
                &[("max_distance", "max_distance"), ("attenuation", "attenuation")],
            );
        }
    }
}

struct Particles;

impl CapabilityReader for Particles {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(
            engine,
            id,
            &["GPUParticles2D", "GPUParticles3D", "CPUParticles2D", "CPUParticles3D"],
        )
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("emitting", "emitting"),
                ("amount", "amount"),
                ("lifetime", "lifetime"),
                ("one_shot", "one_shot"),
            ],
        );
    }
}

struct Camera2D;

impl CapabilityReader for Camera2D {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "Camera2D")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("current", "enabled"),
                ("zoom", "zoom"),
                ("limit_left", "limit_left"),
                ("limit_top", "limit_top"),
                ("limit_right", "limit_right"),
                ("limit_bottom", "limit_bottom"),
                ("drag_horizontal", "drag_horizontal_enabled"),
                ("drag_vertical", "drag_vertical_enabled"),
            ],
        );
    }
}

struct Camera3D;

impl CapabilityReader for Camera3D {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "Camera3D")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("current", "current"),
                ("fov", "fov"),
                ("near", "near"),
                ("far", "far"),
                ("projection", "projection"),
            ],
        );
    }
}

struct NavigationAgent;

impl CapabilityReader for NavigationAgent {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["NavigationAgent2D", "NavigationAgent3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("target_position", "target_position"),
                ("is_navigation_finished", "is_navigation_finished"),
                ("distance_to_target", "distance_to_target"),
                ("is_target_reachable", "is_target_reachable"),
                ("max_speed", "max_speed"),
            ],
        );
    }
}

struct Raycast;

impl CapabilityReader for Raycast {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["RayCast2D", "RayCast3D"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("enabled", "enabled"),
                ("is_colliding", "is_colliding"),
                ("collider", "collider"),
                ("collision_point", "collision_point"),
                ("collision_normal", "collision_normal"),
            ],
        );
    }
}

struct TileMapLayer;

impl CapabilityReader for TileMapLayer {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "TileMapLayer")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("tileset", "tile_set"),
                ("enabled", "enabled"),
                ("used_cells_count", "used_cells_count"),
            ],
        );
    }
}

struct ProgressWidget;

impl CapabilityReader for ProgressWidget {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        engine.is_class(id, "Range")
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("value", "value"),
                ("min", "min_value"),
                ("max", "max_value"),
                ("ratio", "ratio"),
            ],
        );
    }
}

struct TextInput;

impl CapabilityReader for TextInput {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["LineEdit", "TextEdit"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        copy_props(
            engine,
            id,
            out,
            &[
                ("text", "text"),
                ("placeholder", "placeholder_text"),
                ("editable", "editable"),
            ],
        );
    }
}

struct LabelButton;

impl CapabilityReader for LabelButton {
    fn applies(&self, engine: &dyn Engine, id: InstanceId) -> bool {
        is_any(engine, id, &["Label", "BaseButton"])
    }

    fn read(&self, engine: &dyn Engine, id: InstanceId, out: &mut Map<String, Json>) {
        if let Some(text) = engine.text_of(id) {
            out.insert("text".into(), Json::String(text));
        }
        if engine.is_class(id, "BaseButton") {
            copy_props(engine, id, out, &[("disabled", "disabled")]);
        }
    }
}
