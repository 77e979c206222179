//! Synthesis of keyboard, mouse and mapped-action events.
//!
//! Everything goes through the engine's raw-input dispatch with explicit
//! pressed flags, so the game cannot tell synthetic input from hardware
//! input. Press/release pairing and frame spacing are handled by the task
//! layer; this module builds the events and computes click targets.

use serde_json::Value as Json;
use strand::contract::{Engine, InputEvent, InstanceId, MouseButton, SpatialKind};

/// Builds the press/release pair for a point click. Both local and global
/// positions are carried; for a viewport click they coincide.
pub fn click_events(x: f32, y: f32, button: MouseButton, double: bool) -> (InputEvent, InputEvent) {
    let press = InputEvent::MouseButton {
        x,
        y,
        global_x: x,
        global_y: y,
        button,
        pressed: true,
        double_click: double,
    };
    let release = InputEvent::MouseButton {
        x,
        y,
        global_x: x,
        global_y: y,
        button,
        pressed: false,
        double_click: false,
    };
    (press, release)
}

#[inline]
pub fn key_event(keycode: u32, pressed: bool) -> InputEvent {
    InputEvent::Key { keycode, pressed }
}

#[inline]
pub fn action_event(name: &str, pressed: bool, strength: f32) -> InputEvent {
    InputEvent::Action {
        name: name.to_string(),
        pressed,
        strength,
    }
}

#[inline]
pub fn mouse_move_event(x: f32, y: f32, relative_x: f32, relative_y: f32) -> InputEvent {
    InputEvent::MouseMotion {
        x,
        y,
        relative_x,
        relative_y,
    }
}

/// Accepts a button by name or index; defaults to left when unspecified.
pub fn resolve_button(raw: Option<&str>) -> Option<MouseButton> {
    match raw.unwrap_or("left") {
        "left" | "1" => Some(MouseButton::Left),
        "right" | "2" => Some(MouseButton::Right),
        "middle" | "3" => Some(MouseButton::Middle),
        _ => None,
    }
}

/// Computes the screen-space point a node click should land on.
///
/// UI nodes are clicked at the center of their global rectangle, 2D nodes at
/// their global position, 3D nodes at the active camera's projection of it.
pub fn click_target(engine: &dyn Engine, id: InstanceId) -> Result<(f32, f32), String> {
    if let Some(rect) = engine.screen_rect(id) {
        return Ok(rect.center());
    }

    match engine.spatial_kind(id) {
        SpatialKind::TwoD | SpatialKind::ThreeD => match engine.screen_point(id) {
            Ok(point) if point.behind => Err("Node is behind the active camera".into()),
            Ok(point) => Ok((point.x, point.y)),
            Err(err) => Err(err.to_string()),
        },
        SpatialKind::None => {
            let class = engine.class_name(id).unwrap_or_default();
            Err(format!("Node type {} does not support clicking", class))
        }
    }
}

/// Key actions accepted by `/key` and by `key` sequence steps.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyAction {
    Tap,
    Press,
    Release,
    Hold,
}

impl KeyAction {
    pub fn parse(raw: &str) -> Option<KeyAction> {
        match raw {
            "tap" => Some(KeyAction::Tap),
            "press" => Some(KeyAction::Press),
            "release" => Some(KeyAction::Release),
            "hold" => Some(KeyAction::Hold),
            _ => None,
        }
    }
}

/// One step of a scripted input sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum SeqStep {
    Wait { seconds: f64 },
    Key { name: String, action: KeyAction, duration: f64 },
    Action { name: String, pressed: bool, strength: f32 },
    Click { x: f32, y: f32 },
    ClickNode { key: String },
    MouseMove { x: f32, y: f32 },
}

/// Parses the tagged-map step list. Steps execute strictly in order; each
/// step owns exactly one of the recognized tags.
pub fn parse_steps(raw: &Json) -> Result<Vec<SeqStep>, String> {
    let items = raw.as_array().ok_or("'steps' must be an array")?;
    let mut steps = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| format!("Step {} is not an object", index))?;

        let step = if let Some(seconds) = obj.get("wait") {
            SeqStep::Wait {
                seconds: seconds.as_f64().ok_or_else(|| format!("Step {}: 'wait' must be a number", index))?,
            }
        } else if let Some(name) = obj.get("key") {
            let name = name
                .as_str()
                .ok_or_else(|| format!("Step {}: 'key' must be a string", index))?;
            let action = match obj.get("action") {
                Some(action) => {
                    let action = action
                        .as_str()
                        .ok_or_else(|| format!("Step {}: 'action' must be a string", index))?;
                    KeyAction::parse(action).ok_or_else(|| format!("Step {}: unknown key action '{}'", index, action))?
                }
                None => KeyAction::Tap,
            };
            SeqStep::Key {
                name: name.to_string(),
                action,
                duration: obj.get("duration").and_then(Json::as_f64).unwrap_or(0.0),
            }
        } else if let Some(name) = obj.get("action") {
            let name = name
                .as_str()
                .ok_or_else(|| format!("Step {}: 'action' must be a string", index))?;
            SeqStep::Action {
                name: name.to_string(),
                pressed: obj.get("pressed").and_then(Json::as_bool).unwrap_or(true),
                strength: obj.get("strength").and_then(Json::as_f64).unwrap_or(1.0) as f32,
            }
        } else if let Some(point) = obj.get("click") {
            let (x, y) = parse_point(point).ok_or_else(|| format!("Step {}: 'click' must be [x, y]", index))?;
            SeqStep::Click { x, y }
        } else if let Some(key) = obj.get("click_node") {
            let key = key
                .as_str()
                .ok_or_else(|| format!("Step {}: 'click_node' must be a string", index))?;
            SeqStep::ClickNode { key: key.to_string() }
        } else if let Some(point) = obj.get("mouse_move") {
            let (x, y) = parse_point(point).ok_or_else(|| format!("Step {}: 'mouse_move' must be [x, y]", index))?;
            SeqStep::MouseMove { x, y }
        } else {
            return Err(format!("Step {} has no recognized action", index));
        };

        steps.push(step);
    }

    Ok(steps)
}

fn parse_point(raw: &Json) -> Option<(f32, f32)> {
    let items = raw.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_f64()? as f32, items[1].as_f64()? as f32))
}
