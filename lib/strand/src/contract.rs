//! The capability contract the bridge consumes from the hosting engine.
//!
//! The bridge never owns nodes. It addresses them by [`InstanceId`] and holds
//! signal connections only as [`SubscriptionId`] handles, so nothing on the
//! bridge side can keep a freed node alive or fire into one.

use crate::value::{Value, ValueKind};
use std::error;
use std::fmt;
use std::path::PathBuf;

/// Engine-assigned identifier, unique for the lifetime of a node object and
/// never reused within an engine run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a signal connection installed through [`Engine::connect`].
/// Must be passed back to [`Engine::disconnect`] before the subscriber goes
/// away.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signal delivery queued by the engine. Drained by the bridge once per
/// frame through [`Engine::drain_signal_fires`].
#[derive(Clone, Debug, PartialEq)]
pub struct SignalFire {
    pub subscription: SubscriptionId,
    pub source: InstanceId,
    pub signal: String,
    /// Single node argument, for signals that carry one. Signals with more
    /// arguments have the excess dropped by the engine.
    pub argument: Option<InstanceId>,
}

/// Signal metadata as reported by a node.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalInfo {
    pub name: String,
    pub arg_count: usize,
    pub connection_count: usize,
}

/// A script-declared, storage-flagged property.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptProperty {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpatialKind {
    None,
    TwoD,
    ThreeD,
}

/// Axis-aligned screen-space rectangle in viewport pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ScreenRect {
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// A node position projected into viewport pixels. `behind` is set for 3D
/// points behind the active camera.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
    pub behind: bool,
}

/// Engine clock sample. `seconds` advances on the engine clock and therefore
/// respects pause and time scale; `frame` advances every processed frame
/// regardless.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Clock {
    pub frame: u64,
    pub seconds: f64,
    pub fps: f64,
    pub paused: bool,
    pub time_scale: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Synthetic input delivered through the engine's raw-input dispatch. The
/// receiving game cannot distinguish these from hardware events.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Key {
        keycode: u32,
        pressed: bool,
    },
    MouseButton {
        x: f32,
        y: f32,
        global_x: f32,
        global_y: f32,
        button: MouseButton,
        pressed: bool,
        double_click: bool,
    },
    MouseMotion {
        x: f32,
        y: f32,
        relative_x: f32,
        relative_y: f32,
    },
    Action {
        name: String,
        pressed: bool,
        strength: f32,
    },
}

/// RGBA8 frame returned by the viewport capture. Rows are packed top-down.
#[derive(Clone)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameImage {
    #[inline]
    pub fn new(width: u32, height: u32) -> FrameImage {
        FrameImage {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineError {
    NoSuchNode,
    NoSuchProperty(String),
    NoSuchMethod(String),
    NoSuchSignal(String),
    NoCamera,
    Unsupported(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::NoSuchNode => write!(f, "Node not found"),
            EngineError::NoSuchProperty(name) => write!(f, "No property '{}'", name),
            EngineError::NoSuchMethod(name) => write!(f, "No method '{}'", name),
            EngineError::NoSuchSignal(name) => write!(f, "No signal '{}'", name),
            EngineError::NoCamera => write!(f, "No active camera"),
            EngineError::Unsupported(msg) => write!(f, "{}", msg),
        }
    }
}

impl error::Error for EngineError {}

/// The full set of engine capabilities the bridge consumes. Object safe so
/// the bridge can hold `&mut dyn Engine` for the duration of one frame tick.
pub trait Engine {
    // Scene & identity
    fn current_scene(&self) -> Option<InstanceId>;
    fn scene_file_path(&self) -> Option<String>;
    fn scene_name(&self) -> Option<String>;
    fn project_name(&self) -> String;
    fn is_instance_valid(&self, id: InstanceId) -> bool;
    fn is_in_tree(&self, id: InstanceId) -> bool;

    // Node introspection
    fn class_name(&self, id: InstanceId) -> EngineResult<String>;
    /// Inheritance-aware class test.
    fn is_class(&self, id: InstanceId, class: &str) -> bool;
    fn node_name(&self, id: InstanceId) -> EngineResult<String>;
    fn parent(&self, id: InstanceId) -> Option<InstanceId>;
    fn children(&self, id: InstanceId) -> Vec<InstanceId>;
    /// Absolute path from the tree root.
    fn path_of(&self, id: InstanceId) -> Option<String>;
    /// Resolves a slash-separated path relative to `root`.
    fn node_at_path(&self, root: InstanceId, path: &str) -> Option<InstanceId>;
    fn groups(&self, id: InstanceId) -> Vec<String>;
    fn signal_list(&self, id: InstanceId) -> Vec<SignalInfo>;
    fn text_of(&self, id: InstanceId) -> Option<String>;
    fn is_visible(&self, id: InstanceId) -> bool;
    fn has_script(&self, id: InstanceId) -> bool;
    fn spatial_kind(&self, id: InstanceId) -> SpatialKind;
    /// Screen-space rectangle, for layout-capable UI nodes only.
    fn screen_rect(&self, id: InstanceId) -> Option<ScreenRect>;
    /// Viewport-space position: the global position for 2D nodes, the active
    /// camera projection for 3D nodes.
    fn screen_point(&self, id: InstanceId) -> EngineResult<ScreenPoint>;

    // Properties & methods
    fn get_property(&self, id: InstanceId, name: &str) -> EngineResult<Value>;
    fn set_property(&mut self, id: InstanceId, name: &str, value: Value) -> EngineResult<()>;
    /// Declared type of a property, used to decode incoming JSON.
    fn property_kind(&self, id: InstanceId, name: &str) -> Option<ValueKind>;
    fn script_properties(&self, id: InstanceId) -> Vec<ScriptProperty>;
    fn call_method(&mut self, id: InstanceId, name: &str, args: Vec<Value>) -> EngineResult<Value>;

    // Signals
    fn connect(&mut self, id: InstanceId, signal: &str) -> EngineResult<SubscriptionId>;
    fn disconnect(&mut self, sub: SubscriptionId);
    /// Subscribes to scene-tree lifecycle; fires carry signal `node_added` or
    /// `node_removed` with the affected node as argument.
    fn connect_tree(&mut self) -> SubscriptionId;
    /// Drains every signal delivery queued since the previous drain.
    fn drain_signal_fires(&mut self) -> Vec<SignalFire>;

    // Input
    fn dispatch_input(&mut self, event: InputEvent);
    fn action_names(&self) -> Vec<String>;
    fn mouse_position(&self) -> (f32, f32);

    // Clock & viewport
    fn clock(&self) -> Clock;
    fn set_paused(&mut self, paused: bool);
    fn set_time_scale(&mut self, scale: f64);
    fn viewport_size(&self) -> (u32, u32);
    fn capture_viewport(&mut self) -> Option<FrameImage>;
    fn log_file_path(&self) -> Option<PathBuf>;
}

/// Keycode space shared between the injector and the engine. Letters and
/// digits are their ASCII uppercase scalar values; named keys live above the
/// Unicode planes.
pub mod keys {
    const SPECIAL: u32 = 1 << 22;

    pub const ESCAPE: u32 = SPECIAL | 0x01;
    pub const TAB: u32 = SPECIAL | 0x02;
    pub const BACKSPACE: u32 = SPECIAL | 0x03;
    pub const ENTER: u32 = SPECIAL | 0x04;
    pub const INSERT: u32 = SPECIAL | 0x05;
    pub const DELETE: u32 = SPECIAL | 0x06;
    pub const HOME: u32 = SPECIAL | 0x07;
    pub const END: u32 = SPECIAL | 0x08;
    pub const PAGE_UP: u32 = SPECIAL | 0x09;
    pub const PAGE_DOWN: u32 = SPECIAL | 0x0a;
    pub const LEFT: u32 = SPECIAL | 0x0b;
    pub const UP: u32 = SPECIAL | 0x0c;
    pub const RIGHT: u32 = SPECIAL | 0x0d;
    pub const DOWN: u32 = SPECIAL | 0x0e;
    pub const SHIFT: u32 = SPECIAL | 0x0f;
    pub const CTRL: u32 = SPECIAL | 0x10;
    pub const ALT: u32 = SPECIAL | 0x11;
    pub const META: u32 = SPECIAL | 0x12;
    pub const CAPS_LOCK: u32 = SPECIAL | 0x13;
    pub const NUM_LOCK: u32 = SPECIAL | 0x14;
    pub const SCROLL_LOCK: u32 = SPECIAL | 0x15;
    pub const PAUSE: u32 = SPECIAL | 0x16;
    pub const PRINT_SCREEN: u32 = SPECIAL | 0x17;
    pub const MENU: u32 = SPECIAL | 0x18;
    pub const F1: u32 = SPECIAL | 0x20;
    pub const F2: u32 = SPECIAL | 0x21;
    pub const F3: u32 = SPECIAL | 0x22;
    pub const F4: u32 = SPECIAL | 0x23;
    pub const F5: u32 = SPECIAL | 0x24;
    pub const F6: u32 = SPECIAL | 0x25;
    pub const F7: u32 = SPECIAL | 0x26;
    pub const F8: u32 = SPECIAL | 0x27;
    pub const F9: u32 = SPECIAL | 0x28;
    pub const F10: u32 = SPECIAL | 0x29;
    pub const F11: u32 = SPECIAL | 0x2a;
    pub const F12: u32 = SPECIAL | 0x2b;
    pub const SPACE: u32 = 0x20;
}
