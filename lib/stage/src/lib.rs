//! An in-process scene-graph engine implementing the bridge contract.
//!
//! The stage is a deliberately small engine: a node tree with stable
//! instance ids, class-derived signals delivered as queued fires, an input
//! map, an engine clock with pause and time scale, and a flat-color
//! software viewport. The demo runner drives a real game loop on it, and
//! the bridge's integration tests use it as the engine double.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

mod classes;
mod render;

use hashbrown::HashMap;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use strand::contract::{
    Clock, Engine, EngineError, EngineResult, FrameImage, InputEvent, InstanceId, ScreenPoint, ScreenRect,
    ScriptProperty, SignalFire, SignalInfo, SpatialKind, SubscriptionId,
};
use strand::logging;
use strand::value::{Value, ValueKind};

struct Node {
    name: String,
    class: String,
    parent: Option<InstanceId>,
    children: Vec<InstanceId>,
    visible: bool,
    properties: IndexMap<String, Value>,
    script_props: Vec<(String, ValueKind)>,
    groups: Vec<String>,
    rect: Option<ScreenRect>,
}

struct ClockState {
    frame: u64,
    seconds: f64,
    last_dt: f64,
    paused: bool,
    time_scale: f64,
}

pub struct Stage {
    nodes: HashMap<InstanceId, Node>,
    next_id: u64,
    next_sub: u64,
    root: Option<InstanceId>,
    scene_file: Option<String>,
    project: String,
    subs: HashMap<SubscriptionId, (InstanceId, String)>,
    tree_subs: Vec<SubscriptionId>,
    fires: Vec<SignalFire>,
    clock: ClockState,
    input_log: Vec<(u64, InputEvent)>,
    actions: IndexMap<String, (bool, f32)>,
    viewport: (u32, u32),
    mouse: (f32, f32),
    log_file: Option<PathBuf>,
    log: logging::Logger,
}

impl Stage {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> Stage {
        Stage {
            nodes: HashMap::new(),
            next_id: 1,
            next_sub: 1,
            root: None,
            scene_file: None,
            project: "Stage".to_string(),
            subs: HashMap::new(),
            tree_subs: Vec::new(),
            fires: Vec::new(),
            clock: ClockState {
                frame: 0,
                seconds: 0.0,
                last_dt: 1.0 / 60.0,
                paused: false,
                time_scale: 1.0,
            },
            input_log: Vec::new(),
            actions: IndexMap::new(),
            viewport: (640, 360),
            mouse: (0.0, 0.0),
            log_file: None,
            log: logging::child_or_discard(log),
        }
    }

    /// Replaces the current scene. The old tree is freed (with lifecycle
    /// fires) and a fresh root is created.
    pub fn set_scene(&mut self, file: &str, name: &str) -> InstanceId {
        if let Some(old_root) = self.root.take() {
            self.free_node(old_root);
        }

        let root = self.alloc_node(None, "Node2D", name);
        self.root = Some(root);
        self.scene_file = Some(file.to_string());

        logging::debug!(self.log, "scene set"; "context" => "set_scene", "file" => %file);
        root
    }

    /// Adds a node under `parent` and fires `node_added` to tree
    /// subscribers.
    pub fn add_node(&mut self, parent: InstanceId, class: &str, name: &str) -> InstanceId {
        let id = self.alloc_node(Some(parent), class, name);
        self.nodes
            .get_mut(&parent)
            .expect("Parent node must exist")
            .children
            .push(id);

        self.fire_tree("node_added", id);
        id
    }

    /// Frees a node and its whole subtree, firing `node_removed` for each.
    pub fn free_node(&mut self, id: InstanceId) {
        let node = match self.nodes.get(&id) {
            Some(node) => node,
            None => return,
        };

        for child in node.children.clone() {
            self.free_node(child);
        }

        if let Some(parent) = self.nodes[&id].parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|&child| child != id);
            }
        }

        self.fire_tree("node_removed", id);
        self.nodes.remove(&id);

        if self.root == Some(id) {
            self.root = None;
        }
    }

    fn alloc_node(&mut self, parent: Option<InstanceId>, class: &str, name: &str) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;

        let mut properties = IndexMap::new();
        if classes::is_class(class, "Node2D") {
            properties.insert("position".to_string(), Value::Vector2([0.0, 0.0]));
            properties.insert("rotation".to_string(), Value::Float(0.0));
            properties.insert("scale".to_string(), Value::Vector2([1.0, 1.0]));
        } else if classes::is_class(class, "Node3D") {
            properties.insert("position".to_string(), Value::Vector3([0.0, 0.0, 0.0]));
            properties.insert("rotation".to_string(), Value::Vector3([0.0, 0.0, 0.0]));
            properties.insert("scale".to_string(), Value::Vector3([1.0, 1.0, 1.0]));
        }

        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                class: class.to_string(),
                parent,
                children: Vec::new(),
                visible: true,
                properties,
                script_props: Vec::new(),
                groups: Vec::new(),
                rect: None,
            },
        );

        id
    }

    fn fire_tree(&mut self, signal: &str, node: InstanceId) {
        for &sub in &self.tree_subs {
            self.fires.push(SignalFire {
                subscription: sub,
                source: node,
                signal: signal.to_string(),
                argument: Some(node),
            });
        }
    }

    /// Queues fires for every subscriber of (node, signal).
    pub fn emit_signal(&mut self, id: InstanceId, signal: &str, argument: Option<InstanceId>) {
        let matching: Vec<SubscriptionId> = self
            .subs
            .iter()
            .filter(|(_, (node, name))| *node == id && name.as_str() == signal)
            .map(|(&sub, _)| sub)
            .collect();

        for sub in matching {
            self.fires.push(SignalFire {
                subscription: sub,
                source: id,
                signal: signal.to_string(),
                argument,
            });
        }
    }

    /// One engine frame. The frame counter always advances; engine seconds
    /// advance only while unpaused, scaled by the time scale.
    pub fn tick(&mut self, dt: f64) {
        self.clock.frame += 1;
        self.clock.last_dt = dt;
        if !self.clock.paused {
            self.clock.seconds += dt * self.clock.time_scale;
        }
    }

    // Scene-building helpers used by the runner and the tests.

    pub fn set_builtin(&mut self, id: InstanceId, name: &str, value: Value) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.properties.insert(name.to_string(), value);
        }
    }

    pub fn add_script_property(&mut self, id: InstanceId, name: &str, kind: ValueKind, value: Value) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.script_props.push((name.to_string(), kind));
            node.properties.insert(name.to_string(), value);
        }
    }

    pub fn add_to_group(&mut self, id: InstanceId, group: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.groups.push(group.to_string());
        }
    }

    pub fn set_rect(&mut self, id: InstanceId, x: f32, y: f32, w: f32, h: f32) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.rect = Some(ScreenRect { x, y, w, h });
        }
    }

    pub fn set_visible(&mut self, id: InstanceId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn define_action(&mut self, name: &str) {
        self.actions.insert(name.to_string(), (false, 0.0));
    }

    pub fn is_action_pressed(&self, name: &str) -> bool {
        self.actions.get(name).map(|(pressed, _)| *pressed).unwrap_or(false)
    }

    pub fn input_log(&self) -> &[(u64, InputEvent)] {
        &self.input_log
    }

    pub fn current_scene_id(&self) -> InstanceId {
        self.root.expect("No active scene")
    }

    pub fn set_log_file<P: AsRef<Path>>(&mut self, path: P) {
        self.log_file = Some(path.as_ref().to_path_buf());
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.len() + self.tree_subs.len()
    }

    fn node(&self, id: InstanceId) -> EngineResult<&Node> {
        self.nodes.get(&id).ok_or(EngineError::NoSuchNode)
    }

    fn global_position(&self, id: InstanceId) -> Option<Value> {
        let node = self.nodes.get(&id)?;

        if let Some(value) = node.properties.get("global_position") {
            return Some(value.clone());
        }

        match node.properties.get("position")? {
            Value::Vector2(local) => {
                let mut total = *local;
                let mut cursor = node.parent;
                while let Some(parent) = cursor {
                    let parent_node = self.nodes.get(&parent)?;
                    if let Some(Value::Vector2(offset)) = parent_node.properties.get("position") {
                        total[0] += offset[0];
                        total[1] += offset[1];
                    }
                    cursor = parent_node.parent;
                }
                Some(Value::Vector2(total))
            }
            Value::Vector3(local) => {
                let mut total = *local;
                let mut cursor = node.parent;
                while let Some(parent) = cursor {
                    let parent_node = self.nodes.get(&parent)?;
                    if let Some(Value::Vector3(offset)) = parent_node.properties.get("position") {
                        total[0] += offset[0];
                        total[1] += offset[1];
                        total[2] += offset[2];
                    }
                    cursor = parent_node.parent;
                }
                Some(Value::Vector3(total))
            }
            _ => None,
        }
    }

    fn current_camera_3d(&self) -> Option<InstanceId> {
        self.nodes
            .iter()
            .filter(|(_, node)| classes::is_class(&node.class, "Camera3D"))
            .find(|(_, node)| matches!(node.properties.get("current"), Some(Value::Bool(true))))
            .map(|(&id, _)| id)
    }
}

impl Engine for Stage {
    fn current_scene(&self) -> Option<InstanceId> {
        self.root
    }

    fn scene_file_path(&self) -> Option<String> {
        self.scene_file.clone()
    }

    fn scene_name(&self) -> Option<String> {
        self.root.and_then(|root| self.nodes.get(&root)).map(|node| node.name.clone())
    }

    fn project_name(&self) -> String {
        self.project.clone()
    }

    fn is_instance_valid(&self, id: InstanceId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn is_in_tree(&self, id: InstanceId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if Some(current) == self.root {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        false
    }

    fn class_name(&self, id: InstanceId) -> EngineResult<String> {
        Ok(self.node(id)?.class.clone())
    }

    fn is_class(&self, id: InstanceId, class: &str) -> bool {
        self.nodes
            .get(&id)
            .map(|node| classes::is_class(&node.class, class))
            .unwrap_or(false)
    }

    fn node_name(&self, id: InstanceId) -> EngineResult<String> {
        Ok(self.node(id)?.name.clone())
    }

    fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    fn children(&self, id: InstanceId) -> Vec<InstanceId> {
        self.nodes.get(&id).map(|node| node.children.clone()).unwrap_or_default()
    }

    fn path_of(&self, id: InstanceId) -> Option<String> {
        if !self.nodes.contains_key(&id) {
            return None;
        }

        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.nodes.get(&current)?;
            segments.push(node.name.clone());
            cursor = node.parent;
        }
        segments.reverse();

        Some(format!("/root/{}", segments.join("/")))
    }

    fn node_at_path(&self, root: InstanceId, path: &str) -> Option<InstanceId> {
        if path == "." || path.is_empty() {
            return Some(root);
        }

        let mut cursor = root;
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            let node = self.nodes.get(&cursor)?;
            cursor = *node
                .children
                .iter()
                .find(|&&child| self.nodes.get(&child).map(|c| c.name == segment).unwrap_or(false))?;
        }
        Some(cursor)
    }

    fn groups(&self, id: InstanceId) -> Vec<String> {
        self.nodes.get(&id).map(|node| node.groups.clone()).unwrap_or_default()
    }

    fn signal_list(&self, id: InstanceId) -> Vec<SignalInfo> {
        let node = match self.nodes.get(&id) {
            Some(node) => node,
            None => return Vec::new(),
        };

        classes::signals_of(&node.class)
            .into_iter()
            .map(|(name, arg_count)| SignalInfo {
                connection_count: self
                    .subs
                    .values()
                    .filter(|(sub_node, sub_signal)| *sub_node == id && sub_signal.as_str() == name)
                    .count(),
                name: name.to_string(),
                arg_count,
            })
            .collect()
    }

    fn text_of(&self, id: InstanceId) -> Option<String> {
        let node = self.nodes.get(&id)?;
        match node.properties.get("text")? {
            Value::Str(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn is_visible(&self, id: InstanceId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(&current) {
                Some(node) if !node.visible => return false,
                Some(node) => cursor = node.parent,
                None => return false,
            }
        }
        true
    }

    fn has_script(&self, id: InstanceId) -> bool {
        self.nodes
            .get(&id)
            .map(|node| !node.script_props.is_empty())
            .unwrap_or(false)
    }

    fn spatial_kind(&self, id: InstanceId) -> SpatialKind {
        let node = match self.nodes.get(&id) {
            Some(node) => node,
            None => return SpatialKind::None,
        };

        if classes::is_class(&node.class, "Node2D") {
            SpatialKind::TwoD
        } else if classes::is_class(&node.class, "Node3D") {
            SpatialKind::ThreeD
        } else {
            SpatialKind::None
        }
    }

    fn screen_rect(&self, id: InstanceId) -> Option<ScreenRect> {
        self.nodes.get(&id)?.rect
    }

    fn screen_point(&self, id: InstanceId) -> EngineResult<ScreenPoint> {
        match self.spatial_kind(id) {
            SpatialKind::TwoD => match self.global_position(id) {
                Some(Value::Vector2([x, y])) => Ok(ScreenPoint { x, y, behind: false }),
                _ => Err(EngineError::Unsupported("Node has no 2D position".into())),
            },
            SpatialKind::ThreeD => {
                let camera = self.current_camera_3d().ok_or(EngineError::NoCamera)?;
                let camera_z = match self.global_position(camera) {
                    Some(Value::Vector3([_, _, z])) => z,
                    _ => 0.0,
                };

                match self.global_position(id) {
                    Some(Value::Vector3([x, y, z])) => {
                        let (vw, vh) = self.viewport;
                        Ok(ScreenPoint {
                            x: vw as f32 / 2.0 + x * 16.0,
                            y: vh as f32 / 2.0 - y * 16.0,
                            behind: z > camera_z,
                        })
                    }
                    _ => Err(EngineError::Unsupported("Node has no 3D position".into())),
                }
            }
            SpatialKind::None => Err(EngineError::Unsupported("Node has no spatial position".into())),
        }
    }

    fn get_property(&self, id: InstanceId, name: &str) -> EngineResult<Value> {
        let node = self.node(id)?;

        if let Some(value) = node.properties.get(name) {
            return Ok(value.clone());
        }
        if name == "global_position" {
            if let Some(value) = self.global_position(id) {
                return Ok(value);
            }
        }
        if name == "visible" {
            return Ok(Value::Bool(node.visible));
        }

        Err(EngineError::NoSuchProperty(name.to_string()))
    }

    fn set_property(&mut self, id: InstanceId, name: &str, value: Value) -> EngineResult<()> {
        if name == "visible" {
            if let Value::Bool(visible) = value {
                self.nodes.get_mut(&id).ok_or(EngineError::NoSuchNode)?.visible = visible;
                return Ok(());
            }
        }

        let node = self.nodes.get_mut(&id).ok_or(EngineError::NoSuchNode)?;
        match node.properties.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::NoSuchProperty(name.to_string())),
        }
    }

    fn property_kind(&self, id: InstanceId, name: &str) -> Option<ValueKind> {
        let node = self.nodes.get(&id)?;

        if let Some((_, kind)) = node.script_props.iter().find(|(prop, _)| prop == name) {
            return Some(*kind);
        }
        node.properties.get(name).map(Value::kind)
    }

    fn script_properties(&self, id: InstanceId) -> Vec<ScriptProperty> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.script_props
                    .iter()
                    .map(|(name, kind)| ScriptProperty {
                        name: name.clone(),
                        kind: *kind,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn call_method(&mut self, id: InstanceId, name: &str, args: Vec<Value>) -> EngineResult<Value> {
        let node = self.node(id)?;

        match name {
            "get_name" => Ok(Value::Str(node.name.clone())),
            "get_class" => Ok(Value::Str(node.class.clone())),
            "get_child_count" => Ok(Value::Int(node.children.len() as i64)),
            "is_in_group" => match args.first() {
                Some(Value::Str(group)) => Ok(Value::Bool(node.groups.iter().any(|g| g == group))),
                _ => Err(EngineError::Unsupported("is_in_group expects a group name".into())),
            },
            "has_method" => Ok(Value::Bool(matches!(
                args.first().and_then(|v| v.as_str()),
                Some("get_name") | Some("get_class") | Some("get_child_count") | Some("is_in_group")
            ))),
            _ => Err(EngineError::NoSuchMethod(name.to_string())),
        }
    }

    fn connect(&mut self, id: InstanceId, signal: &str) -> EngineResult<SubscriptionId> {
        let node = self.node(id)?;
        if !classes::signals_of(&node.class).iter().any(|(name, _)| *name == signal) {
            return Err(EngineError::NoSuchSignal(signal.to_string()));
        }

        let sub = SubscriptionId(self.next_sub);
        self.next_sub += 1;
        self.subs.insert(sub, (id, signal.to_string()));
        Ok(sub)
    }

    fn disconnect(&mut self, sub: SubscriptionId) {
        self.subs.remove(&sub);
        self.tree_subs.retain(|&tree_sub| tree_sub != sub);
    }

    fn connect_tree(&mut self) -> SubscriptionId {
        let sub = SubscriptionId(self.next_sub);
        self.next_sub += 1;
        self.tree_subs.push(sub);
        sub
    }

    fn drain_signal_fires(&mut self) -> Vec<SignalFire> {
        std::mem::take(&mut self.fires)
    }

    fn dispatch_input(&mut self, event: InputEvent) {
        match &event {
            InputEvent::Action { name, pressed, strength } => {
                if let Some(state) = self.actions.get_mut(name.as_str()) {
                    *state = (*pressed, *strength);
                }
            }
            InputEvent::MouseMotion { x, y, .. } => {
                self.mouse = (*x, *y);
            }
            _ => (),
        }

        self.input_log.push((self.clock.frame, event));
    }

    fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn mouse_position(&self) -> (f32, f32) {
        self.mouse
    }

    fn clock(&self) -> Clock {
        Clock {
            frame: self.clock.frame,
            seconds: self.clock.seconds,
            fps: if self.clock.last_dt > 0.0 { 1.0 / self.clock.last_dt } else { 0.0 },
            paused: self.clock.paused,
            time_scale: self.clock.time_scale,
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.clock.paused = paused;
    }

    fn set_time_scale(&mut self, scale: f64) {
        self.clock.time_scale = scale;
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    fn capture_viewport(&mut self) -> Option<FrameImage> {
        Some(render::render(self))
    }

    fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.clone()
    }
}

// Internal view used by the renderer.
pub(crate) struct RenderItem {
    pub rect: Option<ScreenRect>,
    pub point: Option<(f32, f32)>,
    pub class: String,
}

impl Stage {
    pub(crate) fn render_items(&self) -> Vec<RenderItem> {
        let mut items = Vec::new();

        for (&id, node) in &self.nodes {
            if !self.is_in_tree(id) || !self.is_visible(id) {
                continue;
            }

            let point = match self.spatial_kind(id) {
                SpatialKind::None => None,
                _ => self.screen_point(id).ok().map(|point| (point.x, point.y)),
            };

            if node.rect.is_some() || point.is_some() {
                items.push(RenderItem {
                    rect: node.rect,
                    point,
                    class: node.class.clone(),
                });
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_never_reused() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        let first = stage.add_node(root, "Node2D", "N");
        stage.free_node(first);
        let second = stage.add_node(root, "Node2D", "N");

        assert_ne!(first, second);
        assert!(!stage.is_instance_valid(first));
        assert!(stage.is_instance_valid(second));
    }

    #[test]
    fn test_paths() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "Level");
        let mid = stage.add_node(root, "Node2D", "Mid");
        let leaf = stage.add_node(mid, "Sprite2D", "Leaf");

        assert_eq!(stage.path_of(leaf).unwrap(), "/root/Level/Mid/Leaf");
        assert_eq!(stage.node_at_path(root, "Mid/Leaf"), Some(leaf));
        assert_eq!(stage.node_at_path(root, "."), Some(root));
        assert_eq!(stage.node_at_path(root, "Mid/Missing"), None);
    }

    #[test]
    fn test_clock_pause_and_scale() {
        let mut stage = Stage::new(None);
        stage.tick(0.5);
        assert_eq!(stage.clock().seconds, 0.5);

        stage.set_time_scale(2.0);
        stage.tick(0.5);
        assert_eq!(stage.clock().seconds, 1.5);

        stage.set_paused(true);
        stage.tick(0.5);
        assert_eq!(stage.clock().seconds, 1.5);
        assert_eq!(stage.clock().frame, 3);
    }

    #[test]
    fn test_signal_fires_reach_subscribers_only() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        let timer = stage.add_node(root, "Timer", "T");

        // No subscribers yet: the emit disappears.
        stage.emit_signal(timer, "timeout", None);
        assert!(stage.drain_signal_fires().is_empty());

        let sub = stage.connect(timer, "timeout").unwrap();
        stage.emit_signal(timer, "timeout", None);

        let fires = stage.drain_signal_fires();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].subscription, sub);
        assert_eq!(fires[0].signal, "timeout");

        stage.disconnect(sub);
        stage.emit_signal(timer, "timeout", None);
        assert!(stage.drain_signal_fires().is_empty());
    }

    #[test]
    fn test_connect_unknown_signal() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        let timer = stage.add_node(root, "Timer", "T");

        assert_eq!(
            stage.connect(timer, "jackpot").unwrap_err(),
            EngineError::NoSuchSignal("jackpot".to_string())
        );
    }

    #[test]
    fn test_global_position_accumulates() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        let mid = stage.add_node(root, "Node2D", "Mid");
        stage.set_builtin(mid, "position", Value::Vector2([10.0, 20.0]));
        let leaf = stage.add_node(mid, "Sprite2D", "Leaf");
        stage.set_builtin(leaf, "position", Value::Vector2([1.0, 2.0]));

        assert_eq!(
            stage.get_property(leaf, "global_position").unwrap(),
            Value::Vector2([11.0, 22.0])
        );
    }

    #[test]
    fn test_visibility_inherited() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        let mid = stage.add_node(root, "Node2D", "Mid");
        let leaf = stage.add_node(mid, "Sprite2D", "Leaf");

        assert!(stage.is_visible(leaf));
        stage.set_visible(mid, false);
        assert!(!stage.is_visible(leaf));
    }
}
