//! Event accumulation between observations.
//!
//! The accumulator auto-attaches to a fixed set of gameplay signals across
//! the scene, buffers everything that fires with strictly monotonic ids,
//! polls property watches, and detects scene changes. It owns its engine
//! subscriptions and disconnects them on scene change and on teardown, so no
//! callback can outlive its target.

use crate::scene::relative_path;
use crate::scene::snapshot::skip_node;
use crate::serialize;
use hashbrown::HashMap;
use serde_derive::Serialize;
use serde_json::{json, Map, Value as Json};
use std::collections::VecDeque;
use strand::contract::{Engine, InstanceId, SignalFire, SubscriptionId};
use strand::logging;

/// Signals subscribed automatically on any node whose class exposes them.
pub const AUTO_SIGNALS: &[&str] = &[
    "body_entered",
    "body_exited",
    "area_entered",
    "area_exited",
    "animation_finished",
    "screen_entered",
    "screen_exited",
    "timeout",
    "pressed",
    "finished",
    "sleeping_state_changed",
    "target_reached",
    "navigation_finished",
];

#[derive(Serialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Signal,
    NodeAdded,
    NodeRemoved,
    PropertyChanged,
    SceneChanged,
}

/// One buffered event. `id` is strictly monotonic for the bridge lifetime.
#[derive(Serialize, Clone, Debug)]
pub struct Event {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub time: f64,
    pub frame: u64,
    pub source: String,
    pub detail: Map<String, Json>,
}

/// A property watch. Unique on (node_path, property); `last_value` holds the
/// serialized form so equality is stable across JSON round-trips.
#[derive(Clone, Debug)]
pub struct Watch {
    pub node_path: String,
    pub property: String,
    pub label: String,
    pub last_value: Json,
}

struct SubMeta {
    node: InstanceId,
    signal: String,
}

pub struct EventAccumulator {
    enabled: bool,
    next_id: u64,
    cap: usize,
    buffer: VecDeque<Event>,
    subs: HashMap<SubscriptionId, SubMeta>,
    tree_sub: Option<SubscriptionId>,
    /// Nodes whose subscriptions are installed one frame after their
    /// `node_added` so they are fully inside the tree first.
    pending_attach: Vec<InstanceId>,
    /// Last known relative path per tracked node, kept so `node_removed` can
    /// still report a path after the node is gone.
    known_paths: HashMap<InstanceId, String>,
    baseline_scene: Option<String>,
    watches: Vec<Watch>,
    history: VecDeque<Json>,
    log: logging::Logger,
}

const HISTORY_CAP: usize = 50;

impl EventAccumulator {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(cap: usize, log: L) -> EventAccumulator {
        EventAccumulator {
            enabled: false,
            next_id: 1,
            cap,
            buffer: VecDeque::new(),
            subs: HashMap::new(),
            tree_sub: None,
            pending_attach: Vec::new(),
            known_paths: HashMap::new(),
            baseline_scene: None,
            watches: Vec::new(),
            history: VecDeque::new(),
            log: logging::child_or_discard(log),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Scans the current scene, installs the auto-signal set, and records the
    /// scene baseline.
    pub fn start(&mut self, engine: &mut dyn Engine) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.baseline_scene = engine.scene_file_path();
        self.tree_sub = Some(engine.connect_tree());
        self.attach_tree(engine);

        logging::debug!(self.log, "event accumulator started";
                        "context" => "start",
                        "subscriptions" => self.subs.len(),
                        "scene" => ?self.baseline_scene);
    }

    /// Disconnects every subscription, including the lifecycle one. Must be
    /// called before the accumulator is dropped.
    pub fn stop(&mut self, engine: &mut dyn Engine) {
        for (&sub, _) in self.subs.iter() {
            engine.disconnect(sub);
        }
        self.subs.clear();

        if let Some(tree_sub) = self.tree_sub.take() {
            engine.disconnect(tree_sub);
        }

        self.pending_attach.clear();
        self.known_paths.clear();
        self.enabled = false;

        logging::debug!(self.log, "event accumulator stopped"; "context" => "stop");
    }

    fn attach_tree(&mut self, engine: &mut dyn Engine) {
        if let Some(root) = engine.current_scene() {
            self.attach_recursive(engine, root);
        }
    }

    fn attach_recursive(&mut self, engine: &mut dyn Engine, id: InstanceId) {
        self.attach_node(engine, id);
        for child in engine.children(id) {
            self.attach_recursive(engine, child);
        }
    }

    /// Installs one subscription per (node, auto-signal) pair the node's
    /// class exposes. Internal nodes and the bridge's own node are skipped.
    fn attach_node(&mut self, engine: &mut dyn Engine, id: InstanceId) {
        let name = match engine.node_name(id) {
            Ok(name) => name,
            Err(_) => return,
        };
        if skip_node(&name) {
            return;
        }

        if let Some(path) = relative_path(engine, id) {
            self.known_paths.insert(id, path);
        }

        let exposed: Vec<String> = engine.signal_list(id).into_iter().map(|signal| signal.name).collect();

        for &signal in AUTO_SIGNALS {
            if !exposed.iter().any(|name| name.as_str() == signal) {
                continue;
            }
            // A node can reach here twice (scan plus deferred attach); one
            // subscription per (node, signal) pair.
            if self.subs.values().any(|meta| meta.node == id && meta.signal == signal) {
                continue;
            }
            match engine.connect(id, signal) {
                Ok(sub) => {
                    self.subs.insert(
                        sub,
                        SubMeta {
                            node: id,
                            signal: signal.to_string(),
                        },
                    );
                }
                Err(err) => {
                    logging::warn!(self.log, "auto-subscribe failed";
                                   "context" => "attach_node",
                                   "node" => %id,
                                   "signal" => signal,
                                   "error" => %err);
                }
            }
        }
    }

    /// Routes one drained signal fire. Returns true when the fire belonged to
    /// this accumulator.
    pub fn ingest_fire(&mut self, engine: &mut dyn Engine, fire: &SignalFire) -> bool {
        if Some(fire.subscription) == self.tree_sub {
            self.ingest_tree_fire(engine, fire);
            return true;
        }

        let meta = match self.subs.get(&fire.subscription) {
            Some(meta) => meta,
            None => return false,
        };

        let source = self
            .known_paths
            .get(&meta.node)
            .cloned()
            .or_else(|| relative_path(engine, meta.node))
            .unwrap_or_else(|| meta.node.to_string());

        let mut detail = Map::new();
        detail.insert("signal".into(), Json::String(meta.signal.clone()));
        if let Some(argument) = fire.argument {
            if let Some(path) = relative_path(engine, argument) {
                detail.insert("arg".into(), Json::String(path));
            }
        }

        self.push_event(engine, EventKind::Signal, source, detail);
        true
    }

    fn ingest_tree_fire(&mut self, engine: &mut dyn Engine, fire: &SignalFire) {
        let node = match fire.argument {
            Some(node) => node,
            None => return,
        };

        match fire.signal.as_str() {
            "node_added" => {
                let name = engine.node_name(node).unwrap_or_default();
                if skip_node(&name) {
                    return;
                }

                let source = relative_path(engine, node).unwrap_or_else(|| name.clone());
                let mut detail = Map::new();
                detail.insert("class".into(), Json::String(engine.class_name(node).unwrap_or_default()));

                self.push_event(engine, EventKind::NodeAdded, source, detail);
                // Subscribe on the next poll so the node is fully installed.
                self.pending_attach.push(node);
            }
            "node_removed" => {
                let dropped: Vec<SubscriptionId> = self
                    .subs
                    .iter()
                    .filter(|(_, meta)| meta.node == node)
                    .map(|(&sub, _)| sub)
                    .collect();
                for sub in dropped {
                    engine.disconnect(sub);
                    self.subs.remove(&sub);
                }

                let source = match self.known_paths.remove(&node) {
                    Some(path) => path,
                    None => match engine.node_name(node) {
                        Ok(name) if skip_node(&name) => return,
                        Ok(name) => name,
                        Err(_) => node.to_string(),
                    },
                };

                self.push_event(engine, EventKind::NodeRemoved, source, Map::new());
            }
            _ => (),
        }
    }

    /// Per-frame upkeep: deferred attaches, scene-change detection, watch
    /// polling.
    pub fn poll(&mut self, engine: &mut dyn Engine) {
        if !self.enabled {
            return;
        }

        let pending: Vec<InstanceId> = self.pending_attach.drain(..).collect();
        for node in pending {
            if engine.is_instance_valid(node) && engine.is_in_tree(node) {
                self.attach_node(engine, node);
            }
        }

        self.check_scene_change(engine);
        self.poll_watches(engine);
    }

    fn check_scene_change(&mut self, engine: &mut dyn Engine) {
        let current = engine.scene_file_path();
        if current == self.baseline_scene {
            return;
        }

        let clock = engine.clock();
        let mut detail = Map::new();
        detail.insert("from".into(), json_opt(&self.baseline_scene));
        detail.insert("to".into(), json_opt(&current));
        self.push_event(engine, EventKind::SceneChanged, ".".into(), detail);

        self.history.push_back(json!({
            "time": clock.seconds,
            "frame": clock.frame,
            "unix": strand::time::timestamp_secs(),
            "scene": current,
        }));
        if self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }

        logging::info!(self.log, "scene changed, resubscribing";
                       "context" => "check_scene_change",
                       "from" => ?self.baseline_scene,
                       "to" => ?current);

        // Rebuild the subscription set against the new scene.
        for (&sub, _) in self.subs.iter() {
            engine.disconnect(sub);
        }
        self.subs.clear();
        self.known_paths.clear();
        self.pending_attach.clear();
        self.attach_tree(engine);

        self.baseline_scene = current;
    }

    fn poll_watches(&mut self, engine: &mut dyn Engine) {
        let root = match engine.current_scene() {
            Some(root) => root,
            None => return,
        };

        let mut changed = Vec::new();

        for watch in self.watches.iter_mut() {
            let node = match engine.node_at_path(root, &watch.node_path) {
                Some(node) => node,
                None => continue,
            };
            let value = match engine.get_property(node, &watch.property) {
                Ok(value) => serialize::to_json(&value),
                Err(_) => continue,
            };

            if value != watch.last_value {
                let mut detail = Map::new();
                detail.insert("label".into(), Json::String(watch.label.clone()));
                detail.insert("property".into(), Json::String(watch.property.clone()));
                detail.insert("old_value".into(), watch.last_value.clone());
                detail.insert("new_value".into(), value.clone());
                changed.push((watch.node_path.clone(), detail));

                watch.last_value = value;
            }
        }

        for (source, detail) in changed {
            self.push_event(engine, EventKind::PropertyChanged, source, detail);
        }
    }

    fn push_event(&mut self, engine: &dyn Engine, kind: EventKind, source: String, detail: Map<String, Json>) {
        let clock = engine.clock();
        let event = Event {
            id: self.next_id,
            kind,
            time: clock.seconds,
            frame: clock.frame,
            source,
            detail,
        };
        self.next_id += 1;

        self.buffer.push_back(event);
        if self.buffer.len() > self.cap {
            self.buffer.pop_front();
        }
    }
}

impl EventAccumulator {
    /// Registers (or re-registers) a watch; membership is unique on
    /// (node_path, property).
    pub fn add_watch(&mut self, engine: &dyn Engine, node_path: &str, property: &str, label: &str) -> Result<(), String> {
        let root = engine.current_scene().ok_or("No active scene")?;
        let node = engine
            .node_at_path(root, node_path)
            .ok_or_else(|| format!("Node not found: {}", node_path))?;
        let value = engine
            .get_property(node, property)
            .map_err(|err| err.to_string())?;

        let watch = Watch {
            node_path: node_path.to_string(),
            property: property.to_string(),
            label: if label.is_empty() { property.to_string() } else { label.to_string() },
            last_value: serialize::to_json(&value),
        };

        match self
            .watches
            .iter_mut()
            .find(|existing| existing.node_path == watch.node_path && existing.property == watch.property)
        {
            Some(existing) => *existing = watch,
            None => self.watches.push(watch),
        }

        Ok(())
    }

    pub fn remove_watch(&mut self, node_path: &str, property: &str) -> bool {
        let before = self.watches.len();
        self.watches
            .retain(|watch| !(watch.node_path == node_path && watch.property == property));
        self.watches.len() != before
    }

    pub fn get_watches(&self) -> Json {
        Json::Array(
            self.watches
                .iter()
                .map(|watch| {
                    json!({
                        "node_path": watch.node_path,
                        "property": watch.property,
                        "label": watch.label,
                        "last_value": watch.last_value,
                    })
                })
                .collect(),
        )
    }

    /// Returns and clears the buffer.
    pub fn drain(&mut self) -> Vec<Event> {
        self.buffer.drain(..).collect()
    }

    pub fn peek(&self) -> Vec<Event> {
        self.buffer.iter().cloned().collect()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn scene_history(&self) -> Json {
        Json::Array(self.history.iter().cloned().collect())
    }
}

fn json_opt(value: &Option<String>) -> Json {
    match value {
        Some(value) => Json::String(value.clone()),
        None => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage::Stage;
    use strand::value::{Value, ValueKind};

    // Same per-tick ordering as the bridge: upkeep first, then ingest the
    // fires drained this frame. Deferred attaches therefore land one full
    // frame after their node_added.
    fn pump(stage: &mut Stage, acc: &mut EventAccumulator) {
        stage.tick(1.0 / 60.0);
        acc.poll(stage);
        for fire in stage.drain_signal_fires() {
            acc.ingest_fire(stage, &fire);
        }
    }

    #[test]
    fn test_auto_signal_buffering() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let timer = stage.add_node(root, "Timer", "Spawner");
        let button = stage.add_node(root, "Button", "Go");

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);

        stage.emit_signal(timer, "timeout", None);
        stage.emit_signal(button, "pressed", None);
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Signal);
        assert_eq!(events[0].source, "Spawner");
        assert_eq!(events[0].detail["signal"], json!("timeout"));
        assert_eq!(events[1].source, "Go");
        assert!(events[0].id < events[1].id);
        assert_eq!(acc.count(), 0);
    }

    #[test]
    fn test_signal_argument_records_path() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let area = stage.add_node(root, "Area2D", "Zone");
        let player = stage.add_node(root, "CharacterBody2D", "Player");

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);

        stage.emit_signal(area, "body_entered", Some(player));
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detail["arg"], json!("Player"));
    }

    #[test]
    fn test_watch_emits_property_changed() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let player = stage.add_node(root, "CharacterBody2D", "Player");
        stage.add_script_property(player, "health", ValueKind::Int, Value::Int(100));

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);
        acc.add_watch(&stage, "Player", "health", "health").unwrap();

        pump(&mut stage, &mut acc);
        assert_eq!(acc.count(), 0);

        stage.set_builtin(player, "health", Value::Int(90));
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::PropertyChanged);
        assert_eq!(events[0].detail["label"], json!("health"));
        assert_eq!(events[0].detail["old_value"], json!(100));
        assert_eq!(events[0].detail["new_value"], json!(90));

        // No further change, no further event.
        pump(&mut stage, &mut acc);
        assert_eq!(acc.count(), 0);
    }

    #[test]
    fn test_watch_unique_on_path_property() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let player = stage.add_node(root, "CharacterBody2D", "Player");
        stage.add_script_property(player, "health", ValueKind::Int, Value::Int(100));

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);
        acc.add_watch(&stage, "Player", "health", "a").unwrap();
        acc.add_watch(&stage, "Player", "health", "b").unwrap();

        assert_eq!(acc.get_watches().as_array().unwrap().len(), 1);
        assert!(acc.remove_watch("Player", "health"));
        assert!(!acc.remove_watch("Player", "health"));
    }

    #[test]
    fn test_node_lifecycle_events() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);

        let timer = stage.add_node(root, "Timer", "Late");
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NodeAdded);
        assert_eq!(events[0].source, "Late");

        // The attach is deferred one frame; after the next pump the new
        // node's signals are live.
        pump(&mut stage, &mut acc);
        stage.emit_signal(timer, "timeout", None);
        pump(&mut stage, &mut acc);
        let events = acc.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Signal);

        stage.free_node(timer);
        pump(&mut stage, &mut acc);
        let events = acc.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NodeRemoved);
        assert_eq!(events[0].source, "Late");
    }

    #[test]
    fn test_scene_change_resubscribes() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://a.tscn", "A");
        stage.add_node(root, "Timer", "OldTimer");

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);
        acc.drain();

        let new_root = stage.set_scene("res://b.tscn", "B");
        let new_timer = stage.add_node(new_root, "Timer", "NewTimer");
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        let first = &events[0];
        assert_eq!(first.kind, EventKind::SceneChanged);
        assert_eq!(first.detail["from"], json!("res://a.tscn"));
        assert_eq!(first.detail["to"], json!("res://b.tscn"));

        assert_eq!(acc.scene_history().as_array().unwrap().len(), 1);

        // Subscriptions now live on the new scene's nodes.
        stage.emit_signal(new_timer, "timeout", None);
        pump(&mut stage, &mut acc);
        let events = acc.drain();
        assert!(events.iter().any(|event| event.kind == EventKind::Signal && event.source == "NewTimer"));
    }

    #[test]
    fn test_buffer_cap_evicts_oldest() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let timer = stage.add_node(root, "Timer", "T1");

        let mut acc = EventAccumulator::new(5, None);
        acc.start(&mut stage);

        for _ in 0..8 {
            stage.emit_signal(timer, "timeout", None);
        }
        pump(&mut stage, &mut acc);

        let events = acc.drain();
        assert_eq!(events.len(), 5);
        // Oldest evicted from the head; ids stay monotonic.
        assert_eq!(events[0].id, 4);
        assert_eq!(events[4].id, 8);
    }

    #[test]
    fn test_stop_disconnects() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://t.tscn", "T");
        let timer = stage.add_node(root, "Timer", "T1");

        let mut acc = EventAccumulator::new(200, None);
        acc.start(&mut stage);
        assert!(stage.subscription_count() > 0);

        acc.stop(&mut stage);
        assert_eq!(stage.subscription_count(), 0);

        stage.emit_signal(timer, "timeout", None);
        pump(&mut stage, &mut acc);
        assert_eq!(acc.count(), 0);
    }
}
