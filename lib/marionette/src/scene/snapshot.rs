use crate::scene::refs::RefTable;
use crate::serialize;
use serde_derive::Serialize;
use serde_json::{Map, Value as Json};
use strand::contract::{Engine, InstanceId, SpatialKind};

/// Name of the node hosting the bridge itself inside the engine tree. Never
/// part of a snapshot, never auto-subscribed, never annotated.
pub const BRIDGE_NODE_NAME: &str = "MarionetteBridge";

/// Default traversal depth bound.
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// One bounded, ref-annotated capture of the scene subtree.
#[derive(Serialize, Clone, Debug)]
pub struct Snapshot {
    pub scene: Option<String>,
    pub scene_name: Option<String>,
    pub viewport: [u32; 2],
    pub mouse: [f32; 2],
    pub frame: u64,
    pub fps: f64,
    pub time: f64,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub tree: Option<NodeRecord>,
}

/// One node in a snapshot. Spatial fields are serialized even when null so
/// clients can distinguish "non-spatial" from "omitted".
#[derive(Serialize, Clone, Debug)]
pub struct NodeRecord {
    #[serde(rename = "ref")]
    pub node_ref: String,
    pub name: String,
    #[serde(rename = "type")]
    pub class: String,
    pub path: String,
    pub visible: bool,
    pub position: Json,
    pub global_position: Json,
    pub rotation: Json,
    pub scale: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Json>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

struct Walker<'a> {
    engine: &'a dyn Engine,
    refs: &'a mut RefTable,
    max_depth: usize,
    max_nodes: usize,
    count: usize,
    truncated: bool,
}

/// Takes a full snapshot from `root` (default: the current scene root).
/// Prunes the ref table, walks depth-first pre-order, and reports truncation
/// explicitly when either bound is hit.
pub fn take_snapshot(
    engine: &dyn Engine,
    refs: &mut RefTable,
    root: Option<InstanceId>,
    max_depth: usize,
    max_nodes: usize,
) -> Result<Snapshot, String> {
    refs.prune(engine);

    let scene_root = engine.current_scene();
    let root = match root.or(scene_root) {
        Some(root) => root,
        None => return Err("No active scene".into()),
    };

    let mut walker = Walker {
        engine,
        refs,
        max_depth,
        max_nodes,
        count: 0,
        truncated: false,
    };

    let tree = walker.walk(root, 0, ".");
    let clock = engine.clock();
    let (vw, vh) = engine.viewport_size();
    let (mx, my) = engine.mouse_position();

    Ok(Snapshot {
        scene: engine.scene_file_path(),
        scene_name: engine.scene_name(),
        viewport: [vw, vh],
        mouse: [mx, my],
        frame: clock.frame,
        fps: clock.fps,
        time: clock.seconds,
        paused: clock.paused,
        truncated: if walker.truncated { Some(true) } else { None },
        truncated_at: if walker.truncated { Some(walker.count) } else { None },
        note: if walker.truncated {
            Some("Snapshot truncated; use root= to focus on a subtree".into())
        } else {
            None
        },
        tree,
    })
}

impl<'a> Walker<'a> {
    fn walk(&mut self, id: InstanceId, depth: usize, path: &str) -> Option<NodeRecord> {
        if self.truncated {
            return None;
        }

        let name = self.engine.node_name(id).ok()?;
        if skip_node(&name) {
            return None;
        }

        if self.count >= self.max_nodes {
            self.truncated = true;
            return None;
        }
        self.count += 1;

        let mut record = self.record(id, &name, path);

        if depth < self.max_depth {
            for child in self.engine.children(id) {
                let child_name = match self.engine.node_name(child) {
                    Ok(child_name) => child_name,
                    Err(_) => continue,
                };
                let child_path = if path == "." {
                    child_name.clone()
                } else {
                    format!("{}/{}", path, child_name)
                };

                if let Some(child_record) = self.walk(child, depth + 1, &child_path) {
                    record.children.push(child_record);
                }
                if self.truncated {
                    break;
                }
            }
        }

        Some(record)
    }

    fn record(&mut self, id: InstanceId, name: &str, path: &str) -> NodeRecord {
        let engine = self.engine;
        let node_ref = self.refs.assign(engine, id);
        let class = engine.class_name(id).unwrap_or_default();
        let spatial = engine.spatial_kind(id);

        let spatial_field = |property: &str| -> Json {
            match spatial {
                SpatialKind::None => Json::Null,
                _ => engine
                    .get_property(id, property)
                    .map(|value| serialize::to_json(&value))
                    .unwrap_or(Json::Null),
            }
        };

        let size = engine
            .screen_rect(id)
            .map(|rect| serde_json::json!([rect.w, rect.h]));

        let groups = engine
            .groups(id)
            .into_iter()
            .filter(|group| !group.starts_with('_'))
            .collect();

        let mut properties = Map::new();
        for script_property in engine.script_properties(id) {
            if let Ok(value) = engine.get_property(id, &script_property.name) {
                properties.insert(script_property.name, serialize::to_json(&value));
            }
        }

        NodeRecord {
            node_ref,
            name: name.to_string(),
            class,
            path: path.to_string(),
            visible: engine.is_visible(id),
            position: spatial_field("position"),
            global_position: spatial_field("global_position"),
            rotation: spatial_field("rotation"),
            scale: spatial_field("scale"),
            size,
            text: engine.text_of(id),
            groups,
            properties,
            children: Vec::new(),
        }
    }
}

/// Engine-internal nodes and the bridge's own node stay out of snapshots.
#[inline]
pub fn skip_node(name: &str) -> bool {
    name.starts_with('@') || name == BRIDGE_NODE_NAME
}

/// Flattens a snapshot tree into (ref → record) pairs, in walk order.
pub fn flatten(snapshot: &Snapshot) -> Vec<&NodeRecord> {
    let mut out = Vec::new();
    if let Some(tree) = &snapshot.tree {
        flatten_into(tree, &mut out);
    }
    out
}

fn flatten_into<'a>(record: &'a NodeRecord, out: &mut Vec<&'a NodeRecord>) {
    out.push(record);
    for child in &record.children {
        flatten_into(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage::Stage;
    use strand::value::{Value, ValueKind};

    fn demo_stage() -> (Stage, InstanceId) {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://level.tscn", "Level");
        let player = stage.add_node(root, "CharacterBody2D", "Player");
        stage.set_builtin(player, "position", Value::Vector2([100.0, 50.0]));
        stage.add_script_property(player, "health", ValueKind::Int, Value::Int(100));
        stage.add_to_group(player, "actors");
        stage.add_to_group(player, "_internal");

        let sprite = stage.add_node(player, "Sprite2D", "Sprite");
        stage.set_builtin(sprite, "position", Value::Vector2([0.0, -4.0]));

        let hud = stage.add_node(root, "Control", "Hud");
        stage.set_rect(hud, 0.0, 0.0, 320.0, 48.0);
        let label = stage.add_node(hud, "Label", "Score");
        stage.set_rect(label, 8.0, 8.0, 120.0, 24.0);
        stage.set_builtin(label, "text", Value::Str("Score: 0".into()));

        (stage, player)
    }

    #[test]
    fn test_snapshot_records_tree() {
        let (stage, player) = demo_stage();
        let mut refs = RefTable::new();

        let snapshot = take_snapshot(&stage, &mut refs, None, 12, 2000).unwrap();
        let tree = snapshot.tree.as_ref().unwrap();

        assert_eq!(snapshot.scene.as_deref(), Some("res://level.tscn"));
        assert_eq!(tree.path, ".");
        assert_eq!(tree.children.len(), 2);

        let player_record = &tree.children[0];
        assert_eq!(player_record.name, "Player");
        assert_eq!(player_record.class, "CharacterBody2D");
        assert_eq!(player_record.path, "Player");
        assert_eq!(player_record.node_ref, format!("Cha{}", player.0));
        assert_eq!(player_record.position, serde_json::json!([100.0, 50.0]));
        assert_eq!(player_record.properties["health"], serde_json::json!(100));
        assert_eq!(player_record.groups, vec!["actors".to_string()]);

        let sprite_record = &player_record.children[0];
        assert_eq!(sprite_record.path, "Player/Sprite");
    }

    #[test]
    fn test_snapshot_ui_size_and_text() {
        let (stage, _) = demo_stage();
        let mut refs = RefTable::new();

        let snapshot = take_snapshot(&stage, &mut refs, None, 12, 2000).unwrap();
        let tree = snapshot.tree.unwrap();
        let hud = &tree.children[1];
        let label = &hud.children[0];

        assert_eq!(hud.size, Some(serde_json::json!([320.0, 48.0])));
        assert_eq!(label.text.as_deref(), Some("Score: 0"));
        // Non-spatial UI node keeps explicit nulls in the spatial slots.
        assert!(hud.position.is_null());
    }

    #[test]
    fn test_refs_stable_across_snapshots() {
        let (mut stage, player) = demo_stage();
        let mut refs = RefTable::new();

        let first = take_snapshot(&stage, &mut refs, None, 12, 2000).unwrap();
        stage.set_builtin(player, "position", Value::Vector2([400.0, 100.0]));
        let second = take_snapshot(&stage, &mut refs, None, 12, 2000).unwrap();

        let ref_of = |snapshot: &Snapshot| snapshot.tree.as_ref().unwrap().children[0].node_ref.clone();
        assert_eq!(ref_of(&first), ref_of(&second));

        let moved = &second.tree.unwrap().children[0];
        assert_eq!(moved.position, serde_json::json!([400.0, 100.0]));
    }

    #[test]
    fn test_depth_bound() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://deep.tscn", "Deep");
        let mut parent = root;
        for index in 0..6 {
            parent = stage.add_node(parent, "Node2D", &format!("N{}", index));
        }

        let mut refs = RefTable::new();
        let snapshot = take_snapshot(&stage, &mut refs, None, 2, 2000).unwrap();

        let mut depth = 0;
        let mut cursor = snapshot.tree.as_ref().unwrap();
        while let Some(child) = cursor.children.first() {
            depth += 1;
            cursor = child;
        }

        assert_eq!(depth, 2);
        assert_eq!(snapshot.truncated, None);
    }

    #[test]
    fn test_node_cap_truncates_strictly() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://many.tscn", "Many");
        for index in 0..50 {
            stage.add_node(root, "Node2D", &format!("Child{}", index));
        }

        let mut refs = RefTable::new();
        let snapshot = take_snapshot(&stage, &mut refs, None, 12, 10).unwrap();

        assert_eq!(snapshot.truncated, Some(true));
        assert_eq!(snapshot.truncated_at, Some(10));
        assert_eq!(flatten(&snapshot).len(), 10);
        assert!(snapshot.note.unwrap().contains("root="));
    }

    #[test]
    fn test_internal_nodes_skipped() {
        let mut stage = Stage::new(None);
        let root = stage.set_scene("res://scene.tscn", "Scene");
        stage.add_node(root, "Node", "@Internal");
        stage.add_node(root, "Node", BRIDGE_NODE_NAME);
        stage.add_node(root, "Node2D", "Visible");

        let mut refs = RefTable::new();
        let snapshot = take_snapshot(&stage, &mut refs, None, 12, 2000).unwrap();
        let tree = snapshot.tree.unwrap();

        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "Visible");
    }
}
