//! Change detection between the current tree and the last stored snapshot.

use crate::scene::snapshot::{self, NodeRecord, Snapshot};
use hashbrown::HashMap;
use serde_json::{json, Map, Value as Json};

/// Holds the snapshot baseline the next diff is computed against. The
/// baseline advances on every full snapshot and on every diff, so a diff
/// always answers "what changed since you last looked".
pub struct DiffTracker {
    baseline: Option<Snapshot>,
}

impl DiffTracker {
    #[inline]
    pub fn new() -> DiffTracker {
        DiffTracker { baseline: None }
    }

    #[inline]
    pub fn set_baseline(&mut self, snapshot: Snapshot) {
        self.baseline = Some(snapshot);
    }

    /// Diffs `current` against the stored baseline, then replaces it. With no
    /// baseline yet, every node reports as added.
    pub fn diff_against(&mut self, current: Snapshot) -> Json {
        let report = match &self.baseline {
            Some(baseline) => diff_snapshots(baseline, &current),
            None => {
                let added: Vec<Json> = snapshot::flatten(&current).iter().map(|record| summary(record)).collect();
                json!({
                    "added": added,
                    "removed": [],
                    "changed": [],
                    "note": "No baseline stored; reporting the full tree as added",
                })
            }
        };

        self.baseline = Some(current);
        report
    }
}

fn summary(record: &NodeRecord) -> Json {
    json!({
        "ref": record.node_ref,
        "path": record.path,
        "type": record.class,
    })
}

fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Json {
    let old_nodes: HashMap<&str, &NodeRecord> = snapshot::flatten(old)
        .into_iter()
        .map(|record| (record.node_ref.as_str(), record))
        .collect();
    let new_nodes: HashMap<&str, &NodeRecord> = snapshot::flatten(new)
        .into_iter()
        .map(|record| (record.node_ref.as_str(), record))
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();

    for record in snapshot::flatten(new) {
        match old_nodes.get(record.node_ref.as_str()) {
            None => added.push(summary(record)),
            Some(before) => {
                let delta = diff_records(before, record);
                if !delta.is_empty() {
                    changed.push(json!({
                        "ref": record.node_ref,
                        "path": record.path,
                        "changes": Json::Object(delta),
                    }));
                }
            }
        }
    }

    let removed: Vec<Json> = snapshot::flatten(old)
        .into_iter()
        .filter(|record| !new_nodes.contains_key(record.node_ref.as_str()))
        .map(|record| summary(record))
        .collect();

    json!({
        "added": added,
        "removed": removed,
        "changed": changed,
        "scene_changed": old.scene != new.scene,
    })
}

fn diff_records(old: &NodeRecord, new: &NodeRecord) -> Map<String, Json> {
    let mut delta = Map::new();

    let mut field = |name: &str, before: &Json, after: &Json| {
        if before != after {
            delta.insert(name.to_string(), json!({"from": before, "to": after}));
        }
    };

    field("position", &old.position, &new.position);
    field("global_position", &old.global_position, &new.global_position);
    field("rotation", &old.rotation, &new.rotation);
    field("scale", &old.scale, &new.scale);
    field("visible", &json!(old.visible), &json!(new.visible));

    if old.text != new.text {
        delta.insert("text".into(), json!({"from": old.text, "to": new.text}));
    }
    if old.path != new.path {
        delta.insert("path".into(), json!({"from": old.path, "to": new.path}));
    }

    for (key, after) in &new.properties {
        match old.properties.get(key) {
            Some(before) if before == after => (),
            Some(before) => {
                delta.insert(format!("properties.{}", key), json!({"from": before, "to": after}));
            }
            None => {
                delta.insert(format!("properties.{}", key), json!({"from": null, "to": after}));
            }
        }
    }

    delta
}
