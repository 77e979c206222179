use hashbrown::HashMap;
use strand::contract::{Engine, InstanceId};

/// Stable identity mapping between engine instance ids and the short textual
/// refs the client addresses nodes by.
///
/// A ref is `<first 3 chars of class><instance id>`. Instance ids are unique
/// for the engine lifetime, so refs never collide, and a node keeps its ref
/// across snapshots for as long as it lives.
pub struct RefTable {
    by_id: HashMap<InstanceId, String>,
    by_ref: HashMap<String, InstanceId>,
}

impl RefTable {
    #[inline]
    pub fn new() -> RefTable {
        RefTable {
            by_id: HashMap::new(),
            by_ref: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Drops every entry whose node has died or left the tree. Run once at
    /// the start of each snapshot walk.
    pub fn prune(&mut self, engine: &dyn Engine) {
        let by_ref = &mut self.by_ref;

        self.by_id.retain(|&id, node_ref| {
            let keep = engine.is_instance_valid(id) && engine.is_in_tree(id);
            if !keep {
                by_ref.remove(node_ref);
            }
            keep
        });
    }

    /// Looks up or assigns the ref for a live node.
    pub fn assign(&mut self, engine: &dyn Engine, id: InstanceId) -> String {
        if let Some(node_ref) = self.by_id.get(&id) {
            return node_ref.clone();
        }

        let class = engine.class_name(id).unwrap_or_default();
        let node_ref = format!("{}{}", class.chars().take(3).collect::<String>(), id);

        self.by_id.insert(id, node_ref.clone());
        self.by_ref.insert(node_ref.clone(), id);
        node_ref
    }

    /// Resolves a ref or a node path to a live, in-tree node.
    ///
    /// Order: the ref map first (stale entries are evicted on the spot), then
    /// a path lookup from `root`, then a path lookup from the current scene
    /// root.
    pub fn resolve(&mut self, engine: &dyn Engine, key: &str, root: Option<InstanceId>) -> Option<InstanceId> {
        if key.is_empty() {
            return None;
        }

        if let Some(&id) = self.by_ref.get(key) {
            if engine.is_instance_valid(id) && engine.is_in_tree(id) {
                return Some(id);
            }
            self.by_ref.remove(key);
            self.by_id.remove(&id);
        }

        if let Some(root) = root {
            if let Some(id) = engine.node_at_path(root, key) {
                return Some(id);
            }
        }

        let scene_root = engine.current_scene()?;
        if root == Some(scene_root) {
            return None;
        }
        engine.node_at_path(scene_root, key)
    }
}
