pub mod diff;
pub mod refs;
pub mod snapshot;
pub mod state;

pub use self::refs::RefTable;
pub use self::snapshot::{take_snapshot, NodeRecord, Snapshot};

use strand::contract::{Engine, InstanceId};

/// Path of a node relative to the current scene root; the root itself is
/// `"."`. Falls back to the absolute path for nodes outside the scene.
pub fn relative_path(engine: &dyn Engine, id: InstanceId) -> Option<String> {
    let root = engine.current_scene()?;
    if id == root {
        return Some(".".into());
    }

    let node_path = engine.path_of(id)?;
    let root_path = engine.path_of(root)?;

    // Strip the root path segment-wise; a bare prefix match would also eat
    // sibling roots sharing the same leading characters.
    match node_path.strip_prefix(&format!("{}/", root_path)) {
        Some(rest) => Some(rest.to_string()),
        None => Some(node_path),
    }
}
