//! Dead-code detection: forward reachability from configured entry nodes

use std::collections::HashSet;

use gdgraph_core::{EdgeDir, NodeId, NodeKind, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What roots the reachability scan. Lifecycle hooks fire from the
/// engine, entry files are registered global singletons or designated
/// entry scenes, and scene-declared connections invoke their handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoints {
    pub lifecycle_names: Vec<String>,
    /// Path fragments: a file whose path contains one of these owns
    /// entry nodes ("autoload/", "main.tscn").
    pub entry_files: Vec<String>,
}

impl Default for EntryPoints {
    fn default() -> Self {
        EntryPoints {
            lifecycle_names: [
                "_init",
                "_ready",
                "_process",
                "_physics_process",
                "_input",
                "_unhandled_input",
                "_notification",
                "_enter_tree",
                "_exit_tree",
            ]
            .map(String::from)
            .to_vec(),
            entry_files: vec!["autoload/".to_string(), "main.tscn".to_string(), "main.gd".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadCodeReport {
    pub entry_nodes: Vec<NodeId>,
    pub reachable: usize,
    /// Nodes outside the reachable set that are independently invocable.
    pub candidates: Vec<NodeId>,
}

pub fn dead_code(snapshot: &Snapshot, entries: &EntryPoints) -> DeadCodeReport {
    let mut entry_nodes: HashSet<NodeId> = HashSet::new();

    for node in snapshot.all_nodes() {
        if node.is_synthetic() {
            continue;
        }
        if node.kind == NodeKind::Function
            && entries.lifecycle_names.iter().any(|n| n == &node.name)
        {
            entry_nodes.insert(node.id);
            continue;
        }
        let file = node.origin.file.to_string_lossy().replace('\\', "/");
        if entries.entry_files.iter().any(|fragment| file.contains(fragment.as_str())) {
            entry_nodes.insert(node.id);
            continue;
        }
        // A connection declared in a scene invokes its handler without
        // any code path leading to it.
        if node.kind == NodeKind::SignalConnection
            && node.attrs.get("declared_in_scene").is_some()
        {
            entry_nodes.insert(node.id);
        }
    }

    let mut reachable: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = entry_nodes.iter().copied().collect();
    while let Some(node) = stack.pop() {
        if !reachable.insert(node) {
            continue;
        }
        for edge in snapshot.neighbors(node, EdgeDir::Outgoing, None) {
            if !reachable.contains(&edge.target) {
                stack.push(edge.target);
            }
        }
    }

    let mut candidates: Vec<NodeId> = snapshot
        .all_nodes()
        .filter(|n| {
            !reachable.contains(&n.id)
                // Containment-only kinds are not independently invocable.
                && !n.kind.is_structural_only()
        })
        .map(|n| n.id)
        .collect();
    candidates.sort();

    let mut entry_list: Vec<NodeId> = entry_nodes.into_iter().collect();
    entry_list.sort();

    debug!(
        entries = entry_list.len(),
        reachable = reachable.len(),
        candidates = candidates.len(),
        "dead-code scan complete"
    );

    DeadCodeReport { entry_nodes: entry_list, reachable: reachable.len(), candidates }
}
