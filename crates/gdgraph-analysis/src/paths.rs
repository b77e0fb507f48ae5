//! Shortest-path queries with confidence-aware tie-breaking

use std::collections::HashMap;

use gdgraph_core::{Confidence, EdgeDir, EdgeId, NodeId, Snapshot};
use serde::{Deserialize, Serialize};

use crate::QueryError;

pub const DEFAULT_MAX_HOPS: usize = 10;

/// A concrete path. `weakest` is the lowest edge confidence on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundPath {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub hops: usize,
    pub weakest: Confidence,
}

/// Outcome of a path query. Unreachability is an explicit result, not an
/// empty path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathResult {
    Found(FoundPath),
    Unreachable { bound: usize },
}

#[derive(Clone)]
struct Label {
    weakest: Confidence,
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

impl Label {
    /// Among equal-length paths: highest weakest-edge confidence wins,
    /// then the lexically smaller node-id sequence, for determinism.
    fn better_than(&self, other: &Label) -> bool {
        self.weakest > other.weakest
            || (self.weakest == other.weakest && self.nodes < other.nodes)
    }
}

/// Fewest-hops path from `from` to `to`, bounded by `max_hops`.
pub fn find_path(
    snapshot: &Snapshot,
    from: NodeId,
    to: NodeId,
    max_hops: usize,
) -> Result<PathResult, QueryError> {
    if snapshot.node(from).is_none() {
        return Err(QueryError::UnknownNode(from));
    }
    if snapshot.node(to).is_none() {
        return Err(QueryError::UnknownNode(to));
    }
    if from == to {
        return Ok(PathResult::Found(FoundPath {
            nodes: vec![from],
            edges: Vec::new(),
            hops: 0,
            weakest: Confidence::High,
        }));
    }

    // Layered BFS. All edges weigh one hop, so the first layer reaching
    // the target holds every shortest path; within a layer each node
    // keeps its best label so the tie-break is applied exhaustively.
    let mut settled: HashMap<NodeId, Label> = HashMap::new();
    settled.insert(
        from,
        Label { weakest: Confidence::High, nodes: vec![from], edges: Vec::new() },
    );
    let mut frontier: Vec<NodeId> = vec![from];

    for depth in 0..max_hops {
        let mut next: HashMap<NodeId, Label> = HashMap::new();
        frontier.sort();

        for &node in &frontier {
            let label = settled[&node].clone();
            for edge in snapshot.neighbors(node, EdgeDir::Outgoing, None) {
                if settled.contains_key(&edge.target) {
                    continue;
                }
                let mut candidate = Label {
                    weakest: label.weakest.min(edge.confidence),
                    nodes: label.nodes.clone(),
                    edges: label.edges.clone(),
                };
                candidate.nodes.push(edge.target);
                candidate.edges.push(edge.id);

                match next.get(&edge.target) {
                    Some(existing) if !candidate.better_than(existing) => {}
                    _ => {
                        next.insert(edge.target, candidate);
                    }
                }
            }
        }

        if next.is_empty() {
            break;
        }
        frontier = next.keys().copied().collect();
        for (node, label) in next {
            settled.insert(node, label);
        }
        if let Some(label) = settled.get(&to) {
            return Ok(PathResult::Found(FoundPath {
                nodes: label.nodes.clone(),
                edges: label.edges.clone(),
                hops: depth + 1,
                weakest: label.weakest,
            }));
        }
    }

    Ok(PathResult::Unreachable { bound: max_hops })
}
