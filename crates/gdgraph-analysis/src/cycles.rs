//! Simple-cycle enumeration via iterative DFS with an on-stack marker

use std::collections::HashSet;

use gdgraph_core::{Confidence, Edge, EdgeDir, EdgeId, NodeId, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleOptions {
    /// Longest cycle (in nodes) the search will follow. Keeps cost
    /// tractable on dense graphs.
    pub max_length: usize,
    pub max_cycles: usize,
}

impl Default for CycleOptions {
    fn default() -> Self {
        CycleOptions { max_length: 12, max_cycles: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// The lowest-confidence edge: the suggested break point.
    pub weakest_edge: EdgeId,
    pub weakest: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycles: Vec<Cycle>,
    /// A bound was hit inside the search.
    pub truncated: bool,
}

/// Enumerate simple directed cycles, each reported exactly once with its
/// smallest node id first. Both bounds cut the search itself, not just
/// the output.
pub fn cycles(snapshot: &Snapshot, opts: CycleOptions) -> CycleReport {
    let mut report = CycleReport { cycles: Vec::new(), truncated: false };
    let mut starts: Vec<NodeId> = snapshot.all_nodes().map(|n| n.id).collect();
    starts.sort();

    for &start in &starts {
        if report.cycles.len() >= opts.max_cycles {
            report.truncated = true;
            break;
        }
        search_from(snapshot, start, opts, &mut report);
    }

    report
}

struct Frame<'a> {
    node: NodeId,
    edges: Vec<&'a Edge>,
    next: usize,
}

/// DFS restricted to nodes >= `start`, so every cycle is discovered only
/// from its minimum node.
fn search_from(snapshot: &Snapshot, start: NodeId, opts: CycleOptions, report: &mut CycleReport) {
    let mut on_stack: HashSet<NodeId> = HashSet::new();
    let mut path_nodes: Vec<NodeId> = vec![start];
    let mut path_edges: Vec<EdgeId> = Vec::new();
    on_stack.insert(start);

    let mut stack = vec![Frame {
        node: start,
        edges: snapshot.neighbors(start, EdgeDir::Outgoing, None),
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.edges.len() {
            on_stack.remove(&frame.node);
            path_nodes.pop();
            path_edges.pop();
            stack.pop();
            continue;
        }
        let edge = frame.edges[frame.next];
        frame.next += 1;

        if edge.target == start && path_nodes.len() >= 2 {
            if report.cycles.len() >= opts.max_cycles {
                report.truncated = true;
                return;
            }
            let mut edges = path_edges.clone();
            edges.push(edge.id);
            report.cycles.push(close_cycle(snapshot, path_nodes.clone(), edges));
            continue;
        }
        if edge.target < start || on_stack.contains(&edge.target) {
            continue;
        }
        if path_nodes.len() >= opts.max_length {
            report.truncated = true;
            continue;
        }

        on_stack.insert(edge.target);
        path_nodes.push(edge.target);
        path_edges.push(edge.id);
        stack.push(Frame {
            node: edge.target,
            edges: snapshot.neighbors(edge.target, EdgeDir::Outgoing, None),
            next: 0,
        });
    }
}

fn close_cycle(snapshot: &Snapshot, nodes: Vec<NodeId>, edges: Vec<EdgeId>) -> Cycle {
    let (weakest_edge, weakest) = edges
        .iter()
        .filter_map(|id| snapshot.edge(*id).map(|e| (*id, e.confidence)))
        .min_by_key(|(id, confidence)| (*confidence, *id))
        .unwrap_or((edges[0], Confidence::High));
    Cycle { nodes, edges, weakest_edge, weakest }
}
