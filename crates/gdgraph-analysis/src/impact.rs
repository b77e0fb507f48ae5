//! Impact analysis: bounded reachability with depth and weakest-link
//! confidence annotations

use std::collections::HashMap;

use gdgraph_core::{Confidence, EdgeDir, NodeId, Snapshot};
use serde::{Deserialize, Serialize};

use crate::QueryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactOptions {
    pub depth: usize,
    pub max_results: usize,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        ImpactOptions { depth: 5, max_results: 2000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub node: NodeId,
    /// BFS layer the node was discovered in.
    pub depth: usize,
    /// Minimum edge confidence along the discovery path.
    pub weakest: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub origin: NodeId,
    pub direction: EdgeDir,
    pub entries: Vec<ImpactEntry>,
    /// The result ceiling was hit inside the traversal.
    pub truncated: bool,
}

/// Reachable set from `origin` within `opts.depth` hops. Forward impact
/// follows outgoing edges; backward impact incoming ones.
pub fn impact(
    snapshot: &Snapshot,
    origin: NodeId,
    direction: EdgeDir,
    opts: ImpactOptions,
) -> Result<ImpactReport, QueryError> {
    if snapshot.node(origin).is_none() {
        return Err(QueryError::UnknownNode(origin));
    }

    let mut report =
        ImpactReport { origin, direction, entries: Vec::new(), truncated: false };
    let mut best: HashMap<NodeId, Confidence> = HashMap::new();
    best.insert(origin, Confidence::High);
    let mut frontier: Vec<NodeId> = vec![origin];

    'walk: for depth in 1..=opts.depth {
        let mut next: HashMap<NodeId, Confidence> = HashMap::new();
        frontier.sort();

        for &node in &frontier {
            let weakest = best[&node];
            for edge in snapshot.neighbors(node, direction, None) {
                let neighbor = match direction {
                    EdgeDir::Outgoing => edge.target,
                    EdgeDir::Incoming => edge.source,
                };
                if best.contains_key(&neighbor) {
                    continue;
                }
                let candidate = weakest.min(edge.confidence);
                next.entry(neighbor)
                    .and_modify(|c| *c = (*c).max(candidate))
                    .or_insert(candidate);
            }
        }

        if next.is_empty() {
            break;
        }
        let mut discovered: Vec<(NodeId, Confidence)> = next.into_iter().collect();
        discovered.sort_by_key(|(id, _)| *id);
        frontier = Vec::with_capacity(discovered.len());
        for (node, weakest) in discovered {
            // Ceiling enforced inside the walk, not by trimming output.
            if report.entries.len() >= opts.max_results {
                report.truncated = true;
                break 'walk;
            }
            best.insert(node, weakest);
            report.entries.push(ImpactEntry { node, depth, weakest });
            frontier.push(node);
        }
    }

    Ok(report)
}
