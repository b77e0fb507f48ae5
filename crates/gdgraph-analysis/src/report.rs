//! Usage, coupling, and whole-graph statistics reports

use std::collections::BTreeMap;

use gdgraph_core::{Confidence, Dialect, EdgeDir, EdgeId, NodeId, NodeKind, Relation, Snapshot};
use serde::{Deserialize, Serialize};

use crate::QueryError;

/// All inbound usages of a node, grouped by relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub node: NodeId,
    pub by_relation: BTreeMap<Relation, Vec<EdgeId>>,
    pub total: usize,
}

pub fn usages(snapshot: &Snapshot, node: NodeId) -> Result<UsageReport, QueryError> {
    if snapshot.node(node).is_none() {
        return Err(QueryError::UnknownNode(node));
    }
    let mut by_relation: BTreeMap<Relation, Vec<EdgeId>> = BTreeMap::new();
    let mut total = 0;
    for edge in snapshot.neighbors(node, EdgeDir::Incoming, None) {
        by_relation.entry(edge.relation).or_default().push(edge.id);
        total += 1;
    }
    Ok(UsageReport { node, by_relation, total })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CouplingEntry {
    pub node: NodeId,
    pub incoming: usize,
    pub outgoing: usize,
}

impl CouplingEntry {
    pub fn degree(&self) -> usize {
        self.incoming + self.outgoing
    }
}

/// Nodes whose total degree reaches `min_degree`, most-coupled first.
pub fn coupling(snapshot: &Snapshot, min_degree: usize) -> Vec<CouplingEntry> {
    let mut entries: Vec<CouplingEntry> = snapshot
        .all_nodes()
        .map(|n| CouplingEntry {
            node: n.id,
            incoming: snapshot.neighbors(n.id, EdgeDir::Incoming, None).len(),
            outgoing: snapshot.neighbors(n.id, EdgeDir::Outgoing, None).len(),
        })
        .filter(|e| e.degree() >= min_degree)
        .collect();
    entries.sort_by(|a, b| b.degree().cmp(&a.degree()).then(a.node.cmp(&b.node)));
    entries
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub sequence: u64,
    pub nodes: usize,
    pub edges: usize,
    pub files: usize,
    pub files_by_dialect: BTreeMap<String, usize>,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_relation: BTreeMap<String, usize>,
    pub ambiguous_nodes: usize,
    pub low_confidence_edges: usize,
}

pub fn statistics(snapshot: &Snapshot) -> GraphStats {
    let mut stats = GraphStats {
        sequence: snapshot.sequence(),
        nodes: snapshot.node_count(),
        edges: snapshot.edge_count(),
        ..GraphStats::default()
    };

    for file in snapshot.files() {
        stats.files += 1;
        if let Some(dialect) = Dialect::from_path(file) {
            *stats.files_by_dialect.entry(dialect.as_str().to_string()).or_default() += 1;
        }
    }
    for node in snapshot.all_nodes() {
        *stats.nodes_by_kind.entry(format!("{:?}", node.kind)).or_default() += 1;
        if node.confidence == Confidence::Ambiguous || node.kind == NodeKind::Unresolved {
            stats.ambiguous_nodes += 1;
        }
    }
    for edge in snapshot.all_edges() {
        *stats.edges_by_relation.entry(format!("{:?}", edge.relation)).or_default() += 1;
        if edge.confidence <= Confidence::Low {
            stats.low_confidence_edges += 1;
        }
    }

    stats
}
