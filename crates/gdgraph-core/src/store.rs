//! Authoritative graph store: indexed state, atomic per-file diffs,
//! immutable snapshots.
//!
//! Single-writer / multi-reader: the change coordinator is the only
//! writer, commits are serialized behind a write gate, and readers take
//! an `Arc` snapshot that subsequent commits never mutate.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::diff::{CommitSummary, FileDiff};
use crate::model::{
    Confidence, Dialect, Edge, EdgeId, Node, NodeId, NodeKind, Relation, META_UNRESOLVED,
};

/// Traversal direction for adjacency queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDir {
    Outgoing,
    Incoming,
}

impl EdgeDir {
    fn petgraph(self) -> Direction {
        match self {
            EdgeDir::Outgoing => Direction::Outgoing,
            EdgeDir::Incoming => Direction::Incoming,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("edge {edge:?} references missing node {node:?}")]
    MissingEndpoint { edge: EdgeId, node: NodeId },
    #[error("diff for {file:?} carries a synthetic node; placeholders are store-owned")]
    SyntheticInDiff { file: PathBuf },
    #[error("duplicate edge id {0:?} within one commit")]
    DuplicateEdge(EdgeId),
}

/// A node's full record plus incident edges, for single-node inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: Node,
    pub incoming: Vec<Edge>,
    pub outgoing: Vec<Edge>,
}

/// What one file contributed to the graph. An edge belongs to the file
/// whose extraction produced it, which is not always its source node's
/// file (read edges run variable → reader).
#[derive(Clone, Default)]
struct FileOwnership {
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

/// One committed graph state. Cloned wholesale by the writer, shared
/// immutably with readers.
#[derive(Clone)]
pub struct GraphData {
    graph: StableDiGraph<Node, Edge>,
    node_idx: HashMap<NodeId, NodeIndex>,
    edge_idx: HashMap<EdgeId, EdgeIndex>,
    /// Never holds an entry for a file with zero nodes.
    by_file: BTreeMap<PathBuf, FileOwnership>,
    by_name: HashMap<String, BTreeSet<NodeId>>,
    by_kind: HashMap<NodeKind, BTreeSet<NodeId>>,
    sequence: u64,
}

impl std::fmt::Debug for GraphData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphData")
            .field("sequence", &self.sequence)
            .field("node_count", &self.graph.node_count())
            .field("edge_count", &self.graph.edge_count())
            .finish()
    }
}

impl GraphData {
    fn new() -> Self {
        GraphData {
            graph: StableDiGraph::new(),
            node_idx: HashMap::new(),
            edge_idx: HashMap::new(),
            by_file: BTreeMap::new(),
            by_name: HashMap::new(),
            by_kind: HashMap::new(),
            sequence: 0,
        }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.node_idx.contains_key(&id)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_idx.get(&id).and_then(|idx| self.graph.node_weight(*idx))
    }

    fn insert_node(&mut self, node: Node) {
        let id = node.id;
        let name = node.name.clone();
        let kind = node.kind;
        let idx = self.graph.add_node(node);
        self.node_idx.insert(id, idx);
        self.by_name.entry(name).or_default().insert(id);
        self.by_kind.entry(kind).or_default().insert(id);
    }

    /// Replace the weight of a persisting node. Same id implies same
    /// name/kind/dialect; only position, snippet, and attributes move.
    fn update_node(&mut self, node: Node) {
        if let Some(idx) = self.node_idx.get(&node.id) {
            if let Some(weight) = self.graph.node_weight_mut(*idx) {
                *weight = node;
            }
        }
    }

    fn remove_node_entry(&mut self, id: NodeId) {
        if let Some(idx) = self.node_idx.remove(&id) {
            if let Some(node) = self.graph.remove_node(idx) {
                if let Some(set) = self.by_name.get_mut(&node.name) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.by_name.remove(&node.name);
                    }
                }
                if let Some(set) = self.by_kind.get_mut(&node.kind) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.by_kind.remove(&node.kind);
                    }
                }
            }
        }
    }

    fn insert_edge(&mut self, edge: Edge) -> Result<(), StoreError> {
        if self.edge_idx.contains_key(&edge.id) {
            return Err(StoreError::DuplicateEdge(edge.id));
        }
        let source = *self.node_idx.get(&edge.source).ok_or(StoreError::MissingEndpoint {
            edge: edge.id,
            node: edge.source,
        })?;
        let target = *self.node_idx.get(&edge.target).ok_or(StoreError::MissingEndpoint {
            edge: edge.id,
            node: edge.target,
        })?;
        let id = edge.id;
        let idx = self.graph.add_edge(source, target, edge);
        self.edge_idx.insert(id, idx);
        Ok(())
    }

    fn remove_edge_entry(&mut self, id: EdgeId) -> Option<Edge> {
        let idx = self.edge_idx.remove(&id)?;
        self.graph.remove_edge(idx)
    }

    fn incident_edge_ids(&self, id: NodeId, dir: Direction) -> Vec<EdgeId> {
        let Some(&idx) = self.node_idx.get(&id) else { return Vec::new() };
        self.graph.edges_directed(idx, dir).map(|e| e.weight().id).collect()
    }

    /// Materialize (or find) the shared placeholder node for `name`.
    fn ensure_placeholder(&mut self, name: &str, dialect: Dialect) -> NodeId {
        let id = NodeId::placeholder(name);
        if !self.contains(id) {
            self.insert_node(Node::placeholder(name, dialect));
        }
        id
    }

    /// Remove a node whose file contribution vanished. Incident edges
    /// owned by surviving files are redirected to a placeholder named
    /// after the retired node, so the endpoint invariant holds.
    fn retire_node(&mut self, id: NodeId) -> Result<usize, StoreError> {
        let (name, dialect) = match self.node(id) {
            Some(n) => (n.name.clone(), n.origin.dialect),
            None => return Ok(0),
        };
        let mut redirected = 0;
        for eid in self.incident_edge_ids(id, Direction::Incoming) {
            if let Some(mut edge) = self.remove_edge_entry(eid) {
                let placeholder = self.ensure_placeholder(&name, dialect);
                edge.target = placeholder;
                edge.confidence = Confidence::Ambiguous;
                edge.metadata.insert(META_UNRESOLVED.to_string(), name.clone());
                self.insert_edge(edge)?;
                redirected += 1;
            }
        }
        for eid in self.incident_edge_ids(id, Direction::Outgoing) {
            if let Some(mut edge) = self.remove_edge_entry(eid) {
                let placeholder = self.ensure_placeholder(&name, dialect);
                edge.source = placeholder;
                edge.confidence = Confidence::Ambiguous;
                edge.metadata.insert(META_UNRESOLVED.to_string(), name.clone());
                self.insert_edge(edge)?;
                redirected += 1;
            }
        }
        self.remove_node_entry(id);
        Ok(redirected)
    }

    /// Reconnect every edge incident to `placeholder` onto `target`.
    fn rebind_placeholder(
        &mut self,
        placeholder: NodeId,
        target: NodeId,
    ) -> Result<usize, StoreError> {
        let mut rebound = 0;
        for eid in self.incident_edge_ids(placeholder, Direction::Incoming) {
            if let Some(mut edge) = self.remove_edge_entry(eid) {
                edge.target = target;
                edge.confidence = Confidence::Medium;
                edge.metadata.remove(META_UNRESOLVED);
                self.insert_edge(edge)?;
                rebound += 1;
            }
        }
        for eid in self.incident_edge_ids(placeholder, Direction::Outgoing) {
            if let Some(mut edge) = self.remove_edge_entry(eid) {
                edge.source = target;
                edge.confidence = Confidence::Medium;
                edge.metadata.remove(META_UNRESOLVED);
                self.insert_edge(edge)?;
                rebound += 1;
            }
        }
        Ok(rebound)
    }

    fn placeholder_ids(&self) -> Vec<NodeId> {
        self.by_kind
            .get(&NodeKind::Unresolved)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop placeholders no edge references anymore.
    fn collect_placeholders(&mut self) -> usize {
        let mut collected = 0;
        for id in self.placeholder_ids() {
            let Some(&idx) = self.node_idx.get(&id) else { continue };
            let orphaned = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .next()
                .is_none()
                && self.graph.edges_directed(idx, Direction::Outgoing).next().is_none();
            if orphaned {
                self.remove_node_entry(id);
                collected += 1;
            }
        }
        collected
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for idx in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(idx) {
                debug_assert!(self.graph.node_weight(a).is_some());
                debug_assert!(self.graph.node_weight(b).is_some());
            }
        }
        for (file, ownership) in &self.by_file {
            debug_assert!(!ownership.nodes.is_empty(), "empty ownership entry for {file:?}");
            for id in &ownership.nodes {
                debug_assert!(self.contains(*id));
            }
        }
    }
}

/// Handle-owned store. Cheap to share behind an `Arc`; queries never take
/// the writer's lock.
pub struct GraphStore {
    current: RwLock<Arc<GraphData>>,
    write_gate: Mutex<()>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            current: RwLock::new(Arc::new(GraphData::new())),
            write_gate: Mutex::new(()),
        }
    }

    /// Immutable view of the current committed state.
    pub fn snapshot(&self) -> Snapshot {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Snapshot { data: Arc::clone(&guard) }
    }

    /// Atomically replace one file's contribution.
    pub fn apply_file_diff(&self, diff: FileDiff) -> Result<CommitSummary, StoreError> {
        self.apply_batch(vec![diff])
    }

    /// Remove one file's contribution entirely.
    pub fn remove_file(&self, file: impl Into<PathBuf>) -> Result<CommitSummary, StoreError> {
        self.apply_batch(vec![FileDiff::removal(file)])
    }

    /// Apply a multi-file batch as one atomic commit. Readers observe
    /// either the state before the whole batch or after it, never a
    /// partially-applied middle.
    pub fn apply_batch(&self, diffs: Vec<FileDiff>) -> Result<CommitSummary, StoreError> {
        let _gate = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());
        let mut data =
            GraphData::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()));
        let mut summary = CommitSummary { files: diffs.len(), ..CommitSummary::default() };

        // Names of nodes retired this commit, for redirecting edges whose
        // resolution went stale within the same batch.
        let mut retired_names: HashMap<NodeId, String> = HashMap::new();

        // Phase 1a: drop every touched file's owned edges and detach the
        // ownership entries.
        let mut previous: Vec<(usize, Vec<NodeId>)> = Vec::new();
        for (i, diff) in diffs.iter().enumerate() {
            let Some(ownership) = data.by_file.remove(&diff.file) else { continue };
            for eid in &ownership.edges {
                if data.remove_edge_entry(*eid).is_some() {
                    summary.removed_edges += 1;
                }
            }
            previous.push((i, ownership.nodes));
        }

        // Phase 1b: retire nodes that do not survive their file's new
        // contribution; redirect surviving incident edges to placeholders.
        for (i, old_nodes) in previous {
            let survivors: HashSet<NodeId> = diffs[i].nodes.iter().map(|n| n.id).collect();
            for id in old_nodes {
                if survivors.contains(&id) {
                    continue;
                }
                if let Some(node) = data.node(id) {
                    retired_names.insert(id, node.name.clone());
                }
                summary.redirected_edges += data.retire_node(id)?;
                summary.removed_nodes += 1;
            }
        }

        // Phase 2: install nodes for every non-removal diff, all files
        // before any edges so cross-file references inside the batch land.
        let mut introduced_names: HashSet<String> = HashSet::new();
        for diff in &diffs {
            if diff.is_removal() {
                continue;
            }
            let mut owned: Vec<NodeId> = Vec::with_capacity(diff.nodes.len());
            for node in &diff.nodes {
                if node.is_synthetic() {
                    return Err(StoreError::SyntheticInDiff { file: diff.file.clone() });
                }
                owned.push(node.id);
                if data.contains(node.id) {
                    data.update_node(node.clone());
                    summary.updated_nodes += 1;
                } else {
                    if node.kind.is_declaration() {
                        introduced_names.insert(node.name.clone());
                    }
                    data.insert_node(node.clone());
                    summary.added_nodes += 1;
                }
            }
            owned.sort();
            owned.dedup();
            if !owned.is_empty() {
                data.by_file
                    .insert(diff.file.clone(), FileOwnership { nodes: owned, edges: Vec::new() });
            }
        }

        // Phase 3: install edges. Endpoints that vanished in this very
        // batch (stale resolution) fall back to a placeholder.
        for diff in &diffs {
            let mut owned_edges: Vec<EdgeId> = Vec::with_capacity(diff.edges.len());
            for edge in &diff.edges {
                let mut edge = edge.clone();
                for endpoint in [EdgeDir::Outgoing, EdgeDir::Incoming] {
                    let node = match endpoint {
                        EdgeDir::Outgoing => edge.source,
                        EdgeDir::Incoming => edge.target,
                    };
                    if data.contains(node) {
                        continue;
                    }
                    let name = edge
                        .metadata
                        .get(META_UNRESOLVED)
                        .filter(|n| NodeId::placeholder(n.as_str()) == node)
                        .cloned()
                        .or_else(|| retired_names.get(&node).cloned());
                    let Some(name) = name else {
                        return Err(StoreError::MissingEndpoint { edge: edge.id, node });
                    };
                    let placeholder = data.ensure_placeholder(&name, diff_dialect(&diff.file));
                    if node != placeholder {
                        warn!(edge = ?edge.id, name = %name, "edge endpoint vanished mid-batch, redirected");
                        edge.confidence = Confidence::Ambiguous;
                    }
                    match endpoint {
                        EdgeDir::Outgoing => edge.source = placeholder,
                        EdgeDir::Incoming => edge.target = placeholder,
                    }
                    edge.metadata.insert(META_UNRESOLVED.to_string(), name);
                }
                owned_edges.push(edge.id);
                data.insert_edge(edge)?;
                summary.added_edges += 1;
            }
            if let Some(ownership) = data.by_file.get_mut(&diff.file) {
                ownership.edges = owned_edges;
            }
        }

        // Phase 4: a placeholder whose name just gained a unique
        // declaration is upgraded to the real target.
        for placeholder in data.placeholder_ids() {
            let Some(name) = data.node(placeholder).map(|n| n.name.clone()) else { continue };
            if !introduced_names.contains(&name) {
                continue;
            }
            let matches: Vec<NodeId> = data
                .by_name
                .get(&name)
                .map(|set| {
                    set.iter()
                        .copied()
                        .filter(|id| {
                            data.node(*id)
                                .is_some_and(|n| n.kind.is_declaration() && !n.is_synthetic())
                        })
                        .collect()
                })
                .unwrap_or_default();
            if let [target] = matches[..] {
                data.rebind_placeholder(placeholder, target)?;
                summary.upgraded_placeholders += 1;
            }
        }

        // Phase 5: collect placeholders nothing references anymore.
        summary.collected_placeholders = data.collect_placeholders();

        data.sequence += 1;
        summary.sequence = data.sequence;

        #[cfg(debug_assertions)]
        data.check_invariants();

        debug!(
            sequence = summary.sequence,
            files = summary.files,
            added_nodes = summary.added_nodes,
            removed_nodes = summary.removed_nodes,
            added_edges = summary.added_edges,
            "commit applied"
        );

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(data);
        Ok(summary)
    }
}

fn diff_dialect(file: &Path) -> Dialect {
    Dialect::from_path(file).unwrap_or(Dialect::GdScript)
}

/// Immutable read view over one committed state. Cheap to clone; safe to
/// traverse concurrently with any number of later commits.
#[derive(Clone)]
pub struct Snapshot {
    data: Arc<GraphData>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.data.fmt(f)
    }
}

impl Snapshot {
    pub fn sequence(&self) -> u64 {
        self.data.sequence
    }

    pub fn node_count(&self) -> usize {
        self.data.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.data.graph.edge_count()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.data.node(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.data.edge_idx.get(&id).and_then(|idx| self.data.graph.edge_weight(*idx))
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.data.graph.node_weights()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.data.graph.edge_weights()
    }

    /// Files currently contributing to the graph, in path order.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.data.by_file.keys()
    }

    /// Node ids owned by `file`, sorted.
    pub fn nodes_in_file(&self, file: &Path) -> Vec<NodeId> {
        self.data.by_file.get(file).map(|o| o.nodes.clone()).unwrap_or_default()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.data
            .by_kind
            .get(&kind)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn nodes_named(&self, name: &str) -> Vec<NodeId> {
        self.data
            .by_name
            .get(name)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Incident edges of `id` in `dir`, optionally filtered by relation,
    /// ordered deterministically by edge id.
    pub fn neighbors(&self, id: NodeId, dir: EdgeDir, relation: Option<Relation>) -> Vec<&Edge> {
        let Some(&idx) = self.data.node_idx.get(&id) else { return Vec::new() };
        let mut edges: Vec<&Edge> = self
            .data
            .graph
            .edges_directed(idx, dir.petgraph())
            .map(|e| e.weight())
            .filter(|e| relation.is_none_or(|r| e.relation == r))
            .collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    /// Full single-node record: the node plus every incident edge.
    pub fn record(&self, id: NodeId) -> Option<NodeRecord> {
        let node = self.node(id)?.clone();
        let incoming = self
            .neighbors(id, EdgeDir::Incoming, None)
            .into_iter()
            .cloned()
            .collect();
        let outgoing = self
            .neighbors(id, EdgeDir::Outgoing, None)
            .into_iter()
            .cloned()
            .collect();
        Some(NodeRecord { node, incoming, outgoing })
    }
}
