//! Per-file diffs and commit summaries for incremental updates

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{Edge, Node};

/// One file's full contribution to the graph. Applying a diff atomically
/// replaces whatever the file contributed before; an empty diff is a
/// removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub file: PathBuf,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl FileDiff {
    pub fn new(file: impl Into<PathBuf>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        FileDiff { file: file.into(), nodes, edges }
    }

    /// Diff that removes every node/edge the file owns.
    pub fn removal(file: impl Into<PathBuf>) -> Self {
        FileDiff { file: file.into(), nodes: Vec::new(), edges: Vec::new() }
    }

    pub fn is_removal(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// What a committed batch did to the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Monotonically increasing commit sequence number.
    pub sequence: u64,
    pub files: usize,
    pub added_nodes: usize,
    pub removed_nodes: usize,
    pub updated_nodes: usize,
    pub added_edges: usize,
    pub removed_edges: usize,
    /// Cross-file edges redirected to a placeholder because their target
    /// vanished in this commit.
    pub redirected_edges: usize,
    /// Placeholders whose name gained a unique declaration and were
    /// replaced by the real target.
    pub upgraded_placeholders: usize,
    /// Placeholders garbage-collected because no edge references them.
    pub collected_placeholders: usize,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.added_nodes == 0
            && self.removed_nodes == 0
            && self.updated_nodes == 0
            && self.added_edges == 0
            && self.removed_edges == 0
            && self.redirected_edges == 0
    }
}
