//! Structural validation of scene files: attachments, connections, and
//! tree-path references

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gdgraph_core::{Confidence, EdgeDir, NodeId, NodeKind, Relation, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// A required reference is missing.
    Error,
    /// A reference resolved, but ambiguously.
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub file: PathBuf,
    pub line: u32,
    pub message: String,
    pub node: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }
}

/// Validate every scene file in the snapshot.
pub fn validate(snapshot: &Snapshot) -> ValidationReport {
    let mut report = ValidationReport::default();

    let scene_files: Vec<PathBuf> = snapshot
        .nodes_of_kind(NodeKind::SceneRoot)
        .into_iter()
        .filter_map(|id| snapshot.node(id).map(|n| n.origin.file.clone()))
        .collect();

    for file in scene_files {
        validate_scene(snapshot, &file, &mut report);
    }

    report
}

fn validate_scene(snapshot: &Snapshot, file: &Path, report: &mut ValidationReport) {
    let owned = snapshot.nodes_in_file(file);

    // The set of tree paths this scene declares. "." is the root.
    let mut tree_paths: HashSet<String> = HashSet::new();
    tree_paths.insert(".".to_string());
    for id in &owned {
        if let Some(node) = snapshot.node(*id) {
            if node.kind == NodeKind::NodeRef {
                if let Some(path) = node.attrs.get("tree_path") {
                    tree_paths.insert(path.clone());
                }
            }
        }
    }

    for id in owned {
        let Some(node) = snapshot.node(id) else { continue };

        match node.kind {
            NodeKind::NodeRef => {
                // Declared parents must exist within the owning tree.
                if let Some(parent) = node.attrs.get("parent") {
                    if !tree_paths.contains(parent) {
                        report.findings.push(Finding {
                            severity: Severity::Error,
                            file: file.to_path_buf(),
                            line: node.origin.line,
                            message: format!(
                                "node {:?} declares missing parent {parent:?}",
                                node.name
                            ),
                            node: Some(id),
                        });
                    }
                }
                check_resolution(snapshot, id, Relation::AttachesTo, "attached script", file, report);
                check_resolution(snapshot, id, Relation::Instantiates, "instanced scene", file, report);
            }
            NodeKind::SignalConnection => {
                for (attr, what) in [("from_node", "connection source"), ("to_node", "connection target")] {
                    if let Some(path) = node.attrs.get(attr) {
                        if !tree_paths.contains(path) {
                            report.findings.push(Finding {
                                severity: Severity::Error,
                                file: file.to_path_buf(),
                                line: node.origin.line,
                                message: format!("{what} {path:?} is not in the tree"),
                                node: Some(id),
                            });
                        }
                    }
                }
                check_resolution(snapshot, id, Relation::ConnectsTo, "signal handler", file, report);
            }
            _ => {}
        }
    }
}

/// Check the outgoing edges of `id` with the given relation: a
/// placeholder target is a missing required reference, a Low or
/// Ambiguous resolution is a warning.
fn check_resolution(
    snapshot: &Snapshot,
    id: NodeId,
    relation: Relation,
    what: &str,
    file: &Path,
    report: &mut ValidationReport,
) {
    for edge in snapshot.neighbors(id, EdgeDir::Outgoing, Some(relation)) {
        let target_missing =
            snapshot.node(edge.target).is_none_or(|n| n.kind == NodeKind::Unresolved);
        let line = snapshot.node(id).map(|n| n.origin.line).unwrap_or(0);
        if target_missing {
            report.findings.push(Finding {
                severity: Severity::Error,
                file: file.to_path_buf(),
                line,
                message: format!("{what} does not resolve ({})", edge.context),
                node: Some(id),
            });
        } else if edge.confidence <= Confidence::Low {
            report.findings.push(Finding {
                severity: Severity::Warning,
                file: file.to_path_buf(),
                line,
                message: format!("{what} resolves ambiguously ({})", edge.context),
                node: Some(id),
            });
        }
    }
}
