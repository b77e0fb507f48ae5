//! Fact normalization and identity resolution: facts become nodes/edges
//! with durable ids, and references resolve through the scope ladder to
//! confidence-tiered targets.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use gdgraph_core::{
    Confidence, Dialect, Edge, EdgeId, FileDiff, Node, NodeId, NodeKind, Origin, Relation,
    Snapshot, META_CANDIDATES, META_UNRESOLVED,
};
use tracing::warn;

use crate::fact::{Extraction, RefFact, RefKind, RefTarget};

/// One file's normalized declarations, with in-file lookup tables the
/// reference pass resolves against.
#[derive(Debug, Clone)]
pub struct FileDecls {
    pub file: PathBuf,
    pub dialect: Dialect,
    pub nodes: Vec<Node>,
    path_map: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

/// Normalize a file's declaration facts into nodes with stable ids.
///
/// The id is derived from (dialect, file-qualified declaration path, kind,
/// duplicate ordinal), so identical source re-extracts to identical ids.
pub fn normalize_decls(file: &Path, dialect: Dialect, extraction: &Extraction) -> FileDecls {
    let mut nodes = Vec::new();
    let mut path_map = HashMap::new();
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    let mut ordinals: HashMap<(String, NodeKind), u32> = HashMap::new();

    for decl in extraction.decls() {
        let key = (decl.path.clone(), decl.kind);
        let ordinal = *ordinals.get(&key).unwrap_or(&0);
        // Occurrence-shaped declarations (tree refs, resources, api
        // calls, connections) repeat per mention but denote one entity.
        if ordinal > 0 && (decl.kind.is_structural_only() || decl.kind == NodeKind::ApiCall) {
            continue;
        }
        ordinals.insert(key, ordinal + 1);

        let qualified = format!("{}::{}", path_key(file), decl.path);
        let id = NodeId::derive(dialect, &qualified, decl.kind, ordinal);
        let idx = nodes.len();
        nodes.push(Node {
            id,
            kind: decl.kind,
            name: decl.name.clone(),
            origin: Origin::new(file, decl.line, dialect),
            snippet: decl.snippet.clone(),
            attrs: decl.attrs.clone(),
            confidence: Confidence::High,
            candidates: Vec::new(),
        });
        path_map.entry(decl.path.clone()).or_insert(idx);
        by_name.entry(decl.name.clone()).or_default().push(idx);
    }

    FileDecls { file: file.to_path_buf(), dialect, nodes, path_map, by_name }
}

/// A declaration visible to cross-file resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclEntry {
    pub id: NodeId,
    pub kind: NodeKind,
    pub dialect: Dialect,
    pub file: PathBuf,
}

/// Project-wide declaration index for one normalization round: the
/// snapshot's surviving files plus every file in the in-flight batch.
/// Concurrent inserts let batch files register from parallel workers.
#[derive(Debug, Default)]
pub struct DeclIndex {
    by_name: DashMap<String, Vec<DeclEntry>>,
    /// Normalized file path → that file's module/scene-root node.
    file_roots: DashMap<String, NodeId>,
}

impl DeclIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every declaration the snapshot holds, except files being
    /// re-extracted in the current batch.
    pub fn add_snapshot(&self, snapshot: &Snapshot, skip: &HashSet<PathBuf>) {
        for node in snapshot.all_nodes() {
            if node.is_synthetic() || skip.contains(&node.origin.file) {
                continue;
            }
            self.index_node(node);
        }
    }

    pub fn add_file(&self, decls: &FileDecls) {
        for node in &decls.nodes {
            self.index_node(node);
        }
    }

    fn index_node(&self, node: &Node) {
        if node.kind.is_declaration() {
            self.by_name.entry(node.name.clone()).or_default().push(DeclEntry {
                id: node.id,
                kind: node.kind,
                dialect: node.origin.dialect,
                file: node.origin.file.clone(),
            });
        }
        if matches!(node.kind, NodeKind::Module | NodeKind::SceneRoot) {
            self.file_roots.insert(path_key(&node.origin.file), node.id);
        }
    }

    /// Matches for `name`, sorted by id for deterministic emission.
    fn lookup(&self, name: &str, kinds: &[NodeKind]) -> Vec<DeclEntry> {
        let mut entries: Vec<DeclEntry> = self
            .by_name
            .get(name)
            .map(|e| e.value().clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
            .collect();
        entries.sort_by_key(|e| e.id);
        entries.dedup_by_key(|e| e.id);
        entries
    }

    /// Resolve a project-relative file path to its module/scene-root
    /// node: exact match first, then a unique path-suffix match.
    fn lookup_file(&self, path: &str) -> FileMatch {
        if let Some(id) = self.file_roots.get(path) {
            return FileMatch::Exact(*id.value());
        }
        let mut suffix: Vec<NodeId> = self
            .file_roots
            .iter()
            .filter(|entry| suffix_match(entry.key(), path))
            .map(|entry| *entry.value())
            .collect();
        suffix.sort();
        suffix.dedup();
        match suffix.len() {
            0 => FileMatch::None,
            1 => FileMatch::Unique(suffix[0]),
            _ => FileMatch::Many(suffix),
        }
    }
}

enum FileMatch {
    Exact(NodeId),
    Unique(NodeId),
    Many(Vec<NodeId>),
    None,
}

/// Whole-component suffix match, so `player.gd` finds
/// `scripts/player.gd` but not `multiplayer.gd`.
fn suffix_match(key: &str, path: &str) -> bool {
    key == path || key.ends_with(&format!("/{path}")) || path.ends_with(&format!("/{key}"))
}

fn path_key(path: &Path) -> String {
    let mut parts = Vec::new();
    for component in path.components() {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

fn relation_of(kind: RefKind) -> Relation {
    match kind {
        RefKind::Call => Relation::Calls,
        RefKind::Read => Relation::Reads,
        RefKind::Write => Relation::Writes,
        RefKind::Emit => Relation::Emits,
        RefKind::Connect => Relation::ConnectsTo,
        RefKind::Inherit => Relation::Inherits,
        RefKind::Import => Relation::Imports,
        RefKind::Reference => Relation::References,
        RefKind::Instantiate => Relation::Instantiates,
        RefKind::Contain => Relation::Contains,
        RefKind::Attach => Relation::AttachesTo,
        RefKind::Bridge => Relation::DataFlow,
    }
}

/// Node kinds a reference of the given shape can legally target.
/// Empty means unconstrained.
fn expected_kinds(kind: RefKind) -> &'static [NodeKind] {
    match kind {
        RefKind::Call => &[NodeKind::Function],
        RefKind::Read | RefKind::Write => &[NodeKind::Variable],
        RefKind::Emit => &[NodeKind::Signal],
        RefKind::Connect => &[NodeKind::Function],
        RefKind::Inherit => &[NodeKind::Class],
        RefKind::Import => &[NodeKind::Module, NodeKind::Class],
        RefKind::Instantiate => &[NodeKind::SceneRoot, NodeKind::Resource],
        RefKind::Attach => &[NodeKind::Module],
        RefKind::Bridge => &[NodeKind::Function],
        RefKind::Reference | RefKind::Contain => &[],
    }
}

/// Resolve a file's reference facts into edges against the project-wide
/// index. Multi-candidate resolutions set the candidate list on the
/// originating node where the model calls for it (api-call bridging).
pub fn resolve_refs(decls: &mut FileDecls, extraction: &Extraction, index: &DeclIndex) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut ordinals: HashMap<(NodeId, NodeId, Relation), u32> = HashMap::new();

    // Read edges run variable → reader: data flows out of the variable,
    // which keeps forward reachability (writer → variable → reader)
    // meaningful. Every other relation points at its resolved target.
    let mut push = |edges: &mut Vec<Edge>,
                    ordinals: &mut HashMap<(NodeId, NodeId, Relation), u32>,
                    origin: NodeId,
                    resolved: NodeId,
                    relation: Relation,
                    context: &str,
                    confidence: Confidence|
     -> usize {
        let (source, target) = if relation == Relation::Reads {
            (resolved, origin)
        } else {
            (origin, resolved)
        };
        let key = (source, target, relation);
        let ordinal = *ordinals.get(&key).unwrap_or(&0);
        ordinals.insert(key, ordinal + 1);
        edges.push(Edge {
            id: EdgeId::derive(source, target, relation, ordinal),
            source,
            target,
            relation,
            context: context.to_string(),
            confidence,
            metadata: Default::default(),
        });
        edges.len() - 1
    };

    for fact in extraction.refs() {
        let Some(&source_idx) = decls.path_map.get(&fact.source) else {
            warn!(file = %decls.file.display(), source = %fact.source, "reference from unknown declaration");
            continue;
        };
        let source = decls.nodes[source_idx].id;
        let relation = relation_of(fact.kind);
        let kinds = expected_kinds(fact.kind);
        let context =
            if fact.context.is_empty() { format!("line {}", fact.line) } else { fact.context.clone() };

        match &fact.target {
            RefTarget::Decl(path) => {
                let Some(&target_idx) = decls.path_map.get(path) else {
                    warn!(file = %decls.file.display(), path = %path, "reference to unknown declaration");
                    continue;
                };
                let target = decls.nodes[target_idx].id;
                push(&mut edges, &mut ordinals, source, target, relation, &context, Confidence::High);
            }

            RefTarget::Name(name) if fact.dynamic => {
                // Runtime-computed reference: Ambiguous always, with the
                // statically enumerable candidates attached when present.
                let mut matched: Vec<DeclEntry> = Vec::new();
                for candidate in &fact.candidates {
                    matched.extend(index.lookup(candidate, kinds));
                }
                matched.sort_by_key(|e| e.id);
                matched.dedup_by_key(|e| e.id);
                if matched.is_empty() {
                    let idx = push(
                        &mut edges,
                        &mut ordinals,
                        source,
                        NodeId::placeholder(name),
                        relation,
                        &context,
                        Confidence::Ambiguous,
                    );
                    edges[idx].metadata.insert(META_UNRESOLVED.to_string(), name.clone());
                } else {
                    let all_ids = candidate_list(&matched);
                    for entry in matched {
                        let idx = push(
                            &mut edges,
                            &mut ordinals,
                            source,
                            entry.id,
                            relation,
                            &context,
                            Confidence::Ambiguous,
                        );
                        edges[idx].metadata.insert(META_CANDIDATES.to_string(), all_ids.clone());
                    }
                }
            }

            RefTarget::Name(name) if fact.kind == RefKind::Bridge => {
                // Cross-dialect literal-name bridge: heuristic by design,
                // so even a unique match stays Medium, and ties surface
                // every handler rather than picking a winner.
                let matched: Vec<DeclEntry> = index
                    .lookup(name, kinds)
                    .into_iter()
                    .filter(|e| e.dialect == Dialect::CloudScript)
                    .collect();
                match matched.len() {
                    0 => {
                        let idx = push(
                            &mut edges,
                            &mut ordinals,
                            source,
                            NodeId::placeholder(name),
                            relation,
                            &context,
                            Confidence::Ambiguous,
                        );
                        edges[idx].metadata.insert(META_UNRESOLVED.to_string(), name.clone());
                    }
                    1 => {
                        push(&mut edges, &mut ordinals, source, matched[0].id, relation, &context, Confidence::Medium);
                    }
                    _ => {
                        let all_ids = candidate_list(&matched);
                        for entry in &matched {
                            let idx = push(
                                &mut edges,
                                &mut ordinals,
                                source,
                                entry.id,
                                relation,
                                &context,
                                Confidence::Medium,
                            );
                            edges[idx].metadata.insert(META_CANDIDATES.to_string(), all_ids.clone());
                        }
                        let node = &mut decls.nodes[source_idx];
                        node.confidence = Confidence::Medium;
                        node.candidates = matched.iter().map(|e| e.id).collect();
                    }
                }
            }

            RefTarget::Name(name) => {
                // The scope ladder: exact in-scope, unique project-wide,
                // multi-candidate, unresolved. A scoped reference that
                // resolves to the project's only declaration of the name
                // is still an exact match; Medium is reserved for
                // references with no scope signal at all.
                if fact.scoped {
                    let in_file: Vec<usize> = decls
                        .by_name
                        .get(name)
                        .map(|v| {
                            v.iter()
                                .copied()
                                .filter(|&i| {
                                    kinds.is_empty() || kinds.contains(&decls.nodes[i].kind)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    if let [only] = in_file[..] {
                        let target = decls.nodes[only].id;
                        push(&mut edges, &mut ordinals, source, target, relation, &context, Confidence::High);
                        continue;
                    }
                }
                let matched = index.lookup(name, kinds);
                match matched.len() {
                    0 => {
                        let idx = push(
                            &mut edges,
                            &mut ordinals,
                            source,
                            NodeId::placeholder(name),
                            relation,
                            &context,
                            Confidence::Ambiguous,
                        );
                        edges[idx].metadata.insert(META_UNRESOLVED.to_string(), name.clone());
                    }
                    1 => {
                        let confidence =
                            if fact.scoped { Confidence::High } else { Confidence::Medium };
                        push(&mut edges, &mut ordinals, source, matched[0].id, relation, &context, confidence);
                    }
                    _ => {
                        let all_ids = candidate_list(&matched);
                        for entry in &matched {
                            let idx = push(
                                &mut edges,
                                &mut ordinals,
                                source,
                                entry.id,
                                relation,
                                &context,
                                Confidence::Low,
                            );
                            edges[idx].metadata.insert(META_CANDIDATES.to_string(), all_ids.clone());
                        }
                    }
                }
            }

            RefTarget::File(path) => match index.lookup_file(path) {
                FileMatch::Exact(target) => {
                    push(&mut edges, &mut ordinals, source, target, relation, &context, Confidence::High);
                }
                FileMatch::Unique(target) => {
                    push(&mut edges, &mut ordinals, source, target, relation, &context, Confidence::Medium);
                }
                FileMatch::Many(ids) => {
                    let all_ids =
                        ids.iter().map(|id| id.0.to_string()).collect::<Vec<_>>().join(",");
                    for target in ids {
                        let idx = push(
                            &mut edges,
                            &mut ordinals,
                            source,
                            target,
                            relation,
                            &context,
                            Confidence::Low,
                        );
                        edges[idx].metadata.insert(META_CANDIDATES.to_string(), all_ids.clone());
                    }
                }
                FileMatch::None => {
                    let idx = push(
                        &mut edges,
                        &mut ordinals,
                        source,
                        NodeId::placeholder(path),
                        relation,
                        &context,
                        Confidence::Ambiguous,
                    );
                    edges[idx].metadata.insert(META_UNRESOLVED.to_string(), path.clone());
                }
            },
        }
    }

    edges
}

fn candidate_list(entries: &[DeclEntry]) -> String {
    entries.iter().map(|e| e.id.0.to_string()).collect::<Vec<_>>().join(",")
}

/// Single-file convenience: extract → normalize → resolve against the
/// given snapshot, producing the file's diff.
pub fn normalize_file(
    file: &Path,
    dialect: Dialect,
    extraction: &Extraction,
    snapshot: &Snapshot,
) -> FileDiff {
    let mut decls = normalize_decls(file, dialect, extraction);
    let index = DeclIndex::new();
    let skip: HashSet<PathBuf> = [file.to_path_buf()].into();
    index.add_snapshot(snapshot, &skip);
    index.add_file(&decls);
    let edges = resolve_refs(&mut decls, extraction, &index);
    FileDiff::new(file, decls.nodes, edges)
}
