//! Core data structures for the dependency graph

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unique, stable identifier for a node.
///
/// Derived from (dialect, qualified path, kind, declaration ordinal), so
/// re-extracting identical source always produces the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn derive(dialect: Dialect, qualified_path: &str, kind: NodeKind, ordinal: u32) -> Self {
        let mut hasher = DefaultHasher::new();
        dialect.hash(&mut hasher);
        qualified_path.hash(&mut hasher);
        kind.hash(&mut hasher);
        ordinal.hash(&mut hasher);
        NodeId(hasher.finish())
    }

    /// Id of the synthetic placeholder for a reference that matched nothing.
    /// All dangling references to the same name share one placeholder.
    pub fn placeholder(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        NodeKind::Unresolved.hash(&mut hasher);
        name.hash(&mut hasher);
        NodeId(hasher.finish())
    }
}

/// Unique edge identifier, stable across re-parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn derive(source: NodeId, target: NodeId, relation: Relation, ordinal: u32) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        target.hash(&mut hasher);
        relation.hash(&mut hasher);
        ordinal.hash(&mut hasher);
        EdgeId(hasher.finish())
    }
}

/// Source dialects the extractors understand. Closed set, dispatched by
/// file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Game scripting dialect (.gd)
    GdScript,
    /// Scene/tree description format (.tscn)
    Scene,
    /// Backend handler dialect (.js / .ts)
    CloudScript,
}

impl Dialect {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gd") => Some(Dialect::GdScript),
            Some("tscn") => Some(Dialect::Scene),
            Some("js") | Some("ts") => Some(Dialect::CloudScript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::GdScript => "gdscript",
            Dialect::Scene => "scene",
            Dialect::CloudScript => "cloudscript",
        }
    }
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Function,
    Variable,
    Signal,
    SignalConnection,
    /// A scene file's root container in the tree format.
    SceneRoot,
    Class,
    /// A tree-path reference or a declared node inside a scene tree.
    NodeRef,
    Resource,
    /// An outbound call into the backend service, bridged by literal name.
    ApiCall,
    Module,
    /// Synthetic placeholder for a reference that matched no declaration.
    Unresolved,
}

impl NodeKind {
    /// Kinds that declare a name other references can resolve to.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::Function
                | NodeKind::Variable
                | NodeKind::Signal
                | NodeKind::Class
                | NodeKind::Module
                | NodeKind::SceneRoot
        )
    }

    /// Kinds that only describe structure and are never invoked on their
    /// own. Excluded from dead-code reporting.
    pub fn is_structural_only(&self) -> bool {
        matches!(
            self,
            NodeKind::NodeRef
                | NodeKind::Resource
                | NodeKind::Unresolved
                | NodeKind::SignalConnection
        )
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    Calls,
    Reads,
    Writes,
    Emits,
    ConnectsTo,
    Instantiates,
    Inherits,
    References,
    Imports,
    DataFlow,
    Contains,
    /// Scene tree node → the script file providing its behavior.
    AttachesTo,
}

/// How certain a resolved relationship is. Ordered weakest-first so that
/// `min` across a path yields the weakest link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Ambiguous,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Ambiguous => "ambiguous",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Where a node was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub file: PathBuf,
    pub line: u32,
    pub dialect: Dialect,
}

impl Origin {
    pub fn new(file: impl Into<PathBuf>, line: u32, dialect: Dialect) -> Self {
        Origin { file: file.into(), line, dialect }
    }

    /// Origin of a store-owned placeholder. Carries no file.
    pub fn synthetic(dialect: Dialect) -> Self {
        Origin { file: PathBuf::new(), line: 0, dialect }
    }
}

/// A single node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub origin: Origin,
    /// A few lines of source around the declaration/occurrence.
    pub snippet: String,
    /// Parameters, type hints, initial values, tree paths, etc.
    pub attrs: BTreeMap<String, String>,
    pub confidence: Confidence,
    /// Sibling candidates, populated only for ambiguous resolutions.
    pub candidates: Vec<NodeId>,
}

impl Node {
    /// Store-owned placeholder for a dangling reference named `name`.
    pub fn placeholder(name: &str, dialect: Dialect) -> Self {
        Node {
            id: NodeId::placeholder(name),
            kind: NodeKind::Unresolved,
            name: name.to_string(),
            origin: Origin::synthetic(dialect),
            snippet: String::new(),
            attrs: BTreeMap::new(),
            confidence: Confidence::Ambiguous,
            candidates: Vec::new(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == NodeKind::Unresolved
    }
}

/// Metadata key naming the referenced symbol on edges whose target is a
/// placeholder. Consumed by the re-resolve pass.
pub const META_UNRESOLVED: &str = "unresolved";

/// Metadata key carrying the full sibling candidate id list on
/// Low-confidence multi-candidate edges.
pub const META_CANDIDATES: &str = "candidates";

/// A directed edge in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub relation: Relation,
    /// Human-readable occurrence description ("line 14: inventory.add(..)").
    pub context: String,
    pub confidence: Confidence,
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(
        source: NodeId,
        target: NodeId,
        relation: Relation,
        context: impl Into<String>,
        confidence: Confidence,
        ordinal: u32,
    ) -> Self {
        Edge {
            id: EdgeId::derive(source, target, relation, ordinal),
            source,
            target,
            relation,
            context: context.into(),
            confidence,
            metadata: BTreeMap::new(),
        }
    }
}
