//! Extracted facts: syntactic observations prior to identity resolution

use std::collections::BTreeMap;

use gdgraph_core::NodeKind;
use serde::{Deserialize, Serialize};

/// A declaration observed in a file. `path` is the declaration's unique
/// in-file path ("" names the file's own module/root node, "Attack" a
/// top-level symbol, "Inventory::add" a class member, "Player/Sprite" a
/// scene tree node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclFact {
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub line: u32,
    pub snippet: String,
    pub attrs: BTreeMap<String, String>,
}

impl DeclFact {
    pub fn new(kind: NodeKind, name: impl Into<String>, path: impl Into<String>, line: u32) -> Self {
        DeclFact {
            kind,
            name: name.into(),
            path: path.into(),
            line,
            snippet: String::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }
}

/// What a reference points at, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefTarget {
    /// Resolve by name through the scope ladder.
    Name(String),
    /// An exact in-file declaration path. Always resolves High.
    Decl(String),
    /// A project-relative file path (another script or scene).
    File(String),
}

/// The syntactic shape of a reference, mapped to an edge relation by the
/// normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    Call,
    Read,
    Write,
    Emit,
    Connect,
    Inherit,
    Import,
    Reference,
    Instantiate,
    Contain,
    Attach,
    /// Outbound service call → backend handler, linked by literal name.
    Bridge,
}

/// A reference observed in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefFact {
    pub kind: RefKind,
    /// In-file declaration path of the edge source.
    pub source: String,
    pub target: RefTarget,
    pub line: u32,
    pub context: String,
    /// Built from runtime-computed data; resolution is Ambiguous with the
    /// enumerated `candidates` (possibly empty).
    pub dynamic: bool,
    /// Statically enumerable candidate names for a dynamic reference.
    pub candidates: Vec<String>,
    /// Whether the reference carries scope information. Object-member
    /// references (`other.reset()`) do not: the receiver's type is
    /// unknown, so in-file matches must not count as exact-scope hits.
    pub scoped: bool,
}

impl RefFact {
    pub fn new(kind: RefKind, source: impl Into<String>, target: RefTarget, line: u32) -> Self {
        RefFact {
            kind,
            source: source.into(),
            target,
            line,
            context: String::new(),
            dynamic: false,
            candidates: Vec::new(),
            scoped: true,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn dynamic_with(mut self, candidates: Vec<String>) -> Self {
        self.dynamic = true;
        self.candidates = candidates;
        self
    }

    pub fn unscoped(mut self) -> Self {
        self.scoped = false;
        self
    }
}

/// One extracted observation, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fact {
    Decl(DeclFact),
    Ref(RefFact),
}

/// A localized extraction problem. Never fatal for the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseIssue {
    pub line: u32,
    pub message: String,
}

impl ParseIssue {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        ParseIssue { line, message: message.into() }
    }
}

/// Result of extracting one file. `partial` marks content the extractor
/// could not tokenize at all; the file's prior graph state must then be
/// dropped, not left stale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub facts: Vec<Fact>,
    pub issues: Vec<ParseIssue>,
    pub partial: bool,
}

impl Extraction {
    pub fn decl(&mut self, decl: DeclFact) {
        self.facts.push(Fact::Decl(decl));
    }

    pub fn reference(&mut self, r: RefFact) {
        self.facts.push(Fact::Ref(r));
    }

    pub fn issue(&mut self, line: u32, message: impl Into<String>) {
        self.issues.push(ParseIssue::new(line, message));
    }

    pub fn decls(&self) -> impl Iterator<Item = &DeclFact> {
        self.facts.iter().filter_map(|f| match f {
            Fact::Decl(d) => Some(d),
            _ => None,
        })
    }

    pub fn refs(&self) -> impl Iterator<Item = &RefFact> {
        self.facts.iter().filter_map(|f| match f {
            Fact::Ref(r) => Some(r),
            _ => None,
        })
    }
}

/// Extract a snippet of up to two lines of context around a 1-based line.
pub fn snippet_around(lines: &[&str], line: u32, context: usize) -> String {
    if lines.is_empty() || line == 0 {
        return String::new();
    }
    let idx = (line as usize - 1).min(lines.len() - 1);
    let start = idx.saturating_sub(context);
    let end = (idx + context + 1).min(lines.len());
    lines[start..end].join("\n")
}
