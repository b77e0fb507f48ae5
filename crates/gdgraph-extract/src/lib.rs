//! gdgraph Extract — dialect fact extraction and identity resolution

pub mod dialects;
pub mod fact;
pub mod normalize;


pub use dialects::{dialect_for, extract, extract_bytes};
pub use fact::{DeclFact, Extraction, Fact, ParseIssue, RefFact, RefKind, RefTarget};
pub use normalize::{normalize_decls, normalize_file, resolve_refs, DeclIndex, FileDecls};
