//! Dialect extractors. The dialect set is closed and dispatched on file
//! extension; there is no plugin mechanism.

pub mod cloudscript;
pub mod gdscript;
pub mod scene;

use std::path::Path;

use gdgraph_core::Dialect;

use crate::fact::Extraction;

/// Extract facts from `content` according to `dialect`.
///
/// Never fails: malformed constructs become issues and extraction
/// continues. Content that cannot be tokenized at all yields an empty,
/// `partial` extraction.
pub fn extract(dialect: Dialect, path: &Path, content: &str) -> Extraction {
    // NUL bytes mean we are looking at binary data or a truncated,
    // corrupt file; line scanning would produce garbage facts.
    if content.contains('\0') {
        let mut out = Extraction { partial: true, ..Extraction::default() };
        out.issue(0, "content is not tokenizable text");
        return out;
    }
    match dialect {
        Dialect::GdScript => gdscript::extract(path, content),
        Dialect::Scene => scene::extract(path, content),
        Dialect::CloudScript => cloudscript::extract(path, content),
    }
}

/// Extract from raw bytes, reporting undecodable content as a degraded
/// (`partial`) extraction rather than an error.
pub fn extract_bytes(dialect: Dialect, path: &Path, content: &[u8]) -> Extraction {
    match std::str::from_utf8(content) {
        Ok(text) => extract(dialect, path, text),
        Err(e) => {
            let mut out = Extraction { partial: true, ..Extraction::default() };
            out.issue(0, format!("invalid UTF-8 at byte {}", e.valid_up_to()));
            out
        }
    }
}

/// The dialect handling `path`, if any.
pub fn dialect_for(path: &Path) -> Option<Dialect> {
    Dialect::from_path(path)
}

/// Normalize an engine resource path (`res://scripts/player.gd`) or a
/// plain relative path to a project-relative string.
pub fn normalize_resource_path(path: &str) -> String {
    path.strip_prefix("res://").unwrap_or(path).trim_start_matches("./").to_string()
}

/// The file's "stem" name used for module/scene-root nodes.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string()
}
