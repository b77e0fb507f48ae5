//! CloudScript (.js/.ts) extractor for backend handler files: handler
//! registrations, functions, module-level state, and server API usage.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use gdgraph_core::NodeKind;
use regex::Regex;

use crate::fact::{snippet_around, DeclFact, Extraction, RefFact, RefKind, RefTarget};

use super::{file_stem, normalize_resource_path};

static HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^handlers\.(\w+)\s*=\s*(?:async\s+)?function\s*\(([^)]*)\)").unwrap()
});
static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?function\s+(\w+)\s*\(([^)]*)\)").unwrap()
});
static MODULE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:var|let|const)\s+(\w+)\s*=\s*(.+?);?\s*$").unwrap()
});
static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});
static SERVER_API: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(server\.\w+)\s*\(").unwrap());
static HTTP_API: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(http\.request)\s*\(").unwrap());
static BARE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|[^\w.$"'])(\w+)\s*\("#).unwrap());

static BUILTINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "if", "for", "while", "switch", "return", "function", "catch", "require", "log",
        "parseInt", "parseFloat", "String", "Number", "Boolean", "Array", "Object", "JSON",
        "Math", "Date", "Error", "isNaN", "typeof",
    ]
    .into_iter()
    .collect()
});

pub fn extract(path: &Path, content: &str) -> Extraction {
    let mut out = Extraction::default();
    let lines: Vec<&str> = content.lines().collect();
    let module = file_stem(path);

    out.decl(
        DeclFact::new(NodeKind::Module, module.clone(), "", 1)
            .with_snippet(snippet_around(&lines, 1, 2)),
    );

    // Pass 1: declarations.
    let mut functions: HashMap<String, String> = HashMap::new();
    let mut brace_depth: i32 = 0;

    for (idx, line) in lines.iter().enumerate() {
        let line_num = (idx + 1) as u32;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with("//") {
            continue;
        }

        if brace_depth == 0 {
            if let Some(caps) = HANDLER.captures(stripped) {
                let name = caps[1].to_string();
                out.decl(
                    DeclFact::new(NodeKind::Function, name.clone(), name.clone(), line_num)
                        .with_snippet(snippet_around(&lines, line_num, 3))
                        .with_attr("params", caps[2].trim())
                        .with_attr("handler", "true"),
                );
                out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name.clone()), line_num));
                functions.insert(name.clone(), name);
            } else if let Some(caps) = FUNCTION.captures(stripped) {
                let name = caps[1].to_string();
                out.decl(
                    DeclFact::new(NodeKind::Function, name.clone(), name.clone(), line_num)
                        .with_snippet(snippet_around(&lines, line_num, 3))
                        .with_attr("params", caps[2].trim()),
                );
                out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name.clone()), line_num));
                functions.insert(name.clone(), name);
            } else if let Some(caps) = MODULE_VAR.captures(stripped) {
                let name = caps[1].to_string();
                let value = caps[2].trim();
                if let Some(req) = REQUIRE.captures(value) {
                    let target = req[1].to_string();
                    let target = if target.starts_with('.') {
                        RefTarget::File(normalize_resource_path(&target))
                    } else {
                        RefTarget::Name(target)
                    };
                    out.reference(
                        RefFact::new(RefKind::Import, "", target, line_num)
                            .with_context(format!("line {line_num}: {stripped}")),
                    );
                } else {
                    out.decl(
                        DeclFact::new(NodeKind::Variable, name.clone(), name.clone(), line_num)
                            .with_snippet(snippet_around(&lines, line_num, 2))
                            .with_attr("initial_value", value.chars().take(50).collect::<String>()),
                    );
                    out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name), line_num));
                }
            }
        }

        brace_depth += stripped.matches('{').count() as i32;
        brace_depth -= stripped.matches('}').count() as i32;
        brace_depth = brace_depth.max(0);
    }

    // Pass 2: references inside function bodies.
    let mut current_fn: Option<String> = None;
    brace_depth = 0;

    for (idx, line) in lines.iter().enumerate() {
        let line_num = (idx + 1) as u32;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with("//") {
            continue;
        }

        if brace_depth == 0 {
            if let Some(caps) = HANDLER.captures(stripped) {
                current_fn = functions.get(&caps[1]).cloned();
            } else if let Some(caps) = FUNCTION.captures(stripped) {
                current_fn = functions.get(&caps[1]).cloned();
            }
        }

        if let Some(source) = current_fn.clone() {
            let context = format!(
                "line {line_num}: {}",
                stripped.chars().take(60).collect::<String>()
            );

            for caps in SERVER_API.captures_iter(stripped).chain(HTTP_API.captures_iter(stripped)) {
                let api = caps[1].to_string();
                let decl_path = format!("api:{api}");
                out.decl(
                    DeclFact::new(NodeKind::ApiCall, api.clone(), decl_path.clone(), line_num)
                        .with_snippet(snippet_around(&lines, line_num, 1))
                        .with_attr("endpoint", api),
                );
                out.reference(
                    RefFact::new(RefKind::Call, source.clone(), RefTarget::Decl(decl_path), line_num)
                        .with_context(context.clone()),
                );
            }

            for caps in BARE_CALL.captures_iter(stripped) {
                let callee = caps[1].to_string();
                if BUILTINS.contains(callee.as_str()) || callee == source {
                    continue;
                }
                let fact = if functions.contains_key(&callee) {
                    RefFact::new(RefKind::Call, source.clone(), RefTarget::Decl(callee), line_num)
                } else {
                    RefFact::new(RefKind::Call, source.clone(), RefTarget::Name(callee), line_num)
                        .unscoped()
                };
                out.reference(fact.with_context(context.clone()));
            }
        }

        brace_depth += stripped.matches('{').count() as i32;
        brace_depth -= stripped.matches('}').count() as i32;
        brace_depth = brace_depth.max(0);
        if brace_depth == 0 {
            current_fn = None;
        }
    }

    out
}
