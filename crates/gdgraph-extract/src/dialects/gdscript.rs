//! GDScript (.gd) extractor: regex line scanning over two passes,
//! declarations first, then references inside function bodies.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use gdgraph_core::NodeKind;
use regex::Regex;

use crate::fact::{snippet_around, DeclFact, Extraction, RefFact, RefKind, RefTarget};

use super::{file_stem, normalize_resource_path};

// ── Declarations ─────────────────────────────────────────
static CLASS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class_name\s+(\w+)").unwrap());
static EXTENDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^extends\s+(\w+)").unwrap());
static INNER_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+(\w+)(?:\s+extends\s+(\w+))?\s*:").unwrap());
static FUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(static\s+)?func\s+(\w+)\s*\(([^)]*)\)(?:\s*->\s*([\w\[\], ]+))?\s*:").unwrap()
});
static VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^var\s+(\w+)(?:\s*:\s*([\w\[\], ]+))?(?:\s*=\s*(.+))?$").unwrap()
});
static CONST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^const\s+(\w+)(?:\s*:\s*(\w+))?\s*=\s*(.+)$").unwrap());
static EXPORT_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@export(?:_\w+(?:\([^)]*\))?)?\s+var\s+(\w+)(?:\s*:\s*([\w\[\], ]+))?(?:\s*=\s*(.+))?$")
        .unwrap()
});
static ONREADY_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@onready\s+var\s+(\w+)(?:\s*:\s*([\w\[\], ]+))?\s*=\s*(.+)$").unwrap()
});
static SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^signal\s+(\w+)(?:\s*\(([^)]*)\))?").unwrap());

// ── Signals ──────────────────────────────────────────────
static EMIT_NEW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)\.emit\s*\(").unwrap());
static EMIT_OLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"emit_signal\s*\(\s*["'](\w+)["']"#).unwrap());
static CONNECT_NEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\.connect\s*\(\s*(\w+)").unwrap());
static CONNECT_OLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"connect\s*\(\s*["'](\w+)["']\s*,\s*(?:\w+\s*,\s*)?["'](\w+)["']"#).unwrap()
});

// ── Resources and tree paths ─────────────────────────────
static PRELOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"preload\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());
static LOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bload\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());
static DOLLAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([A-Za-z0-9_/]+)").unwrap());
static GET_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"get_node\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());
static GET_NODE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"get_node\s*\(\s*(\w+)\s*\)").unwrap());
static FIND_CHILD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"find_child\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

// ── Calls ────────────────────────────────────────────────
static BARE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|[^\w.$"'@])(\w+)\s*\("#).unwrap());
static METHOD_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\.(\w+)\s*\(").unwrap());
static DYN_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bcall\s*\(\s*(?:["'](\w+)["']|(\w+))"#).unwrap());
static DYN_GET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bget\s*\(\s*["'](\w+)["']\s*\)"#).unwrap());
static DYN_SET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bset\s*\(\s*["'](\w+)["']\s*,"#).unwrap());

// ── Outbound service calls ───────────────────────────────
static SERVICE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:CloudScript\.execute|execute_cloud_script)\s*\(\s*["'](\w+)["']"#).unwrap()
});

/// Engine builtins and keywords that read like calls. Linking these would
/// drown the graph in noise.
static BUILTINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // control flow / keywords
        "if", "elif", "while", "for", "match", "return", "assert", "await", "func", "range",
        // lifecycle
        "_init", "_ready", "_process", "_physics_process", "_input", "_unhandled_input",
        "_notification", "_enter_tree", "_exit_tree",
        // common functions
        "print", "push_error", "push_warning", "str", "int", "float", "bool", "typeof", "len",
        "abs", "min", "max", "clamp", "lerp", "get", "set", "has", "keys", "values", "append",
        "remove", "erase", "is_instance_valid", "is_instance_of",
        // math
        "sin", "cos", "tan", "sqrt", "pow", "floor", "ceil", "round", "randf", "randi",
        // node methods
        "add_child", "remove_child", "get_parent", "get_children", "queue_free", "get_tree",
        "get_viewport", "get_node", "find_child",
        // handled by dedicated patterns
        "preload", "load", "emit", "emit_signal", "connect", "call", "execute",
        "execute_cloud_script",
        "new", "instantiate", "duplicate", "size", "is_empty", "has_method",
    ]
    .into_iter()
    .collect()
});

#[derive(Clone)]
struct FnCtx {
    path: String,
    name: String,
    indent: usize,
}

/// In-file declaration tables built by the first pass.
#[derive(Default)]
struct DeclTable {
    functions: HashMap<String, String>,
    variables: HashMap<String, String>,
    signals: HashMap<String, String>,
    class_path: Option<String>,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn truncated(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() > 60 {
        let cut: String = trimmed.chars().take(60).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

fn line_context(line_num: u32, text: &str) -> String {
    format!("line {line_num}: {}", truncated(text))
}

pub fn extract(path: &Path, content: &str) -> Extraction {
    let mut out = Extraction::default();
    let lines: Vec<&str> = content.lines().collect();
    let module = file_stem(path);

    out.decl(
        DeclFact::new(NodeKind::Module, module.clone(), "", 1)
            .with_snippet(snippet_around(&lines, 1, 2)),
    );

    let table = declaration_pass(&lines, &mut out);
    reference_pass(&lines, &table, &mut out);
    out
}

/// First pass: declarations, containment, inheritance.
fn declaration_pass(lines: &[&str], out: &mut Extraction) -> DeclTable {
    let mut table = DeclTable::default();
    let mut current_fn: Option<FnCtx> = None;
    let mut current_class: Option<(String, usize)> = None;
    let mut pending_extends: Option<(String, u32, String)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_num = (idx + 1) as u32;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let indent = indent_of(line);
        if let Some(ctx) = &current_fn {
            if indent <= ctx.indent {
                current_fn = None;
            }
        }
        // Leave an inner class on the next top-level construct.
        if current_class.is_some()
            && indent == 0
            && !stripped.starts_with('@')
            && !stripped.starts_with("class ")
        {
            current_class = None;
        }

        if let Some(caps) = CLASS_NAME.captures(stripped) {
            let name = caps[1].to_string();
            out.decl(
                DeclFact::new(NodeKind::Class, name.clone(), name.clone(), line_num)
                    .with_snippet(snippet_around(lines, line_num, 2))
                    .with_attr("named_class", "true"),
            );
            out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name.clone()), line_num));
            table.class_path = Some(name);
            continue;
        }

        if let Some(caps) = EXTENDS.captures(stripped) {
            // The class node may be declared on a later line; resolve the
            // edge source once the whole pass is done.
            pending_extends = Some((
                caps[1].to_string(),
                line_num,
                line_context(line_num, stripped),
            ));
            continue;
        }

        if let Some(caps) = INNER_CLASS.captures(line) {
            let class_indent = caps[1].len();
            let name = caps[2].to_string();
            let mut decl = DeclFact::new(NodeKind::Class, name.clone(), name.clone(), line_num)
                .with_snippet(snippet_around(lines, line_num, 2));
            if let Some(parent) = caps.get(3) {
                decl = decl.with_attr("extends", parent.as_str());
                out.reference(
                    RefFact::new(
                        RefKind::Inherit,
                        name.clone(),
                        RefTarget::Name(parent.as_str().to_string()),
                        line_num,
                    )
                    .with_context(line_context(line_num, stripped)),
                );
            }
            out.decl(decl);
            out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name.clone()), line_num));
            current_class = Some((name, class_indent));
            current_fn = None;
            continue;
        }

        if stripped.starts_with("func ") || stripped.starts_with("static func ") {
            let Some(caps) = FUNC.captures(line) else {
                out.issue(line_num, format!("malformed function declaration: {}", truncated(stripped)));
                continue;
            };
            let fn_indent = caps[1].len();
            let name = caps[3].to_string();
            let scope = current_class
                .as_ref()
                .filter(|(_, ci)| fn_indent > *ci)
                .map(|(c, _)| c.clone());
            let decl_path = match &scope {
                Some(class) => format!("{class}::{name}"),
                None => name.clone(),
            };

            let mut decl = DeclFact::new(NodeKind::Function, name.clone(), decl_path.clone(), line_num)
                .with_snippet(snippet_around(lines, line_num, 3))
                .with_attr("params", caps[4].trim())
                .with_attr("private", if name.starts_with('_') { "true" } else { "false" });
            if caps.get(2).is_some() {
                decl = decl.with_attr("static", "true");
            }
            if let Some(ret) = caps.get(5) {
                decl = decl.with_attr("return_type", ret.as_str().trim());
            }
            out.decl(decl);
            out.reference(RefFact::new(
                RefKind::Contain,
                scope.clone().unwrap_or_default(),
                RefTarget::Decl(decl_path.clone()),
                line_num,
            ));

            table.functions.insert(name.clone(), decl_path.clone());
            current_fn = Some(FnCtx { path: decl_path, name, indent: fn_indent });
            continue;
        }

        // Class-level state only; locals inside functions are not graph
        // entities.
        if current_fn.is_none() && indent == 0 {
            if let Some(var) = parse_variable(stripped, line_num, lines) {
                out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(var.path.clone()), line_num));
                table.variables.insert(var.name.clone(), var.path.clone());
                out.decl(var);
                continue;
            }
            if let Some(caps) = CONST.captures(stripped) {
                let name = caps[1].to_string();
                let value = caps[3].trim();
                if let Some(preload) = PRELOAD.captures(value) {
                    let res = normalize_resource_path(&preload[1]);
                    let decl_path = format!("res:{res}");
                    out.decl(
                        DeclFact::new(NodeKind::Resource, name.clone(), decl_path.clone(), line_num)
                            .with_snippet(snippet_around(lines, line_num, 2))
                            .with_attr("resource_path", res.clone())
                            .with_attr("load_type", "preload")
                            .with_attr("constant", "true"),
                    );
                    out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(decl_path.clone()), line_num));
                    if res.ends_with(".gd") || res.ends_with(".tscn") {
                        out.reference(
                            RefFact::new(RefKind::Reference, decl_path, RefTarget::File(res), line_num)
                                .with_context(line_context(line_num, stripped)),
                        );
                    }
                } else {
                    let decl = DeclFact::new(NodeKind::Variable, name.clone(), name.clone(), line_num)
                        .with_snippet(snippet_around(lines, line_num, 2))
                        .with_attr("constant", "true")
                        .with_attr("initial_value", truncated(value));
                    out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(name.clone()), line_num));
                    table.variables.insert(name, decl.path.clone());
                    out.decl(decl);
                }
                continue;
            }
        }

        if stripped.starts_with("signal") {
            let Some(caps) = SIGNAL.captures(stripped) else {
                out.issue(line_num, format!("malformed signal declaration: {}", truncated(stripped)));
                continue;
            };
            let name = caps[1].to_string();
            let decl_path = format!("sig:{name}");
            let mut decl = DeclFact::new(NodeKind::Signal, name.clone(), decl_path.clone(), line_num)
                .with_snippet(snippet_around(lines, line_num, 2));
            if let Some(params) = caps.get(2) {
                decl = decl.with_attr("params", params.as_str().trim());
            }
            out.decl(decl);
            out.reference(RefFact::new(RefKind::Contain, "", RefTarget::Decl(decl_path.clone()), line_num));
            table.signals.insert(name, decl_path);
            continue;
        }
    }

    if let Some((parent, line_num, context)) = pending_extends {
        let source = table.class_path.clone().unwrap_or_default();
        out.reference(
            RefFact::new(RefKind::Inherit, source, RefTarget::Name(parent), line_num)
                .with_context(context),
        );
    }

    table
}

fn parse_variable(stripped: &str, line_num: u32, lines: &[&str]) -> Option<DeclFact> {
    let matchers: [(&Regex, bool, bool); 3] =
        [(&EXPORT_VAR, true, false), (&ONREADY_VAR, false, true), (&VAR, false, false)];
    for (pattern, exported, onready) in matchers {
        let Some(caps) = pattern.captures(stripped) else { continue };
        let name = caps[1].to_string();
        let mut decl = DeclFact::new(NodeKind::Variable, name.clone(), name, line_num)
            .with_snippet(snippet_around(lines, line_num, 2));
        if let Some(ty) = caps.get(2) {
            decl = decl.with_attr("type", ty.as_str().trim());
        }
        if let Some(value) = caps.get(3) {
            decl = decl.with_attr("initial_value", truncated(value.as_str()));
            if onready {
                if let Some(dollar) = DOLLAR.captures(value.as_str()) {
                    decl = decl.with_attr("node_path", &dollar[1]);
                }
            }
        }
        if exported {
            decl = decl.with_attr("exported", "true");
        }
        if onready {
            decl = decl.with_attr("onready", "true");
        }
        return Some(decl);
    }
    None
}

/// Second pass: calls, reads/writes, emissions, connections, resource and
/// tree-path references, dynamic constructs, outbound service calls.
fn reference_pass(lines: &[&str], table: &DeclTable, out: &mut Extraction) {
    let mut current_fn: Option<FnCtx> = None;
    let mut current_class: Option<(String, usize)> = None;

    let write_patterns: HashMap<&String, Regex> = table
        .variables
        .keys()
        .filter_map(|name| {
            Regex::new(&format!(r"\b{}\s*[+\-*/]?=", regex::escape(name)))
                .ok()
                .map(|re| (name, re))
        })
        .collect();
    let read_patterns: HashMap<&String, Regex> = table
        .variables
        .keys()
        .filter_map(|name| {
            Regex::new(&format!(r"\b{}\b", regex::escape(name))).ok().map(|re| (name, re))
        })
        .collect();

    for (idx, line) in lines.iter().enumerate() {
        let line_num = (idx + 1) as u32;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let indent = indent_of(line);
        if let Some(ctx) = &current_fn {
            if indent <= ctx.indent {
                current_fn = None;
            }
        }
        if current_class.is_some()
            && indent == 0
            && !stripped.starts_with('@')
            && !stripped.starts_with("class ")
        {
            current_class = None;
        }
        if let Some(caps) = INNER_CLASS.captures(line) {
            current_class = Some((caps[2].to_string(), caps[1].len()));
            continue;
        }
        if let Some(caps) = FUNC.captures(line) {
            let fn_indent = caps[1].len();
            let name = caps[3].to_string();
            let scope = current_class
                .as_ref()
                .filter(|(_, ci)| fn_indent > *ci)
                .map(|(c, _)| c.clone());
            let path = match scope {
                Some(class) => format!("{class}::{name}"),
                None => name.clone(),
            };
            current_fn = Some(FnCtx { path, name, indent: fn_indent });
            continue;
        }

        let Some(ctx) = current_fn.clone() else { continue };
        let source = ctx.path.as_str();
        let context = line_context(line_num, stripped);

        // Signal emissions, both styles.
        for caps in EMIT_NEW.captures_iter(stripped) {
            if let Some(sig_path) = table.signals.get(&caps[1]) {
                out.reference(
                    RefFact::new(RefKind::Emit, source, RefTarget::Decl(sig_path.clone()), line_num)
                        .with_context(context.clone()),
                );
            }
        }
        for caps in EMIT_OLD.captures_iter(stripped) {
            let name = &caps[1];
            let target = match table.signals.get(name) {
                Some(p) => RefTarget::Decl(p.clone()),
                None => RefTarget::Name(name.to_string()),
            };
            out.reference(
                RefFact::new(RefKind::Emit, source, target, line_num).with_context(context.clone()),
            );
        }

        // Signal connections, both styles.
        for caps in CONNECT_NEW.captures_iter(stripped) {
            emit_connection(out, table, source, &caps[1], &caps[2], line_num, &context, lines);
        }
        for caps in CONNECT_OLD.captures_iter(stripped) {
            emit_connection(out, table, source, &caps[1], &caps[2], line_num, &context, lines);
        }

        // Resource loads inside functions.
        for caps in PRELOAD.captures_iter(stripped).chain(LOAD.captures_iter(stripped)) {
            emit_resource(out, source, &caps[1], line_num, &context, lines, stripped);
        }

        // Tree-path references.
        for caps in DOLLAR
            .captures_iter(stripped)
            .chain(GET_NODE.captures_iter(stripped))
            .chain(FIND_CHILD.captures_iter(stripped))
        {
            let node_path = caps[1].to_string();
            let decl_path = format!("${node_path}");
            out.decl(
                DeclFact::new(
                    NodeKind::NodeRef,
                    node_path.rsplit('/').next().unwrap_or(&node_path),
                    decl_path.clone(),
                    line_num,
                )
                .with_snippet(snippet_around(lines, line_num, 1))
                .with_attr("node_path", node_path),
            );
            out.reference(
                RefFact::new(RefKind::Reference, source, RefTarget::Decl(decl_path), line_num)
                    .with_context(context.clone()),
            );
        }

        // Dynamic constructs: modeled statically, never resolved.
        for caps in DYN_CALL.captures_iter(stripped) {
            let (label, candidates) = match (caps.get(1), caps.get(2)) {
                (Some(lit), _) => (lit.as_str().to_string(), vec![lit.as_str().to_string()]),
                (None, Some(var)) => (format!("call({})", var.as_str()), Vec::new()),
                (None, None) => continue,
            };
            out.reference(
                RefFact::new(RefKind::Call, source, RefTarget::Name(label), line_num)
                    .with_context(context.clone())
                    .dynamic_with(candidates),
            );
        }
        for caps in DYN_GET.captures_iter(stripped) {
            out.reference(
                RefFact::new(RefKind::Read, source, RefTarget::Name(caps[1].to_string()), line_num)
                    .with_context(context.clone())
                    .dynamic_with(vec![caps[1].to_string()]),
            );
        }
        for caps in DYN_SET.captures_iter(stripped) {
            out.reference(
                RefFact::new(RefKind::Write, source, RefTarget::Name(caps[1].to_string()), line_num)
                    .with_context(context.clone())
                    .dynamic_with(vec![caps[1].to_string()]),
            );
        }
        for caps in GET_NODE_VAR.captures_iter(stripped) {
            out.reference(
                RefFact::new(
                    RefKind::Reference,
                    source,
                    RefTarget::Name(format!("get_node({})", &caps[1])),
                    line_num,
                )
                .with_context(context.clone())
                .dynamic_with(Vec::new()),
            );
        }

        // Outbound service calls, bridged to backend handlers by name.
        for caps in SERVICE_CALL.captures_iter(stripped) {
            let handler = caps[1].to_string();
            let decl_path = format!("api:{handler}");
            out.decl(
                DeclFact::new(NodeKind::ApiCall, handler.clone(), decl_path.clone(), line_num)
                    .with_snippet(snippet_around(lines, line_num, 1))
                    .with_attr("handler", handler.clone()),
            );
            out.reference(
                RefFact::new(RefKind::Call, source, RefTarget::Decl(decl_path.clone()), line_num)
                    .with_context(context.clone()),
            );
            out.reference(
                RefFact::new(RefKind::Bridge, decl_path, RefTarget::Name(handler), line_num)
                    .with_context(context.clone()),
            );
        }

        // Plain and member calls.
        for caps in BARE_CALL.captures_iter(stripped) {
            let callee = &caps[1];
            if BUILTINS.contains(callee) || callee == ctx.name {
                continue;
            }
            out.reference(
                RefFact::new(RefKind::Call, source, RefTarget::Name(callee.to_string()), line_num)
                    .with_context(context.clone()),
            );
        }
        for caps in METHOD_CALL.captures_iter(stripped) {
            let receiver = &caps[1];
            let method = &caps[2];
            if BUILTINS.contains(method) || method == ctx.name {
                continue;
            }
            let fact = RefFact::new(RefKind::Call, source, RefTarget::Name(method.to_string()), line_num)
                .with_context(context.clone());
            // `self.f()` resolves in this file's own scope; anything else
            // has an unknown receiver type.
            if receiver == "self" {
                out.reference(fact);
            } else {
                out.reference(fact.unscoped());
            }
        }

        // Reads and writes of class-level variables.
        for (name, var_path) in &table.variables {
            let is_write = write_patterns
                .get(name)
                .is_some_and(|re| re.find(stripped).is_some_and(|m| !stripped[m.end()..].starts_with('=')));
            if is_write {
                out.reference(
                    RefFact::new(RefKind::Write, source, RefTarget::Decl(var_path.clone()), line_num)
                        .with_context(context.clone()),
                );
            } else if read_patterns.get(name).is_some_and(|re| re.is_match(stripped)) {
                out.reference(
                    RefFact::new(RefKind::Read, source, RefTarget::Decl(var_path.clone()), line_num)
                        .with_context(context.clone()),
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_connection(
    out: &mut Extraction,
    table: &DeclTable,
    source: &str,
    signal: &str,
    handler: &str,
    line_num: u32,
    context: &str,
    lines: &[&str],
) {
    let conn_path = format!("conn:{signal}->{handler}");
    out.decl(
        DeclFact::new(
            NodeKind::SignalConnection,
            format!("{signal} -> {handler}"),
            conn_path.clone(),
            line_num,
        )
        .with_snippet(snippet_around(lines, line_num, 1))
        .with_attr("signal", signal)
        .with_attr("handler", handler),
    );
    if let Some(sig_path) = table.signals.get(signal) {
        out.reference(
            RefFact::new(RefKind::Connect, sig_path.clone(), RefTarget::Decl(conn_path.clone()), line_num)
                .with_context(context.to_string()),
        );
    } else {
        out.reference(
            RefFact::new(RefKind::Connect, source, RefTarget::Decl(conn_path.clone()), line_num)
                .with_context(context.to_string()),
        );
    }
    let handler_target = match table.functions.get(handler) {
        Some(p) => RefTarget::Decl(p.clone()),
        None => RefTarget::Name(handler.to_string()),
    };
    out.reference(
        RefFact::new(RefKind::Connect, conn_path, handler_target, line_num)
            .with_context(context.to_string()),
    );
}

fn emit_resource(
    out: &mut Extraction,
    source: &str,
    raw_path: &str,
    line_num: u32,
    context: &str,
    lines: &[&str],
    stripped: &str,
) {
    let res = normalize_resource_path(raw_path);
    let decl_path = format!("res:{res}");
    let name = res.rsplit('/').next().unwrap_or(&res).to_string();
    let load_type = if stripped.contains("preload") { "preload" } else { "load" };
    out.decl(
        DeclFact::new(NodeKind::Resource, name, decl_path.clone(), line_num)
            .with_snippet(snippet_around(lines, line_num, 1))
            .with_attr("resource_path", res.clone())
            .with_attr("load_type", load_type),
    );
    out.reference(
        RefFact::new(RefKind::Reference, source, RefTarget::Decl(decl_path.clone()), line_num)
            .with_context(context.to_string()),
    );
    if res.ends_with(".gd") || res.ends_with(".tscn") {
        out.reference(
            RefFact::new(RefKind::Reference, decl_path, RefTarget::File(res), line_num)
                .with_context(context.to_string()),
        );
    }
}
