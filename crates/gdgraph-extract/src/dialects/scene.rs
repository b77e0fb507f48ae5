//! Scene (.tscn) extractor: tree structure, external resources, script
//! attachments, instanced sub-scenes, and declared signal connections.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use gdgraph_core::NodeKind;
use regex::Regex;

use crate::fact::{snippet_around, DeclFact, Extraction, RefFact, RefKind, RefTarget};

use super::{file_stem, normalize_resource_path};

static SCENE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[gd_scene\s+load_steps=(\d+)\s+format=(\d+)(?:\s+uid="([^"]+)")?\]"#).unwrap()
});
static EXT_RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[ext_resource\s+type="([^"]+)"(?:\s+uid="[^"]+")?\s+path="([^"]+)"\s+id="([^"]+)"\]"#)
        .unwrap()
});
// Older files put the path first.
static EXT_RESOURCE_ALT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[ext_resource\s+path="([^"]+)"\s+type="([^"]+)"\s+id="([^"]+)"\]"#).unwrap()
});
static SUB_RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[sub_resource\s+type="([^"]+)"\s+id="([^"]+)"\]"#).unwrap()
});
static NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[node\s+name="([^"]+)"\s+type="([^"]+)"(?:\s+parent="([^"]*)")?\]"#).unwrap()
});
static NODE_INSTANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[node\s+name="([^"]+)"(?:\s+parent="([^"]*)")?\s+instance=ExtResource\(\s*"([^"]+)"\s*\)\]"#)
        .unwrap()
});
static NODE_INSTANCE_ALT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[node\s+name="([^"]+)"\s+instance=ExtResource\(\s*"([^"]+)"\s*\)(?:\s+parent="([^"]*)")?\]"#)
        .unwrap()
});
static SCRIPT_ATTACH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^script\s*=\s*ExtResource\(\s*"([^"]+)"\s*\)"#).unwrap()
});
static CONNECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[connection\s+signal="([^"]+)"\s+from="([^"]+)"\s+to="([^"]+)"\s+method="([^"]+)"(?:\s+flags=(\d+))?\]"#)
        .unwrap()
});
static PROPERTY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s*=\s*(.+)$").unwrap());

#[derive(Debug, Clone)]
struct ExtResource {
    kind: String,
    path: String,
}

#[derive(Debug, Clone)]
struct TreeNode {
    name: String,
    node_type: String,
    parent: Option<String>,
    instance: Option<String>,
    script: Option<String>,
    properties: BTreeMap<String, String>,
    line: u32,
}

impl TreeNode {
    /// Path within the owning tree: the root is ".", a root child is its
    /// own name, deeper nodes chain through their parent path.
    fn tree_path(&self) -> String {
        match self.parent.as_deref() {
            None => ".".to_string(),
            Some(".") => self.name.clone(),
            Some(parent) => format!("{parent}/{}", self.name),
        }
    }

    fn parent_path(&self) -> Option<String> {
        self.parent.clone()
    }
}

pub fn extract(path: &Path, content: &str) -> Extraction {
    let mut out = Extraction::default();
    let lines: Vec<&str> = content.lines().collect();
    let stem = file_stem(path);

    let mut root = DeclFact::new(NodeKind::SceneRoot, stem, "", 1)
        .with_snippet(lines.first().copied().unwrap_or_default());

    let mut ext_resources: BTreeMap<String, ExtResource> = BTreeMap::new();
    let mut tree_nodes: Vec<TreeNode> = Vec::new();
    let mut current: Option<TreeNode> = None;
    let mut in_node_section = false;
    let mut saw_header = false;

    for (idx, line) in lines.iter().enumerate() {
        let line_num = (idx + 1) as u32;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with(';') {
            continue;
        }

        if let Some(caps) = SCENE_HEADER.captures(stripped) {
            saw_header = true;
            root = root.with_attr("load_steps", &caps[1]).with_attr("format", &caps[2]);
            if let Some(uid) = caps.get(3) {
                root = root.with_attr("uid", uid.as_str());
            }
            continue;
        }

        if let Some(caps) = EXT_RESOURCE.captures(stripped) {
            ext_resources.insert(
                caps[3].to_string(),
                ExtResource { kind: caps[1].to_string(), path: normalize_resource_path(&caps[2]) },
            );
            continue;
        }
        if let Some(caps) = EXT_RESOURCE_ALT.captures(stripped) {
            ext_resources.insert(
                caps[3].to_string(),
                ExtResource { kind: caps[2].to_string(), path: normalize_resource_path(&caps[1]) },
            );
            continue;
        }
        if SUB_RESOURCE.is_match(stripped) {
            // Internal resources carry no cross-file information.
            in_node_section = false;
            if let Some(node) = current.take() {
                tree_nodes.push(node);
            }
            continue;
        }

        if let Some(caps) = NODE.captures(stripped) {
            if let Some(node) = current.take() {
                tree_nodes.push(node);
            }
            current = Some(TreeNode {
                name: caps[1].to_string(),
                node_type: caps[2].to_string(),
                parent: caps.get(3).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty()),
                instance: None,
                script: None,
                properties: BTreeMap::new(),
                line: line_num,
            });
            in_node_section = true;
            continue;
        }
        if let Some(caps) = NODE_INSTANCE
            .captures(stripped)
            .or_else(|| NODE_INSTANCE_ALT.captures(stripped))
        {
            if let Some(node) = current.take() {
                tree_nodes.push(node);
            }
            // Both attribute orders bind name first; parent and instance
            // swap groups between the two patterns.
            let (parent, instance) = if NODE_INSTANCE.is_match(stripped) {
                (caps.get(2).map(|m| m.as_str().to_string()), caps[3].to_string())
            } else {
                (caps.get(3).map(|m| m.as_str().to_string()), caps[2].to_string())
            };
            current = Some(TreeNode {
                name: caps[1].to_string(),
                node_type: "(instance)".to_string(),
                parent: parent.filter(|s| !s.is_empty()),
                instance: Some(instance),
                script: None,
                properties: BTreeMap::new(),
                line: line_num,
            });
            in_node_section = true;
            continue;
        }

        if let Some(caps) = CONNECTION.captures(stripped) {
            if let Some(node) = current.take() {
                tree_nodes.push(node);
            }
            in_node_section = false;
            emit_connection(&mut out, &caps, line_num, stripped);
            continue;
        }

        if stripped.starts_with('[') {
            // A section header none of the known patterns accept.
            out.issue(line_num, format!("unrecognized section: {stripped}"));
            in_node_section = false;
            if let Some(node) = current.take() {
                tree_nodes.push(node);
            }
            continue;
        }

        if in_node_section {
            if let Some(node) = current.as_mut() {
                if let Some(caps) = SCRIPT_ATTACH.captures(stripped) {
                    node.script = Some(caps[1].to_string());
                } else if let Some(caps) = PROPERTY.captures(stripped) {
                    node.properties.insert(caps[1].to_string(), caps[2].to_string());
                }
            }
        }
    }
    if let Some(node) = current.take() {
        tree_nodes.push(node);
    }

    if !saw_header && !lines.is_empty() {
        out.issue(1, "missing [gd_scene] header");
    }

    out.facts.insert(0, crate::fact::Fact::Decl(root));

    // Tree nodes: declarations, containment, attachments, instances.
    for node in &tree_nodes {
        let tree_path = node.tree_path();
        let mut decl = DeclFact::new(NodeKind::NodeRef, node.name.clone(), tree_path.clone(), node.line)
            .with_snippet(snippet_around(&lines, node.line, 1))
            .with_attr("node_type", node.node_type.clone())
            .with_attr("tree_path", tree_path.clone());
        if let Some(parent) = node.parent_path() {
            decl = decl.with_attr("parent", parent);
        }
        if node.instance.is_some() {
            decl = decl.with_attr("instanced", "true");
        }
        if !node.properties.is_empty() {
            decl = decl.with_attr("properties", node.properties.len().to_string());
        }
        out.decl(decl);

        // Containment: declared parent → child, root under the scene file
        // node. Declaration order is only the emission order tie-break.
        let container = match node.parent_path() {
            None => "".to_string(),
            Some(p) if p == "." => ".".to_string(),
            Some(p) => p,
        };
        out.reference(
            RefFact::new(RefKind::Contain, container, RefTarget::Decl(tree_path.clone()), node.line)
                .with_context(format!("line {}: node {}", node.line, node.name)),
        );

        if let Some(script_id) = &node.script {
            match ext_resources.get(script_id) {
                Some(res) => out.reference(
                    RefFact::new(RefKind::Attach, tree_path.clone(), RefTarget::File(res.path.clone()), node.line)
                        .with_context(format!("line {}: script attached to {}", node.line, node.name)),
                ),
                None => out.issue(node.line, format!("script ExtResource(\"{script_id}\") is not declared")),
            }
        }

        if let Some(instance_id) = &node.instance {
            match ext_resources.get(instance_id) {
                Some(res) => out.reference(
                    RefFact::new(
                        RefKind::Instantiate,
                        tree_path.clone(),
                        RefTarget::File(res.path.clone()),
                        node.line,
                    )
                    .with_context(format!("line {}: instances {}", node.line, res.path)),
                ),
                None => {
                    out.issue(node.line, format!("instance ExtResource(\"{instance_id}\") is not declared"))
                }
            }
        }
    }

    // Non-script external resources referenced by the scene itself.
    for (ext_id, res) in &ext_resources {
        if res.kind == "Script" {
            continue;
        }
        let decl_path = format!("res:{}", res.path);
        let name = res.path.rsplit('/').next().unwrap_or(&res.path).to_string();
        out.decl(
            DeclFact::new(NodeKind::Resource, name, decl_path.clone(), 1)
                .with_attr("resource_path", res.path.clone())
                .with_attr("resource_type", res.kind.clone())
                .with_attr("ext_resource_id", ext_id.clone()),
        );
        out.reference(
            RefFact::new(RefKind::Reference, "", RefTarget::Decl(decl_path.clone()), 1)
                .with_context(format!("external resource: {}", res.kind)),
        );
        if res.path.ends_with(".tscn") {
            out.reference(RefFact::new(RefKind::Instantiate, decl_path, RefTarget::File(res.path.clone()), 1));
        } else if res.path.ends_with(".gd") {
            out.reference(RefFact::new(RefKind::Reference, decl_path, RefTarget::File(res.path.clone()), 1));
        }
    }

    out
}

fn emit_connection(out: &mut Extraction, caps: &regex::Captures<'_>, line_num: u32, stripped: &str) {
    let signal = &caps[1];
    let from = &caps[2];
    let to = &caps[3];
    let method = &caps[4];

    let conn_path = format!("conn:{from}:{signal}->{to}:{method}");
    let mut decl = DeclFact::new(
        NodeKind::SignalConnection,
        format!("{from}.{signal} -> {to}.{method}"),
        conn_path.clone(),
        line_num,
    )
    .with_snippet(stripped)
    .with_attr("signal", signal)
    .with_attr("from_node", from)
    .with_attr("to_node", to)
    .with_attr("method", method)
    .with_attr("declared_in_scene", "true");
    if let Some(flags) = caps.get(5) {
        decl = decl.with_attr("flags", flags.as_str());
    }
    out.decl(decl);

    // from-node → connection → handler. The from path is a tree-path
    // reference into the owning tree; the handler resolves by name.
    out.reference(
        RefFact::new(RefKind::Connect, from, RefTarget::Decl(conn_path.clone()), line_num)
            .with_context(format!("line {line_num}: signal {signal}")),
    );
    // The handler lives in whichever script the target node carries;
    // the scene itself has no scope signal for it.
    out.reference(
        RefFact::new(RefKind::Connect, conn_path, RefTarget::Name(method.to_string()), line_num)
            .with_context(format!("line {line_num}: handler {method}"))
            .unscoped(),
    );
}
