//! Unit tests for gdgraph-analysis

use std::collections::BTreeMap;

use gdgraph_core::{
    Confidence, Dialect, Edge, EdgeDir, FileDiff, GraphStore, Node, NodeId, NodeKind, Origin,
    Relation, Snapshot, META_UNRESOLVED,
};

use crate::cycles::{cycles, CycleOptions};
use crate::deadcode::{dead_code, EntryPoints};
use crate::impact::{impact, ImpactOptions};
use crate::paths::{find_path, PathResult};
use crate::report::{coupling, statistics, usages};
use crate::validate::{validate, Severity};

fn node(name: &str, kind: NodeKind, file: &str, line: u32) -> Node {
    let dialect = Dialect::from_path(std::path::Path::new(file)).unwrap_or(Dialect::GdScript);
    Node {
        id: NodeId::derive(dialect, &format!("{file}::{name}"), kind, 0),
        kind,
        name: name.to_string(),
        origin: Origin::new(file, line, dialect),
        snippet: String::new(),
        attrs: BTreeMap::new(),
        confidence: Confidence::High,
        candidates: Vec::new(),
    }
}

fn edge(source: &Node, target: &Node, relation: Relation, confidence: Confidence) -> Edge {
    Edge::new(source.id, target.id, relation, "test", confidence, 0)
}

/// pickup → add_item → items → save, all High, across two files.
fn inventory_graph() -> (Snapshot, [NodeId; 4]) {
    let store = GraphStore::new();

    let pickup = node("pickup", NodeKind::Function, "player.gd", 3);
    let add_item = node("add_item", NodeKind::Function, "inventory.gd", 5);
    let items = node("items", NodeKind::Variable, "inventory.gd", 1);
    let save = node("save", NodeKind::Function, "inventory.gd", 12);

    let call = edge(&pickup, &add_item, Relation::Calls, Confidence::High);
    let write = edge(&add_item, &items, Relation::Writes, Confidence::High);
    // Forward traversal reaches `save` through the variable it reads.
    let read = edge(&items, &save, Relation::Reads, Confidence::High);

    store
        .apply_batch(vec![
            FileDiff::new("player.gd", vec![pickup.clone()], vec![call]),
            FileDiff::new(
                "inventory.gd",
                vec![add_item.clone(), items.clone(), save.clone()],
                vec![write, read],
            ),
        ])
        .unwrap();

    (store.snapshot(), [pickup.id, add_item.id, items.id, save.id])
}

#[test]
fn find_path_returns_the_expected_sequence() {
    let (snap, [pickup, add_item, items, save]) = inventory_graph();

    let result = find_path(&snap, pickup, save, 10).unwrap();
    let PathResult::Found(path) = result else { panic!("expected a path") };
    assert_eq!(path.nodes, vec![pickup, add_item, items, save]);
    assert_eq!(path.hops, 3);
    assert_eq!(path.edges.len(), 3);
    assert_eq!(path.weakest, Confidence::High);
}

#[test]
fn find_path_reports_unreachable_within_bound() {
    let (snap, [pickup, _, _, save]) = inventory_graph();

    assert_eq!(find_path(&snap, pickup, save, 2).unwrap(), PathResult::Unreachable { bound: 2 });
    // And in the direction with no edges at all.
    assert_eq!(find_path(&snap, save, pickup, 10).unwrap(), PathResult::Unreachable { bound: 10 });
}

#[test]
fn find_path_rejects_unknown_nodes() {
    let (snap, [pickup, ..]) = inventory_graph();
    assert!(find_path(&snap, pickup, NodeId(0xBAD), 5).is_err());
}

#[test]
fn find_path_prefers_the_strongest_equal_length_path() {
    let store = GraphStore::new();
    let a = node("a", NodeKind::Function, "x.gd", 1);
    let b = node("b", NodeKind::Function, "x.gd", 2);
    let c = node("c", NodeKind::Function, "x.gd", 3);
    let d = node("d", NodeKind::Function, "x.gd", 4);

    // Two 2-hop routes a→d: through b (all High) and through c (Low link).
    let edges = vec![
        edge(&a, &b, Relation::Calls, Confidence::High),
        edge(&b, &d, Relation::Calls, Confidence::High),
        edge(&a, &c, Relation::Calls, Confidence::Low),
        edge(&c, &d, Relation::Calls, Confidence::High),
    ];
    store
        .apply_file_diff(FileDiff::new(
            "x.gd",
            vec![a.clone(), b.clone(), c.clone(), d.clone()],
            edges,
        ))
        .unwrap();

    let PathResult::Found(path) = find_path(&store.snapshot(), a.id, d.id, 10).unwrap() else {
        panic!("expected a path");
    };
    assert_eq!(path.nodes, vec![a.id, b.id, d.id]);
    assert_eq!(path.weakest, Confidence::High);
}

#[test]
fn path_and_impact_agree_on_reachability() {
    let (snap, ids) = inventory_graph();

    for h in 1..=4 {
        for &from in &ids {
            let reachable = impact(
                &snap,
                from,
                EdgeDir::Outgoing,
                ImpactOptions { depth: h, max_results: 100 },
            )
            .unwrap();
            for &to in &ids {
                if to == from {
                    continue;
                }
                let found = matches!(
                    find_path(&snap, from, to, h).unwrap(),
                    PathResult::Found(_)
                );
                let in_impact = reachable.entries.iter().any(|e| e.node == to);
                assert_eq!(found, in_impact, "from={from:?} to={to:?} h={h}");
            }
        }
    }
}

#[test]
fn impact_annotates_depth_and_weakest_link() {
    let store = GraphStore::new();
    let a = node("a", NodeKind::Function, "x.gd", 1);
    let b = node("b", NodeKind::Function, "x.gd", 2);
    let c = node("c", NodeKind::Function, "x.gd", 3);
    store
        .apply_file_diff(FileDiff::new(
            "x.gd",
            vec![a.clone(), b.clone(), c.clone()],
            vec![
                edge(&a, &b, Relation::Calls, Confidence::Medium),
                edge(&b, &c, Relation::Calls, Confidence::High),
            ],
        ))
        .unwrap();

    let report =
        impact(&store.snapshot(), a.id, EdgeDir::Outgoing, ImpactOptions::default()).unwrap();
    assert_eq!(report.entries.len(), 2);
    let b_entry = report.entries.iter().find(|e| e.node == b.id).unwrap();
    assert_eq!((b_entry.depth, b_entry.weakest), (1, Confidence::Medium));
    let c_entry = report.entries.iter().find(|e| e.node == c.id).unwrap();
    // The weakest link on the discovery path carries through.
    assert_eq!((c_entry.depth, c_entry.weakest), (2, Confidence::Medium));
    assert!(!report.truncated);

    // Backward impact walks incoming edges.
    let back =
        impact(&store.snapshot(), c.id, EdgeDir::Incoming, ImpactOptions::default()).unwrap();
    assert!(back.entries.iter().any(|e| e.node == a.id));
}

#[test]
fn impact_truncates_inside_the_walk() {
    let (snap, [pickup, ..]) = inventory_graph();
    let report = impact(
        &snap,
        pickup,
        EdgeDir::Outgoing,
        ImpactOptions { depth: 10, max_results: 1 },
    )
    .unwrap();
    assert_eq!(report.entries.len(), 1);
    assert!(report.truncated);
}

#[test]
fn dead_code_respects_entry_reachability() {
    let store = GraphStore::new();
    let ready = node("_ready", NodeKind::Function, "player.gd", 1);
    let used = node("used", NodeKind::Function, "player.gd", 5);
    let orphan = node("orphan", NodeKind::Function, "player.gd", 9);
    let tree_ref = node("Sprite", NodeKind::NodeRef, "player.gd", 12);

    store
        .apply_file_diff(FileDiff::new(
            "player.gd",
            vec![ready.clone(), used.clone(), orphan.clone(), tree_ref.clone()],
            vec![edge(&ready, &used, Relation::Calls, Confidence::High)],
        ))
        .unwrap();

    let report = dead_code(&store.snapshot(), &EntryPoints::default());
    assert!(report.entry_nodes.contains(&ready.id));
    // Never report anything reachable from the entry set.
    assert!(!report.candidates.contains(&ready.id));
    assert!(!report.candidates.contains(&used.id));
    // Always report an unreferenced non-entry function.
    assert!(report.candidates.contains(&orphan.id));
    // Containment-only kinds are excluded.
    assert!(!report.candidates.contains(&tree_ref.id));
}

#[test]
fn entry_files_root_their_nodes() {
    let store = GraphStore::new();
    let boot = node("boot", NodeKind::Function, "autoload/game.gd", 2);
    let helper = node("helper", NodeKind::Function, "misc.gd", 2);
    store
        .apply_batch(vec![
            FileDiff::new("autoload/game.gd", vec![boot.clone()], vec![]),
            FileDiff::new(
                "misc.gd",
                vec![helper.clone()],
                vec![edge(&boot, &helper, Relation::Calls, Confidence::High)],
            ),
        ])
        .unwrap();

    let report = dead_code(&store.snapshot(), &EntryPoints::default());
    assert!(report.entry_nodes.contains(&boot.id));
    assert!(report.candidates.is_empty());
}

#[test]
fn cycles_on_acyclic_graph_is_empty() {
    let (snap, _) = inventory_graph();
    let report = cycles(&snap, CycleOptions::default());
    assert!(report.cycles.is_empty());
    assert!(!report.truncated);
}

#[test]
fn cycles_finds_the_triangle_once() {
    let store = GraphStore::new();
    let a = node("a", NodeKind::Function, "x.gd", 1);
    let b = node("b", NodeKind::Function, "x.gd", 2);
    let c = node("c", NodeKind::Function, "x.gd", 3);
    let weak = edge(&c, &a, Relation::Calls, Confidence::Low);
    let weak_id = weak.id;
    store
        .apply_file_diff(FileDiff::new(
            "x.gd",
            vec![a.clone(), b.clone(), c.clone()],
            vec![
                edge(&a, &b, Relation::Calls, Confidence::High),
                edge(&b, &c, Relation::Calls, Confidence::High),
                weak,
            ],
        ))
        .unwrap();

    let report = cycles(&store.snapshot(), CycleOptions::default());
    assert_eq!(report.cycles.len(), 1);
    let cycle = &report.cycles[0];

    let mut expected = vec![a.id, b.id, c.id];
    expected.sort();
    let mut got = cycle.nodes.clone();
    got.sort();
    assert_eq!(got, expected);

    // The lowest-confidence edge is the suggested break point.
    assert_eq!(cycle.weakest_edge, weak_id);
    assert_eq!(cycle.weakest, Confidence::Low);
}

#[test]
fn cycle_length_bound_truncates() {
    let store = GraphStore::new();
    let nodes: Vec<Node> =
        (0..5).map(|i| node(&format!("n{i}"), NodeKind::Function, "x.gd", i + 1)).collect();
    let mut edges = Vec::new();
    for i in 0..5 {
        edges.push(edge(&nodes[i], &nodes[(i + 1) % 5], Relation::Calls, Confidence::High));
    }
    store.apply_file_diff(FileDiff::new("x.gd", nodes, edges)).unwrap();

    let bounded = cycles(&store.snapshot(), CycleOptions { max_length: 3, max_cycles: 10 });
    assert!(bounded.cycles.is_empty());
    assert!(bounded.truncated);

    let full = cycles(&store.snapshot(), CycleOptions::default());
    assert_eq!(full.cycles.len(), 1);
}

#[test]
fn validate_flags_missing_and_ambiguous_references() {
    let store = GraphStore::new();

    let mut root = node("main", NodeKind::SceneRoot, "main.tscn", 1);
    root.attrs.insert("format".into(), "3".into());

    let mut player = node("Player", NodeKind::NodeRef, "main.tscn", 5);
    player.attrs.insert("tree_path".into(), ".".into());

    // Declares a parent that the tree does not contain.
    let mut stray = node("Arm", NodeKind::NodeRef, "main.tscn", 9);
    stray.attrs.insert("tree_path".into(), "Body/Arm".into());
    stray.attrs.insert("parent".into(), "Body".into());

    let mut conn = node("pressed -> _on_pressed", NodeKind::SignalConnection, "main.tscn", 12);
    conn.attrs.insert("from_node".into(), ".".into());
    conn.attrs.insert("to_node".into(), ".".into());
    conn.attrs.insert("declared_in_scene".into(), "true".into());

    // Attachment to a script that is not in the graph.
    let mut attach = Edge::new(
        player.id,
        NodeId::placeholder("player.gd"),
        Relation::AttachesTo,
        "script attached to Player",
        Confidence::Ambiguous,
        0,
    );
    attach.metadata.insert(META_UNRESOLVED.into(), "player.gd".into());

    // Handler resolves, but only at Low confidence.
    let handler = node("_on_pressed", NodeKind::Function, "ui.gd", 3);
    let weak_connect = edge(&conn, &handler, Relation::ConnectsTo, Confidence::Low);

    store
        .apply_batch(vec![
            FileDiff::new(
                "main.tscn",
                vec![root, player, stray, conn],
                vec![attach, weak_connect],
            ),
            FileDiff::new("ui.gd", vec![handler], vec![]),
        ])
        .unwrap();

    let report = validate(&store.snapshot());
    let errors: Vec<_> = report.errors().collect();
    let warnings: Vec<_> = report.warnings().collect();

    assert!(errors.iter().any(|f| f.message.contains("attached script")));
    assert!(errors.iter().any(|f| f.message.contains("missing parent")));
    assert!(warnings.iter().any(|f| f.message.contains("signal handler")));
}

#[test]
fn validate_accepts_a_well_formed_scene() {
    let store = GraphStore::new();

    let root = node("main", NodeKind::SceneRoot, "main.tscn", 1);
    let mut player = node("Player", NodeKind::NodeRef, "main.tscn", 5);
    player.attrs.insert("tree_path".into(), ".".into());
    let script = node("player", NodeKind::Module, "player.gd", 1);
    let attach = edge(&player, &script, Relation::AttachesTo, Confidence::High);

    store
        .apply_batch(vec![
            FileDiff::new("main.tscn", vec![root, player], vec![attach]),
            FileDiff::new("player.gd", vec![script], vec![]),
        ])
        .unwrap();

    assert!(validate(&store.snapshot()).findings.is_empty());
}

#[test]
fn usages_groups_incoming_edges_by_relation() {
    let (snap, [_, add_item, items, _]) = inventory_graph();

    let report = usages(&snap, items).unwrap();
    assert_eq!(report.total, 1);
    let writers = report.by_relation.get(&Relation::Writes).unwrap();
    assert_eq!(writers.len(), 1);
    assert_eq!(snap.edge(writers[0]).unwrap().source, add_item);

    assert!(usages(&snap, NodeId(0xBAD)).is_err());
}

#[test]
fn coupling_orders_by_degree() {
    let (snap, [_, add_item, items, _]) = inventory_graph();
    let entries = coupling(&snap, 2);
    assert!(!entries.is_empty());
    // items has one writer and one reader; add_item one caller, one write.
    assert!(entries.iter().any(|e| e.node == items && e.degree() == 2));
    assert!(entries.iter().any(|e| e.node == add_item && e.degree() == 2));
    for pair in entries.windows(2) {
        assert!(pair[0].degree() >= pair[1].degree());
    }
}

#[test]
fn statistics_count_kinds_and_confidence_tiers() {
    let store = GraphStore::new();
    let f = node("f", NodeKind::Function, "a.gd", 1);
    let g = node("g", NodeKind::Function, "a.gd", 5);
    let weak = edge(&f, &g, Relation::Calls, Confidence::Low);
    let mut dangling = Edge::new(
        f.id,
        NodeId::placeholder("ghost"),
        Relation::Calls,
        "line 3",
        Confidence::Ambiguous,
        0,
    );
    dangling.metadata.insert(META_UNRESOLVED.into(), "ghost".into());

    store
        .apply_file_diff(FileDiff::new("a.gd", vec![f, g], vec![weak, dangling]))
        .unwrap();

    let stats = statistics(&store.snapshot());
    assert_eq!(stats.nodes, 3);
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.files, 1);
    assert_eq!(stats.files_by_dialect.get("gdscript"), Some(&1));
    assert_eq!(stats.nodes_by_kind.get("Function"), Some(&2));
    assert_eq!(stats.nodes_by_kind.get("Unresolved"), Some(&1));
    assert_eq!(stats.edges_by_relation.get("Calls"), Some(&2));
    assert_eq!(stats.ambiguous_nodes, 1);
    assert_eq!(stats.low_confidence_edges, 2);
}
