//! Integration tests for gdgraph
//!
//! These drive the whole pipeline on real files: scan → store → queries.

use std::path::Path;
use std::sync::Arc;

use gdgraph_analysis::{cycles, dead_code, find_path, impact, validate, CycleOptions, EntryPoints, ImpactOptions, PathResult};
use gdgraph_core::{Confidence, EdgeDir, GraphStore, NodeId, NodeKind, Snapshot};
use gdgraph_watcher::{ChangeCoordinator, ChangeKind};
use tempfile::TempDir;

fn write_project(root: &Path) {
    std::fs::write(
        root.join("player.gd"),
        r#"extends Node

func pickup(item):
	add_item(item)
"#,
    )
    .unwrap();
    std::fs::write(
        root.join("inventory.gd"),
        r#"class_name Inventory

var items = []

func add_item(item):
	items = items + [item]

func save():
	return items

func never_called():
	pass
"#,
    )
    .unwrap();
}

fn scan(root: &Path) -> (ChangeCoordinator, Snapshot) {
    let coordinator = ChangeCoordinator::new(root, Arc::new(GraphStore::new())).unwrap();
    coordinator.scan().unwrap();
    let snapshot = coordinator.store().snapshot();
    (coordinator, snapshot)
}

fn function_named(snapshot: &Snapshot, name: &str) -> NodeId {
    snapshot
        .nodes_named(name)
        .into_iter()
        .find(|id| {
            let node = snapshot.node(*id).unwrap();
            node.kind == NodeKind::Function || node.kind == NodeKind::Variable
        })
        .unwrap_or_else(|| panic!("no node named {name}"))
}

/// The flagship flow: pickup calls add_item, add_item writes items,
/// items is read by save. The path query walks all of it at High
/// confidence.
#[test]
fn pickup_to_save_path_is_high_confidence() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    let (_c, snap) = scan(dir.path());

    let pickup = function_named(&snap, "pickup");
    let add_item = function_named(&snap, "add_item");
    let items = function_named(&snap, "items");
    let save = function_named(&snap, "save");

    let PathResult::Found(path) = find_path(&snap, pickup, save, 10).unwrap() else {
        panic!("expected pickup → save to be reachable");
    };
    assert_eq!(path.nodes, vec![pickup, add_item, items, save]);
    assert_eq!(path.hops, 3);
    assert_eq!(path.weakest, Confidence::High);
    for edge_id in &path.edges {
        assert_eq!(snap.edge(*edge_id).unwrap().confidence, Confidence::High);
    }
}

#[test]
fn path_agrees_with_impact_at_every_bound() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    let (_c, snap) = scan(dir.path());

    let all: Vec<NodeId> = snap.all_nodes().map(|n| n.id).collect();
    for h in 1..=4 {
        for &from in &all {
            let forward = impact(
                &snap,
                from,
                EdgeDir::Outgoing,
                ImpactOptions { depth: h, max_results: 10_000 },
            )
            .unwrap();
            for &to in &all {
                if from == to {
                    continue;
                }
                let found =
                    matches!(find_path(&snap, from, to, h).unwrap(), PathResult::Found(_));
                let reached = forward.entries.iter().any(|e| e.node == to);
                assert_eq!(found, reached, "disagreement for {from:?} → {to:?} at h={h}");
            }
        }
    }
}

#[test]
fn dead_code_spares_the_reachable_chain() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    let (_c, snap) = scan(dir.path());

    let entries = EntryPoints {
        lifecycle_names: EntryPoints::default().lifecycle_names,
        entry_files: vec!["player.gd".to_string()],
    };
    let report = dead_code(&snap, &entries);

    for name in ["add_item", "items", "save"] {
        let id = function_named(&snap, name);
        assert!(!report.candidates.contains(&id), "{name} is reachable, not dead");
    }
    let orphan = function_named(&snap, "never_called");
    assert!(report.candidates.contains(&orphan));
}

#[test]
fn graph_stays_acyclic_until_a_cycle_is_written() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    let (coordinator, snap) = scan(dir.path());
    assert!(cycles(&snap, CycleOptions::default()).cycles.is_empty());

    // save now calls pickup, closing pickup → add_item → items → save →
    // pickup.
    std::fs::write(
        dir.path().join("inventory.gd"),
        r#"class_name Inventory

var items = []

func add_item(item):
	items = items + [item]

func save():
	pickup(items)
"#,
    )
    .unwrap();
    coordinator
        .process_changes(vec![(dir.path().join("inventory.gd"), ChangeKind::Modified)])
        .unwrap();

    let snap = coordinator.store().snapshot();
    let report = cycles(&snap, CycleOptions::default());
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].nodes.len(), 4);
}

#[test]
fn scene_validation_spots_a_dangling_attachment() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    std::fs::write(
        dir.path().join("main.tscn"),
        r#"[gd_scene load_steps=2 format=3]

[ext_resource type="Script" path="res://missing.gd" id="1_a"]

[node name="Root" type="Node"]
script = ExtResource("1_a")
"#,
    )
    .unwrap();
    let (_c, snap) = scan(dir.path());

    let report = validate(&snap);
    assert!(report.errors().any(|f| f.message.contains("attached script")));
}

#[test]
fn editing_and_deleting_files_keeps_queries_coherent() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    let (coordinator, _snap) = scan(dir.path());

    // Deleting the inventory redirects pickup's call to a placeholder...
    std::fs::remove_file(dir.path().join("inventory.gd")).unwrap();
    coordinator
        .process_changes(vec![(dir.path().join("inventory.gd"), ChangeKind::Deleted)])
        .unwrap();
    let snap = coordinator.store().snapshot();
    let pickup = function_named(&snap, "pickup");
    let calls = snap.neighbors(pickup, EdgeDir::Outgoing, None);
    assert!(calls.iter().any(|e| snap.node(e.target).unwrap().is_synthetic()));

    // ...and restoring it heals the reference without a full rebuild.
    write_project(dir.path());
    coordinator
        .process_changes(vec![(dir.path().join("inventory.gd"), ChangeKind::Created)])
        .unwrap();
    let snap = coordinator.store().snapshot();
    let save = function_named(&snap, "save");
    assert!(matches!(
        find_path(&snap, pickup, save, 10).unwrap(),
        PathResult::Found(_)
    ));
}
