//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gdgraph_analysis::{CycleOptions, EntryPoints, ImpactOptions};
use gdgraph_core::{EdgeDir, GraphStore, NodeId, Snapshot};
use gdgraph_watcher::{ChangeCoordinator, FileWatcher};

/// Scan the project into a fresh store and hand back a snapshot.
fn build_snapshot(root: PathBuf) -> Result<Snapshot> {
    let store = Arc::new(GraphStore::new());
    let coordinator = ChangeCoordinator::new(root, Arc::clone(&store))?;
    let summary = coordinator.scan()?;
    tracing::info!(
        nodes = store.snapshot().node_count(),
        edges = store.snapshot().edge_count(),
        files = summary.files,
        "index complete"
    );
    Ok(store.snapshot())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn index(root: PathBuf) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    print_json(&gdgraph_analysis::statistics(&snapshot))
}

pub async fn watch(root: PathBuf) -> Result<()> {
    let store = Arc::new(GraphStore::new());
    let coordinator = ChangeCoordinator::new(root.clone(), Arc::clone(&store))?;
    coordinator.scan()?;
    tracing::info!(
        nodes = store.snapshot().node_count(),
        edges = store.snapshot().edge_count(),
        "initial index complete, watching for changes"
    );

    let _watcher = FileWatcher::new(&root, coordinator.handle())?;
    coordinator.run().await;
    Ok(())
}

pub fn extract(file: PathBuf) -> Result<()> {
    let dialect = gdgraph_extract::dialect_for(&file)
        .with_context(|| format!("no dialect handles {}", file.display()))?;
    let content = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let extraction = gdgraph_extract::extract_bytes(dialect, &file, &content);
    print_json(&extraction)
}

pub fn find(root: PathBuf, name: String) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let records: Vec<_> = snapshot
        .nodes_named(&name)
        .into_iter()
        .filter_map(|id| snapshot.node(id).cloned())
        .collect();
    print_json(&records)
}

pub fn path(root: PathBuf, from: u64, to: u64, max_hops: usize) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let result = gdgraph_analysis::find_path(&snapshot, NodeId(from), NodeId(to), max_hops)
        .context("path query failed")?;
    print_json(&result)
}

pub fn impact(root: PathBuf, node: u64, forward: bool, depth: usize, max_results: usize) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let direction = if forward { EdgeDir::Outgoing } else { EdgeDir::Incoming };
    let report = gdgraph_analysis::impact(
        &snapshot,
        NodeId(node),
        direction,
        ImpactOptions { depth, max_results },
    )
    .context("impact query failed")?;
    print_json(&report)
}

pub fn dead_code(root: PathBuf) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let report = gdgraph_analysis::dead_code(&snapshot, &EntryPoints::default());
    print_json(&report)
}

pub fn cycles(root: PathBuf, max_length: usize, max_cycles: usize) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let report = gdgraph_analysis::cycles(&snapshot, CycleOptions { max_length, max_cycles });
    print_json(&report)
}

pub fn validate(root: PathBuf) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    print_json(&gdgraph_analysis::validate(&snapshot))
}

pub fn stats(root: PathBuf) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    print_json(&gdgraph_analysis::statistics(&snapshot))
}

pub fn usages(root: PathBuf, node: u64) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    let report =
        gdgraph_analysis::usages(&snapshot, NodeId(node)).context("usage query failed")?;
    print_json(&report)
}

pub fn coupling(root: PathBuf, min_degree: usize) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    print_json(&gdgraph_analysis::coupling(&snapshot, min_degree))
}

pub fn node(root: PathBuf, id: u64) -> Result<()> {
    let snapshot = build_snapshot(root)?;
    match snapshot.record(NodeId(id)) {
        Some(record) => print_json(&record),
        None => {
            println!("no node with id {id}");
            Ok(())
        }
    }
}
