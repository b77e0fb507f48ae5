//! Change coordinator: debounced, batched, minimal graph updates
//!
//! The coordinator is the graph store's sole writer. Events coalesce for
//! a debounce window and are committed as one batch, so readers never
//! observe half of a multi-file change. Extraction runs in parallel;
//! commits are serialized by construction (one event loop).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use gdgraph_core::{CommitSummary, FileDiff, GraphStore};
use gdgraph_extract::normalize::{normalize_decls, resolve_refs, DeclIndex, FileDecls};
use gdgraph_extract::Extraction;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::watcher::{should_ignore_path, ChangeEvent, ChangeKind};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cloneable entry point for pushing change notifications into the
/// coordinator, used by the file watcher and by external callers.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<ChangeEvent>,
    degraded: Arc<Mutex<HashSet<PathBuf>>>,
}

impl CoordinatorHandle {
    /// Report a file change. `path` may be absolute or project-relative.
    pub fn change(&self, path: impl Into<PathBuf>, kind: ChangeKind) -> Result<()> {
        self.tx
            .send(ChangeEvent { path: path.into(), kind })
            .context("coordinator event loop is gone")
    }

    /// Files whose last extraction could not tokenize their content.
    pub fn degraded_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = lock(&self.degraded).iter().cloned().collect();
        files.sort();
        files
    }
}

/// The extract → normalize → commit pipeline, shared by the initial scan
/// and the event loop.
struct Pipeline {
    root: PathBuf,
    store: Arc<GraphStore>,
    degraded: Arc<Mutex<HashSet<PathBuf>>>,
    excludes: GlobSet,
}

pub struct ChangeCoordinator {
    pipeline: Pipeline,
    debounce: Duration,
    tx: mpsc::UnboundedSender<ChangeEvent>,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeCoordinator {
    pub fn new(root: impl Into<PathBuf>, store: Arc<GraphStore>) -> Result<Self> {
        Self::with_debounce(root, store, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        root: impl Into<PathBuf>,
        store: Arc<GraphStore>,
        debounce: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut excludes = GlobSetBuilder::new();
        for pattern in
            ["**/.godot/**", "**/.git/**", "**/node_modules/**", "**/build/**", "**/addons/**"]
        {
            excludes.add(Glob::new(pattern)?);
        }
        Ok(ChangeCoordinator {
            pipeline: Pipeline {
                root: root.into(),
                store,
                degraded: Arc::new(Mutex::new(HashSet::new())),
                excludes: excludes.build()?,
            },
            debounce,
            tx,
            rx,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            tx: self.tx.clone(),
            degraded: Arc::clone(&self.pipeline.degraded),
        }
    }

    pub fn store(&self) -> Arc<GraphStore> {
        Arc::clone(&self.pipeline.store)
    }

    /// Full project scan, committed as a single batch.
    pub fn scan(&self) -> Result<CommitSummary> {
        self.pipeline.scan()
    }

    /// Apply a set of changes immediately, without debouncing.
    pub fn process_changes(&self, changes: Vec<(PathBuf, ChangeKind)>) -> Result<CommitSummary> {
        self.pipeline.process_changes(changes)
    }

    /// Debounce-and-commit event loop. Runs until every handle is
    /// dropped and the queue drains.
    pub async fn run(self) {
        let ChangeCoordinator { pipeline, debounce, tx, mut rx } = self;
        // Only external handles keep the queue open.
        drop(tx);

        let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => {
                        // Later events for the same path supersede
                        // earlier ones within the window.
                        pending.insert(event.path, event.kind);
                    }
                    None => break,
                },
                // Re-armed by every event: the batch commits once the
                // window goes quiet.
                _ = sleep(debounce), if !pending.is_empty() => {
                    let batch: Vec<(PathBuf, ChangeKind)> = pending.drain().collect();
                    if let Err(e) = pipeline.process_changes(batch) {
                        warn!("batch commit failed, graph keeps prior state: {e:#}");
                    }
                }
            }
        }
        if !pending.is_empty() {
            let batch: Vec<(PathBuf, ChangeKind)> = pending.drain().collect();
            if let Err(e) = pipeline.process_changes(batch) {
                warn!("final batch commit failed: {e:#}");
            }
        }
    }
}

enum Outcome {
    Extracted(PathBuf, Extraction, FileDecls),
    Remove(PathBuf),
    Retry,
}

impl Pipeline {
    fn scan(&self) -> Result<CommitSummary> {
        let mut changes = Vec::new();
        let walker = WalkBuilder::new(&self.root).hidden(true).build();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("scan: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file())
                || self.excludes.is_match(path)
                || should_ignore_path(path)
                || gdgraph_extract::dialect_for(path).is_none()
            {
                continue;
            }
            changes.push((path.to_path_buf(), ChangeKind::Created));
        }
        info!("scanning {} source files under {}", changes.len(), self.root.display());
        self.process_changes(changes)
    }

    /// Extract, normalize, and commit one batch of changed paths.
    fn process_changes(&self, changes: Vec<(PathBuf, ChangeKind)>) -> Result<CommitSummary> {
        // Coalesce per project-relative path.
        let mut by_path: HashMap<PathBuf, ChangeKind> = HashMap::new();
        for (path, kind) in changes {
            let absolute = if path.is_absolute() { path } else { self.root.join(path) };
            let relative = absolute.strip_prefix(&self.root).unwrap_or(&absolute).to_path_buf();
            by_path.insert(relative, kind);
        }

        // Extraction is a pure function of file content; independent
        // files run in parallel.
        let outcomes: Vec<Outcome> = by_path
            .into_par_iter()
            .map(|(relative, kind)| {
                let absolute = self.root.join(&relative);
                let Some(dialect) = gdgraph_extract::dialect_for(&relative) else {
                    return Outcome::Retry;
                };
                if kind == ChangeKind::Deleted || !absolute.exists() {
                    return Outcome::Remove(relative);
                }
                match std::fs::read(&absolute) {
                    Ok(bytes) => {
                        let extraction = gdgraph_extract::extract_bytes(dialect, &relative, &bytes);
                        let decls = normalize_decls(&relative, dialect, &extraction);
                        Outcome::Extracted(relative, extraction, decls)
                    }
                    Err(e) => {
                        // Unreadable right now; keep prior graph state
                        // and pick it up on the next event.
                        warn!("cannot read {}: {e}", absolute.display());
                        Outcome::Retry
                    }
                }
            })
            .collect();

        let mut skip: HashSet<PathBuf> = HashSet::new();
        let mut extracted: Vec<(PathBuf, Extraction, FileDecls)> = Vec::new();
        let mut diffs: Vec<FileDiff> = Vec::new();

        for outcome in outcomes {
            match outcome {
                Outcome::Extracted(path, extraction, decls) => {
                    skip.insert(path.clone());
                    if extraction.partial {
                        // Untokenizable content: drop the file's prior
                        // contribution rather than serving stale state.
                        warn!("{} is degraded: {:?}", path.display(), extraction.issues);
                        lock(&self.degraded).insert(path.clone());
                        diffs.push(FileDiff::removal(path));
                    } else {
                        if !extraction.issues.is_empty() {
                            debug!(
                                "{}: {} parse issue(s), extraction continued",
                                path.display(),
                                extraction.issues.len()
                            );
                        }
                        lock(&self.degraded).remove(&path);
                        extracted.push((path, extraction, decls));
                    }
                }
                Outcome::Remove(path) => {
                    skip.insert(path.clone());
                    lock(&self.degraded).remove(&path);
                    diffs.push(FileDiff::removal(path));
                }
                Outcome::Retry => {}
            }
        }

        // Resolve references against the surviving graph plus the whole
        // in-flight batch, then commit everything at once.
        let snapshot = self.store.snapshot();
        let index = DeclIndex::new();
        index.add_snapshot(&snapshot, &skip);
        for (_, _, decls) in &extracted {
            index.add_file(decls);
        }

        diffs.par_extend(extracted.into_par_iter().map(|(path, extraction, mut decls)| {
            let edges = resolve_refs(&mut decls, &extraction, &index);
            FileDiff::new(path, decls.nodes, edges)
        }));

        if diffs.is_empty() {
            return Ok(CommitSummary::default());
        }
        let summary = self.store.apply_batch(diffs).context("commit failed")?;
        info!(
            sequence = summary.sequence,
            files = summary.files,
            added_nodes = summary.added_nodes,
            removed_nodes = summary.removed_nodes,
            "graph updated"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdgraph_core::{Confidence, EdgeDir, NodeId, NodeKind, Relation};
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::time::{sleep, Duration};

    fn write_fixture(root: &Path) {
        std::fs::create_dir_all(root.join("backend")).unwrap();
        std::fs::write(
            root.join("inventory.gd"),
            "class_name Inventory\n\nvar items = []\n\nfunc add_item(item):\n\titems.append(item)\n\nfunc save():\n\treturn items\n",
        )
        .unwrap();
        std::fs::write(
            root.join("player.gd"),
            "extends Node\n\nfunc pickup(item):\n\tadd_item(item)\n\tCloudScript.execute(\"AddItem\", {})\n",
        )
        .unwrap();
        std::fs::write(
            root.join("main.tscn"),
            "[gd_scene load_steps=2 format=3]\n\n[ext_resource type=\"Script\" path=\"res://player.gd\" id=\"1_a\"]\n\n[node name=\"Player\" type=\"Node\"]\nscript = ExtResource(\"1_a\")\n",
        )
        .unwrap();
        std::fs::write(
            root.join("backend/items.js"),
            "handlers.AddItem = function (args) {\n    return true;\n};\n",
        )
        .unwrap();
    }

    fn new_coordinator(root: &Path) -> ChangeCoordinator {
        ChangeCoordinator::new(root, Arc::new(GraphStore::new())).unwrap()
    }

    fn node_named(snapshot: &gdgraph_core::Snapshot, name: &str) -> NodeId {
        snapshot.nodes_named(name)[0]
    }

    #[test]
    fn scan_builds_a_cross_file_graph_in_one_commit() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());

        let coordinator = new_coordinator(dir.path());
        let summary = coordinator.scan().unwrap();
        assert_eq!(summary.sequence, 1);
        assert_eq!(summary.files, 4);

        let snap = coordinator.store().snapshot();

        // pickup's bare call resolves across files to add_item.
        let pickup = node_named(&snap, "pickup");
        let add_item = snap
            .nodes_named("add_item")
            .into_iter()
            .find(|id| snap.node(*id).unwrap().kind == NodeKind::Function)
            .unwrap();
        assert!(snap
            .neighbors(pickup, EdgeDir::Outgoing, Some(Relation::Calls))
            .iter()
            .any(|e| e.target == add_item));

        // The scene's attachment resolves to player.gd's module node.
        let scene_nodes = snap.nodes_in_file(Path::new("main.tscn"));
        let attach = scene_nodes
            .iter()
            .flat_map(|id| snap.neighbors(*id, EdgeDir::Outgoing, Some(Relation::AttachesTo)))
            .next()
            .unwrap();
        assert_eq!(snap.node(attach.target).unwrap().origin.file, Path::new("player.gd"));
        assert_eq!(attach.confidence, Confidence::High);

        // The outbound service call bridges to the backend handler.
        let api = snap.nodes_of_kind(NodeKind::ApiCall)[0];
        let bridge = snap.neighbors(api, EdgeDir::Outgoing, Some(Relation::DataFlow));
        assert_eq!(bridge.len(), 1);
        assert_eq!(
            snap.node(bridge[0].target).unwrap().origin.file,
            Path::new("backend/items.js")
        );
    }

    #[test]
    fn incremental_update_matches_full_rebuild() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());

        let coordinator = new_coordinator(dir.path());
        coordinator.scan().unwrap();

        // Change one file, then apply just that change.
        std::fs::write(
            dir.path().join("player.gd"),
            "extends Node\n\nfunc pickup(item):\n\tadd_item(item)\n\nfunc drop(item):\n\tsave()\n",
        )
        .unwrap();
        coordinator
            .process_changes(vec![(dir.path().join("player.gd"), ChangeKind::Modified)])
            .unwrap();
        let incremental = coordinator.store().snapshot();

        // A cold rebuild of the same final state must agree.
        let fresh = new_coordinator(dir.path());
        fresh.scan().unwrap();
        let rebuilt = fresh.store().snapshot();

        let mut a: Vec<NodeId> = incremental.all_nodes().map(|n| n.id).collect();
        let mut b: Vec<NodeId> = rebuilt.all_nodes().map(|n| n.id).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);

        let mut ea: Vec<_> = incremental.all_edges().map(|e| (e.id, e.source, e.target)).collect();
        let mut eb: Vec<_> = rebuilt.all_edges().map(|e| (e.id, e.source, e.target)).collect();
        ea.sort();
        eb.sort();
        assert_eq!(ea, eb);
    }

    #[test]
    fn deleting_a_file_redirects_cross_file_references() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());

        let coordinator = new_coordinator(dir.path());
        coordinator.scan().unwrap();

        std::fs::remove_file(dir.path().join("inventory.gd")).unwrap();
        let summary = coordinator
            .process_changes(vec![(dir.path().join("inventory.gd"), ChangeKind::Deleted)])
            .unwrap();
        assert!(summary.removed_nodes > 0);

        let snap = coordinator.store().snapshot();
        assert!(snap.nodes_in_file(Path::new("inventory.gd")).is_empty());

        let pickup = node_named(&snap, "pickup");
        let calls = snap.neighbors(pickup, EdgeDir::Outgoing, Some(Relation::Calls));
        let dangling = calls.iter().find(|e| e.context.contains("add_item")).unwrap();
        assert_eq!(dangling.confidence, Confidence::Ambiguous);
        assert!(snap.node(dangling.target).unwrap().is_synthetic());
    }

    #[test]
    fn untokenizable_content_degrades_the_file() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());

        let coordinator = new_coordinator(dir.path());
        coordinator.scan().unwrap();
        assert!(!coordinator.store().snapshot().nodes_in_file(Path::new("player.gd")).is_empty());

        std::fs::write(dir.path().join("player.gd"), [0xFFu8, 0xFE, 0x00, 0x01]).unwrap();
        coordinator
            .process_changes(vec![(dir.path().join("player.gd"), ChangeKind::Modified)])
            .unwrap();

        // Prior state is removed, not stale, and the file is flagged.
        let snap = coordinator.store().snapshot();
        assert!(snap.nodes_in_file(Path::new("player.gd")).is_empty());
        assert_eq!(coordinator.handle().degraded_files(), vec![PathBuf::from("player.gd")]);

        // A later good version clears the flag.
        std::fs::write(dir.path().join("player.gd"), "func pickup():\n\tpass\n").unwrap();
        coordinator
            .process_changes(vec![(dir.path().join("player.gd"), ChangeKind::Modified)])
            .unwrap();
        assert!(coordinator.handle().degraded_files().is_empty());
    }

    #[tokio::test]
    async fn burst_of_events_commits_as_one_batch() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());

        let coordinator =
            ChangeCoordinator::with_debounce(dir.path(), Arc::new(GraphStore::new()), Duration::from_millis(50))
                .unwrap();
        let store = coordinator.store();
        let handle = coordinator.handle();
        let task = tokio::spawn(coordinator.run());

        // A burst touching several files within the window.
        handle.change("player.gd", ChangeKind::Created).unwrap();
        handle.change("inventory.gd", ChangeKind::Created).unwrap();
        handle.change("player.gd", ChangeKind::Modified).unwrap();
        handle.change("backend/items.js", ChangeKind::Created).unwrap();

        sleep(Duration::from_millis(500)).await;

        let snap = store.snapshot();
        assert_eq!(snap.sequence(), 1, "burst must land as a single commit");
        assert!(!snap.nodes_named("pickup").is_empty());
        assert!(!snap.nodes_named("add_item").is_empty());

        drop(handle);
        task.await.unwrap();
    }
}

