//! Filesystem watcher: notify events mapped to typed change events

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::coordinator::CoordinatorHandle;

/// The change vocabulary of the coordinator's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Watches a project root and forwards relevant file events into a
/// change coordinator. The watch loop is independent of query serving;
/// it only ever enqueues.
pub struct FileWatcher {
    // Dropping the watcher stops the native watch, so it is held here.
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn new(root: impl AsRef<Path>, handle: CoordinatorHandle) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => forward_event(event, &handle),
                    Err(e) => error!("filesystem watch error: {e}"),
                }
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        debug!("watching project root: {}", root.display());
        Ok(Self { _watcher: watcher, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn forward_event(event: notify::Event, handle: &CoordinatorHandle) {
    match event.kind {
        EventKind::Create(_) => {
            for path in event.paths {
                forward(handle, path, ChangeKind::Created);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // The backend reported both ends of the rename: old path is a
            // delete, new path a create.
            let mut paths = event.paths.into_iter();
            if let Some(old) = paths.next() {
                forward(handle, old, ChangeKind::Deleted);
            }
            if let Some(new) = paths.next() {
                forward(handle, new, ChangeKind::Created);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Single-path rename reports collapse to a re-check of the
            // reported path.
            for path in event.paths {
                forward(handle, path, ChangeKind::Renamed);
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                forward(handle, path, ChangeKind::Modified);
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                forward(handle, path, ChangeKind::Deleted);
            }
        }
        _ => {}
    }
}

fn forward(handle: &CoordinatorHandle, path: PathBuf, kind: ChangeKind) {
    if should_ignore_path(&path) || gdgraph_extract::dialect_for(&path).is_none() {
        return;
    }
    if let Err(e) = handle.change(path, kind) {
        warn!("failed to enqueue change event: {e}");
    }
}

/// Directories that never contribute graph state.
pub fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component.as_os_str().to_str(),
            Some(".git") | Some(".godot") | Some("node_modules") | Some("build") | Some("addons")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_generated_and_vendored_paths() {
        assert!(should_ignore_path(Path::new(".godot/imported/x.gd")));
        assert!(should_ignore_path(Path::new("game/addons/tool/plugin.gd")));
        assert!(should_ignore_path(Path::new(".git/objects/ab")));
        assert!(!should_ignore_path(Path::new("scripts/player.gd")));
    }
}
