//! gdgraph Watcher — filesystem watching and change coordination

pub mod coordinator;
pub mod watcher;

pub use coordinator::{ChangeCoordinator, CoordinatorHandle, DEFAULT_DEBOUNCE};
pub use watcher::{ChangeEvent, ChangeKind, FileWatcher};
