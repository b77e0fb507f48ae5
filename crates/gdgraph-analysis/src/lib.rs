//! gdgraph Analysis — pure, read-only queries over a graph snapshot
//!
//! Every operation takes a snapshot captured by the caller and never
//! mutates it; traversal bounds are enforced inside the walks, so a
//! pathological graph costs a truncated result, not a hang.

pub mod cycles;
pub mod deadcode;
pub mod impact;
pub mod paths;
pub mod report;
pub mod validate;

#[cfg(test)]
pub mod tests;

use gdgraph_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
}

pub use cycles::{cycles, Cycle, CycleOptions, CycleReport};
pub use deadcode::{dead_code, DeadCodeReport, EntryPoints};
pub use impact::{impact, ImpactEntry, ImpactOptions, ImpactReport};
pub use paths::{find_path, FoundPath, PathResult};
pub use report::{coupling, statistics, usages, CouplingEntry, GraphStats, UsageReport};
pub use validate::{validate, Finding, Severity, ValidationReport};
