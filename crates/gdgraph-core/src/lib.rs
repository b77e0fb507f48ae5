//! gdgraph Core — graph data model, indexed store, and diff commits

pub mod diff;
pub mod model;
pub mod store;


pub use diff::{CommitSummary, FileDiff};
pub use model::{
    Confidence, Dialect, Edge, EdgeId, Node, NodeId, NodeKind, Origin, Relation, META_CANDIDATES,
    META_UNRESOLVED,
};
pub use store::{EdgeDir, GraphStore, NodeRecord, Snapshot, StoreError};
