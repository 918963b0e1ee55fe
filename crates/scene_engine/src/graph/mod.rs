//! Scene dependency graph and incremental evaluation engine
//!
//! After any edit (property change, reparent, node creation or deletion,
//! undo, redo) this subsystem decides exactly which nodes must recompute
//! derived state and in what order, without redundant work and without
//! stale results reaching rendering or picking.
//!
//! The graph tracks, per node, who must evaluate before it (`ancestors`)
//! and after it (`descendants`), keeps all live nodes classified into
//! source/interior/sink partitions, and evaluates only the dirty frontier
//! in dependency order. Subtree detach/reattach ([`DependencyGraph::prune`]
//! / [`DependencyGraph::insert`]) touches only boundary edges, which is
//! what makes undo of structural edits exact and cheap.

pub mod node;
pub mod error;
pub mod report;
mod graph;
mod surgery;

pub use error::GraphError;
pub use graph::{DependencyGraph, Partition};
pub use node::{Direction, EvalState, GraphNode, NodeKey};
pub use report::{EvalReport, EvaluationListener};
