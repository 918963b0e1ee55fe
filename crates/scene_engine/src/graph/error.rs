//! Dependency graph errors

use super::node::NodeKey;

/// Errors reported by dependency graph operations
///
/// Benign repeat requests (connecting an edge that already exists,
/// removing one that does not) are not errors; those operations report
/// "already in desired state" through their return value. These variants
/// are reserved for states that indicate a real caller bug.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphError {
    /// The key has no record in this graph
    #[error("node {0:?} is not registered in this graph")]
    UnknownNode(NodeKey),

    /// A node cannot depend on itself
    #[error("node {0:?} cannot depend on itself")]
    SelfDependency(NodeKey),

    /// The requested edge would close a dependency cycle
    #[error("dependency edge {node:?} -> {ancestor:?} would create a cycle")]
    WouldCycle {
        /// The node that would gain the ancestor
        node: NodeKey,
        /// The requested ancestor
        ancestor: NodeKey,
    },

    /// Evaluation re-entered a node already being evaluated
    #[error("dependency cycle detected at node {0:?} during evaluation")]
    CycleDetected(NodeKey),
}
