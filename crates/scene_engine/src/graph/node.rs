//! Graph node bookkeeping
//!
//! Defines the per-node relation record the dependency graph keeps for
//! every scene node: who must evaluate before it, who must evaluate after
//! it, its per-direction evaluation state, and its traversal stamp.
//!
//! Edge sets hold copyable [`NodeKey`] handles rather than references, so
//! the sets can never extend a node's lifetime; the scene's node table is
//! the only owner.

use std::collections::HashSet;

slotmap::new_key_type! {
    /// Stable handle identifying a scene node
    ///
    /// Minted by the scene's node table; the graph stores only these keys.
    pub struct NodeKey;
}

/// Direction of an evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ancestor-to-descendant flow (e.g. world transforms)
    Downstream = 0,
    /// Descendant-to-ancestor flow (e.g. bounds aggregation)
    Upstream = 1,
}

impl Direction {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Per-direction evaluation state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalState {
    /// Derived state is up to date
    Clean,
    /// Derived state needs recomputation
    Dirty,
    /// Recomputation in progress (recursion guard)
    Evaluating,
}

/// Relation record for one node in the dependency graph
#[derive(Debug)]
pub struct GraphNode {
    /// Nodes that must be evaluated before this one (this node depends on them)
    ancestors: HashSet<NodeKey>,

    /// Nodes that must be evaluated after this one (they depend on this node)
    descendants: HashSet<NodeKey>,

    /// Evaluation state, tracked independently per direction
    state: [EvalState; 2],

    /// Last traversal this node was visited in
    stamp: u32,

    /// Whether the node is currently inserted in the graph's classification
    ///
    /// Pruned subtrees keep their records (including edge sets, so
    /// reattachment is exact) but are not live and are never evaluated.
    live: bool,
}

impl Default for GraphNode {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphNode {
    /// Create a fresh, not-yet-inserted record
    pub fn new() -> Self {
        Self {
            ancestors: HashSet::new(),
            descendants: HashSet::new(),
            state: [EvalState::Dirty; 2],
            stamp: 0,
            live: false,
        }
    }

    /// Nodes that must be evaluated before this one
    pub fn ancestors(&self) -> &HashSet<NodeKey> {
        &self.ancestors
    }

    /// Nodes that must be evaluated after this one
    pub fn descendants(&self) -> &HashSet<NodeKey> {
        &self.descendants
    }

    /// Get the evaluation state for a direction
    pub fn state(&self, direction: Direction) -> EvalState {
        self.state[direction.index()]
    }

    /// Whether the node is currently inserted in the graph
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub(crate) fn set_state(&mut self, direction: Direction, state: EvalState) {
        self.state[direction.index()] = state;
    }

    pub(crate) fn stamp(&self) -> u32 {
        self.stamp
    }

    pub(crate) fn set_stamp(&mut self, stamp: u32) {
        self.stamp = stamp;
    }

    pub(crate) fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    // Raw set mutation is crate-internal: everything outside the graph
    // module goes through the paired connect/disconnect entry points,
    // which keep the two sets mutually consistent.

    pub(crate) fn ancestors_mut(&mut self) -> &mut HashSet<NodeKey> {
        &mut self.ancestors
    }

    pub(crate) fn descendants_mut(&mut self) -> &mut HashSet<NodeKey> {
        &mut self.descendants
    }
}
