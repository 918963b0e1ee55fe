//! Dependency graph core
//!
//! Owns the relation records for every scene node, the three
//! classification partitions (sources, interior, sinks), the traversal
//! stamp allocator, and the incremental evaluation driver.
//!
//! The graph never interprets what evaluation means: callers hand
//! `evaluate` a visitor that performs the per-node work, and the graph
//! guarantees only when and in what order it is invoked.

use std::collections::HashSet;

use log::{debug, trace, warn};
use slotmap::SecondaryMap;

use crate::config::CyclePolicy;
use crate::foundation::time::Stopwatch;

use super::error::GraphError;
use super::node::{Direction, EvalState, GraphNode, NodeKey};
use super::report::EvalReport;

/// Which classification partition a live node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// No ancestors, evaluation inputs for the downstream pass
    Source,
    /// Both ancestors and descendants
    Interior,
    /// No descendants, roots of the downstream pass
    Sink,
}

/// The scene's dependency graph
///
/// One instance per scene. Every mutation entry point and the evaluation
/// driver run on the editor's single main-loop thread; structural edits
/// and evaluation are never interleaved.
pub struct DependencyGraph {
    /// Relation record per node, keyed by the scene table's keys
    ///
    /// Records exist for every registered node, live or detached; the
    /// scene's node table alone owns node lifetime.
    records: SecondaryMap<NodeKey, GraphNode>,

    /// Live nodes with no ancestors
    sources: HashSet<NodeKey>,

    /// Live nodes with both ancestors and descendants
    interior: HashSet<NodeKey>,

    /// Live nodes with no descendants
    sinks: HashSet<NodeKey>,

    /// Next traversal stamp to hand out
    next_stamp: u32,

    /// Where dependency cycles are reported
    cycle_policy: CyclePolicy,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Create an empty graph with the default cycle policy
    pub fn new() -> Self {
        Self::with_cycle_policy(CyclePolicy::default())
    }

    /// Create an empty graph with an explicit cycle policy
    pub fn with_cycle_policy(cycle_policy: CyclePolicy) -> Self {
        Self {
            records: SecondaryMap::new(),
            sources: HashSet::new(),
            interior: HashSet::new(),
            sinks: HashSet::new(),
            next_stamp: 1,
            cycle_policy,
        }
    }

    /// The configured cycle policy
    pub fn cycle_policy(&self) -> CyclePolicy {
        self.cycle_policy
    }

    // ------------------------------------------------------------------
    // Record lifecycle
    // ------------------------------------------------------------------

    /// Create a relation record for a node minted by the scene table
    ///
    /// Must be called once per node before any edge or insertion touches
    /// it. Registering an already-registered key is a no-op.
    pub fn register(&mut self, key: NodeKey) {
        if self.records.contains_key(key) {
            warn!("node {key:?} registered twice");
            return;
        }
        self.records.insert(key, GraphNode::new());
    }

    /// Drop a node's relation record entirely
    ///
    /// The caller is responsible for detaching edges first; a record that
    /// still appears in other nodes' edge sets is a caller bug.
    pub fn forget(&mut self, key: NodeKey) {
        self.detach_from_partitions(key);
        self.records.remove(key);
    }

    /// Whether a record exists for this key
    pub fn contains(&self, key: NodeKey) -> bool {
        self.records.contains_key(key)
    }

    /// Read access to a node's relation record
    pub fn node(&self, key: NodeKey) -> Option<&GraphNode> {
        self.records.get(key)
    }

    pub(crate) fn record(&self, key: NodeKey) -> Result<&GraphNode, GraphError> {
        self.records.get(key).ok_or(GraphError::UnknownNode(key))
    }

    pub(crate) fn record_mut(&mut self, key: NodeKey) -> Result<&mut GraphNode, GraphError> {
        self.records.get_mut(key).ok_or(GraphError::UnknownNode(key))
    }

    pub(crate) fn try_record_mut(&mut self, key: NodeKey) -> Option<&mut GraphNode> {
        self.records.get_mut(key)
    }

    // ------------------------------------------------------------------
    // Classification & traversal bookkeeping
    // ------------------------------------------------------------------

    /// Live nodes with no ancestors
    pub fn sources(&self) -> &HashSet<NodeKey> {
        &self.sources
    }

    /// Live nodes with both ancestors and descendants
    pub fn interior(&self) -> &HashSet<NodeKey> {
        &self.interior
    }

    /// Live nodes with no descendants
    pub fn sinks(&self) -> &HashSet<NodeKey> {
        &self.sinks
    }

    /// Number of live (inserted) nodes
    pub fn live_count(&self) -> usize {
        self.sources.len() + self.interior.len() + self.sinks.len()
    }

    /// The partition currently holding a node, if it is live
    pub fn partition_of(&self, key: NodeKey) -> Option<Partition> {
        if self.sources.contains(&key) {
            Some(Partition::Source)
        } else if self.interior.contains(&key) {
            Some(Partition::Interior)
        } else if self.sinks.contains(&key) {
            Some(Partition::Sink)
        } else {
            None
        }
    }

    /// Hand out a fresh traversal stamp
    ///
    /// On the rare wrap of the counter, every record's stamp is zeroed
    /// first so no node can be confused with a stale visit marker.
    pub(crate) fn assign_traversal_stamp(&mut self) -> u32 {
        if self.next_stamp == 0 {
            debug!("traversal stamp wrapped; resetting all node stamps");
            for (_, record) in self.records.iter_mut() {
                record.set_stamp(0);
            }
            self.next_stamp = 1;
        }
        let stamp = self.next_stamp;
        self.next_stamp = self.next_stamp.wrapping_add(1);
        stamp
    }

    /// Recompute which partition a live node belongs to
    ///
    /// Called after every edge mutation touching the node. No-op for
    /// detached nodes and idempotent for already-correct ones.
    pub(crate) fn classify(&mut self, key: NodeKey) {
        let Some(record) = self.records.get(key) else {
            return;
        };
        if !record.is_live() {
            return;
        }
        let partition = match (
            record.ancestors().is_empty(),
            record.descendants().is_empty(),
        ) {
            (true, _) => Partition::Source,
            (false, true) => Partition::Sink,
            (false, false) => Partition::Interior,
        };
        if self.partition_of(key) == Some(partition) {
            return;
        }
        self.detach_from_partitions(key);
        match partition {
            Partition::Source => self.sources.insert(key),
            Partition::Interior => self.interior.insert(key),
            Partition::Sink => self.sinks.insert(key),
        };
    }

    fn detach_from_partitions(&mut self, key: NodeKey) {
        self.sources.remove(&key);
        self.interior.remove(&key);
        self.sinks.remove(&key);
    }

    /// Insert a node into the live classification
    ///
    /// Classifies it, resets its traversal stamp, and marks both
    /// directions dirty so it is recomputed on the next pass.
    pub fn add_node(&mut self, key: NodeKey) -> Result<(), GraphError> {
        let record = self.record_mut(key)?;
        record.set_live(true);
        record.set_stamp(0);
        record.set_state(Direction::Downstream, EvalState::Dirty);
        record.set_state(Direction::Upstream, EvalState::Dirty);
        self.classify(key);
        trace!("add_node {key:?}");
        Ok(())
    }

    /// Remove a node from the live classification
    ///
    /// Does not touch its edges; graph surgery detaches edges first and
    /// relies on the sets surviving for exact reattachment.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<(), GraphError> {
        let record = self.record_mut(key)?;
        record.set_live(false);
        self.detach_from_partitions(key);
        trace!("remove_node {key:?}");
        Ok(())
    }

    /// Clear all records, partitions, and the stamp allocator
    ///
    /// Used when a scene is torn down or reloaded.
    pub fn reset(&mut self) {
        self.records.clear();
        self.sources.clear();
        self.interior.clear();
        self.sinks.clear();
        self.next_stamp = 1;
    }

    // ------------------------------------------------------------------
    // Edge management
    // ------------------------------------------------------------------

    // The one-sided connect/disconnect halves keep both endpoints
    // correctly classified but deliberately touch only one edge set.
    // They are crate-internal: ordinary code uses the paired
    // create/remove_dependency entry points, and graph surgery uses the
    // halves to take apart and restore boundary edges asymmetrically.

    pub(crate) fn connect_descendant(&mut self, key: NodeKey, descendant: NodeKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.descendants_mut().insert(descendant);
        }
        self.classify(key);
        self.classify(descendant);
    }

    pub(crate) fn disconnect_descendant(&mut self, key: NodeKey, descendant: NodeKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.descendants_mut().remove(&descendant);
        }
        self.classify(key);
        self.classify(descendant);
    }

    pub(crate) fn connect_ancestor(&mut self, key: NodeKey, ancestor: NodeKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.ancestors_mut().insert(ancestor);
        }
        self.classify(key);
        self.classify(ancestor);
    }

    pub(crate) fn disconnect_ancestor(&mut self, key: NodeKey, ancestor: NodeKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.ancestors_mut().remove(&ancestor);
        }
        self.classify(key);
        self.classify(ancestor);
    }

    /// Establish a dependency: `ancestor` must evaluate before `key`
    ///
    /// The only public edge-creation entry point; keeps the paired
    /// ancestor/descendant sets consistent. Idempotent: returns
    /// `Ok(false)` if the edge already exists. Under
    /// [`CyclePolicy::RejectOnConnect`] an edge that would close a cycle
    /// is rejected with [`GraphError::WouldCycle`].
    pub fn create_dependency(
        &mut self,
        key: NodeKey,
        ancestor: NodeKey,
    ) -> Result<bool, GraphError> {
        if key == ancestor {
            return Err(GraphError::SelfDependency(key));
        }
        self.record(ancestor)?;
        if self.record(key)?.ancestors().contains(&ancestor) {
            return Ok(false);
        }
        if self.cycle_policy == CyclePolicy::RejectOnConnect && self.is_reachable(key, ancestor) {
            return Err(GraphError::WouldCycle { node: key, ancestor });
        }
        self.connect_descendant(ancestor, key);
        self.connect_ancestor(key, ancestor);
        trace!("dependency created: {ancestor:?} -> {key:?}");
        Ok(true)
    }

    /// Tear down a dependency established by [`Self::create_dependency`]
    ///
    /// Idempotent: returns `Ok(false)` if the edge was not present.
    pub fn remove_dependency(
        &mut self,
        key: NodeKey,
        ancestor: NodeKey,
    ) -> Result<bool, GraphError> {
        self.record(ancestor)?;
        if !self.record(key)?.ancestors().contains(&ancestor) {
            return Ok(false);
        }
        self.disconnect_descendant(ancestor, key);
        self.disconnect_ancestor(key, ancestor);
        trace!("dependency removed: {ancestor:?} -> {key:?}");
        Ok(true)
    }

    /// Whether `to` is reachable from `from` along descendant edges
    fn is_reachable(&mut self, from: NodeKey, to: NodeKey) -> bool {
        if from == to {
            return true;
        }
        let stamp = self.assign_traversal_stamp();
        let mut stack = vec![from];
        while let Some(key) = stack.pop() {
            let Some(record) = self.records.get_mut(key) else {
                continue;
            };
            if record.stamp() == stamp {
                continue;
            }
            record.set_stamp(stamp);
            if record.descendants().contains(&to) {
                return true;
            }
            stack.extend(record.descendants().iter().copied());
        }
        false
    }

    // ------------------------------------------------------------------
    // Dirty propagation
    // ------------------------------------------------------------------

    /// Mark a node and every reachable descendant dirty downstream
    ///
    /// Returns the number of nodes newly dirtied. A node that is already
    /// dirty is not expanded; its descendants were dirtied when it was.
    pub fn dirty(&mut self, key: NodeKey) -> Result<usize, GraphError> {
        self.mark_dirty(key, Direction::Downstream)
    }

    /// Mark a node and every reachable ancestor dirty upstream
    ///
    /// The upstream analogue of [`Self::dirty`], used when a mutation
    /// invalidates state that aggregates bottom-up (e.g. bounds).
    pub fn dirty_upstream(&mut self, key: NodeKey) -> Result<usize, GraphError> {
        self.mark_dirty(key, Direction::Upstream)
    }

    fn mark_dirty(&mut self, key: NodeKey, direction: Direction) -> Result<usize, GraphError> {
        self.record(key)?;
        let mut count = 0;
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(record) = self.records.get_mut(current) else {
                continue;
            };
            if record.state(direction) == EvalState::Dirty {
                continue;
            }
            record.set_state(direction, EvalState::Dirty);
            count += 1;
            let next = match direction {
                Direction::Downstream => record.descendants(),
                Direction::Upstream => record.ancestors(),
            };
            stack.extend(next.iter().copied());
        }
        trace!("dirtied {count} nodes from {key:?} ({direction:?})");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Evaluation driver
    // ------------------------------------------------------------------

    /// Evaluate every dirty node in dependency order
    ///
    /// Two passes: the downstream pass walks dirty sinks (recursively
    /// evaluating dirty ancestors first), then the upstream pass walks
    /// dirty sources (recursively evaluating dirty descendants first).
    /// The visitor is invoked once per node per direction; within one
    /// call, every dirty dependency of a node is evaluated before the
    /// node itself, for the declared direction.
    pub fn evaluate<F>(&mut self, visitor: &mut F) -> Result<EvalReport, GraphError>
    where
        F: FnMut(NodeKey, Direction),
    {
        let stopwatch = Stopwatch::start_new();
        let mut report = EvalReport::default();

        let mut downstream_roots: Vec<NodeKey> = self.sinks.iter().copied().collect();
        // A live node with no edges at all classifies as a source, but it
        // is its own downstream root; sweep those here or they would
        // never leave the dirty state.
        downstream_roots.extend(
            self.sources
                .iter()
                .copied()
                .filter(|key| self.records[*key].descendants().is_empty()),
        );
        for key in downstream_roots {
            if self.records[key].state(Direction::Downstream) == EvalState::Dirty {
                self.evaluate_node(key, Direction::Downstream, visitor, &mut report)?;
            }
        }

        let upstream_roots: Vec<NodeKey> = self.sources.iter().copied().collect();
        for key in upstream_roots {
            if self.records[key].state(Direction::Upstream) == EvalState::Dirty {
                self.evaluate_node(key, Direction::Upstream, visitor, &mut report)?;
            }
        }

        let mut seen = HashSet::new();
        report.distinct = report
            .evaluated
            .iter()
            .filter(|(key, _)| seen.insert(*key))
            .count();
        report.duration = stopwatch.elapsed();
        debug!(
            "evaluated {} nodes ({} invocations) in {:?}",
            report.distinct,
            report.evaluated.len(),
            report.duration
        );
        Ok(report)
    }

    /// Recursive topological evaluation of one node
    ///
    /// The per-direction Dirty/Clean flags double as the "already
    /// scheduled" markers; a dependency found in the Evaluating state
    /// means the walk re-entered an in-progress node, which only a cycle
    /// can cause.
    fn evaluate_node<F>(
        &mut self,
        key: NodeKey,
        direction: Direction,
        visitor: &mut F,
        report: &mut EvalReport,
    ) -> Result<(), GraphError>
    where
        F: FnMut(NodeKey, Direction),
    {
        let record = self.record(key)?;
        match record.state(direction) {
            EvalState::Clean => return Ok(()),
            EvalState::Evaluating => return Err(GraphError::CycleDetected(key)),
            EvalState::Dirty => {}
        }

        let dependencies: Vec<NodeKey> = match direction {
            Direction::Downstream => record.ancestors().iter().copied().collect(),
            Direction::Upstream => record.descendants().iter().copied().collect(),
        };
        self.records[key].set_state(direction, EvalState::Evaluating);

        for dependency in dependencies {
            let Some(dep_record) = self.records.get(dependency) else {
                continue;
            };
            if !dep_record.is_live() {
                continue;
            }
            match dep_record.state(direction) {
                EvalState::Dirty => {
                    self.evaluate_node(dependency, direction, visitor, report)?;
                }
                EvalState::Evaluating => return Err(GraphError::CycleDetected(dependency)),
                EvalState::Clean => {}
            }
        }

        visitor(key, direction);
        self.records[key].set_state(direction, EvalState::Clean);
        report.evaluated.push((key, direction));
        Ok(())
    }
}
