//! Scene - owner of the node table and the dependency graph
//!
//! The scene mediates node creation and destruction, routes every
//! structural edit through the graph's mutation entry points, and drives
//! one evaluation pass per editing tick before rendering or picking.
//! All of it runs on the editor's single main-loop thread.

use log::debug;
use slotmap::SlotMap;

use crate::config::SceneConfig;
use crate::foundation::math::{Aabb, Transform, Vec3};
use crate::graph::{
    DependencyGraph, Direction, EvalReport, EvaluationListener, GraphError, NodeKey,
};

use super::node::{NodeFlags, NodeKind, SceneNode};

/// Errors reported by scene mutation entry points
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// The key does not name a node in this scene
    #[error("node {0:?} does not exist in this scene")]
    UnknownNode(NodeKey),

    /// The edit would make a node an ancestor of itself
    #[error("reparenting {node:?} under {parent:?} would create a cycle")]
    WouldCreateCycle {
        /// Node being moved
        node: NodeKey,
        /// Requested parent
        parent: NodeKey,
    },

    /// The operation requires a detached subtree root
    #[error("node {0:?} is not detached")]
    NotDetached(NodeKey),

    /// The operation requires an attached node
    #[error("node {0:?} is detached")]
    Detached(NodeKey),

    /// Dependency graph failure
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// An editable scene: node table, dependency graph, listeners
///
/// The node table is the sole owner of node lifetime. Deleting a subtree
/// only detaches it from the graph; payloads stay in the table so undo is
/// exact, and [`Scene::purge_subtree`] is the point of no return.
pub struct Scene {
    nodes: SlotMap<NodeKey, SceneNode>,
    graph: DependencyGraph,
    listeners: Vec<Box<dyn EvaluationListener>>,
    config: SceneConfig,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene with default configuration
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create an empty scene with explicit configuration
    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            graph: DependencyGraph::with_cycle_policy(config.cycle_policy),
            listeners: Vec::new(),
            config,
        }
    }

    /// Read access to a node
    pub fn node(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    /// Number of nodes in the table, attached or detached
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Read access to the dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Register an evaluation listener
    pub fn add_listener(&mut self, listener: Box<dyn EvaluationListener>) {
        self.listeners.push(listener);
    }

    fn get(&self, key: NodeKey) -> Result<&SceneNode, SceneError> {
        self.nodes.get(key).ok_or(SceneError::UnknownNode(key))
    }

    fn get_attached(&self, key: NodeKey) -> Result<&SceneNode, SceneError> {
        let node = self.get(key)?;
        if node.is_detached() {
            return Err(SceneError::Detached(key));
        }
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Node creation & destruction
    // ------------------------------------------------------------------

    /// Create a node, optionally parented into the hierarchy
    ///
    /// Creating a child also creates the parent-before-child dependency,
    /// so the new node's world transform is evaluated after its parent's.
    pub fn create_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        parent: Option<NodeKey>,
    ) -> Result<NodeKey, SceneError> {
        if let Some(parent_key) = parent {
            self.get_attached(parent_key)?;
        }

        let local_bounds = match &kind {
            NodeKind::Mesh { extents } => Aabb::from_center_extents(Vec3::zeros(), *extents),
            _ => Aabb::from_center_extents(Vec3::zeros(), self.config.default_extents),
        };

        let key = self.nodes.insert(SceneNode::new(name, kind, local_bounds));
        self.graph.register(key);
        self.graph.add_node(key)?;

        if let Some(parent_key) = parent {
            self.graph.create_dependency(key, parent_key)?;
            self.nodes[key].set_parent(Some(parent_key));
            self.nodes[parent_key].children_mut().push(key);
            // the new node is already dirty; its ancestors' bounds are not
            self.graph.dirty_upstream(parent_key)?;
        }

        debug!("created node {key:?} ({:?})", self.nodes[key].name());
        Ok(key)
    }

    /// Detach the subtree rooted at `key` (delete, undoably)
    ///
    /// The subtree stops being evaluated and leaves the hierarchy, but
    /// payloads and internal edges survive so [`Scene::restore_subtree`]
    /// is exact. Returns the detached descendants.
    pub fn detach_subtree(&mut self, key: NodeKey) -> Result<Vec<NodeKey>, SceneError> {
        self.get_attached(key)?;

        let pruned = self.graph.prune(key)?;
        self.nodes[key].set_detached(true);
        for &member in &pruned {
            self.nodes[member].set_detached(true);
        }

        if let Some(parent) = self.nodes[key].parent() {
            self.nodes[parent].children_mut().retain(|&child| child != key);
            // parent keeps its slot in the child's restorable boundary,
            // but its own aggregated bounds must shrink now
            self.graph.dirty_upstream(parent)?;
        }

        debug!("detached subtree at {key:?} ({} nodes)", pruned.len() + 1);
        Ok(pruned)
    }

    /// Reattach a subtree detached by [`Scene::detach_subtree`] (undo)
    pub fn restore_subtree(&mut self, key: NodeKey) -> Result<Vec<NodeKey>, SceneError> {
        let node = self.get(key)?;
        if !node.is_detached() {
            return Err(SceneError::NotDetached(key));
        }
        if let Some(parent) = node.parent() {
            self.get_attached(parent)?;
        }

        let inserted = self.graph.insert(key)?;
        self.nodes[key].set_detached(false);
        for &member in &inserted {
            self.nodes[member].set_detached(false);
        }

        if let Some(parent) = self.nodes[key].parent() {
            self.nodes[parent].children_mut().push(key);
            self.graph.dirty_upstream(parent)?;
        }

        debug!("restored subtree at {key:?} ({} nodes)", inserted.len() + 1);
        Ok(inserted)
    }

    /// Destroy a detached subtree for real (redo past the undo horizon)
    ///
    /// Frees the table slots and drops the graph records. Returns the
    /// number of nodes destroyed.
    pub fn purge_subtree(&mut self, key: NodeKey) -> Result<usize, SceneError> {
        let node = self.get(key)?;
        if !node.is_detached() {
            return Err(SceneError::NotDetached(key));
        }

        let members = self.hierarchy_subtree(key);
        for &member in &members {
            self.graph.forget(member);
            self.nodes.remove(member);
        }
        debug!("purged subtree at {key:?} ({} nodes)", members.len());
        Ok(members.len())
    }

    /// Duplicate the subtree rooted at `key`, attached under the same parent
    ///
    /// Copies authored payloads and every dependency edge between subtree
    /// members; derived state is left dirty for the next pass.
    pub fn duplicate_subtree(&mut self, key: NodeKey) -> Result<NodeKey, SceneError> {
        self.get_attached(key)?;

        let members = self.hierarchy_subtree(key);
        let mut mapping: std::collections::HashMap<NodeKey, NodeKey> =
            std::collections::HashMap::with_capacity(members.len());

        for &member in &members {
            let mut copy = self.nodes[member].clone_payload();
            if member == key {
                let name = format!("{}_copy", copy.name());
                copy.set_name(name);
            }
            let new_key = self.nodes.insert(copy);
            self.graph.register(new_key);
            self.graph.add_node(new_key)?;
            mapping.insert(member, new_key);
        }

        // mirror hierarchy links and internal dependency edges
        for &member in &members {
            let new_key = mapping[&member];
            if member != key {
                if let Some(parent) = self.nodes[member].parent() {
                    if let Some(&new_parent) = mapping.get(&parent) {
                        self.nodes[new_key].set_parent(Some(new_parent));
                        self.nodes[new_parent].children_mut().push(new_key);
                    }
                }
            }
            let internal_ancestors: Vec<NodeKey> = self
                .graph
                .node(member)
                .map(|record| {
                    record
                        .ancestors()
                        .iter()
                        .filter(|ancestor| mapping.contains_key(ancestor))
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            for ancestor in internal_ancestors {
                self.graph.create_dependency(new_key, mapping[&ancestor])?;
            }
        }

        // attach the copy next to the original
        let new_root = mapping[&key];
        if let Some(parent) = self.nodes[key].parent() {
            self.graph.create_dependency(new_root, parent)?;
            self.nodes[new_root].set_parent(Some(parent));
            self.nodes[parent].children_mut().push(new_root);
            self.graph.dirty_upstream(parent)?;
        }

        debug!("duplicated subtree at {key:?} -> {new_root:?} ({} nodes)", members.len());
        Ok(new_root)
    }

    // ------------------------------------------------------------------
    // Property edits
    // ------------------------------------------------------------------

    /// Set a node's local transform and dirty everything it invalidates
    ///
    /// World transforms flow downstream to the whole subtree; the moved
    /// subtree's world bounds, and every ancestor's aggregate, flow
    /// upstream.
    pub fn set_local_transform(
        &mut self,
        key: NodeKey,
        local: Transform,
    ) -> Result<(), SceneError> {
        self.get_attached(key)?;
        self.nodes[key].set_local(local);
        self.graph.dirty(key)?;
        self.dirty_bounds_of_subtree(key)?;
        Ok(())
    }

    /// Rename a node (no derived state depends on the name)
    pub fn set_name(&mut self, key: NodeKey, name: impl Into<String>) -> Result<(), SceneError> {
        self.get(key)?;
        self.nodes[key].set_name(name);
        Ok(())
    }

    /// Replace a node's editor flags
    pub fn set_flags(&mut self, key: NodeKey, flags: NodeFlags) -> Result<(), SceneError> {
        self.get(key)?;
        self.nodes[key].set_flags(flags);
        self.graph.dirty(key)?;
        Ok(())
    }

    /// Replace a node's kind payload
    pub fn set_kind(&mut self, key: NodeKey, kind: NodeKind) -> Result<(), SceneError> {
        self.get_attached(key)?;
        if let NodeKind::Mesh { extents } = &kind {
            self.nodes[key].set_local_bounds(Aabb::from_center_extents(Vec3::zeros(), *extents));
        }
        self.nodes[key].set_kind(kind);
        self.graph.dirty(key)?;
        self.dirty_bounds_of_subtree(key)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reparent
    // ------------------------------------------------------------------

    /// Move the subtree rooted at `key` under a new parent
    ///
    /// Implemented as prune / retarget the restorable boundary edge /
    /// insert, so only the single changed boundary edge differs from the
    /// undo path and internal subtree edges are never touched.
    pub fn reparent(&mut self, key: NodeKey, new_parent: Option<NodeKey>) -> Result<(), SceneError> {
        self.get_attached(key)?;
        if let Some(parent_key) = new_parent {
            self.get_attached(parent_key)?;
            if parent_key == key || self.hierarchy_subtree(key).contains(&parent_key) {
                return Err(SceneError::WouldCreateCycle {
                    node: key,
                    parent: parent_key,
                });
            }
        }

        let old_parent = self.nodes[key].parent();
        if old_parent == new_parent {
            return Ok(());
        }

        self.graph.prune(key)?;
        self.graph.retarget_pruned_root(key, old_parent, new_parent)?;
        self.graph.insert(key)?;

        if let Some(parent) = old_parent {
            self.nodes[parent].children_mut().retain(|&child| child != key);
            self.graph.dirty_upstream(parent)?;
        }
        self.nodes[key].set_parent(new_parent);
        if let Some(parent) = new_parent {
            self.nodes[parent].children_mut().push(key);
            self.graph.dirty_upstream(parent)?;
        }

        debug!("reparented {key:?}: {old_parent:?} -> {new_parent:?}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate the dirty frontier and refresh derived state
    ///
    /// Called once per editing tick before rendering/picking. Unless
    /// `silent`, the report is broadcast to registered listeners.
    pub fn evaluate(&mut self, silent: bool) -> Result<EvalReport, SceneError> {
        let nodes = &mut self.nodes;
        let report = self.graph.evaluate(&mut |key, direction| {
            match direction {
                Direction::Downstream => {
                    let parent_world = nodes
                        .get(key)
                        .and_then(SceneNode::parent)
                        .and_then(|parent| nodes.get(parent))
                        .map_or_else(crate::foundation::math::Mat4::identity, |parent| {
                            *parent.world()
                        });
                    if let Some(node) = nodes.get_mut(key) {
                        node.update_world(parent_world);
                    }
                }
                Direction::Upstream => {
                    let children: Vec<NodeKey> = nodes
                        .get(key)
                        .map(|node| node.children().to_vec())
                        .unwrap_or_default();
                    let children_bounds = children
                        .iter()
                        .filter_map(|&child| nodes.get(child))
                        .map(SceneNode::world_bounds)
                        .reduce(|a, b| a.union(&b));
                    if let Some(node) = nodes.get_mut(key) {
                        node.update_world_bounds(children_bounds);
                    }
                }
            }
        })?;

        if self.config.log_evaluations && !report.is_empty() {
            debug!(
                "evaluation pass: {} nodes in {:?}",
                report.distinct, report.duration
            );
        }
        if !silent {
            for listener in &mut self.listeners {
                listener.graph_evaluated(&report);
            }
        }
        Ok(report)
    }

    /// Drop every node and reset the graph (scene teardown/reload)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.graph.reset();
        debug!("scene cleared");
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Collect the hierarchy subtree under `key`, root first
    fn hierarchy_subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut members = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            members.push(current);
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children().iter().copied());
            }
        }
        members
    }

    /// A moved or resized subtree changes every member's world bounds and
    /// every ancestor's aggregate
    fn dirty_bounds_of_subtree(&mut self, key: NodeKey) -> Result<(), GraphError> {
        for member in self.hierarchy_subtree(key) {
            self.graph.dirty_upstream(member)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EvalState, Partition};
    use approx::assert_relative_eq;

    fn pos(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn test_create_chain_and_evaluate_world_transforms() {
        let mut scene = Scene::new();
        let root = scene.create_node("root", NodeKind::Group, None).unwrap();
        let child1 = scene.create_node("child1", NodeKind::Group, Some(root)).unwrap();
        let child2 = scene.create_node("child2", NodeKind::Group, Some(child1)).unwrap();

        scene.set_local_transform(root, pos(1.0, 0.0, 0.0)).unwrap();
        scene.set_local_transform(child1, pos(0.0, 2.0, 0.0)).unwrap();
        scene.set_local_transform(child2, pos(0.0, 0.0, 3.0)).unwrap();

        scene.evaluate(true).unwrap();

        let world = scene.node(child2).unwrap().world();
        let p = world.transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn test_chain_callback_order_root_first() {
        let mut scene = Scene::new();
        let root = scene.create_node("root", NodeKind::Group, None).unwrap();
        let child1 = scene.create_node("child1", NodeKind::Group, Some(root)).unwrap();
        let child2 = scene.create_node("child2", NodeKind::Group, Some(child1)).unwrap();

        let report = scene.evaluate(true).unwrap();
        let downstream: Vec<NodeKey> = report.evaluated_in(Direction::Downstream).collect();
        assert_eq!(downstream, vec![root, child1, child2]);

        // dirtying only the leaf re-evaluates only the leaf
        scene.set_local_transform(child2, pos(1.0, 1.0, 1.0)).unwrap();
        let report = scene.evaluate(true).unwrap();
        let downstream: Vec<NodeKey> = report.evaluated_in(Direction::Downstream).collect();
        assert_eq!(downstream, vec![child2]);
    }

    #[test]
    fn test_bounds_aggregate_upstream() {
        let mut scene = Scene::new();
        let root = scene.create_node("root", NodeKind::Group, None).unwrap();
        let mesh = scene
            .create_node(
                "mesh",
                NodeKind::Mesh { extents: Vec3::new(1.0, 1.0, 1.0) },
                Some(root),
            )
            .unwrap();
        scene.set_local_transform(mesh, pos(10.0, 0.0, 0.0)).unwrap();

        scene.evaluate(true).unwrap();

        let bounds = scene.node(root).unwrap().world_bounds();
        assert_relative_eq!(bounds.max.x, 11.0);
        assert_relative_eq!(bounds.min.x, -0.5); // root's own default extents
    }

    #[test]
    fn test_reparent_moves_subtree() {
        let mut scene = Scene::new();
        let a = scene.create_node("a", NodeKind::Group, None).unwrap();
        let b = scene.create_node("b", NodeKind::Group, None).unwrap();
        let child = scene.create_node("child", NodeKind::Group, Some(a)).unwrap();

        scene.set_local_transform(a, pos(1.0, 0.0, 0.0)).unwrap();
        scene.set_local_transform(b, pos(-1.0, 0.0, 0.0)).unwrap();
        scene.evaluate(true).unwrap();

        scene.reparent(child, Some(b)).unwrap();
        assert_eq!(scene.node(child).unwrap().parent(), Some(b));
        assert!(scene.node(b).unwrap().children().contains(&child));
        assert!(!scene.node(a).unwrap().children().contains(&child));

        scene.evaluate(true).unwrap();
        let p = scene
            .node(child)
            .unwrap()
            .world()
            .transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(p.x, -1.0);
    }

    #[test]
    fn test_reparent_under_own_descendant_rejected() {
        let mut scene = Scene::new();
        let a = scene.create_node("a", NodeKind::Group, None).unwrap();
        let b = scene.create_node("b", NodeKind::Group, Some(a)).unwrap();

        let err = scene.reparent(a, Some(b)).unwrap_err();
        assert!(matches!(err, SceneError::WouldCreateCycle { .. }));
        // nothing moved
        assert_eq!(scene.node(b).unwrap().parent(), Some(a));
    }

    #[test]
    fn test_detach_restore_round_trip() {
        let mut scene = Scene::new();
        let p = scene.create_node("p", NodeKind::Group, None).unwrap();
        let a = scene.create_node("a", NodeKind::Group, Some(p)).unwrap();
        let b = scene.create_node("b", NodeKind::Group, Some(a)).unwrap();
        let c = scene.create_node("c", NodeKind::Group, Some(b)).unwrap();
        scene.evaluate(true).unwrap();

        let detached = scene.detach_subtree(a).unwrap();
        assert_eq!(detached.len(), 2);
        // p no longer lists a as a dependency target
        assert!(!scene.graph().node(p).unwrap().descendants().contains(&a));
        // internal chain intact while detached
        assert!(scene.graph().node(a).unwrap().descendants().contains(&b));
        assert!(scene.graph().node(b).unwrap().descendants().contains(&c));
        assert!(scene.node(b).unwrap().is_detached());
        assert_eq!(scene.graph().live_count(), 1);

        // detached nodes are not evaluated
        let report = scene.evaluate(true).unwrap();
        assert!(!report.evaluated.iter().any(|(key, _)| *key == b));

        scene.restore_subtree(a).unwrap();
        assert!(scene.graph().node(p).unwrap().descendants().contains(&a));
        assert!(!scene.node(b).unwrap().is_detached());
        assert_eq!(scene.graph().live_count(), 4);
        assert_eq!(
            scene.graph().node(c).unwrap().state(Direction::Downstream),
            EvalState::Dirty
        );
    }

    #[test]
    fn test_restore_requires_detached_root() {
        let mut scene = Scene::new();
        let a = scene.create_node("a", NodeKind::Group, None).unwrap();
        assert!(matches!(
            scene.restore_subtree(a),
            Err(SceneError::NotDetached(_))
        ));
    }

    #[test]
    fn test_purge_frees_slots() {
        let mut scene = Scene::new();
        let p = scene.create_node("p", NodeKind::Group, None).unwrap();
        let a = scene.create_node("a", NodeKind::Group, Some(p)).unwrap();
        let _b = scene.create_node("b", NodeKind::Group, Some(a)).unwrap();

        scene.detach_subtree(a).unwrap();
        let purged = scene.purge_subtree(a).unwrap();
        assert_eq!(purged, 2);
        assert_eq!(scene.node_count(), 1);
        assert!(scene.node(a).is_none());
    }

    #[test]
    fn test_duplicate_subtree_copies_structure() {
        let mut scene = Scene::new();
        let p = scene.create_node("p", NodeKind::Group, None).unwrap();
        let a = scene.create_node("a", NodeKind::Group, Some(p)).unwrap();
        let _b = scene.create_node("b", NodeKind::Group, Some(a)).unwrap();

        let copy = scene.duplicate_subtree(a).unwrap();
        assert_ne!(copy, a);
        assert_eq!(scene.node(copy).unwrap().name(), "a_copy");
        assert_eq!(scene.node(copy).unwrap().parent(), Some(p));
        assert_eq!(scene.node(copy).unwrap().children().len(), 1);
        assert_eq!(scene.node_count(), 5);
        assert_eq!(scene.graph().live_count(), 5);

        // original untouched
        assert_eq!(scene.node(a).unwrap().children().len(), 1);
        assert_eq!(scene.graph().partition_of(p), Some(Partition::Source));
    }

    #[test]
    fn test_listener_broadcast_respects_silent() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct CountListener(Rc<RefCell<usize>>);
        impl EvaluationListener for CountListener {
            fn graph_evaluated(&mut self, _report: &EvalReport) {
                *self.0.borrow_mut() += 1;
            }
        }

        let count = Rc::new(RefCell::new(0));
        let mut scene = Scene::new();
        scene.add_listener(Box::new(CountListener(Rc::clone(&count))));

        scene.create_node("a", NodeKind::Group, None).unwrap();
        scene.evaluate(true).unwrap();
        assert_eq!(*count.borrow(), 0);

        scene.create_node("b", NodeKind::Group, None).unwrap();
        scene.evaluate(false).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_clear_resets_scene() {
        let mut scene = Scene::new();
        scene.create_node("a", NodeKind::Group, None).unwrap();
        scene.clear();
        assert_eq!(scene.node_count(), 0);
        assert_eq!(scene.graph().live_count(), 0);
    }
}
