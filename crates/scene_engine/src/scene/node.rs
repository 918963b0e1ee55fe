//! Scene node payloads
//!
//! The data each node carries and the per-node evaluation work the graph
//! driver schedules: downstream recomputes the world transform from the
//! hierarchy parent, upstream aggregates world-space bounds bottom-up.

use bitflags::bitflags;
use serde::{Serialize, Deserialize};

use crate::foundation::math::{Aabb, Mat4, Transform, Vec3};
use crate::graph::NodeKey;

bitflags! {
    /// Editor-facing node state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node is drawn in the viewport
        const VISIBLE = 1 << 0;
        /// Node rejects property edits
        const LOCKED = 1 << 1;
        /// Node is in the current selection
        const SELECTED = 1 << 2;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::VISIBLE
    }
}

/// What kind of entity a scene node represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Pure hierarchy node with no renderable payload
    Group,
    /// Renderable mesh placeholder
    Mesh {
        /// Half-size of the mesh's local bounding box
        extents: Vec3,
    },
    /// Light source
    Light {
        /// Light color
        color: Vec3,
        /// Light intensity multiplier
        intensity: f32,
    },
}

/// One node in the scene's node table
///
/// The table ([`slotmap::SlotMap`]) is the sole owner of node lifetime;
/// the dependency graph only ever holds [`NodeKey`] handles to these.
#[derive(Debug)]
pub struct SceneNode {
    name: String,
    kind: NodeKind,
    flags: NodeFlags,

    // Scene hierarchy. Distinct from the dependency graph's ancestor and
    // descendant sets, although creating a child also creates the
    // matching parent-before-child dependency.
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,

    /// Authored local transform
    local: Transform,
    /// Derived world transform (downstream evaluation output)
    world: Mat4,

    /// Authored local-space bounds
    local_bounds: Aabb,
    /// Derived world-space bounds of this node and its children
    /// (upstream evaluation output)
    world_bounds: Aabb,

    /// Set while the node sits in a detached (deleted-but-undoable) subtree
    detached: bool,
}

impl SceneNode {
    /// Create a new node with identity transform and the given bounds
    pub fn new(name: impl Into<String>, kind: NodeKind, local_bounds: Aabb) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: NodeFlags::default(),
            parent: None,
            children: Vec::new(),
            local: Transform::identity(),
            world: Mat4::identity(),
            local_bounds,
            world_bounds: local_bounds,
            detached: false,
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind and kind-specific payload
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Editor state flags
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Hierarchy parent
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Hierarchy children
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Authored local transform
    pub fn local(&self) -> &Transform {
        &self.local
    }

    /// Derived world transform from the last evaluation pass
    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    /// Authored local-space bounds
    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
    }

    /// Derived world-space bounds from the last evaluation pass
    pub fn world_bounds(&self) -> Aabb {
        self.world_bounds
    }

    /// Whether the node sits in a detached subtree
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    pub(crate) fn set_flags(&mut self, flags: NodeFlags) {
        self.flags = flags;
    }

    pub(crate) fn set_local(&mut self, local: Transform) {
        self.local = local;
    }

    pub(crate) fn set_local_bounds(&mut self, bounds: Aabb) {
        self.local_bounds = bounds;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeKey>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeKey> {
        &mut self.children
    }

    pub(crate) fn set_detached(&mut self, detached: bool) {
        self.detached = detached;
    }

    /// Duplicate the authored payload (hierarchy links and derived state
    /// are rebuilt by the caller)
    pub(crate) fn clone_payload(&self) -> Self {
        let mut copy = Self::new(self.name.clone(), self.kind.clone(), self.local_bounds);
        copy.flags = self.flags;
        copy.local = self.local.clone();
        copy
    }

    /// Downstream evaluation: recompute the world transform
    pub(crate) fn update_world(&mut self, parent_world: Mat4) {
        self.world = parent_world * self.local.to_matrix();
    }

    /// Upstream evaluation: recompute aggregated world-space bounds
    ///
    /// `children_bounds` is the union of the children's already-evaluated
    /// world bounds; the driver guarantees descendants evaluate first.
    pub(crate) fn update_world_bounds(&mut self, children_bounds: Option<Aabb>) {
        let own = self.local_bounds.transformed(&self.world);
        self.world_bounds = match children_bounds {
            Some(children) => own.union(&children),
            None => own,
        };
    }
}
