//! # Scene Engine
//!
//! The core of an interactive scene-authoring tool: a scene node table, a
//! dependency graph over those nodes, and an incremental evaluation
//! engine that recomputes derived state (world transforms, aggregated
//! bounds) after every edit.
//!
//! ## Features
//!
//! - **Dependency Graph**: per-node ancestor/descendant relations with
//!   live source/interior/sink classification
//! - **Incremental Evaluation**: only the dirty frontier is recomputed,
//!   in dependency order, once per editing tick
//! - **Graph Surgery**: subtree prune/insert touching only boundary
//!   edges, making reparent/delete/undo exact and cheap
//! - **Single-Threaded**: mutation and evaluation run on the editor's
//!   main-loop thread; no operation blocks or suspends
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut scene = Scene::new();
//!     let root = scene.create_node("root", NodeKind::Group, None)?;
//!     let ship = scene.create_node(
//!         "ship",
//!         NodeKind::Mesh { extents: Vec3::new(1.0, 1.0, 1.0) },
//!         Some(root),
//!     )?;
//!
//!     scene.set_local_transform(ship, Transform::from_position(Vec3::new(0.0, 5.0, 0.0)))?;
//!     let report = scene.evaluate(false)?;
//!     assert!(!report.is_empty());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod graph;
pub mod scene;

pub use config::{Config, ConfigError, CyclePolicy, SceneConfig};
pub use graph::{
    DependencyGraph, Direction, EvalReport, EvalState, EvaluationListener, GraphError, NodeKey,
    Partition,
};
pub use scene::{NodeFlags, NodeKind, Scene, SceneError, SceneNode};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, CyclePolicy, SceneConfig},
        foundation::math::{Aabb, Mat4, Quat, Transform, Vec3},
        graph::{Direction, EvalReport, EvaluationListener, GraphError, NodeKey},
        scene::{NodeFlags, NodeKind, Scene, SceneError, SceneNode},
    };
}
