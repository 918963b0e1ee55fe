//! Scene management
//!
//! The scene owns the node table and the dependency graph, and exposes
//! the mutation entry points the rest of the editor (undo/redo commands,
//! property panels, importers) calls.

pub mod node;
pub mod scene;

pub use node::{NodeFlags, NodeKind, SceneNode};
pub use scene::{Scene, SceneError};
