//! Configuration system
//!
//! Editor-level configuration with support for multiple config file
//! formats (TOML, RON). The graph-facing knob here is [`CyclePolicy`]:
//! the evaluation engine assumes an acyclic graph, and this selects where
//! a cycle is reported when callers get that wrong.

use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Where dependency cycles are reported
///
/// The evaluation engine requires an acyclic graph. The original editor
/// relied on callers never creating a cycle; these are the two explicit
/// guard placements a deployment can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePolicy {
    /// Reject cycle-creating edges at `create_dependency` time
    ///
    /// Costs a reachability walk per edge creation; evaluation then never
    /// sees a cycle from well-behaved structural edits.
    RejectOnConnect,

    /// Report the cycle when evaluation re-enters a node in progress
    ///
    /// Edge creation stays O(1); a cyclic graph fails the next
    /// `evaluate` call instead of overflowing the stack.
    FailDuringEvaluation,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self::FailDuringEvaluation
    }
}

/// Scene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Cycle detection placement for the dependency graph
    pub cycle_policy: CyclePolicy,

    /// Default AABB extents for nodes without explicit bounds
    pub default_extents: Vec3,

    /// Log a debug summary after every evaluation pass
    pub log_evaluations: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            cycle_policy: CyclePolicy::default(),
            default_extents: Vec3::new(0.5, 0.5, 0.5),
            log_evaluations: false,
        }
    }
}

impl Config for SceneConfig {}
