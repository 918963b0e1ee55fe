//! Evaluation reporting and listener surface

use std::time::Duration;

use super::node::{Direction, NodeKey};

/// Summary of one evaluation pass
///
/// Published synchronously to listeners after every non-silent pass.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    /// Every callback invocation this pass, in invocation order
    pub evaluated: Vec<(NodeKey, Direction)>,

    /// Number of distinct nodes touched (a node evaluated in both
    /// directions counts once)
    pub distinct: usize,

    /// Wall time of the whole pass
    pub duration: Duration,
}

impl EvalReport {
    /// Whether the pass evaluated anything at all
    pub fn is_empty(&self) -> bool {
        self.evaluated.is_empty()
    }

    /// Callback invocations restricted to one direction, in order
    pub fn evaluated_in(&self, direction: Direction) -> impl Iterator<Item = NodeKey> + '_ {
        self.evaluated
            .iter()
            .filter(move |(_, d)| *d == direction)
            .map(|(key, _)| *key)
    }
}

/// Observer notified after each evaluation pass
///
/// Used by statistics collection and viewport invalidation. The broadcast
/// is a plain synchronous call on the editing thread, not a queue.
pub trait EvaluationListener {
    /// Called once per non-silent evaluation pass
    fn graph_evaluated(&mut self, report: &EvalReport);
}
