//! Graph surgery - subtree prune and insert
//!
//! Detaching a subtree (delete, or the first half of a reparent) and
//! reattaching it later (undo, or the reparent completing) must remove
//! exactly the edges that cross the subtree boundary and nothing else.
//! Edges between subtree members are left completely untouched so
//! reattachment is exact and costs O(boundary), not O(subtree edges).
//!
//! Both operations run in two phases over a fresh traversal stamp: first
//! the whole subtree is walked and stamped, then each member's ancestors
//! are tested against the stamp. An unstamped ancestor is outside the
//! subtree, so the edge is a boundary edge; a stamped one is internal and
//! is left alone. Stamping the full subtree before touching any edge is
//! what makes that test exact even when a member is reachable through
//! several internal paths.

use log::debug;

use super::error::GraphError;
use super::graph::DependencyGraph;
use super::node::NodeKey;

impl DependencyGraph {
    /// Detach the subtree rooted at `root` from the live graph
    ///
    /// Every node reachable from `root` along descendant edges leaves the
    /// classification partitions and loses the descendant-side half of
    /// each edge arriving from outside the subtree. The `ancestors` sets
    /// of subtree nodes keep those outside endpoints, which is exactly
    /// the state [`Self::insert`] needs to restore the boundary verbatim.
    ///
    /// Returns the detached nodes, excluding `root` itself.
    pub fn prune(&mut self, root: NodeKey) -> Result<Vec<NodeKey>, GraphError> {
        self.record(root)?;
        let stamp = self.assign_traversal_stamp();
        let members = self.stamp_subtree(root, stamp)?;

        // In a DAG none of root's ancestors can be inside the subtree, so
        // every one of these is a boundary edge.
        let root_ancestors: Vec<NodeKey> =
            self.record(root)?.ancestors().iter().copied().collect();
        for ancestor in root_ancestors {
            self.disconnect_descendant(ancestor, root);
        }

        let mut pruned = Vec::new();
        for &key in &members[1..] {
            let ancestors: Vec<NodeKey> =
                self.record(key)?.ancestors().iter().copied().collect();
            for ancestor in ancestors {
                let outside = self.node(ancestor).map_or(true, |r| r.stamp() != stamp);
                if outside {
                    self.disconnect_descendant(ancestor, key);
                }
            }
            self.remove_node(key)?;
            pruned.push(key);
        }

        self.remove_node(root)?;
        debug!(
            "pruned subtree at {root:?}: {} nodes detached",
            pruned.len() + 1
        );
        Ok(pruned)
    }

    /// Reattach a subtree previously detached by [`Self::prune`]
    ///
    /// The mirror operation: re-adds every subtree node to the live
    /// classification and restores each boundary edge exactly once. Only
    /// unstamped (outside) ancestors get their descendant half
    /// reconnected; internal edges were never removed and are not
    /// touched.
    ///
    /// Returns the reattached nodes, excluding `root` itself.
    pub fn insert(&mut self, root: NodeKey) -> Result<Vec<NodeKey>, GraphError> {
        self.add_node(root)?;

        let record = self.record(root)?;
        if record.ancestors().is_empty() && record.descendants().is_empty() {
            // Trivial case: a lone leaf, nothing to restore.
            return Ok(Vec::new());
        }

        let stamp = self.assign_traversal_stamp();
        let members = self.stamp_subtree(root, stamp)?;

        let root_ancestors: Vec<NodeKey> =
            self.record(root)?.ancestors().iter().copied().collect();
        for ancestor in root_ancestors {
            self.connect_descendant(ancestor, root);
        }

        let mut inserted = Vec::new();
        for &key in &members[1..] {
            self.add_node(key)?;
            // add_node clears the visit marker; keep this traversal's
            // stamp authoritative for the remaining boundary tests.
            self.record_mut(key)?.set_stamp(stamp);

            let ancestors: Vec<NodeKey> =
                self.record(key)?.ancestors().iter().copied().collect();
            for ancestor in ancestors {
                if self.node(ancestor).map_or(false, |r| r.stamp() != stamp) {
                    self.connect_descendant(ancestor, key);
                }
            }
            inserted.push(key);
        }

        debug!(
            "inserted subtree at {root:?}: {} nodes attached",
            inserted.len() + 1
        );
        Ok(inserted)
    }

    /// Walk the subtree under `root` along descendant edges, stamping
    /// every member with `stamp`
    ///
    /// Returns the members in discovery order with `root` first; each
    /// member appears exactly once regardless of how many internal paths
    /// lead to it.
    fn stamp_subtree(
        &mut self,
        root: NodeKey,
        stamp: u32,
    ) -> Result<Vec<NodeKey>, GraphError> {
        let mut members = vec![root];
        let mut stack: Vec<NodeKey> =
            self.record(root)?.descendants().iter().copied().collect();
        self.record_mut(root)?.set_stamp(stamp);

        while let Some(key) = stack.pop() {
            let Some(record) = self.try_record_mut(key) else {
                continue;
            };
            if record.stamp() == stamp {
                continue;
            }
            record.set_stamp(stamp);
            stack.extend(record.descendants().iter().copied());
            members.push(key);
        }
        Ok(members)
    }

    /// Swap a restorable boundary edge on a detached subtree root
    ///
    /// Between prune and insert, a detached root's `ancestors` set is the
    /// list of boundary edges the next insert will restore. Reparenting
    /// edits that list while nothing is connected, so the insert attaches
    /// the subtree in its new place with the same machinery undo uses.
    pub(crate) fn retarget_pruned_root(
        &mut self,
        root: NodeKey,
        old_ancestor: Option<NodeKey>,
        new_ancestor: Option<NodeKey>,
    ) -> Result<(), GraphError> {
        let record = self.record_mut(root)?;
        debug_assert!(!record.is_live(), "retarget requires a detached root");
        if let Some(old) = old_ancestor {
            record.ancestors_mut().remove(&old);
        }
        if let Some(new) = new_ancestor {
            record.ancestors_mut().insert(new);
        }
        Ok(())
    }
}
