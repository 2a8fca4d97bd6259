//! Post-count maintenance.
//!
//! `post_count` changes only through [`SpaceTree::apply_post_delta`];
//! `recursive_post_count` changes only through that method or through
//! [`SpaceTree::apply_hierarchy_change`].

use crate::domain::spaces::SpaceId;

use super::store::SpaceTree;

/// Outcome of a reparent adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct HierarchyChange {
    /// Posts contained anywhere in the moved subtree.
    pub(super) impact: i64,
    /// Spaces in the moved subtree, its root included.
    pub(super) moved: usize,
    pub(super) cycle_detected: bool,
}

impl SpaceTree {
    /// Add `delta` to the direct and recursive count of `id` and to the
    /// recursive count of each ancestor. `None` when `id` is unknown.
    pub(super) fn apply_post_delta(&mut self, id: SpaceId, delta: i64) -> Option<bool> {
        let node = self.nodes.get_mut(&id)?;
        node.post_count += delta;
        node.recursive_post_count += delta;

        let ancestors = self.ancestors(id);
        self.add_recursive(&ancestors.ids, delta);
        Some(ancestors.cycle_detected)
    }

    /// Move the moved subtree's posts from the old ancestor chain to the new
    /// one. The subtree's own counters are left alone.
    ///
    /// The amount moved is the direct count of `id` plus the direct counts of
    /// its descendants. Summing the descendants' recursive counts instead
    /// would count every grandchild's posts twice.
    ///
    /// Expects the index to reflect the new parent already. `None` when `id`
    /// is unknown.
    pub(super) fn apply_hierarchy_change(
        &mut self,
        id: SpaceId,
        old_parent: Option<SpaceId>,
        new_parent: Option<SpaceId>,
    ) -> Option<HierarchyChange> {
        let own = self.nodes.get(&id)?.post_count;
        let descendants = self.descendants(id);
        let impact = own
            + descendants
                .ids
                .iter()
                .filter_map(|descendant| self.nodes.get(descendant))
                .map(|node| node.post_count)
                .sum::<i64>();

        let mut cycle_detected = descendants.cycle_detected;
        if let Some(old_parent) = old_parent {
            cycle_detected |= self.propagate_from(old_parent, -impact);
        }
        if let Some(new_parent) = new_parent {
            cycle_detected |= self.propagate_from(new_parent, impact);
        }

        Some(HierarchyChange {
            impact,
            moved: descendants.ids.len() + 1,
            cycle_detected,
        })
    }

    /// Add `delta` to the recursive count of `start` and all its ancestors.
    fn propagate_from(&mut self, start: SpaceId, delta: i64) -> bool {
        let ancestors = self.ancestors(start);
        self.add_recursive(&[start], delta);
        self.add_recursive(&ancestors.ids, delta);
        ancestors.cycle_detected
    }

    fn add_recursive(&mut self, ids: &[SpaceId], delta: i64) {
        for id in ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.recursive_post_count += delta;
            }
        }
    }
}
