//! Cycle-safe walks over the space forest.
//!
//! The forest is expected to be acyclic, but a corrupted load may break
//! that. Every walk carries a visited set and stops at the first revisit, so
//! reads terminate with whatever was collected up to that point.

use std::collections::HashSet;

use crate::domain::spaces::SpaceId;

use super::store::SpaceTree;

/// Result of a walk: the ids reached, and whether a revisit cut it short.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(super) struct Walk {
    pub(super) ids: Vec<SpaceId>,
    pub(super) cycle_detected: bool,
}

impl SpaceTree {
    /// Parent chain of `id`, nearest first.
    ///
    /// A parent id that is not in the table is still reported, and ends the
    /// walk.
    pub(super) fn ancestors(&self, id: SpaceId) -> Walk {
        let mut walk = Walk::default();
        let mut visited = HashSet::from([id]);
        let mut next = self.nodes.get(&id).and_then(|node| node.parent_id);

        while let Some(parent) = next {
            if !visited.insert(parent) {
                walk.cycle_detected = true;
                break;
            }
            walk.ids.push(parent);
            next = self.nodes.get(&parent).and_then(|node| node.parent_id);
        }

        walk
    }

    pub(super) fn children(&self, id: SpaceId) -> Vec<SpaceId> {
        self.child_ids(id).to_vec()
    }

    /// Every space below `id` in depth-first pre-order, `id` excluded.
    pub(super) fn descendants(&self, id: SpaceId) -> Walk {
        let mut walk = Walk::default();
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<SpaceId> = self.child_ids(id).iter().rev().copied().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                walk.cycle_detected = true;
                continue;
            }
            walk.ids.push(current);
            stack.extend(self.child_ids(current).iter().rev().copied());
        }

        walk
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::spaces::SpaceNode;

    use super::*;

    fn tree(edges: &[(SpaceId, Option<SpaceId>)]) -> SpaceTree {
        let mut tree = SpaceTree::default();
        tree.insert_all(
            edges
                .iter()
                .map(|&(id, parent)| SpaceNode::new(id, format!("space-{id}"), parent, 0)),
        );
        tree.rebuild_index();
        tree
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tree = tree(&[(1, None), (2, Some(1)), (3, Some(2))]);

        let walk = tree.ancestors(3);

        assert_eq!(walk.ids, vec![2, 1]);
        assert!(!walk.cycle_detected);
        assert!(tree.ancestors(1).ids.is_empty());
        assert!(tree.ancestors(42).ids.is_empty());
    }

    #[test]
    fn ancestors_report_dangling_parent_and_stop() {
        let tree = tree(&[(2, Some(99)), (3, Some(2))]);

        assert_eq!(tree.ancestors(3).ids, vec![2, 99]);
    }

    #[test]
    fn descendants_are_pre_order() {
        let tree = tree(&[
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(1)),
            (5, Some(4)),
        ]);

        assert_eq!(tree.descendants(1).ids, vec![2, 3, 4, 5]);
        assert_eq!(tree.descendants(4).ids, vec![5]);
        assert!(tree.descendants(3).ids.is_empty());
    }

    #[test]
    fn walks_stop_on_parent_cycle() {
        let tree = tree(&[(1, Some(3)), (2, Some(1)), (3, Some(2))]);

        let up = tree.ancestors(1);
        assert_eq!(up.ids, vec![3, 2]);
        assert!(up.cycle_detected);

        let down = tree.descendants(1);
        assert_eq!(down.ids, vec![2, 3]);
        assert!(down.cycle_detected);
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let tree = tree(&[(7, Some(7))]);

        let up = tree.ancestors(7);
        assert!(up.ids.is_empty());
        assert!(up.cycle_detected);
        assert!(tree.descendants(7).ids.is_empty());
    }

    #[test]
    fn children_are_copied() {
        let tree = tree(&[(1, None), (2, Some(1)), (3, Some(1))]);

        let mut children = tree.children(1);
        children.push(99);

        assert_eq!(tree.child_ids(1), &[2, 3]);
    }
}
