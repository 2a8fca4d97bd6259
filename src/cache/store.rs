//! Node store and hierarchy index.
//!
//! [`SpaceTree`] is the state guarded by the facade's lock: the node table and
//! the derived `parent -> children` index, kept together so that one lock
//! covers both. Every method here assumes the caller already holds that lock.

use std::collections::HashMap;

use crate::domain::spaces::{SpaceId, SpaceNode};

#[derive(Debug, Default)]
pub(super) struct SpaceTree {
    pub(super) nodes: HashMap<SpaceId, SpaceNode>,
    pub(super) children: HashMap<SpaceId, Vec<SpaceId>>,
}

impl SpaceTree {
    pub(super) fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity),
            children: HashMap::with_capacity(capacity),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn child_ids(&self, parent: SpaceId) -> &[SpaceId] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert or replace `node`, moving it between child lists when its
    /// parent changed. Counters are stored as given.
    pub(super) fn upsert(&mut self, node: SpaceNode) -> Option<SpaceNode> {
        let previous_parent = self.nodes.get(&node.id).map(|existing| existing.parent_id);

        if let Some(Some(old_parent)) = previous_parent {
            if Some(old_parent) != node.parent_id {
                self.detach(old_parent, node.id);
            }
        }

        if let Some(parent) = node.parent_id {
            self.attach(parent, node.id);
        }

        self.nodes.insert(node.id, node)
    }

    /// Remove `id` from the table, its parent's child list and the index.
    pub(super) fn remove(&mut self, id: SpaceId) -> Option<SpaceNode> {
        let node = self.nodes.remove(&id)?;
        if let Some(parent) = node.parent_id {
            self.detach(parent, id);
        }
        self.children.remove(&id);
        Some(node)
    }

    /// Insert every node without touching the index; pair with
    /// [`SpaceTree::rebuild_index`].
    pub(super) fn insert_all(&mut self, nodes: impl IntoIterator<Item = SpaceNode>) {
        for node in nodes {
            self.nodes.insert(node.id, node);
        }
    }

    /// Discard the index and derive it again from every `parent_id`.
    ///
    /// Child lists come out sorted by id.
    pub(super) fn rebuild_index(&mut self) {
        self.children.clear();
        for node in self.nodes.values() {
            if let Some(parent) = node.parent_id {
                self.children.entry(parent).or_default().push(node.id);
            }
        }
        for ids in self.children.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    pub(super) fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
    }

    fn attach(&mut self, parent: SpaceId, child: SpaceId) {
        let ids = self.children.entry(parent).or_default();
        if !ids.contains(&child) {
            ids.push(child);
        }
    }

    fn detach(&mut self, parent: SpaceId, child: SpaceId) {
        if let Some(ids) = self.children.get_mut(&parent) {
            ids.retain(|&id| id != child);
            if ids.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: SpaceId, parent: Option<SpaceId>) -> SpaceNode {
        SpaceNode::new(id, format!("space-{id}"), parent, u8::from(parent.is_some()))
    }

    #[test]
    fn upsert_attaches_once() {
        let mut tree = SpaceTree::default();
        tree.upsert(node(1, None));
        tree.upsert(node(2, Some(1)));
        tree.upsert(node(2, Some(1)));

        assert_eq!(tree.child_ids(1), &[2]);
    }

    #[test]
    fn upsert_moves_between_child_lists() {
        let mut tree = SpaceTree::default();
        tree.upsert(node(1, None));
        tree.upsert(node(4, None));
        tree.upsert(node(2, Some(1)));
        tree.upsert(node(3, Some(1)));

        tree.upsert(node(2, Some(4)));

        assert_eq!(tree.child_ids(1), &[3]);
        assert_eq!(tree.child_ids(4), &[2]);
    }

    #[test]
    fn remove_prunes_parent_list_and_own_entry() {
        let mut tree = SpaceTree::default();
        tree.upsert(node(1, None));
        tree.upsert(node(2, Some(1)));
        tree.upsert(node(3, Some(2)));

        let removed = tree.remove(2).expect("space 2 present");

        assert_eq!(removed.id, 2);
        assert!(tree.child_ids(1).is_empty());
        assert!(!tree.children.contains_key(&1));
        assert!(!tree.children.contains_key(&2));
        assert!(tree.remove(2).is_none());
    }

    #[test]
    fn rebuild_index_matches_parent_pointers() {
        let mut tree = SpaceTree::default();
        tree.insert_all([node(1, None), node(5, Some(1)), node(3, Some(1)), node(9, Some(3))]);
        assert!(tree.children.is_empty());

        tree.rebuild_index();

        assert_eq!(tree.child_ids(1), &[3, 5]);
        assert_eq!(tree.child_ids(3), &[9]);
        assert!(tree.child_ids(9).is_empty());
    }
}
