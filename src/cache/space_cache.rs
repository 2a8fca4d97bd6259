//! The space hierarchy cache.
//!
//! A write-through mirror of the persisted space forest. The service layer
//! writes to storage first and then applies the matching mutation here; the
//! cache never reads storage itself.
//!
//! One [`RwLock`] guards the node table and the hierarchy index together.
//! Each public method takes it exactly once, so readers only ever observe the
//! state between two public calls:
//!
//! - [`SpaceCache::set`] runs detach and attach under one write guard.
//! - [`SpaceCache::load`] swaps in every node and rebuilds the index under
//!   one write guard.
//! - [`SpaceCache::update_post_count`] adjusts the node and walks its
//!   ancestors under one write guard.
//! - [`SpaceCache::handle_hierarchy_change`] sums the moved subtree and
//!   adjusts both ancestor chains under one write guard.

use std::sync::RwLock;

use metrics::{counter, gauge};
use tracing::{debug, trace, warn};

use crate::domain::spaces::{SpaceId, SpaceNode};

use super::audit::CacheAudit;
use super::config::SpaceCacheConfig;
use super::lock::{rw_read, rw_write};
use super::store::SpaceTree;

const SOURCE: &str = "cache::space_cache";

pub struct SpaceCache {
    config: SpaceCacheConfig,
    tree: RwLock<SpaceTree>,
}

impl Default for SpaceCache {
    fn default() -> Self {
        Self::new(SpaceCacheConfig::default())
    }
}

impl SpaceCache {
    pub fn new(config: SpaceCacheConfig) -> Self {
        let tree = SpaceTree::with_capacity(config.initial_capacity);
        Self {
            config,
            tree: RwLock::new(tree),
        }
    }

    pub fn config(&self) -> &SpaceCacheConfig {
        &self.config
    }

    // ========================================================================
    // Node store
    // ========================================================================

    /// Insert or replace a space.
    ///
    /// When the space already exists under a different parent it is detached
    /// from the old child list before being attached to the new one.
    /// Attaching is idempotent. Counters are stored exactly as supplied and no
    /// aggregate is recomputed: follow a reparent with
    /// [`SpaceCache::handle_hierarchy_change`].
    pub fn set(&self, node: SpaceNode) {
        let id = node.id;
        let parent_id = node.parent_id;

        let mut tree = rw_write(&self.tree, SOURCE, "set");
        let previous = tree.upsert(node);
        let nodes = tree.len();
        drop(tree);

        let reparented = previous
            .as_ref()
            .is_some_and(|existing| existing.parent_id != parent_id);
        record_mutation("set", nodes);
        trace!(
            space_id = id,
            parent_id = ?parent_id,
            inserted = previous.is_none(),
            reparented,
            "space cached"
        );
    }

    pub fn get(&self, id: SpaceId) -> Option<SpaceNode> {
        rw_read(&self.tree, SOURCE, "get").nodes.get(&id).cloned()
    }

    /// Owned snapshot of every space, ordered by id.
    pub fn get_all(&self) -> Vec<SpaceNode> {
        let mut nodes: Vec<SpaceNode> = rw_read(&self.tree, SOURCE, "get_all")
            .nodes
            .values()
            .cloned()
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    /// Remove a space and detach it from its parent's child list.
    ///
    /// Refusing to delete a space that still has children is left to the
    /// caller.
    pub fn delete(&self, id: SpaceId) {
        let mut tree = rw_write(&self.tree, SOURCE, "delete");
        let removed = tree.remove(id);
        let nodes = tree.len();
        drop(tree);

        match removed {
            Some(_) => {
                record_mutation("delete", nodes);
                debug!(space_id = id, "space evicted");
            }
            None => record_noop("delete", id),
        }
    }

    /// Discard the hierarchy index and derive it again from every parent
    /// pointer.
    pub fn rebuild_hierarchy(&self) {
        let mut tree = rw_write(&self.tree, SOURCE, "rebuild_hierarchy");
        tree.rebuild_index();
        let nodes = tree.len();
        let parents = tree.children.len();
        drop(tree);

        record_mutation("rebuild_hierarchy", nodes);
        debug!(nodes, parents, "hierarchy index rebuilt");
    }

    /// Replace the whole cache with `nodes` and rebuild the index once.
    ///
    /// Same result as clearing, calling [`SpaceCache::set`] per node and then
    /// [`SpaceCache::rebuild_hierarchy`], without exposing the partially
    /// loaded state.
    pub fn load(&self, nodes: impl IntoIterator<Item = SpaceNode>) {
        let mut tree = rw_write(&self.tree, SOURCE, "load");
        tree.clear();
        tree.insert_all(nodes);
        tree.rebuild_index();
        let nodes = tree.len();
        drop(tree);

        record_mutation("load", nodes);
        debug!(nodes, "space cache loaded");
    }

    pub fn clear(&self) {
        rw_write(&self.tree, SOURCE, "clear").clear();
        record_mutation("clear", 0);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.tree, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spaces without a parent, ordered by id.
    pub fn roots(&self) -> Vec<SpaceId> {
        let mut roots: Vec<SpaceId> = rw_read(&self.tree, SOURCE, "roots")
            .nodes
            .values()
            .filter(|node| node.is_root())
            .map(|node| node.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Parent chain of `id`, nearest first.
    ///
    /// Stops at the first space seen twice instead of looping.
    pub fn get_ancestors(&self, id: SpaceId) -> Vec<SpaceId> {
        let walk = rw_read(&self.tree, SOURCE, "get_ancestors").ancestors(id);
        if walk.cycle_detected {
            record_cycle("get_ancestors", id);
        }
        walk.ids
    }

    pub fn get_children(&self, id: SpaceId) -> Vec<SpaceId> {
        rw_read(&self.tree, SOURCE, "get_children").children(id)
    }

    /// Every space below `id`, `id` excluded. Callers must not rely on the
    /// order.
    pub fn get_descendants(&self, id: SpaceId) -> Vec<SpaceId> {
        let walk = rw_read(&self.tree, SOURCE, "get_descendants").descendants(id);
        if walk.cycle_detected {
            record_cycle("get_descendants", id);
        }
        walk.ids
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Apply a post-count delta to `id` and to every ancestor's recursive
    /// count.
    ///
    /// Unknown spaces are ignored: the caller may have raced with a delete.
    pub fn update_post_count(&self, id: SpaceId, delta: i64) {
        let mut tree = rw_write(&self.tree, SOURCE, "update_post_count");
        let outcome = tree.apply_post_delta(id, delta);
        let nodes = tree.len();
        drop(tree);

        match outcome {
            Some(cycle_detected) => {
                if cycle_detected {
                    record_cycle("update_post_count", id);
                }
                record_mutation("update_post_count", nodes);
                trace!(space_id = id, delta, "post count updated");
            }
            None => record_noop("update_post_count", id),
        }
    }

    /// Move the posts of a reparented subtree from the old ancestor chain to
    /// the new one.
    ///
    /// Call after [`SpaceCache::set`] has stored the space under its new
    /// parent. The moved space's own counters are not touched, so the node
    /// passed to `set` must carry the counters it had before the move.
    pub fn handle_hierarchy_change(
        &self,
        id: SpaceId,
        old_parent_id: Option<SpaceId>,
        new_parent_id: Option<SpaceId>,
    ) {
        let mut tree = rw_write(&self.tree, SOURCE, "handle_hierarchy_change");
        let outcome = tree.apply_hierarchy_change(id, old_parent_id, new_parent_id);
        let nodes = tree.len();
        drop(tree);

        match outcome {
            Some(change) => {
                if change.cycle_detected {
                    record_cycle("handle_hierarchy_change", id);
                }
                record_mutation("handle_hierarchy_change", nodes);
                debug!(
                    space_id = id,
                    old_parent_id = ?old_parent_id,
                    new_parent_id = ?new_parent_id,
                    impact = change.impact,
                    moved = change.moved,
                    "hierarchy change applied"
                );
            }
            None => record_noop("handle_hierarchy_change", id),
        }
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Check every recursive count against its subtree and the index against
    /// the parent pointers.
    pub fn audit(&self) -> CacheAudit {
        rw_read(&self.tree, SOURCE, "audit").audit()
    }
}

fn record_mutation(op: &'static str, nodes: usize) {
    counter!("canopy_space_cache_mutation_total", "op" => op).increment(1);
    gauge!("canopy_space_cache_nodes").set(nodes as f64);
}

fn record_noop(op: &'static str, id: SpaceId) {
    counter!("canopy_space_cache_noop_total", "op" => op).increment(1);
    debug!(op, space_id = id, "space not cached; ignoring");
}

fn record_cycle(op: &'static str, id: SpaceId) {
    counter!("canopy_space_cache_cycle_total", "op" => op).increment(1);
    warn!(
        op,
        space_id = id,
        "space hierarchy contains a cycle; traversal stopped early"
    );
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn get_all_is_a_detached_snapshot() {
        let cache = SpaceCache::default();
        cache.set(SpaceNode::new(2, "two", None, 0));
        cache.set(SpaceNode::new(1, "one", None, 0));

        let mut snapshot = cache.get_all();
        assert_eq!(
            snapshot.iter().map(|node| node.id).collect::<Vec<_>>(),
            vec![1, 2]
        );

        snapshot[0].name = "mutated".to_string();
        assert_eq!(cache.get(1).expect("space 1").name, "one");
    }

    #[test]
    fn set_never_touches_counters() {
        let cache = SpaceCache::default();
        cache.set(SpaceNode::new(1, "one", None, 0));
        cache.set(SpaceNode::new(2, "two", Some(1), 1));
        cache.update_post_count(2, 4);

        let mut renamed = cache.get(2).expect("space 2");
        renamed.name = "renamed".to_string();
        cache.set(renamed);

        assert_eq!(cache.get(2).expect("space 2").post_count, 4);
        assert_eq!(cache.get(1).expect("space 1").recursive_post_count, 4);
        assert_eq!(cache.get_children(1), vec![2]);
    }

    #[test]
    fn delete_of_unknown_space_is_harmless() {
        let cache = SpaceCache::default();
        cache.set(SpaceNode::new(1, "one", None, 0));

        cache.delete(99);

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn roots_are_sorted() {
        let cache = SpaceCache::default();
        cache.load([
            SpaceNode::new(9, "nine", None, 0),
            SpaceNode::new(3, "three", None, 0),
            SpaceNode::new(4, "four", Some(3), 1),
        ]);

        assert_eq!(cache.roots(), vec![3, 9]);
    }

    #[test]
    fn load_replaces_previous_contents() {
        let cache = SpaceCache::default();
        cache.set(SpaceNode::new(7, "stale", None, 0));

        cache.load([SpaceNode::new(1, "one", None, 0)]);
        assert_eq!(cache.roots(), vec![1]);
        assert!(cache.get(7).is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get_children(1).is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = SpaceCache::default();
        cache.set(SpaceNode::new(1, "one", None, 0));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .tree
                .write()
                .expect("tree lock should be acquired");
            panic!("poison tree lock");
        }));

        cache.update_post_count(1, 1);
        assert_eq!(cache.get(1).expect("space 1").post_count, 1);
    }
}
