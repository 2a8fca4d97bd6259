//! Consistency audit of the cached forest.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::spaces::SpaceId;

use super::store::SpaceTree;

/// A space whose recursive count disagrees with its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateDrift {
    pub id: SpaceId,
    /// `post_count` plus the recursive counts of the direct children.
    pub expected: i64,
    pub actual: i64,
}

/// Disagreement between the hierarchy index and the parent pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexMismatch {
    /// The child points at the parent but is missing from its child list.
    Missing { parent: SpaceId, child: SpaceId },
    /// The child list names a space that is gone or points elsewhere.
    Stale { parent: SpaceId, child: SpaceId },
    /// The child list names the same space more than once.
    Duplicate { parent: SpaceId, child: SpaceId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheAudit {
    pub nodes: usize,
    pub drifts: Vec<AggregateDrift>,
    pub index_mismatches: Vec<IndexMismatch>,
}

impl CacheAudit {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty() && self.index_mismatches.is_empty()
    }
}

impl SpaceTree {
    pub(super) fn audit(&self) -> CacheAudit {
        let mut by_parent: HashMap<SpaceId, Vec<SpaceId>> = HashMap::new();
        for node in self.nodes.values() {
            if let Some(parent) = node.parent_id {
                by_parent.entry(parent).or_default().push(node.id);
            }
        }

        let mut drifts: Vec<AggregateDrift> = self
            .nodes
            .values()
            .filter_map(|node| {
                let children_total: i64 = by_parent
                    .get(&node.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|child| self.nodes.get(child))
                    .map(|child| child.recursive_post_count)
                    .sum();
                let expected = node.post_count + children_total;
                (expected != node.recursive_post_count).then_some(AggregateDrift {
                    id: node.id,
                    expected,
                    actual: node.recursive_post_count,
                })
            })
            .collect();
        drifts.sort_by_key(|drift| drift.id);

        let mut index_mismatches = Vec::new();
        for (&parent, children) in &by_parent {
            let listed = self.child_ids(parent);
            for &child in children {
                if !listed.contains(&child) {
                    index_mismatches.push(IndexMismatch::Missing { parent, child });
                }
            }
        }
        for (&parent, listed) in &self.children {
            let mut seen = HashSet::new();
            for &child in listed {
                if !seen.insert(child) {
                    index_mismatches.push(IndexMismatch::Duplicate { parent, child });
                    continue;
                }
                let points_here = self
                    .nodes
                    .get(&child)
                    .is_some_and(|node| node.parent_id == Some(parent));
                if !points_here {
                    index_mismatches.push(IndexMismatch::Stale { parent, child });
                }
            }
        }
        index_mismatches.sort_by_key(|mismatch| match *mismatch {
            IndexMismatch::Missing { parent, child }
            | IndexMismatch::Stale { parent, child }
            | IndexMismatch::Duplicate { parent, child } => (parent, child),
        });

        CacheAudit {
            nodes: self.nodes.len(),
            drifts,
            index_mismatches,
        }
    }
}
