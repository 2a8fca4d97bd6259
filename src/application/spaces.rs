use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::repos::{
    CreateSpaceParams, MoveSpaceParams, RepoError, SpacesRepo, UpdateSpaceParams,
};
use crate::cache::{CacheAudit, SpaceCache};
use crate::domain::error::DomainError;
use crate::domain::spaces::{SpaceId, SpaceNode, child_depth};

/// Serialises the service-layer write sequences (storage write, cache read,
/// cache write) that must not interleave with each other.
pub type WriteGate = Arc<Mutex<()>>;

#[derive(Debug, Error)]
pub enum SpaceServiceError {
    #[error("{0} must not be empty")]
    ConstraintViolation(&'static str),
    #[error("space `{0}` not found")]
    NotFound(SpaceId),
    #[error("space has {count} child spaces")]
    HasChildren { count: usize },
    #[error("space holds {count} posts")]
    InUse { count: i64 },
    #[error("space `{id}` cannot be moved beneath itself")]
    Cycle { id: SpaceId },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateSpaceCommand {
    pub name: String,
    pub description: String,
    pub parent_id: Option<SpaceId>,
}

#[derive(Debug, Clone)]
pub struct UpdateSpaceCommand {
    pub id: SpaceId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MoveSpaceCommand {
    pub id: SpaceId,
    /// `None` promotes the space to a root.
    pub parent_id: Option<SpaceId>,
}

/// A space and its subtree, as rendered by the tree view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceTreeView {
    pub id: SpaceId,
    pub name: String,
    pub depth: u8,
    pub post_count: i64,
    pub recursive_post_count: i64,
    pub children: Vec<SpaceTreeView>,
}

#[derive(Clone)]
pub struct SpaceService {
    repo: Arc<dyn SpacesRepo>,
    cache: Arc<SpaceCache>,
    gate: WriteGate,
    max_depth: u8,
}

impl SpaceService {
    pub fn new(repo: Arc<dyn SpacesRepo>, cache: Arc<SpaceCache>, max_depth: u8) -> Self {
        Self {
            repo,
            cache,
            gate: WriteGate::default(),
            max_depth,
        }
    }

    /// Gate shared with other services that write through the same cache.
    pub fn write_gate(&self) -> WriteGate {
        self.gate.clone()
    }

    pub fn cache(&self) -> &Arc<SpaceCache> {
        &self.cache
    }

    /// Mirror every stored space into the cache and seed its counters.
    ///
    /// Returns the audit taken after loading when `audit_on_load` is set.
    pub async fn load_cache(&self) -> Result<Option<CacheAudit>, SpaceServiceError> {
        let _guard = self.gate.lock().await;
        let rows = self.repo.list_with_counts().await?;

        let seeds: Vec<(SpaceId, i64)> = rows
            .iter()
            .map(|row| (row.space.id, row.post_count))
            .collect();
        self.cache.load(rows.into_iter().map(|row| SpaceNode {
            post_count: 0,
            recursive_post_count: 0,
            ..row.space
        }));
        for (id, count) in seeds.iter().copied().filter(|&(_, count)| count != 0) {
            self.cache.update_post_count(id, count);
        }

        info!(
            target = "canopy::spaces",
            spaces = seeds.len(),
            posts = seeds.iter().map(|&(_, count)| count).sum::<i64>(),
            "space cache loaded"
        );

        if !self.cache.config().audit_on_load {
            return Ok(None);
        }

        let audit = self.cache.audit();
        if !audit.is_consistent() {
            warn!(
                target = "canopy::spaces",
                drifts = audit.drifts.len(),
                index_mismatches = audit.index_mismatches.len(),
                "space cache is inconsistent after load"
            );
        }
        Ok(Some(audit))
    }

    pub fn find(&self, id: SpaceId) -> Result<SpaceNode, SpaceServiceError> {
        self.cache.get(id).ok_or(SpaceServiceError::NotFound(id))
    }

    pub async fn create_space(
        &self,
        command: CreateSpaceCommand,
    ) -> Result<SpaceNode, SpaceServiceError> {
        let name = normalize_name(&command.name)?;
        let description = command.description.trim().to_string();

        let _guard = self.gate.lock().await;
        let depth = match command.parent_id {
            Some(parent_id) => child_depth(self.find(parent_id)?.depth, self.max_depth)?,
            None => 0,
        };

        let space = self
            .repo
            .create_space(CreateSpaceParams {
                name,
                description,
                parent_id: command.parent_id,
                depth,
            })
            .await?;
        self.cache.set(space.clone());

        info!(
            target = "canopy::spaces",
            space_id = space.id,
            parent_id = ?space.parent_id,
            depth,
            "space created"
        );
        Ok(space)
    }

    /// Edit name and description. Counters and position are untouched.
    pub async fn update_space(
        &self,
        command: UpdateSpaceCommand,
    ) -> Result<SpaceNode, SpaceServiceError> {
        let name = normalize_name(&command.name)?;
        let description = command.description.trim().to_string();

        let _guard = self.gate.lock().await;
        let cached = self.find(command.id)?;

        let row = self
            .repo
            .update_space(UpdateSpaceParams {
                id: command.id,
                name,
                description,
            })
            .await?;
        let space = row.with_counters_from(&cached);
        self.cache.set(space.clone());

        info!(target = "canopy::spaces", space_id = space.id, "space updated");
        Ok(space)
    }

    /// Reparent a space together with its subtree.
    pub async fn move_space(
        &self,
        command: MoveSpaceCommand,
    ) -> Result<SpaceNode, SpaceServiceError> {
        let _guard = self.gate.lock().await;
        let current = self.find(command.id)?;
        if current.parent_id == command.parent_id {
            return Ok(current);
        }

        let descendants = self.cache.get_descendants(command.id);
        let depth = match command.parent_id {
            Some(parent_id) if parent_id == command.id || descendants.contains(&parent_id) => {
                return Err(SpaceServiceError::Cycle { id: command.id });
            }
            Some(parent_id) => child_depth(self.find(parent_id)?.depth, self.max_depth)?,
            None => 0,
        };

        let subtree: Vec<SpaceNode> = descendants
            .iter()
            .filter_map(|&id| self.cache.get(id))
            .collect();
        let height = subtree
            .iter()
            .map(|node| node.depth.saturating_sub(current.depth))
            .max()
            .unwrap_or(0);
        if depth.saturating_add(height) >= self.max_depth {
            return Err(DomainError::validation(format!(
                "moving space `{}` would nest spaces deeper than {} levels",
                command.id, self.max_depth
            ))
            .into());
        }

        let row = self
            .repo
            .move_space(MoveSpaceParams {
                id: command.id,
                parent_id: command.parent_id,
                depth,
            })
            .await?;

        // Storage rows carry no counters; keep the cached ones.
        let moved = row.with_counters_from(&current);
        self.cache.set(moved.clone());
        self.cache
            .handle_hierarchy_change(command.id, current.parent_id, command.parent_id);

        for node in subtree {
            let shifted = depth.saturating_add(node.depth.saturating_sub(current.depth));
            if shifted != node.depth {
                self.cache.set(SpaceNode {
                    depth: shifted,
                    ..node
                });
            }
        }

        info!(
            target = "canopy::spaces",
            space_id = command.id,
            old_parent_id = ?current.parent_id,
            new_parent_id = ?command.parent_id,
            depth,
            "space moved"
        );
        Ok(moved)
    }

    /// Delete an empty leaf space.
    pub async fn delete_space(&self, id: SpaceId) -> Result<(), SpaceServiceError> {
        let _guard = self.gate.lock().await;
        let current = self.find(id)?;

        let children = self.cache.get_children(id);
        if !children.is_empty() {
            return Err(SpaceServiceError::HasChildren {
                count: children.len(),
            });
        }
        if current.post_count != 0 {
            return Err(SpaceServiceError::InUse {
                count: current.post_count,
            });
        }

        self.repo.delete_space(id).await?;
        self.cache.delete(id);

        info!(target = "canopy::spaces", space_id = id, "space deleted");
        Ok(())
    }

    /// Nested view of the whole forest, roots and children ordered by id.
    pub fn tree(&self) -> Vec<SpaceTreeView> {
        let nodes = self.cache.get_all();
        let mut by_parent: HashMap<Option<SpaceId>, Vec<&SpaceNode>> = HashMap::new();
        for node in &nodes {
            by_parent.entry(node.parent_id).or_default().push(node);
        }

        let mut visited = HashSet::new();
        by_parent
            .get(&None)
            .into_iter()
            .flatten()
            .filter_map(|root| build_view(root, &by_parent, &mut visited))
            .collect()
    }
}

fn build_view(
    node: &SpaceNode,
    by_parent: &HashMap<Option<SpaceId>, Vec<&SpaceNode>>,
    visited: &mut HashSet<SpaceId>,
) -> Option<SpaceTreeView> {
    if !visited.insert(node.id) {
        return None;
    }

    let children = by_parent
        .get(&Some(node.id))
        .into_iter()
        .flatten()
        .filter_map(|child| build_view(child, by_parent, visited))
        .collect();

    Some(SpaceTreeView {
        id: node.id,
        name: node.name.clone(),
        depth: node.depth,
        post_count: node.post_count,
        recursive_post_count: node.recursive_post_count,
        children,
    })
}

fn normalize_name(name: &str) -> Result<String, SpaceServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SpaceServiceError::ConstraintViolation("name"));
    }
    Ok(trimmed.to_string())
}
