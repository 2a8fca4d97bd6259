//! In-process repository adapter.
//!
//! Holds spaces and posts in ordered maps behind one async lock and mimics
//! what a relational store would report: rows carry no aggregate counters,
//! foreign keys are checked, and ids are assigned monotonically.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::archive::SpaceArchive;
use crate::application::repos::{
    CreatePostParams, CreateSpaceParams, MovePostParams, MoveSpaceParams, PostsRepo, RepoError,
    SpaceWithCount, SpacesRepo, UpdateSpaceParams,
};
use crate::domain::error::DomainError;
use crate::domain::posts::{PostId, PostRecord};
use crate::domain::spaces::{SpaceId, SpaceNode};

#[derive(Debug, Default)]
struct MemoryState {
    spaces: BTreeMap<SpaceId, SpaceNode>,
    posts: BTreeMap<PostId, PostRecord>,
    last_space_id: SpaceId,
    last_post_id: PostId,
}

impl MemoryState {
    fn space_mut(&mut self, id: SpaceId) -> Result<&mut SpaceNode, RepoError> {
        self.spaces.get_mut(&id).ok_or(RepoError::NotFound)
    }

    fn ensure_space(&self, id: SpaceId) -> Result<(), RepoError> {
        if self.spaces.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::integrity(format!("space `{id}` does not exist")))
        }
    }

    fn subtree_of(&self, id: SpaceId) -> Vec<SpaceId> {
        let mut found = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for space in self.spaces.values() {
                if space.parent_id == Some(current) && visited.insert(space.id) {
                    found.push(space.id);
                    frontier.push(space.id);
                }
            }
        }
        found
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    state: RwLock<MemoryState>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from an archive, keeping the archived ids.
    pub fn from_archive(archive: &SpaceArchive, max_depth: u8) -> Result<Self, DomainError> {
        let depths = archive.resolve_depths(max_depth)?;
        let now = OffsetDateTime::now_utc();

        let mut state = MemoryState::default();
        for space in &archive.spaces {
            let depth = depths.get(&space.id).copied().unwrap_or_default();
            state.spaces.insert(
                space.id,
                SpaceNode {
                    description: space.description.clone(),
                    created_at: space.created_at.unwrap_or(now),
                    ..SpaceNode::new(space.id, space.name.clone(), space.parent_id, depth)
                },
            );
        }
        for post in &archive.posts {
            state.posts.insert(
                post.id,
                PostRecord {
                    id: post.id,
                    space_id: post.space_id,
                    body: post.body.clone(),
                    created_at: post.created_at.unwrap_or(now),
                },
            );
        }
        state.last_space_id = state.spaces.keys().next_back().copied().unwrap_or(0);
        state.last_post_id = state.posts.keys().next_back().copied().unwrap_or(0);

        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

#[async_trait]
impl SpacesRepo for MemoryRepositories {
    async fn list_with_counts(&self) -> Result<Vec<SpaceWithCount>, RepoError> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<SpaceId, i64> = BTreeMap::new();
        for post in state.posts.values() {
            *counts.entry(post.space_id).or_default() += 1;
        }

        Ok(state
            .spaces
            .values()
            .map(|space| SpaceWithCount {
                space: space.clone(),
                post_count: counts.get(&space.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn find_space(&self, id: SpaceId) -> Result<Option<SpaceNode>, RepoError> {
        Ok(self.state.read().await.spaces.get(&id).cloned())
    }

    async fn create_space(&self, params: CreateSpaceParams) -> Result<SpaceNode, RepoError> {
        let mut state = self.state.write().await;
        if let Some(parent_id) = params.parent_id {
            state.ensure_space(parent_id)?;
        }

        state.last_space_id += 1;
        let space = SpaceNode {
            description: params.description,
            ..SpaceNode::new(
                state.last_space_id,
                params.name,
                params.parent_id,
                params.depth,
            )
        };
        state.spaces.insert(space.id, space.clone());
        Ok(space)
    }

    async fn update_space(&self, params: UpdateSpaceParams) -> Result<SpaceNode, RepoError> {
        let mut state = self.state.write().await;
        let space = state.space_mut(params.id)?;
        space.name = params.name;
        space.description = params.description;
        Ok(space.clone())
    }

    async fn move_space(&self, params: MoveSpaceParams) -> Result<SpaceNode, RepoError> {
        let mut state = self.state.write().await;
        if let Some(parent_id) = params.parent_id {
            state.ensure_space(parent_id)?;
        }
        let subtree = state.subtree_of(params.id);
        if params
            .parent_id
            .is_some_and(|parent_id| parent_id == params.id || subtree.contains(&parent_id))
        {
            return Err(RepoError::integrity(format!(
                "space `{}` cannot become its own ancestor",
                params.id
            )));
        }

        let space = state.space_mut(params.id)?;
        let shift = i16::from(params.depth) - i16::from(space.depth);
        space.parent_id = params.parent_id;
        space.depth = params.depth;
        let moved = space.clone();

        for id in subtree {
            let node = state.space_mut(id)?;
            node.depth = u8::try_from(i16::from(node.depth) + shift).map_err(|_| {
                RepoError::integrity(format!("space `{id}` would get a negative depth"))
            })?;
        }
        Ok(moved)
    }

    async fn delete_space(&self, id: SpaceId) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        if !state.spaces.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        if state.spaces.values().any(|space| space.parent_id == Some(id)) {
            return Err(RepoError::integrity(format!(
                "space `{id}` still has child spaces"
            )));
        }
        if state.posts.values().any(|post| post.space_id == id) {
            return Err(RepoError::integrity(format!("space `{id}` still holds posts")));
        }
        state.spaces.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.state.read().await.posts.values().cloned().collect())
    }

    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.state.read().await.posts.get(&id).cloned())
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_space(params.space_id)?;

        state.last_post_id += 1;
        let post = PostRecord {
            id: state.last_post_id,
            space_id: params.space_id,
            body: params.body,
            created_at: OffsetDateTime::now_utc(),
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn move_post(&self, params: MovePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_space(params.space_id)?;

        let post = state.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.space_id = params.space_id;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: PostId) -> Result<PostRecord, RepoError> {
        self.state
            .write()
            .await
            .posts
            .remove(&id)
            .ok_or(RepoError::NotFound)
    }
}
