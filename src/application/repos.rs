//! Repository traits describing persistence adapters.
//!
//! Rows returned by these traits carry no aggregate counters: `post_count`
//! and `recursive_post_count` are zero unless a method says otherwise. The
//! space cache owns the counters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::posts::{PostId, PostRecord};
use crate::domain::spaces::{SpaceId, SpaceNode};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("resource not found")]
    NotFound,
    #[error("integrity error: {message}")]
    Integrity { message: String },
}

impl RepoError {
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// A stored space with the number of posts filed directly under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceWithCount {
    pub space: SpaceNode,
    pub post_count: i64,
}

#[derive(Debug, Clone)]
pub struct CreateSpaceParams {
    pub name: String,
    pub description: String,
    pub parent_id: Option<SpaceId>,
    pub depth: u8,
}

#[derive(Debug, Clone)]
pub struct UpdateSpaceParams {
    pub id: SpaceId,
    pub name: String,
    pub description: String,
}

/// Reparent a space. Storage shifts the depth of the whole subtree by the
/// same amount as the moved space.
#[derive(Debug, Clone, Copy)]
pub struct MoveSpaceParams {
    pub id: SpaceId,
    pub parent_id: Option<SpaceId>,
    pub depth: u8,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub space_id: SpaceId,
    pub body: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MovePostParams {
    pub id: PostId,
    pub space_id: SpaceId,
}

#[async_trait]
pub trait SpacesRepo: Send + Sync {
    /// Every stored space with its direct post count.
    async fn list_with_counts(&self) -> Result<Vec<SpaceWithCount>, RepoError>;

    async fn find_space(&self, id: SpaceId) -> Result<Option<SpaceNode>, RepoError>;

    async fn create_space(&self, params: CreateSpaceParams) -> Result<SpaceNode, RepoError>;

    async fn update_space(&self, params: UpdateSpaceParams) -> Result<SpaceNode, RepoError>;

    async fn move_space(&self, params: MoveSpaceParams) -> Result<SpaceNode, RepoError>;

    async fn delete_space(&self, id: SpaceId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn move_post(&self, params: MovePostParams) -> Result<PostRecord, RepoError>;

    /// Delete a post, returning the removed row.
    async fn delete_post(&self, id: PostId) -> Result<PostRecord, RepoError>;
}
