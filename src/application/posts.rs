use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreatePostParams, MovePostParams, PostsRepo, RepoError};
use crate::application::spaces::WriteGate;
use crate::cache::SpaceCache;
use crate::domain::posts::{PostId, PostRecord};
use crate::domain::spaces::SpaceId;

#[derive(Debug, Error)]
pub enum PostServiceError {
    #[error("{0} must not be empty")]
    ConstraintViolation(&'static str),
    #[error("post `{0}` not found")]
    NotFound(PostId),
    #[error("space `{0}` not found")]
    UnknownSpace(SpaceId),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub space_id: SpaceId,
    pub body: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MovePostCommand {
    pub id: PostId,
    pub space_id: SpaceId,
}

/// Post writes, each followed by the matching counter update on the space
/// cache.
#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostsRepo>,
    cache: Arc<SpaceCache>,
    gate: WriteGate,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostsRepo>, cache: Arc<SpaceCache>, gate: WriteGate) -> Self {
        Self { repo, cache, gate }
    }

    pub async fn list_posts(&self) -> Result<Vec<PostRecord>, PostServiceError> {
        self.repo.list_posts().await.map_err(PostServiceError::from)
    }

    pub async fn create_post(
        &self,
        command: CreatePostCommand,
    ) -> Result<PostRecord, PostServiceError> {
        let body = command.body.trim();
        if body.is_empty() {
            return Err(PostServiceError::ConstraintViolation("body"));
        }

        let _guard = self.gate.lock().await;
        self.ensure_space(command.space_id)?;

        let post = self
            .repo
            .create_post(CreatePostParams {
                space_id: command.space_id,
                body: body.to_string(),
            })
            .await?;
        self.cache.update_post_count(post.space_id, 1);

        info!(
            target = "canopy::posts",
            post_id = post.id,
            space_id = post.space_id,
            "post created"
        );
        Ok(post)
    }

    pub async fn delete_post(&self, id: PostId) -> Result<PostRecord, PostServiceError> {
        let _guard = self.gate.lock().await;
        let post = self.repo.delete_post(id).await.map_err(|err| match err {
            RepoError::NotFound => PostServiceError::NotFound(id),
            other => PostServiceError::Repo(other),
        })?;
        self.cache.update_post_count(post.space_id, -1);

        info!(
            target = "canopy::posts",
            post_id = id,
            space_id = post.space_id,
            "post deleted"
        );
        Ok(post)
    }

    /// Refile a post under another space.
    pub async fn move_post(
        &self,
        command: MovePostCommand,
    ) -> Result<PostRecord, PostServiceError> {
        let _guard = self.gate.lock().await;
        let current = self
            .repo
            .find_post(command.id)
            .await?
            .ok_or(PostServiceError::NotFound(command.id))?;
        if current.space_id == command.space_id {
            return Ok(current);
        }
        self.ensure_space(command.space_id)?;

        let post = self
            .repo
            .move_post(MovePostParams {
                id: command.id,
                space_id: command.space_id,
            })
            .await?;
        self.cache.update_post_count(current.space_id, -1);
        self.cache.update_post_count(post.space_id, 1);

        info!(
            target = "canopy::posts",
            post_id = post.id,
            from_space_id = current.space_id,
            to_space_id = post.space_id,
            "post moved"
        );
        Ok(post)
    }

    fn ensure_space(&self, id: SpaceId) -> Result<(), PostServiceError> {
        match self.cache.get(id) {
            Some(_) => Ok(()),
            None => Err(PostServiceError::UnknownSpace(id)),
        }
    }
}
