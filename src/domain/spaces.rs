//! Spaces: the category tree under which posts are filed.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

/// Identifier of a space as assigned by persistent storage.
pub type SpaceId = i64;

/// Maximum number of levels in the space forest (root, level 1, level 2).
pub const MAX_SPACE_DEPTH: u8 = 3;

/// A space mirrored from persistent storage, together with its post counters.
///
/// `post_count` counts posts filed directly under the space.
/// `recursive_post_count` counts every post in the subtree rooted here,
/// the space itself included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceNode {
    pub id: SpaceId,
    pub name: String,
    pub description: String,
    pub parent_id: Option<SpaceId>,
    pub depth: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub post_count: i64,
    pub recursive_post_count: i64,
}

impl SpaceNode {
    /// A space with no posts yet.
    pub fn new(
        id: SpaceId,
        name: impl Into<String>,
        parent_id: Option<SpaceId>,
        depth: u8,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            parent_id,
            depth,
            created_at: OffsetDateTime::now_utc(),
            post_count: 0,
            recursive_post_count: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Copy the counters of `previous` onto `self`.
    ///
    /// Rows reloaded from storage carry no aggregate counters; callers that
    /// hand such a row to the cache must first carry the cached counters over.
    pub fn with_counters_from(mut self, previous: &SpaceNode) -> Self {
        self.post_count = previous.post_count;
        self.recursive_post_count = previous.recursive_post_count;
        self
    }
}

/// Depth a child of `parent_depth` would live at, if the forest allows it.
pub fn child_depth(parent_depth: u8, max_depth: u8) -> Result<u8, DomainError> {
    let depth = parent_depth.saturating_add(1);
    if depth >= max_depth {
        return Err(DomainError::validation(format!(
            "spaces may be nested at most {max_depth} levels deep"
        )));
    }
    Ok(depth)
}
