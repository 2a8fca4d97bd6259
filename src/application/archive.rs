//! Import/export of spaces and posts as a TOML archive.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    application::{
        error::AppError,
        repos::{PostsRepo, RepoError, SpacesRepo},
    },
    domain::{
        error::DomainError,
        posts::{PostId, PostRecord},
        spaces::{SpaceId, SpaceNode},
    },
    infra::error::InfraError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceArchive {
    #[serde(default)]
    pub spaces: Vec<ArchivedSpace>,
    #[serde(default)]
    pub posts: Vec<ArchivedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedSpace {
    pub id: SpaceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SpaceId>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPost {
    pub id: PostId,
    pub space_id: SpaceId,
    pub body: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl SpaceArchive {
    /// Order spaces and posts by id.
    pub fn normalize(&mut self) {
        self.spaces.sort_by_key(|space| space.id);
        self.posts.sort_by_key(|post| post.id);
    }

    /// Check referential integrity and compute the depth of every space.
    ///
    /// Rejects duplicate ids, unknown parents or spaces, parent cycles and
    /// nesting at or beyond `max_depth` levels.
    pub fn resolve_depths(&self, max_depth: u8) -> Result<HashMap<SpaceId, u8>, DomainError> {
        let mut parents = HashMap::with_capacity(self.spaces.len());
        for space in &self.spaces {
            if parents.insert(space.id, space.parent_id).is_some() {
                return Err(DomainError::validation(format!(
                    "duplicate space id `{}`",
                    space.id
                )));
            }
        }

        let mut depths = HashMap::with_capacity(parents.len());
        for &id in parents.keys() {
            let mut depth: u8 = 0;
            let mut visited = HashSet::from([id]);
            let mut next = parents[&id];
            while let Some(parent) = next {
                if !parents.contains_key(&parent) {
                    return Err(DomainError::validation(format!(
                        "space `{id}` references missing parent `{parent}`"
                    )));
                }
                if !visited.insert(parent) {
                    return Err(DomainError::validation(format!(
                        "space `{id}` is part of a parent cycle"
                    )));
                }
                depth = depth.saturating_add(1);
                next = parents[&parent];
            }
            if depth >= max_depth {
                return Err(DomainError::validation(format!(
                    "space `{id}` is nested {} levels deep; at most {max_depth} are allowed",
                    u16::from(depth) + 1
                )));
            }
            depths.insert(id, depth);
        }

        let mut post_ids = HashSet::with_capacity(self.posts.len());
        for post in &self.posts {
            if !post_ids.insert(post.id) {
                return Err(DomainError::validation(format!(
                    "duplicate post id `{}`",
                    post.id
                )));
            }
            if !parents.contains_key(&post.space_id) {
                return Err(DomainError::validation(format!(
                    "post `{}` references missing space `{}`",
                    post.id, post.space_id
                )));
            }
        }

        Ok(depths)
    }
}

impl From<&SpaceNode> for ArchivedSpace {
    fn from(space: &SpaceNode) -> Self {
        Self {
            id: space.id,
            name: space.name.clone(),
            description: space.description.clone(),
            parent_id: space.parent_id,
            created_at: Some(space.created_at),
        }
    }
}

impl From<&PostRecord> for ArchivedPost {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            space_id: post.space_id,
            body: post.body.clone(),
            created_at: Some(post.created_at),
        }
    }
}

pub fn parse_archive(data: &str) -> Result<SpaceArchive, AppError> {
    let mut archive: SpaceArchive = toml::from_str(data)
        .map_err(|err| AppError::validation(format!("invalid archive: {err}")))?;
    archive.normalize();
    Ok(archive)
}

/// Read a TOML archive from disk.
pub fn read_archive(path: &Path) -> Result<SpaceArchive, AppError> {
    let data = fs::read_to_string(path).map_err(|err| AppError::from(InfraError::Io(err)))?;
    parse_archive(&data)
}

/// Write `archive` to disk as TOML.
pub fn write_archive(path: &Path, archive: &SpaceArchive) -> Result<(), AppError> {
    let encoded = toml::to_string_pretty(archive)
        .map_err(|err| AppError::unexpected(format!("failed to encode archive: {err}")))?;
    fs::write(path, encoded).map_err(|err| AppError::from(InfraError::Io(err)))?;
    Ok(())
}

/// Collect everything stored behind the repositories into an archive.
pub async fn export_archive(
    spaces: &dyn SpacesRepo,
    posts: &dyn PostsRepo,
) -> Result<SpaceArchive, RepoError> {
    let spaces = spaces.list_with_counts().await?;
    let posts = posts.list_posts().await?;

    let mut archive = SpaceArchive {
        spaces: spaces
            .iter()
            .map(|row| ArchivedSpace::from(&row.space))
            .collect(),
        posts: posts.iter().map(ArchivedPost::from).collect(),
    };
    archive.normalize();
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use crate::domain::spaces::MAX_SPACE_DEPTH;

    use super::*;

    const SAMPLE: &str = r#"
[[spaces]]
id = 2
name = "Rust"
parent_id = 1

[[spaces]]
id = 1
name = "Programming"
description = "Code and tools"

[[spaces]]
id = 3
name = "Async"
parent_id = 2

[[posts]]
id = 10
space_id = 3
body = "Pinning, explained"
"#;

    #[test]
    fn parses_and_orders_archive() {
        let archive = parse_archive(SAMPLE).expect("valid archive");

        let ids: Vec<SpaceId> = archive.spaces.iter().map(|space| space.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(archive.spaces[0].description, "Code and tools");
        assert_eq!(archive.spaces[1].parent_id, Some(1));
        assert!(archive.spaces[0].created_at.is_none());
        assert_eq!(archive.posts.len(), 1);
    }

    #[test]
    fn resolves_depths() {
        let archive = parse_archive(SAMPLE).expect("valid archive");

        let depths = archive
            .resolve_depths(MAX_SPACE_DEPTH)
            .expect("archive within depth");

        assert_eq!(depths[&1], 0);
        assert_eq!(depths[&2], 1);
        assert_eq!(depths[&3], 2);
    }

    #[test]
    fn rejects_nesting_too_deep() {
        let archive = parse_archive(SAMPLE).expect("valid archive");

        assert!(archive.resolve_depths(2).is_err());
    }

    #[test]
    fn rejects_parent_cycle() {
        let archive = SpaceArchive {
            spaces: vec![
                ArchivedSpace {
                    id: 1,
                    name: "a".into(),
                    description: String::new(),
                    parent_id: Some(2),
                    created_at: None,
                },
                ArchivedSpace {
                    id: 2,
                    name: "b".into(),
                    description: String::new(),
                    parent_id: Some(1),
                    created_at: None,
                },
            ],
            posts: Vec::new(),
        };

        let err = archive
            .resolve_depths(MAX_SPACE_DEPTH)
            .expect_err("cycle rejected");
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn rejects_post_in_missing_space() {
        let mut archive = parse_archive(SAMPLE).expect("valid archive");
        archive.posts[0].space_id = 99;

        assert!(archive.resolve_depths(MAX_SPACE_DEPTH).is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_archive("[[spaces]]\nid = \"one\"").is_err());
    }
}
