use thiserror::Error;

use crate::{
    application::{posts::PostServiceError, repos::RepoError, spaces::SpaceServiceError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Error surfaced by the `canopy` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => 3,
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => 2,
            AppError::Infra(_) | AppError::Domain(DomainError::Invariant { .. }) => 1,
            AppError::Unexpected(_) => 1,
        }
    }
}

impl From<RepoError> for AppError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => AppError::NotFound("record".to_string()),
            RepoError::Integrity { message } => AppError::Validation(message),
        }
    }
}

impl From<SpaceServiceError> for AppError {
    fn from(error: SpaceServiceError) -> Self {
        match error {
            SpaceServiceError::NotFound(id) => AppError::NotFound(format!("space `{id}`")),
            SpaceServiceError::Domain(err) => AppError::Domain(err),
            SpaceServiceError::Repo(err) => AppError::from(err),
            other @ (SpaceServiceError::ConstraintViolation(_)
            | SpaceServiceError::HasChildren { .. }
            | SpaceServiceError::InUse { .. }
            | SpaceServiceError::Cycle { .. }) => AppError::validation(other.to_string()),
        }
    }
}

impl From<PostServiceError> for AppError {
    fn from(error: PostServiceError) -> Self {
        match error {
            PostServiceError::NotFound(id) => AppError::NotFound(format!("post `{id}`")),
            PostServiceError::UnknownSpace(id) => AppError::NotFound(format!("space `{id}`")),
            PostServiceError::Repo(err) => AppError::from(err),
            other @ PostServiceError::ConstraintViolation(_) => {
                AppError::validation(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_exit_codes() {
        let not_found = AppError::from(SpaceServiceError::NotFound(4));
        assert_eq!(not_found.exit_code(), 3);
        assert_eq!(not_found.to_string(), "resource not found: space `4`");

        let in_use = AppError::from(SpaceServiceError::InUse { count: 2 });
        assert_eq!(in_use.exit_code(), 2);

        let integrity = AppError::from(PostServiceError::Repo(RepoError::integrity(
            "space `9` does not exist",
        )));
        assert_eq!(integrity.exit_code(), 2);
        assert_eq!(
            integrity.to_string(),
            "validation failed: space `9` does not exist"
        );

        let missing = AppError::from(PostServiceError::Repo(RepoError::NotFound));
        assert_eq!(missing.exit_code(), 3);
    }
}
