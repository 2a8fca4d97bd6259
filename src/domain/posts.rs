//! Posts filed under spaces.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::spaces::SpaceId;

pub type PostId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub space_id: SpaceId,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
