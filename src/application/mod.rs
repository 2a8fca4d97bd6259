//! Application services layer.

pub mod archive;
pub mod error;
pub mod posts;
pub mod repos;
pub mod spaces;
