//! Canopy: a micro-blog whose posts live in a shallow forest of spaces, with
//! an in-memory hierarchy cache that keeps recursive post counts current.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
