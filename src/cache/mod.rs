//! Canopy space cache.
//!
//! Keeps an in-memory mirror of the space forest with two counters per
//! space:
//!
//! - **Direct post count**: posts filed immediately under the space.
//! - **Recursive post count**: posts anywhere in the space's subtree.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! initial_capacity = 256
//! audit_on_load = true
//! ```

mod aggregate;
mod audit;
mod config;
pub(crate) mod lock;
mod space_cache;
mod store;
mod traversal;

pub use audit::{AggregateDrift, CacheAudit, IndexMismatch};
pub use config::SpaceCacheConfig;
pub use space_cache::SpaceCache;
