//! Space cache configuration.
//!
//! Built from the `[cache]` table of `canopy.toml`.

const DEFAULT_INITIAL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SpaceCacheConfig {
    /// Slots reserved up front for spaces and child lists.
    pub initial_capacity: usize,
    /// Audit counters and the hierarchy index after every startup load.
    pub audit_on_load: bool,
}

impl Default for SpaceCacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            audit_on_load: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for SpaceCacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            initial_capacity: settings.initial_capacity,
            audit_on_load: settings.audit_on_load,
        }
    }
}
