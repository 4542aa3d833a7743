//! Configuration for the bincask engine

use std::time::Duration;

/// Engine configuration.
///
/// The bin count is not part of the configuration — it is fixed at store
/// creation, persisted in the manifest, and passed to [`open`] explicitly.
///
/// [`open`]: crate::engine::BincaskEngine::open
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each bin's LRU cache, in entries
    pub cache_capacity: usize,
    /// How often the background compactor sweeps the bins
    pub compaction_interval: Duration,
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be > 0".into());
        }
        if self.compaction_interval.as_millis() == 0 {
            return Err("compaction_interval must be > 0".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            compaction_interval: Duration::from_secs(30),
        }
    }
}
