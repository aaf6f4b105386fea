//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_REBUILD_TIMEOUT_MS: u64 = 5_000;

/// Configuration for the resolved-configuration cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a built snapshot is served before it goes stale.
    pub ttl_seconds: u64,
    /// Upper bound on one backing-store rebuild; overruns serve stale.
    pub rebuild_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            rebuild_timeout_ms: DEFAULT_REBUILD_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Rebuild timeout, clamped to at least one millisecond.
    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_millis(self.rebuild_timeout_ms.max(1))
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl_seconds.get(),
            rebuild_timeout_ms: settings.rebuild_timeout_ms.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_seconds, 300);
        assert_eq!(config.rebuild_timeout_ms, 5_000);
    }

    #[test]
    fn rebuild_timeout_clamps_to_one_ms() {
        let config = CacheConfig {
            rebuild_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.rebuild_timeout(), Duration::from_millis(1));
    }
}
