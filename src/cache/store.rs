//! Generic TTL snapshot store.
//!
//! Holds the last successfully built value, tracks its freshness, coalesces
//! concurrent rebuilds, and serves the previous value when a rebuild fails.
//!
//! Lifecycle: `Empty → Fresh → Stale → Fresh → …`. A `get_or_rebuild` call
//! against a Stale or Empty store triggers exactly one rebuild regardless of
//! how many callers observe the staleness concurrently; losers of the rebuild
//! race observe the winner's outcome after the rebuild lock is released.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::repos::RepoError;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "volto_config_cache_hit_total";
const METRIC_CACHE_MISS: &str = "volto_config_cache_miss_total";
const METRIC_REBUILD_FAIL: &str = "volto_config_rebuild_fail_total";
const METRIC_REBUILD_MS: &str = "volto_config_rebuild_ms";

/// Where the returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessSource {
    /// Served from the existing snapshot (fresh, or stale after a failed
    /// rebuild).
    Cache,
    /// Served from a snapshot rebuilt by this call.
    Rebuilt,
    /// No snapshot exists and the rebuild failed.
    Unavailable,
}

impl FreshnessSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Rebuilt => "rebuilt",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Freshness metadata accompanying every read.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    pub built_at: Option<OffsetDateTime>,
    pub ttl_remaining: Duration,
    pub source: FreshnessSource,
}

impl Freshness {
    fn unavailable() -> Self {
        Self {
            built_at: None,
            ttl_remaining: Duration::ZERO,
            source: FreshnessSource::Unavailable,
        }
    }

    pub fn ttl_remaining_seconds(&self) -> u64 {
        self.ttl_remaining.as_secs()
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    pub value: Option<Arc<T>>,
    pub freshness: Freshness,
}

/// One successfully built generation.
struct Generation<T> {
    value: Arc<T>,
    built_at: OffsetDateTime,
    expires_at: Instant,
}

struct Slot<T> {
    current: Option<Generation<T>>,
    /// Set by `invalidate`; cleared by the next successful rebuild.
    forced_stale: bool,
}

/// Process-wide TTL cache for a single snapshot value.
///
/// Created empty at startup and discarded at shutdown; the snapshot is never
/// mutated in place, only replaced wholesale.
pub struct CacheStore<T> {
    slot: RwLock<Slot<T>>,
    rebuild_lock: Mutex<()>,
    ttl: Duration,
    rebuild_timeout: Duration,
}

impl<T> CacheStore<T> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            slot: RwLock::new(Slot {
                current: None,
                forced_stale: false,
            }),
            rebuild_lock: Mutex::new(()),
            ttl: config.ttl(),
            rebuild_timeout: config.rebuild_timeout(),
        }
    }

    /// Forces Fresh → Stale immediately, independent of elapsed time.
    ///
    /// The previous value is kept so a failed follow-up rebuild can still
    /// serve it.
    pub fn invalidate(&self) {
        rw_write(&self.slot, SOURCE, "invalidate").forced_stale = true;
        debug!("Cache invalidated; next read rebuilds");
    }

    /// Returns the current value, rebuilding it when stale or missing.
    ///
    /// Rebuild failures and timeouts never surface as errors: the previous
    /// value is served (`source: cache`, zero TTL remaining), or an explicit
    /// unavailable read when the store has never been filled.
    pub async fn get_or_rebuild<F, Fut>(&self, rebuild: F) -> CacheRead<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        if let Some(read) = self.fresh_read("get.check") {
            counter!(METRIC_CACHE_HIT).increment(1);
            return read;
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let _guard = self.rebuild_lock.lock().await;

        // Re-check: a coalesced caller may find the winner's snapshot here
        // and must observe that outcome instead of rebuilding again.
        if let Some(read) = self.fresh_read("get.recheck") {
            return read;
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.rebuild_timeout, rebuild()).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Timeout),
        };
        histogram!(METRIC_REBUILD_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                let built_at = OffsetDateTime::now_utc();
                let mut slot = rw_write(&self.slot, SOURCE, "get.commit");
                slot.current = Some(Generation {
                    value: value.clone(),
                    built_at,
                    expires_at: Instant::now() + self.ttl,
                });
                slot.forced_stale = false;
                drop(slot);

                debug!(ttl_seconds = self.ttl.as_secs(), "Cache rebuilt");
                CacheRead {
                    value: Some(value),
                    freshness: Freshness {
                        built_at: Some(built_at),
                        ttl_remaining: self.ttl,
                        source: FreshnessSource::Rebuilt,
                    },
                }
            }
            Err(err) => {
                counter!(METRIC_REBUILD_FAIL).increment(1);
                let slot = rw_read(&self.slot, SOURCE, "get.stale_serve");
                match &slot.current {
                    Some(generation) => {
                        warn!(error = %err, "Cache rebuild failed; serving stale snapshot");
                        CacheRead {
                            value: Some(generation.value.clone()),
                            freshness: Freshness {
                                built_at: Some(generation.built_at),
                                ttl_remaining: Duration::ZERO,
                                source: FreshnessSource::Cache,
                            },
                        }
                    }
                    None => {
                        warn!(error = %err, "Cache rebuild failed with no prior snapshot");
                        CacheRead {
                            value: None,
                            freshness: Freshness::unavailable(),
                        }
                    }
                }
            }
        }
    }

    fn fresh_read(&self, op: &'static str) -> Option<CacheRead<T>> {
        let slot = rw_read(&self.slot, SOURCE, op);
        if slot.forced_stale {
            return None;
        }
        let generation = slot.current.as_ref()?;
        let now = Instant::now();
        if now >= generation.expires_at {
            return None;
        }
        Some(CacheRead {
            value: Some(generation.value.clone()),
            freshness: Freshness {
                built_at: Some(generation.built_at),
                ttl_remaining: generation.expires_at.saturating_duration_since(now),
                source: FreshnessSource::Cache,
            },
        })
    }
}
