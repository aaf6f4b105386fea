//! Orchestrates cache reads, rebuilds, and persona lookups.

use std::sync::Arc;

use tracing::{debug, info};

use crate::application::repos::ConfigSourceRepo;
use crate::application::resolver::{ConfigSnapshot, build_snapshot};
use crate::cache::{CacheConfig, CacheStore, Freshness};
use crate::domain::resolved::ResolvedConfig;

/// The full resolved configuration plus the freshness of the snapshot that
/// produced it.
pub struct ConfigView {
    pub snapshot: Arc<ConfigSnapshot>,
    pub freshness: Freshness,
}

/// A single-persona lookup plus the view it was resolved against.
pub struct ConfigLookup {
    pub key: String,
    pub resolved: ResolvedConfig,
    pub view: ConfigView,
}

/// Front door for resolved persona configuration.
///
/// Every read goes through the snapshot cache; callers never observe a
/// half-built generation because the snapshot is swapped in whole. Reads are
/// infallible by design: a source outage degrades to a stale or empty view,
/// signalled through the freshness metadata, never through an error.
pub struct ConfigService {
    repo: Arc<dyn ConfigSourceRepo>,
    store: CacheStore<ConfigSnapshot>,
}

impl ConfigService {
    pub fn new(repo: Arc<dyn ConfigSourceRepo>, cache: &CacheConfig) -> Self {
        Self {
            repo,
            store: CacheStore::new(cache),
        }
    }

    /// Returns the current snapshot, rebuilding it when stale or when the
    /// caller demands a refresh.
    ///
    /// When the source is down and no prior snapshot exists, the view is an
    /// empty snapshot marked unavailable.
    pub async fn full_config(&self, force_refresh: bool) -> ConfigView {
        if force_refresh {
            debug!("Forced refresh requested");
            self.store.invalidate();
        }

        let repo = self.repo.clone();
        let read = self
            .store
            .get_or_rebuild(move || async move {
                let source = repo.load_config_source().await?;
                let snapshot = build_snapshot(source);
                info!(
                    prompts = snapshot.prompts.len(),
                    settings = snapshot.settings.len(),
                    skipped_rows = snapshot.skipped_rows,
                    "Configuration snapshot rebuilt"
                );
                Ok(snapshot)
            })
            .await;

        ConfigView {
            snapshot: read.value.unwrap_or_default(),
            freshness: read.freshness,
        }
    }

    /// Resolves one lookup key against the current snapshot.
    ///
    /// Unknown keys are not an error; they resolve to the explicit
    /// unconfigured marker.
    pub async fn resolve(&self, key: &str, force_refresh: bool) -> ConfigLookup {
        let view = self.full_config(force_refresh).await;
        let resolved = view.snapshot.resolve(key);
        ConfigLookup {
            key: key.to_string(),
            resolved,
            view,
        }
    }
}
