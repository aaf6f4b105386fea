//! Wire models for the configuration API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use crate::application::config_service::ConfigView;
use crate::cache::Freshness;
use crate::domain::resolved::{InferenceParameters, InferenceSettings, PromptText};

#[derive(Debug, Deserialize, Default)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Freshness block attached to every configuration response.
#[derive(Debug, Serialize)]
pub struct CacheInfo {
    /// Snapshot build time, RFC 3339; absent when no snapshot exists.
    pub cached_at: Option<String>,
    pub ttl_seconds: u64,
    pub total_prompts: usize,
    pub total_settings: usize,
    pub skipped_rows: usize,
    pub source: &'static str,
}

impl CacheInfo {
    pub fn from_view(view: &ConfigView) -> Self {
        Self {
            cached_at: format_cached_at(&view.freshness),
            ttl_seconds: view.freshness.ttl_remaining_seconds(),
            total_prompts: view.snapshot.prompts.len(),
            total_settings: view.snapshot.settings.len(),
            skipped_rows: view.snapshot.skipped_rows,
            source: view.freshness.source.as_str(),
        }
    }
}

fn format_cached_at(freshness: &Freshness) -> Option<String> {
    freshness
        .built_at
        .and_then(|built_at| built_at.format(&Rfc3339).ok())
}

#[derive(Debug, Serialize)]
pub struct FullConfigResponse {
    pub prompts: HashMap<String, String>,
    pub openrouter_settings: HashMap<String, InferenceSettings>,
    pub cache_info: CacheInfo,
}

impl FullConfigResponse {
    pub fn from_view(view: &ConfigView) -> Self {
        Self {
            prompts: view.snapshot.prompts.clone(),
            openrouter_settings: view.snapshot.settings.clone(),
            cache_info: CacheInfo::from_view(view),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyConfigResponse {
    pub key: String,
    #[serde(flatten)]
    pub prompt: PromptText,
    pub model: String,
    pub parameters: InferenceParameters,
    pub cache_info: CacheInfo,
}
