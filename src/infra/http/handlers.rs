//! Configuration API handlers.
//!
//! These endpoints never fail: a source outage degrades to a stale or empty
//! payload with the outage visible in `cache_info.source`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use tracing::info;

use crate::infra::http::HttpState;
use crate::infra::http::models::{
    CacheInfo, FullConfigResponse, KeyConfigResponse, RefreshQuery,
};

/// `GET /api/app/config` — the full resolved configuration.
pub async fn get_config(
    State(state): State<HttpState>,
    Query(query): Query<RefreshQuery>,
) -> impl IntoResponse {
    let view = state.config.full_config(query.refresh).await;
    Json(FullConfigResponse::from_view(&view))
}

/// `POST /api/app/config/refresh` — force a rebuild and return the result.
pub async fn refresh_config(State(state): State<HttpState>) -> impl IntoResponse {
    info!("Configuration refresh requested");
    let view = state.config.full_config(true).await;
    Json(FullConfigResponse::from_view(&view))
}

/// `GET /api/app/config/{key}` — configuration for one lookup key.
///
/// Unknown keys are a 200 with the explicit unconfigured marker, not a 404:
/// callers treat "no prompt configured" as a normal state.
pub async fn get_config_for_key(
    State(state): State<HttpState>,
    Path(key): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> impl IntoResponse {
    let lookup = state.config.resolve(&key, query.refresh).await;
    Json(KeyConfigResponse {
        key: lookup.key,
        prompt: lookup.resolved.prompt,
        model: lookup.resolved.model,
        parameters: lookup.resolved.parameters,
        cache_info: CacheInfo::from_view(&lookup.view),
    })
}
