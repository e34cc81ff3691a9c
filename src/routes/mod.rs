// HTTP routes

mod http;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analytics::AnalyticsService;
use crate::config::AppConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<AnalyticsService>,
    pub(crate) config: AppConfig,
}

pub fn app(service: Arc<AnalyticsService>, config: AppConfig) -> Router {
    let state = AppState { service, config };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/api/metrics/hourly",
            post(http::upsert_rollup_handler).get(http::list_rollups_handler),
        ) // POST, GET /api/metrics/hourly
        .route(
            "/api/metrics/hourly/latest/{component_id}",
            get(http::latest_rollup_handler),
        ) // GET /api/metrics/hourly/latest/:component_id
        .route("/api/metrics/samples", post(http::record_sample_handler)) // POST /api/metrics/samples
        .route(
            "/api/metrics/samples/{component_id}",
            get(http::sample_series_handler),
        ) // GET /api/metrics/samples/:component_id?metric&from&to
        .route(
            "/api/metrics/samples/{component_id}/latest",
            get(http::latest_sample_handler),
        ) // GET /api/metrics/samples/:component_id/latest
        .route("/api/metrics/components", get(http::list_components_handler)) // GET /api/metrics/components
        .route("/api/analytics/summary", get(http::summary_handler)) // GET /api/analytics/summary
        .route("/api/cache/stats", get(http::cache_stats_handler)) // GET /api/cache/stats
        .route("/api/cache", delete(http::cache_clear_handler)) // DELETE /api/cache
        .route("/api/cache/{key}", delete(http::cache_invalidate_handler)) // DELETE /api/cache/:key
        .route("/api/query/stats", get(http::query_stats_handler)) // GET /api/query/stats
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
