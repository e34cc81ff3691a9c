// JSON handlers for rollups, samples, analytics and cache administration

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use super::AppState;
use crate::error::Error;
use crate::models::{
    DEFAULT_PAGE, MetricSample, PageOptions, RollupPayload, SampleMetric, normalize_hour,
    parse_fields, parse_sort,
};
use crate::rollup_repo::RollupFilter;
use crate::version::VersionInfo;

/// Summary and series window used when the caller gives no bounds.
const DEFAULT_WINDOW_HOURS: i64 = 24;

/// GET /version
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(VersionInfo::current())
}

/// POST /api/metrics/hourly: upsert one rollup; returns the stored, hour-normalized record.
pub(super) async fn upsert_rollup_handler(
    State(state): State<AppState>,
    Json(payload): Json<RollupPayload>,
) -> Result<impl IntoResponse, Error> {
    let stored = state.service.upsert_rollup(&payload).await?;
    Ok(Json(stored))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListParams {
    component_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    min_error_rate: Option<f64>,
    page: Option<u64>,
    limit: Option<u64>,
    /// "-hour,componentId"
    sort: Option<String>,
    select: Option<String>,
    populate: Option<String>,
}

/// GET /api/metrics/hourly: one page of rollups; limit is capped by query.max_page_limit.
pub(super) async fn list_rollups_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, Error> {
    let q = &state.config.query;
    let filter = RollupFilter {
        component_id: params.component_id,
        from: params.from,
        to: params.to,
        min_error_rate: params.min_error_rate,
    };
    let options = PageOptions {
        page: params.page.unwrap_or(DEFAULT_PAGE),
        limit: params
            .limit
            .unwrap_or(q.default_page_limit)
            .min(q.max_page_limit),
        sort: params.sort.as_deref().map(parse_sort),
        select: params.select.as_deref().map(parse_fields),
        populate: params.populate.as_deref().map(parse_fields),
        max_time: Some(q.query_timeout()),
    };
    let page = state.service.list_rollups(&filter, &options).await?;
    Ok(Json(page))
}

pub(super) async fn latest_rollup_handler(
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let rollup = state.service.latest_rollup(&component_id).await?;
    Ok(Json(rollup))
}

/// POST /api/metrics/samples: idempotent on (componentId, timestamp).
pub(super) async fn record_sample_handler(
    State(state): State<AppState>,
    Json(sample): Json<MetricSample>,
) -> Result<impl IntoResponse, Error> {
    state.service.record_sample(&sample).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SeriesParams {
    /// responseTimeMs (default), requestCount, failureCount or totalCost.
    metric: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// GET /api/metrics/samples/{componentId}: `{x, y}` points, default window the last 24 hours.
pub(super) async fn sample_series_handler(
    State(state): State<AppState>,
    Path(component_id): Path<String>,
    Query(params): Query<SeriesParams>,
) -> Result<impl IntoResponse, Error> {
    let metric = match params.metric.as_deref() {
        Some(m) => m.parse()?,
        None => SampleMetric::ResponseTimeMs,
    };
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params
        .from
        .unwrap_or_else(|| to - TimeDelta::hours(DEFAULT_WINDOW_HOURS));
    let points = state
        .service
        .sample_series(&component_id, metric, from, to)
        .await?;
    Ok(Json(points))
}

pub(super) async fn latest_sample_handler(
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let sample = state.service.latest_sample(&component_id).await?;
    Ok(Json(sample))
}

pub(super) async fn list_components_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let components = state.service.repo().list_components().await?;
    Ok(Json(components))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SummaryParams {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// GET /api/analytics/summary: defaults to the 24 hours ending with the current hour.
pub(super) async fn summary_handler(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, Error> {
    let to = params
        .to
        .unwrap_or_else(|| normalize_hour(Utc::now()) + TimeDelta::hours(1));
    let from = params
        .from
        .unwrap_or_else(|| to - TimeDelta::hours(DEFAULT_WINDOW_HOURS));
    let summary = state.service.summary(from, to).await?;
    Ok(Json(summary))
}

pub(super) async fn cache_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.cache().get_stats())
}

pub(super) async fn cache_clear_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.service.cache().clear();
    StatusCode::NO_CONTENT
}

pub(super) async fn cache_invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    state.service.cache().invalidate(&key);
    StatusCode::NO_CONTENT
}

pub(super) async fn query_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.monitor().stats())
}
