// Analytics service: the dashboard-facing layer over the rollup store. Reads go through the
// query monitor and retry policy; summaries are served from the TTL cache and invalidated
// on every rollup write.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{
    AnalyticsSummary, ComponentSummary, HourlyRollup, MetricSample, Page, PageOptions,
    RollupPayload, SampleMetric, SeriesPoint,
};
use crate::query::{QueryCache, QueryMonitor, RetryPolicy, paginated_query, retry_transient};
use crate::rollup_repo::{Document, RollupFilter, RollupRepo};

pub struct AnalyticsService {
    repo: Arc<RollupRepo>,
    cache: Arc<QueryCache<AnalyticsSummary>>,
    monitor: Arc<QueryMonitor>,
    retry: RetryPolicy,
}

impl AnalyticsService {
    pub fn new(
        repo: Arc<RollupRepo>,
        cache: Arc<QueryCache<AnalyticsSummary>>,
        monitor: Arc<QueryMonitor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repo,
            cache,
            monitor,
            retry,
        }
    }

    pub fn repo(&self) -> &Arc<RollupRepo> {
        &self.repo
    }

    pub fn cache(&self) -> &Arc<QueryCache<AnalyticsSummary>> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<QueryMonitor> {
        &self.monitor
    }

    /// Write path. Any cached summary may cover the written hour, so all are dropped.
    pub async fn upsert_rollup(&self, payload: &RollupPayload) -> Result<HourlyRollup> {
        let stored = self
            .monitor
            .observe("upsert_rollup", self.repo.upsert_rollup(payload))
            .await?;
        self.cache.clear();
        Ok(stored)
    }

    pub async fn record_sample(&self, sample: &MetricSample) -> Result<()> {
        self.monitor
            .observe("record_sample", self.repo.record_sample(sample))
            .await
    }

    pub async fn list_rollups(
        &self,
        filter: &RollupFilter,
        options: &PageOptions,
    ) -> Result<Page<Document>> {
        let repo = self.repo.as_ref();
        self.monitor
            .observe(
                "list_rollups",
                retry_transient(&self.retry, "list_rollups", || {
                    paginated_query(repo, filter, options)
                }),
            )
            .await
    }

    pub async fn latest_rollup(&self, component_id: &str) -> Result<HourlyRollup> {
        let repo = self.repo.as_ref();
        self.monitor
            .observe(
                "latest_rollup",
                retry_transient(&self.retry, "latest_rollup", || {
                    repo.latest_rollup(component_id)
                }),
            )
            .await?
            .ok_or_else(|| Error::NotFound(format!("no rollups for component '{}'", component_id)))
    }

    /// Chart series of one sample metric for `component_id` over [from, to].
    pub async fn sample_series(
        &self,
        component_id: &str,
        metric: SampleMetric,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>> {
        if from > to {
            return Err(Error::invalid("series window must satisfy from <= to"));
        }
        let repo = self.repo.as_ref();
        self.monitor
            .observe(
                "sample_series",
                retry_transient(&self.retry, "sample_series", || {
                    repo.get_sample_series(component_id, metric, from, to)
                }),
            )
            .await
    }

    pub async fn latest_sample(&self, component_id: &str) -> Result<MetricSample> {
        let repo = self.repo.as_ref();
        self.monitor
            .observe(
                "latest_sample",
                retry_transient(&self.retry, "latest_sample", || {
                    repo.latest_sample(component_id)
                }),
            )
            .await?
            .ok_or_else(|| Error::NotFound(format!("no samples for component '{}'", component_id)))
    }

    /// Totals across all components for hours in [from, to), cached per window.
    pub async fn summary(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<AnalyticsSummary> {
        if from >= to {
            return Err(Error::invalid("summary window must satisfy from < to"));
        }
        let key = format!("summary:{}:{}", from.timestamp_millis(), to.timestamp_millis());
        let repo = self.repo.as_ref();
        self.cache
            .get_or_fetch(&key, || async {
                let rollups = self
                    .monitor
                    .observe(
                        "rollups_in_range",
                        retry_transient(&self.retry, "rollups_in_range", || {
                            repo.rollups_in_range(from, to)
                        }),
                    )
                    .await?;
                Ok::<_, Error>(summarize(from, to, &rollups))
            })
            .await
    }
}

#[derive(Default)]
struct Totals {
    hours: u32,
    requests: i64,
    cost: f64,
    weighted_rt: f64,
    rt_weight: f64,
    rt_sum: f64,
    rt_hours: u32,
    failures: f64,
}

impl Totals {
    fn add(&mut self, r: &HourlyRollup) {
        let a = &r.aggregates;
        let requests = a.total_requests.unwrap_or(0).max(0);
        self.hours += 1;
        self.requests = self.requests.saturating_add(requests);
        self.cost += a.total_cost.unwrap_or(0.0);
        if let Some(rt) = a.avg_response_time {
            self.weighted_rt += rt * requests as f64;
            self.rt_weight += requests as f64;
            self.rt_sum += rt;
            self.rt_hours += 1;
        }
        if let Some(rate) = a.error_rate {
            self.failures += rate * requests as f64;
        }
    }

    fn avg_response_time(&self) -> Option<f64> {
        if self.rt_weight > 0.0 {
            Some(self.weighted_rt / self.rt_weight)
        } else if self.rt_hours > 0 {
            Some(self.rt_sum / self.rt_hours as f64)
        } else {
            None
        }
    }

    fn error_rate(&self) -> Option<f64> {
        (self.requests > 0).then(|| (self.failures / self.requests as f64).clamp(0.0, 1.0))
    }
}

/// Request-weighted roll-up of hourly rows into per-component and overall totals.
/// Hours without a request count fall back to an unweighted response-time mean.
pub fn summarize(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    rollups: &[HourlyRollup],
) -> AnalyticsSummary {
    let mut overall = Totals::default();
    let mut by_component: BTreeMap<&str, Totals> = BTreeMap::new();
    for r in rollups {
        overall.add(r);
        by_component
            .entry(r.component_id.as_str())
            .or_default()
            .add(r);
    }

    let components = by_component
        .into_iter()
        .map(|(id, t)| ComponentSummary {
            component_id: id.to_string(),
            hours: t.hours,
            total_requests: t.requests,
            total_cost: t.cost,
            avg_response_time: t.avg_response_time(),
            error_rate: t.error_rate(),
        })
        .collect();

    AnalyticsSummary {
        from,
        to,
        total_requests: overall.requests,
        total_cost: overall.cost,
        avg_response_time: overall.avg_response_time(),
        error_rate: overall.error_rate(),
        components,
    }
}
