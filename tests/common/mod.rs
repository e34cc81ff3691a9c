// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use metrics_rollup::analytics::AnalyticsService;
use metrics_rollup::error::{Error, Result, TransientKind};
use metrics_rollup::models::*;
use metrics_rollup::query::{Collection, QueryCache, QueryMonitor, RetryPolicy};
use metrics_rollup::rollup_repo::RollupRepo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Fresh, initialised repo in a temp dir. Keep the TempDir alive for the test's duration.
pub async fn temp_repo() -> (TempDir, Arc<RollupRepo>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollups.db");
    let repo = RollupRepo::connect(path.to_str().unwrap(), 4, 90)
        .await
        .unwrap();
    repo.init().await.unwrap();
    (dir, Arc::new(repo))
}

pub fn service(repo: Arc<RollupRepo>) -> AnalyticsService {
    AnalyticsService::new(
        repo,
        Arc::new(QueryCache::new(Duration::from_secs(60))),
        Arc::new(QueryMonitor::default()),
        RetryPolicy::default(),
    )
}

pub fn aggregates(avg: f64, requests: i64, cost: f64, error_rate: f64) -> Aggregates {
    Aggregates {
        avg_response_time: Some(avg),
        total_requests: Some(requests),
        total_cost: Some(cost),
        error_rate: Some(error_rate),
    }
}

pub fn sample(at: &str, component_id: &str, rt: Option<f64>, requests: i64, failures: i64, cost: f64) -> MetricSample {
    MetricSample {
        timestamp: ts(at),
        component_id: component_id.into(),
        component_type: ComponentType::Ollama,
        source: SampleSource::HealthCheck,
        response_time_ms: rt,
        request_count: requests,
        failure_count: failures,
        total_cost: cost,
        health_status: None,
    }
}

pub fn network_error() -> Error {
    Error::Transient(TransientKind::Network("connection reset".into()))
}

/// In-memory collection of numbered records; counts calls.
pub struct VecCollection {
    pub items: Vec<u64>,
    pub count_calls: AtomicU32,
    pub find_calls: AtomicU32,
    pub fail_count: bool,
}

impl VecCollection {
    pub fn with_len(n: u64) -> Self {
        Self {
            items: (1..=n).collect(),
            count_calls: AtomicU32::new(0),
            find_calls: AtomicU32::new(0),
            fail_count: false,
        }
    }
}

/// Filter: keep items >= the value.
impl Collection for VecCollection {
    type Filter = u64;
    type Record = u64;

    fn default_sort(&self) -> Vec<SortKey> {
        vec![SortKey::asc("n")]
    }

    async fn count(&self, filter: &u64) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_count {
            return Err(Error::Permanent("count failed".into()));
        }
        Ok(self.items.iter().filter(|n| **n >= *filter).count() as u64)
    }

    async fn find(&self, filter: &u64, options: &FindOptions) -> Result<Vec<u64>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let mut matched: Vec<u64> = self.items.iter().copied().filter(|n| *n >= *filter).collect();
        if options.sort.first().map(|k| k.direction) == Some(SortDirection::Desc) {
            matched.reverse();
        }
        Ok(matched
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit.unwrap_or(u64::MAX) as usize)
            .collect())
    }
}

/// Fails `failures` times with `make_error`, then returns the attempt number.
pub struct FlakyCollection {
    pub attempts: AtomicU32,
    pub failures: u32,
    pub make_error: fn() -> Error,
}

impl FlakyCollection {
    pub fn new(failures: u32, make_error: fn() -> Error) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            failures,
            make_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Collection for FlakyCollection {
    type Filter = ();
    type Record = u32;

    fn default_sort(&self) -> Vec<SortKey> {
        Vec::new()
    }

    async fn count(&self, _filter: &()) -> Result<u64> {
        Ok(1)
    }

    async fn find(&self, _filter: &(), _options: &FindOptions) -> Result<Vec<u32>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err((self.make_error)());
        }
        Ok(vec![attempt])
    }
}
