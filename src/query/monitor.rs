// Query timing: warns on slow queries, logs failures, never changes the result.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct QueryMonitor {
    slow_threshold: Duration,
    calls: AtomicU64,
    failures: AtomicU64,
    slow_queries: AtomicU64,
}

/// Counters since startup. A failed query counts under `failures` only, however long it
/// ran: `slow_queries` counts successful queries over the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub calls: u64,
    pub failures: u64,
    pub slow_queries: u64,
}

impl Default for QueryMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_QUERY_THRESHOLD)
    }
}

impl QueryMonitor {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            slow_queries: AtomicU64::new(0),
        }
    }

    /// Awaits `fut`, timing it under `name`.
    pub async fn observe<T, E, Fut>(&self, name: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = Instant::now();
        let result = fut.await;
        let duration = start.elapsed();
        let duration_ms = duration.as_millis() as u64;
        self.calls.fetch_add(1, Ordering::Relaxed);

        match &result {
            Ok(_) if duration > self.slow_threshold => {
                self.slow_queries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(query = name, duration_ms, "slow query detected");
            }
            Ok(_) => {
                tracing::trace!(query = name, duration_ms, "query ok");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(query = name, duration_ms, error = %e, "query failed");
            }
        }
        result
    }

    /// Wraps `query` so every call is observed under `name`.
    pub fn wrap<F>(self: &Arc<Self>, name: impl Into<String>, query: F) -> MonitoredQuery<F> {
        MonitoredQuery {
            name: name.into(),
            monitor: Arc::clone(self),
            query,
        }
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
        }
    }
}

/// A query function plus the monitor that times it.
pub struct MonitoredQuery<F> {
    name: String,
    monitor: Arc<QueryMonitor>,
    query: F,
}

impl<F> MonitoredQuery<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn monitor(&self) -> &Arc<QueryMonitor> {
        &self.monitor
    }

    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.monitor.observe(&self.name, (self.query)(args)).await
    }
}

/// Standalone wrapper with its own monitor at the default 1s threshold.
pub fn monitor_query<F>(name: impl Into<String>, query: F) -> MonitoredQuery<F> {
    Arc::new(QueryMonitor::default()).wrap(name, query)
}
