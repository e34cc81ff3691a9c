// Hourly rollup computation: schema for raw samples + pure aggregation logic.
// DB access for samples (record, range reads, prune) stays in rollup_repo::samples.

use std::collections::BTreeMap;

use crate::models::{Aggregates, MetricSample};
use sqlx::SqlitePool;

/// Creates the metric_samples table and index if not present.
pub async fn init_samples_table(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metric_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            component_id TEXT NOT NULL,
            component_type TEXT NOT NULL,
            source TEXT NOT NULL,
            response_time_ms REAL,
            request_count INTEGER NOT NULL,
            failure_count INTEGER NOT NULL,
            total_cost REAL NOT NULL,
            health_status TEXT,
            UNIQUE (component_id, timestamp)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metric_samples_timestamp ON metric_samples(timestamp)",
    )
    .execute(pool)
    .await?;

    // Per-component series and latest-sample reads.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metric_samples_component_timestamp ON metric_samples(component_id, timestamp DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Aggregates one component's samples for an hour.
///
/// avgResponseTime: mean over samples that carry one (absent if none do).
/// totalRequests / totalCost: sums. errorRate: failures / requests in [0, 1], 0 with no requests.
pub fn aggregate_samples<'a>(
    samples: impl IntoIterator<Item = &'a MetricSample>,
) -> Option<Aggregates> {
    let mut count = 0usize;
    let mut response_times: Vec<f64> = Vec::new();
    let mut requests: i64 = 0;
    let mut failures: i64 = 0;
    let mut cost = 0.0;

    for s in samples {
        count += 1;
        if let Some(rt) = s.response_time_ms {
            response_times.push(rt);
        }
        requests = requests.saturating_add(s.request_count);
        failures = failures.saturating_add(s.failure_count);
        cost += s.total_cost;
    }
    if count == 0 {
        return None;
    }

    let avg_response_time = (!response_times.is_empty()).then(|| mean_f64(&response_times));
    let error_rate = if requests > 0 {
        (failures as f64 / requests as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(Aggregates {
        avg_response_time,
        total_requests: Some(requests),
        total_cost: Some(cost),
        error_rate: Some(error_rate),
    })
}

/// Group by component id (sorted), then aggregate each group.
pub fn aggregate_by_component(samples: &[MetricSample]) -> Vec<(String, Aggregates)> {
    let mut by_id: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
    for s in samples {
        by_id.entry(s.component_id.as_str()).or_default().push(s);
    }
    by_id
        .into_iter()
        .filter_map(|(id, refs)| aggregate_samples(refs).map(|a| (id.to_string(), a)))
        .collect()
}

fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}
