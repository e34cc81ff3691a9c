// Rollup worker tests: one tick rolls recent samples, clears cached summaries and prunes;
// the spawned worker stops on shutdown. Backfill covers older hours.

mod common;

use chrono::{TimeDelta, Utc};
use common::{sample, service, temp_repo};
use metrics_rollup::backfill::run_backfill;
use metrics_rollup::models::*;
use metrics_rollup::query::Collection;
use metrics_rollup::rollup_repo::RollupFilter;
use metrics_rollup::rollup_worker::{RollupWorkerConfig, run_one_tick, spawn};
use std::sync::Arc;
use std::time::Duration;

fn worker_config() -> RollupWorkerConfig {
    RollupWorkerConfig {
        aggregation_interval_secs: 3600,
        reprocess_hours: 1,
        vacuum_schedule: None,
        vacuum_interval_secs: 86_400,
    }
}

fn sample_at(at: chrono::DateTime<Utc>, component_id: &str) -> MetricSample {
    MetricSample {
        timestamp: at,
        ..sample("2024-05-01T00:00:00Z", component_id, Some(80.0), 4, 1, 0.01)
    }
}

#[tokio::test]
async fn one_tick_rolls_recent_hours_clears_cache_and_prunes() {
    let (_dir, repo) = temp_repo().await;
    let svc = service(repo.clone());
    let now = Utc::now();

    repo.record_sample(&sample_at(now, "ollama-99")).await.unwrap();
    repo.record_sample(&sample_at(now - TimeDelta::hours(1), "ollama-99"))
        .await
        .unwrap();
    repo.record_sample(&sample_at(now - TimeDelta::days(120), "ollama-99"))
        .await
        .unwrap();

    let to = normalize_hour(now) + TimeDelta::hours(1);
    svc.summary(to - TimeDelta::hours(24), to).await.unwrap();
    assert_eq!(svc.cache().get_stats().size, 1);

    run_one_tick(&svc, &worker_config(), now).await.unwrap();

    let filter = RollupFilter::component("ollama-99");
    assert_eq!(repo.count(&filter).await.unwrap(), 2);
    assert_eq!(svc.cache().get_stats().size, 0);

    let latest = repo.latest_rollup("ollama-99").await.unwrap().unwrap();
    assert_eq!(latest.hour, normalize_hour(now));
    assert_eq!(latest.aggregates.error_rate, Some(0.25));

    let remaining = repo
        .get_samples_by_time_range(now - TimeDelta::days(365), now + TimeDelta::hours(1))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2, "samples past retention are pruned");
}

#[tokio::test]
async fn tick_without_samples_keeps_cache() {
    let (_dir, repo) = temp_repo().await;
    let svc = service(repo);
    let now = Utc::now();
    let to = normalize_hour(now) + TimeDelta::hours(1);
    svc.summary(to - TimeDelta::hours(1), to).await.unwrap();

    run_one_tick(&svc, &worker_config(), now).await.unwrap();
    assert_eq!(svc.cache().get_stats().size, 1);
}

#[tokio::test]
async fn backfill_rolls_older_hours() {
    let (_dir, repo) = temp_repo().await;
    let svc = service(repo.clone());
    let now = Utc::now();
    repo.record_sample(&sample_at(now - TimeDelta::hours(5), "agentx-main"))
        .await
        .unwrap();

    let written = run_backfill(&svc, 6).await.unwrap();
    assert_eq!(written, 1);
    let latest = repo.latest_rollup("agentx-main").await.unwrap().unwrap();
    assert_eq!(latest.hour, normalize_hour(now - TimeDelta::hours(5)));
}

#[tokio::test]
async fn spawned_worker_runs_first_tick_and_stops_on_shutdown() {
    let (_dir, repo) = temp_repo().await;
    let svc = Arc::new(service(repo.clone()));
    repo.record_sample(&sample_at(Utc::now(), "qdrant-1"))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = spawn(svc, worker_config(), shutdown_rx);

    // The interval's first tick fires immediately.
    let filter = RollupFilter::component("qdrant-1");
    let mut rolled = false;
    for _ in 0..100 {
        if repo.count(&filter).await.unwrap() == 1 {
            rolled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rolled, "worker should roll the current hour on its first tick");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
