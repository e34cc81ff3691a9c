// Background worker: re-roll recent hours from raw samples into metricshourlies, then prune
// old samples. Runs every aggregation_interval_secs when rollup.enable_worker is true.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use chrono::{DateTime, TimeDelta, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::AnalyticsService;
use crate::error::Result;
use crate::models::{RollupPayload, normalize_hour};
use crate::rollup_repo::{RollupRepo, aggregation};
use tracing::{debug, info, instrument, warn};

/// Config for the rollup worker.
#[derive(Debug, Clone)]
pub struct RollupWorkerConfig {
    pub aggregation_interval_secs: u64,
    /// Completed hours re-rolled each tick (late samples land in them), besides the current hour.
    pub reprocess_hours: u32,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// Spawns the rollup worker. It stops when `shutdown_rx` fires or its sender is dropped.
pub fn spawn(
    service: Arc<AnalyticsService>,
    config: RollupWorkerConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(service, config, shutdown_rx).await;
    })
}

#[instrument(skip(service, shutdown_rx), fields(interval_secs = config.aggregation_interval_secs))]
async fn run(
    service: Arc<AnalyticsService>,
    config: RollupWorkerConfig,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let mut rollup_interval =
        tokio::time::interval(Duration::from_secs(config.aggregation_interval_secs));
    rollup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let vacuum_handle = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = rollup_interval.tick() => {
                if let Err(e) = run_one_tick(&service, &config, Utc::now()).await {
                    warn!(error = %e, "rollup tick failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = service.repo().vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                debug!("rollup worker shutting down");
                break;
            }
        }
    }
    vacuum_handle.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: RollupWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Rolls samples of the hour containing `hour` into one rollup per component.
/// Re-running converges: each write is an upsert on (hour, component).
#[instrument(skip(repo), fields(operation = "rollup_hour"))]
pub async fn rollup_hour(repo: &RollupRepo, hour: DateTime<Utc>) -> Result<u32> {
    let start = normalize_hour(hour);
    let end = start + TimeDelta::hours(1);
    let samples = repo.get_samples_by_time_range(start, end).await?;

    let mut written: u32 = 0;
    for (component_id, aggregates) in aggregation::aggregate_by_component(&samples) {
        repo.upsert_rollup(&RollupPayload::new(start, component_id, aggregates))
            .await?;
        written += 1;
    }
    Ok(written)
}

/// Rolls `hours` completed hours before `now` plus the current hour, oldest first.
pub async fn rollup_recent_hours(
    repo: &RollupRepo,
    now: DateTime<Utc>,
    hours: u32,
) -> Result<u32> {
    let current = normalize_hour(now);
    let mut written: u32 = 0;
    for back in (0..=hours).rev() {
        written += rollup_hour(repo, current - TimeDelta::hours(i64::from(back))).await?;
    }
    Ok(written)
}

/// Runs one pass (re-roll recent hours, drop cached summaries, prune samples).
/// Used by the worker loop and by backfill.
pub async fn run_one_tick(
    service: &AnalyticsService,
    config: &RollupWorkerConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let repo = service.repo();
    let written = rollup_recent_hours(repo, now, config.reprocess_hours).await?;
    if written > 0 {
        service.cache().clear();
        info!(rollups_written = written, "samples -> hourly rollup");
    }

    let pruned = repo.prune_old_samples().await?;
    if pruned > 0 {
        debug!(samples_pruned = pruned, "old samples pruned");
    }
    Ok(())
}
