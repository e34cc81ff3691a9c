// One-time backfill: roll the last `hours` hours of existing samples at startup.

use chrono::Utc;
use tracing::info;

use crate::analytics::AnalyticsService;
use crate::rollup_worker::rollup_recent_hours;

/// Runs one rollup pass over `hours` completed hours plus the current hour.
pub async fn run_backfill(service: &AnalyticsService, hours: u32) -> anyhow::Result<u32> {
    let written = rollup_recent_hours(service.repo(), Utc::now(), hours).await?;
    service.cache().clear();
    info!(hours, rollups_written = written, "backfill complete");
    Ok(written)
}
