use anyhow::Result;
use metrics_rollup::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let repo = Arc::new(
        rollup_repo::RollupRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.sample_retention_days,
        )
        .await?,
    );
    repo.init().await?;

    let service = Arc::new(analytics::AnalyticsService::new(
        repo,
        Arc::new(query::QueryCache::new(Duration::from_secs(
            app_config.cache.ttl_seconds,
        ))),
        Arc::new(query::QueryMonitor::new(
            app_config.query.slow_query_threshold(),
        )),
        app_config.query.retry_policy(),
    ));

    if app_config.rollup.backfill_hours > 0
        && let Err(e) = backfill::run_backfill(&service, app_config.rollup.backfill_hours).await
    {
        tracing::warn!(error = %e, "backfill failed");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = app_config.rollup.enable_worker.then(|| {
        rollup_worker::spawn(
            service.clone(),
            rollup_worker::RollupWorkerConfig {
                aggregation_interval_secs: app_config.rollup.aggregation_interval_secs,
                reprocess_hours: app_config.rollup.reprocess_hours,
                vacuum_schedule: app_config.rollup.vacuum_schedule.clone(),
                vacuum_interval_secs: app_config.rollup.vacuum_interval_secs,
            },
            shutdown_rx,
        )
    });

    let app = routes::app(service, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(version = version::VERSION, "Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
