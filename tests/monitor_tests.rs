// QueryMonitor tests: slow-query and failure accounting; results pass through unchanged

use metrics_rollup::error::Error;
use metrics_rollup::query::{MonitorStats, QueryMonitor, monitor_query};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn slow_success_is_counted_and_returned() {
    let monitor = QueryMonitor::default();
    let v = monitor
        .observe("slowRollups", async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok::<_, Error>(vec![1, 2, 3])
        })
        .await
        .unwrap();

    assert_eq!(v, vec![1, 2, 3]);
    assert_eq!(
        monitor.stats(),
        MonitorStats {
            calls: 1,
            failures: 0,
            slow_queries: 1,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn fast_success_is_not_slow() {
    let monitor = QueryMonitor::new(Duration::from_millis(200));
    monitor
        .observe("fast", async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap();
    assert_eq!(monitor.stats().slow_queries, 0);
    assert_eq!(monitor.stats().calls, 1);
}

#[tokio::test]
async fn failure_is_counted_and_error_passes_through() {
    let monitor = QueryMonitor::default();
    let err = monitor
        .observe("broken", async { Err::<(), _>(Error::NotFound("ollama-99".into())) })
        .await
        .unwrap_err();

    match err {
        Error::NotFound(id) => assert_eq!(id, "ollama-99"),
        other => panic!("unexpected error: {:?}", other),
    }
    let stats = monitor.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.slow_queries, 0);
}

#[tokio::test(start_paused = true)]
async fn wrapped_query_shares_its_monitor() {
    let monitor = Arc::new(QueryMonitor::new(Duration::from_millis(150)));
    let double = monitor.wrap("double", |n: u32| async move {
        tokio::time::sleep(Duration::from_millis(u64::from(n) * 100)).await;
        if n == 0 {
            Err(Error::invalid("n must be positive"))
        } else {
            Ok(n * 2)
        }
    });

    assert_eq!(double.name(), "double");
    assert_eq!(double.call(1).await.unwrap(), 2);
    assert_eq!(double.call(3).await.unwrap(), 6);
    assert!(double.call(0).await.is_err());

    assert!(Arc::ptr_eq(double.monitor(), &monitor));
    assert_eq!(
        monitor.stats(),
        MonitorStats {
            calls: 3,
            failures: 1,
            slow_queries: 1,
        }
    );
}

#[tokio::test]
async fn monitor_query_wraps_with_default_threshold() {
    let lookup = monitor_query("lookup", |id: &'static str| async move {
        Ok::<_, String>(id.len())
    });
    assert_eq!(lookup.call("agentx-main").await, Ok(11));
    assert_eq!(lookup.monitor().stats().calls, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_failure_counts_as_failure_only() {
    let monitor = QueryMonitor::default();
    let result = monitor
        .observe("slowAndBroken", async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            Err::<(), _>(Error::Permanent("constraint violated".into()))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(
        monitor.stats(),
        MonitorStats {
            calls: 1,
            failures: 1,
            slow_queries: 0,
        }
    );
}
