// Retry tests: transient-only retries, exponential backoff, exhaustion, per-attempt timeout

mod common;

use common::{FlakyCollection, network_error};
use metrics_rollup::error::{Error, TransientKind};
use metrics_rollup::models::FindOptions;
use metrics_rollup::query::{RetryPolicy, find_with_retry, retry_transient};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn backoff_doubles_from_base() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(1), Duration::ZERO);
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
    assert_eq!(policy.max_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();
    let v = retry_transient(&RetryPolicy::default(), "flaky", || async {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 3 { Err(network_error()) } else { Ok(n) }
    })
    .await
    .unwrap();

    assert_eq!(v, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 200ms before the second attempt, 400ms before the third.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(700), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn non_transient_error_is_not_retried() {
    let calls = AtomicU32::new(0);
    let err = retry_transient(&RetryPolicy::default(), "validate", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(Error::invalid("hour is required"))
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_return_last_error() {
    let calls = AtomicU32::new(0);
    let err = retry_transient(&RetryPolicy::with_max_attempts(4), "down", || async {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err::<(), _>(Error::Transient(TransientKind::Network(format!("attempt {}", n))))
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        Error::Transient(TransientKind::Network(msg)) => assert_eq!(msg, "attempt 4"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn zero_max_attempts_still_runs_once() {
    let calls = AtomicU32::new(0);
    let v = retry_transient(&RetryPolicy::with_max_attempts(0), "once", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Error>(1)
    })
    .await
    .unwrap();
    assert_eq!(v, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_timeout_counts_as_transient() {
    let policy = RetryPolicy {
        max_attempts: 2,
        attempt_timeout: Some(Duration::from_millis(50)),
        ..RetryPolicy::default()
    };
    let calls = AtomicU32::new(0);
    let err = retry_transient(&policy, "stalled", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, Error>(())
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(err, Error::Transient(TransientKind::Timeout(_))));
}

#[tokio::test(start_paused = true)]
async fn find_with_retry_recovers_from_network_errors() {
    let coll = FlakyCollection::new(2, network_error);
    let records = find_with_retry(&coll, &(), &FindOptions::default(), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(records, vec![3]);
    assert_eq!(coll.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn find_with_retry_gives_up_on_permanent_errors() {
    let coll = FlakyCollection::new(5, || Error::Permanent("schema mismatch".into()));
    let err = find_with_retry(&coll, &(), &FindOptions::default(), &RetryPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Permanent(_)));
    assert_eq!(coll.attempts(), 1);
}

struct StalledCollection {
    attempts: AtomicU32,
}

impl metrics_rollup::query::Collection for StalledCollection {
    type Filter = ();
    type Record = u32;

    fn default_sort(&self) -> Vec<metrics_rollup::models::SortKey> {
        Vec::new()
    }

    async fn count(&self, _filter: &()) -> metrics_rollup::error::Result<u64> {
        Ok(1)
    }

    async fn find(&self, _filter: &(), _options: &FindOptions) -> metrics_rollup::error::Result<Vec<u32>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(vec![1])
    }
}

#[tokio::test(start_paused = true)]
async fn find_with_retry_enforces_max_time_per_attempt() {
    let coll = StalledCollection {
        attempts: AtomicU32::new(0),
    };
    let options = FindOptions {
        max_time: Some(Duration::from_millis(50)),
        ..FindOptions::default()
    };
    let start = Instant::now();
    let err = find_with_retry(&coll, &(), &options, &RetryPolicy::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transient(TransientKind::Timeout(_))), "{:?}", err);
    assert_eq!(coll.attempts.load(Ordering::SeqCst), 3);
    // Three 50ms budgets plus 200ms and 400ms of backoff, nowhere near the 10s stall.
    assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
}
