use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::Error;

#[tokio::test]
async fn test_backoff_returns_first_success() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            if current == 0 {
                Err(Error::Fatal("first attempt fails".to_string()))
            } else {
                Ok::<_, crate::Error>(current)
            }
        }
    };

    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 1000,
        base_delay_ms: 10,
        max_delay_ms: 100,
    };

    let result = task_with_timeout_and_exponential_backoff("unit", task, &policy).await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2); // 1 failure + 1 success
}

#[tokio::test]
async fn test_backoff_stops_after_max_retries_and_keeps_last_error() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(Error::Fatal("destroy rejected".to_string()))
        }
    };

    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 1000,
        base_delay_ms: 10,
        max_delay_ms: 100,
    };

    let result = task_with_timeout_and_exponential_backoff("unit", task, &policy).await;

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    match result {
        Err(Error::Fatal(msg)) => assert_eq!(msg, "destroy rejected"),
        other => panic!("expected the last task error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_backoff_times_out_slow_attempts() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<u32, _>(42)
        }
    };

    let policy = BackoffPolicy {
        max_retries: 2,
        timeout_ms: 50,
        base_delay_ms: 10,
        max_delay_ms: 100,
    };

    let result = task_with_timeout_and_exponential_backoff("unit", task, &policy).await;

    assert!(result.is_err());
    assert!(counter.load(Ordering::SeqCst) >= 1);
}
