use meshwire_retry::{AttemptFailure, RetryConfig, RetryError, RetryLayer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, Service, ServiceExt};

#[derive(Debug, Clone, PartialEq)]
struct UpstreamDown(&'static str);

fn layer(max_attempts: usize) -> RetryLayer<UpstreamDown> {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .fixed_backoff(Duration::from_millis(5))
        .name("behavior")
        .build()
}

#[tokio::test]
async fn failure_sequence_shorter_than_budget_ends_in_success() {
    for failures_before_success in 0..3usize {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let service = service_fn(move |_req: ()| {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < failures_before_success {
                    Err(UpstreamDown("flaky"))
                } else {
                    Ok("ok")
                }
            }
        });

        let mut service = layer(4).layer(service);
        let response = service.ready().await.unwrap().call(()).await.unwrap();

        assert_eq!(response, "ok");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            failures_before_success + 1,
            "one call per failure plus the success"
        );
    }
}

#[tokio::test]
async fn exhaustion_makes_exactly_max_attempts_and_keeps_last_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(UpstreamDown("hard down"))
        }
    });

    let mut service = layer(4).layer(service);
    let err = service.ready().await.unwrap().call(()).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        RetryError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(last, AttemptFailure::Inner(UpstreamDown("hard down"))));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn attempt_timeout_abandons_only_that_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            // Only the first attempt hangs; the retry completes.
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, UpstreamDown>("recovered")
        }
    });

    let retry: RetryLayer<UpstreamDown> = RetryConfig::builder()
        .max_attempts(2)
        .attempt_timeout(Duration::from_millis(30))
        .fixed_backoff(Duration::from_millis(5))
        .build();
    let mut service = retry.layer(service);

    let started = std::time::Instant::now();
    let response = service.ready().await.unwrap().call(()).await.unwrap();

    assert_eq!(response, "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The hung attempt was cancelled rather than awaited.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn all_attempts_timing_out_exhausts_with_a_timeout_failure() {
    let service = service_fn(|_req: ()| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, UpstreamDown>("never")
    });

    let retry: RetryLayer<UpstreamDown> = RetryConfig::builder()
        .max_attempts(3)
        .attempt_timeout(Duration::from_millis(20))
        .fixed_backoff(Duration::from_millis(5))
        .build();
    let mut service = retry.layer(service);

    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    match err {
        RetryError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, AttemptFailure::Timeout(_)));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn attempt_counter_resets_between_outer_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(UpstreamDown("down"))
        }
    });

    let mut service = layer(2).layer(service);

    let first = service.ready().await.unwrap().call(()).await;
    let second = service.ready().await.unwrap().call(()).await;

    assert!(first.is_err());
    assert!(second.is_err());
    // Two attempts per outer call; no budget leaks across calls.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
