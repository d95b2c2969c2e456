use meshwire_retry::{ExponentialBackoff, RetryConfig, RetryLayer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::{service_fn, Layer, Service, ServiceExt};

#[derive(Debug, Clone)]
struct Flaky;

#[tokio::test]
async fn reported_delays_stay_inside_the_jitter_window() {
    let base = Duration::from_millis(20);
    let jitter = Duration::from_millis(10);

    let delays: Arc<Mutex<Vec<(usize, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&delays);

    let service = service_fn(|_req: ()| async { Err::<(), _>(Flaky) });

    let retry: RetryLayer<Flaky> = RetryConfig::builder()
        .max_attempts(4)
        .backoff(ExponentialBackoff::new(base).jitter(jitter))
        .on_retry(move |attempt, delay| {
            observed.lock().unwrap().push((attempt, delay));
        })
        .build();
    let mut service = retry.layer(service);

    let _ = service.ready().await.unwrap().call(()).await;

    let delays = delays.lock().unwrap();
    assert_eq!(delays.len(), 3, "three retries after the first attempt");
    for (attempt, delay) in delays.iter() {
        // Delay before retry k is base * 2^(k-1) plus jitter in [0, max).
        let floor = base * 2u32.pow((attempt - 1) as u32);
        assert!(*delay >= floor, "retry {attempt}: {delay:?} below {floor:?}");
        assert!(
            *delay < floor + jitter,
            "retry {attempt}: {delay:?} at or above {:?}",
            floor + jitter
        );
    }
}

#[tokio::test]
async fn success_and_exhausted_hooks_fire_once() {
    let successes = Arc::new(AtomicUsize::new(0));
    let exhausted = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&successes);
    let e = Arc::clone(&exhausted);

    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |should_fail: bool| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            if should_fail {
                Err(Flaky)
            } else {
                Ok(())
            }
        }
    });

    let retry: RetryLayer<Flaky> = RetryConfig::builder()
        .max_attempts(2)
        .fixed_backoff(Duration::from_millis(5))
        .on_success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_exhausted(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let mut service = retry.layer(service);

    service.ready().await.unwrap().call(false).await.unwrap();
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(exhausted.load(Ordering::SeqCst), 0);

    let _ = service.ready().await.unwrap().call(true).await;
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_hook_fires_for_non_retryable_errors() {
    let rejected = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&rejected);

    let service = service_fn(|_req: ()| async { Err::<(), _>(Flaky) });

    let retry: RetryLayer<Flaky> = RetryConfig::builder()
        .max_attempts(3)
        .retry_on(|_: &Flaky| false)
        .on_rejected(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let mut service = retry.layer(service);

    let _ = service.ready().await.unwrap().call(()).await;
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
}
