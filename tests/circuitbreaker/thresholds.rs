use meshwire_circuitbreaker::{CircuitBreakerLayer, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Service, ServiceExt};

fn counting_service(
    calls: Arc<AtomicUsize>,
    fail_first: usize,
) -> impl Service<(), Response = (), Error = &'static str, Future: Send> + Clone + Send + 'static {
    tower::service_fn(move |_req: ()| {
        let calls = Arc::clone(&calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < fail_first {
                Err("down")
            } else {
                Ok(())
            }
        }
    })
}

#[tokio::test]
async fn crossing_the_threshold_opens_the_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .failure_rate_threshold(0.5)
        .window_size(10)
        .min_calls(10)
        .name("thresholds")
        .build();
    let mut breaker = layer.layer_fn(counting_service(Arc::clone(&calls), 5));

    // 5 failures + 5 successes = exactly 50%, which meets the threshold.
    for _ in 0..10 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);
}

#[tokio::test]
async fn below_the_threshold_the_circuit_stays_closed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .failure_rate_threshold(0.5)
        .window_size(10)
        .min_calls(10)
        .build();
    let mut breaker = layer.layer_fn(counting_service(Arc::clone(&calls), 4));

    for _ in 0..10 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

#[tokio::test]
async fn short_circuit_makes_no_network_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .window_size(4)
        .min_calls(4)
        .reset_timeout(Duration::from_secs(60))
        .build();
    let mut breaker = layer.layer_fn(counting_service(Arc::clone(&calls), usize::MAX));

    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);
    let made_before = calls.load(Ordering::SeqCst);

    for _ in 0..5 {
        let err = breaker.ready().await.unwrap().call(()).await.unwrap_err();
        assert!(err.is_circuit_open());
    }
    assert_eq!(calls.load(Ordering::SeqCst), made_before);
}

#[tokio::test]
async fn no_decision_before_min_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .window_size(10)
        .min_calls(5)
        .build();
    let mut breaker = layer.layer_fn(counting_service(Arc::clone(&calls), usize::MAX));

    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);

    let _ = breaker.ready().await.unwrap().call(()).await;
    assert_eq!(breaker.state().await, CircuitState::Open);
}

#[tokio::test]
async fn old_outcomes_slide_out_of_the_window() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .failure_rate_threshold(0.5)
        .window_size(4)
        .min_calls(4)
        .build();
    // 2 early failures, then recovery.
    let mut breaker = layer.layer_fn(counting_service(Arc::clone(&calls), 2));

    for _ in 0..6 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }

    // The window now holds the last 4 outcomes, all successes.
    assert_eq!(breaker.state().await, CircuitState::Closed);
    let metrics = breaker.metrics().await;
    assert_eq!(metrics.total_calls, 4);
    assert_eq!(metrics.failure_count, 0);
}

#[tokio::test]
async fn transition_hooks_fire() {
    let opened = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&opened);

    let calls = Arc::new(AtomicUsize::new(0));
    let layer = CircuitBreakerLayer::builder()
        .window_size(4)
        .min_calls(4)
        .on_open(move || {
            o.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let mut breaker = layer.layer_fn(counting_service(calls, usize::MAX));

    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}
