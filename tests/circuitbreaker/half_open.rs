use meshwire_circuitbreaker::{CircuitBreakerLayer, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tower::{service_fn, Service, ServiceExt};

fn tripping_layer() -> CircuitBreakerLayer {
    CircuitBreakerLayer::builder()
        .failure_rate_threshold(0.5)
        .window_size(4)
        .min_calls(4)
        .reset_timeout(Duration::from_millis(50))
        .name("half-open")
        .build()
}

#[tokio::test]
async fn trial_success_closes_the_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            if c.fetch_add(1, Ordering::SeqCst) < 4 {
                Err::<(), _>("down")
            } else {
                Ok(())
            }
        }
    });

    let mut breaker = tripping_layer().layer_fn(service);
    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    sleep(Duration::from_millis(60)).await;
    breaker.ready().await.unwrap().call(()).await.unwrap();
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

#[tokio::test]
async fn trial_failure_reopens_and_restarts_the_timer() {
    let service = service_fn(|_req: ()| async { Err::<(), _>("down") });

    let mut breaker = tripping_layer().layer_fn(service);
    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    sleep(Duration::from_millis(60)).await;
    let _ = breaker.ready().await.unwrap().call(()).await;
    assert_eq!(breaker.state().await, CircuitState::Open);

    // The timer restarted on the failed trial: well before the new
    // deadline every call is still short-circuited.
    sleep(Duration::from_millis(10)).await;
    let err = breaker.ready().await.unwrap().call(()).await.unwrap_err();
    assert!(err.is_circuit_open());
}

#[tokio::test]
async fn exactly_one_trial_is_admitted() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let inf = Arc::clone(&in_flight);
    let pk = Arc::clone(&peak);

    let entered = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&entered);

    let service = service_fn(move |_req: ()| {
        let inf = Arc::clone(&inf);
        let pk = Arc::clone(&pk);
        let e = Arc::clone(&e);
        async move {
            let n = e.fetch_add(1, Ordering::SeqCst);
            if n < 4 {
                return Err::<(), _>("down");
            }
            // Trial calls: hold the slot long enough for the
            // concurrent callers to be turned away.
            let now = inf.fetch_add(1, Ordering::SeqCst) + 1;
            pk.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(200)).await;
            inf.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let breaker = tripping_layer().layer_fn(service);
    let mut tripper = breaker.clone();
    for _ in 0..4 {
        let _ = tripper.ready().await.unwrap().call(()).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    sleep(Duration::from_millis(60)).await;

    // Ten concurrent callers race for the half-open slot.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let mut svc = breaker.clone();
        handles.push(tokio::spawn(async move {
            svc.ready().await.unwrap().call(()).await
        }));
    }

    let mut permitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => permitted += 1,
            Err(err) => {
                assert!(err.is_circuit_open());
                rejected += 1;
            }
        }
    }

    assert_eq!(permitted, 1, "only the trial call goes through");
    assert_eq!(rejected, 9);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

#[tokio::test]
async fn repeated_cycles_keep_probing() {
    let service = service_fn(|_req: ()| async { Err::<(), _>("down") });
    let mut breaker = tripping_layer().layer_fn(service);

    for _ in 0..4 {
        let _ = breaker.ready().await.unwrap().call(()).await;
    }

    for cycle in 0..3 {
        assert_eq!(
            breaker.state().await,
            CircuitState::Open,
            "cycle {cycle}: open"
        );
        sleep(Duration::from_millis(60)).await;
        let _ = breaker.ready().await.unwrap().call(()).await;
        assert_eq!(
            breaker.state().await,
            CircuitState::Open,
            "cycle {cycle}: reopened after failed trial"
        );
    }
}
