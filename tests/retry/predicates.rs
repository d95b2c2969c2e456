use meshwire_retry::{RetryConfig, RetryError, RetryLayer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, Service, ServiceExt};

/// Fault classes as an upstream HTTP client would see them.
#[derive(Debug, Clone, PartialEq)]
enum Fault {
    Server(u16),
    Client(u16),
    Transport,
}

impl Fault {
    fn is_transient(&self) -> bool {
        matches!(self, Fault::Server(_) | Fault::Transport)
    }
}

fn layer() -> RetryLayer<Fault> {
    RetryConfig::builder()
        .max_attempts(4)
        .fixed_backoff(Duration::from_millis(5))
        .retry_on(Fault::is_transient)
        .build()
}

#[tokio::test]
async fn client_faults_return_immediately() {
    for fault in [Fault::Client(404), Fault::Client(400)] {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let f = fault.clone();

        let service = service_fn(move |_req: ()| {
            let c = Arc::clone(&c);
            let f = f.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(f)
            }
        });

        let mut service = layer().layer(service);
        let err = service.ready().await.unwrap().call(()).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry for {fault:?}");
        assert!(matches!(err, RetryError::Rejected(f) if f == fault));
    }
}

#[tokio::test]
async fn server_faults_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            if c.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Fault::Server(503))
            } else {
                Ok("back up")
            }
        }
    });

    let mut service = layer().layer(service);
    let response = service.ready().await.unwrap().call(()).await.unwrap();

    assert_eq!(response, "back up");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transport_faults_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Fault::Transport)
            } else {
                Ok(())
            }
        }
    });

    let mut service = layer().layer(service);
    assert!(service.ready().await.unwrap().call(()).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_fault_after_transient_failures_still_rejects() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let service = service_fn(move |_req: ()| {
        let c = Arc::clone(&c);
        async move {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Err::<(), _>(Fault::Server(500))
            } else {
                Err(Fault::Client(404))
            }
        }
    });

    let mut service = layer().layer(service);
    let err = service.ready().await.unwrap().call(()).await.unwrap_err();

    assert!(matches!(err, RetryError::Rejected(Fault::Client(404))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
