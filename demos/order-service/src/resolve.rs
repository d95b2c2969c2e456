//! Resolution of user records through the resilient call stack.
//!
//! The stack, inside out: a reqwest-backed fetch against the user
//! service, retried with per-attempt timeouts and jittered backoff,
//! error-mapped into [`ResolveError`], and guarded by a circuit breaker
//! whose fallback reads the event-fed replica cache. The cache is only
//! ever written by the `user.created` consumer; this module reads it as
//! a last resort.

use futures::future::BoxFuture;
use meshwire_circuitbreaker::{
    CircuitBreakerLayer, CircuitBreakerWithFallback, CircuitMetrics, CircuitState,
    FailureClassifierTrait,
};
use meshwire_fallback::ReplicaCache;
use meshwire_retry::{ExponentialBackoff, Retry, RetryConfig, RetryError};
use serde::{Deserialize, Serialize};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tower::util::{MapErr, MapResponse};
use tower::{Service, ServiceExt};

/// The record owned by the user service, as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Where a resolved user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSource {
    Fresh,
    Cache,
}

/// A user plus the path it was resolved through.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedUser {
    pub user: User,
    pub source: UserSource,
}

/// Failures of one fetch attempt against the user service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// 4xx: the id resolved to "invalid", the upstream is healthy.
    #[error("upstream client error {0}")]
    Client(u16),
    /// 5xx: the upstream is failing.
    #[error("upstream server error {0}")]
    Server(u16),
    /// The request never completed.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Server(_) | UpstreamError::Transport(_))
    }
}

/// What the caller of [`UserResolver::resolve`] can see go wrong.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The upstream answered: no such user. Surfaced unchanged.
    #[error("user not found upstream")]
    UnknownUser,
    /// The upstream rejected the reference with another 4xx.
    #[error("user reference rejected upstream (status {status})")]
    InvalidReference { status: u16 },
    /// Transient faults exhausted the retry budget. Absorbed by the
    /// breaker's fallback whenever a cached copy exists.
    #[error("user service degraded: {0}")]
    Degraded(String),
    /// The primary path failed AND the replica cache has no entry.
    #[error("user service unavailable and no cached copy exists")]
    Unavailable,
}

/// A Tower service performing `GET <base>/users/<id>`.
#[derive(Clone)]
pub struct UserFetch {
    http: reqwest::Client,
    base_url: String,
}

impl UserFetch {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Service<String> for UserFetch {
    type Response = User;
    type Error = UpstreamError;
    type Future = BoxFuture<'static, Result<User, UpstreamError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, user_id: String) -> Self::Future {
        let http = self.http.clone();
        let url = format!("{}/users/{}", self.base_url.trim_end_matches('/'), user_id);

        Box::pin(async move {
            let response = http
                .get(&url)
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_server_error() {
                return Err(UpstreamError::Server(status.as_u16()));
            }
            if status.is_client_error() {
                return Err(UpstreamError::Client(status.as_u16()));
            }
            response
                .json::<User>()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))
        })
    }
}

/// Only degraded results count against the breaker window (and divert
/// to the fallback); a clean upstream 4xx is an answer, not an outage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradedFailures;

impl FailureClassifierTrait<ResolvedUser, ResolveError> for DegradedFailures {
    fn classify(&self, result: &Result<ResolvedUser, ResolveError>) -> bool {
        matches!(result, Err(ResolveError::Degraded(_)))
    }
}

fn map_retry_error(err: RetryError<UpstreamError>) -> ResolveError {
    match err {
        RetryError::Rejected(UpstreamError::Client(404)) => ResolveError::UnknownUser,
        RetryError::Rejected(UpstreamError::Client(status)) => {
            ResolveError::InvalidReference { status }
        }
        RetryError::Rejected(other) => ResolveError::Degraded(other.to_string()),
        RetryError::Exhausted { .. } => ResolveError::Degraded(err.to_string()),
    }
}

fn mark_fresh(user: User) -> ResolvedUser {
    ResolvedUser {
        user,
        source: UserSource::Fresh,
    }
}

type MapRetryErrorFn = fn(RetryError<UpstreamError>) -> ResolveError;
type MarkFreshFn = fn(User) -> ResolvedUser;

type UserStack = CircuitBreakerWithFallback<
    MapResponse<MapErr<Retry<UserFetch, UpstreamError>, MapRetryErrorFn>, MarkFreshFn>,
    DegradedFailures,
    String,
    ResolvedUser,
    ResolveError,
>;

/// Knobs for the resolver stack, fed from the CLI.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub attempts: usize,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_jitter: Duration,
    pub breaker_window: usize,
    pub breaker_min_calls: usize,
    pub failure_threshold: f64,
    pub reset_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_millis(500),
            backoff_base: Duration::from_millis(100),
            backoff_jitter: Duration::from_millis(50),
            breaker_window: 10,
            breaker_min_calls: 5,
            failure_threshold: 0.5,
            reset_timeout: Duration::from_secs(10),
        }
    }
}

impl ResolverOptions {
    /// Worst case of one whole retrying call: every attempt runs to its
    /// timeout and every backoff delay is taken in full. The breaker's
    /// call timeout must sit strictly above this so it never cuts off a
    /// call that is still legitimately retrying.
    fn call_budget(&self) -> Duration {
        let mut budget = self.attempt_timeout * self.attempts as u32;
        for i in 0..self.attempts.saturating_sub(1) {
            budget += self.backoff_base * 2u32.saturating_pow(i as u32) + self.backoff_jitter;
        }
        budget + Duration::from_secs(1)
    }
}

/// Resolves user ids through retry, breaker, and replica-cache
/// fallback.
pub struct UserResolver {
    stack: UserStack,
}

impl UserResolver {
    pub fn new(base_url: impl Into<String>, cache: ReplicaCache<User>, opts: ResolverOptions) -> Self {
        let retry_layer = RetryConfig::<UpstreamError>::builder()
            .max_attempts(opts.attempts)
            .attempt_timeout(opts.attempt_timeout)
            .backoff(
                ExponentialBackoff::new(opts.backoff_base).jitter(opts.backoff_jitter),
            )
            .retry_on(UpstreamError::is_transient)
            .name("user-fetch")
            .build();

        let breaker_layer = CircuitBreakerLayer::builder()
            .failure_rate_threshold(opts.failure_threshold)
            .window_size(opts.breaker_window)
            .min_calls(opts.breaker_min_calls)
            .reset_timeout(opts.reset_timeout)
            .call_timeout(opts.call_budget())
            .name("user-service")
            .classifier(DegradedFailures)
            .on_state_transition(|from, to| {
                tracing::info!(?from, ?to, "user breaker transition");
            })
            .on_fallback(|| {
                tracing::debug!("serving user from replica cache");
            })
            .build();

        let fetch = tower::Layer::layer(&retry_layer, UserFetch::new(base_url))
            .map_err(map_retry_error as MapRetryErrorFn)
            .map_response(mark_fresh as MarkFreshFn);

        let fallback_cache = cache;
        let stack = breaker_layer.layer_fn(fetch).with_fallback(move |user_id: String| {
            let cache = fallback_cache.clone();
            Box::pin(async move {
                cache
                    .get(&user_id)
                    .map(|entry| ResolvedUser {
                        user: entry.value,
                        source: UserSource::Cache,
                    })
                    .ok_or(ResolveError::Unavailable)
            }) as BoxFuture<'static, Result<ResolvedUser, ResolveError>>
        });

        Self { stack }
    }

    /// Resolves one user id, fresh or cached.
    pub async fn resolve(&self, user_id: String) -> Result<ResolvedUser, ResolveError> {
        let mut stack = self.stack.clone();
        stack.ready().await?.call(user_id).await
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.stack.state_sync()
    }

    pub async fn breaker_metrics(&self) -> CircuitMetrics {
        self.stack.metrics().await
    }

    pub fn health_status(&self) -> &'static str {
        self.stack.health_status()
    }

    pub fn http_status(&self) -> u16 {
        self.stack.http_status()
    }
}
