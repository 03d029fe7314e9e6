//! Resilience patterns: per-source circuit breakers and retry logic

use crate::config::BreakerConfig;
use crate::cortex::Cortex;
use crate::notify::{ChangeNotifier, CoreEvent};
use crate::types::{EventType, Impact, OperationalEvent, PolicyParameter};
use crate::utils::sync::lock;
use crate::{NexusError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    #[default]
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Circuit is half-open, one probe decides what happens next
    HalfOpen,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    /// Guarded source
    pub source_id: String,
    /// Current state
    pub state: CircuitState,
    /// Failures since the last open transition
    pub failures: u32,
    /// Successes since the last close
    pub successes: u32,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// When the base cooldown ends (while open)
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Ticket of the half-open probe currently running
    probe: Option<u64>,
    /// Monotonic across resets so a stale ticket never matches
    last_ticket: u64,
}

enum Failure {
    Timeout,
    Crash(String),
}

/// Holds the half-open probe slot while a call is in flight
///
/// If the call is dropped before it reports an outcome, the slot is
/// released so the next caller can probe.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Option<u64>,
}

impl ProbeSlot<'_> {
    /// Hand the ticket to the outcome path
    fn release(mut self) -> Option<u64> {
        self.ticket.take()
    }
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket else {
            return;
        };
        let mut inner = lock(&self.breaker.inner);
        if inner.probe == Some(ticket) {
            inner.probe = None;
            drop(inner);
            debug!(
                "Half-open probe for {} abandoned; slot released",
                self.breaker.source_id
            );
        }
    }
}

/// Circuit breaker for one source
///
/// Outcomes are reported to [`Cortex`], and a Cortex policy overriding
/// `circuit_reset_timeout_ms` changes the cooldown at read time without
/// touching the stored config.
pub struct CircuitBreaker {
    source_id: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
    cortex: Arc<Cortex>,
    notifier: ChangeNotifier,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(
        source_id: impl Into<String>,
        config: BreakerConfig,
        cortex: Arc<Cortex>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            config,
            inner: Mutex::new(BreakerState::default()),
            cortex,
            notifier,
        }
    }

    /// Source this breaker guards
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Stored configuration
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Cooldown in effect for this call, honoring an active Cortex override
    fn effective_reset_timeout_ms(&self) -> u64 {
        self.cortex
            .get_active_policies(&self.source_id)
            .iter()
            .filter(|p| p.parameter == PolicyParameter::CircuitResetTimeoutMs)
            .find_map(|p| p.duration_ms())
            .unwrap_or(self.config.reset_timeout_ms)
    }

    /// Gate a call; a half-open probe gets a ticket
    fn admit(&self) -> Result<Option<u64>> {
        let effective_ms = self.effective_reset_timeout_ms();
        let mut inner = lock(&self.inner);

        match inner.state {
            CircuitState::Closed => Ok(None),
            CircuitState::HalfOpen => {
                if inner.probe.is_some() {
                    return Err(NexusError::CircuitOpen {
                        source_id: self.source_id.clone(),
                        retry_in_ms: 0,
                    });
                }
                Ok(Some(Self::take_probe(&mut inner)))
            }
            CircuitState::Open => {
                let now = Utc::now();
                let deadline = deadline_after(inner.opened_at.unwrap_or(now), effective_ms);

                if now < deadline {
                    let retry_in_ms = (deadline - now).num_milliseconds().max(0) as u64;
                    return Err(NexusError::CircuitOpen {
                        source_id: self.source_id.clone(),
                        retry_in_ms,
                    });
                }

                inner.state = CircuitState::HalfOpen;
                let ticket = Self::take_probe(&mut inner);
                drop(inner);
                debug!("Circuit breaker for {} transitioning to half-open", self.source_id);
                self.publish_transition(CircuitState::Open, CircuitState::HalfOpen);
                Ok(Some(ticket))
            }
        }
    }

    fn take_probe(inner: &mut BreakerState) -> u64 {
        inner.last_ticket = inner.last_ticket.wrapping_add(1);
        inner.probe = Some(inner.last_ticket);
        inner.last_ticket
    }

    /// Execute an action through the circuit breaker
    ///
    /// The action is spawned so that, if it outlives the execution timeout,
    /// it still runs to completion in the background while the caller gets
    /// a timeout error. Dropping the returned future mid-probe frees the
    /// half-open slot.
    pub async fn execute<F, Fut, T, E>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let slot = ProbeSlot {
            breaker: self,
            ticket: self.admit()?,
        };

        let started = Instant::now();
        let timeout_ms = self.config.execution_timeout_ms;
        let handle = tokio::spawn(action());

        let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(Failure::Crash(e.to_string())),
            Ok(Err(join_error)) => Err(Failure::Crash(format!("action panicked: {}", join_error))),
            Err(_) => Err(Failure::Timeout),
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        let ticket = slot.release();

        match outcome {
            Ok(value) => {
                self.on_success(ticket, latency_ms);
                Ok(value)
            }
            Err(Failure::Timeout) => {
                self.on_failure(
                    ticket,
                    false,
                    EventType::Timeout,
                    format!("Timed out after {}ms", timeout_ms),
                    latency_ms,
                );
                Err(NexusError::ActionTimeout {
                    source_id: self.source_id.clone(),
                    timeout_ms,
                })
            }
            Err(Failure::Crash(message)) => {
                self.on_failure(ticket, false, EventType::Crash, message.clone(), latency_ms);
                Err(NexusError::action_crash(&self.source_id, message))
            }
        }
    }

    /// Handle successful call
    ///
    /// Only the current probe closes a half-open circuit; a straggler admitted
    /// before the circuit opened is counted but decides nothing.
    fn on_success(&self, ticket: Option<u64>, latency_ms: u64) {
        let transition = {
            let mut inner = lock(&self.inner);
            let owns_probe = ticket.is_some() && inner.probe == ticket;
            if owns_probe {
                inner.probe = None;
            }
            inner.success_count += 1;

            if owns_probe && inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.last_error = None;
                inner.opened_at = None;
                Some((CircuitState::HalfOpen, CircuitState::Closed))
            } else {
                None
            }
        };

        if let Some((from, to)) = transition {
            debug!("Circuit breaker for {} closed", self.source_id);
            self.publish_transition(from, to);
        }

        let event_type = if latency_ms > self.config.high_latency_ms {
            EventType::HighLatency
        } else {
            EventType::Success
        };
        self.cortex.report_event(
            OperationalEvent::new(&self.source_id, event_type, Impact::None)
                .with_latency(latency_ms),
        );
    }

    /// Handle failed call
    fn on_failure(
        &self,
        ticket: Option<u64>,
        force_open: bool,
        event_type: EventType,
        message: String,
        latency_ms: u64,
    ) {
        let transition = {
            let mut inner = lock(&self.inner);
            let owns_probe = ticket.is_some() && inner.probe == ticket;
            if owns_probe {
                inner.probe = None;
            }
            inner.failure_count += 1;
            inner.last_error = Some(message.clone());

            let from = inner.state;
            let trips = force_open
                || match from {
                    CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
                    CircuitState::HalfOpen => owns_probe,
                    CircuitState::Open => false,
                };
            if trips && from != CircuitState::Open {
                let failures = inner.failure_count;
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Utc::now());
                inner.failure_count = 0;
                inner.probe = None;
                Some((from, failures))
            } else {
                None
            }
        };

        self.cortex.report_event(
            OperationalEvent::new(&self.source_id, event_type, Impact::Medium)
                .with_latency(latency_ms)
                .with_context("error", serde_json::Value::String(message)),
        );

        if let Some((from, failures)) = transition {
            warn!(
                "Circuit breaker for {} opened after {} failures",
                self.source_id, failures
            );
            self.publish_transition(from, CircuitState::Open);
        }
    }

    /// Open the circuit by hand, through the normal failure path
    pub fn trip(&self) {
        warn!("Circuit breaker for {} manually tripped", self.source_id);
        self.on_failure(None, true, EventType::Crash, "Manual Trip".to_string(), 0);
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        lock(&self.inner).state
    }

    /// Snapshot for dashboards
    pub fn status(&self) -> BreakerStatus {
        let inner = lock(&self.inner);
        BreakerStatus {
            source_id: self.source_id.clone(),
            state: inner.state,
            failures: inner.failure_count,
            successes: inner.success_count,
            last_error: inner.last_error.clone(),
            next_attempt_at: inner
                .opened_at
                .map(|at| deadline_after(at, self.config.reset_timeout_ms)),
        }
    }

    /// Reset the circuit breaker
    pub fn reset(&self) {
        let from = {
            let mut inner = lock(&self.inner);
            let from = inner.state;
            *inner = BreakerState {
                last_ticket: inner.last_ticket,
                ..BreakerState::default()
            };
            from
        };
        debug!("Circuit breaker for {} reset", self.source_id);
        if from != CircuitState::Closed {
            self.publish_transition(from, CircuitState::Closed);
        }
    }

    fn publish_transition(&self, from: CircuitState, to: CircuitState) {
        self.notifier.publish(CoreEvent::BreakerTransition {
            source_id: self.source_id.clone(),
            from,
            to,
        });
    }
}

/// `base + ms`, saturating at the latest representable time
fn deadline_after(base: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(ChronoDuration::try_milliseconds)
        .and_then(|delta| base.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries
    pub max_retries: usize,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Execute a function with retry logic
///
/// Errors rejected by `should_retry` are returned immediately; otherwise the
/// last error is returned once retries run out.
pub async fn retry_with_backoff<F, Fut, T, P>(config: RetryConfig, should_retry: P, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&NexusError) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    error!("All {} retry attempts failed: {}", config.max_retries, e);
                    return Err(e);
                }

                warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, e, delay);
                tokio::time::sleep(delay).await;

                // Exponential backoff
                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier)
                        .min(config.max_delay.as_millis() as f64) as u64,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CortexConfig;
    use crate::types::{AdaptivePolicy, PolicyValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(failure_threshold: u32, reset_timeout_ms: u64) -> (CircuitBreaker, Arc<Cortex>) {
        let notifier = ChangeNotifier::new(64);
        // Penalty equal to the base cooldown keeps Cortex from stretching it here
        let cortex_config = CortexConfig {
            penalty_reset_timeout_ms: reset_timeout_ms,
            ..CortexConfig::default()
        };
        let cortex = Arc::new(Cortex::new(cortex_config, notifier.clone()));
        let config = BreakerConfig {
            failure_threshold,
            reset_timeout_ms,
            execution_timeout_ms: 200,
            high_latency_ms: 1_000,
        };
        (
            CircuitBreaker::new("svc", config, cortex.clone(), notifier),
            cortex,
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.execute(|| async { Err::<(), _>("boom") }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed() {
        let (cb, _) = breaker(3, 1_000);
        assert_eq!(cb.state(), CircuitState::Closed);

        let result = cb.execute(|| async { Ok::<_, String>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.status().successes, 1);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_and_fails_fast() {
        let (cb, _) = breaker(3, 5_000);

        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().failures, 0, "failure count resets on open");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = cb
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(NexusError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "action must not run");
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes() {
        let (cb, _) = breaker(1, 50);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        cb.execute(|| async { Ok::<_, String>(()) }).await.unwrap();

        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failures, 0);
        assert_eq!(status.successes, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_half_open_probe_failure_reopens() {
        let (cb, _) = breaker(3, 50);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        let result = fail(&cb).await;

        assert!(matches!(result, Err(NexusError::ActionCrash { .. })));
        assert_eq!(cb.state(), CircuitState::Open, "single probe failure reopens");
    }

    #[tokio::test]
    async fn test_only_one_probe_while_half_open() {
        let (cb, _) = breaker(1, 20);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let cb = Arc::new(cb);
        let probe = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.execute(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let second = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(second, Err(NexusError::CircuitOpen { .. })));

        probe.await.unwrap().unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_probe_frees_half_open_slot() {
        let (cb, _) = breaker(1, 20);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cb.execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, String>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_straggler_success_leaves_half_open_to_probe() {
        let (cb, _) = breaker(10, 20);

        // Admitted while closed, finishes after the probe has started
        let straggler = cb.execute(|| async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, String>(())
        });
        let probe = async {
            cb.trip();
            tokio::time::sleep(Duration::from_millis(40)).await;
            cb.execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, String>(())
            })
            .await
        };
        let midway = async {
            tokio::time::sleep(Duration::from_millis(110)).await;
            cb.state()
        };

        let (straggler, probe, midway) = tokio::join!(straggler, probe, midway);
        straggler.unwrap();
        assert_eq!(midway, CircuitState::HalfOpen);
        probe.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_huge_cooldown_saturates() {
        let (cb, _) = breaker(1, u64::MAX);
        let _ = fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().next_attempt_at, Some(DateTime::<Utc>::MAX_UTC));

        let result = cb.execute(|| async { Ok::<_, String>(()) }).await;
        match result {
            Err(NexusError::CircuitOpen { retry_in_ms, .. }) => assert!(retry_in_ms > 0),
            other => panic!("expected open circuit, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let (cb, cortex) = breaker(3, 1_000);

        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(NexusError::ActionTimeout { timeout_ms: 200, .. })));
        assert_eq!(cb.status().failures, 1);
        let log = cortex.event_log();
        assert_eq!(log[0].event_type, EventType::Timeout);
        assert_eq!(log[0].impact, Impact::Medium);
    }

    #[tokio::test]
    async fn test_timed_out_action_keeps_running() {
        let (cb, _) = breaker(3, 1_000);
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();

        let result = cb
            .execute(move || async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                flag.store(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_reported_before_returning() {
        let (cb, cortex) = breaker(5, 1_000);
        let _ = fail(&cb).await;

        let score = cortex.score("svc").unwrap();
        assert!(score.current_health < 100.0);
        assert_eq!(score.total_failures, 1);
        assert_eq!(cortex.event_log()[0].event_type, EventType::Crash);
        assert_eq!(cb.status().last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_policy_extends_cooldown_without_touching_config() {
        let (cb, cortex) = breaker(1, 30);
        let _ = fail(&cb).await;

        cortex.upsert_policy(AdaptivePolicy::new(
            "svc",
            PolicyParameter::CircuitResetTimeoutMs,
            PolicyValue::DurationMs(10_000),
            "Health critical",
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = cb.execute(|| async { Ok::<_, String>(()) }).await;
        match result {
            Err(NexusError::CircuitOpen { retry_in_ms, .. }) => assert!(retry_in_ms > 9_000),
            other => panic!("expected open circuit, got {:?}", other.map(|_| ())),
        }
        assert_eq!(cb.config().reset_timeout_ms, 30);
    }

    #[tokio::test]
    async fn test_policy_can_shorten_cooldown() {
        let (cb, cortex) = breaker(1, 60_000);
        let _ = fail(&cb).await;

        cortex.upsert_policy(AdaptivePolicy::new(
            "svc",
            PolicyParameter::CircuitResetTimeoutMs,
            PolicyValue::DurationMs(0),
            "operator override",
        ));

        cb.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_trip_and_reset() {
        let (cb, cortex) = breaker(10, 60_000);

        cb.trip();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().last_error.as_deref(), Some("Manual Trip"));
        assert_eq!(cortex.event_log().len(), 1);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.status().next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_retry_success() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };

        let mut attempts = 0;
        let result = retry_with_backoff(config, NexusError::is_retryable, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 2 {
                    Err(NexusError::action_crash("svc", "not yet"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_failure_returns_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        };

        let mut attempts = 0;
        let result: Result<()> = retry_with_backoff(config, NexusError::is_retryable, || {
            attempts += 1;
            async { Err(NexusError::action_crash("svc", "always fails")) }
        })
        .await;

        assert!(matches!(result, Err(NexusError::ActionCrash { .. })));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let mut attempts = 0;
        let result: Result<()> = retry_with_backoff(
            RetryConfig::default(),
            NexusError::is_retryable,
            || {
                attempts += 1;
                async { Err(NexusError::Disabled("svc".to_string())) }
            },
        )
        .await;

        assert!(matches!(result, Err(NexusError::Disabled(_))));
        assert_eq!(attempts, 1);
    }
}
