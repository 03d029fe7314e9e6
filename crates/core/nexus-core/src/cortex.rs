//! Cortex adaptive reliability engine
//!
//! Ingests operational events, keeps a healing/decaying health score per
//! source, and synthesizes time-boxed policies that the circuit breakers and
//! the execution engine read back:
//!
//! - **Penalty box**: a critical source gets a longer breaker cooldown.
//! - **Fallback**: a degraded primary provider reroutes traffic globally.
//! - **Self-healing**: a healthy source sheds its critical penalties.
//!
//! Cortex never returns errors. Malformed events are logged and dropped.

use crate::config::CortexConfig;
use crate::notify::{ChangeNotifier, CoreEvent};
use crate::types::{
    AdaptivePolicy, HealthTrend, Impact, OperationalEvent, PolicyParameter, PolicyValue,
    ReliabilityScore, GLOBAL_TARGET,
};
use crate::utils::sync::{lock, read, write};
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Health above this is stable, and lifts critical penalties
pub const STABLE_HEALTH: f64 = 90.0;
/// Health below this is critical
pub const CRITICAL_HEALTH: f64 = 40.0;
/// Primary provider health below this triggers the fallback rule
pub const FALLBACK_HEALTH: f64 = 50.0;

/// Score and policies for one target, serialized behind one lock
#[derive(Debug, Default)]
struct Ledger {
    score: Option<ReliabilityScore>,
    policies: Vec<AdaptivePolicy>,
}

impl Ledger {
    /// Replace a policy with the same id, otherwise append
    fn upsert(&mut self, policy: AdaptivePolicy) {
        match self
            .policies
            .iter_mut()
            .find(|p| p.policy_id == policy.policy_id)
        {
            Some(existing) => *existing = policy,
            None => self.policies.push(policy),
        }
    }

    fn remove_where(&mut self, predicate: impl Fn(&AdaptivePolicy) -> bool) -> usize {
        let before = self.policies.len();
        self.policies.retain(|p| !predicate(p));
        before - self.policies.len()
    }

    /// Drop expired policies and return the rest
    fn active_policies(&mut self) -> Vec<AdaptivePolicy> {
        let now = Utc::now();
        self.policies.retain(|p| p.is_active_at(now));
        self.policies.clone()
    }
}

/// Adaptive reliability engine
pub struct Cortex {
    config: CortexConfig,
    ledgers: RwLock<HashMap<String, Arc<Mutex<Ledger>>>>,
    event_log: Mutex<VecDeque<OperationalEvent>>,
    notifier: ChangeNotifier,
}

impl Cortex {
    /// Create a new engine
    pub fn new(config: CortexConfig, notifier: ChangeNotifier) -> Self {
        let capacity = config.event_log_capacity.max(1);
        Self {
            config,
            ledgers: RwLock::new(HashMap::new()),
            event_log: Mutex::new(VecDeque::with_capacity(capacity)),
            notifier,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    fn existing_ledger(&self, target: &str) -> Option<Arc<Mutex<Ledger>>> {
        read(&self.ledgers).get(target).cloned()
    }

    fn ledger(&self, target: &str) -> Arc<Mutex<Ledger>> {
        if let Some(ledger) = self.existing_ledger(target) {
            return ledger;
        }
        write(&self.ledgers)
            .entry(target.to_string())
            .or_default()
            .clone()
    }

    /// Ingest one event: log it, update health, run heuristics, notify
    pub fn report_event(&self, event: OperationalEvent) {
        if event.source_id.trim().is_empty() || event.source_id == GLOBAL_TARGET {
            warn!(
                "Dropping operational event {} with invalid source id '{}'",
                event.id, event.source_id
            );
            return;
        }

        {
            let mut log = lock(&self.event_log);
            while log.len() >= self.config.event_log_capacity.max(1) {
                log.pop_front();
            }
            log.push_back(event.clone());
        }

        let ledger = self.ledger(&event.source_id);
        let mut ledger = lock(&ledger);

        let (health, delta) = Self::apply_event(&mut ledger, &event);
        let mut changed_targets = self.run_heuristics(&mut ledger, &event.source_id);
        drop(ledger);

        debug!(
            "{} {:?} -> health {:.1} ({:+.1})",
            event.source_id, event.event_type, health, delta
        );

        self.notifier.publish(CoreEvent::EventRecorded {
            source_id: event.source_id.clone(),
            event_type: event.event_type,
            health,
        });
        changed_targets.dedup();
        for target_source_id in changed_targets {
            self.notifier
                .publish(CoreEvent::PolicyChanged { target_source_id });
        }
    }

    /// Update the score for one event; returns `(health, delta)`
    fn apply_event(ledger: &mut Ledger, event: &OperationalEvent) -> (f64, f64) {
        let score = ledger
            .score
            .get_or_insert_with(|| ReliabilityScore::new(&event.source_id));

        let mut delta = event.event_type.base_delta();
        if event.impact > Impact::Low {
            delta *= 1.0 + f64::from(event.impact.ordinal()) * 0.1;
        }

        score.current_health = (score.current_health + delta).clamp(0.0, 100.0);
        if delta < 0.0 {
            score.total_failures += 1;
            score.last_failure_at = Some(event.timestamp);
        }

        score.trend = if score.current_health > STABLE_HEALTH {
            HealthTrend::Stable
        } else if score.current_health < CRITICAL_HEALTH {
            HealthTrend::Critical
        } else if delta < 0.0 {
            HealthTrend::Degrading
        } else {
            HealthTrend::Recovering
        };

        (score.current_health, delta)
    }

    /// Source-scoped rules; returns targets whose policies changed
    fn run_heuristics(&self, ledger: &mut Ledger, source_id: &str) -> Vec<String> {
        let Some(score) = ledger.score.clone() else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        let is_primary = self.config.primary_provider.as_deref() == Some(source_id);

        if score.current_health < CRITICAL_HEALTH && score.trend == HealthTrend::Critical {
            let policy = AdaptivePolicy::new(
                source_id,
                PolicyParameter::CircuitResetTimeoutMs,
                PolicyValue::DurationMs(self.config.penalty_reset_timeout_ms),
                format!(
                    "Health critical ({:.0}); extending circuit cooldown to {}ms",
                    score.current_health, self.config.penalty_reset_timeout_ms
                ),
            )
            .expires_in(ttl(self.config.penalty_ttl_secs));
            info!("Penalty box for {}: {}", source_id, policy.reason);
            ledger.upsert(policy);
            changed.push(source_id.to_string());
        }

        if is_primary && score.current_health < FALLBACK_HEALTH {
            if let Some(fallback) = self
                .config
                .fallback_provider
                .as_deref()
                .filter(|f| *f != source_id)
            {
                let policy = AdaptivePolicy::new(
                    GLOBAL_TARGET,
                    PolicyParameter::PreferredProvider,
                    PolicyValue::ProviderId(fallback.to_string()),
                    format!(
                        "Primary provider {} degraded ({:.0}); routing to {}",
                        source_id, score.current_health, fallback
                    ),
                )
                .expires_in(ttl(self.config.fallback_ttl_secs));
                info!("Fallback engaged: {}", policy.reason);
                lock(&self.ledger(GLOBAL_TARGET)).upsert(policy);
                changed.push(GLOBAL_TARGET.to_string());
            }
        }

        if score.current_health > STABLE_HEALTH {
            let lifted = ledger.remove_where(|p| p.reason.to_lowercase().contains("critical"));
            if lifted > 0 {
                info!("{} recovered; lifted {} critical policies", source_id, lifted);
                changed.push(source_id.to_string());
            }

            if is_primary {
                let global_id = AdaptivePolicy::id_for(GLOBAL_TARGET, PolicyParameter::PreferredProvider);
                let removed = self.existing_ledger(GLOBAL_TARGET).map_or(0, |global| {
                    let mut global = lock(&global);
                    global.remove_where(|p| p.policy_id == global_id)
                });
                if removed > 0 {
                    info!("Primary provider {} recovered; fallback lifted", source_id);
                    changed.push(GLOBAL_TARGET.to_string());
                }
            }
        }

        changed
    }

    /// Unexpired policies for a target, purging expired ones as a side effect
    pub fn get_active_policies(&self, target: &str) -> Vec<AdaptivePolicy> {
        let Some(ledger) = self.existing_ledger(target) else {
            return Vec::new();
        };
        let mut ledger = lock(&ledger);
        ledger.active_policies()
    }

    /// Every unexpired policy across all targets, ordered by target then id
    pub fn all_active_policies(&self) -> Vec<AdaptivePolicy> {
        let ledgers: Vec<_> = read(&self.ledgers).values().cloned().collect();
        let mut policies: Vec<AdaptivePolicy> = ledgers
            .iter()
            .flat_map(|ledger| lock(ledger).active_policies())
            .collect();
        policies.sort_by(|a, b| {
            a.target_source_id
                .cmp(&b.target_source_id)
                .then_with(|| a.policy_id.cmp(&b.policy_id))
        });
        policies
    }

    /// Insert or replace a policy under its target
    pub fn upsert_policy(&self, policy: AdaptivePolicy) {
        let target_source_id = policy.target_source_id.clone();
        lock(&self.ledger(&target_source_id)).upsert(policy);
        self.notifier
            .publish(CoreEvent::PolicyChanged { target_source_id });
    }

    /// Remove one policy; returns whether it existed
    pub fn remove_policy(&self, target: &str, policy_id: &str) -> bool {
        let removed = self.existing_ledger(target).map_or(0, |ledger| {
            let mut ledger = lock(&ledger);
            ledger.remove_where(|p| p.policy_id == policy_id)
        });
        if removed > 0 {
            self.notifier.publish(CoreEvent::PolicyChanged {
                target_source_id: target.to_string(),
            });
        }
        removed > 0
    }

    /// Remove every policy for a target
    pub fn clear_policies(&self, target: &str) {
        let removed = self.existing_ledger(target).map_or(0, |ledger| {
            let mut ledger = lock(&ledger);
            ledger.remove_where(|_| true)
        });
        if removed > 0 {
            self.notifier.publish(CoreEvent::PolicyChanged {
                target_source_id: target.to_string(),
            });
        }
    }

    /// Current score for a source
    pub fn score(&self, source_id: &str) -> Option<ReliabilityScore> {
        let ledger = self.existing_ledger(source_id)?;
        let ledger = lock(&ledger);
        ledger.score.clone()
    }

    /// Every score, ordered by source id
    pub fn all_scores(&self) -> Vec<ReliabilityScore> {
        let ledgers: Vec<_> = read(&self.ledgers).values().cloned().collect();
        let mut scores: Vec<ReliabilityScore> = ledgers
            .iter()
            .filter_map(|ledger| lock(ledger).score.clone())
            .collect();
        scores.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        scores
    }

    /// Retained events, most recent first
    pub fn event_log(&self) -> Vec<OperationalEvent> {
        lock(&self.event_log).iter().rev().cloned().collect()
    }
}

/// Policy lifetime; out-of-range values saturate instead of panicking
fn ttl(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(if secs < 0 { Duration::zero() } else { Duration::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;

    fn cortex() -> Cortex {
        Cortex::new(CortexConfig::default(), ChangeNotifier::new(64))
    }

    fn event(source: &str, event_type: EventType, impact: Impact) -> OperationalEvent {
        OperationalEvent::new(source, event_type, impact)
    }

    #[test]
    fn test_score_created_lazily_at_full_health() {
        let cortex = cortex();
        assert!(cortex.score("tts").is_none());

        cortex.report_event(event("tts", EventType::Success, Impact::None));

        let score = cortex.score("tts").unwrap();
        assert_eq!(score.current_health, 100.0);
        assert_eq!(score.trend, HealthTrend::Stable);
        assert_eq!(score.total_failures, 0);
    }

    #[test]
    fn test_impact_scales_delta() {
        let cortex = cortex();
        cortex.report_event(event("a", EventType::Timeout, Impact::Low));
        cortex.report_event(event("b", EventType::Timeout, Impact::High));

        assert_eq!(cortex.score("a").unwrap().current_health, 85.0);
        assert!((cortex.score("b").unwrap().current_health - 80.5).abs() < 1e-9);
    }

    #[test]
    fn test_trend_classification() {
        let cortex = cortex();
        cortex.report_event(event("s", EventType::ApiError, Impact::None));
        cortex.report_event(event("s", EventType::ApiError, Impact::None));
        let score = cortex.score("s").unwrap();
        assert_eq!(score.current_health, 80.0);
        assert_eq!(score.trend, HealthTrend::Degrading);
        assert_eq!(score.total_failures, 2);
        assert!(score.last_failure_at.is_some());

        cortex.report_event(event("s", EventType::Success, Impact::None));
        assert_eq!(cortex.score("s").unwrap().trend, HealthTrend::Recovering);

        for _ in 0..2 {
            cortex.report_event(event("s", EventType::Crash, Impact::None));
        }
        assert_eq!(cortex.score("s").unwrap().trend, HealthTrend::Critical);
    }

    #[test]
    fn test_health_stays_in_bounds() {
        let cortex = cortex();
        for _ in 0..10 {
            cortex.report_event(event("s", EventType::Crash, Impact::High));
        }
        assert_eq!(cortex.score("s").unwrap().current_health, 0.0);

        for _ in 0..500 {
            cortex.report_event(event("s", EventType::Success, Impact::High));
        }
        assert_eq!(cortex.score("s").unwrap().current_health, 100.0);
    }

    #[test]
    fn test_event_log_is_bounded_and_most_recent_first() {
        let config = CortexConfig {
            event_log_capacity: 3,
            ..CortexConfig::default()
        };
        let cortex = Cortex::new(config, ChangeNotifier::new(8));

        for latency in 0..5 {
            cortex.report_event(event("s", EventType::Success, Impact::None).with_latency(latency));
        }

        let latencies: Vec<u64> = cortex.event_log().iter().map(|e| e.latency_ms).collect();
        assert_eq!(latencies, vec![4, 3, 2]);
    }

    #[test]
    fn test_default_log_capacity_is_500() {
        let cortex = cortex();
        for _ in 0..510 {
            cortex.report_event(event("s", EventType::Success, Impact::None));
        }
        assert_eq!(cortex.event_log().len(), 500);
    }

    #[test]
    fn test_malformed_event_dropped() {
        let cortex = cortex();
        cortex.report_event(event("  ", EventType::Crash, Impact::High));
        assert!(cortex.event_log().is_empty());
        assert!(cortex.all_scores().is_empty());
    }

    #[test]
    fn test_penalty_box_on_critical() {
        let cortex = cortex();
        for _ in 0..2 {
            cortex.report_event(event("tts", EventType::Crash, Impact::Medium));
        }

        let policies = cortex.get_active_policies("tts");
        assert_eq!(policies.len(), 1);
        let policy = &policies[0];
        assert_eq!(policy.parameter, PolicyParameter::CircuitResetTimeoutMs);
        assert_eq!(policy.override_value, PolicyValue::DurationMs(30_000));
        assert!(policy.reason.to_lowercase().contains("critical"));
        let ttl = policy.expires_at.unwrap() - policy.created_at;
        assert_eq!(ttl, Duration::minutes(5));
    }

    #[test]
    fn test_repeated_penalties_upsert_single_policy() {
        let cortex = cortex();
        for _ in 0..5 {
            cortex.report_event(event("tts", EventType::Crash, Impact::Medium));
        }
        assert_eq!(cortex.get_active_policies("tts").len(), 1);
    }

    #[test]
    fn test_self_healing_lifts_critical_policies() {
        let cortex = cortex();
        for _ in 0..3 {
            cortex.report_event(event("tts", EventType::Crash, Impact::None));
        }
        cortex.upsert_policy(AdaptivePolicy::new(
            "tts",
            PolicyParameter::Enabled,
            PolicyValue::Enabled(true),
            "operator pinned",
        ));
        assert_eq!(cortex.get_active_policies("tts").len(), 2);

        for _ in 0..100 {
            cortex.report_event(event("tts", EventType::Success, Impact::None));
        }

        let remaining = cortex.get_active_policies("tts");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].reason, "operator pinned");
    }

    #[test]
    fn test_fallback_for_primary_provider() {
        let config = CortexConfig::default().with_fallback("cloud-llm", "local-llm");
        let cortex = Cortex::new(config, ChangeNotifier::new(64));

        for _ in 0..3 {
            cortex.report_event(event("cloud-llm", EventType::Timeout, Impact::None));
        }
        assert!(cortex.get_active_policies(GLOBAL_TARGET).is_empty());

        // 55 -> 40: below the fallback line, not yet critical

        cortex.report_event(event("cloud-llm", EventType::Timeout, Impact::None));
        let global = cortex.get_active_policies(GLOBAL_TARGET);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].parameter, PolicyParameter::PreferredProvider);
        assert_eq!(
            global[0].override_value,
            PolicyValue::ProviderId("local-llm".to_string())
        );
        assert_eq!(
            global[0].expires_at.unwrap() - global[0].created_at,
            Duration::minutes(10)
        );
        assert!(cortex.get_active_policies("cloud-llm").is_empty());

        for _ in 0..100 {
            cortex.report_event(event("cloud-llm", EventType::Success, Impact::None));
        }
        assert!(cortex.get_active_policies(GLOBAL_TARGET).is_empty());
    }

    #[test]
    fn test_unbounded_ttls_do_not_overflow() {
        let config = CortexConfig {
            penalty_ttl_secs: i64::MAX,
            fallback_ttl_secs: i64::MAX,
            ..CortexConfig::default().with_fallback("cloud-llm", "local-llm")
        };
        let cortex = Cortex::new(config, ChangeNotifier::new(64));

        for _ in 0..6 {
            cortex.report_event(event("cloud-llm", EventType::Crash, Impact::Medium));
        }

        let penalty = cortex.get_active_policies("cloud-llm");
        assert_eq!(penalty.len(), 1);
        assert_eq!(penalty[0].expires_at, Some(chrono::DateTime::<Utc>::MAX_UTC));
        let global = cortex.get_active_policies(GLOBAL_TARGET);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].expires_at, Some(chrono::DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_fallback_ignores_other_sources() {
        let config = CortexConfig::default().with_fallback("cloud-llm", "local-llm");
        let cortex = Cortex::new(config, ChangeNotifier::new(64));

        for _ in 0..5 {
            cortex.report_event(event("weather", EventType::Crash, Impact::None));
        }
        assert!(cortex.get_active_policies(GLOBAL_TARGET).is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent_per_id() {
        let cortex = cortex();
        for value in [1_000, 2_000] {
            cortex.upsert_policy(AdaptivePolicy::new(
                "s",
                PolicyParameter::CircuitResetTimeoutMs,
                PolicyValue::DurationMs(value),
                "manual",
            ));
        }

        let policies = cortex.get_active_policies("s");
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].override_value, PolicyValue::DurationMs(2_000));
    }

    #[test]
    fn test_expired_policies_purged_on_read() {
        let cortex = cortex();
        let mut expired = AdaptivePolicy::new(
            "s",
            PolicyParameter::Enabled,
            PolicyValue::Enabled(false),
            "maintenance",
        );
        expired.expires_at = Some(Utc::now() - Duration::seconds(1));
        cortex.upsert_policy(expired);
        cortex.upsert_policy(AdaptivePolicy::new(
            "s",
            PolicyParameter::CircuitResetTimeoutMs,
            PolicyValue::DurationMs(5),
            "forever",
        ));

        let active = cortex.get_active_policies("s");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].reason, "forever");
        assert_eq!(cortex.all_active_policies().len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cortex = cortex();
        let policy = AdaptivePolicy::new(
            "s",
            PolicyParameter::Enabled,
            PolicyValue::Enabled(false),
            "maintenance",
        );
        let id = policy.policy_id.clone();
        cortex.upsert_policy(policy);

        assert!(cortex.remove_policy("s", &id));
        assert!(!cortex.remove_policy("s", &id));

        cortex.upsert_policy(AdaptivePolicy::new(
            "s",
            PolicyParameter::Enabled,
            PolicyValue::Enabled(false),
            "maintenance",
        ));
        cortex.clear_policies("s");
        assert!(cortex.get_active_policies("s").is_empty());
    }

    #[tokio::test]
    async fn test_observers_notified() {
        let notifier = ChangeNotifier::new(16);
        let mut rx = notifier.subscribe();
        let cortex = Cortex::new(CortexConfig::default(), notifier);

        cortex.report_event(event("s", EventType::ApiError, Impact::None));

        match rx.recv().await.unwrap() {
            CoreEvent::EventRecorded {
                source_id, health, ..
            } => {
                assert_eq!(source_id, "s");
                assert_eq!(health, 90.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
