use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Target id for policies that apply to the whole runtime rather than one source
pub const GLOBAL_TARGET: &str = "__global__";

/// Direction a source's health is moving in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTrend {
    /// Health above 90
    Stable,
    /// Last event lowered health
    Degrading,
    /// Health below 40
    Critical,
    /// Last event raised health
    Recovering,
}

/// Rolling reliability metric for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityScore {
    /// Source id
    pub source_id: String,
    /// Health in `[0, 100]`
    pub current_health: f64,
    /// Number of health-lowering events seen
    pub total_failures: u64,
    /// Time of the last health-lowering event
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Current trend
    pub trend: HealthTrend,
}

impl ReliabilityScore {
    /// Fresh score at full health
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            current_health: 100.0,
            total_failures: 0,
            last_failure_at: None,
            trend: HealthTrend::Stable,
        }
    }
}

/// Parameter an adaptive policy overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyParameter {
    /// Circuit breaker cooldown before a probe is allowed
    CircuitResetTimeoutMs,
    /// Provider to route to instead of the primary one
    PreferredProvider,
    /// Kill switch for a source
    Enabled,
}

impl PolicyParameter {
    /// Stable parameter key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitResetTimeoutMs => "circuit_reset_timeout_ms",
            Self::PreferredProvider => "preferred_provider",
            Self::Enabled => "enabled",
        }
    }
}

impl std::fmt::Display for PolicyParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Override value carried by a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PolicyValue {
    /// A duration in milliseconds
    DurationMs(u64),
    /// A source id
    ProviderId(String),
    /// An on/off switch
    Enabled(bool),
}

/// A time-boxed parameter override synthesized by Cortex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptivePolicy {
    /// Deterministic id, `<target>:<parameter>`
    pub policy_id: String,
    /// Source id or [`GLOBAL_TARGET`]
    pub target_source_id: String,
    /// Overridden parameter
    pub parameter: PolicyParameter,
    /// Override value
    pub override_value: PolicyValue,
    /// Why the policy exists
    pub reason: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl AdaptivePolicy {
    /// Create a policy with the deterministic id for its target and parameter
    pub fn new(
        target_source_id: impl Into<String>,
        parameter: PolicyParameter,
        override_value: PolicyValue,
        reason: impl Into<String>,
    ) -> Self {
        let target_source_id = target_source_id.into();
        Self {
            policy_id: Self::id_for(&target_source_id, parameter),
            target_source_id,
            parameter,
            override_value,
            reason: reason.into(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Policy id for a target and parameter
    pub fn id_for(target_source_id: &str, parameter: PolicyParameter) -> String {
        format!("{}:{}", target_source_id, parameter.as_str())
    }

    /// Expire `ttl` after creation; saturates at the latest representable time
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(
            self.created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        self
    }

    /// Whether the policy is still in force at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    /// Duration override, if this policy carries one
    pub fn duration_ms(&self) -> Option<u64> {
        match self.override_value {
            PolicyValue::DurationMs(ms) => Some(ms),
            _ => None,
        }
    }
}
