//! Configuration management and environment variable loading

use crate::{NexusError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Load environment variables from .env file
///
/// Loads variables from a .env file in the current directory or a parent
/// directory. A missing file is not an error.
///
/// # Example
///
/// ```no_run
/// use nexus_core::load_env;
///
/// load_env().ok();
/// let threshold = std::env::var("NEXUS_BREAKER_FAILURE_THRESHOLD").unwrap_or_default();
/// ```
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("✓ Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(NexusError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::warn!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(NexusError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Largest accepted breaker timeout or cooldown (one day)
pub const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Largest accepted Cortex policy lifetime (thirty days)
pub const MAX_POLICY_TTL_SECS: i64 = 30 * 86_400;

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Circuit breaker settings applied to every per-source breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures (since the last open) that trip the circuit
    pub failure_threshold: u32,
    /// Base cooldown before a probe is allowed
    pub reset_timeout_ms: u64,
    /// Upper bound on a single action's run time
    pub execution_timeout_ms: u64,
    /// Successful calls slower than this are reported as high latency
    pub high_latency_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 10_000,
            execution_timeout_ms: 5_000,
            high_latency_ms: 1_000,
        }
    }
}

impl BreakerConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            failure_threshold: get_env_int(
                "NEXUS_BREAKER_FAILURE_THRESHOLD",
                defaults.failure_threshold,
            ),
            reset_timeout_ms: get_env_int(
                "NEXUS_BREAKER_RESET_TIMEOUT_MS",
                defaults.reset_timeout_ms,
            ),
            execution_timeout_ms: get_env_int(
                "NEXUS_BREAKER_EXECUTION_TIMEOUT_MS",
                defaults.execution_timeout_ms,
            ),
            high_latency_ms: get_env_int("NEXUS_BREAKER_HIGH_LATENCY_MS", defaults.high_latency_ms),
        }
    }
}

/// Cortex reliability engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CortexConfig {
    /// Ring buffer size for the event log
    pub event_log_capacity: usize,
    /// Cooldown forced on a critical source
    pub penalty_reset_timeout_ms: u64,
    /// Lifetime of a penalty-box policy
    pub penalty_ttl_secs: i64,
    /// Lifetime of the global fallback policy
    pub fallback_ttl_secs: i64,
    /// Provider whose degradation triggers the fallback rule
    pub primary_provider: Option<String>,
    /// Provider routed to while the primary is degraded
    pub fallback_provider: Option<String>,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: 500,
            penalty_reset_timeout_ms: 30_000,
            penalty_ttl_secs: 300,
            fallback_ttl_secs: 600,
            primary_provider: None,
            fallback_provider: None,
        }
    }
}

impl CortexConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            event_log_capacity: get_env_int(
                "NEXUS_CORTEX_EVENT_LOG_CAPACITY",
                defaults.event_log_capacity,
            ),
            penalty_reset_timeout_ms: get_env_int(
                "NEXUS_CORTEX_PENALTY_RESET_TIMEOUT_MS",
                defaults.penalty_reset_timeout_ms,
            ),
            penalty_ttl_secs: get_env_int("NEXUS_CORTEX_PENALTY_TTL_SECS", defaults.penalty_ttl_secs),
            fallback_ttl_secs: get_env_int(
                "NEXUS_CORTEX_FALLBACK_TTL_SECS",
                defaults.fallback_ttl_secs,
            ),
            primary_provider: get_env_opt("NEXUS_CORTEX_PRIMARY_PROVIDER"),
            fallback_provider: get_env_opt("NEXUS_CORTEX_FALLBACK_PROVIDER"),
        }
    }

    /// Designate a primary provider and its fallback
    pub fn with_fallback(
        mut self,
        primary: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        self.primary_provider = Some(primary.into());
        self.fallback_provider = Some(fallback.into());
        self
    }
}

/// Execution engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Buffer size of the change-notification channel
    pub notify_capacity: usize,
    /// Mark a source ERROR (and pause its dependents) when its breaker opens
    pub propagate_on_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_capacity: 256,
            propagate_on_open: false,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            notify_capacity: get_env_int("NEXUS_ENGINE_NOTIFY_CAPACITY", defaults.notify_capacity),
            propagate_on_open: get_env_bool(
                "NEXUS_ENGINE_PROPAGATE_ON_OPEN",
                defaults.propagate_on_open,
            ),
        }
    }
}

/// Top-level configuration for the resilience core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker settings
    pub breaker: BreakerConfig,
    /// Cortex settings
    pub cortex: CortexConfig,
    /// Engine settings
    pub engine: EngineConfig,
}

impl ResilienceConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            breaker: BreakerConfig::from_env(),
            cortex: CortexConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }

    /// Reject settings that would disable the control loop
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.breaker.failure_threshold == 0 {
            errors.push("breaker.failure_threshold must be at least 1");
        }
        if self.breaker.execution_timeout_ms == 0 {
            errors.push("breaker.execution_timeout_ms must be positive");
        }
        if self.breaker.reset_timeout_ms > MAX_TIMEOUT_MS
            || self.breaker.execution_timeout_ms > MAX_TIMEOUT_MS
            || self.breaker.high_latency_ms > MAX_TIMEOUT_MS
        {
            errors.push("breaker timeouts must not exceed one day");
        }
        if self.cortex.event_log_capacity == 0 {
            errors.push("cortex.event_log_capacity must be positive");
        }
        if self.cortex.penalty_ttl_secs < 0 || self.cortex.fallback_ttl_secs < 0 {
            errors.push("cortex policy TTLs must not be negative");
        }
        if self.cortex.penalty_ttl_secs > MAX_POLICY_TTL_SECS
            || self.cortex.fallback_ttl_secs > MAX_POLICY_TTL_SECS
        {
            errors.push("cortex policy TTLs must not exceed thirty days");
        }
        if self.cortex.penalty_reset_timeout_ms > MAX_TIMEOUT_MS {
            errors.push("cortex.penalty_reset_timeout_ms must not exceed one day");
        }
        if self.engine.notify_capacity == 0 {
            errors.push("engine.notify_capacity must be positive");
        }

        if !errors.is_empty() {
            return Err(NexusError::config(errors.join(", ")));
        }

        Ok(())
    }
}
