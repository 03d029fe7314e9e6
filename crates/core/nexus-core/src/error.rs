//! Error types for the Nexus resilience core

use thiserror::Error;

/// Main error type for Nexus operations
#[derive(Debug, Error)]
pub enum NexusError {
    /// The capability graph contains a cycle; load order fell back to an unordered list
    #[error("Cycle detected in capability graph involving: {}", .remaining.join(", "))]
    CycleDetected {
        /// Sources that could not be ordered
        remaining: Vec<String>,
    },

    /// A required capability has no provider (soft failure, logged only)
    #[error("Unresolved capability '{capability}' required by '{consumer}'")]
    UnresolvedCapability {
        /// Consumer source id
        consumer: String,
        /// Capability without a provider
        capability: String,
    },

    /// Circuit breaker rejected the call without invoking the action
    #[error("Circuit open for '{source_id}', retry in {}s", .retry_in_ms.div_ceil(1000))]
    CircuitOpen {
        /// Source guarded by the breaker
        source_id: String,
        /// Remaining cooldown in milliseconds
        retry_in_ms: u64,
    },

    /// The action did not finish within the execution timeout
    #[error("Action for '{source_id}' timed out after {timeout_ms}ms")]
    ActionTimeout {
        /// Source the action ran against
        source_id: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The action returned an error or panicked
    #[error("Action for '{source_id}' failed: {message}")]
    ActionCrash {
        /// Source the action ran against
        source_id: String,
        /// Underlying failure
        message: String,
    },

    /// Source is not installed in the registry
    #[error("Source '{0}' is not installed")]
    NotInstalled(String),

    /// Source is disabled by the user
    #[error("Source '{0}' is disabled")]
    Disabled(String),

    /// An adaptive policy blocks execution
    #[error("Source '{source_id}' blocked by policy: {reason}")]
    PolicyBlocked {
        /// Blocked source
        source_id: String,
        /// Human-readable policy reason
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found error (generic)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Convenient Result type using NexusError
pub type Result<T> = std::result::Result<T, NexusError>;

impl NexusError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        NexusError::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        NexusError::NotFound(msg.into())
    }

    /// Create an action crash error
    pub fn action_crash(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        NexusError::ActionCrash {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from running the action itself (timeout or crash)
    pub fn is_action_failure(&self) -> bool {
        matches!(
            self,
            NexusError::ActionTimeout { .. } | NexusError::ActionCrash { .. }
        )
    }

    /// Whether retrying the same call immediately can succeed
    ///
    /// Only action failures qualify. An open circuit, a missing or disabled
    /// source and a policy block all need something else to change first.
    pub fn is_retryable(&self) -> bool {
        self.is_action_failure()
    }
}
