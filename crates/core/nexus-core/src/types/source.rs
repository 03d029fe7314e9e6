use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of an installed source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    /// Running and accepting actions
    Active,
    /// Turned off by the user
    Disabled,
    /// Paused because an upstream provider is unhealthy
    PausedDependency,
    /// Failed unrecoverably
    Error,
}

impl Default for SourceStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// An installed capability-providing unit, as read from the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier
    pub id: String,
    /// Capabilities this source offers to others
    pub provides_capabilities: BTreeSet<String>,
    /// Capabilities this source needs from others
    pub requires_capabilities: BTreeSet<String>,
    /// Higher wins provider selection and load order ties
    pub priority: i32,
    /// Current status
    pub status: SourceStatus,
}

impl Source {
    /// Create an active source with no capabilities
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            provides_capabilities: BTreeSet::new(),
            requires_capabilities: BTreeSet::new(),
            priority,
            status: SourceStatus::Active,
        }
    }

    /// Add a provided capability
    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides_capabilities.insert(capability.into());
        self
    }

    /// Add a required capability
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires_capabilities.insert(capability.into());
        self
    }

    /// Set the initial status
    pub fn with_status(mut self, status: SourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the source is currently active
    pub fn is_active(&self) -> bool {
        self.status == SourceStatus::Active
    }
}
