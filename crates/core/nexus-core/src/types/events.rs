use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of operational outcome observed for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Action completed normally
    Success,
    /// Action completed but slowly
    HighLatency,
    /// Action exceeded its execution timeout
    Timeout,
    /// Remote API reported an error
    ApiError,
    /// Action failed outright
    Crash,
    /// Resource usage spiked
    ResourceSpike,
}

impl EventType {
    /// Base health delta applied by Cortex before impact scaling
    pub fn base_delta(&self) -> f64 {
        match self {
            Self::Success => 1.0,
            Self::ResourceSpike => -5.0,
            Self::HighLatency => -5.0,
            Self::ApiError => -10.0,
            Self::Timeout => -15.0,
            Self::Crash => -30.0,
        }
    }
}

/// Severity of an event; the ordinal is used numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    /// No impact
    None = 0,
    /// Low impact
    Low = 1,
    /// Medium impact
    Medium = 2,
    /// High impact
    High = 3,
}

impl Impact {
    /// Numeric ordinal
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

/// A single operational observation reported to Cortex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalEvent {
    /// Event id
    pub id: Uuid,
    /// Source the event concerns
    pub source_id: String,
    /// Outcome kind
    pub event_type: EventType,
    /// Severity
    pub impact: Impact,
    /// Observed latency in milliseconds
    pub latency_ms: u64,
    /// Free-form context
    pub context: HashMap<String, serde_json::Value>,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
}

impl OperationalEvent {
    /// Create an event stamped now
    pub fn new(source_id: impl Into<String>, event_type: EventType, impact: Impact) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            event_type,
            impact,
            latency_ms: 0,
            context: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the observed latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_ordinals() {
        assert_eq!(Impact::None.ordinal(), 0);
        assert_eq!(Impact::Medium.ordinal(), 2);
        assert!(Impact::High > Impact::Low);
    }

    #[test]
    fn test_event_serializes_with_screaming_case() {
        let event = OperationalEvent::new("s1", EventType::HighLatency, Impact::None)
            .with_latency(1500)
            .with_context("attempt", serde_json::json!(2));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "HIGH_LATENCY");
        assert_eq!(json["impact"], "NONE");
        assert_eq!(json["latency_ms"], 1500);
        assert_eq!(json["context"]["attempt"], 2);
    }
}
