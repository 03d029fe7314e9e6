//! Change notifications for dashboards and other observers
//!
//! The core publishes onto a broadcast channel instead of calling observer
//! callbacks. Receivers that fall behind see `RecvError::Lagged` and should
//! simply re-read the snapshots they care about.

use crate::resilience::CircuitState;
use crate::types::{EventType, SourceStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Something in the core changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoreEvent {
    /// The capability graph was rebuilt
    GraphRebuilt {
        /// Number of nodes
        nodes: usize,
        /// Number of resolved edges
        edges: usize,
        /// False when a cycle forced the unordered fallback
        ordered: bool,
    },
    /// A source's status was changed by the core
    StatusChanged {
        /// Source id
        source_id: String,
        /// New status
        status: SourceStatus,
    },
    /// A circuit breaker changed state
    BreakerTransition {
        /// Source id
        source_id: String,
        /// Previous state
        from: CircuitState,
        /// New state
        to: CircuitState,
    },
    /// Cortex recorded an operational event
    EventRecorded {
        /// Source id
        source_id: String,
        /// Event kind
        event_type: EventType,
        /// Health after the event
        health: f64,
    },
    /// Policies for a target were added, replaced or removed
    PolicyChanged {
        /// Source id or the global target
        target_source_id: String,
    },
}

/// Cloneable publisher handle
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<CoreEvent>,
}

impl ChangeNotifier {
    /// Create a notifier buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let notifier = ChangeNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(CoreEvent::PolicyChanged {
            target_source_id: "tts".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::PolicyChanged {
                target_source_id: "tts".to_string()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let notifier = ChangeNotifier::new(1);
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.publish(CoreEvent::GraphRebuilt {
            nodes: 0,
            edges: 0,
            ordered: true,
        });
    }
}
