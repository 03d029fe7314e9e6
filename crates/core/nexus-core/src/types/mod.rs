//! Core data model shared by the graph, breakers, Cortex and the engine

pub mod events;
pub mod graph;
pub mod policy;
pub mod source;

pub use events::{EventType, Impact, OperationalEvent};
pub use graph::{GraphEdge, GraphNode, GraphSnapshot};
pub use policy::{
    AdaptivePolicy, HealthTrend, PolicyParameter, PolicyValue, ReliabilityScore, GLOBAL_TARGET,
};
pub use source::{Source, SourceStatus};
