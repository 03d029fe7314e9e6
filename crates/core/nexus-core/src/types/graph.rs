use serde::{Deserialize, Serialize};

/// A source's position in the capability graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Source id
    pub source_id: String,
    /// Depth; 0 for sources with no dependencies
    pub layer: usize,
    /// Providers this source depends on, in resolution order
    pub dependencies: Vec<String>,
    /// Consumers depending on this source, in resolution order
    pub dependents: Vec<String>,
}

impl GraphNode {
    pub(crate) fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            layer: 0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// Resolved `provider -> consumer` link for one capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Provider source id
    pub from: String,
    /// Consumer source id
    pub to: String,
    /// Capability the edge satisfies
    pub capability: String,
}

/// Read-only copy of the graph for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes in load order
    pub nodes: Vec<GraphNode>,
    /// All resolved edges
    pub edges: Vec<GraphEdge>,
    /// False when a cycle forced the unordered fallback
    pub ordered: bool,
}
