//! Capability dependency graph
//!
//! Resolves "requires capability X" to a concrete provider, orders sources
//! so providers load before their consumers, and propagates failure and
//! recovery along the resolved edges.
//!
//! A rebuild indexes into a fresh [`GraphState`] and swaps it in whole, so
//! readers always see either the previous or the next complete graph.

use crate::registry::SourceRegistry;
use crate::types::{GraphEdge, GraphNode, GraphSnapshot, Source, SourceStatus};
use crate::utils::sync::{read, write};
use crate::{NexusError, Result};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Deterministic tie-break shared by provider selection and load ordering
///
/// Higher priority first; equal priorities keep discovery order. Arguments
/// are `(priority, discovery_index)` pairs.
pub fn priority_order(a: (i32, usize), b: (i32, usize)) -> Ordering {
    b.0.cmp(&a.0).then(a.1.cmp(&b.1))
}

/// One complete, immutable build of the graph
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    capability_index: HashMap<String, Vec<String>>,
    discovery: Vec<String>,
    ranks: HashMap<String, (i32, usize)>,
    load_order: Vec<String>,
    unresolved: Vec<(String, String)>,
    ordered: bool,
}

impl GraphState {
    fn rank(&self, id: &str) -> (i32, usize) {
        self.ranks.get(id).copied().unwrap_or((i32::MIN, usize::MAX))
    }

    /// Index capabilities and resolve edges; no ordering yet
    fn index(sources: &[Source]) -> Self {
        let mut state = GraphState::default();
        let mut unique: Vec<&Source> = Vec::with_capacity(sources.len());

        for source in sources {
            if state.nodes.contains_key(&source.id) {
                warn!("Duplicate source id '{}' ignored during graph build", source.id);
                continue;
            }
            unique.push(source);
            state
                .ranks
                .insert(source.id.clone(), (source.priority, state.discovery.len()));
            state.discovery.push(source.id.clone());
            state
                .nodes
                .insert(source.id.clone(), GraphNode::new(source.id.clone()));
            for capability in &source.provides_capabilities {
                state
                    .capability_index
                    .entry(capability.clone())
                    .or_default()
                    .push(source.id.clone());
            }
        }

        for source in unique {
            for capability in &source.requires_capabilities {
                let Some(provider) = state.select_provider(capability, &source.id) else {
                    let err = NexusError::UnresolvedCapability {
                        consumer: source.id.clone(),
                        capability: capability.clone(),
                    };
                    warn!("{}", err);
                    state
                        .unresolved
                        .push((source.id.clone(), capability.clone()));
                    continue;
                };
                state.link(&provider, &source.id, capability);
            }
        }

        state
    }

    /// Highest-priority provider of `capability`, excluding the consumer itself
    fn select_provider(&self, capability: &str, consumer: &str) -> Option<String> {
        self.capability_index
            .get(capability)?
            .iter()
            .filter(|id| id.as_str() != consumer)
            .min_by(|a, b| priority_order(self.rank(a), self.rank(b)))
            .cloned()
    }

    fn link(&mut self, provider: &str, consumer: &str, capability: &str) {
        self.edges.push(GraphEdge {
            from: provider.to_string(),
            to: consumer.to_string(),
            capability: capability.to_string(),
        });
        if let Some(node) = self.nodes.get_mut(consumer) {
            if !node.dependencies.iter().any(|d| d == provider) {
                node.dependencies.push(provider.to_string());
            }
        }
        if let Some(node) = self.nodes.get_mut(provider) {
            if !node.dependents.iter().any(|d| d == consumer) {
                node.dependents.push(consumer.to_string());
            }
        }
    }

    /// Kahn's algorithm, seeded in priority order
    fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|n| (n.source_id.as_str(), n.dependencies.len()))
            .collect();

        let mut seeds: Vec<&str> = self
            .discovery
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        seeds.sort_by(|a, b| priority_order(self.rank(a), self.rank(b)));

        let mut queue: VecDeque<&str> = seeds.into_iter().collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let remaining = self
                .discovery
                .iter()
                .filter(|id| !placed.contains(id.as_str()))
                .cloned()
                .collect();
            return Err(NexusError::CycleDetected { remaining });
        }

        Ok(order)
    }

    fn assign_layers(&mut self, order: &[String]) {
        for id in order {
            let layer = self.nodes.get(id).map_or(0, |node| {
                node.dependencies
                    .iter()
                    .filter_map(|dep| self.nodes.get(dep))
                    .map(|dep| dep.layer + 1)
                    .max()
                    .unwrap_or(0)
            });
            if let Some(node) = self.nodes.get_mut(id) {
                node.layer = layer;
            }
        }
    }

    /// Load order; unordered install order if the build hit a cycle
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// Whether the load order is a valid topological order
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Node for a source
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Resolved edges
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Providers of a capability, best first
    pub fn providers_of(&self, capability: &str) -> Vec<String> {
        let mut providers = self
            .capability_index
            .get(capability)
            .cloned()
            .unwrap_or_default();
        providers.sort_by(|a, b| priority_order(self.rank(a), self.rank(b)));
        providers
    }

    /// `(consumer, capability)` pairs left without a provider
    pub fn unresolved(&self) -> &[(String, String)] {
        &self.unresolved
    }

    /// Diagnostic copy with nodes in load order
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .load_order
                .iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            edges: self.edges.clone(),
            ordered: self.ordered,
        }
    }
}

/// Shared handle to the current graph
#[derive(Debug, Default)]
pub struct CapabilityGraph {
    current: RwLock<Arc<GraphState>>,
}

impl CapabilityGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a registry snapshot and swap it in
    ///
    /// On a cycle the new graph is still installed with every source in
    /// install order, and `CycleDetected` is returned so the caller knows the
    /// order is not meaningful.
    pub fn rebuild(&self, sources: &[Source]) -> Result<()> {
        let mut state = GraphState::index(sources);

        let result = match state.topological_order() {
            Ok(order) => {
                state.assign_layers(&order);
                state.load_order = order;
                state.ordered = true;
                Ok(())
            }
            Err(err) => {
                warn!("{}; falling back to unordered load list", err);
                state.load_order = state.discovery.clone();
                state.ordered = false;
                Err(err)
            }
        };

        debug!(
            "Capability graph rebuilt: {} nodes, {} edges, {} unresolved",
            state.nodes.len(),
            state.edges.len(),
            state.unresolved.len()
        );
        *write(&self.current) = Arc::new(state);
        result
    }

    /// The current complete graph
    pub fn current(&self) -> Arc<GraphState> {
        read(&self.current).clone()
    }

    /// Load order of the current graph
    pub fn load_order(&self) -> Vec<String> {
        self.current().load_order.clone()
    }

    /// Diagnostic snapshot of the current graph
    pub fn snapshot(&self) -> GraphSnapshot {
        self.current().snapshot()
    }

    /// Direct dependencies of a source
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.current()
            .node(id)
            .map(|n| n.dependencies.clone())
            .unwrap_or_default()
    }

    /// Direct dependents of a source
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.current()
            .node(id)
            .map(|n| n.dependents.clone())
            .unwrap_or_default()
    }

    /// Layer of a source
    pub fn layer_of(&self, id: &str) -> Option<usize> {
        self.current().node(id).map(|n| n.layer)
    }

    /// Providers of a capability, best first
    pub fn providers_of(&self, capability: &str) -> Vec<String> {
        self.current().providers_of(capability)
    }

    /// Pause every transitive dependent of a failed source that is still active
    ///
    /// Returns the ids that were paused.
    pub fn propagate_failure(&self, failed_id: &str, registry: &dyn SourceRegistry) -> Vec<String> {
        let graph = self.current();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut reached = Vec::new();

        visited.insert(failed_id.to_string());
        queue.push_back(failed_id.to_string());

        while let Some(id) = queue.pop_front() {
            let Some(node) = graph.node(&id) else {
                continue;
            };
            for dependent in &node.dependents {
                if visited.insert(dependent.clone()) {
                    reached.push(dependent.clone());
                    queue.push_back(dependent.clone());
                }
            }
        }

        let mut paused = Vec::new();
        for id in reached {
            let is_active = registry.get(&id).is_some_and(|s| s.is_active());
            if !is_active {
                continue;
            }
            match registry.set_status(&id, SourceStatus::PausedDependency) {
                Ok(()) => {
                    info!("Paused {} (upstream {} failed)", id, failed_id);
                    paused.push(id);
                }
                Err(e) => warn!("Failed to pause {}: {}", id, e),
            }
        }
        paused
    }

    /// Resume dependents whose every dependency is active again
    ///
    /// Only sources in `PausedDependency` are touched; user-disabled and
    /// errored sources stay as they are. Returns the ids that were resumed.
    pub fn propagate_recovery(
        &self,
        recovered_id: &str,
        registry: &dyn SourceRegistry,
    ) -> Vec<String> {
        let graph = self.current();
        let mut resumed = Vec::new();
        Self::resume_dependents(&graph, recovered_id, registry, &mut resumed);
        resumed
    }

    fn resume_dependents(
        graph: &GraphState,
        id: &str,
        registry: &dyn SourceRegistry,
        resumed: &mut Vec<String>,
    ) {
        let Some(node) = graph.node(id) else {
            return;
        };

        for dependent in &node.dependents {
            let Some(dep_node) = graph.node(dependent) else {
                continue;
            };
            let upstream_healthy = dep_node.dependencies.iter().all(|upstream| {
                registry.get(upstream).is_some_and(|s| s.is_active())
            });
            if !upstream_healthy {
                continue;
            }
            let is_paused = registry
                .get(dependent)
                .is_some_and(|s| s.status == SourceStatus::PausedDependency);
            if !is_paused {
                continue;
            }
            match registry.set_status(dependent, SourceStatus::Active) {
                Ok(()) => {
                    info!("Resumed {} (upstream {} recovered)", dependent, id);
                    resumed.push(dependent.clone());
                    Self::resume_dependents(graph, dependent, registry, resumed);
                }
                Err(e) => warn!("Failed to resume {}: {}", dependent, e),
            }
        }
    }
}
