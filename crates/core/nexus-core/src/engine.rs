//! Execution engine
//!
//! Front door for running actions against sources. Every call is checked
//! against the registry and Cortex before it reaches the source's circuit
//! breaker, and the engine owns the write paths that move sources between
//! statuses so the graph can cascade those changes.

use crate::config::ResilienceConfig;
use crate::cortex::Cortex;
use crate::graph::CapabilityGraph;
use crate::notify::{ChangeNotifier, CoreEvent};
use crate::registry::{RegistryChange, SourceRegistry};
use crate::resilience::{retry_with_backoff, BreakerStatus, CircuitBreaker, CircuitState, RetryConfig};
use crate::types::{
    AdaptivePolicy, GraphSnapshot, OperationalEvent, PolicyParameter, PolicyValue,
    ReliabilityScore, SourceStatus, GLOBAL_TARGET,
};
use crate::utils::sync::{read, write};
use crate::utils::Logger;
use crate::{NexusError, Result};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Runs actions against sources behind registry, policy and breaker checks
pub struct ExecutionEngine {
    registry: Arc<dyn SourceRegistry>,
    graph: CapabilityGraph,
    cortex: Arc<Cortex>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: ResilienceConfig,
    notifier: ChangeNotifier,
    logger: Logger,
}

impl ExecutionEngine {
    /// Create a new engine and build the initial graph
    ///
    /// A dependency cycle is not fatal here: the graph falls back to an
    /// unordered load list and the cycle is logged.
    pub fn new(registry: Arc<dyn SourceRegistry>, config: ResilienceConfig) -> Result<Self> {
        config.validate()?;

        let notifier = ChangeNotifier::new(config.engine.notify_capacity);
        let cortex = Arc::new(Cortex::new(config.cortex.clone(), notifier.clone()));
        let engine = Self {
            registry,
            graph: CapabilityGraph::new(),
            cortex,
            breakers: RwLock::new(HashMap::new()),
            config,
            notifier,
            logger: Logger::new("engine"),
        };

        match engine.rebuild_graph() {
            Ok(()) | Err(NexusError::CycleDetected { .. }) => Ok(engine),
            Err(e) => Err(e),
        }
    }

    /// Run `action` for `source_id`
    ///
    /// Fails with `NotInstalled`, `Disabled` or `PolicyBlocked` before the
    /// breaker is consulted; otherwise returns whatever the breaker returns.
    pub async fn execute_action<F, Fut, T, E>(&self, source_id: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.check_runnable(source_id)?;

        let breaker = self.breaker(source_id);
        let before = breaker.state();
        let result = breaker.execute(action).await;
        let after = breaker.state();

        if self.config.engine.propagate_on_open && before != after {
            match after {
                CircuitState::Open => {
                    if let Err(e) = self.mark_failed(source_id) {
                        self.logger
                            .error(&format!("Could not mark {} failed: {}", source_id, e));
                    }
                }
                CircuitState::Closed => {
                    if let Err(e) = self.mark_recovered(source_id) {
                        self.logger
                            .error(&format!("Could not mark {} recovered: {}", source_id, e));
                    }
                }
                CircuitState::HalfOpen => {}
            }
        }

        result
    }

    /// Like [`execute_action`](Self::execute_action), retrying action failures with backoff
    ///
    /// `factory` is called once per attempt. Pre-check and open-circuit
    /// errors are returned without retrying.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        source_id: &str,
        retry: RetryConfig,
        factory: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let factory = &factory;
        retry_with_backoff(retry, NexusError::is_retryable, move || {
            self.execute_action(source_id, factory)
        })
        .await
    }

    fn check_runnable(&self, source_id: &str) -> Result<()> {
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| NexusError::NotInstalled(source_id.to_string()))?;
        if source.status == SourceStatus::Disabled {
            return Err(NexusError::Disabled(source_id.to_string()));
        }

        let blocking = self
            .cortex
            .get_active_policies(source_id)
            .into_iter()
            .find(|p| {
                p.parameter == PolicyParameter::Enabled
                    && p.override_value == PolicyValue::Enabled(false)
            });
        if let Some(policy) = blocking {
            self.logger.debug(&format!(
                "Blocked action on {}: {}",
                source_id, policy.reason
            ));
            return Err(NexusError::PolicyBlocked {
                source_id: source_id.to_string(),
                reason: policy.reason,
            });
        }
        Ok(())
    }

    /// Breaker for a source, created on first use
    pub fn breaker(&self, source_id: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = read(&self.breakers).get(source_id) {
            return breaker.clone();
        }
        write(&self.breakers)
            .entry(source_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    source_id,
                    self.config.breaker.clone(),
                    self.cortex.clone(),
                    self.notifier.clone(),
                ))
            })
            .clone()
    }

    /// Open a source's circuit by hand
    pub fn trip(&self, source_id: &str) {
        self.breaker(source_id).trip();
    }

    /// Close a source's circuit and clear its counters
    pub fn reset_breaker(&self, source_id: &str) {
        if let Some(breaker) = read(&self.breakers).get(source_id) {
            breaker.reset();
        }
    }

    /// Rebuild the capability graph from the registry
    ///
    /// On a cycle the unordered fallback is installed before the error is
    /// returned.
    pub fn rebuild_graph(&self) -> Result<()> {
        let sources = self.registry.list();
        let result = self.graph.rebuild(&sources);

        let state = self.graph.current();
        let snapshot = state.snapshot();
        self.notifier.publish(CoreEvent::GraphRebuilt {
            nodes: snapshot.nodes.len(),
            edges: snapshot.edges.len(),
            ordered: state.is_ordered(),
        });
        if result.is_ok() {
            self.logger.success(&format!(
                "Graph ready with {} sources",
                snapshot.nodes.len()
            ));
        }
        result
    }

    /// Rebuild the graph whenever registry membership changes
    ///
    /// A lagged receiver rebuilds once to catch up; the task ends when the
    /// registry's channel closes.
    pub fn spawn_rebuild_listener(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<RegistryChange>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.is_membership_change() => {
                        let _ = engine.rebuild_graph();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        engine
                            .logger
                            .warn(&format!("Missed {} registry changes, rebuilding", skipped));
                        let _ = engine.rebuild_graph();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            engine.logger.debug("Registry channel closed, rebuild listener stopped");
        })
    }

    /// Mark a source as failed and pause everything downstream of it
    ///
    /// Returns the dependents that were paused.
    pub fn mark_failed(&self, source_id: &str) -> Result<Vec<String>> {
        self.set_status(source_id, SourceStatus::Error)?;
        let paused = self.graph.propagate_failure(source_id, self.registry.as_ref());
        self.publish_statuses(&paused, SourceStatus::PausedDependency);
        Ok(paused)
    }

    /// Mark a source as active again and resume the dependents it was holding back
    ///
    /// A user-disabled source is left alone. Returns the dependents that
    /// were resumed.
    pub fn mark_recovered(&self, source_id: &str) -> Result<Vec<String>> {
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| NexusError::NotInstalled(source_id.to_string()))?;
        if source.status == SourceStatus::Disabled {
            return Ok(Vec::new());
        }

        self.set_status(source_id, SourceStatus::Active)?;
        let resumed = self.graph.propagate_recovery(source_id, self.registry.as_ref());
        self.publish_statuses(&resumed, SourceStatus::Active);
        Ok(resumed)
    }

    /// User toggle
    ///
    /// Disabling pauses active dependents. Enabling makes the source active
    /// if all of its dependencies are, otherwise it waits in
    /// `PausedDependency`.
    pub fn set_enabled(&self, source_id: &str, enabled: bool) -> Result<SourceStatus> {
        if self.registry.get(source_id).is_none() {
            return Err(NexusError::NotInstalled(source_id.to_string()));
        }

        if !enabled {
            self.set_status(source_id, SourceStatus::Disabled)?;
            let paused = self.graph.propagate_failure(source_id, self.registry.as_ref());
            self.publish_statuses(&paused, SourceStatus::PausedDependency);
            return Ok(SourceStatus::Disabled);
        }

        let upstream_active = self.graph.dependencies_of(source_id).iter().all(|id| {
            self.registry.get(id).is_some_and(|s| s.is_active())
        });
        if !upstream_active {
            self.set_status(source_id, SourceStatus::PausedDependency)?;
            return Ok(SourceStatus::PausedDependency);
        }

        self.set_status(source_id, SourceStatus::Active)?;
        let resumed = self.graph.propagate_recovery(source_id, self.registry.as_ref());
        self.publish_statuses(&resumed, SourceStatus::Active);
        Ok(SourceStatus::Active)
    }

    fn set_status(&self, source_id: &str, status: SourceStatus) -> Result<()> {
        self.registry.set_status(source_id, status)?;
        self.logger
            .info(&format!("{} is now {:?}", source_id, status));
        self.notifier.publish(CoreEvent::StatusChanged {
            source_id: source_id.to_string(),
            status,
        });
        Ok(())
    }

    fn publish_statuses(&self, ids: &[String], status: SourceStatus) {
        for id in ids {
            self.notifier.publish(CoreEvent::StatusChanged {
                source_id: id.clone(),
                status,
            });
        }
    }

    /// Pick the source that should serve a capability
    ///
    /// An active global `preferred_provider` override wins when that source
    /// provides the capability and is active; otherwise the best active
    /// provider by priority is chosen.
    pub fn resolve_provider(&self, capability: &str) -> Option<String> {
        let providers = self.graph.providers_of(capability);
        let is_active = |id: &str| {
            self.registry.get(id).is_some_and(|s| s.is_active())
        };

        let preferred = self
            .cortex
            .get_active_policies(GLOBAL_TARGET)
            .into_iter()
            .filter(|p| p.parameter == PolicyParameter::PreferredProvider)
            .find_map(|p| match p.override_value {
                PolicyValue::ProviderId(id) => Some(id),
                _ => None,
            });
        if let Some(preferred) = preferred {
            if providers.contains(&preferred) && is_active(&preferred) {
                return Some(preferred);
            }
        }

        providers.into_iter().find(|id| is_active(id))
    }

    /// Current load order
    pub fn load_order(&self) -> Vec<String> {
        self.graph.load_order()
    }

    /// Diagnostic view of the graph
    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// Status of every breaker created so far, sorted by source id
    pub fn all_breaker_statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<_> = read(&self.breakers).values().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        statuses
    }

    /// Reliability score of every source Cortex has seen
    pub fn all_reliability_scores(&self) -> Vec<ReliabilityScore> {
        self.cortex.all_scores()
    }

    /// Every unexpired policy
    pub fn active_policies(&self) -> Vec<AdaptivePolicy> {
        self.cortex.all_active_policies()
    }

    /// Recent operational events, most recent first
    pub fn event_log(&self) -> Vec<OperationalEvent> {
        self.cortex.event_log()
    }

    /// Subscribe to core change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.notifier.subscribe()
    }

    /// Shared Cortex instance
    pub fn cortex(&self) -> &Arc<Cortex> {
        &self.cortex
    }

    /// Capability graph
    pub fn graph(&self) -> &CapabilityGraph {
        &self.graph
    }

    /// Active configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }
}
