//! Nexus Resilience Core
//!
//! Decides which installed sources may run, tracks which are unhealthy and
//! gates execution against them. It includes:
//!
//! - Capability graph with priority-aware load ordering and cycle fallback
//! - Cascading pause/resume of dependents on failure and recovery
//! - Per-source circuit breakers with execution timeouts
//! - Cortex, a reliability engine that scores sources and synthesizes
//!   time-boxed policy overrides
//! - Execution engine tying registry, policies and breakers together
//! - Broadcast change notifications for dashboards
//!
//! # Example
//!
//! ```no_run
//! use nexus_core::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     init_logging();
//!     let registry = Arc::new(InMemorySourceRegistry::with_sources([
//!         Source::new("llm", 10).provides("text"),
//!         Source::new("tts", 5).provides("voice").requires("text"),
//!     ]));
//!     let engine = ExecutionEngine::new(registry, ResilienceConfig::from_env())?;
//!
//!     let reply = engine
//!         .execute_action("llm", || async { Ok::<_, String>("hello".to_string()) })
//!         .await?;
//!     println!("{} (load order: {:?})", reply, engine.load_order());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export commonly used types
pub use uuid::Uuid;

// Core modules
pub mod config;
pub mod cortex;
pub mod engine;
pub mod error;
pub mod graph;
pub mod notify;
pub mod registry;
pub mod resilience;
pub mod types;
pub mod utils;

// Re-export main types
pub use config::{
    get_env_bool, get_env_int, load_env, BreakerConfig, CortexConfig, EngineConfig,
    ResilienceConfig,
};
pub use cortex::Cortex;
pub use engine::ExecutionEngine;
pub use error::{NexusError, Result};
pub use graph::{priority_order, CapabilityGraph, GraphState};
pub use notify::{ChangeNotifier, CoreEvent};
pub use registry::{InMemorySourceRegistry, RegistryChange, SourceRegistry};
pub use resilience::{
    retry_with_backoff, BreakerStatus, CircuitBreaker, CircuitState, RetryConfig,
};
pub use types::{
    AdaptivePolicy, EventType, GraphEdge, GraphNode, GraphSnapshot, HealthTrend, Impact,
    OperationalEvent, PolicyParameter, PolicyValue, ReliabilityScore, Source, SourceStatus,
    GLOBAL_TARGET,
};
pub use utils::{init_logging, Logger};
