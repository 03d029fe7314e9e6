//! Source registry seam
//!
//! The registry owns source manifests and statuses. The core only reads
//! snapshots and writes the status transitions caused by propagation, so
//! any store can sit behind [`SourceRegistry`]. [`InMemorySourceRegistry`]
//! is the reference implementation used by embedders and tests.

use crate::types::{Source, SourceStatus};
use crate::utils::sync::{read, write};
use crate::{NexusError, Result};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Read/write access the core needs from the source registry
#[cfg_attr(test, mockall::automock)]
pub trait SourceRegistry: Send + Sync {
    /// Snapshot of every installed source, in install order
    fn list(&self) -> Vec<Source>;

    /// Snapshot of one source
    fn get(&self, id: &str) -> Option<Source>;

    /// Change a source's status
    fn set_status(&self, id: &str, status: SourceStatus) -> Result<()>;
}

/// Change published by [`InMemorySourceRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryChange {
    /// A source was installed or its manifest replaced
    Installed {
        /// Source id
        source_id: String,
    },
    /// A source was removed
    Uninstalled {
        /// Source id
        source_id: String,
    },
    /// A source's status changed
    StatusChanged {
        /// Source id
        source_id: String,
        /// New status
        status: SourceStatus,
    },
}

impl RegistryChange {
    /// Whether the set of sources (and therefore the graph) changed
    pub fn is_membership_change(&self) -> bool {
        matches!(self, Self::Installed { .. } | Self::Uninstalled { .. })
    }
}

/// Thread-safe registry kept in memory
pub struct InMemorySourceRegistry {
    sources: RwLock<Vec<Source>>,
    changes: broadcast::Sender<RegistryChange>,
}

impl InMemorySourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(256);
        Self {
            sources: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Create a registry holding `sources`
    pub fn with_sources(sources: impl IntoIterator<Item = Source>) -> Self {
        let registry = Self::new();
        for source in sources {
            registry.install(source);
        }
        registry
    }

    /// Install a source, replacing any manifest with the same id in place
    pub fn install(&self, source: Source) {
        let source_id = source.id.clone();
        {
            let mut sources = write(&self.sources);
            match sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source,
                None => sources.push(source),
            }
        }
        debug!("Installed source {}", source_id);
        let _ = self.changes.send(RegistryChange::Installed { source_id });
    }

    /// Remove a source; returns whether it was installed
    pub fn uninstall(&self, id: &str) -> bool {
        let removed = {
            let mut sources = write(&self.sources);
            let before = sources.len();
            sources.retain(|s| s.id != id);
            sources.len() != before
        };
        if removed {
            debug!("Uninstalled source {}", id);
            let _ = self.changes.send(RegistryChange::Uninstalled {
                source_id: id.to_string(),
            });
        }
        removed
    }

    /// Subscribe to registry changes
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    /// Number of installed sources
    pub fn len(&self) -> usize {
        read(&self.sources).len()
    }

    /// Whether no sources are installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry for InMemorySourceRegistry {
    fn list(&self) -> Vec<Source> {
        read(&self.sources).clone()
    }

    fn get(&self, id: &str) -> Option<Source> {
        read(&self.sources).iter().find(|s| s.id == id).cloned()
    }

    fn set_status(&self, id: &str, status: SourceStatus) -> Result<()> {
        {
            let mut sources = write(&self.sources);
            let source = sources
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| NexusError::not_found(format!("Source '{}'", id)))?;
            if source.status == status {
                return Ok(());
            }
            source.status = status;
        }
        let _ = self.changes.send(RegistryChange::StatusChanged {
            source_id: id.to_string(),
            status,
        });
        Ok(())
    }
}
