//! Process-wide synchronizer registry.
//!
//! Keyed by container-runtime identity: the first registration against a
//! container creates its synchronizer, later registrations share it, and
//! the refcount reaching zero stops the background task and removes the
//! entry. The map is the only process-wide mutable state in the core and
//! is guarded by a single mutex.

use super::container::ContainerSynchronizer;
use crate::observability::metrics;
use crate::signaler::{ContainerSignaler, RuntimeSignaler};
use crate::telemetry::SharedTelemetry;
use common::config;
use common::types::ContainerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

static GLOBAL: OnceLock<SynchronizerRegistry> = OnceLock::new();

/// Registry of live container synchronizers.
#[derive(Default)]
pub struct SynchronizerRegistry {
    containers: Mutex<HashMap<ContainerId, Arc<ContainerSynchronizer>>>,
}

impl SynchronizerRegistry {
    /// The process-wide registry instance.
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::default)
    }

    /// Get or create the synchronizer for a container and take a
    /// reference on it. Reads the process-global update interval at
    /// creation time.
    pub(crate) fn acquire(
        &self,
        runtime: Arc<dyn RuntimeSignaler>,
        container: Arc<dyn ContainerSignaler>,
        telemetry: SharedTelemetry,
    ) -> Arc<ContainerSynchronizer> {
        let container_id = container.container_id();
        let mut containers = self.containers.lock().expect("registry poisoned");
        let synchronizer = containers
            .entry(container_id)
            .or_insert_with(|| {
                debug!(
                    target: "live.sync.registry",
                    container_id = %container_id,
                    "Creating container synchronizer"
                );
                ContainerSynchronizer::spawn(
                    runtime,
                    container,
                    telemetry,
                    config::update_interval(),
                )
            });
        let synchronizer = Arc::clone(synchronizer);
        synchronizer.retain();
        metrics::set_container_synchronizers(containers.len());
        synchronizer
    }

    /// Drop one reference on a container's synchronizer; the last release
    /// stops its task and removes the entry.
    pub(crate) fn release(&self, container_id: ContainerId) {
        let mut containers = self.containers.lock().expect("registry poisoned");
        if let Some(synchronizer) = containers.get(&container_id) {
            if synchronizer.release_ref() == 0 {
                debug!(
                    target: "live.sync.registry",
                    container_id = %container_id,
                    "Last reference released, removing container synchronizer"
                );
                synchronizer.shutdown();
                containers.remove(&container_id);
            }
        }
        metrics::set_container_synchronizers(containers.len());
    }

    /// The synchronizer currently serving a container, if any.
    #[must_use]
    pub fn get(&self, container_id: ContainerId) -> Option<Arc<ContainerSynchronizer>> {
        self.containers
            .lock()
            .expect("registry poisoned")
            .get(&container_id)
            .cloned()
    }

    /// Whether a synchronizer exists for the container.
    #[must_use]
    pub fn contains(&self, container_id: ContainerId) -> bool {
        self.containers
            .lock()
            .expect("registry poisoned")
            .contains_key(&container_id)
    }

    /// Number of live synchronizers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.lock().expect("registry poisoned").len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
