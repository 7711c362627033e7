//! Per-object synchronizer facade.

use super::container::{ApplyState, ContainerSynchronizer, GetState};
use super::registry::SynchronizerRegistry;
use crate::signaler::{ContainerSignaler, RuntimeSignaler};
use crate::telemetry::SharedTelemetry;
use common::error::{HandlerError, Result};
use common::types::{ClientId, ContainerId};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle that keeps one live object synchronized across peers.
///
/// Construction registers the object's `(get_state, apply_state)` pair
/// with the container's synchronizer (creating it on first use) and queues
/// the object's `connect` bootstrap. Disposal is idempotent, runs on drop,
/// and releases the container synchronizer when it was the last object.
pub struct LiveObjectSynchronizer {
    object_id: String,
    container_id: ContainerId,
    synchronizer: Arc<ContainerSynchronizer>,
    disposed: AtomicBool,
}

impl LiveObjectSynchronizer {
    /// Register a live object under a container-unique id.
    ///
    /// # Errors
    ///
    /// Returns [`common::error::SyncError::DuplicateRegistration`] when an
    /// object with this id is already registered against the container.
    pub fn new<G, A>(
        object_id: impl Into<String>,
        runtime: Arc<dyn RuntimeSignaler>,
        container: Arc<dyn ContainerSignaler>,
        telemetry: SharedTelemetry,
        get_state: G,
        apply_state: A,
    ) -> Result<Self>
    where
        G: Fn(bool) -> std::result::Result<Option<Value>, HandlerError> + Send + Sync + 'static,
        A: Fn(bool, &Value, &ClientId) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let object_id = object_id.into();
        let container_id = container.container_id();
        let registry = SynchronizerRegistry::global();
        let synchronizer = registry.acquire(runtime, container, telemetry);

        let get_state: GetState = Arc::new(get_state);
        let apply_state: ApplyState = Arc::new(apply_state);
        match synchronizer.register(&object_id, get_state, apply_state) {
            Ok(()) => Ok(Self {
                object_id,
                container_id,
                synchronizer,
                disposed: AtomicBool::new(false),
            }),
            Err(e) => {
                registry.release(container_id);
                Err(e)
            }
        }
    }

    /// The object id this handle synchronizes.
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// The container this object belongs to.
    #[must_use]
    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Unregister the object and drop this handle's reference on the
    /// container synchronizer. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.synchronizer.unregister(&self.object_id);
            SynchronizerRegistry::global().release(self.container_id);
        }
    }
}

impl Drop for LiveObjectSynchronizer {
    fn drop(&mut self) {
        self.dispose();
    }
}
