//! Carrier signaler traits.
//!
//! The underlying data-collaboration runtime is consumed through two
//! minimal capability sets. The host supplies concrete bindings; tests use
//! the in-memory mocks from `sync-test-utils`.
//!
//! Inbound delivery is subscription-based: each call to `signals()` (or
//! `connections()`) returns a fresh broadcast receiver positioned at "now".
//! Consumers spawn a task draining the receiver; a lagged receiver loses
//! old signals, which the protocol tolerates because the periodic `update`
//! is idempotent and authoritative.

use async_trait::async_trait;
use common::error::Result;
use common::types::{ClientId, ContainerId};
use live_protocol::InboundSignalMessage;
use serde_json::Value;
use tokio::sync::broadcast;

/// An inbound signal together with its origin flag.
#[derive(Debug, Clone)]
pub struct InboundSignal {
    /// The raw carrier message.
    pub message: InboundSignalMessage,
    /// True iff the signal originated at this client.
    pub local: bool,
}

/// Capability set of the per-client runtime signaler.
#[async_trait]
pub trait RuntimeSignaler: Send + Sync {
    /// Carrier-assigned identifier for this connection, if connected.
    fn client_id(&self) -> Option<ClientId>;

    /// Whether the runtime currently has a live connection.
    fn is_connected(&self) -> bool;

    /// Submit a signal. Fire-and-forget: returns once the signal is handed
    /// to the carrier, with no delivery confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`common::error::SyncError::TransportDisconnected`] when the
    /// runtime has no live connection.
    async fn submit_signal(&self, kind: &str, content: Value) -> Result<()>;

    /// Subscribe to inbound signals.
    fn signals(&self) -> broadcast::Receiver<InboundSignal>;

    /// Subscribe to connection-established notifications.
    fn connections(&self) -> broadcast::Receiver<()>;
}

/// Capability set of the container-scoped signaler.
#[async_trait]
pub trait ContainerSignaler: Send + Sync {
    /// Identity of the container runtime. Keys the process-wide
    /// synchronizer registry.
    fn container_id(&self) -> ContainerId;

    /// Submit a signal to all peers in the container.
    ///
    /// # Errors
    ///
    /// Returns [`common::error::SyncError::TransportDisconnected`] when the
    /// container has no live connection.
    async fn submit_signal(&self, kind: &str, content: Value) -> Result<()>;

    /// Subscribe to inbound container signals.
    fn signals(&self) -> broadcast::Receiver<InboundSignal>;
}
