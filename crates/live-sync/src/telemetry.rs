//! Structured telemetry for protocol-level failures.
//!
//! Every caught failure (listener error, state getter error, state
//! applier error, role rejection, role lookup failure) is forwarded to a
//! [`TelemetrySink`] under a stable event name and never propagates to the
//! carrier or stops a synchronizer.

use common::types::ClientId;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Stable telemetry event names.
pub mod names {
    /// An inbound event failed the role gate and was dropped.
    pub const INVALID_ROLE: &str = "SharedEvent:invalidRole";
    /// A registered event listener returned an error.
    pub const LISTENER_ERROR: &str = "SharedEvent:listenerError";
    /// Role lookup failed while gating an inbound event.
    pub const ROLE_LOOKUP_ERROR: &str = "SharedEvent:roleLookupError";
    /// An object's state getter returned an error; its id was omitted.
    pub const GET_STATE_ERROR: &str = "ObjectSync:getStateError";
    /// An object's remote-state applier returned an error.
    pub const APPLY_STATE_ERROR: &str = "ObjectSync:applyStateError";
}

/// A structured error/diagnostic event.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    /// Stable event name from [`names`].
    pub name: &'static str,
    /// Client the event relates to, when known.
    pub client_id: Option<ClientId>,
    /// Object id the event relates to, when known.
    pub object_id: Option<String>,
    /// Human-readable detail.
    pub detail: String,
}

impl TelemetryEvent {
    /// Build an event with just a name and detail.
    #[must_use]
    pub fn new(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            client_id: None,
            object_id: None,
            detail: detail.into(),
        }
    }

    /// Attach the related client id.
    #[must_use]
    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Attach the related object id.
    #[must_use]
    pub fn with_object(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

/// Receiver of structured telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record one event. Must not block and must not fail.
    fn record(&self, event: TelemetryEvent);
}

/// Shared handle to a telemetry sink.
pub type SharedTelemetry = Arc<dyn TelemetrySink>;

/// Default sink: logs through `tracing` and counts per event name.
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl LogTelemetry {
    /// Create a shared default sink.
    #[must_use]
    pub fn shared() -> SharedTelemetry {
        Arc::new(Self)
    }
}

impl TelemetrySink for LogTelemetry {
    fn record(&self, event: TelemetryEvent) {
        crate::observability::metrics::record_telemetry_event(event.name);
        warn!(
            target: "live.telemetry",
            event = event.name,
            client_id = event.client_id.as_ref().map(ClientId::as_str),
            object_id = event.object_id.as_deref(),
            detail = %event.detail,
            "Protocol failure recorded"
        );
    }
}
