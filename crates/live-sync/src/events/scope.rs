//! Event scope: named, role-filtered send/receive over the raw signaler.
//!
//! Outbound events are stamped with the event name, a session-consistent
//! timestamp, and the sender's carrier identifier, then submitted
//! fire-and-forget. Inbound signals pass through a fixed pipeline:
//!
//! 1. dropped while the runtime is disconnected or the carrier supplied no
//!    client identifier;
//! 2. the carrier identity must hold roles intersecting `allowed_roles`
//!    (empty set allows everyone); rejected events are dropped silently
//!    and recorded as `SharedEvent:invalidRole`. The gate runs whether or
//!    not a listener is subscribed to the name;
//! 3. the envelope's `clientId` is rewritten to the carrier's identifier,
//!    so a forged sender identity in the payload never reaches listeners;
//! 4. listeners for the event name run one by one; a listener error is
//!    recorded and never interrupts the remaining listeners.

use crate::observability::metrics;
use crate::roles::RoleVerifier;
use crate::signaler::{InboundSignal, RuntimeSignaler};
use crate::telemetry::{names, SharedTelemetry, TelemetryEvent};
use common::error::{HandlerError, Result, SyncError};
use common::time::TimestampSource;
use common::types::Role;
use live_protocol::LiveEvent;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a registered listener, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&LiveEvent, bool) -> std::result::Result<(), HandlerError> + Send + Sync>;

struct ScopeInner {
    runtime: Arc<dyn RuntimeSignaler>,
    verifier: Arc<RoleVerifier>,
    timestamps: Arc<dyn TimestampSource>,
    telemetry: SharedTelemetry,
    allowed_roles: RwLock<Vec<Role>>,
    listeners: Mutex<HashMap<String, Vec<(SubscriptionId, Listener)>>>,
    next_subscription: AtomicU64,
    last_dispatch_error: Mutex<Option<String>>,
}

/// A named, role-filtered broadcast channel over the raw signaler.
///
/// The scope does not own its runtime; several scopes may share one.
pub struct EventScope {
    inner: Arc<ScopeInner>,
    cancel: CancellationToken,
}

impl EventScope {
    /// Create a scope and start its inbound dispatch task.
    ///
    /// `allowed_roles` governs inbound filtering only; outbound sends are
    /// never filtered locally.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn RuntimeSignaler>,
        verifier: Arc<RoleVerifier>,
        timestamps: Arc<dyn TimestampSource>,
        telemetry: SharedTelemetry,
        allowed_roles: Vec<Role>,
    ) -> Self {
        let inner = Arc::new(ScopeInner {
            runtime,
            verifier,
            timestamps,
            telemetry,
            allowed_roles: RwLock::new(allowed_roles),
            listeners: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            last_dispatch_error: Mutex::new(None),
        });
        let cancel = CancellationToken::new();

        let receiver = inner.runtime.signals();
        tokio::spawn(run_inbound_loop(
            Arc::clone(&inner),
            receiver,
            cancel.clone(),
        ));

        Self { inner, cancel }
    }

    /// Send a named event to every peer in the session.
    ///
    /// Clones the payload into a fresh envelope, stamps `name`,
    /// `timestamp`, and `clientId`, submits it, and returns the completed
    /// envelope. Submission is best-effort: a disconnected transport drops
    /// the signal without surfacing an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] if the payload cannot be
    /// serialized.
    pub async fn send_event(
        &self,
        name: &str,
        payload: Map<String, Value>,
    ) -> Result<LiveEvent> {
        let envelope = LiveEvent::new(
            name,
            self.inner.runtime.client_id(),
            self.inner.timestamps.now_millis(),
            payload,
        );
        let content = serde_json::to_value(&envelope)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        match self.inner.runtime.submit_signal(name, content).await {
            Ok(()) => metrics::record_signal_submitted(name),
            Err(SyncError::TransportDisconnected) => {
                debug!(
                    target: "live.events.scope",
                    event = name,
                    "Runtime disconnected, event dropped before submission"
                );
            }
            Err(e) => {
                warn!(
                    target: "live.events.scope",
                    event = name,
                    error = %e,
                    "Signal submission failed"
                );
            }
        }

        Ok(envelope)
    }

    /// Send any serializable record as a named event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] if `payload` does not
    /// serialize to a JSON object.
    pub async fn send_json<T: Serialize>(&self, name: &str, payload: &T) -> Result<LiveEvent> {
        let value =
            serde_json::to_value(payload).map_err(|e| SyncError::Serialization(e.to_string()))?;
        match value {
            Value::Object(map) => self.send_event(name, map).await,
            other => Err(SyncError::Serialization(format!(
                "event payload must be an object, got {other}"
            ))),
        }
    }

    /// Register a listener for a named event.
    ///
    /// Listeners receive the rewritten envelope and a flag that is true
    /// iff the event originated at this client.
    pub fn on_event<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&LiveEvent, bool) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.inner.listeners.lock().expect("listener registry poisoned");
        listeners
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener. Returns whether anything
    /// was removed; removing twice is harmless.
    pub fn off_event(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock().expect("listener registry poisoned");
        let mut removed = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Roles currently allowed to deliver inbound events.
    #[must_use]
    pub fn allowed_roles(&self) -> Vec<Role> {
        self.inner
            .allowed_roles
            .read()
            .expect("allowed roles poisoned")
            .clone()
    }

    /// Replace the allowed role set at runtime.
    pub fn set_allowed_roles(&self, roles: Vec<Role>) {
        *self
            .inner
            .allowed_roles
            .write()
            .expect("allowed roles poisoned") = roles;
    }

    /// The most recent listener failure, if any. Cleared on read.
    #[must_use]
    pub fn last_dispatch_error(&self) -> Option<String> {
        self.inner
            .last_dispatch_error
            .lock()
            .expect("dispatch error poisoned")
            .take()
    }

    /// Stop inbound dispatch. Safe to call more than once; also runs on
    /// drop.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventScope {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_inbound_loop(
    inner: Arc<ScopeInner>,
    mut receiver: broadcast::Receiver<InboundSignal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(target: "live.events.scope", "Event scope closed, inbound loop exiting");
                break;
            }
            signal = receiver.recv() => {
                match signal {
                    Ok(signal) => process_signal(&inner, signal).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            target: "live.events.scope",
                            skipped,
                            "Inbound signal receiver lagged, events lost"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(
                            target: "live.events.scope",
                            "Signal channel closed, inbound loop exiting"
                        );
                        break;
                    }
                }
            }
        }
    }
}

async fn process_signal(inner: &Arc<ScopeInner>, signal: InboundSignal) {
    // Events are only deliverable while this client is connected.
    if !inner.runtime.is_connected() {
        metrics::record_event_dropped("disconnected");
        return;
    }

    let Some(sender) = signal.message.client_id.clone() else {
        metrics::record_event_dropped("anonymous");
        return;
    };

    // The role gate runs for every inbound signal with a sender identity,
    // whether or not anyone subscribed to the name: unauthorized traffic
    // is recorded even when nothing would have been delivered.
    let allowed = inner
        .allowed_roles
        .read()
        .expect("allowed roles poisoned")
        .clone();
    match inner.verifier.verify_roles_allowed(&sender, &allowed).await {
        Ok(true) => {}
        Ok(false) => {
            metrics::record_event_dropped("role_rejected");
            inner.telemetry.record(
                TelemetryEvent::new(
                    names::INVALID_ROLE,
                    format!(
                        "sender roles do not intersect allowed roles for \"{}\"",
                        signal.message.kind
                    ),
                )
                .with_client(sender),
            );
            return;
        }
        Err(e) => {
            metrics::record_event_dropped("role_lookup_failed");
            inner.telemetry.record(
                TelemetryEvent::new(names::ROLE_LOOKUP_ERROR, e.to_string()).with_client(sender),
            );
            return;
        }
    }

    let listeners: Vec<Listener> = {
        let registry = inner.listeners.lock().expect("listener registry poisoned");
        match registry.get(&signal.message.kind) {
            Some(entries) if !entries.is_empty() => {
                entries.iter().map(|(_, l)| Arc::clone(l)).collect()
            }
            _ => return,
        }
    };

    let mut envelope: LiveEvent = match serde_json::from_value(signal.message.content.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(
                target: "live.events.scope",
                event = %signal.message.kind,
                error = %e,
                "Malformed event envelope dropped"
            );
            metrics::record_event_dropped("malformed");
            return;
        }
    };

    // The carrier's identity always wins over whatever the payload claims.
    envelope.name = signal.message.kind.clone();
    envelope.client_id = Some(sender.clone());

    metrics::record_event_delivered();
    for listener in listeners {
        if let Err(e) = listener(&envelope, signal.local) {
            metrics::record_handler_error("listener");
            *inner
                .last_dispatch_error
                .lock()
                .expect("dispatch error poisoned") = Some(e.to_string());
            inner.telemetry.record(
                TelemetryEvent::new(names::LISTENER_ERROR, e.to_string())
                    .with_client(sender.clone()),
            );
        }
    }
}
