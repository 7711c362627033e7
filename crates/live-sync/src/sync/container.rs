//! Per-container synchronizer.
//!
//! The central protocol component: one instance per container-runtime
//! identity, kept in the process-wide registry. A single background task
//! serializes everything that can touch the object table concurrently
//! (the periodic update tick, inbound signal handling, connect flushing,
//! and connection-established events), so registration from user callbacks
//! can never corrupt an iteration in progress.
//!
//! # Outbound
//!
//! - Registration queues the object for a coalesced `connect`; the flush
//!   runs on the next scheduler turn, so several same-turn registrations
//!   produce one signal. Registration while disconnected defers the object
//!   until the runtime reports `connected`.
//! - Every update interval, one `update` signal carries the state of every
//!   connected object whose getter returned a value. An empty mapping
//!   emits nothing.
//!
//! # Inbound
//!
//! - Local signals and non-object payloads are ignored.
//! - `connect`/`update` payloads are demultiplexed by object id; each
//!   recognized id's apply callback runs with failures isolated per id.
//! - A remote `connect` is answered immediately with an `update` carrying
//!   fresh state for exactly the recognized ids: the pong that bootstraps
//!   the joiner, never throttled by the periodic timer.

use crate::observability::metrics;
use crate::signaler::{ContainerSignaler, InboundSignal, RuntimeSignaler};
use crate::telemetry::{names, SharedTelemetry, TelemetryEvent};
use common::error::{HandlerError, Result, SyncError};
use common::types::{ClientId, ContainerId};
use live_protocol::{is_record, SignalKind, SyncPayload};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State getter registered by a live object.
///
/// Called with `connecting = true` while assembling a `connect` payload and
/// `false` for periodic updates and pongs. Returning `Ok(None)` omits the
/// object from the outgoing signal; an `Err` is logged and isolated.
pub type GetState =
    Arc<dyn Fn(bool) -> std::result::Result<Option<Value>, HandlerError> + Send + Sync>;

/// Remote-state applier registered by a live object.
///
/// Receives the `connecting` flag of the carrying signal, the opaque state
/// record, and the sender's carrier identifier.
pub type ApplyState =
    Arc<dyn Fn(bool, &Value, &ClientId) -> std::result::Result<(), HandlerError> + Send + Sync>;

struct RegisteredObject {
    get_state: GetState,
    apply_state: ApplyState,
}

/// Registered objects plus the connected/deferred partition of their ids.
#[derive(Default)]
struct ObjectTable {
    objects: HashMap<String, RegisteredObject>,
    /// Ids announced to peers (or queued for the next connect flush).
    connected_keys: Vec<String>,
    /// Ids registered while disconnected, deferred until `connected`.
    unconnected_keys: Vec<String>,
    /// Ids awaiting inclusion in the next coalesced `connect`.
    pending_connects: Vec<String>,
}

impl ObjectTable {
    fn remove(&mut self, object_id: &str) {
        self.objects.remove(object_id);
        self.connected_keys.retain(|id| id != object_id);
        self.unconnected_keys.retain(|id| id != object_id);
        self.pending_connects.retain(|id| id != object_id);
    }

    /// Snapshot `(id, getter)` pairs for the given ids. Ids disposed since
    /// they were captured are silently skipped.
    fn getters(&self, ids: &[String]) -> Vec<(String, GetState)> {
        ids.iter()
            .filter_map(|id| {
                self.objects
                    .get(id)
                    .map(|object| (id.clone(), Arc::clone(&object.get_state)))
            })
            .collect()
    }
}

/// Multiplexes all live objects of one container over its signal stream.
pub struct ContainerSynchronizer {
    container_id: ContainerId,
    runtime: Arc<dyn RuntimeSignaler>,
    container: Arc<dyn ContainerSignaler>,
    table: Mutex<ObjectTable>,
    telemetry: SharedTelemetry,
    update_interval: Duration,
    ref_count: AtomicUsize,
    cancel: CancellationToken,
    connect_pending: Notify,
}

impl ContainerSynchronizer {
    /// Create a synchronizer and start its background task.
    #[must_use]
    pub(crate) fn spawn(
        runtime: Arc<dyn RuntimeSignaler>,
        container: Arc<dyn ContainerSignaler>,
        telemetry: SharedTelemetry,
        update_interval: Duration,
    ) -> Arc<Self> {
        let synchronizer = Arc::new(Self {
            container_id: container.container_id(),
            runtime,
            container,
            table: Mutex::new(ObjectTable::default()),
            telemetry,
            update_interval,
            ref_count: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            connect_pending: Notify::new(),
        });

        // Subscribe before returning so signals arriving between
        // construction and the first poll of the task are not lost.
        let signals = synchronizer.container.signals();
        let connections = synchronizer.runtime.connections();
        tokio::spawn(Arc::clone(&synchronizer).run(signals, connections));
        synchronizer
    }

    /// Identity of the container this synchronizer serves.
    #[must_use]
    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Number of currently registered objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.table.lock().expect("object table poisoned").objects.len()
    }

    /// Ids announced to peers.
    #[must_use]
    pub fn connected_object_ids(&self) -> Vec<String> {
        self.table
            .lock()
            .expect("object table poisoned")
            .connected_keys
            .clone()
    }

    /// Ids deferred until the runtime connects.
    #[must_use]
    pub fn pending_object_ids(&self) -> Vec<String> {
        self.table
            .lock()
            .expect("object table poisoned")
            .unconnected_keys
            .clone()
    }

    /// Register a live object's callbacks under a unique id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateRegistration`] when the id is already
    /// registered in this container.
    pub(crate) fn register(
        &self,
        object_id: &str,
        get_state: GetState,
        apply_state: ApplyState,
    ) -> Result<()> {
        let connected = self.runtime.is_connected();
        {
            let mut table = self.table.lock().expect("object table poisoned");
            if table.objects.contains_key(object_id) {
                return Err(SyncError::DuplicateRegistration {
                    object_id: object_id.to_string(),
                });
            }
            table.objects.insert(
                object_id.to_string(),
                RegisteredObject {
                    get_state,
                    apply_state,
                },
            );
            if connected {
                table.connected_keys.push(object_id.to_string());
                table.pending_connects.push(object_id.to_string());
            } else {
                table.unconnected_keys.push(object_id.to_string());
            }
        }

        if connected {
            // Wake the flush arm; registrations landing before it runs
            // coalesce into a single connect signal.
            self.connect_pending.notify_one();
        } else {
            debug!(
                target: "live.sync.container",
                container_id = %self.container_id,
                object_id,
                "Runtime disconnected, connect deferred"
            );
        }
        Ok(())
    }

    /// Remove an object. The next tick no longer includes it; a tick
    /// already in flight may still carry state captured before removal.
    pub(crate) fn unregister(&self, object_id: &str) {
        let mut table = self.table.lock().expect("object table poisoned");
        table.remove(object_id);
    }

    pub(crate) fn retain(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn release_ref(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Stop the background task.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Background task: serializes ticks, flushes, inbound signals, and
    /// connection events.
    async fn run(
        self: Arc<Self>,
        mut signals: broadcast::Receiver<InboundSignal>,
        mut connections: broadcast::Receiver<()>,
    ) {
        info!(
            target: "live.sync.container",
            container_id = %self.container_id,
            update_interval_ms = u64::try_from(self.update_interval.as_millis()).unwrap_or(u64::MAX),
            "Container synchronizer started"
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.update_interval,
            self.update_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!(
                        target: "live.sync.container",
                        container_id = %self.container_id,
                        "Container synchronizer received shutdown signal, exiting"
                    );
                    break;
                }

                () = self.connect_pending.notified() => {
                    self.flush_connects().await;
                }

                _ = ticker.tick() => {
                    self.send_periodic_update().await;
                }

                signal = signals.recv() => {
                    match signal {
                        Ok(signal) => self.handle_signal(signal).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "live.sync.container",
                                container_id = %self.container_id,
                                skipped,
                                "Signal receiver lagged, relying on periodic updates to reconverge"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!(
                                target: "live.sync.container",
                                container_id = %self.container_id,
                                "Signal channel closed, synchronizer exiting"
                            );
                            break;
                        }
                    }
                }

                connected = connections.recv() => {
                    match connected {
                        Ok(()) => self.handle_connected().await,
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            // Coalesce missed notifications into one flush.
                            self.handle_connected().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!(
                                target: "live.sync.container",
                                container_id = %self.container_id,
                                "Connection channel closed, synchronizer exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Send one coalesced `connect` for every id queued since the last
    /// flush.
    async fn flush_connects(&self) {
        let entries = {
            let mut table = self.table.lock().expect("object table poisoned");
            let pending = std::mem::take(&mut table.pending_connects);
            table.getters(&pending)
        };
        if entries.is_empty() {
            return;
        }

        let payload = self.collect_states(entries, true);
        if payload.is_empty() {
            return;
        }
        self.submit(SignalKind::Connect, payload).await;
    }

    /// Move deferred objects into the connected set and announce them.
    async fn handle_connected(&self) {
        let had_deferred = {
            let mut table = self.table.lock().expect("object table poisoned");
            let deferred = std::mem::take(&mut table.unconnected_keys);
            let had = !deferred.is_empty();
            for id in deferred {
                table.connected_keys.push(id.clone());
                table.pending_connects.push(id);
            }
            had
        };
        if had_deferred {
            self.flush_connects().await;
        }
    }

    /// Periodic tick: one coalesced `update`, or nothing when no object
    /// produced state.
    async fn send_periodic_update(&self) {
        let entries = {
            let table = self.table.lock().expect("object table poisoned");
            let connected = table.connected_keys.clone();
            table.getters(&connected)
        };
        if entries.is_empty() {
            return;
        }

        let payload = self.collect_states(entries, false);
        if payload.is_empty() {
            return;
        }
        self.submit(SignalKind::Update, payload).await;
    }

    /// Demultiplex one inbound signal to the registered objects.
    async fn handle_signal(&self, signal: InboundSignal) {
        if signal.local {
            return;
        }
        let Some(kind) = SignalKind::parse(&signal.message.kind) else {
            return;
        };
        let Some(sender) = signal.message.client_id.clone() else {
            return;
        };
        let Some(payload) = signal.message.sync_payload() else {
            return;
        };

        // Snapshot appliers under the lock, invoke outside it: an applier
        // may register or dispose objects.
        let mut appliers: Vec<(String, ApplyState, Value)> = Vec::new();
        let mut recognized: Vec<(String, GetState)> = Vec::new();
        {
            let table = self.table.lock().expect("object table poisoned");
            for (object_id, state) in payload {
                if !is_record(&state) {
                    continue;
                }
                if let Some(object) = table.objects.get(&object_id) {
                    appliers.push((
                        object_id.clone(),
                        Arc::clone(&object.apply_state),
                        state,
                    ));
                    recognized.push((object_id, Arc::clone(&object.get_state)));
                }
            }
        }

        let connecting = kind.is_connect();
        for (object_id, apply_state, state) in appliers {
            if let Err(e) = apply_state(connecting, &state, &sender) {
                metrics::record_handler_error("apply_state");
                self.telemetry.record(
                    TelemetryEvent::new(names::APPLY_STATE_ERROR, e.to_string())
                        .with_client(sender.clone())
                        .with_object(object_id),
                );
            }
        }

        // Pong: answer a connect immediately with fresh state for exactly
        // the recognized ids, so the joiner does not wait a full interval.
        if connecting && !recognized.is_empty() {
            let payload = self.collect_states(recognized, false);
            if !payload.is_empty() {
                self.submit(SignalKind::Update, payload).await;
            }
        }
    }

    /// Run the getters and coalesce their states. Failing getters are
    /// logged and omitted; the rest proceed.
    fn collect_states(&self, entries: Vec<(String, GetState)>, connecting: bool) -> SyncPayload {
        let mut payload = SyncPayload::new();
        for (object_id, get_state) in entries {
            match get_state(connecting) {
                Ok(Some(state)) => {
                    payload.insert(object_id, state);
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_handler_error("get_state");
                    self.telemetry.record(
                        TelemetryEvent::new(names::GET_STATE_ERROR, e.to_string())
                            .with_object(object_id),
                    );
                }
            }
        }
        payload
    }

    async fn submit(&self, kind: SignalKind, payload: SyncPayload) {
        let content = match serde_json::to_value(&payload) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    target: "live.sync.container",
                    container_id = %self.container_id,
                    kind = kind.as_str(),
                    error = %e,
                    "Failed to serialize sync payload"
                );
                return;
            }
        };

        match self.container.submit_signal(kind.as_str(), content).await {
            Ok(()) => metrics::record_signal_submitted(kind.as_str()),
            Err(SyncError::TransportDisconnected) => {
                debug!(
                    target: "live.sync.container",
                    container_id = %self.container_id,
                    kind = kind.as_str(),
                    "Transport disconnected, signal dropped until next tick"
                );
            }
            Err(e) => {
                warn!(
                    target: "live.sync.container",
                    container_id = %self.container_id,
                    kind = kind.as_str(),
                    error = %e,
                    "Signal submission failed"
                );
            }
        }
    }
}

impl Drop for ContainerSynchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
