//! In-memory mock of the carrier runtime.
//!
//! A [`MockRuntime`] implements both signaler traits over tokio broadcast
//! channels. Submitted signals are captured for assertions, echoed back to
//! the submitting runtime with `local = true`, and delivered to linked
//! peers with `local = false`, mirroring how a real carrier loops
//! outbound signals back to their sender.

use async_trait::async_trait;
use common::error::{Result, SyncError};
use common::types::{ClientId, ContainerId};
use live_protocol::InboundSignalMessage;
use live_sync::signaler::{ContainerSignaler, InboundSignal, RuntimeSignaler};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;

/// A signal captured on submission.
#[derive(Debug, Clone)]
pub struct SentSignal {
    /// Signal type handed to the carrier.
    pub kind: String,
    /// Raw content.
    pub content: Value,
}

/// In-memory runtime + container signaler for tests.
pub struct MockRuntime {
    client_id: RwLock<Option<ClientId>>,
    connected: AtomicBool,
    container_id: ContainerId,
    signal_tx: broadcast::Sender<InboundSignal>,
    connected_tx: broadcast::Sender<()>,
    sent: Mutex<Vec<SentSignal>>,
    peers: Mutex<Vec<Weak<MockRuntime>>>,
}

impl MockRuntime {
    /// Create a connected runtime with the given client identifier and a
    /// fresh container identity.
    #[must_use]
    pub fn connected(client_id: &str) -> Arc<Self> {
        Self::with_container(client_id, ContainerId::new(), true)
    }

    /// Create a disconnected runtime (no client identifier yet).
    #[must_use]
    pub fn disconnected() -> Arc<Self> {
        let runtime = Self::with_container("", ContainerId::new(), false);
        *runtime.client_id.write().expect("client id poisoned") = None;
        runtime
    }

    /// Create a runtime attached to an explicit container identity.
    #[must_use]
    pub fn with_container(client_id: &str, container_id: ContainerId, connected: bool) -> Arc<Self> {
        let (signal_tx, _) = broadcast::channel(64);
        let (connected_tx, _) = broadcast::channel(8);
        Arc::new(Self {
            client_id: RwLock::new(Some(ClientId::from(client_id))),
            connected: AtomicBool::new(connected),
            container_id,
            signal_tx,
            connected_tx,
            sent: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        })
    }

    /// Wire two runtimes into the same session: signals submitted by one
    /// are delivered to the other with `local = false`.
    pub fn link(a: &Arc<Self>, b: &Arc<Self>) {
        a.peers.lock().expect("peers poisoned").push(Arc::downgrade(b));
        b.peers.lock().expect("peers poisoned").push(Arc::downgrade(a));
    }

    /// Flip the connected flag and, when connecting, emit the
    /// `connected` notification.
    pub fn set_connected(&self, connected: bool, client_id: Option<&str>) {
        self.connected.store(connected, Ordering::SeqCst);
        *self.client_id.write().expect("client id poisoned") =
            client_id.map(ClientId::from);
        if connected {
            let _ = self.connected_tx.send(());
        }
    }

    /// Deliver an inbound signal to this runtime's subscribers as if a
    /// peer had sent it.
    pub fn deliver_signal(
        &self,
        kind: &str,
        client_id: Option<&str>,
        content: Value,
        local: bool,
    ) {
        let message = InboundSignalMessage::new(kind, client_id.map(ClientId::from), content);
        let _ = self.signal_tx.send(InboundSignal { message, local });
    }

    /// Signals submitted through this runtime, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentSignal> {
        self.sent.lock().expect("sent signals poisoned").clone()
    }

    /// Signals of one kind submitted through this runtime.
    #[must_use]
    pub fn sent_of_kind(&self, kind: &str) -> Vec<SentSignal> {
        self.sent()
            .into_iter()
            .filter(|signal| signal.kind == kind)
            .collect()
    }

    /// Forget previously captured submissions.
    pub fn clear_sent(&self) {
        self.sent.lock().expect("sent signals poisoned").clear();
    }

    fn fan_out(&self, kind: &str, content: &Value) {
        let sender = self.client_id.read().expect("client id poisoned").clone();

        // Local echo back to our own subscribers.
        let message =
            InboundSignalMessage::new(kind, sender.clone(), content.clone());
        let _ = self.signal_tx.send(InboundSignal {
            message,
            local: true,
        });

        // Remote delivery to every linked peer still alive.
        let peers = self.peers.lock().expect("peers poisoned").clone();
        for peer in peers.iter().filter_map(Weak::upgrade) {
            let message = InboundSignalMessage::new(kind, sender.clone(), content.clone());
            let _ = peer.signal_tx.send(InboundSignal {
                message,
                local: false,
            });
        }
    }

    fn submit(&self, kind: &str, content: Value) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::TransportDisconnected);
        }
        self.sent.lock().expect("sent signals poisoned").push(SentSignal {
            kind: kind.to_string(),
            content: content.clone(),
        });
        self.fan_out(kind, &content);
        Ok(())
    }
}

#[async_trait]
impl RuntimeSignaler for MockRuntime {
    fn client_id(&self) -> Option<ClientId> {
        self.client_id.read().expect("client id poisoned").clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn submit_signal(&self, kind: &str, content: Value) -> Result<()> {
        self.submit(kind, content)
    }

    fn signals(&self) -> broadcast::Receiver<InboundSignal> {
        self.signal_tx.subscribe()
    }

    fn connections(&self) -> broadcast::Receiver<()> {
        self.connected_tx.subscribe()
    }
}

#[async_trait]
impl ContainerSignaler for MockRuntime {
    fn container_id(&self) -> ContainerId {
        self.container_id
    }

    async fn submit_signal(&self, kind: &str, content: Value) -> Result<()> {
        self.submit(kind, content)
    }

    fn signals(&self) -> broadcast::Receiver<InboundSignal> {
        self.signal_tx.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_submission_is_captured_and_echoed() {
        let runtime = MockRuntime::connected("c1");
        let mut signals = RuntimeSignaler::signals(runtime.as_ref());

        RuntimeSignaler::submit_signal(runtime.as_ref(), "update", json!({"o1": {"v": 1}}))
            .await
            .unwrap();

        let sent = runtime.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "update");

        let echoed = signals.recv().await.unwrap();
        assert!(echoed.local);
        assert_eq!(echoed.message.client_id, Some(ClientId::from("c1")));
    }

    #[tokio::test]
    async fn test_linked_peers_receive_remote_signals() {
        let container = ContainerId::new();
        let a = MockRuntime::with_container("a", container, true);
        let b = MockRuntime::with_container("b", container, true);
        MockRuntime::link(&a, &b);

        let mut b_signals = RuntimeSignaler::signals(b.as_ref());
        RuntimeSignaler::submit_signal(a.as_ref(), "connect", json!({"o1": {}}))
            .await
            .unwrap();

        let received = b_signals.recv().await.unwrap();
        assert!(!received.local);
        assert_eq!(received.message.kind, "connect");
        assert_eq!(received.message.client_id, Some(ClientId::from("a")));
    }

    #[tokio::test]
    async fn test_disconnected_submission_fails() {
        let runtime = MockRuntime::disconnected();
        let result =
            RuntimeSignaler::submit_signal(runtime.as_ref(), "update", json!({})).await;
        assert!(matches!(result, Err(SyncError::TransportDisconnected)));
        assert!(runtime.sent().is_empty());
    }

    #[tokio::test]
    async fn test_set_connected_emits_notification() {
        let runtime = MockRuntime::disconnected();
        let mut connections = runtime.connections();

        runtime.set_connected(true, Some("c9"));

        connections.recv().await.unwrap();
        assert!(runtime.is_connected());
        assert_eq!(
            RuntimeSignaler::client_id(runtime.as_ref()),
            Some(ClientId::from("c9"))
        );
    }
}
