//! Object-sync signal types.
//!
//! Two signal kinds cross the container for object synchronization:
//!
//! | Kind | Payload | Semantics |
//! |---|---|---|
//! | `connect` | `{id: state}` | "I just registered these ids; here is my initial state; please reply with yours." |
//! | `update` | `{id: state}` | Periodic gossip of current state, or the immediate reply to a `connect`. |
//!
//! State entries are opaque records chosen by the application; anything
//! that is not a JSON object (null, primitives, arrays) is skipped by
//! consumers rather than applied.

use common::types::ClientId;
use serde_json::Value;
use std::collections::BTreeMap;

/// The two object-sync signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Bootstrap for newly registered objects.
    Connect,
    /// Periodic or pong state gossip.
    Update,
}

impl SignalKind {
    /// Wire name of the signal kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Connect => "connect",
            SignalKind::Update => "update",
        }
    }

    /// Parse a carrier signal type. Unknown types return `None` and are
    /// ignored by the synchronizer.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "connect" => Some(SignalKind::Connect),
            "update" => Some(SignalKind::Update),
            _ => None,
        }
    }

    /// Whether this kind bootstraps a joiner (and therefore expects an
    /// immediate `update` reply).
    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, SignalKind::Connect)
    }
}

/// Coalesced wire payload: object id to opaque state.
///
/// Ordered so a payload serializes deterministically.
pub type SyncPayload = BTreeMap<String, Value>;

/// Whether a state value is a record that may be applied.
///
/// Null, primitives, and arrays are not records; they are skipped instead
/// of being handed to `apply_remote_state`. This doubles as the null
/// guard on the inbound path.
#[must_use]
pub fn is_record(state: &Value) -> bool {
    state.is_object()
}

/// A raw signal as delivered by the carrier runtime.
#[derive(Debug, Clone)]
pub struct InboundSignalMessage {
    /// Carrier signal type. For object sync this is `connect`/`update`;
    /// for event scopes it is the event name.
    pub kind: String,
    /// Carrier-assigned identifier of the sending client. `None` while
    /// the sender had no connection identity; such messages are dropped.
    pub client_id: Option<ClientId>,
    /// Raw signal content.
    pub content: Value,
}

impl InboundSignalMessage {
    /// Build an inbound message.
    #[must_use]
    pub fn new(kind: impl Into<String>, client_id: Option<ClientId>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            client_id,
            content,
        }
    }

    /// Parse the content as a coalesced `{id: state}` payload.
    ///
    /// Returns `None` when the content is not an object; such signals are
    /// ignored by the synchronizer.
    #[must_use]
    pub fn sync_payload(&self) -> Option<SyncPayload> {
        self.content.as_object().map(|map| {
            map.iter()
                .map(|(id, state)| (id.clone(), state.clone()))
                .collect()
        })
    }
}
