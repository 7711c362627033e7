//! Event envelope and freshness ordering.
//!
//! Every named event crossing the container is wrapped in a [`LiveEvent`]
//! envelope carrying the event name, the sender's carrier-assigned client
//! identifier, and a session-consistent timestamp. The envelope's
//! `client_id` is authoritative only after the trusted inbound path has
//! rewritten it with the carrier's identifier; payload-supplied values are
//! never trusted.

use common::types::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Wire envelope for a named event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    /// Event name. Always equals the signal type it was carried under.
    pub name: String,

    /// Sender's client identifier. `None` until stamped by a connected
    /// sender; inbound envelopes with no carrier identity are dropped.
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,

    /// Session-consistent milliseconds. Not a wall clock; only comparable
    /// against timestamps from peers in the same session.
    pub timestamp: i64,

    /// Application payload fields, flattened alongside the envelope fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl LiveEvent {
    /// Build an envelope with the given stamping fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client_id: Option<ClientId>,
        timestamp: i64,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id,
            timestamp,
            data,
        }
    }

    /// Whether this envelope wins over `other` under the freshness rule.
    ///
    /// Equivalent to `newer(self, other)`.
    #[must_use]
    pub fn newer_than(&self, other: &LiveEvent) -> bool {
        newer(self, other)
    }
}

/// Freshness rule: total order over `(timestamp, client_id)`.
///
/// `a` is newer than `b` iff `a.timestamp > b.timestamp`, or the
/// timestamps are equal and `a.client_id` sorts lexicographically after
/// `b.client_id`. A missing client identifier sorts before any present
/// one, so the order stays total even for unstamped envelopes.
///
/// All consumers resolve concurrent writes with this order, which makes
/// convergence independent of message arrival order.
#[must_use]
pub fn newer(a: &LiveEvent, b: &LiveEvent) -> bool {
    match a.timestamp.cmp(&b.timestamp) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.client_id > b.client_id,
    }
}
