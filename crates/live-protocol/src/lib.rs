//! Wire protocol for the live session sync core.
//!
//! This crate defines the two message surfaces that cross a container:
//! named event envelopes (stamped with sender identity and timestamp) and
//! coalesced object-state signals (`connect` / `update` mappings of
//! object id to opaque state).

#![warn(clippy::pedantic)]

pub mod envelope;
pub mod signal;

pub use envelope::{newer, LiveEvent};
pub use signal::{is_record, InboundSignalMessage, SignalKind, SyncPayload};
