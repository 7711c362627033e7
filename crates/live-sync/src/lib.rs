//! Live collaboration synchronization core.
//!
//! Lets multiple clients connected to the same logical session exchange
//! low-latency ephemeral signals, agree on shared transient state, and
//! suppress unauthorized participants. Two subsystems make up the core:
//!
//! - **Event scopes** ([`events::EventScope`]) - named, role-filtered
//!   broadcast channels on top of the raw signaler.
//! - **Object synchronizers** ([`sync::LiveObjectSynchronizer`]) - a
//!   periodic, coalesced connect/update protocol that reconciles per-object
//!   state across all peers in a container, multiplexed over one signal
//!   stream per container.
//!
//! The carrier runtime stays behind the [`signaler`] traits; this crate
//! contains no transport code.

#![warn(clippy::pedantic)]

pub mod events;
pub mod observability;
pub mod roles;
pub mod signaler;
pub mod sync;
pub mod telemetry;

pub use common::config::{set_update_interval, update_interval};
pub use common::error::{HandlerError, SyncError};
pub use common::time::{SystemTimestampSource, TimestampSource};
pub use common::types::{ClientId, ContainerId, Role};
pub use events::{EventScope, SubscriptionId};
pub use roles::{RoleLookup, RoleVerifier};
pub use signaler::{ContainerSignaler, InboundSignal, RuntimeSignaler};
pub use sync::{ApplyState, GetState, LiveObjectSynchronizer, SynchronizerRegistry};
pub use telemetry::{LogTelemetry, TelemetryEvent, TelemetrySink};
