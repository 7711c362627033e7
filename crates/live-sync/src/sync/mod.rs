//! Object state synchronization.
//!
//! One [`ContainerSynchronizer`] per container multiplexes every live
//! object registered against that container: it batches `connect`
//! bootstraps, emits one coalesced `update` per tick, and demultiplexes
//! inbound signals to each object's apply callback. Application code uses
//! the [`LiveObjectSynchronizer`] facade, which registers a get/apply pair
//! and unregisters on dispose.

mod container;
mod object;
mod registry;

pub use container::{ApplyState, ContainerSynchronizer, GetState};
pub use object::LiveObjectSynchronizer;
pub use registry::SynchronizerRegistry;
