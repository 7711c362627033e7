//! Common error types for the live session sync core.
//!
//! Only `DuplicateRegistration` is ever returned to callers constructing
//! public API objects. Every runtime protocol failure is isolated to the
//! envelope or object id it occurred on, logged, and swallowed so that one
//! misbehaving participant or callback cannot stall a session.

use thiserror::Error;

/// Errors that can occur across the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two object synchronizers were constructed for the same object id
    /// in one container. This is a programmer error and the only error
    /// surfaced synchronously from construction.
    #[error("an object synchronizer is already registered for \"{object_id}\"")]
    DuplicateRegistration {
        /// The colliding object id.
        object_id: String,
    },

    /// The signal transport is not currently connected; the signal was
    /// dropped before submission. Retried implicitly on the next tick.
    #[error("signal transport is not connected")]
    TransportDisconnected,

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Role lookup against the host failed or timed out.
    #[error("role lookup failed: {0}")]
    RoleLookup(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using `SyncError`
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type carried by user-supplied callbacks (state getters, state
/// appliers, event listeners). An `Err` from a callback is logged and
/// isolated; it never propagates to the carrier.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
