//! # Sync Test Utilities
//!
//! Shared test utilities for the live session sync core.
//!
//! Provides in-memory mock signalers, scripted role lookups, and a
//! capturing telemetry sink for isolated testing without a real
//! collaboration runtime.
//!
//! ## Modules
//!
//! - `mock_runtime` - In-memory runtime/container signaler with captured
//!   submissions and injectable inbound signals
//! - `mock_roles` - Scripted and failing role lookups
//! - `telemetry` - Capturing telemetry sink

#![warn(clippy::pedantic)]

pub mod mock_roles;
pub mod mock_runtime;
pub mod telemetry;

// Re-export commonly used items
pub use mock_roles::{FailingRoles, StaticRoles};
pub use mock_runtime::{MockRuntime, SentSignal};
pub use telemetry::CapturingTelemetry;
