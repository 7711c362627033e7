//! Observability helpers for the sync core.

pub mod metrics;
