//! Typed, role-filtered event scopes.

mod scope;

pub use scope::{EventScope, SubscriptionId};
