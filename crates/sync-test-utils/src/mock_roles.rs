//! Scripted role lookups for tests.

use async_trait::async_trait;
use common::error::{Result, SyncError};
use common::types::{ClientId, Role};
use live_sync::roles::RoleLookup;
use std::collections::HashMap;

/// Role lookup answering from a fixed map. Unknown clients resolve to no
/// roles.
#[derive(Debug, Default)]
pub struct StaticRoles {
    roles: HashMap<ClientId, Vec<Role>>,
}

impl StaticRoles {
    /// Create an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign roles to a client.
    #[must_use]
    pub fn with(mut self, client_id: &str, roles: Vec<Role>) -> Self {
        self.roles.insert(ClientId::from(client_id), roles);
        self
    }
}

#[async_trait]
impl RoleLookup for StaticRoles {
    async fn roles_for(&self, client_id: &ClientId) -> Result<Vec<Role>> {
        Ok(self.roles.get(client_id).cloned().unwrap_or_default())
    }
}

/// Role lookup that always fails, for exercising the failure path.
#[derive(Debug, Default)]
pub struct FailingRoles;

#[async_trait]
impl RoleLookup for FailingRoles {
    async fn roles_for(&self, client_id: &ClientId) -> Result<Vec<Role>> {
        Err(SyncError::RoleLookup(format!(
            "no role source available for {client_id}"
        )))
    }
}
