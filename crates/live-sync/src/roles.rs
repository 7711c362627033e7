//! Role verification with TTL caching.
//!
//! Role lookups go to the host application (meeting service, token claims,
//! directory) and are comparatively slow, so results are cached with a TTL
//! on the order of seconds. Lookups in flight for the same client are
//! de-duplicated to a single underlying call; failures are cached as "no
//! roles" for a short retry window so a flapping host lookup cannot be
//! hammered once per inbound event.

use crate::observability::metrics;
use async_trait::async_trait;
use common::config::RoleCacheConfig;
use common::error::Result;
use common::types::{ClientId, Role};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Host-supplied role lookup.
#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// Resolve the set of meeting roles held by the given client.
    ///
    /// # Errors
    ///
    /// Returns [`common::error::SyncError::RoleLookup`] when the host
    /// cannot resolve roles for the client.
    async fn roles_for(&self, client_id: &ClientId) -> Result<Vec<Role>>;
}

/// Cached role set with expiry time.
#[derive(Debug, Clone)]
struct CachedRoles {
    roles: Vec<Role>,
    expires_at: Instant,
}

/// TTL-cached, de-duplicated role verifier.
pub struct RoleVerifier {
    lookup: Arc<dyn RoleLookup>,
    cache: RwLock<HashMap<ClientId, CachedRoles>>,
    /// Per-client single-flight gates. A second caller for the same client
    /// waits on the gate and then reads the freshly filled cache entry.
    inflight: Mutex<HashMap<ClientId, Arc<Mutex<()>>>>,
    config: RoleCacheConfig,
}

impl RoleVerifier {
    /// Create a verifier with the default cache configuration.
    #[must_use]
    pub fn new(lookup: Arc<dyn RoleLookup>) -> Self {
        Self::with_config(lookup, RoleCacheConfig::default())
    }

    /// Create a verifier with a custom cache configuration.
    #[must_use]
    pub fn with_config(lookup: Arc<dyn RoleLookup>, config: RoleCacheConfig) -> Self {
        Self {
            lookup,
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Get the roles held by a client, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Propagates the underlying lookup failure. The failure is also
    /// cached as an empty role set until the failure TTL expires, so
    /// concurrent and closely following calls resolve to "no roles"
    /// instead of re-invoking the host.
    pub async fn roles_for(&self, client_id: &ClientId) -> Result<Vec<Role>> {
        if let Some(roles) = self.cached(client_id).await {
            metrics::record_role_lookup("hit");
            return Ok(roles);
        }

        // Single-flight: only one task per client performs the lookup.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(client_id.clone()).or_default())
        };
        let _guard = gate.lock().await;

        // A concurrent caller may have filled the cache while we waited.
        if let Some(roles) = self.cached(client_id).await {
            metrics::record_role_lookup("hit");
            return Ok(roles);
        }

        let outcome = self.lookup.roles_for(client_id).await;
        let (roles, ttl) = match &outcome {
            Ok(roles) => {
                metrics::record_role_lookup("miss");
                debug!(
                    target: "live.roles.verifier",
                    client_id = %client_id,
                    role_count = roles.len(),
                    "Role cache refreshed"
                );
                (roles.clone(), self.config.ttl)
            }
            Err(e) => {
                metrics::record_role_lookup("error");
                warn!(
                    target: "live.roles.verifier",
                    client_id = %client_id,
                    error = %e,
                    "Role lookup failed, caching empty role set"
                );
                (Vec::new(), self.config.failure_ttl)
            }
        };

        {
            let mut cache = self.cache.write().await;
            cache.insert(
                client_id.clone(),
                CachedRoles {
                    roles,
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        // The gate served its purpose; later callers hit the cache.
        self.inflight.lock().await.remove(client_id);

        outcome
    }

    /// Whether the client's roles intersect the allowed set.
    ///
    /// An empty `allowed` set means every sender is allowed; no lookup is
    /// performed in that case.
    ///
    /// # Errors
    ///
    /// Propagates role lookup failures; callers treat a failure as "not
    /// allowed" for the specific event.
    pub async fn verify_roles_allowed(
        &self,
        client_id: &ClientId,
        allowed: &[Role],
    ) -> Result<bool> {
        if allowed.is_empty() {
            return Ok(true);
        }
        let roles = self.roles_for(client_id).await?;
        Ok(roles.iter().any(|role| allowed.contains(role)))
    }

    async fn cached(&self, client_id: &ClientId) -> Option<Vec<Role>> {
        let cache = self.cache.read().await;
        cache.get(client_id).and_then(|entry| {
            (entry.expires_at > Instant::now()).then(|| entry.roles.clone())
        })
    }
}
