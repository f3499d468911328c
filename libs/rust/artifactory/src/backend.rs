//! Host-facing engine facade.
//!
//! One [`ArtifactoryBackend`] per mounted engine. It owns the connection,
//! the role registry and the coordinator, and exposes the lifecycle hooks a
//! secrets-management host calls.

use crate::{
    config::{ConfigSummary, ConnectionConfig},
    coordinator::{CredentialCoordinator, IssuedCredential, RevocationIdentity, RevocationOutcome},
    error::ArtifactoryResult,
    roles::{Role, RoleRegistry, RoleUpdate, WriteMode},
    settings::EngineSettings,
    storage::Storage,
};
use chrono::{DateTime, Utc};
use rust_common::Redactor;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Engine type reported to the host.
pub const ENGINE_TYPE: &str = "artifactory";

/// Secret type of issued credentials.
pub const SECRET_TYPE: &str = "artifactory_access_token";

/// Answer to a renewal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Artifactory cannot extend an access token; the lease runs its TTL
    NotRenewable,
}

/// What the engine's credentials support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Whether leases can be renewed
    pub renewable: bool,
    /// Secret type of issued credentials
    pub secret_type: &'static str,
}

/// The Artifactory secrets engine.
#[derive(Debug, Clone)]
pub struct ArtifactoryBackend {
    connection: Arc<ConnectionConfig>,
    roles: RoleRegistry,
    coordinator: CredentialCoordinator,
}

impl ArtifactoryBackend {
    /// Create an engine persisting roles in `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, settings: EngineSettings) -> Self {
        let connection = Arc::new(ConnectionConfig::new(settings.http));
        let roles = RoleRegistry::new(storage, settings.default_ttl);
        let coordinator = CredentialCoordinator::new(Arc::clone(&connection), roles.clone());
        Self {
            connection,
            roles,
            coordinator,
        }
    }

    /// Engine type identifier.
    #[must_use]
    pub const fn engine_type(&self) -> &'static str {
        ENGINE_TYPE
    }

    /// Capabilities of issued credentials.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            renewable: false,
            secret_type: SECRET_TYPE,
        }
    }

    /// Accept a new connection config; see [`ConnectionConfig::configure`].
    ///
    /// # Errors
    ///
    /// `InvalidConfig`, `Connection` or `Http`.
    pub async fn configure(
        &self,
        fields: &Map<String, Value>,
        verify: bool,
    ) -> ArtifactoryResult<ConfigSummary> {
        self.connection.configure(fields, verify).await
    }

    /// Reload a persisted connection config after a host restart.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the persisted fields no longer validate.
    pub async fn restore(&self, fields: &Map<String, Value>) -> ArtifactoryResult<ConfigSummary> {
        self.connection.restore(fields).await
    }

    /// Non-secret view of the active connection config.
    ///
    /// # Errors
    ///
    /// `NotInitialized` when unconfigured.
    pub async fn read_config(&self) -> ArtifactoryResult<ConfigSummary> {
        self.connection.summary().await
    }

    /// Create or update a role.
    ///
    /// # Errors
    ///
    /// See [`RoleRegistry::put`].
    pub async fn write_role(
        &self,
        name: &str,
        update: RoleUpdate,
        mode: WriteMode,
    ) -> ArtifactoryResult<Role> {
        self.roles.put(name, update, mode).await
    }

    /// The named role, if it exists.
    ///
    /// # Errors
    ///
    /// `Storage` or `Decode` on a storage failure.
    pub async fn read_role(&self, name: &str) -> ArtifactoryResult<Option<Role>> {
        self.roles.get(name).await
    }

    /// Remove a role.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    pub async fn delete_role(&self, name: &str) -> ArtifactoryResult<()> {
        self.roles.delete(name).await
    }

    /// All role names, sorted.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    pub async fn list_roles(&self) -> ArtifactoryResult<Vec<String>> {
        self.roles.list().await
    }

    /// Issue a credential for `role`; see [`CredentialCoordinator::issue`].
    ///
    /// # Errors
    ///
    /// See [`CredentialCoordinator::issue`].
    pub async fn issue(
        &self,
        role: &str,
        request_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> ArtifactoryResult<IssuedCredential> {
        self.coordinator.issue(role, request_id, expiration).await
    }

    /// Tokens cannot be extended remotely.
    #[must_use]
    pub fn renew(&self, username: &str) -> Renewal {
        debug!(%username, "Renewal requested for non-renewable token");
        Renewal::NotRenewable
    }

    /// Revoke a credential; see [`CredentialCoordinator::revoke`].
    ///
    /// # Errors
    ///
    /// `Revocation` wrapping the underlying failure.
    pub async fn revoke(&self, identity: &RevocationIdentity) -> ArtifactoryResult<RevocationOutcome> {
        self.coordinator.revoke(identity).await
    }

    /// Secrets of the active config that must never surface.
    pub async fn redaction_set(&self) -> Redactor {
        self.connection.redactor().await
    }

    /// Render `err` with every configured secret replaced by its placeholder.
    pub async fn sanitize_error(&self, err: &impl std::error::Error) -> String {
        self.redaction_set().await.redact(&err.to_string())
    }
}
