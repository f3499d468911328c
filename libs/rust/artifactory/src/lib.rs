//! Artifactory secrets engine.
//!
//! Issues short-lived Artifactory access tokens scoped to the groups of a
//! role and revokes them when the host expires the lease.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod roles;
pub mod settings;
pub mod storage;
pub mod wire;

pub use backend::{ArtifactoryBackend, Capabilities, ENGINE_TYPE, Renewal, SECRET_TYPE};
pub use client::{RevokeOutcome, TokenClient};
pub use config::{ArtifactoryConfig, AuthMode, ConfigFields, ConfigSummary, ConnectionConfig};
pub use coordinator::{
    CredentialCoordinator, IssuedCredential, RevocationIdentity, RevocationOutcome,
};
pub use error::{ArtifactoryError, ArtifactoryResult, ConfigViolation, ConfigViolations};
pub use roles::{MAX_TTL, Role, RoleRegistry, RoleUpdate, WriteMode};
pub use settings::EngineSettings;
pub use storage::{InMemoryStorage, Storage};
pub use wire::{IssuedToken, RemoteTokenRecord, RevokeTokenRequest, TokenRequest};
