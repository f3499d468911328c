//! Engine error types using thiserror 2.0.
//!
//! One error enum covers configuration, role, issuance and revocation
//! failures. Nothing here is retried by the engine; the host decides.

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// A single violated connection-config constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    /// `address` is missing or empty.
    MissingAddress,
    /// `address` does not parse as an http(s) URL.
    InvalidAddress(String),
    /// Both `api_key` and `username` are set.
    ApiKeyWithUsername,
    /// `username` is set without `password`.
    UsernameWithoutPassword,
    /// `password` is set without `username`.
    PasswordWithoutUsername,
    /// Neither `api_key` nor `username` is set.
    MissingCredentials,
    /// A field has the wrong type.
    InvalidField {
        /// Field name
        field: &'static str,
        /// Expected type
        expected: &'static str,
    },
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAddress => f.write_str("address cannot be empty"),
            Self::InvalidAddress(reason) => write!(f, "address is not a valid http(s) URL: {reason}"),
            Self::ApiKeyWithUsername => f.write_str("provide either api_key or username, not both"),
            Self::UsernameWithoutPassword => f.write_str("must provide password with username"),
            Self::PasswordWithoutUsername => f.write_str("password requires username"),
            Self::MissingCredentials => f.write_str("api_key or username and password must be set"),
            Self::InvalidField { field, expected } => write!(f, "{field} must be a {expected}"),
        }
    }
}

/// Every violation found while validating one config write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigViolations(Vec<ConfigViolation>);

impl ConfigViolations {
    /// Record a violation.
    pub fn push(&mut self, violation: ConfigViolation) {
        self.0.push(violation);
    }

    /// Whether nothing was violated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a specific violation was recorded.
    #[must_use]
    pub fn contains(&self, violation: &ConfigViolation) -> bool {
        self.0.contains(violation)
    }

    /// Iterate over the recorded violations.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigViolation> {
        self.0.iter()
    }

    /// Number of recorded violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<ConfigViolation> for ConfigViolations {
    fn from(violation: ConfigViolation) -> Self {
        Self(vec![violation])
    }
}

impl fmt::Display for ConfigViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Engine errors.
#[derive(Error, Debug)]
pub enum ArtifactoryError {
    /// Connection config failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(ConfigViolations),

    /// No connection config has been written yet
    #[error("Artifactory connection has not been configured")]
    NotInitialized,

    /// Verifying a new connection config against the server failed
    #[error("Error verifying connection: {0}")]
    Connection(#[source] Box<ArtifactoryError>),

    /// Role write failed validation
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Role does not exist
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Token request carried nothing to act on
    #[error("Empty request")]
    EmptyRequest,

    /// A username had to be synthesized but the host gave no request id
    #[error("A request id is required to generate a username")]
    MissingRequestId,

    /// Artifactory answered with an unexpected status
    #[error("Artifactory response: {status}\n{body}")]
    Upstream {
        /// HTTP status returned
        status: StatusCode,
        /// Response body as returned
        body: String,
    },

    /// Artifactory response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Revoking a token failed
    #[error("Unable to revoke token for {identity}: {source}")]
    Revocation {
        /// Username or `access token`
        identity: String,
        /// Underlying failure
        #[source]
        source: Box<ArtifactoryError>,
    },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Host storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Engine settings could not be parsed
    #[error("Invalid setting: {0}")]
    Settings(String),
}

/// Result type for engine operations.
pub type ArtifactoryResult<T> = Result<T, ArtifactoryError>;

impl ArtifactoryError {
    /// Create an upstream error from a status and body.
    #[must_use]
    pub fn upstream(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Create an invalid role error.
    #[must_use]
    pub fn invalid_role(msg: impl Into<String>) -> Self {
        Self::InvalidRole(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Wrap a failure while revoking on behalf of `identity`.
    #[must_use]
    pub fn revocation(identity: impl Into<String>, source: Self) -> Self {
        Self::Revocation {
            identity: identity.into(),
            source: Box::new(source),
        }
    }

    /// Upstream HTTP status, if this error carries one.
    #[must_use]
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Connection(inner) | Self::Revocation { source: inner, .. } => {
                inner.upstream_status()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_carries_status_and_body() {
        let err = ArtifactoryError::upstream(StatusCode::FORBIDDEN, "{\"errors\":[]}");
        assert_eq!(
            err.to_string(),
            "Artifactory response: 403 Forbidden\n{\"errors\":[]}"
        );
        assert_eq!(err.upstream_status(), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_violations_display_joins_all() {
        let mut violations = ConfigViolations::default();
        violations.push(ConfigViolation::MissingAddress);
        violations.push(ConfigViolation::ApiKeyWithUsername);

        let err = ArtifactoryError::InvalidConfig(violations);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: address cannot be empty; provide either api_key or username, not both"
        );
    }

    #[test]
    fn test_revocation_keeps_source() {
        let err = ArtifactoryError::revocation(
            "vault-r-1",
            ArtifactoryError::upstream(StatusCode::BAD_REQUEST, ""),
        );
        assert!(err.to_string().starts_with("Unable to revoke token for vault-r-1"));
        assert_eq!(err.upstream_status(), Some(StatusCode::BAD_REQUEST));
        assert!(std::error::Error::source(&err).is_some());
    }
}
