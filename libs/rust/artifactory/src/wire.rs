//! Request and response shapes for the Artifactory token API.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Path of the token endpoint, relative to the normalised base address.
pub const TOKEN_API_PATH: &str = "api/security/token";

/// Path of the revoke endpoint, relative to the normalised base address.
pub const TOKEN_REVOKE_API_PATH: &str = "api/security/token/revoke";

/// A request to mint one access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Username the token is issued for; omitted from the form when unset
    pub username: Option<String>,
    /// Scope string, e.g. `member-of-groups:"readers"`
    pub scope: Option<String>,
    /// Lifetime in seconds
    pub expires_in: u64,
    /// Whether Artifactory should hand out a refresh token
    pub refreshable: bool,
}

impl TokenRequest {
    /// Build a non-refreshable request for `username` with `scope`.
    #[must_use]
    pub fn new(username: impl Into<String>, scope: impl Into<String>, expires_in: u64) -> Self {
        Self {
            username: Some(username.into()),
            scope: Some(scope.into()),
            expires_in,
            refreshable: false,
        }
    }

    /// Form fields in wire order; empty optional fields are left out.
    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::with_capacity(4);
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            form.push(("username", username.to_string()));
        }
        if let Some(scope) = self.scope.as_deref().filter(|s| !s.is_empty()) {
            form.push(("scope", scope.to_string()));
        }
        form.push(("expires_in", self.expires_in.to_string()));
        form.push(("refreshable", self.refreshable.to_string()));
        form
    }
}

/// A request to revoke a token, by value or by id.
#[derive(Debug, Clone, Default)]
pub struct RevokeTokenRequest {
    /// The access token itself
    pub token: Option<SecretString>,
    /// The token id as listed by Artifactory
    pub token_id: Option<String>,
}

impl RevokeTokenRequest {
    /// Revoke by access token value.
    #[must_use]
    pub fn by_token(token: SecretString) -> Self {
        Self {
            token: Some(token),
            token_id: None,
        }
    }

    /// Revoke by token id.
    #[must_use]
    pub fn by_id(token_id: impl Into<String>) -> Self {
        Self {
            token: None,
            token_id: Some(token_id.into()),
        }
    }
}

/// Body of a successful create call.
///
/// Holds the raw token string, so it is kept crate-private and never logged.
#[derive(Deserialize)]
pub(crate) struct CreateTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
}

/// A token minted by Artifactory.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Opaque bearer value
    pub access_token: SecretString,
    /// Token id, when Artifactory includes it in the create response
    pub token_id: Option<String>,
    /// Scope granted
    pub scope: String,
    /// Token type, usually `Bearer`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
    /// Refresh token, only for refreshable requests
    pub refresh_token: Option<SecretString>,
}

impl From<CreateTokenResponse> for IssuedToken {
    fn from(response: CreateTokenResponse) -> Self {
        Self {
            access_token: SecretString::from(response.access_token),
            token_id: response.token_id.filter(|id| !id.is_empty()),
            scope: response.scope,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
        }
    }
}

/// Body of a successful list call.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenListResponse {
    #[serde(default)]
    pub tokens: Vec<RemoteTokenRecord>,
}

/// One token as listed by Artifactory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTokenRecord {
    /// Token id
    pub token_id: String,
    /// Issuing service id
    #[serde(default)]
    pub issuer: String,
    /// Subject, e.g. `jfrt@01c.../users/alice`
    #[serde(default)]
    pub subject: String,
    /// Expiry as unix seconds; zero for non-expiring tokens
    #[serde(default)]
    pub expiry: i64,
    /// Whether the token can be refreshed
    #[serde(default)]
    pub refreshable: bool,
    /// Issue time as unix seconds
    #[serde(default)]
    pub issued_at: i64,
}

impl RemoteTokenRecord {
    /// Whether the subject ends with `/` followed by exactly `username`.
    #[must_use]
    pub fn belongs_to(&self, username: &str) -> bool {
        self.subject
            .strip_suffix(username)
            .is_some_and(|rest| rest.ends_with('/'))
    }

    /// Username embedded in the subject, after the last `/`.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.subject
            .rsplit_once('/')
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty())
    }

    /// Expiry instant, or `None` for non-expiring tokens.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (self.expiry > 0)
            .then(|| DateTime::from_timestamp(self.expiry, 0))
            .flatten()
    }
}

/// First record owned by `username`; records are scanned in list order.
#[must_use]
pub fn find_by_subject_suffix<'a>(
    records: &'a [RemoteTokenRecord],
    username: &str,
) -> Option<&'a RemoteTokenRecord> {
    if username.is_empty() {
        return None;
    }
    records.iter().find(|record| record.belongs_to(username))
}
