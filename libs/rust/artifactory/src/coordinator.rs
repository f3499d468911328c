//! Issuance and revocation of access tokens.
//!
//! The coordinator ties a role to the active connection: it resolves the
//! username and scope for an issuance, and finds the token to revoke.

use crate::{
    client::RevokeOutcome,
    config::ConnectionConfig,
    error::{ArtifactoryError, ArtifactoryResult},
    roles::RoleRegistry,
    wire::{RevokeTokenRequest, TokenRequest},
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Prefix of synthesized usernames.
pub const USERNAME_PREFIX: &str = "vault";

/// A freshly minted credential handed to the host.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Username the token was issued for
    pub username: String,
    /// Opaque bearer value
    pub access_token: SecretString,
    /// Lifetime granted to the token
    pub ttl: Duration,
    /// Token id, when Artifactory returned one
    pub token_id: Option<String>,
    /// Scope granted
    pub scope: String,
    /// Token type, usually `Bearer`
    pub token_type: String,
}

impl IssuedCredential {
    /// Identity that revokes exactly this token.
    #[must_use]
    pub fn revocation_identity(&self) -> RevocationIdentity {
        RevocationIdentity::AccessToken(self.access_token.clone())
    }
}

/// What the host knows about a credential it wants revoked.
#[derive(Debug, Clone)]
pub enum RevocationIdentity {
    /// The original token value; revoked directly
    AccessToken(SecretString),
    /// Only the username; the token is found by subject suffix
    Username(String),
}

impl RevocationIdentity {
    /// Name used in errors and logs; never the token value.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::AccessToken(_) => "access token",
            Self::Username(username) => username,
        }
    }
}

/// How a revocation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    /// Artifactory revoked the token
    Revoked,
    /// Artifactory reported the token as not revocable
    NotRevocable,
    /// No matching token was listed
    AlreadyRevoked,
}

impl From<RevokeOutcome> for RevocationOutcome {
    fn from(outcome: RevokeOutcome) -> Self {
        match outcome {
            RevokeOutcome::Revoked => Self::Revoked,
            RevokeOutcome::NotRevocable => Self::NotRevocable,
        }
    }
}

/// Issues and revokes tokens on behalf of roles.
#[derive(Debug, Clone)]
pub struct CredentialCoordinator {
    connection: Arc<ConnectionConfig>,
    roles: RoleRegistry,
}

impl CredentialCoordinator {
    /// Create a coordinator over a shared connection and role registry.
    #[must_use]
    pub const fn new(connection: Arc<ConnectionConfig>, roles: RoleRegistry) -> Self {
        Self { connection, roles }
    }

    /// Mint a token for `role_name`.
    ///
    /// `request_id` is the host's per-lease id, used to synthesize a distinct
    /// username when the role has none. `expiration` caps the token lifetime
    /// when the host's lease ends before the role TTL.
    ///
    /// # Errors
    ///
    /// `RoleNotFound`, `MissingRequestId`, `NotInitialized`, or any
    /// [`TokenClient::create`](crate::TokenClient::create) failure.
    #[instrument(skip(self, expiration))]
    pub async fn issue(
        &self,
        role_name: &str,
        request_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> ArtifactoryResult<IssuedCredential> {
        let role = self
            .roles
            .get(role_name)
            .await?
            .ok_or_else(|| ArtifactoryError::RoleNotFound(role_name.to_string()))?;

        let username = match role.username.clone() {
            Some(username) => username,
            None => synthesize_username(role_name, request_id)?,
        };
        let lifetime = token_lifetime(role.ttl, expiration, Utc::now());
        let request = TokenRequest::new(username.clone(), role.scope(), lifetime.as_secs());

        let token = {
            let client = self.connection.client().await?;
            client.create(Some(&request)).await?
        };

        info!(%username, token_id = ?token.token_id, ttl_secs = lifetime.as_secs(), "Issued access token");
        Ok(IssuedCredential {
            username,
            access_token: token.access_token,
            ttl: lifetime,
            token_id: token.token_id,
            scope: token.scope,
            token_type: token.token_type,
        })
    }

    /// Revoke the token identified by `identity`.
    ///
    /// By-username revocation lists tokens and revokes the first whose subject
    /// ends with `/{username}`; when none matches the token is treated as
    /// already gone.
    ///
    /// # Errors
    ///
    /// `Revocation` wrapping the underlying failure.
    #[instrument(skip(self, identity), fields(identity = identity.label()))]
    pub async fn revoke(&self, identity: &RevocationIdentity) -> ArtifactoryResult<RevocationOutcome> {
        self.revoke_inner(identity)
            .await
            .map_err(|e| ArtifactoryError::revocation(identity.label(), e))
    }

    async fn revoke_inner(&self, identity: &RevocationIdentity) -> ArtifactoryResult<RevocationOutcome> {
        let client = self.connection.client().await?;

        let request = match identity {
            RevocationIdentity::AccessToken(token) => RevokeTokenRequest::by_token(token.clone()),
            RevocationIdentity::Username(username) => {
                match client.lookup_by_subject_suffix(username).await? {
                    Some(record) => RevokeTokenRequest::by_id(record.token_id),
                    None => {
                        info!("No token listed for user, treating as already revoked");
                        return Ok(RevocationOutcome::AlreadyRevoked);
                    }
                }
            }
        };

        let outcome = client.revoke(&request).await?.into();
        debug!(?outcome, "Revocation complete");
        Ok(outcome)
    }
}

fn synthesize_username(role_name: &str, request_id: Option<&str>) -> ArtifactoryResult<String> {
    let request_id = request_id
        .filter(|id| !id.is_empty())
        .ok_or(ArtifactoryError::MissingRequestId)?;
    Ok(format!("{USERNAME_PREFIX}-{role_name}-{request_id}"))
}

/// Role TTL, capped by the host's expiration, in whole seconds and never
/// below one second.
fn token_lifetime(ttl: Duration, expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    let remaining = expiration.map(|at| (at - now).to_std().unwrap_or(Duration::ZERO));
    let lifetime = remaining.map_or(ttl, |remaining| remaining.min(ttl));
    Duration::from_secs(lifetime.as_secs().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{RoleUpdate, WriteMode};
    use crate::storage::InMemoryStorage;
    use chrono::TimeDelta;
    use secrecy::ExposeSecret;
    use serde_json::{Value, json};
    use test_utils::fixtures::{api_key_config, token_list, token_record};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOUR: Duration = Duration::from_secs(3600);

    async fn coordinator(server: &MockServer) -> CredentialCoordinator {
        let connection = Arc::new(ConnectionConfig::default());
        connection
            .configure(&api_key_config(&server.uri()), false)
            .await
            .unwrap();

        let roles = RoleRegistry::new(Arc::new(InMemoryStorage::new()), HOUR * 768);
        roles
            .put("r", RoleUpdate::default().with_groups(["readers", "ci"]).with_ttl(HOUR), WriteMode::Create)
            .await
            .unwrap();
        roles
            .put(
                "fixed",
                RoleUpdate::default().with_groups(["g"]).with_username("svc"),
                WriteMode::Create,
            )
            .await
            .unwrap();

        CredentialCoordinator::new(connection, roles)
    }

    fn token_body(token: &str) -> Value {
        json!({"access_token": token, "expires_in": 3600, "scope": "member-of-groups:readers,ci", "token_type": "Bearer"})
    }

    #[test]
    fn test_token_lifetime() {
        let now = Utc::now();
        assert_eq!(token_lifetime(HOUR, None, now), HOUR);
        assert_eq!(
            token_lifetime(HOUR, Some(now + TimeDelta::minutes(10)), now),
            Duration::from_secs(600)
        );
        assert_eq!(token_lifetime(HOUR, Some(now + TimeDelta::days(1)), now), HOUR);
        assert_eq!(
            token_lifetime(HOUR, Some(now - TimeDelta::minutes(1)), now),
            Duration::from_secs(1)
        );
        assert_eq!(token_lifetime(Duration::ZERO, None, now), Duration::from_secs(1));
        assert_eq!(
            token_lifetime(HOUR, Some(now + TimeDelta::milliseconds(90_500)), now),
            Duration::from_secs(90)
        );
        assert_eq!(token_lifetime(Duration::from_millis(2_750), None, now), Duration::from_secs(2));
    }

    #[test]
    fn test_synthesized_username() {
        assert_eq!(synthesize_username("r", Some("1")).unwrap(), "vault-r-1");
        assert!(matches!(
            synthesize_username("r", Some("")),
            Err(ArtifactoryError::MissingRequestId)
        ));
        assert!(matches!(
            synthesize_username("r", None),
            Err(ArtifactoryError::MissingRequestId)
        ));
    }

    #[tokio::test]
    async fn test_issue_synthesizes_username_and_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/security/token"))
            .and(body_string_contains("username=vault-r-req-1"))
            .and(body_string_contains("expires_in=3600"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1")))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let credential = coordinator.issue("r", Some("req-1"), None).await.unwrap();

        assert_eq!(credential.username, "vault-r-req-1");
        assert_eq!(credential.access_token.expose_secret(), "tok-1");
        assert_eq!(credential.ttl, HOUR);
        assert_eq!(credential.token_type, "Bearer");
        assert!(!format!("{credential:?}").contains("tok-1"));

        let requests = server.received_requests().await.unwrap_or_default();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        let form: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        assert!(form.contains(&("scope".to_string(), "member-of-groups:\"readers,ci\"".to_string())));
    }

    #[tokio::test]
    async fn test_issue_fixed_username_needs_no_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("username=svc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok")))
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let credential = coordinator.issue("fixed", None, None).await.unwrap();
        assert_eq!(credential.username, "svc");
    }

    #[tokio::test]
    async fn test_issue_failures_grant_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad group"))
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        assert!(matches!(
            coordinator.issue("missing", Some("1"), None).await,
            Err(ArtifactoryError::RoleNotFound(_))
        ));
        assert!(matches!(
            coordinator.issue("r", None, None).await,
            Err(ArtifactoryError::MissingRequestId)
        ));
        assert!(matches!(
            coordinator.issue("r", Some("1"), None).await,
            Err(ArtifactoryError::Upstream { .. })
        ));
    }

    #[tokio::test]
    async fn test_issued_ttl_matches_requested_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/security/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1")))
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let expiration = Utc::now() + TimeDelta::milliseconds(90_500);
        let credential = coordinator.issue("r", Some("1"), Some(expiration)).await.unwrap();

        assert_eq!(credential.ttl.subsec_nanos(), 0);
        let requests = server.received_requests().await.unwrap_or_default();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        let sent = url::form_urlencoded::parse(body.as_bytes())
            .find(|(key, _)| key == "expires_in")
            .map(|(_, value)| value.into_owned());
        assert_eq!(sent, Some(credential.ttl.as_secs().to_string()));
    }

    #[tokio::test]
    async fn test_revoke_by_username_without_record_is_already_revoked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/security/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_list(vec![
                token_record("other", "balice", 1_700_000_000),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let outcome = coordinator
            .revoke(&RevocationIdentity::Username("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, RevocationOutcome::AlreadyRevoked);
    }

    #[tokio::test]
    async fn test_revoke_by_username_uses_listed_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/security/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_list(vec![
                token_record("id-alice", "alice", 1_700_000_000),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/security/token/revoke"))
            .and(body_string_contains("token_id=id-alice"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let outcome = coordinator
            .revoke(&RevocationIdentity::Username("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, RevocationOutcome::Revoked);
    }

    #[tokio::test]
    async fn test_revoke_by_token_soft_500_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("token=unrevocable"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("token=forbidden"))
            .respond_with(ResponseTemplate::new(403).set_body_string("no"))
            .mount(&server)
            .await;

        let coordinator = coordinator(&server).await;
        let outcome = coordinator
            .revoke(&RevocationIdentity::AccessToken(SecretString::from("unrevocable".to_string())))
            .await
            .unwrap();
        assert_eq!(outcome, RevocationOutcome::NotRevocable);

        let err = coordinator
            .revoke(&RevocationIdentity::AccessToken(SecretString::from("forbidden".to_string())))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unable to revoke token for access token"));
        assert_eq!(err.upstream_status().map(|s| s.as_u16()), Some(403));
    }

    #[tokio::test]
    async fn test_revoke_unconfigured_is_revocation_error() {
        let roles = RoleRegistry::new(Arc::new(InMemoryStorage::new()), HOUR);
        let coordinator = CredentialCoordinator::new(Arc::new(ConnectionConfig::default()), roles);

        let err = coordinator
            .revoke(&RevocationIdentity::Username("bob".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArtifactoryError::Revocation { ref identity, ref source }
                if identity == "bob" && matches!(**source, ArtifactoryError::NotInitialized)
        ));
    }
}
