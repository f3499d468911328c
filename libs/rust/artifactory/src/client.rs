//! Artifactory token API client.

use crate::{
    config::{ArtifactoryConfig, AuthMode},
    error::{ArtifactoryError, ArtifactoryResult, ConfigViolation},
    wire::{
        CreateTokenResponse, IssuedToken, RemoteTokenRecord, RevokeTokenRequest, TOKEN_API_PATH,
        TOKEN_REVOKE_API_PATH, TokenListResponse, TokenRequest, find_by_subject_suffix,
    },
};
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_common::{HttpConfig, build_http_client};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Header carrying the API key in api-key auth mode.
pub const API_KEY_HEADER: &str = "X-JFrog-Art-Api";

/// Result of a revoke call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// Artifactory revoked the token
    Revoked,
    /// Artifactory answered 500, which it does for tokens it cannot revoke
    NotRevocable,
}

/// Stateless client for the create, revoke and list token calls.
///
/// Bound to one validated config snapshot; the underlying HTTP client is
/// safe to share between concurrent callers.
#[derive(Debug)]
pub struct TokenClient {
    http: Client,
    base: Url,
    auth: AuthMode,
}

impl TokenClient {
    /// Build a client for `config`, applying its TLS policy on top of `http`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ArtifactoryConfig, http: &HttpConfig) -> ArtifactoryResult<Self> {
        let http = build_http_client(&transport_config(config, http))?;

        Ok(Self {
            http,
            base: config.address.clone(),
            auth: config.auth.clone(),
        })
    }

    /// Normalised base address this client talks to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Mint an access token.
    ///
    /// # Errors
    ///
    /// `EmptyRequest` when no request is given, `Upstream` on any non-200
    /// answer, `Decode` when the body is not a token response.
    #[instrument(
        skip(self, request),
        fields(
            username = ?request.and_then(|r| r.username.as_deref()),
            scope = ?request.and_then(|r| r.scope.as_deref()),
        )
    )]
    pub async fn create(&self, request: Option<&TokenRequest>) -> ArtifactoryResult<IssuedToken> {
        let request = request.ok_or(ArtifactoryError::EmptyRequest)?;

        let form = request.form();
        debug!(expires_in = request.expires_in, "Sending token create request");

        let response = self
            .authorize(self.http.post(self.endpoint(TOKEN_API_PATH)?))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            warn!(%status, "Token create rejected");
            return Err(ArtifactoryError::upstream(status, body));
        }

        let token: IssuedToken = decode::<CreateTokenResponse>(&body)?.into();
        debug!(token_id = ?token.token_id, expires_in = token.expires_in, "Token created");
        Ok(token)
    }

    /// Revoke a token by value or by id.
    ///
    /// An HTTP 500 is how Artifactory answers for tokens it cannot revoke;
    /// that is reported as [`RevokeOutcome::NotRevocable`], not an error.
    ///
    /// # Errors
    ///
    /// `EmptyRequest` when neither token nor id is set, `Upstream` on any
    /// other non-200 answer.
    #[instrument(skip(self, request), fields(token_id = ?request.token_id))]
    pub async fn revoke(&self, request: &RevokeTokenRequest) -> ArtifactoryResult<RevokeOutcome> {
        let token = request
            .token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.is_empty());
        let token_id = request.token_id.as_deref().filter(|id| !id.is_empty());

        if token.is_none() && token_id.is_none() {
            return Err(ArtifactoryError::EmptyRequest);
        }
        let form: Vec<(&str, &str)> = [("token", token), ("token_id", token_id)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();

        let response = self
            .authorize(self.http.post(self.endpoint(TOKEN_REVOKE_API_PATH)?))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            info!("Revoke token failed, token may not be revocable");
            return Ok(RevokeOutcome::NotRevocable);
        }
        if status != StatusCode::OK {
            let body = response.text().await?;
            warn!(%status, "Token revoke rejected");
            return Err(ArtifactoryError::upstream(status, body));
        }

        debug!("Token revoked");
        Ok(RevokeOutcome::Revoked)
    }

    /// List the tokens Artifactory knows about, in server order.
    ///
    /// # Errors
    ///
    /// `Upstream` on any non-200 answer, `Decode` on a malformed body.
    #[instrument(skip(self))]
    pub async fn list(&self) -> ArtifactoryResult<Vec<RemoteTokenRecord>> {
        let response = self
            .authorize(self.http.get(self.endpoint(TOKEN_API_PATH)?))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            warn!(%status, "Token list rejected");
            return Err(ArtifactoryError::upstream(status, body));
        }

        let tokens = decode::<TokenListResponse>(&body)?.tokens;
        debug!(count = tokens.len(), "Listed tokens");
        Ok(tokens)
    }

    /// First listed token whose subject ends with `/{username}`.
    ///
    /// When several tokens share the suffix the first one listed wins;
    /// Artifactory gives no ordering guarantee between them.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenClient::list`] failures.
    #[instrument(skip(self))]
    pub async fn lookup_by_subject_suffix(
        &self,
        username: &str,
    ) -> ArtifactoryResult<Option<RemoteTokenRecord>> {
        let tokens = self.list().await?;
        let found = find_by_subject_suffix(&tokens, username).cloned();
        debug!(found = found.is_some(), "Looked up token by subject");
        Ok(found)
    }

    fn endpoint(&self, path: &str) -> ArtifactoryResult<Url> {
        self.base.join(path).map_err(|e| {
            ArtifactoryError::InvalidConfig(ConfigViolation::InvalidAddress(e.to_string()).into())
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            AuthMode::ApiKey(key) => request.header(API_KEY_HEADER, key.expose_secret()),
            AuthMode::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
        }
    }
}

/// Engine HTTP settings with the connection's TLS policy applied.
fn transport_config(config: &ArtifactoryConfig, http: &HttpConfig) -> HttpConfig {
    http.clone().with_tls_verify(config.tls_verify)
}

fn decode<T: DeserializeOwned>(body: &str) -> ArtifactoryResult<T> {
    serde_json::from_str(body).map_err(ArtifactoryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFields;
    use secrecy::SecretString;
    use serde_json::json;
    use test_utils::fixtures::{FAKE_API_KEY, api_key_config, basic_config, token_list, token_record};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TokenClient {
        let config = ConfigFields::from_map(&api_key_config(&format!("{}/artifactory", server.uri())))
            .validate()
            .unwrap();
        TokenClient::new(&config, &HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_tls_policy_reaches_transport() {
        let mut fields = basic_config("https://x/art");
        fields.insert("tls_verify".to_string(), json!(false));
        let insecure = ConfigFields::from_map(&fields).validate().unwrap();

        let http = HttpConfig::default().with_timeout(std::time::Duration::from_secs(5));
        let transport = transport_config(&insecure, &http);
        assert!(!transport.tls_verify);
        assert_eq!(transport.timeout, http.timeout);
        assert!(TokenClient::new(&insecure, &http).is_ok());

        let secure = ConfigFields::from_map(&basic_config("https://x/art")).validate().unwrap();
        let transport = transport_config(&secure, &http.clone().with_tls_verify(false));
        assert!(transport.tls_verify);
    }

    #[tokio::test]
    async fn test_create_sends_form_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/artifactory/api/security/token"))
            .and(header(API_KEY_HEADER, FAKE_API_KEY))
            .and(body_string_contains("username=vault-r-1"))
            .and(body_string_contains("expires_in=3600"))
            .and(body_string_contains("refreshable=false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fake-access-token",
                "expires_in": 3600,
                "scope": "api:* member-of-groups:readers",
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = TokenRequest::new("vault-r-1", "member-of-groups:\"readers\"", 3600);
        let token = client.create(Some(&request)).await.unwrap();

        assert_eq!(token.access_token.expose_secret(), "fake-access-token");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_create_without_request_is_empty() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let err = client.create(None).await.unwrap_err();
        assert!(matches!(err, ArtifactoryError::EmptyRequest));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_create_non_200_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden group"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = TokenRequest::new("u", "member-of-groups:\"g\"", 60);
        let err = client.create(Some(&request)).await.unwrap_err();

        assert!(matches!(err, ArtifactoryError::Upstream { status, .. } if status == StatusCode::FORBIDDEN));
        assert!(err.to_string().contains("403 Forbidden"));
        assert!(err.to_string().contains("forbidden group"));
    }

    #[tokio::test]
    async fn test_create_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!("not a valid CreateTokenResponse")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = TokenRequest::new("u", "member-of-groups:\"g\"", 60);
        let err = client.create(Some(&request)).await.unwrap_err();
        assert!(matches!(err, ArtifactoryError::Decode(_)));
    }

    #[tokio::test]
    async fn test_revoke_requires_identifier() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let err = client.revoke(&RevokeTokenRequest::default()).await.unwrap_err();
        assert!(matches!(err, ArtifactoryError::EmptyRequest));

        let blank = RevokeTokenRequest {
            token: Some(SecretString::from(String::new())),
            token_id: Some(String::new()),
        };
        let err = client.revoke(&blank).await.unwrap_err();
        assert!(matches!(err, ArtifactoryError::EmptyRequest));
    }

    #[tokio::test]
    async fn test_revoke_status_handling() {
        let cases = [
            (200, Some(RevokeOutcome::Revoked)),
            (500, Some(RevokeOutcome::NotRevocable)),
            (400, None),
            (404, None),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/artifactory/api/security/token/revoke"))
                .and(body_string_contains("token=fake-token"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let client = client_for(&server);
            let request = RevokeTokenRequest::by_token(SecretString::from("fake-token".to_string()));
            let result = client.revoke(&request).await;

            match expected {
                Some(outcome) => assert_eq!(result.unwrap(), outcome, "status {status}"),
                None => assert!(
                    matches!(result, Err(ArtifactoryError::Upstream { .. })),
                    "status {status}"
                ),
            }
        }
    }

    #[tokio::test]
    async fn test_list_and_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/api/security/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_list(vec![
                token_record("id-1", "balice", 1_700_000_000),
                token_record("id-2", "alice", 1_700_000_000),
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tokens = client.list().await.unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token_id, "id-1");

        let found = client.lookup_by_subject_suffix("alice").await.unwrap();
        assert_eq!(found.map(|r| r.token_id), Some("id-2".to_string()));

        let missing = client.lookup_by_subject_suffix("carol").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_non_200_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.list().await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(StatusCode::UNAUTHORIZED));
    }
}
