//! Connection configuration.
//!
//! The host hands over a loosely-typed field map. [`ConfigFields`] decodes it
//! field by field, [`ConfigFields::validate`] turns it into a typed
//! [`ArtifactoryConfig`], and [`ConnectionConfig`] owns the active config
//! together with the client built from it.

use crate::{
    client::TokenClient,
    error::{ArtifactoryError, ArtifactoryResult, ConfigViolation, ConfigViolations},
};
use rust_common::{HttpConfig, Redactor};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Placeholder replacing the api key in surfaced text.
pub const API_KEY_PLACEHOLDER: &str = "[api_key]";

/// Placeholder replacing the password in surfaced text.
pub const PASSWORD_PLACEHOLDER: &str = "[password]";

/// How requests authenticate against Artifactory.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// `X-JFrog-Art-Api` header
    ApiKey(SecretString),
    /// HTTP basic auth
    Basic {
        /// Admin username
        username: String,
        /// Admin password
        password: SecretString,
    },
}

impl AuthMode {
    /// Short name used in summaries and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::Basic { .. } => "basic",
        }
    }
}

/// A validated connection profile.
#[derive(Debug, Clone)]
pub struct ArtifactoryConfig {
    /// Base address, always ending in exactly one `/`
    pub address: Url,
    /// Authentication mode
    pub auth: AuthMode,
    /// Verify the server certificate
    pub tls_verify: bool,
}

impl ArtifactoryConfig {
    /// Non-secret view of this config.
    #[must_use]
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            address: self.address.to_string(),
            auth: self.auth.kind(),
            username: match &self.auth {
                AuthMode::Basic { username, .. } => Some(username.clone()),
                AuthMode::ApiKey(_) => None,
            },
            tls_verify: self.tls_verify,
        }
    }

    /// Literal secrets of this config mapped to their placeholders.
    #[must_use]
    pub fn redactor(&self) -> Redactor {
        match &self.auth {
            AuthMode::ApiKey(key) => Redactor::new().with_secret(key, API_KEY_PLACEHOLDER),
            AuthMode::Basic { password, .. } => {
                Redactor::new().with_secret(password, PASSWORD_PLACEHOLDER)
            }
        }
    }
}

/// Non-secret view of the active config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    /// Normalised base address
    pub address: String,
    /// `api_key` or `basic`
    pub auth: &'static str,
    /// Username, in basic mode only
    pub username: Option<String>,
    /// Whether certificates are verified
    pub tls_verify: bool,
}

/// Connection fields decoded from a host-supplied map.
///
/// Decoding never fails outright: wrongly typed fields are recorded and
/// reported together with the semantic violations by [`ConfigFields::validate`].
#[derive(Debug, Default)]
pub struct ConfigFields {
    /// Artifactory base address
    pub address: Option<String>,
    /// API key
    pub api_key: Option<SecretString>,
    /// Username for basic auth
    pub username: Option<String>,
    /// Password for basic auth
    pub password: Option<SecretString>,
    /// Verify certificates; defaults to true
    pub tls_verify: Option<bool>,
    decode_violations: ConfigViolations,
}

impl ConfigFields {
    /// Decode the known fields of `map`; unknown keys are ignored.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut violations = ConfigViolations::default();
        let address = string_field(map, "address", &mut violations).map(|a| a.trim().to_string());
        let api_key = string_field(map, "api_key", &mut violations).map(SecretString::from);
        let username = string_field(map, "username", &mut violations);
        let password = string_field(map, "password", &mut violations).map(SecretString::from);
        let tls_verify = bool_field(map, "tls_verify", &mut violations);

        Self {
            address: address.filter(|a| !a.is_empty()),
            api_key,
            username,
            password,
            tls_verify,
            decode_violations: violations,
        }
    }

    /// Decode from a JSON value, which must be an object.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => {
                let mut fields = Self::default();
                fields.decode_violations.push(ConfigViolation::InvalidField {
                    field: "config",
                    expected: "map",
                });
                fields
            }
        }
    }

    /// Check every constraint and build the typed config.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` listing every violated constraint.
    pub fn validate(self) -> ArtifactoryResult<ArtifactoryConfig> {
        let mut violations = self.decode_violations;

        let address = match self.address.as_deref() {
            None => {
                violations.push(ConfigViolation::MissingAddress);
                None
            }
            Some(raw) => parse_address(raw).map_err(|v| violations.push(v)).ok(),
        };

        let has_api_key = self.api_key.is_some();
        let has_username = self.username.is_some();
        let has_password = self.password.is_some();
        if has_api_key && has_username {
            violations.push(ConfigViolation::ApiKeyWithUsername);
        }
        if has_username && !has_password {
            violations.push(ConfigViolation::UsernameWithoutPassword);
        }
        if has_password && !has_username {
            violations.push(ConfigViolation::PasswordWithoutUsername);
        }
        if !has_api_key && !has_username {
            violations.push(ConfigViolation::MissingCredentials);
        }

        let auth = match (self.api_key, self.username, self.password) {
            (Some(key), None, None) => Some(AuthMode::ApiKey(key)),
            (None, Some(username), Some(password)) => Some(AuthMode::Basic { username, password }),
            _ => None,
        };

        match (address, auth) {
            (Some(address), Some(auth)) if violations.is_empty() => Ok(ArtifactoryConfig {
                address,
                auth,
                tls_verify: self.tls_verify.unwrap_or(true),
            }),
            _ => Err(ArtifactoryError::InvalidConfig(violations)),
        }
    }
}

fn parse_address(raw: &str) -> Result<Url, ConfigViolation> {
    let mut url = Url::parse(raw).map_err(|e| ConfigViolation::InvalidAddress(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigViolation::InvalidAddress(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigViolation::InvalidAddress(
            "query and fragment are not allowed".to_string(),
        ));
    }
    let path = format!("{}/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

fn string_field(
    map: &Map<String, Value>,
    field: &'static str,
    violations: &mut ConfigViolations,
) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            violations.push(ConfigViolation::InvalidField {
                field,
                expected: "string",
            });
            None
        }
    }
}

fn bool_field(
    map: &Map<String, Value>,
    field: &'static str,
    violations: &mut ConfigViolations,
) -> Option<bool> {
    let invalid = ConfigViolation::InvalidField {
        field,
        expected: "boolean",
    };
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => Some(n.as_f64().is_some_and(|v| v.abs() > 0.0)),
        Some(Value::String(s)) => match s.trim() {
            "" => None,
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => {
                violations.push(invalid);
                None
            }
        },
        Some(_) => {
            violations.push(invalid);
            None
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    config: Option<ArtifactoryConfig>,
    client: Option<TokenClient>,
}

/// Read access to the active client; reconfiguration waits until it drops.
pub type ClientGuard<'a> = RwLockReadGuard<'a, TokenClient>;

/// The active connection config and the client built from it.
///
/// Token operations hold a read guard for their whole network call, so any
/// number of them run together; reconfiguration takes the write lock and
/// swaps config and client as one unit.
#[derive(Debug, Default)]
pub struct ConnectionConfig {
    state: RwLock<ConnectionState>,
    http: HttpConfig,
}

impl ConnectionConfig {
    /// Create an unconfigured connection using `http` for every client built.
    #[must_use]
    pub fn new(http: HttpConfig) -> Self {
        Self {
            state: RwLock::new(ConnectionState::default()),
            http,
        }
    }

    /// Validate `fields`, build a fresh client and make both active.
    ///
    /// With `verify` set the new client lists tokens once before anything is
    /// swapped in. On any failure the previous config stays active.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on validation failure, `Connection` when verification
    /// fails, `Http` when the client cannot be built.
    #[instrument(skip(self, fields))]
    pub async fn configure(
        &self,
        fields: &Map<String, Value>,
        verify: bool,
    ) -> ArtifactoryResult<ConfigSummary> {
        let config = ConfigFields::from_map(fields).validate()?;
        let client = TokenClient::new(&config, &self.http)?;

        if verify {
            if let Err(e) = client.list().await {
                warn!(address = %config.address, "Connection verification failed");
                return Err(ArtifactoryError::Connection(Box::new(e)));
            }
        }

        let summary = config.summary();
        let mut state = self.state.write().await;
        state.config = Some(config);
        state.client = Some(client);
        drop(state);

        info!(address = %summary.address, auth = summary.auth, "Artifactory connection configured");
        Ok(summary)
    }

    /// Load a previously persisted config without contacting Artifactory.
    ///
    /// The client is built lazily by the first [`ConnectionConfig::client`] call.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the persisted fields no longer validate.
    #[instrument(skip(self, fields))]
    pub async fn restore(&self, fields: &Map<String, Value>) -> ArtifactoryResult<ConfigSummary> {
        let config = ConfigFields::from_map(fields).validate()?;
        let summary = config.summary();

        let mut state = self.state.write().await;
        state.config = Some(config);
        state.client = None;
        drop(state);

        debug!(address = %summary.address, "Artifactory connection restored");
        Ok(summary)
    }

    /// Read access to the active client, building it first if needed.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if no config was ever accepted, `Http` if a lazily
    /// built client cannot be constructed.
    pub async fn client(&self) -> ArtifactoryResult<ClientGuard<'_>> {
        let state = match RwLockReadGuard::try_map(self.state.read().await, |s| s.client.as_ref()) {
            Ok(client) => return Ok(client),
            Err(state) => state,
        };
        drop(state);

        let mut state = self.state.write().await;
        if state.client.is_none() {
            let config = state.config.as_ref().ok_or(ArtifactoryError::NotInitialized)?;
            let client = TokenClient::new(config, &self.http)?;
            state.client = Some(client);
            debug!("Built Artifactory client from restored config");
        }

        RwLockReadGuard::try_map(state.downgrade(), |s| s.client.as_ref())
            .map_err(|_| ArtifactoryError::NotInitialized)
    }

    /// Non-secret view of the active config.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if no config was ever accepted.
    pub async fn summary(&self) -> ArtifactoryResult<ConfigSummary> {
        self.state
            .read()
            .await
            .config
            .as_ref()
            .map(ArtifactoryConfig::summary)
            .ok_or(ArtifactoryError::NotInitialized)
    }

    /// Whether a config has been accepted.
    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.config.is_some()
    }

    /// Literal secrets of the active config; empty when unconfigured.
    pub async fn redactor(&self) -> Redactor {
        self.state
            .read()
            .await
            .config
            .as_ref()
            .map(ArtifactoryConfig::redactor)
            .unwrap_or_default()
    }
}
