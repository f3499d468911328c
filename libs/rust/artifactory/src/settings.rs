//! Engine settings supplied by the host process.
//!
//! These are not part of the connection config the host writes at runtime;
//! they fix defaults and transport behaviour for the lifetime of the engine.

use crate::error::{ArtifactoryError, ArtifactoryResult};
use rust_common::HttpConfig;
use std::env;
use std::time::Duration;

/// The host's system default lease TTL.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(768 * 60 * 60);

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// TTL used for roles written without one
    pub default_ttl: Duration,
    /// Transport settings for every client the engine builds
    pub http: HttpConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_LEASE_TTL,
            http: HttpConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings from the environment, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns `Settings` if a variable is set but malformed.
    pub fn from_env() -> ArtifactoryResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Settings` if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ArtifactoryResult<Self> {
        let mut settings = Self::default();

        if let Some(raw) = lookup("ARTIFACTORY_DEFAULT_LEASE_TTL") {
            settings.default_ttl = parse_duration(&raw)
                .filter(|ttl| !ttl.is_zero())
                .ok_or_else(|| invalid("ARTIFACTORY_DEFAULT_LEASE_TTL", &raw))?;
        }
        if let Some(secs) = parse_secs(&lookup, "ARTIFACTORY_HTTP_TIMEOUT")? {
            settings.http = settings.http.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_secs(&lookup, "ARTIFACTORY_HTTP_CONNECT_TIMEOUT")? {
            settings.http = settings.http.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(agent) = lookup("ARTIFACTORY_USER_AGENT").filter(|a| !a.is_empty()) {
            settings.http = settings.http.with_user_agent(agent);
        }

        Ok(settings)
    }

    /// Override the default TTL.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override the transport settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}

/// Parse whole seconds (`"3600"`) or a duration string (`"1h"`, `"90m"`).
pub(crate) fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .ok()
        .or_else(|| humantime::parse_duration(raw).ok())
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> ArtifactoryResult<Option<u64>> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, &raw)),
        None => Ok(None),
    }
}

fn invalid(name: &str, raw: &str) -> ArtifactoryError {
    ArtifactoryError::Settings(format!("Invalid {name}: {raw:?}"))
}
