//! Centralized HTTP client configuration and building.
//!
//! Every outbound client in the engine is built here so TLS policy and
//! transport settings are applied the same way everywhere.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// HTTP client configuration.
///
/// Timeouts are unset by default: transport deadlines belong to the host,
/// which may opt in through [`HttpConfig::with_timeout`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout (default: none)
    pub timeout: Option<Duration>,
    /// Connection timeout (default: none)
    pub connect_timeout: Option<Duration>,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// Verify the server certificate chain and hostname (default: true)
    pub tls_verify: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("artifactory-secrets/", env!("CARGO_PKG_VERSION")).to_string(),
            tls_verify: true,
        }
    }
}

impl HttpConfig {
    /// Set a whole-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set a custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set whether server certificates are verified.
    #[must_use]
    pub const fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS and connection pooling. When
/// `tls_verify` is off the client accepts any server certificate.
///
/// # Errors
///
/// Returns an error if the client cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
///
/// let config = HttpConfig::default().with_tls_verify(false);
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut builder = ClientBuilder::new()
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .danger_accept_invalid_certs(!config.tls_verify);

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    builder.build()
}
