//! Shared library for cross-cutting concerns in the Artifactory secrets engine.
//!
//! This crate provides centralized implementations for:
//! - HTTP client configuration and building (timeouts, TLS policy)
//! - Redaction of literal secret values from surfaced text
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod http;
pub mod redaction;
pub mod tracing_config;

pub use http::{HttpConfig, build_http_client};
pub use redaction::Redactor;
pub use tracing_config::{LogFormat, TracingConfig, init_tracing};
