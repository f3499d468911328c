//! Redaction of literal secret values from surfaced text.
//!
//! Errors that travel back to a host can embed upstream response bodies or
//! request details. A [`Redactor`] holds the literal secrets that are live
//! for a configuration and replaces each with a fixed placeholder.

use secrecy::{ExposeSecret, SecretString};

/// A set of literal secret values and their placeholders.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    replacements: Vec<(SecretString, String)>,
}

impl Redactor {
    /// Create an empty redactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret value and the placeholder that replaces it.
    ///
    /// Empty secrets are ignored since they would match everywhere.
    #[must_use]
    pub fn with_secret(mut self, secret: &SecretString, placeholder: impl Into<String>) -> Self {
        if !secret.expose_secret().is_empty() {
            self.replacements.push((secret.clone(), placeholder.into()));
            // Longest first, so a secret that contains another is replaced whole.
            self.replacements
                .sort_by(|a, b| b.0.expose_secret().len().cmp(&a.0.expose_secret().len()));
        }
        self
    }

    /// Number of secrets tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    /// Whether no secrets are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Placeholders in replacement order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.replacements.iter().map(|(_, placeholder)| placeholder.as_str())
    }

    /// Whether `text` contains any tracked secret.
    #[must_use]
    pub fn leaks(&self, text: &str) -> bool {
        self.replacements
            .iter()
            .any(|(secret, _)| text.contains(secret.expose_secret()))
    }

    /// Replace every tracked secret in `text` with its placeholder.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.replacements
            .iter()
            .fold(text.to_string(), |acc, (secret, placeholder)| {
                acc.replace(secret.expose_secret(), placeholder)
            })
    }
}
