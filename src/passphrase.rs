//! Container passphrase resolution
//!
//! The passphrase protecting the key container is resolved from an explicit,
//! ordered list of sources. The first source yielding a non-empty value wins:
//!
//! ```text
//! Environment(CERT_PWD) → Property(CERT_PWD) → Fallback("changeit")
//! ```
//!
//! The fallback is a documented constant and is **insecure for production**;
//! resolving from it logs a warning every time.

use crate::configs::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;

/// One place a passphrase may come from
#[derive(Clone)]
pub enum PassphraseSource {
    /// Named environment variable
    Environment(String),
    /// Key in the process-level property map handed to the resolver
    Property(String),
    /// Fixed constant, used as the last resort
    Fallback(SecretString),
    /// Value supplied directly by the caller
    Explicit(SecretString),
}

impl fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment(var) => f.debug_tuple("Environment").field(var).finish(),
            Self::Property(key) => f.debug_tuple("Property").field(key).finish(),
            Self::Fallback(_) => f.debug_tuple("Fallback").field(&"<redacted>").finish(),
            Self::Explicit(_) => f.debug_tuple("Explicit").field(&"<redacted>").finish(),
        }
    }
}

/// Which source a resolved passphrase came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassphraseOrigin {
    Environment(String),
    Property(String),
    Fallback,
    Explicit,
}

impl PassphraseOrigin {
    pub fn is_insecure_default(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

pub struct ResolvedPassphrase {
    secret: SecretString,
    origin: PassphraseOrigin,
}

impl ResolvedPassphrase {
    pub fn origin(&self) -> &PassphraseOrigin {
        &self.origin
    }

    pub(crate) fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for ResolvedPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPassphrase")
            .field("secret", &"<redacted>")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Ordered passphrase resolver
#[derive(Debug, Clone)]
pub struct PassphraseResolver {
    sources: Vec<PassphraseSource>,
    properties: HashMap<String, String>,
}

impl PassphraseResolver {
    pub fn new(sources: Vec<PassphraseSource>, properties: HashMap<String, String>) -> Self {
        Self {
            sources,
            properties,
        }
    }

    /// Environment → property → fallback, as named in the configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            vec![
                PassphraseSource::Environment(config.passphrase.env_var.clone()),
                PassphraseSource::Property(config.passphrase.property.clone()),
                PassphraseSource::Fallback(SecretString::new(config.passphrase.fallback.clone())),
            ],
            config.properties.clone(),
        )
    }

    /// Resolver that always yields the given passphrase
    pub fn fixed(passphrase: impl Into<String>) -> Self {
        Self::new(
            vec![PassphraseSource::Explicit(SecretString::new(passphrase.into()))],
            HashMap::new(),
        )
    }

    pub fn sources(&self) -> &[PassphraseSource] {
        &self.sources
    }

    /// Resolve against the real process environment
    pub fn resolve(&self) -> Option<ResolvedPassphrase> {
        self.resolve_with(|var| std::env::var(var).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve_with<F>(&self, env: F) -> Option<ResolvedPassphrase>
    where
        F: Fn(&str) -> Option<String>,
    {
        for source in &self.sources {
            let resolved = match source {
                PassphraseSource::Environment(var) => env(var)
                    .filter(|value| !value.is_empty())
                    .map(|value| ResolvedPassphrase {
                        secret: SecretString::new(value),
                        origin: PassphraseOrigin::Environment(var.clone()),
                    }),
                PassphraseSource::Property(key) => self
                    .properties
                    .get(key)
                    .filter(|value| !value.is_empty())
                    .map(|value| ResolvedPassphrase {
                        secret: SecretString::new(value.clone()),
                        origin: PassphraseOrigin::Property(key.clone()),
                    }),
                PassphraseSource::Fallback(value) => Some(ResolvedPassphrase {
                    secret: value.clone(),
                    origin: PassphraseOrigin::Fallback,
                }),
                PassphraseSource::Explicit(value) => Some(ResolvedPassphrase {
                    secret: value.clone(),
                    origin: PassphraseOrigin::Explicit,
                }),
            };

            if let Some(resolved) = resolved {
                if resolved.origin.is_insecure_default() {
                    tracing::warn!(
                        "container passphrase resolved from the built-in fallback; \
                         this default is insecure for production use"
                    );
                } else {
                    tracing::debug!(origin = ?resolved.origin, "container passphrase resolved");
                }
                return Some(resolved);
            }
        }
        None
    }
}
