//! `%ENV{NAME}` secret indirection for bot credentials

use crate::store::WebexSettings;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%ENV\{(?P<env_name>[a-zA-Z0-9]+[a-zA-Z0-9_-]*)\}$")
        .expect("ENV_REFERENCE regex should compile")
});

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("environment variable '{name}' is not defined")]
    Undefined { name: String },
}

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolved bot credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub room_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &redact(&self.bot_token))
            .field("room_id", &redact(&self.room_id))
            .finish()
    }
}

/// Replaces `%ENV{NAME}` values with the named variable
#[derive(Clone)]
pub struct SecretResolver {
    lookup: Arc<Lookup>,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SecretResolver {
    /// Resolve against the process environment
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve against a custom variable source
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// Variable name referenced by `value`, if it is a placeholder
    pub fn reference(value: &str) -> Option<&str> {
        ENV_REFERENCE
            .captures(value)
            .and_then(|caps| caps.name("env_name"))
            .map(|m| m.as_str())
    }

    /// Literal values pass through unchanged
    pub fn resolve(&self, value: &str) -> Result<String, SecretError> {
        match Self::reference(value) {
            Some(name) => (self.lookup)(name).ok_or_else(|| SecretError::Undefined {
                name: name.to_string(),
            }),
            None => Ok(value.to_string()),
        }
    }

    pub fn resolve_webex(&self, settings: &WebexSettings) -> Result<Credentials, SecretError> {
        Ok(Credentials {
            bot_token: self.resolve(&settings.bot_token)?,
            room_id: self.resolve(&settings.room_id)?,
        })
    }
}

/// Keep only the last four characters of a secret
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
