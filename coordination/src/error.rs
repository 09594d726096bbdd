//! Crate-level error type
//!
//! Subsystem errors (store, templates, secrets, delivery, command channel,
//! parser) are folded into [`NanoError`]. The action registry turns any
//! `NanoError` into `result = false` plus a message prefixed with its
//! [`ErrorCategory`].

use crate::notify::render::TemplateError;
use crate::notify::secrets::SecretError;
use crate::notify::webex::DeliveryError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for core operations
pub type NanoResult<T> = Result<T, NanoError>;

/// Failure category reported back to the invoking runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    ConfigurationAccess,
    Convergence,
    Verification,
    SecretResolution,
    Template,
    Delivery,
    InvalidInput,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationAccess => write!(f, "configuration-access"),
            Self::Convergence => write!(f, "convergence"),
            Self::Verification => write!(f, "verification"),
            Self::SecretResolution => write!(f, "secret-resolution"),
            Self::Template => write!(f, "template"),
            Self::Delivery => write!(f, "delivery"),
            Self::InvalidInput => write!(f, "invalid-input"),
        }
    }
}

/// Errors surfaced by actions, callbacks and the plan driver
#[derive(Error, Debug)]
pub enum NanoError {
    /// Transaction open/read/write/commit failure
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Config template application failed for a state entry
    #[error("convergence of {component}/{state} failed: {message}")]
    Convergence {
        component: String,
        state: String,
        message: String,
    },

    /// Verification gate rejected progression
    #[error("{0}")]
    Verification(String),

    /// `%ENV{..}` placeholder could not be resolved
    #[error("{0}")]
    Secret(#[from] SecretError),

    /// Message template missing or incomplete
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// Messaging backend rejected or never received the message
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// Action input or invocation path did not carry what the action needs
    #[error("{0}")]
    InvalidInput(String),
}

impl NanoError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) => ErrorCategory::ConfigurationAccess,
            Self::Convergence { .. } => ErrorCategory::Convergence,
            Self::Verification(_) => ErrorCategory::Verification,
            Self::Secret(_) => ErrorCategory::SecretResolution,
            Self::Template(_) => ErrorCategory::Template,
            Self::Delivery(_) => ErrorCategory::Delivery,
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
        }
    }

    /// Message placed into an action's `msg` output
    pub fn to_action_message(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}
