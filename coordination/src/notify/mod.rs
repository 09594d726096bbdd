//! Notification Module: structured chat messages for plan and SLA events
//!
//! Each event name maps to a template pair, `<event>.md` for the message body
//! and `<event>-ac.json` for the adaptive card. Bot credentials live in the
//! configuration store and may point at environment variables via
//! `%ENV{NAME}`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nano_coordination::notify::{Dispatcher, MemoryTemplates, SecretResolver, WebexClient};
//!
//! let dispatcher = Dispatcher::new(
//!     store,
//!     Arc::new(MemoryTemplates::builtin()),
//!     Arc::new(WebexClient::new(DEFAULT_API_BASE, Duration::from_secs(30))?),
//!     SecretResolver::from_env(),
//! );
//! let receipt = dispatcher.dispatch(&invocation).await?;
//! ```

pub mod dispatcher;
pub mod params;
pub mod render;
pub mod secrets;
pub mod webex;

pub use dispatcher::Dispatcher;
pub use params::{EventKind, ParamMap, ParamValue};
pub use render::{FileTemplates, MemoryTemplates, TemplateError, TemplateRenderer};
pub use secrets::{Credentials, SecretError, SecretResolver};
pub use webex::{
    DeliveryError, DeliveryReceipt, MessagingBackend, OutboundMessage, WebexClient,
    DEFAULT_API_BASE,
};
