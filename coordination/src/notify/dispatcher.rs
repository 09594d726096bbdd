//! Notification Dispatcher: params, render, resolve, deliver
//!
//! ```text
//! invocation ─► build_params ─► normalize ─► render .md + -ac.json ─► resolve %ENV ─► send
//!               (read txn)                                            (fails before any network call)
//! ```
//!
//! The dispatcher keeps no state between calls and never retries.

use super::params::{build_params, card_template, markdown_template, normalize};
use super::render::{TemplateError, TemplateRenderer};
use super::secrets::{redact, SecretResolver};
use super::webex::{DeliveryReceipt, MessagingBackend, OutboundMessage};
use crate::actions::ActionInvocation;
use crate::error::NanoResult;
use crate::store::{with_read, ConfigStore, TransactionExt};
use std::sync::Arc;

pub struct Dispatcher {
    store: Arc<dyn ConfigStore>,
    renderer: Arc<dyn TemplateRenderer>,
    backend: Arc<dyn MessagingBackend>,
    secrets: SecretResolver,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        renderer: Arc<dyn TemplateRenderer>,
        backend: Arc<dyn MessagingBackend>,
        secrets: SecretResolver,
    ) -> Self {
        Self {
            store,
            renderer,
            backend,
            secrets,
        }
    }

    /// Render and deliver the message for one invocation
    pub async fn dispatch(&self, invocation: &ActionInvocation) -> NanoResult<DeliveryReceipt> {
        let event = invocation.name.as_str();
        let (params, settings) = with_read(self.store.as_ref(), &invocation.user, |txn| {
            let params = build_params(txn, event, &invocation.path, &invocation.input)?;
            Ok((params, txn.webex()?))
        })?;
        let params = normalize(&params);
        tracing::info!(event, params = ?params, "Notification parameters");

        let markdown = self.renderer.render(&markdown_template(event), &params)?;
        let card_name = card_template(event);
        let card = self.renderer.render(&card_name, &params)?;
        tracing::debug!(event, markdown = %markdown, card = %card, "Rendered message");

        let attachments = parse_attachments(&card_name, &card)?;

        let credentials = self.secrets.resolve_webex(&settings)?;
        tracing::debug!(
            bot_token = %redact(&credentials.bot_token),
            room_id = %redact(&credentials.room_id),
            "Resolved bot credentials"
        );

        let message = OutboundMessage {
            room_id: credentials.room_id.clone(),
            markdown,
            attachments,
        };
        match self.backend.send(&message, &credentials.bot_token).await {
            Ok(receipt) => {
                tracing::info!(event, message_id = %receipt.message_id, "Notification delivered");
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(event, error = %e, "Notification delivery failed");
                Err(e.into())
            }
        }
    }
}

fn parse_attachments(name: &str, card: &str) -> Result<Vec<serde_json::Value>, TemplateError> {
    let invalid = |reason: String| TemplateError::InvalidCard {
        template: name.to_string(),
        reason,
    };
    let mut value: serde_json::Value =
        serde_json::from_str(card).map_err(|e| invalid(e.to_string()))?;
    match value.get_mut("attachments").map(serde_json::Value::take) {
        Some(serde_json::Value::Array(items)) => Ok(items),
        Some(_) => Err(invalid("'attachments' is not an array".to_string())),
        None => Err(invalid("missing 'attachments'".to_string())),
    }
}
