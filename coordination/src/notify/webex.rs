//! Webex messaging backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Public Webex REST API
pub const DEFAULT_API_BASE: &str = "https://webexapis.com/v1";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(String),

    #[error("messaging backend rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery timed out")]
    Timeout,

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// One chat message: markdown body plus card attachments
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub room_id: String,
    pub markdown: String,
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryReceipt {
    #[serde(rename = "id")]
    pub message_id: String,
}

/// Delivers a rendered message with the given bearer credential
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn send(
        &self,
        message: &OutboundMessage,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// `POST {api_base}/messages`
pub struct WebexClient {
    api_base: String,
    client: reqwest::Client,
}

impl WebexClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl MessagingBackend for WebexClient {
    async fn send(
        &self,
        message: &OutboundMessage,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let url = format!("{}/messages", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        response
            .json::<DeliveryReceipt>()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))
    }
}
