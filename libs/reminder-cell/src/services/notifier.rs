use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::ReminderError;

const ALT_TEXT_FALLBACK: &str = "ご予約のお知らせ";

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Flex { alt_text: String, contents: Value },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, destination_id: &str, message: &OutboundMessage) -> Result<(), ReminderError>;
}

/// Upper bound for a single push, so one stalled request cannot hold up a batch.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// LINE Messaging API push.
pub struct LineNotifier {
    client: Client,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl LineNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.line_api_base_url.trim_end_matches('/').to_string(),
            access_token: config.line_channel_access_token.clone(),
            timeout: PUSH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn payload(destination_id: &str, message: &OutboundMessage) -> Value {
        let message = match message {
            OutboundMessage::Text(text) => json!({
                "type": "text",
                "text": text
            }),
            OutboundMessage::Flex { alt_text, contents } => {
                let alt_text = if alt_text.trim().is_empty() {
                    ALT_TEXT_FALLBACK
                } else {
                    alt_text.as_str()
                };
                json!({
                    "type": "flex",
                    "altText": alt_text,
                    "contents": contents
                })
            }
        };

        json!({
            "to": destination_id,
            "messages": [message]
        })
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    async fn push(&self, destination_id: &str, message: &OutboundMessage) -> Result<(), ReminderError> {
        if self.access_token.is_empty() {
            return Err(ReminderError::Dispatch("LINE channel access token is not configured".to_string()));
        }

        let url = format!("{}/v2/bot/message/push", self.base_url);
        debug!("Pushing reminder to {}", destination_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .json(&Self::payload(destination_id, message))
            .send()
            .await
            .map_err(|e| ReminderError::Dispatch(format!("LINE push request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LINE push rejected ({}): {}", status, body);
            return Err(ReminderError::Dispatch(format!("LINE push rejected ({}): {}", status, body)));
        }

        Ok(())
    }
}
