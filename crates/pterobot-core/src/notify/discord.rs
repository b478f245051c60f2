//! Discord REST gateway.
//!
//! Direct messages need a DM channel first: `POST /users/@me/channels`
//! returns (or reuses) the channel, then the message is created in it.

use pterobot_types::{ChannelId, PlatformUserId};
use serde_json::{Value, json};

use super::{ChatGateway, OutboundMessage};
use crate::error::DeliveryError;
use crate::secret::Secret;

/// Posts messages through the Discord HTTP API with a bot token.
#[derive(Debug, Clone)]
pub struct DiscordGateway {
    client: reqwest::Client,
    api_base: String,
    token: Secret,
}

impl DiscordGateway {
    /// Create a gateway for the API at `api_base` (e.g. `https://discord.com/api/v10`).
    pub fn new(api_base: &str, token: Secret) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_owned(),
            token,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, DeliveryError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .header("Authorization", format!("Bot {}", self.token.expose()))
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let detail = payload
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| payload.to_string(), str::to_owned);
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(payload)
    }

    async fn create_message(
        &self,
        channel: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        let body = json!({
            "content": message.content(),
            "allowed_mentions": { "parse": [] },
        });
        self.post(&format!("/channels/{channel}/messages"), &body)
            .await
            .map(|_| ())
    }
}

impl ChatGateway for DiscordGateway {
    async fn send_direct(
        &self,
        user: PlatformUserId,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        let channel = self
            .post(
                "/users/@me/channels",
                &json!({ "recipient_id": user.to_string() }),
            )
            .await?;
        let channel_id = channel
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| DeliveryError::Rejected {
                status: 200,
                detail: "DM channel response had no id".to_owned(),
            })?
            .to_owned();
        self.create_message(&channel_id, message).await
    }

    async fn post_to_channel(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.create_message(&channel.to_string(), message).await
    }
}
