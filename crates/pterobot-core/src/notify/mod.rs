//! Notification router.
//!
//! After every authorized action the affected user gets one direct-message
//! attempt. If it fails for any reason the router posts a fallback record
//! to the fixed audit channel instead. Neither step is retried, and a
//! notification failure never changes the execution outcome.

mod discord;
mod message;

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use pterobot_types::{
    ActionRequest, ChannelId, ExecutionOutcome, NotificationOutcome, PlatformUserId,
};

pub use discord::DiscordGateway;
pub use message::{MAX_MESSAGE_CHARS, OutboundMessage, fallback_message, user_message};

use crate::config::NotificationConfig;
use crate::error::DeliveryError;

/// Writes to the chat platform.
pub trait ChatGateway: Send + Sync {
    /// Send a direct message to a user.
    fn send_direct(
        &self,
        user: PlatformUserId,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Post a message to a channel.
    fn post_to_channel(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Delivers action outcomes to the affected user or the audit channel.
#[derive(Debug)]
pub struct NotificationRouter<G> {
    gateway: G,
    audit_channel: ChannelId,
    timeout: Duration,
}

impl<G: ChatGateway> NotificationRouter<G> {
    /// Create a router posting fallbacks to `audit_channel`.
    pub const fn new(gateway: G, audit_channel: ChannelId, timeout: Duration) -> Self {
        Self {
            gateway,
            audit_channel,
            timeout,
        }
    }

    /// Create a router from configuration.
    pub fn from_config(gateway: G, config: &NotificationConfig) -> Self {
        Self::new(gateway, config.audit_channel_id, config.delivery_timeout())
    }

    /// Tell the target what happened, falling back to the audit channel.
    pub async fn notify(
        &self,
        request: &ActionRequest,
        execution: &ExecutionOutcome,
    ) -> NotificationOutcome {
        let direct = user_message(request, execution, Utc::now());
        let delivery_error = match self
            .bounded(self.gateway.send_direct(request.target.platform_id, &direct))
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    request_id = %request.id,
                    target = %request.target.platform_id,
                    "direct message delivered"
                );
                return NotificationOutcome::Delivered;
            }
            Err(error) => error.to_string(),
        };

        tracing::warn!(
            request_id = %request.id,
            target = %request.target.platform_id,
            error = %delivery_error,
            "direct message failed, posting to audit channel"
        );

        let fallback = fallback_message(request, execution, &delivery_error);
        match self
            .bounded(self.gateway.post_to_channel(self.audit_channel, &fallback))
            .await
        {
            Ok(()) => NotificationOutcome::FallbackLogged { delivery_error },
            Err(error) => {
                tracing::error!(
                    request_id = %request.id,
                    channel = %self.audit_channel,
                    error = %error,
                    "audit channel post failed, outcome was not communicated"
                );
                NotificationOutcome::NotificationFailed {
                    delivery_error,
                    fallback_error: error.to_string(),
                }
            }
        }
    }

    async fn bounded(
        &self,
        delivery: impl Future<Output = Result<(), DeliveryError>>,
    ) -> Result<(), DeliveryError> {
        tokio::time::timeout(self.timeout, delivery)
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }
}
