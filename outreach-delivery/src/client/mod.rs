//! Delivery channel abstraction
//!
//! The dispatcher only ever talks to a [`DeliveryClient`]. How a failure is
//! classified decides what happens next: recipient and content rejections
//! fail one line item, a temporarily unavailable channel is retried, and an
//! unavailable channel fails the whole job.

mod log;
mod sendgrid;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use outreach_common::ConfigError;
use serde::Deserialize;
use thiserror::Error;

pub use self::{log::LogClient, sendgrid::SendGridClient};

/// One rendered message, ready to hand to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The channel refused this particular recipient
    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    /// The channel refused the message content
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// The channel cannot accept anything (outage, bad credentials)
    #[error("Delivery channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Throttling, a server error or a dropped connection; worth retrying
    #[error("Delivery channel temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// The channel did not answer within the send timeout
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

impl SendError {
    /// Whether this failure means no further item can succeed either
    #[must_use]
    pub const fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            Self::ChannelUnavailable(_) | Self::TemporarilyUnavailable(_)
        )
    }

    /// Whether the same message may succeed if sent again shortly
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TemporarilyUnavailable(_))
    }

    /// Stable label used in logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RecipientRejected(_) => "recipient_rejected",
            Self::ContentRejected(_) => "content_rejected",
            Self::ChannelUnavailable(_) => "channel_unavailable",
            Self::TemporarilyUnavailable(_) => "temporarily_unavailable",
            Self::Timeout(_) => "timeout",
        }
    }
}

#[async_trait]
pub trait DeliveryClient: std::fmt::Debug + Send + Sync {
    /// Hand one message to the channel
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] describing why the channel did not accept the
    /// message.
    async fn send(&self, message: &OutboundEmail) -> Result<(), SendError>;

    /// Short channel name for logs
    fn name(&self) -> &'static str;
}

/// Which delivery channel to construct at start-up
#[derive(Debug, Clone, Default, Deserialize)]
pub enum DeliveryConfig {
    /// Log every message and report success. No mail leaves the process.
    #[default]
    Log,

    SendGrid {
        api_key: String,
        from_email: String,
        #[serde(default)]
        from_name: Option<String>,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default = "sendgrid::default_endpoint")]
        endpoint: String,
    },
}

impl DeliveryConfig {
    /// Construct the configured client
    ///
    /// # Errors
    ///
    /// Returns an error if the channel settings are invalid.
    pub fn build(&self) -> Result<Arc<dyn DeliveryClient>, ConfigError> {
        Ok(match self {
            Self::Log => Arc::new(LogClient),
            Self::SendGrid {
                api_key,
                from_email,
                from_name,
                reply_to,
                endpoint,
            } => Arc::new(SendGridClient::new(
                api_key,
                from_email,
                from_name.clone(),
                reply_to.clone(),
                endpoint.clone(),
            )?),
        })
    }
}
