use async_trait::async_trait;
use outreach_common::outgoing;

use super::{DeliveryClient, OutboundEmail, SendError};
use crate::redact::mask_email;

/// Delivery client that only logs
///
/// Useful for local runs and staging, where a live send must not leave the
/// process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogClient;

#[async_trait]
impl DeliveryClient for LogClient {
    async fn send(&self, message: &OutboundEmail) -> Result<(), SendError> {
        outgoing!(
            level = INFO,
            recipient = %mask_email(&message.to),
            subject = %message.subject,
            body_bytes = message.body_html.len(),
            "Delivered message to log channel"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
