//! SendGrid v3 mail-send client

use async_trait::async_trait;
use outreach_common::{ConfigError, normalize_email, outgoing};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{DeliveryClient, OutboundEmail, SendError};
use crate::redact::mask_email;

pub(super) fn default_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

#[derive(Debug, Clone)]
pub struct SendGridClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_email: String,
    from_name: Option<String>,
    reply_to: Option<String>,
}

impl SendGridClient {
    /// # Errors
    ///
    /// Returns an error if the API key is blank, the sender address is not a
    /// valid address, or the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        from_email: &str,
        from_name: Option<String>,
        reply_to: Option<String>,
        endpoint: String,
    ) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }

        let from_email = normalize_email(from_email)
            .map_err(|e| ConfigError::invalid("from_email", e.to_string()))?;
        let reply_to = reply_to
            .map(|addr| normalize_email(&addr))
            .transpose()
            .map_err(|e| ConfigError::invalid("reply_to", e.to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("outreach/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid("delivery", e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.trim().to_string(),
            from_email,
            from_name,
            reply_to,
        })
    }

    fn payload(&self, message: &OutboundEmail) -> serde_json::Value {
        let mut from = json!({ "email": self.from_email });
        if let Some(name) = &self.from_name {
            from["name"] = json!(name);
        }

        let mut payload = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": from,
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.body_html }],
        });

        if let Some(reply_to) = &self.reply_to {
            payload["reply_to"] = json!({ "email": reply_to });
        }

        payload
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

/// Map a non-success response onto the dispatcher's failure classes.
///
/// Throttling and server errors are temporary and worth retrying.
/// Authentication errors affect every message, so they are channel failures.
/// A 4xx naming a `personalizations` field is about the recipient; any other
/// 4xx is about the content.
fn classify(status: StatusCode, body: &str) -> SendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = {
        let messages: Vec<_> = parsed
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect();
        if messages.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", messages.join("; "))
        }
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SendError::ChannelUnavailable(detail),
        StatusCode::TOO_MANY_REQUESTS => SendError::TemporarilyUnavailable(detail),
        s if s.is_server_error() => SendError::TemporarilyUnavailable(detail),
        _ if parsed.errors.iter().any(|e| {
            e.field
                .as_deref()
                .is_some_and(|f| f.starts_with("personalizations"))
        }) =>
        {
            SendError::RecipientRejected(detail)
        }
        _ => SendError::ContentRejected(detail),
    }
}

#[async_trait]
impl DeliveryClient for SendGridClient {
    #[tracing::instrument(skip_all, fields(recipient = %mask_email(&message.to)))]
    async fn send(&self, message: &OutboundEmail) -> Result<(), SendError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| SendError::TemporarilyUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            outgoing!(level = DEBUG, %status, "SendGrid accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify(status, &body);
        outgoing!(level = WARN, %status, kind = error.kind(), "SendGrid refused message");

        Err(error)
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn client() -> SendGridClient {
        SendGridClient::new(
            "SG.key",
            " Outreach@Example.com ",
            Some("Outreach Team".to_string()),
            Some("replies@example.com".to_string()),
            default_endpoint(),
        )
        .unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let payload = client().payload(&OutboundEmail {
            to: "alice@example.com".to_string(),
            subject: "Hello".to_string(),
            body_html: "<p>Hi</p>".to_string(),
        });

        assert_eq!(
            payload,
            json!({
                "personalizations": [{ "to": [{ "email": "alice@example.com" }] }],
                "from": { "email": "outreach@example.com", "name": "Outreach Team" },
                "reply_to": { "email": "replies@example.com" },
                "subject": "Hello",
                "content": [{ "type": "text/html", "value": "<p>Hi</p>" }],
            })
        );
    }

    #[test]
    fn test_new_validates_credentials() {
        assert!(matches!(
            SendGridClient::new("  ", "a@example.com", None, None, default_endpoint()),
            Err(ConfigError::MissingField("api_key"))
        ));
        assert!(SendGridClient::new("key", "not-an-address", None, None, default_endpoint()).is_err());
    }

    #[test]
    fn test_classify_channel_failures() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let error = classify(status, "");
            assert!(error.is_channel_failure(), "{status}");
            assert!(!error.is_transient(), "{status}");
        }

        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(classify(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn test_classify_recipient_and_content() {
        let recipient = classify(
            StatusCode::BAD_REQUEST,
            r#"{"errors":[{"message":"Does not contain a valid address.","field":"personalizations.0.to.0.email"}]}"#,
        );
        assert_eq!(
            recipient,
            SendError::RecipientRejected(
                "HTTP 400 Bad Request: Does not contain a valid address.".to_string()
            )
        );

        let content = classify(
            StatusCode::PAYLOAD_TOO_LARGE,
            r#"{"errors":[{"message":"too large","field":null}]}"#,
        );
        assert!(matches!(content, SendError::ContentRejected(_)));

        let unparsable = classify(StatusCode::BAD_REQUEST, "<html>");
        assert_eq!(
            unparsable,
            SendError::ContentRejected("HTTP 400 Bad Request".to_string())
        );
    }
}
