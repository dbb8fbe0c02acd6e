//! Parsing the top-level configuration file

use std::time::Duration;

use outreach::Outreach;
use outreach_delivery::{DeliveryConfig, SuppressionConfig};
use pretty_assertions::assert_eq;

#[test]
fn test_empty_config_uses_defaults() {
    let config: Outreach = ron::from_str("()").unwrap();

    assert_eq!(config.dispatcher.mps_limit, 60);
    assert_eq!(config.dispatcher.window(), Duration::from_secs(60));
    assert_eq!(config.dispatcher.retry.backoff(2), Duration::from_secs(4));
    assert!(matches!(config.suppression, SuppressionConfig::Memory));
    assert!(matches!(config.delivery, DeliveryConfig::Log));
    assert_eq!(config.server.listen_address, "[::]:8080");
    assert!(config.server.api_token.is_none());
    assert!(!config.metrics.enabled);
}

#[test]
fn test_full_config() {
    let config: Outreach = ron::from_str(
        r#"Outreach (
            dispatcher: (mps_limit: 1, window_secs: 30),
            suppression: File (path: "/var/lib/outreach/suppression.list"),
            delivery: SendGrid (
                api_key: "SG.test",
                from_email: "team@example.com",
                from_name: Some("Funding Team"),
            ),
            server: (listen_address: "127.0.0.1:9000", api_token: Some("dev")),
            metrics: (enabled: true),
        )"#,
    )
    .unwrap();

    assert_eq!(config.dispatcher.mps_limit, 1);
    assert_eq!(config.dispatcher.window_secs, 30);
    assert_eq!(config.dispatcher.send_timeout_secs, 30);
    assert!(matches!(
        config.suppression,
        SuppressionConfig::File { ref path } if path.ends_with("suppression.list")
    ));
    let DeliveryConfig::SendGrid {
        api_key,
        from_name,
        reply_to,
        ..
    } = &config.delivery
    else {
        panic!("expected a SendGrid delivery section");
    };
    assert_eq!(api_key, "SG.test");
    assert_eq!(from_name.as_deref(), Some("Funding Team"));
    assert!(reply_to.is_none());
    assert_eq!(config.server.listen_address, "127.0.0.1:9000");
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.endpoint, "http://localhost:4318/v1/metrics");
}

#[test]
fn test_bundled_config_parses() {
    let content = std::fs::read_to_string(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../outreach.config.ron"
    ))
    .unwrap();
    let config: Outreach = ron::from_str(&content).unwrap();

    assert!(config.dispatcher.validate().is_ok());
    assert!(matches!(config.delivery, DeliveryConfig::Log));
    assert_eq!(config.server.api_token.as_deref(), Some("dev-token"));
}

#[test]
fn test_delivery_client_builds_from_config() {
    let config: Outreach = ron::from_str(
        r#"(delivery: SendGrid (api_key: "SG.test", from_email: "Team@Example.com"))"#,
    )
    .unwrap();

    let client = config.delivery.build().unwrap();
    assert_eq!(client.name(), "sendgrid");
}

#[tokio::test]
async fn test_file_suppression_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suppression.list");
    let config: Outreach =
        ron::from_str(&format!(r#"(suppression: File (path: {path:?}))"#)).unwrap();

    let registry = outreach_delivery::SuppressionRegistry::from_config(&config.suppression)
        .await
        .unwrap();
    assert!(registry.add("Someone@Example.com").await.unwrap());
    assert!(registry.is_suppressed("someone@example.com").await.unwrap());
}
