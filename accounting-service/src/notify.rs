//! Notification collaborators.
//!
//! The reminder engine only decides whether and what to send. Transport is
//! behind [`EmailSender`] and [`SmsSender`]; delivery is best-effort and a
//! failure is reported as a value, never as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::error::{AccountingError, AccountingResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, text: &str, html: &str) -> DeliveryResult;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult;
}

/// Channel with no transport configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSender;

#[async_trait]
impl EmailSender for DisabledSender {
    async fn send_email(&self, _to: &str, _subject: &str, _text: &str, _html: &str) -> DeliveryResult {
        DeliveryResult::failed("channel disabled")
    }
}

#[async_trait]
impl SmsSender for DisabledSender {
    async fn send_sms(&self, _to: &str, _message: &str) -> DeliveryResult {
        DeliveryResult::failed("channel disabled")
    }
}

fn webhook_client(timeout: Duration) -> AccountingResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AccountingError::Validation(format!("failed to build webhook client: {e}")))
}

async fn post_json(client: &reqwest::Client, url: &str, body: serde_json::Value) -> DeliveryResult {
    match client.post(url).json(&body).send().await {
        Ok(response) if response.status().is_success() => DeliveryResult::delivered(),
        Ok(response) => DeliveryResult::failed(format!("webhook returned {}", response.status())),
        Err(e) => DeliveryResult::failed(e.to_string()),
    }
}

/// POSTs `{to, subject, text, html}` to an email gateway
#[derive(Debug, Clone)]
pub struct WebhookEmailSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookEmailSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AccountingResult<Self> {
        Ok(Self {
            client: webhook_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send_email(&self, to: &str, subject: &str, text: &str, html: &str) -> DeliveryResult {
        let body = serde_json::json!({
            "to": to,
            "subject": subject,
            "text": text,
            "html": html,
        });
        post_json(&self.client, &self.url, body).await
    }
}

/// POSTs `{to, message}` to an SMS gateway
#[derive(Debug, Clone)]
pub struct WebhookSmsSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSmsSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AccountingResult<Self> {
        Ok(Self {
            client: webhook_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SmsSender for WebhookSmsSender {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult {
        let body = serde_json::json!({ "to": to, "message": message });
        post_json(&self.client, &self.url, body).await
    }
}

/// Email transport from config: webhook when a URL is set, otherwise disabled.
pub fn email_sender_from_config(config: &NotificationConfig) -> AccountingResult<Arc<dyn EmailSender>> {
    let sender: Arc<dyn EmailSender> = match &config.email_webhook_url {
        Some(url) => Arc::new(WebhookEmailSender::new(url.clone(), Duration::from_secs(config.timeout_secs))?),
        None => Arc::new(DisabledSender),
    };
    Ok(sender)
}

/// SMS transport from config: webhook when a URL is set, otherwise disabled.
pub fn sms_sender_from_config(config: &NotificationConfig) -> AccountingResult<Arc<dyn SmsSender>> {
    let sender: Arc<dyn SmsSender> = match &config.sms_webhook_url {
        Some(url) => Arc::new(WebhookSmsSender::new(url.clone(), Duration::from_secs(config.timeout_secs))?),
        None => Arc::new(DisabledSender),
    };
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sender_reports_failure() {
        let sender = DisabledSender;
        let email = sender.send_email("a@b.co", "s", "t", "<p>t</p>").await;
        assert!(!email.success);
        assert_eq!(email.error.as_deref(), Some("channel disabled"));
        assert!(!sender.send_sms("+254700000000", "m").await.success);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_a_delivery_failure() {
        let sender = WebhookSmsSender::new("http://127.0.0.1:9/sms", Duration::from_millis(200)).unwrap();
        let result = sender.send_sms("+254700000000", "hello").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
