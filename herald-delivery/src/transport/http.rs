//! JSON mail API transport (SendGrid v3 compatible payload).

use std::time::Duration;

use async_trait::async_trait;
use herald_common::{Message, outbound};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::EmailTransport;
use crate::{
    DeliveryError,
    error::{PermanentError, TemporaryError},
};

#[derive(Debug, Clone, Deserialize)]
pub struct HttpTransportConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Sent as a bearer token
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default)]
    pub from_name: Option<String>,

    /// Whole-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            from_address: default_from_address(),
            from_name: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

const fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns a system error if the HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, message: &Message) -> serde_json::Value {
        let mut from = json!({ "email": self.config.from_address });
        if let Some(name) = &self.config.from_name {
            from["name"] = json!(name);
        }

        json!({
            "personalizations": [{
                "to": [{ "email": message.recipient() }],
            }],
            "from": from,
            "subject": message.subject(),
            "content": [{
                "type": "text/html",
                "value": message.body(),
            }],
            "custom_args": {
                "correlation_id": message.correlation_id(),
            },
        })
    }
}

#[async_trait]
impl EmailTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        let status = response.status();
        outbound!(
            correlation_id = %message.correlation_id(),
            status = status.as_u16(),
            "Mail API responded"
        );

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }
}

/// Map a non-2xx status onto the delivery error taxonomy
fn classify(status: StatusCode, body: &str) -> DeliveryError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => TemporaryError::RateLimited(detail).into(),
        StatusCode::REQUEST_TIMEOUT => TemporaryError::Timeout(detail).into(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PermanentError::AuthenticationFailed(detail).into()
        }
        s if s.is_server_error() => TemporaryError::ServerBusy(detail).into(),
        _ => PermanentError::MessageRejected(detail).into(),
    }
}
