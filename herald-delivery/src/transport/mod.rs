//! Outbound email providers.
//!
//! A transport performs exactly one send per call and classifies the result.
//! It carries no resilience logic of its own: retries, breaking and
//! timeouts are applied around it by the [`crate::Dispatcher`].

pub mod http;
pub mod smtp;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use herald_common::Message;
use serde::Deserialize;

pub use self::{
    http::{HttpTransport, HttpTransportConfig},
    smtp::{SmtpTls, SmtpTransport, SmtpTransportConfig},
    test::{Scripted, TestTransport},
};
use crate::DeliveryError;

#[async_trait]
pub trait EmailTransport: Send + Sync + Debug {
    /// Short provider name, recorded in every attempt log entry
    fn name(&self) -> &str;

    /// Hand `message` to the provider.
    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// The provider used by a dispatcher, chosen once at start-up.
///
/// # Examples
///
/// ```ron
/// transport: Smtp(
///     host: "mail.example.com",
///     port: 587,
///     tls: StartTls,
///     username: Some("herald"),
///     password: Some("secret"),
///     from_address: "noreply@example.com",
/// ),
/// ```
///
/// ```ron
/// transport: Http(
///     endpoint: "https://api.sendgrid.com/v3/mail/send",
///     api_key: "SG.xxxx",
///     from_address: "noreply@example.com",
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum TransportConfig {
    Smtp(SmtpTransportConfig),
    Http(HttpTransportConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Smtp(SmtpTransportConfig::default())
    }
}

impl TransportConfig {
    /// Build the configured transport.
    ///
    /// # Errors
    ///
    /// Returns a system error if the sender address, TLS setup or HTTP client
    /// is unusable.
    pub fn into_transport(self) -> Result<Arc<dyn EmailTransport>, DeliveryError> {
        Ok(match self {
            Self::Smtp(config) => Arc::new(SmtpTransport::new(config)?),
            Self::Http(config) => Arc::new(HttpTransport::new(config)?),
        })
    }
}
