//! SMTP submission through a relay.
//!
//! The relay connection is described once at start-up and every send opens
//! a fresh session. Encoding, dot-stuffing and the dialogue itself are left
//! to `lettre`.

use std::time::Duration;

use async_trait::async_trait;
use herald_common::{Message, outbound};
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{
        Body, Mailbox,
        header::{ContentTransferEncoding, ContentType, Header, HeaderName, HeaderValue},
    },
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        extension::ClientId,
    },
};
use serde::Deserialize;

use super::EmailTransport;
use crate::{
    DeliveryError,
    error::{SystemError, TemporaryError},
};

/// How the session with the relay is secured
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SmtpTls {
    /// Plain text; only for relays on a trusted network
    Plain,

    /// Upgrade with STARTTLS, refusing to continue without it
    #[default]
    StartTls,

    /// TLS from the first byte (usually port 465)
    Wrapper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTransportConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: SmtpTls,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Name announced in EHLO and used for Message-ID
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default)]
    pub from_name: Option<String>,

    /// Upper bound on one whole session, connect to QUIT (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpTransportConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: SmtpTls::default(),
            username: None,
            password: None,
            helo_name: default_helo_name(),
            from_address: default_from_address(),
            from_name: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    587
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

const fn default_timeout() -> u64 {
    30
}

/// `X-Correlation-ID`, carried so a bounce can be traced back to its event
#[derive(Debug, Clone)]
struct CorrelationId(String);

impl Header for CorrelationId {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Correlation-ID")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

#[derive(Debug)]
pub struct SmtpTransport {
    config: SmtpTransportConfig,
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Validate the sender and describe the relay connection.
    ///
    /// Nothing is dialled until the first send.
    pub fn new(config: SmtpTransportConfig) -> Result<Self, DeliveryError> {
        let address: Address = config.from_address.parse().map_err(|e| {
            SystemError::Configuration(format!("from_address {}: {e}", config.from_address))
        })?;
        let from = Mailbox::new(config.from_name.clone(), address);

        let tls = match config.tls {
            SmtpTls::Plain => Tls::None,
            SmtpTls::StartTls => Tls::Required(tls_parameters(&config.host)?),
            SmtpTls::Wrapper => Tls::Wrapper(tls_parameters(&config.host)?),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls)
            .hello_name(ClientId::Domain(config.helo_name.clone()))
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (None, None) => {}
            _ => {
                return Err(SystemError::Configuration(
                    "username and password must be set together".to_string(),
                )
                .into());
            }
        }

        Ok(Self {
            from,
            mailer: builder.build(),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SmtpTransportConfig {
        &self.config
    }

    fn compose(&self, message: &Message) -> Result<lettre::Message, DeliveryError> {
        let to: Address = message.recipient().parse()?;

        let body = Body::new_with_encoding(message.body().to_string(), ContentTransferEncoding::EightBit)
            .unwrap_or_else(Body::new);

        Ok(lettre::Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to))
            .subject(message.subject())
            .message_id(Some(format!(
                "<{}@{}>",
                ulid::Ulid::new(),
                self.config.helo_name
            )))
            .header(CorrelationId(message.correlation_id().to_string()))
            .header(ContentType::TEXT_HTML)
            .body(body)?)
    }
}

fn tls_parameters(host: &str) -> Result<TlsParameters, DeliveryError> {
    TlsParameters::new(host.to_string())
        .map_err(|e| SystemError::Configuration(format!("TLS for {host}: {e}")).into())
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let email = self.compose(message)?;

        let response = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.mailer.send(email),
        )
        .await
        .map_err(|_| {
            TemporaryError::Timeout(format!("SMTP session with {}", self.config.host))
        })??;

        outbound!(
            level = DEBUG,
            correlation_id = %message.correlation_id(),
            relay = %self.config.host,
            code = %response.code(),
            "Relay accepted message"
        );

        Ok(())
    }
}
