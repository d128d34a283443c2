//! What went wrong talking to the mail provider, and whether trying again
//! could help.
//!
//! | Kind        | SMTP               | HTTP                   | Retried |
//! |-------------|--------------------|------------------------|---------|
//! | `Permanent` | 5xx                | 4xx except 408 and 429 | no      |
//! | `Temporary` | 4xx, I/O, hang-up  | 408, 429, 5xx, network | yes     |
//! | `System`    | client misuse      | request building       | no      |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("Transport fault: {0}")]
    System(#[from] SystemError),
}

/// The provider refused this message; sending it again will be refused again
#[derive(Debug, Error)]
pub enum PermanentError {
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// Bad or revoked credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Could not reach the provider, or it dropped the connection
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// The provider is up but refused to take work right now
    #[error("Provider busy: {0}")]
    ServerBusy(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Herald's own side of the exchange is broken
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl DeliveryError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl From<lettre::transport::smtp::Error> for DeliveryError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        let detail = error.to_string();

        if error.is_permanent() {
            match error.status().map(|code| code.to_string()).as_deref() {
                Some("530" | "535") => PermanentError::AuthenticationFailed(detail).into(),
                _ => PermanentError::MessageRejected(detail).into(),
            }
        } else if error.is_transient() {
            TemporaryError::ServerBusy(detail).into()
        } else if timed_out(&error) {
            TemporaryError::Timeout(detail).into()
        } else if error.is_client() {
            SystemError::Protocol(detail).into()
        } else {
            TemporaryError::Unreachable(detail).into()
        }
    }
}

fn timed_out(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(current) = source {
        if current
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return true;
        }
        source = current.source();
    }
    false
}

impl From<lettre::address::AddressError> for DeliveryError {
    fn from(error: lettre::address::AddressError) -> Self {
        PermanentError::MessageRejected(format!("unusable recipient: {error}")).into()
    }
}

impl From<lettre::error::Error> for DeliveryError {
    fn from(error: lettre::error::Error) -> Self {
        SystemError::Configuration(format!("could not build message: {error}")).into()
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            SystemError::Configuration(error.to_string()).into()
        } else if timed_out(&error) {
            TemporaryError::Timeout(error.to_string()).into()
        } else {
            TemporaryError::Unreachable(error.to_string()).into()
        }
    }
}
