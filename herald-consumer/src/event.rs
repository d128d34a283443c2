//! Typed inbound events.
//!
//! Payloads are JSON objects discriminated by `eventType`. Unknown fields
//! are ignored so producers can add fields without breaking consumers.

use std::fmt;

use serde::Deserialize;

use crate::error::ConsumerError;

/// The kinds of event a consumer can be configured to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum EventFamily {
    UserRegistered,
    ApplicationSubmitted,
}

impl EventFamily {
    /// Value of `eventType` carried by events of this family
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::UserRegistered => "UserRegistered",
            Self::ApplicationSubmitted => "APPLICATION_SUBMITTED",
        }
    }

    #[must_use]
    pub const fn default_topic(self) -> &'static str {
        match self {
            Self::UserRegistered => "user-events",
            Self::ApplicationSubmitted => "application-events",
        }
    }
}

impl fmt::Display for EventFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// A new account needs its email address verified
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub user_id: String,
    pub email: String,
    pub verification_token: String,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// An applicant submitted a job application
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubmitted {
    pub application_id: String,
    pub user_id: String,
    pub applicant_email: String,
    pub job_title: String,
    pub company_name: String,
    #[serde(default)]
    pub applicant_name: Option<String>,
    #[serde(default)]
    pub applied_date: Option<String>,
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    UserRegistered(UserRegistered),
    ApplicationSubmitted(ApplicationSubmitted),
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "eventType")]
    event_type: Option<String>,
}

impl Event {
    /// Decode `raw` as an event of `family`.
    ///
    /// # Errors
    ///
    /// [`ConsumerError::MalformedEvent`] if the payload is not a JSON object,
    /// lacks `eventType`, or lacks a field the family requires.
    /// [`ConsumerError::UnknownEventType`] if `eventType` names some other
    /// kind of event.
    pub fn parse(raw: &[u8], family: EventFamily) -> Result<Self, ConsumerError> {
        let Discriminator { event_type } = serde_json::from_slice(raw)?;

        let event_type = event_type
            .ok_or_else(|| ConsumerError::MalformedEvent("missing eventType".to_string()))?;

        if event_type != family.event_type() {
            return Err(ConsumerError::UnknownEventType(event_type));
        }

        Ok(match family {
            EventFamily::UserRegistered => Self::UserRegistered(serde_json::from_slice(raw)?),
            EventFamily::ApplicationSubmitted => {
                Self::ApplicationSubmitted(serde_json::from_slice(raw)?)
            }
        })
    }

    #[must_use]
    pub const fn family(&self) -> EventFamily {
        match self {
            Self::UserRegistered(_) => EventFamily::UserRegistered,
            Self::ApplicationSubmitted(_) => EventFamily::ApplicationSubmitted,
        }
    }

    /// Identifier tying this event to the attempt log; the user the email is for
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::UserRegistered(event) => &event.user_id,
            Self::ApplicationSubmitted(event) => &event.user_id,
        }
    }
}
