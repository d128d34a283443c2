//! The outbound email handed to a transport.

use std::fmt;

use mailparse::MailAddr;
use serde::Serialize;

use crate::error::MessageError;

/// A fully composed email.
///
/// Fields are fixed at construction; a transport only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    recipient: String,
    subject: String,
    body: String,
    correlation_id: String,
}

impl Message {
    /// Build a message, validating that `recipient` is exactly one mailbox.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] if the recipient does not parse as a single
    /// address, the subject is blank, or the subject or correlation id
    /// contains a line break.
    pub fn new(
        recipient: impl AsRef<str>,
        subject: impl Into<String>,
        body: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Result<Self, MessageError> {
        let recipient = parse_recipient(recipient.as_ref())?;
        let subject = subject.into();
        let correlation_id = correlation_id.into();

        if subject.trim().is_empty() {
            return Err(MessageError::EmptySubject);
        }
        if has_line_break(&subject) {
            return Err(MessageError::LineBreak("subject"));
        }
        if has_line_break(&correlation_id) {
            return Err(MessageError::LineBreak("correlation id"));
        }

        Ok(Self {
            recipient,
            subject,
            body: body.into(),
            correlation_id,
        })
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.correlation_id, self.recipient)
    }
}

fn parse_recipient(raw: &str) -> Result<String, MessageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MessageError::InvalidRecipient(String::new()));
    }

    let parsed =
        mailparse::addrparse(raw).map_err(|_| MessageError::InvalidRecipient(raw.to_string()))?;

    match parsed.len() {
        1 => match &parsed[0] {
            MailAddr::Single(info) if is_mailbox(&info.addr) => Ok(info.addr.clone()),
            _ => Err(MessageError::InvalidRecipient(raw.to_string())),
        },
        0 => Err(MessageError::InvalidRecipient(raw.to_string())),
        n => Err(MessageError::MultipleRecipients(n)),
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

fn is_mailbox(addr: &str) -> bool {
    addr.split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
}
