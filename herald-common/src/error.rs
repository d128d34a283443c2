use thiserror::Error;

/// Reasons a [`crate::Message`] could not be composed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Expected a single recipient, found {0}")]
    MultipleRecipients(usize),

    #[error("Message subject is empty")]
    EmptySubject,

    /// A value bound for a header contains a line break
    #[error("Line break in {0}")]
    LineBreak(&'static str),
}
