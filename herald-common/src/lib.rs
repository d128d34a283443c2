pub mod attempt;
pub mod audit;
pub mod error;
pub mod logging;
pub mod message;

pub use attempt::DeliveryAttemptLog;
pub use error::MessageError;
pub use message::Message;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
