mod bridge;
pub mod controller;

pub use bridge::forward;
pub use controller::{Herald, SHUTDOWN_BROADCAST, Service};
