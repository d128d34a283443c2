//! Test support utilities for transport integration tests

pub mod http_server;
pub mod mock_server;

pub use http_server::MockHttpServer;
pub use mock_server::{MockSmtpServer, SmtpCommand};
