//! Publish transport abstraction
//!
//! A transport takes the final text of a candidate and either returns the
//! external post identifier or a [`TransportError`] describing why it failed.
//! Network clients for specific platforms live outside this crate; the
//! [`command::CommandTransport`] adapter lets any command-line poster act as a
//! transport.
//!
//! # Examples
//!
//! ```
//! use libquotacast::transport::{mock::MockTransport, PublishTransport};
//!
//! # async fn example() {
//! let transport = MockTransport::success("mock");
//! let id = transport.post("Hello").await.unwrap();
//! assert!(id.starts_with("mock-"));
//! # }
//! ```

use async_trait::async_trait;

use crate::error::TransportError;

pub mod command;

// Mock transport is available for all builds (not just tests) to support integration tests
pub mod mock;

/// External publish mechanism
#[async_trait]
pub trait PublishTransport: Send + Sync {
    /// Publish `text` and return the external post identifier
    ///
    /// # Errors
    ///
    /// - `TransportError::Forbidden` when credentials lack permission; never retried
    /// - `TransportError::RateLimited` when the platform asks the caller to back off
    /// - `TransportError::Network` / `TransportError::Posting` for other, transient failures
    async fn post(&self, text: &str) -> Result<String, TransportError>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}
