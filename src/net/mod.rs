//! Network helpers
//!
//! Timeouts and UDP port allocation shared by the session and the mock
//! receiver.

mod ports;


pub use ports::{PortBlock, bind_port_block, resolve_host};

use std::future::Future;

/// Runtime abstraction for common operations
pub struct Runtime;

impl Runtime {
    /// Run a future with a timeout
    ///
    /// # Errors
    ///
    /// Returns `TimeoutError` if the future does not complete within the specified duration.
    pub async fn timeout<F, T>(duration: std::time::Duration, future: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(duration, future)
            .await
            .map_err(|_| TimeoutError)
    }

    /// Get current timestamp
    #[must_use]
    pub fn now() -> tokio::time::Instant {
        tokio::time::Instant::now()
    }
}

/// Timeout error
#[derive(Debug, Clone, Copy)]
pub struct TimeoutError;

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out")
    }
}

impl std::error::Error for TimeoutError {}
