//! Timeout utilities
//!
//! Wrappers for operations that might hang, such as waiting on a listener
//! channel or on an activator.

use std::time::Duration;
use tokio::time::timeout;

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}

/// Execute operation with an optional timeout; `None` waits indefinitely
pub async fn with_optional_timeout<F, T>(
    operation: F,
    duration: Option<Duration>,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    match duration {
        Some(duration) => timeout(duration, operation).await,
        None => Ok(operation.await),
    }
}
