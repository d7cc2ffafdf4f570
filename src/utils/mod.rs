//! Utility modules: locking, retry, timeouts and logging

pub mod lock;
pub mod logging;
pub mod retry;
pub mod timeout;

// Re-export commonly used items
pub use lock::{with_read_lock, with_write_lock};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use retry::{retry_if_retryable, IsRetryable, RetryConfig};
pub use timeout::{with_custom_timeout, with_optional_timeout};
