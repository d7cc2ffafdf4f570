//! Lock utilities for async contexts
//!
//! Helpers for the read/write pattern on the module database lock, with
//! automatic release when the closure returns.

use tokio::sync::RwLock;

/// Execute a closure with a read lock, automatically releasing it
///
/// # Example
/// ```rust,ignore
/// let count = with_read_lock(&database, |db| db.modules().count()).await;
/// ```
pub async fn with_read_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&T) -> R,
{
    let guard = rwlock.read().await;
    f(&guard)
}

/// Execute a closure with a write lock, automatically releasing it
///
/// # Example
/// ```rust,ignore
/// with_write_lock(&database, |db| db.uninstall(id)).await?;
/// ```
pub async fn with_write_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&mut T) -> R,
{
    let mut guard = rwlock.write().await;
    f(&mut guard)
}
