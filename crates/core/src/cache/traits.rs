use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Key-value cache with per-entry expiry.
///
/// Values are opaque bytes. An expired entry behaves exactly like a missing
/// one.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets a live value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value, replacing any previous one, expiring `ttl` from now.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes a single key.
    async fn invalidate(&self, key: &str) -> Result<()>;

    /// Removes every key starting with `prefix`.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<()>;
}
