use crate::vault::VaultError;
use async_trait::async_trait;
use serde_json::Value;

/// Logical key/value operations against Vault, keyed by path relative to `/v1/`.
///
/// Implemented by [`crate::vault::VaultClient`]; tests substitute in-memory stores.
#[async_trait]
pub trait Logical: Send + Sync {
    /// Reads the `data` section stored at `path`, or `None` if nothing is there.
    async fn read(&self, path: &str) -> Result<Option<Value>, VaultError>;

    /// Writes `data` to `path`, returning the response `data` section, if any.
    async fn write(&self, path: &str, data: Value) -> Result<Option<Value>, VaultError>;

    /// Deletes whatever is stored at `path`.
    async fn delete(&self, path: &str) -> Result<(), VaultError>;
}
