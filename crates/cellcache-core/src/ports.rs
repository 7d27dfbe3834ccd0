//! Port traits (hexagonal architecture).
//!
//! Adapters for object-store backends implement these traits; the cache
//! manager only ever talks to them through a `RemoteStore`.

use crate::Result;
use async_trait::async_trait;

/// Flat object storage addressed by full object keys.
///
/// Implementations must report access problems as
/// [`Error::RemotePermission`](crate::Error::RemotePermission) and transport
/// problems as [`Error::RemoteConnectivity`](crate::Error::RemoteConnectivity).
/// A missing object is `Ok(None)` from `get`, never an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List object keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch an object.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object, replacing any previous content.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
