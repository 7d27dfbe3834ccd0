//! Object-store tier.
//!
//! [`RemoteStore`] gives an [`ObjectStore`] adapter the same blocking
//! surface as the local tier. Every call runs on a private tokio runtime and
//! is bounded by a timeout; an expired call is a connectivity error.
//!
//! Callers already running inside a tokio runtime may use the store too:
//! the call is then driven from a short-lived helper thread, and the private
//! runtime is shut down without blocking when the store is dropped.

pub mod memory;
pub mod s3;

pub use memory::{Fault, MemoryObjectStore};
pub use s3::S3ObjectStore;

use crate::types::CacheKey;
use cellcache_core::ports::ObjectStore;
use cellcache_core::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

/// Bucket and key prefix of the remote root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation {
    pub bucket: String,
    /// Key prefix without leading or trailing slashes; may be empty.
    pub prefix: String,
}

impl RemoteLocation {
    /// Parse `bucket[/prefix]`, optionally with an `s3://` scheme.
    pub fn parse(root: &str) -> Result<Self> {
        let trimmed = root.strip_prefix("s3://").unwrap_or(root).trim_end_matches('/');
        let (bucket, prefix) = match trimmed.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (trimmed, ""),
        };

        if bucket.is_empty() {
            return Err(Error::Configuration(format!(
                "remote root '{}' has no bucket",
                root
            )));
        }
        if bucket.chars().any(|c| c.is_whitespace()) {
            return Err(Error::Configuration(format!(
                "invalid bucket name '{}'",
                bucket
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Prefix used to list the remote root.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Full object key of an entry.
    pub fn object_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.list_prefix(), key.file_name())
    }
}

/// Blocking facade over an object store rooted at a [`RemoteLocation`].
pub struct RemoteStore {
    store: Arc<dyn ObjectStore>,
    location: RemoteLocation,
    timeout: Duration,
    // Only taken in `Drop`
    runtime: Option<Runtime>,
}

impl RemoteStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        location: RemoteLocation,
        timeout: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("cellcache-remote")
            .enable_all()
            .build()?;

        Ok(Self {
            store,
            location,
            timeout,
            runtime: Some(runtime),
        })
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }

    pub fn backend(&self) -> &str {
        self.store.name()
    }

    fn run<T: Send>(&self, op: &str, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| Error::Internal("remote runtime already shut down".into()))?;
        let timeout = self.timeout;
        let bounded = async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::RemoteConnectivity(format!(
                    "{} timed out after {:?}",
                    op, timeout
                ))),
            }
        };

        if Handle::try_current().is_err() {
            return runtime.block_on(bounded);
        }

        // block_on panics on a thread that is already driving a runtime
        thread::scope(|scope| {
            scope
                .spawn(|| runtime.block_on(bounded))
                .join()
                .unwrap_or_else(|_| Err(Error::Internal(format!("remote {} panicked", op))))
        })
    }

    /// Probe the remote root by listing it.
    pub fn probe(&self) -> Result<()> {
        let prefix = self.location.list_prefix();
        self.run("probe", self.store.list(&prefix)).map(|_| ())
    }

    pub fn reachable(&self) -> bool {
        self.probe().is_ok()
    }

    pub fn has(&self, key: &CacheKey) -> Result<bool> {
        let object = self.location.object_key(key);
        self.run("exists", self.store.exists(&object))
    }

    /// Fetch an entry; a missing entry is [`Error::NotFound`].
    pub fn get(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let object = self.location.object_key(key);
        self.run("get", self.store.get(&object))?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn put(&self, key: &CacheKey, data: Vec<u8>) -> Result<()> {
        let object = self.location.object_key(key);
        let size = data.len();
        self.run("put", self.store.put(&object, data))?;
        debug!(key = %key, size, backend = self.store.name(), "Uploaded remote entry");
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        let object = self.location.object_key(key);
        self.run("delete", self.store.delete(&object))
    }

    /// Entry keys directly under the remote root, sorted.
    pub fn list(&self) -> Result<Vec<CacheKey>> {
        let prefix = self.location.list_prefix();
        let objects = self.run("list", self.store.list(&prefix))?;
        let mut keys: Vec<CacheKey> = objects
            .iter()
            .filter_map(|object| object.strip_prefix(&prefix))
            .filter_map(CacheKey::from_file_name)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Delete every object under the remote root.
    pub fn clear(&self) -> Result<usize> {
        let prefix = self.location.list_prefix();
        let objects = self.run("list", self.store.list(&prefix))?;
        for object in &objects {
            self.run("delete", self.store.delete(object))?;
        }
        Ok(objects.len())
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        // A blocking shutdown panics inside an async context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
