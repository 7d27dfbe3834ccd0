//! In-memory object store for development and tests.

use async_trait::async_trait;
use cellcache_core::ports::ObjectStore;
use cellcache_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A failure injected into every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    PermissionDenied(String),
    Unreachable(String),
}

impl Fault {
    fn to_error(&self, op: &str) -> Error {
        match self {
            Fault::PermissionDenied(reason) => Error::RemotePermission(format!("{}: {}", op, reason)),
            Fault::Unreachable(reason) => Error::RemoteConnectivity(format!("{}: {}", op, reason)),
        }
    }
}

/// Object store backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fault: Mutex<Option<Fault>>,
    op_faults: Mutex<HashMap<&'static str, Fault>>,
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every following call fail, or clear the fault with `None`.
    pub fn set_fault(&self, fault: Option<Fault>) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = fault;
    }

    /// Make only calls to `op` (`list`, `get`, `put`, `exists`, `delete`) fail.
    pub fn set_fault_for(&self, op: &'static str, fault: Option<Fault>) {
        let mut faults = self.op_faults.lock().unwrap_or_else(PoisonError::into_inner);
        match fault {
            Some(fault) => faults.insert(op, fault),
            None => faults.remove(op),
        };
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects().insert(key.to_string(), data);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let fault = self
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .or_else(|| {
                self.op_faults
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(op)
                    .cloned()
            });
        match fault {
            Some(fault) => Err(fault.to_error(op)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.enter("list").await?;
        Ok(self
            .objects()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter("get").await?;
        Ok(self.objects().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.enter("put").await?;
        self.objects().insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.enter("exists").await?;
        Ok(self.objects().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.enter("delete").await?;
        self.objects().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
