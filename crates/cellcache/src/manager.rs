//! Two-tier cache manager.
//!
//! Reads go local first, then remote; misses are computed, written locally
//! and written through to the remote tier. Local failures are returned to the
//! caller. Remote failures are logged and absorbed, and a permission failure
//! turns the remote tier off for the rest of the process.

use crate::codec::{decode, encode};
use crate::config::CacheConfig;
use crate::keys::derive_key;
use crate::local::LocalStore;
use crate::remote::{RemoteStore, S3ObjectStore};
use crate::types::{
    CacheKey, CacheMetrics, CacheStats, ClearOutcome, CompressionType, RemoteStatus, SyncReport,
};
use cellcache_core::ports::ObjectStore;
use cellcache_core::{CallArgs, Error, Result};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// Why the remote tier was turned off at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeKind {
    PermissionDenied,
    Unreachable,
}

/// Non-fatal problem found while probing the remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWarning {
    pub kind: DegradeKind,
    /// Underlying cause as reported by the backend.
    pub message: String,
}

impl fmt::Display for RemoteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DegradeKind::PermissionDenied => "remote cache access denied",
            DegradeKind::Unreachable => "remote cache unreachable",
        };
        write!(f, "{}, continuing with local cache only: {}", what, self.message)
    }
}

/// Outcome of constructing a manager with a remote tier.
#[derive(Debug)]
pub enum Construction {
    /// All configured tiers are usable.
    Ready(CacheManager),
    /// The remote tier is disabled; the manager works locally.
    Degraded {
        manager: CacheManager,
        warning: RemoteWarning,
    },
}

impl Construction {
    pub fn into_manager(self) -> CacheManager {
        match self {
            Construction::Ready(manager) => manager,
            Construction::Degraded { manager, .. } => manager,
        }
    }

    pub fn warning(&self) -> Option<&RemoteWarning> {
        match self {
            Construction::Ready(_) => None,
            Construction::Degraded { warning, .. } => Some(warning),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.warning().is_some()
    }
}

/// Per-key lock collapsing concurrent misses. The owner is tracked so a
/// computation that asks for its own key recomputes instead of deadlocking.
#[derive(Default)]
struct KeyLock {
    fill: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl KeyLock {
    fn held_by_current_thread(&self) -> bool {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    fn set_owner(&self, owner: Option<ThreadId>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = owner;
    }
}

/// Memoizes computation results in a local directory and an optional
/// object-store mirror.
pub struct CacheManager {
    local: LocalStore,
    remote: Option<RemoteStore>,
    remote_status: RwLock<RemoteStatus>,
    compression: CompressionType,
    inflight: DashMap<CacheKey, Arc<KeyLock>>,
    metrics: CacheMetrics,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("local_root", &self.local.root())
            .field("remote", &self.remote.as_ref().map(|r| r.location()))
            .field("remote_status", &self.remote_status())
            .field("compression", &self.compression)
            .finish()
    }
}

impl CacheManager {
    /// Local-only manager on an existing directory.
    pub fn new(local_root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let local = LocalStore::open(local_root)?;
        Ok(Self::assemble(local, None, CompressionType::default()))
    }

    /// Build a manager from configuration, probing the remote tier if one is
    /// configured.
    ///
    /// Malformed remote settings are an error. An unreachable or forbidden
    /// remote is not: the manager comes back as [`Construction::Degraded`].
    pub fn open(config: CacheConfig) -> Result<Construction> {
        let remote = match &config.remote {
            Some(remote) => {
                let store = Arc::new(S3ObjectStore::new(remote)?);
                Some(RemoteStore::new(store, remote.location()?, remote.timeout)?)
            }
            None => None,
        };
        Self::with_remote_store(config, remote)
    }

    /// Build a manager on a caller-supplied object store. The connection
    /// settings in `config.remote` are ignored apart from the root and timeout.
    pub fn with_object_store(
        config: CacheConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Construction> {
        let remote = match &config.remote {
            Some(remote) => Some(RemoteStore::new(store, remote.location()?, remote.timeout)?),
            None => {
                return Err(Error::Configuration(
                    "an object store needs a remote root".into(),
                ));
            }
        };
        Self::with_remote_store(config, remote)
    }

    fn with_remote_store(config: CacheConfig, remote: Option<RemoteStore>) -> Result<Construction> {
        let local = LocalStore::open(&config.local_root)?;

        let Some(remote) = remote else {
            return Ok(Construction::Ready(Self::assemble(
                local,
                None,
                config.compression,
            )));
        };

        match remote.probe() {
            Ok(()) => {
                info!(
                    local_root = %local.root().display(),
                    bucket = %remote.location().bucket,
                    prefix = %remote.location().prefix,
                    backend = remote.backend(),
                    "Cache manager ready with remote tier"
                );
                Ok(Construction::Ready(Self::assemble(
                    local,
                    Some(remote),
                    config.compression,
                )))
            }
            Err(e) if e.is_remote() => {
                let warning = RemoteWarning {
                    kind: if e.is_permission() {
                        DegradeKind::PermissionDenied
                    } else {
                        DegradeKind::Unreachable
                    },
                    message: e.to_string(),
                };
                warn!(
                    bucket = %remote.location().bucket,
                    error = %e,
                    "{}", warning
                );

                let manager = Self::assemble(local, Some(remote), config.compression);
                *manager.status_mut() = RemoteStatus::Disabled {
                    reason: warning.message.clone(),
                };
                Ok(Construction::Degraded { manager, warning })
            }
            Err(e) => Err(e),
        }
    }

    fn assemble(
        local: LocalStore,
        remote: Option<RemoteStore>,
        compression: CompressionType,
    ) -> Self {
        let status = if remote.is_some() {
            RemoteStatus::Enabled
        } else {
            RemoteStatus::NotConfigured
        };
        Self {
            local,
            remote,
            remote_status: RwLock::new(status),
            compression,
            inflight: DashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// The remote store, whether or not it is currently enabled.
    pub fn remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref()
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.remote_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    fn status_mut(&self) -> std::sync::RwLockWriteGuard<'_, RemoteStatus> {
        self.remote_status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enabled_remote(&self) -> Option<&RemoteStore> {
        if self.remote_status().is_enabled() {
            self.remote.as_ref()
        } else {
            None
        }
    }

    /// Record a remote failure; permission failures disable the tier.
    fn absorb_remote_error(&self, op: &str, key: Option<&CacheKey>, err: &Error) {
        self.metrics.record_remote_failure();
        let key = key.map(|k| k.as_str()).unwrap_or("-");

        if err.is_permission() {
            let mut status = self.status_mut();
            if status.is_enabled() {
                *status = RemoteStatus::Disabled {
                    reason: err.to_string(),
                };
                warn!(op, key, error = %err, "Remote cache access denied, disabling remote tier");
                return;
            }
        }
        warn!(op, key, error = %err, "Remote cache operation failed");
    }

    /// Cached value for a logical key, computing it on a miss.
    ///
    /// Concurrent misses on one key run `compute` once; the other callers
    /// wait and read the stored result. A `compute` that itself asks for the
    /// same key is not blocked: the inner call computes on its own and the
    /// outer result overwrites it.
    pub fn get<T, F>(&self, logical_key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.get_with_args(logical_key, &CallArgs::new(), compute)
    }

    /// Cached value for a logical key and call arguments.
    pub fn get_with_args<T, F>(&self, logical_key: &str, args: &CallArgs, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.try_get_with_args(logical_key, args, || Ok::<T, Error>(compute()))
    }

    /// Like [`get_with_args`](Self::get_with_args) for computations that can
    /// fail. A failed computation caches nothing.
    pub fn try_get_with_args<T, E, F>(
        &self,
        logical_key: &str,
        args: &CallArgs,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let key = derive_key(logical_key, args)?;
        self.get_or_compute(&key, compute)
    }

    fn get_or_compute<T, E, F>(&self, key: &CacheKey, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        if let Some(value) = self.read_local(key)? {
            return Ok(value);
        }

        let lock = self.inflight.entry(key.clone()).or_default().clone();
        let result = if lock.held_by_current_thread() {
            // Re-entered from this key's own computation
            debug!(key = %key, "Recursive lookup, computing without the key lock");
            self.fill(key, compute)
        } else {
            let _guard = lock.fill.lock().unwrap_or_else(PoisonError::into_inner);
            lock.set_owner(Some(thread::current().id()));
            let result = self.fill(key, compute);
            lock.set_owner(None);
            result
        };

        drop(lock);
        self.inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Resolve a local miss while holding the key's in-flight lock.
    fn fill<T, E, F>(&self, key: &CacheKey, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        // A concurrent caller may have filled the entry meanwhile
        if let Some(value) = self.read_local(key)? {
            return Ok(value);
        }

        if let Some(value) = self.read_remote(key)? {
            return Ok(value);
        }

        self.metrics.record_miss();
        debug!(key = %key, "Cache miss, computing");

        let value = compute()?;
        let bytes = encode(&value, self.compression)?;
        self.local.put(key, &bytes)?;
        self.metrics.record_bytes_written(bytes.len() as u64);

        if let Some(remote) = self.enabled_remote() {
            match remote.put(key, bytes) {
                Ok(()) => self.metrics.record_upload(),
                Err(e) => self.absorb_remote_error("put", Some(key), &e),
            }
        }

        Ok(value)
    }

    fn read_local<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let bytes = match self.local.get(key) {
            Ok(bytes) => bytes,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let value = decode(&bytes)?;
        self.metrics.record_local_hit();
        debug!(key = %key, tier = "local", "Cache hit");
        Ok(Some(value))
    }

    /// Pull an entry from the remote tier into the local one.
    fn read_remote<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(remote) = self.enabled_remote() else {
            return Ok(None);
        };

        let bytes = match remote.get(key) {
            Ok(bytes) => bytes,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => {
                self.absorb_remote_error("get", Some(key), &e);
                return Ok(None);
            }
        };

        let value = match decode(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring undecodable remote entry");
                return Ok(None);
            }
        };

        self.local.put(key, &bytes)?;
        self.metrics.record_remote_hit();
        debug!(key = %key, tier = "remote", "Cache hit");
        Ok(Some(value))
    }

    /// Remove one entry from both tiers. Returns whether it was cached locally.
    pub fn invalidate(&self, logical_key: &str, args: &CallArgs) -> Result<bool> {
        let key = derive_key(logical_key, args)?;
        let existed = self.local.remove(&key)?;

        if let Some(remote) = self.enabled_remote()
            && let Err(e) = remote.remove(&key)
        {
            self.absorb_remote_error("delete", Some(&key), &e);
        }

        debug!(key = %key, existed, "Invalidated cache entry");
        Ok(existed)
    }

    /// Remove every local entry. The remote tier is untouched.
    pub fn clear_local(&self) -> Result<usize> {
        let removed = self.local.clear()?;
        info!(root = %self.local.root().display(), removed, "Cleared local cache");
        Ok(removed)
    }

    /// Remove every remote entry. Local entries are untouched.
    pub fn clear_remote(&self) -> Result<ClearOutcome> {
        let Some(remote) = self.enabled_remote() else {
            debug!("Remote tier not available, nothing to clear");
            return Ok(ClearOutcome::RemoteNotConfigured);
        };

        match remote.clear() {
            Ok(removed) => {
                info!(
                    bucket = %remote.location().bucket,
                    prefix = %remote.location().prefix,
                    removed,
                    "Cleared remote cache"
                );
                Ok(ClearOutcome::Cleared { removed })
            }
            Err(e) => {
                self.absorb_remote_error("clear", None, &e);
                Err(e)
            }
        }
    }

    /// Push every local entry missing from the remote tier.
    pub fn sync_to_remote(&self) -> Result<SyncReport> {
        let Some(remote) = self.enabled_remote() else {
            return Err(Error::Configuration("remote tier not configured".into()));
        };

        let existing: HashSet<CacheKey> = match remote.list() {
            Ok(keys) => keys.into_iter().collect(),
            Err(e) => {
                self.absorb_remote_error("list", None, &e);
                return Err(e);
            }
        };

        let mut report = SyncReport::default();
        let local_keys = self.local.list()?;

        for (index, key) in local_keys.iter().enumerate() {
            if existing.contains(key) {
                report.skipped += 1;
                continue;
            }

            let bytes = match self.local.get(key) {
                Ok(bytes) => bytes,
                // Cleared since listing
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            match remote.put(key, bytes) {
                Ok(()) => {
                    self.metrics.record_upload();
                    report.pushed += 1;
                }
                Err(e) => {
                    self.absorb_remote_error("put", Some(key), &e);
                    report.failed += 1;
                    if e.is_permission() {
                        // The tier is off now; entries already mirrored still count as skipped
                        let (present, missing): (Vec<&CacheKey>, Vec<&CacheKey>) = local_keys
                            [index + 1..]
                            .iter()
                            .partition(|k| existing.contains(*k));
                        report.skipped += present.len();
                        report.failed += missing.len();
                        break;
                    }
                }
            }
        }

        info!(
            pushed = report.pushed,
            skipped = report.skipped,
            failed = report.failed,
            "Synced local cache to remote"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::remote::{Fault, MemoryObjectStore};
    use std::collections::HashMap;
    use std::time::Duration;

    fn remote_config() -> RemoteConfig {
        RemoteConfig::new("bucket/cache")
            .with_credentials("my-key", "my-secret")
            .with_endpoint("http://localhost/")
            .with_timeout(Duration::from_secs(2))
    }

    fn with_memory(dir: &tempfile::TempDir, store: Arc<MemoryObjectStore>) -> Construction {
        let config = CacheConfig::new(dir.path()).with_remote(remote_config());
        CacheManager::with_object_store(config, store).unwrap()
    }

    #[test]
    fn test_hit_wins_and_clear_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        assert_eq!(cm.get("k", || 42).unwrap(), 42);
        assert_eq!(cm.get("k", || 99).unwrap(), 42);

        cm.clear_local().unwrap();
        assert_eq!(cm.get("k", || 99).unwrap(), 99);

        let stats = cm.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.local_hits, 1);
    }

    #[test]
    fn test_new_does_not_create_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            CacheManager::new(&missing),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_args_select_distinct_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        let three = CallArgs::new().arg(3);
        let six = CallArgs::new().arg(6);
        let a: Vec<f64> = cm.get_with_args("calc", &three, || vec![0.5; 3]).unwrap();
        let b: Vec<f64> = cm.get_with_args("calc", &six, || vec![1.5; 6]).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 6);

        let again: Vec<f64> = cm.get_with_args("calc", &three, || vec![]).unwrap();
        assert_eq!(again, a);
        assert_eq!(cm.local().list().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_compute_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        let result: std::result::Result<i32, Error> =
            cm.try_get_with_args("k", &CallArgs::new(), || {
                Err(Error::Internal("boom".into()))
            });
        assert!(result.is_err());
        assert!(cm.local().list().unwrap().is_empty());
    }

    #[test]
    fn test_unrepresentable_argument_fails_before_compute() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        let args = CallArgs::new().arg(f64::NAN);
        let mut called = false;
        let result = cm.get_with_args("k", &args, || {
            called = true;
            1
        });
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
        assert!(!called);
    }

    #[test]
    fn test_type_mismatch_on_hit_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();
        cm.get("k", || "text".to_string()).unwrap();
        assert!(matches!(cm.get("k", || 1u32), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_write_through_and_remote_pull() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();
        assert_eq!(cm.remote_status(), RemoteStatus::Enabled);

        assert_eq!(cm.get("k", || 7).unwrap(), 7);
        assert_eq!(store.len(), 1);
        assert_eq!(cm.stats().remote_uploads, 1);

        cm.clear_local().unwrap();
        assert_eq!(cm.get("k", || 8).unwrap(), 7);
        assert_eq!(cm.stats().remote_hits, 1);
        assert_eq!(cm.local().list().unwrap().len(), 1);

        // Served locally now
        let calls = store.calls();
        assert_eq!(cm.get("k", || 9).unwrap(), 7);
        assert_eq!(store.calls(), calls);
    }

    #[test]
    fn test_permission_denied_at_construction_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.set_fault(Some(Fault::PermissionDenied("Access Denied.".into())));

        let construction = with_memory(&dir, store.clone());
        let warning = construction.warning().unwrap().clone();
        assert_eq!(warning.kind, DegradeKind::PermissionDenied);
        assert!(warning.message.contains("Access Denied"));
        assert!(warning.to_string().contains("Access Denied"));

        let cm = construction.into_manager();
        assert!(matches!(cm.remote_status(), RemoteStatus::Disabled { .. }));

        let calls = store.calls();
        assert_eq!(cm.get("k", || 1).unwrap(), 1);
        assert_eq!(store.calls(), calls);
        assert_eq!(cm.clear_remote().unwrap(), ClearOutcome::RemoteNotConfigured);
        assert!(matches!(cm.sync_to_remote(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unreachable_at_construction_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.set_fault(Some(Fault::Unreachable("connection refused".into())));

        let construction = with_memory(&dir, store);
        assert_eq!(
            construction.warning().map(|w| w.kind.clone()),
            Some(DegradeKind::Unreachable)
        );
    }

    #[test]
    fn test_remote_failures_never_fail_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();

        store.set_fault(Some(Fault::Unreachable("timeout".into())));
        assert_eq!(cm.get("k", || 5).unwrap(), 5);
        assert_eq!(cm.get("k", || 6).unwrap(), 5);
        // Connectivity problems are per call
        assert_eq!(cm.remote_status(), RemoteStatus::Enabled);
        assert!(cm.stats().remote_failures >= 1);

        store.set_fault(Some(Fault::PermissionDenied("Access Denied".into())));
        assert_eq!(cm.get("other", || 1).unwrap(), 1);
        assert!(matches!(cm.remote_status(), RemoteStatus::Disabled { .. }));
    }

    #[test]
    fn test_undecodable_remote_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();

        let key = derive_key("k", &CallArgs::new()).unwrap();
        store.insert(&format!("cache/{}", key.file_name()), vec![0xff, 0x00]);

        assert_eq!(cm.get("k", || 3).unwrap(), 3);
        assert_eq!(cm.stats().misses, 1);
    }

    #[test]
    fn test_clear_remote_keeps_local() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();

        cm.get("a", || 1).unwrap();
        cm.get("b", || 2).unwrap();

        assert_eq!(
            cm.clear_remote().unwrap(),
            ClearOutcome::Cleared { removed: 2 }
        );
        assert!(store.is_empty());
        assert_eq!(cm.local().list().unwrap().len(), 2);
    }

    #[test]
    fn test_sync_to_remote_backfills() {
        let dir = tempfile::tempdir().unwrap();
        let local_only = CacheManager::new(dir.path()).unwrap();
        local_only.get("a", || 1).unwrap();
        local_only.get("b", || 2).unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();
        cm.get("c", || 3).unwrap();

        let report = cm.sync_to_remote().unwrap();
        assert_eq!(report, SyncReport { pushed: 2, skipped: 1, failed: 0 });
        assert_eq!(store.len(), 3);

        let again = cm.sync_to_remote().unwrap();
        assert_eq!(again.pushed, 0);
        assert_eq!(again.skipped, 3);
    }

    #[test]
    fn test_invalidate_removes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();
        let args = CallArgs::new().kwarg("n", 2);

        cm.get_with_args("k", &args, || 10).unwrap();
        assert!(cm.invalidate("k", &args).unwrap());
        assert!(store.is_empty());
        assert_eq!(cm.get_with_args("k", &args, || 11).unwrap(), 11);
    }

    #[test]
    fn test_object_store_requires_remote_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = CacheManager::with_object_store(
            CacheConfig::new(dir.path()),
            Arc::new(MemoryObjectStore::new()),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_open_rejects_malformed_remote_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path())
            .with_remote(RemoteConfig::new("bucket").with_endpoint("http://localhost/"));
        assert!(matches!(
            CacheManager::open(config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_non_finite_results_are_refused_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();

        let err = cm.get("arr", || vec![f64::NAN, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        let err = cm.get("opt", || Some(f64::INFINITY)).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));

        assert!(cm.local().list().unwrap().is_empty());
        assert!(store.is_empty());

        // The key is not poisoned by the refused value
        assert_eq!(cm.get("arr", || vec![0.5, 1.0]).unwrap(), vec![0.5, 1.0]);
        assert_eq!(cm.get("arr", || vec![9.0]).unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_unpersistable_result_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        let err = cm
            .get("bytes-keyed", || {
                let mut map: HashMap<Vec<u8>, i32> = HashMap::new();
                map.insert(vec![1, 2], 3);
                map
            })
            .unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(cm.inflight.is_empty());
    }

    #[test]
    fn test_compute_may_ask_for_its_own_key() {
        let dir = tempfile::tempdir().unwrap();
        let cm = CacheManager::new(dir.path()).unwrap();

        let value = cm
            .get("nested", || cm.get::<i32, _>("nested", || 1).unwrap() + 1)
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(cm.get("nested", || 0).unwrap(), 2);
        assert_eq!(cm.stats().misses, 2);
        assert!(cm.inflight.is_empty());
    }

    #[test]
    fn test_sync_stops_on_permission_error() {
        let dir = tempfile::tempdir().unwrap();
        let local_only = CacheManager::new(dir.path()).unwrap();
        local_only.get("a", || 1).unwrap();
        local_only.get("c", || 3).unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();
        cm.get("b", || 2).unwrap();

        store.set_fault_for("put", Some(Fault::PermissionDenied("Access Denied.".into())));
        let report = cm.sync_to_remote().unwrap();

        // "a" failed; "b" is already mirrored; "c" was never attempted
        assert_eq!(report, SyncReport { pushed: 0, skipped: 1, failed: 2 });
        assert!(matches!(cm.remote_status(), RemoteStatus::Disabled { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_tier_inside_async_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cm = with_memory(&dir, store.clone()).into_manager();

        assert!(cm.remote_status().is_enabled());
        assert_eq!(cm.get("k", || 7).unwrap(), 7);
        assert_eq!(store.len(), 1);
        assert_eq!(cm.clear_remote().unwrap(), ClearOutcome::Cleared { removed: 1 });
        drop(cm);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_timeout_inside_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new().with_latency(Duration::from_secs(10)));
        let config = CacheConfig::new(dir.path())
            .with_remote(remote_config().with_timeout(Duration::from_millis(100)));

        let construction = CacheManager::with_object_store(config, store).unwrap();
        assert_eq!(
            construction.warning().map(|w| w.kind.clone()),
            Some(DegradeKind::Unreachable)
        );
        let cm = construction.into_manager();
        assert_eq!(cm.get("k", || 1).unwrap(), 1);
    }
}
