//! Memoizing wrapper for plain functions.
//!
//! ```no_run
//! use cellcache::{CacheOptions, CachedFn, get_cachemanager_for};
//! use cellcache_core::CallArgs;
//!
//! let calc = CachedFn::new(
//!     CacheOptions::new("compute-squares").with_base("/tmp/cellcache"),
//!     |args: &CallArgs| -> Vec<u64> {
//!         let n = args.positional.len() as u64;
//!         (0..n).map(|i| i * i).collect()
//!     },
//! )?;
//!
//! let squares: Vec<u64> = calc.call(&CallArgs::new().arg(3))?;
//! let manager = get_cachemanager_for(&calc).expect("bound on construction");
//! manager.clear_local()?;
//! # Ok::<(), cellcache_core::Error>(())
//! ```

use crate::config::{CacheConfig, RemoteConfig};
use crate::manager::CacheManager;
use crate::registry::BindingRegistry;
use crate::types::CompressionType;
use cellcache_core::{CallArgs, CallableId, Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;

/// Options of one memoized function.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Logical name folded into every key.
    pub key: String,
    /// Local root; defaults to the platform cache directory.
    pub base: Option<PathBuf>,
    /// Remote root (`bucket[/prefix]`).
    pub s3_base: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_endpoint: Option<String>,
    pub compression: CompressionType,
}

impl CacheOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_s3(
        mut self,
        s3_base: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.s3_base = Some(s3_base.into());
        self.s3_access_key = Some(access_key.into());
        self.s3_secret_key = Some(secret_key.into());
        self
    }

    pub fn with_s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Manager configuration described by these options.
    pub fn to_config(&self) -> Result<CacheConfig> {
        if self.key.is_empty() {
            return Err(Error::Configuration("cache key must not be empty".into()));
        }

        let base = self
            .base
            .clone()
            .unwrap_or_else(CacheConfig::default_local_root);
        let mut config = CacheConfig::new(base).with_compression(self.compression);

        match &self.s3_base {
            Some(s3_base) => {
                let mut remote = RemoteConfig::new(s3_base.clone());
                remote.access_key = self.s3_access_key.clone();
                remote.secret_key = self.s3_secret_key.clone();
                remote.endpoint = self.s3_endpoint.clone();
                config = config.with_remote(remote);
            }
            None if self.s3_access_key.is_some() || self.s3_endpoint.is_some() => {
                return Err(Error::Configuration(
                    "remote credentials given without s3_base".into(),
                ));
            }
            None => {}
        }
        Ok(config)
    }
}

/// A function whose results are memoized by a [`CacheManager`].
pub struct CachedFn<F> {
    id: CallableId,
    key: String,
    manager: Arc<CacheManager>,
    func: F,
}

impl<F> CachedFn<F> {
    /// Wrap a function and bind it in the process-wide registry.
    pub fn new(options: CacheOptions, func: F) -> Result<Self> {
        Self::with_registry(options, BindingRegistry::global(), func)
    }

    /// Wrap a function and bind it in the given registry.
    pub fn with_registry(
        options: CacheOptions,
        registry: &BindingRegistry,
        func: F,
    ) -> Result<Self> {
        let config = options.to_config()?;
        let manager = registry.manager_for(&config)?;
        let id = CallableId::new();
        registry.bind(id, Arc::clone(&manager));

        Ok(Self {
            id,
            key: options.key,
            manager,
            func,
        })
    }

    pub fn id(&self) -> CallableId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    /// Call with arguments, serving the result from cache when possible.
    pub fn call<T>(&self, args: &CallArgs) -> Result<T>
    where
        F: Fn(&CallArgs) -> T,
        T: Serialize + DeserializeOwned,
    {
        self.manager
            .get_with_args(&self.key, args, || (self.func)(args))
    }

    /// Call a function that takes no arguments.
    pub fn call_without_args<T>(&self) -> Result<T>
    where
        F: Fn(&CallArgs) -> T,
        T: Serialize + DeserializeOwned,
    {
        self.call(&CallArgs::new())
    }

    /// Call a fallible function; failures are returned and not cached.
    pub fn try_call<T, E>(&self, args: &CallArgs) -> std::result::Result<T, E>
    where
        F: Fn(&CallArgs) -> std::result::Result<T, E>,
        T: Serialize + DeserializeOwned,
        E: From<Error>,
    {
        self.manager
            .try_get_with_args(&self.key, args, || (self.func)(args))
    }
}

/// Manager bound to a wrapped function in the process-wide registry.
pub fn get_cachemanager_for<F>(cached: &CachedFn<F>) -> Option<Arc<CacheManager>> {
    BindingRegistry::global().lookup(cached.id())
}
