//! Two-tier memoization cache for expensive, deterministic computations.
//!
//! Results live in a local directory and, optionally, in an S3-compatible
//! bucket. The remote tier is an optimisation: when it is unreachable or
//! access is denied the cache keeps working locally.

pub mod codec;
pub mod compression;
pub mod config;
mod finite;
pub mod keys;
pub mod local;
pub mod manager;
pub mod memoize;
pub mod registry;
pub mod remote;
pub mod types;

pub use config::{CacheConfig, RemoteConfig};
pub use keys::{derive_key, sanitize_key};
pub use local::LocalStore;
pub use manager::{CacheManager, Construction, DegradeKind, RemoteWarning};
pub use memoize::{CacheOptions, CachedFn, get_cachemanager_for};
pub use registry::BindingRegistry;
pub use remote::{Fault, MemoryObjectStore, RemoteLocation, RemoteStore, S3ObjectStore};
pub use types::{
    CacheKey, CacheStats, ClearOutcome, CompressionType, EntryInfo, RemoteStatus, SyncReport,
};
