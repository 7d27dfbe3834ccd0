//! Cache types and operation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// File extension of persisted entries in both tiers.
pub const ENTRY_EXTENSION: &str = "bin";

/// Storage key of one cache entry.
///
/// Only produced by [`derive_key`](crate::keys::derive_key) or read back from
/// a store listing, so it is always safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub(crate) fn from_storage(key: String) -> Self {
        Self(key)
    }

    /// Recover a key from an entry file or object name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(ENTRY_EXTENSION)?.strip_suffix('.')?;
        if stem.is_empty() || stem.starts_with('.') || stem.contains(['/', '\\']) {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the entry file/object for this key.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, ENTRY_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compression algorithm for persisted payloads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Zstd,
    Gzip,
    Lz4,
}

impl CompressionType {
    /// Leading byte of a persisted entry.
    pub fn tag(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zstd => 1,
            CompressionType::Gzip => 2,
            CompressionType::Lz4 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Zstd),
            2 => Some(CompressionType::Gzip),
            3 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

/// A persisted entry in the local tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Cache key.
    pub key: CacheKey,
    /// Size in bytes.
    pub size_bytes: u64,
    /// When the entry was last written.
    pub modified_at: DateTime<Utc>,
}

/// State of the remote tier of a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// No remote parameters were supplied.
    NotConfigured,
    /// Remote reads and writes are attempted.
    Enabled,
    /// Disabled for the rest of the process.
    Disabled { reason: String },
}

impl RemoteStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, RemoteStatus::Enabled)
    }
}

/// Result of `clear_remote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Entries were removed from the remote root.
    Cleared { removed: usize },
    /// There is no usable remote tier; nothing was touched.
    RemoteNotConfigured,
}

/// Result of a bulk push of local entries to the remote tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries uploaded.
    pub pushed: usize,
    /// Entries already present remotely.
    pub skipped: usize,
    /// Entries whose upload failed.
    pub failed: usize,
}

/// Live cache counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_uploads: AtomicU64,
    remote_failures: AtomicU64,
    bytes_written: AtomicU64,
}

impl CacheMetrics {
    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self) {
        self.remote_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_uploads: self.remote_uploads.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub remote_uploads: u64,
    pub remote_failures: u64,
    pub bytes_written: u64,
}
