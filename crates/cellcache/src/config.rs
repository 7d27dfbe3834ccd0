//! Configuration for cache managers.

use crate::remote::RemoteLocation;
use crate::types::CompressionType;
use cellcache_core::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables read by [`RemoteConfig::from_env`].
pub const ENV_S3_BASE: &str = "CELLCACHE_S3_BASE";
pub const ENV_S3_ACCESS_KEY: &str = "CELLCACHE_S3_ACCESS_KEY";
pub const ENV_S3_SECRET_KEY: &str = "CELLCACHE_S3_SECRET_KEY";
pub const ENV_S3_ENDPOINT: &str = "CELLCACHE_S3_ENDPOINT";
pub const ENV_S3_REGION: &str = "CELLCACHE_S3_REGION";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of one cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheConfig {
    /// Directory holding local entries. Must exist.
    pub local_root: PathBuf,
    /// Compression applied to newly written entries.
    pub compression: CompressionType,
    /// Remote mirror, if any.
    pub remote: Option<RemoteConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Self::default_local_root())
    }
}

impl CacheConfig {
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            compression: CompressionType::default(),
            remote: None,
        }
    }

    /// Platform cache directory for cellcache, or `./.cellcache`.
    pub fn default_local_root() -> PathBuf {
        directories::ProjectDirs::from("dev", "cellcache", "cellcache")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".cellcache"))
    }

    /// Set the remote mirror.
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set the compression for new entries.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

/// Connection settings for the remote tier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RemoteConfig {
    /// `bucket[/prefix]`, optionally with an `s3://` scheme.
    pub root: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Custom endpoint URL for S3-compatible services.
    pub endpoint: Option<String>,
    pub region: String,
    /// Upper bound for every remote call.
    pub timeout: Duration,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("root", &self.root)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Layout of the JSON credentials file.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    accesskey: Option<String>,
    secretkey: Option<String>,
    base: Option<String>,
    endpoint: Option<String>,
}

impl RemoteConfig {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            access_key: None,
            secret_key: None,
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bucket and prefix of the remote root.
    pub fn location(&self) -> Result<RemoteLocation> {
        RemoteLocation::parse(&self.root)
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<()> {
        self.location()?;

        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !present(&self.access_key) || !present(&self.secret_key) {
            return Err(Error::Configuration(
                "remote access key and secret key are required".into(),
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint).map_err(|e| {
                Error::Configuration(format!("invalid endpoint '{}': {}", endpoint, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(Error::Configuration(format!(
                    "endpoint '{}' must be an http(s) URL",
                    endpoint
                )));
            }
        }

        if self.region.trim().is_empty() {
            return Err(Error::Configuration("region must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration("remote timeout must be positive".into()));
        }
        Ok(())
    }

    /// Load `{"accesskey", "secretkey", "base", "endpoint"}` from a JSON file.
    ///
    /// Returns `Ok(None)` when the file is absent or holds no access key.
    pub fn from_json_file(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            Error::Configuration(format!("invalid credentials file {}: {}", path.display(), e))
        })?;

        let Some(access_key) = file.accesskey.filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let base = file.base.ok_or_else(|| {
            Error::Configuration(format!("credentials file {} has no base", path.display()))
        })?;

        let mut config =
            Self::new(base).with_credentials(access_key, file.secretkey.unwrap_or_default());
        config.endpoint = file.endpoint.filter(|e| !e.is_empty());
        Ok(Some(config))
    }

    /// Read the remote settings from `CELLCACHE_S3_*` environment variables.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base = lookup(ENV_S3_BASE).filter(|b| !b.is_empty())?;
        let mut config = Self::new(base);
        config.access_key = lookup(ENV_S3_ACCESS_KEY);
        config.secret_key = lookup(ENV_S3_SECRET_KEY);
        config.endpoint = lookup(ENV_S3_ENDPOINT).filter(|e| !e.is_empty());
        if let Some(region) = lookup(ENV_S3_REGION).filter(|r| !r.is_empty()) {
            config.region = region;
        }
        Some(config)
    }
}
