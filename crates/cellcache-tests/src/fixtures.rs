//! Fixtures for remote-tier tests.

use crate::containers::MinioContainer;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use cellcache::{CacheConfig, CacheOptions, RemoteConfig};
use std::time::Duration;
use tempfile::TempDir;

/// Prefix under which every fixture stores its entries.
pub const REMOTE_PREFIX: &str = "nb";

/// A fresh bucket on a running MinIO, plus the settings to reach it.
pub struct RemoteFixture {
    bucket: String,
    endpoint: String,
    access_key: String,
    secret_key: String,
    client: Client,
}

impl RemoteFixture {
    /// Create a uniquely named bucket.
    pub async fn create(minio: &MinioContainer) -> anyhow::Result<Self> {
        let bucket = unique_bucket_name();
        minio.create_bucket(&bucket).await?;

        Ok(Self {
            bucket,
            endpoint: minio.endpoint().to_string(),
            access_key: minio.access_key().to_string(),
            secret_key: minio.secret_key().to_string(),
            client: minio.client(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `bucket/prefix` root of the remote tier.
    pub fn root(&self) -> String {
        format!("{}/{}", self.bucket, REMOTE_PREFIX)
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::new(self.root())
            .with_credentials(&self.access_key, &self.secret_key)
            .with_endpoint(&self.endpoint)
            .with_timeout(Duration::from_secs(10))
    }

    /// Same bucket, wrong secret.
    pub fn forbidden_config(&self) -> RemoteConfig {
        RemoteConfig::new(self.root())
            .with_credentials(&self.access_key, "not-the-secret")
            .with_endpoint(&self.endpoint)
            .with_timeout(Duration::from_secs(10))
    }

    pub fn config(&self, local: &TempDir) -> CacheConfig {
        CacheConfig::new(local.path()).with_remote(self.remote_config())
    }

    pub fn options(&self, key: &str, local: &TempDir) -> CacheOptions {
        CacheOptions::new(key)
            .with_base(local.path())
            .with_s3(self.root(), &self.access_key, &self.secret_key)
            .with_s3_endpoint(&self.endpoint)
    }

    /// Object keys currently under the remote root, sorted.
    pub async fn remote_keys(&self) -> anyhow::Result<Vec<String>> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{}/", REMOTE_PREFIX))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("list {}: {}", self.bucket, DisplayErrorContext(&e)))?;

        let mut keys: Vec<String> = resp
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Bucket names must be lowercase and DNS-safe.
pub fn unique_bucket_name() -> String {
    format!("cellcache-{}", uuid::Uuid::new_v4().simple())
}

/// Empty scratch directory for a local tier.
pub fn scratch_dir() -> anyhow::Result<TempDir> {
    Ok(tempfile::tempdir()?)
}
