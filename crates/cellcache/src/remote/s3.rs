//! S3-compatible object store (AWS, MinIO, R2).

use crate::config::RemoteConfig;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use cellcache_core::ports::ObjectStore;
use cellcache_core::{Error, Result};
use std::time::Duration;

/// Error codes that will not go away by retrying.
const PERMANENT_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "AccountProblem",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidBucketName",
    "InvalidToken",
    "NoSuchBucket",
    "SignatureDoesNotMatch",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Object store client for one bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from a validated remote configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;
        let location = config.location()?;

        let (access_key, secret_key) = match (&config.access_key, &config.secret_key) {
            (Some(a), Some(s)) => (a.clone(), s.clone()),
            _ => {
                return Err(Error::Configuration(
                    "remote access key and secret key are required".into(),
                ));
            }
        };

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
            .operation_timeout(config.timeout)
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "cellcache",
            ))
            .timeout_config(timeouts);

        // Custom endpoints (MinIO and friends) rarely support virtual-host addressing
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: location.bucket,
        })
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Map an SDK failure onto the permission/connectivity split.
fn classify<E>(op: &str, err: SdkError<E, HttpResponse>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let reason = err
        .as_service_error()
        .and_then(|e| e.message())
        .map(str::to_string)
        .or_else(|| code.clone())
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    let permanent = matches!(status, Some(401) | Some(403))
        || code.as_deref().is_some_and(|c| PERMANENT_CODES.contains(&c));

    if permanent {
        Error::RemotePermission(format!("{}: {}", op, reason))
    } else {
        Error::RemoteConnectivity(format!("{}: {}", op, reason))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| classify("list", e))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(next) if resp.is_truncated() == Some(true) => token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(classify("get", e)),
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::RemoteConnectivity(format!("get: reading body failed: {}", e)))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("put", e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(classify("exists", e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("delete", e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "s3"
    }
}
