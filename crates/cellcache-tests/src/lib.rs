//! Integration test infrastructure for cellcache.
//!
//! Provides a MinIO container and fixtures for exercising the remote tier
//! against a real S3 API. Tests that need Docker live under `tests/` and are
//! compiled only with the `integration` feature.
//!
//! # Usage
//!
//! ```ignore
//! use cellcache_tests::{MinioContainer, RemoteFixture};
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn test_something() {
//!     let minio = MinioContainer::start().await.unwrap();
//!     let fixture = RemoteFixture::create(&minio).await.unwrap();
//!     // fixture.config(), fixture.remote_keys(), ...
//! }
//! ```

pub mod containers;
pub mod fixtures;

pub use containers::MinioContainer;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cellcache=debug,cellcache_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
