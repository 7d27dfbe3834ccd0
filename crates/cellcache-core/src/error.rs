//! Error types for cellcache.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Construction errors
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Remote tier errors
    #[error("Remote access denied: {0}")]
    RemotePermission(String),

    #[error("Remote unreachable: {0}")]
    RemoteConnectivity(String),

    // Value errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cannot derive cache key: {0}")]
    KeyDerivation(String),

    #[error("Compression error: {0}")]
    Compression(String),

    // Tier miss, never surfaced by the manager
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error came from the remote tier.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemotePermission(_) | Error::RemoteConnectivity(_)
        )
    }

    /// Whether the error disables the remote tier for the rest of the process.
    pub fn is_permission(&self) -> bool {
        matches!(self, Error::RemotePermission(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
