//! Remote file endpoints
//!
//! A [`RemoteConnector`] opens one session per run; the session implements
//! [`RemoteFileSource`]. Session resources are released when the session is
//! dropped, on every exit path of the orchestrator.

pub mod sftp;

use async_trait::async_trait;
use courier_common::Result;

pub use sftp::{SftpConnector, SftpSession};

/// File operations on an authenticated remote session
#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    /// Names of the regular files in `directory`, in server order
    ///
    /// Fails with [`courier_common::CourierError::NotFound`] if the directory
    /// does not exist.
    async fn list(&self, directory: &str) -> Result<Vec<String>>;

    async fn read_all(&self, path: &str) -> Result<Vec<u8>>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Create `path` and any missing parents; succeeds if it already exists
    async fn mkdir(&self, path: &str) -> Result<()>;
}

/// Opens sessions; failures are [`courier_common::CourierError::Connection`]
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    type Session: RemoteFileSource;

    async fn connect(&self) -> Result<Self::Session>;

    /// Endpoint label for logs
    fn endpoint(&self) -> String;
}

/// A file found by one listing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileHandle {
    pub remote_directory: String,
    pub filename: String,
}

impl RemoteFileHandle {
    pub fn new(remote_directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            remote_directory: remote_directory.into(),
            filename: filename.into(),
        }
    }

    pub fn path(&self) -> String {
        remote_join(&self.remote_directory, &self.filename)
    }
}

impl std::fmt::Display for RemoteFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Join remote path segments with single slashes
pub fn remote_join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        return name.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}
