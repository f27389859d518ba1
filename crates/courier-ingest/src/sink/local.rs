//! Local filesystem sink
//!
//! `container` is a root directory and `path` is relative to it. Each object
//! is written to a `.partial` sibling first and renamed into place, so a
//! reader never sees a half-written file.

use async_trait::async_trait;
use courier_common::{checksum::sha256_hex, CourierError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{validate_relative_path, DestinationSink, WriteReceipt};
use crate::router::DestinationTarget;

const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, Default)]
pub struct LocalSink;

impl LocalSink {
    pub fn new() -> Self {
        Self
    }

    /// Absolute location of a target on disk
    pub fn resolve(target: &DestinationTarget) -> Result<PathBuf> {
        validate_relative_path(target)?;
        Ok(Path::new(&target.container).join(&target.path))
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl DestinationSink for LocalSink {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put(&self, target: &DestinationTarget, data: Vec<u8>) -> Result<WriteReceipt> {
        let path = Self::resolve(target)?;
        let fail = |e: std::io::Error| CourierError::write(target.to_string(), e);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }

        let staging = partial_path(&path);
        let written = async {
            let mut file = tokio::fs::File::create(&staging).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&staging, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(fail(e));
        }

        debug!(path = %path.display(), bytes = data.len(), "Wrote local file");

        Ok(WriteReceipt {
            target: target.clone(),
            size: data.len() as u64,
            checksum: sha256_hex(&data),
        })
    }

    async fn remove(&self, target: &DestinationTarget) -> Result<()> {
        let path = Self::resolve(target)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CourierError::write(target.to_string(), e)),
        }
    }
}
