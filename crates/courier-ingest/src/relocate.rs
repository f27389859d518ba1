//! Object-store relocation ("blob copy")
//!
//! Moves every object under a source prefix to a destination prefix, one
//! object at a time: download, upload, then delete the source. A failed
//! object is logged and left in place; the run continues with the next key.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::config::DestinationSpec;
use crate::storage::ObjectStore;

/// Outcome of one relocation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationSummary {
    pub listed: usize,
    pub moved: usize,
    /// `(source key, error)` for every object left behind
    pub failed: Vec<(String, String)>,
}

impl RelocationSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BlobRelocator {
    source_store: Arc<dyn ObjectStore>,
    destination_store: Arc<dyn ObjectStore>,
}

impl BlobRelocator {
    /// Source and destination may be the same store
    pub fn new(source_store: Arc<dyn ObjectStore>, destination_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            source_store,
            destination_store,
        }
    }

    /// Move every object under `source` to `destination`
    ///
    /// Only listing failures are returned as errors.
    pub async fn relocate(
        &self,
        source: &DestinationSpec,
        destination: &DestinationSpec,
    ) -> anyhow::Result<RelocationSummary> {
        let span = info_span!("blob_copy", source = %source, destination = %destination);

        async move {
            let source_prefix = format!("{}/", source.directory);
            let keys = self
                .source_store
                .list_keys(&source.container, &source_prefix)
                .await?;

            let mut summary = RelocationSummary {
                listed: keys.len(),
                ..Default::default()
            };
            info!(objects = keys.len(), "Listed source objects");

            for key in keys {
                let relative = key
                    .strip_prefix(source_prefix.as_str())
                    .filter(|r| !r.is_empty() && !r.ends_with('/'));
                let Some(relative) = relative else {
                    // Folder placeholder objects
                    summary.listed -= 1;
                    continue;
                };
                let destination_key = format!("{}/{}", destination.directory, relative);

                match self.move_object(source, &key, destination, &destination_key).await {
                    Ok(size) => {
                        info!(from = %key, to = %destination_key, size, "Relocated object");
                        summary.moved += 1;
                    },
                    Err(e) => {
                        let message = format!("{:#}", e);
                        warn!(key = %key, error = %message, "Failed to relocate object (continuing)");
                        summary.failed.push((key, message));
                    },
                }
            }

            info!(
                moved = summary.moved,
                failed = summary.failed.len(),
                "Blob copy completed"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn move_object(
        &self,
        source: &DestinationSpec,
        source_key: &str,
        destination: &DestinationSpec,
        destination_key: &str,
    ) -> anyhow::Result<u64> {
        let data = self
            .source_store
            .get_object(&source.container, source_key)
            .await?;
        let upload = self
            .destination_store
            .put_object(&destination.container, destination_key, data)
            .await?;
        self.source_store
            .delete_object(&source.container, source_key)
            .await?;
        Ok(upload.size)
    }
}
