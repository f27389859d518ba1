//! Object storage sink
//!
//! `container` is the bucket and `path` is the object key.

use async_trait::async_trait;
use courier_common::{CourierError, Result};
use std::sync::Arc;

use super::{validate_relative_path, DestinationSink, WriteReceipt};
use crate::router::DestinationTarget;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DestinationSink for ObjectStoreSink {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, target: &DestinationTarget, data: Vec<u8>) -> Result<WriteReceipt> {
        validate_relative_path(target)?;

        let upload = self
            .store
            .put_object(&target.container, &target.path, data)
            .await
            .map_err(|e| CourierError::write(target.to_string(), format!("{:#}", e)))?;

        Ok(WriteReceipt {
            target: target.clone(),
            size: upload.size,
            checksum: upload.checksum,
        })
    }

    async fn remove(&self, target: &DestinationTarget) -> Result<()> {
        validate_relative_path(target)?;

        self.store
            .delete_object(&target.container, &target.path)
            .await
            .map_err(|e| CourierError::write(target.to_string(), format!("{:#}", e)))
    }
}
