//! Destination sinks
//!
//! A sink writes named objects into a container. The orchestrator never talks
//! to a sink directly; it opens a [`SinkBatch`] for every source file with all
//! of that file's targets, fills the per-target buffers, and commits the batch
//! as a unit.
//!
//! Dropping a batch without committing writes nothing. A commit that fails
//! part-way removes the objects it already wrote for that batch (best effort);
//! a crash between writes, or a failed removal, can still leave a single-sided
//! write behind. Writes are overwrites, never appends.

pub mod local;
pub mod object_store;

use async_trait::async_trait;
use courier_common::{CourierError, Result};
use tracing::{debug, info, warn};

use crate::router::DestinationTarget;

pub use local::LocalSink;
pub use object_store::ObjectStoreSink;

/// Where and what was written for one destination object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub target: DestinationTarget,
    pub size: u64,
    pub checksum: String,
}

#[async_trait]
pub trait DestinationSink: Send + Sync {
    /// Backend label used in logs ("local", "s3")
    fn backend(&self) -> &'static str;

    /// Write `data` to `target`, replacing any existing object
    async fn put(&self, target: &DestinationTarget, data: Vec<u8>) -> Result<WriteReceipt>;

    /// Remove `target`; removing a missing object succeeds
    async fn remove(&self, target: &DestinationTarget) -> Result<()>;
}

/// Buffered handles for every destination of one source file
pub struct SinkBatch<'a> {
    sink: &'a dyn DestinationSink,
    slots: Vec<(DestinationTarget, Vec<u8>)>,
    committed: bool,
}

impl<'a> SinkBatch<'a> {
    /// Open one empty buffer per target
    pub fn open(sink: &'a dyn DestinationSink, targets: Vec<DestinationTarget>) -> Self {
        Self {
            sink,
            slots: targets.into_iter().map(|t| (t, Vec::new())).collect(),
            committed: false,
        }
    }

    /// Write handle for the target at `index`
    pub fn writer(&mut self, index: usize) -> Option<&mut Vec<u8>> {
        self.slots.get_mut(index).map(|(_, buffer)| buffer)
    }

    /// Write every buffer; on failure, undo the writes this batch already made
    pub async fn commit(mut self) -> Result<Vec<WriteReceipt>> {
        let slots = std::mem::take(&mut self.slots);
        self.committed = true;

        let mut receipts: Vec<WriteReceipt> = Vec::with_capacity(slots.len());

        for (target, buffer) in slots {
            match self.sink.put(&target, buffer).await {
                Ok(receipt) => {
                    info!(
                        backend = self.sink.backend(),
                        target = %receipt.target,
                        size = receipt.size,
                        sha256 = %receipt.checksum,
                        "Committed destination object"
                    );
                    receipts.push(receipt);
                },
                Err(err) => {
                    self.compensate(&receipts).await;
                    return Err(match err {
                        CourierError::Write { .. } => err,
                        other => CourierError::write(target.to_string(), other),
                    });
                },
            }
        }

        Ok(receipts)
    }

    async fn compensate(&self, written: &[WriteReceipt]) {
        for receipt in written.iter().rev() {
            match self.sink.remove(&receipt.target).await {
                Ok(()) => warn!(
                    target = %receipt.target,
                    "Removed partially committed object after sibling write failed"
                ),
                Err(e) => warn!(
                    target = %receipt.target,
                    error = %e,
                    "Failed to remove partially committed object; destination is single-sided"
                ),
            }
        }
    }
}

impl Drop for SinkBatch<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.slots.is_empty() {
            debug!(
                backend = self.sink.backend(),
                targets = self.slots.len(),
                "Discarding uncommitted destination buffers"
            );
        }
    }
}

/// Reject paths that would escape their container
pub(crate) fn validate_relative_path(target: &DestinationTarget) -> Result<()> {
    let invalid = target.path.is_empty()
        || target.path.starts_with('/')
        || target.path.split('/').any(|part| part == ".." || part.is_empty());

    if invalid {
        return Err(CourierError::write(
            target.to_string(),
            "destination path must be relative, non-empty and free of '..' segments",
        ));
    }
    Ok(())
}
