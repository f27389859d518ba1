//! Courier Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls files from SFTP inboxes, routes their content through a
//! provider-specific strategy and writes the results to local disk or
//! S3-compatible object storage.
//!
//! # Pipeline
//!
//! - [`remote`]: authenticated SFTP sessions (list, read, delete, rename, mkdir)
//! - [`router`]: passthrough, Mastercard settlement/refund split, CSV chunking
//! - [`sink`]: buffered per-file batches committed to a destination backend
//! - [`orchestrator`]: the sequential run with per-file failure containment
//! - [`relocate`]: moving objects between object-storage prefixes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier_ingest::config::{DestinationSpec, IngestConfig, Provider, SftpConfig};
//! use courier_ingest::orchestrator::IngestOrchestrator;
//! use courier_ingest::remote::SftpConnector;
//! use courier_ingest::sink::LocalSink;
//!
//! #[tokio::main]
//! async fn main() -> courier_common::Result<()> {
//!     let config = IngestConfig::new(
//!         "/download/TGX2",
//!         "/srv/imports:mastercard".parse()?,
//!         Provider::Mastercard,
//!     );
//!     let orchestrator = IngestOrchestrator::new(config, Arc::new(LocalSink::new()))?;
//!     let connector = SftpConnector::new(
//!         SftpConfig::new("sftp.example.com", "ingest", "/keys/id_rsa").with_legacy_rsa(),
//!     );
//!
//!     let summary = orchestrator.run(&connector).await?;
//!     println!("{} processed, {} failed", summary.processed, summary.failed.len());
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod config;
pub mod orchestrator;
pub mod relocate;
pub mod remote;
pub mod router;
pub mod sink;
pub mod storage;

pub use config::{ArchivePolicy, DestinationSpec, IngestConfig, Provider, SftpConfig};
pub use orchestrator::{FileFailure, IngestOrchestrator, RunState, RunSummary};
