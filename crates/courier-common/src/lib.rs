//! Courier Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error taxonomy, logging, and checksum helpers for the courier
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CourierError`] and the [`Result`] alias used by every
//!   stage of the ingestion pipeline
//! - **Logging**: `tracing` subscriber initialisation driven by environment
//! - **Checksums**: SHA-256 digests reported for every committed object
//!
//! # Example
//!
//! ```no_run
//! use courier_common::{checksum, Result};
//!
//! fn report(bytes: &[u8]) -> Result<()> {
//!     let digest = checksum::sha256_hex(bytes);
//!     tracing::info!(sha256 = %digest, "object digest");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{CourierError, Result};
