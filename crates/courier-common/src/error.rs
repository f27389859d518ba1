//! Error types for courier
//!
//! Only [`CourierError::Connection`] and [`CourierError::NotFound`] abort an
//! ingestion run. Everything else is contained at the per-file boundary.

use thiserror::Error;

/// Result type alias for courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

/// Main error type for courier
#[derive(Error, Debug)]
pub enum CourierError {
    /// Authentication, handshake, or transport negotiation failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote directory (or file) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record could not be parsed while routing file content
    #[error("Format error in {file} at line {line}: {reason}")]
    Format {
        file: String,
        line: usize,
        reason: String,
    },

    /// A destination write or upload failed
    #[error("Write error for {target}: {reason}")]
    Write { target: String, reason: String },

    /// An operation on an established remote session failed
    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Alert delivery failed: {0}")]
    Alert(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CourierError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn write(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Write {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format(file: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Whether this error ends the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotFound(_))
    }

    /// Short machine-friendly label, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::NotFound(_) => "not_found",
            Self::Format { .. } => "format",
            Self::Write { .. } => "write",
            Self::Remote(_) => "remote",
            Self::Config(_) => "config",
            Self::Alert(_) => "alert",
            Self::Io(_) => "io",
        }
    }
}
