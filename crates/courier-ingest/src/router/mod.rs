//! Content routing
//!
//! A router decides how the bytes of one remote file map onto destination
//! objects. Routers are pure: they never touch the remote or the sinks, so the
//! orchestrator owns every side effect (writes, deletes, archive moves).
//!
//! - **passthrough**: one object, same name, same bytes
//! - **mastercard**: settlement/refund split on the sign of the amount field
//! - **wasabi**: fixed row-count CSV chunks, each carrying the header row

pub mod mastercard;
pub mod wasabi;

use courier_common::{CourierError, Result};

use crate::config::{DestinationSpec, IngestConfig, Provider};

pub use mastercard::MastercardSplit;
pub use wasabi::CsvChunker;

/// Logical location writable through a destination sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationTarget {
    /// Bucket for object storage, root directory for the local filesystem
    pub container: String,
    /// Slash-separated path inside the container
    pub path: String,
}

impl DestinationTarget {
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }

    /// `<directory>/<filename>` inside `container`
    pub fn in_directory(container: &str, directory: &str, filename: &str) -> Self {
        let directory = directory.trim_matches('/');
        let path = if directory.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", directory, filename)
        };
        Self::new(container, path)
    }
}

impl std::fmt::Display for DestinationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.container, self.path)
    }
}

/// Bytes bound for one destination target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedObject {
    pub target: DestinationTarget,
    pub data: Vec<u8>,
}

impl RoutedObject {
    pub fn new(target: DestinationTarget, data: Vec<u8>) -> Self {
        Self { target, data }
    }
}

/// A provider-specific mapping from one source file to destination objects
pub trait RouteStrategy {
    fn transform(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RoutedObject>>;
}

/// Identity routing into the configured destination directory
#[derive(Debug, Clone)]
pub struct Passthrough {
    destination: DestinationSpec,
}

impl Passthrough {
    pub fn new(destination: DestinationSpec) -> Self {
        Self { destination }
    }
}

impl RouteStrategy for Passthrough {
    fn transform(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RoutedObject>> {
        let target = DestinationTarget::in_directory(
            &self.destination.container,
            &self.destination.directory,
            filename,
        );
        Ok(vec![RoutedObject::new(target, bytes.to_vec())])
    }
}

/// The closed set of routing strategies, chosen once per run
#[derive(Debug, Clone)]
pub enum ContentRouter {
    Passthrough(Passthrough),
    Mastercard(MastercardSplit),
    Wasabi(CsvChunker),
}

impl ContentRouter {
    pub fn from_config(config: &IngestConfig) -> Self {
        let container = &config.destination.container;
        match config.provider {
            Provider::None => Self::Passthrough(Passthrough::new(config.destination.clone())),
            Provider::Mastercard | Provider::MastercardTesting => {
                Self::Mastercard(MastercardSplit::new(
                    DestinationSpec::new(container.clone(), config.settlement_directory()),
                    DestinationSpec::new(container.clone(), config.refund_directory()),
                ))
            },
            Provider::Wasabi => Self::Wasabi(CsvChunker::new(
                config.destination.clone(),
                config.chunk_size,
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Passthrough(_) => "passthrough",
            Self::Mastercard(_) => "mastercard",
            Self::Wasabi(_) => "wasabi",
        }
    }
}

impl RouteStrategy for ContentRouter {
    fn transform(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RoutedObject>> {
        match self {
            Self::Passthrough(router) => router.transform(filename, bytes),
            Self::Mastercard(router) => router.transform(filename, bytes),
            Self::Wasabi(router) => router.transform(filename, bytes),
        }
    }
}

/// Decode file content as UTF-8, reporting the failing line on error
pub(crate) fn decode_utf8<'a>(filename: &str, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        CourierError::format(filename, line, format!("invalid UTF-8: {}", e))
    })
}
