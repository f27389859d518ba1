//! Ingestion configuration
//!
//! Resolved values handed to the remote connector, router, sinks and
//! orchestrator at construction time. Nothing here reads global state except
//! the explicit `from_env` constructors.

use chrono::NaiveDate;
use clap::ValueEnum;
use courier_common::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Default SSH session timeout in seconds (0 disables the timeout).
pub const DEFAULT_SFTP_TIMEOUT_SECS: u64 = 60;

/// Default number of data rows per chunk for CSV chunking.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default remote root for dated archive folders.
pub const DEFAULT_ARCHIVE_ROOT: &str = "archive";

/// Default timeout for alert HTTP requests in seconds.
pub const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 10;

/// Signature algorithms some legacy servers reject during public-key auth.
pub const LEGACY_RSA_DISABLED_ALGORITHMS: [&str; 2] = ["rsa-sha2-256", "rsa-sha2-512"];

// ============================================================================
// Remote endpoint
// ============================================================================

/// Connection parameters for an SFTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key file used for public-key authentication
    pub key_path: PathBuf,
    #[serde(skip_serializing)]
    pub key_passphrase: Option<String>,
    /// Public-key signature algorithms removed from the handshake preferences
    pub disabled_sign_algorithms: Vec<String>,
    pub timeout_secs: u64,
}

impl SftpConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SFTP_PORT,
            user: user.into(),
            key_path: key_path.into(),
            key_passphrase: None,
            disabled_sign_algorithms: Vec::new(),
            timeout_secs: DEFAULT_SFTP_TIMEOUT_SECS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Disable `rsa-sha2-256` and `rsa-sha2-512` so authentication falls back to `ssh-rsa`
    pub fn with_legacy_rsa(mut self) -> Self {
        for algorithm in LEGACY_RSA_DISABLED_ALGORITHMS {
            if !self.disabled_sign_algorithms.iter().any(|a| a == algorithm) {
                self.disabled_sign_algorithms.push(algorithm.to_string());
            }
        }
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CourierError::config("SFTP host cannot be empty"));
        }
        if self.port == 0 {
            return Err(CourierError::config("SFTP port must be greater than 0"));
        }
        if self.user.trim().is_empty() {
            return Err(CourierError::config("SFTP user cannot be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Destination
// ============================================================================

/// `<container>:<directory>` destination, as given on the command line
///
/// For object storage the container is the bucket; for the local backend it
/// is the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpec {
    pub container: String,
    pub directory: String,
}

impl DestinationSpec {
    pub fn new(container: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            directory: directory.into().trim_matches('/').to_string(),
        }
    }

    /// Sibling directory with a suffix, e.g. `mastercard` -> `mastercard-refund`
    pub fn sibling(&self, suffix: &str) -> String {
        format!("{}-{}", self.directory, suffix)
    }
}

impl FromStr for DestinationSpec {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        // Split on the last colon so Windows-style local roots ("C:\data") still parse
        let (container, directory) = s.rsplit_once(':').ok_or_else(|| {
            CourierError::config(format!(
                "Invalid destination '{}', expected <container>:<directory>",
                s
            ))
        })?;

        let spec = Self::new(container.trim(), directory.trim());
        if spec.container.is_empty() || spec.directory.is_empty() {
            return Err(CourierError::config(format!(
                "Invalid destination '{}', container and directory must be non-empty",
                s
            )));
        }
        Ok(spec)
    }
}

impl std::fmt::Display for DestinationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.container, self.directory)
    }
}

// ============================================================================
// Routing and archival
// ============================================================================

/// Provider identity selecting the content routing strategy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Copy every file unchanged
    #[default]
    None,
    /// Split payment batch files into settlement and refund outputs
    Mastercard,
    /// Mastercard split, deleting each source file once written
    #[value(alias = "mastercard_testing")]
    MastercardTesting,
    /// Chunk CSV files by row count and archive the source
    Wasabi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::None => "none",
            Provider::Mastercard => "mastercard",
            Provider::MastercardTesting => "mastercard_testing",
            Provider::Wasabi => "wasabi",
        }
    }

    /// What happens to a source file after its outputs are committed
    pub fn default_archive_policy(self) -> ArchivePolicy {
        match self {
            Provider::None | Provider::Mastercard => ArchivePolicy::Leave,
            Provider::MastercardTesting => ArchivePolicy::Delete,
            Provider::Wasabi => ArchivePolicy::Archive {
                root: DEFAULT_ARCHIVE_ROOT.to_string(),
            },
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-commit handling of the remote source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ArchivePolicy {
    /// Leave the file in the inbox
    Leave,
    /// Remove the file from the remote
    Delete,
    /// Move the file to `<root>/YYYY/MM/DD/<filename>`
    Archive { root: String },
}

impl ArchivePolicy {
    /// Remote archive path for a file processed on `date`
    pub fn archive_directory(root: &str, date: NaiveDate) -> String {
        let root = root.trim_end_matches('/');
        let dated = date.format("%Y/%m/%d");
        if root.is_empty() {
            dated.to_string()
        } else {
            format!("{}/{}", root, dated)
        }
    }
}

/// CLI-facing selector for [`ArchivePolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchiveMode {
    Leave,
    Delete,
    Archive,
}

impl ArchiveMode {
    pub fn into_policy(self, root: impl Into<String>) -> ArchivePolicy {
        match self {
            ArchiveMode::Leave => ArchivePolicy::Leave,
            ArchiveMode::Delete => ArchivePolicy::Delete,
            ArchiveMode::Archive => ArchivePolicy::Archive { root: root.into() },
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything one orchestrator run needs, fully resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Remote inbox listed once per run
    pub remote_directory: String,
    pub destination: DestinationSpec,
    pub provider: Provider,
    pub archive: ArchivePolicy,
    /// Data rows per chunk (wasabi)
    pub chunk_size: usize,
    /// Settlement directory under the destination container (mastercard)
    pub settlement_path: Option<String>,
    /// Refund directory under the destination container (mastercard)
    pub refund_path: Option<String>,
    /// Date used for archive folders; today (local time) when unset
    pub archive_date: Option<NaiveDate>,
}

impl IngestConfig {
    /// Config with the provider's default archive policy and chunk size
    pub fn new(
        remote_directory: impl Into<String>,
        destination: DestinationSpec,
        provider: Provider,
    ) -> Self {
        Self {
            remote_directory: remote_directory.into(),
            destination,
            provider,
            archive: provider.default_archive_policy(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            settlement_path: None,
            refund_path: None,
            archive_date: None,
        }
    }

    pub fn with_archive(mut self, archive: ArchivePolicy) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_archive_date(mut self, date: NaiveDate) -> Self {
        self.archive_date = Some(date);
        self
    }

    pub fn settlement_directory(&self) -> String {
        self.settlement_path
            .clone()
            .unwrap_or_else(|| self.destination.sibling("settlement"))
    }

    pub fn refund_directory(&self) -> String {
        self.refund_path
            .clone()
            .unwrap_or_else(|| self.destination.sibling("refund"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_directory.trim().is_empty() {
            return Err(CourierError::config("Remote directory cannot be empty"));
        }
        if self.chunk_size == 0 {
            return Err(CourierError::config("Chunk size must be at least 1"));
        }
        if let ArchivePolicy::Archive { root } = &self.archive {
            if root.split('/').any(|part| part == "..") {
                return Err(CourierError::config(format!(
                    "Archive root '{}' must not contain '..'",
                    root
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Alerting
// ============================================================================

/// Alert channels notified about failed files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    pub teams_webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub opsgenie_api_keys: Vec<String>,
    pub opsgenie_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl AlertConfig {
    /// Load from `COURIER_TEAMS_WEBHOOK_URL`, `COURIER_OPSGENIE_API_KEYS`
    /// (comma separated), `COURIER_OPSGENIE_URL` and `COURIER_ALERT_TIMEOUT`
    pub fn from_env() -> Self {
        Self {
            teams_webhook_url: std::env::var("COURIER_TEAMS_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            opsgenie_api_keys: std::env::var("COURIER_OPSGENIE_API_KEYS")
                .map(|keys| {
                    keys.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            opsgenie_url: std::env::var("COURIER_OPSGENIE_URL").ok(),
            request_timeout_secs: std::env::var("COURIER_ALERT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ALERT_TIMEOUT_SECS),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.teams_webhook_url.is_some() || !self.opsgenie_api_keys.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_destination_spec_parse() {
        let spec: DestinationSpec = "harmonia-imports:mastercard/".parse().unwrap();
        assert_eq!(spec.container, "harmonia-imports");
        assert_eq!(spec.directory, "mastercard");
        assert_eq!(spec.to_string(), "harmonia-imports:mastercard");
    }

    #[test]
    fn test_destination_spec_rejects_missing_parts() {
        assert!("no-colon".parse::<DestinationSpec>().is_err());
        assert!(":dir".parse::<DestinationSpec>().is_err());
        assert!("bucket:".parse::<DestinationSpec>().is_err());
    }

    #[test]
    fn test_provider_default_policies() {
        assert_eq!(Provider::None.default_archive_policy(), ArchivePolicy::Leave);
        assert_eq!(Provider::Mastercard.default_archive_policy(), ArchivePolicy::Leave);
        assert_eq!(
            Provider::MastercardTesting.default_archive_policy(),
            ArchivePolicy::Delete
        );
        assert_eq!(
            Provider::Wasabi.default_archive_policy(),
            ArchivePolicy::Archive {
                root: "archive".to_string()
            }
        );
    }

    #[test]
    fn test_archive_directory() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(ArchivePolicy::archive_directory("archive", date), "archive/2024/03/07");
        assert_eq!(ArchivePolicy::archive_directory("/archive/", date), "/archive/2024/03/07");
        assert_eq!(ArchivePolicy::archive_directory("", date), "2024/03/07");
    }

    #[test]
    fn test_mastercard_directories_default_to_siblings() {
        let config = IngestConfig::new(
            "/download/TGX2",
            DestinationSpec::new("imports", "mastercard"),
            Provider::Mastercard,
        );
        assert_eq!(config.settlement_directory(), "mastercard-settlement");
        assert_eq!(config.refund_directory(), "mastercard-refund");

        let config = IngestConfig {
            refund_path: Some("payment/mastercard-refund".to_string()),
            ..config
        };
        assert_eq!(config.refund_directory(), "payment/mastercard-refund");
    }

    #[test]
    fn test_ingest_config_validation() {
        let base = IngestConfig::new("/inbox", DestinationSpec::new("c", "d"), Provider::Wasabi);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_chunk_size(0).validate().is_err());
        assert!(IngestConfig { remote_directory: " ".into(), ..base.clone() }
            .validate()
            .is_err());
        assert!(base
            .with_archive(ArchivePolicy::Archive { root: "../escape".into() })
            .validate()
            .is_err());
    }

    #[test]
    fn test_legacy_rsa_is_idempotent() {
        let config = SftpConfig::new("files.example.com", "user", "/tmp/key")
            .with_legacy_rsa()
            .with_legacy_rsa();
        assert_eq!(
            config.disabled_sign_algorithms,
            vec!["rsa-sha2-256".to_string(), "rsa-sha2-512".to_string()]
        );
        assert_eq!(config.address(), "files.example.com:22");
    }

    #[test]
    #[serial]
    fn test_alert_config_from_env() {
        std::env::set_var("COURIER_OPSGENIE_API_KEYS", "key-a, ,key-b");
        std::env::remove_var("COURIER_TEAMS_WEBHOOK_URL");
        let config = AlertConfig::from_env();
        assert_eq!(config.opsgenie_api_keys, vec!["key-a", "key-b"]);
        assert!(config.is_enabled());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));

        std::env::remove_var("COURIER_OPSGENIE_API_KEYS");
        assert!(!AlertConfig::from_env().is_enabled());
    }
}
