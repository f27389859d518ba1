//! Courier - SFTP ingestion and object relocation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use courier_common::logging::{init_logging, LogConfig, LogLevel};
use courier_ingest::alerts::AlertDispatcher;
use courier_ingest::config::{
    AlertConfig, ArchiveMode, DestinationSpec, IngestConfig, Provider, SftpConfig,
    DEFAULT_ARCHIVE_ROOT, DEFAULT_CHUNK_SIZE, DEFAULT_SFTP_PORT, DEFAULT_SFTP_TIMEOUT_SECS,
};
use courier_ingest::orchestrator::IngestOrchestrator;
use courier_ingest::relocate::BlobRelocator;
use courier_ingest::remote::SftpConnector;
use courier_ingest::sink::{DestinationSink, LocalSink, ObjectStoreSink};
use courier_ingest::storage::{config::StorageConfig, ObjectStore, Storage};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about = "Pull files from SFTP inboxes into storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every file in a remote SFTP directory
    Sftp(SftpArgs),

    /// Move objects from one storage prefix to another
    BlobCopy(BlobCopyArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Local filesystem; the destination container is a root directory
    Local,
    /// S3-compatible object storage; the destination container is a bucket
    S3,
}

#[derive(Args, Debug)]
struct SftpArgs {
    #[arg(long, env = "COURIER_SFTP_HOST")]
    host: String,

    #[arg(long, env = "COURIER_SFTP_PORT", default_value_t = DEFAULT_SFTP_PORT)]
    port: u16,

    #[arg(long, env = "COURIER_SFTP_USER")]
    user: String,

    /// Private key used for public-key authentication
    #[arg(long, env = "COURIER_SFTP_KEY")]
    key: PathBuf,

    #[arg(long, env = "COURIER_SFTP_KEY_PASSPHRASE", hide_env_values = true)]
    key_passphrase: Option<String>,

    /// SSH session timeout in seconds (0 disables it)
    #[arg(long, env = "COURIER_SFTP_TIMEOUT", default_value_t = DEFAULT_SFTP_TIMEOUT_SECS)]
    timeout: u64,

    /// Disable rsa-sha2-256/512 signatures for servers that only accept ssh-rsa
    #[arg(long, env = "COURIER_SFTP_LEGACY_RSA")]
    legacy_rsa: bool,

    /// Remote directory to ingest
    #[arg(long, env = "COURIER_REMOTE_DIR")]
    remote_dir: String,

    /// Destination as <container>:<directory>
    #[arg(long, env = "COURIER_DESTINATION")]
    destination: DestinationSpec,

    #[arg(long, value_enum, env = "COURIER_BACKEND", default_value_t = Backend::Local)]
    backend: Backend,

    /// Content routing for the files of this run
    #[arg(long, value_enum, env = "COURIER_PROVIDER", default_value_t = Provider::None)]
    provider: Provider,

    /// Data rows per chunk (wasabi)
    #[arg(long, env = "COURIER_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Override the provider's handling of processed source files
    #[arg(long, value_enum, env = "COURIER_ARCHIVE")]
    archive: Option<ArchiveMode>,

    /// Remote root for dated archive folders; relative roots resolve from the login directory
    #[arg(long, env = "COURIER_ARCHIVE_ROOT", default_value = DEFAULT_ARCHIVE_ROOT)]
    archive_root: String,

    /// Date used for archive folders (YYYY-MM-DD); defaults to today
    #[arg(long)]
    archive_date: Option<NaiveDate>,

    /// Settlement directory for mastercard runs
    #[arg(long, env = "COURIER_SETTLEMENT_PATH")]
    settlement_path: Option<String>,

    /// Refund directory for mastercard runs
    #[arg(long, env = "COURIER_REFUND_PATH")]
    refund_path: Option<String>,
}

#[derive(Args, Debug)]
struct BlobCopyArgs {
    /// Source as <bucket>:<prefix>
    #[arg(long)]
    source: DestinationSpec,

    /// Destination as <bucket>:<prefix>
    #[arg(long)]
    destination: DestinationSpec,

    /// Named store holding the source bucket (S3_<NAME>_* variables); default store if unset
    #[arg(long, env = "COURIER_SOURCE_STORE")]
    source_store: Option<String>,

    /// Named store holding the destination bucket (S3_<NAME>_* variables); default store if unset
    #[arg(long, env = "COURIER_DESTINATION_STORE")]
    destination_store: Option<String>,
}

impl BlobCopyArgs {
    fn uses_one_store(&self) -> bool {
        self.source_store == self.destination_store
    }

    /// Source and destination connection settings
    fn storage_configs<F>(&self, lookup: F) -> Result<(StorageConfig, StorageConfig)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = StorageConfig::from_lookup(self.source_store.as_deref(), &lookup)
            .context("Invalid source store configuration")?;
        let destination = StorageConfig::from_lookup(self.destination_store.as_deref(), &lookup)
            .context("Invalid destination store configuration")?;
        Ok((source, destination))
    }
}

impl SftpArgs {
    fn sftp_config(&self) -> SftpConfig {
        let mut config = SftpConfig::new(&self.host, &self.user, &self.key).with_port(self.port);
        config.key_passphrase = self.key_passphrase.clone();
        config.timeout_secs = self.timeout;
        if self.legacy_rsa {
            config = config.with_legacy_rsa();
        }
        config
    }

    fn ingest_config(&self) -> IngestConfig {
        let mut config = IngestConfig::new(&self.remote_dir, self.destination.clone(), self.provider)
            .with_chunk_size(self.chunk_size);
        if let Some(mode) = self.archive {
            config = config.with_archive(mode.into_policy(&self.archive_root));
        } else if let courier_ingest::ArchivePolicy::Archive { root } = &mut config.archive {
            *root = self.archive_root.clone();
        }
        if let Some(date) = self.archive_date {
            config = config.with_archive_date(date);
        }
        config.settlement_path = self.settlement_path.clone();
        config.refund_path = self.refund_path.clone();
        config
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix("courier")
        .filter_directives("aws_config=warn,aws_smithy_runtime=warn,hyper=warn")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid logging environment: {:#}", e);
            log_config
        },
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {:#}", e);
            None
        },
    };

    let result = match cli.command {
        Command::Sftp(args) => run_sftp(args).await,
        Command::BlobCopy(args) => run_blob_copy(args).await,
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            1
        },
    };

    // Flush the file appender before exiting
    drop(guard);
    process::exit(code);
}

async fn object_store(config: StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let storage = Storage::new(config).await?;
    Ok(Arc::new(storage))
}

async fn run_sftp(args: SftpArgs) -> Result<()> {
    let sftp_config = args.sftp_config();
    sftp_config.validate()?;

    let sink: Arc<dyn DestinationSink> = match args.backend {
        Backend::Local => Arc::new(LocalSink::new()),
        Backend::S3 => Arc::new(ObjectStoreSink::new(
            object_store(StorageConfig::from_env()?).await?,
        )),
    };

    let alerts = AlertDispatcher::from_config(&AlertConfig::from_env())?;
    let orchestrator =
        IngestOrchestrator::new(args.ingest_config(), sink)?.with_alerts(alerts);

    info!(
        endpoint = %sftp_config.address(),
        remote_dir = %args.remote_dir,
        destination = %args.destination,
        provider = %args.provider,
        "Starting SFTP ingestion"
    );

    let summary = orchestrator
        .run(&SftpConnector::new(sftp_config))
        .await
        .context("Ingestion run aborted")?;

    if summary.has_failures() {
        warn!(failed = summary.failed.len(), "Some files were not ingested");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn run_blob_copy(args: BlobCopyArgs) -> Result<()> {
    let (source_config, destination_config) =
        args.storage_configs(|key| std::env::var(key).ok())?;
    let source = object_store(source_config).await?;
    let destination = if args.uses_one_store() {
        source.clone()
    } else {
        object_store(destination_config).await?
    };
    info!(
        source_store = args.source_store.as_deref().unwrap_or("default"),
        destination_store = args.destination_store.as_deref().unwrap_or("default"),
        "Starting blob relocation"
    );
    let relocator = BlobRelocator::new(source, destination);

    let summary = relocator
        .relocate(&args.source, &args.destination)
        .await
        .with_context(|| format!("Failed to list {}", args.source))?;

    if !summary.is_clean() {
        warn!(failed = summary.failed.len(), "Some objects were not relocated");
    }
    info!(listed = summary.listed, moved = summary.moved, "Relocation finished");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn blob_copy_args(extra: &[&str]) -> BlobCopyArgs {
        let mut argv = vec![
            "courier",
            "blob-copy",
            "--source",
            "incoming:wasabi",
            "--destination",
            "warehouse:wasabi/2024",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::BlobCopy(args) => args,
            other => panic!("expected blob-copy, got {:?}", other),
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_blob_copy_between_named_stores() {
        let args = blob_copy_args(&["--source-store", "sftp", "--destination-store", "blob"]);
        assert!(!args.uses_one_store());

        let (source, destination) = args
            .storage_configs(env(&[
                ("S3_SFTP_ENDPOINT", "https://sftp-account.example.net"),
                ("S3_SFTP_ACCESS_KEY", "sftp-key"),
                ("S3_SFTP_SECRET_KEY", "sftp-secret"),
                ("S3_BLOB_ENDPOINT", "https://blob-account.example.net"),
                ("S3_BLOB_ACCESS_KEY", "blob-key"),
                ("S3_BLOB_SECRET_KEY", "blob-secret"),
            ]))
            .unwrap();

        assert_eq!(source.endpoint.as_deref(), Some("https://sftp-account.example.net"));
        assert_eq!(source.access_key.as_deref(), Some("sftp-key"));
        assert_eq!(destination.endpoint.as_deref(), Some("https://blob-account.example.net"));
        assert_eq!(destination.access_key.as_deref(), Some("blob-key"));
    }

    #[test]
    fn test_blob_copy_defaults_to_one_store() {
        let args = blob_copy_args(&[]);
        assert!(args.uses_one_store());

        let (source, destination) = args
            .storage_configs(env(&[("S3_ENDPOINT", "http://minio:9000")]))
            .unwrap();
        assert_eq!(source.endpoint, destination.endpoint);
    }

    #[test]
    fn test_blob_copy_rejects_half_configured_store() {
        let args = blob_copy_args(&["--destination-store", "archive"]);
        let err = args
            .storage_configs(env(&[("S3_ARCHIVE_ACCESS_KEY", "key-without-secret")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("destination store"));
    }
}
