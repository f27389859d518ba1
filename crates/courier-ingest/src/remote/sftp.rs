//! SFTP sessions over libssh2
//!
//! `ssh2` is blocking, so every operation runs on the blocking thread pool
//! with the SFTP channel shared behind a mutex.

use async_trait::async_trait;
use courier_common::{CourierError, Result};
use ssh2::{ErrorCode, FileStat, MethodType, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{RemoteConnector, RemoteFileSource};
use crate::config::SftpConfig;

/// Public-key signature algorithms offered by default, most preferred first
pub const SIGN_ALGORITHM_PREFERENCE: [&str; 7] = [
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "rsa-sha2-512",
    "rsa-sha2-256",
    "ssh-rsa",
];

/// SFTP status codes for a missing file or path
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

/// Permissions for directories created on the remote
const DIRECTORY_MODE: i32 = 0o755;

/// Opens authenticated SFTP sessions from an [`SftpConfig`]
#[derive(Debug, Clone)]
pub struct SftpConnector {
    config: SftpConfig,
}

impl SftpConnector {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// Comma-separated signature preference list, or `None` when nothing is disabled
    pub fn sign_algorithm_preference(disabled: &[String]) -> Option<String> {
        if disabled.is_empty() {
            return None;
        }
        let allowed: Vec<&str> = SIGN_ALGORITHM_PREFERENCE
            .iter()
            .copied()
            .filter(|alg| !disabled.iter().any(|d| d.eq_ignore_ascii_case(alg)))
            .collect();
        Some(allowed.join(","))
    }

    fn connect_sync(config: &SftpConfig) -> Result<SftpSession> {
        let address = config.address();
        let socket = address
            .to_socket_addrs()
            .map_err(|e| CourierError::connection(format!("Cannot resolve {}: {}", address, e)))?
            .next()
            .ok_or_else(|| CourierError::connection(format!("No address found for {}", address)))?;

        let tcp = if config.timeout_secs > 0 {
            TcpStream::connect_timeout(&socket, Duration::from_secs(config.timeout_secs))
        } else {
            TcpStream::connect(socket)
        }
        .map_err(|e| CourierError::connection(format!("Failed to connect to {}: {}", address, e)))?;

        let handshake_err =
            |e: ssh2::Error| CourierError::connection(format!("SSH negotiation with {} failed: {}", address, e));

        let mut session = Session::new().map_err(handshake_err)?;
        session.set_tcp_stream(tcp);
        if config.timeout_secs > 0 {
            let millis = config.timeout_secs.saturating_mul(1000).min(u32::MAX as u64) as u32;
            session.set_timeout(millis);
        }

        if let Some(preference) = Self::sign_algorithm_preference(&config.disabled_sign_algorithms) {
            debug!(preference = %preference, "Restricting public-key signature algorithms");
            session
                .method_pref(MethodType::SignAlgo, &preference)
                .map_err(handshake_err)?;
        }

        session.handshake().map_err(handshake_err)?;

        session
            .userauth_pubkey_file(
                &config.user,
                None,
                &config.key_path,
                config.key_passphrase.as_deref(),
            )
            .map_err(|e| {
                CourierError::connection(format!(
                    "Public-key authentication as {} failed: {}",
                    config.user, e
                ))
            })?;

        if !session.authenticated() {
            return Err(CourierError::connection(format!(
                "Server {} did not accept the key for {}",
                address, config.user
            )));
        }

        let sftp = session.sftp().map_err(|e| {
            CourierError::connection(format!("Failed to start SFTP subsystem: {}", e))
        })?;

        Ok(SftpSession {
            sftp: Arc::new(Mutex::new(sftp)),
            _session: session,
        })
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    type Session = SftpSession;

    #[instrument(skip(self), fields(endpoint = %self.config.address(), user = %self.config.user))]
    async fn connect(&self) -> Result<SftpSession> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || Self::connect_sync(&config))
            .await
            .map_err(|e| CourierError::connection(format!("SFTP connect task panicked: {}", e)))??;

        info!("SFTP session established");
        Ok(session)
    }

    fn endpoint(&self) -> String {
        format!("sftp://{}@{}", self.config.user, self.config.address())
    }
}

/// An authenticated SFTP channel; closed when dropped
pub struct SftpSession {
    sftp: Arc<Mutex<Sftp>>,
    // Owns the transport; dropped after the channel
    _session: Session,
}

impl SftpSession {
    /// Run a blocking SFTP call on the blocking pool
    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T> + Send + 'static,
    {
        let sftp = Arc::clone(&self.sftp);
        tokio::task::spawn_blocking(move || {
            let guard = sftp
                .lock()
                .map_err(|_| CourierError::remote(format!("SFTP channel poisoned during {}", op)))?;
            f(&*guard)
        })
        .await
        .map_err(|e| CourierError::remote(format!("SFTP {} task panicked: {}", op, e)))?
    }
}

fn is_missing(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH)
    )
}

fn remote_error(op: &str, path: &str, err: ssh2::Error) -> CourierError {
    if is_missing(&err) {
        CourierError::not_found(format!("{}: {}", path, err))
    } else {
        CourierError::remote(format!("{} {} failed: {}", op, path, err))
    }
}

/// Regular entries of a directory listing, in server order
fn regular_file_names(entries: Vec<(PathBuf, FileStat)>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|(_, stat)| !stat.is_dir())
        .filter_map(|(path, _)| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .filter(|name| name != "." && name != "..")
        .collect()
}

/// Every ancestor of `path` from the root down, including `path` itself
fn ancestors_top_down(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut out = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(part);
        out.push(current.clone());
    }
    out
}

#[async_trait]
impl RemoteFileSource for SftpSession {
    async fn list(&self, directory: &str) -> Result<Vec<String>> {
        let dir = directory.to_string();
        let names = self
            .blocking("list", move |sftp| {
                sftp.readdir(Path::new(&dir))
                    .map(regular_file_names)
                    .map_err(|e| remote_error("list", &dir, e))
            })
            .await?;

        debug!(directory, entries = names.len(), "Listed remote directory");
        Ok(names)
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let path = path.to_string();
        self.blocking("read", move |sftp| {
            let mut file = sftp
                .open(Path::new(&path))
                .map_err(|e| remote_error("open", &path, e))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| CourierError::remote(format!("read {} failed: {}", path, e)))?;
            debug!(path = %path, bytes = data.len(), "Read remote file");
            Ok(data)
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking("delete", move |sftp| {
            sftp.unlink(Path::new(&path))
                .map_err(|e| remote_error("delete", &path, e))
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.blocking("rename", move |sftp| {
            sftp.rename(Path::new(&from), Path::new(&to), None)
                .map_err(|e| remote_error("rename", &from, e))
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking("mkdir", move |sftp| {
            for dir in ancestors_top_down(&path) {
                match sftp.stat(Path::new(&dir)) {
                    Ok(stat) if stat.is_dir() => continue,
                    Ok(_) => {
                        return Err(CourierError::remote(format!(
                            "mkdir {} failed: a file is in the way",
                            dir
                        )))
                    },
                    Err(e) if is_missing(&e) => {},
                    Err(e) => return Err(remote_error("stat", &dir, e)),
                }

                if let Err(e) = sftp.mkdir(Path::new(&dir), DIRECTORY_MODE) {
                    // Lost a race with another writer; fine as long as it exists now
                    if sftp.stat(Path::new(&dir)).map(|s| s.is_dir()).unwrap_or(false) {
                        warn!(directory = %dir, "Directory appeared during mkdir");
                        continue;
                    }
                    return Err(remote_error("mkdir", &dir, e));
                }
            }
            Ok(())
        })
        .await
    }
}
