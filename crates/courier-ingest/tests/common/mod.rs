//! In-memory doubles for the remote endpoint and object storage
//!
//! Both share their state behind `Arc<Mutex<..>>`, so a test keeps a clone
//! to inspect what the orchestrator did after the run.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::anyhow;
use async_trait::async_trait;
use courier_common::{CourierError, Result};
use courier_ingest::remote::{RemoteConnector, RemoteFileSource};
use courier_ingest::router::mastercard::AMOUNT_FIELD;
use courier_ingest::storage::{ObjectStore, UploadResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Mastercard data record with a 12-character amount at the amount offset
pub fn mastercard_record(amount: &str) -> String {
    assert_eq!(amount.len(), AMOUNT_FIELD.len());
    format!("D{}{}\n", "0".repeat(AMOUNT_FIELD.start - 1), amount)
}

// ============================================================================
// Remote
// ============================================================================

#[derive(Default)]
struct RemoteState {
    /// Full path -> content, in upload order
    files: Vec<(String, Vec<u8>)>,
    directories: HashSet<String>,
    unreadable: HashSet<String>,
    fail_listing: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "",
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(self, directory: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .directories
            .insert(directory.trim_end_matches('/').to_string());
        self
    }

    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.directories.insert(parent_of(path).to_string());
            state.files.retain(|(p, _)| p != path);
            state.files.push((path.to_string(), content.as_ref().to_vec()));
        }
        self
    }

    pub fn with_unreadable(self, path: &str) -> Self {
        self.state.lock().unwrap().unreadable.insert(path.to_string());
        self
    }

    pub fn failing_listing(self) -> Self {
        self.state.lock().unwrap().fail_listing = true;
        self
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.iter().any(|(p, _)| p == path)
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.state.lock().unwrap().directories.contains(path)
    }
}

#[async_trait]
impl RemoteFileSource for MemoryRemote {
    async fn list(&self, directory: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(CourierError::remote("listing refused"));
        }
        let directory = directory.trim_end_matches('/');
        if !state.directories.contains(directory) {
            return Err(CourierError::not_found(directory.to_string()));
        }
        Ok(state
            .files
            .iter()
            .filter(|(p, _)| parent_of(p) == directory)
            .map(|(p, _)| p.rsplit('/').next().unwrap_or(p).to_string())
            .collect())
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        if state.unreadable.contains(path) {
            return Err(CourierError::remote(format!("read {} failed: permission denied", path)));
        }
        state
            .files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| CourierError::not_found(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.files.len();
        state.files.retain(|(p, _)| p != path);
        if state.files.len() == before {
            return Err(CourierError::not_found(path.to_string()));
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.directories.contains(parent_of(to)) {
            return Err(CourierError::not_found(parent_of(to).to_string()));
        }
        let entry = state
            .files
            .iter_mut()
            .find(|(p, _)| p == from)
            .ok_or_else(|| CourierError::not_found(from.to_string()))?;
        entry.0 = to.to_string();
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut current = path.trim_end_matches('/');
        while !current.is_empty() && current != "/" {
            state.directories.insert(current.to_string());
            current = parent_of(current);
        }
        Ok(())
    }
}

pub struct MemoryConnector {
    remote: MemoryRemote,
    refuse: bool,
}

impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        Self {
            remote: MemoryRemote::new(),
            refuse: true,
        }
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    type Session = MemoryRemote;

    async fn connect(&self) -> Result<MemoryRemote> {
        if self.refuse {
            return Err(CourierError::connection("authentication failed"));
        }
        Ok(self.remote.clone())
    }

    fn endpoint(&self) -> String {
        "memory://test".to_string()
    }
}

// ============================================================================
// Object storage
// ============================================================================

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<(String, String), Vec<u8>>,
    /// Keys containing any of these fragments fail on put
    failing_puts: Vec<String>,
    /// Keys of successful puts, in call order
    put_keys: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts_matching(&self, fragment: &str) {
        self.state.lock().unwrap().failing_puts.push(fragment.to_string());
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl AsRef<[u8]>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.as_ref().to_vec());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    /// Every `bucket:key`, sorted
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .map(|(bucket, key)| format!("{}:{}", bucket, key))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<(String, String), Vec<u8>> {
        self.state.lock().unwrap().objects.clone()
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().put_keys.len()
    }

    pub fn put_order(&self) -> Vec<String> {
        self.state.lock().unwrap().put_keys.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<UploadResult> {
        let mut state = self.state.lock().unwrap();
        if state.failing_puts.iter().any(|f| key.contains(f.as_str())) {
            return Err(anyhow!("simulated upload failure for {}", key));
        }
        state.put_keys.push(key.to_string());
        let result = UploadResult::for_data(key, &data);
        state.objects.insert((bucket.to_string(), key.to_string()), data);
        Ok(result)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("no such key {}", key))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }
}
