//! Ingestion orchestrator
//!
//! One instance drives one run:
//!
//! ```text
//! INIT -> CONNECTED -> LISTING -> (PROCESSING_FILE)* -> DONE
//!   \________\___________\______________________________-> FATAL
//! ```
//!
//! Only connecting and listing can end the run early. Everything that goes
//! wrong while handling a single file (read, transform, write, archive) is
//! recorded in the [`RunSummary`], optionally alerted, and the run moves on
//! to the next file. Files are handled one at a time in listing order.

use std::io::Write;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use courier_common::{CourierError, Result};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::alerts::{Alert, AlertDispatcher};
use crate::config::{ArchivePolicy, IngestConfig};
use crate::remote::{remote_join, RemoteConnector, RemoteFileHandle, RemoteFileSource};
use crate::router::{ContentRouter, RouteStrategy};
use crate::sink::{DestinationSink, SinkBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Connected,
    Listing,
    ProcessingFile,
    Done,
    Fatal,
}

impl RunState {
    fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Connected)
                | (Connected, Listing)
                | (Listing, ProcessingFile)
                | (ProcessingFile, ProcessingFile)
                | (Listing, Done)
                | (ProcessingFile, Done)
                | (Init, Fatal)
                | (Connected, Fatal)
                | (Listing, Fatal)
        )
    }
}

/// A file the run could not fully handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    /// Error category, see [`CourierError::kind`]
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub listed: usize,
    /// Files written and archived without error
    pub processed: usize,
    pub failed: Vec<FileFailure>,
    pub objects_written: usize,
    pub final_state: RunState,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            listed: 0,
            processed: 0,
            failed: Vec::new(),
            objects_written: 0,
            final_state: RunState::Init,
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.final_state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.final_state,
            next
        );
        if self.final_state != next {
            debug!(from = ?self.final_state, to = ?next, "Run state transition");
        }
        self.final_state = next;
    }
}

pub struct IngestOrchestrator {
    config: IngestConfig,
    router: ContentRouter,
    sink: Arc<dyn DestinationSink>,
    alerts: AlertDispatcher,
}

impl IngestOrchestrator {
    /// Validate `config` and select the routing strategy for every file of the run
    pub fn new(config: IngestConfig, sink: Arc<dyn DestinationSink>) -> Result<Self> {
        config.validate()?;
        let router = ContentRouter::from_config(&config);

        Ok(Self {
            config,
            router,
            sink,
            alerts: AlertDispatcher::default(),
        })
    }

    pub fn with_alerts(mut self, alerts: AlertDispatcher) -> Self {
        self.alerts = alerts;
        self
    }

    /// Connect, list, and process every listed file
    ///
    /// Returns `Err` only for connection or listing failures.
    pub async fn run<C: RemoteConnector>(&self, connector: &C) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "ingest_run",
            %run_id,
            provider = %self.config.provider,
            router = self.router.name(),
            endpoint = %connector.endpoint()
        );

        async move {
            let mut summary = RunSummary::new(run_id);

            let session = match connector.connect().await {
                Ok(session) => session,
                Err(e) => {
                    summary.advance(RunState::Fatal);
                    error!(error = %e, "Failed to connect to remote endpoint");
                    return Err(e);
                },
            };
            summary.advance(RunState::Connected);

            let result = self.drive(&session, summary).await;
            drop(session);
            debug!("Remote session closed");
            result
        }
        .instrument(span)
        .await
    }

    /// Process the listing of an already-open session
    pub async fn run_session<S>(&self, session: &S) -> Result<RunSummary>
    where
        S: RemoteFileSource + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary::new(run_id);
        summary.advance(RunState::Connected);

        self.drive(session, summary)
            .instrument(info_span!("ingest_run", %run_id, provider = %self.config.provider))
            .await
    }

    async fn drive<S>(&self, session: &S, mut summary: RunSummary) -> Result<RunSummary>
    where
        S: RemoteFileSource + ?Sized,
    {
        let directory = &self.config.remote_directory;
        let archive_date = self
            .config
            .archive_date
            .unwrap_or_else(|| Local::now().date_naive());

        summary.advance(RunState::Listing);
        let filenames = match session.list(directory).await {
            Ok(names) => names,
            Err(e) => {
                summary.advance(RunState::Fatal);
                error!(directory = %directory, error = %e, "Failed to list remote directory");
                return Err(e);
            },
        };
        summary.listed = filenames.len();
        info!(directory = %directory, files = filenames.len(), "Listed remote directory");

        for (index, filename) in filenames.into_iter().enumerate() {
            summary.advance(RunState::ProcessingFile);
            let handle = RemoteFileHandle::new(directory.clone(), filename);
            let span = info_span!("file", name = %handle.filename, index = index + 1);

            match self
                .process_file(session, &handle, archive_date)
                .instrument(span)
                .await
            {
                Ok(written) => {
                    summary.processed += 1;
                    summary.objects_written += written;
                },
                Err(e) => {
                    warn!(
                        file = %handle,
                        kind = e.kind(),
                        error = %e,
                        "Failed to process file (continuing with next file)"
                    );
                    self.alert_failure(&handle, &e, summary.run_id).await;
                    summary.failed.push(FileFailure {
                        filename: handle.filename,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                },
            }
        }

        summary.advance(RunState::Done);
        info!(
            listed = summary.listed,
            processed = summary.processed,
            failed = summary.failed.len(),
            objects_written = summary.objects_written,
            "Ingestion run completed"
        );

        Ok(summary)
    }

    /// Read, route, commit, then apply the archive policy; returns objects written
    async fn process_file<S>(
        &self,
        session: &S,
        handle: &RemoteFileHandle,
        archive_date: NaiveDate,
    ) -> Result<usize>
    where
        S: RemoteFileSource + ?Sized,
    {
        let path = handle.path();
        let bytes = session.read_all(&path).await?;
        debug!(bytes = bytes.len(), "Read source file");

        let routed = self.router.transform(&handle.filename, &bytes)?;
        drop(bytes);

        let targets = routed.iter().map(|object| object.target.clone()).collect();
        let mut batch = SinkBatch::open(self.sink.as_ref(), targets);
        for (index, object) in routed.iter().enumerate() {
            if let Some(writer) = batch.writer(index) {
                writer.write_all(&object.data)?;
            }
        }
        let receipts = batch.commit().await?;

        self.apply_archive_policy(session, handle, archive_date).await?;

        info!(objects = receipts.len(), "Processed file");
        Ok(receipts.len())
    }

    async fn apply_archive_policy<S>(
        &self,
        session: &S,
        handle: &RemoteFileHandle,
        archive_date: NaiveDate,
    ) -> Result<()>
    where
        S: RemoteFileSource + ?Sized,
    {
        let path = handle.path();
        match &self.config.archive {
            ArchivePolicy::Leave => Ok(()),
            ArchivePolicy::Delete => {
                session.delete(&path).await?;
                info!(path = %path, "Deleted source file");
                Ok(())
            },
            ArchivePolicy::Archive { root } => {
                // Relative roots resolve against the session's working directory
                let archive_dir = ArchivePolicy::archive_directory(root, archive_date);
                let destination = remote_join(&archive_dir, &handle.filename);

                session.mkdir(&archive_dir).await?;
                session.rename(&path, &destination).await?;
                info!(from = %path, to = %destination, "Archived source file");
                Ok(())
            },
        }
    }

    async fn alert_failure(&self, handle: &RemoteFileHandle, err: &CourierError, run_id: Uuid) {
        if self.alerts.is_empty() {
            return;
        }

        let alert = Alert::new(format!("File ingestion failed: {}", handle.filename))
            .fact("Remote path", handle.path())
            .fact("Provider", self.config.provider)
            .fact("Error kind", err.kind())
            .fact("Error", err)
            .fact("Run", run_id);

        self.alerts.dispatch(&alert).await;
    }
}
