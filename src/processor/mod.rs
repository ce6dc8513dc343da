//! Processing orchestrator — advances unprocessed records through
//! rewriting and summarization, then commits the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{Error, ExtractError, StoreError};
use crate::extract::{ContentExtractor, ExtensionDispatch};
use crate::gateway::TextGenerator;
use crate::store::{AttachmentEntry, EmailLogStore, EmailRecord, SummaryEntry};

const REWRITE_PROMPT: &str = "Rewrite the following email body as a short, clear message. \
Keep every factual detail, drop boilerplate and pleasantries. \
Reply with the rewritten text only.";

const SUMMARY_PROMPT: &str = "Summarize the following document in a few sentences. \
Reply with the summary only.";

/// Orchestrates one record at a time: rewrite the body, extract and
/// summarize attachments, commit.
pub struct Processor {
    store: Arc<EmailLogStore>,
    gateway: Arc<dyn TextGenerator>,
    extractor: Arc<dyn ContentExtractor>,
    attachment_dir: PathBuf,
}

impl Processor {
    pub fn new(
        store: Arc<EmailLogStore>,
        gateway: Arc<dyn TextGenerator>,
        attachment_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            gateway,
            extractor: Arc::new(ExtensionDispatch),
            attachment_dir,
        }
    }

    /// Substitute the extraction dispatch (tests).
    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Process a single record end to end.
    ///
    /// Nothing is committed until the full result is assembled, so any
    /// failure along the way leaves the record unprocessed and
    /// eligible for retry on the next sweep. Attachments that yield no
    /// text keep their entry but produce no summary. A failed
    /// generation call fails the whole record rather than committing a
    /// partial result.
    pub async fn process_one(&self, record: EmailRecord) -> Result<EmailRecord, Error> {
        let rewritten = self
            .gateway
            .generate(&format!("{REWRITE_PROMPT}\n\n{}", record.body))
            .await?;

        let mut attachments = Vec::with_capacity(record.attachments.len());
        let mut summaries = Vec::new();
        for entry in &record.attachments {
            let text = self.extract(&entry.file).await?;
            if let Some(t) = &text
                && !t.trim().is_empty()
            {
                let summary = self
                    .gateway
                    .generate(&format!("{SUMMARY_PROMPT}\n\n{t}"))
                    .await?;
                summaries.push(SummaryEntry {
                    file: entry.file.clone(),
                    text: summary,
                });
            }
            attachments.push(AttachmentEntry {
                file: entry.file.clone(),
                text,
            });
        }

        let processed = EmailRecord {
            id: record.id,
            subject: record.subject,
            sender: record.sender,
            body: record.body,
            attachments,
            rewritten_body: Some(rewritten),
            summaries: Some(summaries),
            processed: true,
            received_at: record.received_at,
        };
        self.store.replace(&processed).await?;
        Ok(processed)
    }

    async fn extract(&self, file: &str) -> Result<Option<String>, Error> {
        let path = self.attachment_dir.join(file);
        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| {
                Error::Extract(ExtractError::Io(std::io::Error::other(e.to_string())))
            })?
            .map_err(Error::Extract)
    }

    /// On-demand synchronous processing of one identifier. Permitted
    /// for already-processed records; the new result overwrites the
    /// old (last writer wins).
    pub async fn process_by_id(&self, id: i64) -> Result<EmailRecord, Error> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(Error::Store(StoreError::NotFound(id)))?;
        self.process_one(record).await
    }

    /// One pass over all unprocessed records. A failure on one record
    /// never aborts the rest of the sweep.
    pub async fn sweep(&self) {
        let unprocessed = match self.store.list_unprocessed().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to read unprocessed records");
                return;
            }
        };
        if unprocessed.is_empty() {
            return;
        }

        info!("Processing {} unprocessed record(s)", unprocessed.len());
        for record in unprocessed {
            let id = record.id;
            match self.process_one(record).await {
                Ok(_) => info!(id, "Record processed"),
                Err(e) => error!(id, error = %e, "Record processing failed"),
            }
        }
    }
}

/// Spawn the fixed-cadence sweep loop. No backoff or jitter; a sweep,
/// then `interval` of sleep, repeated until the flag is set. The wait
/// is sliced so a stop request is observed promptly rather than at the
/// next interval boundary.
pub fn spawn_sweeper(
    processor: Arc<Processor>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Sweep loop started, every {}s", interval.as_secs());
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Sweep loop stopped");
                return;
            }
            processor.sweep().await;
            crate::monitor::sleep_unless_stopped(interval, &shutdown).await;
        }
    });

    (handle, flag)
}
