//! Mailbox monitor — converts newly arrived IMAP messages into email
//! log records.

pub mod imap;
pub mod mime;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, MonitorError};
use crate::monitor::imap::ImapSession;
use crate::store::{AttachmentEntry, EmailLogStore, NewEmail};

/// Watches one mailbox and appends a record per unseen message.
///
/// The monitor exclusively owns its IMAP session in a replaceable
/// slot; on a transport failure it logs out best-effort, reconnects,
/// and resumes on the normal poll schedule.
pub struct MailMonitor {
    config: MonitorConfig,
    store: Arc<EmailLogStore>,
    session: Option<ImapSession>,
}

impl MailMonitor {
    pub fn new(config: MonitorConfig, store: Arc<EmailLogStore>) -> Self {
        Self {
            config,
            store,
            session: None,
        }
    }

    async fn connect(&self) -> Result<ImapSession, MonitorError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || ImapSession::connect(&config))
            .await
            .map_err(|e| MonitorError::Connection(format!("connect task: {e}")))?
    }

    /// One poll cycle. Returns the number of messages ingested.
    ///
    /// Errors never escape: a session failure triggers the reconnect
    /// sequence, anything else is logged and counts as "no messages"
    /// for this cycle so the loop resumes on schedule.
    pub async fn poll(&mut self) -> usize {
        let session = match self.session.take() {
            Some(s) => s,
            None => match self.connect().await {
                Ok(s) => {
                    info!(host = %self.config.imap_host, "Connected to IMAP server");
                    s
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to IMAP server");
                    return 0;
                }
            },
        };

        let fetched = tokio::task::spawn_blocking(move || {
            let mut session = session;
            let result = fetch_unseen(&mut session);
            (session, result)
        })
        .await;

        let (session, result) = match fetched {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Poll task panicked");
                return 0;
            }
        };

        match result {
            Ok(raws) => {
                self.session = Some(session);
                let mut ingested = 0;
                for raw in &raws {
                    match self.ingest(raw).await {
                        Ok(subject) => {
                            info!(subject = %subject, "New email received");
                            ingested += 1;
                        }
                        Err(e) => error!(error = %e, "Failed to ingest message"),
                    }
                }
                ingested
            }
            Err(e) if e.is_connection() => {
                warn!(error = %e, "IMAP session aborted, reconnecting");
                tokio::task::spawn_blocking(move || session.logout())
                    .await
                    .ok();
                match self.connect().await {
                    Ok(fresh) => self.session = Some(fresh),
                    Err(e) => error!(error = %e, "Reconnect failed"),
                }
                0
            }
            Err(e) => {
                error!(error = %e, "Error while checking for new emails");
                self.session = Some(session);
                0
            }
        }
    }

    /// Decode one raw message, persist its attachments under sanitized
    /// names, and append the record. Returns the decoded subject.
    async fn ingest(&self, raw: &[u8]) -> Result<String, Error> {
        let parsed = mime::parse_email(raw)?;

        let mut entries = Vec::new();
        for (name, bytes) in parsed.attachments {
            let safe = mime::sanitize_filename(&name);
            if safe.is_empty() {
                warn!(original = %name, "Attachment name sanitized to nothing, skipping");
                continue;
            }
            let path = self.config.attachment_dir.join(&safe);
            tokio::fs::write(&path, &bytes).await?;
            debug!(path = %path.display(), "Attachment saved");
            entries.push(AttachmentEntry::new(safe));
        }

        let subject = parsed.subject.clone();
        self.store
            .append(NewEmail {
                subject: parsed.subject,
                sender: parsed.sender,
                body: parsed.body,
                attachments: entries,
            })
            .await?;
        Ok(subject)
    }

    /// Long-lived loop: poll, and sleep only when the mailbox was
    /// idle — a burst of arrivals is drained by immediate re-polls.
    /// Runs until the shutdown flag is set; the in-flight cycle always
    /// completes and the session is logged out on exit.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        let idle = Duration::from_secs(self.config.poll_interval_secs);
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let ingested = self.poll().await;
            if ingested > 0 {
                continue;
            }
            debug!("No new emails, retrying in {}s", idle.as_secs());
            sleep_unless_stopped(idle, &shutdown).await;
        }

        if let Some(session) = self.session.take() {
            tokio::task::spawn_blocking(move || session.logout())
                .await
                .ok();
        }
        info!("Mailbox monitor stopped");
    }
}

fn fetch_unseen(session: &mut ImapSession) -> Result<Vec<Vec<u8>>, MonitorError> {
    let ids = session.search_unseen()?;
    let mut raws = Vec::with_capacity(ids.len());
    for id in &ids {
        raws.push(session.fetch(id)?);
    }
    Ok(raws)
}

/// Spawn the monitor as an owned background task. Returns the join
/// handle and the shutdown flag; set the flag and await the handle to
/// stop it.
pub fn spawn_monitor(
    config: MonitorConfig,
    store: Arc<EmailLogStore>,
) -> Result<(JoinHandle<()>, Arc<AtomicBool>), Error> {
    std::fs::create_dir_all(&config.attachment_dir)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let monitor = MailMonitor::new(config, store);
    let handle = tokio::spawn(monitor.run(shutdown));
    Ok((handle, flag))
}

/// Sleep in short slices so a stop request is observed promptly.
pub(crate) async fn sleep_unless_stopped(total: Duration, shutdown: &AtomicBool) {
    let slice = Duration::from_millis(500);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(slice.min(total - elapsed)).await;
        elapsed += slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_config(attachment_dir: std::path::PathBuf) -> MonitorConfig {
        MonitorConfig {
            imap_host: "127.0.0.1".to_string(),
            imap_port: 1,
            account: "user".to_string(),
            password: SecretString::from("pass"),
            mailbox: "INBOX".to_string(),
            poll_interval_secs: 60,
            attachment_dir,
        }
    }

    #[tokio::test]
    async fn sleep_returns_early_when_stopped() {
        let flag = AtomicBool::new(true);
        let started = std::time::Instant::now();
        sleep_unless_stopped(Duration::from_secs(60), &flag).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn spawn_creates_attachment_dir_and_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("attachments");
        let store = Arc::new(crate::store::EmailLogStore::open_in_memory().await.unwrap());

        let (handle, stop) = spawn_monitor(test_config(dir.clone()), store).unwrap();
        assert!(dir.exists());

        stop.store(true, Ordering::Relaxed);
        handle.abort();
    }

    #[tokio::test]
    async fn ingest_persists_attachments_and_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::EmailLogStore::open_in_memory().await.unwrap());
        let monitor = MailMonitor::new(test_config(tmp.path().to_path_buf()), Arc::clone(&store));

        let raw = b"From: alice@example.com\r\n\
                    Subject: circular\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
                    \r\n\
                    --XX\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    please read\r\n\
                    --XX\r\n\
                    Content-Type: application/pdf; name=\"a b.pdf\"\r\n\
                    Content-Disposition: attachment; filename=\"a b.pdf\"\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    aGVsbG8=\r\n\
                    --XX--\r\n";

        let subject = monitor.ingest(raw).await.unwrap();
        assert_eq!(subject, "circular");

        // Sanitized name on disk and in the record
        assert!(tmp.path().join("ab.pdf").exists());
        let records = store.list_unprocessed().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attachments[0].file, "ab.pdf");
        assert_eq!(records[0].body, "please read");
        assert!(!records[0].processed);
    }
}
