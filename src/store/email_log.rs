//! libSQL-backed email log — the single source of truth shared by the
//! monitor and the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::store::model::{AttachmentEntry, EmailRecord, NewEmail, SummaryEntry};

const COLUMNS: &str =
    "id, subject, sender, body, attachments, rewritten_body, summaries, processed, received_at";

/// Durable CRUD over [`EmailRecord`]s.
///
/// `libsql::Connection` is `Send + Sync`; the monitor, the sweep loop
/// and the API share one store behind an `Arc`. Each statement commits
/// on its own, so `append` and `replace` are atomic per record.
pub struct EmailLogStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl EmailLogStore {
    /// Open the store, retrying a bounded number of times with fixed
    /// backoff. The service cannot run without its store, so exhausting
    /// the retries is a startup-abort condition for the caller.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut last_err = String::new();
        for attempt in 1..=config.connect_retries {
            match Self::open(&config.db_path).await {
                Ok(store) => return Ok(store),
                Err(e) => {
                    warn!(
                        attempt,
                        retries = config.connect_retries,
                        error = %e,
                        "Store connection failed"
                    );
                    last_err = e.to_string();
                }
            }
            if attempt < config.connect_retries {
                tokio::time::sleep(Duration::from_secs(config.connect_backoff_secs)).await;
            }
        }
        Err(StoreError::Connection(format!(
            "gave up after {} attempts: {last_err}",
            config.connect_retries
        )))
    }

    async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Connection(format!("create {}: {e}", parent.display())))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Email log store opened");
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(std::path::Path::new(":memory:")).await
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS email_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    body TEXT NOT NULL,
                    attachments TEXT NOT NULL,
                    rewritten_body TEXT,
                    summaries TEXT,
                    processed INTEGER NOT NULL DEFAULT 0,
                    received_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }

    /// Append a new record with `processed = false` and `received_at`
    /// set to the current time. Returns the stored record with its
    /// assigned identifier.
    pub async fn append(&self, new: NewEmail) -> Result<EmailRecord, StoreError> {
        let received_at = Utc::now();
        let attachments_json = serde_json::to_string(&new.attachments)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO email_log (subject, sender, body, attachments, processed, received_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    new.subject.clone(),
                    new.sender.clone(),
                    new.body.clone(),
                    attachments_json,
                    received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append: {e}")))?;

        let id = self.conn.last_insert_rowid();
        Ok(EmailRecord {
            id,
            subject: new.subject,
            sender: new.sender,
            body: new.body,
            attachments: new.attachments,
            rewritten_body: None,
            summaries: None,
            processed: false,
            received_at,
        })
    }

    /// All records with `processed = false`. No ordering guarantee.
    pub async fn list_unprocessed(&self) -> Result<Vec<EmailRecord>, StoreError> {
        self.query_records(
            &format!("SELECT {COLUMNS} FROM email_log WHERE processed = 0"),
            "list_unprocessed",
        )
        .await
    }

    /// All records, oldest first.
    pub async fn list_all(&self) -> Result<Vec<EmailRecord>, StoreError> {
        self.query_records(
            &format!("SELECT {COLUMNS} FROM email_log ORDER BY id ASC"),
            "list_all",
        )
        .await
    }

    /// Fetch a single record by identifier.
    pub async fn get(&self, id: i64) -> Result<Option<EmailRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM email_log WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?
        {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a full record by identifier. `received_at` is never
    /// rewritten: the stored value stays authoritative. A single UPDATE
    /// statement commits all-or-nothing per record; on failure the
    /// previous state remains visible.
    pub async fn replace(&self, record: &EmailRecord) -> Result<(), StoreError> {
        let attachments_json = serde_json::to_string(&record.attachments)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let summaries_json = match &record.summaries {
            Some(s) => libsql::Value::Text(
                serde_json::to_string(s).map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
            None => libsql::Value::Null,
        };
        let rewritten = match &record.rewritten_body {
            Some(b) => libsql::Value::Text(b.clone()),
            None => libsql::Value::Null,
        };

        let changed = self
            .conn
            .execute(
                "UPDATE email_log
                 SET subject = ?1, sender = ?2, body = ?3, attachments = ?4,
                     rewritten_body = ?5, summaries = ?6, processed = ?7
                 WHERE id = ?8",
                params![
                    record.subject.clone(),
                    record.sender.clone(),
                    record.body.clone(),
                    attachments_json,
                    rewritten,
                    summaries_json,
                    i64::from(record.processed),
                    record.id,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("replace: {e}")))?;

        if changed == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn query_records(&self, sql: &str, op: &str) -> Result<Vec<EmailRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(sql, ())
            .await
            .map_err(|e| StoreError::Query(format!("{op}: {e}")))?;

        let mut records = Vec::new();
        loop {
            // A driver failure mid-iteration is a real error, not an
            // early end of the result set.
            let row = rows
                .next()
                .await
                .map_err(|e| StoreError::Query(format!("{op}: {e}")))?;
            let Some(row) = row else {
                break;
            };
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping malformed email_log row"),
            }
        }
        Ok(records)
    }
}

/// Map a libsql row to an [`EmailRecord`]. Column order matches `COLUMNS`.
fn row_to_record(row: &libsql::Row) -> Result<EmailRecord, StoreError> {
    let attachments_json: String = row
        .get(4)
        .map_err(|e| StoreError::Query(format!("attachments column: {e}")))?;
    let attachments: Vec<AttachmentEntry> = serde_json::from_str(&attachments_json)
        .map_err(|e| StoreError::Serialization(format!("attachments: {e}")))?;

    let summaries_json: Option<String> = row.get(6).ok();
    let summaries: Option<Vec<SummaryEntry>> = match summaries_json {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| StoreError::Serialization(format!("summaries: {e}")))?,
        ),
        None => None,
    };

    let received_str: String = row
        .get(8)
        .map_err(|e| StoreError::Query(format!("received_at column: {e}")))?;
    let received_at = parse_datetime(&received_str)?;

    let processed: i64 = row
        .get(7)
        .map_err(|e| StoreError::Query(format!("processed column: {e}")))?;

    Ok(EmailRecord {
        id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("id column: {e}")))?,
        subject: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("subject column: {e}")))?,
        sender: row
            .get(2)
            .map_err(|e| StoreError::Query(format!("sender column: {e}")))?,
        body: row
            .get(3)
            .map_err(|e| StoreError::Query(format!("body column: {e}")))?,
        attachments,
        rewritten_body: row.get(5).ok(),
        summaries,
        processed: processed != 0,
        received_at,
    })
}

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("received_at {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> EmailLogStore {
        EmailLogStore::open_in_memory().await.unwrap()
    }

    fn new_email(subject: &str) -> NewEmail {
        NewEmail {
            subject: subject.to_string(),
            sender: "alice@example.com".to_string(),
            body: "hello".to_string(),
            attachments: vec![AttachmentEntry::new("a.pdf")],
        }
    }

    #[tokio::test]
    async fn append_assigns_sequential_ids() {
        let store = test_store().await;
        let first = store.append(new_email("one")).await.unwrap();
        let second = store.append(new_email("two")).await.unwrap();
        assert!(second.id > first.id);
        assert!(!first.processed);
        assert!(first.rewritten_body.is_none());
        assert!(first.summaries.is_none());
    }

    #[tokio::test]
    async fn get_returns_stored_record() {
        let store = test_store().await;
        let appended = store.append(new_email("subject")).await.unwrap();
        let fetched = store.get(appended.id).await.unwrap().unwrap();
        assert_eq!(fetched.subject, "subject");
        assert_eq!(fetched.attachments, appended.attachments);
        assert_eq!(fetched.received_at, appended.received_at);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = test_store().await;
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_unprocessed_excludes_replaced_record() {
        let store = test_store().await;
        let first = store.append(new_email("one")).await.unwrap();
        let second = store.append(new_email("two")).await.unwrap();

        let mut processed = first.clone();
        processed.rewritten_body = Some("rewritten".to_string());
        processed.summaries = Some(vec![]);
        processed.processed = true;
        store.replace(&processed).await.unwrap();

        let unprocessed = store.list_unprocessed().await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].id, second.id);
    }

    #[tokio::test]
    async fn replace_preserves_received_at() {
        let store = test_store().await;
        let appended = store.append(new_email("one")).await.unwrap();

        let mut updated = appended.clone();
        updated.rewritten_body = Some("short".to_string());
        updated.summaries = Some(vec![SummaryEntry {
            file: "a.pdf".to_string(),
            text: "summary".to_string(),
        }]);
        updated.processed = true;
        store.replace(&updated).await.unwrap();

        let fetched = store.get(appended.id).await.unwrap().unwrap();
        assert_eq!(fetched.received_at, appended.received_at);
        assert!(fetched.processed);
        assert_eq!(fetched.rewritten_body.as_deref(), Some("short"));
        assert_eq!(fetched.summaries.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_missing_record_is_not_found() {
        let store = test_store().await;
        let mut ghost = store.append(new_email("one")).await.unwrap();
        ghost.id = 424_242;
        let err = store.replace(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(424_242)));
    }

    #[tokio::test]
    async fn corrupted_received_at_is_a_typed_error_on_get() {
        let store = test_store().await;
        store
            .conn
            .execute(
                "INSERT INTO email_log (subject, sender, body, attachments, processed, received_at)
                 VALUES ('bad', 'x@y.example', 'body', '[]', 0, 'not-a-timestamp')",
                (),
            )
            .await
            .unwrap();
        let id = store.conn.last_insert_rowid();

        let err = store.get(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn list_skips_malformed_rows_but_returns_the_rest() {
        let store = test_store().await;
        store.append(new_email("good")).await.unwrap();
        store
            .conn
            .execute(
                "INSERT INTO email_log (subject, sender, body, attachments, processed, received_at)
                 VALUES ('bad', 'x@y.example', 'body', 'not json', 0, '2024-01-01T00:00:00+00:00')",
                (),
            )
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subject, "good");

        let unprocessed = store.list_unprocessed().await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].subject, "good");
    }

    #[tokio::test]
    async fn list_all_returns_everything() {
        let store = test_store().await;
        store.append(new_email("one")).await.unwrap();
        store.append(new_email("two")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }
}
