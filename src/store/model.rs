//! The durable record representing one ingested message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a record's attachment list.
///
/// `file` is the sanitized storage key under the attachment directory.
/// `text` is populated by the orchestrator: `Some` once extraction ran
/// and produced output (possibly empty for a blank document), `None`
/// for formats that yield no text or before processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentEntry {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AttachmentEntry {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            text: None,
        }
    }
}

/// A generated summary for one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub file: String,
    pub text: String,
}

/// One ingested email and its processing state.
///
/// Created by the mailbox monitor with `processed = false`; mutated by
/// the orchestrator exactly once per processing pass, which populates
/// `rewritten_body` and `summaries` and flips `processed`. `id` and
/// `received_at` are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: i64,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub attachments: Vec<AttachmentEntry>,
    pub rewritten_body: Option<String>,
    pub summaries: Option<Vec<SummaryEntry>>,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
}

/// Fields supplied by the monitor when appending a new record.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub attachments: Vec<AttachmentEntry>,
}
