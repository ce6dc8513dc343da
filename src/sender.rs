//! Outbound forwarding of processed records.
//!
//! One-shot per call: compose a transformed message and submit it to
//! every configured recipient over SMTP with implicit TLS. No retry
//! and no state; a failed recipient is reported in the outcome list
//! and never blocks the others.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use pulldown_cmark::{Options, Parser, html};
use secrecy::ExposeSecret;
use tracing::{error, info};

use crate::config::SenderConfig;
use crate::error::SendError;
use crate::store::EmailRecord;

/// Subject and markdown body derived from a processed record.
#[derive(Debug, PartialEq)]
pub struct Outbound {
    pub subject: String,
    pub body: String,
}

/// Build the forwarded form of a record: prefixed subject, rewritten
/// body (original body if no rewrite exists) followed by one line per
/// attachment summary.
pub fn transform(record: &EmailRecord) -> Outbound {
    let subject = format!("Digest: {}", record.subject);

    let mut body = record
        .rewritten_body
        .as_deref()
        .unwrap_or(&record.body)
        .to_string();
    if let Some(summaries) = &record.summaries
        && !summaries.is_empty()
    {
        let lines: Vec<String> = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Attachment {}: {}", i + 1, s.text))
            .collect();
        body.push_str("\n\n");
        body.push_str(&lines.join("\n"));
    }

    Outbound { subject, body }
}

/// Render markdown to an HTML fragment for the alternate MIME part.
pub fn markdown_to_html(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::empty());
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Per-recipient delivery result.
#[derive(Debug, serde::Serialize)]
pub struct SendOutcome {
    pub record_id: i64,
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

/// SMTP submission client for the configured recipient list.
pub struct MailSender {
    config: SenderConfig,
    transport: SmtpTransport,
}

impl MailSender {
    pub fn new(config: SenderConfig) -> Result<Self, SendError> {
        // relay() means implicit TLS on the submissions port, matching
        // the SMTP_SSL behavior this deployment expects.
        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| SendError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.account.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build();
        Ok(Self { config, transport })
    }

    /// Forward one record to every configured recipient, returning one
    /// outcome per recipient in configuration order.
    pub async fn forward(&self, record: &EmailRecord) -> Result<Vec<SendOutcome>, SendError> {
        let outbound = transform(record);
        let html_body = markdown_to_html(&outbound.body);
        let from: Mailbox =
            self.config
                .account
                .parse()
                .map_err(|e| SendError::InvalidAddress {
                    address: self.config.account.clone(),
                    reason: format!("{e}"),
                })?;

        let mut messages = Vec::with_capacity(self.config.recipients.len());
        for recipient in &self.config.recipients {
            let to: Mailbox = recipient.parse().map_err(|e| SendError::InvalidAddress {
                address: recipient.clone(),
                reason: format!("{e}"),
            })?;
            let message = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(&outbound.subject)
                .multipart(MultiPart::alternative_plain_html(
                    outbound.body.clone(),
                    html_body.clone(),
                ))
                .map_err(|e| SendError::Compose(e.to_string()))?;
            messages.push((recipient.clone(), message));
        }

        let transport = self.transport.clone();
        let record_id = record.id;
        let outcomes = tokio::task::spawn_blocking(move || {
            messages
                .into_iter()
                .map(|(recipient, message)| match transport.send(&message) {
                    Ok(_) => {
                        info!(id = record_id, recipient = %recipient, "Email forwarded");
                        SendOutcome {
                            record_id,
                            recipient,
                            success: true,
                            error: None,
                        }
                    }
                    Err(e) => {
                        error!(id = record_id, recipient = %recipient, error = %e, "Forwarding failed");
                        SendOutcome {
                            record_id,
                            recipient,
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                })
                .collect()
        })
        .await
        .map_err(|e| SendError::Transport(format!("send task: {e}")))?;

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secrecy::SecretString;

    use crate::store::{AttachmentEntry, SummaryEntry};

    fn processed_record() -> EmailRecord {
        EmailRecord {
            id: 7,
            subject: "School circular".to_string(),
            sender: "alice@example.com".to_string(),
            body: "original body".to_string(),
            attachments: vec![
                AttachmentEntry {
                    file: "a.pdf".to_string(),
                    text: Some("long text".to_string()),
                },
                AttachmentEntry::new("b.png"),
            ],
            rewritten_body: Some("**short** version".to_string()),
            summaries: Some(vec![
                SummaryEntry {
                    file: "a.pdf".to_string(),
                    text: "first summary".to_string(),
                },
                SummaryEntry {
                    file: "c.docx".to_string(),
                    text: "second summary".to_string(),
                },
            ]),
            processed: true,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn transform_prefixes_subject_and_appends_summary_lines() {
        let out = transform(&processed_record());
        assert_eq!(out.subject, "Digest: School circular");
        assert_eq!(
            out.body,
            "**short** version\n\n\
             Attachment 1: first summary\n\
             Attachment 2: second summary"
        );
    }

    #[test]
    fn transform_without_rewrite_or_summaries_uses_original_body() {
        let mut record = processed_record();
        record.rewritten_body = None;
        record.summaries = None;
        let out = transform(&record);
        assert_eq!(out.body, "original body");

        record.summaries = Some(vec![]);
        assert_eq!(transform(&record).body, "original body");
    }

    #[test]
    fn markdown_renders_to_html_fragment() {
        let html = markdown_to_html("**bold** and *italic*");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>italic</em>"));
    }

    #[tokio::test]
    async fn sender_rejects_invalid_account_address() {
        let config = SenderConfig {
            smtp_host: "mail.example.com".to_string(),
            smtp_port: 465,
            account: "not an address".to_string(),
            password: SecretString::from("secret"),
            recipients: vec!["bob@example.com".to_string()],
        };
        let sender = MailSender::new(config).unwrap();
        let err = sender.forward(&processed_record()).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidAddress { .. }));
    }

    #[test]
    fn message_composes_for_valid_addresses() {
        let out = transform(&processed_record());
        let message = Message::builder()
            .from("svc@example.com".parse().unwrap())
            .to("bob@example.com".parse().unwrap())
            .subject(&out.subject)
            .multipart(MultiPart::alternative_plain_html(
                out.body.clone(),
                markdown_to_html(&out.body),
            ))
            .unwrap();
        let rendered = String::from_utf8(message.formatted()).unwrap();
        assert!(rendered.contains("Digest: School circular"));
        assert!(rendered.contains("multipart/alternative"));
    }
}
