//! MIME decoding for fetched messages.
//!
//! `mail-parser` does the heavy lifting: RFC 2047 header decoding,
//! charset handling with replacement for undecodable bytes, and the
//! part walk for attachments.

use mail_parser::{MessageParser, MimeHeaders};

use crate::error::MonitorError;

/// A decoded inbound message, ready for ingestion.
#[derive(Debug)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// (original filename, raw bytes) for every part bearing a filename.
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Decode a raw RFC 822 message.
///
/// Body selection: first `text/plain` part of a multipart message, or
/// the single body otherwise, decoded with the part's declared charset
/// (UTF-8 with substitution as fallback). A multipart message whose
/// only text part is empty yields an empty body, not an error.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail, MonitorError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MonitorError::Parse("unparseable message".into()))?;

    let subject = parsed.subject().unwrap_or_default().to_string();
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    let body = parsed
        .body_text(0)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let mut attachments = Vec::new();
    for part in parsed.attachments() {
        let Some(name) = part.attachment_name() else {
            continue;
        };
        attachments.push((name.to_string(), part.contents().to_vec()));
    }

    Ok(ParsedEmail {
        subject,
        sender,
        body,
        attachments,
    })
}

/// Restrict a filename to `[A-Za-z0-9._-]`.
///
/// An order-preserving filter: everything else (path separators,
/// control characters, spaces) is dropped, so the result is safe as a
/// storage key under the attachment directory.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2047_subject_is_decoded() {
        let raw = b"From: alice@example.com\r\n\
                    Subject: =?UTF-8?B?VGVzdA==?=\r\n\
                    \r\n\
                    body text\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.subject, "Test");
        assert_eq!(parsed.sender, "alice@example.com");
        assert_eq!(parsed.body, "body text");
    }

    #[test]
    fn multipart_with_empty_text_part_yields_empty_body() {
        let raw = b"From: a@b.example\r\n\
                    Subject: hi\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
                    \r\n\
                    --XX\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    \r\n\
                    --XX--\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn attachments_carry_original_names_and_bytes() {
        let raw = b"From: a@b.example\r\n\
                    Subject: doc\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
                    \r\n\
                    --XX\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    see attached\r\n\
                    --XX\r\n\
                    Content-Type: application/pdf; name=\"rep ort.pdf\"\r\n\
                    Content-Disposition: attachment; filename=\"rep ort.pdf\"\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    aGVsbG8=\r\n\
                    --XX--\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.body, "see attached");
        assert_eq!(parsed.attachments.len(), 1);
        assert_eq!(parsed.attachments[0].0, "rep ort.pdf");
        assert_eq!(parsed.attachments[0].1, b"hello");
    }

    #[test]
    fn garbage_bytes_do_not_panic() {
        // mail-parser is lenient; either outcome is fine as long as it
        // does not panic and missing headers become defaults.
        if let Ok(parsed) = parse_email(b"\xff\xfe\x00garbage") {
            assert_eq!(parsed.sender, "unknown");
        }
    }

    // ── Sanitization ────────────────────────────────────────────────

    #[test]
    fn sanitize_keeps_allowed_charset_only() {
        assert_eq!(sanitize_filename("rep ort?.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_filename("caffè_2024-01.docx"), "caff_2024-01.docx");
        assert_eq!(sanitize_filename("\x00\x1b[2Jrm -rf"), "2Jrm-rf");
    }

    #[test]
    fn sanitize_is_an_order_preserving_filter() {
        let input = "a!b@c#1.2_3-x";
        let output = sanitize_filename(input);
        assert_eq!(output, "abc1.2_3-x");
        // Every output char appears in the input in the same order.
        let mut rest = input.chars();
        for c in output.chars() {
            assert!(rest.any(|i| i == c));
        }
        assert!(
            output
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        );
    }

    #[test]
    fn sanitize_can_empty_a_name() {
        assert_eq!(sanitize_filename("???"), "");
        assert_eq!(sanitize_filename(""), "");
    }
}
