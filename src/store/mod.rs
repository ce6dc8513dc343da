//! Persistence layer — libSQL-backed email log.

pub mod email_log;
pub mod model;

pub use email_log::EmailLogStore;
pub use model::{AttachmentEntry, EmailRecord, NewEmail, SummaryEntry};
