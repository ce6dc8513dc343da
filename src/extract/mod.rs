//! Content extraction — per-format strategies producing plain text
//! from attachment files on disk.
//!
//! Dispatch is a pure mapping from file extension to a closed set of
//! strategies. New formats are added as a new variant, not by deeper
//! branching inside an existing one.

pub mod doc;
pub mod pdf;

use std::path::Path;

use crate::error::ExtractError;

/// Extraction strategy for one attachment, selected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Text layer first, OCR over embedded images as fallback.
    Pdf,
    /// Paragraph text from .docx / legacy .doc.
    Doc,
    /// Recognized but not extractable (images, unknown formats).
    Skip,
}

impl Strategy {
    /// Pure extension → strategy mapping. Images (jpg/jpeg/png/gif)
    /// and unknown extensions map to [`Strategy::Skip`]: callers get
    /// "no text produced", not an error.
    pub fn for_filename(name: &str) -> Self {
        match extension(name).as_str() {
            "pdf" => Self::Pdf,
            "doc" | "docx" => Self::Doc,
            _ => Self::Skip,
        }
    }

    /// Run the strategy against a file on disk.
    ///
    /// Returns `Ok(None)` for [`Strategy::Skip`], `Ok(Some(text))`
    /// otherwise (text may be empty for a genuinely blank document).
    pub fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError> {
        match self {
            Self::Pdf => pdf::extract_text(path).map(Some),
            Self::Doc => doc::extract_text(path).map(Some),
            Self::Skip => Ok(None),
        }
    }
}

/// Extraction seam used by the orchestrator; the production
/// implementation dispatches on extension, tests substitute fakes.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError>;
}

/// Extension-based dispatch over the [`Strategy`] set.
pub struct ExtensionDispatch;

impl ContentExtractor for ExtensionDispatch {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Strategy::for_filename(&name).extract(path)
    }
}

/// Lowercased extension of a filename, empty when there is none.
pub(crate) fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
