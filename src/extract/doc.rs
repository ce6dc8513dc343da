//! Word document text extraction — .docx via docx-rs, legacy .doc via
//! the antiword subprocess.

use std::path::Path;
use std::process::Command;

use docx_rs::{DocumentChild, Paragraph, ParagraphChild, Run, RunChild};

use crate::error::ExtractError;

/// Extract concatenated paragraph text in document order.
///
/// Any extension other than .doc/.docx reaching this strategy is an
/// explicit [`ExtractError::UnsupportedFormat`], never silently empty
/// text.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    match super::extension(&path.to_string_lossy()).as_str() {
        "docx" => extract_docx(path),
        "doc" => extract_doc(path),
        other => Err(ExtractError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Doc(format!("{e:?}")))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(p) => Some(paragraph_text(p)),
            _ => None,
        })
        .collect();
    Ok(paragraphs.join("\n"))
}

/// Legacy binary .doc has no pure-Rust reader; antiword does the job
/// the way textract-style toolchains do.
fn extract_doc(path: &Path) -> Result<String, ExtractError> {
    let output = Command::new("antiword")
        .arg(path)
        .output()
        .map_err(|e| ExtractError::Doc(format!("antiword: {e}")))?;

    if !output.status.success() {
        return Err(ExtractError::Doc(format!(
            "antiword exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Visible text of one paragraph, runs concatenated in order.
fn paragraph_text(paragraph: &Paragraph) -> String {
    paragraph
        .children
        .iter()
        .filter_map(|child| match child {
            ParagraphChild::Run(run) => Some(run_text(run)),
            _ => None,
        })
        .collect()
}

fn run_text(run: &Run) -> String {
    run.children
        .iter()
        .filter_map(|child| match child {
            RunChild::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}
