//! PDF text extraction — text layer first, OCR fallback for scanned
//! documents.

use std::path::Path;

use lopdf::Object;
use tracing::debug;

use crate::error::ExtractError;

/// Extract text from a PDF.
///
/// Tries the text layer across all pages first. When that yields
/// nothing (a scanned, image-only PDF), every embedded image is run
/// through OCR and the per-image output is concatenated. The fallback
/// is mandatory: a PDF without a text layer must not surface as "no
/// text" when OCR can still produce something.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let text =
        pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    if !text.trim().is_empty() {
        return Ok(text);
    }

    debug!(path = %path.display(), "Empty text layer, falling back to OCR");
    let pages = ocr_embedded_images(path)?;
    Ok(pages.join("\n"))
}

/// OCR every embedded image in the document, one output string per
/// image that decodes. Undecodable image streams (e.g. raw FlateDecode
/// pixel data without a recognizable container) are skipped.
///
/// Objects iterate in id order, which tracks document order for the
/// generator-produced PDFs we see in practice.
pub fn ocr_embedded_images(path: &Path) -> Result<Vec<String>, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut texts = Vec::new();
    for (object_id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Image".as_slice())
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        let Ok(decoded) = image::load_from_memory(&stream.content) else {
            debug!(object = ?object_id, "Skipping undecodable embedded image");
            continue;
        };
        texts.push(ocr_image(&decoded)?);
    }
    Ok(texts)
}

fn ocr_image(img: &image::DynamicImage) -> Result<String, ExtractError> {
    let tess_img = rusty_tesseract::Image::from_dynamic_image(img)
        .map_err(|e| ExtractError::Ocr(e.to_string()))?;
    rusty_tesseract::image_to_string(&tess_img, &rusty_tesseract::Args::default())
        .map_err(|e| ExtractError::Ocr(e.to_string()))
}
