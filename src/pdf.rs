use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use lopdf::Document;
use tracing::{debug, warn};

/// Below this many characters the primary extraction is considered failed.
const MIN_PRIMARY_CHARS: usize = 60;

/// Extract text from a PDF on disk. Never fails: unreadable files and
/// failed extractions yield an empty string.
pub fn pdf_to_text(path: &Path) -> String {
    let bytes = match std::fs::read(path).with_context(|| format!("reading {}", path.display())) {
        Ok(b) => b,
        Err(e) => {
            warn!("{:#}", e);
            return String::new();
        }
    };
    let text = pdf_bytes_to_text(&bytes);
    if text.is_empty() {
        warn!("No text extracted from {}", path.display());
    }
    text
}

/// Extract text from in-memory PDF bytes: `pdf-extract` first, then a
/// page-by-page `lopdf` pass when the first result is missing or too short.
pub fn pdf_bytes_to_text(bytes: &[u8]) -> String {
    let primary = match extract_primary(bytes) {
        Ok(t) => t,
        Err(e) => {
            debug!("primary extraction failed: {:#}", e);
            String::new()
        }
    };
    if primary.trim().chars().count() >= MIN_PRIMARY_CHARS {
        return primary;
    }

    match extract_fallback(bytes) {
        Ok(t) => t,
        Err(e) => {
            debug!("fallback extraction failed: {:#}", e);
            String::new()
        }
    }
}

fn extract_primary(bytes: &[u8]) -> Result<String> {
    // pdf-extract panics on some malformed inputs
    catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| anyhow!("pdf-extract panicked"))?
        .map_err(|e| anyhow!("pdf-extract: {}", e))
}

fn extract_fallback(bytes: &[u8]) -> Result<String> {
    let doc = Document::load_mem(bytes).context("lopdf failed to open document")?;
    let mut pages = Vec::new();
    for page in doc.get_pages().keys().copied() {
        match doc.extract_text(&[page]) {
            Ok(t) => pages.push(t),
            Err(e) => debug!("lopdf skipped page {}: {}", page, e),
        }
    }
    Ok(pages.join("\n"))
}
