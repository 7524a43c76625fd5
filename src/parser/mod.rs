pub mod extract;
pub mod review;
pub mod sources;
pub mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};

use extract::MetadataExtractor;

/// Inclusive year range accepted in histograms and exports.
pub const MIN_VALID_YEAR: i32 = 1990;
pub const MAX_VALID_YEAR: i32 = 2025;

/// Facts extracted from one document. `needs_review` is never stored here;
/// it is always derived from these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub sources_mentions: Vec<String>,
    pub time_mentions: Vec<String>,
    pub urls: Vec<String>,
    pub dataset_candidates: Vec<String>,
    pub has_declaration: bool,
    pub availability_section_found: bool,
}

impl Record {
    pub fn needs_review(&self) -> bool {
        review::needs_review(self)
    }
}

/// A processed PDF: the record plus extractor-only outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub pdf_path: String,
    pub pdf_name: String,
    pub record: Record,
    pub years_ai: Vec<i32>,
    pub has_downloadable_data_ai: bool,
    pub notes_ai: String,
    pub text_chars: usize,
    pub needs_review: bool,
}

impl DocumentRecord {
    /// `years_ai` restricted to the valid range.
    pub fn years_in_range(&self) -> Vec<i32> {
        self.years_ai
            .iter()
            .copied()
            .filter(|y| (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(y))
            .collect()
    }
}

/// Pipeline for one document: raw text → normalized text → metadata →
/// record → review flag. The full text doubles as the only time mention.
pub fn process_text(
    pdf_path: &str,
    pdf_name: &str,
    raw_text: &str,
    extractor: &dyn MetadataExtractor,
) -> DocumentRecord {
    let text = text::normalize_text(raw_text);
    let meta = extractor.extract(&text);

    let record = Record {
        sources_mentions: meta.sources_ai,
        time_mentions: vec![text.clone()],
        urls: meta.urls,
        ..Default::default()
    };
    let needs_review = record.needs_review();

    DocumentRecord {
        pdf_path: pdf_path.to_string(),
        pdf_name: pdf_name.to_string(),
        record,
        years_ai: meta.years_ai,
        has_downloadable_data_ai: meta.has_downloadable_data_ai,
        notes_ai: meta.notes_ai,
        text_chars: text.chars().count(),
        needs_review,
    }
}

/// Read a PDF from disk and run it through [`process_text`].
pub fn process_pdf(path: &Path, extractor: &dyn MetadataExtractor) -> DocumentRecord {
    let raw = crate::pdf::pdf_to_text(path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    process_text(&path.display().to_string(), &name, &raw, extractor)
}
