use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use super::sources::normalize_source_name;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s)"'>]+"#).unwrap());

pub const EXTRACTION_NOTE: &str = "rule-based extraction; replace with LLM/NER in the future";
pub const EMPTY_TEXT_NOTE: &str = "empty text";

/// Phrases searched (as lowercase substrings) to detect cited data providers.
pub const SOURCE_PHRASES: &[&str] = &[
    "world bank",
    "world bank group",
    "wdi",
    "world development indicators",
    "pip",
    "poverty and inequality platform",
    "imf",
    "international monetary fund",
    "world health organization",
    "who",
    "unicef",
    "unesco",
];

/// Phrases that suggest the underlying data can be downloaded.
pub const DOWNLOAD_PHRASES: &[&str] = &[
    "download the data",
    "data can be downloaded",
    "available for download",
    "data are available at",
    "data is available at",
    "dataset is available at",
    "this data is available at",
    "publicly available data",
    "can be accessed at",
    "available online at",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMetadata {
    pub sources_ai: Vec<String>,
    pub years_ai: Vec<i32>,
    pub urls: Vec<String>,
    pub has_downloadable_data_ai: bool,
    pub notes_ai: String,
}

/// Turns normalized document text into metadata. The review rules only
/// consume the resulting record, so any extraction method can sit here.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, text: &str) -> ExtractedMetadata;
}

/// Keyword and regex matching over the lowercased text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExtractor;

impl MetadataExtractor for KeywordExtractor {
    fn extract(&self, text: &str) -> ExtractedMetadata {
        if text.is_empty() {
            return ExtractedMetadata {
                notes_ai: EMPTY_TEXT_NOTE.to_string(),
                ..Default::default()
            };
        }

        let lowered = text.to_lowercase();

        let mut sources_ai: Vec<String> = Vec::new();
        for &phrase in SOURCE_PHRASES {
            if !lowered.contains(phrase) {
                continue;
            }
            if let Some(name) = normalize_source_name(Some(phrase)) {
                if !sources_ai.contains(&name) {
                    sources_ai.push(name);
                }
            }
        }

        let years_ai: Vec<i32> = extract_years(&lowered)
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let has_downloadable_data_ai = DOWNLOAD_PHRASES.iter().any(|kw| lowered.contains(kw));

        ExtractedMetadata {
            sources_ai,
            years_ai,
            urls: extract_urls(text),
            has_downloadable_data_ai,
            notes_ai: EXTRACTION_NOTE.to_string(),
        }
    }
}

/// Every `19xx` / `20xx` token in order of appearance. Tokens that do not
/// parse as plain ASCII integers are skipped.
pub fn extract_years(text: &str) -> Vec<i32> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .collect()
}

/// All http(s) URLs in order of appearance, duplicates included.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_short_circuits() {
        let meta = KeywordExtractor.extract("");
        assert!(meta.sources_ai.is_empty());
        assert!(meta.years_ai.is_empty());
        assert!(meta.urls.is_empty());
        assert!(!meta.has_downloadable_data_ai);
        assert_eq!(meta.notes_ai, EMPTY_TEXT_NOTE);
    }

    #[test]
    fn sources_are_canonical_and_deduplicated() {
        let meta = KeywordExtractor.extract(
            "Data from the World Bank Group and the WDI database; see also World Development Indicators.",
        );
        assert_eq!(meta.sources_ai, vec!["world bank", "world development indicators"]);
    }

    #[test]
    fn substring_matching_accepts_false_positives() {
        // "who" inside "whole" still counts
        let meta = KeywordExtractor.extract("The whole sample.");
        assert_eq!(meta.sources_ai, vec!["who"]);
    }

    #[test]
    fn years_sorted_unique() {
        let meta = KeywordExtractor.extract("1999 and 2099, again 1999; not 2150 or 19999");
        assert_eq!(meta.years_ai, vec![1999, 2099]);
    }

    #[test]
    fn downloadability_phrases() {
        assert!(KeywordExtractor.extract("The data are AVAILABLE FOR DOWNLOAD here").has_downloadable_data_ai);
        assert!(KeywordExtractor.extract("It can be accessed at the portal").has_downloadable_data_ai);
        assert!(!KeywordExtractor.extract("Restricted access microdata").has_downloadable_data_ai);
    }

    #[test]
    fn note_is_fixed() {
        assert_eq!(KeywordExtractor.extract("anything").notes_ai, EXTRACTION_NOTE);
    }

    #[test]
    fn urls_in_order_with_duplicates() {
        let text = "See (https://data.worldbank.org/x) and \"http://a.org/b\" then https://data.worldbank.org/x.";
        assert_eq!(
            extract_urls(text),
            vec![
                "https://data.worldbank.org/x",
                "http://a.org/b",
                "https://data.worldbank.org/x.",
            ]
        );
    }

    #[test]
    fn year_tokens_need_word_boundaries() {
        assert_eq!(extract_years("FY2020 2020a 2021 (2022)"), vec![2021, 2022]);
    }
}
