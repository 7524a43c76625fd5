use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::parser::DocumentRecord;

const LIST_SEPARATOR: &str = "; ";

#[derive(Serialize)]
struct BatchRow<'a> {
    pdf_path: &'a str,
    sources_ai: String,
    years_ai: String,
    urls: String,
    has_downloadable_data_ai: &'static str,
    needs_review: &'static str,
}

#[derive(Serialize)]
struct OverviewRow<'a> {
    pdf_name: &'a str,
    sources: String,
    years_ai: String,
    urls: String,
    has_downloadable_data_ai: &'static str,
    needs_review: &'static str,
}

fn flag(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Batch export: one row per PDF keyed by path, years clipped to the valid range.
pub fn write_batch_csv<W: Write>(out: W, docs: &[DocumentRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for d in docs {
        wtr.serialize(BatchRow {
            pdf_path: &d.pdf_path,
            sources_ai: join(&d.record.sources_mentions),
            years_ai: join(&d.years_in_range()),
            urls: join(&d.record.urls),
            has_downloadable_data_ai: flag(d.has_downloadable_data_ai),
            needs_review: flag(d.needs_review),
        })?;
    }
    if docs.is_empty() {
        wtr.write_record([
            "pdf_path",
            "sources_ai",
            "years_ai",
            "urls",
            "has_downloadable_data_ai",
            "needs_review",
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Results export: keyed by file name, all extracted years.
pub fn write_overview_csv<W: Write>(out: W, docs: &[DocumentRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for d in docs {
        wtr.serialize(OverviewRow {
            pdf_name: &d.pdf_name,
            sources: join(&d.record.sources_mentions),
            years_ai: join(&d.years_ai),
            urls: join(&d.record.urls),
            has_downloadable_data_ai: flag(d.has_downloadable_data_ai),
            needs_review: flag(d.needs_review),
        })?;
    }
    if docs.is_empty() {
        wtr.write_record([
            "pdf_name",
            "sources",
            "years_ai",
            "urls",
            "has_downloadable_data_ai",
            "needs_review",
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::KeywordExtractor;
    use crate::parser::process_text;

    fn docs() -> Vec<DocumentRecord> {
        vec![
            process_text(
                "in/a.pdf",
                "a.pdf",
                "WDI and IMF data, 1985, 1999 and 2099, https://data.worldbank.org/x https://imf.org",
                &KeywordExtractor,
            ),
            process_text("in/b.pdf", "b.pdf", "", &KeywordExtractor),
        ]
    }

    #[test]
    fn batch_columns_and_clipping() {
        let mut buf = Vec::new();
        write_batch_csv(&mut buf, &docs()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "pdf_path,sources_ai,years_ai,urls,has_downloadable_data_ai,needs_review"
        );
        assert_eq!(
            lines[1],
            "in/a.pdf,world development indicators; international monetary fund,1999,\
             https://data.worldbank.org/x; https://imf.org,False,True"
        );
        assert_eq!(lines[2], "in/b.pdf,,,,False,True");
    }

    #[test]
    fn overview_keeps_all_years() {
        let mut buf = Vec::new();
        write_overview_csv(&mut buf, &docs()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "pdf_name,sources,years_ai,urls,has_downloadable_data_ai,needs_review"
        );
        assert!(lines.next().unwrap().starts_with("a.pdf,world development indicators; international monetary fund,1985; 1999; 2099,"));
    }

    #[test]
    fn empty_export_still_has_header() {
        let mut buf = Vec::new();
        write_batch_csv(&mut buf, &[]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "pdf_path,sources_ai,years_ai,urls,has_downloadable_data_ai,needs_review\n"
        );
    }

    #[test]
    fn file_export_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/results.csv");
        write_batch_csv(create_file(&path).unwrap(), &docs()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 3);
    }
}
