use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::{DocumentRecord, Record};

pub const DEFAULT_DB_PATH: &str = "data/readmes.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id                 INTEGER PRIMARY KEY,
            pdf_path           TEXT UNIQUE NOT NULL,
            pdf_name           TEXT NOT NULL,
            sources            TEXT NOT NULL,
            time_mentions      TEXT NOT NULL,
            urls               TEXT NOT NULL,
            datasets           TEXT NOT NULL,
            has_declaration    BOOLEAN NOT NULL DEFAULT 0,
            availability_found BOOLEAN NOT NULL DEFAULT 0,
            years_ai           TEXT NOT NULL,
            has_downloadable   BOOLEAN NOT NULL DEFAULT 0,
            notes              TEXT,
            text_chars         INTEGER NOT NULL DEFAULT 0,
            needs_review       BOOLEAN NOT NULL,
            processed_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_review ON documents(needs_review);

        CREATE TABLE IF NOT EXISTS downloads (
            id           INTEGER PRIMARY KEY,
            url          TEXT UNIQUE NOT NULL,
            catalog_id   TEXT,
            file_name    TEXT NOT NULL,
            ok           BOOLEAN NOT NULL,
            skipped      BOOLEAN NOT NULL DEFAULT 0,
            bytes        INTEGER,
            error        TEXT,
            attempted_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_downloads_catalog ON downloads(catalog_id);
        ",
    )?;
    Ok(())
}

// ── Documents ──

/// Upsert processed documents; re-parsing a path replaces its row.
pub fn save_documents(conn: &Connection, docs: &[DocumentRecord]) -> Result<usize> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO documents
             (pdf_path, pdf_name, sources, time_mentions, urls, datasets, has_declaration,
              availability_found, years_ai, has_downloadable, notes, text_chars,
              needs_review, processed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        )?;
        for d in docs {
            let r = &d.record;
            count += stmt.execute(rusqlite::params![
                d.pdf_path,
                d.pdf_name,
                serde_json::to_string(&r.sources_mentions)?,
                serde_json::to_string(&r.time_mentions)?,
                serde_json::to_string(&r.urls)?,
                serde_json::to_string(&r.dataset_candidates)?,
                r.has_declaration,
                r.availability_section_found,
                serde_json::to_string(&d.years_ai)?,
                d.has_downloadable_data_ai,
                d.notes_ai,
                d.text_chars as i64,
                d.needs_review,
                now,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Load stored documents in path order. The review flag is recomputed from
/// the stored fields instead of trusting the column.
pub fn fetch_documents(conn: &Connection) -> Result<Vec<DocumentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT pdf_path, pdf_name, sources, time_mentions, urls, datasets, has_declaration,
                availability_found, years_ai, has_downloadable, COALESCE(notes,''), text_chars
         FROM documents
         ORDER BY pdf_path",
    )?;
    let raw = stmt
        .query_map([], |row| {
            Ok(StoredDocument {
                pdf_path: row.get(0)?,
                pdf_name: row.get(1)?,
                sources: row.get(2)?,
                time_mentions: row.get(3)?,
                urls: row.get(4)?,
                datasets: row.get(5)?,
                has_declaration: row.get(6)?,
                availability_found: row.get(7)?,
                years_ai: row.get(8)?,
                has_downloadable: row.get(9)?,
                notes: row.get(10)?,
                text_chars: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter().map(StoredDocument::into_document).collect()
}

struct StoredDocument {
    pdf_path: String,
    pdf_name: String,
    sources: String,
    time_mentions: String,
    urls: String,
    datasets: String,
    has_declaration: bool,
    availability_found: bool,
    years_ai: String,
    has_downloadable: bool,
    notes: String,
    text_chars: i64,
}

impl StoredDocument {
    fn into_document(self) -> Result<DocumentRecord> {
        let ctx = |field: &str| format!("decoding {} of {}", field, self.pdf_path);
        let record = Record {
            sources_mentions: serde_json::from_str(&self.sources).with_context(|| ctx("sources"))?,
            time_mentions: serde_json::from_str(&self.time_mentions)
                .with_context(|| ctx("time_mentions"))?,
            urls: serde_json::from_str(&self.urls).with_context(|| ctx("urls"))?,
            dataset_candidates: serde_json::from_str(&self.datasets)
                .with_context(|| ctx("datasets"))?,
            has_declaration: self.has_declaration,
            availability_section_found: self.availability_found,
        };
        let years_ai = serde_json::from_str(&self.years_ai).with_context(|| ctx("years_ai"))?;
        let needs_review = record.needs_review();
        Ok(DocumentRecord {
            pdf_path: self.pdf_path,
            pdf_name: self.pdf_name,
            record,
            years_ai,
            has_downloadable_data_ai: self.has_downloadable,
            notes_ai: self.notes,
            text_chars: self.text_chars.max(0) as usize,
            needs_review,
        })
    }
}

// ── Downloads ──

pub struct DownloadRow {
    pub url: String,
    pub catalog_id: Option<String>,
    pub file_name: String,
    pub ok: bool,
    pub skipped: bool,
    pub bytes: Option<u64>,
    pub error: Option<String>,
}

pub fn record_download(conn: &Connection, row: &DownloadRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO downloads
         (url, catalog_id, file_name, ok, skipped, bytes, error, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            row.url,
            row.catalog_id,
            row.file_name,
            row.ok,
            row.skipped,
            row.bytes.map(|b| b as i64),
            row.error,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ── Stats ──

/// Row counts; `flagged` comes from the review rules, not the stored column.
pub struct StoreStats {
    pub documents: usize,
    pub flagged: usize,
    pub downloads: usize,
    pub downloaded: usize,
    pub download_errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<StoreStats> {
    let documents: usize = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
    let flagged = fetch_documents(conn)?
        .iter()
        .filter(|d| d.needs_review)
        .count();
    let downloads: usize = conn.query_row("SELECT COUNT(*) FROM downloads", [], |r| r.get(0))?;
    let downloaded: usize = conn.query_row(
        "SELECT COUNT(*) FROM downloads WHERE ok = 1 AND skipped = 0",
        [],
        |r| r.get(0),
    )?;
    let download_errors: usize =
        conn.query_row("SELECT COUNT(*) FROM downloads WHERE ok = 0", [], |r| r.get(0))?;
    Ok(StoreStats {
        documents,
        flagged,
        downloads,
        downloaded,
        download_errors,
    })
}
