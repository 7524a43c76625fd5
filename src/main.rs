mod catalog;
mod crawler;
mod db;
mod export;
mod parser;
mod pdf;
mod scan;
mod stats;

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::bail;
use clap::{Parser, Subcommand};

use parser::extract::KeywordExtractor;
use parser::review::ReviewReasons;
use parser::{DocumentRecord, Record, MAX_VALID_YEAR, MIN_VALID_YEAR};
use scan::SampleMode;

#[derive(Parser)]
#[command(
    name = "readme_checker",
    about = "Extract data-source metadata from README PDFs and flag records for review"
)]
struct Cli {
    /// SQLite database holding parsed documents and download attempts
    #[arg(long, global = true, default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download README PDFs from the reproducibility catalog
    Crawl {
        /// Number of new READMEs to fetch
        #[arg(short = 'n', long, default_value = "200")]
        limit: usize,
        /// Download folder (existing `<id>_README.pdf` files are skipped)
        #[arg(short, long, default_value = "data/readmes")]
        out_dir: PathBuf,
        /// Catalog pages added per discovery round
        #[arg(long, default_value = "30")]
        page_step: usize,
        /// Upper bound on catalog pages scanned
        #[arg(long, default_value = "300")]
        max_pages: usize,
    },
    /// Extract metadata from every PDF under a folder, write CSV and store results
    Parse {
        /// Folder searched recursively
        input_dir: PathBuf,
        /// File-name glob (`*`, `?`, `[...]`)
        #[arg(short, long, default_value = "*.pdf")]
        pattern: String,
        /// CSV output path
        #[arg(short, long, default_value = "data/readme_metadata.csv")]
        out: PathBuf,
        /// Only process this many files
        #[arg(long)]
        max_samples: Option<usize>,
        /// How to pick files when --max-samples is set
        #[arg(long, value_enum, default_value_t = SampleMode::First)]
        sample_mode: SampleMode,
        /// Seed for random sampling
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Aggregate statistics over stored documents
    Stats {
        /// Rows shown per ranking
        #[arg(long, default_value = "20")]
        top: usize,
        /// Print the summary as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Per-file table of stored documents
    Overview {
        /// Only files that need review
        #[arg(long)]
        needs_review: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Print documents as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Export stored documents as CSV
    Export {
        /// CSV output path
        #[arg(short, long, default_value = "readme_metadata_results.csv")]
        out: PathBuf,
        /// Only files that need review
        #[arg(long)]
        needs_review: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let Cli { db: db_path, command } = Cli::parse();

    let result = match command {
        Commands::Crawl {
            limit,
            out_dir,
            page_step,
            max_pages,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            println!("Target: {} README files; output directory: {}", limit, out_dir.display());

            let existing = catalog::list_existing_catalog_ids(&out_dir)?;
            let mut ids: Vec<_> = existing.iter().cloned().collect();
            ids.sort();
            println!(
                "Found {} existing catalog IDs: {:?}{}",
                ids.len(),
                &ids[..ids.len().min(8)],
                if ids.len() > 8 { " ..." } else { "" }
            );

            let mut session = crawler::CrawlSession::new()?;
            let plan =
                catalog::build_download_plan(&mut session, limit, &existing, page_step, max_pages)
                    .await?;
            if plan.is_empty() {
                bail!("Nothing to download. Check network or adjust --limit/--max-pages.");
            }

            println!("This run will attempt to download {} files:", plan.len());
            for u in plan.iter().take(5) {
                println!("   - {}", u);
            }
            if plan.len() > 5 {
                println!("   - ...");
            }

            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let stats = crawler::download_all(&mut session, &conn, &plan, &out_dir).await?;

            let added = catalog::list_existing_catalog_ids(&out_dir)?
                .difference(&existing)
                .count();
            println!(
                "Done: {} ok ({} new, {} already present), {} failed; {} new catalog IDs in {}",
                stats.downloaded + stats.skipped,
                stats.downloaded,
                stats.skipped,
                stats.failed,
                added,
                out_dir.display()
            );
            Ok(())
        }
        Commands::Parse {
            input_dir,
            pattern,
            out,
            max_samples,
            sample_mode,
            seed,
        } => {
            let files = scan::find_files(&input_dir, &pattern)?;
            let files = scan::select_sample(files, max_samples, sample_mode, seed);
            if files.is_empty() {
                println!("No files matching '{}' under {}.", pattern, input_dir.display());
                return Ok(());
            }

            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            println!("Parsing {} PDFs...", files.len());
            let docs = process_files(&conn, &files)?;

            export::write_batch_csv(export::create_file(&out)?, &docs)?;
            let flagged = docs.iter().filter(|d| d.needs_review).count();
            println!(
                "Wrote {} rows to {} ({} need review, {} look OK).",
                docs.len(),
                out.display(),
                flagged,
                docs.len() - flagged
            );
            Ok(())
        }
        Commands::Stats { top, json } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let docs = db::fetch_documents(&conn)?;
            let records: Vec<Record> = docs.iter().map(|d| d.record.clone()).collect();
            let summary = stats::Summary::from_records(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let s = db::get_stats(&conn)?;
            println!("Documents:  {}", s.documents);
            println!("Flagged:    {}", s.flagged);
            println!("Downloads:  {} ({} fetched, {} errors)", s.downloads, s.downloaded, s.download_errors);

            if docs.is_empty() {
                println!("\nNo parsed documents. Run 'parse' first.");
                return Ok(());
            }
            print_summary(&records, &summary, top);
            Ok(())
        }
        Commands::Overview {
            needs_review,
            limit,
            json,
        } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let docs = filter_docs(db::fetch_documents(&conn)?, needs_review);
            if json {
                let shown = &docs[..docs.len().min(limit)];
                println!("{}", serde_json::to_string_pretty(shown)?);
                return Ok(());
            }
            if docs.is_empty() {
                println!("No documents found.");
                return Ok(());
            }
            print_overview(&docs, limit);
            Ok(())
        }
        Commands::Export { out, needs_review } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let docs = filter_docs(db::fetch_documents(&conn)?, needs_review);
            export::write_overview_csv(export::create_file(&out)?, &docs)?;
            println!("Exported {} rows to {}", docs.len(), out.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Extract in parallel chunk by chunk, storing each chunk as it completes.
fn process_files(
    conn: &rusqlite::Connection,
    files: &[PathBuf],
) -> anyhow::Result<Vec<DocumentRecord>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let extractor = KeywordExtractor;
    let mut docs = Vec::with_capacity(files.len());
    for chunk in files.chunks(64) {
        let results: Vec<DocumentRecord> = chunk
            .par_iter()
            .map(|p| parser::process_pdf(p, &extractor))
            .collect();
        db::save_documents(conn, &results)?;
        pb.inc(chunk.len() as u64);
        docs.extend(results);
    }

    pb.finish_and_clear();
    Ok(docs)
}

fn filter_docs(docs: Vec<DocumentRecord>, only_flagged: bool) -> Vec<DocumentRecord> {
    if only_flagged {
        docs.into_iter().filter(|d| d.needs_review).collect()
    } else {
        docs
    }
}

fn print_summary(records: &[Record], s: &stats::Summary, top: usize) {
    println!("\n--- Needs review (rule-based) ---");
    println!("  True:  {}", s.review.flagged);
    println!("  False: {}", s.review.clear);

    let mut reasons = stats::Counter::default();
    for r in records {
        for label in ReviewReasons::evaluate(r).labels() {
            reasons.add(label.to_string());
        }
    }
    print_ranking("Review reasons", &reasons.most_common(top));
    print_ranking(&format!("Top {} sources (normalized)", top), &s.sources.most_common(top));
    print_ranking(&format!("Top {} URL domains (filtered)", top), &s.domains.most_common(top));
    print_ranking(&format!("Top {} dataset candidates", top), &s.datasets.most_common(top));

    println!("\n--- Years mentioned ({}-{}) ---", MIN_VALID_YEAR, MAX_VALID_YEAR);
    if s.years.is_empty() {
        println!("  (no valid years detected)");
    }
    let max = s.years.iter().map(|(_, c)| c).max().unwrap_or(1).max(1);
    for (year, count) in s.years.iter() {
        let width = (count * 40).div_ceil(max);
        println!("  {} {:>5} {}", year, count, "#".repeat(width));
    }

    if !s.future_years.is_empty() {
        let years: Vec<String> = s
            .future_years
            .iter()
            .map(|(y, c)| format!("{} ({})", y, c))
            .collect();
        println!("\nYears after {}: {}", MAX_VALID_YEAR, years.join(", "));
    }

    println!("\n--- URLs per file ---");
    for (n, count) in s.urls_per_file.iter() {
        println!("  {:>3} urls: {}", n, count);
    }
}

fn print_ranking<K: Display>(title: &str, entries: &[(K, usize)]) {
    println!("\n--- {} ---", title);
    if entries.is_empty() {
        println!("  (none)");
    }
    for (k, count) in entries {
        println!("  {:>5}  {}", count, k);
    }
}

fn print_overview(docs: &[DocumentRecord], limit: usize) {
    println!(
        "{:>3} | {:<28} | {:<6} | {:<28} | {:<30} | {:<9} | {:>4}",
        "#", "File", "Review", "Reasons", "Sources", "Years", "URLs"
    );
    println!("{}", "-".repeat(126));

    for (i, d) in docs.iter().take(limit).enumerate() {
        let reasons = ReviewReasons::evaluate(&d.record).labels().join(", ");
        let years = match (d.years_ai.first(), d.years_ai.last()) {
            (Some(a), Some(b)) if a == b => a.to_string(),
            (Some(a), Some(b)) => format!("{}-{}", a, b),
            _ => "-".into(),
        };
        println!(
            "{:>3} | {:<28} | {:<6} | {:<28} | {:<30} | {:<9} | {:>4}",
            i + 1,
            truncate(&d.pdf_name, 28),
            if d.needs_review { "yes" } else { "ok" },
            truncate(&reasons, 28),
            truncate(&d.record.sources_mentions.join("; "), 30),
            years,
            d.record.urls.len()
        );
    }

    let flagged = docs.iter().filter(|d| d.needs_review).count();
    println!(
        "\n{} files ({} need review){}",
        docs.len(),
        flagged,
        if docs.len() > limit {
            format!(", showing first {}", limit)
        } else {
            String::new()
        }
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
