use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};
use url::Url;

use crate::crawler::CrawlSession;

pub const BASE_URL: &str = "https://reproducibility.worldbank.org";
const CATALOG_PATH: &str = "/catalog/";

/// Known direct README links, tried before any catalog scan.
pub const SEED_README_URLS: &[&str] =
    &["https://reproducibility.worldbank.org/index.php/catalog/222/download/643/README.pdf"];

const PAGE_DELAY: Duration = Duration::from_millis(250);
const ITEM_DELAY: Duration = Duration::from_millis(100);

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r#"<a\s(?:[^>]*?\s)?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))[^>]*>(.*?)</a>"#,
    )
    .case_insensitive(true)
    .dot_matches_new_line(true)
    .build()
    .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:/index\.php)?/catalog/\d+/?$").unwrap());
static DOWNLOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"(?:/index\.php)?/catalog/\d+/download/\d+(?:/README\.pdf)?$")
        .case_insensitive(true)
        .build()
        .unwrap()
});
static CATALOG_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/catalog/(\d+)").unwrap());
static FILE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)_README\.pdf$").unwrap());
static UNSAFE_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]+"#).unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

/// All `<a href>` elements of a page with their tag-stripped text.
/// Attribute values may be double-quoted, single-quoted or bare; entities
/// in them are decoded.
pub fn parse_anchors(html: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .captures_iter(html)
        .map(|c| {
            let raw_href = c
                .get(1)
                .or_else(|| c.get(2))
                .or_else(|| c.get(3))
                .map_or("", |m| m.as_str());
            let text = TAG_RE.replace_all(&c[4], " ");
            Anchor {
                href: decode_entities(raw_href.trim()),
                text: decode_entities(&text.split_whitespace().collect::<Vec<_>>().join(" ")),
            }
        })
        .collect()
}

/// XML entities and character references; unknown HTML entities are left as-is.
fn decode_entities(s: &str) -> String {
    match quick_xml::escape::unescape(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

fn join_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}

fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Catalog entry links (`/catalog/<id>`) on a listing page, absolute and deduplicated.
pub fn item_links(html: &str, base: &Url) -> Vec<String> {
    let links = parse_anchors(html)
        .into_iter()
        .filter(|a| ITEM_RE.is_match(&a.href))
        .filter_map(|a| join_url(base, &a.href))
        .collect();
    dedup(links)
}

/// README download links on an entry page: `/download/` hrefs that either
/// look like a catalog download or are labelled as a readme.
pub fn readme_download_links(html: &str, base: &Url) -> Vec<String> {
    let links = parse_anchors(html)
        .into_iter()
        .filter(|a| {
            let text = a.text.to_lowercase();
            a.href.contains("/download/")
                && (DOWNLOAD_RE.is_match(&a.href) || text.contains("readme") || text.contains("read me"))
        })
        .filter_map(|a| join_url(base, &a.href))
        .filter(|u| u.contains("/download/"))
        .collect();
    dedup(links)
}

pub fn catalog_id_from_url(url: &str) -> Option<String> {
    CATALOG_ID_RE.captures(url).map(|c| c[1].to_string())
}

/// Downloaded files are stored as `<catalog_id>_README.pdf`.
pub fn catalog_id_from_filename(name: &str) -> Option<String> {
    FILE_ID_RE.captures(name).map(|c| c[1].to_string())
}

pub fn sanitize(name: &str) -> String {
    UNSAFE_CHARS_RE.replace_all(name, "_").into_owned()
}

/// Local file name for a download URL; generic `README.pdf` names get the
/// catalog id prefixed so entries do not overwrite each other.
pub fn filename_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or("");
    let mut base = if last.is_empty() || !last.contains('.') {
        "README.pdf".to_string()
    } else {
        last.to_string()
    };
    if base.eq_ignore_ascii_case("readme.pdf") {
        if let Some(id) = catalog_id_from_url(url) {
            base = format!("{}_README.pdf", id);
        }
    }
    sanitize(&base)
}

/// Catalog ids of READMEs already present in `out_dir`.
pub fn list_existing_catalog_ids(out_dir: &Path) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    if !out_dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(out_dir).with_context(|| format!("listing {}", out_dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".pdf") {
            continue;
        }
        if let Some(id) = catalog_id_from_filename(&name) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Append candidates whose catalog id is neither on disk nor already
/// planned. Returns true once the plan reaches `limit`.
pub fn extend_plan(
    plan: &mut Vec<String>,
    planned_ids: &mut HashSet<String>,
    existing_ids: &HashSet<String>,
    candidates: impl IntoIterator<Item = String>,
    limit: usize,
) -> bool {
    for url in candidates {
        if plan.len() >= limit {
            break;
        }
        let Some(id) = catalog_id_from_url(&url) else {
            continue;
        };
        if existing_ids.contains(&id) || planned_ids.contains(&id) {
            continue;
        }
        planned_ids.insert(id);
        plan.push(url);
    }
    plan.len() >= limit
}

// ── Network discovery ──

/// Walk `/catalog/?page=N` listings until a page fails or adds nothing new.
pub async fn discover_catalog_items(session: &mut CrawlSession, max_pages: usize) -> Vec<String> {
    let base = session.base().clone();
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for page in 1..=max_pages {
        let url = format!("{}{}?page={}", BASE_URL, CATALOG_PATH, page);
        let html = match session.get_text(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Catalog page {} failed, stopping: {:#}", page, e);
                break;
            }
        };
        session.stats.pages_scanned += 1;

        let mut found = 0;
        for link in item_links(&html, &base) {
            if seen.insert(link.clone()) {
                items.push(link);
                found += 1;
            }
        }
        if found == 0 {
            debug!("Catalog page {} had no new entries", page);
            break;
        }
        tokio::time::sleep(PAGE_DELAY).await;
    }

    info!("Discovered {} catalog entries", items.len());
    items
}

async fn collect_downloads_from_page(session: &mut CrawlSession, url: &str) -> Vec<String> {
    let base = session.base().clone();
    match session.get_text(url).await {
        Ok(html) => readme_download_links(&html, &base),
        Err(e) => {
            debug!("Skipping {}: {:#}", url, e);
            Vec::new()
        }
    }
}

/// README links on an entry page and its related-materials tab.
pub async fn find_readme_links_on_item(session: &mut CrawlSession, item_url: &str) -> Vec<String> {
    let mut links = collect_downloads_from_page(session, item_url).await;
    let related = format!("{}/related-materials", item_url.trim_end_matches('/'));
    links.extend(collect_downloads_from_page(session, &related).await);
    dedup(links)
}

/// Scan up to `max_pages` listing pages and return README links of entries
/// not in `scanned`.
pub async fn auto_discover_batch(
    session: &mut CrawlSession,
    max_pages: usize,
    scanned: &mut HashSet<String>,
) -> Result<Vec<String>> {
    let items: Vec<String> = discover_catalog_items(session, max_pages)
        .await
        .into_iter()
        .filter(|i| !scanned.contains(i))
        .collect();

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Scanning entries [{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut pool = Vec::new();
    for item in items {
        pool.extend(find_readme_links_on_item(session, &item).await);
        scanned.insert(item);
        pb.inc(1);
        tokio::time::sleep(ITEM_DELAY).await;
    }
    pb.finish_and_clear();
    Ok(dedup(pool))
}

/// Seed links first, then progressively wider catalog scans (`page_step`
/// more pages each round, up to `max_pages`) until `limit` new READMEs are planned.
pub async fn build_download_plan(
    session: &mut CrawlSession,
    limit: usize,
    existing_ids: &HashSet<String>,
    page_step: usize,
    max_pages: usize,
) -> Result<Vec<String>> {
    let mut plan = Vec::new();
    let mut planned_ids = HashSet::new();

    let seeds = dedup(SEED_README_URLS.iter().map(|s| s.to_string()).collect());
    if extend_plan(&mut plan, &mut planned_ids, existing_ids, seeds, limit) {
        return Ok(plan);
    }

    let step = page_step.max(1);
    let mut pages = step;
    let mut scanned = HashSet::new();
    while pages <= max_pages {
        let pool = auto_discover_batch(session, pages, &mut scanned).await?;
        if extend_plan(&mut plan, &mut planned_ids, existing_ids, pool, limit) {
            break;
        }
        pages += step;
        if pages <= max_pages {
            info!("Expanding search to {} pages...", pages);
        }
    }

    Ok(plan)
}
