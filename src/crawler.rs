use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use rusqlite::Connection;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use url::Url;

use crate::catalog;
use crate::db::{self, DownloadRow};

const USER_AGENT_VALUE: &str = "Mozilla/5.0 (WorldBank-README-Downloader/2.1)";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.8,zh-CN;q=0.7";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRIES: u32 = 5;
const BACKOFF_FACTOR: Duration = Duration::from_millis(1200);

/// Retry transient failures with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_factor: BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor * 2u32.saturating_pow(attempt)
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }
}

/// Counters for one crawl run.
#[derive(Debug, Default, Clone)]
pub struct CrawlStats {
    pub requests: usize,
    pub retries: usize,
    pub pages_scanned: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// HTTP client, retry policy and counters for a single crawl. Build one per
/// run; nothing is shared between runs.
pub struct CrawlSession {
    client: reqwest::Client,
    base: Url,
    policy: RetryPolicy,
    pub stats: CrawlStats,
}

impl CrawlSession {
    pub fn new() -> Result<Self> {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Result<Self> {
        Self::build(policy, READ_TIMEOUT)
    }

    /// `read_timeout` bounds each read, not the whole transfer.
    fn build(policy: RetryPolicy, read_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base: Url::parse(catalog::BASE_URL)?,
            policy,
            stats: CrawlStats::default(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// GET with retries on connection errors, timeouts and 429/5xx.
    /// Returns the first non-retryable response, which must be a success.
    async fn get_with_retry(&mut self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            self.stats.requests += 1;
            let reason = match self.client.get(url).send().await {
                Ok(resp) if RetryPolicy::is_retryable_status(resp.status()) => {
                    if attempt >= self.policy.max_retries {
                        return resp
                            .error_for_status()
                            .with_context(|| format!("GET {} (retries exhausted)", url));
                    }
                    format!("HTTP {}", resp.status())
                }
                Ok(resp) => {
                    return resp.error_for_status().with_context(|| format!("GET {}", url));
                }
                Err(e) if is_transient(&e) && attempt < self.policy.max_retries => e.to_string(),
                Err(e) => return Err(e).with_context(|| format!("GET {}", url)),
            };

            let backoff = self.policy.backoff(attempt);
            warn!(
                "{} on {} (attempt {}/{}), backing off {:.1}s",
                reason,
                url,
                attempt + 1,
                self.policy.max_retries,
                backoff.as_secs_f64()
            );
            self.stats.retries += 1;
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    pub async fn get_text(&mut self, url: &str) -> Result<String> {
        let resp = self.get_with_retry(url).await?;
        resp.text().await.with_context(|| format!("reading body of {}", url))
    }

    /// Download one file into `out_dir`, streaming through a `.part` file.
    /// An existing non-empty destination is left alone.
    pub async fn download_one(&mut self, url: &str, out_dir: &Path) -> Result<DownloadOutcome> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("creating {}", out_dir.display()))?;
        let file_name = catalog::filename_from_url(url);
        let dest = out_dir.join(&file_name);

        if let Ok(meta) = tokio::fs::metadata(&dest).await {
            if meta.len() > 0 {
                return Ok(DownloadOutcome::Skipped { path: dest });
            }
        }

        let mut resp = self.get_with_retry(url).await?;
        let tmp = part_path(&dest);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut bytes = 0u64;
        while let Some(chunk) = resp.chunk().await.with_context(|| format!("reading {}", url))? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &dest)
            .await
            .with_context(|| format!("renaming {}", tmp.display()))?;

        Ok(DownloadOutcome::Saved { path: dest, bytes })
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: u64 },
    Skipped { path: PathBuf },
}

/// Download every planned URL in order with a polite pause in between,
/// recording each attempt. Failures are logged and skipped.
pub async fn download_all(
    session: &mut CrawlSession,
    conn: &Connection,
    plan: &[String],
    out_dir: &Path,
) -> Result<CrawlStats> {
    let pb = ProgressBar::new(plan.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for url in plan {
        let mut row = DownloadRow {
            url: url.clone(),
            catalog_id: catalog::catalog_id_from_url(url),
            file_name: catalog::filename_from_url(url),
            ok: true,
            skipped: false,
            bytes: None,
            error: None,
        };

        match session.download_one(url, out_dir).await {
            Ok(DownloadOutcome::Saved { path, bytes }) => {
                session.stats.downloaded += 1;
                row.bytes = Some(bytes);
                pb.println(format!("[ok] {} ({} bytes)", path.display(), bytes));
            }
            Ok(DownloadOutcome::Skipped { path }) => {
                session.stats.skipped += 1;
                row.skipped = true;
                pb.println(format!("[skip] Exists: {}", path.display()));
            }
            Err(e) => {
                session.stats.failed += 1;
                row.ok = false;
                row.error = Some(format!("{:#}", e));
                warn!("Failed {}: {:#}", url, e);
            }
        }

        db::record_download(conn, &row)?;
        pb.inc(1);
        tokio::time::sleep(DOWNLOAD_DELAY).await;
    }

    pb.finish_and_clear();
    let stats = session.stats.clone();
    info!(
        "Downloads: {} saved, {} skipped, {} failed ({} requests, {} retries)",
        stats.downloaded, stats.skipped, stats.failed, stats.requests, stats.retries
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_millis(1200));
        assert_eq!(p.backoff(1), Duration::from_millis(2400));
        assert_eq!(p.backoff(3), Duration::from_millis(9600));
    }

    #[test]
    fn retryable_statuses() {
        for code in [429u16, 500, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200u16, 301, 403, 404, 501] {
            assert!(!RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path(Path::new("data/readmes/12_README.pdf")),
            PathBuf::from("data/readmes/12_README.pdf.part")
        );
    }

    /// Serve one canned reply per connection on a local port.
    async fn serve(replies: Vec<(&'static str, &'static str)>) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in replies {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let mut req = Vec::new();
                let mut buf = [0u8; 1024];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => req.extend_from_slice(&buf[..n]),
                    }
                }
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(reply.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{}/README.pdf", addr)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_factor: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let url = serve(vec![
            ("503 Service Unavailable", "busy"),
            ("503 Service Unavailable", "busy"),
            ("200 OK", "ok"),
        ])
        .await;
        let mut session = CrawlSession::with_policy(fast_policy()).unwrap();
        assert_eq!(session.get_text(&url).await.unwrap(), "ok");
        assert_eq!(session.stats.requests, 3);
        assert_eq!(session.stats.retries, 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let url = serve(vec![
            ("503 Service Unavailable", "busy"),
            ("503 Service Unavailable", "busy"),
            ("503 Service Unavailable", "busy"),
        ])
        .await;
        let mut session = CrawlSession::with_policy(fast_policy()).unwrap();
        let err = session.get_text(&url).await.unwrap_err();
        assert!(format!("{:#}", err).contains("retries exhausted"), "{:#}", err);
        assert_eq!(session.stats.requests, 3);
        assert_eq!(session.stats.retries, 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let url = serve(vec![("404 Not Found", "missing")]).await;
        let mut session = CrawlSession::with_policy(fast_policy()).unwrap();
        assert!(session.get_text(&url).await.is_err());
        assert_eq!(session.stats.requests, 1);
        assert_eq!(session.stats.retries, 0);
    }

    #[tokio::test]
    async fn slow_download_survives_past_read_timeout() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            for part in [b"a", b"b", b"c", b"d", b"e"] {
                sock.write_all(part).await.unwrap();
                sock.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
        });

        // each gap is under the read timeout, the whole transfer is not
        let mut session = CrawlSession::build(fast_policy(), Duration::from_millis(400)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let url = format!("http://{}/catalog/9/download/1/README.pdf", addr);
        let outcome = session.download_one(&url, dir.path()).await.unwrap();
        match outcome {
            DownloadOutcome::Saved { path, bytes } => {
                assert_eq!(bytes, 5);
                assert_eq!(path, dir.path().join("9_README.pdf"));
                assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn existing_file_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("222_README.pdf"), b"%PDF-1.4").unwrap();
        let mut session = CrawlSession::new().unwrap();
        let outcome = session
            .download_one(catalog::SEED_README_URLS[0], dir.path())
            .await
            .unwrap();
        assert!(matches!(outcome, DownloadOutcome::Skipped { .. }));
        assert_eq!(session.stats.requests, 0);
    }
}
