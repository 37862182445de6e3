//! Source resolution: the first candidate whose content can actually be
//! obtained wins.
//!
//! Candidates are tried strictly in the order given (the catalog sorts them
//! newest first). A local file must exist and start with the expected
//! signature. A URL is served from the cache directory when a valid copy is
//! there; otherwise it is downloaded, checked (status 200, compatible
//! `Content-Type`, signature) and written back to the cache atomically.
//!
//! Every failure falls through to the next candidate; only when the whole
//! list is exhausted does the caller get [`TariffError::NoAvailableSource`],
//! which lists each candidate and why it was passed over.
//!
//! ## Retry strategy
//!
//! Connect errors, timeouts, HTTP 429 and 5xx responses are retried up to
//! `max_retries` times with exponential backoff (`retry_backoff_ms * 2^n`).
//! Everything else (404, HTML error pages, wrong signature) is permanent for
//! that candidate and is not retried.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::document::{
    resolve_local_path, Document, DocumentFormat, Retrieval, SourceDescriptor, SourceRef,
};
use crate::error::{SourceAttempt, TariffError};

/// Resolve the first usable candidate into a [`Document`].
///
/// Observer events are sent to `config.observer`.
pub async fn resolve_source(
    candidates: &[SourceDescriptor],
    config: &ResolverConfig,
) -> Result<Document, TariffError> {
    let total = candidates.len();
    let observer = &config.observer;
    observer.on_resolution_start(total);

    let needs_http = candidates.iter().any(|c| !c.source.is_local());
    let client = if needs_http {
        Some(http_client(config)?)
    } else {
        None
    };

    let mut attempts = Vec::with_capacity(total);
    for (i, candidate) in candidates.iter().enumerate() {
        let index = i + 1;
        let source = candidate.source.to_string();
        observer.on_candidate_start(index, total, &source);
        debug!(index, total, source = %source, "trying candidate");

        let outcome = match &candidate.source {
            SourceRef::LocalFile(path) => fetch_local(path, config).await,
            SourceRef::Url(url) => match &client {
                Some(client) => fetch_remote(client, url, config).await,
                None => Err("HTTP client unavailable".to_string()),
            },
        };

        match outcome {
            Ok((bytes, retrieval)) => {
                info!(
                    source = %source,
                    effective_date = %candidate.effective_date,
                    "source resolved"
                );
                observer.on_candidate_resolved(index, total, &source, &retrieval);
                return Ok(Document::new(bytes, candidate.clone(), retrieval));
            }
            Err(reason) => {
                warn!(source = %source, %reason, "candidate unavailable");
                observer.on_candidate_failed(index, total, &source, &reason);
                attempts.push(SourceAttempt { source, reason });
            }
        }
    }

    Err(TariffError::NoAvailableSource { attempts })
}

fn http_client(config: &ResolverConfig) -> Result<reqwest::Client, TariffError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TariffError::Internal(format!("Failed to build HTTP client: {e}")))
}

// ── Local files ──────────────────────────────────────────────────────────

async fn fetch_local(path: &Path, config: &ResolverConfig) -> Result<(Vec<u8>, Retrieval), String> {
    let full = resolve_local_path(path, config.data_dir.as_deref());
    let bytes = tokio::fs::read(&full).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => format!("file not found: {}", full.display()),
        std::io::ErrorKind::PermissionDenied => format!("permission denied: {}", full.display()),
        _ => format!("cannot read {}: {e}", full.display()),
    })?;
    check_signature(&bytes, config.expected_format)?;
    debug!(path = %full.display(), bytes = bytes.len(), "local source read");
    Ok((bytes, Retrieval::Bundled { path: full }))
}

fn check_signature(bytes: &[u8], format: DocumentFormat) -> Result<(), String> {
    if format.matches_signature(bytes) {
        return Ok(());
    }
    let head: String = bytes
        .iter()
        .take(4)
        .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
        .collect();
    Err(format!("not a {format} document (starts with {head:?})"))
}

// ── Remote files ─────────────────────────────────────────────────────────

/// Cache location for a URL: `<cache_dir>/<blake3(url)>.<ext>`.
pub fn cache_path(cache_dir: &Path, url: &str, format: DocumentFormat) -> PathBuf {
    let ext = match format {
        DocumentFormat::Pdf => "pdf",
        DocumentFormat::PlainText => "txt",
    };
    cache_dir.join(format!("{}.{ext}", blake3::hash(url.as_bytes()).to_hex()))
}

async fn fetch_remote(
    client: &reqwest::Client,
    url: &str,
    config: &ResolverConfig,
) -> Result<(Vec<u8>, Retrieval), String> {
    if let Some(dir) = &config.cache_dir {
        let path = cache_path(dir, url, config.expected_format);
        match tokio::fs::read(&path).await {
            Ok(bytes) if config.expected_format.matches_signature(&bytes) => {
                debug!(url, path = %path.display(), "cache hit");
                return Ok((
                    bytes,
                    Retrieval::Cached {
                        url: url.to_string(),
                        path,
                    },
                ));
            }
            Ok(_) => debug!(url, path = %path.display(), "cached copy invalid; refetching"),
            Err(_) => debug!(url, "not cached"),
        }
    }

    let bytes = download_with_retries(client, url, config).await?;

    if let Some(dir) = &config.cache_dir {
        let path = cache_path(dir, url, config.expected_format);
        if let Err(e) = write_cache(dir.clone(), path, bytes.clone()).await {
            warn!(url, error = %e, "could not cache download");
        }
    }
    Ok((
        bytes,
        Retrieval::Downloaded {
            url: url.to_string(),
        },
    ))
}

struct FetchError {
    reason: String,
    transient: bool,
}

impl FetchError {
    fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            transient: false,
        }
    }

    fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            transient: true,
        }
    }
}

async fn download_with_retries(
    client: &reqwest::Client,
    url: &str,
    config: &ResolverConfig,
) -> Result<Vec<u8>, String> {
    let mut attempt = 0u32;
    loop {
        match download(client, url, config).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.transient && attempt < config.max_retries => {
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                attempt += 1;
                warn!(
                    url,
                    reason = %e.reason,
                    "retry {}/{} after {}ms",
                    attempt,
                    config.max_retries,
                    backoff
                );
                config.observer.on_retry(url, attempt, config.max_retries);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e.reason),
        }
    }
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt))
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    config: &ResolverConfig,
) -> Result<Vec<u8>, FetchError> {
    info!(url, "downloading");
    let response = client.get(url).send().await.map_err(|e| request_error(e, config))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let reason = format!("HTTP {status}");
        return Err(if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            FetchError::transient(reason)
        } else {
            FetchError::permanent(reason)
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !config
        .expected_format
        .accepts_content_type(content_type.as_deref())
    {
        return Err(FetchError::permanent(format!(
            "unexpected content type '{}'",
            content_type.unwrap_or_default()
        )));
    }

    let bytes = response.bytes().await.map_err(|e| request_error(e, config))?;
    check_signature(&bytes, config.expected_format).map_err(FetchError::permanent)?;
    debug!(url, bytes = bytes.len(), "download complete");
    Ok(bytes.to_vec())
}

fn request_error(e: reqwest::Error, config: &ResolverConfig) -> FetchError {
    if e.is_timeout() {
        FetchError::transient(format!("timed out after {}s", config.timeout_secs))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        FetchError::transient(format!("network error: {e}"))
    } else {
        FetchError::permanent(e.to_string())
    }
}

/// Write `bytes` to `path` via a temp file in the same directory, so readers
/// never see a partial file.
async fn write_cache(dir: PathBuf, path: PathBuf, bytes: Vec<u8>) -> Result<(), TariffError> {
    tokio::task::spawn_blocking(move || {
        let fail = |source: std::io::Error| TariffError::CacheWriteFailed {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&dir).map_err(fail)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
        tmp.write_all(&bytes).map_err(fail)?;
        tmp.as_file().sync_all().map_err(fail)?;
        tmp.persist(&path).map_err(|e| fail(e.error))?;
        debug!(path = %path.display(), "cached");
        Ok(())
    })
    .await
    .map_err(|e| TariffError::Internal(format!("Cache write task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 0), 500);
        assert_eq!(backoff_ms(500, 3), 4000);
        assert_eq!(backoff_ms(u64::MAX / 2, 2), u64::MAX);
        assert_eq!(backoff_ms(1, 80), u64::MAX);
    }

    #[test]
    fn cache_path_is_stable_per_url() {
        let dir = Path::new("/cache");
        let a = cache_path(dir, "https://x.test/a.pdf", DocumentFormat::Pdf);
        let b = cache_path(dir, "https://x.test/a.pdf", DocumentFormat::Pdf);
        let c = cache_path(dir, "https://x.test/b.pdf", DocumentFormat::Pdf);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().unwrap(), "pdf");
        assert_eq!(
            cache_path(dir, "https://x.test/a", DocumentFormat::PlainText)
                .extension()
                .unwrap(),
            "txt"
        );
    }

    #[test]
    fn signature_mismatch_reason() {
        let err = check_signature(b"<html>", DocumentFormat::Pdf).unwrap_err();
        assert!(err.contains("not a pdf document"), "got: {err}");
        assert!(err.contains("<htm"), "got: {err}");
        assert!(check_signature(b"%PDF-1.4", DocumentFormat::Pdf).is_ok());
    }

    #[tokio::test]
    async fn missing_local_then_present_local() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.7 body").unwrap();
        let config = ResolverConfig::builder()
            .data_dir(dir.path())
            .build()
            .unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let candidates = vec![
            SourceDescriptor::new("file://a.pdf".parse().unwrap(), date, "missing"),
            SourceDescriptor::new("file://b.pdf".parse().unwrap(), date, "present"),
        ];
        let doc = resolve_source(&candidates, &config).await.unwrap();
        assert_eq!(doc.bytes(), b"%PDF-1.7 body");
        assert_eq!(doc.descriptor().description, "present");
        assert!(matches!(doc.retrieval(), Retrieval::Bundled { .. }));
    }

    #[tokio::test]
    async fn exhausted_list_reports_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.pdf"), b"<html>not a pdf</html>").unwrap();
        let config = ResolverConfig::builder()
            .data_dir(dir.path())
            .build()
            .unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let candidates = vec![
            SourceDescriptor::new("file://gone.pdf".parse().unwrap(), date, ""),
            SourceDescriptor::new("file://page.pdf".parse().unwrap(), date, ""),
        ];
        match resolve_source(&candidates, &config).await {
            Err(TariffError::NoAvailableSource { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].reason.contains("not found"));
                assert!(attempts[1].reason.contains("not a pdf"));
            }
            other => panic!("expected NoAvailableSource, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_cache_copy_skips_network() {
        let cache = tempfile::tempdir().unwrap();
        // Unroutable URL: only the cache can satisfy it.
        let url = "http://127.0.0.1:9/rates.pdf";
        std::fs::write(cache_path(cache.path(), url, DocumentFormat::Pdf), b"%PDF cached").unwrap();
        let config = ResolverConfig::builder()
            .cache_dir(cache.path())
            .max_retries(0)
            .build()
            .unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let doc = resolve_source(
            &[SourceDescriptor::new(url.parse().unwrap(), date, "")],
            &config,
        )
        .await
        .unwrap();
        assert_eq!(doc.bytes(), b"%PDF cached");
        assert!(matches!(doc.retrieval(), Retrieval::Cached { .. }));
    }

    #[tokio::test]
    async fn cache_write_is_atomic_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pdf");
        write_cache(dir.path().to_path_buf(), path.clone(), b"%PDF one".to_vec())
            .await
            .unwrap();
        write_cache(dir.path().to_path_buf(), path.clone(), b"%PDF two".to_vec())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF two");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
