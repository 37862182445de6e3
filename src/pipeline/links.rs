//! Link discovery: turn a utility's rate-book HTML page into candidate
//! sources.
//!
//! Only `<a href>` elements are considered. A link qualifies when its target
//! looks like a PDF (path ends in `.pdf`) or its text contains one of the
//! caller's keywords (rate-summary links are often extension-less download
//! URLs). Relative targets are joined onto the page URL. The effective date
//! comes from the link text first, then from the target's file name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::catalog::effective_date_from_filename;
use crate::config::ResolverConfig;
use crate::document::{SourceDescriptor, SourceRef};
use crate::error::TariffError;
use chrono::NaiveDate;

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#,
        r"[^>]*>(.*?)</a\s*>",
    ))
    .unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One qualifying link found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    /// Absolute target URL.
    pub url: String,
    /// Visible link text, tags stripped and whitespace collapsed.
    pub text: String,
    pub effective_date: Option<NaiveDate>,
}

impl DiscoveredLink {
    /// A catalog entry for this link; `None` when no date could be inferred.
    pub fn to_descriptor(&self) -> Option<SourceDescriptor> {
        let date = self.effective_date?;
        let source = self.url.parse::<SourceRef>().ok()?;
        Some(SourceDescriptor::new(source, date, self.text.clone()))
    }
}

/// Scan `html` for document links. `base_url` resolves relative targets.
///
/// Keywords match case-insensitively against the link text. Duplicate
/// targets are reported once. Results are newest first; undated links
/// follow in page order.
pub fn discover_links(
    html: &str,
    base_url: &str,
    keywords: &[&str],
) -> Result<Vec<DiscoveredLink>, TariffError> {
    let base = reqwest::Url::parse(base_url).map_err(|e| TariffError::InvalidSource {
        source_ref: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut links: Vec<DiscoveredLink> = Vec::new();
    for caps in ANCHOR_RE.captures_iter(html) {
        let Some(href) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let href = decode_entities(href.as_str().trim());
        let text = link_text(caps.get(4).map_or("", |m| m.as_str()));

        let Ok(url) = base.join(&href) else {
            debug!(href = %href, "unresolvable link skipped");
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }

        let is_pdf = url.path().to_ascii_lowercase().ends_with(".pdf");
        let lower = text.to_lowercase();
        if !is_pdf && !keywords.iter().any(|k| lower.contains(k.as_str())) {
            continue;
        }

        let url = url.to_string();
        if links.iter().any(|l| l.url == url) {
            continue;
        }
        let effective_date = effective_date_from_filename(&text).or_else(|| {
            url.rsplit('/')
                .next()
                .and_then(effective_date_from_filename)
        });
        links.push(DiscoveredLink {
            url,
            text,
            effective_date,
        });
    }

    // Stable: undated links keep page order after the dated ones.
    links.sort_by(|a, b| match (a.effective_date, b.effective_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    info!(base = %base_url, links = links.len(), "links discovered");
    Ok(links)
}

/// Fetch a rate-book page and discover its document links.
pub async fn fetch_links(
    page_url: &str,
    keywords: &[&str],
    config: &ResolverConfig,
) -> Result<Vec<DiscoveredLink>, TariffError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TariffError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let fail = |reason: String| TariffError::NoAvailableSource {
        attempts: vec![crate::error::SourceAttempt {
            source: page_url.to_string(),
            reason,
        }],
    };
    let response = client.get(page_url).send().await.map_err(|e| {
        if e.is_timeout() {
            fail(format!("timed out after {}s", config.timeout_secs))
        } else {
            fail(format!("network error: {e}"))
        }
    })?;
    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }
    let final_url = response.url().to_string();
    let html = response.text().await.map_err(|e| fail(e.to_string()))?;
    discover_links(&html, &final_url, keywords)
}

fn link_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, " ");
    let decoded = decode_entities(&stripped);
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
