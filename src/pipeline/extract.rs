//! Text extraction: document bytes → [`LineSequence`].
//!
//! PDFs are read through pdfium's text layer, one page at a time. Plain-text
//! documents are split on form feeds into pages. Either way, the result is a
//! flat list of non-blank lines in extraction order, each tagged with its
//! 1-indexed page. No attempt is made to reconstruct columns: a two-column
//! rate table can come out interleaved, and the field resolver has to cope.
//!
//! pdfium is blocking and CPU-bound, so async callers run [`extract`] inside
//! `tokio::task::spawn_blocking` (see [`crate::parse::resolve_and_parse`]).

use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ExtractConfig;
use crate::document::{DocumentFormat, Line, LineSequence};
use crate::error::TariffError;
use crate::schedule::ExtractionMethod;

/// Extract the text lines of a document.
///
/// Fails with [`TariffError::UnreadableDocument`] when the bytes are neither
/// a PDF nor UTF-8 text, or when nothing but whitespace comes out.
pub fn extract(bytes: &[u8], config: &ExtractConfig) -> Result<LineSequence, TariffError> {
    extract_from(bytes, "<document>", config).map(|(lines, _)| lines)
}

/// [`extract`] with an origin label for error messages, also reporting which
/// extraction path was taken.
pub(crate) fn extract_from(
    bytes: &[u8],
    origin: &str,
    config: &ExtractConfig,
) -> Result<(LineSequence, ExtractionMethod), TariffError> {
    let format = DocumentFormat::detect(bytes).ok_or_else(|| TariffError::UnreadableDocument {
        origin: origin.to_string(),
        reason: "not a PDF (missing %PDF header) and not UTF-8 text".into(),
    })?;

    let (pages, method) = match format {
        DocumentFormat::Pdf => (
            pdf_pages(bytes, origin, config.pdfium_lib_path.as_deref())?,
            ExtractionMethod::PdfTextLayer,
        ),
        DocumentFormat::PlainText => {
            let text = std::str::from_utf8(bytes).map_err(|e| TariffError::UnreadableDocument {
                origin: origin.to_string(),
                reason: format!("invalid UTF-8: {e}"),
            })?;
            (
                text.split('\x0c').map(str::to_string).collect(),
                ExtractionMethod::PlainText,
            )
        }
    };
    debug!(origin, pages = pages.len(), %method, "text extracted");

    let pages: Vec<String> = pages.iter().map(|p| clean_page(p)).collect();
    let selected = match config.max_pages {
        Some(n) => select_relevant_pages(&pages, &config.relevance_keywords, n),
        None => (0..pages.len()).collect(),
    };

    let mut lines = Vec::new();
    for idx in selected {
        for text in pages[idx].lines().filter(|l| !l.trim().is_empty()) {
            lines.push(Line {
                page: idx + 1,
                text: text.to_string(),
            });
        }
    }

    let seq = LineSequence::new(lines);
    if seq.is_empty() {
        let reason = match method {
            ExtractionMethod::PdfTextLayer => "no text layer (scanned or image-only PDF?)",
            ExtractionMethod::PlainText => "document is empty",
        };
        return Err(TariffError::UnreadableDocument {
            origin: origin.to_string(),
            reason: reason.into(),
        });
    }
    info!(origin, lines = seq.len(), pages = seq.page_count(), "extraction complete");
    Ok((seq, method))
}

// ── pdfium ───────────────────────────────────────────────────────────────

fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, TariffError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| TariffError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn pdf_pages(
    bytes: &[u8],
    origin: &str,
    lib_dir: Option<&Path>,
) -> Result<Vec<String>, TariffError> {
    let pdfium = bind_pdfium(lib_dir)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| TariffError::UnreadableDocument {
            origin: origin.to_string(),
            reason: format!("pdfium could not open the document: {e:?}"),
        })?;

    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| TariffError::UnreadableDocument {
            origin: origin.to_string(),
            reason: format!("page {}: {e:?}", idx + 1),
        })?;
        pages.push(text.all());
    }
    Ok(pages)
}

// ── Cleanup ──────────────────────────────────────────────────────────────

fn clean_page(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    );
    // Non-breaking spaces show up between "$" and the amount in some exports.
    let s = s.replace('\u{00A0}', " ");
    s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

// ── Page scoring ─────────────────────────────────────────────────────────

static RE_RATE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\$\s*\d+\.\d+|\d+\.\d+\s*(?:¢|cents?\b))").unwrap());

/// Score a page: one point per keyword occurrence, plus a bonus when the page
/// carries something that looks like a rate value.
fn score_page(text: &str, keywords: &[String]) -> usize {
    let lower = text.to_lowercase();
    let hits: usize = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| lower.matches(k.as_str()).count())
        .sum();
    if hits == 0 {
        return 0;
    }
    let bonus = if RE_RATE_VALUE.is_match(text) { 10 } else { 0 };
    hits + bonus
}

/// Indices of the `max` highest-scoring pages (score > 0), in page order.
/// Ties go to the earlier page.
fn select_relevant_pages(pages: &[String], keywords: &[String], max: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, usize)> = pages
        .iter()
        .enumerate()
        .map(|(i, p)| (i, score_page(p, keywords)))
        .filter(|(_, s)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut keep: Vec<usize> = scored.into_iter().take(max).map(|(i, _)| i).collect();
    keep.sort_unstable();
    debug!(kept = ?keep.iter().map(|i| i + 1).collect::<Vec<_>>(), "relevant pages");
    keep
}
