//! Pipeline entry points.
//!
//! The parse stages (extract, resolve, normalize) are synchronous and pure;
//! [`parse_document`] runs them on a document already in memory. The async
//! entry points add source resolution in front and run extraction on the
//! blocking pool, since pdfium calls block.

use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{ParseConfig, ResolverConfig};
use crate::document::{Document, Retrieval, SourceDescriptor};
use crate::error::TariffError;
use crate::output::ParseOutput;
use crate::pipeline::{extract, normalize, resolve, source};
use crate::schedule::{ExtractionMethod, Provenance};

/// Parse a retrieved document into a schedule plus diagnostics.
///
/// # Errors
/// Only whole-document failures are errors ([`TariffError::UnreadableDocument`],
/// [`TariffError::PdfiumBindingFailed`]). Missing or rejected fields are
/// reported in [`ParseOutput::diagnostics`].
pub fn parse_document(
    document: &Document,
    config: &ParseConfig,
) -> Result<ParseOutput, TariffError> {
    let origin = document.origin();
    let provenance = |method| Provenance {
        source: Some(document.descriptor().clone()),
        retrieval: document.retrieval().clone(),
        extraction_method: method,
        library_version: config.library.version().to_string(),
    };
    run(document.bytes(), &origin, config, provenance)
}

/// Parse document bytes that did not come through the source resolver.
pub fn parse_bytes(bytes: &[u8], config: &ParseConfig) -> Result<ParseOutput, TariffError> {
    let provenance = |method| Provenance {
        source: None,
        retrieval: Retrieval::InMemory,
        extraction_method: method,
        library_version: config.library.version().to_string(),
    };
    run(bytes, "<memory>", config, provenance)
}

/// Parse already-extracted text (pages separated by form feeds).
///
/// ```
/// use tariffscan::{parse_text, ParseConfig};
///
/// let text = "Effective: April 1, 2025\nService and Facility Charge: $13.13 per month\n";
/// let out = parse_text(text, &ParseConfig::default()).unwrap();
/// assert_eq!(out.schedule.fixed_charge("monthly_service").map(|c| c.amount), Some(13.13));
/// ```
pub fn parse_text(text: &str, config: &ParseConfig) -> Result<ParseOutput, TariffError> {
    parse_bytes(text.as_bytes(), config)
}

fn run(
    bytes: &[u8],
    origin: &str,
    config: &ParseConfig,
    provenance: impl FnOnce(ExtractionMethod) -> Provenance,
) -> Result<ParseOutput, TariffError> {
    let start = Instant::now();
    let (lines, method) = extract::extract_from(bytes, origin, &config.extract)?;
    let resolution = resolve::resolve(&lines, &config.library);
    debug!(
        origin,
        resolved = resolution.fields.len(),
        unresolved = resolution.unresolved.len(),
        "fields resolved"
    );
    let output = normalize::normalize(&resolution, provenance(method), &config.normalize);
    info!(origin, elapsed_ms = start.elapsed().as_millis() as u64, "document parsed");
    Ok(output)
}

/// Resolve the first available candidate and parse it.
pub async fn resolve_and_parse(
    candidates: &[SourceDescriptor],
    resolver: &ResolverConfig,
    config: &ParseConfig,
) -> Result<ParseOutput, TariffError> {
    let document = source::resolve_source(candidates, resolver).await?;
    let config = config.clone();
    tokio::task::spawn_blocking(move || parse_document(&document, &config))
        .await
        .map_err(|e| TariffError::Internal(format!("Parse task panicked: {e}")))?
}

/// Blocking wrapper around [`resolve_and_parse`] for callers without a
/// runtime. Must not be called from inside one.
pub fn resolve_and_parse_sync(
    candidates: &[SourceDescriptor],
    resolver: &ResolverConfig,
    config: &ParseConfig,
) -> Result<ParseOutput, TariffError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TariffError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(resolve_and_parse(candidates, resolver, config))
}

/// Run several independent resolutions, at most `config.concurrency` at a
/// time. Results come back in request order; one failure does not affect
/// the others.
pub async fn resolve_all(
    requests: &[Vec<SourceDescriptor>],
    resolver: &ResolverConfig,
    config: &ParseConfig,
) -> Vec<Result<ParseOutput, TariffError>> {
    let mut results: Vec<(usize, Result<ParseOutput, TariffError>)> =
        stream::iter(requests.iter().enumerate())
            .map(|(i, candidates)| async move {
                (i, resolve_and_parse(candidates, resolver, config).await)
            })
            .buffer_unordered(config.concurrency)
            .collect()
            .await;
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}
