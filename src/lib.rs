//! # tariffscan
//!
//! Extract normalized utility rate schedules from tariff documents.
//!
//! Power utilities publish their rates as PDF rate books and one-page rate
//! summaries. The layouts drift from year to year but stay within a known
//! family: seasonal "All kWh" tables, on-peak/shoulder/off-peak TOU blocks, a
//! monthly service charge, billing-period definitions and an effective date.
//! This crate reads the text layer of such a document, locates those values
//! with a versioned pattern library and returns a canonical
//! [`RateSchedule`] plus [`Diagnostics`] that say exactly which fields could
//! not be found and why.
//!
//! ## Pipeline Overview
//!
//! ```text
//! candidates (catalog / link discovery)
//!  │
//!  ├─ 1. Source     first local file or URL that actually resolves (cache, retry)
//!  ├─ 2. Extract    pdfium text layer → ordered lines (spawn_blocking)
//!  ├─ 3. Resolve    anchor + window rules → typed field values
//!  ├─ 4. Normalize  units, seasons, TOU completeness, provenance
//!  └─ 5. Output     RateSchedule + Diagnostics (serde)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tariffscan::{resolve_and_parse, Catalog, ParseConfig, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::load("sources.json")?;
//!     let candidates = catalog.candidates("xcel_energy", "electric");
//!     let resolver = ResolverConfig::builder()
//!         .data_dir("data")
//!         .cache_dir(".cache/tariffs")
//!         .build()?;
//!     let output = resolve_and_parse(&candidates, &resolver, &ParseConfig::default()).await?;
//!     println!("summer: {:?}", output.schedule.rate("summer"));
//!     for issue in &output.diagnostics.unresolved {
//!         eprintln!("unresolved: {issue}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tariffscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Library-only users can drop the CLI dependencies:
//! ```toml
//! tariffscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod calendar;
pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod schedule;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{effective_date_from_filename, Catalog};
pub use config::{
    ExtractConfig, NormalizeConfig, ParseConfig, ParseConfigBuilder, ResolverConfig,
    ResolverConfigBuilder, SeasonCalendar, MAX_RETRY_BACKOFF_MS,
};
pub use document::{Document, DocumentFormat, LineSequence, Retrieval, SourceDescriptor, SourceRef};
pub use error::{FieldIssue, ScheduleWarning, SourceAttempt, TariffError};
pub use output::{AmbiguousField, Diagnostics, MatchTrace, ParseOutput};
pub use parse::{
    parse_bytes, parse_document, parse_text, resolve_all, resolve_and_parse, resolve_and_parse_sync,
};
pub use pipeline::extract::extract;
pub use pipeline::links::{discover_links, fetch_links, DiscoveredLink};
pub use pipeline::normalize::normalize;
pub use pipeline::patterns::{FieldRule, PatternLibrary, STANDARD_LIBRARY_VERSION};
pub use pipeline::resolve::{resolve, Resolution, ResolvedField};
pub use pipeline::source::resolve_source;
pub use progress::{NoopObserver, Observer, ResolutionObserver};
pub use schedule::{
    ChargeBasis, ClockRange, ExtractionMethod, FixedCharge, Provenance, RateSchedule, TouPeriod,
};
