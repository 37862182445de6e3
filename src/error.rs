//! Error types for the tariffscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TariffError`] is **fatal**: the request cannot proceed at all
//!   (document has no text layer, every candidate source failed, pdfium not
//!   bindable). Returned as `Err(TariffError)` from the top-level entry points.
//!
//! * [`FieldIssue`] is **non-fatal**: a single field could not be resolved
//!   (no match, or a negative/malformed value) but the rest of the schedule is
//!   fine. Stored inside [`crate::output::Diagnostics`] so callers can present
//!   a partial schedule instead of losing the whole document to one field.
//!
//! Schedule-level consistency problems are warnings, not errors: see
//! [`ScheduleWarning`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tariffscan library.
///
/// Field-level failures use [`FieldIssue`] and are stored in
/// [`crate::output::Diagnostics`] rather than propagated here.
#[derive(Debug, Error)]
pub enum TariffError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes are not a recognised document format, or hold no text.
    #[error("Unreadable document ({origin}): {reason}")]
    UnreadableDocument { origin: String, reason: String },

    /// pdfium-render could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium, or install pdfium\n\
where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Source errors ─────────────────────────────────────────────────────
    /// Every candidate source failed retrieval.
    #[error(
        "No available source: all {} candidate(s) failed{}",
        .attempts.len(),
        summarize_attempts(.attempts)
    )]
    NoAvailableSource { attempts: Vec<SourceAttempt> },

    /// A source reference string could not be interpreted.
    #[error("Invalid source '{source_ref}': {reason}")]
    InvalidSource { source_ref: String, reason: String },

    // ── Catalog errors ────────────────────────────────────────────────────
    /// Catalog file could not be read, parsed or written.
    #[error("Catalog '{path}': {detail}")]
    Catalog { path: PathBuf, detail: String },

    /// A downloaded document could not be written to the cache directory.
    #[error("Failed to write cache file '{path}': {source}")]
    CacheWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One failed candidate inside [`TariffError::NoAvailableSource`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceAttempt {
    /// The candidate's source reference, as written in the catalog.
    pub source: String,
    /// Why retrieval failed.
    pub reason: String,
}

fn summarize_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("\n  - {}: {}", a.source, a.reason))
        .collect()
}

/// A non-fatal problem with a single field.
///
/// The field is absent from the schedule and the issue is listed in
/// [`crate::output::Diagnostics::unresolved`]. Values are never clamped or
/// coerced to make an issue go away.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum FieldIssue {
    /// No rule for the field matched anywhere in the document.
    #[error("{field}: no match found")]
    FieldUnresolved { field: String },

    /// A match was found but its value is out of domain (negative currency,
    /// impossible date, unparseable number).
    #[error("{field}: rejected value '{raw}' on line {line}: {reason}")]
    NegativeOrMalformedValue {
        field: String,
        raw: String,
        line: usize,
        reason: String,
    },
}

impl FieldIssue {
    /// The field identifier this issue refers to.
    pub fn field(&self) -> &str {
        match self {
            FieldIssue::FieldUnresolved { field } => field,
            FieldIssue::NegativeOrMalformedValue { field, .. } => field,
        }
    }
}

/// A schedule-level consistency warning. The schedule is still returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ScheduleWarning {
    /// A season in the TOU map lacks periods other seasons have.
    #[error("TOU schedule incomplete: season '{season}' is missing {missing:?}")]
    ScheduleIncomplete { season: String, missing: Vec<String> },

    /// Some calendar months belong to no season.
    #[error("Season calendar leaves months {months:?} unassigned")]
    SeasonCalendarGap { months: Vec<u32> },
}
