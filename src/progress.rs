//! Observer trait for source-resolution events.
//!
//! Inject an [`Arc<dyn ResolutionObserver>`] via
//! [`crate::config::ResolverConfigBuilder::observer`] to be told which
//! candidate the resolver is trying, which ones failed and why, and which one
//! finally produced a document.
//!
//! # Example
//!
//! ```rust
//! use tariffscan::{ResolutionObserver, ResolverConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl ResolutionObserver for FailureCounter {
//!     fn on_candidate_failed(&self, _index: usize, _total: usize, source: &str, reason: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{source} unavailable: {reason}");
//!     }
//! }
//!
//! let config = ResolverConfig::builder()
//!     .observer(Arc::new(FailureCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::document::Retrieval;

/// Called by the source resolver as it walks the candidate list.
///
/// Implementations must be `Send + Sync`: [`crate::parse::resolve_all`] runs
/// several resolutions concurrently against one shared observer. Every method
/// has a no-op default.
pub trait ResolutionObserver: Send + Sync {
    /// Called once before the first candidate is tried.
    fn on_resolution_start(&self, total_candidates: usize) {
        let _ = total_candidates;
    }

    /// Called before a candidate is tried.
    ///
    /// # Arguments
    /// * `index` : 1-indexed position in the candidate list
    /// * `total` : number of candidates
    /// * `source`: the candidate's source string
    fn on_candidate_start(&self, index: usize, total: usize, source: &str) {
        let _ = (index, total, source);
    }

    /// Called when a candidate could not be used.
    fn on_candidate_failed(&self, index: usize, total: usize, source: &str, reason: &str) {
        let _ = (index, total, source, reason);
    }

    /// Called when a candidate produced a document. No further candidates are
    /// tried after this.
    fn on_candidate_resolved(
        &self,
        index: usize,
        total: usize,
        source: &str,
        retrieval: &Retrieval,
    ) {
        let _ = (index, total, source, retrieval);
    }

    /// Called before a transient network failure is retried.
    fn on_retry(&self, source: &str, attempt: u32, max_retries: u32) {
        let _ = (source, attempt, max_retries);
    }
}

/// Observer that ignores every event. The default.
pub struct NoopObserver;

impl ResolutionObserver for NoopObserver {}

/// Shared observer handle as stored in [`crate::config::ResolverConfig`].
pub type Observer = Arc<dyn ResolutionObserver>;
