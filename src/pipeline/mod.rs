//! Pipeline stages for tariff-document parsing.
//!
//! Each submodule implements exactly one step; every step can be called and
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ extract ──▶ resolve ──▶ normalize
//! (file/URL)  (pdfium)   (patterns)  (schedule)
//! ```
//!
//! 1. [`source`]   : pick the first candidate whose bytes can be obtained;
//!    the only stage with network I/O
//! 2. [`extract`]  : bytes to an ordered line sequence; runs in
//!    `spawn_blocking` from the async entry points because pdfium blocks
//! 3. [`resolve`]  : apply the [`patterns`] library to the lines, turning
//!    matched text into typed [`values`]
//! 4. [`normalize`]: assemble resolved fields into a `RateSchedule` and
//!    diagnostics
//!
//! [`links`] feeds the catalog: it turns a rate-book HTML page into candidate
//! sources.

pub mod extract;
pub mod links;
pub mod normalize;
pub mod patterns;
pub mod resolve;
pub mod source;
pub mod values;
