//! Source and document types shared by every pipeline stage.
//!
//! A [`SourceDescriptor`] names *where* a tariff document can be found and
//! *when* its rates took effect. A [`Document`] is the immutable result of
//! retrieving one: the raw bytes plus a record of how they were obtained.
//! A [`LineSequence`] is what the text extractor makes of those bytes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TariffError;

// ── Source references ────────────────────────────────────────────────────

/// Where a candidate document lives.
///
/// String form (as stored in the catalog):
/// - `http://…` / `https://…` → [`SourceRef::Url`]
/// - `file://name.pdf` or a bare path → [`SourceRef::LocalFile`]
/// - any other `scheme://` → rejected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceRef {
    /// A bundled document; relative paths resolve against the data directory.
    LocalFile(PathBuf),
    /// A remote document fetched over HTTP(S).
    Url(String),
}

impl SourceRef {
    /// `true` for bundled/local references.
    pub fn is_local(&self) -> bool {
        matches!(self, SourceRef::LocalFile(_))
    }

    /// The last path component, used for date inference and cache naming.
    pub fn file_name(&self) -> Option<String> {
        match self {
            SourceRef::LocalFile(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            SourceRef::Url(u) => reqwest::Url::parse(u).ok().and_then(|url| {
                url.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
                    .filter(|s| !s.is_empty())
            }),
        }
    }
}

impl FromStr for SourceRef {
    type Err = TariffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TariffError::InvalidSource {
                source_ref: s.to_string(),
                reason: "empty source reference".into(),
            });
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return reqwest::Url::parse(s)
                .map(|_| SourceRef::Url(s.to_string()))
                .map_err(|e| TariffError::InvalidSource {
                    source_ref: s.to_string(),
                    reason: e.to_string(),
                });
        }
        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(TariffError::InvalidSource {
                    source_ref: s.to_string(),
                    reason: "file:// reference without a path".into(),
                });
            }
            return Ok(SourceRef::LocalFile(PathBuf::from(path)));
        }
        if s.contains("://") {
            return Err(TariffError::InvalidSource {
                source_ref: s.to_string(),
                reason: "unsupported scheme (expected http, https or file)".into(),
            });
        }
        Ok(SourceRef::LocalFile(PathBuf::from(s)))
    }
}

impl TryFrom<String> for SourceRef {
    type Error = TariffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceRef> for String {
    fn from(value: SourceRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::LocalFile(p) => write!(f, "file://{}", p.display()),
            SourceRef::Url(u) => f.write_str(u),
        }
    }
}

/// A candidate source: reference, effective date and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source: SourceRef,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    /// Free-form document version tag (e.g. an advice-letter number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SourceDescriptor {
    pub fn new(
        source: SourceRef,
        effective_date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source,
            effective_date,
            description: description.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

// ── Formats ──────────────────────────────────────────────────────────────

/// Document formats the text extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// PDF with an embedded text layer. Magic: `%PDF`.
    #[default]
    Pdf,
    /// UTF-8 text (rate summaries saved as text, pre-extracted fixtures).
    PlainText,
}

impl DocumentFormat {
    /// Guess the format from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Option<DocumentFormat> {
        if bytes.starts_with(b"%PDF") {
            Some(DocumentFormat::Pdf)
        } else if looks_like_text(bytes) {
            Some(DocumentFormat::PlainText)
        } else {
            None
        }
    }

    /// Do the first bytes match this format's signature?
    pub fn matches_signature(self, bytes: &[u8]) -> bool {
        match self {
            DocumentFormat::Pdf => bytes.starts_with(b"%PDF"),
            DocumentFormat::PlainText => looks_like_text(bytes),
        }
    }

    /// Is an HTTP `Content-Type` compatible with this format?
    ///
    /// Servers that omit the header, or send a generic binary type, are given
    /// the benefit of the doubt; the signature check decides.
    pub fn accepts_content_type(self, content_type: Option<&str>) -> bool {
        let Some(ct) = content_type else {
            return true;
        };
        let ct = ct.to_ascii_lowercase();
        match self {
            DocumentFormat::Pdf => {
                ct.contains("pdf") || ct.contains("octet-stream") || ct.contains("binary")
            }
            DocumentFormat::PlainText => {
                ct.starts_with("text/plain") || ct.contains("octet-stream")
            }
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::PlainText => f.write_str("plain_text"),
        }
    }
}

fn looks_like_text(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(4096)];
    !head.is_empty() && !head.contains(&0) && std::str::from_utf8(trim_partial_utf8(head)).is_ok()
}

/// Drop a trailing partial UTF-8 sequence so a 4 KiB window does not fail
/// validation in the middle of a multi-byte character.
fn trim_partial_utf8(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes,
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        Err(_) => bytes,
    }
}

// ── Documents ────────────────────────────────────────────────────────────

/// How a document's bytes were obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retrieval {
    /// Read from a bundled/local file.
    Bundled { path: PathBuf },
    /// A previously downloaded copy found in the cache directory.
    Cached { url: String, path: PathBuf },
    /// Downloaded during this resolution.
    Downloaded { url: String },
    /// Supplied directly by the caller.
    InMemory,
}

/// Raw document bytes plus where they came from. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    descriptor: SourceDescriptor,
    retrieval: Retrieval,
}

impl Document {
    pub fn new(bytes: Vec<u8>, descriptor: SourceDescriptor, retrieval: Retrieval) -> Self {
        Self {
            bytes,
            descriptor,
            retrieval,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn retrieval(&self) -> &Retrieval {
        &self.retrieval
    }

    /// Human-readable origin for log lines and error messages.
    pub fn origin(&self) -> String {
        match &self.retrieval {
            Retrieval::Bundled { path } | Retrieval::Cached { path, .. } => {
                path.display().to_string()
            }
            Retrieval::Downloaded { url } => url.clone(),
            Retrieval::InMemory => self.descriptor.source.to_string(),
        }
    }
}

// ── Lines ────────────────────────────────────────────────────────────────

/// One extracted line of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// 1-indexed page the line came from.
    pub page: usize,
    pub text: String,
}

/// Ordered lines in extraction order.
///
/// The index of a line is its position here, which for multi-column layouts
/// is not necessarily visual reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSequence {
    lines: Vec<Line>,
}

impl LineSequence {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    /// Split text into lines; form feeds start a new page.
    pub fn from_text(text: &str) -> Self {
        let mut lines = Vec::new();
        for (page_idx, page) in text.split('\x0c').enumerate() {
            for line in page.lines() {
                lines.push(Line {
                    page: page_idx + 1,
                    text: line.to_string(),
                });
            }
        }
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    /// Number of distinct pages represented.
    pub fn page_count(&self) -> usize {
        self.lines.iter().map(|l| l.page).max().unwrap_or(0)
    }
}

/// Resolve a local reference against a data directory.
pub(crate) fn resolve_local_path(path: &Path, data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
