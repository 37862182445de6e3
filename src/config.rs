//! Configuration types for parsing and source resolution.
//!
//! Parsing behaviour is controlled through [`ParseConfig`]; fetching through
//! [`ResolverConfig`]. Both are built via builders with documented defaults
//! and a validating `build()`. The default season calendar lives here too,
//! since it is configuration rather than something read from documents.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::document::DocumentFormat;
use crate::error::TariffError;
use crate::pipeline::patterns::PatternLibrary;
use crate::progress::{NoopObserver, Observer};

// ── Season calendar ──────────────────────────────────────────────────────

/// Mapping of season name → calendar months (1–12).
///
/// String form: `summer=6-9;winter=1-5,10-12`. Month ranges may wrap
/// (`winter=10-5`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeasonCalendar {
    seasons: BTreeMap<String, BTreeSet<u32>>,
}

impl Default for SeasonCalendar {
    /// June through September is summer; every other month is winter.
    fn default() -> Self {
        Self::summer_june_september()
    }
}

impl SeasonCalendar {
    /// An empty calendar. Every month is uncovered.
    pub fn empty() -> Self {
        Self {
            seasons: BTreeMap::new(),
        }
    }

    /// Summer June–September, winter October–May.
    pub fn summer_june_september() -> Self {
        let mut cal = Self::empty();
        cal.set_season("summer", 6..=9);
        cal.set_season("winter", (1..=5).chain(10..=12));
        cal
    }

    /// Parse `name=months;name=months`, where months is a comma-separated list
    /// of `M` or `M-N` items.
    pub fn parse(spec: &str) -> Result<Self, TariffError> {
        let mut cal = Self::empty();
        for part in spec.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, months) = part.split_once('=').ok_or_else(|| {
                TariffError::InvalidConfig(format!("season '{part}' must be written name=months"))
            })?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(TariffError::InvalidConfig(format!(
                    "season '{part}' has no name"
                )));
            }
            let mut set = BTreeSet::new();
            for item in months.split(',').map(str::trim).filter(|i| !i.is_empty()) {
                match item.split_once('-') {
                    Some((a, b)) => {
                        let start = parse_month(a)?;
                        let end = parse_month(b)?;
                        set.extend(month_range(start, end));
                    }
                    None => {
                        set.insert(parse_month(item)?);
                    }
                }
            }
            if set.is_empty() {
                return Err(TariffError::InvalidConfig(format!(
                    "season '{name}' has no months"
                )));
            }
            cal.seasons.insert(name, set);
        }
        if cal.seasons.is_empty() {
            return Err(TariffError::InvalidConfig("season calendar is empty".into()));
        }
        Ok(cal)
    }

    /// Replace a season's months.
    pub fn set_season(&mut self, name: &str, months: impl IntoIterator<Item = u32>) {
        self.seasons.insert(
            name.to_string(),
            months.into_iter().filter(|m| (1..=12).contains(m)).collect(),
        );
    }

    /// Assign months to `name` and remove them from every other season.
    /// Seasons left with no months are dropped.
    pub fn claim(&mut self, name: &str, months: &BTreeSet<u32>) {
        for (other, set) in self.seasons.iter_mut() {
            if other != name {
                set.retain(|m| !months.contains(m));
            }
        }
        self.seasons.retain(|_, set| !set.is_empty());
        self.set_season(name, months.iter().copied());
    }

    /// The season containing `month`, if any.
    pub fn season_for(&self, month: u32) -> Option<&str> {
        self.seasons
            .iter()
            .find(|(_, months)| months.contains(&month))
            .map(|(name, _)| name.as_str())
    }

    /// Months (1–12) that belong to no season.
    pub fn uncovered_months(&self) -> Vec<u32> {
        (1..=12)
            .filter(|m| !self.seasons.values().any(|s| s.contains(m)))
            .collect()
    }

    pub fn seasons(&self) -> &BTreeMap<String, BTreeSet<u32>> {
        &self.seasons
    }

    pub fn months(&self, season: &str) -> Option<&BTreeSet<u32>> {
        self.seasons.get(season)
    }
}

impl fmt::Display for SeasonCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .seasons
            .iter()
            .map(|(name, months)| {
                let list: Vec<String> = months.iter().map(u32::to_string).collect();
                format!("{name}={}", list.join(","))
            })
            .collect();
        f.write_str(&parts.join(";"))
    }
}

fn parse_month(s: &str) -> Result<u32, TariffError> {
    match s.trim().parse::<u32>() {
        Ok(m) if (1..=12).contains(&m) => Ok(m),
        _ => Err(TariffError::InvalidConfig(format!(
            "'{}' is not a month number 1-12",
            s.trim()
        ))),
    }
}

/// Inclusive month range, wrapping through December when `end < start`.
pub(crate) fn month_range(start: u32, end: u32) -> Vec<u32> {
    if start <= end {
        (start..=end).collect()
    } else {
        (start..=12).chain(1..=end).collect()
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Keywords used to score pages when [`ExtractConfig::max_pages`] is set.
pub const DEFAULT_RELEVANCE_KEYWORDS: &[&str] = &[
    "residential",
    "schedule r",
    "time-of-use",
    "service and facility",
    "energy charge",
    "per kwh",
    "summer season",
    "winter season",
    "on-peak",
    "off-peak",
    "effective",
];

/// Text-extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Directory containing the pdfium shared library. `None` binds to the
    /// system library (or `PDFIUM_LIB_PATH` when set).
    pub pdfium_lib_path: Option<PathBuf>,

    /// Keep only the N most relevant pages. Default: `None` (all pages).
    pub max_pages: Option<usize>,

    /// Lower-case keywords for page scoring.
    pub relevance_keywords: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            pdfium_lib_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
            max_pages: None,
            relevance_keywords: DEFAULT_RELEVANCE_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Schedule-normalizer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Calendar applied when the document does not define its seasons.
    pub season_calendar: SeasonCalendar,
}

// ── Parse config ─────────────────────────────────────────────────────────

/// Everything the synchronous parse stages need.
///
/// # Example
/// ```rust
/// use tariffscan::{ParseConfig, SeasonCalendar};
///
/// let config = ParseConfig::builder()
///     .season_calendar(SeasonCalendar::parse("summer=6-9;winter=1-5,10-12").unwrap())
///     .max_pages(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.extract.max_pages, Some(4));
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    pub extract: ExtractConfig,
    pub normalize: NormalizeConfig,

    /// Shared, read-only pattern library. Default: [`PatternLibrary::standard`].
    pub library: Arc<PatternLibrary>,

    /// Parallel resolutions in [`crate::parse::resolve_all`]. Default: 4.
    pub concurrency: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            extract: ExtractConfig::default(),
            normalize: NormalizeConfig::default(),
            library: PatternLibrary::standard(),
            concurrency: 4,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("extract", &self.extract)
            .field("normalize", &self.normalize)
            .field("library", &self.library.version())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ParseConfig {
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ParseConfig`].
#[derive(Debug)]
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.extract.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.extract.max_pages = Some(n);
        self
    }

    pub fn relevance_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extract.relevance_keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self
    }

    pub fn season_calendar(mut self, calendar: SeasonCalendar) -> Self {
        self.config.normalize.season_calendar = calendar;
        self
    }

    pub fn library(mut self, library: Arc<PatternLibrary>) -> Self {
        self.config.library = library;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, TariffError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(TariffError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.extract.max_pages == Some(0) {
            return Err(TariffError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.extract.max_pages.is_some() && c.extract.relevance_keywords.is_empty() {
            return Err(TariffError::InvalidConfig(
                "max_pages requires at least one relevance keyword".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Resolver config ──────────────────────────────────────────────────────

/// Upper bound for [`ResolverConfig::retry_backoff_ms`].
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Source-resolver settings.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Base directory for relative local sources. Default: current directory.
    pub data_dir: Option<PathBuf>,

    /// Where downloaded documents are cached. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,

    /// Per-request timeout in seconds. Default: 10.
    pub timeout_secs: u64,

    /// Retries for transient network failures (connect errors, timeouts,
    /// 5xx). Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500,
    /// at most [`MAX_RETRY_BACKOFF_MS`].
    pub retry_backoff_ms: u64,

    /// Format every candidate must have. Default: PDF.
    pub expected_format: DocumentFormat,

    /// `User-Agent` header for downloads.
    pub user_agent: String,

    /// Resolution event sink. Default: [`NoopObserver`].
    pub observer: Observer,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_dir: None,
            timeout_secs: 10,
            max_retries: 1,
            retry_backoff_ms: 500,
            expected_format: DocumentFormat::Pdf,
            user_agent: concat!("tariffscan/", env!("CARGO_PKG_VERSION")).to_string(),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("data_dir", &self.data_dir)
            .field("cache_dir", &self.cache_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("expected_format", &self.expected_format)
            .field("user_agent", &self.user_agent)
            .field("observer", &"<dyn ResolutionObserver>")
            .finish()
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ResolverConfig`].
#[derive(Debug)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn expected_format(mut self, format: DocumentFormat) -> Self {
        self.config.expected_format = format;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = observer;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ResolverConfig, TariffError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(TariffError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_retries > 10 {
            return Err(TariffError::InvalidConfig(format!(
                "max_retries must be ≤ 10, got {}",
                c.max_retries
            )));
        }
        if c.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(TariffError::InvalidConfig(format!(
                "retry_backoff_ms must be ≤ {MAX_RETRY_BACKOFF_MS}, got {}",
                c.retry_backoff_ms
            )));
        }
        if c.user_agent.trim().is_empty() {
            return Err(TariffError::InvalidConfig("User-Agent must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_calendar_covers_every_month() {
        let cal = SeasonCalendar::default();
        assert!(cal.uncovered_months().is_empty());
        assert_eq!(cal.season_for(7), Some("summer"));
        assert_eq!(cal.season_for(1), Some("winter"));
        assert_eq!(cal.season_for(10), Some("winter"));
    }

    #[test]
    fn calendar_spec_parsing() {
        let cal = SeasonCalendar::parse("summer=6-9; winter=10-5").unwrap();
        assert_eq!(cal, SeasonCalendar::default());
        assert_eq!(cal.to_string(), "summer=6,7,8,9;winter=1,2,3,4,5,10,11,12");

        assert!(SeasonCalendar::parse("").is_err());
        assert!(SeasonCalendar::parse("summer").is_err());
        assert!(SeasonCalendar::parse("summer=13").is_err());
        assert!(SeasonCalendar::parse("=1-3").is_err());
    }

    #[test]
    fn claim_moves_months_between_seasons() {
        let mut cal = SeasonCalendar::default();
        let may_to_oct: BTreeSet<u32> = (5..=10).collect();
        cal.claim("summer", &may_to_oct);
        assert_eq!(cal.season_for(5), Some("summer"));
        assert_eq!(cal.season_for(10), Some("summer"));
        assert_eq!(
            cal.months("winter").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 11, 12]
        );
    }

    #[test]
    fn partial_calendar_reports_gaps() {
        let cal = SeasonCalendar::parse("summer=6-9").unwrap();
        assert_eq!(cal.uncovered_months(), vec![1, 2, 3, 4, 5, 10, 11, 12]);
    }

    #[test]
    fn parse_config_validation() {
        assert!(ParseConfig::builder().concurrency(0).build().is_err());
        assert!(ParseConfig::builder().max_pages(0).build().is_err());
        assert!(ParseConfig::builder()
            .max_pages(2)
            .relevance_keywords(Vec::<String>::new())
            .build()
            .is_err());
        let ok = ParseConfig::builder()
            .max_pages(2)
            .relevance_keywords(["Residential"])
            .build()
            .unwrap();
        assert_eq!(ok.extract.relevance_keywords, vec!["residential".to_string()]);
    }

    #[test]
    fn resolver_config_defaults_and_validation() {
        let c = ResolverConfig::default();
        assert_eq!(c.timeout_secs, 10);
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.expected_format, DocumentFormat::Pdf);
        assert!(ResolverConfig::builder().timeout_secs(0).build().is_err());
        assert!(ResolverConfig::builder().max_retries(11).build().is_err());
        assert!(ResolverConfig::builder().user_agent(" ").build().is_err());
        assert!(ResolverConfig::builder()
            .retry_backoff_ms(MAX_RETRY_BACKOFF_MS + 1)
            .build()
            .is_err());
        assert!(ResolverConfig::builder()
            .retry_backoff_ms(MAX_RETRY_BACKOFF_MS)
            .build()
            .is_ok());
        let dbg = format!("{:?}", ResolverConfig::default());
        assert!(dbg.contains("<dyn ResolutionObserver>"));
    }
}
