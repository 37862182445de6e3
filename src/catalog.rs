//! The source catalog (`sources.json`): candidate documents per provider and
//! service type.
//!
//! ```json
//! {
//!   "version": "3.0",
//!   "providers": {
//!     "xcel_energy": {
//!       "electric": [
//!         { "source": "file://co_electric_2025-04-01.pdf",
//!           "effective_date": "2025-04-01",
//!           "description": "Electric rates effective 2025-04-01" }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Entries are kept newest first. [`Catalog::candidates`] hands them to the
//! source resolver in that order, with bundled files ahead of URLs when two
//! entries share an effective date.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::document::SourceDescriptor;
use crate::error::TariffError;

/// Catalog format version written by [`Catalog::new`].
pub const CATALOG_VERSION: &str = "3.0";

/// provider -> service type -> entries (newest first).
pub type ProviderMap = BTreeMap<String, BTreeMap<String, Vec<SourceDescriptor>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    #[serde(default)]
    pub providers: ProviderMap,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            providers: BTreeMap::new(),
        }
    }

    /// Read and parse a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TariffError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TariffError::Catalog {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mut catalog: Catalog = serde_json::from_str(&text).map_err(|e| TariffError::Catalog {
            path: path.to_path_buf(),
            detail: format!("invalid JSON: {e}"),
        })?;
        catalog.sort_all();
        debug!(path = %path.display(), providers = catalog.providers.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Load `path` if it exists, otherwise start an empty catalog.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, TariffError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TariffError> {
        let mut catalog: Catalog = serde_json::from_str(json).map_err(|e| TariffError::Catalog {
            path: "<inline>".into(),
            detail: format!("invalid JSON: {e}"),
        })?;
        catalog.sort_all();
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String, TariffError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TariffError::Internal(format!("catalog serialization failed: {e}")))
    }

    /// Write the catalog to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TariffError> {
        let path = path.as_ref();
        let fail = |detail: String| TariffError::Catalog {
            path: path.to_path_buf(),
            detail,
        };
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| fail(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .map_err(|e| fail(e.to_string()))?;
        tmp.persist(path).map_err(|e| fail(e.error.to_string()))?;
        info!(path = %path.display(), "catalog saved");
        Ok(())
    }

    /// Candidates for one provider/service, in resolution order.
    ///
    /// Empty when the provider or service type is unknown.
    pub fn candidates(&self, provider: &str, service: &str) -> Vec<SourceDescriptor> {
        let mut entries = self
            .providers
            .get(provider)
            .and_then(|services| services.get(service))
            .cloned()
            .unwrap_or_default();
        sort_entries(&mut entries);
        entries
    }

    /// Add `entry`, replacing any entry with the same source string.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, provider: &str, service: &str, entry: SourceDescriptor) -> bool {
        let entries = self
            .providers
            .entry(provider.to_string())
            .or_default()
            .entry(service.to_string())
            .or_default();
        let key = entry.source.to_string();
        let replaced = match entries.iter_mut().find(|e| e.source.to_string() == key) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                entries.push(entry);
                false
            }
        };
        sort_entries(entries);
        debug!(provider, service, source = %key, replaced, "catalog entry upserted");
        replaced
    }

    /// All `(provider, service)` pairs, in name order.
    pub fn services(&self) -> Vec<(&str, &str)> {
        self.providers
            .iter()
            .flat_map(|(p, services)| services.keys().map(move |s| (p.as_str(), s.as_str())))
            .collect()
    }

    fn sort_all(&mut self) {
        for services in self.providers.values_mut() {
            for entries in services.values_mut() {
                sort_entries(entries);
            }
        }
    }
}

/// Newest first; bundled files ahead of URLs on equal dates. Stable, so
/// otherwise-equal entries keep their listed order.
fn sort_entries(entries: &mut [SourceDescriptor]) {
    entries.sort_by(|a, b| {
        b.effective_date
            .cmp(&a.effective_date)
            .then_with(|| b.source.is_local().cmp(&a.source.is_local()))
    });
}

// ── Effective dates from file names ──────────────────────────────────────

enum DateOrder {
    MonthDayYear,
    YearMonthDay,
}

static FILENAME_DATES: Lazy<Vec<(Regex, DateOrder)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})").unwrap(), DateOrder::MonthDayYear),
        (Regex::new(r"(\d{2})-(\d{2})-(\d{4})").unwrap(), DateOrder::MonthDayYear),
        (Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(), DateOrder::YearMonthDay),
        (
            Regex::new(r"(?i)as[_\s]of[_\s-]*(\d{2})-(\d{2})-(\d{4})").unwrap(),
            DateOrder::MonthDayYear,
        ),
        (Regex::new(r"(\d{2})-(\d{2})-(\d{2})").unwrap(), DateOrder::MonthDayYear),
    ]
});

/// Infer an effective date from a document file name.
///
/// Recognises `MM.DD.YYYY`, `MM-DD-YYYY`, `YYYY-MM-DD`, `as_of-MM-DD-YYYY`
/// and `MM-DD-YY` (20YY), tried in that order. Matches that are not real
/// calendar dates are skipped.
///
/// ```
/// use tariffscan::catalog::effective_date_from_filename;
/// let d = effective_date_from_filename("co_electric_2025-04-01.pdf").unwrap();
/// assert_eq!(d.to_string(), "2025-04-01");
/// ```
pub fn effective_date_from_filename(name: &str) -> Option<NaiveDate> {
    for (re, order) in FILENAME_DATES.iter() {
        for caps in re.captures_iter(name) {
            let nums: Vec<u32> = (1..=3)
                .filter_map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
                .collect();
            let [a, b, c] = nums[..] else { continue };
            let (year, month, day) = match order {
                DateOrder::YearMonthDay => (a, b, c),
                DateOrder::MonthDayYear if c < 100 => (2000 + c, a, b),
                DateOrder::MonthDayYear => (c, a, b),
            };
            if let Some(date) = i32::try_from(year)
                .ok()
                .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
            {
                return Some(date);
            }
        }
    }
    None
}
