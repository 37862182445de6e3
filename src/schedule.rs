//! The canonical rate schedule and its provenance.
//!
//! A [`RateSchedule`] is the only long-lived artifact the pipeline produces.
//! Its fields are private: it is assembled by the schedule normalizer and read
//! through accessors, so a schedule obtained from this crate always satisfies
//! its own invariants (non-negative rates, valid dates). It is
//! serde-serializable so callers can persist it.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::SeasonCalendar;
use crate::document::{Retrieval, SourceDescriptor};

/// A time-of-use billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouPeriod {
    Peak,
    Shoulder,
    OffPeak,
}

impl TouPeriod {
    pub const ALL: [TouPeriod; 3] = [TouPeriod::Peak, TouPeriod::Shoulder, TouPeriod::OffPeak];

    pub fn as_str(self) -> &'static str {
        match self {
            TouPeriod::Peak => "peak",
            TouPeriod::Shoulder => "shoulder",
            TouPeriod::OffPeak => "off_peak",
        }
    }

    pub fn from_id(s: &str) -> Option<TouPeriod> {
        match s {
            "peak" => Some(TouPeriod::Peak),
            "shoulder" => Some(TouPeriod::Shoulder),
            "off_peak" => Some(TouPeriod::OffPeak),
            _ => None,
        }
    }
}

impl fmt::Display for TouPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A daily clock-time window, `[start, end)`. `end <= start` wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ClockRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl fmt::Display for ClockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// What a fixed charge is billed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeBasis {
    /// Dollars per billing month.
    PerMonth,
    /// Dollars per kW of billed demand.
    PerKw,
}

/// A fixed (non-energy) charge in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedCharge {
    pub amount: f64,
    pub basis: ChargeBasis,
}

/// How the text was obtained from the document bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// pdfium text layer, page by page.
    PdfTextLayer,
    /// The document was already text.
    PlainText,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::PdfTextLayer => f.write_str("pdf_text_layer"),
            ExtractionMethod::PlainText => f.write_str("plain_text"),
        }
    }
}

/// Where a schedule came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// The candidate that produced the document, when known.
    pub source: Option<SourceDescriptor>,
    pub retrieval: Retrieval,
    pub extraction_method: ExtractionMethod,
    /// Version of the pattern library that resolved the fields.
    pub library_version: String,
}

/// Normalized utility rate schedule. All dollar amounts are non-negative;
/// energy rates are in $/kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSchedule {
    pub(crate) rates: BTreeMap<String, f64>,
    pub(crate) tou_rates: BTreeMap<String, BTreeMap<TouPeriod, f64>>,
    #[serde(default)]
    pub(crate) tiered_rates: BTreeMap<String, BTreeMap<u32, f64>>,
    pub(crate) fixed_charges: BTreeMap<String, FixedCharge>,
    pub(crate) tou_periods: BTreeMap<TouPeriod, ClockRange>,
    pub(crate) seasons: SeasonCalendar,
    pub(crate) holidays: BTreeSet<String>,
    pub(crate) effective_date: Option<NaiveDate>,
    pub(crate) provenance: Provenance,
}

impl RateSchedule {
    pub(crate) fn empty(provenance: Provenance, seasons: SeasonCalendar) -> Self {
        Self {
            rates: BTreeMap::new(),
            tou_rates: BTreeMap::new(),
            tiered_rates: BTreeMap::new(),
            fixed_charges: BTreeMap::new(),
            tou_periods: BTreeMap::new(),
            seasons,
            holidays: BTreeSet::new(),
            effective_date: None,
            provenance,
        }
    }

    /// Flat energy rate per season ($/kWh).
    pub fn rates(&self) -> &BTreeMap<String, f64> {
        &self.rates
    }

    pub fn rate(&self, season: &str) -> Option<f64> {
        self.rates.get(season).copied()
    }

    /// TOU energy rates, season → period → $/kWh.
    pub fn tou_rates(&self) -> &BTreeMap<String, BTreeMap<TouPeriod, f64>> {
        &self.tou_rates
    }

    pub fn tou_rate(&self, season: &str, period: TouPeriod) -> Option<f64> {
        self.tou_rates.get(season).and_then(|p| p.get(&period)).copied()
    }

    /// Block-tiered energy rates, season → tier number (1 = first block) →
    /// $/kWh.
    pub fn tiered_rates(&self) -> &BTreeMap<String, BTreeMap<u32, f64>> {
        &self.tiered_rates
    }

    pub fn tier_rate(&self, season: &str, tier: u32) -> Option<f64> {
        self.tiered_rates.get(season).and_then(|t| t.get(&tier)).copied()
    }

    pub fn fixed_charges(&self) -> &BTreeMap<String, FixedCharge> {
        &self.fixed_charges
    }

    pub fn fixed_charge(&self, name: &str) -> Option<FixedCharge> {
        self.fixed_charges.get(name).copied()
    }

    /// Clock-time windows for the TOU periods that have one. Off-peak is the
    /// complement and normally has no explicit window.
    pub fn tou_periods(&self) -> &BTreeMap<TouPeriod, ClockRange> {
        &self.tou_periods
    }

    pub fn seasons(&self) -> &SeasonCalendar {
        &self.seasons
    }

    pub fn holidays(&self) -> &BTreeSet<String> {
        &self.holidays
    }

    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.effective_date
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// `true` when the schedule carries no rate at all.
    pub fn has_no_rates(&self) -> bool {
        self.rates.is_empty() && self.tou_rates.is_empty() && self.tiered_rates.is_empty()
    }
}
