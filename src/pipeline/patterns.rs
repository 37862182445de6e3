//! The pattern library: a versioned, declarative rule table per field.
//!
//! Every extractable field is described by a [`FieldRule`]: what kind of
//! value it holds, which line labels carry it, which context lines (anchors)
//! open a search window, and what closes or filters that window. Rules are
//! plain data (serde-deserializable), compiled once into a [`PatternLibrary`]
//! that is shared read-only across threads.
//!
//! Tariff layouts change from one filing to the next; adding a layout means
//! adding a matcher row here, not touching the resolver loop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::TariffError;

/// Version tag of the built-in rule table. Recorded in every schedule's
/// provenance.
pub const STANDARD_LIBRARY_VERSION: &str = "co-residential-2025.2";

/// Default anchored window, in lines, counting the anchor line.
pub const DEFAULT_WINDOW: usize = 6;

/// Kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// Dollars or cents (`$0.07425`, `7.425¢`, `13.13`).
    Currency,
    /// Plain number.
    Number,
    /// Two clock times (`3:00 p.m. to 7:00 p.m.`).
    ClockRange,
    /// Calendar date (`April 1, 2025`, `04/01/2025`, `2025-04-01`).
    Date,
    /// Month range or list (`June 1 through September 30`).
    Months,
    /// Free text after the label.
    Text,
}

/// Which value to take when a matched line holds several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    /// Left-most value after the label.
    #[default]
    First,
    /// Right-most value on the line (trailing "Charge Amount" columns).
    Last,
}

// ── Rule specs (data) ────────────────────────────────────────────────────

/// A line matcher as written in a rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherRule {
    pub pattern: String,
    #[serde(default)]
    pub pick: Pick,
}

/// One field's extraction rule as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub id: String,
    pub shape: ValueShape,
    pub matchers: Vec<MatcherRule>,
    #[serde(default)]
    pub anchors: Vec<String>,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default = "default_window")]
    pub window: usize,
    /// A missing optional field is not reported unresolved.
    #[serde(default)]
    pub optional: bool,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

impl FieldRule {
    pub fn new(id: &str, shape: ValueShape) -> Self {
        Self {
            id: id.to_string(),
            shape,
            matchers: Vec::new(),
            anchors: Vec::new(),
            stop: None,
            exclude: None,
            qualifier: None,
            window: DEFAULT_WINDOW,
            optional: false,
        }
    }

    pub fn matcher(mut self, pattern: &str) -> Self {
        self.matchers.push(MatcherRule {
            pattern: pattern.to_string(),
            pick: Pick::First,
        });
        self
    }

    pub fn matcher_last(mut self, pattern: &str) -> Self {
        self.matchers.push(MatcherRule {
            pattern: pattern.to_string(),
            pick: Pick::Last,
        });
        self
    }

    pub fn anchor(mut self, pattern: &str) -> Self {
        self.anchors.push(pattern.to_string());
        self
    }

    pub fn stop(mut self, pattern: &str) -> Self {
        self.stop = Some(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude = Some(pattern.to_string());
        self
    }

    pub fn qualifier(mut self, pattern: &str) -> Self {
        self.qualifier = Some(pattern.to_string());
        self
    }

    pub fn window(mut self, lines: usize) -> Self {
        self.window = lines;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A serialized rule set: `{ "version": "...", "rules": [ ... ] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub rules: Vec<FieldRule>,
}

// ── Compiled patterns ────────────────────────────────────────────────────

/// A compiled line matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub line: Regex,
    pub pick: Pick,
}

/// A compiled field rule.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub id: String,
    pub shape: ValueShape,
    pub matchers: Vec<Matcher>,
    pub anchors: Vec<Regex>,
    pub stop: Option<Regex>,
    pub exclude: Option<Regex>,
    pub qualifier: Option<Regex>,
    pub window: usize,
    pub optional: bool,
}

impl FieldPattern {
    pub fn is_anchored(&self) -> bool {
        !self.anchors.is_empty()
    }

    fn compile(rule: &FieldRule) -> Result<Self, TariffError> {
        let re = |p: &str| {
            Regex::new(p).map_err(|e| {
                TariffError::InvalidConfig(format!("field '{}': bad pattern '{p}': {e}", rule.id))
            })
        };
        if rule.id.trim().is_empty() {
            return Err(TariffError::InvalidConfig("rule with empty field id".into()));
        }
        if rule.matchers.is_empty() {
            return Err(TariffError::InvalidConfig(format!(
                "field '{}' has no matchers",
                rule.id
            )));
        }
        if !rule.anchors.is_empty() && rule.window == 0 {
            return Err(TariffError::InvalidConfig(format!(
                "field '{}': anchored window must be ≥ 1 line",
                rule.id
            )));
        }
        Ok(Self {
            id: rule.id.clone(),
            shape: rule.shape,
            matchers: rule
                .matchers
                .iter()
                .map(|m| {
                    Ok(Matcher {
                        line: re(&m.pattern)?,
                        pick: m.pick,
                    })
                })
                .collect::<Result<_, TariffError>>()?,
            anchors: rule
                .anchors
                .iter()
                .map(|a| re(a))
                .collect::<Result<_, _>>()?,
            stop: rule.stop.as_deref().map(re).transpose()?,
            exclude: rule.exclude.as_deref().map(re).transpose()?,
            qualifier: rule.qualifier.as_deref().map(re).transpose()?,
            window: rule.window,
            optional: rule.optional,
        })
    }
}

/// An immutable, versioned set of field patterns keyed by field id.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    version: String,
    patterns: BTreeMap<String, FieldPattern>,
}

static STANDARD: Lazy<Arc<PatternLibrary>> = Lazy::new(|| {
    let rules = standard_rules();
    let patterns = rules
        .iter()
        .filter_map(|r| match FieldPattern::compile(r) {
            Ok(p) => Some((p.id.clone(), p)),
            Err(e) => {
                tracing::error!(field = %r.id, error = %e, "built-in rule failed to compile");
                None
            }
        })
        .collect();
    Arc::new(PatternLibrary {
        version: STANDARD_LIBRARY_VERSION.to_string(),
        patterns,
    })
});

impl PatternLibrary {
    /// The built-in library, compiled on first use and shared thereafter.
    pub fn standard() -> Arc<PatternLibrary> {
        Arc::clone(&STANDARD)
    }

    /// Compile a library from rule data. Duplicate ids are rejected.
    pub fn from_rules(
        version: impl Into<String>,
        rules: &[FieldRule],
    ) -> Result<PatternLibrary, TariffError> {
        let mut patterns = BTreeMap::new();
        for rule in rules {
            let pattern = FieldPattern::compile(rule)?;
            if patterns.insert(pattern.id.clone(), pattern).is_some() {
                return Err(TariffError::InvalidConfig(format!(
                    "duplicate rule for field '{}'",
                    rule.id
                )));
            }
        }
        Ok(PatternLibrary {
            version: version.into(),
            patterns,
        })
    }

    /// Compile a library from a JSON [`RuleSet`].
    pub fn from_json(json: &str) -> Result<PatternLibrary, TariffError> {
        let set: RuleSet = serde_json::from_str(json)
            .map_err(|e| TariffError::InvalidConfig(format!("rule set: {e}")))?;
        Self::from_rules(set.version, &set.rules)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, field: &str) -> Option<&FieldPattern> {
        self.patterns.get(field)
    }

    /// Patterns in field-id order.
    pub fn patterns(&self) -> impl Iterator<Item = &FieldPattern> {
        self.patterns.values()
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Display for PatternLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} fields)", self.version, self.patterns.len())
    }
}

// ── Built-in rule table ──────────────────────────────────────────────────

const NOT_TOU: &str = r"(?i)\b(?:on|off)[- ]?peak\b|\bpeak\b|\bshoulder\b|\bmid[- ]?peak\b";
const SUMMER: &str = r"(?i)\bsummer\b";
const WINTER: &str = r"(?i)\bwinter\b";
const UNTIL_WINTER: &str = r"(?i)\bwinter\b|billing\s+periods";
const UNTIL_SUMMER: &str = r"(?i)\bsummer\b|billing\s+periods";
const STANDARD_EXCLUDE: &str =
    r"(?i)\b(?:on|off)[- ]?peak\b|\bpeak\b|\bshoulder\b|\bsummer\b|\bwinter\b";

fn flat_rate(season: &str, anchor: &str, stop: &str) -> FieldRule {
    FieldRule::new(&format!("rates.{season}"), ValueShape::Currency)
        .anchor(anchor)
        .stop(stop)
        .exclude(NOT_TOU)
        .matcher(r"(?i)\ball\s+(?:kwh|kilowatt[- ]hours?)\b")
        .matcher_last(&format!(r"(?i)\b{season}\s+energy\s+(?:charge\s+)?per\s+kwh\b"))
        .matcher(r"(?i)\benergy\s+charge\b")
        .window(4)
}

/// Block tiers of a season's energy rate: "First 500 kWh" is tier 1,
/// "All additional kWh" tier 2.
fn tier_rates(season: &str, anchor: &str, stop: &str) -> [FieldRule; 2] {
    let tier = |n: u32, label: &str| {
        FieldRule::new(&format!("rates.{season}.tier_{n}"), ValueShape::Currency)
            .anchor(anchor)
            .stop(stop)
            .exclude(NOT_TOU)
            .matcher_last(label)
            .window(4)
            .optional()
    };
    [
        tier(1, r"(?i)first\s+[\d,]+\s*(?:kwh|kilowatt[- ]hours?)"),
        tier(
            2,
            r"(?i)all\s+additional|over\s+[\d,]+\s*(?:kwh|kilowatt[- ]hours?)",
        ),
    ]
}

fn tou_rate(season: &str, period: &str, label: &str, anchor: &str, stop: &str) -> FieldRule {
    FieldRule::new(&format!("tou_rates.{season}.{period}"), ValueShape::Currency)
        .anchor(anchor)
        .stop(stop)
        .matcher_last(&format!(r"(?i)\b{season}\s+(?:{label})\s+energy\b"))
        .matcher(&format!(r"(?i)(?:^|[^\w-])(?:{label})\b"))
        .window(8)
}

/// The built-in rule table for residential electric rate summaries and
/// tariff sheets.
pub fn standard_rules() -> Vec<FieldRule> {
    const PEAK: &str = r"on[- ]?peak|peak";
    const SHOULDER: &str = r"shoulder|mid[- ]?peak";
    const OFF_PEAK: &str = r"off[- ]?peak";

    let [summer_tier_1, summer_tier_2] = tier_rates("summer", SUMMER, UNTIL_WINTER);
    let [winter_tier_1, winter_tier_2] = tier_rates("winter", WINTER, UNTIL_SUMMER);

    vec![
        // Flat seasonal energy rates.
        flat_rate("summer", SUMMER, UNTIL_WINTER),
        flat_rate("winter", WINTER, UNTIL_SUMMER),
        // Season-less fallback rate.
        FieldRule::new("rates.standard", ValueShape::Currency)
            .exclude(STANDARD_EXCLUDE)
            .matcher_last(r"(?i)standard.*per\s+(?:kwh|kilowatt[- ]hours?)")
            .optional(),
        // Block-tiered energy rates.
        summer_tier_1,
        summer_tier_2,
        winter_tier_1,
        winter_tier_2,
        // Time-of-use energy rates.
        tou_rate("summer", "peak", PEAK, SUMMER, UNTIL_WINTER),
        tou_rate("summer", "shoulder", SHOULDER, SUMMER, UNTIL_WINTER),
        tou_rate("summer", "off_peak", OFF_PEAK, SUMMER, UNTIL_WINTER),
        tou_rate("winter", "peak", PEAK, WINTER, UNTIL_SUMMER),
        tou_rate("winter", "shoulder", SHOULDER, WINTER, UNTIL_SUMMER),
        tou_rate("winter", "off_peak", OFF_PEAK, WINTER, UNTIL_SUMMER),
        // Fixed charges.
        FieldRule::new("fixed_charges.monthly_service", ValueShape::Currency)
            .matcher_last(r"(?i)\bservice\s+and\s+facility\b")
            .matcher_last(r"(?i)\b(?:basic\s+service|customer)\s+charge\b"),
        FieldRule::new("fixed_charges.demand", ValueShape::Currency)
            .matcher(r"(?i)\bdemand\s+charge\b")
            .matcher(r"(?i)\bper\s+kw\b"),
        // Billing-period clock times.
        FieldRule::new("tou_periods.peak", ValueShape::ClockRange)
            .exclude(r"(?i)\boff[- ]?peak\b")
            .matcher(r"(?i)\bon[- ]?peak\b")
            .matcher(r"(?i)^\s*peak\b"),
        FieldRule::new("tou_periods.shoulder", ValueShape::ClockRange)
            .matcher(r"(?i)\bshoulder\b|\bmid[- ]?peak\b"),
        // Season definitions.
        FieldRule::new("seasons.summer", ValueShape::Months).matcher(SUMMER),
        FieldRule::new("seasons.winter", ValueShape::Months).matcher(WINTER),
        // Holidays.
        FieldRule::new("holidays", ValueShape::Text)
            .matcher(r"(?i)^\s*(?:observed\s+)?holidays?\s*(?:are|include)?\s*:"),
        // Effective date.
        FieldRule::new("effective_date", ValueShape::Date)
            .matcher(r"(?i)\beffective\b")
            .matcher(r"(?i)\bin\s+effect\b"),
    ]
}
