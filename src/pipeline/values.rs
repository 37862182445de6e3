//! Value scanners: find typed values inside one line of extracted text.
//!
//! Each [`ValueShape`] has a scanner that returns every candidate token in a
//! region, left to right, with its byte span and either a parsed
//! [`FieldValue`] or the reason it was rejected. Picking *which* token is the
//! field's value is the resolver's job.
//!
//! Numbers are locale-fixed: `.` is the decimal point, `,` an optional
//! thousands separator.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::month_range;
use crate::pipeline::patterns::ValueShape;
use crate::schedule::ClockRange;

/// Unit a currency amount was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyUnit {
    Dollars,
    Cents,
}

/// A typed value read from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Non-negative amount as a plain decimal string (`"0.07425"`, `"1234.5"`),
    /// kept textual so unit conversion stays exact.
    Currency { amount: String, unit: CurrencyUnit },
    Number(f64),
    ClockRange(ClockRange),
    Date(NaiveDate),
    Months(BTreeSet<u32>),
    Text(String),
}

/// One candidate value inside a line. Spans are byte offsets into the line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub start: usize,
    pub end: usize,
    pub raw: String,
    pub value: Result<FieldValue, String>,
}

/// Scan `line[from..]` for values of the given shape.
pub(crate) fn scan(shape: ValueShape, line: &str, from: usize) -> Vec<Token> {
    let region = &line[from..];
    let mut tokens = match shape {
        ValueShape::Currency => scan_currency(line, from),
        ValueShape::Number => scan_number(line, from),
        ValueShape::ClockRange => scan_clock_ranges(region),
        ValueShape::Date => scan_dates(region),
        ValueShape::Months => scan_months(region).into_iter().collect(),
        ValueShape::Text => scan_text(region).into_iter().collect(),
    };
    for t in &mut tokens {
        t.start += from;
        t.end += from;
    }
    tokens
}

// ── Currency / number ────────────────────────────────────────────────────

static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r"(?P<open>\(\s*)?(?P<sign1>[-−])?(?P<dollar>\$\s*)?(?P<sign2>[-−])?",
            r"(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)",
            r"(?P<cent>\s*(?:¢|(?i:cents?\b)))?(?P<close>\s*\))?",
        ),
    )
    .unwrap()
});

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<sign>[-−])?(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").unwrap()
});

/// `true` when the character before byte `at` in `line` is a letter or digit,
/// i.e. a `-` there is a hyphen, not a minus sign.
fn glued_to_word(line: &str, at: usize) -> bool {
    line[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric())
}

fn followed_by_percent(region: &str, end: usize) -> bool {
    region[end..].trim_start().starts_with('%')
}

fn scan_currency(line: &str, from: usize) -> Vec<Token> {
    let region = &line[from..];
    let mut out = Vec::new();
    for caps in RE_CURRENCY.captures_iter(region) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(num) = caps.name("num") else { continue };
        let has_dollar = caps.name("dollar").is_some();
        let has_cent = caps.name("cent").is_some();
        if !has_dollar && !has_cent && !num.as_str().contains('.') {
            continue;
        }
        if followed_by_percent(region, whole.end()) {
            continue;
        }
        let negative = currency_is_negative(line, from, &caps);
        let amount = num.as_str().replace(',', "");
        let unit = if has_cent {
            CurrencyUnit::Cents
        } else {
            CurrencyUnit::Dollars
        };
        let value = if negative {
            Err("negative currency amount".to_string())
        } else {
            Ok(FieldValue::Currency { amount, unit })
        };
        out.push(Token {
            start: whole.start(),
            end: whole.end(),
            raw: whole.as_str().trim().to_string(),
            value,
        });
    }
    out
}

fn currency_is_negative(line: &str, from: usize, caps: &Captures<'_>) -> bool {
    if caps.name("open").is_some() && caps.name("close").is_some() {
        return true;
    }
    if caps.name("sign2").is_some() {
        return true;
    }
    match caps.name("sign1") {
        Some(sign) => !glued_to_word(line, from + sign.start()),
        None => false,
    }
}

fn scan_number(line: &str, from: usize) -> Vec<Token> {
    let region = &line[from..];
    let mut out = Vec::new();
    for caps in RE_NUMBER.captures_iter(region) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.name("num")) else {
            continue;
        };
        let negative = caps
            .name("sign")
            .is_some_and(|s| !glued_to_word(line, from + s.start()));
        let value = num
            .as_str()
            .replace(',', "")
            .parse::<f64>()
            .map(|v| FieldValue::Number(if negative { -v } else { v }))
            .map_err(|e| format!("not a number: {e}"));
        out.push(Token {
            start: if negative { whole.start() } else { num.start() },
            end: whole.end(),
            raw: if negative {
                whole.as_str().to_string()
            } else {
                num.as_str().to_string()
            },
            value,
        });
    }
    out
}

// ── Clock times ──────────────────────────────────────────────────────────

static RE_CLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r"(?i)\b(?:(?P<word>noon|midnight)",
            r"|(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<ap>[ap]\.?\s?m\b\.?)?)",
        ),
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy)]
struct ClockToken {
    start: usize,
    end: usize,
    hour: u32,
    minute: u32,
    /// `Some(true)` for p.m., `Some(false)` for a.m., `None` for 24-hour or
    /// unspecified.
    pm: Option<bool>,
}

fn clock_tokens(region: &str) -> Vec<ClockToken> {
    let mut out = Vec::new();
    for caps in RE_CLOCK.captures_iter(region) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(word) = caps.name("word") {
            // Noon is 12 p.m. and midnight 12 a.m., so neither borrows the
            // other end's meridiem.
            let noon = word.as_str().eq_ignore_ascii_case("noon");
            out.push(ClockToken {
                start: whole.start(),
                end: whole.end(),
                hour: 12,
                minute: 0,
                pm: Some(noon),
            });
            continue;
        }
        let minute = caps.name("m");
        let ap = caps.name("ap");
        // A bare integer is not a time.
        if minute.is_none() && ap.is_none() {
            continue;
        }
        let hour = caps
            .name("h")
            .and_then(|h| h.as_str().parse::<u32>().ok())
            .unwrap_or(99);
        let minute = minute
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        let pm = ap.map(|a| a.as_str().to_ascii_lowercase().starts_with('p'));
        out.push(ClockToken {
            start: whole.start(),
            end: whole.end(),
            hour,
            minute,
            pm,
        });
    }
    out
}

fn to_time(hour: u32, minute: u32, pm: Option<bool>) -> Option<NaiveTime> {
    let h24 = match pm {
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(true) => hour % 12 + 12,
        Some(false) => hour % 12,
        None => hour,
    };
    NaiveTime::from_hms_opt(h24, minute, 0)
}

fn clock_range(a: ClockToken, b: ClockToken) -> Result<ClockRange, String> {
    // "2:00 - 6:00 p.m." shares the meridiem; fall back to a.m. when
    // sharing would put the start after the end ("11:00 - 2:00 p.m.").
    let start_pm = match (a.pm, b.pm) {
        (None, Some(p)) if a.hour <= 12 => {
            let shared = to_time(a.hour, a.minute, Some(p));
            let end = to_time(b.hour, b.minute, b.pm);
            match (shared, end) {
                (Some(s), Some(e)) if p && s > e => Some(false),
                _ => Some(p),
            }
        }
        (pm, _) => pm,
    };
    let start = to_time(a.hour, a.minute, start_pm)
        .ok_or_else(|| format!("invalid clock time {}:{:02}", a.hour, a.minute))?;
    let end = to_time(b.hour, b.minute, b.pm)
        .ok_or_else(|| format!("invalid clock time {}:{:02}", b.hour, b.minute))?;
    Ok(ClockRange::new(start, end))
}

fn scan_clock_ranges(region: &str) -> Vec<Token> {
    let times = clock_tokens(region);
    times
        .chunks_exact(2)
        .map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            Token {
                start: a.start,
                end: b.end,
                raw: region[a.start..b.end].trim().to_string(),
                value: clock_range(a, b).map(FieldValue::ClockRange),
            }
        })
        .collect()
}

// ── Dates ────────────────────────────────────────────────────────────────

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            // April 1, 2025
            r"(?i)\b(?P<mon>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?",
            r"|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)",
            r"\.?\s+(?P<day>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<year>\d{4})\b",
            // 04/01/2025
            r"|\b(?P<m2>\d{1,2})/(?P<d2>\d{1,2})/(?P<y2>\d{4})\b",
            // 2025-04-01
            r"|\b(?P<y3>\d{4})-(?P<m3>\d{1,2})-(?P<d3>\d{1,2})\b",
        ),
    )
    .unwrap()
});

/// Month number for an English month name or abbreviation.
pub(crate) fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let m = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn num(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn scan_dates(region: &str) -> Vec<Token> {
    let mut out = Vec::new();
    for caps in RE_DATE.captures_iter(region) {
        let Some(whole) = caps.get(0) else { continue };
        let ymd = if let Some(mon) = caps.name("mon") {
            month_from_name(mon.as_str()).map(|m| (num(&caps, "year"), m, num(&caps, "day")))
        } else if caps.name("m2").is_some() {
            num(&caps, "m2").map(|m| (num(&caps, "y2"), m, num(&caps, "d2")))
        } else {
            num(&caps, "m3").map(|m| (num(&caps, "y3"), m, num(&caps, "d3")))
        };
        let value = match ymd {
            Some((Some(y), m, Some(d))) => NaiveDate::from_ymd_opt(y as i32, m, d)
                .map(FieldValue::Date)
                .ok_or_else(|| format!("{y:04}-{m:02}-{d:02} is not a valid calendar date")),
            _ => Err("unparseable date".to_string()),
        };
        out.push(Token {
            start: whole.start(),
            end: whole.end(),
            raw: whole.as_str().to_string(),
            value,
        });
    }
    out
}

// ── Months ───────────────────────────────────────────────────────────────

// "May" only counts capitalised; lower-case "may" is the verb.
static RE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r"\b(?:(?i:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|june?|july?",
            r"|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)",
            r"|May|MAY)\b",
        ),
    )
    .unwrap()
});

static RE_RANGE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:-|–|—|\bthrough\b|\bthru\b|\bto\b)").unwrap());

/// One token covering every month name in the region: a range when exactly
/// two names are joined by a range word, otherwise the set of named months.
fn scan_months(region: &str) -> Option<Token> {
    let names: Vec<_> = RE_MONTH_NAME.find_iter(region).collect();
    let first = names.first()?;
    let last = names.last()?;
    let months: Vec<u32> = names
        .iter()
        .filter_map(|m| month_from_name(m.as_str()))
        .collect();

    let between = &region[first.end()..last.start()];
    let set: BTreeSet<u32> = match months[..] {
        [a, b] if RE_RANGE_WORD.is_match(between) && !between.contains(',') => {
            month_range(a, b).into_iter().collect()
        }
        _ => months.into_iter().collect(),
    };

    let end = trailing_day_end(region, last.end());
    Some(Token {
        start: first.start(),
        end,
        raw: region[first.start()..end].to_string(),
        value: Ok(FieldValue::Months(set)),
    })
}

static RE_TRAILING_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+\d{1,2}\b").unwrap());

fn trailing_day_end(region: &str, at: usize) -> usize {
    RE_TRAILING_DAY
        .find(&region[at..])
        .map(|m| at + m.end())
        .unwrap_or(at)
}

// ── Text ─────────────────────────────────────────────────────────────────

fn scan_text(region: &str) -> Option<Token> {
    let leading = region.len() - region.trim_start_matches([' ', '\t', ':', '-', '–']).len();
    let body = region[leading..].trim_end().trim_end_matches('.');
    if body.is_empty() {
        return None;
    }
    Some(Token {
        start: leading,
        end: leading + body.len(),
        raw: body.to_string(),
        value: Ok(FieldValue::Text(body.to_string())),
    })
}
