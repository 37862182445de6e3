//! Schedule normalizer: [`Resolution`] → [`ParseOutput`].
//!
//! Field ids are routed into the schedule by their prefix:
//!
//! | id                          | value shape         | lands in                   |
//! |-----------------------------|---------------------|----------------------------|
//! | `rates.<season>`            | currency / number   | flat rate, $/kWh           |
//! | `rates.<season>.tier_<n>`   | currency / number   | block-tier rate, $/kWh     |
//! | `tou_rates.<season>.<tou>`  | currency / number   | TOU rate, $/kWh            |
//! | `fixed_charges.<name>`      | currency / number   | fixed charge               |
//! | `tou_periods.<tou>`         | clock range         | billing-period window      |
//! | `seasons.<season>`          | months              | season calendar override   |
//! | `holidays`                  | text                | holiday set                |
//! | `effective_date`            | date                | effective date             |
//!
//! Cent amounts are converted by shifting the decimal point in the matched
//! digit string, so `7.425¢` and `$0.07425` produce bit-identical `f64`s.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::NormalizeConfig;
use crate::error::{FieldIssue, ScheduleWarning};
use crate::output::{Diagnostics, ParseOutput};
use crate::pipeline::resolve::{Resolution, ResolvedField};
use crate::pipeline::values::{CurrencyUnit, FieldValue};
use crate::schedule::{ChargeBasis, FixedCharge, Provenance, RateSchedule, TouPeriod};

/// Assemble a canonical schedule from resolved fields.
pub fn normalize(
    resolution: &Resolution,
    provenance: Provenance,
    config: &NormalizeConfig,
) -> ParseOutput {
    let mut schedule = RateSchedule::empty(provenance, config.season_calendar.clone());
    let mut diagnostics = Diagnostics {
        unresolved: resolution.unresolved.clone(),
        ambiguous: resolution.ambiguous.clone(),
        ..Diagnostics::default()
    };
    let mut season_overrides: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

    for field in resolution.fields.values() {
        match apply_field(&mut schedule, &mut season_overrides, field) {
            Ok(true) => {
                diagnostics.matched.insert(field.field.clone(), field.trace());
            }
            Ok(false) => {
                debug!(field = %field.field, "field has no place in the rate schedule; ignored");
            }
            Err(reason) => {
                warn!(field = %field.field, raw = %field.raw, %reason, "value rejected");
                diagnostics.unresolved.push(FieldIssue::NegativeOrMalformedValue {
                    field: field.field.clone(),
                    raw: field.raw.clone(),
                    line: field.line,
                    reason,
                });
            }
        }
    }
    // A tiered season has no single flat rate to miss.
    diagnostics.unresolved.retain(|issue| {
        let tiered = matches!(issue, FieldIssue::FieldUnresolved { .. })
            && issue
                .field()
                .strip_prefix("rates.")
                .is_some_and(|season| schedule.tiered_rates.contains_key(season));
        !tiered
    });
    diagnostics
        .unresolved
        .sort_by(|a, b| a.field().cmp(b.field()));

    for (season, months) in &season_overrides {
        schedule.seasons.claim(season, months);
    }

    diagnostics.warnings.extend(tou_completeness(&schedule));
    let gap = schedule.seasons.uncovered_months();
    if !gap.is_empty() {
        diagnostics
            .warnings
            .push(ScheduleWarning::SeasonCalendarGap { months: gap });
    }
    for w in &diagnostics.warnings {
        warn!(warning = %w, "schedule warning");
    }

    info!(
        rates = schedule.rates.len(),
        tiered_seasons = schedule.tiered_rates.len(),
        tou_seasons = schedule.tou_rates.len(),
        fixed_charges = schedule.fixed_charges.len(),
        unresolved = diagnostics.unresolved.len(),
        warnings = diagnostics.warnings.len(),
        "schedule normalized"
    );
    ParseOutput {
        schedule,
        diagnostics,
    }
}

/// Route one field into the schedule. `Ok(false)` means the id is not part of
/// the schedule model.
fn apply_field(
    schedule: &mut RateSchedule,
    season_overrides: &mut BTreeMap<String, BTreeSet<u32>>,
    field: &ResolvedField,
) -> Result<bool, String> {
    let parts: Vec<&str> = field.field.split('.').collect();
    match parts.as_slice() {
        ["rates", season] => {
            let rate = dollars(&field.value)?;
            schedule.rates.insert(season.to_string(), rate);
        }
        ["rates", season, tier] => {
            let tier = tier
                .strip_prefix("tier_")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n >= 1)
                .ok_or_else(|| format!("unknown rate tier '{tier}'"))?;
            let rate = dollars(&field.value)?;
            schedule
                .tiered_rates
                .entry(season.to_string())
                .or_default()
                .insert(tier, rate);
        }
        ["tou_rates", season, period] => {
            let period = TouPeriod::from_id(period)
                .ok_or_else(|| format!("unknown time-of-use period '{period}'"))?;
            let rate = dollars(&field.value)?;
            schedule
                .tou_rates
                .entry(season.to_string())
                .or_default()
                .insert(period, rate);
        }
        ["fixed_charges", name] => {
            let amount = dollars(&field.value)?;
            let basis = if name.contains("demand") {
                ChargeBasis::PerKw
            } else {
                ChargeBasis::PerMonth
            };
            schedule
                .fixed_charges
                .insert(name.to_string(), FixedCharge { amount, basis });
        }
        ["tou_periods", period] => {
            let period = TouPeriod::from_id(period)
                .ok_or_else(|| format!("unknown time-of-use period '{period}'"))?;
            let FieldValue::ClockRange(range) = &field.value else {
                return Err(shape_mismatch("a clock-time range", &field.value));
            };
            schedule.tou_periods.insert(period, *range);
        }
        ["seasons", season] => {
            let FieldValue::Months(months) = &field.value else {
                return Err(shape_mismatch("a month set", &field.value));
            };
            if months.is_empty() {
                return Err("season has no months".into());
            }
            season_overrides.insert(season.to_string(), months.clone());
        }
        ["holidays"] => {
            let FieldValue::Text(text) = &field.value else {
                return Err(shape_mismatch("text", &field.value));
            };
            schedule.holidays = split_holidays(text);
            if schedule.holidays.is_empty() {
                return Err("holiday list is empty".into());
            }
        }
        ["effective_date"] => {
            let FieldValue::Date(date) = &field.value else {
                return Err(shape_mismatch("a date", &field.value));
            };
            schedule.effective_date = Some(*date);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn shape_mismatch(expected: &str, got: &FieldValue) -> String {
    let kind = match got {
        FieldValue::Currency { .. } => "currency",
        FieldValue::Number(_) => "number",
        FieldValue::ClockRange(_) => "clock range",
        FieldValue::Date(_) => "date",
        FieldValue::Months(_) => "months",
        FieldValue::Text(_) => "text",
    };
    format!("expected {expected}, found {kind}")
}

/// Dollar amount of a currency or plain-number value.
fn dollars(value: &FieldValue) -> Result<f64, String> {
    let v = match value {
        FieldValue::Currency { amount, unit } => {
            let text = match unit {
                CurrencyUnit::Dollars => amount.clone(),
                CurrencyUnit::Cents => shift_decimal_left(amount, 2)
                    .ok_or_else(|| format!("malformed amount '{amount}'"))?,
            };
            text.parse::<f64>()
                .map_err(|e| format!("malformed amount '{text}': {e}"))?
        }
        FieldValue::Number(n) => *n,
        other => return Err(shape_mismatch("an amount", other)),
    };
    if !v.is_finite() {
        return Err("amount is not finite".into());
    }
    if v < 0.0 {
        return Err("negative currency amount".into());
    }
    Ok(v)
}

/// Divide a non-negative decimal string by `10^places` without floating-point
/// arithmetic: `"7.425"`, 2 → `"0.07425"`.
pub(crate) fn shift_decimal_left(amount: &str, places: usize) -> Option<String> {
    let (int, frac) = amount.split_once('.').unwrap_or((amount, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{int}{frac}");
    Some(if int.len() > places {
        let point = int.len() - places;
        format!("{}.{}", &digits[..point], &digits[point..])
    } else {
        format!("0.{}{}", "0".repeat(places - int.len()), digits)
    })
}

/// Split a holiday list on commas, semicolons and "and".
fn split_holidays(text: &str) -> BTreeSet<String> {
    text.split([',', ';'])
        .flat_map(|part| part.split(" and "))
        .map(|h| h.trim().trim_end_matches('.').trim())
        .map(|h| h.strip_prefix("and ").unwrap_or(h).trim())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every season present in the TOU map, and every calendar season once the map
/// is non-empty, must carry the same TOU periods.
fn tou_completeness(schedule: &RateSchedule) -> Vec<ScheduleWarning> {
    if schedule.tou_rates.is_empty() {
        return Vec::new();
    }
    let all_periods: BTreeSet<TouPeriod> = schedule
        .tou_rates
        .values()
        .flat_map(|p| p.keys().copied())
        .collect();
    let seasons: BTreeSet<&str> = schedule
        .tou_rates
        .keys()
        .map(String::as_str)
        .chain(schedule.seasons.seasons().keys().map(String::as_str))
        .collect();

    seasons
        .into_iter()
        .filter_map(|season| {
            let have = schedule.tou_rates.get(season);
            let missing: Vec<String> = all_periods
                .iter()
                .filter(|p| have.is_none_or(|h| !h.contains_key(p)))
                .map(|p| p.as_str().to_string())
                .collect();
            (!missing.is_empty()).then(|| ScheduleWarning::ScheduleIncomplete {
                season: season.to_string(),
                missing,
            })
        })
        .collect()
}
