//! Evaluate a [`RateSchedule`] at a point in time.
//!
//! Weekends and the schedule's holidays are off-peak all day. Holiday names
//! from the document ("New Year's Day", "Memorial Day", ...) are mapped onto
//! US federal holiday rules; fixed-date holidays also count on their observed
//! weekday (Saturday -> Friday, Sunday -> Monday). A schedule that names no
//! holidays falls back to the full federal list.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use tracing::debug;

use crate::schedule::{RateSchedule, TouPeriod};

/// The season in effect on `date`, per the schedule's season calendar.
pub fn season_for(schedule: &RateSchedule, date: NaiveDate) -> Option<&str> {
    schedule.seasons().season_for(date.month())
}

/// `true` when `date` is one of the schedule's holidays.
pub fn is_holiday(schedule: &RateSchedule, date: NaiveDate) -> bool {
    let rules: Vec<HolidayRule> = if schedule.holidays().is_empty() {
        HolidayRule::ALL.to_vec()
    } else {
        schedule
            .holidays()
            .iter()
            .filter_map(|name| {
                let rule = HolidayRule::from_name(name);
                if rule.is_none() {
                    debug!(holiday = %name, "holiday name not recognised");
                }
                rule
            })
            .collect()
    };
    rules.iter().any(|rule| rule.falls_on(date))
}

/// The TOU period at `at`.
///
/// Outside weekday peak/shoulder windows, and all day on weekends and
/// holidays, the period is off-peak.
pub fn tou_period_at(schedule: &RateSchedule, at: NaiveDateTime) -> TouPeriod {
    let date = at.date();
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || is_holiday(schedule, date) {
        return TouPeriod::OffPeak;
    }
    let time = at.time();
    for period in [TouPeriod::Peak, TouPeriod::Shoulder] {
        if schedule
            .tou_periods()
            .get(&period)
            .is_some_and(|range| range.contains(time))
        {
            return period;
        }
    }
    TouPeriod::OffPeak
}

/// The energy rate (dollars per kWh) applicable at `at`.
///
/// A season with TOU rates is billed by period. Otherwise the flat seasonal
/// rate applies, then the season's first block tier, then the schedule's
/// `standard` rate. `None` when none of these exist.
pub fn rate_at(schedule: &RateSchedule, at: NaiveDateTime) -> Option<f64> {
    let season = season_for(schedule, at.date())?;
    if schedule.tou_rates().contains_key(season) {
        return schedule.tou_rate(season, tou_period_at(schedule, at));
    }
    schedule
        .rate(season)
        .or_else(|| schedule.tier_rate(season, 1))
        .or_else(|| schedule.rate(STANDARD_RATE))
}

/// Rate key of the season-less fallback energy rate.
pub const STANDARD_RATE: &str = "standard";

// ── Federal holiday rules ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HolidayRule {
    /// Fixed month/day, observed on the nearest weekday.
    Fixed { month: u32, day: u32 },
    /// The n-th `weekday` of `month`.
    Nth { month: u32, weekday: Weekday, n: u8 },
    /// The last `weekday` of `month`.
    Last { month: u32, weekday: Weekday },
}

impl HolidayRule {
    const NEW_YEAR: HolidayRule = HolidayRule::Fixed { month: 1, day: 1 };
    const MLK: HolidayRule = HolidayRule::Nth { month: 1, weekday: Weekday::Mon, n: 3 };
    const PRESIDENTS: HolidayRule = HolidayRule::Nth { month: 2, weekday: Weekday::Mon, n: 3 };
    const MEMORIAL: HolidayRule = HolidayRule::Last { month: 5, weekday: Weekday::Mon };
    const JUNETEENTH: HolidayRule = HolidayRule::Fixed { month: 6, day: 19 };
    const INDEPENDENCE: HolidayRule = HolidayRule::Fixed { month: 7, day: 4 };
    const LABOR: HolidayRule = HolidayRule::Nth { month: 9, weekday: Weekday::Mon, n: 1 };
    const COLUMBUS: HolidayRule = HolidayRule::Nth { month: 10, weekday: Weekday::Mon, n: 2 };
    const VETERANS: HolidayRule = HolidayRule::Fixed { month: 11, day: 11 };
    const THANKSGIVING: HolidayRule = HolidayRule::Nth { month: 11, weekday: Weekday::Thu, n: 4 };
    const CHRISTMAS: HolidayRule = HolidayRule::Fixed { month: 12, day: 25 };

    const ALL: [HolidayRule; 11] = [
        Self::NEW_YEAR,
        Self::MLK,
        Self::PRESIDENTS,
        Self::MEMORIAL,
        Self::JUNETEENTH,
        Self::INDEPENDENCE,
        Self::LABOR,
        Self::COLUMBUS,
        Self::VETERANS,
        Self::THANKSGIVING,
        Self::CHRISTMAS,
    ];

    fn from_name(name: &str) -> Option<HolidayRule> {
        let n: String = name
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '\'' | '\u{2019}' | '.'))
            .collect();
        let has = |keys: &[&str]| keys.iter().any(|k| n.contains(k));
        let rule = if has(&["new year"]) {
            Self::NEW_YEAR
        } else if has(&["martin luther", "mlk"]) {
            Self::MLK
        } else if has(&["president", "washington"]) {
            Self::PRESIDENTS
        } else if has(&["memorial"]) {
            Self::MEMORIAL
        } else if has(&["juneteenth"]) {
            Self::JUNETEENTH
        } else if has(&["independence", "fourth of july", "july 4"]) {
            Self::INDEPENDENCE
        } else if has(&["labor"]) {
            Self::LABOR
        } else if has(&["columbus", "indigenous"]) {
            Self::COLUMBUS
        } else if has(&["veteran"]) {
            Self::VETERANS
        } else if has(&["thanksgiving"]) {
            Self::THANKSGIVING
        } else if has(&["christmas"]) {
            Self::CHRISTMAS
        } else {
            return None;
        };
        Some(rule)
    }

    fn falls_on(self, date: NaiveDate) -> bool {
        match self {
            HolidayRule::Fixed { month, day } => {
                // Check this year's date and, for Dec 31, next year's Jan 1 observed.
                [date.year(), date.year() + 1].iter().any(|&y| {
                    NaiveDate::from_ymd_opt(y, month, day)
                        .is_some_and(|actual| actual == date || observed(actual) == date)
                })
            }
            HolidayRule::Nth { month, weekday, n } => {
                date.month() == month
                    && NaiveDate::from_weekday_of_month_opt(date.year(), month, weekday, n)
                        == Some(date)
            }
            HolidayRule::Last { month, weekday } => {
                date.month() == month
                    && date.weekday() == weekday
                    && (date + Duration::days(7)).month() != month
            }
        }
    }
}

fn observed(actual: NaiveDate) -> NaiveDate {
    match actual.weekday() {
        Weekday::Sat => actual - Duration::days(1),
        Weekday::Sun => actual + Duration::days(1),
        _ => actual,
    }
}
