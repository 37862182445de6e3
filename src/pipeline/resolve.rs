//! Field resolver: one generic loop applying a [`PatternLibrary`] to a
//! [`LineSequence`].
//!
//! ## Anchored fields
//!
//! Every line matching one of the field's anchors opens a window of
//! `window` lines, starting at the anchor line itself. The window closes early
//! at the first *later* line matching the stop pattern. Inside the window, the
//! first line on which a matcher yields a value is that occurrence's
//! candidate. When the document repeats a table (revised rates, a second rate
//! class), each repetition is an occurrence; the **last** one wins and earlier
//! occurrences with a different value are reported as ambiguous.
//!
//! ## Anchor-less fields
//!
//! The whole sequence is scanned top to bottom; the first line yielding a
//! value wins.
//!
//! A value that was found but is out of domain (negative amount, impossible
//! date) still counts as the field's match: the field is reported unresolved
//! with the reason, never clamped and never replaced by a worse match.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::document::LineSequence;
use crate::error::FieldIssue;
use crate::output::{AmbiguousField, MatchTrace};
use crate::pipeline::patterns::{FieldPattern, PatternLibrary, Pick, ValueShape};
use crate::pipeline::values::{scan, FieldValue, Token};

/// A field value read from the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub field: String,
    pub value: FieldValue,
    /// The matched text the value was parsed from.
    pub raw: String,
    /// 0-indexed line in the extracted sequence.
    pub line: usize,
    pub page: usize,
}

impl ResolvedField {
    pub fn trace(&self) -> MatchTrace {
        MatchTrace {
            line: self.line,
            page: self.page,
            raw: self.raw.clone(),
        }
    }
}

/// Output of one resolver pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub fields: BTreeMap<String, ResolvedField>,
    /// Fields of the library with no usable value, in field-id order.
    pub unresolved: Vec<FieldIssue>,
    pub ambiguous: Vec<AmbiguousField>,
    /// Version of the library that produced this resolution.
    pub library_version: String,
}

impl Resolution {
    pub fn get(&self, field: &str) -> Option<&ResolvedField> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    line: usize,
    page: usize,
    token: Token,
}

impl Candidate {
    fn trace(&self) -> MatchTrace {
        MatchTrace {
            line: self.line,
            page: self.page,
            raw: self.token.raw.clone(),
        }
    }
}

/// Apply every pattern in `library` to `lines`. Never fails: fields that
/// cannot be found are listed in [`Resolution::unresolved`].
pub fn resolve(lines: &LineSequence, library: &PatternLibrary) -> Resolution {
    let mut out = Resolution {
        library_version: library.version().to_string(),
        ..Resolution::default()
    };

    for pattern in library.patterns() {
        let (winner, superseded) = if pattern.is_anchored() {
            resolve_anchored(lines, pattern)
        } else {
            (resolve_first(lines, pattern), Vec::new())
        };

        let Some(winner) = winner else {
            debug!(field = %pattern.id, optional = pattern.optional, "no match");
            if pattern.optional {
                continue;
            }
            out.unresolved.push(FieldIssue::FieldUnresolved {
                field: pattern.id.clone(),
            });
            continue;
        };

        if !superseded.is_empty() {
            debug!(
                field = %pattern.id,
                chosen_line = winner.line,
                superseded = superseded.len(),
                "ambiguous field, last occurrence wins"
            );
            out.ambiguous.push(AmbiguousField {
                field: pattern.id.clone(),
                chosen: winner.trace(),
                superseded: superseded.iter().map(Candidate::trace).collect(),
            });
        }

        match winner.token.value {
            Ok(value) => {
                debug!(
                    field = %pattern.id,
                    line = winner.line,
                    raw = %winner.token.raw,
                    "resolved"
                );
                out.fields.insert(
                    pattern.id.clone(),
                    ResolvedField {
                        field: pattern.id.clone(),
                        value,
                        raw: winner.token.raw,
                        line: winner.line,
                        page: winner.page,
                    },
                );
            }
            Err(reason) => {
                warn!(
                    field = %pattern.id,
                    line = winner.line,
                    raw = %winner.token.raw,
                    %reason,
                    "value rejected"
                );
                out.unresolved.push(FieldIssue::NegativeOrMalformedValue {
                    field: pattern.id.clone(),
                    raw: winner.token.raw,
                    line: winner.line,
                    reason,
                });
            }
        }
    }

    debug!(
        resolved = out.fields.len(),
        unresolved = out.unresolved.len(),
        ambiguous = out.ambiguous.len(),
        library = %out.library_version,
        "resolution complete"
    );
    out
}

fn resolve_first(lines: &LineSequence, pattern: &FieldPattern) -> Option<Candidate> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        candidate_on_line(pattern, &line.text).map(|token| Candidate {
            line: idx,
            page: line.page,
            token,
        })
    })
}

/// Returns the winning candidate and the earlier, differing ones it beat.
fn resolve_anchored(
    lines: &LineSequence,
    pattern: &FieldPattern,
) -> (Option<Candidate>, Vec<Candidate>) {
    let mut occurrences: Vec<Candidate> = Vec::new();

    for (anchor_idx, anchor_line) in lines.iter().enumerate() {
        if !pattern.anchors.iter().any(|a| a.is_match(&anchor_line.text)) {
            continue;
        }
        let end = (anchor_idx + pattern.window).min(lines.len());
        for idx in anchor_idx..end {
            let Some(line) = lines.get(idx) else { break };
            if idx > anchor_idx && pattern.stop.as_ref().is_some_and(|s| s.is_match(&line.text)) {
                break;
            }
            if let Some(token) = candidate_on_line(pattern, &line.text) {
                // Overlapping windows can land on the same line twice.
                if occurrences.last().map(|c| c.line) != Some(idx) {
                    occurrences.push(Candidate {
                        line: idx,
                        page: line.page,
                        token,
                    });
                }
                break;
            }
        }
    }

    let Some(winner) = occurrences.pop() else {
        return (None, Vec::new());
    };
    let superseded = occurrences
        .into_iter()
        .filter(|c| c.token.value != winner.token.value)
        .collect();
    (Some(winner), superseded)
}

/// The value a single line offers for `pattern`, if any.
fn candidate_on_line(pattern: &FieldPattern, text: &str) -> Option<Token> {
    if pattern.exclude.as_ref().is_some_and(|x| x.is_match(text)) {
        return None;
    }
    for matcher in &pattern.matchers {
        let Some(label) = matcher.line.find(text) else {
            continue;
        };
        let from = match pattern.shape {
            ValueShape::Text => label.end(),
            _ => label.start(),
        };
        let tokens = scan(pattern.shape, text, from);
        if let Some(token) = pick(tokens, pattern, matcher.pick, text) {
            return Some(token);
        }
    }
    None
}

/// Choose among a line's tokens. With a qualifier present on the line, the
/// first value after it wins, else the last value before it. Otherwise the
/// matcher's pick rule decides.
fn pick(mut tokens: Vec<Token>, pattern: &FieldPattern, rule: Pick, text: &str) -> Option<Token> {
    if tokens.is_empty() {
        return None;
    }
    if let Some(q) = pattern.qualifier.as_ref().and_then(|q| q.find(text)) {
        if let Some(pos) = tokens.iter().position(|t| t.start >= q.end()) {
            return Some(tokens.swap_remove(pos));
        }
        if let Some(pos) = tokens.iter().rposition(|t| t.end <= q.start()) {
            return Some(tokens.swap_remove(pos));
        }
    }
    match rule {
        Pick::First => Some(tokens.swap_remove(0)),
        Pick::Last => tokens.pop(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::patterns::FieldRule;
    use crate::pipeline::values::CurrencyUnit;

    fn seq(text: &str) -> LineSequence {
        LineSequence::from_text(text)
    }

    fn dollars(s: &str) -> FieldValue {
        FieldValue::Currency {
            amount: s.into(),
            unit: CurrencyUnit::Dollars,
        }
    }

    fn lib(rules: &[FieldRule]) -> PatternLibrary {
        PatternLibrary::from_rules("test", rules).unwrap()
    }

    fn summer_rule() -> FieldRule {
        FieldRule::new("rates.summer", ValueShape::Currency)
            .anchor(r"(?i)summer")
            .stop(r"(?i)winter")
            .matcher(r"(?i)all\s+kwh")
            .window(3)
    }

    #[test]
    fn anchor_then_value_in_window() {
        let lines = seq(
            "Summer Season\nAll kWh per month ..... $0.07425\nWinter Season\nAll kWh $0.05565",
        );
        let r = resolve(&lines, &lib(&[summer_rule()]));
        let f = r.get("rates.summer").unwrap();
        assert_eq!(f.value, dollars("0.07425"));
        assert_eq!(f.line, 1);
        assert_eq!(f.field, "rates.summer");
        assert!(r.unresolved.is_empty());
    }

    #[test]
    fn missing_anchor_is_unresolved() {
        let lines = seq("All kWh per month ..... $0.07425");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.get("rates.summer").is_none());
        assert_eq!(
            r.unresolved,
            vec![FieldIssue::FieldUnresolved {
                field: "rates.summer".into()
            }]
        );
    }

    #[test]
    fn missing_optional_field_is_not_reported() {
        let tier = FieldRule::new("rates.summer.tier_1", ValueShape::Currency)
            .anchor(r"(?i)summer")
            .matcher(r"(?i)first\s+\d+\s+kwh")
            .optional();
        let r = resolve(&seq("Summer\nAll kWh $0.07"), &lib(&[tier.clone()]));
        assert!(r.get("rates.summer.tier_1").is_none());
        assert!(r.unresolved.is_empty());

        // Found but out of domain still counts.
        let r = resolve(&seq("Summer\nFirst 500 kWh -$0.06"), &lib(&[tier]));
        assert!(matches!(
            r.unresolved[..],
            [FieldIssue::NegativeOrMalformedValue { .. }]
        ));
    }

    #[test]
    fn window_is_bounded() {
        let lines = seq("Summer\nnotes\nmore notes\nAll kWh $0.07");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.get("rates.summer").is_none());
    }

    #[test]
    fn stop_closes_window() {
        let lines = seq("Summer\nWinter\nAll kWh $0.05");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.get("rates.summer").is_none());
    }

    #[test]
    fn last_occurrence_wins_and_earlier_is_ambiguous() {
        let lines = seq(
            "Summer\nAll kWh $0.09000\nWinter\nAll kWh $0.05\nSummer\nAll kWh $0.07425",
        );
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert_eq!(r.get("rates.summer").unwrap().value, dollars("0.07425"));
        assert_eq!(r.ambiguous.len(), 1);
        assert_eq!(r.ambiguous[0].chosen.line, 5);
        assert_eq!(r.ambiguous[0].superseded[0].raw, "$0.09000");
    }

    #[test]
    fn repeated_equal_values_are_not_ambiguous() {
        let lines = seq("Summer\nAll kWh $0.07\nSummer\nAll kWh $0.07");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.ambiguous.is_empty());
    }

    #[test]
    fn overlapping_windows_count_once() {
        let lines = seq("Summer rates\nSummer season\nAll kWh $0.07");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.ambiguous.is_empty());
        assert_eq!(r.get("rates.summer").unwrap().line, 2);
    }

    #[test]
    fn anchorless_first_match_wins() {
        let rule = FieldRule::new("fixed_charges.monthly_service", ValueShape::Currency)
            .matcher(r"(?i)service and facility");
        let lines = seq("Service and Facility $13.13\nService and Facility $15.00");
        let r = resolve(&lines, &lib(&[rule]));
        assert_eq!(
            r.get("fixed_charges.monthly_service").unwrap().value,
            dollars("13.13")
        );
        assert!(r.ambiguous.is_empty());
    }

    #[test]
    fn pick_last_takes_rightmost_column() {
        let rule = FieldRule::new("fixed_charges.monthly_service", ValueShape::Currency)
            .matcher_last(r"(?i)service and facility");
        let lines = seq("Service and Facility per Month   5.47   13.13");
        let r = resolve(&lines, &lib(&[rule]));
        assert_eq!(
            r.get("fixed_charges.monthly_service").unwrap().value,
            dollars("13.13")
        );
    }

    #[test]
    fn qualifier_adjacent_value_wins() {
        let rule = FieldRule::new("fixed_charges.monthly_service", ValueShape::Currency)
            .matcher(r"(?i)service and facility")
            .qualifier(r"(?i)underground");
        let lines = seq("Service and Facility: Overhead $13.13, Underground $15.38");
        let r = resolve(&lines, &lib(&[rule]));
        assert_eq!(
            r.get("fixed_charges.monthly_service").unwrap().value,
            dollars("15.38")
        );
    }

    #[test]
    fn exclusion_skips_line() {
        let rule = FieldRule::new("rates.summer", ValueShape::Currency)
            .matcher(r"(?i)energy charge")
            .exclude(r"(?i)peak");
        let lines = seq("On-Peak Energy Charge $0.13\nEnergy Charge $0.07");
        let r = resolve(&lines, &lib(&[rule]));
        assert_eq!(r.get("rates.summer").unwrap().line, 1);
    }

    #[test]
    fn negative_value_is_rejected_not_clamped() {
        let lines = seq("Summer\nAll kWh per month -$0.07425");
        let r = resolve(&lines, &lib(&[summer_rule()]));
        assert!(r.get("rates.summer").is_none());
        match &r.unresolved[0] {
            FieldIssue::NegativeOrMalformedValue { field, raw, line, .. } => {
                assert_eq!(field, "rates.summer");
                assert_eq!(raw, "-$0.07425");
                assert_eq!(*line, 1);
            }
            other => panic!("unexpected issue {other:?}"),
        }
    }

    #[test]
    fn invalid_date_is_rejected() {
        let rule = FieldRule::new("effective_date", ValueShape::Date).matcher(r"(?i)effective");
        let r = resolve(&seq("Effective: February 30, 2025"), &lib(&[rule]));
        assert!(r.get("effective_date").is_none());
        assert!(matches!(
            r.unresolved[0],
            FieldIssue::NegativeOrMalformedValue { .. }
        ));
    }

    #[test]
    fn matcher_without_value_falls_through_to_next_line() {
        let rule = FieldRule::new("effective_date", ValueShape::Date).matcher(r"(?i)effective");
        let r = resolve(
            &seq("Effective with bills rendered\nEffective: April 1, 2025"),
            &lib(&[rule]),
        );
        assert_eq!(r.get("effective_date").unwrap().line, 1);
    }
}
