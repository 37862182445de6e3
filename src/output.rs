//! Parse results: the schedule plus everything that went wrong on the way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FieldIssue, ScheduleWarning};
use crate::schedule::RateSchedule;

/// Where a resolved field's value was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTrace {
    /// 0-indexed position in the extracted line sequence.
    pub line: usize,
    pub page: usize,
    /// The matched text the value was parsed from.
    pub raw: String,
}

/// A field that matched in more than one place with different values.
/// The chosen value is the one in the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousField {
    pub field: String,
    pub chosen: MatchTrace,
    /// Earlier candidates that lost to `chosen`, in line order.
    pub superseded: Vec<MatchTrace>,
}

/// Non-fatal findings from one parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Field id → where its value came from.
    pub matched: BTreeMap<String, MatchTrace>,
    /// Fields with no usable value, in field-id order.
    pub unresolved: Vec<FieldIssue>,
    pub ambiguous: Vec<AmbiguousField>,
    pub warnings: Vec<ScheduleWarning>,
}

impl Diagnostics {
    pub fn is_unresolved(&self, field: &str) -> bool {
        self.unresolved.iter().any(|i| i.field() == field)
    }

    pub fn is_ambiguous(&self, field: &str) -> bool {
        self.ambiguous.iter().any(|a| a.field == field)
    }

    /// No unresolved fields and no warnings.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.warnings.is_empty()
    }
}

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub schedule: RateSchedule,
    pub diagnostics: Diagnostics,
}

impl ParseOutput {
    /// Pretty JSON. Deterministic for identical input.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
