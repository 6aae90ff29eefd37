use serde::Serialize;

use crate::persist::{MatchAssignment, SelectionDocument};
use crate::week::WeekKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackerSlot {
    Assigned {
        selector: String,
        assignment: MatchAssignment,
    },
    Placeholder {
        selector: String,
    },
}

impl TrackerSlot {
    pub fn selector(&self) -> &str {
        match self {
            TrackerSlot::Assigned { selector, .. } | TrackerSlot::Placeholder { selector } => {
                selector
            }
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, TrackerSlot::Assigned { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerReport {
    pub week: WeekKey,
    pub slots: Vec<TrackerSlot>,
    pub selected_count: usize,
    pub placeholder_count: usize,
    pub completion_percent: u8,
    /// Document entries whose selector is not on the roster.
    pub unrostered: Vec<String>,
}

impl TrackerReport {
    pub fn missing(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| !s.is_assigned())
            .map(TrackerSlot::selector)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.placeholder_count == 0
    }
}

pub fn assemble<S: AsRef<str>>(
    week: WeekKey,
    doc: Option<&SelectionDocument>,
    roster: &[S],
) -> TrackerReport {
    let mut slots = Vec::with_capacity(roster.len());
    for name in roster {
        let selector = name.as_ref().to_string();
        match doc.and_then(|d| d.get(&selector)) {
            Some(assignment) => slots.push(TrackerSlot::Assigned {
                selector,
                assignment: assignment.clone(),
            }),
            None => slots.push(TrackerSlot::Placeholder { selector }),
        }
    }

    let selected_count = slots.iter().filter(|s| s.is_assigned()).count();
    let placeholder_count = slots.len() - selected_count;
    let completion_percent = if slots.is_empty() {
        0
    } else {
        (selected_count * 100 / slots.len()) as u8
    };
    let unrostered = doc
        .map(|d| {
            d.selectors()
                .filter(|s| !roster.iter().any(|r| r.as_ref() == *s))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    TrackerReport {
        week,
        slots,
        selected_count,
        placeholder_count,
        completion_percent,
        unrostered,
    }
}
