use std::collections::BTreeMap;

use crate::workload::{Outcome, SUCCESS_STATUS, TRANSPORT_FAILURE_CODE};

/// Monotonic tallies keyed by `(status_code, status_label)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    entries: BTreeMap<Outcome, u64>,
}

impl Counters {
    pub(super) fn increment(&mut self, outcome: Outcome) {
        let count = self.entries.entry(outcome).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Count for one exact label pair.
    #[must_use]
    pub fn get(&self, status_code: i32, status_label: &str) -> u64 {
        self.iter()
            .find(|(outcome, _)| {
                outcome.status_code == status_code && outcome.status_label == status_label
            })
            .map_or(0, |(_, count)| count)
    }

    /// Count across every label recorded for `status_code`.
    #[must_use]
    pub fn count_for_code(&self, status_code: i32) -> u64 {
        self.iter()
            .filter(|(outcome, _)| outcome.status_code == status_code)
            .fold(0_u64, |acc, (_, count)| acc.saturating_add(count))
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries
            .values()
            .fold(0_u64, |acc, count| acc.saturating_add(*count))
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.count_for_code(SUCCESS_STATUS)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.total().saturating_sub(self.successes())
    }

    #[must_use]
    pub fn transport_failures(&self) -> u64 {
        self.count_for_code(TRANSPORT_FAILURE_CODE)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Label pairs in `(status_code, status_label)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&Outcome, u64)> {
        self.entries.iter().map(|(outcome, count)| (outcome, *count))
    }
}
