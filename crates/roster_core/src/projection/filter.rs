//! Search filter over a roster snapshot.
//!
//! # Invariants
//! - Output is a pure function of `(records, term)`.
//! - Relative order of `records` is preserved; nothing is ranked or capped.
//! - A term that trims to empty passes the collection through unchanged.

use crate::model::student::StudentRecord;

/// Derived, read-only result of filtering a snapshot by a search term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectedView {
    pub records: Vec<StudentRecord>,
    pub count: usize,
}

impl ProjectedView {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|record| record.id).collect()
    }
}

/// Filters `records` by `term`.
///
/// Blank terms match everything. Otherwise a record matches when its name or
/// course contains `term` case-insensitively; the term itself is not trimmed,
/// so leading or trailing spaces in a non-blank term take part in matching.
pub fn project(records: &[StudentRecord], term: &str) -> ProjectedView {
    let records = if term.trim().is_empty() {
        records.to_vec()
    } else {
        let needle = term.to_lowercase();
        records
            .iter()
            .filter(|record| record.matches_lowercase(&needle))
            .cloned()
            .collect::<Vec<_>>()
    };

    ProjectedView {
        count: records.len(),
        records,
    }
}
