//! Predicates for bulk removal

use crate::as_of::AsOfAttribute;
use crate::record::Record;
use crate::timestamp::Timestamp;

/// Predicate over a stored record
///
/// `remove_all` drops every entry for which `matches` returns true.
pub trait Filter {
    /// Whether `record` is selected
    fn matches(&self, record: &Record) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Record) -> bool,
{
    fn matches(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Selects segments that cover none of the retained dates
///
/// Passing this to `remove_all` prunes history down to the segments valid
/// at the retained dates. Surviving neighbours are left as separate
/// segments.
#[derive(Debug, Clone)]
pub struct RetainDatesFilter {
    attribute: AsOfAttribute,
    dates: Vec<Timestamp>,
}

impl RetainDatesFilter {
    /// Keep segments whose `attribute` interval contains one of `dates`
    pub fn new(attribute: AsOfAttribute, dates: Vec<Timestamp>) -> Self {
        Self { attribute, dates }
    }

    /// Dates being retained
    pub fn dates(&self) -> &[Timestamp] {
        &self.dates
    }
}

impl Filter for RetainDatesFilter {
    fn matches(&self, record: &Record) -> bool {
        !self
            .dates
            .iter()
            .any(|date| self.attribute.data_matches(record, *date))
    }
}
