//! Compound-key hashing over an ordered extractor list

use crate::extractor::ExtractorRef;
use crate::record::Record;

/// Fold one more hash into a running compound hash
#[inline]
pub fn combine_hash(seed: u64, next: u64) -> u64 {
    seed.wrapping_mul(31).wrapping_add(next)
}

/// Hash and equality for a compound key
///
/// The hash folds each extractor's hash in order; equality requires every
/// extractor to report equal values.
#[derive(Debug, Clone)]
pub struct ExtractorHashStrategy {
    extractors: Vec<ExtractorRef>,
}

impl ExtractorHashStrategy {
    /// Strategy over `extractors`, in key order
    pub fn new(extractors: Vec<ExtractorRef>) -> Self {
        Self { extractors }
    }

    /// Key extractors
    pub fn extractors(&self) -> &[ExtractorRef] {
        &self.extractors
    }

    /// Compound hash of `record`
    #[inline]
    pub fn hash_of(&self, record: &Record) -> u64 {
        self.extractors
            .iter()
            .fold(0, |h, e| combine_hash(h, e.hash_of(record)))
    }

    /// Literal key equality
    #[inline]
    pub fn equals(&self, stored: &Record, other: &Record) -> bool {
        self.extractors.iter().all(|e| e.values_equal(stored, other))
    }

    /// Probe semantics on every key attribute
    pub fn probe_matches(&self, stored: &Record, probe: &Record) -> bool {
        self.extractors.iter().all(|e| e.probe_matches(stored, probe))
    }

    /// Whether any key attribute of `record` is null
    pub fn has_null(&self, record: &Record) -> bool {
        self.extractors.iter().any(|e| e.is_null(record))
    }

    /// Whether every key attribute appears in `filter`
    pub fn covered_by(&self, filter: &[ExtractorRef]) -> bool {
        self.extractors.iter().all(|e| {
            filter
                .iter()
                .any(|f| f.attribute_name() == e.attribute_name())
        })
    }

    /// Filter extractors that this key does not cover
    pub fn uncovered<'a>(&self, filter: &'a [ExtractorRef]) -> Vec<&'a ExtractorRef> {
        filter
            .iter()
            .filter(|f| {
                !self
                    .extractors
                    .iter()
                    .any(|e| e.attribute_name() == f.attribute_name())
            })
            .collect()
    }

    /// Comma-separated key attribute names
    pub fn attribute_names(&self) -> String {
        join_names(&self.extractors)
    }
}

/// Comma-separated attribute names of `extractors`
pub fn join_names(extractors: &[ExtractorRef]) -> String {
    extractors
        .iter()
        .map(|e| e.attribute_name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::attribute;
    use crate::value::Value;

    fn row(a: i64, b: &str) -> Record {
        Record::new(vec![Value::Int(a), Value::from(b)])
    }

    #[test]
    fn test_hash_folds_in_order() {
        let strategy = ExtractorHashStrategy::new(vec![attribute("a", 0), attribute("b", 1)]);
        let record = row(3, "x");
        let expected = combine_hash(combine_hash(0, 3), Value::from("x").hash_code());
        assert_eq!(strategy.hash_of(&record), expected);
    }

    #[test]
    fn test_equality_needs_every_attribute() {
        let strategy = ExtractorHashStrategy::new(vec![attribute("a", 0), attribute("b", 1)]);
        assert!(strategy.equals(&row(1, "x"), &row(1, "x")));
        assert!(!strategy.equals(&row(1, "x"), &row(1, "y")));
    }

    #[test]
    fn test_coverage() {
        let strategy = ExtractorHashStrategy::new(vec![attribute("a", 0)]);
        let filter = vec![attribute("b", 1), attribute("a", 0)];
        assert!(strategy.covered_by(&filter));
        assert_eq!(strategy.uncovered(&filter).len(), 1);
        assert!(!strategy.covered_by(&filter[..1]));
        assert_eq!(join_names(&filter), "b, a");
    }

    #[test]
    fn test_has_null() {
        let strategy = ExtractorHashStrategy::new(vec![attribute("a", 0), attribute("c", 2)]);
        assert!(strategy.has_null(&row(1, "x")));
    }
}
