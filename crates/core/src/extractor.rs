//! Key extractors
//!
//! An extractor is a stateless accessor for one logical attribute. Indexes
//! are defined as ordered extractor lists and never look at record columns
//! directly, so the same index code serves plain attributes, temporal
//! attributes and wrapped extractors alike.

use std::fmt;
use std::sync::Arc;

use crate::as_of::AsOfAttribute;
use crate::record::Record;
use crate::value::Value;

/// Shared handle to an extractor
pub type ExtractorRef = Arc<dyn Extractor>;

/// Reads, hashes and compares one attribute of a record
///
/// `values_equal` must agree with `hash_of`: two records whose values are
/// equal must hash the same.
pub trait Extractor: Send + Sync + fmt::Debug {
    /// Logical attribute name, used to match filters against index keys
    fn attribute_name(&self) -> &str;

    /// The attribute's value in `record`
    fn value_of<'a>(&self, record: &'a Record) -> &'a Value;

    /// Hash of a bare value, as this extractor would hash it
    fn hash_of_value(&self, value: &Value) -> u64 {
        value.hash_code()
    }

    /// Hash of the attribute in `record`
    fn hash_of(&self, record: &Record) -> u64 {
        self.hash_of_value(self.value_of(record))
    }

    /// Literal equality of the attribute in two records
    fn values_equal(&self, stored: &Record, probe: &Record) -> bool {
        self.value_of(stored) == self.value_of(probe)
    }

    /// Whether a stored record satisfies the probe on this attribute
    ///
    /// Plain attributes compare literally. Temporal attributes override this
    /// with interval containment.
    fn probe_matches(&self, stored: &Record, probe: &Record) -> bool {
        self.values_equal(stored, probe)
    }

    /// Whether the attribute is null in `record`
    fn is_null(&self, record: &Record) -> bool {
        self.value_of(record).is_null()
    }

    /// The temporal dimension behind this extractor, if any
    fn as_of_attribute(&self) -> Option<&AsOfAttribute> {
        None
    }
}

/// Reads one positional column
#[derive(Debug, Clone)]
pub struct AttributeExtractor {
    name: String,
    column: usize,
}

impl AttributeExtractor {
    /// Create an extractor for `column` named `name`
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
        }
    }

    /// Column this extractor reads
    pub fn column(&self) -> usize {
        self.column
    }
}

impl Extractor for AttributeExtractor {
    fn attribute_name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn value_of<'a>(&self, record: &'a Record) -> &'a Value {
        record.get(self.column)
    }
}

/// Shorthand for a shared [`AttributeExtractor`]
pub fn attribute(name: impl Into<String>, column: usize) -> ExtractorRef {
    Arc::new(AttributeExtractor::new(name, column))
}

/// Degrades another extractor's hash by shifting it right
///
/// Everything except hashing is delegated, so lookups stay correct while
/// neighbouring keys land in the same bucket. Used to exercise collision
/// handling.
#[derive(Debug, Clone)]
pub struct ShiftedHashExtractor {
    inner: ExtractorRef,
    shift: u32,
}

impl ShiftedHashExtractor {
    /// Wrap `inner`, shifting its hash right by `shift` bits
    pub fn new(inner: ExtractorRef, shift: u32) -> Self {
        Self {
            inner,
            shift: shift.min(63),
        }
    }

    /// Wrap `inner` and share the result
    pub fn wrap(inner: ExtractorRef, shift: u32) -> ExtractorRef {
        Arc::new(Self::new(inner, shift))
    }
}

impl Extractor for ShiftedHashExtractor {
    fn attribute_name(&self) -> &str {
        self.inner.attribute_name()
    }

    fn value_of<'a>(&self, record: &'a Record) -> &'a Value {
        self.inner.value_of(record)
    }

    fn hash_of_value(&self, value: &Value) -> u64 {
        self.inner.hash_of_value(value) >> self.shift
    }

    fn hash_of(&self, record: &Record) -> u64 {
        self.inner.hash_of(record) >> self.shift
    }

    fn values_equal(&self, stored: &Record, probe: &Record) -> bool {
        self.inner.values_equal(stored, probe)
    }

    fn probe_matches(&self, stored: &Record, probe: &Record) -> bool {
        self.inner.probe_matches(stored, probe)
    }

    fn is_null(&self, record: &Record) -> bool {
        self.inner.is_null(record)
    }

    fn as_of_attribute(&self) -> Option<&AsOfAttribute> {
        self.inner.as_of_attribute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> Record {
        Record::new(vec![Value::Int(id), Value::from(name)])
    }

    #[test]
    fn test_attribute_extractor_reads_column() {
        let name = attribute("name", 1);
        let record = row(7, "seven");
        assert_eq!(name.attribute_name(), "name");
        assert_eq!(name.value_of(&record), &Value::from("seven"));
        assert!(name.values_equal(&record, &row(8, "seven")));
        assert!(!name.values_equal(&record, &row(7, "eight")));
    }

    #[test]
    fn test_missing_column_is_null() {
        let extra = attribute("extra", 4);
        assert!(extra.is_null(&row(1, "a")));
    }

    #[test]
    fn test_shifted_hash_collides_but_stays_exact() {
        let id = attribute("id", 0);
        let shifted = ShiftedHashExtractor::wrap(id.clone(), 1);
        let a = row(42, "a");
        let b = row(43, "b");

        assert_ne!(id.hash_of(&a), id.hash_of(&b));
        assert_eq!(shifted.hash_of(&a), shifted.hash_of(&b));
        assert!(!shifted.values_equal(&a, &b));
        assert_eq!(shifted.attribute_name(), "id");
        assert_eq!(shifted.hash_of_value(&Value::Int(42)), shifted.hash_of(&a));
    }

    #[test]
    fn test_shift_is_clamped() {
        let shifted = ShiftedHashExtractor::new(attribute("id", 0), 200);
        assert_eq!(shifted.hash_of(&row(i64::MAX, "x")), 0);
    }
}
