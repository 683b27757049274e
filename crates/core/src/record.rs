//! Raw attribute records
//!
//! A `Record` is the snapshot of one entity's attribute values at the time
//! it was loaded. Columns are positional; extractors know which column
//! holds which attribute. Reading past the last column yields `Null`, so a
//! probe only needs the columns it actually probes.

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Positional attribute snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Create a record from its column values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at `column`, or `Null` past the end
    #[inline]
    pub fn get(&self, column: usize) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Timestamp at `column`, if that column holds one
    #[inline]
    pub fn timestamp(&self, column: usize) -> Option<Timestamp> {
        self.get(column).as_timestamp()
    }

    /// Copy of this record with `column` replaced
    ///
    /// Grows the record with `Null`s when `column` is past the end.
    pub fn with_value(&self, column: usize, value: impl Into<Value>) -> Self {
        let mut values = self.values.clone();
        if column >= values.len() {
            values.resize(column + 1, Value::Null);
        }
        values[column] = value.into();
        Self { values }
    }

    /// Replace `column` in place
    pub fn set(&mut self, column: usize, value: impl Into<Value>) {
        if column >= self.values.len() {
            self.values.resize(column + 1, Value::Null);
        }
        self.values[column] = value.into();
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All column values
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}
