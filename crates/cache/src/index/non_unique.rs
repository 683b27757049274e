//! Non-unique hash index

use rustc_hash::FxHashMap;

use bitemp_core::{CacheError, ExtractorHashStrategy, ExtractorRef, Record, Result};

use super::{CacheIndex, IndexEntry};

/// Any number of entries per key
///
/// Entries whose key contains a null are indexed like any other value and
/// can also be listed through [`CacheIndex::nulls`].
pub struct NonUniqueIndex<E> {
    name: String,
    key: ExtractorHashStrategy,
    table: FxHashMap<u64, Vec<E>>,
    len: usize,
}

impl<E: IndexEntry> NonUniqueIndex<E> {
    /// Empty index keyed by `extractors`
    pub fn new(name: impl Into<String>, extractors: Vec<ExtractorRef>) -> Result<Self> {
        let name = name.into();
        if extractors.is_empty() {
            return Err(CacheError::EmptyExtractorList(name));
        }
        Ok(Self {
            name,
            key: ExtractorHashStrategy::new(extractors),
            table: FxHashMap::default(),
            len: 0,
        })
    }

    /// Entries whose key equals the probe's
    pub fn get(&self, probe: &Record) -> Vec<E> {
        let mut out = Vec::new();
        self.lookup(probe, &mut out);
        out
    }
}

impl<E: IndexEntry> CacheIndex<E> for NonUniqueIndex<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> &ExtractorHashStrategy {
        &self.key
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn len(&self) -> usize {
        self.len
    }

    fn check_insert(&self, _entry: &E) -> Result<()> {
        Ok(())
    }

    fn insert(&mut self, entry: E) {
        let hash = self.key.hash_of(entry.record());
        self.table.entry(hash).or_default().push(entry);
        self.len += 1;
    }

    fn remove_entry(&mut self, entry: &E) -> bool {
        let hash = self.key.hash_of(entry.record());
        let Some(bucket) = self.table.get_mut(&hash) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|e| e.same_identity(entry)) else {
            return false;
        };
        bucket.swap_remove(pos);
        if bucket.is_empty() {
            self.table.remove(&hash);
        }
        self.len -= 1;
        true
    }

    fn lookup(&self, probe: &Record, out: &mut Vec<E>) {
        let hash = self.key.hash_of(probe);
        if let Some(bucket) = self.table.get(&hash) {
            out.extend(
                bucket
                    .iter()
                    .filter(|e| self.key.equals(e.record(), probe))
                    .cloned(),
            );
        }
    }

    fn lookup_hash(&self, hash: u64, out: &mut Vec<E>) {
        if let Some(bucket) = self.table.get(&hash) {
            out.extend(bucket.iter().cloned());
        }
    }

    fn nulls(&self, out: &mut Vec<E>) -> Result<()> {
        out.extend(
            self.table
                .values()
                .flatten()
                .filter(|e| self.key.has_null(e.record()))
                .cloned(),
        );
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(&E)) {
        self.table.values().flatten().for_each(f);
    }

    fn clear(&mut self) {
        self.table.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::{group_key, row};
    use bitemp_core::Value;
    use std::sync::Arc;

    #[test]
    fn test_many_entries_per_key() {
        let mut index = NonUniqueIndex::new("byGroup", group_key()).unwrap();
        let rows: Vec<_> = (0..5)
            .map(|i| row(i, if i % 2 == 0 { "even" } else { "odd" }))
            .collect();
        for r in &rows {
            assert!(index.check_insert(r).is_ok());
            index.insert(r.clone());
        }
        assert_eq!(index.get(&row(99, "even")).len(), 3);
        assert_eq!(index.get(&row(99, "odd")).len(), 2);
        assert!(index.get(&row(99, "none")).is_empty());
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_remove_is_by_identity() {
        let mut index = NonUniqueIndex::new("byGroup", group_key()).unwrap();
        let a = row(1, "g");
        let twin = row(1, "g");
        index.insert(a.clone());
        index.insert(twin.clone());

        assert!(index.remove_entry(&a));
        let left = index.get(&a);
        assert_eq!(left.len(), 1);
        assert!(Arc::ptr_eq(&left[0], &twin));
        assert!(!index.remove_entry(&a));
    }

    #[test]
    fn test_nulls_listed() {
        let mut index = NonUniqueIndex::new("byGroup", group_key()).unwrap();
        let null_group = Arc::new(Record::new(vec![Value::Int(1), Value::Null]));
        let short = Arc::new(Record::new(vec![Value::Int(2)]));
        index.insert(null_group.clone());
        index.insert(short.clone());
        index.insert(row(3, "g"));

        let mut nulls = Vec::new();
        index.nulls(&mut nulls).unwrap();
        assert_eq!(nulls.len(), 2);
        assert_eq!(index.get(&Record::default()).len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut index = NonUniqueIndex::new("byGroup", group_key()).unwrap();
        index.insert(row(1, "g"));
        index.clear();
        assert!(index.is_empty());
        assert!(index.get(&row(1, "g")).is_empty());
    }
}
