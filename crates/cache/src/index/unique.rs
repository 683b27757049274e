//! Unique hash index

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use bitemp_core::{CacheError, ExtractorHashStrategy, ExtractorRef, Record, Result};

use super::{CacheIndex, IndexEntry};

/// At most one entry per key
pub struct UniqueIndex<E> {
    name: String,
    key: ExtractorHashStrategy,
    table: FxHashMap<u64, SmallVec<[E; 1]>>,
    len: usize,
}

impl<E: IndexEntry> UniqueIndex<E> {
    /// Empty index keyed by `extractors`
    pub fn new(name: impl Into<String>, extractors: Vec<ExtractorRef>) -> Result<Self> {
        Self::with_capacity(name, extractors, 0)
    }

    /// Empty index with room for `capacity` keys
    pub fn with_capacity(
        name: impl Into<String>,
        extractors: Vec<ExtractorRef>,
        capacity: usize,
    ) -> Result<Self> {
        let name = name.into();
        if extractors.is_empty() {
            return Err(CacheError::EmptyExtractorList(name));
        }
        Ok(Self {
            name,
            key: ExtractorHashStrategy::new(extractors),
            table: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            len: 0,
        })
    }

    /// Entry whose key equals the probe's
    pub fn get(&self, probe: &Record) -> Option<&E> {
        let hash = self.key.hash_of(probe);
        self.table
            .get(&hash)?
            .iter()
            .find(|e| self.key.equals(e.record(), probe))
    }

    /// Insert or replace by key, returning the replaced entry
    pub fn put(&mut self, entry: E) -> Option<E> {
        let hash = self.key.hash_of(entry.record());
        let bucket = self.table.entry(hash).or_default();
        let key = &self.key;
        match bucket
            .iter_mut()
            .find(|e| key.equals(e.record(), entry.record()))
        {
            Some(slot) => Some(std::mem::replace(slot, entry)),
            None => {
                bucket.push(entry);
                self.len += 1;
                None
            }
        }
    }

    /// Remove by key
    pub fn remove(&mut self, probe: &Record) -> Option<E> {
        let hash = self.key.hash_of(probe);
        let removed = take_from_bucket(&mut self.table, hash, |e| {
            self.key.equals(e.record(), probe)
        });
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }
}

fn take_from_bucket<E>(
    table: &mut FxHashMap<u64, SmallVec<[E; 1]>>,
    hash: u64,
    pred: impl Fn(&E) -> bool,
) -> Option<E> {
    let bucket = table.get_mut(&hash)?;
    let pos = bucket.iter().position(pred)?;
    let removed = bucket.remove(pos);
    if bucket.is_empty() {
        table.remove(&hash);
    }
    Some(removed)
}

impl<E: IndexEntry> CacheIndex<E> for UniqueIndex<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> &ExtractorHashStrategy {
        &self.key
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        self.len
    }

    fn check_insert(&self, entry: &E) -> Result<()> {
        match self.get(entry.record()) {
            Some(existing) if !existing.same_identity(entry) => {
                Err(CacheError::DuplicateUniqueKey {
                    index: self.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn insert(&mut self, entry: E) {
        self.put(entry);
    }

    fn remove_entry(&mut self, entry: &E) -> bool {
        let hash = self.key.hash_of(entry.record());
        let removed = take_from_bucket(&mut self.table, hash, |e| e.same_identity(entry)).is_some();
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn lookup(&self, probe: &Record, out: &mut Vec<E>) {
        out.extend(self.get(probe).cloned());
    }

    fn lookup_hash(&self, hash: u64, out: &mut Vec<E>) {
        if let Some(bucket) = self.table.get(&hash) {
            out.extend(bucket.iter().cloned());
        }
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
    use crate::index::test_support::{group_key, id_key, row};
    use bitemp_core::ShiftedHashExtractor;
    use std::sync::Arc;

    #[test]
    fn test_put_and_get() {
        let mut index = UniqueIndex::new("pk", id_key()).unwrap();
        let a = row(1, "x");
        assert!(index.put(a.clone()).is_none());
        assert!(Arc::ptr_eq(index.get(&row(1, "other")).unwrap(), &a));
        assert!(index.get(&row(2, "x")).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_put_replaces_equal_key() {
        let mut index = UniqueIndex::new("pk", id_key()).unwrap();
        let a = row(1, "x");
        let b = row(1, "y");
        index.put(a.clone());
        let replaced = index.put(b.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &a));
        assert!(Arc::ptr_eq(index.get(&a).unwrap(), &b));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_check_insert_rejects_other_identity() {
        let mut index = UniqueIndex::new("byGroup", group_key()).unwrap();
        let a = row(1, "x");
        index.insert(a.clone());
        assert!(index.check_insert(&a).is_ok());
        assert!(matches!(
            index.check_insert(&row(2, "x")),
            Err(CacheError::DuplicateUniqueKey { .. })
        ));
        assert!(index.check_insert(&row(3, "y")).is_ok());
    }

    #[test]
    fn test_collisions_resolved_by_equality() {
        let shifted = vec![ShiftedHashExtractor::wrap(id_key().remove(0), 4)];
        let mut index = UniqueIndex::new("pk", shifted).unwrap();
        let rows: Vec<_> = (0..16).map(|i| row(i, "x")).collect();
        for r in &rows {
            index.insert(r.clone());
        }
        assert_eq!(index.len(), 16);
        for r in &rows {
            assert!(Arc::ptr_eq(index.get(r).unwrap(), r));
        }
        let mut bucket = Vec::new();
        index.lookup_hash(0, &mut bucket);
        assert_eq!(bucket.len(), 16);

        assert!(index.remove_entry(&rows[3]));
        assert!(!index.remove_entry(&rows[3]));
        assert!(index.get(&rows[3]).is_none());
        assert_eq!(index.len(), 15);
    }

    #[test]
    fn test_remove_by_key_and_clear() {
        let mut index = UniqueIndex::new("pk", id_key()).unwrap();
        index.put(row(1, "x"));
        index.put(row(2, "x"));
        assert!(index.remove(&row(1, "ignored")).is_some());
        assert!(index.remove(&row(1, "ignored")).is_none());
        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_nulls_not_supported() {
        let index: UniqueIndex<Arc<Record>> = UniqueIndex::new("pk", id_key()).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            index.nulls(&mut out),
            Err(CacheError::NullsNotSupported(_))
        ));
    }

    #[test]
    fn test_empty_extractors_rejected() {
        let result = UniqueIndex::<Arc<Record>>::new("pk", Vec::new());
        assert!(matches!(result, Err(CacheError::EmptyExtractorList(_))));
    }
}
