//! Expiry rules for partial caches
//!
//! An entry written at `cached_at` is expired once `cached_at + window < now`.
//! Exactly at the window boundary it is still live. A zero time-to-live
//! turns expiry off entirely, including for relationship lookups.

use std::time::Duration;

use bitemp_core::Timestamp;
use tracing::trace;

use crate::business_object::CacheEntry;
use crate::config::CacheConfig;
use crate::index::registry::IndexSet;
use crate::index::CacheIndex;

/// Which expiry window applies to a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Direct lookups and identity resolution
    Direct,
    /// Lookups reached by following a relationship
    Relationship,
}

/// Expiry windows of one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TtlPolicy {
    ttl: Duration,
    relationship_ttl: Duration,
}

impl TtlPolicy {
    /// Policy that never expires anything
    pub fn none() -> Self {
        Self::default()
    }

    /// Policy with the given windows; zero means "unset"
    pub fn new(ttl: Duration, relationship_ttl: Duration) -> Self {
        Self {
            ttl,
            relationship_ttl,
        }
    }

    /// Policy described by `config`
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.time_to_live(), config.relationship_time_to_live())
    }

    /// Whether entries can expire
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Window for direct reads
    pub fn window(&self) -> Option<Duration> {
        self.is_enabled().then_some(self.ttl)
    }

    /// Window for relationship reads
    ///
    /// The smaller of the two windows when both are set.
    pub fn relationship_window(&self) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        if self.relationship_ttl.is_zero() {
            return Some(self.ttl);
        }
        Some(self.ttl.min(self.relationship_ttl))
    }

    /// Window for `access`
    pub fn window_for(&self, access: Access) -> Option<Duration> {
        match access {
            Access::Direct => self.window(),
            Access::Relationship => self.relationship_window(),
        }
    }

    /// Whether an entry cached at `cached_at` is expired at `now`
    pub fn is_expired(&self, cached_at: Timestamp, now: Timestamp, access: Access) -> bool {
        match self.window_for(access) {
            Some(window) => cached_at.saturating_add(window) < now,
            None => false,
        }
    }

    /// When an entry cached at `cached_at` stops being served directly
    pub fn expiry_timestamp(&self, cached_at: Timestamp) -> Option<Timestamp> {
        self.window().map(|w| cached_at.saturating_add(w))
    }

    /// Whether `entry` is expired for `access` at `now`
    pub(crate) fn entry_expired(&self, entry: &CacheEntry, now: Timestamp, access: Access) -> bool {
        self.is_expired(entry.object().cached_at(), now, access)
    }

    /// Split read results into (live, evictable)
    ///
    /// An entry only expired for relationship reads is hidden from the
    /// caller but stays resident.
    pub(crate) fn split_live(
        &self,
        entries: Vec<CacheEntry>,
        now: Timestamp,
        access: Access,
    ) -> (Vec<CacheEntry>, Vec<CacheEntry>) {
        if !self.is_enabled() {
            return (entries, Vec::new());
        }
        let mut live = Vec::with_capacity(entries.len());
        let mut evictable = Vec::new();
        for entry in entries {
            if !self.entry_expired(&entry, now, access) {
                live.push(entry);
            } else if self.entry_expired(&entry, now, Access::Direct) {
                evictable.push(entry);
            }
        }
        (live, evictable)
    }

    /// Drop `candidates` that are still expired from every index in `set`
    ///
    /// Candidates were picked under a read lock; one may have been refreshed
    /// or removed since, so each is checked again.
    pub(crate) fn evict<P: CacheIndex<CacheEntry>>(
        &self,
        set: &mut IndexSet<CacheEntry, P>,
        candidates: &[CacheEntry],
        now: Timestamp,
    ) -> usize {
        let evicted = candidates
            .iter()
            .filter(|e| self.entry_expired(e, now, Access::Direct))
            .filter(|e| set.remove(e))
            .count();
        if evicted > 0 {
            trace!(target: "bitemp::cache", evicted, "Evicted expired entries");
        }
        evicted
    }
}
