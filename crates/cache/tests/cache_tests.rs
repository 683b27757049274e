//! Cache behaviour tests
//!
//! Covers the observable guarantees of both cache kinds:
//!
//! 1. **Identity stability** - one object per resident key or segment
//! 2. **Index consistency** - every registered index agrees with the primary
//! 3. **TTL expiry** - driven by a manual clock, no sleeping
//! 4. **Retained-dates pruning** - history cut down to snapshot dates
//! 5. **Hash collisions** - a degraded hash changes nothing observable

use std::sync::Arc;
use std::time::Duration;

use bitemp_cache::{
    CacheConfig, DatedCache, IndexRef, ManualClock, NonDatedCache, SystemClock,
};
use bitemp_core::{
    attribute, AsOfAttribute, ExtractorRef, Record, RetainDatesFilter, ShiftedHashExtractor,
    Timestamp, Value,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// [id, name, group]
fn person(id: i64, name: &str, group: &str) -> Record {
    Record::new(vec![Value::Int(id), Value::from(name), Value::from(group)])
}

fn key(shift: u32) -> Vec<ExtractorRef> {
    vec![ShiftedHashExtractor::wrap(attribute("id", 0), shift)]
}

fn name() -> Vec<ExtractorRef> {
    vec![attribute("name", 1)]
}

fn group() -> Vec<ExtractorRef> {
    vec![attribute("group", 2)]
}

/// [id, businessFrom, businessTo, processingFrom, processingTo]
fn segment(id: i64, from: u64, to: Timestamp) -> Record {
    Record::new(vec![
        Value::Int(id),
        Value::Timestamp(Timestamp::from_secs(from)),
        Value::Timestamp(to),
        Value::Timestamp(Timestamp::EPOCH),
        Value::Timestamp(Timestamp::INFINITY),
    ])
}

fn s(secs: u64) -> Timestamp {
    Timestamp::from_secs(secs)
}

fn business() -> AsOfAttribute {
    AsOfAttribute::new("businessDate", 1, 2)
}

fn dims() -> Vec<AsOfAttribute> {
    vec![business(), AsOfAttribute::new("processingDate", 3, 4)]
}

// ============================================================================
// Identity stability
// ============================================================================

#[test]
fn test_identity_stable_across_lookup_paths() {
    init_tracing();
    for shift in 0..4 {
        let cache = NonDatedCache::full(key(shift)).unwrap();
        let by_name = cache.add_unique_index("byName", name()).unwrap();
        let by_group = cache.add_index("byGroup", group()).unwrap();

        let objects: Vec<_> = (0..200)
            .map(|i| {
                cache
                    .get_object_from_data(person(i, &format!("n{}", i), "g"))
                    .unwrap()
            })
            .collect();

        for (i, object) in objects.iter().enumerate() {
            let i = i as i64;
            let again = cache.get_object_from_data(person(i, "", "")).unwrap();
            assert!(Arc::ptr_eq(object, &again));

            let probe = person(0, &format!("n{}", i), "");
            let via_name = cache.get(by_name, &probe, &name(), true).unwrap();
            assert!(Arc::ptr_eq(object, &via_name[0]));

            let via_as_one = cache.get_as_one(&person(i, "", ""), &key(shift)).unwrap().unwrap();
            assert!(Arc::ptr_eq(object, &via_as_one));
        }
        let everyone = cache.get(by_group, &person(0, "", "g"), &group(), true).unwrap();
        assert_eq!(everyone.len(), 200);
        assert_eq!(cache.size(), 200);
    }
}

#[test]
fn test_dated_identity_per_segment() {
    let cache = DatedCache::full(key(2), dims()).unwrap();
    let a = cache.get_object_from_data(segment(1, 0, s(10)), None).unwrap();
    let b = cache.get_object_from_data(segment(1, 10, s(20)), None).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let dates = [s(15), Timestamp::INFINITY];
    let found = cache.get_semi_unique_from_data(&segment(1, 0, s(1)), &dates).unwrap().unwrap();
    assert!(Arc::ptr_eq(&found, &b));
    let again = cache.get_object_from_data(segment(1, 3, s(4)), Some(&dates[..])).unwrap();
    assert!(Arc::ptr_eq(&again, &b));
}

// ============================================================================
// Index consistency
// ============================================================================

#[test]
fn test_indexes_agree_after_mixed_mutations() {
    init_tracing();
    for shift in 0..4 {
        let cache = NonDatedCache::full(key(shift)).unwrap();
        let by_name = cache.add_unique_index("byName", name()).unwrap();
        let by_group = cache.add_index("byGroup", group()).unwrap();

        for i in 0..300 {
            cache.put(person(i, &format!("n{}", i), if i % 3 == 0 { "a" } else { "b" })).unwrap();
        }
        // rename every tenth, drop every seventh
        for i in (0..300).step_by(10) {
            cache.put(person(i, &format!("renamed{}", i), "c")).unwrap();
        }
        for i in (0..300).step_by(7) {
            cache.remove(&person(i, "", ""));
        }

        let all = cache.get_all();
        assert_eq!(all.len(), cache.size());
        for object in &all {
            let data = object.data();
            let via_name = cache.get(by_name, &data, &name(), true).unwrap();
            assert_eq!(via_name.len(), 1);
            assert!(Arc::ptr_eq(object, &via_name[0]));
            let via_group = cache.get(by_group, &data, &group(), true).unwrap();
            assert!(via_group.iter().any(|o| Arc::ptr_eq(o, object)));
        }

        let total: usize = ["a", "b", "c"]
            .iter()
            .map(|g| cache.get(by_group, &person(0, "", g), &group(), true).unwrap().len())
            .sum();
        assert_eq!(total, cache.size());
        assert!(cache.get(by_name, &person(0, "n10", ""), &name(), true).unwrap().is_empty());
    }
}

#[test]
fn test_index_registered_late_sees_residents() {
    let cache = DatedCache::full(key(0), dims()).unwrap();
    for id in 0..50 {
        cache.put(segment(id, 0, s(10))).unwrap();
        cache.put(segment(id, 10, Timestamp::INFINITY)).unwrap();
    }
    let by_id = cache.add_index("byId", vec![attribute("id", 0)]).unwrap();
    assert_ne!(by_id, IndexRef::PRIMARY);
    let found = cache.get(by_id, &segment(7, 0, s(1)), &[attribute("id", 0)], true).unwrap();
    assert_eq!(found.len(), 2);
}

// ============================================================================
// TTL expiry
// ============================================================================

#[test]
fn test_ttl_expiry_with_clock_tick() {
    init_tracing();
    for shift in 0..4 {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
        let cache =
            NonDatedCache::partial(key(shift), CacheConfig::for_testing(), clock.clone()).unwrap();
        let by_group = cache.add_index("byGroup", group()).unwrap();
        let original = cache.get_object_from_data(person(1, "ann", "g")).unwrap();
        cache.get_object_from_data(person(2, "bob", "g")).unwrap();

        clock.advance(Duration::from_millis(100));
        cache.put(person(2, "bob", "g")).unwrap();
        clock.advance(Duration::from_millis(101));

        // 1 expired at +200ms, 2 was refreshed at +100ms
        let probe = person(0, "", "g");
        let live = cache.get(by_group, &probe, &group(), true).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].data().get(0), &Value::Int(2));
        assert_eq!(cache.size(), 1);

        let replacement = cache.get_object_from_data(person(1, "ann", "g")).unwrap();
        assert!(!Arc::ptr_eq(&original, &replacement));
        assert_eq!(cache.get(by_group, &probe, &group(), true).unwrap().len(), 2);
    }
}

#[test]
fn test_full_cache_never_expires() {
    let cache = NonDatedCache::with_config(key(0), CacheConfig::new(), Arc::new(SystemClock)).unwrap();
    cache.put(person(1, "ann", "g")).unwrap();
    assert_eq!(cache.evict_expired(), 0);
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_config_from_file_drives_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.toml");
    std::fs::write(&path, "time_to_live_ms = 50\nrelationship_time_to_live_ms = 10\n").unwrap();
    let config = CacheConfig::from_file(&path).unwrap();

    let clock = Arc::new(ManualClock::new(Timestamp::EPOCH));
    let cache = DatedCache::partial(key(0), dims(), config, clock.clone()).unwrap();
    cache.put(segment(1, 0, Timestamp::INFINITY)).unwrap();
    clock.advance(Duration::from_millis(51));
    assert_eq!(cache.evict_expired(), 1);
    assert_eq!(cache.semi_unique_size(), 0);
}

// ============================================================================
// Retained-dates pruning
// ============================================================================

#[test]
fn test_retained_dates_prune_history() {
    for shift in 0..4 {
        let cache = DatedCache::full(key(shift), dims()).unwrap();
        for id in 0..20 {
            for k in 0..10u64 {
                let to = if k == 9 { Timestamp::INFINITY } else { s(k * 100 + 100) };
                cache.put(segment(id, k * 100, to)).unwrap();
            }
        }
        assert_eq!(cache.size(), 200);

        let retain = RetainDatesFilter::new(business(), vec![s(150), s(150), s(720), s(5_000)]);
        let removed = cache.remove_all(&retain);
        assert_eq!(removed.len(), 20 * 7);
        assert_eq!(cache.size(), 60);
        assert_eq!(cache.semi_unique_size(), 20);

        for id in 0..20 {
            let left = cache.get_from_data_for_all_dates(&segment(id, 0, s(1)));
            let mut froms: Vec<_> = left
                .iter()
                .filter_map(|o| o.data().timestamp(1))
                .collect();
            froms.sort();
            assert_eq!(froms, vec![s(100), s(700), s(900)]);
        }
        // survivors are not widened over the pruned gap
        let gap = [s(300), Timestamp::INFINITY];
        assert!(cache.get_semi_unique_from_data(&segment(3, 0, s(1)), &gap).unwrap().is_none());
    }
}
