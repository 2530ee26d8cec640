//! Behavioural properties of the scaling filter through the public API

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use scalebloom_core::store::{BackingStore, MemoryStore, MemoryStoreConfig, StoredValue};
use scalebloom_core::{hash, sizing, FilterConfig, Profile, ScalingBloomFilter};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::f64::consts::LN_2;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn open(entries: u64, precision: f64) -> (Arc<MemoryStore>, ScalingBloomFilter) {
    let store = Arc::new(MemoryStore::default());
    let config = FilterConfig::new(entries, precision).unwrap();
    let filter = ScalingBloomFilter::connect(store.clone(), "bf", config).unwrap();
    (store, filter)
}

fn random_words(seed: u64, count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::new();
    while seen.len() < count {
        let len = rng.gen_range(4..24);
        let word: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        seen.insert(word);
    }
    seen.into_iter().collect()
}

#[test]
fn test_no_false_negatives_across_segments() {
    let (_store, filter) = open(100, 0.01);
    let words = random_words(7, 1_000);

    for word in &words {
        assert!(filter.insert(word).unwrap());
    }
    assert_eq!(filter.current_segment().unwrap(), 10);

    for word in &words {
        assert!(filter.check(word).unwrap(), "missing {}", word);
    }
}

#[test]
fn test_insertnx_race_safety() {
    let (_store, filter) = open(1_000, 0.001);
    let filter = Arc::new(filter);
    let threads = 16;

    for round in 0..10 {
        let element = format!("contended-{}", round);
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let filter = filter.clone();
                let barrier = barrier.clone();
                let element = element.clone();
                thread::spawn(move || {
                    barrier.wait();
                    filter.insertnx(&element).unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1, "round {}", round);
    }

    assert_eq!(filter.count().unwrap(), 10);
}

#[test]
fn test_monotonic_growth() {
    let entries = 10;
    let (_store, filter) = open(entries, 0.01);
    let mut inserted = 0u64;
    let mut next = 0usize;

    for m in 0..6u64 {
        while inserted < entries * m + 1 {
            filter.insert(format!("element-{}", next)).unwrap();
            next += 1;
            inserted += 1;
        }
        assert_eq!(filter.current_segment().unwrap(), m + 1);
    }
}

#[test]
fn test_repeated_inserts_consume_capacity() {
    let (_store, filter) = open(4, 0.01);
    for _ in 0..9 {
        filter.insert("same").unwrap();
    }
    assert_eq!(filter.count().unwrap(), 9);
    assert_eq!(filter.current_segment().unwrap(), 3);
}

#[test]
fn test_bounded_error_rate() {
    let precision = 0.01;
    let store = Arc::new(MemoryStore::default());
    let config = FilterConfig::new(1_000, precision).unwrap();
    let trials = 10_000;

    let mut total_false_positives = 0;
    for round in 0..5 {
        let namespace = format!("fp{}", round);
        let filter = ScalingBloomFilter::connect(store.clone(), &namespace, config).unwrap();
        for word in random_words(round, 1_000) {
            filter.insert(word).unwrap();
        }
        assert_eq!(filter.current_segment().unwrap(), 1);

        let false_positives = (0..trials)
            .filter(|i| filter.check(format!("outsider-{}-{}", round, i)).unwrap())
            .count();
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < precision, "round {} rate too high: {}", round, rate);
        total_false_positives += false_positives;
    }

    // segment 1 targets precision / 2
    let target = precision / 2.0;
    let rate = total_false_positives as f64 / (5 * trials) as f64;
    assert!(
        rate > target * 0.5 && rate < target * 1.5,
        "false positive rate {} outside band around {}",
        rate,
        target
    );
}

#[test]
fn test_clear_resets_state() {
    let (store, filter) = open(5, 0.01);
    for i in 0..12 {
        filter.insert(format!("k{}", i)).unwrap();
    }
    assert_eq!(store.keys("bf:*").unwrap().len(), 4);

    assert_eq!(filter.clear().unwrap(), 4);
    assert!(store.is_empty());
    for i in 0..12 {
        assert!(!filter.check(format!("k{}", i)).unwrap());
    }

    filter.insert("fresh").unwrap();
    assert_eq!(filter.count().unwrap(), 1);
    assert_eq!(filter.current_segment().unwrap(), 1);
    assert_eq!(store.keys("bf:*").unwrap(), vec!["bf:1", "bf:count"]);
}

#[test]
fn test_worked_example_parameters() {
    let (_store, filter) = open(100, 0.001);
    filter.insert("seed").unwrap();

    let expected_bits = (-(100.0 * (0.001 * 0.5f64).ln()) / (LN_2 * LN_2)).floor() as u64;
    let expected_k = (LN_2 * expected_bits as f64 / 100.0).floor() as u64;

    let segments = filter.segments().unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].bits, expected_bits);
    assert_eq!(segments[0].k, expected_k);

    for i in 0..99 {
        filter.insert(format!("worked-{}", i)).unwrap();
    }
    assert_eq!(filter.current_segment().unwrap(), 1);
    for i in 0..99 {
        assert!(filter.check(format!("worked-{}", i)).unwrap());
    }
}

#[test]
fn test_removal_example() {
    let (_store, filter) = open(100, 0.001);
    filter.insert("x").unwrap();
    assert!(filter.check("x").unwrap());
    assert!(filter.remove("x").unwrap());
    assert!(!filter.check("x").unwrap());
}

#[test]
fn test_remove_does_not_rewind_counter() {
    let (_store, filter) = open(100, 0.001);
    filter.insert("x").unwrap();
    filter.remove("x").unwrap();
    assert_eq!(filter.count().unwrap(), 1);

    // removal on an empty filter is a no-op
    let (store, empty) = open(100, 0.001);
    assert!(empty.remove("ghost").unwrap());
    assert!(store.is_empty());
}

#[test]
fn test_evicted_unit_is_registered_again() {
    let (store, filter) = open(100, 0.01);
    filter.insert("before").unwrap();

    assert_eq!(store.flush_units(), 1);
    assert!(filter.insert("after").unwrap());
    assert_eq!(store.stats().units, 1);
    assert!(filter.check("before").unwrap());
    assert!(filter.check("after").unwrap());
}

#[test]
fn test_snapshot_restore_keeps_members() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("filters.snap");
    let words = random_words(11, 300);

    let (store, filter) = open(50, 0.01);
    for word in &words {
        filter.insert(word).unwrap();
    }
    store.save_snapshot(&path).unwrap();

    let restored = Arc::new(MemoryStore::load_snapshot(&path, MemoryStoreConfig::default()).unwrap());
    let filter = ScalingBloomFilter::connect(restored, "bf", *filter.config()).unwrap();
    assert_eq!(filter.count().unwrap(), 300);
    for word in &words {
        assert!(filter.check(word).unwrap());
    }
}

#[test]
fn test_compat_profile_matches_script_layout() {
    let store = Arc::new(MemoryStore::default());
    let config = FilterConfig::new(100, 0.001)
        .unwrap()
        .with_profile(Profile::LuaCompat);
    let filter = ScalingBloomFilter::connect(store.clone(), "legacy", config).unwrap();
    filter.insert("payload").unwrap();

    // recompute the positions the deployed script would write
    let hex = hex::encode(Sha1::digest(b"payload"));
    let h: Vec<u64> = [(0, 8), (7, 16), (15, 24), (23, 32)]
        .iter()
        .map(|&(s, e)| u64::from_str_radix(&hex[s..e], 16).unwrap())
        .collect();
    let bits = ((100.0 * (0.001 * 0.5f64).ln()) / -0.480453013).floor() as u64;
    let k = (0.693147180 * bits as f64 / 100.0).floor() as u64;

    let bitmap = match store.get("legacy:1") {
        Some(StoredValue::Bits(bitmap)) => bitmap,
        other => panic!("unexpected value {:?}", other),
    };
    let mut expected = HashSet::new();
    for i in 1..=k {
        let raw = h[(i % 2) as usize] + i * h[(2 + ((i + i % 2) % 4) / 2) as usize];
        expected.insert(raw % bits);
    }
    for offset in &expected {
        assert!(bitmap.get(*offset));
    }
    assert_eq!(bitmap.count_ones(), expected.len() as u64);

    let params = sizing::segment_params(&config, 1).unwrap();
    assert_eq!((params.bits, params.k), (bits, k));
    let material = hash::derive(b"payload", Profile::LuaCompat);
    assert_eq!(material.0.to_vec(), h);
}
