// ChainedMap integration tests.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Round-trip: insert(k, v) then lookup(k) yields (k, v).
// - Uniqueness: insert never overwrites; update always does.
// - Removal: remove hands back the owned pair and the key disappears.
// - Structure: capacity stays a power of two and the load factor stays at
//   or under 0.5 until the capacity ceiling is reached.
use isi_hashmap::{ChainedMap, ConfigError, INIT_CAPACITY, MAX_LOAD_FACTOR};
use std::io;
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// Test: small inserts into a default map.
// Assumes: default capacity starts at INIT_CAPACITY (8).
// Verifies: every insert succeeds, count is exact, every key reads back and
// the fifth insert crosses the load factor and doubles to 16.
#[test]
fn insert_six_keys_then_lookup_all() {
    init_tracing();
    let mut m = ChainedMap::new();
    assert_eq!(m.capacity(), INIT_CAPACITY);
    for k in 0..=5 {
        let r = m.insert(k, k);
        assert!(r.successful());
        assert_eq!(*r.key(), k);
        assert_eq!(*r.value(), k);
    }
    assert_eq!(m.count(), 6);
    assert_eq!(m.capacity(), 16);
    for k in 0..=5 {
        let e = m.lookup(&k).expect("inserted key present");
        assert_eq!(*e.key(), k);
        assert_eq!(*e.value(), k);
    }
}

// Test: remove returns the pair by value.
// Verifies: key/value accessors and ownership transfer; count and lookup
// reflect the removal.
#[test]
fn remove_returns_owned_pair() {
    let mut m = ChainedMap::new();
    assert!(m.insert(1, 1).successful());
    let removed = m.remove(&1).expect("present");
    assert_eq!(*removed.key(), 1);
    assert_eq!(*removed.value(), 1);
    assert_eq!(removed.clone().into_key(), 1);
    assert_eq!(removed.into_value(), 1);
    assert_eq!(m.count(), 0);
    assert!(m.lookup(&1).is_none());
    assert!(m.remove(&1).is_none());
}

// Test: owned removal of non-Copy data.
// Verifies: the exact String allocations come back to the caller.
#[test]
fn remove_transfers_ownership_of_heap_data() {
    let mut m: ChainedMap<String, Vec<u8>> = ChainedMap::new();
    m.insert("blob".to_string(), vec![1, 2, 3]);
    let (k, v) = m.remove("blob").expect("present").into_parts();
    assert_eq!(k, "blob");
    assert_eq!(v, vec![1, 2, 3]);
    assert!(m.is_empty());
}

// Test: update overwrites in place.
// Verifies: update succeeds with the new value and count is unchanged.
#[test]
fn update_overwrites_existing() {
    let mut m = ChainedMap::new();
    m.insert(1, 1);
    let r = m.update(1, 2);
    assert!(r.successful());
    assert_eq!(*r.value(), 2);
    assert_eq!(r.previous(), Some(&1));
    assert_eq!(m.count(), 1);
}

// Test: repeated updates of one key.
// Verifies: the last write wins and count never moves.
#[test]
fn repeated_updates_keep_count() {
    let mut m = ChainedMap::new();
    for v in 0..100 {
        m.update("k", v);
        assert_eq!(m.count(), 1);
    }
    assert_eq!(m.lookup("k").map(|e| *e.value()), Some(99));
}

// Test: zero max capacity.
// Verifies: construction reports a configuration error with a readable message.
#[test]
fn zero_max_capacity_is_config_error() {
    let err = ChainedMap::<u32, u32>::with_max_capacity(0)
        .err()
        .expect("zero max capacity must be rejected");
    assert_eq!(err, ConfigError::ZeroMaxCapacity);
    assert!(err.to_string().contains("max capacity"));
}

// Test: structural invariants across growth.
// Assumes: capacity doubles only while under the ceiling.
// Verifies: power-of-two capacity and the load factor bound after every insert.
#[test]
fn growth_keeps_structural_invariants() {
    init_tracing();
    for max_capacity in [1usize, 2, 5, 64, 1000, usize::MAX] {
        let mut m = ChainedMap::with_max_capacity(max_capacity).unwrap();
        assert!(m.max_capacity() <= max_capacity);
        for k in 0..2_000u32 {
            m.insert(k, k);
            assert!(m.capacity().is_power_of_two());
            assert!(m.capacity() <= m.max_capacity());
            assert!(m.load_factor() <= MAX_LOAD_FACTOR || m.capacity() == m.max_capacity());
        }
        for k in 0..2_000u32 {
            assert_eq!(m.lookup(&k).map(|e| *e.value()), Some(k));
        }
        let stats = m.stats();
        assert_eq!(stats.count, 2_000);
        assert_eq!(stats.capacity, m.capacity());
        assert!(stats.min_bucket_depth <= stats.max_bucket_depth);
    }
}

// Formatted log output collected in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
    }
}

// Test: filling a bounded map far past its ceiling.
// Assumes: a ceiling of 4 buckets is reached by the third insert.
// Verifies: the ceiling event is logged once per crossing of the load
// threshold, not on every later insert.
#[test]
fn ceiling_event_logged_once_per_crossing() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut m = ChainedMap::with_max_capacity(4).unwrap();
        for k in 0..64u32 {
            m.insert(k, k);
        }
        assert_eq!(captured.count("capacity ceiling reached"), 1);

        // Drop back under the threshold, then cross it again.
        for k in 0..63u32 {
            m.remove(&k);
        }
        assert!(m.load_factor() <= MAX_LOAD_FACTOR);
        for k in 100..110u32 {
            m.insert(k, k);
        }
        assert_eq!(captured.count("capacity ceiling reached"), 2);
    });
}
