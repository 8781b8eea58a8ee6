#![cfg(test)]

// Property tests for ChainedMap kept inside the crate so they can check
// structural invariants through `check_invariants`.

use crate::chained_map::tests::ConstBuildHasher;
use crate::chained_map::{ChainedMap, MAX_LOAD_FACTOR};
use crate::scheduler::RingScheduler;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::BuildHasher;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Update(usize, i32),
    Remove(usize),
    Lookup(usize),
    Contains(String),
    Mutate(usize, i32),
    Multilookup(usize),
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            3 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Update(i, v)),
            1 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::Lookup),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s),
            ]
            .prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => (1usize..=8).prop_map(OpI::Multilookup),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Drives `sut` through `ops` against a std HashMap model.
// Invariants exercised after every op:
// - insert never overwrites; duplicates report the stored value.
// - update overwrites and reports the previous value.
// - remove hands back the owned pair matching the model.
// - lookup/contains parity with the model, borrowed `&str` lookups included.
// - structure: power-of-two capacity, load factor bound below the ceiling,
//   bucket counters summing to the item count.
// - interleaved multilookup over the pool agrees with the sequential one.
fn run_scenario<S: BuildHasher>(
    mut sut: ChainedMap<Key, i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<Key, i32> = HashMap::new();
    let probe_keys: Vec<Key> = (0..pool.len()).map(|i| key_from(pool, i)).collect();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(pool, i);
                let existing = model.get(&k).copied();
                let r = sut.insert(k.clone(), v);
                prop_assert_eq!(r.successful(), existing.is_none());
                prop_assert_eq!(r.key(), &k);
                prop_assert_eq!(*r.value(), existing.unwrap_or(v));
                model.entry(k).or_insert(v);
            }
            OpI::Update(i, v) => {
                let k = key_from(pool, i);
                let before = model.insert(k.clone(), v);
                let r = sut.update(k, v);
                prop_assert!(r.successful());
                prop_assert_eq!(*r.value(), v);
                prop_assert_eq!(r.into_previous(), before);
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                match (sut.remove(&k), model.remove(&k)) {
                    (Some(removed), Some(mv)) => {
                        let (kk, vv) = removed.into_parts();
                        prop_assert_eq!(kk, k.clone());
                        prop_assert_eq!(vv, mv);
                    }
                    (None, None) => {}
                    (got, want) => prop_assert!(false, "remove mismatch: {:?} vs {:?}", got, want),
                }
                prop_assert!(sut.lookup(&k).is_none());
            }
            OpI::Lookup(i) => {
                let k = key_from(pool, i);
                let got = sut.lookup(&k).map(|e| (e.key().clone(), *e.value()));
                let want = model.get(&k).map(|v| (k.clone(), *v));
                prop_assert_eq!(got, want);
            }
            OpI::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(has, has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(pool, i);
                match (sut.get_mut(&k), model.get_mut(&k)) {
                    (Some(sv), Some(mv)) => {
                        *sv = sv.saturating_add(d);
                        *mv = mv.saturating_add(d);
                    }
                    (None, None) => {}
                    _ => prop_assert!(false, "get_mut presence mismatch"),
                }
            }
            OpI::Multilookup(n_streams) => {
                let mut sched = RingScheduler::with_capacity(n_streams);
                let interleaved = sut.interleaved_multilookup(&probe_keys, &mut sched, n_streams);
                let sequential = sut.sequential_multilookup(&probe_keys);
                prop_assert_eq!(&interleaved, &sequential);
                let found: BTreeSet<&Key> = interleaved
                    .iter()
                    .filter(|r| r.is_found())
                    .map(|r| r.key())
                    .collect();
                let expected: BTreeSet<&Key> =
                    probe_keys.iter().filter(|k| model.contains_key(*k)).collect();
                prop_assert_eq!(found, expected);
            }
        }

        sut.check_invariants();
        prop_assert_eq!(sut.count(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.capacity().is_power_of_two());
        prop_assert!(
            sut.load_factor() <= MAX_LOAD_FACTOR || sut.capacity() == sut.max_capacity()
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(ChainedMap::new(), &pool, ops)?;
    }

    // Same invariants with a small ceiling, so the degraded-load path is hit.
    #[test]
    fn prop_state_machine_bounded((pool, ops) in arb_scenario(), max_capacity in 1usize..=16) {
        let sut = ChainedMap::with_max_capacity(max_capacity).expect("non-zero max capacity");
        run_scenario(sut, &pool, ops)?;
    }

    // Worst-case collisions: every key in one chain, so equality resolution
    // and unlinking from arbitrary chain positions carry the whole load.
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(ChainedMap::with_hasher(ConstBuildHasher), &pool, ops)?;
    }
}
