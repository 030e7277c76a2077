use crate::*;

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cmp::Ordering;

/// Index with the smallest layout: minimum degree 2, three keys per node.
fn small_index() -> BTreeIndex<u64> {
    let mut size = 8;
    loop {
        if let Ok(ix) = BTreeIndex::with_node_size(size) {
            assert_eq!(ix.layout().t, 2);
            return ix;
        }
        size += 8;
        assert!(size <= 4096, "layout never reached minimum degree 2");
    }
}

#[test]
fn small_degree_scenario_test() {
    let mut ix = small_index();
    assert_eq!(ix.layout().n, 3);
    for k in [10u64, 20, 5, 6, 12, 30, 7, 17] {
        let (_, inserted) = ix.put(k).unwrap();
        assert!(inserted);
        ix.check();
    }
    assert_eq!(ix.get(&6), Some(&6));
    assert_eq!(ix.len(), 8);
    assert!(ix.node_count() > 1);
    let keys: Vec<u64> = ix.iter().copied().collect();
    assert_eq!(keys, [5, 6, 7, 10, 12, 17, 20, 30]);

    assert_eq!(ix.del(&20), Some(20));
    ix.check();
    assert_eq!(ix.get(&20), None);
    assert_eq!(ix.len(), 7);

    for k in [5u64, 6, 7, 10, 12, 17, 30] {
        assert_eq!(ix.del(&k), Some(k));
        ix.check();
    }
    assert_eq!(ix.len(), 0);
    assert_eq!(ix.node_count(), 1);
    assert!(ix.iter().next().is_none());
}

#[test]
fn idempotent_put_test() {
    let mut ix = small_index();
    for k in 0..100u64 {
        let (_, inserted) = ix.put(k).unwrap();
        assert!(inserted);
    }
    for k in 0..100u64 {
        let (stored, inserted) = ix.put(k).unwrap();
        assert!(!inserted);
        assert_eq!(*stored, k);
    }
    assert_eq!(ix.len(), 100);
    ix.check();
}

#[derive(Debug, Clone, Copy)]
struct Rec {
    id: u32,
    hits: u32,
}

#[derive(Default)]
struct ById;
impl Comparator<Rec> for ById {
    fn cmp(&self, a: &Rec, b: &Rec) -> Ordering {
        a.id.cmp(&b.id)
    }
}

#[test]
fn payload_update_test() {
    let mut ix = BTreeIndex::with_comparator(ById).unwrap();
    for id in 0..100u32 {
        ix.put(Rec { id, hits: 0 }).unwrap();
    }
    let (r, inserted) = ix.put(Rec { id: 40, hits: 0 }).unwrap();
    assert!(!inserted);
    r.hits += 1;
    assert_eq!(ix.len(), 100);
    assert_eq!(ix.get(&Rec { id: 40, hits: 0 }).unwrap().hits, 1);
    let r = ix.get_mut(&Rec { id: 40, hits: 0 }).unwrap();
    r.hits += 1;
    assert_eq!(ix.get(&Rec { id: 40, hits: 0 }).unwrap().hits, 2);
    ix.check();
}

#[derive(Default)]
struct Backwards;
impl Comparator<u64> for Backwards {
    fn cmp(&self, a: &u64, b: &u64) -> Ordering {
        b.cmp(a)
    }
}

#[test]
fn reverse_comparator_test() {
    let mut ix = BTreeIndex::with_comparator(Backwards).unwrap();
    for k in 0..1000u64 {
        ix.put(k).unwrap();
    }
    ix.check();
    let keys: Vec<u64> = ix.iter().copied().collect();
    let expect: Vec<u64> = (0..1000).rev().collect();
    assert_eq!(keys, expect);
}

#[test]
fn bulk_insert_delete_test() {
    let n = 10_000u64;
    for small in [true, false] {
        let mut ix = if small {
            small_index()
        } else {
            BTreeIndex::new().unwrap()
        };
        for k in 0..n {
            ix.put(k).unwrap();
        }
        ix.check();
        assert_eq!(ix.len() as u64, n);
        for k in 0..n {
            assert_eq!(ix.get(&k), Some(&k));
        }
        for k in 0..n {
            assert_eq!(ix.del(&k), Some(k));
        }
        ix.check();
        assert_eq!(ix.len(), 0);
        assert_eq!(ix.node_count(), 1);

        for k in (0..n).rev() {
            ix.put(k).unwrap();
        }
        ix.check();
        for k in (0..n).rev() {
            assert_eq!(ix.del(&k), Some(k));
        }
        ix.check();
        assert_eq!(ix.len(), 0);
        assert_eq!(ix.node_count(), 1);
    }
}

#[test]
fn random_ops_vs_std_test() {
    for seed in 0..4u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ix = small_index();
        let mut set = std::collections::BTreeSet::new();
        for op in 0..20_000 {
            let k = rng.gen_range(0..500u64);
            if rng.gen_bool(0.5) {
                let (_, inserted) = ix.put(k).unwrap();
                assert_eq!(inserted, set.insert(k));
            } else {
                assert_eq!(ix.del(&k), set.take(&k));
            }
            assert_eq!(ix.len(), set.len());
            if op % 1000 == 0 {
                ix.check();
                assert!(ix.iter().copied().eq(set.iter().copied()));
            }
        }
        ix.check();
        assert!(ix.iter().copied().eq(set.iter().copied()));
    }
}

#[test]
fn lower_bound_test() {
    let mut ix = small_index();
    for k in (0..100u64).map(|x| x * 2) {
        ix.put(k).unwrap();
    }
    let got: Vec<u64> = ix.lower_bound(&31).copied().collect();
    let expect: Vec<u64> = (16..100u64).map(|x| x * 2).collect();
    assert_eq!(got, expect);
    assert_eq!(ix.lower_bound(&0).next(), Some(&0));
    assert_eq!(ix.lower_bound(&198).next(), Some(&198));
    assert_eq!(ix.lower_bound(&199).next(), None);
    for k in (0..100u64).map(|x| x * 2) {
        assert_eq!(ix.lower_bound(&k).next(), Some(&k));
    }
}

#[test]
fn interval_test() {
    let mut ix = small_index();
    for k in [10u64, 20, 30, 40, 50] {
        ix.put(k).unwrap();
    }
    assert_eq!(ix.interval(&30), (Some(&30), Some(&30)));
    assert_eq!(ix.interval(&35), (Some(&30), Some(&40)));
    assert_eq!(ix.interval(&5), (None, Some(&10)));
    assert_eq!(ix.interval(&55), (Some(&50), None));

    let empty: BTreeIndex<u64> = BTreeIndex::new().unwrap();
    assert_eq!(empty.interval(&1), (None, None));

    let mut ix = small_index();
    for k in 0..500u64 {
        ix.put(k * 2).unwrap();
    }
    for k in 0..499u64 {
        let (lo, hi) = (k * 2, k * 2 + 2);
        assert_eq!(ix.interval(&(k * 2 + 1)), (Some(&lo), Some(&hi)));
        assert_eq!(ix.interval(&lo), (Some(&lo), Some(&lo)));
    }
}

#[test]
fn del_absent_test() {
    let mut ix = small_index();
    for k in 0..100u64 {
        ix.put(k * 2).unwrap();
    }
    assert_eq!(ix.del(&101), None);
    assert_eq!(ix.len(), 100);
    ix.check();
}

#[test]
fn construction_error_test() {
    let r = BTreeIndex::<u64>::with_node_size(16);
    assert!(matches!(r, Err(Error::NodeSizeTooSmall { .. })));
    assert!(BTreeIndex::<[u8; 64]>::with_node_size(DEFAULT_NODE_SIZE).is_ok());
    assert!(BTreeIndex::<[u8; 1024]>::new().is_err());
}

#[test]
fn string_keys_test() {
    let mut ix = BTreeIndex::new().unwrap();
    for i in 0..1000 {
        ix.put(format!("key-{i:04}")).unwrap();
    }
    ix.check();
    assert_eq!(ix.len(), 1000);
    assert_eq!(ix.get(&"key-0500".to_string()), Some(&"key-0500".to_string()));
    for i in (0..1000).step_by(2) {
        assert!(ix.del(&format!("key-{i:04}")).is_some());
    }
    ix.check();
    assert_eq!(ix.len(), 500);
    let mut prev = None;
    for k in &ix {
        if let Some(p) = prev {
            assert!(p < k);
        }
        prev = Some(k);
    }
}

#[test]
fn empty_index_test() {
    let mut ix: BTreeIndex<u64> = BTreeIndex::new().unwrap();
    assert!(ix.is_empty());
    assert_eq!(ix.get(&1), None);
    assert_eq!(ix.del(&1), None);
    assert!(ix.iter().next().is_none());
    assert!(ix.lower_bound(&1).next().is_none());
    assert_eq!(ix.node_count(), 1);
    ix.check();
}

#[test]
fn eq_debug_test() {
    let mut a = small_index();
    let mut b = BTreeIndex::new().unwrap();
    for k in [3u64, 1, 2] {
        a.put(k).unwrap();
        b.put(k).unwrap();
    }
    assert_eq!(a, b);
    assert_eq!(format!("{a:?}"), "{1, 2, 3}");
    b.del(&2);
    assert!(a != b);
}

#[cfg(feature = "serde")]
#[test]
fn serde_test() {
    let mut ix = BTreeIndex::new().unwrap();
    for k in [5u64, 1, 9, 3] {
        ix.put(k).unwrap();
    }
    let s = serde_json::to_string(&ix).unwrap();
    assert_eq!(s, "[1,3,5,9]");
    let back: BTreeIndex<u64> = serde_json::from_str(&s).unwrap();
    assert_eq!(back, ix);
}
