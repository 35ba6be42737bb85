use pretty_assertions::assert_eq;
use proptest::prelude::*;
use statebridge_sync::{DirtySet, NestedDirtySet};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn marking_is_idempotent() {
    let set = DirtySet::new();
    assert!(set.mark(7));
    assert!(!set.mark(7));
    assert_eq!(set.len(), 1);
    assert_eq!(set.mark_all([7, 8, 9]), 2);
    assert_eq!(set.ids(), vec![7, 8, 9]);
}

#[test]
fn take_clears_exactly_one_id() {
    let set = DirtySet::new();
    set.mark_all(["a", "b"]);
    assert!(set.take(&"a"));
    assert!(!set.take(&"a"));
    assert!(set.is_dirty(&"b"));
    assert_eq!(set.drain(), vec!["b"]);
    assert!(set.is_empty());
}

#[test]
fn nested_tracks_children_per_parent() {
    let set = NestedDirtySet::new();
    assert!(set.mark(1, 10));
    assert!(!set.mark(1, 10));
    set.mark(1, 11);
    set.mark_parent(2);
    set.mark_all(3, [30, 31]);

    assert_eq!(set.len(), 3);
    assert_eq!(set.child_count(), 4);
    assert!(set.is_child_dirty(&1, &11));
    assert!(set.is_dirty(&2));
    assert!(!set.is_child_dirty(&2, &20));

    assert_eq!(set.take(&1), Some(vec![10, 11]));
    assert_eq!(set.take(&1), None);
    assert_eq!(set.take(&2), Some(vec![]));
    assert_eq!(set.drain(), vec![(3, vec![30, 31])]);
    assert!(set.is_empty());
}

#[test]
fn racing_take_and_drain_flush_each_id_once() {
    for _ in 0..50 {
        let set = DirtySet::new();
        set.mark_all(0u32..256);
        let (taken, drained) = thread::scope(|s| {
            let taker = s.spawn(|| (0u32..256).filter(|id| set.take(id)).count());
            let drainer = s.spawn(|| (0..8).map(|_| set.drain().len()).sum::<usize>());
            (taker.join().unwrap(), drainer.join().unwrap())
        });
        assert_eq!(taken + drained, 256);
        assert!(set.is_empty());
    }
}

#[test]
fn racing_mark_and_drain_lose_nothing() {
    let set = DirtySet::new();
    let done = AtomicBool::new(false);
    let mut flushed = thread::scope(|s| {
        s.spawn(|| {
            for id in 0u32..2_000 {
                set.mark(id);
            }
            done.store(true, Ordering::SeqCst);
        });
        let drainer = s.spawn(|| {
            let mut seen = Vec::new();
            while !done.load(Ordering::SeqCst) {
                seen.extend(set.drain());
            }
            seen
        });
        drainer.join().unwrap()
    });
    flushed.extend(set.drain());

    let unique: BTreeSet<u32> = flushed.iter().copied().collect();
    assert_eq!(unique.len(), flushed.len());
    assert_eq!(unique, (0u32..2_000).collect());
}

#[test]
fn racing_nested_take_and_drain_see_each_parent_once() {
    for _ in 0..50 {
        let set = NestedDirtySet::new();
        for parent in 0u32..64 {
            set.mark_all(parent, [parent * 10, parent * 10 + 1]);
        }
        let (taken, drained) = thread::scope(|s| {
            let taker = s.spawn(|| {
                (0u32..64)
                    .filter_map(|parent| set.take(&parent))
                    .map(|children| children.len())
                    .sum::<usize>()
            });
            let drainer = s.spawn(|| {
                set.drain()
                    .into_iter()
                    .map(|(_, children)| children.len())
                    .sum::<usize>()
            });
            (taker.join().unwrap(), drainer.join().unwrap())
        });
        assert_eq!(taken + drained, 128);
        assert!(set.is_empty());
    }
}

proptest! {
    #[test]
    fn drain_yields_each_marked_id_once(ids in prop::collection::vec(0u16..64, 0..200)) {
        let set = DirtySet::new();
        for id in &ids {
            set.mark(*id);
        }
        let expected: Vec<u16> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(set.len(), expected.len());
        prop_assert_eq!(set.drain(), expected);
        prop_assert!(set.drain().is_empty());
    }

    #[test]
    fn take_and_drain_partition_the_set(
        ids in prop::collection::btree_set(0u16..64, 0..40),
        taken in prop::collection::btree_set(0u16..64, 0..40),
    ) {
        let set = DirtySet::new();
        set.mark_all(ids.iter().copied());
        let mut flushed = 0;
        for id in &taken {
            if set.take(id) {
                flushed += 1;
            }
        }
        flushed += set.drain().len();
        prop_assert_eq!(flushed, ids.len());
    }
}
