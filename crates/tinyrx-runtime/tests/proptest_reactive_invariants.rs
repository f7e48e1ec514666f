//! Property-based invariant tests for the reactive layer.
//!
//! 1. LazyList reads stay on the last applied snapshot until `apply()`
//! 2. `apply()` is idempotent
//! 3. A listener registered during dispatch first fires on the next pass
//! 4. ObservedList mutations match a Vec model and notify once per element
//! 5. Replacing by index fires remove before add
//! 6. ObservedDictionary rejects duplicate keys

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use tinyrx_core::ids::IdGenerator;
use tinyrx_runtime::{LazyList, Observed, ObservedDictionary, ObservedList};

// ── Helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ListOp {
    Add(u8),
    Insert(usize, u8),
    Remove(u8),
    Clear,
}

fn arb_list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        4 => any::<u8>().prop_map(ListOp::Add),
        2 => (0usize..20, any::<u8>()).prop_map(|(i, v)| ListOp::Insert(i, v)),
        3 => (0u8..8).prop_map(ListOp::Remove),
        1 => Just(ListOp::Clear),
    ]
}

fn apply_to_model(model: &mut Vec<u8>, op: &ListOp) {
    match *op {
        ListOp::Add(v) => model.push(v),
        ListOp::Insert(i, v) => model.insert(i.min(model.len()), v),
        ListOp::Remove(v) => {
            if let Some(pos) = model.iter().position(|x| *x == v) {
                model.remove(pos);
            }
        }
        ListOp::Clear => model.clear(),
    }
}

fn apply_to_lazy(list: &mut LazyList<u8>, op: &ListOp) {
    match *op {
        ListOp::Add(v) => list.add(v),
        ListOp::Insert(i, v) => list.insert(i, v),
        ListOp::Remove(v) => {
            list.remove(&v);
        }
        ListOp::Clear => list.clear(),
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. Deferred apply
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reads_lag_until_apply(
        seed in proptest::collection::vec(any::<u8>(), 0..10),
        ops in proptest::collection::vec(arb_list_op(), 0..40),
    ) {
        let mut list = LazyList::new();
        let mut model = Vec::new();
        for v in &seed {
            list.add(*v);
            model.push(*v);
        }
        list.apply();
        let before: Vec<u8> = list.iter().copied().collect();
        prop_assert_eq!(&before, &model);

        for op in &ops {
            apply_to_lazy(&mut list, op);
            apply_to_model(&mut model, op);
        }
        let unapplied: Vec<u8> = list.iter().copied().collect();
        prop_assert_eq!(unapplied, before);
        prop_assert_eq!(list.pending_len(), model.len());

        list.apply();
        let applied: Vec<u8> = list.iter().copied().collect();
        prop_assert_eq!(&applied, &model);
        prop_assert!(!list.is_dirty());
    }

    #[test]
    fn apply_is_idempotent(ops in proptest::collection::vec(arb_list_op(), 0..40)) {
        let mut list = LazyList::new();
        for op in &ops {
            apply_to_lazy(&mut list, op);
        }
        list.apply();
        let once: Vec<u8> = list.iter().copied().collect();
        list.apply();
        prop_assert!(!list.apply_if_dirty());
        let twice: Vec<u8> = list.iter().copied().collect();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn held_snapshot_survives_mutation(ops in proptest::collection::vec(arb_list_op(), 1..30)) {
        let mut list = LazyList::new();
        list.add(200u8);
        let held = list.prepare();
        for op in &ops {
            apply_to_lazy(&mut list, op);
            list.apply();
        }
        prop_assert_eq!(&*held, &[200u8][..]);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Registration during dispatch
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn listener_added_mid_dispatch_waits_for_next_pass(sets in 1usize..8) {
        let ids = IdGenerator::new();
        let value = Observed::new(&ids, 0usize);
        let late_calls = Rc::new(RefCell::new(Vec::new()));

        let registered = Rc::new(std::cell::Cell::new(false));
        let handle = value.clone();
        let late = Rc::clone(&late_calls);
        let flag = Rc::clone(&registered);
        value.add_value_listener(move |_| {
            if !flag.replace(true) {
                let late = Rc::clone(&late);
                handle.add_value_listener(move |v| late.borrow_mut().push(*v));
            }
        });

        for n in 1..=sets {
            value.set(n);
        }
        let expected: Vec<usize> = (2..=sets).collect();
        prop_assert_eq!(&*late_calls.borrow(), &expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4–5. ObservedList against a model
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn list_matches_model_and_counts_events(
        adds in proptest::collection::vec(0u8..6, 0..20),
        removes in proptest::collection::vec(0u8..6, 0..20),
    ) {
        let list = ObservedList::new();
        let added = Rc::new(RefCell::new(Vec::new()));
        let removed = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&added);
        list.on_add_value(move |v: &u8| a.borrow_mut().push(*v));
        let r = Rc::clone(&removed);
        list.on_remove_value(move |v: &u8| r.borrow_mut().push(*v));

        let mut model = Vec::new();
        for v in &adds {
            list.add(*v);
            model.push(*v);
        }
        let mut expected_removed = Vec::new();
        for v in &removes {
            let hit = list.remove(v);
            let pos = model.iter().position(|x| x == v);
            prop_assert_eq!(hit, pos.is_some());
            if let Some(pos) = pos {
                model.remove(pos);
                expected_removed.push(*v);
            }
        }

        prop_assert_eq!(list.to_vec(), model);
        prop_assert_eq!(&*added.borrow(), &adds);
        prop_assert_eq!(&*removed.borrow(), &expected_removed);
    }

    #[test]
    fn replace_fires_remove_then_add(
        items in proptest::collection::vec(any::<u16>(), 1..10),
        index in 0usize..10,
        replacement in any::<u16>(),
    ) {
        let list = ObservedList::from_vec(items.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        list.on_remove_value(move |v: &u16| l.borrow_mut().push(("remove", *v)));
        let l = Rc::clone(&log);
        list.on_add_value(move |v: &u16| l.borrow_mut().push(("add", *v)));

        let old = list.set(index, replacement);
        match items.get(index) {
            Some(prev) => {
                prop_assert_eq!(old, Some(*prev));
                prop_assert_eq!(
                    &*log.borrow(),
                    &vec![("remove", *prev), ("add", replacement)]
                );
                prop_assert_eq!(list.get(index), Some(replacement));
            }
            None => {
                prop_assert_eq!(old, None);
                prop_assert!(log.borrow().is_empty());
                prop_assert_eq!(list.to_vec(), items);
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Dictionary keys are unique
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dictionary_rejects_duplicate_keys(
        pairs in proptest::collection::vec((0u8..10, any::<u32>()), 0..30),
    ) {
        let dict = ObservedDictionary::new();
        let adds = Rc::new(std::cell::Cell::new(0usize));
        let a = Rc::clone(&adds);
        dict.on_add(move || a.set(a.get() + 1));

        let mut first = std::collections::HashMap::new();
        for (k, v) in &pairs {
            let fresh = !first.contains_key(k);
            prop_assert_eq!(dict.insert(*k, *v), fresh);
            first.entry(*k).or_insert(*v);
        }

        prop_assert_eq!(dict.len(), first.len());
        prop_assert_eq!(adds.get(), first.len());
        for (k, v) in &first {
            prop_assert_eq!(dict.get(k), Some(*v));
        }
    }
}
