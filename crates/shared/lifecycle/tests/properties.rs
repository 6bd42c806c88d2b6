use plm_domain::keys::{EntityKind, MasterKey, Version};
use plm_lifecycle::{LifecycleState, Master, NewMaster};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Checkout(usize),
    Checkin(usize),
    Undo(usize),
}

const ACTORS: [&str; 3] = ["alice", "bob", "carol"];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ACTORS.len()).prop_map(Op::Checkout),
        (0..ACTORS.len()).prop_map(Op::Checkin),
        (0..ACTORS.len()).prop_map(Op::Undo),
    ]
}

fn master() -> Master {
    let key = MasterKey::new("acme", "PROP", Version::first()).unwrap();
    Master::new(EntityKind::Document, key, NewMaster { title: "prop".into(), ..NewMaster::default() }, "alice", 0)
}

proptest! {
    #[test]
    fn lifecycle_invariants_hold(ops in proptest::collection::vec(op(), 0..64)) {
        let mut m = master();
        let mut now = 0;

        for op in ops {
            now += 1;
            let before = m.iteration_count();
            let holder_before = m.holder().map(str::to_owned);

            match op {
                Op::Checkout(i) => {
                    let result = m.checkout(ACTORS[i], now);
                    match &holder_before {
                        Some(h) if h != ACTORS[i] => prop_assert!(result.is_err()),
                        _ => prop_assert!(result.is_ok()),
                    }
                    prop_assert_eq!(m.iteration_count(), before);
                },
                Op::Checkin(i) => match m.checkin(ACTORS[i]) {
                    Ok(number) => {
                        prop_assert_eq!(holder_before.as_deref(), Some(ACTORS[i]));
                        prop_assert_eq!(m.iteration_count(), before + 1);
                        prop_assert_eq!(number, before + 1);
                    },
                    Err(_) => {
                        prop_assert_eq!(m.iteration_count(), before);
                        prop_assert_eq!(m.holder().map(str::to_owned), holder_before);
                    },
                },
                Op::Undo(i) => {
                    let result = m.undo_checkout(ACTORS[i]);
                    prop_assert_eq!(result.is_ok(), holder_before.as_deref() == Some(ACTORS[i]));
                    prop_assert_eq!(m.iteration_count(), before);
                },
            }

            // Iteration numbers stay contiguous from 1.
            for (index, iteration) in m.iterations.iter().enumerate() {
                prop_assert_eq!(iteration.number as usize, index + 1);
            }
            // The working copy is always the next number.
            if let Some(checkout) = &m.checkout {
                prop_assert_eq!(checkout.working.number, m.iteration_count() + 1);
                prop_assert_eq!(m.state(), LifecycleState::CheckedOut);
            } else {
                prop_assert_eq!(m.state(), LifecycleState::Released);
            }
        }
    }

    #[test]
    fn saving_tags_twice_is_idempotent(labels in proptest::collection::vec("[ a-z]{0,6}", 0..12)) {
        let mut m = master();
        let first = m.save_tags(&labels).clone();
        let second = m.save_tags(&labels).clone();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.iter().all(|t| !t.is_empty() && t.trim() == t));
    }
}
