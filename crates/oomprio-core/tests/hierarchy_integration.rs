// Integration tests for OomHierarchy
// Exercise the public control surface end to end

use oomprio_core::{Error, NodeId, OomHierarchy, Propagation, DEFAULT_PRIORITY};

fn effective(h: &OomHierarchy, id: NodeId) -> i64 {
    h.read_effective(id).unwrap()
}

/// Root R with child A and grandchild B, all at the default priority
fn chain() -> (OomHierarchy, NodeId, NodeId, NodeId) {
    let h = OomHierarchy::new();
    let r = h.on_group_created(None).unwrap();
    let a = h.on_group_created(Some(r)).unwrap();
    let b = h.on_group_created(Some(a)).unwrap();
    (h, r, a, b)
}

/// Small deterministic generator so failures reproduce
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }

    fn priority(&mut self) -> i64 {
        (self.next() % 41) as i64 - 20
    }
}

#[test]
fn test_new_groups_start_from_parent() {
    let (h, r, a, b) = chain();

    assert_eq!(h.read_priority(r).unwrap(), DEFAULT_PRIORITY);
    assert_eq!(effective(&h, r), DEFAULT_PRIORITY);
    assert_eq!(h.read_priority(a).unwrap(), 1);
    assert_eq!(effective(&h, a), 1);
    assert_eq!(h.read_priority(b).unwrap(), 1);
    assert_eq!(effective(&h, b), 1);
}

#[test]
fn test_raise_middle_group() {
    let (h, r, a, b) = chain();

    h.write_priority(a, 5).unwrap();

    assert_eq!(effective(&h, a), 5);
    assert_eq!(effective(&h, b), 5);
    assert_eq!(effective(&h, r), 1);
}

#[test]
fn test_override_below_raised_group() {
    let (h, _, a, b) = chain();
    h.write_priority(a, 5).unwrap();

    h.write_priority(b, 8).unwrap();

    assert_eq!(effective(&h, b), 8);
    assert_eq!(effective(&h, a), 5);
}

#[test]
fn test_lowering_keeps_descendant_override() {
    let (h, _, a, b) = chain();
    h.write_priority(a, 5).unwrap();
    h.write_priority(b, 8).unwrap();

    let propagation = h.write_priority(a, 2).unwrap();

    assert_eq!(
        propagation,
        Propagation::Decreased {
            floor: 2,
            visited: 1
        }
    );
    assert_eq!(effective(&h, a), 2);
    assert_eq!(effective(&h, b), 8);
    assert!(h.check_invariant().is_empty());
}

#[test]
fn test_cpuset_constraint_on_root_only() {
    let (h, r, a, _) = chain();

    assert!(matches!(
        h.write_constraint(r, 2),
        Err(Error::InvalidArgument(_))
    ));
    assert!(!h.read_constraint());

    h.write_constraint(r, 1).unwrap();
    assert!(h.read_constraint());

    assert!(matches!(
        h.write_constraint(a, 1),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_destroyed_group_not_found() {
    let (h, _, a, b) = chain();
    h.write_priority(a, 5).unwrap();

    h.on_group_destroyed(b).unwrap();

    assert_eq!(h.write_priority(b, 3).unwrap_err(), Error::NotFound(b));
    assert_eq!(h.read_effective(b).unwrap_err(), Error::NotFound(b));
    // A still propagates fine with B gone
    assert_eq!(h.write_priority(a, 9).unwrap().visited(), 0);
}

#[test]
fn test_priority_round_trip() {
    let (h, r, a, b) = chain();
    for id in [r, a, b] {
        for value in [i64::MIN, -7, 0, 1, 42, i64::MAX] {
            h.write_priority(id, value).unwrap();
            assert_eq!(h.read_priority(id).unwrap(), value);
        }
    }
    assert!(h.check_invariant().is_empty());
}

#[test]
fn test_random_writes_keep_invariant() {
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);

    for _ in 0..20 {
        let h = OomHierarchy::new();
        let mut groups = vec![h.on_group_created(None).unwrap()];
        for _ in 0..40 {
            let parent = groups[rng.below(groups.len())];
            groups.push(h.on_group_created(Some(parent)).unwrap());
        }

        for _ in 0..200 {
            let id = groups[rng.below(groups.len())];
            let value = rng.priority();

            let before = h.snapshot();
            h.write_priority(id, value).unwrap();
            let after = h.snapshot();

            assert_eq!(h.read_priority(id).unwrap(), value);
            let violations = h.check_invariant();
            assert!(violations.is_empty(), "violations: {:?}", violations);

            // Monotonicity: a raise never lowers anything, a drop never
            // raises anything.
            let old = before.get(id).unwrap().priority;
            for (b, a) in before.groups.iter().zip(after.groups.iter()) {
                if value >= old {
                    assert!(a.effective_priority >= b.effective_priority);
                } else {
                    assert!(a.effective_priority <= b.effective_priority);
                }
            }
        }
    }
}

#[test]
fn test_group_limit_leaves_tree_unchanged() {
    let h = OomHierarchy::with_limit(3);
    let r = h.on_group_created(None).unwrap();
    let a = h.on_group_created(Some(r)).unwrap();
    h.on_group_created(Some(a)).unwrap();

    let err = h.on_group_created(Some(a)).unwrap_err();
    assert!(matches!(err, Error::AllocationFailure(_)));
    assert_eq!(h.snapshot().groups.len(), 3);
    assert_eq!(h.store().children_of(a).unwrap().len(), 1);
}

#[test]
fn test_snapshot_serializes() {
    let (h, _, a, _) = chain();
    h.write_priority(a, 4).unwrap();

    let json = serde_json::to_string(&h.snapshot()).unwrap();
    assert!(json.contains("\"effective_priority\":4"));
    assert!(json.contains("\"cpuset_constraint\":false"));
}
