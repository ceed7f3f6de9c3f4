//! Ownership guard: a handle plus at most one pin on it.

use crate::gc::Sexp;
use crate::host::{release_or_defer, with_host};

/// When a guard pins its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinPolicy {
    /// Pin only on explicit `preserve`.  Used for views over values owned
    /// elsewhere.
    Manual,
    /// Pin on construction and after every reassignment.  Used when the
    /// view allocated the value itself.
    Always,
}

/// Holds a host handle and releases its pin exactly once.
///
/// Pinning is idempotent per guard: `preserve` twice takes one pin, and
/// `release` gives back only what this guard took.  Clones take their own
/// pin, so the host's precious multiset stays balanced however many
/// copies are dropped.
#[derive(Debug)]
pub struct OwnershipGuard {
    sexp: Sexp,
    preserved: bool,
    policy: PinPolicy,
}

impl OwnershipGuard {
    pub fn new(sexp: Sexp) -> Self {
        Self {
            sexp,
            preserved: false,
            policy: PinPolicy::Manual,
        }
    }

    /// Guard that pins immediately and keeps pinning on reassignment.
    pub fn pinned(sexp: Sexp) -> Self {
        let mut guard = Self {
            sexp,
            preserved: false,
            policy: PinPolicy::Always,
        };
        guard.preserve();
        guard
    }

    pub fn with_policy(sexp: Sexp, policy: PinPolicy) -> Self {
        match policy {
            PinPolicy::Manual => Self::new(sexp),
            PinPolicy::Always => Self::pinned(sexp),
        }
    }

    pub fn sexp(&self) -> Sexp {
        self.sexp
    }

    pub fn is_preserved(&self) -> bool {
        self.preserved
    }

    pub fn policy(&self) -> PinPolicy {
        self.policy
    }

    pub fn preserve(&mut self) {
        if !self.preserved {
            let x = self.sexp;
            with_host(|h| h.preserve(x));
            self.preserved = true;
        }
    }

    pub fn release(&mut self) {
        if self.preserved {
            release_or_defer(self.sexp);
            self.preserved = false;
        }
    }

    /// Point the guard at `new`.  Returns false (and does nothing) when the
    /// handle is unchanged.
    pub fn reassign(&mut self, new: Sexp) -> bool {
        if new == self.sexp {
            return false;
        }
        self.release();
        self.sexp = new;
        if self.policy == PinPolicy::Always {
            self.preserve();
        }
        true
    }

    /// Drop responsibility for the pin without releasing it.
    pub fn forget(&mut self) {
        self.preserved = false;
    }
}

impl Clone for OwnershipGuard {
    fn clone(&self) -> Self {
        let mut copy = Self {
            sexp: self.sexp,
            preserved: false,
            policy: self.policy,
        };
        if self.preserved {
            copy.preserve();
        }
        copy
    }
}

impl Drop for OwnershipGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::SexpType;
    use crate::test_support::PROP_CASES;
    use proptest::prelude::*;

    fn fresh() -> Sexp {
        with_host(|h| h.alloc_vector(SexpType::Integer, 1))
    }

    fn pins(x: Sexp) -> usize {
        with_host(|h| h.preserve_count(x))
    }

    #[test]
    fn preserve_and_release_are_idempotent() {
        let x = fresh();
        let mut g = OwnershipGuard::new(x);
        g.preserve();
        g.preserve();
        assert_eq!(pins(x), 1);
        g.release();
        g.release();
        assert_eq!(pins(x), 0);
    }

    #[test]
    fn drop_releases() {
        let x = fresh();
        {
            let _g = OwnershipGuard::pinned(x);
            assert_eq!(pins(x), 1);
        }
        assert_eq!(pins(x), 0);
    }

    #[test]
    fn clone_takes_its_own_pin() {
        let x = fresh();
        let g = OwnershipGuard::pinned(x);
        let c = g.clone();
        assert_eq!(pins(x), 2);
        drop(g);
        assert_eq!(pins(x), 1);
        drop(c);
        assert_eq!(pins(x), 0);
    }

    #[test]
    fn reassign_same_handle_is_noop() {
        let x = fresh();
        let mut g = OwnershipGuard::pinned(x);
        assert!(!g.reassign(x));
        assert_eq!(pins(x), 1);
    }

    #[test]
    fn reassign_moves_pin_under_always() {
        let (x, y) = (fresh(), fresh());
        let mut g = OwnershipGuard::pinned(x);
        assert!(g.reassign(y));
        assert_eq!((pins(x), pins(y)), (0, 1));

        let mut m = OwnershipGuard::new(x);
        m.preserve();
        assert!(m.reassign(y));
        assert_eq!(pins(x), 0);
        assert!(!m.is_preserved(), "manual guards do not re-pin");
    }

    #[test]
    fn forget_leaves_pin_in_place() {
        let x = fresh();
        let mut g = OwnershipGuard::pinned(x);
        g.forget();
        drop(g);
        assert_eq!(pins(x), 1);
        with_host(|h| h.release(x));
    }

    const TARGETS: usize = 3;

    #[derive(Clone, Debug)]
    enum PinOp {
        Preserve(usize),
        Release(usize),
        Clone(usize),
        Pinned(usize),
        Drop(usize),
        Reassign(usize, usize),
        Forget(usize),
    }

    fn pin_op() -> impl Strategy<Value = PinOp> {
        prop_oneof![
            any::<usize>().prop_map(PinOp::Preserve),
            any::<usize>().prop_map(PinOp::Release),
            any::<usize>().prop_map(PinOp::Clone),
            (0..TARGETS).prop_map(PinOp::Pinned),
            any::<usize>().prop_map(PinOp::Drop),
            (any::<usize>(), 0..TARGETS).prop_map(|(g, t)| PinOp::Reassign(g, t)),
            any::<usize>().prop_map(PinOp::Forget),
        ]
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(PROP_CASES))]

        /// Any interleaving of guard operations keeps each handle's pin
        /// count equal to the guards holding it plus the pins handed off by
        /// `forget`, and leaves only the forgotten pins once the guards
        /// are gone.
        #[test]
        fn pins_balance(ops in proptest::collection::vec(pin_op(), 0..40)) {
            crate::test_support::init_tracing();
            let targets: Vec<Sexp> = (0..TARGETS).map(|_| fresh()).collect();
            let before = with_host(|h| h.heap_stats().preserved_total);
            let mut forgotten = [0usize; TARGETS];
            {
                let mut guards = vec![OwnershipGuard::new(targets[0])];
                for op in ops {
                    let n = guards.len();
                    match op {
                        PinOp::Preserve(g) => guards[g % n].preserve(),
                        PinOp::Release(g) => guards[g % n].release(),
                        PinOp::Clone(g) => {
                            let c = guards[g % n].clone();
                            guards.push(c);
                        }
                        PinOp::Pinned(t) => guards.push(OwnershipGuard::pinned(targets[t])),
                        PinOp::Drop(g) => {
                            if n > 1 {
                                guards.remove(g % n);
                            }
                        }
                        PinOp::Reassign(g, t) => {
                            guards[g % n].reassign(targets[t]);
                        }
                        PinOp::Forget(g) => {
                            let g = g % n;
                            if guards[g].is_preserved() {
                                let t = targets.iter().position(|&x| x == guards[g].sexp());
                                forgotten[t.unwrap()] += 1;
                            }
                            guards[g].forget();
                        }
                    }
                    for (t, &x) in targets.iter().enumerate() {
                        let held = guards
                            .iter()
                            .filter(|g| g.sexp() == x && g.is_preserved())
                            .count();
                        prop_assert_eq!(pins(x), held + forgotten[t]);
                    }
                }
            }
            let outstanding: usize = forgotten.iter().sum();
            prop_assert_eq!(
                with_host(|h| h.heap_stats().preserved_total),
                before + outstanding
            );
            for (t, &x) in targets.iter().enumerate() {
                prop_assert_eq!(pins(x), forgotten[t]);
                for _ in 0..forgotten[t] {
                    with_host(|h| h.release(x));
                }
            }
            prop_assert_eq!(with_host(|h| h.heap_stats().preserved_total), before);
        }
    }
}
