//! Weak references.

use super::{owned, type_mismatch, type_of, View};
use crate::error::BindResult;
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

/// A key/value pair that does not keep its key alive.  Once the key is
/// collected both fields read as `NULL`.
#[derive(Clone, Debug)]
pub struct WeakReference {
    guard: OwnershipGuard,
}

impl View for WeakReference {
    const KIND: &'static str = "weakref";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::WeakRef => Ok(x),
            _ => Err(type_mismatch(Self::KIND, x)),
        }
    }

    fn from_guard(guard: OwnershipGuard) -> Self {
        Self { guard }
    }

    fn guard(&self) -> &OwnershipGuard {
        &self.guard
    }

    fn guard_mut(&mut self) -> &mut OwnershipGuard {
        &mut self.guard
    }
}

impl WeakReference {
    pub fn new(key: Sexp, value: Sexp) -> Self {
        Self::from_guard(owned(with_host(|h| h.mk_weakref(key, value))))
    }

    pub fn key(&self) -> Sexp {
        let w = self.sexp();
        with_host(|h| h.weakref_key(w))
    }

    pub fn value(&self) -> Sexp {
        let w = self.sexp();
        with_host(|h| h.weakref_value(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::wrap;
    use crate::guard::OwnershipGuard;
    use crate::test_support::nil;

    #[test]
    fn value_lives_as_long_as_key() {
        let key = OwnershipGuard::pinned(wrap(vec![1, 2]));
        let value = wrap("payload");
        let w = WeakReference::new(key.sexp(), value);
        with_host(|h| h.collect_garbage());
        assert_eq!(w.key(), key.sexp());
        assert_eq!(w.value(), value);

        drop(key);
        with_host(|h| h.collect_garbage());
        assert_eq!(w.key(), nil());
        assert_eq!(w.value(), nil());
    }

    #[test]
    fn only_weak_references_are_accepted() {
        assert!(WeakReference::from_sexp(wrap(1)).is_err());
    }
}
