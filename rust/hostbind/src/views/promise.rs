//! Promises: delayed expressions with a memoized value.

use super::{type_mismatch, type_of, Environment, ExpressionVector, View};
use crate::error::{BindError, BindResult};
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

#[derive(Clone, Debug)]
pub struct Promise {
    guard: OwnershipGuard,
}

impl View for Promise {
    const KIND: &'static str = "promise";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::Promise => Ok(x),
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

impl Promise {
    pub fn was_evaluated(&self) -> bool {
        let p = self.sexp();
        with_host(|h| h.promise_value(p)).is_some()
    }

    /// The forced value.
    pub fn value(&self) -> BindResult<Sexp> {
        let p = self.sexp();
        with_host(|h| h.promise_value(p)).ok_or(BindError::UnevaluatedPromise)
    }

    /// True while the promise is being forced.
    pub fn seen(&self) -> bool {
        let p = self.sexp();
        with_host(|h| h.promise_seen(p))
    }

    pub fn environment(&self) -> BindResult<Environment> {
        let p = self.sexp();
        Environment::from_sexp(with_host(|h| h.promise_env(p)))
    }

    /// The delayed code, unconverted.
    pub fn code(&self) -> Sexp {
        let p = self.sexp();
        with_host(|h| h.promise_code(p))
    }

    /// The delayed code as an expression vector.
    pub fn expression(&self) -> BindResult<ExpressionVector> {
        ExpressionVector::from_sexp(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{as_value, wrap};
    use crate::test_support::call;

    fn delayed(code: Sexp) -> Promise {
        let p = with_host(|h| {
            let env = h.global_env();
            h.mk_promise(code, env)
        });
        Promise::from_guard(OwnershipGuard::pinned(p))
    }

    #[test]
    fn value_requires_forcing() {
        let code = call("*", &[wrap(6), wrap(7)]);
        let p = delayed(code);
        assert!(!p.was_evaluated());
        assert!(!p.seen());
        assert_eq!(p.value(), Err(BindError::UnevaluatedPromise));

        let env = Environment::global_env().new_child();
        env.assign("p", p.sexp()).unwrap();
        assert_eq!(env.get_as::<i32>("p"), Ok(42));
        assert!(p.was_evaluated());
        assert_eq!(p.value().and_then(as_value::<i32>), Ok(42));
    }

    #[test]
    fn expression_and_environment() {
        let code = call("identity", &[wrap(1)]);
        let p = delayed(code);
        let e = p.expression().unwrap();
        assert_eq!(e.length(), 1);
        assert_eq!(e.get(0), Ok(code));
        assert_eq!(p.code(), code);
        assert_eq!(
            p.environment().unwrap().sexp(),
            Environment::global_env().sexp()
        );
    }

    #[test]
    fn only_promises_are_accepted() {
        assert!(matches!(
            Promise::from_sexp(wrap(1)),
            Err(BindError::TypeMismatch { expected: "promise", .. })
        ));
    }
}
