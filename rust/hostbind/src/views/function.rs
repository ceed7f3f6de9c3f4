//! Functions: closures and primitives.

use super::pairlist::{IntoCell, Language};
use super::{owned, type_mismatch, type_of, Environment, Pairlist, View};
use crate::error::{BindError, BindResult};
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

#[derive(Clone, Debug)]
pub struct Function {
    guard: OwnershipGuard,
}

impl View for Function {
    const KIND: &'static str = "function";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        if type_of(x).is_function() {
            Ok(x)
        } else {
            Err(type_mismatch(Self::KIND, x))
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

impl Function {
    /// New closure over `env`.  Formals are a pairlist whose tags name the
    /// parameters and whose values are the defaults.
    pub fn closure(formals: &Pairlist, body: Sexp, env: &Environment) -> Self {
        let (formals, env) = (formals.sexp(), env.sexp());
        Self::from_guard(owned(with_host(|h| h.mk_closure(formals, body, env))))
    }

    pub fn is_closure(&self) -> bool {
        self.sexp_type() == SexpType::Closure
    }

    fn require_closure(&self) -> BindResult<Sexp> {
        if self.is_closure() {
            Ok(self.sexp())
        } else {
            Err(BindError::NotAClosure)
        }
    }

    /// The defining environment.  Primitives have none.
    pub fn environment(&self) -> BindResult<Environment> {
        let fun = self.require_closure()?;
        Environment::from_sexp(with_host(|h| h.closure_env(fun)))
    }

    pub fn formals(&self) -> BindResult<Sexp> {
        let fun = self.require_closure()?;
        Ok(with_host(|h| h.closure_formals(fun)))
    }

    pub fn body(&self) -> BindResult<Sexp> {
        let fun = self.require_closure()?;
        Ok(with_host(|h| h.closure_body(fun)))
    }

    /// Call with `args` in the global environment.
    pub fn call<A: IntoCell>(&self, args: impl IntoIterator<Item = A>) -> BindResult<Sexp> {
        self.build_call(args).eval()
    }

    pub fn call_in<A: IntoCell>(
        &self,
        env: &Environment,
        args: impl IntoIterator<Item = A>,
    ) -> BindResult<Sexp> {
        self.build_call(args).eval_in(env.sexp())
    }

    fn build_call<A: IntoCell>(&self, args: impl IntoIterator<Item = A>) -> Language {
        let mut call = Language::from_function(self.sexp());
        for arg in args {
            call.push_back(arg);
        }
        call
    }
}
