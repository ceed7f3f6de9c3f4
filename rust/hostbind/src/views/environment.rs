//! Environments and their bindings.

use tracing::debug;

use super::{coerce_via, owned, type_of, View};
use crate::convert::{wrap, FromHost, IntoHost};
use crate::error::{BindError, BindResult};
use crate::evaluator::{self, condition_message};
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

/// View over an environment.
///
/// A name moves through `unbound -> bound`, and a bound name is either
/// locked or not and either active (backed by a function) or passive.
#[derive(Clone, Debug)]
pub struct Environment {
    guard: OwnershipGuard,
}

impl View for Environment {
    const KIND: &'static str = "environment";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::Environment => Ok(x),
            _ => coerce_via("as.environment", Self::KIND, x),
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

impl Environment {
    fn singleton(x: Sexp) -> Self {
        Self::from_guard(OwnershipGuard::new(x))
    }

    pub fn global_env() -> Self {
        Self::singleton(with_host(|h| h.global_env()))
    }

    /// The root scope: no bindings, no parent.
    pub fn empty_env() -> Self {
        Self::singleton(with_host(|h| h.empty_env()))
    }

    pub fn base_env() -> Self {
        Self::singleton(with_host(|h| h.base_env()))
    }

    pub fn base_namespace() -> Self {
        Self::singleton(with_host(|h| h.base_namespace()))
    }

    pub fn namespace_env(package: &str) -> BindResult<Self> {
        with_host(|h| h.find_namespace(package))
            .map(Self::singleton)
            .ok_or_else(|| BindError::NoSuchNamespace(package.to_owned()))
    }

    /// Look an environment up by its search-path name, e.g. `".GlobalEnv"`
    /// or `"package:base"`.
    pub fn from_name(name: &str) -> BindResult<Self> {
        if name == ".GlobalEnv" {
            return Ok(Self::global_env());
        }
        Self::lookup(wrap(name)).map_err(|_| BindError::NoSuchEnvironment(name.to_owned()))
    }

    /// Environment at `pos` on the search path, 1 being the global
    /// environment.  `-1` is the environment the lookup runs in.
    pub fn from_position(pos: i32) -> BindResult<Self> {
        Self::lookup(wrap(pos)).map_err(|_| BindError::NoSuchEnvironment(pos.to_string()))
    }

    fn lookup(key: Sexp) -> BindResult<Self> {
        let env = coerce_via("as.environment", Self::KIND, key)?;
        Ok(Self::singleton(env))
    }

    /// Fresh environment enclosed by this one.
    pub fn new_child(&self) -> Self {
        let parent = self.sexp();
        Self::from_guard(owned(with_host(|h| h.new_env(parent))))
    }

    /// The enclosing environment; `None` for the empty root.
    pub fn parent(&self) -> Option<Self> {
        let env = self.sexp();
        let parent = with_host(|h| {
            let p = h.enclos(env);
            (p != h.nil()).then_some(p)
        });
        parent.map(Self::singleton)
    }

    /// Binding names in this frame, sorted.
    pub fn ls(&self, all: bool) -> Vec<String> {
        let env = self.sexp();
        with_host(|h| h.ls(env, all))
    }

    pub fn exists(&self, name: &str) -> bool {
        let env = self.sexp();
        with_host(|h| h.exists_in_frame(env, name))
    }

    /// Value bound to `name` in this frame, or the unbound sentinel.
    /// Promises are forced, active bindings are called.
    pub fn get(&self, name: &str) -> BindResult<Sexp> {
        let env = self.sexp();
        let found = with_host(|h| match h.find_var_in_frame(env, name) {
            Ok(v) => Ok((v, h.type_of(v) == SexpType::Promise)),
            Err(cond) => Err(condition_message(h, cond).unwrap_or_default()),
        });
        match found {
            Ok((promise, true)) => evaluator::eval_in(promise, env),
            Ok((value, false)) => Ok(value),
            Err(message) => Err(BindError::Evaluation(message)),
        }
    }

    pub fn get_as<T: FromHost>(&self, name: &str) -> BindResult<T> {
        T::from_host(self.get(name)?)
    }

    /// Bind `name`.  Returns false when the host refuses, e.g. a new name
    /// in a locked environment.
    pub fn assign(&self, name: &str, value: impl IntoHost) -> BindResult<bool> {
        let env = self.sexp();
        if with_host(|h| h.binding_is_locked(env, name)) {
            return Err(BindError::BindingLocked(name.to_owned()));
        }
        let value = value.into_host();
        Ok(with_host(|h| h.define_var(env, name, value)))
    }

    pub fn remove(&self, name: &str) -> BindResult<()> {
        let env = self.sexp();
        self.require(name)?;
        if with_host(|h| h.binding_is_locked(env, name)) {
            return Err(BindError::BindingLocked(name.to_owned()));
        }
        if with_host(|h| h.remove_var(env, name)) {
            Ok(())
        } else {
            debug!(name, "remove refused by locked environment");
            Err(BindError::Evaluation(
                "cannot remove bindings from a locked environment".to_owned(),
            ))
        }
    }

    /// Lock the frame; with `bindings`, every existing binding too.
    pub fn lock(&self, bindings: bool) {
        let env = self.sexp();
        with_host(|h| h.lock_environment(env, bindings));
    }

    pub fn unlock(&self) {
        let env = self.sexp();
        with_host(|h| h.unlock_environment(env));
    }

    pub fn is_locked(&self) -> bool {
        let env = self.sexp();
        with_host(|h| h.environment_is_locked(env))
    }

    fn require(&self, name: &str) -> BindResult<()> {
        if self.exists(name) {
            Ok(())
        } else {
            Err(BindError::NoSuchBinding(name.to_owned()))
        }
    }

    pub fn lock_binding(&self, name: &str) -> BindResult<()> {
        self.require(name)?;
        let env = self.sexp();
        with_host(|h| h.lock_binding(env, name));
        Ok(())
    }

    pub fn unlock_binding(&self, name: &str) -> BindResult<()> {
        self.require(name)?;
        let env = self.sexp();
        with_host(|h| h.unlock_binding(env, name));
        Ok(())
    }

    pub fn binding_is_locked(&self, name: &str) -> BindResult<bool> {
        self.require(name)?;
        let env = self.sexp();
        Ok(with_host(|h| h.binding_is_locked(env, name)))
    }

    pub fn binding_is_active(&self, name: &str) -> BindResult<bool> {
        self.require(name)?;
        let env = self.sexp();
        Ok(with_host(|h| h.binding_is_active(env, name)))
    }

    /// Bind `name` to a function called on every read (no arguments) and
    /// write (the new value).
    pub fn make_active_binding(&self, name: &str, fun: Sexp) -> BindResult<()> {
        if !with_host(|h| h.type_of(fun).is_function()) {
            return Err(BindError::TypeMismatch {
                expected: "function",
                found: type_of(fun),
            });
        }
        let env = self.sexp();
        if with_host(|h| h.make_active_binding(env, name, fun)) {
            Ok(())
        } else {
            Err(BindError::BindingLocked(name.to_owned()))
        }
    }

    pub fn binding(&self, name: &str) -> BindingProxy<'_> {
        BindingProxy {
            env: self,
            name: name.to_owned(),
        }
    }
}

/// A named binding in an environment.  Reads and writes go through the
/// environment every time; the proxy caches nothing.
#[derive(Debug)]
pub struct BindingProxy<'a> {
    env: &'a Environment,
    name: String,
}

impl BindingProxy<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.env.exists(&self.name)
    }

    pub fn get(&self) -> BindResult<Sexp> {
        self.env.get(&self.name)
    }

    pub fn convert<T: FromHost>(&self) -> BindResult<T> {
        self.env.get_as(&self.name)
    }

    pub fn set(&self, value: impl IntoHost) -> BindResult<bool> {
        self.env.assign(&self.name, value)
    }

    /// Assign the current value of another binding.
    pub fn set_from(&self, other: &BindingProxy<'_>) -> BindResult<bool> {
        let value = other.get()?;
        self.set(value)
    }

    pub fn is_locked(&self) -> BindResult<bool> {
        self.env.binding_is_locked(&self.name)
    }

    pub fn is_active(&self) -> BindResult<bool> {
        self.env.binding_is_active(&self.name)
    }

    pub fn lock(&self) -> BindResult<()> {
        self.env.lock_binding(&self.name)
    }

    pub fn unlock(&self) -> BindResult<()> {
        self.env.unlock_binding(&self.name)
    }
}
