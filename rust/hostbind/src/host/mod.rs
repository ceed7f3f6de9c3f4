//! Host service interface and thread-local access to the current host.
//!
//! Every view operation runs against the host installed on the current
//! thread.  Access goes through [`with_host`], which hands out `&mut dyn Host`
//! for the duration of a closure.  Do NOT call `with_host` from within that
//! closure: the host is not re-entrant and a nested call panics.

mod coerce;
mod env;
mod eval;
mod heap_host;

use std::cell::RefCell;

use tracing::warn;

use crate::gc::{Complex, HeapStats, HostHeap, Sexp, SexpType};

pub use eval::BuiltinId;

/// Primitives the binding layer consumes.
///
/// Handles passed in must be live; a stale handle is a host invariant
/// violation and may panic.  Typed accessors (`car`, `string_elt`, raw
/// pointers, ...) expect the matching tag and panic otherwise.
pub trait Host {
    // ---- singletons ----
    fn nil(&self) -> Sexp;
    /// Sentinel returned by frame lookups that find nothing.
    fn unbound_value(&self) -> Sexp;
    /// Marker for a formal argument without a default.
    fn missing_arg(&self) -> Sexp;
    fn global_env(&self) -> Sexp;
    fn empty_env(&self) -> Sexp;
    fn base_env(&self) -> Sexp;
    fn base_namespace(&self) -> Sexp;

    // ---- queries ----
    fn type_of(&self, x: Sexp) -> SexpType;
    /// Element count for vectors, cell count for chains, binding count for
    /// environments, 1 for other values and 0 for `NULL`.
    fn length(&self, x: Sexp) -> usize;

    // ---- allocation ----
    fn alloc_vector(&mut self, ty: SexpType, len: usize) -> Sexp;
    fn mk_char(&mut self, s: Option<&str>) -> Sexp;
    /// Intern a symbol.
    fn install(&mut self, name: &str) -> Sexp;
    fn cons(&mut self, car: Sexp, cdr: Sexp) -> Sexp;
    /// Like `cons` but the new cell is marked as a call.
    fn lcons(&mut self, car: Sexp, cdr: Sexp) -> Sexp;
    fn new_env(&mut self, parent: Sexp) -> Sexp;
    fn mk_closure(&mut self, formals: Sexp, body: Sexp, env: Sexp) -> Sexp;
    fn mk_promise(&mut self, code: Sexp, env: Sexp) -> Sexp;
    fn mk_weakref(&mut self, key: Sexp, value: Sexp) -> Sexp;
    /// Shallow copy of a vector or chain, attributes included.
    fn duplicate(&mut self, x: Sexp) -> Sexp;

    // ---- raw storage ----
    //
    // Pointers stay valid until the next collection, or until the object is
    // resized or freed.
    fn logical_ptr(&mut self, x: Sexp) -> *mut i32;
    fn integer_ptr(&mut self, x: Sexp) -> *mut i32;
    fn real_ptr(&mut self, x: Sexp) -> *mut f64;
    fn complex_ptr(&mut self, x: Sexp) -> *mut Complex;
    fn raw_ptr(&mut self, x: Sexp) -> *mut u8;

    // ---- elements ----
    /// Read one element of an integer or logical vector.
    fn integer_elt(&self, x: Sexp, i: usize) -> i32;
    fn string_elt(&self, x: Sexp, i: usize) -> Sexp;
    fn set_string_elt(&mut self, x: Sexp, i: usize, v: Sexp);
    /// Contents of a string cell; `None` for the missing string.
    fn char_str(&self, x: Sexp) -> Option<&str>;
    fn vector_elt(&self, x: Sexp, i: usize) -> Sexp;
    fn set_vector_elt(&mut self, x: Sexp, i: usize, v: Sexp);

    // ---- attributes ----
    fn get_attrib(&self, x: Sexp, name: &str) -> Sexp;
    fn set_attrib(&mut self, x: Sexp, name: &str, v: Sexp);
    fn attribute_names(&self, x: Sexp) -> Vec<String>;

    // ---- pins ----
    fn preserve(&mut self, x: Sexp);
    fn release(&mut self, x: Sexp);
    fn preserve_count(&self, x: Sexp) -> usize;
    fn heap_stats(&self) -> HeapStats;

    // ---- cells ----
    fn car(&self, x: Sexp) -> Sexp;
    fn cdr(&self, x: Sexp) -> Sexp;
    fn tag(&self, x: Sexp) -> Sexp;
    fn set_car(&mut self, x: Sexp, v: Sexp);
    fn set_cdr(&mut self, x: Sexp, v: Sexp);
    fn set_tag(&mut self, x: Sexp, v: Sexp);
    /// Switch a cell between the pairlist and call markers.
    fn set_type(&mut self, x: Sexp, ty: SexpType);
    fn symbol_name(&self, x: Sexp) -> &str;

    // ---- environments ----
    /// Value bound to `name` in the frame of `env` alone, or the unbound
    /// sentinel.  Active bindings are called; promises are returned as is.
    fn find_var_in_frame(&mut self, env: Sexp, name: &str) -> Result<Sexp, Sexp>;
    fn exists_in_frame(&self, env: Sexp, name: &str) -> bool;
    /// Safe define: returns false instead of touching a locked binding or
    /// adding to a locked frame.
    fn define_var(&mut self, env: Sexp, name: &str, value: Sexp) -> bool;
    fn remove_var(&mut self, env: Sexp, name: &str) -> bool;
    fn binding_is_locked(&self, env: Sexp, name: &str) -> bool;
    fn binding_is_active(&self, env: Sexp, name: &str) -> bool;
    fn lock_binding(&mut self, env: Sexp, name: &str);
    fn unlock_binding(&mut self, env: Sexp, name: &str);
    fn make_active_binding(&mut self, env: Sexp, name: &str, fun: Sexp) -> bool;
    fn lock_environment(&mut self, env: Sexp, bindings: bool);
    fn unlock_environment(&mut self, env: Sexp);
    fn environment_is_locked(&self, env: Sexp) -> bool;
    fn enclos(&self, env: Sexp) -> Sexp;
    /// Binding names, sorted; hidden (dot-prefixed) names only with `all`.
    fn ls(&self, env: Sexp, all: bool) -> Vec<String>;
    fn find_namespace(&self, name: &str) -> Option<Sexp>;
    fn register_namespace(&mut self, name: &str, env: Sexp);

    // ---- closures, promises, weak references ----
    fn closure_formals(&self, x: Sexp) -> Sexp;
    fn closure_body(&self, x: Sexp) -> Sexp;
    fn closure_env(&self, x: Sexp) -> Sexp;
    fn promise_code(&self, x: Sexp) -> Sexp;
    fn promise_env(&self, x: Sexp) -> Sexp;
    /// `None` until the promise has been forced.
    fn promise_value(&self, x: Sexp) -> Option<Sexp>;
    fn promise_seen(&self, x: Sexp) -> bool;
    fn weakref_key(&self, x: Sexp) -> Sexp;
    fn weakref_value(&self, x: Sexp) -> Sexp;

    // ---- coercion, evaluation, errors ----
    /// Coerce among vector types.  `None` when the host has no coercion.
    fn coerce_vector(&mut self, x: Sexp, ty: SexpType) -> Option<Sexp>;
    /// Evaluate without unwinding.  `Err` carries the condition object.
    fn eval_protected(&mut self, expr: Sexp, env: Sexp) -> Result<Sexp, Sexp>;
    /// Raise the host's fatal-error signal.
    fn signal_error(&mut self, message: &str);
    /// Drain the messages raised through `signal_error`.
    fn take_signalled_errors(&mut self) -> Vec<String>;
    fn collect_garbage(&mut self);
}

thread_local! {
    static CURRENT_HOST: RefCell<Option<Box<dyn Host>>> = const { RefCell::new(None) };
    /// Releases requested while the host was borrowed.
    static PENDING_RELEASES: RefCell<Vec<Sexp>> = const { RefCell::new(Vec::new()) };
}

/// Install `host` as the current thread's host, returning the previous one.
pub fn set_current_host(host: Box<dyn Host>) -> Option<Box<dyn Host>> {
    CURRENT_HOST.with(|h| h.borrow_mut().replace(host))
}

/// Remove and return the current thread's host.
pub fn take_current_host() -> Option<Box<dyn Host>> {
    drain_pending_releases();
    CURRENT_HOST.with(|h| h.borrow_mut().take())
}

/// Returns true if a host is installed on this thread.
pub fn has_current_host() -> bool {
    CURRENT_HOST.with(|h| h.try_borrow().map_or(true, |b| b.is_some()))
}

/// Mutable access to the current thread-local host.
///
/// Panics if no host is installed (tests get a fallback heap) or if called
/// from within another `with_host` closure.
pub fn with_host<R>(f: impl FnOnce(&mut dyn Host) -> R) -> R {
    let result = CURRENT_HOST.with(|cell| {
        let mut slot = cell
            .try_borrow_mut()
            .unwrap_or_else(|_| panic!("host re-entered from within with_host"));
        // Auto-create a heap for tests that never install one.
        #[cfg(test)]
        {
            if slot.is_none() {
                *slot = Some(Box::new(HostHeap::new()));
            }
        }
        match slot.as_deref_mut() {
            Some(host) => f(host),
            None => panic!("no host installed on this thread"),
        }
    });
    drain_pending_releases();
    result
}

/// Release a pin now if the host is reachable, later if it is busy.
pub(crate) fn release_or_defer(x: Sexp) {
    CURRENT_HOST.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => match slot.as_deref_mut() {
            Some(host) => host.release(x),
            None => warn!(?x, "release with no host installed; pin dropped"),
        },
        Err(_) => PENDING_RELEASES.with(|p| p.borrow_mut().push(x)),
    });
}

fn drain_pending_releases() {
    let pending = PENDING_RELEASES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    if pending.is_empty() {
        return;
    }
    CURRENT_HOST.with(|cell| {
        if let Ok(mut slot) = cell.try_borrow_mut() {
            if let Some(host) = slot.as_deref_mut() {
                for x in pending {
                    host.release(x);
                }
            }
        }
    });
}

/// Scoped installation of a host on the current thread.
///
/// The host is removed again when the session drops.  Views should not
/// outlive the session that created them; releases issued after that are
/// logged and dropped.
pub struct HostSession {
    previous: Option<Box<dyn Host>>,
}

impl HostSession {
    pub fn install(heap: HostHeap) -> Self {
        Self {
            previous: set_current_host(Box::new(heap)),
        }
    }

    /// Install a heap configured from the environment.
    pub fn from_env() -> Self {
        Self::install(HostHeap::with_config(crate::config::HeapConfig::from_env()))
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        let _ = take_current_host();
        if let Some(prev) = self.previous.take() {
            set_current_host(prev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_installs_and_removes() {
        let _ = take_current_host();
        {
            let _session = HostSession::install(HostHeap::new());
            assert!(has_current_host());
            let nil = with_host(|h| h.nil());
            assert_eq!(with_host(|h| h.type_of(nil)), SexpType::Nil);
        }
        assert!(!has_current_host());
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn nested_with_host_panics() {
        with_host(|_| with_host(|h| h.nil()));
    }

    #[test]
    fn release_during_borrow_is_deferred() {
        let x = with_host(|h| {
            let x = h.alloc_vector(SexpType::Integer, 1);
            h.preserve(x);
            x
        });
        with_host(|h| {
            release_or_defer(x);
            assert_eq!(h.preserve_count(x), 1, "still pinned inside the borrow");
        });
        assert_eq!(with_host(|h| h.preserve_count(x)), 0);
    }
}
