//! `Host` implementation for the reference heap.

use tracing::debug;

use super::eval::Flow;
use super::Host;
use crate::gc::{CellKind, Complex, HeapObject, HeapStats, HostHeap, Sexp, SexpType};

impl HostHeap {
    fn flow_to_condition(&mut self, flow: Flow) -> Sexp {
        match flow {
            Flow::Error { message, call } => self.make_condition(&message, call),
        }
    }
}

macro_rules! raw_storage {
    ($self:ident, $x:ident, $variant:ident, $what:literal) => {
        match $self.get_mut($x) {
            HeapObject::$variant(v) => v.as_mut_ptr(),
            other => panic!(concat!($what, " on {}"), other.sexp_type()),
        }
    };
}

impl Host for HostHeap {
    fn nil(&self) -> Sexp {
        self.nil
    }

    fn unbound_value(&self) -> Sexp {
        self.unbound
    }

    fn missing_arg(&self) -> Sexp {
        self.missing
    }

    fn global_env(&self) -> Sexp {
        self.global_env
    }

    fn empty_env(&self) -> Sexp {
        self.empty_env
    }

    fn base_env(&self) -> Sexp {
        self.base_env
    }

    fn base_namespace(&self) -> Sexp {
        self.base_namespace
    }

    fn type_of(&self, x: Sexp) -> SexpType {
        self.get(x).sexp_type()
    }

    fn length(&self, x: Sexp) -> usize {
        self.object_length(x)
    }

    // ---- allocation ----

    fn alloc_vector(&mut self, ty: SexpType, len: usize) -> Sexp {
        self.alloc_vector_of(ty, len)
    }

    fn mk_char(&mut self, s: Option<&str>) -> Sexp {
        self.alloc_char(s)
    }

    fn install(&mut self, name: &str) -> Sexp {
        self.intern(name)
    }

    fn cons(&mut self, car: Sexp, cdr: Sexp) -> Sexp {
        self.alloc_cell(CellKind::Pairlist, car, cdr)
    }

    fn lcons(&mut self, car: Sexp, cdr: Sexp) -> Sexp {
        self.alloc_cell(CellKind::Language, car, cdr)
    }

    fn new_env(&mut self, parent: Sexp) -> Sexp {
        self.alloc_env(parent)
    }

    fn mk_closure(&mut self, formals: Sexp, body: Sexp, env: Sexp) -> Sexp {
        self.alloc(HeapObject::Closure { formals, body, env })
    }

    fn mk_promise(&mut self, code: Sexp, env: Sexp) -> Sexp {
        self.alloc(HeapObject::Promise {
            code,
            env,
            value: None,
            seen: false,
        })
    }

    fn mk_weakref(&mut self, key: Sexp, value: Sexp) -> Sexp {
        self.alloc(HeapObject::WeakRef { key, value })
    }

    fn duplicate(&mut self, x: Sexp) -> Sexp {
        let copy = match self.get(x) {
            HeapObject::Logical(v) => HeapObject::Logical(v.clone()),
            HeapObject::Integer(v) => HeapObject::Integer(v.clone()),
            HeapObject::Real(v) => HeapObject::Real(v.clone()),
            HeapObject::Complex(v) => HeapObject::Complex(v.clone()),
            HeapObject::Raw(v) => HeapObject::Raw(v.clone()),
            HeapObject::Str(v) => HeapObject::Str(v.clone()),
            HeapObject::List(v) => HeapObject::List(v.clone()),
            HeapObject::Expression(v) => HeapObject::Expression(v.clone()),
            HeapObject::Cell { kind, .. } => {
                let kind = *kind;
                let mut cells = Vec::new();
                let mut cursor = x;
                while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
                    cells.push((*car, *tag));
                    cursor = *cdr;
                }
                let mut head = self.nil;
                for (car, tag) in cells.into_iter().rev() {
                    head = self.alloc_cell(CellKind::Pairlist, car, head);
                    *self.cell_mut(head).2 = tag;
                }
                *self.cell_mut(head).3 = kind;
                self.copy_attrs(x, head);
                return head;
            }
            _ => return x,
        };
        let out = self.alloc(copy);
        self.copy_attrs(x, out);
        out
    }

    // ---- raw storage ----

    fn logical_ptr(&mut self, x: Sexp) -> *mut i32 {
        raw_storage!(self, x, Logical, "logical_ptr")
    }

    fn integer_ptr(&mut self, x: Sexp) -> *mut i32 {
        raw_storage!(self, x, Integer, "integer_ptr")
    }

    fn real_ptr(&mut self, x: Sexp) -> *mut f64 {
        raw_storage!(self, x, Real, "real_ptr")
    }

    fn complex_ptr(&mut self, x: Sexp) -> *mut Complex {
        raw_storage!(self, x, Complex, "complex_ptr")
    }

    fn raw_ptr(&mut self, x: Sexp) -> *mut u8 {
        raw_storage!(self, x, Raw, "raw_ptr")
    }

    // ---- elements ----
    //
    // Invariant: callers have checked the tag and the index (views do both
    // before reaching the host), so a wrong tag or an out-of-range index
    // here is a bug in the caller and panics.  The storage pointer
    // accessors above follow the same rule.

    fn integer_elt(&self, x: Sexp, i: usize) -> i32 {
        match self.get(x) {
            HeapObject::Integer(v) | HeapObject::Logical(v) => v[i],
            other => panic!("integer_elt on {}", other.sexp_type()),
        }
    }

    fn string_elt(&self, x: Sexp, i: usize) -> Sexp {
        match self.get(x) {
            HeapObject::Str(v) => v[i],
            other => panic!("string_elt on {}", other.sexp_type()),
        }
    }

    fn set_string_elt(&mut self, x: Sexp, i: usize, v: Sexp) {
        assert!(
            matches!(self.get(v), HeapObject::Char(_)),
            "set_string_elt with a non-char value"
        );
        match self.get_mut(x) {
            HeapObject::Str(cells) => cells[i] = v,
            other => panic!("set_string_elt on {}", other.sexp_type()),
        }
    }

    fn char_str(&self, x: Sexp) -> Option<&str> {
        match self.get(x) {
            HeapObject::Char(s) => s.as_deref(),
            other => panic!("char_str on {}", other.sexp_type()),
        }
    }

    fn vector_elt(&self, x: Sexp, i: usize) -> Sexp {
        match self.get(x) {
            HeapObject::List(v) | HeapObject::Expression(v) => v[i],
            other => panic!("vector_elt on {}", other.sexp_type()),
        }
    }

    fn set_vector_elt(&mut self, x: Sexp, i: usize, v: Sexp) {
        match self.get_mut(x) {
            HeapObject::List(items) | HeapObject::Expression(items) => items[i] = v,
            other => panic!("set_vector_elt on {}", other.sexp_type()),
        }
    }

    // ---- attributes ----

    fn get_attrib(&self, x: Sexp, name: &str) -> Sexp {
        self.attr(x, name)
    }

    fn set_attrib(&mut self, x: Sexp, name: &str, v: Sexp) {
        self.set_attr(x, name, v)
    }

    fn attribute_names(&self, x: Sexp) -> Vec<String> {
        self.attr_names(x)
    }

    // ---- pins ----

    fn preserve(&mut self, x: Sexp) {
        self.pin(x)
    }

    fn release(&mut self, x: Sexp) {
        self.unpin(x)
    }

    fn preserve_count(&self, x: Sexp) -> usize {
        self.pin_count(x)
    }

    fn heap_stats(&self) -> HeapStats {
        self.stats()
    }

    // ---- cells ----

    fn car(&self, x: Sexp) -> Sexp {
        self.cell_car(x)
    }

    fn cdr(&self, x: Sexp) -> Sexp {
        self.cell_cdr(x)
    }

    fn tag(&self, x: Sexp) -> Sexp {
        self.cell_tag(x)
    }

    fn set_car(&mut self, x: Sexp, v: Sexp) {
        *self.cell_mut(x).0 = v;
    }

    fn set_cdr(&mut self, x: Sexp, v: Sexp) {
        *self.cell_mut(x).1 = v;
    }

    fn set_tag(&mut self, x: Sexp, v: Sexp) {
        *self.cell_mut(x).2 = v;
    }

    fn set_type(&mut self, x: Sexp, ty: SexpType) {
        let kind = match ty {
            SexpType::Pairlist => CellKind::Pairlist,
            SexpType::Language => CellKind::Language,
            SexpType::Dots => CellKind::Dots,
            other => panic!("set_type: {other} is not a cell type"),
        };
        *self.cell_mut(x).3 = kind;
    }

    fn symbol_name(&self, x: Sexp) -> &str {
        self.symbol_str(x)
    }

    // ---- environments ----

    fn find_var_in_frame(&mut self, env: Sexp, name: &str) -> Result<Sexp, Sexp> {
        self.frame_lookup(env, name)
            .map_err(|flow| self.flow_to_condition(flow))
    }

    fn exists_in_frame(&self, env: Sexp, name: &str) -> bool {
        self.frame(env).bindings.contains_key(name)
    }

    fn define_var(&mut self, env: Sexp, name: &str, value: Sexp) -> bool {
        let ok = self.define(env, name, value);
        if !ok {
            debug!(name, "define refused");
        }
        ok
    }

    fn remove_var(&mut self, env: Sexp, name: &str) -> bool {
        self.undefine(env, name)
    }

    fn binding_is_locked(&self, env: Sexp, name: &str) -> bool {
        self.binding_state(env, name).is_some_and(|(locked, _)| locked)
    }

    fn binding_is_active(&self, env: Sexp, name: &str) -> bool {
        self.binding_state(env, name).is_some_and(|(_, active)| active)
    }

    fn lock_binding(&mut self, env: Sexp, name: &str) {
        self.set_binding_lock(env, name, true)
    }

    fn unlock_binding(&mut self, env: Sexp, name: &str) {
        self.set_binding_lock(env, name, false)
    }

    fn make_active_binding(&mut self, env: Sexp, name: &str, fun: Sexp) -> bool {
        self.add_active_binding(env, name, fun)
    }

    fn lock_environment(&mut self, env: Sexp, bindings: bool) {
        self.lock_frame(env, bindings)
    }

    fn unlock_environment(&mut self, env: Sexp) {
        self.frame_mut(env).locked = false;
    }

    fn environment_is_locked(&self, env: Sexp) -> bool {
        self.frame(env).locked
    }

    fn enclos(&self, env: Sexp) -> Sexp {
        self.frame(env).parent
    }

    fn ls(&self, env: Sexp, all: bool) -> Vec<String> {
        self.frame_names(env, all)
    }

    fn find_namespace(&self, name: &str) -> Option<Sexp> {
        self.namespaces.get(name).copied()
    }

    fn register_namespace(&mut self, name: &str, env: Sexp) {
        self.namespaces.insert(name.to_owned(), env);
    }

    // ---- closures, promises, weak references ----

    fn closure_formals(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::Closure { formals, .. } => *formals,
            other => panic!("closure_formals on {}", other.sexp_type()),
        }
    }

    fn closure_body(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::Closure { body, .. } => *body,
            other => panic!("closure_body on {}", other.sexp_type()),
        }
    }

    fn closure_env(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::Closure { env, .. } => *env,
            other => panic!("closure_env on {}", other.sexp_type()),
        }
    }

    fn promise_code(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::Promise { code, .. } => *code,
            other => panic!("promise_code on {}", other.sexp_type()),
        }
    }

    fn promise_env(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::Promise { env, .. } => *env,
            other => panic!("promise_env on {}", other.sexp_type()),
        }
    }

    fn promise_value(&self, x: Sexp) -> Option<Sexp> {
        match self.get(x) {
            HeapObject::Promise { value, .. } => *value,
            other => panic!("promise_value on {}", other.sexp_type()),
        }
    }

    fn promise_seen(&self, x: Sexp) -> bool {
        match self.get(x) {
            HeapObject::Promise { seen, .. } => *seen,
            other => panic!("promise_seen on {}", other.sexp_type()),
        }
    }

    fn weakref_key(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::WeakRef { key, .. } => *key,
            other => panic!("weakref_key on {}", other.sexp_type()),
        }
    }

    fn weakref_value(&self, x: Sexp) -> Sexp {
        match self.get(x) {
            HeapObject::WeakRef { value, .. } => *value,
            other => panic!("weakref_value on {}", other.sexp_type()),
        }
    }

    // ---- coercion, evaluation, errors ----

    fn coerce_vector(&mut self, x: Sexp, ty: SexpType) -> Option<Sexp> {
        self.coerce_to(x, ty)
    }

    fn eval_protected(&mut self, expr: Sexp, env: Sexp) -> Result<Sexp, Sexp> {
        self.eval_top(expr, env)
    }

    fn signal_error(&mut self, message: &str) {
        debug!(message, "host error signalled");
        self.signalled.push(message.to_owned());
    }

    fn take_signalled_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.signalled)
    }

    fn collect_garbage(&mut self) {
        self.collect(std::iter::empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_have_expected_types() {
        let heap = HostHeap::new();
        assert_eq!(heap.type_of(heap.nil()), SexpType::Nil);
        assert_eq!(heap.type_of(heap.global_env()), SexpType::Environment);
        assert_eq!(heap.enclos(heap.global_env()), heap.base_env());
        assert_eq!(heap.enclos(heap.base_env()), heap.empty_env());
        assert!(heap.ls(heap.empty_env(), true).is_empty());
    }

    #[test]
    fn raw_storage_writes_through() {
        let mut heap = HostHeap::new();
        let x = heap.alloc_vector(SexpType::Real, 3);
        let p = heap.real_ptr(x);
        // SAFETY: index within the length just allocated, no intervening host call.
        unsafe { *p.add(2) = 4.5 };
        assert!(matches!(heap.get(x), HeapObject::Real(v) if v[2] == 4.5));
    }

    #[test]
    fn duplicate_keeps_kind_and_attributes() {
        let mut heap = HostHeap::new();
        let nil = heap.nil();
        let sym = heap.install("f");
        let call = heap.lcons(sym, nil);
        let copy = heap.duplicate(call);
        assert_ne!(copy, call);
        assert_eq!(heap.type_of(copy), SexpType::Language);

        let v = heap.alloc_vector(SexpType::Integer, 2);
        let names = heap.alloc_vector(SexpType::String, 2);
        heap.set_attrib(v, "names", names);
        let copy = heap.duplicate(v);
        assert_eq!(heap.get_attrib(copy, "names"), names);
    }

    #[test]
    fn protected_eval_reports_condition() {
        let mut heap = HostHeap::new();
        let sym = heap.install("undefined_thing");
        let env = heap.global_env();
        let cond = heap.eval_protected(sym, env).unwrap_err();
        assert_eq!(heap.type_of(cond), SexpType::List);
        assert_eq!(heap.attribute_names(cond), vec!["names", "class"]);
    }

    #[test]
    fn signalled_errors_drain() {
        let mut heap = HostHeap::new();
        heap.signal_error("Exception: one");
        heap.signal_error("Exception: two");
        assert_eq!(heap.take_signalled_errors(), vec!["Exception: one", "Exception: two"]);
        assert!(heap.take_signalled_errors().is_empty());
    }
}
