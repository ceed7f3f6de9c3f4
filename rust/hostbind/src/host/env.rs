//! Environment frames of the reference host.

use super::eval::Flow;
use crate::gc::{Binding, EnvFrame, HeapObject, HostHeap, Sexp};

impl HostHeap {
    pub(crate) fn frame(&self, env: Sexp) -> &EnvFrame {
        match self.get(env) {
            HeapObject::Env(frame) => frame,
            _ => panic!("frame access on non-environment"),
        }
    }

    pub(crate) fn frame_mut(&mut self, env: Sexp) -> &mut EnvFrame {
        match self.get_mut(env) {
            HeapObject::Env(frame) => frame,
            _ => panic!("frame access on non-environment"),
        }
    }

    fn binding(&self, env: Sexp, name: &str) -> Option<Binding> {
        self.frame(env).bindings.get(name).copied()
    }

    /// Look `name` up in this frame only.  Active bindings are called with
    /// no arguments; promises are returned unforced.
    pub(crate) fn frame_lookup(&mut self, env: Sexp, name: &str) -> Result<Sexp, Flow> {
        match self.binding(env, name) {
            None => Ok(self.unbound),
            Some(b) if b.active => {
                let nil = self.nil;
                let call = self.alloc_cell(crate::gc::CellKind::Language, b.value, nil);
                self.eval(call, env)
            }
            Some(b) => Ok(b.value),
        }
    }

    /// Look `name` up along the enclosing chain.
    pub(crate) fn env_lookup(&mut self, env: Sexp, name: &str) -> Result<Sexp, Flow> {
        let mut cursor = env;
        while cursor != self.nil {
            let value = self.frame_lookup(cursor, name)?;
            if value != self.unbound {
                return Ok(value);
            }
            cursor = self.frame(cursor).parent;
        }
        Ok(self.unbound)
    }

    /// Define or overwrite `name`.  Refuses locked bindings and new names in
    /// locked frames.  Assigning through an active binding calls its
    /// function with the new value.
    pub(crate) fn define(&mut self, env: Sexp, name: &str, value: Sexp) -> bool {
        let nil = self.nil;
        let frame = self.frame_mut(env);
        match frame.bindings.get_mut(name) {
            Some(b) if b.locked => false,
            Some(b) if b.active => {
                let fun = b.value;
                let arg = self.alloc_cell(crate::gc::CellKind::Pairlist, value, nil);
                let call = self.alloc_cell(crate::gc::CellKind::Language, fun, arg);
                self.eval(call, env).is_ok()
            }
            Some(b) => {
                b.value = value;
                true
            }
            None if frame.locked => false,
            None => {
                frame.bindings.insert(
                    name.to_owned(),
                    Binding {
                        value,
                        locked: false,
                        active: false,
                    },
                );
                true
            }
        }
    }

    pub(crate) fn undefine(&mut self, env: Sexp, name: &str) -> bool {
        let frame = self.frame_mut(env);
        if frame.locked {
            return false;
        }
        match frame.bindings.get(name) {
            Some(b) if b.locked => false,
            Some(_) => frame.bindings.remove(name).is_some(),
            None => false,
        }
    }

    pub(crate) fn set_binding_lock(&mut self, env: Sexp, name: &str, locked: bool) {
        if let Some(b) = self.frame_mut(env).bindings.get_mut(name) {
            b.locked = locked;
        }
    }

    pub(crate) fn add_active_binding(&mut self, env: Sexp, name: &str, fun: Sexp) -> bool {
        let frame = self.frame_mut(env);
        match frame.bindings.get(name) {
            Some(b) if b.locked || !b.active => false,
            None if frame.locked => false,
            _ => {
                frame.bindings.insert(
                    name.to_owned(),
                    Binding {
                        value: fun,
                        locked: false,
                        active: true,
                    },
                );
                true
            }
        }
    }

    /// Lock the frame against new bindings, and optionally lock every
    /// existing binding as well.
    pub(crate) fn lock_frame(&mut self, env: Sexp, bindings: bool) {
        let frame = self.frame_mut(env);
        frame.locked = true;
        if bindings {
            for b in frame.bindings.values_mut() {
                b.locked = true;
            }
        }
    }

    pub(crate) fn frame_names(&self, env: Sexp, all: bool) -> Vec<String> {
        self.frame(env)
            .bindings
            .keys()
            .filter(|name| all || !name.starts_with('.'))
            .cloned()
            .collect()
    }

    pub(crate) fn binding_state(&self, env: Sexp, name: &str) -> Option<(bool, bool)> {
        self.binding(env, name).map(|b| (b.locked, b.active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_lookup_remove() {
        let mut heap = HostHeap::new();
        let env = heap.alloc_env(heap.global_env);
        let one = heap.alloc(HeapObject::Integer(vec![1]));
        assert!(heap.define(env, "x", one));
        assert_eq!(heap.frame_lookup(env, "x").ok(), Some(one));
        assert!(heap.undefine(env, "x"));
        assert_eq!(heap.frame_lookup(env, "x").ok(), Some(heap.unbound));
    }

    #[test]
    fn locked_binding_rejects_define() {
        let mut heap = HostHeap::new();
        let env = heap.alloc_env(heap.global_env);
        let one = heap.alloc(HeapObject::Integer(vec![1]));
        heap.define(env, "x", one);
        heap.set_binding_lock(env, "x", true);
        assert!(!heap.define(env, "x", heap.nil));
        assert!(!heap.undefine(env, "x"));
        heap.set_binding_lock(env, "x", false);
        assert!(heap.define(env, "x", heap.nil));
    }

    #[test]
    fn locked_frame_rejects_new_names_only() {
        let mut heap = HostHeap::new();
        let env = heap.alloc_env(heap.global_env);
        let one = heap.alloc(HeapObject::Integer(vec![1]));
        heap.define(env, "x", one);
        heap.lock_frame(env, false);
        assert!(!heap.define(env, "y", one));
        assert!(heap.define(env, "x", heap.nil));
        assert_eq!(heap.binding_state(env, "x"), Some((false, false)));
    }

    #[test]
    fn lookup_walks_parents() {
        let mut heap = HostHeap::new();
        let parent = heap.alloc_env(heap.global_env);
        let child = heap.alloc_env(parent);
        let one = heap.alloc(HeapObject::Integer(vec![1]));
        heap.define(parent, "x", one);
        assert_eq!(heap.env_lookup(child, "x").ok(), Some(one));
        assert_eq!(heap.frame_lookup(child, "x").ok(), Some(heap.unbound));
    }

    #[test]
    fn hidden_names_need_all() {
        let mut heap = HostHeap::new();
        let env = heap.alloc_env(heap.global_env);
        let nil = heap.nil;
        heap.define(env, ".hidden", nil);
        heap.define(env, "b", nil);
        heap.define(env, "a", nil);
        assert_eq!(heap.frame_names(env, false), vec!["a", "b"]);
        assert_eq!(heap.frame_names(env, true), vec![".hidden", "a", "b"]);
    }
}
