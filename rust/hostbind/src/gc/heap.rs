//! Arena-based host heap with mark-and-sweep collection.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use super::types::{CellKind, EnvFrame, HeapObject, Sexp, SexpType};
use crate::config::HeapConfig;

/// Counters describing the precious (pin) set and the arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live slots.
    pub allocated: usize,
    /// Distinct handles currently pinned.
    pub preserved_handles: usize,
    /// Total pins across all handles (the multiset size).
    pub preserved_total: usize,
    /// Collections run so far.
    pub collections: usize,
}

/// The reference host heap.
///
/// Every host value lives in one arena slot.  Handles carry the slot's
/// generation so a handle that outlived its object panics on access
/// instead of aliasing whatever reused the slot.
pub struct HostHeap {
    objects: Vec<HeapObject>,
    generations: Vec<u32>,
    marks: Vec<bool>,
    /// Attribute lists, parallel to `objects`.
    attributes: Vec<Vec<(String, Sexp)>>,
    free_list: Vec<u32>,
    allocated_count: usize,
    gc_threshold: usize,
    collections: usize,

    /// Pinned handles with their pin counts.
    precious: HashMap<Sexp, usize>,
    pub(crate) symbols: HashMap<String, Sexp>,
    pub(crate) namespaces: BTreeMap<String, Sexp>,

    pub(crate) nil: Sexp,
    pub(crate) unbound: Sexp,
    pub(crate) missing: Sexp,
    pub(crate) empty_env: Sexp,
    pub(crate) base_env: Sexp,
    pub(crate) global_env: Sexp,
    pub(crate) base_namespace: Sexp,

    pub(crate) max_eval_depth: usize,
    pub(crate) eval_depth: usize,
    /// Calls of the closures currently being applied, innermost last.
    pub(crate) call_stack: Vec<Sexp>,
    /// Messages passed to the fatal-error signal, oldest first.
    pub(crate) signalled: Vec<String>,
}

impl HostHeap {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        let placeholder = Sexp::new(0, 0);
        let mut heap = Self {
            objects: Vec::new(),
            generations: Vec::new(),
            marks: Vec::new(),
            attributes: Vec::new(),
            free_list: Vec::new(),
            allocated_count: 0,
            gc_threshold: config.gc_threshold.max(1),
            collections: 0,
            precious: HashMap::new(),
            symbols: HashMap::new(),
            namespaces: BTreeMap::new(),
            nil: placeholder,
            unbound: placeholder,
            missing: placeholder,
            empty_env: placeholder,
            base_env: placeholder,
            global_env: placeholder,
            base_namespace: placeholder,
            max_eval_depth: config.max_eval_depth.max(1),
            eval_depth: 0,
            call_stack: Vec::new(),
            signalled: Vec::new(),
        };
        heap.nil = heap.alloc(HeapObject::Nil);
        let nil = heap.nil;
        heap.unbound = heap.alloc(HeapObject::Symbol("<unbound>".into()));
        heap.missing = heap.alloc(HeapObject::Symbol(String::new()));
        heap.empty_env = heap.alloc_env(nil);
        heap.base_env = heap.alloc_env(heap.empty_env);
        heap.global_env = heap.alloc_env(heap.base_env);
        heap.base_namespace = heap.alloc_env(heap.global_env);

        let name = heap.alloc_char(Some(".GlobalEnv"));
        heap.set_attr(heap.global_env, "name", name);
        let name = heap.alloc_char(Some("package:base"));
        heap.set_attr(heap.base_env, "name", name);
        heap.namespaces.insert("base".into(), heap.base_namespace);

        heap.install_builtins();
        heap
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    pub(crate) fn alloc(&mut self, obj: HeapObject) -> Sexp {
        self.allocated_count += 1;
        if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generations[i] = self.generations[i].wrapping_add(1);
            self.objects[i] = obj;
            self.marks[i] = false;
            self.attributes[i].clear();
            Sexp::new(idx, self.generations[i])
        } else {
            let idx = self.objects.len() as u32;
            self.objects.push(obj);
            self.generations.push(0);
            self.marks.push(false);
            self.attributes.push(Vec::new());
            Sexp::new(idx, 0)
        }
    }

    pub(crate) fn alloc_cell(&mut self, kind: CellKind, car: Sexp, cdr: Sexp) -> Sexp {
        let tag = self.nil;
        self.alloc(HeapObject::Cell { kind, car, cdr, tag })
    }

    pub(crate) fn alloc_char(&mut self, s: Option<&str>) -> Sexp {
        self.alloc(HeapObject::Char(s.map(str::to_owned)))
    }

    pub(crate) fn alloc_env(&mut self, parent: Sexp) -> Sexp {
        self.alloc(HeapObject::Env(EnvFrame {
            bindings: BTreeMap::new(),
            parent,
            locked: false,
        }))
    }

    /// Allocate a vector of `len` elements.  Numeric storage is
    /// zero-initialised; string vectors hold the empty string and lists hold
    /// `NULL`, matching the host allocator.
    pub(crate) fn alloc_vector_of(&mut self, ty: SexpType, len: usize) -> Sexp {
        let obj = match ty {
            SexpType::Logical => HeapObject::Logical(vec![0; len]),
            SexpType::Integer => HeapObject::Integer(vec![0; len]),
            SexpType::Real => HeapObject::Real(vec![0.0; len]),
            SexpType::Complex => HeapObject::Complex(vec![Default::default(); len]),
            SexpType::Raw => HeapObject::Raw(vec![0; len]),
            SexpType::String => {
                let blank = self.alloc_char(Some(""));
                HeapObject::Str(vec![blank; len])
            }
            SexpType::List => HeapObject::List(vec![self.nil; len]),
            SexpType::Expression => HeapObject::Expression(vec![self.nil; len]),
            SexpType::Pairlist | SexpType::Language => {
                let kind = if ty == SexpType::Language {
                    CellKind::Language
                } else {
                    CellKind::Pairlist
                };
                let mut head = self.nil;
                for _ in 0..len {
                    head = self.alloc_cell(kind, self.nil, head);
                }
                return head;
            }
            SexpType::Nil => return self.nil,
            other => panic!("alloc_vector: cannot allocate {other}"),
        };
        self.alloc(obj)
    }

    /// Current allocation threshold used at collection safepoints.
    pub fn gc_threshold(&self) -> usize {
        self.gc_threshold
    }

    /// Clamp to 1 so callers never disable threshold checks with zero.
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold.max(1);
    }

    /// True when allocated objects reached the configured threshold.
    pub fn should_collect(&self) -> bool {
        self.allocated_count >= self.gc_threshold
    }

    // -----------------------------------------------------------------------
    // Checked access
    // -----------------------------------------------------------------------

    #[inline]
    fn check(&self, id: Sexp) {
        let i = id.index as usize;
        assert!(
            i < self.objects.len() && self.generations[i] == id.generation,
            "stale Sexp: {:?} (current gen={})",
            id,
            if i < self.generations.len() {
                self.generations[i]
            } else {
                u32::MAX
            }
        );
    }

    pub(crate) fn get(&self, id: Sexp) -> &HeapObject {
        self.check(id);
        &self.objects[id.index as usize]
    }

    pub(crate) fn get_mut(&mut self, id: Sexp) -> &mut HeapObject {
        self.check(id);
        &mut self.objects[id.index as usize]
    }

    /// True while `id` still names a live object.
    pub fn is_live(&self, id: Sexp) -> bool {
        let i = id.index as usize;
        i < self.objects.len()
            && self.generations[i] == id.generation
            && !matches!(self.objects[i], HeapObject::Free)
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    pub(crate) fn attr(&self, id: Sexp, name: &str) -> Sexp {
        self.check(id);
        self.attributes[id.index as usize]
            .iter()
            .find(|(n, _)| n == name)
            .map_or(self.nil, |(_, v)| *v)
    }

    /// Setting `NULL` removes the attribute.
    pub(crate) fn set_attr(&mut self, id: Sexp, name: &str, value: Sexp) {
        self.check(id);
        let nil = self.nil;
        let attrs = &mut self.attributes[id.index as usize];
        let pos = attrs.iter().position(|(n, _)| n == name);
        match (pos, value == nil) {
            (Some(p), true) => {
                attrs.remove(p);
            }
            (Some(p), false) => attrs[p].1 = value,
            (None, false) => attrs.push((name.to_owned(), value)),
            (None, true) => {}
        }
    }

    pub(crate) fn attr_names(&self, id: Sexp) -> Vec<String> {
        self.check(id);
        self.attributes[id.index as usize]
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub(crate) fn copy_attrs(&mut self, from: Sexp, to: Sexp) {
        self.check(from);
        self.check(to);
        let attrs = self.attributes[from.index as usize].clone();
        self.attributes[to.index as usize] = attrs;
    }

    // -----------------------------------------------------------------------
    // Cell accessors
    // -----------------------------------------------------------------------

    pub(crate) fn cell_car(&self, id: Sexp) -> Sexp {
        match self.get(id) {
            HeapObject::Cell { car, .. } => *car,
            _ => panic!("car on non-cell"),
        }
    }

    pub(crate) fn cell_cdr(&self, id: Sexp) -> Sexp {
        match self.get(id) {
            HeapObject::Cell { cdr, .. } => *cdr,
            _ => panic!("cdr on non-cell"),
        }
    }

    pub(crate) fn cell_tag(&self, id: Sexp) -> Sexp {
        match self.get(id) {
            HeapObject::Cell { tag, .. } => *tag,
            _ => panic!("tag on non-cell"),
        }
    }

    pub(crate) fn cell_mut(&mut self, id: Sexp) -> (&mut Sexp, &mut Sexp, &mut Sexp, &mut CellKind) {
        match self.get_mut(id) {
            HeapObject::Cell {
                car,
                cdr,
                tag,
                kind,
            } => (car, cdr, tag, kind),
            _ => panic!("cell mutation on non-cell"),
        }
    }

    /// Walk a cell chain into a Vec of heads.  Stops at the first non-cell.
    pub(crate) fn list_to_vec(&self, mut cursor: Sexp) -> Vec<Sexp> {
        let mut out = Vec::new();
        while let HeapObject::Cell { car, cdr, .. } = self.get(cursor) {
            out.push(*car);
            cursor = *cdr;
        }
        out
    }

    pub(crate) fn list_length(&self, mut cursor: Sexp) -> usize {
        let mut len = 0;
        while let HeapObject::Cell { cdr, .. } = self.get(cursor) {
            len += 1;
            cursor = *cdr;
        }
        len
    }

    pub(crate) fn symbol_str(&self, id: Sexp) -> &str {
        match self.get(id) {
            HeapObject::Symbol(name) => name,
            _ => panic!("symbol_name on non-symbol"),
        }
    }

    pub(crate) fn intern(&mut self, name: &str) -> Sexp {
        if let Some(sym) = self.symbols.get(name) {
            return *sym;
        }
        let sym = self.alloc(HeapObject::Symbol(name.to_owned()));
        self.symbols.insert(name.to_owned(), sym);
        sym
    }

    // -----------------------------------------------------------------------
    // Precious set
    // -----------------------------------------------------------------------

    pub(crate) fn pin(&mut self, id: Sexp) {
        self.check(id);
        let count = self.precious.entry(id).or_insert(0);
        *count += 1;
        trace!(?id, count = *count, "preserve");
    }

    /// Releasing a handle that is not pinned is a no-op.
    pub(crate) fn unpin(&mut self, id: Sexp) {
        match self.precious.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                trace!(?id, count = *count, "release");
            }
            Some(_) => {
                self.precious.remove(&id);
                trace!(?id, count = 0, "release");
            }
            None => trace!(?id, "release of unpinned handle ignored"),
        }
    }

    pub(crate) fn pin_count(&self, id: Sexp) -> usize {
        self.precious.get(&id).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocated: self.allocated_count,
            preserved_handles: self.precious.len(),
            preserved_total: self.precious.values().sum(),
            collections: self.collections,
        }
    }

    // -----------------------------------------------------------------------
    // Mark-and-sweep collection
    // -----------------------------------------------------------------------

    /// Collect garbage.  Roots are the precious set, the singletons, the
    /// symbol table, the namespace registry and `extra`.
    ///
    /// Weak references keep their value only while their key is reachable
    /// through other means; otherwise both fields are reset to `NULL`.
    pub fn collect(&mut self, extra: impl IntoIterator<Item = Sexp>) {
        for m in self.marks.iter_mut() {
            *m = false;
        }
        self.marks.resize(self.objects.len(), false);

        let mut gray: Vec<Sexp> = extra.into_iter().collect();
        gray.extend(self.precious.keys().copied());
        gray.extend([
            self.nil,
            self.unbound,
            self.missing,
            self.empty_env,
            self.base_env,
            self.global_env,
            self.base_namespace,
        ]);
        gray.extend(self.symbols.values().copied());
        gray.extend(self.namespaces.values().copied());

        loop {
            self.mark_all(&mut gray);
            // A weak reference whose key survived keeps its value alive.
            for i in 0..self.objects.len() {
                if !self.marks[i] {
                    continue;
                }
                if let HeapObject::WeakRef { key, value } = self.objects[i] {
                    if self.is_marked(key) && !self.is_marked(value) {
                        gray.push(value);
                    }
                }
            }
            if gray.is_empty() {
                break;
            }
        }

        let nil = self.nil;
        let mut cleared = 0usize;
        for i in 0..self.objects.len() {
            if !self.marks[i] {
                continue;
            }
            let key_dead = match self.objects[i] {
                HeapObject::WeakRef { key, .. } => !self.is_marked(key),
                _ => false,
            };
            if key_dead {
                self.objects[i] = HeapObject::WeakRef {
                    key: nil,
                    value: nil,
                };
                cleared += 1;
            }
        }

        let before = self.allocated_count;
        self.sweep_all();
        self.collections += 1;
        debug!(
            freed = before - self.allocated_count,
            live = self.allocated_count,
            weak_cleared = cleared,
            "collect"
        );

        // Next GC triggers at 2x surviving objects, never below the floor.
        self.gc_threshold = self
            .allocated_count
            .saturating_mul(2)
            .max(self.gc_threshold);
    }

    fn is_marked(&self, id: Sexp) -> bool {
        let i = id.index as usize;
        i < self.marks.len() && self.generations[i] == id.generation && self.marks[i]
    }

    fn mark_all(&mut self, gray: &mut Vec<Sexp>) {
        let mut children = Vec::new();
        while let Some(id) = gray.pop() {
            let i = id.index as usize;
            if i >= self.marks.len() || self.marks[i] {
                continue;
            }
            if self.generations[i] != id.generation {
                continue; // stale
            }
            self.marks[i] = true;

            children.clear();
            self.objects[i].trace_values(&mut children);
            children.extend(self.attributes[i].iter().map(|(_, v)| *v));
            gray.extend(children.iter().copied());
        }
    }

    fn sweep_all(&mut self) {
        for i in 0..self.objects.len() {
            if !self.marks[i] && !matches!(self.objects[i], HeapObject::Free) {
                self.objects[i] = HeapObject::Free;
                self.attributes[i].clear();
                self.generations[i] = self.generations[i].wrapping_add(1);
                self.free_list.push(i as u32);
                self.allocated_count = self.allocated_count.saturating_sub(1);
            }
        }
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated_count
    }
}

impl Default for HostHeap {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
