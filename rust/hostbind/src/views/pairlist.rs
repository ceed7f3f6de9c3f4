//! Cell chains: pairlists and calls.
//!
//! Both share the cell representation; a call is a chain whose head cell
//! carries the language marker.  Positional access walks the chain.

use std::fmt;
use std::marker::PhantomData;

use super::dimension::check_index;
use super::{coerce_via, owned, rebind, type_of, View};
use crate::convert::IntoHost;
use crate::error::{BindError, BindResult};
use crate::evaluator;
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::{with_host, Host};

/// Marker of one chain flavour.
pub trait ChainKind {
    const TYPE: SexpType;
    const NAME: &'static str;

    fn prepare(x: Sexp) -> BindResult<Sexp>;
}

#[derive(Debug)]
pub enum PairlistKind {}

impl ChainKind for PairlistKind {
    const TYPE: SexpType = SexpType::Pairlist;
    const NAME: &'static str = "pairlist";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::Pairlist | SexpType::Nil => Ok(x),
            _ => coerce_via("as.pairlist", Self::NAME, x),
        }
    }
}

#[derive(Debug)]
pub enum LanguageKind {}

impl ChainKind for LanguageKind {
    const TYPE: SexpType = SexpType::Language;
    const NAME: &'static str = "language";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::Language => Ok(x),
            _ => coerce_via("as.call", Self::NAME, x),
        }
    }
}

pub type Pairlist = DottedPair<PairlistKind>;
pub type Language = DottedPair<LanguageKind>;

/// A value with the tag its cell should carry.
#[derive(Clone, Debug, PartialEq)]
pub struct Named<T> {
    pub name: String,
    pub value: T,
}

pub fn named<T>(name: impl Into<String>, value: T) -> Named<T> {
    Named {
        name: name.into(),
        value,
    }
}

/// Anything that can be stored in a cell, optionally with a tag.
pub trait IntoCell {
    fn into_cell(self) -> (Sexp, Option<String>);
}

impl<T: IntoHost> IntoCell for T {
    fn into_cell(self) -> (Sexp, Option<String>) {
        (self.into_host(), None)
    }
}

impl<T: IntoHost> IntoCell for Named<T> {
    fn into_cell(self) -> (Sexp, Option<String>) {
        (self.value.into_host(), Some(self.name))
    }
}

fn tag_symbol(h: &mut dyn Host, tag: Option<&str>) -> Option<Sexp> {
    tag.map(|t| h.install(t))
}

/// Cell `n` of the chain starting at `head`.  Caller checks the bound.
fn nth_cell(h: &dyn Host, head: Sexp, n: usize) -> Sexp {
    let mut cursor = head;
    for _ in 0..n {
        cursor = h.cdr(cursor);
    }
    cursor
}

/// View over a pairlist or call.
pub struct DottedPair<K: ChainKind> {
    guard: OwnershipGuard,
    _kind: PhantomData<K>,
}

impl<K: ChainKind> View for DottedPair<K> {
    const KIND: &'static str = K::NAME;

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        K::prepare(x)
    }

    fn from_guard(guard: OwnershipGuard) -> Self {
        Self {
            guard,
            _kind: PhantomData,
        }
    }

    fn guard(&self) -> &OwnershipGuard {
        &self.guard
    }

    fn guard_mut(&mut self) -> &mut OwnershipGuard {
        &mut self.guard
    }
}

impl<K: ChainKind> DottedPair<K> {
    fn is_call() -> bool {
        K::TYPE == SexpType::Language
    }

    /// Give `cell` the head-of-call marker and drop its tag.
    fn mark_head(h: &mut dyn Host, cell: Sexp) {
        if Self::is_call() && cell != h.nil() {
            h.set_type(cell, SexpType::Language);
            let nil = h.nil();
            h.set_tag(cell, nil);
        }
    }

    /// Prepend.  The new head cell becomes the handle of this view.
    pub fn push_front(&mut self, value: impl IntoCell) {
        let (value, tag) = value.into_cell();
        let head = self.sexp();
        let new = with_host(|h| {
            let cell = h.cons(value, head);
            if Self::is_call() {
                if head != h.nil() {
                    h.set_type(head, SexpType::Pairlist);
                }
                Self::mark_head(h, cell);
            } else if let Some(tag) = tag_symbol(h, tag.as_deref()) {
                h.set_tag(cell, tag);
            }
            cell
        });
        rebind(self, new, true);
    }

    pub fn push_back(&mut self, value: impl IntoCell) {
        let (value, tag) = value.into_cell();
        let head = self.sexp();
        let new_head = with_host(|h| {
            let nil = h.nil();
            let cell = h.cons(value, nil);
            if let Some(tag) = tag_symbol(h, tag.as_deref()) {
                h.set_tag(cell, tag);
            }
            if head == nil {
                Self::mark_head(h, cell);
                return Some(cell);
            }
            let mut last = head;
            while h.cdr(last) != nil {
                last = h.cdr(last);
            }
            h.set_cdr(last, cell);
            None
        });
        if let Some(cell) = new_head {
            rebind(self, cell, true);
        }
    }

    /// Insert before position `index`; `index == length()` appends.
    pub fn insert(&mut self, index: usize, value: impl IntoCell) -> BindResult<()> {
        if index == 0 {
            self.push_front(value);
            return Ok(());
        }
        let length = self.length();
        if index > length {
            return Err(BindError::IndexOutOfBounds { index, length });
        }
        let (value, tag) = value.into_cell();
        let head = self.sexp();
        with_host(|h| {
            let prev = nth_cell(h, head, index - 1);
            let rest = h.cdr(prev);
            let cell = h.cons(value, rest);
            if let Some(tag) = tag_symbol(h, tag.as_deref()) {
                h.set_tag(cell, tag);
            }
            h.set_cdr(prev, cell);
        });
        Ok(())
    }

    /// Overwrite the value at `index`; a `Named` value also sets the tag.
    pub fn replace(&mut self, index: usize, value: impl IntoCell) -> BindResult<()> {
        self.at(index)?.set(value);
        Ok(())
    }

    /// Unlink the cell at `index`.  Removing the head makes the tail the
    /// new handle of this view.
    pub fn remove(&mut self, index: usize) -> BindResult<()> {
        check_index(index, self.length())?;
        let head = self.sexp();
        if index == 0 {
            let rest = with_host(|h| {
                let rest = h.cdr(head);
                Self::mark_head(h, rest);
                rest
            });
            rebind(self, rest, false);
            return Ok(());
        }
        with_host(|h| {
            let prev = nth_cell(h, head, index - 1);
            let gone = h.cdr(prev);
            let rest = h.cdr(gone);
            h.set_cdr(prev, rest);
        });
        Ok(())
    }

    pub fn at(&self, index: usize) -> BindResult<CellProxy<'_, K>> {
        check_index(index, self.length())?;
        Ok(CellProxy {
            parent: self,
            index,
        })
    }

    pub fn get(&self, index: usize) -> BindResult<Sexp> {
        Ok(self.at(index)?.get())
    }

    pub fn to_vec(&self) -> Vec<Sexp> {
        let head = self.sexp();
        with_host(|h| {
            let nil = h.nil();
            let mut out = Vec::new();
            let mut cursor = head;
            while cursor != nil {
                out.push(h.car(cursor));
                cursor = h.cdr(cursor);
            }
            out
        })
    }
}

impl DottedPair<PairlistKind> {
    /// The empty pairlist, `NULL`.
    pub fn new() -> Self {
        let nil = with_host(|h| h.nil());
        Self::from_guard(OwnershipGuard::new(nil))
    }
}

impl Default for DottedPair<PairlistKind> {
    fn default() -> Self {
        Self::new()
    }
}

impl DottedPair<LanguageKind> {
    /// The call `name()`.
    pub fn from_symbol(name: &str) -> Self {
        let x = with_host(|h| {
            let sym = h.install(name);
            let nil = h.nil();
            h.lcons(sym, nil)
        });
        Self::from_guard(owned(x))
    }

    /// The call `fun()` for a function value.
    pub fn from_function(fun: Sexp) -> Self {
        let x = with_host(|h| {
            let nil = h.nil();
            h.lcons(fun, nil)
        });
        Self::from_guard(owned(x))
    }

    /// What the call invokes: a symbol or a function value.
    pub fn function(&self) -> Sexp {
        let head = self.sexp();
        with_host(|h| h.car(head))
    }

    pub fn set_symbol(&mut self, name: &str) {
        let head = self.sexp();
        with_host(|h| {
            let sym = h.install(name);
            h.set_car(head, sym);
        });
    }

    /// Evaluate in the global environment.
    pub fn eval(&self) -> BindResult<Sexp> {
        let env = with_host(|h| h.global_env());
        self.eval_in(env)
    }

    pub fn eval_in(&self, env: Sexp) -> BindResult<Sexp> {
        evaluator::eval_in(self.sexp(), env)
    }
}

impl<K: ChainKind> Clone for DottedPair<K> {
    fn clone(&self) -> Self {
        Self::from_guard(self.guard.clone())
    }
}

impl<K: ChainKind> fmt::Debug for DottedPair<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DottedPair")
            .field("kind", &K::NAME)
            .field("sexp", &self.guard.sexp())
            .finish()
    }
}

/// One cell of a chain, found by walking from the head.
pub struct CellProxy<'a, K: ChainKind> {
    parent: &'a DottedPair<K>,
    index: usize,
}

impl<K: ChainKind> CellProxy<'_, K> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cell(&self) -> Sexp {
        let head = self.parent.sexp();
        with_host(|h| nth_cell(h, head, self.index))
    }

    pub fn get(&self) -> Sexp {
        let cell = self.cell();
        with_host(|h| h.car(cell))
    }

    /// Name of the cell's tag, if it has one.
    pub fn tag(&self) -> Option<String> {
        let cell = self.cell();
        with_host(|h| {
            let tag = h.tag(cell);
            (tag != h.nil()).then(|| h.symbol_name(tag).to_owned())
        })
    }

    /// Replace the value.  A `Named` value sets the tag too, except on
    /// the head of a call.
    pub fn set(&self, value: impl IntoCell) {
        let (value, tag) = value.into_cell();
        let cell = self.cell();
        let keep_tag = DottedPair::<K>::is_call() && self.index == 0;
        with_host(|h| {
            h.set_car(cell, value);
            if !keep_tag {
                if let Some(tag) = tag_symbol(h, tag.as_deref()) {
                    h.set_tag(cell, tag);
                }
            }
        });
    }

    /// Copy another cell's value; the right-hand side is read first.
    pub fn set_from<L: ChainKind>(&self, other: &CellProxy<'_, L>) {
        self.set(other.get());
    }
}

impl<K: ChainKind> fmt::Debug for CellProxy<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellProxy")
            .field("parent", &self.parent.sexp())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{as_value, wrap};
    use crate::test_support::{nil, pins};

    fn ints(p: &Pairlist) -> Vec<i32> {
        p.to_vec()
            .into_iter()
            .map(|x| as_value::<i32>(x).unwrap())
            .collect()
    }

    #[test]
    fn push_and_insert_keep_order() {
        let mut p = Pairlist::new();
        assert!(p.is_null());
        p.push_back(2);
        p.push_front(1);
        p.push_back(4);
        p.insert(2, 3).unwrap();
        p.insert(4, 5).unwrap();
        assert_eq!(ints(&p), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            p.insert(7, 0),
            Err(BindError::IndexOutOfBounds {
                index: 7,
                length: 5
            })
        );
        assert_eq!(p.sexp_type(), SexpType::Pairlist);
    }

    #[test]
    fn named_values_set_tags() {
        let mut p = Pairlist::new();
        p.push_back(named("a", 1));
        p.push_front(named("z", 0));
        assert_eq!(p.at(0).unwrap().tag().as_deref(), Some("z"));
        assert_eq!(p.at(1).unwrap().tag().as_deref(), Some("a"));
        p.replace(1, named("b", 10)).unwrap();
        assert_eq!(p.at(1).unwrap().tag().as_deref(), Some("b"));
        p.at(1).unwrap().set(11);
        assert_eq!(p.at(1).unwrap().tag().as_deref(), Some("b"), "plain set keeps tag");
    }

    #[test]
    fn remove_head_yields_tail_handle() {
        let mut p = Pairlist::new();
        for i in [3, 2, 1] {
            p.push_front(i);
        }
        let old = p.sexp();
        let tail = with_host(|h| h.cdr(old));
        p.remove(0).unwrap();
        assert_eq!(p.sexp(), tail);
        assert_eq!(ints(&p), vec![2, 3]);
        assert_eq!(pins(tail), 1, "owned chains stay pinned across head removal");
        assert_eq!(pins(old), 0);
        p.remove(1).unwrap();
        assert_eq!(ints(&p), vec![2]);
        p.remove(0).unwrap();
        assert_eq!(p.sexp(), nil());
        assert!(p.remove(0).is_err());
    }

    #[test]
    fn language_head_keeps_call_marker() {
        let mut call = Language::from_symbol("+");
        call.push_back(1);
        call.push_back(2);
        assert_eq!(call.eval().and_then(as_value::<i32>), Ok(3));

        call.push_front(named("ignored", wrap(0)));
        assert_eq!(call.sexp_type(), SexpType::Language);
        assert_eq!(call.at(0).unwrap().tag(), None);
        let second = call.at(1).unwrap().cell();
        assert_eq!(with_host(|h| h.type_of(second)), SexpType::Pairlist);

        call.remove(0).unwrap();
        assert_eq!(call.sexp_type(), SexpType::Language);
        assert_eq!(call.eval().and_then(as_value::<i32>), Ok(3));
    }

    #[test]
    fn set_symbol_changes_the_function() {
        let mut call = Language::from_symbol("+");
        call.push_back(6);
        call.push_back(3);
        call.set_symbol("/");
        assert_eq!(call.eval().and_then(as_value::<f64>), Ok(2.0));
        call.at(0).unwrap().set(named("tagless", with_host(|h| h.install("*"))));
        assert_eq!(call.at(0).unwrap().tag(), None);
        assert_eq!(call.eval().and_then(as_value::<f64>), Ok(18.0));
    }

    #[test]
    fn failing_call_reports_message() {
        let mut call = Language::from_symbol("stop");
        call.push_back("bad input");
        assert_eq!(call.eval(), Err(BindError::Evaluation("bad input".into())));
    }

    #[test]
    fn lists_coerce_to_chains() {
        let list = crate::views::List::from_elements(&[wrap(1), wrap(2)]);
        let p = Pairlist::from_sexp(list.sexp()).unwrap();
        assert_eq!(ints(&p), vec![1, 2]);

        let parts = crate::views::List::from_elements(&[with_host(|h| h.install("+")), wrap(1), wrap(4)]);
        let call = Language::from_sexp(parts.sexp()).unwrap();
        assert_eq!(call.sexp_type(), SexpType::Language);
        assert_eq!(call.eval().and_then(as_value::<i32>), Ok(5));

        assert!(matches!(
            Language::from_sexp(wrap(1)),
            Err(BindError::TypeMismatch { expected: "language", .. })
        ));
    }

    #[test]
    fn cell_proxy_copy() {
        let mut p = Pairlist::new();
        p.push_back(1);
        p.push_back(2);
        p.at(0).unwrap().set_from(&p.at(1).unwrap());
        assert_eq!(ints(&p), vec![2, 2]);
        assert!(p.at(2).is_err());
    }
}
