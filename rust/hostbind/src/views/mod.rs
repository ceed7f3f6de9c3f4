//! Typed views over host values.
//!
//! A view is an [`OwnershipGuard`] plus whatever the kind caches (a raw
//! storage pointer for flat vectors).  Construction checks the host tag and
//! coerces when the kind allows it; every change of the underlying handle
//! goes through one path that re-pins as needed and fires [`View::update`]
//! exactly once.

mod character;
mod dimension;
mod environment;
mod function;
mod generic;
mod pairlist;
mod promise;
mod simple;
mod symbol;
mod weakref;

pub use character::{CharacterVector, StringProxy};
pub use dimension::{check_index, Dimension};
pub use environment::{BindingProxy, Environment};
pub use function::Function;
pub use generic::{
    ElementProxy, ExpressionKind, ExpressionVector, GenericVector, List, ListKind, SexpVector,
    VectorKind,
};
pub use pairlist::{
    named, CellProxy, ChainKind, DottedPair, IntoCell, Language, LanguageKind, Named, Pairlist,
    PairlistKind,
};
pub use promise::Promise;
pub use simple::{
    ComplexKind, ComplexVector, IntegerKind, IntegerVector, LogicalKind, LogicalVector,
    NumericVector, RawKind, RawVector, RealKind, SimpleKind, SimpleVector,
};
pub use symbol::Symbol;
pub use weakref::WeakReference;

use crate::convert::FromHost;
use crate::error::{BindError, BindResult};
use crate::evaluator::ProtectedEvaluator;
use crate::gc::{Sexp, SexpType};
use crate::guard::{OwnershipGuard, PinPolicy};
use crate::host::with_host;

/// Common surface of every typed view.
pub trait View: Sized {
    /// Kind name reported in [`BindError::TypeMismatch`].
    const KIND: &'static str;

    /// Validate `x` for this kind, coercing when the kind allows it.
    /// Returns `x` itself when no coercion was needed.
    fn prepare(x: Sexp) -> BindResult<Sexp>;

    /// Wrap a guard whose handle already passed `prepare`.  Cached state
    /// must be fresh on return.
    fn from_guard(guard: OwnershipGuard) -> Self;

    fn guard(&self) -> &OwnershipGuard;

    fn guard_mut(&mut self) -> &mut OwnershipGuard;

    /// Refresh cached state after the handle changed.
    fn update(&mut self) {}

    /// View over an existing value.  A value that had to be coerced is a
    /// fresh allocation and is pinned for the life of the view.
    fn from_sexp(x: Sexp) -> BindResult<Self> {
        let prepared = Self::prepare(x)?;
        let policy = if prepared == x {
            PinPolicy::Manual
        } else {
            PinPolicy::Always
        };
        Ok(Self::from_guard(OwnershipGuard::with_policy(prepared, policy)))
    }

    /// Point the view at another value.  On error the view is untouched
    /// and `update` does not run.
    fn assign(&mut self, x: Sexp) -> BindResult<()> {
        let prepared = Self::prepare(x)?;
        rebind(self, prepared, prepared != x);
        Ok(())
    }

    fn sexp(&self) -> Sexp {
        self.guard().sexp()
    }

    fn length(&self) -> usize {
        let x = self.sexp();
        with_host(|h| h.length(x))
    }

    fn size(&self) -> usize {
        let x = self.sexp();
        with_host(|h| h.length(x))
    }

    fn is_null(&self) -> bool {
        self.sexp_type() == SexpType::Nil
    }

    fn sexp_type(&self) -> SexpType {
        let x = self.sexp();
        with_host(|h| h.type_of(x))
    }

    fn attribute_names(&self) -> Vec<String> {
        let x = self.sexp();
        with_host(|h| h.attribute_names(x))
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute_names().iter().any(|n| n == name)
    }

    /// Attribute value, `NULL` when absent.
    fn attr(&self, name: &str) -> Sexp {
        let x = self.sexp();
        with_host(|h| h.get_attrib(x, name))
    }

    /// Set an attribute; `NULL` removes it.
    fn set_attr(&mut self, name: &str, value: Sexp) {
        let x = self.sexp();
        with_host(|h| h.set_attrib(x, name, value));
    }

    fn preserve(&mut self) {
        self.guard_mut().preserve();
    }

    fn release(&mut self) {
        self.guard_mut().release();
    }

    fn convert<T: FromHost>(&self) -> BindResult<T> {
        T::from_host(self.sexp())
    }
}

/// Swap the handle under `view`.  A fresh allocation, or a replacement for
/// a value the view had pinned, is pinned in turn.
pub(crate) fn rebind<V: View>(view: &mut V, new: Sexp, fresh: bool) {
    let was_pinned = view.guard().is_preserved();
    let guard = view.guard_mut();
    if guard.reassign(new) {
        if fresh || was_pinned {
            guard.preserve();
        }
        view.update();
    }
}

/// Guard for a value the view just allocated.
pub(crate) fn owned(x: Sexp) -> OwnershipGuard {
    OwnershipGuard::pinned(x)
}

pub(crate) fn type_of(x: Sexp) -> SexpType {
    with_host(|h| h.type_of(x))
}

pub(crate) fn type_mismatch(expected: &'static str, x: Sexp) -> BindError {
    BindError::TypeMismatch {
        expected,
        found: type_of(x),
    }
}

/// Convert `x` by evaluating `fun(quote(x))` in the global environment.
/// Failure is reported as a mismatch against `expected`.
pub(crate) fn coerce_via(fun: &str, expected: &'static str, x: Sexp) -> BindResult<Sexp> {
    let call = with_host(|h| {
        let nil = h.nil();
        let quote = h.install("quote");
        let quoted = h.cons(x, nil);
        let quoted = h.lcons(quote, quoted);
        let args = h.cons(quoted, nil);
        let f = h.install(fun);
        h.lcons(f, args)
    });
    let mut ev = ProtectedEvaluator::new(call);
    ev.run_global();
    if ev.successful() {
        Ok(ev.result())
    } else {
        Err(type_mismatch(expected, x))
    }
}

/// The most specific view for a value, chosen by its tag.
#[derive(Debug)]
pub enum AnyView {
    Null(OwnershipGuard),
    Integer(IntegerVector),
    Numeric(NumericVector),
    Logical(LogicalVector),
    Raw(RawVector),
    Complex(ComplexVector),
    Character(CharacterVector),
    List(List),
    Expression(ExpressionVector),
    Pairlist(Pairlist),
    Language(Language),
    Environment(Environment),
    Function(Function),
    Promise(Promise),
    WeakReference(WeakReference),
    Symbol(Symbol),
    /// Tags with no dedicated view (string cells, `...`).
    Other(OwnershipGuard),
}

impl AnyView {
    pub fn from_sexp(x: Sexp) -> BindResult<Self> {
        Ok(match type_of(x) {
            SexpType::Nil => AnyView::Null(OwnershipGuard::new(x)),
            SexpType::Integer => AnyView::Integer(IntegerVector::from_sexp(x)?),
            SexpType::Real => AnyView::Numeric(NumericVector::from_sexp(x)?),
            SexpType::Logical => AnyView::Logical(LogicalVector::from_sexp(x)?),
            SexpType::Raw => AnyView::Raw(RawVector::from_sexp(x)?),
            SexpType::Complex => AnyView::Complex(ComplexVector::from_sexp(x)?),
            SexpType::String => AnyView::Character(CharacterVector::from_sexp(x)?),
            SexpType::List => AnyView::List(List::from_sexp(x)?),
            SexpType::Expression => AnyView::Expression(ExpressionVector::from_sexp(x)?),
            SexpType::Pairlist => AnyView::Pairlist(Pairlist::from_sexp(x)?),
            SexpType::Language => AnyView::Language(Language::from_sexp(x)?),
            SexpType::Environment => AnyView::Environment(Environment::from_sexp(x)?),
            SexpType::Closure | SexpType::Special | SexpType::Builtin => {
                AnyView::Function(Function::from_sexp(x)?)
            }
            SexpType::Promise => AnyView::Promise(Promise::from_sexp(x)?),
            SexpType::WeakRef => AnyView::WeakReference(WeakReference::from_sexp(x)?),
            SexpType::Symbol => AnyView::Symbol(Symbol::from_sexp(x)?),
            SexpType::Char | SexpType::Dots => AnyView::Other(OwnershipGuard::new(x)),
        })
    }

    pub fn sexp(&self) -> Sexp {
        match self {
            AnyView::Null(g) | AnyView::Other(g) => g.sexp(),
            AnyView::Integer(v) => v.sexp(),
            AnyView::Numeric(v) => v.sexp(),
            AnyView::Logical(v) => v.sexp(),
            AnyView::Raw(v) => v.sexp(),
            AnyView::Complex(v) => v.sexp(),
            AnyView::Character(v) => v.sexp(),
            AnyView::List(v) => v.sexp(),
            AnyView::Expression(v) => v.sexp(),
            AnyView::Pairlist(v) => v.sexp(),
            AnyView::Language(v) => v.sexp(),
            AnyView::Environment(v) => v.sexp(),
            AnyView::Function(v) => v.sexp(),
            AnyView::Promise(v) => v.sexp(),
            AnyView::WeakReference(v) => v.sexp(),
            AnyView::Symbol(v) => v.sexp(),
        }
    }
}
