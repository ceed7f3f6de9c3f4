//! Generic vectors (lists) and expression vectors.

use std::fmt;
use std::marker::PhantomData;

use super::dimension::check_index;
use super::{coerce_via, owned, type_mismatch, type_of, View};
use crate::convert::{FromHost, IntoHost};
use crate::error::BindResult;
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

/// Tag and conversion rule of a vector of handles.
pub trait VectorKind {
    const TYPE: SexpType;
    const NAME: &'static str;

    fn prepare(x: Sexp) -> BindResult<Sexp>;
}

#[derive(Debug)]
pub enum ListKind {}

impl VectorKind for ListKind {
    const TYPE: SexpType = SexpType::List;
    const NAME: &'static str = "list";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        let ty = type_of(x);
        if ty == SexpType::List {
            return Ok(x);
        }
        let coercible = ty == SexpType::Nil
            || ty == SexpType::Pairlist
            || ty == SexpType::Expression
            || (ty.is_vector() && ty != SexpType::List);
        if !coercible {
            return Err(type_mismatch(Self::NAME, x));
        }
        with_host(|h| h.coerce_vector(x, SexpType::List)).ok_or_else(|| type_mismatch(Self::NAME, x))
    }
}

#[derive(Debug)]
pub enum ExpressionKind {}

impl VectorKind for ExpressionKind {
    const TYPE: SexpType = SexpType::Expression;
    const NAME: &'static str = "expression";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        if type_of(x) == SexpType::Expression {
            Ok(x)
        } else {
            coerce_via("as.expression", Self::NAME, x)
        }
    }
}

pub type List = SexpVector<ListKind>;
pub type GenericVector = SexpVector<ListKind>;
pub type ExpressionVector = SexpVector<ExpressionKind>;

/// View over a vector whose elements are handles.
pub struct SexpVector<K: VectorKind> {
    guard: OwnershipGuard,
    _kind: PhantomData<K>,
}

impl<K: VectorKind> View for SexpVector<K> {
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

impl<K: VectorKind> SexpVector<K> {
    /// Vector of `len` elements, each `NULL`.
    pub fn with_len(len: usize) -> Self {
        let x = with_host(|h| h.alloc_vector(K::TYPE, len));
        Self::from_guard(owned(x))
    }

    pub fn from_elements(items: &[Sexp]) -> Self {
        let x = with_host(|h| {
            let x = h.alloc_vector(K::TYPE, items.len());
            for (i, &item) in items.iter().enumerate() {
                h.set_vector_elt(x, i, item);
            }
            x
        });
        Self::from_guard(owned(x))
    }

    pub fn at(&self, index: usize) -> BindResult<ElementProxy<'_, K>> {
        check_index(index, self.length())?;
        Ok(ElementProxy {
            parent: self,
            index,
        })
    }

    pub fn get(&self, index: usize) -> BindResult<Sexp> {
        Ok(self.at(index)?.get())
    }

    pub fn set(&self, index: usize, value: impl IntoHost) -> BindResult<()> {
        self.at(index)?.set(value);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<Sexp> {
        let x = self.sexp();
        with_host(|h| (0..h.length(x)).map(|i| h.vector_elt(x, i)).collect())
    }
}

impl<K: VectorKind> Clone for SexpVector<K> {
    fn clone(&self) -> Self {
        Self::from_guard(self.guard.clone())
    }
}

impl<K: VectorKind> fmt::Debug for SexpVector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SexpVector")
            .field("kind", &K::NAME)
            .field("sexp", &self.guard.sexp())
            .finish()
    }
}

/// One slot of a list or expression vector.
pub struct ElementProxy<'a, K: VectorKind> {
    parent: &'a SexpVector<K>,
    index: usize,
}

impl<K: VectorKind> ElementProxy<'_, K> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self) -> Sexp {
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| h.vector_elt(x, i))
    }

    /// Replace the slot.  The value is wrapped before the slot is touched.
    pub fn set(&self, value: impl IntoHost) {
        let value = value.into_host();
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| h.set_vector_elt(x, i, value));
    }

    /// Copy another slot's handle; the right-hand side is read first.
    pub fn set_from<L: VectorKind>(&self, other: &ElementProxy<'_, L>) {
        self.set(other.get());
    }

    pub fn convert<T: FromHost>(&self) -> BindResult<T> {
        T::from_host(self.get())
    }
}

impl<K: VectorKind> fmt::Debug for ElementProxy<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementProxy")
            .field("parent", &self.parent.sexp())
            .field("index", &self.index)
            .finish()
    }
}
