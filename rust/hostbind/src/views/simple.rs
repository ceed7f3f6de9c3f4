//! Flat numeric vectors with direct element access.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use super::dimension::{check_index, Dimension};
use super::{owned, type_mismatch, type_of, View};
use crate::convert::wrap;
use crate::error::{BindError, BindResult};
use crate::gc::{Complex, Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::{with_host, Host};

/// Element type and storage access of one flat vector kind.
pub trait SimpleKind {
    type Elem: Copy + Default + fmt::Debug + PartialEq;
    const TYPE: SexpType;
    const NAME: &'static str;

    fn storage(h: &mut dyn Host, x: Sexp) -> *mut Self::Elem;

    /// Source tags the host may coerce into this kind.
    fn accepts(ty: SexpType) -> bool {
        ty.is_numeric_like()
    }
}

macro_rules! simple_kind {
    ($(#[$meta:meta])* $kind:ident, $elem:ty, $ty:ident, $name:literal, $ptr:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub enum $kind {}

        impl SimpleKind for $kind {
            type Elem = $elem;
            const TYPE: SexpType = SexpType::$ty;
            const NAME: &'static str = $name;

            fn storage(h: &mut dyn Host, x: Sexp) -> *mut $elem {
                h.$ptr(x)
            }
        }
    };
}

simple_kind!(IntegerKind, i32, Integer, "integer", integer_ptr);
simple_kind!(RealKind, f64, Real, "numeric", real_ptr);
simple_kind!(
    /// Logical storage is `i32`: 0, 1 or `NA_LOGICAL`.
    LogicalKind,
    i32,
    Logical,
    "logical",
    logical_ptr
);
simple_kind!(RawKind, u8, Raw, "raw", raw_ptr);

#[derive(Debug)]
pub enum ComplexKind {}

impl SimpleKind for ComplexKind {
    type Elem = Complex;
    const TYPE: SexpType = SexpType::Complex;
    const NAME: &'static str = "complex";

    fn storage(h: &mut dyn Host, x: Sexp) -> *mut Complex {
        h.complex_ptr(x)
    }

    fn accepts(ty: SexpType) -> bool {
        ty.is_numeric_like() || ty == SexpType::Complex
    }
}

pub type IntegerVector = SimpleVector<IntegerKind>;
pub type NumericVector = SimpleVector<RealKind>;
pub type LogicalVector = SimpleVector<LogicalKind>;
pub type RawVector = SimpleVector<RawKind>;
pub type ComplexVector = SimpleVector<ComplexKind>;

/// View over a flat vector, caching the start of its storage.
///
/// References handed out by `at`, `as_slice` and indexing point straight
/// into host memory.  They are valid only until the next host call that
/// can collect or reallocate; do not hold them across evaluation.
pub struct SimpleVector<K: SimpleKind> {
    guard: OwnershipGuard,
    start: *mut K::Elem,
    _kind: PhantomData<K>,
}

impl<K: SimpleKind> View for SimpleVector<K> {
    const KIND: &'static str = K::NAME;

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        let ty = type_of(x);
        if ty == K::TYPE {
            return Ok(x);
        }
        if !K::accepts(ty) {
            return Err(type_mismatch(K::NAME, x));
        }
        with_host(|h| h.coerce_vector(x, K::TYPE)).ok_or_else(|| type_mismatch(K::NAME, x))
    }

    fn from_guard(guard: OwnershipGuard) -> Self {
        let mut v = Self {
            guard,
            start: std::ptr::null_mut(),
            _kind: PhantomData,
        };
        v.update();
        v
    }

    fn guard(&self) -> &OwnershipGuard {
        &self.guard
    }

    fn guard_mut(&mut self) -> &mut OwnershipGuard {
        &mut self.guard
    }

    fn update(&mut self) {
        let x = self.guard.sexp();
        self.start = with_host(|h| K::storage(h, x));
    }
}

impl<K: SimpleKind> SimpleVector<K> {
    /// Fresh zero-filled vector.
    pub fn with_len(len: usize) -> Self {
        let x = with_host(|h| h.alloc_vector(K::TYPE, len));
        let mut v = Self::from_guard(owned(x));
        v.as_mut_slice().fill(K::Elem::default());
        v
    }

    /// Fresh zero-filled array; rank-2 and higher get a `dim` attribute.
    pub fn with_dim(dim: Dimension) -> BindResult<Self> {
        let mut v = Self::with_len(dim.checked_len()?);
        if dim.rank() > 1 {
            let dims = wrap(dim.to_i32());
            v.set_attr("dim", dims);
        }
        Ok(v)
    }

    pub fn from_slice(values: &[K::Elem]) -> Self {
        let mut v = Self::with_len(values.len());
        v.as_mut_slice().copy_from_slice(values);
        v
    }

    pub fn as_slice(&self) -> &[K::Elem] {
        let len = self.length();
        // SAFETY: `start` was taken from the current handle by `update` and
        // the host keeps `len` elements there until it collects or resizes.
        unsafe { std::slice::from_raw_parts(self.start, len) }
    }

    /// Mutable access to the host storage.
    ///
    /// `&mut self` only makes this view exclusive.  A clone, or a second
    /// view built from the same handle, points at the same storage, so
    /// mutable slices taken from both must never be alive at once.
    pub fn as_mut_slice(&mut self) -> &mut [K::Elem] {
        let len = self.length();
        // SAFETY: as for `as_slice`; no other view of this value may hold a
        // live borrow of the storage (see above).
        unsafe { std::slice::from_raw_parts_mut(self.start, len) }
    }

    pub fn at(&self, i: usize) -> BindResult<&K::Elem> {
        check_index(i, self.length())?;
        // SAFETY: bounds checked above.
        Ok(unsafe { &*self.start.add(i) })
    }

    pub fn at_mut(&mut self, i: usize) -> BindResult<&mut K::Elem> {
        check_index(i, self.length())?;
        // SAFETY: bounds checked above.
        Ok(unsafe { &mut *self.start.add(i) })
    }

    pub fn get(&self, i: usize) -> BindResult<K::Elem> {
        self.at(i).copied()
    }

    pub fn set(&mut self, i: usize, value: K::Elem) -> BindResult<()> {
        *self.at_mut(i)? = value;
        Ok(())
    }

    pub fn dim(&self) -> Option<Dimension> {
        Dimension::of(self.sexp())
    }

    /// Element `(row, col)` of a matrix, column-major.
    pub fn at_matrix(&self, row: usize, col: usize) -> BindResult<&K::Elem> {
        let offset = self.dim().ok_or(BindError::NotAMatrix)?.offset(row, col)?;
        self.at(offset)
    }

    pub fn at_matrix_mut(&mut self, row: usize, col: usize) -> BindResult<&mut K::Elem> {
        let offset = self.dim().ok_or(BindError::NotAMatrix)?.offset(row, col)?;
        self.at_mut(offset)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, K::Elem> {
        self.as_slice().iter()
    }

    pub fn to_vec(&self) -> Vec<K::Elem> {
        self.as_slice().to_vec()
    }
}

impl<K: SimpleKind> Clone for SimpleVector<K> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            start: self.start,
            _kind: PhantomData,
        }
    }
}

impl<K: SimpleKind> fmt::Debug for SimpleVector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleVector")
            .field("kind", &K::NAME)
            .field("sexp", &self.guard.sexp())
            .finish()
    }
}

impl<K: SimpleKind> Index<usize> for SimpleVector<K> {
    type Output = K::Elem;

    fn index(&self, i: usize) -> &K::Elem {
        match self.at(i) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<K: SimpleKind> IndexMut<usize> for SimpleVector<K> {
    fn index_mut(&mut self, i: usize) -> &mut K::Elem {
        match self.at_mut(i) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<K: SimpleKind> FromIterator<K::Elem> for SimpleVector<K> {
    fn from_iter<I: IntoIterator<Item = K::Elem>>(iter: I) -> Self {
        let values: Vec<K::Elem> = iter.into_iter().collect();
        Self::from_slice(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{NA_INTEGER, NA_LOGICAL};
    use crate::test_support::{nil, pins};

    #[test]
    fn with_len_zero_fills_and_pins() {
        let v = NumericVector::with_len(4);
        assert_eq!(v.to_vec(), vec![0.0; 4]);
        assert_eq!(pins(v.sexp()), 1);
        let r = RawVector::with_len(2);
        assert_eq!(r.to_vec(), vec![0u8, 0]);
        let c = ComplexVector::with_len(1);
        assert_eq!(c[0], Complex::new(0.0, 0.0));
    }

    #[test]
    fn writes_go_straight_to_host_storage() {
        let mut v = IntegerVector::with_len(3);
        v[1] = 7;
        v.set(2, 9).unwrap();
        let again = IntegerVector::from_sexp(v.sexp()).unwrap();
        assert_eq!(again.to_vec(), vec![0, 7, 9]);
    }

    #[test]
    fn at_checks_bounds() {
        let v = IntegerVector::from_slice(&[1, 2]);
        assert_eq!(v.at(1), Ok(&2));
        assert_eq!(
            v.at(2),
            Err(BindError::IndexOutOfBounds {
                index: 2,
                length: 2
            })
        );
        let empty = IntegerVector::with_len(0);
        assert!(empty.at(0).is_err());
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn index_operator_panics_out_of_range() {
        let v = NumericVector::with_len(1);
        let _ = v[1];
    }

    #[test]
    fn numeric_tags_are_coerced() {
        let ints = IntegerVector::from_slice(&[1, NA_INTEGER, 3]);
        let reals = NumericVector::from_sexp(ints.sexp()).unwrap();
        assert_ne!(reals.sexp(), ints.sexp());
        assert_eq!(reals.get(0), Ok(1.0));
        assert!(crate::gc::is_na_real(reals.get(1).unwrap()));

        let logical = LogicalVector::from_sexp(ints.sexp()).unwrap();
        assert_eq!(logical.to_vec(), vec![1, NA_LOGICAL, 1]);

        let raw = RawVector::from_sexp(ints.sexp()).unwrap();
        assert_eq!(raw.to_vec(), vec![1, 0, 3]);

        let complex = ComplexVector::from_sexp(ints.sexp()).unwrap();
        assert_eq!(complex[2], Complex::new(3.0, 0.0));
    }

    #[test]
    fn incompatible_tags_are_rejected() {
        let s = wrap("1");
        assert_eq!(
            IntegerVector::from_sexp(s).unwrap_err(),
            BindError::TypeMismatch {
                expected: "integer",
                found: SexpType::String
            }
        );
        let c = ComplexVector::with_len(1);
        assert!(NumericVector::from_sexp(c.sexp()).is_err());
        assert!(LogicalVector::from_sexp(nil()).is_err());
    }

    #[test]
    fn matrix_access() {
        let mut m = IntegerVector::with_dim(Dimension::matrix(2, 3)).unwrap();
        assert_eq!(m.dim(), Some(Dimension::matrix(2, 3)));
        assert_eq!(m.length(), 6);
        for (i, x) in m.as_mut_slice().iter_mut().enumerate() {
            *x = i as i32;
        }
        assert_eq!(m.at_matrix(1, 2), Ok(&5));
        *m.at_matrix_mut(0, 1).unwrap() = 40;
        assert_eq!(m[2], 40);
        assert_eq!(
            m.at_matrix(2, 0),
            Err(BindError::IndexOutOfBounds {
                index: 2,
                length: 2
            })
        );
    }

    #[test]
    fn three_by_four_matrix_offsets() {
        let mut m = IntegerVector::with_dim(Dimension::matrix(3, 4)).unwrap();
        for (i, x) in m.as_mut_slice().iter_mut().enumerate() {
            *x = i as i32;
        }
        assert_eq!(m.at_matrix(2, 3), Ok(&11));
        assert_eq!(m.at_matrix(1, 2), Ok(&7));
        assert!(m.at_matrix(3, 0).is_err());
        assert!(m.at_matrix(0, 4).is_err());
    }

    #[test]
    fn coerced_matrix_keeps_its_shape() {
        let mut m = IntegerVector::with_dim(Dimension::matrix(3, 4)).unwrap();
        for (i, x) in m.as_mut_slice().iter_mut().enumerate() {
            *x = i as i32;
        }
        let reals = NumericVector::from_sexp(m.sexp()).unwrap();
        assert_ne!(reals.sexp(), m.sexp());
        assert_eq!(reals.dim(), Some(Dimension::matrix(3, 4)));
        assert_eq!(reals.at_matrix(2, 3), Ok(&11.0));
    }

    #[test]
    fn clones_share_storage() {
        let mut a = IntegerVector::from_slice(&[1, 2]);
        let b = a.clone();
        a.as_mut_slice()[0] = 10;
        assert_eq!(b.to_vec(), vec![10, 2]);
        assert_eq!(pins(a.sexp()), 2);
    }

    #[test]
    fn oversized_dim_is_an_error() {
        let r = NumericVector::with_dim(Dimension::matrix(usize::MAX, 2));
        assert!(matches!(r, Err(BindError::DimensionOverflow(_))));
    }

    #[test]
    fn vectors_without_rank_two_dim_are_not_matrices() {
        let v = NumericVector::with_len(4);
        assert_eq!(v.at_matrix(0, 0), Err(BindError::NotAMatrix));
        let cube = NumericVector::with_dim(Dimension::new(vec![2, 2, 2])).unwrap();
        assert_eq!(cube.length(), 8);
        assert_eq!(cube.at_matrix(0, 0), Err(BindError::NotAMatrix));
        let flat = NumericVector::with_dim(Dimension::new(vec![3])).unwrap();
        assert!(!flat.has_attribute("dim"));
    }

    #[test]
    fn assign_refreshes_the_cached_pointer() {
        let mut v = IntegerVector::from_slice(&[1]);
        let other = IntegerVector::from_slice(&[5, 6]);
        v.assign(other.sexp()).unwrap();
        assert_eq!(v.to_vec(), vec![5, 6]);
        v.assign(wrap(vec![2.9])).unwrap();
        assert_eq!(v.to_vec(), vec![2]);
    }

    #[test]
    fn cached_storage_survives_collection_while_pinned() {
        let v: NumericVector = [1.5, 2.5].into_iter().collect();
        with_host(|h| h.collect_garbage());
        assert_eq!(v.to_vec(), vec![1.5, 2.5]);
    }
}
