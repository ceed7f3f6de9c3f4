//! Dimensions and the shared bounds check.

use std::ops::Index;

use crate::error::{BindError, BindResult};
use crate::gc::{Sexp, SexpType};
use crate::host::{with_host, Host};

/// Bounds check shared by every indexed entry point.
#[inline]
pub fn check_index(index: usize, length: usize) -> BindResult<()> {
    if index < length {
        Ok(())
    } else {
        Err(BindError::IndexOutOfBounds { index, length })
    }
}

/// Extents of an array, outermost last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dimension {
    dims: Vec<usize>,
}

impl Dimension {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn matrix(nrow: usize, ncol: usize) -> Self {
        Self::new(vec![nrow, ncol])
    }

    /// Read the `dim` attribute of `x`; `None` when it has none.
    pub fn of(x: Sexp) -> Option<Self> {
        with_host(|h| Self::read(h, x))
    }

    pub(crate) fn read(h: &dyn Host, x: Sexp) -> Option<Self> {
        let dim = h.get_attrib(x, "dim");
        if h.type_of(dim) != SexpType::Integer {
            return None;
        }
        let mut dims = Vec::with_capacity(h.length(dim));
        for i in 0..h.length(dim) {
            let v = h.integer_elt(dim, i);
            dims.push(usize::try_from(v).ok()?);
        }
        Some(Self { dims })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements an array of these extents holds, `None` on
    /// overflow.
    pub fn prod(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }

    /// Element count, checking that the extents also fit the host's
    /// integer `dim` attribute.
    pub(crate) fn checked_len(&self) -> BindResult<usize> {
        let overflow = || BindError::DimensionOverflow(self.dims.clone());
        if self.dims.iter().any(|&d| i32::try_from(d).is_err()) {
            return Err(overflow());
        }
        self.prod().ok_or_else(overflow)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.dims
    }

    /// Column-major offset of `(row, col)`; each index is checked against
    /// its own extent.
    pub fn offset(&self, row: usize, col: usize) -> BindResult<usize> {
        match self.dims.as_slice() {
            &[nrow, ncol] => {
                check_index(row, nrow)?;
                check_index(col, ncol)?;
                Ok(row + nrow * col)
            }
            _ => Err(BindError::NotAMatrix),
        }
    }

    pub(crate) fn to_i32(&self) -> Vec<i32> {
        self.dims
            .iter()
            .map(|&d| i32::try_from(d).unwrap_or(i32::MAX))
            .collect()
    }
}

impl Index<usize> for Dimension {
    type Output = usize;

    fn index(&self, i: usize) -> &usize {
        &self.dims[i]
    }
}

impl From<Vec<usize>> for Dimension {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_index_boundaries() {
        assert!(check_index(0, 1).is_ok());
        assert_eq!(
            check_index(1, 1),
            Err(BindError::IndexOutOfBounds {
                index: 1,
                length: 1
            })
        );
        assert!(check_index(0, 0).is_err());
    }

    #[test]
    fn matrix_offset_is_column_major() {
        let d = Dimension::matrix(3, 2);
        assert_eq!(d.offset(0, 0), Ok(0));
        assert_eq!(d.offset(2, 0), Ok(2));
        assert_eq!(d.offset(1, 1), Ok(4));
        assert_eq!(d.prod(), Some(6));
    }

    #[test]
    fn matrix_offset_checks_each_extent() {
        let d = Dimension::matrix(3, 2);
        // 3 < 6 elements but the row is out of range.
        assert_eq!(
            d.offset(3, 0),
            Err(BindError::IndexOutOfBounds {
                index: 3,
                length: 3
            })
        );
        assert!(d.offset(0, 2).is_err());
    }

    #[test]
    fn oversized_extents_are_rejected() {
        let huge = Dimension::matrix(usize::MAX / 2, 3);
        assert_eq!(huge.prod(), None);
        assert_eq!(
            huge.checked_len(),
            Err(BindError::DimensionOverflow(vec![usize::MAX / 2, 3]))
        );
        let wide = Dimension::matrix(1, i32::MAX as usize + 1);
        assert!(wide.prod().is_some());
        assert!(wide.checked_len().is_err());
        assert_eq!(Dimension::matrix(3, 4).checked_len(), Ok(12));
    }

    #[test]
    fn rank_other_than_two_is_not_a_matrix() {
        assert_eq!(Dimension::new(vec![4]).offset(0, 0), Err(BindError::NotAMatrix));
        assert_eq!(Dimension::new(vec![2, 2, 2]).offset(0, 0), Err(BindError::NotAMatrix));
    }
}
