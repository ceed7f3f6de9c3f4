//! Character vectors and their string proxies.

use super::dimension::{check_index, Dimension};
use super::{owned, type_mismatch, type_of, View};
use crate::error::{BindError, BindResult};
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

/// View over a character vector.  Elements are host string cells, so
/// access goes through [`StringProxy`] rather than a raw pointer.
#[derive(Clone, Debug)]
pub struct CharacterVector {
    guard: OwnershipGuard,
}

impl View for CharacterVector {
    const KIND: &'static str = "character";

    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::String => Ok(x),
            _ => Err(type_mismatch(Self::KIND, x)),
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

impl CharacterVector {
    /// Vector of `len` empty strings.
    pub fn with_len(len: usize) -> Self {
        let x = with_host(|h| h.alloc_vector(SexpType::String, len));
        Self::from_guard(owned(x))
    }

    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        let x = with_host(|h| {
            let x = h.alloc_vector(SexpType::String, values.len());
            for (i, s) in values.iter().enumerate() {
                let c = h.mk_char(Some(s.as_ref()));
                h.set_string_elt(x, i, c);
            }
            x
        });
        Self::from_guard(owned(x))
    }

    /// Explicit conversion: atomic vectors and symbols are turned into
    /// their string forms.
    pub fn coerce(x: Sexp) -> BindResult<Self> {
        let ty = type_of(x);
        if ty == SexpType::String {
            return Self::from_sexp(x);
        }
        let atomic = matches!(
            ty,
            SexpType::Logical
                | SexpType::Integer
                | SexpType::Real
                | SexpType::Complex
                | SexpType::Raw
                | SexpType::Symbol
        );
        if !atomic {
            return Err(type_mismatch(Self::KIND, x));
        }
        let converted = with_host(|h| h.coerce_vector(x, SexpType::String))
            .ok_or_else(|| type_mismatch(Self::KIND, x))?;
        Ok(Self::from_guard(owned(converted)))
    }

    pub fn at(&self, index: usize) -> BindResult<StringProxy<'_>> {
        check_index(index, self.length())?;
        Ok(StringProxy {
            parent: self,
            index,
        })
    }

    pub fn dim(&self) -> Option<Dimension> {
        Dimension::of(self.sexp())
    }

    /// Element `(row, col)` of a character matrix, column-major.
    pub fn at_matrix(&self, row: usize, col: usize) -> BindResult<StringProxy<'_>> {
        let offset = self.dim().ok_or(BindError::NotAMatrix)?.offset(row, col)?;
        self.at(offset)
    }

    /// Element `index`; `None` for the missing string.
    pub fn get(&self, index: usize) -> BindResult<Option<String>> {
        Ok(self.at(index)?.get())
    }

    pub fn set(&self, index: usize, value: &str) -> BindResult<()> {
        self.at(index)?.set(value);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<Option<String>> {
        let x = self.sexp();
        with_host(|h| {
            (0..h.length(x))
                .map(|i| {
                    let c = h.string_elt(x, i);
                    h.char_str(c).map(str::to_owned)
                })
                .collect()
        })
    }
}

/// One element of a [`CharacterVector`].
///
/// Writing allocates a new string cell and stores it in the slot; the
/// proxy never owns anything.
#[derive(Clone, Copy, Debug)]
pub struct StringProxy<'a> {
    parent: &'a CharacterVector,
    index: usize,
}

impl StringProxy<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The string cell currently in the slot.
    pub fn cell(&self) -> Sexp {
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| h.string_elt(x, i))
    }

    pub fn get(&self) -> Option<String> {
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| {
            let c = h.string_elt(x, i);
            h.char_str(c).map(str::to_owned)
        })
    }

    pub fn is_na(&self) -> bool {
        self.get().is_none()
    }

    pub fn set(&self, value: &str) {
        self.store(Some(value));
    }

    pub fn set_na(&self) {
        self.store(None);
    }

    /// Copy another element's value; the right-hand side is read first.
    pub fn set_from(&self, other: &StringProxy<'_>) {
        let cell = other.cell();
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| h.set_string_elt(x, i, cell));
    }

    /// Append to the element.  A missing string reads as `"NA"`.
    pub fn push_str(&self, suffix: &str) {
        let mut full = self.get().unwrap_or_else(|| "NA".to_owned());
        full.push_str(suffix);
        self.set(&full);
    }

    fn store(&self, value: Option<&str>) {
        let (x, i) = (self.parent.sexp(), self.index);
        with_host(|h| {
            let c = h.mk_char(value);
            h.set_string_elt(x, i, c);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::wrap;
    use crate::test_support::pins;

    #[test]
    fn with_len_uses_host_default() {
        let v = CharacterVector::with_len(2);
        assert_eq!(v.to_vec(), vec![Some(String::new()), Some(String::new())]);
        assert_eq!(pins(v.sexp()), 1);
    }

    #[test]
    fn matrix_access_by_row_and_column() {
        let mut m = CharacterVector::from_strs(&["a", "b", "c", "d", "e", "f"]);
        assert_eq!(m.at_matrix(0, 0).unwrap_err(), BindError::NotAMatrix);
        m.set_attr("dim", wrap(vec![2, 3]));
        assert_eq!(m.dim(), Some(Dimension::matrix(2, 3)));
        assert_eq!(m.at_matrix(1, 2).unwrap().get().as_deref(), Some("f"));
        m.at_matrix(0, 1).unwrap().set("C");
        assert_eq!(m.get(2).unwrap().as_deref(), Some("C"));
        assert_eq!(
            m.at_matrix(2, 0).unwrap_err(),
            BindError::IndexOutOfBounds {
                index: 2,
                length: 2
            }
        );
    }

    #[test]
    fn proxy_reads_and_writes() {
        let v = CharacterVector::from_strs(&["a", "b"]);
        let p = v.at(1).unwrap();
        assert_eq!(p.get().as_deref(), Some("b"));
        p.set("z");
        p.push_str("!");
        assert_eq!(v.get(1).unwrap().as_deref(), Some("z!"));
        p.set_na();
        assert!(p.is_na());
        p.push_str("x");
        assert_eq!(p.get().as_deref(), Some("NAx"));
    }

    #[test]
    fn proxy_to_proxy_copies_value() {
        let v = CharacterVector::from_strs(&["left", "right"]);
        v.at(0).unwrap().set_from(&v.at(1).unwrap());
        assert_eq!(v.to_vec(), vec![Some("right".into()), Some("right".into())]);
        v.at(1).unwrap().set("changed");
        assert_eq!(v.get(0).unwrap().as_deref(), Some("right"));
    }

    #[test]
    fn proxies_check_bounds_eagerly() {
        let v = CharacterVector::from_strs(&["only"]);
        assert!(matches!(
            v.at(1),
            Err(BindError::IndexOutOfBounds {
                index: 1,
                length: 1
            })
        ));
    }

    #[test]
    fn no_implicit_coercion_from_other_tags() {
        assert_eq!(
            CharacterVector::from_sexp(wrap(1)).unwrap_err(),
            BindError::TypeMismatch {
                expected: "character",
                found: SexpType::Integer
            }
        );
    }

    #[test]
    fn explicit_coerce_formats_values() {
        let v = CharacterVector::coerce(wrap(vec![1.5, 2.0])).unwrap();
        assert_eq!(v.to_vec(), vec![Some("1.5".into()), Some("2".into())]);
        let v = CharacterVector::coerce(wrap(vec![1e-20, 123456.789, 0.1])).unwrap();
        assert_eq!(
            v.to_vec(),
            vec![
                Some("1e-20".into()),
                Some("123456.789".into()),
                Some("0.1".into())
            ]
        );
        let sym = with_host(|h| h.install("name"));
        let v = CharacterVector::coerce(sym).unwrap();
        assert_eq!(v.get(0).unwrap().as_deref(), Some("name"));
        let env = with_host(|h| h.global_env());
        assert!(CharacterVector::coerce(env).is_err());
    }
}
