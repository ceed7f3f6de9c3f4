//! Conversions between native values and host values.
//!
//! `wrap` turns native values into fresh host vectors; `as_value` reads
//! host values back.  Scalars map to length-one vectors.  Element types
//! with no atomic mapping (handles, views) produce a generic list.

use std::collections::{BTreeSet, VecDeque};

use crate::error::{BindError, BindResult};
use crate::gc::{Complex, Sexp, SexpType, NA_LOGICAL};
use crate::host::{with_host, Host};
use crate::views::View;

/// Native values that can become a host value.
pub trait IntoHost {
    fn into_host(self) -> Sexp;
}

/// Convert `value` to a host value.  The result is not pinned.
pub fn wrap<T: IntoHost>(value: T) -> Sexp {
    value.into_host()
}

/// Element types of wrappable sequences.
pub trait Element: Sized {
    /// Allocate a host vector holding `items`, in order.
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp;
}

macro_rules! flat_element {
    ($elem:ty, $ty:ident, $ptr:ident, $conv:expr) => {
        impl Element for $elem {
            fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
                let x = h.alloc_vector(SexpType::$ty, items.len());
                let start = h.$ptr(x);
                for (i, &item) in items.iter().enumerate() {
                    // SAFETY: `x` was just allocated with `items.len()` slots.
                    unsafe { *start.add(i) = ($conv)(item) };
                }
                x
            }
        }
    };
}

flat_element!(i32, Integer, integer_ptr, |v: i32| v);
flat_element!(f64, Real, real_ptr, |v: f64| v);
flat_element!(u8, Raw, raw_ptr, |v: u8| v);
flat_element!(Complex, Complex, complex_ptr, |v: Complex| v);
flat_element!(bool, Logical, logical_ptr, i32::from);
flat_element!(Option<bool>, Logical, logical_ptr, |v: Option<bool>| v
    .map_or(NA_LOGICAL, i32::from));

fn wrap_strings<'s>(h: &mut dyn Host, items: impl ExactSizeIterator<Item = Option<&'s str>>) -> Sexp {
    let x = h.alloc_vector(SexpType::String, items.len());
    for (i, s) in items.enumerate() {
        let c = h.mk_char(s);
        h.set_string_elt(x, i, c);
    }
    x
}

impl Element for String {
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
        wrap_strings(h, items.iter().map(|s| Some(s.as_str())))
    }
}

impl Element for &str {
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
        wrap_strings(h, items.iter().map(|s| Some(*s)))
    }
}

/// `None` is the missing string.
impl Element for Option<String> {
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
        wrap_strings(h, items.iter().map(Option::as_deref))
    }
}

fn wrap_list(h: &mut dyn Host, items: impl ExactSizeIterator<Item = Sexp>) -> Sexp {
    let x = h.alloc_vector(SexpType::List, items.len());
    for (i, item) in items.enumerate() {
        h.set_vector_elt(x, i, item);
    }
    x
}

impl Element for Sexp {
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
        wrap_list(h, items.iter().copied())
    }
}

impl<V: View> Element for &V {
    fn wrap_all(items: &[Self], h: &mut dyn Host) -> Sexp {
        wrap_list(h, items.iter().map(|v| v.sexp()))
    }
}

impl<T: Element> IntoHost for Vec<T> {
    fn into_host(self) -> Sexp {
        with_host(|h| T::wrap_all(&self, h))
    }
}

impl<T: Element> IntoHost for &[T] {
    fn into_host(self) -> Sexp {
        with_host(|h| T::wrap_all(self, h))
    }
}

impl<T: Element, const N: usize> IntoHost for [T; N] {
    fn into_host(self) -> Sexp {
        with_host(|h| T::wrap_all(&self, h))
    }
}

impl<T: Element> IntoHost for VecDeque<T> {
    fn into_host(mut self) -> Sexp {
        with_host(|h| T::wrap_all(self.make_contiguous(), h))
    }
}

/// Wrapped in ascending order.
impl<T: Element + Ord> IntoHost for BTreeSet<T> {
    fn into_host(self) -> Sexp {
        let items: Vec<T> = self.into_iter().collect();
        with_host(|h| T::wrap_all(&items, h))
    }
}

macro_rules! scalar_into_host {
    ($($t:ty),* $(,)?) => {
        $(
            impl IntoHost for $t {
                fn into_host(self) -> Sexp {
                    with_host(|h| <$t as Element>::wrap_all(std::slice::from_ref(&self), h))
                }
            }
        )*
    };
}

scalar_into_host!(i32, f64, u8, bool, Complex, String, Option<bool>, Option<String>);

impl IntoHost for &str {
    fn into_host(self) -> Sexp {
        with_host(|h| wrap_strings(h, std::iter::once(Some(self))))
    }
}

/// Handles pass through unchanged.
impl IntoHost for Sexp {
    fn into_host(self) -> Sexp {
        self
    }
}

impl<V: View> IntoHost for &V {
    fn into_host(self) -> Sexp {
        self.sexp()
    }
}

/// Native values that can be read out of a host value.
pub trait FromHost: Sized {
    fn from_host(x: Sexp) -> BindResult<Self>;
}

/// Read `x` as a `T`.
pub fn as_value<T: FromHost>(x: Sexp) -> BindResult<T> {
    T::from_host(x)
}

/// Element types readable out of a host vector.
pub trait FromElements: Sized {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>>;
}

impl<T: FromElements> FromHost for Vec<T> {
    fn from_host(x: Sexp) -> BindResult<Self> {
        with_host(|h| T::read_all(h, x))
    }
}

/// Read a scalar: exactly one element, then the element rule.
fn read_scalar<T: FromElements>(x: Sexp) -> BindResult<T> {
    with_host(|h| {
        let n = h.length(x);
        if n != 1 {
            return Err(BindError::LengthMismatch(n));
        }
        let mut items = T::read_all(h, x)?;
        items.pop().ok_or(BindError::LengthMismatch(0))
    })
}

macro_rules! scalar_from_host {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromHost for $t {
                fn from_host(x: Sexp) -> BindResult<Self> {
                    read_scalar(x)
                }
            }
        )*
    };
}

scalar_from_host!(i32, f64, u8, bool, Complex, String, Option<bool>, Option<String>);

/// A handle reads as itself.
impl FromHost for Sexp {
    fn from_host(x: Sexp) -> BindResult<Self> {
        Ok(x)
    }
}

fn invalid(target: &'static str, found: SexpType) -> BindError {
    BindError::InvalidConversion { target, found }
}

/// Coerce a numeric-like source to `ty`.  `None` for `NULL`, which reads
/// as an empty sequence.
fn numeric(
    h: &mut dyn Host,
    x: Sexp,
    ty: SexpType,
    target: &'static str,
    accept_complex: bool,
) -> BindResult<Option<Sexp>> {
    let found = h.type_of(x);
    if found == SexpType::Nil {
        return Ok(None);
    }
    if !(found.is_numeric_like() || (accept_complex && found == SexpType::Complex)) {
        return Err(invalid(target, found));
    }
    h.coerce_vector(x, ty)
        .map(Some)
        .ok_or_else(|| invalid(target, found))
}

fn read_flat<T: Copy>(h: &mut dyn Host, x: Sexp, ptr: fn(&mut dyn Host, Sexp) -> *mut T) -> Vec<T> {
    let n = h.length(x);
    let start = ptr(h, x);
    // SAFETY: the host keeps `n` elements at `start`; they are copied out
    // before any further host call.
    unsafe { std::slice::from_raw_parts(start, n) }.to_vec()
}

macro_rules! numeric_elements {
    ($t:ty, $ty:ident, $ptr:ident, $target:literal, $complex:literal) => {
        impl FromElements for $t {
            fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
                Ok(match numeric(h, x, SexpType::$ty, $target, $complex)? {
                    Some(v) => read_flat(h, v, |h, v| h.$ptr(v)),
                    None => Vec::new(),
                })
            }
        }
    };
}

numeric_elements!(i32, Integer, integer_ptr, "integer", false);
numeric_elements!(f64, Real, real_ptr, "double", false);
numeric_elements!(u8, Raw, raw_ptr, "raw", false);
numeric_elements!(Complex, Complex, complex_ptr, "complex", true);

fn logicals(h: &mut dyn Host, x: Sexp, target: &'static str) -> BindResult<Vec<i32>> {
    Ok(match numeric(h, x, SexpType::Logical, target, false)? {
        Some(v) => read_flat(h, v, |h, v| h.logical_ptr(v)),
        None => Vec::new(),
    })
}

/// Plain `bool` has no missing value: NA is an error.
impl FromElements for bool {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
        let found = h.type_of(x);
        logicals(h, x, "bool")?
            .into_iter()
            .map(|v| {
                if v == NA_LOGICAL {
                    Err(invalid("bool", found))
                } else {
                    Ok(v != 0)
                }
            })
            .collect()
    }
}

impl FromElements for Option<bool> {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
        Ok(logicals(h, x, "logical")?
            .into_iter()
            .map(|v| (v != NA_LOGICAL).then_some(v != 0))
            .collect())
    }
}

fn strings(h: &mut dyn Host, x: Sexp, target: &'static str) -> BindResult<Vec<Option<String>>> {
    match h.type_of(x) {
        SexpType::String => Ok((0..h.length(x))
            .map(|i| {
                let c = h.string_elt(x, i);
                h.char_str(c).map(str::to_owned)
            })
            .collect()),
        SexpType::Nil => Ok(Vec::new()),
        found => Err(invalid(target, found)),
    }
}

/// The missing string reads as `"NA"`.
impl FromElements for String {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
        Ok(strings(h, x, "string")?
            .into_iter()
            .map(|s| s.unwrap_or_else(|| "NA".to_owned()))
            .collect())
    }
}

impl FromElements for Option<String> {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
        strings(h, x, "string")
    }
}

/// Elements of a list or expression vector.
impl FromElements for Sexp {
    fn read_all(h: &mut dyn Host, x: Sexp) -> BindResult<Vec<Self>> {
        match h.type_of(x) {
            SexpType::List | SexpType::Expression => {
                Ok((0..h.length(x)).map(|i| h.vector_elt(x, i)).collect())
            }
            SexpType::Nil => Ok(Vec::new()),
            found => Err(invalid("list", found)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{is_na_real, NA_INTEGER};
    use crate::test_support::{nil, PROP_CASES};
    use crate::views::{IntegerVector, List};
    use proptest::prelude::*;

    fn type_of(x: Sexp) -> SexpType {
        with_host(|h| h.type_of(x))
    }

    #[test]
    fn scalars_wrap_to_length_one() {
        for (x, ty) in [
            (wrap(1), SexpType::Integer),
            (wrap(1.0), SexpType::Real),
            (wrap(true), SexpType::Logical),
            (wrap(1u8), SexpType::Raw),
            (wrap(Complex::new(1.0, 2.0)), SexpType::Complex),
            (wrap("a"), SexpType::String),
            (wrap(String::from("a")), SexpType::String),
        ] {
            assert_eq!(type_of(x), ty);
            assert_eq!(with_host(|h| h.length(x)), 1);
        }
    }

    #[test]
    fn containers_keep_order() {
        let dq: VecDeque<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(as_value::<Vec<i32>>(wrap(dq)), Ok(vec![3, 1, 2]));
        let set: BTreeSet<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(as_value::<Vec<i32>>(wrap(set)), Ok(vec![1, 2, 3]));
        let slice: &[f64] = &[0.5, 0.25];
        assert_eq!(as_value::<Vec<f64>>(wrap(slice)), Ok(vec![0.5, 0.25]));
    }

    #[test]
    fn handles_and_views_pass_through_or_become_lists() {
        let x = wrap(5);
        assert_eq!(wrap(x), x);
        let v = IntegerVector::from_slice(&[1]);
        assert_eq!(wrap(&v), v.sexp());

        let list = wrap(vec![x, nil()]);
        assert_eq!(type_of(list), SexpType::List);
        assert_eq!(as_value::<Vec<Sexp>>(list), Ok(vec![x, nil()]));

        let views = wrap(vec![&v, &v]);
        assert_eq!(List::from_sexp(views).unwrap().to_vec(), vec![v.sexp(), v.sexp()]);
    }

    #[test]
    fn scalar_reads_need_length_one() {
        assert_eq!(as_value::<i32>(wrap(vec![1, 2])), Err(BindError::LengthMismatch(2)));
        assert_eq!(as_value::<f64>(wrap(Vec::<f64>::new())), Err(BindError::LengthMismatch(0)));
        assert_eq!(as_value::<String>(nil()), Err(BindError::LengthMismatch(0)));
        assert_eq!(as_value::<i32>(wrap(7)), Ok(7));
    }

    #[test]
    fn logical_missing_maps_to_target_missing() {
        let na = wrap(None::<bool>);
        assert_eq!(as_value::<i32>(na), Ok(NA_INTEGER));
        assert!(is_na_real(as_value::<f64>(na).unwrap()));
        assert_eq!(as_value::<u8>(na), Ok(0));
        assert_eq!(as_value::<Option<bool>>(na), Ok(None));
        assert_eq!(
            as_value::<bool>(na),
            Err(BindError::InvalidConversion {
                target: "bool",
                found: SexpType::Logical
            })
        );
    }

    #[test]
    fn numeric_kinds_coerce_freely() {
        assert_eq!(as_value::<f64>(wrap(3)), Ok(3.0));
        assert_eq!(as_value::<f64>(wrap(true)), Ok(1.0));
        assert_eq!(as_value::<f64>(wrap(false)), Ok(0.0));
        assert_eq!(as_value::<Vec<f64>>(wrap(vec![true, false])), Ok(vec![1.0, 0.0]));
        assert_eq!(as_value::<i32>(wrap(true)), Ok(1));
        assert_eq!(as_value::<i32>(wrap(3.9)), Ok(3));
        assert_eq!(as_value::<bool>(wrap(0u8)), Ok(false));
        assert_eq!(as_value::<u8>(wrap(300)), Ok(0));
        assert_eq!(as_value::<Complex>(wrap(2)), Ok(Complex::new(2.0, 0.0)));
    }

    #[test]
    fn strings_need_character_sources() {
        assert_eq!(
            as_value::<String>(wrap(1)),
            Err(BindError::InvalidConversion {
                target: "string",
                found: SexpType::Integer
            })
        );
        assert_eq!(
            as_value::<i32>(wrap("1")),
            Err(BindError::InvalidConversion {
                target: "integer",
                found: SexpType::String
            })
        );
        let na = wrap(None::<String>);
        assert_eq!(as_value::<Option<String>>(na), Ok(None));
        assert_eq!(as_value::<String>(na), Ok("NA".to_owned()));
        let mixed = wrap(vec![Some("a".to_owned()), None]);
        assert_eq!(
            as_value::<Vec<Option<String>>>(mixed),
            Ok(vec![Some("a".to_owned()), None])
        );
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(PROP_CASES))]

        #[test]
        fn round_trip_bool(v in proptest::collection::vec(any::<bool>(), 0..16)) {
            prop_assert_eq!(as_value::<Vec<bool>>(wrap(v.clone())), Ok(v));
        }

        #[test]
        fn round_trip_i32(v in proptest::collection::vec(any::<i32>(), 0..16)) {
            prop_assert_eq!(as_value::<Vec<i32>>(wrap(v.clone())), Ok(v));
        }

        #[test]
        fn round_trip_f64(v in proptest::collection::vec(-1e12f64..1e12, 0..16)) {
            prop_assert_eq!(as_value::<Vec<f64>>(wrap(v.clone())), Ok(v));
        }

        #[test]
        fn round_trip_u8(v in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assert_eq!(as_value::<Vec<u8>>(wrap(v.clone())), Ok(v));
        }

        #[test]
        fn round_trip_string(v in proptest::collection::vec("\\PC{0,8}", 0..8)) {
            prop_assert_eq!(as_value::<Vec<String>>(wrap(v.clone())), Ok(v));
        }
    }
}
