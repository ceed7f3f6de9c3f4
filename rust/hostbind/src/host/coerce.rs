//! Vector coercion in the reference host.

use crate::gc::{is_na_real, CellKind, Complex, HeapObject, HostHeap, Sexp, SexpType};
use crate::gc::{NA_INTEGER, NA_LOGICAL, NA_REAL};

/// One element of an atomic vector, read out of its storage.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Scalar {
    Logical(i32),
    Integer(i32),
    Real(f64),
    Complex(Complex),
    Raw(u8),
    Str(Option<String>),
}

fn int_from_real(x: f64) -> i32 {
    if x.is_nan() || x >= 2_147_483_648.0 || x <= -2_147_483_649.0 {
        NA_INTEGER
    } else {
        x.trunc() as i32
    }
}

fn real_from_int(x: i32) -> f64 {
    if x == NA_INTEGER {
        NA_REAL
    } else {
        f64::from(x)
    }
}

/// Out of range and missing values become zero; raw has no missing value.
fn raw_from_int(x: i32) -> u8 {
    u8::try_from(x).unwrap_or(0)
}

fn logical_from_str(s: &str) -> i32 {
    match s {
        "TRUE" | "true" | "True" | "T" => 1,
        "FALSE" | "false" | "False" | "F" => 0,
        _ => NA_LOGICAL,
    }
}

fn real_from_str(s: &str) -> f64 {
    match s.trim() {
        "NA" => NA_REAL,
        "Inf" | "inf" => f64::INFINITY,
        "-Inf" | "-inf" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        t => t.parse().unwrap_or(NA_REAL),
    }
}

/// Format a double the way the host prints it: at most 15 significant
/// digits, fixed notation unless scientific is shorter.
pub(crate) fn format_real(x: f64) -> Option<String> {
    if is_na_real(x) {
        return None;
    }
    Some(if x.is_nan() {
        "NaN".to_owned()
    } else if x.is_infinite() {
        (if x > 0.0 { "Inf" } else { "-Inf" }).to_owned()
    } else if x == 0.0 {
        "0".to_owned()
    } else {
        format_significant(x)
    })
}

fn format_significant(x: f64) -> String {
    // `{:e}` with 14 fractional digits rounds to 15 significant digits.
    let sci = format!("{:.14e}", x);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    let digits = mantissa.chars().filter(char::is_ascii_digit).count() as i32;
    let decimals = (digits - 1 - exponent).max(0) as usize;
    let fixed = format!("{:.*}", decimals, x);
    let sign = if exponent < 0 { '-' } else { '+' };
    let scientific = format!("{mantissa}e{sign}{:02}", exponent.abs());
    if fixed.len() <= scientific.len() {
        fixed
    } else {
        scientific
    }
}

impl Scalar {
    pub(crate) fn to_logical(&self) -> i32 {
        match *self {
            Scalar::Logical(x) => x,
            Scalar::Integer(x) if x == NA_INTEGER => NA_LOGICAL,
            Scalar::Integer(x) => i32::from(x != 0),
            Scalar::Real(x) if x.is_nan() => NA_LOGICAL,
            Scalar::Real(x) => i32::from(x != 0.0),
            Scalar::Complex(z) if z.r.is_nan() || z.i.is_nan() => NA_LOGICAL,
            Scalar::Complex(z) => i32::from(z.r != 0.0 || z.i != 0.0),
            Scalar::Raw(b) => i32::from(b != 0),
            Scalar::Str(None) => NA_LOGICAL,
            Scalar::Str(Some(ref s)) => logical_from_str(s),
        }
    }

    pub(crate) fn to_integer(&self) -> i32 {
        match *self {
            Scalar::Logical(x) | Scalar::Integer(x) => x,
            Scalar::Real(x) => int_from_real(x),
            Scalar::Complex(z) => int_from_real(z.r),
            Scalar::Raw(b) => i32::from(b),
            Scalar::Str(None) => NA_INTEGER,
            Scalar::Str(Some(ref s)) => int_from_real(real_from_str(s)),
        }
    }

    pub(crate) fn to_real(&self) -> f64 {
        match *self {
            Scalar::Logical(x) | Scalar::Integer(x) => real_from_int(x),
            Scalar::Real(x) => x,
            Scalar::Complex(z) => z.r,
            Scalar::Raw(b) => f64::from(b),
            Scalar::Str(None) => NA_REAL,
            Scalar::Str(Some(ref s)) => real_from_str(s),
        }
    }

    pub(crate) fn to_complex(&self) -> Complex {
        match *self {
            Scalar::Complex(z) => z,
            ref other => {
                let r = other.to_real();
                if is_na_real(r) {
                    Complex::new(NA_REAL, NA_REAL)
                } else {
                    Complex::new(r, 0.0)
                }
            }
        }
    }

    pub(crate) fn to_raw(&self) -> u8 {
        match *self {
            Scalar::Raw(b) => b,
            ref other => raw_from_int(other.to_integer()),
        }
    }

    pub(crate) fn to_str(&self) -> Option<String> {
        match *self {
            Scalar::Logical(x) if x == NA_LOGICAL => None,
            Scalar::Logical(x) => Some(if x != 0 { "TRUE" } else { "FALSE" }.to_owned()),
            Scalar::Integer(x) if x == NA_INTEGER => None,
            Scalar::Integer(x) => Some(x.to_string()),
            Scalar::Real(x) => format_real(x),
            Scalar::Complex(z) => {
                let r = format_real(z.r)?;
                let i = format_real(z.i.abs())?;
                let sign = if z.i < 0.0 { '-' } else { '+' };
                Some(format!("{r}{sign}{i}i"))
            }
            Scalar::Raw(b) => Some(format!("{b:02x}")),
            Scalar::Str(ref s) => s.clone(),
        }
    }
}

impl HostHeap {
    /// Elements of an atomic vector (or the name of a symbol) as scalars.
    pub(crate) fn scalars(&self, x: Sexp) -> Option<Vec<Scalar>> {
        Some(match self.get(x) {
            HeapObject::Logical(v) => v.iter().map(|&e| Scalar::Logical(e)).collect(),
            HeapObject::Integer(v) => v.iter().map(|&e| Scalar::Integer(e)).collect(),
            HeapObject::Real(v) => v.iter().map(|&e| Scalar::Real(e)).collect(),
            HeapObject::Complex(v) => v.iter().map(|&e| Scalar::Complex(e)).collect(),
            HeapObject::Raw(v) => v.iter().map(|&e| Scalar::Raw(e)).collect(),
            HeapObject::Str(v) => v.iter().map(|&c| Scalar::Str(self.char_value(c))).collect(),
            HeapObject::Symbol(name) => vec![Scalar::Str(Some(name.clone()))],
            _ => return None,
        })
    }

    pub(crate) fn char_value(&self, c: Sexp) -> Option<String> {
        match self.get(c) {
            HeapObject::Char(s) => s.clone(),
            _ => panic!("string element is not a char cell"),
        }
    }

    /// Build an atomic vector of type `ty` from scalars.
    pub(crate) fn alloc_from_scalars(&mut self, ty: SexpType, items: &[Scalar]) -> Option<Sexp> {
        let obj = match ty {
            SexpType::Logical => HeapObject::Logical(items.iter().map(Scalar::to_logical).collect()),
            SexpType::Integer => HeapObject::Integer(items.iter().map(Scalar::to_integer).collect()),
            SexpType::Real => HeapObject::Real(items.iter().map(Scalar::to_real).collect()),
            SexpType::Complex => HeapObject::Complex(items.iter().map(Scalar::to_complex).collect()),
            SexpType::Raw => HeapObject::Raw(items.iter().map(Scalar::to_raw).collect()),
            SexpType::String => {
                let cells = items
                    .iter()
                    .map(|s| {
                        let text = s.to_str();
                        self.alloc_char(text.as_deref())
                    })
                    .collect();
                HeapObject::Str(cells)
            }
            _ => return None,
        };
        Some(self.alloc(obj))
    }

    /// Coerce `x` to vector type `ty`.  Same-typed input is returned as is.
    ///
    /// Atomic vectors convert element-wise; lists, expressions and pairlists
    /// convert to each other; lists convert to atomic types only when every
    /// element is a length-one atomic vector.
    pub(crate) fn coerce_to(&mut self, x: Sexp, ty: SexpType) -> Option<Sexp> {
        let from = self.get(x).sexp_type();
        if from == ty {
            return Some(x);
        }
        let out = match (from, ty) {
            (SexpType::Nil, SexpType::Pairlist) => return Some(self.nil),
            (SexpType::Nil, _) if ty.is_vector() => self.alloc_vector_of(ty, 0),
            (_, SexpType::List | SexpType::Expression) => {
                let (items, names) = self.generic_elements(x)?;
                let out = self.alloc(if ty == SexpType::List {
                    HeapObject::List(items)
                } else {
                    HeapObject::Expression(items)
                });
                if let Some(names) = names {
                    self.set_attr(out, "names", names);
                }
                return Some(out);
            }
            (SexpType::List | SexpType::Expression, _) if ty.is_vector() => {
                let elems = match self.get(x) {
                    HeapObject::List(v) | HeapObject::Expression(v) => v.clone(),
                    _ => return None,
                };
                let mut items = Vec::with_capacity(elems.len());
                for e in elems {
                    let mut s = self.scalars(e)?;
                    if s.len() != 1 || self.get(e).sexp_type() == SexpType::Symbol {
                        return None;
                    }
                    items.push(s.remove(0));
                }
                self.alloc_from_scalars(ty, &items)?
            }
            (SexpType::Pairlist | SexpType::Language, SexpType::Pairlist) => {
                let copy = self.copy_chain(x, CellKind::Pairlist);
                return Some(copy);
            }
            (SexpType::List | SexpType::Expression, SexpType::Pairlist) => {
                return Some(self.list_to_pairlist(x));
            }
            (SexpType::Symbol, SexpType::String) => {
                let items = self.scalars(x)?;
                return self.alloc_from_scalars(ty, &items);
            }
            _ if from.is_vector() => {
                let items = self.scalars(x)?;
                self.alloc_from_scalars(ty, &items)?
            }
            _ => return None,
        };
        // Vector to vector keeps every attribute, `dim` included.
        if ty.is_vector() && from.is_vector() {
            self.copy_attrs(x, out);
        }
        Some(out)
    }

    /// Elements of `x` as handles, plus a names vector if the source has one.
    fn generic_elements(&mut self, x: Sexp) -> Option<(Vec<Sexp>, Option<Sexp>)> {
        match self.get(x) {
            HeapObject::List(v) | HeapObject::Expression(v) => {
                let items = v.clone();
                let names = self.attr(x, "names");
                Some((items, (names != self.nil).then_some(names)))
            }
            HeapObject::Cell { .. } => {
                let mut items = Vec::new();
                let mut tags = Vec::new();
                let mut cursor = x;
                while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
                    items.push(*car);
                    tags.push(*tag);
                    cursor = *cdr;
                }
                let names = if tags.iter().any(|t| *t != self.nil) {
                    let texts: Vec<Scalar> = tags
                        .iter()
                        .map(|&t| {
                            Scalar::Str(Some(if t == self.nil {
                                String::new()
                            } else {
                                self.symbol_str(t).to_owned()
                            }))
                        })
                        .collect();
                    self.alloc_from_scalars(SexpType::String, &texts)
                } else {
                    None
                };
                Some((items, names))
            }
            HeapObject::Symbol(_) => Some((vec![x], None)),
            _ => {
                let scalars = self.scalars(x)?;
                let ty = self.get(x).sexp_type();
                let mut items = Vec::with_capacity(scalars.len());
                for s in scalars {
                    items.push(self.alloc_from_scalars(ty, &[s])?);
                }
                let names = self.attr(x, "names");
                Some((items, (names != self.nil).then_some(names)))
            }
        }
    }

    fn copy_chain(&mut self, x: Sexp, kind: CellKind) -> Sexp {
        let mut cells = Vec::new();
        let mut cursor = x;
        while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
            cells.push((*car, *tag));
            cursor = *cdr;
        }
        let mut head = self.nil;
        for (car, tag) in cells.into_iter().rev() {
            head = self.alloc_cell(kind, car, head);
            *self.cell_mut(head).2 = tag;
        }
        head
    }

    /// Pairlist from a list, with tags taken from its names.
    pub(crate) fn list_to_pairlist(&mut self, x: Sexp) -> Sexp {
        let items = match self.get(x) {
            HeapObject::List(v) | HeapObject::Expression(v) => v.clone(),
            _ => return self.nil,
        };
        let names = self.attr(x, "names");
        let names = if names == self.nil {
            Vec::new()
        } else {
            self.scalars(names).unwrap_or_default()
        };
        let mut head = self.nil;
        for (i, car) in items.into_iter().enumerate().rev() {
            head = self.alloc_cell(CellKind::Pairlist, car, head);
            if let Some(Scalar::Str(Some(name))) = names.get(i) {
                if !name.is_empty() {
                    let sym = self.intern(name);
                    *self.cell_mut(head).2 = sym;
                }
            }
        }
        head
    }
}
