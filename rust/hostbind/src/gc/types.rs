//! Host heap object types, tags and handles.

use std::collections::BTreeMap;
use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Handle to a host heap value.  Copy-able, 8 bytes.
///
/// `index` selects the slot in the heap, `generation` detects use after the
/// slot was reclaimed.  Equality is identity: two handles are equal only if
/// they name the same slot in the same generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sexp {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Sexp {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sexp({}/{})", self.index, self.generation)
    }
}

/// Runtime type discriminator of a host value.
///
/// The string forms are the names the host prints for each tag; they are
/// what `TypeMismatch` errors report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[repr(u8)]
pub enum SexpType {
    #[strum(to_string = "NULL")]
    Nil = 0,
    #[strum(to_string = "symbol")]
    Symbol = 1,
    #[strum(to_string = "pairlist")]
    Pairlist = 2,
    #[strum(to_string = "closure")]
    Closure = 3,
    #[strum(to_string = "environment")]
    Environment = 4,
    #[strum(to_string = "promise")]
    Promise = 5,
    #[strum(to_string = "language")]
    Language = 6,
    #[strum(to_string = "special")]
    Special = 7,
    #[strum(to_string = "builtin")]
    Builtin = 8,
    #[strum(to_string = "char")]
    Char = 9,
    #[strum(to_string = "logical")]
    Logical = 10,
    #[strum(to_string = "integer")]
    Integer = 13,
    #[strum(to_string = "double")]
    Real = 14,
    #[strum(to_string = "complex")]
    Complex = 15,
    #[strum(to_string = "character")]
    String = 16,
    #[strum(to_string = "...")]
    Dots = 17,
    #[strum(to_string = "list")]
    List = 19,
    #[strum(to_string = "expression")]
    Expression = 20,
    #[strum(to_string = "weakref")]
    WeakRef = 23,
    #[strum(to_string = "raw")]
    Raw = 24,
}

impl SexpType {
    /// Atomic vectors whose elements coerce freely among each other.
    pub fn is_numeric_like(self) -> bool {
        matches!(
            self,
            SexpType::Logical | SexpType::Integer | SexpType::Real | SexpType::Raw
        )
    }

    /// Types stored as a flat, length-indexed vector.
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            SexpType::Logical
                | SexpType::Integer
                | SexpType::Real
                | SexpType::Complex
                | SexpType::Raw
                | SexpType::String
                | SexpType::List
                | SexpType::Expression
        )
    }

    /// Types stored as a chain of cells.
    pub fn is_cell(self) -> bool {
        matches!(self, SexpType::Pairlist | SexpType::Language | SexpType::Dots)
    }

    pub fn is_function(self) -> bool {
        matches!(self, SexpType::Closure | SexpType::Special | SexpType::Builtin)
    }
}

/// Missing value of integer vectors.
pub const NA_INTEGER: i32 = i32::MIN;
/// Missing value of logical vectors.
pub const NA_LOGICAL: i32 = i32::MIN;
/// Missing value of double vectors: a NaN whose low word is 1954.
pub const NA_REAL: f64 = f64::from_bits(0x7FF0_0000_0000_07A2);

/// True for the distinguished missing double, false for other NaNs.
pub fn is_na_real(x: f64) -> bool {
    x.is_nan() && (x.to_bits() & 0xFFFF_FFFF) == 1954
}

/// Complex element storage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex {
    pub r: f64,
    pub i: f64,
}

impl Complex {
    pub fn new(r: f64, i: f64) -> Self {
        Self { r, i }
    }
}

/// Cell flavour.  Pairlists and calls share the cell representation and
/// differ only in this marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Pairlist,
    Language,
    Dots,
}

impl CellKind {
    pub fn sexp_type(self) -> SexpType {
        match self {
            CellKind::Pairlist => SexpType::Pairlist,
            CellKind::Language => SexpType::Language,
            CellKind::Dots => SexpType::Dots,
        }
    }
}

/// One named slot of an environment frame.
#[derive(Clone, Copy, Debug)]
pub struct Binding {
    /// Bound value; for active bindings the function called on read.
    pub value: Sexp,
    pub locked: bool,
    pub active: bool,
}

/// Environment frame: bindings plus the enclosing environment.
#[derive(Clone, Debug)]
pub struct EnvFrame {
    pub bindings: BTreeMap<String, Binding>,
    pub parent: Sexp,
    pub locked: bool,
}

/// The concrete object stored in a heap slot.
pub enum HeapObject {
    Nil,
    Symbol(String),
    Cell {
        kind: CellKind,
        car: Sexp,
        cdr: Sexp,
        tag: Sexp,
    },
    Closure {
        formals: Sexp,
        body: Sexp,
        env: Sexp,
    },
    Env(EnvFrame),
    Promise {
        code: Sexp,
        env: Sexp,
        /// `None` until forced.
        value: Option<Sexp>,
        seen: bool,
    },
    Builtin {
        name: String,
        /// Specials receive their arguments unevaluated.
        special: bool,
    },
    /// Immutable string cell; `None` is the missing string.
    Char(Option<String>),
    Logical(Vec<i32>),
    Integer(Vec<i32>),
    Real(Vec<f64>),
    Complex(Vec<Complex>),
    Raw(Vec<u8>),
    Str(Vec<Sexp>),
    List(Vec<Sexp>),
    Expression(Vec<Sexp>),
    WeakRef {
        key: Sexp,
        value: Sexp,
    },
    /// Freed slot, available for reuse.
    Free,
}

impl HeapObject {
    pub fn sexp_type(&self) -> SexpType {
        match self {
            HeapObject::Nil => SexpType::Nil,
            HeapObject::Symbol(_) => SexpType::Symbol,
            HeapObject::Cell { kind, .. } => kind.sexp_type(),
            HeapObject::Closure { .. } => SexpType::Closure,
            HeapObject::Env(_) => SexpType::Environment,
            HeapObject::Promise { .. } => SexpType::Promise,
            HeapObject::Builtin { special: true, .. } => SexpType::Special,
            HeapObject::Builtin { .. } => SexpType::Builtin,
            HeapObject::Char(_) => SexpType::Char,
            HeapObject::Logical(_) => SexpType::Logical,
            HeapObject::Integer(_) => SexpType::Integer,
            HeapObject::Real(_) => SexpType::Real,
            HeapObject::Complex(_) => SexpType::Complex,
            HeapObject::Raw(_) => SexpType::Raw,
            HeapObject::Str(_) => SexpType::String,
            HeapObject::List(_) => SexpType::List,
            HeapObject::Expression(_) => SexpType::Expression,
            HeapObject::WeakRef { .. } => SexpType::WeakRef,
            HeapObject::Free => panic!("sexp_type on freed slot"),
        }
    }

    /// Collect the handles this object keeps alive (for GC marking).
    ///
    /// Weak references contribute nothing: their key and value are handled
    /// separately by the collector.
    pub fn trace_values(&self, out: &mut Vec<Sexp>) {
        match self {
            HeapObject::Cell { car, cdr, tag, .. } => out.extend([*car, *cdr, *tag]),
            HeapObject::Closure { formals, body, env } => out.extend([*formals, *body, *env]),
            HeapObject::Env(frame) => {
                out.push(frame.parent);
                out.extend(frame.bindings.values().map(|b| b.value));
            }
            HeapObject::Promise {
                code, env, value, ..
            } => {
                out.extend([*code, *env]);
                out.extend(*value);
            }
            HeapObject::Str(v) | HeapObject::List(v) | HeapObject::Expression(v) => {
                out.extend(v.iter().copied())
            }
            HeapObject::Nil
            | HeapObject::Symbol(_)
            | HeapObject::Builtin { .. }
            | HeapObject::Char(_)
            | HeapObject::Logical(_)
            | HeapObject::Integer(_)
            | HeapObject::Real(_)
            | HeapObject::Complex(_)
            | HeapObject::Raw(_)
            | HeapObject::WeakRef { .. }
            | HeapObject::Free => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sexp_copy_eq_hash() {
        let a = Sexp::new(1, 0);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, Sexp::new(1, 1));

        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn type_names_round_trip() {
        assert_eq!(SexpType::Real.to_string(), "double");
        assert_eq!(SexpType::String.to_string(), "character");
        assert_eq!(SexpType::from_str("list"), Ok(SexpType::List));
        assert_eq!(SexpType::Language as u8, 6);
    }

    #[test]
    fn na_real_is_distinguished_nan() {
        assert!(is_na_real(NA_REAL));
        assert!(!is_na_real(f64::NAN));
        assert!(!is_na_real(1954.0));
    }

    #[test]
    fn trace_values_cell() {
        let obj = HeapObject::Cell {
            kind: CellKind::Pairlist,
            car: Sexp::new(3, 0),
            cdr: Sexp::new(4, 0),
            tag: Sexp::new(0, 0),
        };
        let mut out = Vec::new();
        obj.trace_values(&mut out);
        assert_eq!(out, vec![Sexp::new(3, 0), Sexp::new(4, 0), Sexp::new(0, 0)]);
    }

    #[test]
    fn trace_values_weakref_empty() {
        let obj = HeapObject::WeakRef {
            key: Sexp::new(3, 0),
            value: Sexp::new(4, 0),
        };
        let mut out = Vec::new();
        obj.trace_values(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn builtin_type_depends_on_special_flag() {
        let special = HeapObject::Builtin {
            name: "quote".into(),
            special: true,
        };
        let builtin = HeapObject::Builtin {
            name: "c".into(),
            special: false,
        };
        assert_eq!(special.sexp_type(), SexpType::Special);
        assert_eq!(builtin.sexp_type(), SexpType::Builtin);
    }
}
