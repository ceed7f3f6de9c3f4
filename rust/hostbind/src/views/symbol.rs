//! Symbols.

use super::{type_mismatch, type_of, View};
use crate::error::BindResult;
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::with_host;

/// View over an interned symbol.
#[derive(Clone, Debug)]
pub struct Symbol {
    guard: OwnershipGuard,
}

impl View for Symbol {
    const KIND: &'static str = "symbol";

    /// Symbols pass through; a single string is interned.
    fn prepare(x: Sexp) -> BindResult<Sexp> {
        match type_of(x) {
            SexpType::Symbol => Ok(x),
            SexpType::String => with_host(|h| {
                if h.length(x) != 1 {
                    return None;
                }
                let c = h.string_elt(x, 0);
                let name = h.char_str(c)?.to_owned();
                Some(h.install(&name))
            })
            .ok_or_else(|| type_mismatch(Self::KIND, x)),
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

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self::from_guard(OwnershipGuard::new(with_host(|h| h.install(name))))
    }

    pub fn name(&self) -> String {
        let x = self.sexp();
        with_host(|h| h.symbol_name(x).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::wrap;
    use crate::error::BindError;

    #[test]
    fn symbols_are_interned() {
        let a = Symbol::new("alpha");
        assert_eq!(a.name(), "alpha");
        assert_eq!(Symbol::new("alpha").sexp(), a.sexp());
    }

    #[test]
    fn single_strings_become_symbols() {
        let s = Symbol::from_sexp(wrap("alpha")).unwrap();
        assert_eq!(s.sexp(), Symbol::new("alpha").sexp());
        assert!(Symbol::from_sexp(wrap(vec!["a", "b"])).is_err());
        assert!(Symbol::from_sexp(wrap(None::<String>)).is_err());
        assert_eq!(
            Symbol::from_sexp(wrap(1)).unwrap_err(),
            BindError::TypeMismatch {
                expected: "symbol",
                found: SexpType::Integer
            }
        );
    }
}
