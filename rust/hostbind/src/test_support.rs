//! Shared helpers for unit tests.

use crate::gc::Sexp;
use crate::host::with_host;

pub(crate) const PROP_CASES: u32 = 64;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build the call `fun(args...)`.
pub(crate) fn call(fun: &str, args: &[Sexp]) -> Sexp {
    with_host(|h| {
        let mut tail = h.nil();
        for &a in args.iter().rev() {
            tail = h.cons(a, tail);
        }
        let f = h.install(fun);
        h.lcons(f, tail)
    })
}

pub(crate) fn nil() -> Sexp {
    with_host(|h| h.nil())
}

pub(crate) fn pins(x: Sexp) -> usize {
    with_host(|h| h.preserve_count(x))
}

pub(crate) fn preserved_total() -> usize {
    with_host(|h| h.heap_stats().preserved_total)
}
