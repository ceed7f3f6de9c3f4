//! Typed ownership wrappers and element proxies over a garbage-collected
//! host heap.
//!
//! Native code never owns host values.  It holds [`Sexp`] handles, and a
//! handle stays valid across a collection only while something pins it.
//! [`OwnershipGuard`] ties one pin to a Rust value's lifetime; the typed
//! views in [`views`] build on it and hand out element proxies that alias
//! into host containers.
//!
//! All operations run against the host installed on the current thread
//! (see [`host::HostSession`]).  The crate ships a reference host,
//! [`HostHeap`], with an arena collector and a small call evaluator.

pub mod boundary;
pub mod config;
pub mod convert;
pub mod error;
pub mod evaluator;
pub mod gc;
pub mod guard;
pub mod host;
pub mod views;

#[cfg(test)]
mod test_support;

pub use boundary::call_boundary;
pub use config::HeapConfig;
pub use convert::{as_value, wrap, FromHost, IntoHost};
pub use error::{BindError, BindResult};
pub use evaluator::{eval_in, EvalState, ProtectedEvaluator};
pub use gc::{HostHeap, Sexp, SexpType};
pub use guard::{OwnershipGuard, PinPolicy};
pub use host::{with_host, Host, HostSession};
pub use views::{AnyView, View};
