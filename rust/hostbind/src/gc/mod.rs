//! Reference host heap.
//!
//! # Architecture
//!
//! Arena-based mark-and-sweep collector:
//!
//! - **HostHeap**: Arena that owns every host value (vectors, cells, environments, ...).
//! - **Sexp**: Lightweight 8-byte handle (index + generation).
//! - **Precious set**: A multiset of pinned handles; pins are the only way
//!   native code keeps a value alive across a collection.
//! - **Safepoints**: Collection runs only from `collect_garbage` and on entry
//!   to protected evaluation, never in the middle of a view operation.
//! - **Generation counters**: Catch use-after-collected bugs at runtime (stale Sexp panics).

pub mod heap;
pub mod types;

pub use heap::{HeapStats, HostHeap};
pub use types::{
    is_na_real, Binding, CellKind, Complex, EnvFrame, HeapObject, Sexp, SexpType, NA_INTEGER,
    NA_LOGICAL, NA_REAL,
};
