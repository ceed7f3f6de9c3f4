//! Heap configuration.

use std::env;

use tracing::warn;

/// Tunables of the reference host heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Live-object count that arms a collection at the next safepoint.
    pub gc_threshold: usize,
    /// Maximum nesting of evaluator frames before evaluation fails.
    pub max_eval_depth: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 8192,
            max_eval_depth: 512,
        }
    }
}

impl HeapConfig {
    /// Read `HOSTBIND_GC_THRESHOLD` and `HOSTBIND_MAX_EVAL_DEPTH`, falling
    /// back to the defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gc_threshold: read_env("HOSTBIND_GC_THRESHOLD").unwrap_or(defaults.gc_threshold),
            max_eval_depth: read_env("HOSTBIND_MAX_EVAL_DEPTH")
                .unwrap_or(defaults.max_eval_depth),
        }
    }
}

fn read_env(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
