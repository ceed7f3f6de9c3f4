//! Entry-point wrapper for native code called from the host.
//!
//! Neither a `BindError` nor a panic may cross back into the host.  Both
//! are turned into the host's fatal-error signal with the message prefixed
//! by `"Exception: "`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::error::BindResult;
use crate::host::{has_current_host, with_host};

/// Run `f`, returning its value, or `None` after signalling the host when
/// it failed or panicked.
pub fn call_boundary<R>(f: impl FnOnce() -> BindResult<R>) -> Option<R> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    error!(%message, "native call failed");
    if has_current_host() {
        with_host(|h| h.signal_error(&format!("Exception: {message}")));
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown reason".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{as_value, wrap};
    use crate::error::BindError;

    fn signalled() -> Vec<String> {
        with_host(|h| h.take_signalled_errors())
    }

    #[test]
    fn success_passes_value_through() {
        assert_eq!(call_boundary(|| as_value::<i32>(wrap(4))), Some(4));
        assert!(signalled().is_empty());
    }

    #[test]
    fn errors_become_host_signals() {
        crate::test_support::init_tracing();
        let r: Option<()> = call_boundary(|| Err(BindError::NotAMatrix));
        assert_eq!(r, None);
        assert_eq!(signalled(), vec!["Exception: not a matrix"]);
    }

    #[test]
    fn panics_become_host_signals() {
        let r: Option<()> = call_boundary(|| panic!("went wrong: {}", 42));
        assert_eq!(r, None);
        let r: Option<()> = call_boundary(|| std::panic::panic_any(7u32));
        assert_eq!(r, None);
        assert_eq!(
            signalled(),
            vec!["Exception: went wrong: 42", "Exception: unknown reason"]
        );
    }

    #[test]
    fn panic_inside_host_access_leaves_host_usable() {
        let r: Option<i32> = call_boundary(|| {
            with_host(|h| {
                let x = h.alloc_vector(crate::gc::SexpType::Integer, 1);
                h.vector_elt(x, 0);
            });
            Ok(1)
        });
        assert_eq!(r, None);
        let messages = signalled();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Exception: vector_elt on integer"));
    }
}
